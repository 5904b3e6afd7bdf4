//! Entity reconciliation: one canonical identifier per real-world entity.
//!
//! The walker and the data pass produce raw instances from different
//! document locations; instances whose labels compare equal under the
//! configured [`LabelMatcher`] collapse into one [`CanonicalEntity`].
//! Identifiers are assigned once, on first observation of a label's
//! equivalence class, and never change afterwards — only the merged-from
//! set grows. Merging the same raw instance twice is a no-op.
//!
//! Labels never merge across entity types: an `item` named "x" and a `tag`
//! named "x" stay distinct resources.
//!
//! A reconciler starts empty each run. Runs that accrete an existing store
//! must seed it with the entities already on disk ([`Reconciler::preload`]);
//! otherwise a fresh run can hand a previously assigned identifier to a
//! different label whose slug collides with it.

use crate::similarity::LabelMatcher;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

/// A resolved entity instance: stable id, first-observed label, and every
/// raw instance reference merged into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalEntity {
    pub type_name: String,
    /// Identifier unique within the type; becomes the resource URI's last
    /// segment.
    pub id: String,
    pub label: String,
    pub merged_from: BTreeSet<String>,
}

/// Merges raw instances into canonical entities using a pluggable matcher.
pub struct Reconciler {
    matcher: Box<dyn LabelMatcher>,
    entities: Vec<CanonicalEntity>,
    /// type name -> indexes into `entities`
    by_type: HashMap<String, Vec<usize>>,
    used_ids: HashSet<String>,
}

impl Reconciler {
    pub fn new(matcher: Box<dyn LabelMatcher>) -> Self {
        Self {
            matcher,
            entities: Vec::new(),
            by_type: HashMap::new(),
            used_ids: HashSet::new(),
        }
    }

    /// Resolve a raw instance to its canonical id, creating the canonical
    /// entity on first observation of the label class.
    pub fn resolve(&mut self, type_name: &str, label: &str, raw_ref: &str) -> String {
        if let Some(index) = self.find_index(type_name, label) {
            let entity = &mut self.entities[index];
            if entity.merged_from.insert(raw_ref.to_string()) {
                debug!(
                    type_name,
                    canonical = %entity.id,
                    raw = raw_ref,
                    "merged raw instance into canonical entity"
                );
            }
            return entity.id.clone();
        }

        let id = self.assign_id(type_name, label);
        self.entities.push(CanonicalEntity {
            type_name: type_name.to_string(),
            id: id.clone(),
            label: label.to_string(),
            merged_from: BTreeSet::from([raw_ref.to_string()]),
        });
        self.by_type
            .entry(type_name.to_string())
            .or_default()
            .push(self.entities.len() - 1);
        id
    }

    /// Seed a canonical entity recovered from an earlier run, reserving its
    /// identifier and making its label findable again. A later run then
    /// neither hands the id to a different label nor re-derives a different
    /// id for the same label. Ids already seeded are ignored.
    pub fn preload(&mut self, type_name: &str, id: &str, label: &str) {
        if !self.used_ids.insert(format!("{type_name}/{id}")) {
            return;
        }
        self.entities.push(CanonicalEntity {
            type_name: type_name.to_string(),
            id: id.to_string(),
            label: label.to_string(),
            merged_from: BTreeSet::new(),
        });
        self.by_type
            .entry(type_name.to_string())
            .or_default()
            .push(self.entities.len() - 1);
    }

    /// Look up the canonical entity for a label without creating one.
    pub fn find(&self, type_name: &str, label: &str) -> Option<&CanonicalEntity> {
        self.find_index(type_name, label).map(|i| &self.entities[i])
    }

    /// All canonical entities, in assignment order.
    pub fn entities(&self) -> &[CanonicalEntity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    fn find_index(&self, type_name: &str, label: &str) -> Option<usize> {
        let indexes = self.by_type.get(type_name)?;
        indexes
            .iter()
            .copied()
            .find(|&i| self.matcher.matches(label, &self.entities[i].label))
    }

    fn assign_id(&mut self, type_name: &str, label: &str) -> String {
        let base = slug(label);
        // Uniqueness is scoped per type; the used set keys on both.
        if self.used_ids.insert(format!("{type_name}/{base}")) {
            return base;
        }
        for i in 2.. {
            let candidate = format!("{base}_{i}");
            if self.used_ids.insert(format!("{type_name}/{candidate}")) {
                return candidate;
            }
            if i > 10_000 {
                // Safety valve; should never happen for reasonable inputs.
                return format!("{base}_overflow");
            }
        }
        unreachable!("id assignment loop always returns")
    }
}

/// Lowercased identifier slug: alphanumerics kept, everything else folded
/// to single underscores, trimmed, capped, never empty.
pub fn slug(label: &str) -> String {
    let mut out = String::new();
    let mut prev_underscore = false;

    for c in label.trim().chars() {
        let c = if c.is_alphanumeric() { c } else { '_' };
        if c == '_' {
            if prev_underscore {
                continue;
            }
            prev_underscore = true;
            out.push(c);
        } else {
            prev_underscore = false;
            for lower in c.to_lowercase() {
                out.push(lower);
            }
        }
        if out.len() >= 64 {
            break;
        }
    }

    let out = out.trim_matches('_').to_string();
    if out.is_empty() {
        "entity".to_string()
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::{JaroWinklerMatcher, NormalizedExactMatcher};

    fn reconciler() -> Reconciler {
        Reconciler::new(Box::new(NormalizedExactMatcher))
    }

    #[test]
    fn merging_is_idempotent() {
        let mut r = reconciler();
        let first = r.resolve("tag", "Café Noir", "/doc/item[1]/tag[1]");
        let second = r.resolve("tag", "cafenoir", "/doc/item[2]/tag[1]");
        assert_eq!(first, second);

        // Same two raw instances again: still one canonical entity,
        // merged-from still holds exactly two references.
        r.resolve("tag", "Café Noir", "/doc/item[1]/tag[1]");
        r.resolve("tag", "cafenoir", "/doc/item[2]/tag[1]");
        assert_eq!(r.len(), 1);
        let entity = r.find("tag", "cafe noir").unwrap();
        assert_eq!(entity.merged_from.len(), 2);
        assert_eq!(entity.label, "Café Noir");
    }

    #[test]
    fn identifier_assigned_once_never_changes() {
        let mut r = reconciler();
        let id = r.resolve("item", "Dune", "a");
        assert_eq!(id, "dune");
        assert_eq!(r.resolve("item", "DUNE", "b"), "dune");
        assert_eq!(r.resolve("item", " dune ", "c"), "dune");
    }

    #[test]
    fn distinct_labels_get_distinct_ids() {
        let mut r = reconciler();
        assert_eq!(r.resolve("item", "Dune", "a"), "dune");
        assert_eq!(r.resolve("item", "Ubik", "b"), "ubik");
        assert_eq!(r.len(), 2);
    }

    #[test]
    fn colliding_slugs_get_numeric_suffixes() {
        let mut r = reconciler();
        // Different labels, same slug after folding.
        assert_eq!(r.resolve("item", "A B", "a"), "a_b");
        assert_eq!(r.resolve("item", "A-B!", "b"), "a_b_2");
        assert_eq!(r.len(), 2);
    }

    #[test]
    fn preloaded_ids_stay_reserved() {
        let mut r = reconciler();
        r.preload("item", "a_b", "A-B!");

        // The recovered label resolves onto the recovered entity.
        assert_eq!(r.resolve("item", "A-B!", "x"), "a_b");
        // A different label whose slug collides may not take its id.
        assert_eq!(r.resolve("item", "A B", "y"), "a_b_2");
        assert_eq!(r.len(), 2);

        // Seeding the same id again is a no-op.
        r.preload("item", "a_b", "A-B!");
        assert_eq!(r.len(), 2);
    }

    #[test]
    fn types_do_not_share_label_space() {
        let mut r = reconciler();
        let item = r.resolve("item", "x", "a");
        let tag = r.resolve("tag", "x", "b");
        assert_eq!(item, tag); // same slug...
        assert_eq!(r.len(), 2); // ...but two canonical entities
        assert!(r.find("item", "x").is_some());
        assert!(r.find("tag", "x").is_some());
    }

    #[test]
    fn find_never_creates() {
        let mut r = reconciler();
        assert!(r.find("item", "ghost").is_none());
        r.resolve("item", "real", "a");
        assert!(r.find("item", "ghost").is_none());
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn graded_matcher_merges_near_labels() {
        let mut r = Reconciler::new(Box::new(JaroWinklerMatcher::default()));
        let a = r.resolve("item", "Neuromancer", "a");
        let b = r.resolve("item", "Neuromancor", "b");
        assert_eq!(a, b);
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn slug_folds_and_caps() {
        assert_eq!(slug("Café Noir"), "café_noir");
        assert_eq!(slug("  A -- B  "), "a_b");
        assert_eq!(slug("!!!"), "entity");
        assert!(slug(&"x".repeat(200)).len() <= 64);
    }
}
