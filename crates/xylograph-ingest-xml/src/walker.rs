//! Structural walker: candidate entity types from tree shape.
//!
//! An element tag qualifies as a candidate entity type when at least one
//! parent anywhere in the input carries two or more children with that tag.
//! For each qualified tag, attributes and scalar child text become property
//! mappings and qualified child tags become relationship references.
//! Singleton elements are treated conservatively: never promoted by
//! inference, only by a declarative description.
//!
//! The walker mutates the shared [`Mapping`] and never touches the store.
//! Extraction problems are skipped with a warning, never fatal.

use crate::{elements_by_tag, XmlNode};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;
use xylograph_mapping::{
    EntityType, Mapping, PropertyMapping, RelationshipRef, TypeOrigin, UriConfig, ValueSource,
};

/// What one inference run did to the mapping.
#[derive(Debug, Default, Clone)]
pub struct WalkReport {
    pub types_added: usize,
    pub types_extended: usize,
    pub properties_added: usize,
    pub relationships_added: usize,
    pub warnings: Vec<String>,
}

impl WalkReport {
    fn warn(&mut self, message: String) {
        warn!(target: "xylograph::walker", "{message}");
        self.warnings.push(message);
    }
}

/// Infer candidate entity types from parsed documents into `mapping`.
///
/// Types already present (e.g. loaded from a description) are extended with
/// newly observed properties and relationships; declared entries keep their
/// origin and selector.
pub fn infer_mapping(roots: &[XmlNode], cfg: &UriConfig, mapping: &mut Mapping) -> WalkReport {
    let mut report = WalkReport::default();

    // First pass: which tags repeat under some parent, and on which paths
    // their elements live.
    let mut qualified: BTreeSet<String> = BTreeSet::new();
    let mut paths: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for root in roots {
        let root_path = format!("/{}", root.tag);
        paths
            .entry(root.tag.clone())
            .or_default()
            .insert(root_path.clone());
        scan(root, &root_path, &mut qualified, &mut paths);
    }

    // Second pass: one candidate entity type per qualified tag.
    for tag in &qualified {
        let elements: Vec<&XmlNode> = roots
            .iter()
            .flat_map(|root| elements_by_tag(root, tag))
            .collect();

        let mut properties: Vec<PropertyMapping> = Vec::new();
        let mut relationships: Vec<RelationshipRef> = Vec::new();
        let mut skipped_structured: BTreeSet<String> = BTreeSet::new();
        let mut has_own_text = false;

        for element in &elements {
            if !element.text.is_empty() {
                has_own_text = true;
            }
            for (key, _) in &element.attributes {
                if !properties.iter().any(|p| p.name == *key) {
                    properties.push(PropertyMapping {
                        name: key.clone(),
                        source: ValueSource::Attribute(key.clone()),
                    });
                }
            }
            for child in &element.children {
                if qualified.contains(&child.tag) {
                    if !relationships.iter().any(|r| r.child_tag == child.tag) {
                        relationships.push(RelationshipRef {
                            name: format!("has_{}", child.tag),
                            child_tag: child.tag.clone(),
                            target_name: child.tag.clone(),
                            target_uri: cfg.type_uri(&child.tag),
                        });
                    }
                } else if child.scalar_text().is_some() {
                    if !properties.iter().any(|p| p.name == child.tag) {
                        properties.push(PropertyMapping {
                            name: child.tag.clone(),
                            source: ValueSource::ChildText(child.tag.clone()),
                        });
                    }
                } else if skipped_structured.insert(child.tag.clone()) {
                    report.warn(format!(
                        "{tag}: skipped singleton structured child <{}>",
                        child.tag
                    ));
                }
            }
        }

        if properties.is_empty() && relationships.is_empty() && !has_own_text {
            report.warn(format!("{tag}: nothing extractable on matched elements"));
        }

        let selector = paths
            .get(tag)
            .filter(|set| set.len() == 1)
            .and_then(|set| set.iter().next().cloned());

        let uri = cfg.type_uri(tag);
        if let Some(existing) = mapping.get_mut(&uri) {
            let mut extended = false;
            for p in properties {
                if !existing.has_property(&p.name) {
                    existing.properties.push(p);
                    report.properties_added += 1;
                    extended = true;
                }
            }
            for r in relationships {
                if !existing.has_relationship(&r.name, &r.target_uri) {
                    existing.relationships.push(r);
                    report.relationships_added += 1;
                    extended = true;
                }
            }
            if existing.selector.is_none() && selector.is_some() {
                existing.selector = selector;
                extended = true;
            }
            if extended {
                report.types_extended += 1;
            }
        } else {
            let mut entity = EntityType::new(tag.clone(), uri, TypeOrigin::Inferred);
            entity.selector = selector;
            report.properties_added += properties.len();
            report.relationships_added += relationships.len();
            entity.properties = properties;
            entity.relationships = relationships;
            if mapping.insert_type(entity).is_ok() {
                report.types_added += 1;
            }
        }
    }

    report
}

/// Recursive sibling-count scan. Fills `qualified` with tags that repeat
/// under some parent and `paths` with every path any tag occurs on.
fn scan(
    node: &XmlNode,
    path: &str,
    qualified: &mut BTreeSet<String>,
    paths: &mut BTreeMap<String, BTreeSet<String>>,
) {
    let mut counts: BTreeMap<&str, u32> = BTreeMap::new();
    for child in &node.children {
        *counts.entry(child.tag.as_str()).or_insert(0) += 1;
    }
    for (tag, count) in counts {
        if count >= 2 {
            qualified.insert(tag.to_string());
        }
    }
    for child in &node.children {
        let child_path = format!("{path}/{}", child.tag);
        paths
            .entry(child.tag.clone())
            .or_default()
            .insert(child_path.clone());
        scan(child, &child_path, qualified, paths);
    }
}
