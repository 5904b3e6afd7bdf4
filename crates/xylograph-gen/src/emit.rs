//! Two-pass emission against the triple store.
//!
//! Both passes walk entity types in the resolver's generation order, so a
//! relationship's target type is always fully materialized before any triple
//! points at it:
//!
//! - **schema pass**: type declarations, then property and relationship
//!   definitions per type;
//! - **data pass**: per type, every canonical instance with its literal
//!   properties first, then that type's relationship triples, so targets
//!   under an earlier (or the same) type are already on the store when a
//!   link resolves.
//!
//! Missing attributes or children on a concrete element are skipped with a
//! warning; they never abort a pass. Store writes are in-memory here —
//! durability is the caller's flush, and a failed run leaves whatever was
//! flushed before.

use crate::graph::{CycleError, DependencyGraph};
use crate::reconcile::Reconciler;
use crate::similarity::LabelMatcher;
use tracing::warn;
use xylograph_ingest_xml::{elements_by_tag, select, XmlNode};
use xylograph_mapping::{EntityType, Mapping, UriConfig, ValueSource};
use xylograph_store::{
    local_name, Object, TripleStore, RDFS_CLASS, RDFS_DOMAIN, RDFS_LABEL, RDFS_LITERAL,
    RDFS_RANGE, RDF_PROPERTY, RDF_TYPE,
};

/// What one emission pass wrote.
#[derive(Debug, Default, Clone)]
pub struct EmitReport {
    pub triples_written: usize,
    pub entities_emitted: usize,
    pub warnings: Vec<String>,
}

impl EmitReport {
    fn warn(&mut self, message: String) {
        warn!(target: "xylograph::emit", "{message}");
        self.warnings.push(message);
    }
}

/// Build the dependency graph for the current mapping snapshot and resolve
/// the generation order over type URIs. Nodes register in mapping
/// (deterministic) order; every relationship contributes one owner→target
/// edge.
pub fn generation_order(mapping: &Mapping) -> Result<Vec<String>, CycleError<String>> {
    let mut graph: DependencyGraph<String> = DependencyGraph::new();
    for entity_type in mapping.types() {
        graph.add_node(entity_type.uri.clone());
    }
    for entity_type in mapping.types() {
        for relationship in &entity_type.relationships {
            graph.add_dependency(&entity_type.uri, &relationship.target_uri);
        }
    }
    graph.resolve()
}

/// Writes schema and instance triples, resolving instance identity through
/// the reconciler.
pub struct Emitter {
    cfg: UriConfig,
    reconciler: Reconciler,
}

impl Emitter {
    pub fn new(cfg: UriConfig, matcher: Box<dyn LabelMatcher>) -> Self {
        Self {
            cfg,
            reconciler: Reconciler::new(matcher),
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Recover canonical entities from a store written by an earlier run.
    /// Accreting runs call this before the data pass so identifier
    /// assignment stays stable: labels already on disk keep their resource,
    /// and their ids are off the table for new entities.
    pub fn preload_from_store(&mut self, mapping: &Mapping, store: &TripleStore) {
        for entity_type in mapping.types() {
            for subject in store.subjects_of_type(&entity_type.uri) {
                let id = local_name(&subject);
                let label = store
                    .objects(&subject, RDFS_LABEL)
                    .into_iter()
                    .find_map(|object| match object {
                        Object::Literal(lit) => Some(lit.lexical),
                        Object::Iri(_) => None,
                    })
                    .unwrap_or_else(|| id.to_string());
                self.reconciler.preload(&entity_type.name, id, &label);
            }
        }
    }

    // ========================================================================
    // Schema pass
    // ========================================================================

    /// Emit type declarations and property/relationship definitions, in
    /// generation order.
    pub fn schema_pass(
        &self,
        mapping: &Mapping,
        order: &[String],
        store: &mut TripleStore,
    ) -> EmitReport {
        let mut report = EmitReport::default();
        for uri in order {
            let Some(entity_type) = mapping.get(uri) else {
                report.warn(format!("schema pass: no entity type for {uri}"));
                continue;
            };

            let mut put = |s: &str, p: &str, o: Object| {
                if store.insert(s, p, o) {
                    report.triples_written += 1;
                }
            };

            put(uri, RDF_TYPE, Object::iri(RDFS_CLASS));
            put(uri, RDFS_LABEL, Object::literal(&entity_type.name));

            for property in &entity_type.properties {
                let prop_uri = self.cfg.property_uri(&property.name);
                put(&prop_uri, RDF_TYPE, Object::iri(RDF_PROPERTY));
                put(&prop_uri, RDFS_LABEL, Object::literal(&property.name));
                put(&prop_uri, RDFS_DOMAIN, Object::iri(uri));
                put(&prop_uri, RDFS_RANGE, Object::iri(RDFS_LITERAL));
            }

            for relationship in &entity_type.relationships {
                let rel_uri = self.cfg.property_uri(&relationship.name);
                put(&rel_uri, RDF_TYPE, Object::iri(RDF_PROPERTY));
                put(&rel_uri, RDFS_LABEL, Object::literal(&relationship.name));
                put(&rel_uri, RDFS_DOMAIN, Object::iri(uri));
                // Target class is already declared: it precedes us in the
                // generation order.
                put(&rel_uri, RDFS_RANGE, Object::iri(&relationship.target_uri));
            }
        }
        report
    }

    // ========================================================================
    // Data pass
    // ========================================================================

    /// Emit instance triples for every matched source element, in the same
    /// generation order as the schema pass.
    pub fn data_pass(
        &mut self,
        mapping: &Mapping,
        order: &[String],
        roots: &[XmlNode],
        store: &mut TripleStore,
    ) -> EmitReport {
        let mut report = EmitReport::default();
        for uri in order {
            let Some(entity_type) = mapping.get(uri) else {
                report.warn(format!("data pass: no entity type for {uri}"));
                continue;
            };
            self.emit_instances(mapping, entity_type, roots, store, &mut report);
        }
        report
    }

    fn emit_instances(
        &mut self,
        mapping: &Mapping,
        entity_type: &EntityType,
        roots: &[XmlNode],
        store: &mut TripleStore,
        report: &mut EmitReport,
    ) {
        let elements = matched_elements(entity_type, roots);
        let locator = entity_type
            .selector
            .clone()
            .unwrap_or_else(|| format!("//{}", entity_type.name));

        // Materialize every instance of this type before resolving any of
        // its links. Nested same-tag elements make an instance reference
        // later instances of its own type, which a single interleaved pass
        // would never find.
        let mut subjects = Vec::with_capacity(elements.len());
        for (ordinal, element) in elements.iter().enumerate() {
            let raw_ref = format!("{locator}[{}]", ordinal + 1);
            let label = extract_label(entity_type, element, ordinal);
            let canonical = self
                .reconciler
                .resolve(&entity_type.name, &label, &raw_ref);
            let subject = self.cfg.resource_uri(&entity_type.name, &canonical);

            if store.insert(&subject, RDF_TYPE, Object::iri(&entity_type.uri)) {
                report.triples_written += 1;
                report.entities_emitted += 1;
            }
            if store.insert(&subject, RDFS_LABEL, Object::literal(&label)) {
                report.triples_written += 1;
            }

            for property in &entity_type.properties {
                match extract_value(element, &property.source) {
                    Some(value) => {
                        if store.insert(
                            &subject,
                            &self.cfg.property_uri(&property.name),
                            Object::literal(value),
                        ) {
                            report.triples_written += 1;
                        }
                    }
                    None => report.warn(format!(
                        "{}: missing {} on {raw_ref}",
                        entity_type.name, property.name
                    )),
                }
            }

            subjects.push(subject);
        }

        if entity_type.relationships.is_empty() {
            return;
        }

        for (ordinal, element) in elements.iter().enumerate() {
            let raw_ref = format!("{locator}[{}]", ordinal + 1);
            let subject = &subjects[ordinal];
            for relationship in &entity_type.relationships {
                let rel_uri = self.cfg.property_uri(&relationship.name);
                let children: Vec<&XmlNode> =
                    element.children_named(&relationship.child_tag).collect();
                if children.is_empty() {
                    report.warn(format!(
                        "{}: missing <{}> children on {raw_ref}",
                        entity_type.name, relationship.child_tag
                    ));
                    continue;
                }
                for child in children {
                    let child_label = match mapping.get(&relationship.target_uri) {
                        Some(target_type) => {
                            extract_label_for_reference(target_type, child, roots)
                        }
                        None => child.text.clone(),
                    };
                    // Targets are on the store by now, written under an
                    // earlier type or by the instance loop above; an unknown
                    // label means the child never matched the target type's
                    // elements.
                    match self
                        .reconciler
                        .find(&relationship.target_name, &child_label)
                    {
                        Some(target) => {
                            let target_uri = self
                                .cfg
                                .resource_uri(&target.type_name, &target.id);
                            if store.insert(subject, &rel_uri, Object::iri(target_uri)) {
                                report.triples_written += 1;
                            }
                        }
                        None => report.warn(format!(
                            "{}: unresolved {} target {child_label:?} on {raw_ref}",
                            entity_type.name, relationship.name
                        )),
                    }
                }
            }
        }
    }
}

/// Elements matched by an entity type: its selector path when set, tag
/// matching anywhere otherwise.
fn matched_elements<'a>(entity_type: &EntityType, roots: &'a [XmlNode]) -> Vec<&'a XmlNode> {
    let mut out = Vec::new();
    for root in roots {
        match &entity_type.selector {
            Some(selector) => out.extend(select(root, selector)),
            None => out.extend(elements_by_tag(root, &entity_type.name)),
        }
    }
    out
}

/// Reconciliation label for an instance: the first property that yields a
/// value, else the element's own text, else a positional fallback.
fn extract_label(entity_type: &EntityType, element: &XmlNode, ordinal: usize) -> String {
    for property in &entity_type.properties {
        if let Some(value) = extract_value(element, &property.source) {
            return value;
        }
    }
    if !element.text.is_empty() {
        return element.text.clone();
    }
    format!("{}_{}", entity_type.name, ordinal + 1)
}

/// Label used when resolving a relationship child element against the
/// target type's canonical entities. Mirrors [`extract_label`], including
/// the positional fallback: a child with nothing extractable is located by
/// identity among the target's matched elements, so it resolves to the same
/// generated label its own emission used.
fn extract_label_for_reference(
    target_type: &EntityType,
    child: &XmlNode,
    roots: &[XmlNode],
) -> String {
    for property in &target_type.properties {
        if let Some(value) = extract_value(child, &property.source) {
            return value;
        }
    }
    if !child.text.is_empty() {
        return child.text.clone();
    }
    matched_elements(target_type, roots)
        .iter()
        .position(|e| std::ptr::eq(*e, child))
        .map(|index| format!("{}_{}", target_type.name, index + 1))
        .unwrap_or_default()
}

fn extract_value(element: &XmlNode, source: &ValueSource) -> Option<String> {
    match source {
        ValueSource::Attribute(name) => element.attribute(name).map(str::to_string),
        ValueSource::ChildText(tag) => element
            .child(tag)
            .and_then(XmlNode::scalar_text)
            .map(str::to_string),
        ValueSource::OwnText => {
            if element.text.is_empty() {
                None
            } else {
                Some(element.text.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::NormalizedExactMatcher;
    use xylograph_ingest_xml::{infer_mapping, parse_document};
    use xylograph_mapping::MappingFileV1;

    const THREE_LEVEL: &str = r#"<library>
  <item sku="b-1">
    <title>Dune</title>
    <tag>scifi</tag>
    <tag>classic</tag>
  </item>
  <item sku="b-2">
    <title>Neuromancer</title>
    <tag>scifi</tag>
  </item>
</library>"#;

    fn cfg() -> UriConfig {
        UriConfig::from_domain("http://example.org/kg").unwrap()
    }

    fn inferred() -> (Mapping, Vec<XmlNode>) {
        let root = parse_document(THREE_LEVEL).unwrap();
        let mut mapping = Mapping::new();
        infer_mapping(std::slice::from_ref(&root), &cfg(), &mut mapping);
        (mapping, vec![root])
    }

    fn emitter() -> Emitter {
        Emitter::new(cfg(), Box::new(NormalizedExactMatcher))
    }

    fn class_position(store: &TripleStore, type_uri: &str) -> usize {
        store
            .iter()
            .position(|t| {
                t.subject == type_uri
                    && t.predicate == RDF_TYPE
                    && t.object == Object::iri(RDFS_CLASS)
            })
            .unwrap_or_else(|| panic!("no class declaration for {type_uri}"))
    }

    #[test]
    fn schema_pass_declares_targets_before_owners() {
        let (mapping, _) = inferred();
        let order = generation_order(&mapping).unwrap();
        let mut store = TripleStore::new();
        let report = emitter().schema_pass(&mapping, &order, &mut store);

        assert!(report.warnings.is_empty());
        assert!(report.triples_written > 0);
        let tag_pos = class_position(&store, &cfg().type_uri("tag"));
        let item_pos = class_position(&store, &cfg().type_uri("item"));
        assert!(tag_pos < item_pos);

        // Property definitions carry domain and range.
        let sku = cfg().property_uri("sku");
        assert!(store.contains(&sku, RDF_TYPE, &Object::iri(RDF_PROPERTY)));
        assert!(store.contains(&sku, RDFS_DOMAIN, &Object::iri(&cfg().type_uri("item"))));
        let has_tag = cfg().property_uri("has_tag");
        assert!(store.contains(&has_tag, RDFS_RANGE, &Object::iri(&cfg().type_uri("tag"))));
    }

    #[test]
    fn data_pass_links_relationships_to_canonical_targets() {
        let (mapping, roots) = inferred();
        let order = generation_order(&mapping).unwrap();
        let mut store = TripleStore::new();
        let mut em = emitter();
        em.schema_pass(&mapping, &order, &mut store);
        let report = em.data_pass(&mapping, &order, &roots, &mut store);

        assert_eq!(report.entities_emitted, 4); // 2 items + 2 canonical tags

        // Three raw tag elements reconcile to two canonical tags; `scifi`
        // carries two merged-from references.
        let tags = store.subjects_of_type(&cfg().type_uri("tag"));
        assert_eq!(tags.len(), 2);
        let scifi = em.reconciler().find("tag", "scifi").unwrap();
        assert_eq!(scifi.merged_from.len(), 2);

        let items = store.subjects_of_type(&cfg().type_uri("item"));
        assert_eq!(items.len(), 2);

        // Item b-1 (labelled by its first property, the sku) points at both
        // of its tags, in document order.
        let first = cfg().resource_uri("item", "b_1");
        let linked = store.objects(&first, &cfg().property_uri("has_tag"));
        assert_eq!(
            linked,
            vec![
                Object::iri(cfg().resource_uri("tag", "scifi")),
                Object::iri(cfg().resource_uri("tag", "classic")),
            ]
        );
        assert!(store.contains(
            &first,
            &cfg().property_uri("sku"),
            &Object::literal("b-1")
        ));
        assert!(store.contains(
            &first,
            &cfg().property_uri("title"),
            &Object::literal("Dune")
        ));
    }

    #[test]
    fn nested_same_type_references_resolve() {
        // Posts nest under posts: the walker declares a self-relationship,
        // so the outer post references instances of its own type that sit
        // later in document order.
        let root = parse_document(
            r#"<forum><post id="1"><post id="2"/><post id="3"/></post><post id="4"/></forum>"#,
        )
        .unwrap();
        let mut mapping = Mapping::new();
        infer_mapping(std::slice::from_ref(&root), &cfg(), &mut mapping);
        let roots = vec![root];
        let order = generation_order(&mapping).unwrap();
        let mut store = TripleStore::new();
        let mut em = emitter();
        let report = em.data_pass(&mapping, &order, &roots, &mut store);

        assert_eq!(report.entities_emitted, 4);
        assert!(report.warnings.iter().all(|w| !w.contains("unresolved")));

        // The outer post links to both nested posts, in document order.
        let first = cfg().resource_uri("post", "1");
        let linked = store.objects(&first, &cfg().property_uri("has_post"));
        assert_eq!(
            linked,
            vec![
                Object::iri(cfg().resource_uri("post", "2")),
                Object::iri(cfg().resource_uri("post", "3")),
            ]
        );
    }

    #[test]
    fn label_less_targets_resolve_by_position() {
        // Markers carry no attributes, text, or children: their instances
        // materialize under generated positional labels, and references must
        // land on those same labels.
        let root =
            parse_document("<doc><slot><marker/><marker/></slot><slot><marker/></slot></doc>")
                .unwrap();
        let mut mapping = Mapping::new();
        infer_mapping(std::slice::from_ref(&root), &cfg(), &mut mapping);
        let roots = vec![root];
        let order = generation_order(&mapping).unwrap();
        let mut store = TripleStore::new();
        let mut em = emitter();
        let report = em.data_pass(&mapping, &order, &roots, &mut store);

        assert!(report.warnings.is_empty());
        let has_marker = cfg().property_uri("has_marker");
        assert_eq!(
            store.objects(&cfg().resource_uri("slot", "slot_1"), &has_marker),
            vec![
                Object::iri(cfg().resource_uri("marker", "marker_1")),
                Object::iri(cfg().resource_uri("marker", "marker_2")),
            ]
        );
        assert_eq!(
            store.objects(&cfg().resource_uri("slot", "slot_2"), &has_marker),
            vec![Object::iri(cfg().resource_uri("marker", "marker_3"))]
        );
    }

    #[test]
    fn data_pass_is_idempotent_across_reruns() {
        let (mapping, roots) = inferred();
        let order = generation_order(&mapping).unwrap();
        let mut store = TripleStore::new();
        let mut em = emitter();
        em.schema_pass(&mapping, &order, &mut store);
        em.data_pass(&mapping, &order, &roots, &mut store);
        let before = store.len();

        // Second run against the same store: everything deduplicates.
        let report = em.data_pass(&mapping, &order, &roots, &mut store);
        assert_eq!(store.len(), before);
        assert_eq!(report.triples_written, 0);
    }

    #[test]
    fn missing_attribute_is_skipped_with_warning() {
        let description = r#"{
            "version": 1, "generated_at": "0", "source": "t",
            "entity_types": [
                { "id": "class:item", "selector": "/library/item",
                  "properties": [
                    { "name": "sku", "kind": "attribute", "attribute": "sku" },
                    { "name": "isbn", "kind": "attribute", "attribute": "isbn" }
                  ] }
            ]
        }"#;
        let mapping = MappingFileV1::parse_json(description)
            .unwrap()
            .into_mapping(&cfg())
            .unwrap();
        let roots = vec![parse_document(THREE_LEVEL).unwrap()];
        let order = generation_order(&mapping).unwrap();
        let mut store = TripleStore::new();
        let mut em = emitter();
        let report = em.data_pass(&mapping, &order, &roots, &mut store);

        // isbn is absent on both items: two warnings, sku still emitted.
        assert_eq!(
            report
                .warnings
                .iter()
                .filter(|w| w.contains("missing isbn"))
                .count(),
            2
        );
        assert!(store.contains(
            &cfg().resource_uri("item", "b_1"),
            &cfg().property_uri("sku"),
            &Object::literal("b-1")
        ));
    }

    #[test]
    fn unresolved_relationship_target_is_skipped_with_warning() {
        let description = r#"{
            "version": 1, "generated_at": "0", "source": "t",
            "entity_types": [
                { "id": "class:item", "selector": "/library/item",
                  "relationships": [
                    { "name": "has_tag", "child_tag": "tag", "target": "class:tag" }
                  ] },
                { "id": "class:tag", "selector": "/nowhere/tag" }
            ]
        }"#;
        let mapping = MappingFileV1::parse_json(description)
            .unwrap()
            .into_mapping(&cfg())
            .unwrap();
        let roots = vec![parse_document(THREE_LEVEL).unwrap()];
        let order = generation_order(&mapping).unwrap();
        let mut store = TripleStore::new();
        let mut em = emitter();
        let report = em.data_pass(&mapping, &order, &roots, &mut store);

        // The tag selector matches nothing, so every reference dangles and
        // is dropped; no has_tag triple may reference an unmaterialized id.
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("unresolved has_tag target")));
        let has_tag = cfg().property_uri("has_tag");
        assert!(store.iter().all(|t| t.predicate != has_tag));
        assert!(store.subjects_of_type(&cfg().type_uri("tag")).is_empty());
    }

    #[test]
    fn generation_order_reports_cycles() {
        let description = r#"{
            "version": 1, "generated_at": "0", "source": "t",
            "entity_types": [
                { "id": "class:a",
                  "relationships": [ { "name": "to_b", "target": "class:b" } ] },
                { "id": "class:b",
                  "relationships": [ { "name": "to_a", "target": "class:a" } ] }
            ]
        }"#;
        let mapping = MappingFileV1::parse_json(description)
            .unwrap()
            .into_mapping(&cfg())
            .unwrap();
        let err = generation_order(&mapping).unwrap_err();
        assert_eq!(err.remaining.len(), 2);
    }
}
