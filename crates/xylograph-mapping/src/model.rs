//! In-memory mapping model.
//!
//! A [`Mapping`] is the shared mutable context of a generation run: structural
//! inference and description loading both populate it, the resolver reads
//! dependency edges off it, and the emitter walks it in generation order.
//! Keys are absolute type URIs; iteration order is the `BTreeMap` order so
//! repeated runs over the same input produce the same output.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("duplicate entity type: {0}")]
    DuplicateType(String),
}

/// Where an entity type came from. Declared types win over inferred ones when
/// both describe the same URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeOrigin {
    Inferred,
    Declared,
}

/// How a property value is pulled out of a matched source element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueSource {
    /// Value of an attribute on the matched element.
    Attribute(String),
    /// Text content of a direct child element with the given tag.
    ChildText(String),
    /// Text content of the matched element itself.
    OwnText,
}

/// A single extracted property: output identifier plus extraction rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyMapping {
    pub name: String,
    pub source: ValueSource,
}

/// Directed reference from an owning entity type to a referenced one.
///
/// The referenced type must be fully materialized before the owner, since the
/// relationship triple points at the target's identifier; every
/// `RelationshipRef` therefore becomes one dependency edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipRef {
    /// Relationship property name, e.g. `has_tag`.
    pub name: String,
    /// Tag of the child elements carrying the reference.
    pub child_tag: String,
    /// Local name of the referenced entity type.
    pub target_name: String,
    /// Absolute type URI of the referenced entity type.
    pub target_uri: String,
}

/// One inferred or declared category of source elements.
///
/// Immutable once the schema pass begins; owned exclusively by the
/// [`Mapping`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityType {
    /// Local name before URI assignment (usually the element tag).
    pub name: String,
    /// Absolute type URI, assigned at construction.
    pub uri: String,
    /// Slash-separated tag path locating matching elements, when unambiguous.
    /// `None` falls back to tag-name matching anywhere in the tree.
    pub selector: Option<String>,
    /// Ordered property list. Order is meaningful: the first property that
    /// yields a value on an instance supplies its reconciliation label.
    pub properties: Vec<PropertyMapping>,
    pub relationships: Vec<RelationshipRef>,
    pub origin: TypeOrigin,
}

impl EntityType {
    pub fn new(name: impl Into<String>, uri: impl Into<String>, origin: TypeOrigin) -> Self {
        Self {
            name: name.into(),
            uri: uri.into(),
            selector: None,
            properties: Vec::new(),
            relationships: Vec::new(),
            origin,
        }
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.properties.iter().any(|p| p.name == name)
    }

    pub fn has_relationship(&self, name: &str, target_uri: &str) -> bool {
        self.relationships
            .iter()
            .any(|r| r.name == name && r.target_uri == target_uri)
    }
}

/// Top-level mapping container: type URI → entity type.
///
/// Mutated by one generation stage at a time; `initialized` flips once every
/// populating stage has completed without a fatal error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Mapping {
    types: BTreeMap<String, EntityType>,
    initialized: bool,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new entity type. Keys are unique; inserting an already
    /// present URI is an error (callers that intend to extend an existing
    /// type go through [`Mapping::get_mut`]).
    pub fn insert_type(&mut self, entity_type: EntityType) -> Result<(), ModelError> {
        if self.types.contains_key(&entity_type.uri) {
            return Err(ModelError::DuplicateType(entity_type.uri));
        }
        self.types.insert(entity_type.uri.clone(), entity_type);
        Ok(())
    }

    pub fn get(&self, uri: &str) -> Option<&EntityType> {
        self.types.get(uri)
    }

    pub fn get_mut(&mut self, uri: &str) -> Option<&mut EntityType> {
        self.types.get_mut(uri)
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.types.contains_key(uri)
    }

    /// Look an entity type up by local name. Linear, but type counts are
    /// small (tens to low hundreds).
    pub fn by_name(&self, name: &str) -> Option<&EntityType> {
        self.types.values().find(|t| t.name == name)
    }

    /// Entity types in deterministic (URI) order.
    pub fn types(&self) -> impl Iterator<Item = &EntityType> {
        self.types.values()
    }

    pub fn type_uris(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn set_initialized(&mut self) {
        self.initialized = true;
    }
}
