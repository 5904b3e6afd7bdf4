//! Versioned declarative mapping description (`mapping.json`).
//!
//! The description format is what `infer` writes and what `generate` accepts
//! in place of (or in addition to) inference. Type identifiers may carry a
//! namespace-style prefix (`class:item`); the prefix is stripped on load.
//! The format is deliberately small: entity types, their selectors, property
//! extraction rules, and relationship declarations.

use crate::model::{
    EntityType, Mapping, PropertyMapping, RelationshipRef, TypeOrigin, ValueSource,
};
use crate::uri::UriConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

pub const MAPPING_VERSION_V1: u32 = 1;

#[derive(Debug, Error)]
pub enum DescriptionError {
    #[error("unsupported mapping description version: {0}")]
    UnsupportedVersion(u32),
    #[error("invalid mapping description JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("duplicate entity type id: {0}")]
    DuplicateType(String),
    #[error("relationship {relationship:?} of {owner:?} references undeclared type {target:?}")]
    UnknownTarget {
        owner: String,
        relationship: String,
        target: String,
    },
}

/// Top-level description file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingFileV1 {
    pub version: u32,
    /// Unix seconds as string, or an ISO-8601 timestamp.
    pub generated_at: String,
    /// Path/locator of the run that produced this description.
    pub source: String,
    pub entity_types: Vec<EntityTypeV1>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityTypeV1 {
    /// Type identifier, optionally prefixed (`class:item`).
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default)]
    pub properties: Vec<PropertyV1>,
    #[serde(default)]
    pub relationships: Vec<RelationshipV1>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyV1 {
    pub name: String,
    #[serde(flatten)]
    pub source: ValueSourceV1,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueSourceV1 {
    Attribute { attribute: String },
    ChildText { child: String },
    OwnText,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipV1 {
    pub name: String,
    /// Tag of the child elements carrying the reference; defaults to the
    /// target's local name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_tag: Option<String>,
    /// Target type identifier, optionally prefixed (`class:tag`).
    pub target: String,
}

impl From<ValueSourceV1> for ValueSource {
    fn from(v: ValueSourceV1) -> Self {
        match v {
            ValueSourceV1::Attribute { attribute } => ValueSource::Attribute(attribute),
            ValueSourceV1::ChildText { child } => ValueSource::ChildText(child),
            ValueSourceV1::OwnText => ValueSource::OwnText,
        }
    }
}

impl From<&ValueSource> for ValueSourceV1 {
    fn from(v: &ValueSource) -> Self {
        match v {
            ValueSource::Attribute(attribute) => ValueSourceV1::Attribute {
                attribute: attribute.clone(),
            },
            ValueSource::ChildText(child) => ValueSourceV1::ChildText {
                child: child.clone(),
            },
            ValueSource::OwnText => ValueSourceV1::OwnText,
        }
    }
}

impl MappingFileV1 {
    pub fn parse_json(text: &str) -> Result<Self, DescriptionError> {
        let file: Self = serde_json::from_str(text)?;
        if file.version != MAPPING_VERSION_V1 {
            return Err(DescriptionError::UnsupportedVersion(file.version));
        }
        Ok(file)
    }

    pub fn to_json_pretty(&self) -> Result<String, DescriptionError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Render an in-memory mapping as a description file, with prefixed type
    /// identifiers.
    pub fn from_mapping(mapping: &Mapping, cfg: &UriConfig, source: &str, generated_at: &str) -> Self {
        let entity_types = mapping
            .types()
            .map(|t| EntityTypeV1 {
                id: cfg.prefixed_type_id(&t.name),
                selector: t.selector.clone(),
                properties: t
                    .properties
                    .iter()
                    .map(|p| PropertyV1 {
                        name: p.name.clone(),
                        source: (&p.source).into(),
                    })
                    .collect(),
                relationships: t
                    .relationships
                    .iter()
                    .map(|r| RelationshipV1 {
                        name: r.name.clone(),
                        child_tag: Some(r.child_tag.clone()),
                        target: cfg.prefixed_type_id(&r.target_name),
                    })
                    .collect(),
            })
            .collect();
        Self {
            version: MAPPING_VERSION_V1,
            generated_at: generated_at.to_string(),
            source: source.to_string(),
            entity_types,
        }
    }

    /// Build a [`Mapping`] from this description: strip prefixes, assign
    /// URIs, check that every relationship target is declared.
    pub fn into_mapping(self, cfg: &UriConfig) -> Result<Mapping, DescriptionError> {
        let declared: BTreeSet<String> = self
            .entity_types
            .iter()
            .map(|t| cfg.strip_type_prefix(&t.id).to_string())
            .collect();
        if declared.len() != self.entity_types.len() {
            // Find the offender for the error message.
            let mut seen = BTreeSet::new();
            for t in &self.entity_types {
                let local = cfg.strip_type_prefix(&t.id).to_string();
                if !seen.insert(local.clone()) {
                    return Err(DescriptionError::DuplicateType(local));
                }
            }
        }

        let mut mapping = Mapping::new();
        for decl in self.entity_types {
            let local = cfg.strip_type_prefix(&decl.id).to_string();
            let mut entity =
                EntityType::new(local.clone(), cfg.type_uri(&local), TypeOrigin::Declared);
            entity.selector = decl.selector;
            for p in decl.properties {
                entity.properties.push(PropertyMapping {
                    name: p.name,
                    source: p.source.into(),
                });
            }
            for r in decl.relationships {
                let target = cfg.strip_type_prefix(&r.target).to_string();
                if !declared.contains(&target) {
                    return Err(DescriptionError::UnknownTarget {
                        owner: local.clone(),
                        relationship: r.name,
                        target,
                    });
                }
                entity.relationships.push(RelationshipRef {
                    name: r.name,
                    child_tag: r.child_tag.unwrap_or_else(|| target.clone()),
                    target_uri: cfg.type_uri(&target),
                    target_name: target,
                });
            }
            // Locals are unique by the check above, so insertion cannot
            // collide.
            if mapping.insert_type(entity).is_err() {
                return Err(DescriptionError::DuplicateType(local));
            }
        }
        Ok(mapping)
    }
}
