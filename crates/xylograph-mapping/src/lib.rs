//! Xylograph mapping model
//!
//! This crate defines the shared vocabulary of the generation engine:
//!
//! - the in-memory [`Mapping`] of entity types, properties and relationships
//!   (`model`), populated by structural inference or by deserializing a
//!   declarative description,
//! - the versioned on-disk description format (`description`),
//! - URI derivation and validation (`uri`),
//! - accuracy scoring against a ground-truth type list (`eval`).
//!
//! Everything here is plain data: no I/O beyond (de)serialization helpers,
//! no store access, no tree walking.

pub mod description;
pub mod eval;
pub mod model;
pub mod uri;

pub use description::{DescriptionError, MappingFileV1, MAPPING_VERSION_V1};
pub use eval::{parse_ground_truth, Accuracy};
pub use model::{
    EntityType, Mapping, ModelError, PropertyMapping, RelationshipRef, TypeOrigin, ValueSource,
};
pub use uri::{ConfigError, UriConfig};
