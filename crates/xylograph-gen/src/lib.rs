//! Generation engine for Xylograph
//!
//! Turns an initialized mapping plus parsed documents into schema and data
//! triples:
//!
//! - `graph` — dependency resolution over entity types, so relationship
//!   targets are always generated before their owners;
//! - `similarity` — label normalization and pluggable matchers;
//! - `reconcile` — canonical entity identity per type;
//! - `emit` — the schema and data emission passes;
//! - `pipeline` — staged orchestration with per-stage store flushes.

pub mod emit;
pub mod graph;
pub mod pipeline;
pub mod reconcile;
pub mod similarity;

pub use emit::{generation_order, EmitReport, Emitter};
pub use graph::{CycleError, DependencyGraph};
pub use pipeline::{
    GenerationContext, MatcherKind, Pipeline, PipelineRunReport, PipelineState, StageReport,
    StageSelection,
};
pub use reconcile::{CanonicalEntity, Reconciler};
pub use similarity::{normalize_label, JaroWinklerMatcher, LabelMatcher, NormalizedExactMatcher};
