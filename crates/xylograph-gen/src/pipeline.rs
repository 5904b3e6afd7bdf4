//! Staged generation pipeline.
//!
//! A run is a statically ordered list of stages over one shared
//! [`GenerationContext`]:
//!
//! 1. **mapping** — load the declarative description (when given), run
//!    structural inference (when enabled), mark the mapping initialized;
//! 2. **schema** — emit type and property definitions in generation order;
//! 3. **data** — emit instances and relationships in the same order.
//!
//! Stage selection trims the tail of that list, never reorders it. Each
//! writing stage flushes the persistent store when it finishes, so a failed
//! run leaves the store populated up to the last completed stage. Any stage
//! error moves the pipeline to [`PipelineState::Failed`] and aborts the run.

use crate::emit::{generation_order, Emitter};
use crate::similarity::{JaroWinklerMatcher, LabelMatcher, NormalizedExactMatcher};
use anyhow::{bail, Context, Result};
use tracing::debug;
use xylograph_ingest_xml::{infer_mapping, XmlNode};
use xylograph_mapping::{Mapping, MappingFileV1, UriConfig};
use xylograph_store::PersistentStore;

// ============================================================================
// States and selection
// ============================================================================

/// Lifecycle of one pipeline instance. Advances only through completed
/// stages; any stage error lands in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Empty,
    Configured,
    MappingReady,
    SchemaGenerated,
    DataGenerated,
    Failed,
}

/// Which stages of the full run to execute. The mapping stage always runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageSelection {
    InferenceOnly,
    SchemaOnly,
    DataOnly,
    Full,
}

/// Label matcher choice, kept as plain data so it can come from config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatcherKind {
    Exact,
    JaroWinkler { threshold: f64 },
}

impl MatcherKind {
    pub fn build(&self) -> Box<dyn LabelMatcher> {
        match self {
            MatcherKind::Exact => Box::new(NormalizedExactMatcher),
            MatcherKind::JaroWinkler { threshold } => {
                Box::new(JaroWinklerMatcher::new(*threshold))
            }
        }
    }
}

impl Default for MatcherKind {
    fn default() -> Self {
        MatcherKind::Exact
    }
}

// ============================================================================
// Context and reports
// ============================================================================

/// Everything the stages read and write. The caller fills in sources and
/// configuration; the mapping and store are the products.
pub struct GenerationContext {
    pub cfg: UriConfig,
    pub documents: Vec<XmlNode>,
    /// Declarative description to seed the mapping with, consumed by the
    /// mapping stage.
    pub description: Option<MappingFileV1>,
    /// Run structural inference on top of whatever the description declared.
    pub infer: bool,
    pub matcher: MatcherKind,
    pub mapping: Mapping,
    pub store: Option<PersistentStore>,
}

impl GenerationContext {
    pub fn new(cfg: UriConfig) -> Self {
        Self {
            cfg,
            documents: Vec::new(),
            description: None,
            infer: true,
            matcher: MatcherKind::default(),
            mapping: Mapping::new(),
            store: None,
        }
    }
}

/// What one stage did, in caller-printable form.
#[derive(Debug, Default, Clone)]
pub struct StageReport {
    pub summary: String,
    pub triples_written: usize,
    pub entities_emitted: usize,
    pub warnings: Vec<String>,
}

/// Per-stage outcomes of a completed run, in execution order.
#[derive(Debug, Default, Clone)]
pub struct PipelineRunReport {
    pub stages: Vec<(&'static str, StageReport)>,
}

impl PipelineRunReport {
    pub fn warning_count(&self) -> usize {
        self.stages.iter().map(|(_, r)| r.warnings.len()).sum()
    }

    pub fn triples_written(&self) -> usize {
        self.stages.iter().map(|(_, r)| r.triples_written).sum()
    }
}

// ============================================================================
// Stages
// ============================================================================

trait GenerationStage {
    fn name(&self) -> &'static str;
    fn completes(&self) -> PipelineState;
    fn run(&self, ctx: &mut GenerationContext) -> Result<StageReport>;
}

struct MappingStage;

impl GenerationStage for MappingStage {
    fn name(&self) -> &'static str {
        "mapping"
    }

    fn completes(&self) -> PipelineState {
        PipelineState::MappingReady
    }

    fn run(&self, ctx: &mut GenerationContext) -> Result<StageReport> {
        let mut report = StageReport::default();
        if let Some(description) = ctx.description.take() {
            ctx.mapping = description
                .into_mapping(&ctx.cfg)
                .context("loading mapping description")?;
        }
        if ctx.infer {
            let walk = infer_mapping(&ctx.documents, &ctx.cfg, &mut ctx.mapping);
            report.warnings.extend(walk.warnings);
            report.summary = format!(
                "{} entity types ({} inferred, {} extended)",
                ctx.mapping.len(),
                walk.types_added,
                walk.types_extended
            );
        } else {
            report.summary = format!("{} entity types (declared)", ctx.mapping.len());
        }
        if ctx.mapping.is_empty() {
            bail!("mapping is empty: no description given and nothing inferred");
        }
        ctx.mapping.set_initialized();
        Ok(report)
    }
}

struct SchemaStage;

impl GenerationStage for SchemaStage {
    fn name(&self) -> &'static str {
        "schema"
    }

    fn completes(&self) -> PipelineState {
        PipelineState::SchemaGenerated
    }

    fn run(&self, ctx: &mut GenerationContext) -> Result<StageReport> {
        if !ctx.mapping.is_initialized() {
            bail!("mapping not initialized");
        }
        let order = generation_order(&ctx.mapping)?;
        let store = ctx
            .store
            .as_mut()
            .context("no store configured for schema generation")?;
        let emitter = Emitter::new(ctx.cfg.clone(), ctx.matcher.build());
        let emit = emitter.schema_pass(&ctx.mapping, &order, store.store_mut());
        store.flush().context("flushing store after schema pass")?;
        Ok(StageReport {
            summary: format!("{} schema triples", emit.triples_written),
            triples_written: emit.triples_written,
            entities_emitted: 0,
            warnings: emit.warnings,
        })
    }
}

struct DataStage;

impl GenerationStage for DataStage {
    fn name(&self) -> &'static str {
        "data"
    }

    fn completes(&self) -> PipelineState {
        PipelineState::DataGenerated
    }

    fn run(&self, ctx: &mut GenerationContext) -> Result<StageReport> {
        if !ctx.mapping.is_initialized() {
            bail!("mapping not initialized");
        }
        let order = generation_order(&ctx.mapping)?;
        let store = ctx
            .store
            .as_mut()
            .context("no store configured for data generation")?;
        let mut emitter = Emitter::new(ctx.cfg.clone(), ctx.matcher.build());
        // Accreting an existing store: recover its canonical entities first
        // so this run's identifier assignment lines up with earlier runs.
        emitter.preload_from_store(&ctx.mapping, store.store());
        let emit = emitter.data_pass(&ctx.mapping, &order, &ctx.documents, store.store_mut());
        store.flush().context("flushing store after data pass")?;
        Ok(StageReport {
            summary: format!(
                "{} data triples, {} entities",
                emit.triples_written, emit.entities_emitted
            ),
            triples_written: emit.triples_written,
            entities_emitted: emit.entities_emitted,
            warnings: emit.warnings,
        })
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Statically ordered stage runner. Built once per run from a selection,
/// then driven over a context.
pub struct Pipeline {
    stages: Vec<Box<dyn GenerationStage>>,
    state: PipelineState,
}

impl Pipeline {
    pub fn new(selection: StageSelection) -> Self {
        let mut stages: Vec<Box<dyn GenerationStage>> = vec![Box::new(MappingStage)];
        match selection {
            StageSelection::InferenceOnly => {}
            StageSelection::SchemaOnly => stages.push(Box::new(SchemaStage)),
            StageSelection::DataOnly => stages.push(Box::new(DataStage)),
            StageSelection::Full => {
                stages.push(Box::new(SchemaStage));
                stages.push(Box::new(DataStage));
            }
        }
        Self {
            stages,
            state: PipelineState::Empty,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Run every selected stage in order. The first stage error aborts the
    /// run and leaves the pipeline failed; the store keeps whatever the last
    /// completed stage flushed.
    pub fn run(&mut self, ctx: &mut GenerationContext) -> Result<PipelineRunReport> {
        self.state = PipelineState::Configured;
        let mut report = PipelineRunReport::default();
        for stage in &self.stages {
            debug!(target: "xylograph::pipeline", stage = stage.name(), "running stage");
            match stage.run(ctx) {
                Ok(stage_report) => {
                    self.state = stage.completes();
                    report.stages.push((stage.name(), stage_report));
                }
                Err(err) => {
                    self.state = PipelineState::Failed;
                    return Err(err.context(format!("stage `{}` failed", stage.name())));
                }
            }
        }
        Ok(report)
    }
}
