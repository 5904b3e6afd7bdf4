//! Xylograph CLI
//!
//! Unified command-line interface for:
//! - Inferring mapping descriptions from XML sources (`infer`)
//! - Running the generation pipeline into a store directory (`generate`)
//! - Scoring a mapping against a ground-truth type list (`eval`)
//! - One-shot remote queries (`query`)
//! - Repairing malformed XML exports (`fixup`)
//! - Summarizing a store directory (`show`)

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

mod config;
mod fixup;
mod query;

use config::AppConfig;
use xylograph_gen::{GenerationContext, Pipeline, StageSelection};
use xylograph_ingest_xml::{infer_mapping, parse_file, XmlNode};
use xylograph_mapping::{parse_ground_truth, Accuracy, Mapping, MappingFileV1};
use xylograph_store::{local_name, PersistentStore, STORE_FILE};

#[derive(Parser)]
#[command(name = "xylograph")]
#[command(
    author,
    version,
    about = "Xylograph: mapping generation from XML into an RDF store"
)]
struct Cli {
    /// Properties file with run configuration (`key = value` lines)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Infer a mapping description from XML sources and write it as JSON.
    Infer {
        /// Input XML files or directories
        inputs: Vec<PathBuf>,
        /// Output mapping description JSON (stdout when omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// URI domain, e.g. http://example.org/kg
        #[arg(long)]
        domain: Option<String>,
    },

    /// Run the generation pipeline into a store directory.
    Generate {
        /// Input XML files or directories
        inputs: Vec<PathBuf>,
        /// Store directory (created on first use)
        #[arg(short, long)]
        store: Option<PathBuf>,
        /// Mapping description JSON to load instead of pure inference
        #[arg(short, long)]
        mapping: Option<PathBuf>,
        /// Also run inference on top of a loaded description
        #[arg(long)]
        infer: bool,
        /// Which stages to run
        #[arg(long, value_enum)]
        stages: Option<StageArg>,
        /// URI domain, e.g. http://example.org/kg
        #[arg(long)]
        domain: Option<String>,
    },

    /// Score a mapping description against a ground-truth type list.
    Eval {
        /// Mapping description JSON
        mapping: PathBuf,
        /// Ground-truth file: one expected type name per line
        truth: PathBuf,
        /// F-score beta weighting recall against precision
        #[arg(long, default_value_t = 1.0)]
        beta: f64,
    },

    /// POST a query to a remote endpoint and print the response body.
    Query {
        /// Endpoint URL
        endpoint: String,
        /// Query string
        query: String,
    },

    /// Strip BOM and leading junk so malformed XML exports parse.
    Fixup {
        /// Input file
        input: PathBuf,
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Print a summary of a store directory.
    Show {
        /// Store directory
        store: PathBuf,
    },
}

/// Stage selection as a command-line value.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum StageArg {
    /// Mapping inference only
    Inference,
    /// Schema pass only
    Schema,
    /// Data pass only
    Data,
    /// Schema then data
    Full,
}

impl From<StageArg> for StageSelection {
    fn from(arg: StageArg) -> Self {
        match arg {
            StageArg::Inference => StageSelection::InferenceOnly,
            StageArg::Schema => StageSelection::SchemaOnly,
            StageArg::Data => StageSelection::DataOnly,
            StageArg::Full => StageSelection::Full,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("xylograph=warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AppConfig::default(),
    };

    match cli.command {
        Commands::Infer {
            inputs,
            out,
            domain,
        } => cmd_infer(&config, &inputs, out.as_deref(), domain.as_deref()),
        Commands::Generate {
            inputs,
            store,
            mapping,
            infer,
            stages,
            domain,
        } => cmd_generate(
            &config,
            &inputs,
            store.as_deref(),
            mapping.as_deref(),
            infer,
            stages,
            domain.as_deref(),
        ),
        Commands::Eval {
            mapping,
            truth,
            beta,
        } => cmd_eval(&config, &mapping, &truth, beta),
        Commands::Query { endpoint, query } => {
            let body = query::run_query(&endpoint, &query)?;
            println!("{body}");
            Ok(())
        }
        Commands::Fixup { input, out } => cmd_fixup(&input, out.as_deref()),
        Commands::Show { store } => cmd_show(&store),
    }
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_infer(
    config: &AppConfig,
    inputs: &[PathBuf],
    out: Option<&Path>,
    domain: Option<&str>,
) -> Result<()> {
    let cfg = config.uri_config(domain)?;
    let documents = load_documents(inputs)?;
    println!(
        "{} {} document(s)",
        "Inferring from".green().bold(),
        documents.len()
    );

    let mut mapping = Mapping::new();
    let report = infer_mapping(&documents, &cfg, &mut mapping);
    for warning in &report.warnings {
        eprintln!("  {} {warning}", "warn:".yellow().bold());
    }
    if mapping.is_empty() {
        bail!("no entity types inferred from the given documents");
    }

    let source = inputs
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(",");
    let file = MappingFileV1::from_mapping(&mapping, &cfg, &source, &unix_timestamp());
    let json = file.to_json_pretty()?;
    match out {
        Some(path) => {
            fs::write(path, &json).with_context(|| format!("writing {}", path.display()))?;
            eprintln!(
                "{} {}",
                "wrote".green().bold(),
                path.display().to_string().bold()
            );
        }
        None => println!("{json}"),
    }
    println!(
        "  {} {} types, {} properties, {} relationships",
        "→".cyan(),
        mapping.len(),
        report.properties_added,
        report.relationships_added
    );
    Ok(())
}

fn cmd_generate(
    config: &AppConfig,
    inputs: &[PathBuf],
    store: Option<&Path>,
    mapping_path: Option<&Path>,
    infer: bool,
    stages: Option<StageArg>,
    domain: Option<&str>,
) -> Result<()> {
    let cfg = config.uri_config(domain)?;
    let store_dir = store
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.store.clone());
    let selection = stages.map(StageSelection::from).unwrap_or(config.stages);

    let mut ctx = GenerationContext::new(cfg);
    ctx.documents = load_documents(inputs)?;
    ctx.matcher = config.matcher;
    if let Some(path) = mapping_path {
        let text =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        ctx.description = Some(MappingFileV1::parse_json(&text)?);
        ctx.infer = infer;
    }
    ctx.store = Some(PersistentStore::open(&store_dir)?);

    println!(
        "{} {} document(s) into {}",
        "Generating".green().bold(),
        ctx.documents.len(),
        store_dir.display()
    );

    let mut pipeline = Pipeline::new(selection);
    let report = pipeline.run(&mut ctx)?;
    for (stage, outcome) in &report.stages {
        println!("  {} {stage}: {}", "→".cyan(), outcome.summary);
        for warning in &outcome.warnings {
            eprintln!("    {} {warning}", "warn:".yellow().bold());
        }
    }
    println!(
        "{} {} triples written, {} warning(s)",
        "ok".green().bold(),
        report.triples_written(),
        report.warning_count()
    );
    Ok(())
}

fn cmd_eval(config: &AppConfig, mapping: &Path, truth: &Path, beta: f64) -> Result<()> {
    let cfg = config.uri_config(None)?;
    let text =
        fs::read_to_string(mapping).with_context(|| format!("reading {}", mapping.display()))?;
    let file = MappingFileV1::parse_json(&text)?;
    let discovered: BTreeSet<String> = file
        .entity_types
        .iter()
        .map(|t| cfg.strip_type_prefix(&t.id).to_string())
        .collect();

    let ground_text =
        fs::read_to_string(truth).with_context(|| format!("reading {}", truth.display()))?;
    let ground = parse_ground_truth(&ground_text);

    let accuracy = Accuracy::measure(&discovered, &ground, beta);
    println!(
        "{} {} discovered vs {} expected ({} shared)",
        "Evaluating".green().bold(),
        discovered.len(),
        ground.len(),
        accuracy.intersection
    );
    println!("  {} precision {:.3}", "→".cyan(), accuracy.precision);
    println!("  {} recall    {:.3}", "→".cyan(), accuracy.recall);
    println!(
        "  {} f-score   {:.3} (beta = {})",
        "→".cyan(),
        accuracy.f_score,
        accuracy.beta
    );
    Ok(())
}

fn cmd_fixup(input: &Path, out: Option<&Path>) -> Result<()> {
    let raw =
        fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
    let (fixed, report) = fixup::fixup_xml(&raw)?;
    match out {
        Some(path) => {
            fs::write(path, &fixed).with_context(|| format!("writing {}", path.display()))?;
            eprintln!(
                "{} {}",
                "wrote".green().bold(),
                path.display().to_string().bold()
            );
        }
        None => print!("{fixed}"),
    }
    if report.bytes_stripped > 0 {
        eprintln!(
            "  {} stripped {} byte(s){}",
            "→".yellow(),
            report.bytes_stripped,
            if report.had_bom { " including a BOM" } else { "" }
        );
    }
    Ok(())
}

fn cmd_show(store_dir: &Path) -> Result<()> {
    let image = store_dir.join(STORE_FILE);
    if !image.exists() {
        bail!("no store image at {}", image.display());
    }
    let store = PersistentStore::open(store_dir)?;
    let s = store.store();

    println!("{} {}", "Store".green().bold(), store_dir.display());
    println!("  {} {} triples", "→".cyan(), s.len());
    let counts = s.type_counts();
    if counts.is_empty() {
        println!("  {} no typed subjects", "→".yellow());
    } else {
        println!("  {} instances by type:", "→".cyan());
        for (class, count) in counts {
            println!("    {count:>6}  {}", local_name(&class));
        }
    }
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Collect XML roots from files and directories. Unparseable files are
/// skipped with a notice; an empty result is an error.
fn load_documents(inputs: &[PathBuf]) -> Result<Vec<XmlNode>> {
    let mut files: Vec<PathBuf> = Vec::new();
    for input in inputs {
        if input.is_dir() {
            for entry in WalkDir::new(input).sort_by_file_name() {
                let entry = entry?;
                if entry.file_type().is_file()
                    && entry
                        .path()
                        .extension()
                        .is_some_and(|e| e.eq_ignore_ascii_case("xml"))
                {
                    files.push(entry.path().to_path_buf());
                }
            }
        } else {
            files.push(input.clone());
        }
    }
    if files.is_empty() {
        bail!("no input files given");
    }

    let mut documents = Vec::new();
    for file in &files {
        match parse_file(file) {
            Ok(root) => documents.push(root),
            Err(err) => eprintln!(
                "  {} {}: {err}",
                "skipped".yellow().bold(),
                file.display()
            ),
        }
    }
    if documents.is_empty() {
        bail!("none of the {} input file(s) parsed as XML", files.len());
    }
    Ok(documents)
}

fn unix_timestamp() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
