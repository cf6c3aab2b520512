//! graphweld pipeline CLI.
//!
//! Runs the dataset curation pipeline end to end, a selected subset of
//! phases, a resumed session, or a standalone projection pass.
//!
//! ## Configuration
//!
//! Invocation paths may come from flags or from an optional JSON config
//! file (default `graphweld.json`). Environment variables:
//! - `RUST_LOG`: log level filter (default: info)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development
//!   (default: pretty)
//!
//! ## Usage
//!
//! ```bash
//! graphweld run --microblog /data/microblog --crawl /data/crawl --output /data/out
//! graphweld phases 2 3.1 --output /data/out ...
//! graphweld resume /data/out/session.json
//! graphweld project /data/crawl/social_graph.zip uid_labels.txt.gz edges.txt.gz
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use graphweld::{
    EdgeProjector, FileConfig, PhaseRequest, Pipeline, RunReport, SessionArgs,
    DEFAULT_CONFIG_FILE,
};

#[derive(Parser)]
#[command(name = "graphweld")]
#[command(about = "Curate a social-graph dataset from a microblog export and a network crawl", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Microblog export directory
    #[arg(long, global = true)]
    microblog: Option<PathBuf>,

    /// Network crawl directory
    #[arg(long, global = true)]
    crawl: Option<PathBuf>,

    /// Output directory
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline
    Run,

    /// Run selected phases and subphases (e.g. `2 3.1`, or `all`)
    Phases {
        /// Phase tokens to run
        #[arg(required = true)]
        tokens: Vec<String>,
    },

    /// Resume an interrupted run from its session file
    Resume {
        /// Path to the persisted session file
        session_file: PathBuf,
    },

    /// Project an edge archive against a membership source, standalone
    Project {
        /// Zip archive holding the edge list
        archive: PathBuf,
        /// Gzip membership source (`<id> <flag>` per line)
        membership: PathBuf,
        /// Gzip destination path for the projected edge list
        dest: PathBuf,
    },
}

/// Initialize the tracing subscriber with JSON or pretty format
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "graphweld=info".into());

    if log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .flatten_event(true),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .init();
    }
}

fn resolve_args(cli: &Cli) -> anyhow::Result<SessionArgs> {
    let config = FileConfig::load(&cli.config)
        .with_context(|| format!("loading config file {}", cli.config.display()))?;
    SessionArgs::resolve(
        cli.microblog.clone(),
        cli.crawl.clone(),
        cli.output.clone(),
        &config,
    )
    .context("resolving invocation parameters")
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let version = env!("CARGO_PKG_VERSION");
    info!(version, "graphweld starting");

    match &cli.command {
        Commands::Run => {
            let args = resolve_args(&cli)?;
            let summary = Pipeline::new(args, PhaseRequest::All).run()?;
            info!(
                transferred = summary.transferred,
                skipped = summary.skipped,
                "run finished"
            );
        }
        Commands::Phases { tokens } => {
            let requested = PhaseRequest::parse(tokens)?;
            let args = resolve_args(&cli)?;
            let summary = Pipeline::new(args, requested).run()?;
            info!(
                transferred = summary.transferred,
                skipped = summary.skipped,
                "run finished"
            );
        }
        Commands::Resume { session_file } => {
            let summary = Pipeline::resume(session_file)?.run()?;
            info!(
                transferred = summary.transferred,
                skipped = summary.skipped,
                "resumed run finished"
            );
        }
        Commands::Project {
            archive,
            membership,
            dest,
        } => {
            let projector = EdgeProjector::with_defaults();
            let mut report = RunReport::disabled();
            let summary = projector.project(archive, membership, dest, &mut report)?;
            info!(
                edges_kept = summary.edges_kept,
                edges_thrown = summary.edges_thrown,
                parse_failures = summary.parse_failures,
                "projection finished"
            );
        }
    }
    Ok(())
}
