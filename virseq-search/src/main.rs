//! virseq - Sanger consensus assembly and remote homology search
//!
//! Subcommands:
//! - `assemble`: intake JSON → `consensus.json`
//! - `search`: `consensus.json` → `search_results.json`
//! - `run`: both, in one go
//! - `detect`: guess the F/R file-naming convention of an intake file
//! - `init-config`: write a config file with every default filled in

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use virseq_assembly::naming::detect_style;
use virseq_assembly::{group_reads, AssemblySession, ConsensusBuilder, IntakeFile};
use virseq_common::config::{
    default_config_path, load_config, write_toml_config, PatternStyle, SearchMode, SearchProgram,
    TomlConfig,
};
use virseq_common::{ConsensusRecord, SearchResult, SearchStatus};
use virseq_search::{
    DispatchSettings, NcbiBlastClient, ProgressTracker, QueryParameters, SearchDispatcher,
};

const CONSENSUS_FILE: &str = "consensus.json";
const RESULTS_FILE: &str = "search_results.json";
const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "virseq")]
#[command(about = "Sanger read consensus assembly and remote homology search")]
#[command(version)]
struct Cli {
    /// Config file (overrides VIRSEQ_CONFIG and the default location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is not set
    #[arg(long, global = true, env = "VIRSEQ_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct AssembleArgs {
    /// Intake JSON with decoded reads, manual edits and quality labels
    #[arg(short, long)]
    input: PathBuf,

    /// Virus type for builtin primers (Hanta, Corona, Paramyxo, Flavi, Other)
    #[arg(long, env = "VIRSEQ_VIRUS_TYPE")]
    virus_type: Option<String>,

    /// File naming style (standard, virus_suffix, virus_embedded, custom)
    #[arg(long, value_parser = parse_lowercase::<PatternStyle>)]
    style: Option<PatternStyle>,

    /// Disable primer trimming
    #[arg(long)]
    no_trim: bool,
}

#[derive(clap::Args, Debug)]
struct SearchArgs {
    /// Search program (auto, blastn, megablast, blastx)
    #[arg(long, value_parser = parse_lowercase::<SearchProgram>)]
    program: Option<SearchProgram>,

    /// Target corpus (viruses, all)
    #[arg(long, value_parser = parse_lowercase::<SearchMode>)]
    mode: Option<SearchMode>,

    /// Records per remote request
    #[arg(long)]
    batch_size: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build consensus sequences from an intake file
    Assemble {
        #[command(flatten)]
        assembly: AssembleArgs,

        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Search previously assembled consensus sequences
    Search {
        /// consensus.json written by `assemble`
        #[arg(short, long)]
        input: PathBuf,

        #[command(flatten)]
        search: SearchArgs,

        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Assemble, then search the resulting consensus sequences
    Run {
        #[command(flatten)]
        assembly: AssembleArgs,

        #[command(flatten)]
        search: SearchArgs,

        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Report the F/R naming convention found in an intake file
    Detect {
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Write a config file populated with defaults
    InitConfig {
        /// Target path (defaults to the user config location)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

fn parse_lowercase<T: DeserializeOwned>(value: &str) -> std::result::Result<T, String> {
    serde_json::from_value(serde_json::Value::String(value.to_lowercase()))
        .map_err(|_| format!("unrecognized value '{}'", value))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting virseq v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Assemble {
            assembly,
            output_dir,
        } => {
            apply_assembly_args(&mut config, &assembly);
            let records = assemble(&config, &assembly.input)?;
            write_json(&output_dir, CONSENSUS_FILE, &records)?;
        }
        Command::Search {
            input,
            search: search_args,
            output_dir,
        } => {
            apply_search_args(&mut config, &search_args);
            let text = std::fs::read_to_string(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let records: Vec<ConsensusRecord> = serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse {}", input.display()))?;
            let results = search(&config, &records).await?;
            write_json(&output_dir, RESULTS_FILE, &results)?;
        }
        Command::Run {
            assembly,
            search: search_args,
            output_dir,
        } => {
            apply_assembly_args(&mut config, &assembly);
            apply_search_args(&mut config, &search_args);
            let records = assemble(&config, &assembly.input)?;
            write_json(&output_dir, CONSENSUS_FILE, &records)?;
            if records.is_empty() {
                warn!("No consensus sequences to search");
            } else {
                let results = search(&config, &records).await?;
                write_json(&output_dir, RESULTS_FILE, &results)?;
            }
        }
        Command::Detect { input } => {
            let intake = IntakeFile::load(&input)
                .with_context(|| format!("Failed to load intake file {}", input.display()))?;
            let names: Vec<&str> = intake.reads.iter().map(|r| r.filename.as_str()).collect();
            let detection = detect_style(&names);
            println!(
                "{}",
                serde_json::to_string_pretty(&detection).context("Failed to encode detection")?
            );
        }
        Command::InitConfig { path } => {
            let path = match path.or_else(default_config_path) {
                Some(path) => path,
                None => anyhow::bail!("No config directory available; pass --path"),
            };
            write_toml_config(&TomlConfig::default(), &path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Default configuration written to {}", path.display());
        }
    }

    Ok(())
}

fn apply_assembly_args(config: &mut TomlConfig, args: &AssembleArgs) {
    if let Some(virus_type) = &args.virus_type {
        config.assembly.virus_type = virus_type.clone();
    }
    if let Some(style) = args.style {
        config.naming.style = style;
    }
    if args.no_trim {
        config.assembly.trimming.enabled = false;
    }
}

fn apply_search_args(config: &mut TomlConfig, args: &SearchArgs) {
    if let Some(program) = args.program {
        config.search.program = program;
    }
    if let Some(mode) = args.mode {
        config.search.mode = mode;
    }
    if let Some(batch_size) = args.batch_size {
        config.search.batch_size = batch_size;
    }
}

fn assemble(config: &TomlConfig, input: &Path) -> Result<Vec<ConsensusRecord>> {
    let intake = IntakeFile::load(input)
        .with_context(|| format!("Failed to load intake file {}", input.display()))?;

    let grouped = group_reads(&intake.reads, &config.naming);
    for advisory in &grouped.advisories {
        warn!("{}", advisory);
    }

    let session = AssemblySession::new(ConsensusBuilder::from_config(&config.assembly));
    let report = session.run(&grouped.groups, &intake.edits, &intake.quality_labels);

    for assessment in &report.assessments {
        if assessment.likely_swapped {
            warn!("{}", assessment.advisory);
        } else {
            info!("{}", assessment.advisory);
        }
    }
    info!("{}", report.summary());

    Ok(report.records)
}

async fn search(config: &TomlConfig, records: &[ConsensusRecord]) -> Result<Vec<SearchResult>> {
    let client = NcbiBlastClient::from_config(&config.search)
        .context("Failed to create search client")?;
    let progress = Arc::new(ProgressTracker::new());
    let dispatcher = SearchDispatcher::new(
        Arc::new(client),
        Arc::clone(&progress),
        QueryParameters::from_config(&config.search),
        DispatchSettings::from_config(&config.search),
    );

    // Ctrl+C stops the run at the next checkpoint
    let cancel_progress = Arc::clone(&progress);
    let cancel_task = tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            cancel_progress.request_cancel();
            let state = cancel_progress.snapshot();
            info!(
                completed = state.completed,
                total = state.total,
                "Received Ctrl+C, cancelling search run"
            );
        }
    });

    let monitor_progress = Arc::clone(&progress);
    let monitor_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(PROGRESS_LOG_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            let state = monitor_progress.snapshot();
            info!(
                completed = state.completed,
                total = state.total,
                status = ?state.status,
                "Search progress"
            );
        }
    });

    let results = dispatcher.dispatch(records).await;
    cancel_task.abort();
    monitor_task.abort();

    let count = |status: SearchStatus| results.iter().filter(|r| r.status == status).count();
    info!(
        success = count(SearchStatus::Success),
        no_hits = count(SearchStatus::NoHits),
        failed = count(SearchStatus::Failed),
        cancelled = count(SearchStatus::Cancelled),
        "Search results ready"
    );
    Ok(results)
}

fn write_json<T: Serialize + ?Sized>(dir: &Path, file_name: &str, value: &T) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    let path = dir.join(file_name);
    let json = serde_json::to_string_pretty(value).context("Failed to encode JSON")?;
    std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote {}", path.display());
    Ok(())
}
