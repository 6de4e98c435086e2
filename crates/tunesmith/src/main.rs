//! Tunesmith CLI.
//!
//! Usage:
//!     tunesmith train --kind lora --config-ref configs/base.yaml --count 2
//!     tunesmith dataset --corpus corpus.jsonl --query "Verwaltungsrecht" \
//!         --top-k 500 --min-quality 0.7 --format jsonl,csv

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tunesmith::{AnonymousIdentity, Orchestrator};
use tunesmith_dataset::StaticBackend;
use tunesmith_logging::init_logging;
use tunesmith_protocol::api_types::{CreateDatasetRequest, SubmitJobRequest};
use tunesmith_protocol::{
    DatasetState, ExportFormat, JobState, OrchestratorConfig, SearchQuery, TrainerKind,
};
use tunesmith_trainer::SimulatedTrainer;

#[derive(Parser, Debug)]
#[command(name = "tunesmith", about = "Training-job orchestration service")]
struct Cli {
    /// Mirror the full log filter to stderr.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit training jobs to the simulated trainer and tail progress.
    Train {
        /// Trainer kind: lora | qlora | continuous
        #[arg(long, default_value = "lora")]
        kind: String,

        /// Configuration reference passed to the trainer.
        #[arg(long, default_value = "configs/base.yaml")]
        config_ref: String,

        /// Dataset reference passed to the trainer.
        #[arg(long)]
        dataset_ref: Option<String>,

        /// How many jobs to submit.
        #[arg(long, default_value_t = 1)]
        count: usize,

        /// Simulated epochs per job.
        #[arg(long, default_value_t = 3)]
        epochs: u32,
    },

    /// Build a training dataset from a JSONL corpus file.
    Dataset {
        /// JSONL file of scored documents serving as the search corpus.
        #[arg(long)]
        corpus: PathBuf,

        /// Search query text.
        #[arg(long)]
        query: String,

        /// Maximum number of documents.
        #[arg(long, default_value_t = 1000)]
        top_k: usize,

        /// Minimum quality score in [0, 1].
        #[arg(long)]
        min_quality: Option<f64>,

        /// Export formats (comma-separated): jsonl, json, csv, parquet.
        #[arg(long = "format", value_delimiter = ',', default_value = "jsonl")]
        formats: Vec<String>,

        /// Where to place export files (default: configured export root).
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    match cli.command {
        Command::Train {
            kind,
            config_ref,
            dataset_ref,
            count,
            epochs,
        } => run_train(kind, config_ref, dataset_ref, count, epochs).await,
        Command::Dataset {
            corpus,
            query,
            top_k,
            min_quality,
            formats,
            output_dir,
        } => run_dataset(corpus, query, top_k, min_quality, formats, output_dir).await,
    }
}

async fn run_train(
    kind: String,
    config_ref: String,
    dataset_ref: Option<String>,
    count: usize,
    epochs: u32,
) -> Result<()> {
    let kind: TrainerKind = kind
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid_kind: {}", e))?;
    if count == 0 {
        bail!("--count must be >= 1");
    }

    let config = OrchestratorConfig::from_env().context("Invalid configuration")?;
    let orchestrator = Orchestrator::bootstrap(
        config,
        Arc::new(SimulatedTrainer::new(epochs, Duration::from_millis(200))),
        Arc::new(StaticBackend::new(Vec::new())),
        Arc::new(AnonymousIdentity),
    )?;
    orchestrator.start()?;

    let mut subscription = orchestrator.subscribe_jobs();
    let mut pending = std::collections::HashSet::new();
    for i in 0..count {
        let job = orchestrator
            .submit_job(SubmitJobRequest {
                kind,
                config_ref: config_ref.clone(),
                dataset_ref: dataset_ref.clone(),
                priority: 0,
                tags: vec![format!("cli-{}", i)],
            })
            .await?;
        println!("submitted {} ({})", job.id, job.kind);
        pending.insert(job.id.clone());
    }

    while !pending.is_empty() {
        let Some(event) = subscription.events.recv().await else {
            bail!("event stream closed before all jobs finished");
        };
        match event.state {
            JobState::Running => println!(
                "{} running: epoch {}/{} ({:.0}%)",
                event.job_id,
                event.progress.current_epoch,
                event.progress.total_epochs,
                event.progress.percent
            ),
            JobState::Completed | JobState::Failed | JobState::Cancelled => {
                println!("{} {}", event.job_id, event.state);
                pending.remove(&event.job_id);
            }
            _ => {}
        }
    }

    for job in orchestrator.list_jobs(None, None)?.jobs {
        if let Some(artifact) = &job.artifact_ref {
            println!("{} adapter: {}", job.id, artifact);
        }
        if let Some(error) = &job.error {
            println!("{} error: {}", job.id, error);
        }
    }

    orchestrator.stop().await;
    Ok(())
}

async fn run_dataset(
    corpus: PathBuf,
    query_text: String,
    top_k: usize,
    min_quality: Option<f64>,
    formats: Vec<String>,
    output_dir: Option<PathBuf>,
) -> Result<()> {
    let mut export_formats = Vec::new();
    for raw in &formats {
        let format: ExportFormat = raw
            .parse()
            .map_err(|e| anyhow::anyhow!("unsupported_format: {}", e))?;
        export_formats.push(format);
    }

    let mut config = OrchestratorConfig::from_env().context("Invalid configuration")?;
    if let Some(dir) = output_dir {
        config.export_root = dir;
    }

    let backend =
        StaticBackend::from_jsonl_file(&corpus).context("Failed to load corpus file")?;
    let orchestrator = Orchestrator::bootstrap(
        config,
        Arc::new(SimulatedTrainer::default()),
        Arc::new(backend),
        Arc::new(AnonymousIdentity),
    )?;

    // Subscribe before launching so the live tail cannot miss the
    // terminal event.
    let mut events = orchestrator.subscribe_datasets();

    let record = orchestrator.create_dataset(
        CreateDatasetRequest {
            name: corpus
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("dataset")
                .to_string(),
            description: format!("built from {}", corpus.display()),
            query: SearchQuery {
                min_quality_score: min_quality,
                ..SearchQuery::new(query_text, top_k)
            },
            export_formats,
        },
        None,
    )?;
    println!("dataset {} created, building...", record.id);

    let done = loop {
        let Some(event) = events.events.recv().await else {
            bail!("event stream closed before the build finished");
        };
        if event.dataset_id == record.id && event.state.is_terminal() {
            break orchestrator.get_dataset(&record.id)?;
        }
    };

    match done.state {
        DatasetState::Completed => {
            let stats = done.stats.unwrap_or_default();
            println!(
                "completed: {} documents, {} tokens, avg quality {:.3}",
                stats.document_count, stats.total_tokens, stats.avg_quality_score
            );
            for (format, path) in &done.export_paths {
                println!("  {}: {}", format, path.display());
            }
            Ok(())
        }
        _ => bail!(
            "dataset build failed: {}",
            done.error.unwrap_or_else(|| "unknown error".to_string())
        ),
    }
}
