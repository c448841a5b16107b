//! ticker-sentiment CLI: run the pipeline stages one at a time or end to end.
//!
//! Commands:
//! - `ingest`   fetch sources into the record store
//! - `tag`      tag stored items with sentiment + tickers
//! - `prices`   snapshot prices for every tagged ticker
//! - `features` join sentiment and prices into the feature table
//! - `label`    attach ground-truth or weak labels for training
//! - `run`      all of the above, in order

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use ticker_sentiment_pipeline::config::PipelineConfig;
use ticker_sentiment_pipeline::error::PipelineError;
use ticker_sentiment_pipeline::ingest::types::Source;
use ticker_sentiment_pipeline::pipeline;
use ticker_sentiment_pipeline::store::SqliteRecordStore;
use ticker_sentiment_pipeline::telemetry;

#[derive(Parser)]
#[command(
    name = "ticker-sentiment",
    about = "Sentiment/ticker tagging and feature pipeline for market text"
)]
struct Cli {
    /// Path to a TOML config. Defaults to $PIPELINE_CONFIG_PATH, then config/pipeline.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch sources and upsert them into the record store.
    Ingest {
        /// Sources to fetch (news, reddit, twitter). Defaults to all.
        #[arg(long = "source", value_delimiter = ',')]
        sources: Vec<Source>,
    },
    /// Tag stored items and write the enriched artifacts.
    Tag {
        /// Sources to tag. Defaults to all.
        #[arg(long = "source", value_delimiter = ',')]
        sources: Vec<Source>,
    },
    /// Fetch the latest price for every ticker found in the enriched artifacts.
    Prices,
    /// Build the feature table from enriched artifacts and the price snapshot.
    Features,
    /// Build the training table (ground-truth labels if present, weak labels otherwise).
    Label {
        /// Feature table to read. Defaults to the configured features path.
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Run every stage in order.
    Run {
        #[arg(long = "source", value_delimiter = ',')]
        sources: Vec<Source>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    telemetry::init_tracing(cli.log_json);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            // Stage hard stops get a one-line diagnostic, everything else the full chain.
            match e.downcast_ref::<PipelineError>() {
                Some(pe) if pe.is_hard_stop() => eprintln!("error: {pe}"),
                _ => eprintln!("error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let cfg = match &cli.config {
        Some(p) => PipelineConfig::load_from(p)?,
        None => PipelineConfig::load_default()?,
    };
    let metrics = match telemetry::install_metrics() {
        Ok(h) => Some(h),
        Err(e) => {
            tracing::warn!(error = %e, "metrics recorder not installed");
            None
        }
    };

    let code = match cli.command {
        Commands::Ingest { sources } => cmd_ingest(&cfg, &or_all(sources)).await?,
        Commands::Tag { sources } => {
            cmd_tag(&cfg, &or_all(sources)).await?;
            ExitCode::SUCCESS
        }
        Commands::Prices => {
            cmd_prices(&cfg).await?;
            ExitCode::SUCCESS
        }
        Commands::Features => {
            cmd_features(&cfg)?;
            ExitCode::SUCCESS
        }
        Commands::Label { input } => {
            cmd_label(&cfg, input)?;
            ExitCode::SUCCESS
        }
        Commands::Run { sources } => {
            let sources = or_all(sources);
            // A failed source leaves earlier data valid; later stages still run.
            let ingest_code = cmd_ingest(&cfg, &sources).await?;
            cmd_tag(&cfg, &sources).await?;
            cmd_prices(&cfg).await?;
            cmd_features(&cfg)?;
            cmd_label(&cfg, None)?;
            ingest_code
        }
    };

    if let (Some(h), Some(path)) = (metrics.as_ref(), cfg.telemetry.metrics_path.as_ref()) {
        if let Err(e) = telemetry::write_metrics_snapshot(h, path) {
            tracing::warn!(error = %e, "metrics snapshot not written");
        }
    }
    Ok(code)
}

fn or_all(sources: Vec<Source>) -> Vec<Source> {
    if sources.is_empty() {
        Source::ALL.to_vec()
    } else {
        sources
    }
}

fn open_store(cfg: &PipelineConfig) -> Result<SqliteRecordStore> {
    SqliteRecordStore::open(&cfg.storage.database)
        .with_context(|| format!("opening record store {}", cfg.storage.database.display()))
}

async fn cmd_ingest(cfg: &PipelineConfig, sources: &[Source]) -> Result<ExitCode> {
    let store = open_store(cfg)?;
    let mut failed = 0usize;
    for &source in sources {
        match pipeline::ingest_source(cfg, &store, source).await {
            Ok(r) => println!(
                "{source}: fetched {}, stored {}, skipped {}",
                r.fetched, r.stored, r.skipped
            ),
            Err(e) => {
                failed += 1;
                eprintln!("{source}: ingest failed: {e}");
            }
        }
    }
    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn cmd_tag(cfg: &PipelineConfig, sources: &[Source]) -> Result<()> {
    let store = open_store(cfg)?;
    let tagger = pipeline::build_tagger(cfg)?;
    for &source in sources {
        let out = cfg.storage.enriched_path(source);
        let fields = cfg.tagger.text_fields.for_source(source);
        let batch = pipeline::tag_source(&tagger, &store, source, fields, &out).await?;
        println!(
            "{source}: tagged {} ({} parsed, {} degraded to neutral) -> {}",
            batch.items.len(),
            batch.parsed(),
            batch.degraded,
            out.display()
        );
    }
    Ok(())
}

async fn cmd_prices(cfg: &PipelineConfig) -> Result<()> {
    let source = pipeline::build_price_source(cfg)?;
    let out = cfg.storage.prices_path();
    let book = pipeline::refresh_prices(&source, &pipeline::enriched_paths(cfg), &out).await?;
    if book.is_empty() {
        println!("prices: no tickers priced, snapshot not updated");
    } else {
        println!("prices: {} tickers -> {}", book.len(), out.display());
    }
    Ok(())
}

fn cmd_features(cfg: &PipelineConfig) -> Result<()> {
    let out = &cfg.storage.features_path;
    let rows = pipeline::build_features(
        &pipeline::enriched_paths(cfg),
        &cfg.storage.prices_path(),
        out,
    )?;
    println!("features: {} rows -> {}", rows.len(), out.display());
    Ok(())
}

fn cmd_label(cfg: &PipelineConfig, input: Option<PathBuf>) -> Result<()> {
    let input = input.unwrap_or_else(|| cfg.storage.features_path.clone());
    let out = &cfg.storage.training_path;
    let table = pipeline::build_training(&input, &cfg.labels, out)?;
    println!(
        "labels: {} rows ({:?}) -> {}",
        table.rows.len(),
        table.label_source,
        out.display()
    );
    Ok(())
}
