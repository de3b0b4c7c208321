use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use ev_analytics::analytics::VehicleAnalytics;
use ev_analytics::config::Config;
use ev_analytics::logging;
use ev_analytics::metrics;
use ev_analytics::pipeline::{CsvSource, IngestionPipeline, PipelineOptions, RunOutcome, VehicleStore};
use ev_analytics::server::{self, AppState};

/// Errors printed after a load
const PRINTED_ERRORS: usize = 5;

#[derive(Parser)]
#[command(name = "ev_analytics")]
#[command(about = "Electric vehicle registration ETL pipeline and analytics API")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the ETL pipeline once
    Load {
        /// Drop existing documents and indexes first
        #[arg(long)]
        drop_existing: bool,
        /// Read this local CSV instead of the configured source
        #[arg(long, conflicts_with = "url")]
        csv: Option<PathBuf>,
        /// Fetch the CSV from this URL instead of the configured source
        #[arg(long)]
        url: Option<String>,
        /// Write the quality report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Serve the analytics API
    Serve {
        /// Override the configured port
        #[arg(long)]
        port: Option<u16>,
        /// Run the pipeline before serving
        #[arg(long)]
        load: bool,
    },
}

async fn run_load(
    store: Arc<dyn VehicleStore>,
    source: &CsvSource,
    options: PipelineOptions,
) -> anyhow::Result<RunOutcome> {
    let outcome = IngestionPipeline::new(store, options)
        .run(source)
        .await
        .with_context(|| format!("pipeline failed for {}", source))?;
    print_outcome(&outcome);
    Ok(outcome)
}

fn print_outcome(outcome: &RunOutcome) {
    let report = &outcome.report;
    println!("\n📊 Pipeline Results:");
    println!("   Total records: {}", report.total_records);
    println!("   Valid: {}", report.valid_records);
    println!("   Invalid: {}", report.invalid_records);
    println!("   Acceptance rate: {:.2}%", report.acceptance_rate() * 100.0);
    println!("   Inserted: {}", outcome.load.inserted);
    println!("   Write failures: {}", outcome.load.failed);

    if !report.validation_errors.is_empty() {
        println!("\n   First validation errors:");
        for err in report.validation_errors.iter().take(PRINTED_ERRORS) {
            println!("     [{}] {}: {}", err.record_index, err.vin, err.error);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    let _guard = logging::init_logging(&config.logging.log_dir);

    if let Some(addr) = config.metrics_addr()? {
        metrics::init_metrics(addr);
    }

    let cli = Cli::parse();
    let store = config.open_store().context("failed to open store")?;
    let options = PipelineOptions {
        batch_size: config.pipeline.batch_size,
        drop_existing: false,
    };

    match cli.command {
        Commands::Load {
            drop_existing,
            csv,
            url,
            report,
        } => {
            let source = match (csv, url) {
                (Some(path), _) => CsvSource::Local(path),
                (None, Some(url)) => CsvSource::Remote(url),
                (None, None) => config.csv_source()?,
            };
            let options = PipelineOptions {
                drop_existing,
                ..options
            };

            let outcome = match run_load(store, &source, options).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("{:#}", e);
                    return Err(e);
                }
            };

            if let Some(path) = report {
                let json = serde_json::to_string_pretty(&outcome.report)?;
                std::fs::write(&path, json)
                    .with_context(|| format!("failed to write report to {}", path.display()))?;
                info!("Quality report written to {}", path.display());
            }
        }
        Commands::Serve { port, load } => {
            let source = config.csv_source()?;
            if load {
                run_load(store.clone(), &source, options.clone()).await?;
            }

            let mut addr = config.api_addr()?;
            if let Some(port) = port {
                addr.set_port(port);
            }

            let state = AppState {
                analytics: VehicleAnalytics::new(store),
                source,
                batch_size: config.pipeline.batch_size,
            };
            server::start_server(state, addr).await?;
        }
    }

    Ok(())
}
