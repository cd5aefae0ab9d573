use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use ride_ingest::app::ports::{AlertChannel, EventPublisher};
use ride_ingest::config::Config;
use ride_ingest::infra::{
    HttpAlertChannel, HttpEventPublisher, LineSourceOptions, LineStreamSource, LogAlertChannel, LogEventPublisher,
    OffsetStore, SqliteStagingStore,
};
use ride_ingest::logging;
use ride_ingest::parser::parse_line;
use ride_ingest::pipeline::heart_rate::{assess_for_rider, Clock, SystemClock};
use ride_ingest::pipeline::{Collaborators, IngestLoop, LoopExit, LoopSettings};

#[derive(Parser)]
#[command(name = "ride_ingest")]
#[command(about = "Exercise-bike log ingestion and heart-rate safety monitoring")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to a TOML config file (defaults to ./config.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume one or more log streams; each input runs as an independent loop
    Run {
        /// Input files, or "-" for stdin
        #[arg(required = true)]
        inputs: Vec<String>,
        /// Keep polling at end of input
        #[arg(long)]
        follow: bool,
    },
    /// Parse a single log line and print the resulting event
    Parse { line: String },
    /// Print the safe heart-rate band for a date of birth
    HeartRate {
        #[arg(long)]
        dob: NaiveDate,
        #[arg(long)]
        bpm: u32,
    },
    /// List the operational metrics this service exports
    Metrics,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    let _log_guard = logging::init_logging(&config.runtime.log_dir);

    match cli.command {
        Commands::Run { inputs, follow } => run(config, inputs, follow).await,
        Commands::Parse { line } => {
            let event = parse_line(&line)?;
            println!("{}", serde_json::to_string_pretty(&event)?);
            Ok(())
        }
        Commands::HeartRate { dob, bpm } => {
            let assessment = assess_for_rider(dob, bpm, SystemClock.today());
            println!("{}", serde_json::to_string_pretty(&assessment)?);
            Ok(())
        }
        Commands::Metrics => {
            for (phase, docs) in ride_ingest::metrics::phase_documentation() {
                println!("[{}]", phase);
                for doc in docs {
                    println!("  {} ({:?}) {}", doc.name, doc.metric_type, doc.help);
                    if !doc.labels.is_empty() {
                        println!("    labels: {}", doc.labels.join(", "));
                    }
                }
            }
            Ok(())
        }
    }
}

fn build_collaborators(config: &Config) -> anyhow::Result<Collaborators> {
    let timeout = config.collaborator_timeout();
    let staging = SqliteStagingStore::open(&config.staging.db_path)
        .with_context(|| format!("opening staging store {}", config.staging.db_path.display()))?;

    let alerts: Arc<dyn AlertChannel> = match &config.alerts.endpoint {
        Some(endpoint) => Arc::new(HttpAlertChannel::new(endpoint, &config.alerts.sender_address, timeout)?),
        None => {
            warn!("No alert endpoint configured; heart rate alerts will only be logged");
            Arc::new(LogAlertChannel::new(&config.alerts.sender_address))
        }
    };
    let publisher: Arc<dyn EventPublisher> = match &config.notifications.endpoint {
        Some(endpoint) => Arc::new(HttpEventPublisher::new(endpoint, timeout)?),
        None => {
            warn!("No notification endpoint configured; ride completions will only be logged");
            Arc::new(LogEventPublisher)
        }
    };

    Ok(Collaborators {
        staging: Arc::new(staging),
        alerts,
        publisher,
    })
}

async fn open_source(config: &Config, input: &str, follow: bool) -> anyhow::Result<LineStreamSource> {
    let options = LineSourceOptions {
        follow: follow || config.stream.follow,
        idle_wait: config.idle_poll(),
    };
    if input == "-" {
        return Ok(LineStreamSource::stdin(options));
    }
    let offsets = OffsetStore::open(&config.stream.offsets_db)
        .with_context(|| format!("opening offsets store {}", config.stream.offsets_db.display()))?;
    let source = LineStreamSource::open_file(input, options)
        .await?
        .with_checkpoint(offsets, &config.stream.consumer)
        .await?;
    Ok(source)
}

async fn run(config: Config, inputs: Vec<String>, follow: bool) -> anyhow::Result<()> {
    if let Some(addr) = &config.runtime.metrics_addr {
        ride_ingest::metrics::init_metrics(Some(addr.parse()?));
    }

    let collaborators = build_collaborators(&config)?;
    let settings = LoopSettings {
        collaborator_timeout: config.collaborator_timeout(),
        notify_topic: config.notifications.topic.clone(),
        completion_subject: config.notifications.subject.clone(),
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            let _ = shutdown_tx.send(true);
        }
    });

    let mut handles = Vec::new();
    for input in &inputs {
        let source = open_source(&config, input, follow)
            .await
            .with_context(|| format!("opening stream {}", input))?;
        let ingest = IngestLoop::new(source, collaborators.clone(), settings.clone(), clock.clone());
        handles.push((input.clone(), tokio::spawn(ingest.run(shutdown_rx.clone()))));
    }

    let mut transport_failures = 0;
    for (input, handle) in handles {
        match handle.await {
            Ok(report) => {
                info!(
                    stream = %input,
                    records = report.records,
                    riders = report.riders,
                    metrics = report.metrics,
                    rides_completed = report.rides_completed,
                    malformed = report.malformed,
                    anomalies = report.anomalies,
                    alerts_sent = report.alerts_sent,
                    collaborator_failures = report.collaborator_failures,
                    "Stream finished"
                );
                if let LoopExit::TransportFailure(reason) = report.exit {
                    error!(stream = %input, %reason, "Stream stopped on transport failure");
                    transport_failures += 1;
                }
            }
            Err(e) => {
                error!(stream = %input, error = %e, "Ingestion task panicked");
                transport_failures += 1;
            }
        }
    }

    if let Some(snapshot) = ride_ingest::metrics::render() {
        debug!(%snapshot, "Final metrics snapshot");
    }

    if transport_failures > 0 {
        bail!("{} stream(s) stopped on transport failure", transport_failures);
    }
    Ok(())
}
