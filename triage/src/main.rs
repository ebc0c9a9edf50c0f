//! NeuroTriage Main Binary
//!
//! Wires the full pipeline together:
//! - Ingestion: channel-multiplexed event source (stdin or replay file)
//! - Engine: correlation, trend analysis, breaker-protected prediction
//! - Emission: enriched predictions written as JSON lines to stdout
//!
//! The web gateway, persistence, and synthetic generation are external
//! collaborators; this binary's edges are line-delimited JSON envelopes in
//! and predictions out.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use neuro_triage_core::config::TriageConfig;
use neuro_triage_core::events::Channel;
use neuro_triage_core::prediction::PredictionResult;
use neuro_triage_engine::prelude::*;
use neuro_triage_engine::services::{RemoteExplainer, RemotePredictor};
use neuro_triage_ingestion::prelude::*;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// NeuroTriage CLI arguments
#[derive(Debug, Parser)]
#[clap(name = "neuro-triage", version, about = "Real-time stroke triage correlation engine")]
struct Cli {
    /// Configuration file path
    #[clap(short, long, default_value = "config/triage.yaml", global = true)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[clap(long, env = "TRIAGE_LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Enable JSON logging
    #[clap(long, env = "TRIAGE_LOG_JSON", global = true)]
    log_json: bool,

    /// Subcommand to execute
    #[clap(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands
#[derive(Debug, Subcommand)]
enum Commands {
    /// Consume event envelopes from stdin and emit predictions (default)
    Serve,
    /// Replay an envelope file through the pipeline and print predictions
    Replay {
        /// JSON-lines file of event envelopes
        file: PathBuf,

        /// Pretty-print emitted predictions
        #[clap(long)]
        pretty: bool,
    },
}

/// One line of inbound transport: a channel tag plus the raw payload
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    channel: Channel,
    payload: serde_json::Value,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    info!("Starting NeuroTriage v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&cli)?;

    match cli.command {
        Some(Commands::Replay { file, pretty }) => run_replay(config, file, pretty).await,
        Some(Commands::Serve) | None => run_serve(config).await,
    }
}

/// Load configuration, falling back to defaults when no file exists
fn load_config(cli: &Cli) -> Result<TriageConfig> {
    let config = if cli.config.exists() {
        info!("Loading configuration from: {:?}", cli.config);
        TriageConfig::from_file(&cli.config).context("Failed to load configuration")?
    } else {
        info!("No configuration file at {:?}, using defaults", cli.config);
        TriageConfig::default()
    };
    let config = config.apply_env();
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Initialize logging based on CLI arguments
fn init_logging(cli: &Cli) -> Result<()> {
    let log_level = cli
        .log_level
        .parse::<tracing::Level>()
        .context("Invalid log level")?;

    if cli.log_json {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .with(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive(log_level.into()),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .with(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive(log_level.into()),
            )
            .init();
    }

    Ok(())
}

/// Build the prediction service: remote when an endpoint is configured,
/// otherwise the deterministic rules
fn build_predictor(config: &TriageConfig) -> Result<Arc<dyn PredictionService>> {
    match &config.prediction.endpoint {
        Some(endpoint) => {
            info!(endpoint = %endpoint, "Using remote prediction service");
            let predictor =
                RemotePredictor::new(endpoint.clone(), config.prediction.request_timeout())
                    .context("Failed to build remote predictor")?;
            Ok(Arc::new(predictor))
        }
        None => {
            info!("No prediction endpoint configured, using heuristic predictor");
            Ok(Arc::new(HeuristicPredictor::new()))
        }
    }
}

/// Build the explanation service: remote when an endpoint is configured,
/// otherwise the deterministic template generator
fn build_explainer(config: &TriageConfig) -> Result<Arc<dyn ExplanationService>> {
    match &config.explanation.endpoint {
        Some(endpoint) => {
            info!(endpoint = %endpoint, "Using remote explanation service");
            let explainer =
                RemoteExplainer::new(endpoint.clone(), config.explanation.request_timeout())
                    .context("Failed to build remote explainer")?;
            Ok(Arc::new(explainer))
        }
        None => {
            info!("No explanation endpoint configured, using template explainer");
            Ok(Arc::new(TemplateExplainer::new()))
        }
    }
}

/// Assembled pipeline handles
struct Pipeline {
    engine: Arc<CorrelationEngine>,
    pool: Arc<EvaluationPool>,
    metrics: Arc<ChannelMetrics>,
    results: mpsc::Receiver<PredictionResult>,
}

fn build_pipeline(config: TriageConfig) -> Result<Pipeline> {
    let predictor = build_predictor(&config)?;
    let explainer = build_explainer(&config)?;

    let (result_tx, result_rx) = mpsc::channel(256);
    let workers = config.pool.workers;
    let queue_depth = config.pool.queue_depth;

    let engine = Arc::new(CorrelationEngine::new(config, predictor, explainer, result_tx));
    let pool = Arc::new(EvaluationPool::spawn(engine.clone(), workers, queue_depth));
    let metrics = Arc::new(ChannelMetrics::new());

    Ok(Pipeline {
        engine,
        pool,
        metrics,
        results: result_rx,
    })
}

/// Read JSON-line envelopes from a reader and feed them to the source
async fn feed_envelopes<R: AsyncRead + Unpin>(
    reader: R,
    sender: mpsc::Sender<EventEnvelope>,
) -> Result<()> {
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let raw: RawEnvelope = match serde_json::from_str(line) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "Skipping unparseable envelope line");
                continue;
            }
        };
        let payload = serde_json::to_vec(&raw.payload)?;
        if sender
            .send(EventEnvelope::new(raw.channel, payload))
            .await
            .is_err()
        {
            break;
        }
    }
    Ok(())
}

/// Run the serve subcommand: stdin in, predictions on stdout
async fn run_serve(config: TriageConfig) -> Result<()> {
    let Pipeline {
        engine,
        pool,
        metrics,
        mut results,
    } = build_pipeline(config)?;

    let (event_tx, source) = channel_source(1024);
    let feeder = tokio::spawn(async move {
        if let Err(err) = feed_envelopes(tokio::io::stdin(), event_tx).await {
            error!(error = %err, "Envelope feeder failed");
        }
    });

    let dispatch = DispatchLoop::new(source, engine.clone(), pool.clone(), metrics.clone());
    let mut dispatch_handle = tokio::spawn(dispatch.run());

    let emitter = tokio::spawn(async move {
        while let Some(result) = results.recv().await {
            match serde_json::to_string(&result) {
                Ok(line) => println!("{line}"),
                Err(err) => error!(error = %err, "Failed to serialize prediction"),
            }
        }
    });

    tokio::select! {
        result = &mut dispatch_handle => {
            result.context("Dispatch task panicked")??;
            info!("Input exhausted, shutting down");
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
            // Closing the feeder ends the source; the dispatch loop drains
            // whatever is already queued and exits
            feeder.abort();
            dispatch_handle.await.context("Dispatch task panicked")??;
        }
    }

    // Drain queued evaluations, close the result channel, let the emitter
    // finish
    drop(engine);
    match Arc::try_unwrap(pool) {
        Ok(pool) => pool.shutdown().await,
        Err(_) => warn!("Evaluation pool still shared at shutdown"),
    }
    emitter.await.ok();

    let snapshot = metrics.snapshot();
    info!(
        total_messages = snapshot.total_messages,
        active_channels = snapshot.active_channels,
        "NeuroTriage stopped"
    );
    Ok(())
}

/// Run the replay subcommand: file in, predictions printed, then exit
async fn run_replay(config: TriageConfig, file: PathBuf, pretty: bool) -> Result<()> {
    let Pipeline {
        engine,
        pool,
        metrics,
        mut results,
    } = build_pipeline(config)?;

    let input = tokio::fs::File::open(&file)
        .await
        .with_context(|| format!("Failed to open replay file {file:?}"))?;

    let (event_tx, source) = channel_source(1024);
    let feeder = tokio::spawn(async move {
        if let Err(err) = feed_envelopes(input, event_tx).await {
            error!(error = %err, "Replay feeder failed");
        }
    });

    // Print concurrently so evaluation workers never block on a full result
    // channel
    let emitter = tokio::spawn(async move {
        let mut count = 0usize;
        while let Some(result) = results.recv().await {
            count += 1;
            let line = if pretty {
                serde_json::to_string_pretty(&result)
            } else {
                serde_json::to_string(&result)
            };
            match line {
                Ok(line) => println!("{line}"),
                Err(err) => error!(error = %err, "Failed to serialize prediction"),
            }
        }
        count
    });

    let dispatch = DispatchLoop::new(source, engine.clone(), pool.clone(), metrics.clone());
    dispatch.run().await?;
    feeder.await.ok();

    // Drain the pool so every triggered evaluation completes, then close the
    // result channel by dropping the engine
    drop(engine);
    match Arc::try_unwrap(pool) {
        Ok(pool) => pool.shutdown().await,
        Err(_) => warn!("Evaluation pool still shared at replay end"),
    }
    let count = emitter.await.unwrap_or(0);

    let snapshot = metrics.snapshot();
    info!(
        predictions = count,
        total_messages = snapshot.total_messages,
        "Replay complete"
    );
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or CTRL+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received CTRL+C");
        },
        _ = terminate => {
            info!("Received SIGTERM");
        },
    }
}
