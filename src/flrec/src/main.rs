//! flrec: collaborative-filtering recommendation service.
//!
//! Trains a model from the interaction log, serves it over HTTP and
//! retrains it on a fixed interval.

use anyhow::Context;
use clap::Parser;
use flrec_api::ApiServer;
use flrec_core::config::AppConfig;
use flrec_core::types::ModelKind;
use flrec_engine::{
    CsvFileSource, ModelSlot, RecommendationEngine, RetrainOutcome, Retrainer, SimilarityScorer,
    Trainer,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "flrec")]
#[command(about = "Collaborative-filtering recommendation service")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, env = "FLREC_CONFIG")]
    config: Option<String>,

    /// Interaction log location (overrides config)
    #[arg(long, env = "DAY7_DATA")]
    data_path: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "FLREC__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Model kind: als, cosine, tfidf or bm25 (overrides config)
    #[arg(long)]
    model: Option<ModelKind>,

    /// Seconds between retrain passes (overrides config)
    #[arg(long)]
    retrain_interval_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flrec=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("flrec starting up");

    let mut config = match cli.config.as_deref() {
        Some(path) => AppConfig::load(Some(path))
            .with_context(|| format!("loading config from {path}"))?,
        None => AppConfig::load(None).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load config, using defaults");
            AppConfig::default()
        }),
    };

    if let Some(path) = cli.data_path {
        config.data.path = path;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(kind) = cli.model {
        config.model.kind = kind;
    }
    if let Some(secs) = cli.retrain_interval_secs {
        config.retrain.interval_secs = secs;
    }
    config.validate().context("invalid configuration")?;

    info!(
        data_path = %config.data.path,
        model = %config.model.kind,
        http_port = config.api.http_port,
        retrain_interval_secs = config.retrain.interval_secs,
        "Configuration loaded"
    );

    let source = Arc::new(CsvFileSource::from_config(&config.data)?);
    let trainer = Arc::new(Trainer::new(&config.model));
    let slot = Arc::new(ModelSlot::new());
    let retrainer = Arc::new(Retrainer::new(
        source,
        trainer,
        slot.clone(),
        Duration::from_secs(config.retrain.interval_secs),
    ));

    // The first model must exist before traffic is accepted.
    match retrainer.run_once().await {
        RetrainOutcome::Installed { generation } => {
            info!(generation = generation, "Initial model trained");
        }
        RetrainOutcome::Failed(e) => {
            error!(error = %e, "Initial training failed");
            return Err(e).context("initial training failed");
        }
        RetrainOutcome::Skipped => anyhow::bail!("initial training did not run"),
    }
    let schedule = retrainer.clone().spawn();

    let engine = RecommendationEngine::new(slot, SimilarityScorer::default());
    let api_server = ApiServer::new(config.clone(), engine);

    if config.metrics.enabled {
        if let Err(e) = api_server.start_metrics() {
            error!(error = %e, "Failed to start metrics exporter");
        }
    }

    info!("flrec is ready to serve traffic");

    // Blocks until shutdown
    let served = api_server.start_http().await;
    schedule.abort();
    served
}
