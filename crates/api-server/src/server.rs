//! Query server: HTTP surface over the recommendation engine plus the
//! Prometheus exporter.

use crate::rest::{self, AppState};
use axum::routing::get;
use axum::Router;
use flrec_core::config::AppConfig;
use flrec_engine::RecommendationEngine;
use std::net::SocketAddr;
use std::time::Instant;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub struct ApiServer {
    config: AppConfig,
    engine: RecommendationEngine,
    start_time: Instant,
}

impl ApiServer {
    pub fn new(config: AppConfig, engine: RecommendationEngine) -> Self {
        Self {
            config,
            engine,
            start_time: Instant::now(),
        }
    }

    /// Build the router. `get` routes answer HEAD as well; OPTIONS is answered
    /// by the CORS layer.
    pub fn router(&self) -> Router {
        let state = AppState {
            engine: self.engine.clone(),
            query: self.config.query.clone(),
            start_time: self.start_time,
        };

        Router::new()
            .route("/recommend", get(rest::recommend))
            .route("/similar", get(rest::similar))
            .route("/model", get(rest::model_stats))
            // Operational endpoints
            .route("/health", get(rest::health_check))
            .route("/ready", get(rest::readiness))
            .route("/live", get(rest::liveness))
            // Middleware
            .layer(CompressionLayer::new())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Serve HTTP until ctrl-c.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let app = self.router();
        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }

    /// Start the metrics exporter on a separate port.
    pub fn start_metrics(&self) -> anyhow::Result<()> {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
