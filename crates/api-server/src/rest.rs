//! REST API handlers for recommendation queries and operational endpoints.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use flrec_core::config::QueryConfig;
use flrec_core::error::RecError;
use flrec_core::types::ModelStats;
use flrec_engine::RecommendationEngine;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{error, warn};

/// Maximum identifier length accepted on the query string.
const MAX_FIELD_LEN: usize = 256;

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: RecommendationEngine,
    pub query: QueryConfig,
    pub start_time: Instant,
}

#[derive(Debug, Deserialize)]
pub struct RecommendParams {
    pub uid: Option<String>,
    pub count: Option<String>,
    pub exclude: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SimilarParams {
    pub item: Option<String>,
    pub count: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecommendResponse {
    pub user: String,
    pub recommendations: Vec<String>,
    pub generation: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SimilarResponse {
    pub item: String,
    pub similar: Vec<String>,
    pub generation: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
}

/// Component error carried to the HTTP boundary.
#[derive(Debug)]
pub struct ApiError(pub RecError);

impl From<RecError> for ApiError {
    fn from(e: RecError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RecError::UnknownUser(_) | RecError::UnknownItem(_) => StatusCode::NOT_FOUND,
            RecError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            RecError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self.0, "Query failed");
        }
        metrics::counter!("flrec.api.errors", "code" => self.0.code()).increment(1);

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "Internal processing error".to_string()
        } else {
            self.0.to_string()
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.code().to_string(),
                message,
            }),
        )
            .into_response()
    }
}

/// Validate an identifier taken from the query string.
fn require_id(name: &str, value: Option<&str>) -> Result<String, RecError> {
    let value = value.map(str::trim).unwrap_or_default();
    if value.is_empty() {
        return Err(RecError::InvalidArgument(format!("'{name}' must be in params")));
    }
    if value.len() > MAX_FIELD_LEN {
        return Err(RecError::InvalidArgument(format!(
            "'{name}' exceeds maximum length"
        )));
    }
    Ok(value.to_string())
}

/// Parse the optional result count: a positive integer no larger than the bound.
pub fn parse_count(raw: Option<&str>, query: &QueryConfig) -> Result<usize, RecError> {
    let Some(raw) = raw else {
        return Ok(query.default_count);
    };
    let count: i64 = raw
        .trim()
        .parse()
        .map_err(|_| RecError::InvalidArgument(format!("'count' must be an integer, got '{raw}'")))?;
    if count <= 0 {
        return Err(RecError::InvalidArgument("'count' must be positive".into()));
    }
    if count as u64 > query.max_count as u64 {
        return Err(RecError::InvalidArgument(format!(
            "'count' must not exceed {}",
            query.max_count
        )));
    }
    Ok(count as usize)
}

fn parse_flag(name: &str, raw: Option<&str>, default: bool) -> Result<bool, RecError> {
    match raw.map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if v == "true" || v == "1" => Ok(true),
        Some(v) if v == "false" || v == "0" => Ok(false),
        Some(v) => Err(RecError::InvalidArgument(format!(
            "'{name}' must be a boolean, got '{v}'"
        ))),
    }
}

/// GET /recommend?uid=..&count=..&exclude=..: top items for a user.
pub async fn recommend(
    State(state): State<AppState>,
    Query(params): Query<RecommendParams>,
) -> Result<Json<RecommendResponse>, ApiError> {
    let start = Instant::now();
    metrics::counter!("flrec.api.recommend.requests").increment(1);

    let parsed = require_id("uid", params.uid.as_deref()).and_then(|uid| {
        let count = parse_count(params.count.as_deref(), &state.query)?;
        let exclude = parse_flag(
            "exclude",
            params.exclude.as_deref(),
            state.query.exclude_interacted,
        )?;
        Ok((uid, count, exclude))
    });
    let (uid, count, exclude) = match parsed {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(error = %e, "Recommend request validation failed");
            return Err(e.into());
        }
    };

    let ranked = state.engine.recommend(&uid, count, exclude)?;
    metrics::histogram!("flrec.api.recommend.latency_us")
        .record(start.elapsed().as_micros() as f64);

    Ok(Json(RecommendResponse {
        user: uid,
        recommendations: ranked.items.into_iter().map(|s| s.item_id).collect(),
        generation: ranked.generation,
    }))
}

/// GET /similar?item=..&count=..: items closest to an item.
pub async fn similar(
    State(state): State<AppState>,
    Query(params): Query<SimilarParams>,
) -> Result<Json<SimilarResponse>, ApiError> {
    metrics::counter!("flrec.api.similar.requests").increment(1);

    let item = require_id("item", params.item.as_deref())?;
    let count = parse_count(params.count.as_deref(), &state.query)?;
    let ranked = state.engine.similar_items(&item, count)?;

    Ok(Json(SimilarResponse {
        item,
        similar: ranked.items.into_iter().map(|s| s.item_id).collect(),
        generation: ranked.generation,
    }))
}

/// GET /model: summary of the installed snapshot.
pub async fn model_stats(State(state): State<AppState>) -> Result<Json<ModelStats>, ApiError> {
    Ok(Json(state.engine.stats()?))
}

/// GET /health: process availability; never touches the model.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready: 200 once a snapshot is installed.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.engine.slot().is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /live: Liveness probe.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_count_bounds() {
        let query = QueryConfig::default();
        assert_eq!(parse_count(None, &query).unwrap(), 20);
        assert_eq!(parse_count(Some("7"), &query).unwrap(), 7);
        assert_eq!(parse_count(Some("500"), &query).unwrap(), 500);
        for bad in ["0", "-3", "abc", "1.5", "501", ""] {
            assert!(
                matches!(parse_count(Some(bad), &query), Err(RecError::InvalidArgument(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("exclude", None, true).unwrap());
        assert!(!parse_flag("exclude", Some("false"), true).unwrap());
        assert!(parse_flag("exclude", Some("1"), false).unwrap());
        assert!(parse_flag("exclude", Some("maybe"), true).is_err());
    }

    #[tokio::test]
    async fn test_internal_failures_map_to_500_without_details() {
        for err in [
            RecError::InvalidSnapshot("factor rows 3/2 do not match".into()),
            RecError::Internal(anyhow::anyhow!("worker pool gone")),
            RecError::Numerical("matrix not positive definite".into()),
        ] {
            let code = err.code();
            let response = ApiError(err).into_response();
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

            let body = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let body: ErrorResponse = serde_json::from_slice(&body).unwrap();
            assert_eq!(body.error, code);
            assert_eq!(body.message, "Internal processing error");
        }
    }

    #[test]
    fn test_require_id() {
        assert_eq!(require_id("uid", Some(" u1 ")).unwrap(), "u1");
        assert!(require_id("uid", None).is_err());
        assert!(require_id("uid", Some("")).is_err());
        assert!(require_id("uid", Some(&"x".repeat(MAX_FIELD_LEN + 1))).is_err());
    }
}
