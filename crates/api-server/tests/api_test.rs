//! HTTP-level tests driving the router in-process.

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use flrec_api::rest::{ErrorResponse, HealthResponse, RecommendResponse, SimilarResponse};
use flrec_api::ApiServer;
use flrec_core::config::{AppConfig, ModelConfig};
use flrec_core::types::RawInteraction;
use flrec_engine::{
    MemorySource, ModelSlot, RecommendationEngine, Retrainer, SimilarityScorer, Trainer,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn log() -> Vec<RawInteraction> {
    vec![
        RawInteraction::new("a", "u1", 3),
        RawInteraction::new("b", "u1", 1),
        RawInteraction::new("a", "u2", 5),
        RawInteraction::new("c", "u3", 2),
        RawInteraction::new("b", "u3", 1),
    ]
}

async fn app(trained: bool) -> Router {
    let slot = Arc::new(ModelSlot::new());
    if trained {
        let trainer = Arc::new(Trainer::new(&ModelConfig {
            factors: 2,
            ..ModelConfig::default()
        }));
        let retrainer = Retrainer::new(
            Arc::new(MemorySource::new(log())),
            trainer,
            slot.clone(),
            Duration::from_secs(600),
        );
        retrainer.run_once().await;
    }
    let engine = RecommendationEngine::new(slot, SimilarityScorer::default());
    ApiServer::new(AppConfig::default(), engine).router()
}

async fn send(app: Router, method: Method, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn get_json<T: DeserializeOwned>(app: Router, uri: &str) -> (StatusCode, T) {
    let (status, body) = send(app, Method::GET, uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_recommend_before_training_is_unavailable() {
    let (status, body): (_, ErrorResponse) = get_json(app(false).await, "/recommend?uid=u1").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body.error, "not_ready");

    let (status, _) = send(app(false).await, Method::GET, "/ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_health_ignores_model_state() {
    let (status, body): (_, HealthResponse) = get_json(app(false).await, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.status, "ok");

    let (status, _) = send(app(false).await, Method::GET, "/live").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_recommend_returns_unseen_items() {
    let (status, body): (_, RecommendResponse) =
        get_json(app(true).await, "/recommend?uid=u2&count=5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.user, "u2");
    assert_eq!(body.generation, 1);
    assert_eq!(body.recommendations.len(), 2);
    assert!(!body.recommendations.contains(&"a".to_string()));

    let (status, _) = send(app(true).await, Method::GET, "/ready").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_recommend_without_exclusion_may_return_seen_items() {
    let (status, body): (_, RecommendResponse) =
        get_json(app(true).await, "/recommend?uid=u2&count=3&exclude=false").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.recommendations.len(), 3);
}

#[tokio::test]
async fn test_unknown_user_is_not_found() {
    let (status, body): (_, ErrorResponse) =
        get_json(app(true).await, "/recommend?uid=ghost").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body.error, "unknown_user");
}

#[tokio::test]
async fn test_invalid_arguments_are_rejected() {
    for uri in [
        "/recommend",
        "/recommend?uid=",
        "/recommend?uid=u1&count=abc",
        "/recommend?uid=u1&count=0",
        "/recommend?uid=u1&count=-2",
        "/recommend?uid=u1&count=100000",
        "/recommend?uid=u1&exclude=perhaps",
        "/similar?count=3",
    ] {
        let (status, body): (_, ErrorResponse) = get_json(app(true).await, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body.error, "invalid_argument", "{uri}");
    }
}

#[tokio::test]
async fn test_similar_items() {
    let (status, body): (_, SimilarResponse) =
        get_json(app(true).await, "/similar?item=a&count=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.item, "a");
    assert!(body.similar.len() <= 2);
    assert!(!body.similar.contains(&"a".to_string()));

    let (status, body): (_, ErrorResponse) =
        get_json(app(true).await, "/similar?item=zzz").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body.error, "unknown_item");
}

#[tokio::test]
async fn test_model_stats() {
    let (status, body): (_, serde_json::Value) = get_json(app(true).await, "/model").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["generation"], 1);
    assert_eq!(body["items"], 3);
    assert_eq!(body["users"], 3);
    assert_eq!(body["kind"], "als");
}

#[tokio::test]
async fn test_head_requests_are_answered() {
    let (status, body) = send(app(true).await, Method::HEAD, "/recommend?uid=u1").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());

    let (status, _) = send(app(false).await, Method::HEAD, "/health").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_options_answered_on_every_route() {
    for uri in ["/recommend", "/similar", "/model", "/health", "/ready", "/live"] {
        let (status, body) = send(app(false).await, Method::OPTIONS, uri).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert!(body.is_empty(), "{uri}");
    }
}
