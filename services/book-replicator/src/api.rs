//! HTTP surface
//!
//! Thin axum layer over `BookReplicator`: health, book and summary reads,
//! and consumer subscribe/unsubscribe.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use types::errors::ValidationError;
use types::ids::ConsumerId;
use types::topic::Topic;

use crate::query::BookSummary;
use crate::registry::{SubscribeOutcome, UnsubscribeOutcome};
use crate::replicator::{BookReplicator, Health};
use crate::snapshot::BookSnapshot;

pub type AppState = Arc<BookReplicator>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, code) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, "BAD_REQUEST"),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, "NOT_FOUND"),
        };

        let body = Json(json!({
            "error": code,
            "message": message
        }));

        (status, body).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionRequest {
    pub symbol: String,
    pub depth: u32,
    /// Generated when omitted on subscribe; required on unsubscribe.
    #[serde(default)]
    pub consumer_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubscriptionResponse {
    pub topic: String,
    pub consumer_id: String,
    pub outcome: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct BookParams {
    /// Max levels per side.
    pub limit: Option<usize>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/orderbook/:symbol", get(get_book))
        .route("/orderbook/:symbol/summary", get(get_summary))
        .route("/subscriptions", post(subscribe).delete(unsubscribe))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<Health>) {
    let health = state.health();
    let status = if health.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health))
}

async fn get_book(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(params): Query<BookParams>,
) -> Result<Json<BookSnapshot>, ApiError> {
    let snapshot = state
        .get_book(&symbol)
        .ok_or_else(|| ApiError::NotFound(format!("No book for {}", symbol)))?;
    Ok(Json(match params.limit {
        Some(limit) => snapshot.top(limit),
        None => snapshot,
    }))
}

async fn get_summary(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<BookSummary>, ApiError> {
    state
        .get_summary(&symbol)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No book for {}", symbol)))
}

async fn subscribe(
    State(state): State<AppState>,
    Json(req): Json<SubscriptionRequest>,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    let topic = Topic::validate(&req.symbol, req.depth)?;
    let consumer = match req.consumer_id {
        Some(id) => ConsumerId::new(id)?,
        None => ConsumerId::generate(),
    };

    let outcome = match state.subscribe_topic(topic.clone(), consumer.clone()) {
        SubscribeOutcome::Activated => "activated",
        SubscribeOutcome::Joined => "joined",
        SubscribeOutcome::AlreadySubscribed => "already_subscribed",
    };

    Ok(Json(SubscriptionResponse {
        topic: topic.to_channel_string(),
        consumer_id: consumer.to_string(),
        outcome: outcome.to_string(),
    }))
}

async fn unsubscribe(
    State(state): State<AppState>,
    Json(req): Json<SubscriptionRequest>,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    let topic = Topic::validate(&req.symbol, req.depth)?;
    let consumer = ConsumerId::new(req.consumer_id.unwrap_or_default())?;

    let outcome = match state.unsubscribe_topic(&topic, &consumer) {
        UnsubscribeOutcome::Deactivated => "deactivated",
        UnsubscribeOutcome::Left => "left",
        UnsubscribeOutcome::NotSubscribed => {
            return Err(ApiError::NotFound(format!(
                "{} is not subscribed to {}",
                consumer, topic
            )))
        }
    };

    Ok(Json(SubscriptionResponse {
        topic: topic.to_channel_string(),
        consumer_id: consumer.to_string(),
        outcome: outcome.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReplicatorConfig;
    use crate::transport::{Connection, Transport, TransportError};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    struct OfflineTransport;

    #[async_trait]
    impl Transport for OfflineTransport {
        async fn connect(&self) -> Result<Box<dyn Connection>, TransportError> {
            Err(TransportError::Connect("offline".to_string()))
        }
    }

    fn app() -> Router {
        let engine = BookReplicator::new(&ReplicatorConfig::default(), Arc::new(OfflineTransport));
        create_router(Arc::new(engine))
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<&str>) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health_reports_unhealthy_before_connect() {
        let app = app();
        let (status, body) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["healthy"], false);
        assert_eq!(body["connection"]["state"], "disconnected");
    }

    #[tokio::test]
    async fn test_missing_book_is_404() {
        let app = app();
        let (status, body) = send(&app, Method::GET, "/orderbook/BTCUSDT", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NOT_FOUND");

        let (status, _) = send(&app, Method::GET, "/orderbook/BTCUSDT/summary", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_subscribe_validation() {
        let app = app();
        let (status, body) = send(
            &app,
            Method::POST,
            "/subscriptions",
            Some(r#"{"symbol":"BTCUSDT","depth":25,"consumer_id":"desk"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_subscribe_then_unsubscribe() {
        let app = app();
        let (status, body) = send(
            &app,
            Method::POST,
            "/subscriptions",
            Some(r#"{"symbol":"btcusdt","depth":50,"consumer_id":"desk"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["topic"], "orderbook.50.BTCUSDT");
        assert_eq!(body["outcome"], "activated");

        let (_, body) = send(
            &app,
            Method::POST,
            "/subscriptions",
            Some(r#"{"symbol":"BTCUSDT","depth":50}"#),
        )
        .await;
        assert_eq!(body["outcome"], "joined");
        assert!(!body["consumer_id"].as_str().unwrap().is_empty());

        let (status, body) = send(
            &app,
            Method::DELETE,
            "/subscriptions",
            Some(r#"{"symbol":"BTCUSDT","depth":50,"consumer_id":"desk"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "left");

        let (status, _) = send(
            &app,
            Method::DELETE,
            "/subscriptions",
            Some(r#"{"symbol":"BTCUSDT","depth":50,"consumer_id":"desk"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &app,
            Method::DELETE,
            "/subscriptions",
            Some(r#"{"symbol":"BTCUSDT","depth":50}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
