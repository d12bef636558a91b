//! Agent REST Routes
//!
//! Control channel, push payloads, connectivity trigger, status and the
//! notification stream, all under `/__agent`. Everything else falls through
//! to the intercepting proxy.

use crate::agent::Agent;
use crate::messaging::{ControlAck, ControlMessage, PushPayload};
use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Router,
};
use futures::stream::{self, Stream};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use super::proxy;

// =============================================================================
// Response Types
// =============================================================================

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

// =============================================================================
// Router
// =============================================================================

/// Builds the agent's axum router
pub struct AgentRouter {
    agent: Arc<Agent>,
    max_body_size: usize,
    permissive_cors: bool,
}

impl AgentRouter {
    pub fn new(agent: Arc<Agent>) -> Self {
        Self {
            agent,
            max_body_size: 10 * 1024 * 1024,
            permissive_cors: false,
        }
    }

    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }

    pub fn permissive_cors(mut self, enabled: bool) -> Self {
        self.permissive_cors = enabled;
        self
    }

    pub fn build(self) -> Router {
        let state = AppState {
            origin: self.agent.dispatcher().classifier().origin().clone(),
            agent: self.agent,
            max_body_size: self.max_body_size,
        };

        let mut control = Router::new()
            .route("/__agent/control", post(control_message))
            .route("/__agent/push", post(push_message))
            .route("/__agent/online", post(connectivity_restored))
            .route("/__agent/status", get(agent_status))
            .route("/__agent/notifications", get(notification_stream));
        // Only the control routes; proxied preflights belong to the origin
        if self.permissive_cors {
            control = control.layer(CorsLayer::permissive());
        }

        Router::new()
            .merge(control)
            .fallback(proxy::intercept)
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }
}

/// Shared application state
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) agent: Arc<Agent>,
    pub(crate) origin: Url,
    pub(crate) max_body_size: usize,
}

// =============================================================================
// Handlers
// =============================================================================

async fn control_message(
    State(state): State<AppState>,
    Json(message): Json<ControlMessage>,
) -> Json<ControlAck> {
    Json(state.agent.gateway().handle_control(message))
}

async fn push_message(
    State(state): State<AppState>,
    Json(payload): Json<PushPayload>,
) -> Response {
    match state.agent.gateway().handle_push(payload) {
        Ok(request) => (StatusCode::ACCEPTED, Json(request)).into_response(),
        Err(e) => {
            error!("Push handling failed: {}", e);
            proxy::error_response(StatusCode::INTERNAL_SERVER_ERROR, "push_failed", e.to_string())
        }
    }
}

async fn connectivity_restored(State(state): State<AppState>) -> Response {
    info!("Connectivity restored, polling now");
    match state.agent.monitor().trigger_now().await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => proxy::error_response(StatusCode::SERVICE_UNAVAILABLE, "tick_failed", e.to_string()),
    }
}

async fn agent_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.agent.status().await)
}

async fn notification_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.agent.subscribe_notifications();

    let events = stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(notification) => match Event::default().event("notification").json_data(&notification) {
                    Ok(event) => return Some((Ok(event), receiver)),
                    Err(e) => warn!("Dropping unserialisable notification: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Notification subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::tests::{test_agent, test_fetcher};
    use crate::api::proxy::{SOURCE_HEADER, STRATEGY_HEADER};
    use crate::ledger::MemoryScoreLedger;
    use crate::testing::ScriptedFetcher;
    use axum::body::Body;
    use axum::http::{header, Request};
    use tower::ServiceExt;

    struct Harness {
        agent: Arc<Agent>,
        fetcher: Arc<ScriptedFetcher>,
        ledger: Arc<MemoryScoreLedger>,
    }

    impl Harness {
        fn new() -> Self {
            let fetcher = Arc::new(test_fetcher());
            let ledger = Arc::new(MemoryScoreLedger::new());
            let agent = test_agent(fetcher.clone(), ledger.clone());
            Self {
                agent,
                fetcher,
                ledger,
            }
        }

        async fn send(&self, request: Request<Body>) -> Response {
            AgentRouter::new(self.agent.clone())
                .build()
                .oneshot(request)
                .await
                .unwrap()
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn post_json(uri: &str, json: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap()
    }

    fn navigate(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("sec-fetch-mode", "navigate")
            .header("sec-fetch-dest", "document")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_status_route() {
        let h = Harness::new();
        h.agent.start().await.unwrap();

        let response = h
            .send(Request::builder().uri("/__agent/status").body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let status = body_json(response).await;
        assert_eq!(status["state"], "active");
        assert_eq!(status["generation"], "vocab-test");
        assert_eq!(status["monitoring"], true);
        h.agent.shutdown().await;
    }

    #[tokio::test]
    async fn test_control_routes() {
        let h = Harness::new();

        let response = h
            .send(post_json("/__agent/control", r#"{"type":"START_MONITORING"}"#))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["monitoring"], true);

        let response = h
            .send(post_json("/__agent/control", r#"{"type":"STOP_MONITORING"}"#))
            .await;
        assert_eq!(body_json(response).await["monitoring"], false);

        let response = h.send(post_json("/__agent/control", r#"{"type":"NOPE"}"#)).await;
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_push_route_broadcasts() {
        let h = Harness::new();
        let mut notifications = h.agent.subscribe_notifications();

        let response = h
            .send(post_json("/__agent/push", r#"{"title":"Daily goal","message":"5 words left"}"#))
            .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let shown = body_json(response).await;
        assert_eq!(shown["title"], "Daily goal");
        assert_eq!(shown["body"], "5 words left");
        assert_eq!(notifications.recv().await.unwrap().title, "Daily goal");
    }

    #[tokio::test]
    async fn test_notification_stream_is_sse() {
        let h = Harness::new();
        let response = h
            .send(
                Request::builder()
                    .uri("/__agent/notifications")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
    }

    #[tokio::test]
    async fn test_online_route_runs_tick() {
        let h = Harness::new();
        h.ledger.set_score("u1", "Ada", 300);

        let response = h.send(post_json("/__agent/online", "")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["trigger"], "connectivity_restored");
        assert_eq!(h.ledger.read_count(), 1);

        h.ledger.set_unavailable(true);
        let response = h.send(post_json("/__agent/online", "")).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_proxy_before_and_after_activation() {
        let h = Harness::new();

        let response = h.send(navigate("/")).await;
        assert_eq!(response.headers()[SOURCE_HEADER], "passthrough");

        h.agent.start().await.unwrap();

        let response = h.send(navigate("/")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[STRATEGY_HEADER], "network_first");
        assert_eq!(response.headers()[SOURCE_HEADER], "network");
        assert_eq!(body_text(response).await, "home");
        h.agent.shutdown().await;
    }

    #[tokio::test]
    async fn test_offline_navigation_gets_offline_document() {
        let h = Harness::new();
        h.agent.start().await.unwrap();
        h.fetcher.set_offline(true);

        let response = h.send(navigate("/lessons/never-visited")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[SOURCE_HEADER], "offline");
        assert_eq!(body_text(response).await, "offline");
        h.agent.shutdown().await;
    }

    #[tokio::test]
    async fn test_network_only_failure_is_bad_gateway() {
        let h = Harness::new();
        h.agent.start().await.unwrap();
        h.fetcher.set_offline(true);

        let response = h
            .send(Request::builder().uri("/api/words").body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(body_json(response).await["error"], "upstream_unreachable");
        h.agent.shutdown().await;
    }
}
