//! Intercepting proxy handler
//!
//! Converts between HTTP messages and the agent's request/response types.
//! Requests may arrive in absolute form (`GET https://origin/path`) or in
//! origin form, which is resolved against the application origin.

use crate::agent::Intercepted;
use crate::domain::ports::{AgentRequest, AgentResponse, Destination, RequestMode};
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use reqwest::Url;
use tracing::{debug, warn};

use super::rest::{ApiErrorResponse, AppState};

/// Identifies the hosting-application client
pub const CLIENT_HEADER: &str = "x-agent-client";
pub const STRATEGY_HEADER: &str = "x-agent-strategy";
pub const SOURCE_HEADER: &str = "x-agent-source";

/// Response headers recomputed by the server
const SKIPPED_RESPONSE_HEADERS: &[&str] = &["connection", "content-length", "keep-alive", "transfer-encoding"];

/// Fallback handler: everything that is not a `/__agent` route
pub(crate) async fn intercept(State(state): State<AppState>, request: Request) -> Response {
    let agent_request = match to_agent_request(request, &state.origin, state.max_body_size).await {
        Ok(r) => r,
        Err((status, message)) => return error_response(status, "invalid_request", message),
    };

    let url = agent_request.url.clone();
    match state.agent.intercept(agent_request).await {
        Ok(intercepted) => into_http_response(intercepted),
        Err(e) => {
            warn!(url = %url, error = %e, "Intercepted request failed");
            error_response(StatusCode::BAD_GATEWAY, "upstream_unreachable", e.to_string())
        }
    }
}

pub(crate) async fn to_agent_request(
    request: Request,
    origin: &Url,
    max_body_size: usize,
) -> std::result::Result<AgentRequest, (StatusCode, String)> {
    let (parts, body) = request.into_parts();

    let url = if parts.uri.scheme().is_some() {
        Url::parse(&parts.uri.to_string())
    } else {
        let path = parts.uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
        origin.join(path)
    }
    .map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid target {}: {}", parts.uri, e)))?;

    let body = axum::body::to_bytes(body, max_body_size)
        .await
        .map_err(|e| (StatusCode::PAYLOAD_TOO_LARGE, format!("unreadable body: {}", e)))?;

    let mut request = AgentRequest::new(parts.method.as_str(), url);
    for (name, value) in parts.headers.iter() {
        let Ok(value) = value.to_str() else {
            continue;
        };
        match name.as_str() {
            "sec-fetch-dest" => request.destination = Destination::from_header(value),
            "sec-fetch-mode" => request.mode = RequestMode::from_header(value),
            CLIENT_HEADER => request.client_id = Some(value.to_string()),
            _ => {}
        }
        request.headers.push((name.as_str().to_string(), value.to_string()));
    }
    request.body = body;

    debug!(method = %request.method, url = %request.url, dest = %request.destination, "Intercepted");
    Ok(request)
}

pub(crate) fn into_http_response(intercepted: Intercepted) -> Response {
    let Intercepted { response, outcome } = intercepted;
    let mut http = build_response(response);

    let headers = http.headers_mut();
    match outcome {
        Some(outcome) => {
            if let Ok(v) = HeaderValue::from_str(outcome.strategy.as_str()) {
                headers.insert(STRATEGY_HEADER, v);
            }
            if let Ok(v) = HeaderValue::from_str(&outcome.source.to_string()) {
                headers.insert(SOURCE_HEADER, v);
            }
        }
        None => {
            headers.insert(SOURCE_HEADER, HeaderValue::from_static("passthrough"));
        }
    }
    http
}

fn build_response(response: AgentResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut http = Response::new(Body::from(response.body));
    *http.status_mut() = status;

    let headers = http.headers_mut();
    for (name, value) in &response.headers {
        if SKIPPED_RESPONSE_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.append(name, value);
        }
    }
    http
}

pub(crate) fn error_response(status: StatusCode, error: &str, message: String) -> Response {
    (
        status,
        Json(ApiErrorResponse {
            error: error.into(),
            message,
            details: None,
        }),
    )
        .into_response()
}
