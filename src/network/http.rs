//! HTTP fetcher
//!
//! Reaches the network through a shared `reqwest` client. Any HTTP status is
//! a successful fetch; only transport failures become errors.

use crate::domain::ports::{AgentRequest, AgentResponse, Fetcher, RequestMode, ResponseKind};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Request headers never forwarded upstream
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "content-length",
    "host",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "x-agent-client",
];

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the HTTP fetcher
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpFetcherConfig {
    /// Per-fetch timeout; `None` leaves only the client's own limits
    pub timeout_secs: Option<u64>,
    pub user_agent: String,
}

impl Default for HttpFetcherConfig {
    fn default() -> Self {
        Self {
            timeout_secs: None,
            user_agent: format!("vocab-agent/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

// =============================================================================
// Fetcher
// =============================================================================

/// Fetcher that performs real HTTP requests
pub struct HttpFetcher {
    client: reqwest::Client,
    origin: Url,
}

impl HttpFetcher {
    pub fn new(origin: Url, config: HttpFetcherConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(config.user_agent);
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(Self {
            client: builder.build()?,
            origin,
        })
    }

    /// Same-origin responses are basic; cross-origin ones are opaque when
    /// requested without CORS
    fn response_kind(&self, request: &AgentRequest) -> ResponseKind {
        if request.is_same_origin(&self.origin) {
            ResponseKind::Basic
        } else if request.mode == RequestMode::NoCors {
            ResponseKind::Opaque
        } else {
            ResponseKind::Cors
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &AgentRequest) -> Result<AgentResponse> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| Error::InvalidUrl(format!("unsupported method {}", request.method)))?;

        let mut builder = self.client.request(method, request.url.clone());
        for (name, value) in &request.headers {
            if !HOP_BY_HOP.contains(&name.to_ascii_lowercase().as_str()) {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let transient = |e: reqwest::Error| Error::TransientNetwork {
            url: request.url.to_string(),
            reason: e.to_string(),
        };

        let response = builder.send().await.map_err(transient)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(transient)?;

        debug!(url = %request.url, status, bytes = body.len(), "Fetched");

        Ok(AgentResponse {
            status,
            headers,
            body,
            kind: self.response_kind(request),
        })
    }
}
