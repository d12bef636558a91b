//! Domain Ports - Core trait definitions for the agent
//!
//! These traits define the boundaries between the agent's logic and the
//! outside world: the application origin, the remote score ledger and
//! whatever displays notifications. Adapters implement these traits.

use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// Request Metadata
// =============================================================================

/// What the requester intends to do with the response (`Sec-Fetch-Dest`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Document,
    Script,
    Style,
    Image,
    Font,
    Manifest,
    Empty,
    Other,
}

impl Destination {
    /// Parse a `Sec-Fetch-Dest` header value
    pub fn from_header(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "document" | "iframe" | "frame" => Destination::Document,
            "script" | "worker" | "sharedworker" => Destination::Script,
            "style" => Destination::Style,
            "image" => Destination::Image,
            "font" => Destination::Font,
            "manifest" => Destination::Manifest,
            "empty" | "" => Destination::Empty,
            _ => Destination::Other,
        }
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Destination::Document => write!(f, "document"),
            Destination::Script => write!(f, "script"),
            Destination::Style => write!(f, "style"),
            Destination::Image => write!(f, "image"),
            Destination::Font => write!(f, "font"),
            Destination::Manifest => write!(f, "manifest"),
            Destination::Empty => write!(f, "empty"),
            Destination::Other => write!(f, "other"),
        }
    }
}

/// Request mode (`Sec-Fetch-Mode`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    Navigate,
    SameOrigin,
    NoCors,
    Cors,
}

impl RequestMode {
    /// Parse a `Sec-Fetch-Mode` header value
    pub fn from_header(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "navigate" => RequestMode::Navigate,
            "same-origin" => RequestMode::SameOrigin,
            "no-cors" => RequestMode::NoCors,
            _ => RequestMode::Cors,
        }
    }
}

/// How much of a response the agent is allowed to inspect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    /// Same-origin response
    Basic,
    /// Cross-origin response with CORS headers
    Cors,
    /// Cross-origin `no-cors` response
    Opaque,
}

// =============================================================================
// Request / Response
// =============================================================================

/// An outbound request from the hosting application
#[derive(Debug, Clone)]
pub struct AgentRequest {
    /// Upper-case HTTP method
    pub method: String,
    /// Absolute target URL
    pub url: Url,
    pub destination: Destination,
    pub mode: RequestMode,
    /// Headers to forward upstream
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    /// Identifier of the hosting-application client that issued the request
    pub client_id: Option<String>,
}

impl AgentRequest {
    /// Create a request with the given method and URL
    pub fn new(method: impl Into<String>, url: Url) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            url,
            destination: Destination::Empty,
            mode: RequestMode::Cors,
            headers: Vec::new(),
            body: Bytes::new(),
            client_id: None,
        }
    }

    /// Create a plain GET request, parsing the URL
    pub fn get(url: &str) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{}: {}", url, e)))?;
        Ok(Self::new("GET", url))
    }

    /// Create a top-level navigation request
    pub fn navigate(url: &str) -> Result<Self> {
        Ok(Self::get(url)?
            .with_destination(Destination::Document)
            .with_mode(RequestMode::Navigate))
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Whether the request targets the same origin as `origin`
    pub fn is_same_origin(&self, origin: &Url) -> bool {
        self.url.origin() == origin.origin()
    }

    /// Whether this request is a top-level navigation
    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }
}

/// A response as seen by the agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub kind: ResponseKind,
}

impl AgentResponse {
    /// Create a same-origin response
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
            kind: ResponseKind::Basic,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_kind(mut self, kind: ResponseKind) -> Self {
        self.kind = kind;
        self
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Exactly HTTP 200
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }
}

// =============================================================================
// Fetcher Port
// =============================================================================

/// Port for reaching the network
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Perform the request. Any HTTP status is `Ok`; only transport
    /// failures are errors.
    async fn fetch(&self, request: &AgentRequest) -> Result<AgentResponse>;
}

// =============================================================================
// Score Ledger Port
// =============================================================================

/// One row of the shared leaderboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRow {
    pub user_id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub display_name: String,
    pub total_score: i64,
}

/// Rows with a `null` name still count; the name is display-only
fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl ScoreRow {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>, total_score: i64) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            total_score,
        }
    }
}

/// Port for the remote score ledger
#[async_trait]
pub trait ScoreLedger: Send + Sync {
    /// Read every row, highest score first
    async fn read_scores(&self) -> Result<Vec<ScoreRow>>;

    /// Append one record to a named collection
    async fn append(&self, collection: &str, record: serde_json::Value) -> Result<()>;

    /// Name used in logs
    fn ledger_name(&self) -> &str;
}

// =============================================================================
// Notification Port
// =============================================================================

/// A request to show a notification to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub title: String,
    pub body: String,
    pub icon: String,
    /// Notifications sharing a tag replace each other
    pub tag: String,
    pub requested_at: DateTime<Utc>,
}

/// Port for displaying notifications
pub trait NotificationSink: Send + Sync {
    fn display(&self, request: NotificationRequest) -> Result<()>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type FetcherRef = Arc<dyn Fetcher>;
pub type ScoreLedgerRef = Arc<dyn ScoreLedger>;
pub type NotificationSinkRef = Arc<dyn NotificationSink>;
