//! REST Score Ledger
//!
//! Talks to a PostgREST-style leaderboard service: tables are addressed as
//! `{base_url}/{table}`, rows are read with `select`/`order` query
//! parameters and records are appended with a JSON `POST`.

use crate::domain::ports::{ScoreLedger, ScoreRow};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the REST ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestLedgerConfig {
    /// Base URL of the REST endpoint, e.g. `https://db.example.com/rest/v1`
    pub base_url: String,
    /// API key sent as `apikey` and as a bearer token
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Table holding the leaderboard rows
    pub score_table: String,
    /// Per-request timeout in seconds
    pub timeout_secs: Option<u64>,
}

impl Default for RestLedgerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:54321/rest/v1".to_string(),
            api_key: None,
            score_table: "leaderboard".to_string(),
            timeout_secs: Some(10),
        }
    }
}

// =============================================================================
// REST Ledger
// =============================================================================

/// Ledger backed by a REST service
pub struct RestScoreLedger {
    client: reqwest::Client,
    base_url: String,
    score_table: String,
}

impl RestScoreLedger {
    pub fn new(config: RestLedgerConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &config.api_key {
            let apikey = HeaderValue::from_str(key)
                .map_err(|e| Error::Configuration(format!("invalid ledger api key: {}", e)))?;
            let bearer = HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|e| Error::Configuration(format!("invalid ledger api key: {}", e)))?;
            headers.insert("apikey", apikey);
            headers.insert(AUTHORIZATION, bearer);
        }

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            client: builder.build()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            score_table: config.score_table,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.base_url, urlencoding::encode(table))
    }
}

#[async_trait]
impl ScoreLedger for RestScoreLedger {
    async fn read_scores(&self) -> Result<Vec<ScoreRow>> {
        let url = format!(
            "{}?select=user_id,display_name,total_score&order=total_score.desc",
            self.table_url(&self.score_table)
        );
        debug!(url = %url, "Reading leaderboard");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::LedgerUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::LedgerUnavailable(format!(
                "{} returned HTTP {}",
                self.score_table, status
            )));
        }

        response
            .json::<Vec<ScoreRow>>()
            .await
            .map_err(|e| Error::LedgerUnavailable(format!("malformed leaderboard: {}", e)))
    }

    async fn append(&self, collection: &str, record: serde_json::Value) -> Result<()> {
        let write_error = |reason: String| Error::LedgerWrite {
            collection: collection.to_string(),
            reason,
        };

        let response = self
            .client
            .post(self.table_url(collection))
            .header("Prefer", "return=minimal")
            .json(&record)
            .send()
            .await
            .map_err(|e| write_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(write_error(format!("HTTP {}", status)));
        }
        Ok(())
    }

    fn ledger_name(&self) -> &str {
        "rest"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use axum::extract::{Path, RawQuery, State};
    use axum::http::{HeaderMap as AxumHeaders, StatusCode};
    use axum::routing::get;
    use axum::{Json, Router};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct Recorded {
        queries: Vec<String>,
        api_keys: Vec<String>,
        posts: Vec<(String, serde_json::Value)>,
    }

    type Shared = Arc<Mutex<Recorded>>;

    async fn read_table(
        State(state): State<Shared>,
        Path(table): Path<String>,
        RawQuery(query): RawQuery,
        headers: AxumHeaders,
    ) -> std::result::Result<Json<serde_json::Value>, StatusCode> {
        let mut recorded = state.lock();
        recorded.queries.push(query.unwrap_or_default());
        if let Some(key) = headers.get("apikey").and_then(|v| v.to_str().ok()) {
            recorded.api_keys.push(key.to_string());
        }
        match table.as_str() {
            "leaderboard" => Ok(Json(serde_json::json!([
                {"user_id": "u1", "display_name": "Ada", "total_score": 900},
                {"user_id": "u2", "total_score": 400}
            ]))),
            "anonymous" => Ok(Json(serde_json::json!([
                {"user_id": "u1", "display_name": null, "total_score": 700},
                {"user_id": "u2", "display_name": "Bob", "total_score": 300}
            ]))),
            _ => Err(StatusCode::SERVICE_UNAVAILABLE),
        }
    }

    async fn append_row(
        State(state): State<Shared>,
        Path(table): Path<String>,
        Json(body): Json<serde_json::Value>,
    ) -> StatusCode {
        if table == "readonly" {
            return StatusCode::FORBIDDEN;
        }
        state.lock().posts.push((table, body));
        StatusCode::CREATED
    }

    async fn serve() -> (String, Shared) {
        let state: Shared = Arc::new(Mutex::new(Recorded::default()));
        let app = Router::new()
            .route("/rest/v1/:table", get(read_table).post(append_row))
            .with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/rest/v1", addr), state)
    }

    fn ledger(base_url: String, score_table: &str) -> RestScoreLedger {
        RestScoreLedger::new(RestLedgerConfig {
            base_url,
            api_key: Some("secret".into()),
            score_table: score_table.into(),
            timeout_secs: Some(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_read_scores() {
        let (base, state) = serve().await;
        let rows = ledger(base, "leaderboard").read_scores().await.unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], ScoreRow::new("u1", "Ada", 900));
        assert_eq!(rows[1].display_name, "");

        let recorded = state.lock();
        assert_eq!(
            recorded.queries[0],
            "select=user_id,display_name,total_score&order=total_score.desc"
        );
        assert_eq!(recorded.api_keys, ["secret"]);
    }

    #[tokio::test]
    async fn test_null_display_name_keeps_the_row() {
        let (base, _) = serve().await;
        let rows = ledger(base, "anonymous").read_scores().await.unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], ScoreRow::new("u1", "", 700));
        assert_eq!(rows[1], ScoreRow::new("u2", "Bob", 300));
    }

    #[tokio::test]
    async fn test_read_failure_is_unavailable() {
        let (base, _) = serve().await;
        assert_matches!(
            ledger(base, "missing").read_scores().await,
            Err(Error::LedgerUnavailable(_))
        );

        // Nothing listening
        let closed = ledger("http://127.0.0.1:9/rest/v1".into(), "leaderboard");
        assert_matches!(closed.read_scores().await, Err(Error::LedgerUnavailable(_)));
    }

    #[tokio::test]
    async fn test_append() {
        let (base, state) = serve().await;
        let ledger = ledger(base, "leaderboard");

        ledger
            .append("score_backups", serde_json::json!({"user_id": "u1", "score": 800}))
            .await
            .unwrap();
        assert_matches!(
            ledger.append("readonly", serde_json::json!({})).await,
            Err(Error::LedgerWrite { collection, .. }) if collection == "readonly"
        );

        let recorded = state.lock();
        assert_eq!(recorded.posts.len(), 1);
        assert_eq!(recorded.posts[0].0, "score_backups");
        assert_eq!(recorded.posts[0].1["score"], 800);
    }
}
