//! Strategy Dispatcher
//!
//! Serves each intercepted request with the strategy its class selects.
//! Cache writes never delay a response: they run as tracked background
//! tasks and failures are only logged.

use crate::cache::{CacheKey, CacheLookupResult, CacheManager};
use crate::dispatch::classify::{Classifier, ResourceClass, Strategy};
use crate::domain::ports::{AgentRequest, AgentResponse, FetcherRef, ResponseKind};
use crate::error::Result;
use crate::metrics::AgentMetrics;
use reqwest::Url;
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

const OFFLINE_PAGE: &str = "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Offline</title></head>\
<body><h1>You are offline</h1><p>Reconnect to keep practising.</p></body></html>";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the dispatcher
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Application origin; everything else is cross-origin
    pub origin: Url,
    /// Path prefix of backend calls
    pub api_prefix: String,
    /// Document served when a navigation cannot be satisfied
    pub offline_document: Url,
}

// =============================================================================
// Outcome
// =============================================================================

/// Where a response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    OfflineFallback,
}

impl std::fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseSource::Network => write!(f, "network"),
            ResponseSource::Cache => write!(f, "cache"),
            ResponseSource::OfflineFallback => write!(f, "offline"),
        }
    }
}

/// A served response plus how it was produced
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub response: AgentResponse,
    pub class: ResourceClass,
    pub strategy: Strategy,
    pub source: ResponseSource,
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Per-request strategy dispatch
pub struct StrategyDispatcher {
    classifier: Classifier,
    offline_key: CacheKey,
    cache: Arc<CacheManager>,
    fetcher: FetcherRef,
    metrics: Arc<AgentMetrics>,
    /// Background cache writes and revalidations
    background: TaskTracker,
}

impl StrategyDispatcher {
    pub fn new(
        config: DispatcherConfig,
        cache: Arc<CacheManager>,
        fetcher: FetcherRef,
        metrics: Arc<AgentMetrics>,
    ) -> Self {
        Self {
            classifier: Classifier::new(config.origin, config.api_prefix),
            offline_key: CacheKey::get(config.offline_document.to_string()),
            cache,
            fetcher,
            metrics,
            background: TaskTracker::new(),
        }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Classify and serve a request
    pub async fn handle(&self, request: AgentRequest) -> Result<DispatchOutcome> {
        let class = self.classifier.classify(&request);
        let strategy = class.strategy();
        self.metrics
            .strategy_requests
            .with_label_values(&[strategy.as_str()])
            .inc();

        debug!(url = %request.url, class = %class, strategy = %strategy, "Dispatching request");

        let (response, source) = match strategy {
            Strategy::NetworkOnly => (self.fetcher.fetch(&request).await?, ResponseSource::Network),
            Strategy::NetworkFirst => self.network_first(&request).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(&request).await?,
            Strategy::CacheFirst => self.cache_first(&request).await?,
        };

        Ok(DispatchOutcome {
            response,
            class,
            strategy,
            source,
        })
    }

    /// Forward without touching the cache, for clients the agent does not
    /// control yet
    pub async fn passthrough(&self, request: AgentRequest) -> Result<AgentResponse> {
        self.fetcher.fetch(&request).await
    }

    /// Wait for all background cache writes and revalidations to finish
    pub async fn settle(&self) {
        self.background.close();
        self.background.wait().await;
        self.background.reopen();
    }

    // -------------------------------------------------------------------------
    // Strategies
    // -------------------------------------------------------------------------

    async fn network_first(&self, request: &AgentRequest) -> (AgentResponse, ResponseSource) {
        match self.fetcher.fetch(request).await {
            Ok(response) if response.is_ok() => {
                self.store_in_background(CacheKey::for_request(request), response.clone());
                (response, ResponseSource::Network)
            }
            Ok(response) if response.is_server_error() => match self.lookup(request).await {
                Some(cached) => {
                    debug!(url = %request.url, status = response.status, "Serving cached copy over server error");
                    (cached, ResponseSource::Cache)
                }
                None => (response, ResponseSource::Network),
            },
            Ok(response) => (response, ResponseSource::Network),
            Err(e) => {
                debug!(url = %request.url, error = %e, "Network failed, falling back to cache");
                match self.lookup(request).await {
                    Some(cached) => (cached, ResponseSource::Cache),
                    None => (self.offline_document().await, ResponseSource::OfflineFallback),
                }
            }
        }
    }

    async fn stale_while_revalidate(
        &self,
        request: &AgentRequest,
    ) -> Result<(AgentResponse, ResponseSource)> {
        if let Some(cached) = self.lookup(request).await {
            self.revalidate_in_background(request.clone());
            return Ok((cached, ResponseSource::Cache));
        }

        let response = self.fetcher.fetch(request).await?;
        if self.is_revalidation_eligible(request, &response) {
            self.store_in_background(CacheKey::for_request(request), response.clone());
        }
        Ok((response, ResponseSource::Network))
    }

    async fn cache_first(&self, request: &AgentRequest) -> Result<(AgentResponse, ResponseSource)> {
        if let Some(cached) = self.lookup(request).await {
            return Ok((cached, ResponseSource::Cache));
        }
        Ok((self.fetcher.fetch(request).await?, ResponseSource::Network))
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    /// Cache lookup where storage errors count as a miss
    async fn lookup(&self, request: &AgentRequest) -> Option<AgentResponse> {
        let result = match self.cache.match_request(request).await {
            Ok(result) => result,
            Err(e) => {
                warn!(url = %request.url, error = %e, "Cache lookup failed");
                CacheLookupResult::Miss
            }
        };
        let outcome = if result.is_hit() { "hit" } else { "miss" };
        self.metrics.cache_lookups.with_label_values(&[outcome]).inc();
        result.into_response()
    }

    /// Opaque and cross-origin responses are never written on this path
    fn is_revalidation_eligible(&self, request: &AgentRequest, response: &AgentResponse) -> bool {
        response.is_ok()
            && response.kind == ResponseKind::Basic
            && request.is_same_origin(self.classifier.origin())
    }

    async fn offline_document(&self) -> AgentResponse {
        self.metrics.offline_fallbacks.inc();
        match self.cache.get(&self.offline_key).await {
            Ok(CacheLookupResult::Hit { entry, .. }) => entry.response,
            _ => AgentResponse::new(503, OFFLINE_PAGE)
                .with_header("Content-Type", "text/html; charset=utf-8"),
        }
    }

    fn store_in_background(&self, key: CacheKey, response: AgentResponse) {
        let cache = self.cache.clone();
        let metrics = self.metrics.clone();
        self.background.spawn(async move {
            if let Err(e) = cache.put(key.clone(), response).await {
                metrics.cache_write_failures.inc();
                warn!(key = %key, error = %e, "Cache write failed");
            }
        });
    }

    fn revalidate_in_background(&self, request: AgentRequest) {
        let cache = self.cache.clone();
        let fetcher = self.fetcher.clone();
        let metrics = self.metrics.clone();
        let origin = self.classifier.origin().clone();
        self.background.spawn(async move {
            let response = match fetcher.fetch(&request).await {
                Ok(response) => response,
                Err(e) => {
                    debug!(url = %request.url, error = %e, "Revalidation failed");
                    return;
                }
            };
            let eligible = response.is_ok()
                && response.kind == ResponseKind::Basic
                && request.is_same_origin(&origin);
            if !eligible {
                return;
            }
            let key = CacheKey::for_request(&request);
            if let Err(e) = cache.put(key.clone(), response).await {
                metrics.cache_write_failures.inc();
                warn!(key = %key, error = %e, "Cache write failed");
            }
        });
    }
}
