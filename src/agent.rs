//! Agent - wires the components together
//!
//! Owns the cache, dispatcher, lifecycle controller, monitoring daemon and
//! messaging gateway for one origin, and routes intercepted requests to
//! either the dispatcher or straight to the network.

use crate::cache::{
    CacheManager, CacheStatsSnapshot, GenerationStorageRef, LocalStorage, LocalStorageConfig,
    MemoryStorage, MemoryStorageConfig,
};
use crate::config::{AgentConfig, LedgerKind, StorageBackendKind};
use crate::dispatch::{DispatchOutcome, StrategyDispatcher};
use crate::domain::ports::{
    AgentRequest, AgentResponse, FetcherRef, NotificationRequest, ScoreLedgerRef,
};
use crate::error::{Error, Result};
use crate::ledger::{MemoryScoreLedger, RestScoreLedger};
use crate::lifecycle::{ActivationReport, ClientRegistry, LifecycleController, LifecycleState};
use crate::messaging::{BroadcastNotificationSink, MessagingGateway};
use crate::metrics::AgentMetrics;
use crate::monitor::MonitoringDaemon;
use crate::network::HttpFetcher;
use backoff::ExponentialBackoff;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

// =============================================================================
// Status
// =============================================================================

/// Snapshot served by the status route
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub version: String,
    pub state: LifecycleState,
    pub generation: String,
    pub generations: Vec<String>,
    pub cached_entries: usize,
    pub cache: CacheStatsSnapshot,
    pub monitoring: bool,
    pub tracked_users: usize,
    pub clients: usize,
    pub notification_subscribers: usize,
}

/// Response to an intercepted request
#[derive(Debug, Clone)]
pub struct Intercepted {
    pub response: AgentResponse,
    /// `None` when the client was not controlled and the request passed
    /// straight through
    pub outcome: Option<DispatchOutcome>,
}

// =============================================================================
// Agent
// =============================================================================

pub struct Agent {
    metrics: Arc<AgentMetrics>,
    cache: Arc<CacheManager>,
    dispatcher: Arc<StrategyDispatcher>,
    lifecycle: Arc<LifecycleController>,
    clients: Arc<ClientRegistry>,
    monitor: Arc<MonitoringDaemon>,
    gateway: Arc<MessagingGateway>,
    sink: Arc<BroadcastNotificationSink>,
    install_retry_max: Duration,
}

impl Agent {
    /// Assemble an agent from explicit adapters
    pub fn new(
        config: &AgentConfig,
        storage: GenerationStorageRef,
        fetcher: FetcherRef,
        ledger: ScoreLedgerRef,
        metrics: Arc<AgentMetrics>,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let cache = Arc::new(CacheManager::new(config.cache.version.clone(), storage));
        let dispatcher = Arc::new(StrategyDispatcher::new(
            config.dispatcher_config()?,
            cache.clone(),
            fetcher.clone(),
            metrics.clone(),
        ));
        let monitor = MonitoringDaemon::new(config.monitor.settings.clone(), ledger, metrics.clone());
        let clients = Arc::new(ClientRegistry::new());
        let lifecycle = Arc::new(LifecycleController::new(
            cache.clone(),
            fetcher,
            config.manifest_urls()?,
            clients.clone(),
            monitor.clone(),
            config.monitor.enabled,
        ));
        let sink = Arc::new(BroadcastNotificationSink::new(
            config.notifications.channel_capacity,
        ));
        let gateway = Arc::new(MessagingGateway::new(
            monitor.clone(),
            sink.clone(),
            config.notifications.clone(),
            metrics.clone(),
        ));

        Ok(Arc::new(Self {
            metrics,
            cache,
            dispatcher,
            lifecycle,
            clients,
            monitor,
            gateway,
            sink,
            install_retry_max: Duration::from_secs(config.cache.install_retry_max_secs),
        }))
    }

    /// Build the adapters named in the configuration
    pub async fn from_config(config: &AgentConfig) -> Result<Arc<Self>> {
        config.validate()?;

        let storage: GenerationStorageRef = match config.cache.backend {
            StorageBackendKind::Memory => Arc::new(MemoryStorage::with_config(MemoryStorageConfig {
                max_entries_per_generation: config.cache.max_entries_per_generation,
            })),
            StorageBackendKind::Local => Arc::new(
                LocalStorage::with_config(LocalStorageConfig {
                    root_path: config.cache.path.clone(),
                    ..Default::default()
                })
                .await?,
            ),
        };

        let fetcher: FetcherRef = Arc::new(HttpFetcher::new(
            config.origin()?,
            config.dispatch.fetch.clone(),
        )?);

        let ledger: ScoreLedgerRef = match config.ledger.kind {
            LedgerKind::Memory => Arc::new(MemoryScoreLedger::new()),
            LedgerKind::Rest => Arc::new(RestScoreLedger::new(config.ledger.rest.clone())?),
        };

        info!(
            generation = %config.cache.version,
            storage = storage.backend_name(),
            ledger = ledger.ledger_name(),
            origin = %config.dispatch.origin,
            "Agent assembled"
        );

        Self::new(config, storage, fetcher, ledger, AgentMetrics::new()?)
    }

    /// Install and activate the current generation
    pub async fn start(&self) -> Result<ActivationReport> {
        self.lifecycle.run().await
    }

    /// Like [`Agent::start`], but a failed install is retried with
    /// exponential backoff until it succeeds. Configuration and transition
    /// errors are not retried.
    pub async fn start_with_retry(&self) -> Result<ActivationReport> {
        let policy = ExponentialBackoff {
            max_interval: self.install_retry_max,
            max_elapsed_time: None,
            ..Default::default()
        };

        backoff::future::retry_notify(
            policy,
            || async {
                self.start().await.map_err(|e| match e {
                    Error::Configuration(_) | Error::InvalidTransition { .. } => {
                        backoff::Error::permanent(e)
                    }
                    other => backoff::Error::transient(other),
                })
            },
            |e: Error, wait: Duration| {
                warn!(error = %e, retry_in_ms = wait.as_millis() as u64, "Install failed, retrying");
            },
        )
        .await
    }

    /// Serve an intercepted request
    pub async fn intercept(&self, request: AgentRequest) -> Result<Intercepted> {
        if !self.clients.observe(request.client_id.as_deref()) {
            debug!(url = %request.url, client = ?request.client_id, "Uncontrolled client, passing through");
            let response = self.dispatcher.passthrough(request).await?;
            return Ok(Intercepted {
                response,
                outcome: None,
            });
        }

        let outcome = self.dispatcher.handle(request).await?;
        Ok(Intercepted {
            response: outcome.response.clone(),
            outcome: Some(outcome),
        })
    }

    /// Stop monitoring and wait for pending cache writes
    pub async fn shutdown(&self) {
        self.monitor.stop();
        self.dispatcher.settle().await;
        info!("Agent stopped");
    }

    pub async fn status(&self) -> AgentStatus {
        let generations = self.cache.generations().await.unwrap_or_default();
        let cached_entries = self.cache.keys().await.map(|k| k.len()).unwrap_or(0);
        AgentStatus {
            version: crate::VERSION.to_string(),
            state: self.lifecycle.state(),
            generation: self.cache.current_generation().to_string(),
            generations,
            cached_entries,
            cache: self.cache.stats(),
            monitoring: self.monitor.is_running(),
            tracked_users: self.monitor.tracked_users(),
            clients: self.clients.len(),
            notification_subscribers: self.sink.subscriber_count(),
        }
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<NotificationRequest> {
        self.sink.subscribe()
    }

    pub fn is_ready(&self) -> bool {
        self.lifecycle.is_active()
    }

    pub fn metrics(&self) -> &Arc<AgentMetrics> {
        &self.metrics
    }

    pub fn gateway(&self) -> &Arc<MessagingGateway> {
        &self.gateway
    }

    pub fn monitor(&self) -> &Arc<MonitoringDaemon> {
        &self.monitor
    }

    pub fn dispatcher(&self) -> &Arc<StrategyDispatcher> {
        &self.dispatcher
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }
}
