//! Lifecycle Controller
//!
//! Drives install and activation of the current cache generation and hands
//! over to the monitoring daemon. There is no waiting state: a successful
//! install activates immediately.

use crate::cache::CacheManager;
use crate::domain::ports::FetcherRef;
use crate::error::{Error, Result};
use crate::lifecycle::clients::ClientRegistry;
use crate::monitor::MonitoringDaemon;
use parking_lot::RwLock;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

// =============================================================================
// State
// =============================================================================

/// Lifecycle state of the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Installing,
    Activating,
    Active,
    /// Install failed; this version never takes over
    Redundant,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Installing => write!(f, "installing"),
            LifecycleState::Activating => write!(f, "activating"),
            LifecycleState::Active => write!(f, "active"),
            LifecycleState::Redundant => write!(f, "redundant"),
        }
    }
}

/// Result of activation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    pub generation: String,
    pub evicted: Vec<String>,
    pub clients_claimed: usize,
}

// =============================================================================
// Controller
// =============================================================================

/// Runs Install → Activate for one cache generation
pub struct LifecycleController {
    state: RwLock<LifecycleState>,
    cache: Arc<CacheManager>,
    fetcher: FetcherRef,
    manifest: Vec<Url>,
    clients: Arc<ClientRegistry>,
    monitor: Arc<MonitoringDaemon>,
    /// Start monitoring as part of the lifecycle
    auto_monitor: bool,
}

impl LifecycleController {
    pub fn new(
        cache: Arc<CacheManager>,
        fetcher: FetcherRef,
        manifest: Vec<Url>,
        clients: Arc<ClientRegistry>,
        monitor: Arc<MonitoringDaemon>,
        auto_monitor: bool,
    ) -> Self {
        Self {
            state: RwLock::new(LifecycleState::Installing),
            cache,
            fetcher,
            manifest,
            clients,
            monitor,
            auto_monitor,
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.read()
    }

    pub fn is_active(&self) -> bool {
        self.state() == LifecycleState::Active
    }

    pub fn clients(&self) -> &Arc<ClientRegistry> {
        &self.clients
    }

    /// Install then activate
    pub async fn run(&self) -> Result<ActivationReport> {
        self.install().await?;
        self.activate().await
    }

    /// Open the current generation and pre-populate it from the manifest.
    /// Any failure makes this version redundant; a redundant version may be
    /// installed again.
    pub async fn install(&self) -> Result<usize> {
        if self.state() == LifecycleState::Redundant {
            self.transition(LifecycleState::Installing);
        }
        self.expect_state(LifecycleState::Installing, LifecycleState::Activating)?;
        let generation = self.cache.current_generation().to_string();
        info!(generation = %generation, resources = self.manifest.len(), "Installing");

        let installed: Result<usize> = async {
            self.cache.open().await?;
            self.cache
                .prepopulate(self.fetcher.as_ref(), &self.manifest)
                .await
        }
        .await;

        match installed {
            Ok(count) => {
                self.transition(LifecycleState::Activating);
                self.start_monitoring();
                Ok(count)
            }
            Err(e) => {
                error!(generation = %generation, error = %e, "Install failed");
                self.transition(LifecycleState::Redundant);
                Err(e)
            }
        }
    }

    /// Evict every other generation and claim open clients
    pub async fn activate(&self) -> Result<ActivationReport> {
        self.expect_state(LifecycleState::Activating, LifecycleState::Active)?;
        let generation = self.cache.current_generation().to_string();

        let evicted = match self.cache.evict_generations_except(&generation).await {
            Ok(evicted) => evicted,
            Err(e) => {
                // Stale generations only ever answer after the current one misses
                warn!(error = %e, "Evicting stale generations failed");
                Vec::new()
            }
        };
        let clients_claimed = self.clients.claim();

        self.transition(LifecycleState::Active);
        self.start_monitoring();

        info!(
            generation = %generation,
            evicted = evicted.len(),
            clients_claimed,
            "Activated"
        );
        Ok(ActivationReport {
            generation,
            evicted,
            clients_claimed,
        })
    }

    fn start_monitoring(&self) {
        if self.auto_monitor {
            self.monitor.start();
        }
    }

    fn expect_state(&self, expected: LifecycleState, next: LifecycleState) -> Result<()> {
        let current = self.state();
        if current != expected {
            return Err(Error::InvalidTransition {
                from: current.to_string(),
                to: next.to_string(),
            });
        }
        Ok(())
    }

    fn transition(&self, next: LifecycleState) {
        let mut state = self.state.write();
        info!(from = %*state, to = %next, "Lifecycle transition");
        *state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheKey, MemoryStorage};
    use crate::dispatch::{DispatcherConfig, ResponseSource, StrategyDispatcher};
    use crate::domain::ports::{AgentRequest, AgentResponse, Destination};
    use crate::ledger::MemoryScoreLedger;
    use crate::metrics::AgentMetrics;
    use crate::monitor::MonitorConfig;
    use crate::testing::ScriptedFetcher;
    use assert_matches::assert_matches;
    use std::time::Duration;

    const MANIFEST: &[&str] = &[
        "https://vocab.test/",
        "https://vocab.test/offline.html",
        "https://vocab.test/manifest.json",
        "https://vocab.test/icons/icon-192x192.png",
    ];

    struct Harness {
        controller: LifecycleController,
        dispatcher: StrategyDispatcher,
        cache: Arc<CacheManager>,
        storage: Arc<MemoryStorage>,
        fetcher: Arc<ScriptedFetcher>,
        monitor: Arc<MonitoringDaemon>,
    }

    fn scripted_manifest() -> ScriptedFetcher {
        MANIFEST.iter().fold(ScriptedFetcher::new(), |f, url| {
            f.respond(url, AgentResponse::new(200, format!("body of {}", url)))
        })
    }

    fn harness(fetcher: ScriptedFetcher) -> Harness {
        let storage = Arc::new(MemoryStorage::new());
        let cache = Arc::new(CacheManager::new("v2", storage.clone()));
        let fetcher = Arc::new(fetcher);
        let metrics = AgentMetrics::new().unwrap();
        let monitor = MonitoringDaemon::new(
            MonitorConfig::default(),
            Arc::new(MemoryScoreLedger::new()),
            metrics.clone(),
        );
        let manifest = MANIFEST.iter().map(|u| Url::parse(u).unwrap()).collect();
        let controller = LifecycleController::new(
            cache.clone(),
            fetcher.clone(),
            manifest,
            Arc::new(ClientRegistry::new()),
            monitor.clone(),
            true,
        );
        let dispatcher = StrategyDispatcher::new(
            DispatcherConfig {
                origin: Url::parse("https://vocab.test").unwrap(),
                api_prefix: "/api/".into(),
                offline_document: Url::parse("https://vocab.test/offline.html").unwrap(),
            },
            cache.clone(),
            fetcher.clone(),
            metrics,
        );
        Harness {
            controller,
            dispatcher,
            cache,
            storage,
            fetcher,
            monitor,
        }
    }

    async fn seed_previous_generation(storage: Arc<MemoryStorage>) {
        let previous = CacheManager::new("v1", storage);
        previous
            .put(
                CacheKey::get("https://vocab.test/old.js"),
                AgentResponse::new(200, "old"),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_install_and_activate() {
        let h = harness(scripted_manifest());
        seed_previous_generation(h.storage.clone()).await;

        let report = h.controller.run().await.unwrap();

        assert_eq!(h.controller.state(), LifecycleState::Active);
        assert_eq!(report.generation, "v2");
        assert_eq!(report.evicted, vec!["v1".to_string()]);
        assert_eq!(h.cache.generations().await.unwrap(), vec!["v2".to_string()]);
        assert!(h
            .cache
            .get(&CacheKey::get("https://vocab.test/old.js"))
            .await
            .unwrap()
            .is_miss());
        assert_eq!(h.cache.keys().await.unwrap().len(), MANIFEST.len());
        assert!(h.monitor.is_running());
        h.monitor.stop();
    }

    #[tokio::test]
    async fn test_manifest_served_from_cache_without_network() {
        let h = harness(scripted_manifest());
        h.controller.run().await.unwrap();
        h.monitor.stop();
        let calls_after_install = h.fetcher.call_count();

        let icon = AgentRequest::get("https://vocab.test/icons/icon-192x192.png")
            .unwrap()
            .with_destination(Destination::Image);
        let manifest = AgentRequest::get("https://vocab.test/manifest.json")
            .unwrap()
            .with_destination(Destination::Manifest);

        for request in [icon, manifest] {
            let outcome = h.dispatcher.handle(request).await.unwrap();
            assert_eq!(outcome.source, ResponseSource::Cache);
            assert_eq!(outcome.response.status, 200);
        }
        h.dispatcher.settle().await;
        assert_eq!(h.fetcher.call_count(), calls_after_install);
    }

    #[tokio::test]
    async fn test_install_failure_is_redundant() {
        let h = harness(scripted_manifest().fail("https://vocab.test/manifest.json"));
        seed_previous_generation(h.storage.clone()).await;

        assert_matches!(h.controller.run().await, Err(Error::PrepopulateFailed { .. }));
        assert_eq!(h.controller.state(), LifecycleState::Redundant);
        assert!(!h.monitor.is_running());

        // Nothing evicted, nothing half-written
        assert!(h
            .cache
            .get(&CacheKey::get("https://vocab.test/old.js"))
            .await
            .unwrap()
            .is_hit());
        assert!(h.cache.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_redundant_version_reinstalls() {
        let h = harness(scripted_manifest().fail("https://vocab.test/manifest.json"));

        assert_matches!(h.controller.run().await, Err(Error::PrepopulateFailed { .. }));
        assert_eq!(h.controller.state(), LifecycleState::Redundant);

        h.fetcher
            .set_response("https://vocab.test/manifest.json", AgentResponse::new(200, "{}"));
        h.controller.run().await.unwrap();

        assert!(h.controller.is_active());
        assert!(h.monitor.is_running());
        assert!(h
            .cache
            .get(&CacheKey::get("https://vocab.test/manifest.json"))
            .await
            .unwrap()
            .is_hit());
        h.monitor.stop();
    }

    #[tokio::test]
    async fn test_out_of_order_transitions() {
        let h = harness(scripted_manifest());
        assert_matches!(
            h.controller.activate().await,
            Err(Error::InvalidTransition { from, to }) if from == "installing" && to == "active"
        );

        h.controller.run().await.unwrap();
        assert_matches!(h.controller.install().await, Err(Error::InvalidTransition { .. }));
        h.monitor.stop();
    }

    #[tokio::test]
    async fn test_open_clients_claimed_on_activation() {
        let h = harness(scripted_manifest());
        let clients = h.controller.clients().clone();
        assert!(!clients.observe(Some("tab-1")));

        let report = h.controller.run().await.unwrap();
        assert_eq!(report.clients_claimed, 1);
        assert!(clients.is_controlled(Some("tab-1")));
        h.monitor.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_served_during_install() {
        let slow = scripted_manifest().delayed(
            "https://vocab.test/",
            Duration::from_secs(20),
            AgentResponse::new(200, "home v2"),
        );
        let h = Arc::new(harness(slow));
        seed_previous_generation(h.storage.clone()).await;

        let running = {
            let h = h.clone();
            tokio::spawn(async move { h.controller.run().await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.controller.state(), LifecycleState::Installing);

        // The previous generation still answers while install is in flight
        let old = AgentRequest::get("https://vocab.test/old.js")
            .unwrap()
            .with_destination(Destination::Script);
        let outcome = h.dispatcher.handle(old).await.unwrap();
        assert_eq!(outcome.source, ResponseSource::Cache);
        assert_eq!(outcome.response.body, "old");

        running.await.unwrap().unwrap();
        assert!(h.controller.is_active());
        h.dispatcher.settle().await;
        h.monitor.stop();
    }
}
