//! Prometheus metrics for the agent
//!
//! One registry per agent instance, served by the metrics listener.

use crate::error::{Error, Result};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Counters exported by the agent
pub struct AgentMetrics {
    registry: Registry,
    /// Requests handled, by strategy
    pub strategy_requests: IntCounterVec,
    /// Cache lookups made by the dispatcher, by outcome (hit/miss)
    pub cache_lookups: IntCounterVec,
    /// Best-effort cache writes that failed
    pub cache_write_failures: IntCounter,
    /// Requests answered with the offline document
    pub offline_fallbacks: IntCounter,
    /// Monitoring ticks, by outcome
    pub monitor_ticks: IntCounterVec,
    /// Score anomalies detected
    pub anomalies: IntCounter,
    /// Failed ledger appends, by collection
    pub ledger_write_failures: IntCounterVec,
    /// Users with a history window
    pub tracked_users: IntGauge,
    /// Notification display requests issued
    pub notifications: IntCounter,
}

fn to_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("metrics registration failed: {}", e))
}

impl AgentMetrics {
    /// Create and register all agent metrics
    pub fn new() -> Result<Arc<Self>> {
        let registry = Registry::new_custom(Some("vocab_agent".into()), None).map_err(to_error)?;

        let strategy_requests = IntCounterVec::new(
            Opts::new("strategy_requests_total", "Intercepted requests by caching strategy"),
            &["strategy"],
        )
        .map_err(to_error)?;
        let cache_lookups = IntCounterVec::new(
            Opts::new("cache_lookups_total", "Cache lookups by outcome"),
            &["outcome"],
        )
        .map_err(to_error)?;
        let cache_write_failures =
            IntCounter::new("cache_write_failures_total", "Failed best-effort cache writes")
                .map_err(to_error)?;
        let offline_fallbacks = IntCounter::new(
            "offline_fallbacks_total",
            "Navigations answered with the offline document",
        )
        .map_err(to_error)?;
        let monitor_ticks = IntCounterVec::new(
            Opts::new("monitor_ticks_total", "Monitoring ticks by outcome"),
            &["outcome"],
        )
        .map_err(to_error)?;
        let anomalies = IntCounter::new("score_anomalies_total", "Score anomalies detected")
            .map_err(to_error)?;
        let ledger_write_failures = IntCounterVec::new(
            Opts::new("ledger_write_failures_total", "Failed ledger appends by collection"),
            &["collection"],
        )
        .map_err(to_error)?;
        let tracked_users = IntGauge::new("tracked_users", "Users with a score history window")
            .map_err(to_error)?;
        let notifications =
            IntCounter::new("notifications_total", "Notification display requests issued")
                .map_err(to_error)?;

        registry.register(Box::new(strategy_requests.clone())).map_err(to_error)?;
        registry.register(Box::new(cache_lookups.clone())).map_err(to_error)?;
        registry.register(Box::new(cache_write_failures.clone())).map_err(to_error)?;
        registry.register(Box::new(offline_fallbacks.clone())).map_err(to_error)?;
        registry.register(Box::new(monitor_ticks.clone())).map_err(to_error)?;
        registry.register(Box::new(anomalies.clone())).map_err(to_error)?;
        registry.register(Box::new(ledger_write_failures.clone())).map_err(to_error)?;
        registry.register(Box::new(tracked_users.clone())).map_err(to_error)?;
        registry.register(Box::new(notifications.clone())).map_err(to_error)?;

        Ok(Arc::new(Self {
            registry,
            strategy_requests,
            cache_lookups,
            cache_write_failures,
            offline_fallbacks,
            monitor_ticks,
            anomalies,
            ledger_write_failures,
            tracked_users,
            notifications,
        }))
    }

    /// Render all metrics in the Prometheus text format
    pub fn encode(&self) -> Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| Error::Internal(format!("metrics encoding failed: {}", e)))?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_contains_counters() {
        let metrics = AgentMetrics::new().unwrap();
        metrics.strategy_requests.with_label_values(&["network_only"]).inc();
        metrics.anomalies.inc();

        let (content_type, body) = metrics.encode().unwrap();
        let text = String::from_utf8(body).unwrap();

        assert!(content_type.starts_with("text/plain"));
        assert!(text.contains("vocab_agent_strategy_requests_total{strategy=\"network_only\"} 1"));
        assert!(text.contains("vocab_agent_score_anomalies_total 1"));
    }

    #[test]
    fn test_independent_registries() {
        // Each instance owns its registry, so two agents never collide
        let a = AgentMetrics::new().unwrap();
        let b = AgentMetrics::new().unwrap();
        a.anomalies.inc();
        assert_eq!(a.anomalies.get(), 1);
        assert_eq!(b.anomalies.get(), 0);
    }
}
