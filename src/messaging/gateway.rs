//! Control channel and push payload handling

use crate::domain::ports::{NotificationRequest, NotificationSinkRef};
use crate::error::Result;
use crate::metrics::AgentMetrics;
use crate::monitor::MonitoringDaemon;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

// =============================================================================
// Messages
// =============================================================================

/// Control message from the hosting application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    StartMonitoring,
    StopMonitoring,
}

/// Push payload; either field may be missing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Result of a control message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControlAck {
    /// Whether monitoring is running after the message
    pub monitoring: bool,
    /// Whether the message changed anything
    pub changed: bool,
}

// =============================================================================
// Defaults
// =============================================================================

/// Values used when a push payload omits fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationDefaults {
    pub title: String,
    pub body: String,
    pub icon: String,
    /// De-duplication tag; a newer notification replaces an older one
    pub tag: String,
    /// Buffered notifications per subscriber
    pub channel_capacity: usize,
}

impl Default for NotificationDefaults {
    fn default() -> Self {
        Self {
            title: "Vocab Game".to_string(),
            body: "Time to practise your words!".to_string(),
            icon: "/icons/icon-192x192.png".to_string(),
            tag: "vocab-notification".to_string(),
            channel_capacity: 64,
        }
    }
}

// =============================================================================
// Gateway
// =============================================================================

/// Routes control messages to the daemon and push payloads to the sink
pub struct MessagingGateway {
    monitor: Arc<MonitoringDaemon>,
    sink: NotificationSinkRef,
    defaults: NotificationDefaults,
    metrics: Arc<AgentMetrics>,
}

impl MessagingGateway {
    pub fn new(
        monitor: Arc<MonitoringDaemon>,
        sink: NotificationSinkRef,
        defaults: NotificationDefaults,
        metrics: Arc<AgentMetrics>,
    ) -> Self {
        Self {
            monitor,
            sink,
            defaults,
            metrics,
        }
    }

    pub fn handle_control(&self, message: ControlMessage) -> ControlAck {
        info!(message = ?message, "Control message received");
        let changed = match message {
            ControlMessage::StartMonitoring => self.monitor.start(),
            ControlMessage::StopMonitoring => self.monitor.stop(),
        };
        ControlAck {
            monitoring: self.monitor.is_running(),
            changed,
        }
    }

    /// Convert a push payload into a display request and hand it to the sink
    pub fn handle_push(&self, payload: PushPayload) -> Result<NotificationRequest> {
        let request = self.to_request(payload);
        self.sink.display(request.clone())?;
        self.metrics.notifications.inc();
        Ok(request)
    }

    fn to_request(&self, payload: PushPayload) -> NotificationRequest {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        NotificationRequest {
            title: non_empty(payload.title).unwrap_or_else(|| self.defaults.title.clone()),
            body: non_empty(payload.message).unwrap_or_else(|| self.defaults.body.clone()),
            icon: self.defaults.icon.clone(),
            tag: self.defaults.tag.clone(),
            requested_at: Utc::now(),
        }
    }
}
