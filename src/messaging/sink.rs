//! Notification sink fanning display requests out to subscribers

use crate::domain::ports::{NotificationRequest, NotificationSink};
use crate::error::Result;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Sink that logs each display request and broadcasts it to every
/// subscribed client
pub struct BroadcastNotificationSink {
    sender: broadcast::Sender<NotificationRequest>,
}

impl BroadcastNotificationSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationRequest> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl NotificationSink for BroadcastNotificationSink {
    fn display(&self, request: NotificationRequest) -> Result<()> {
        info!(title = %request.title, tag = %request.tag, "Displaying notification");
        // No subscribers is not an error; the request is still logged
        if let Err(e) = self.sender.send(request) {
            debug!(title = %e.0.title, "No notification subscribers");
        }
        Ok(())
    }
}
