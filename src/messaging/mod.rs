//! Messaging Gateway
//!
//! Control messages in (start/stop monitoring, push payloads), notification
//! display requests out.

pub mod gateway;
pub mod sink;

pub use gateway::{ControlAck, ControlMessage, MessagingGateway, NotificationDefaults, PushPayload};
pub use sink::BroadcastNotificationSink;
