//! Push notifications announcing a live broadcast
//!
//! - `NotificationFanout` builds one message per listener token and sends them concurrently
//! - `FcmClient` delivers through Firebase Cloud Messaging
//! - `LogOnlyPushSender` stands in when push is disabled

pub mod fanout;
pub mod fcm;
pub mod messages;

pub use fanout::{FanoutReport, NotificationFanout};
pub use fcm::{FcmClient, ServiceAccountKey};
pub use messages::{BroadcastStatus, NotificationMessage};

use crate::error::Result;
use tracing::info;

/// Delivers a single push message
#[async_trait::async_trait]
pub trait PushSender: Send + Sync {
    /// Send one message, returning the provider's message id
    async fn send(&self, message: &NotificationMessage) -> Result<String>;

    /// Sender name for logging
    fn name(&self) -> &str;
}

/// Logs messages instead of delivering them
pub struct LogOnlyPushSender;

#[async_trait::async_trait]
impl PushSender for LogOnlyPushSender {
    async fn send(&self, message: &NotificationMessage) -> Result<String> {
        info!(
            venue = %message.venue_id,
            "Push disabled, would notify device about {}",
            message.playback_url
        );
        Ok(String::new())
    }

    fn name(&self) -> &str {
        "log-only"
    }
}
