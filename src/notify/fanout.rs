use super::messages::{BroadcastStatus, NotificationMessage};
use super::PushSender;
use crate::venue::VenueId;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of one fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FanoutReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Sends one push per listener token, concurrently and independently
#[derive(Clone)]
pub struct NotificationFanout {
    sender: Arc<dyn PushSender>,
}

impl NotificationFanout {
    pub fn new(sender: Arc<dyn PushSender>) -> Self {
        Self { sender }
    }

    /// Announce a live broadcast to every token.
    ///
    /// A failed delivery is logged and counted; it never affects the others.
    pub async fn dispatch(
        &self,
        venue: &VenueId,
        playback_url: &str,
        tokens: Vec<String>,
    ) -> FanoutReport {
        if tokens.is_empty() {
            info!(venue = %venue, "No listeners registered, skipping notification");
            return FanoutReport::default();
        }

        let sends = tokens.into_iter().map(|token| {
            let sender = Arc::clone(&self.sender);
            let message = NotificationMessage {
                token,
                venue_id: venue.to_string(),
                playback_url: playback_url.to_string(),
                status: BroadcastStatus::Broadcasting,
            };
            async move {
                let result = sender.send(&message).await;
                (message.token, result)
            }
        });

        let mut report = FanoutReport::default();
        for (token, result) in join_all(sends).await {
            report.attempted += 1;
            match result {
                Ok(_) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(venue = %venue, "Push to {} failed: {}", redact(&token), e);
                }
            }
        }

        info!(
            venue = %venue,
            "Notified listeners via {} ({} delivered, {} failed)",
            self.sender.name(),
            report.delivered,
            report.failed
        );

        report
    }
}

/// Only a prefix of a device token goes into logs
fn redact(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    format!("{}…", prefix)
}
