//! Per-frame processing: decode, staleness check, dispatch.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::daemon::{DaemonApi, ReceiveFrame};
use crate::forwarding::{Dispatch, InboundEvent, Router};

/// What happened to one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Not a valid receive frame.
    Undecodable,
    /// Older than `ignore_older_messages`; a sync echo.
    Stale,
    Dispatched(Dispatch),
}

/// Current time in milliseconds since the epoch.
pub fn now_millis() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default()
}

/// True when an event stamped `timestamp` is older than `threshold_ms` at `now_ms`.
///
/// Future timestamps count as age zero. No threshold means nothing is stale.
pub fn is_sync_echo(now_ms: u64, timestamp: u64, threshold_ms: Option<u64>) -> bool {
    match threshold_ms {
        Some(threshold) => now_ms.saturating_sub(timestamp) > threshold,
        None => false,
    }
}

/// Decodes frames and drives the router. Shared with the session's read task.
pub struct FrameHandler {
    config: Arc<Config>,
    router: Router,
}

impl FrameHandler {
    pub fn new(config: Arc<Config>, daemon: Arc<dyn DaemonApi>) -> Self {
        Self {
            router: Router::new(Arc::clone(&config), daemon),
            config,
        }
    }

    pub async fn handle(&self, raw: &str, now_ms: u64) -> FrameOutcome {
        let frame: ReceiveFrame = match serde_json::from_str(raw) {
            Ok(frame) => frame,
            Err(e) => {
                error!(error = %e, "Decode error");
                return FrameOutcome::Undecodable;
            }
        };

        let timestamp = frame.envelope.timestamp;
        if is_sync_echo(now_ms, timestamp, self.config.ignore_older_messages) {
            debug!(
                now = now_ms,
                timestamp,
                age = now_ms.saturating_sub(timestamp),
                "Ignoring sync message"
            );
            return FrameOutcome::Stale;
        }

        let event = InboundEvent::from(frame.envelope);

        if self.config.is_print_messages && event.has_content() {
            info!(
                message = %event.text,
                author = %event.source,
                author_uuid = %event.sender_uuid,
                attachments = event.attachments.len(),
                group = %event.group_id.as_deref().unwrap_or_default(),
                "Message"
            );
        }
        debug!(frame = %raw, "recv");

        FrameOutcome::Dispatched(self.router.dispatch(&event).await)
    }
}
