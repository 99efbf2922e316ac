//! Turns a relay decision into daemon API calls.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::info;

use crate::daemon::{Attachment, DaemonApi, ReactionRequest, ReceiptRequest, SendMessageRequest};
use crate::error::DaemonError;

/// Prefix of the daemon's native group addressing form.
pub const GROUP_PREFIX: &str = "group.";

/// Map a configured destination id to the daemon's group recipient form.
pub fn recipient_id(group_id: &str) -> String {
    if group_id.starts_with(GROUP_PREFIX) {
        group_id.to_string()
    } else {
        format!("{GROUP_PREFIX}{}", STANDARD.encode(group_id))
    }
}

/// Wrap an encoded attachment payload as a self-describing data URI.
pub fn data_uri(attachment: &Attachment, base64_payload: &str) -> String {
    format!(
        "data:{};filename={};base64,{}",
        attachment.content_type, attachment.filename, base64_payload
    )
}

/// Builds and sends outbound messages, receipts and reactions.
pub struct Composer {
    daemon: Arc<dyn DaemonApi>,
}

impl Composer {
    pub fn new(daemon: Arc<dyn DaemonApi>) -> Self {
        Self { daemon }
    }

    /// Resolve attachments and send one message to all `receivers`.
    ///
    /// Returns `Ok(None)` without calling the daemon when there is neither
    /// text nor an attachment. A failed attachment fetch aborts before the send.
    pub async fn relay(
        &self,
        receivers: &[String],
        attachments: &[Attachment],
        text: &str,
    ) -> Result<Option<serde_json::Value>, DaemonError> {
        if text.is_empty() && attachments.is_empty() {
            return Ok(None);
        }

        let mut base64_attachments = Vec::with_capacity(attachments.len());
        for attachment in attachments {
            let payload = self.daemon.fetch_attachment(&attachment.id).await?;
            base64_attachments.push(data_uri(attachment, &payload));
        }

        let request = SendMessageRequest {
            message: text.to_string(),
            number: self.daemon.account().to_string(),
            recipients: receivers.iter().map(|r| recipient_id(r)).collect(),
            base64_attachments,
            mentions: Vec::new(),
        };

        info!(
            receivers = %receivers.join(","),
            attachments = attachments.len(),
            "Sending message"
        );
        let response = self.daemon.send_message(&request).await?;
        info!(response = %response, "Message sent");

        Ok(Some(response))
    }

    /// Send a read receipt for the message `timestamp` from `recipient`.
    pub async fn mark_read(&self, recipient: &str, timestamp: u64) -> Result<(), DaemonError> {
        info!(timestamp, "Marking message as read");
        self.daemon
            .send_receipt(&ReceiptRequest {
                receipt_type: "read".into(),
                recipient: recipient.to_string(),
                timestamp,
            })
            .await
    }

    /// React to a message with `reaction`. An empty glyph does nothing.
    pub async fn react(
        &self,
        reaction: &str,
        recipient: &str,
        target_author: &str,
        timestamp: u64,
    ) -> Result<(), DaemonError> {
        if reaction.is_empty() {
            return Ok(());
        }

        info!(timestamp, reaction = %reaction, "Reacting to message");
        self.daemon
            .send_reaction(&ReactionRequest {
                reaction: reaction.to_string(),
                recipient: recipient.to_string(),
                target_author: target_author.to_string(),
                timestamp,
            })
            .await
    }
}
