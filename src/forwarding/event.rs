//! Domain view of one inbound chat event.

use crate::daemon::{Attachment, Envelope};

/// An inbound event flattened out of the daemon's envelope.
///
/// Lives only for the duration of one dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundEvent {
    /// Sender address; receipts and reactions are addressed to it.
    pub source: String,
    pub sender_name: String,
    pub sender_uuid: String,
    /// Origin timestamp, milliseconds since the epoch.
    pub timestamp: u64,
    /// Message text, empty when the event carries none.
    pub text: String,
    pub attachments: Vec<Attachment>,
    pub group_id: Option<String>,
}

impl InboundEvent {
    /// Whether the event carries anything worth relaying.
    pub fn has_content(&self) -> bool {
        !self.text.is_empty() || !self.attachments.is_empty()
    }
}

impl From<Envelope> for InboundEvent {
    fn from(envelope: Envelope) -> Self {
        let data = envelope.data_message.unwrap_or_default();
        Self {
            source: envelope.source,
            sender_name: envelope.source_name,
            sender_uuid: envelope.source_uuid,
            timestamp: envelope.timestamp,
            text: data.message.unwrap_or_default(),
            attachments: data.attachments,
            group_id: data
                .group_info
                .map(|g| g.group_id)
                .filter(|id| !id.is_empty()),
        }
    }
}
