//! Wire types of the messaging daemon's JSON contract.

use serde::{Deserialize, Deserializer, Serialize};

/// Treat an explicit JSON `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ── Inbound (WebSocket receive) ─────────────────────────────────────────

/// One frame received on `/v1/receive/{number}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReceiveFrame {
    pub envelope: Envelope,
    #[serde(default)]
    pub account: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default, deserialize_with = "null_as_default")]
    pub source: String,
    #[serde(default)]
    pub source_number: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub source_uuid: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub source_name: String,
    #[serde(default)]
    pub source_device: u32,
    /// Origin timestamp in milliseconds since the epoch.
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub sync_message: Option<serde_json::Value>,
    #[serde(default)]
    pub data_message: Option<DataMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataMessage {
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub expires_in_seconds: u64,
    #[serde(default)]
    pub view_once: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub group_info: Option<GroupInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    #[serde(default, deserialize_with = "null_as_default")]
    pub group_id: String,
    #[serde(default, rename = "type")]
    pub kind: String,
}

/// Attachment descriptor as the daemon reports it. The payload itself is
/// fetched separately by `id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(default, deserialize_with = "null_as_default")]
    pub content_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub filename: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub upload_timestamp: Option<u64>,
}

// ── Outbound (HTTP) ─────────────────────────────────────────────────────

/// Body of `POST /v2/send`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SendMessageRequest {
    pub message: String,
    pub number: String,
    pub recipients: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub base64_attachments: Vec<String>,
    pub mentions: Vec<Mention>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mention {
    pub start: i64,
    pub length: i64,
    pub author: String,
}

/// Body of `POST /v1/receipts/{number}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceiptRequest {
    pub receipt_type: String,
    pub recipient: String,
    pub timestamp: u64,
}

/// Body of `POST /v1/reactions/{number}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReactionRequest {
    pub reaction: String,
    pub recipient: String,
    pub target_author: String,
    pub timestamp: u64,
}

/// One entry of `GET /v1/groups/{number}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub internal_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub admins: Vec<String>,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub blocked: bool,
    #[serde(default)]
    pub invite_link: String,
    #[serde(default)]
    pub pending_invites: Vec<String>,
    #[serde(default)]
    pub pending_requests: Vec<String>,
}
