//! Messaging daemon API: the HTTP side of the companion process.
//!
//! Everything that talks to the daemon over HTTP goes through [`DaemonApi`].
//! The WebSocket receive side lives in [`crate::session`].

pub mod http;
pub mod types;

pub use http::HttpDaemon;
pub use types::*;

use async_trait::async_trait;

use crate::error::DaemonError;

/// Outbound operations offered by the daemon.
#[async_trait]
pub trait DaemonApi: Send + Sync {
    /// Number of the account the daemon sends as.
    fn account(&self) -> &str;

    /// `POST /v2/send`. Returns the decoded response body.
    async fn send_message(
        &self,
        request: &SendMessageRequest,
    ) -> Result<serde_json::Value, DaemonError>;

    /// `GET /v1/attachments/{id}`, returned as standard base64.
    async fn fetch_attachment(&self, id: &str) -> Result<String, DaemonError>;

    /// `POST /v1/receipts/{number}`. Succeeds only on 204.
    async fn send_receipt(&self, request: &ReceiptRequest) -> Result<(), DaemonError>;

    /// `POST /v1/reactions/{number}`. Succeeds only on 204.
    async fn send_reaction(&self, request: &ReactionRequest) -> Result<(), DaemonError>;

    /// `GET /v1/groups/{number}`.
    async fn list_groups(&self) -> Result<Vec<GroupEntry>, DaemonError>;
}
