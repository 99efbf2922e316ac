//! In-memory daemon double for unit tests.

use std::sync::Mutex;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::daemon::{
    DaemonApi, GroupEntry, ReactionRequest, ReceiptRequest, SendMessageRequest,
};
use crate::error::DaemonError;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Fetch(String),
    Send(SendMessageRequest),
    Receipt(ReceiptRequest),
    Reaction(ReactionRequest),
}

/// Records every call in order. Attachment payloads are the base64 of their id.
#[derive(Default)]
pub struct RecordingDaemon {
    pub fail_fetch: bool,
    pub fail_send: bool,
    pub fail_receipt: bool,
    pub(crate) calls: Mutex<Vec<Call>>,
}

impl RecordingDaemon {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn sends(&self) -> Vec<SendMessageRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Send(req) => Some(req),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn failure(endpoint: &str) -> DaemonError {
        DaemonError::BadStatus {
            endpoint: endpoint.into(),
            status: 500,
            body: "boom".into(),
        }
    }
}

#[async_trait]
impl DaemonApi for RecordingDaemon {
    fn account(&self) -> &str {
        "+100"
    }

    async fn send_message(
        &self,
        request: &SendMessageRequest,
    ) -> Result<serde_json::Value, DaemonError> {
        self.record(Call::Send(request.clone()));
        if self.fail_send {
            return Err(Self::failure("/v2/send"));
        }
        Ok(serde_json::json!({"timestamp": "1"}))
    }

    async fn fetch_attachment(&self, id: &str) -> Result<String, DaemonError> {
        self.record(Call::Fetch(id.to_string()));
        if self.fail_fetch {
            return Err(Self::failure("/v1/attachments"));
        }
        Ok(STANDARD.encode(id))
    }

    async fn send_receipt(&self, request: &ReceiptRequest) -> Result<(), DaemonError> {
        self.record(Call::Receipt(request.clone()));
        if self.fail_receipt {
            return Err(Self::failure("/v1/receipts"));
        }
        Ok(())
    }

    async fn send_reaction(&self, request: &ReactionRequest) -> Result<(), DaemonError> {
        self.record(Call::Reaction(request.clone()));
        Ok(())
    }

    async fn list_groups(&self) -> Result<Vec<GroupEntry>, DaemonError> {
        Ok(Vec::new())
    }
}
