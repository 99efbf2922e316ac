//! `reqwest` implementation of [`DaemonApi`].

use std::collections::BTreeMap;
use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::write::EncoderStringWriter;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, warn};

use super::DaemonApi;
use super::types::{GroupEntry, ReactionRequest, ReceiptRequest, SendMessageRequest};
use crate::config::Config;
use crate::error::DaemonError;

/// HTTP client for the daemon at `cli_address`.
pub struct HttpDaemon {
    base_url: String,
    number: String,
    client: reqwest::Client,
    retries: u32,
    backoff: Duration,
}

impl HttpDaemon {
    /// `address` is `host:port`; an explicit `http://` or `https://` scheme is kept.
    pub fn new(address: &str, number: &str) -> Self {
        let address = address.trim_end_matches('/');
        let base_url = if address.starts_with("http://") || address.starts_with("https://") {
            address.to_string()
        } else {
            format!("http://{address}")
        };

        Self {
            base_url,
            number: number.to_string(),
            client: reqwest::Client::new(),
            retries: 0,
            backoff: Duration::ZERO,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.cli_address, &config.self_number)
            .with_retry(config.send_retries, config.retry_backoff)
    }

    /// Retry POST calls up to `retries` extra times on transport errors and 5xx.
    pub fn with_retry(mut self, retries: u32, backoff: Duration) -> Self {
        self.retries = retries;
        self.backoff = backoff;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response, DaemonError> {
        let mut attempt = 0;
        loop {
            match self.client.post(self.url(path)).json(body).send().await {
                Ok(resp) if resp.status().is_server_error() && attempt < self.retries => {
                    warn!(endpoint = %path, status = %resp.status(), attempt, "Daemon call failed, retrying");
                }
                Ok(resp) => return Ok(resp),
                Err(e) if attempt < self.retries => {
                    warn!(endpoint = %path, error = %e, attempt, "Daemon call failed, retrying");
                }
                Err(e) => {
                    return Err(DaemonError::RequestFailed {
                        endpoint: path.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
            attempt += 1;
            tokio::time::sleep(self.backoff).await;
        }
    }

    async fn expect_no_content(
        &self,
        path: &str,
        resp: reqwest::Response,
    ) -> Result<(), DaemonError> {
        if resp.status() == StatusCode::NO_CONTENT {
            return Ok(());
        }
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Err(DaemonError::BadStatus {
            endpoint: path.to_string(),
            status,
            body,
        })
    }
}

#[async_trait]
impl DaemonApi for HttpDaemon {
    fn account(&self) -> &str {
        &self.number
    }

    async fn send_message(
        &self,
        request: &SendMessageRequest,
    ) -> Result<serde_json::Value, DaemonError> {
        let path = "/v2/send";
        let resp = self.post_json(path, request).await?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| DaemonError::InvalidResponse {
            endpoint: path.to_string(),
            reason: e.to_string(),
        })?;
        if !status.is_success() {
            return Err(DaemonError::BadStatus {
                endpoint: path.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| DaemonError::InvalidResponse {
            endpoint: path.to_string(),
            reason: e.to_string(),
        })
    }

    async fn fetch_attachment(&self, id: &str) -> Result<String, DaemonError> {
        let path = format!("/v1/attachments/{id}");
        let request_failed = |e: reqwest::Error| DaemonError::RequestFailed {
            endpoint: path.clone(),
            reason: e.to_string(),
        };

        let mut resp = self
            .client
            .get(self.url(&path))
            .send()
            .await
            .map_err(request_failed)?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(DaemonError::BadStatus {
                endpoint: path.clone(),
                status,
                body,
            });
        }

        // Encode chunk by chunk instead of buffering the raw payload first.
        let mut encoder = EncoderStringWriter::new(&STANDARD);
        let mut total = 0usize;
        while let Some(chunk) = resp.chunk().await.map_err(request_failed)? {
            total += chunk.len();
            encoder
                .write_all(&chunk)
                .map_err(|e| DaemonError::InvalidResponse {
                    endpoint: path.clone(),
                    reason: e.to_string(),
                })?;
        }
        debug!(attachment = %id, bytes = total, "Fetched attachment");

        Ok(encoder.into_inner())
    }

    async fn send_receipt(&self, request: &ReceiptRequest) -> Result<(), DaemonError> {
        let path = format!("/v1/receipts/{}", self.number);
        let resp = self.post_json(&path, request).await?;
        self.expect_no_content(&path, resp).await
    }

    async fn send_reaction(&self, request: &ReactionRequest) -> Result<(), DaemonError> {
        let path = format!("/v1/reactions/{}", self.number);
        let resp = self.post_json(&path, request).await?;
        self.expect_no_content(&path, resp).await
    }

    async fn list_groups(&self) -> Result<Vec<GroupEntry>, DaemonError> {
        let path = format!("/v1/groups/{}", self.number);
        let resp = self
            .client
            .get(self.url(&path))
            .send()
            .await
            .map_err(|e| DaemonError::RequestFailed {
                endpoint: path.clone(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| DaemonError::InvalidResponse {
            endpoint: path.clone(),
            reason: e.to_string(),
        })?;

        if status != StatusCode::OK {
            // The daemon reports failures as a flat {"error": "..."} object.
            let fields: BTreeMap<String, String> =
                serde_json::from_str(&body).map_err(|e| DaemonError::InvalidResponse {
                    endpoint: path.clone(),
                    reason: e.to_string(),
                })?;
            let message = fields
                .iter()
                .map(|(k, v)| format!("{k}: {v}"))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(DaemonError::Api(message));
        }

        Ok(serde_json::from_str(&body)?)
    }
}
