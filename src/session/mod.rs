//! Streaming session with the daemon.
//!
//! One WebSocket at `/v1/receive/{number}`, split in two halves:
//! - the read half belongs to a spawned task that decodes frames and feeds
//!   the [`FrameHandler`]; it never writes;
//! - the write half stays in [`SessionManager::run_until`], which sends a
//!   keepalive every tick and the close frame on shutdown.

pub mod frame;

pub use frame::{FrameHandler, FrameOutcome, is_sync_echo, now_millis};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::{SinkExt, Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::daemon::DaemonApi;
use crate::error::SessionError;

/// Timer settings of a session.
#[derive(Debug, Clone, Copy)]
pub struct SessionTiming {
    /// Interval between keepalive frames.
    pub keepalive: Duration,
    /// How long shutdown waits for the daemon to close the socket.
    pub close_timeout: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            keepalive: Duration::from_secs(1),
            close_timeout: Duration::from_secs(5),
        }
    }
}

/// Owns the daemon connection for the lifetime of the process.
pub struct SessionManager {
    config: Arc<Config>,
    handler: Arc<FrameHandler>,
    timing: SessionTiming,
}

impl SessionManager {
    pub fn new(config: Arc<Config>, daemon: Arc<dyn DaemonApi>) -> Self {
        Self {
            handler: Arc::new(FrameHandler::new(Arc::clone(&config), daemon)),
            config,
            timing: SessionTiming::default(),
        }
    }

    pub fn with_timing(mut self, timing: SessionTiming) -> Self {
        self.timing = timing;
        self
    }

    /// `ws://{cli_address}/v1/receive/{self_number}`.
    pub fn receive_url(&self) -> String {
        let address = self
            .config
            .cli_address
            .trim_start_matches("http://")
            .trim_start_matches("https://")
            .trim_end_matches('/');
        format!("ws://{address}/v1/receive/{}", self.config.self_number)
    }

    /// Run until Ctrl+C.
    pub async fn run(self) -> Result<(), SessionError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run until `shutdown` resolves, then close the socket gracefully.
    ///
    /// Returns `SessionError::Closed` if the daemon ends the session first.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), SessionError>
    where
        F: Future<Output = ()>,
    {
        let url = self.receive_url();
        info!(url = %url, "Connecting to daemon");

        let (socket, _response) =
            connect_async(url.as_str())
                .await
                .map_err(|e| SessionError::ConnectFailed {
                    url: url.clone(),
                    reason: e.to_string(),
                })?;
        info!(url = %url, "Session connected");

        let (mut sink, stream) = socket.split();
        let mut reader = tokio::spawn(read_loop(stream, Arc::clone(&self.handler)));

        let mut ticker = tokio::time::interval(self.timing.keepalive);
        ticker.tick().await; // Skip immediate first tick

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut reader => {
                    warn!("Daemon ended the session");
                    return Err(SessionError::Closed);
                }
                _ = ticker.tick() => {
                    let stamp = Utc::now().to_rfc3339();
                    if let Err(e) = sink.send(Message::Text(stamp.into())).await {
                        error!(error = %e, "Keepalive write failed");
                        reader.abort();
                        return Err(SessionError::WriteFailed(e.to_string()));
                    }
                }
                _ = &mut shutdown => {
                    info!("Interrupt received, closing session");
                    let close = Message::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: "".into(),
                    }));
                    if let Err(e) = sink.send(close).await {
                        error!(error = %e, "Close write failed");
                        reader.abort();
                        return Err(SessionError::WriteFailed(e.to_string()));
                    }
                    if tokio::time::timeout(self.timing.close_timeout, &mut reader).await.is_err() {
                        warn!("Daemon did not close the session in time");
                        reader.abort();
                    }
                    return Ok(());
                }
            }
        }
    }
}

/// Errors after which the stream yields nothing useful.
fn is_terminal(err: &WsError) -> bool {
    matches!(
        err,
        WsError::ConnectionClosed | WsError::AlreadyClosed | WsError::Io(_) | WsError::Protocol(_)
    )
}

async fn read_loop<S>(mut stream: S, handler: Arc<FrameHandler>)
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        let raw = match frame {
            Ok(Message::Text(text)) => text.as_str().to_owned(),
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => text,
                Err(e) => {
                    error!(error = %e, "Binary frame is not UTF-8");
                    continue;
                }
            },
            Ok(Message::Close(frame)) => {
                info!(frame = ?frame, "Daemon sent close frame");
                break;
            }
            Ok(_) => continue,
            Err(e) if is_terminal(&e) => {
                warn!(error = %e, "Read loop stopped");
                break;
            }
            Err(e) => {
                error!(error = %e, "Read error");
                continue;
            }
        };

        let outcome = handler.handle(&raw, now_millis()).await;
        debug!(outcome = ?outcome, "Frame processed");
    }
}
