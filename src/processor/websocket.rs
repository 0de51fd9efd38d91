//! Reconnecting websocket delivery to the remote aggregator.
//!
//! # Connection Loop
//!
//! The transport spawns a tokio task that:
//!
//! - Connects to the aggregator, with the access token in the query string
//! - Flushes samples queued while disconnected
//! - Sends each sample as one JSON text frame
//! - Reconnects with growing delay after a drop, up to [`MAX_RETRIES`]
//! - Asks for a fresh access token when the server closes with a code in
//!   [`REISSUE_TOKEN_CODES`]

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::PeerConnectionSample;

use super::SampleTransport;

// ============================================================================
// Constants
// ============================================================================

/// Timeout for one connection attempt.
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Samples kept while disconnected. Older ones are dropped first.
pub const MAX_ENQUEUED_MESSAGES: usize = 120;

/// Consecutive failed attempts before the transport gives up.
pub const MAX_RETRIES: u32 = 100;

/// Close codes meaning the access token was rejected.
pub const REISSUE_TOKEN_CODES: RangeInclusive<u16> = 4224..=4227;

/// Delay before the first reconnect.
const MIN_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Upper bound for the reconnect delay.
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(10);

/// Growth factor between consecutive reconnect delays.
const RECONNECT_GROWTH: f64 = 1.3;

// ============================================================================
// Types
// ============================================================================

/// Called when the aggregator rejects the access token.
pub type TokenRequestHandler = Box<dyn Fn() + Send + Sync>;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Internal commands for the connection loop.
enum TransportCommand {
    /// Deliver one encoded sample.
    Send(String),
    /// Close the socket and stop reconnecting.
    Close,
}

/// Why a connected session ended.
enum SessionEnd {
    /// Socket dropped, reconnect.
    Lost,
    /// Transport closed, stop.
    Closed,
}

// ============================================================================
// WebSocketTransport
// ============================================================================

/// Websocket client toward the aggregator.
pub struct WebSocketTransport {
    /// Channel to the connection loop.
    command_tx: mpsc::UnboundedSender<TransportCommand>,
    /// Token used for the next connection attempt.
    access_token: Arc<RwLock<Option<String>>>,
    /// Address without the token.
    server_address: Url,
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("server_address", &self.server_address.as_str())
            .finish_non_exhaustive()
    }
}

impl WebSocketTransport {
    /// Starts the connection loop toward `address`.
    ///
    /// Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] if `address` does not parse
    /// - [`Error::InvalidAddress`] if the scheme is not `ws` or `wss`
    pub fn connect(
        address: &str,
        access_token: Option<String>,
        on_token_request: TokenRequestHandler,
    ) -> Result<Self> {
        let server_address = parse_server_address(address)?;
        let access_token = Arc::new(RwLock::new(access_token));
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_connection_loop(
            server_address.clone(),
            Arc::clone(&access_token),
            command_rx,
            on_token_request,
        ));

        Ok(Self {
            command_tx,
            access_token,
            server_address,
        })
    }

    /// Returns the URL the next connection attempt will use.
    #[must_use]
    pub fn server_url(&self) -> Url {
        server_url(&self.server_address, self.access_token.read().as_deref())
    }

    /// Queues one sample for delivery.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the sample cannot be encoded
    /// - [`Error::Transport`] if the transport was closed
    pub fn send(&self, sample: &PeerConnectionSample) -> Result<()> {
        let json = serde_json::to_string(sample)?;
        trace!(len = json.len(), "Queueing sample");
        self.command_tx
            .send(TransportCommand::Send(json))
            .map_err(|_| Error::transport("websocket transport is closed"))
    }
}

impl SampleTransport for WebSocketTransport {
    fn send_bulk(&self, samples: Vec<PeerConnectionSample>) -> Result<()> {
        for sample in &samples {
            self.send(sample)?;
        }
        Ok(())
    }

    fn update_access_token(&self, token: Option<String>) {
        *self.access_token.write() = token;
        debug!("Access token updated for next connection");
    }

    fn close(&self) {
        let _ = self.command_tx.send(TransportCommand::Close);
    }
}

// ============================================================================
// Address Helpers
// ============================================================================

/// Parses and checks an aggregator address.
///
/// # Errors
///
/// - [`Error::Url`] if `address` does not parse
/// - [`Error::InvalidAddress`] if the scheme is not `ws` or `wss`
pub fn parse_server_address(address: &str) -> Result<Url> {
    let url = Url::parse(address)?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(Error::invalid_address(
            address,
            format!("scheme must be ws or wss, got {other}"),
        )),
    }
}

/// Appends `accessToken=<token>` to `address` when a token is set.
#[must_use]
pub fn server_url(address: &Url, token: Option<&str>) -> Url {
    let mut url = address.clone();
    if let Some(token) = token.filter(|t| !t.is_empty()) {
        let pair = format!("accessToken={}", urlencoding::encode(token));
        let query = match address.query() {
            Some(existing) if !existing.is_empty() => format!("{existing}&{pair}"),
            _ => pair,
        };
        url.set_query(Some(&query));
    }
    url
}

/// Delay before reconnect attempt number `attempt` (1-based).
fn reconnect_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(32) as i32;
    MIN_RECONNECT_DELAY
        .mul_f64(RECONNECT_GROWTH.powi(exponent))
        .min(MAX_RECONNECT_DELAY)
}

/// Appends `text`, dropping the oldest entry when full.
fn enqueue(queue: &mut VecDeque<String>, text: String) {
    if queue.len() >= MAX_ENQUEUED_MESSAGES {
        queue.pop_front();
        debug!(max = MAX_ENQUEUED_MESSAGES, "Send queue full, oldest sample dropped");
    }
    queue.push_back(text);
}

// ============================================================================
// Connection Loop
// ============================================================================

async fn run_connection_loop(
    server_address: Url,
    access_token: Arc<RwLock<Option<String>>>,
    mut command_rx: mpsc::UnboundedReceiver<TransportCommand>,
    on_token_request: TokenRequestHandler,
) {
    let mut queue = VecDeque::new();
    let mut failures = 0u32;

    'reconnect: loop {
        let url = server_url(&server_address, access_token.read().as_deref());

        let Some(attempt) = open_socket(&url, &mut queue, &mut command_rx).await else {
            break 'reconnect;
        };

        match attempt {
            Ok(socket) => {
                info!(address = %server_address, "Websocket opened");
                failures = 0;
                let end = drive_session(socket, &mut queue, &mut command_rx, &on_token_request).await;
                if let SessionEnd::Closed = end {
                    break 'reconnect;
                }
            }
            Err(e) if !e.is_recoverable() => {
                error!(error = %e, address = %server_address, "Websocket address unusable, giving up");
                break 'reconnect;
            }
            Err(e) => {
                warn!(error = %e, address = %server_address, "Websocket connection failed");
            }
        }

        failures += 1;
        if failures > MAX_RETRIES {
            error!(retries = MAX_RETRIES, "Websocket reconnect attempts exhausted");
            break;
        }

        let delay = reconnect_delay(failures);
        debug!(attempt = failures, delay_ms = delay.as_millis() as u64, "Reconnecting");

        let pause = sleep(delay);
        tokio::pin!(pause);
        loop {
            tokio::select! {
                _ = &mut pause => break,
                command = command_rx.recv() => match command {
                    Some(TransportCommand::Send(text)) => enqueue(&mut queue, text),
                    Some(TransportCommand::Close) | None => break 'reconnect,
                },
            }
        }
    }

    if !queue.is_empty() {
        debug!(count = queue.len(), "Unsent samples discarded");
    }
    debug!("Websocket connection loop terminated");
}

/// Connects to `url`, queueing samples that arrive during the handshake.
///
/// Returns `None` if the transport was closed before the attempt settled.
async fn open_socket(
    url: &Url,
    queue: &mut VecDeque<String>,
    command_rx: &mut mpsc::UnboundedReceiver<TransportCommand>,
) -> Option<Result<Socket>> {
    let connecting = timeout(CONNECTION_TIMEOUT, connect_async(url.as_str()));
    tokio::pin!(connecting);

    loop {
        tokio::select! {
            result = &mut connecting => {
                return Some(match result {
                    Ok(Ok((socket, _response))) => Ok(socket),
                    Ok(Err(e)) => Err(connect_error(url, e)),
                    Err(_) => Err(Error::connection(format!(
                        "timed out after {}ms",
                        CONNECTION_TIMEOUT.as_millis()
                    ))),
                });
            }

            command = command_rx.recv() => match command {
                Some(TransportCommand::Send(text)) => enqueue(queue, text),
                Some(TransportCommand::Close) | None => return None,
            },
        }
    }
}

/// Maps a handshake failure. URL problems never resolve by retrying.
fn connect_error(url: &Url, e: WsError) -> Error {
    match e {
        WsError::Url(reason) => Error::invalid_address(url.as_str(), reason.to_string()),
        other => Error::from(other),
    }
}

/// Runs one connected session until the socket drops or the transport closes.
async fn drive_session(
    socket: Socket,
    queue: &mut VecDeque<String>,
    command_rx: &mut mpsc::UnboundedReceiver<TransportCommand>,
    on_token_request: &TokenRequestHandler,
) -> SessionEnd {
    let (mut ws_write, mut ws_read) = socket.split();

    while let Some(text) = queue.pop_front() {
        if let Err(e) = ws_write.send(Message::Text(text.clone().into())).await {
            warn!(error = %e, "Failed to flush queued sample");
            queue.push_front(text);
            return SessionEnd::Lost;
        }
    }

    loop {
        tokio::select! {
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Close(frame))) => {
                        let code = frame.as_ref().map(|f| u16::from(f.code));
                        warn!(?code, "Websocket closed");
                        if code.is_some_and(|c| REISSUE_TOKEN_CODES.contains(&c)) {
                            on_token_request();
                        }
                        return SessionEnd::Lost;
                    }

                    Some(Err(e)) => {
                        warn!(error = %e, "Websocket error");
                        return SessionEnd::Lost;
                    }

                    None => {
                        debug!("Websocket stream ended");
                        return SessionEnd::Lost;
                    }

                    // Aggregator replies are not consumed
                    Some(Ok(_)) => {}
                }
            }

            command = command_rx.recv() => {
                match command {
                    Some(TransportCommand::Send(text)) => {
                        if let Err(e) = ws_write.send(Message::Text(text.clone().into())).await {
                            warn!(error = %e, "Failed to send sample");
                            enqueue(queue, text);
                            return SessionEnd::Lost;
                        }
                    }

                    Some(TransportCommand::Close) | None => {
                        let _ = ws_write.close().await;
                        info!("Websocket closed by transport");
                        return SessionEnd::Closed;
                    }
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
