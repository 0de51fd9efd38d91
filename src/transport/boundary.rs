//! Message channel between the main and worker contexts.
//!
//! The two contexts share no state. Every message is encoded to JSON text
//! before it crosses, so what the worker sees is byte-for-byte what an
//! out-of-process counterpart would see.
//!
//! Delivery is FIFO per direction. Nothing orders one direction against
//! the other.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::marker::PhantomData;

use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{Error, Result};
use crate::protocol::{ClientPayload, WorkerPayload};

// ============================================================================
// BoundaryMessage
// ============================================================================

/// A message type that can cross the boundary.
pub trait BoundaryMessage: Sized {
    /// Returns the `what` tag.
    fn what(&self) -> &'static str;

    /// Encodes to JSON text.
    fn encode(&self) -> Result<String>;

    /// Decodes from JSON text.
    fn decode(text: &str) -> Result<Self>;
}

impl BoundaryMessage for ClientPayload {
    fn what(&self) -> &'static str {
        ClientPayload::what(self)
    }

    fn encode(&self) -> Result<String> {
        ClientPayload::encode(self)
    }

    fn decode(text: &str) -> Result<Self> {
        ClientPayload::decode(text)
    }
}

impl BoundaryMessage for WorkerPayload {
    fn what(&self) -> &'static str {
        WorkerPayload::what(self)
    }

    fn encode(&self) -> Result<String> {
        WorkerPayload::encode(self)
    }

    fn decode(text: &str) -> Result<Self> {
        WorkerPayload::decode(text)
    }
}

// ============================================================================
// Types
// ============================================================================

/// Main-context end: posts [`ClientPayload`], receives [`WorkerPayload`].
pub type MainEndpoint = Endpoint<ClientPayload, WorkerPayload>;

/// Worker-context end: posts [`WorkerPayload`], receives [`ClientPayload`].
pub type WorkerEndpoint = Endpoint<WorkerPayload, ClientPayload>;

/// Creates a connected pair of endpoints.
#[must_use]
pub fn channel() -> (MainEndpoint, WorkerEndpoint) {
    let (to_worker_tx, to_worker_rx) = mpsc::unbounded_channel();
    let (to_main_tx, to_main_rx) = mpsc::unbounded_channel();

    let main = Endpoint {
        poster: Poster::new(to_worker_tx),
        inbox: Inbox::new(to_main_rx),
    };
    let worker = Endpoint {
        poster: Poster::new(to_main_tx),
        inbox: Inbox::new(to_worker_rx),
    };
    (main, worker)
}

// ============================================================================
// Poster
// ============================================================================

/// Sending half of an endpoint.
pub struct Poster<M> {
    tx: mpsc::UnboundedSender<String>,
    _message: PhantomData<fn(M)>,
}

impl<M> Clone for Poster<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            _message: PhantomData,
        }
    }
}

impl<M> fmt::Debug for Poster<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Poster")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl<M: BoundaryMessage> Poster<M> {
    fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self {
            tx,
            _message: PhantomData,
        }
    }

    /// Encodes and posts `message`.
    ///
    /// # Errors
    ///
    /// - [`Error::BoundaryClosed`] if the other side is gone
    /// - [`Error::Json`] if encoding fails
    pub fn post(&self, message: &M) -> Result<()> {
        let text = message.encode()?;
        trace!(what = message.what(), len = text.len(), "Posting message");
        self.post_raw(text)
    }

    /// Posts already-encoded text.
    pub(crate) fn post_raw(&self, text: String) -> Result<()> {
        self.tx.send(text).map_err(|_| Error::BoundaryClosed)
    }

    /// Returns `true` if the receiving side is gone.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// ============================================================================
// Inbox
// ============================================================================

/// Receiving half of an endpoint.
pub struct Inbox<M> {
    rx: mpsc::UnboundedReceiver<String>,
    _message: PhantomData<fn() -> M>,
}

impl<M> fmt::Debug for Inbox<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inbox").finish_non_exhaustive()
    }
}

impl<M: BoundaryMessage> Inbox<M> {
    fn new(rx: mpsc::UnboundedReceiver<String>) -> Self {
        Self {
            rx,
            _message: PhantomData,
        }
    }

    /// Waits for the next message.
    ///
    /// Returns `None` once the other side is gone and the queue is drained.
    /// Each item is decoded independently, so one bad message does not
    /// poison the stream.
    pub async fn recv(&mut self) -> Option<Result<M>> {
        let text = self.rx.recv().await?;
        Some(M::decode(&text))
    }

    /// Returns the next message if one is already queued.
    pub fn try_recv(&mut self) -> Option<Result<M>> {
        let text = self.rx.try_recv().ok()?;
        Some(M::decode(&text))
    }
}

// ============================================================================
// Endpoint
// ============================================================================

/// One side of the boundary.
#[derive(Debug)]
pub struct Endpoint<Out, In> {
    poster: Poster<Out>,
    inbox: Inbox<In>,
}

impl<Out: BoundaryMessage, In: BoundaryMessage> Endpoint<Out, In> {
    /// Encodes and posts `message` to the other side.
    ///
    /// # Errors
    ///
    /// See [`Poster::post`].
    #[inline]
    pub fn post(&self, message: &Out) -> Result<()> {
        self.poster.post(message)
    }

    /// Waits for the next message from the other side.
    #[inline]
    pub async fn recv(&mut self) -> Option<Result<In>> {
        self.inbox.recv().await
    }

    /// Returns the next message if one is already queued.
    #[inline]
    pub fn try_recv(&mut self) -> Option<Result<In>> {
        self.inbox.try_recv()
    }

    /// Returns a clone of the sending half.
    #[inline]
    #[must_use]
    pub fn poster(&self) -> Poster<Out> {
        self.poster.clone()
    }

    /// Splits into sending and receiving halves.
    #[inline]
    #[must_use]
    pub fn split(self) -> (Poster<Out>, Inbox<In>) {
        (self.poster, self.inbox)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::protocol::InitialConfig;

    #[tokio::test]
    async fn test_pair_is_cross_wired() {
        let (mut main, mut worker) = channel();

        main.post(&ClientPayload::OnRequestAccessToken("t".into()))
            .unwrap();
        worker.post(&WorkerPayload::RequestRawStats).unwrap();

        assert_eq!(
            worker.recv().await.unwrap().unwrap(),
            ClientPayload::OnRequestAccessToken("t".into())
        );
        assert_eq!(
            main.recv().await.unwrap().unwrap(),
            WorkerPayload::RequestRawStats
        );
    }

    #[tokio::test]
    async fn test_fifo_per_direction() {
        let (main, mut worker) = channel();
        for n in 0..5 {
            main.post(&ClientPayload::OnRequestAccessToken(n.to_string()))
                .unwrap();
        }
        for n in 0..5 {
            let msg = worker.recv().await.unwrap().unwrap();
            assert_eq!(msg, ClientPayload::OnRequestAccessToken(n.to_string()));
        }
    }

    #[tokio::test]
    async fn test_post_after_peer_dropped() {
        let (main, worker) = channel();
        drop(worker);
        let err = main
            .post(&ClientPayload::OnRequestInitialConfig(InitialConfig::new(
                "ws://a", 10,
            )))
            .unwrap_err();
        assert!(err.is_boundary_error());
    }

    #[tokio::test]
    async fn test_recv_ends_when_peer_dropped() {
        let (mut main, worker) = channel();
        worker.post(&WorkerPayload::RequestAccessToken).unwrap();
        drop(worker);

        assert!(main.recv().await.is_some());
        assert!(main.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_bad_message_does_not_poison_stream() {
        let (main, mut worker) = channel();
        main.poster().post_raw(r#"{"what":"selfDestruct"}"#.into()).unwrap();
        main.post(&ClientPayload::OnRequestAccessToken("ok".into()))
            .unwrap();

        assert!(matches!(
            worker.recv().await,
            Some(Err(Error::UnknownMessage { .. }))
        ));
        assert!(matches!(worker.recv().await, Some(Ok(_))));
    }

    #[test]
    fn test_try_recv_empty() {
        let (mut main, _worker) = channel();
        assert!(main.try_recv().is_none());
    }
}
