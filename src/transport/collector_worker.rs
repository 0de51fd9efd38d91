//! Main-context half of the protocol.
//!
//! [`CollectorWorker`] posts [`ClientPayload`] messages and runs the loop
//! that routes incoming [`WorkerPayload`] messages to a [`ClientCallback`].
//!
//! # Dispatch Loop
//!
//! The loop holds the callback weakly. It ends when the worker side goes
//! away or when the callback owner is dropped, whichever comes first.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Weak;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::collector::stats::{RawStats, UserMediaErrorPayload};
use crate::error::{Error, Result};
use crate::protocol::{
    ClientCallback, ClientPayload, ExtensionStatsPayload, InitialConfig, WorkerPayload,
};

use super::boundary::{Inbox, Poster};

// ============================================================================
// CollectorWorker
// ============================================================================

/// Main-context sender toward the worker.
#[derive(Debug)]
pub struct CollectorWorker {
    /// `None` once closed.
    poster: Mutex<Option<Poster<ClientPayload>>>,
}

impl CollectorWorker {
    /// Wraps the sending half of a main endpoint.
    #[must_use]
    pub fn new(poster: Poster<ClientPayload>) -> Self {
        Self {
            poster: Mutex::new(Some(poster)),
        }
    }

    /// Delivers a collection cycle's snapshots.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BoundaryClosed`] if the worker is gone.
    #[inline]
    pub fn send_raw_stats(&self, raw_stats: Vec<RawStats>) -> Result<()> {
        self.post(&ClientPayload::OnRequestRawStats(raw_stats))
    }

    /// Delivers the session configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BoundaryClosed`] if the worker is gone.
    #[inline]
    pub fn send_initial_config(&self, config: InitialConfig) -> Result<()> {
        self.post(&ClientPayload::OnRequestInitialConfig(config))
    }

    /// Delivers a user-media error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BoundaryClosed`] if the worker is gone.
    #[inline]
    pub fn send_user_media_error(&self, error: UserMediaErrorPayload) -> Result<()> {
        self.post(&ClientPayload::OnUserMediaError(error))
    }

    /// Delivers a resolved access token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BoundaryClosed`] if the worker is gone.
    #[inline]
    pub fn send_access_token(&self, token: String) -> Result<()> {
        self.post(&ClientPayload::OnRequestAccessToken(token))
    }

    /// Pushes an extension measurement.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BoundaryClosed`] if the worker is gone.
    #[inline]
    pub fn add_extension_stats(&self, stats: ExtensionStatsPayload) -> Result<()> {
        self.post(&ClientPayload::OnExtensionStats(stats))
    }

    /// Drops the sending half. The worker sees its inbox close.
    pub fn close(&self) {
        if self.poster.lock().take().is_some() {
            debug!("Collector boundary closed");
        }
    }

    /// Returns `true` once closed locally or by the worker.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.poster.lock().as_ref().is_none_or(Poster::is_closed)
    }

    fn post(&self, message: &ClientPayload) -> Result<()> {
        let poster = self.poster.lock().clone().ok_or(Error::BoundaryClosed)?;
        poster.post(message)
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Routes one worker message to its handler.
pub fn dispatch(payload: WorkerPayload, callback: &dyn ClientCallback) {
    match payload {
        WorkerPayload::RequestInitialConfig => callback.on_request_initial_config(),
        WorkerPayload::RequestAccessToken => callback.on_request_access_token(),
        WorkerPayload::RequestRawStats => callback.on_request_raw_stats(),
        WorkerPayload::OnLocalTransport(samples) => callback.on_transport_callback(samples),
    }
}

/// Spawns the dispatch loop for `inbox`.
pub fn spawn_listener<C>(inbox: Inbox<WorkerPayload>, callback: Weak<C>) -> JoinHandle<()>
where
    C: ClientCallback + 'static,
{
    tokio::spawn(run_dispatch_loop(inbox, callback))
}

async fn run_dispatch_loop<C>(mut inbox: Inbox<WorkerPayload>, callback: Weak<C>)
where
    C: ClientCallback + 'static,
{
    while let Some(message) = inbox.recv().await {
        let Some(callback) = callback.upgrade() else {
            debug!("Client callback dropped, stopping dispatch");
            return;
        };

        match message {
            Ok(payload) => dispatch(payload, callback.as_ref()),
            Err(Error::UnknownMessage { what }) => {
                warn!(what = %what, "Unknown worker message ignored");
            }
            Err(e) => callback.on_error(e),
        }
    }

    debug!("Worker boundary closed, dispatch loop terminated");
}

// ============================================================================
// Tests
// ============================================================================
