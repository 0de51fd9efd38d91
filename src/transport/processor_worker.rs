//! Worker-context half of the protocol.

// ============================================================================
// Imports
// ============================================================================

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::protocol::{ClientPayload, PeerConnectionSample, WorkerCallback, WorkerPayload};

use super::boundary::{Inbox, Poster};

// ============================================================================
// ProcessorWorker
// ============================================================================

/// Worker-context sender toward the main context.
#[derive(Debug, Clone)]
pub struct ProcessorWorker {
    poster: Poster<WorkerPayload>,
}

impl ProcessorWorker {
    /// Wraps the sending half of a worker endpoint.
    #[inline]
    #[must_use]
    pub fn new(poster: Poster<WorkerPayload>) -> Self {
        Self { poster }
    }

    /// Asks for the session configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BoundaryClosed`] if the main context is gone.
    #[inline]
    pub fn request_initial_config(&self) -> Result<()> {
        self.poster.post(&WorkerPayload::RequestInitialConfig)
    }

    /// Asks for a fresh access token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BoundaryClosed`] if the main context is gone.
    #[inline]
    pub fn request_access_token(&self) -> Result<()> {
        self.poster.post(&WorkerPayload::RequestAccessToken)
    }

    /// Asks for a collection cycle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BoundaryClosed`] if the main context is gone.
    #[inline]
    pub fn request_raw_stats(&self) -> Result<()> {
        self.poster.post(&WorkerPayload::RequestRawStats)
    }

    /// Posts finished samples back for the local transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BoundaryClosed`] if the main context is gone.
    #[inline]
    pub fn send_transport_data(&self, samples: Vec<PeerConnectionSample>) -> Result<()> {
        self.poster.post(&WorkerPayload::OnLocalTransport(samples))
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Routes one main-context message to its handler.
pub fn dispatch(payload: ClientPayload, callback: &dyn WorkerCallback) {
    match payload {
        ClientPayload::OnRequestRawStats(raw_stats) => callback.on_response_raw_stats(raw_stats),
        ClientPayload::OnRequestInitialConfig(config) => {
            callback.on_response_initial_config(config);
        }
        ClientPayload::OnUserMediaError(error) => callback.on_user_media_error(error),
        ClientPayload::OnRequestAccessToken(token) => callback.on_access_token(token),
        ClientPayload::OnExtensionStats(stats) => callback.on_extension_stats(stats),
    }
}

/// Runs until the main context goes away.
pub async fn listen(mut inbox: Inbox<ClientPayload>, callback: &dyn WorkerCallback) {
    while let Some(message) = inbox.recv().await {
        match message {
            Ok(payload) => dispatch(payload, callback),
            Err(Error::UnknownMessage { what }) => {
                warn!(what = %what, "Unknown client message ignored");
            }
            Err(e) => warn!(error = %e, "Malformed client message dropped"),
        }
    }

    debug!("Main boundary closed, worker listener terminated");
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;

    use crate::collector::stats::{RawStats, UserMediaErrorPayload};
    use crate::protocol::{ExtensionStatsPayload, InitialConfig};
    use crate::transport::boundary::channel;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl WorkerCallback for Recorder {
        fn on_response_raw_stats(&self, raw_stats: Vec<RawStats>) {
            self.events.lock().push(format!("raw:{}", raw_stats.len()));
        }

        fn on_response_initial_config(&self, config: InitialConfig) {
            self.events.lock().push(format!("config:{}", config.poll_interval_ms));
        }

        fn on_user_media_error(&self, error: UserMediaErrorPayload) {
            self.events.lock().push(format!("media:{}", error.media_device_error));
        }

        fn on_extension_stats(&self, stats: ExtensionStatsPayload) {
            self.events
                .lock()
                .push(format!("ext:{}", stats.extension_type.unwrap_or_default()));
        }

        fn on_access_token(&self, token: String) {
            self.events.lock().push(format!("token:{token}"));
        }
    }

    #[tokio::test]
    async fn test_listen_routes_every_message() {
        let (main, worker) = channel();
        let (_poster, inbox) = worker.split();
        let recorder = Recorder::default();

        main.post(&ClientPayload::OnRequestInitialConfig(InitialConfig::new(
            "ws://a", 250,
        )))
        .unwrap();
        main.post(&ClientPayload::OnRequestRawStats(Vec::new())).unwrap();
        main.post(&ClientPayload::OnUserMediaError(UserMediaErrorPayload {
            media_device_error: "NotAllowedError".into(),
            browser_id: None,
            timestamp: 1,
        }))
        .unwrap();
        main.post(&ClientPayload::OnRequestAccessToken("abc".into()))
            .unwrap();
        main.post(&ClientPayload::OnExtensionStats(ExtensionStatsPayload::new(
            Some("cpu"),
            None,
        )))
        .unwrap();
        main.poster().post_raw(r#"{"what":"nope"}"#.into()).unwrap();
        drop(main);

        listen(inbox, &recorder).await;
        assert_eq!(
            *recorder.events.lock(),
            vec![
                "config:250",
                "raw:0",
                "media:NotAllowedError",
                "token:abc",
                "ext:cpu"
            ]
        );
    }

    #[tokio::test]
    async fn test_requests_reach_main() {
        let (mut main, worker) = channel();
        let processor_worker = ProcessorWorker::new(worker.poster());

        processor_worker.request_initial_config().unwrap();
        processor_worker.request_access_token().unwrap();
        processor_worker.request_raw_stats().unwrap();
        processor_worker.send_transport_data(Vec::new()).unwrap();

        let mut tags = Vec::new();
        for _ in 0..4 {
            tags.push(main.recv().await.unwrap().unwrap().what());
        }
        assert_eq!(tags, WorkerPayload::TAGS.to_vec());
    }
}
