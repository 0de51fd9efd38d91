//! Worker-context processor.
//!
//! # Lifecycle
//!
//! 1. [`run`] posts `requestInitialConfig`
//! 2. The first [`InitialConfig`] picks the transport and starts polling
//! 3. Each raw-stats response becomes one batch of samples
//! 4. When the main context goes away the scheduler and transport close

// ============================================================================
// Imports
// ============================================================================

use std::mem;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, trace, warn};

use crate::collector::stats::{RawStats, UserMediaErrorPayload};
use crate::error::Result;
use crate::protocol::{
    ExtensionStatsPayload, InitialConfig, PeerConnectionSample, TransportType, WorkerCallback,
};
use crate::transport::{ProcessorWorker, WorkerEndpoint, processor_worker};
use crate::updater::IntervalUpdater;

use super::extension_stats::ExtensionStats;
use super::local::LocalForwarder;
use super::websocket::WebSocketTransport;
use super::SampleTransport;

// ============================================================================
// Constants
// ============================================================================

/// Delay before asking again after a configuration could not be applied.
pub const CONFIG_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Configurations tried before the processor stays unconfigured.
pub const MAX_CONFIG_ATTEMPTS: u32 = 5;

// ============================================================================
// Session
// ============================================================================

/// State fixed by the first accepted configuration.
struct Session {
    config: InitialConfig,
    transport: Box<dyn SampleTransport>,
    updater: IntervalUpdater,
}

// ============================================================================
// Processor
// ============================================================================

/// Worker-side protocol handler.
pub struct Processor {
    worker: ProcessorWorker,
    session: Mutex<Option<Session>>,
    extension_stats: Mutex<ExtensionStats>,
    media_errors: Mutex<Vec<UserMediaErrorPayload>>,
    config_attempts: AtomicU32,
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("configured", &self.is_configured())
            .field("extension_stats", &self.extension_stats.lock().len())
            .field("media_errors", &self.media_errors.lock().len())
            .finish()
    }
}

impl Processor {
    /// Creates a processor answering through `worker`.
    #[must_use]
    pub fn new(worker: ProcessorWorker) -> Self {
        Self {
            worker,
            session: Mutex::new(None),
            extension_stats: Mutex::new(ExtensionStats::new()),
            media_errors: Mutex::new(Vec::new()),
            config_attempts: AtomicU32::new(0),
        }
    }

    /// Returns `true` once a configuration has been accepted.
    #[inline]
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Returns the accepted configuration, if any.
    #[must_use]
    pub fn config(&self) -> Option<InitialConfig> {
        self.session.lock().as_ref().map(|s| s.config.clone())
    }

    /// Stops polling and closes the transport.
    pub fn close(&self) {
        if let Some(session) = self.session.lock().take() {
            session.updater.close();
            session.transport.close();
            debug!("Processor closed");
        }
    }

    fn open_transport(&self, config: &InitialConfig) -> Result<Box<dyn SampleTransport>> {
        match config.transport_type {
            TransportType::Local => Ok(Box::new(LocalForwarder::new(self.worker.clone()))),
            TransportType::Remote => {
                let worker = self.worker.clone();
                let transport = WebSocketTransport::connect(
                    &config.remote_address,
                    config.access_token.clone(),
                    Box::new(move || {
                        if let Err(e) = worker.request_access_token() {
                            debug!(error = %e, "Access token request not delivered");
                        }
                    }),
                )?;
                Ok(Box::new(transport))
            }
        }
    }

    fn start_polling(&self, config: &InitialConfig) -> Result<IntervalUpdater> {
        let worker = self.worker.clone();
        IntervalUpdater::start(config.poll_interval(), move || {
            if let Err(e) = worker.request_raw_stats() {
                debug!(error = %e, "Raw stats request not delivered");
            }
        })
    }

    /// Asks the main context for its configuration again after a delay.
    fn retry_initial_config(&self) {
        let attempt = self.config_attempts.fetch_add(1, Ordering::Relaxed) + 1;
        if attempt >= MAX_CONFIG_ATTEMPTS {
            error!(attempts = attempt, "Initial config rejected, processor stays unconfigured");
            return;
        }

        debug!(
            attempt,
            delay_ms = CONFIG_RETRY_DELAY.as_millis() as u64,
            "Requesting initial config again"
        );
        let worker = self.worker.clone();
        tokio::spawn(async move {
            sleep(CONFIG_RETRY_DELAY).await;
            if let Err(e) = worker.request_initial_config() {
                debug!(error = %e, "Initial config request not delivered");
            }
        });
    }

    /// Builds one sample per connection, draining buffered side data into the first.
    fn build_samples(&self, raw_stats: Vec<RawStats>) -> Vec<PeerConnectionSample> {
        let mut samples: Vec<PeerConnectionSample> =
            raw_stats.into_iter().map(PeerConnectionSample::from).collect();

        if let Some(first) = samples.first_mut() {
            first.extension_stats = self.extension_stats.lock().pick();
            first.user_media_errors = mem::take(&mut *self.media_errors.lock());
        }

        samples
    }
}

impl WorkerCallback for Processor {
    fn on_response_raw_stats(&self, raw_stats: Vec<RawStats>) {
        let guard = self.session.lock();
        let Some(session) = guard.as_ref() else {
            debug!(count = raw_stats.len(), "Raw stats before configuration dropped");
            return;
        };

        let samples = self.build_samples(raw_stats);
        trace!(count = samples.len(), "Samples built");

        if let Err(e) = session.transport.send_bulk(samples) {
            warn!(error = %e, "Sample delivery failed");
        }
    }

    fn on_response_initial_config(&self, config: InitialConfig) {
        let mut guard = self.session.lock();
        if guard.is_some() {
            warn!("Initial config already applied, ignoring");
            return;
        }

        let transport = match self.open_transport(&config) {
            Ok(transport) => transport,
            Err(e) => {
                error!(error = %e, "Failed to open transport");
                self.retry_initial_config();
                return;
            }
        };

        let updater = match self.start_polling(&config) {
            Ok(updater) => updater,
            Err(e) => {
                error!(error = %e, "Failed to start polling");
                transport.close();
                self.retry_initial_config();
                return;
            }
        };

        info!(
            transport = ?config.transport_type,
            poll_interval_ms = config.poll_interval_ms,
            "Processor configured"
        );

        *guard = Some(Session {
            config,
            transport,
            updater,
        });
    }

    fn on_user_media_error(&self, error: UserMediaErrorPayload) {
        debug!(media_device_error = %error.media_device_error, "User media error buffered");
        self.media_errors.lock().push(error);
    }

    fn on_extension_stats(&self, stats: ExtensionStatsPayload) {
        self.extension_stats.lock().add(stats);
    }

    fn on_access_token(&self, token: String) {
        let token = (!token.is_empty()).then_some(token);
        match self.session.lock().as_mut() {
            Some(session) => {
                session.config.access_token.clone_from(&token);
                session.transport.update_access_token(token);
            }
            None => debug!("Access token before configuration ignored"),
        }
    }
}

// ============================================================================
// Worker Loop
// ============================================================================

/// Runs the worker context on `endpoint` until the main context goes away.
pub async fn run(endpoint: WorkerEndpoint) {
    let (poster, inbox) = endpoint.split();
    let processor = Processor::new(ProcessorWorker::new(poster));

    if let Err(e) = processor.worker.request_initial_config() {
        warn!(error = %e, "Initial config request not delivered");
    }

    processor_worker::listen(inbox, &processor).await;
    processor.close();
}

/// Spawns [`run`] on the current runtime.
pub fn spawn(endpoint: WorkerEndpoint) -> JoinHandle<()> {
    tokio::spawn(run(endpoint))
}

// ============================================================================
// Tests
// ============================================================================
