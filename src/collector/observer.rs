//! Collection orchestrator for one session.
//!
//! # Collection Cycle
//!
//! Each `requestRawStats` from the worker runs one cycle:
//!
//! 1. Refresh every connection's state and prune the expired ones
//! 2. Snapshot the survivors concurrently, each bounded by the collect timeout
//! 3. Post the successful snapshots as one batch
//!
//! A failed or timed-out snapshot only removes that connection from the
//! batch. A request arriving while a cycle is still in flight is coalesced.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::Error;
use crate::identifiers::PeerConnectionId;
use crate::processor::LocalTransport;
use crate::protocol::{
    ClientCallback, ExtensionStatsPayload, InitialConfig, PeerConnectionSample,
};
use crate::transport::{CollectorWorker, MainEndpoint, collector_worker};

use super::environment::EnvironmentProbe;
use super::epoch_millis;
use super::peer::{Integration, ObservedPeer, PeerRegistration};
use super::stats::{PeerConnection, RawStats, RawStatsProvider, UserMediaErrorPayload};
use super::token::AccessToken;

// ============================================================================
// Constants
// ============================================================================

/// Default upper bound for one connection's snapshot.
pub const DEFAULT_COLLECT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Types
// ============================================================================

/// Receives errors that could not be handled locally.
pub type ErrorHandler = Arc<dyn Fn(&Error) + Send + Sync>;

/// Settings changeable during the session.
#[derive(Default)]
pub(crate) struct Settings {
    pub(crate) integration: Option<Integration>,
    pub(crate) local_transport: Option<Arc<dyn LocalTransport>>,
    pub(crate) marker: Option<String>,
    pub(crate) browser_id: Option<String>,
    pub(crate) access_token: Option<AccessToken>,
}

/// Fixed collaborators handed over by the builder.
pub(crate) struct ObserverParts {
    pub(crate) config: InitialConfig,
    pub(crate) environment: Arc<dyn EnvironmentProbe>,
    pub(crate) stats_provider: Arc<dyn RawStatsProvider>,
    pub(crate) collect_timeout: Duration,
    pub(crate) error_handler: Option<ErrorHandler>,
    /// Initial values, in place before the first worker message is read.
    pub(crate) settings: Settings,
}

/// Clears the in-flight flag when a cycle ends.
struct CollectingGuard<'a>(&'a AtomicBool);

impl Drop for CollectingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ============================================================================
// ObserverInner
// ============================================================================

struct ObserverInner {
    this: Weak<ObserverInner>,
    config: InitialConfig,
    peers: Mutex<Vec<Arc<ObservedPeer>>>,
    settings: RwLock<Settings>,
    environment: Arc<dyn EnvironmentProbe>,
    stats_provider: Arc<dyn RawStatsProvider>,
    worker: CollectorWorker,
    collect_timeout: Duration,
    collecting: AtomicBool,
    error_handler: Option<ErrorHandler>,
}

impl ObserverInner {
    /// Refreshes states, prunes expired connections, returns the survivors.
    fn sweep(&self) -> Vec<Arc<ObservedPeer>> {
        let mut peers = self.peers.lock();
        let before = peers.len();

        peers.retain(|peer| {
            peer.refresh_connection_state();
            !peer.is_expired()
        });

        let pruned = before - peers.len();
        if pruned > 0 {
            debug!(count = pruned, remaining = peers.len(), "Expired connections pruned");
        }

        peers.clone()
    }

    async fn collect_raw_stats(&self) -> Vec<RawStats> {
        let peers = self.sweep();
        let (marker, browser_id) = {
            let settings = self.settings.read();
            (settings.marker.clone(), settings.browser_id.clone())
        };

        let snapshots = peers
            .iter()
            .map(|peer| self.snapshot(peer, marker.as_deref(), browser_id.as_deref()));

        join_all(snapshots).await.into_iter().flatten().collect()
    }

    async fn snapshot(
        &self,
        peer: &ObservedPeer,
        marker: Option<&str>,
        browser_id: Option<&str>,
    ) -> Option<RawStats> {
        let result = match timeout(self.collect_timeout, peer.collect_stats()).await {
            Ok(result) => result,
            Err(_) => Err(Error::collect_timeout(
                peer.id(),
                self.collect_timeout.as_millis() as u64,
            )),
        };

        match result {
            Ok(stats) => Some(RawStats {
                details: peer.details(marker, browser_id).await,
                stats,
            }),
            Err(e) if e.is_timeout() => {
                warn!(
                    peer_connection_id = %peer.id(),
                    timeout_ms = self.collect_timeout.as_millis() as u64,
                    "Snapshot timed out, connection omitted from batch"
                );
                None
            }
            Err(e) if e.is_collection_error() => {
                warn!(
                    peer_connection_id = %peer.id(),
                    error = %e,
                    "Snapshot failed, connection omitted from batch"
                );
                None
            }
            Err(e) => {
                self.on_error(e);
                None
            }
        }
    }

    /// Resolves the current token. Empty values count as unset.
    fn resolve_access_token(&self) -> Option<String> {
        let token = self.settings.read().access_token.clone();
        token.map(|t| t.resolve()).filter(|t| !t.is_empty())
    }

    fn report(&self, result: crate::error::Result<()>) {
        if let Err(e) = result {
            self.on_error(e);
        }
    }
}

impl ClientCallback for ObserverInner {
    fn on_request_raw_stats(&self) {
        let Some(this) = self.this.upgrade() else {
            return;
        };

        if self.collecting.swap(true, Ordering::AcqRel) {
            debug!("Collection already in flight, request coalesced");
            return;
        }

        tokio::spawn(async move {
            let batch = {
                let _guard = CollectingGuard(&this.collecting);
                this.collect_raw_stats().await
            };

            trace!(count = batch.len(), "Raw stats batch collected");
            this.report(this.worker.send_raw_stats(batch));
        });
    }

    fn on_request_initial_config(&self) {
        let mut config = self.config.clone();
        if let Some(token) = self.resolve_access_token() {
            config.access_token = Some(token);
        }
        self.report(self.worker.send_initial_config(config));
    }

    fn on_transport_callback(&self, samples: Vec<PeerConnectionSample>) {
        let transport = self.settings.read().local_transport.clone();
        match transport {
            Some(transport) => transport.on_observer_rtc_sample(samples),
            None => debug!(count = samples.len(), "No local transport set, samples dropped"),
        }
    }

    fn on_request_access_token(&self) {
        match self.resolve_access_token() {
            Some(token) => self.report(self.worker.send_access_token(token)),
            None => debug!("Access token requested but none is set"),
        }
    }

    fn on_error(&self, err: Error) {
        warn!(error = %err, "Observer error");
        if let Some(handler) = &self.error_handler {
            handler(&err);
        }
    }
}

// ============================================================================
// Observer
// ============================================================================

/// Registry of monitored connections for one session.
///
/// Created with [`ObserverBuilder`](super::ObserverBuilder). Every mutating
/// call takes effect immediately.
pub struct Observer {
    inner: Arc<ObserverInner>,
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("connections", &self.connection_count())
            .field("transport_type", &self.inner.config.transport_type)
            .field("closed", &self.inner.worker.is_closed())
            .finish_non_exhaustive()
    }
}

impl Observer {
    /// Wires the registry to `endpoint` and starts dispatching worker messages.
    ///
    /// The listener starts only after `parts.settings` is installed. Must be
    /// called within a Tokio runtime.
    pub(crate) fn attach(parts: ObserverParts, endpoint: MainEndpoint) -> Self {
        let (poster, inbox) = endpoint.split();

        let inner = Arc::new_cyclic(|this| ObserverInner {
            this: this.clone(),
            config: parts.config,
            peers: Mutex::new(Vec::new()),
            settings: RwLock::new(parts.settings),
            environment: parts.environment,
            stats_provider: parts.stats_provider,
            worker: CollectorWorker::new(poster),
            collect_timeout: parts.collect_timeout,
            collecting: AtomicBool::new(false),
            error_handler: parts.error_handler,
        });

        collector_worker::spawn_listener(inbox, Arc::downgrade(&inner));

        Self { inner }
    }

    // ========================================================================
    // Registry
    // ========================================================================

    /// Starts observing `pc`.
    ///
    /// Only a weak reference is kept. Registering the same handle twice
    /// creates two independent entries.
    pub fn register<P>(&self, pc: &Arc<P>, call_id: Option<&str>, user_id: Option<&str>) -> PeerConnectionId
    where
        P: PeerConnection + 'static,
    {
        let handle: Arc<dyn PeerConnection> = pc.clone();
        let registration = PeerRegistration {
            call_id: call_id.map(str::to_string),
            user_id: user_id.map(str::to_string),
            integration: self.inner.settings.read().integration,
        };

        let peer = ObservedPeer::new(
            Arc::downgrade(&handle),
            registration,
            Arc::clone(&self.inner.environment),
            Arc::clone(&self.inner.stats_provider),
        );
        let id = peer.id();

        self.inner.peers.lock().push(Arc::new(peer));
        debug!(peer_connection_id = %id, "Connection registered");
        id
    }

    /// Stops observing `id`. Returns `false` if it was not registered.
    pub fn deregister(&self, id: PeerConnectionId) -> bool {
        let mut peers = self.inner.peers.lock();
        let before = peers.len();
        peers.retain(|peer| peer.id() != id);

        let removed = peers.len() != before;
        if removed {
            debug!(peer_connection_id = %id, "Connection deregistered");
        }
        removed
    }

    /// Returns the registered identities in registration order.
    #[must_use]
    pub fn peer_ids(&self) -> Vec<PeerConnectionId> {
        self.inner.peers.lock().iter().map(|peer| peer.id()).collect()
    }

    /// Returns the number of registered connections.
    #[inline]
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.inner.peers.lock().len()
    }

    /// Runs one collection cycle without posting the result.
    ///
    /// Prunes expired connections exactly like a scheduled cycle.
    pub async fn collect_raw_stats(&self) -> Vec<RawStats> {
        self.inner.collect_raw_stats().await
    }

    // ========================================================================
    // Settings
    // ========================================================================

    /// Sets the integration tag for connections registered afterwards.
    pub fn set_integration(&self, integration: Integration) {
        self.inner.settings.write().integration = Some(integration);
    }

    /// Sets the receiver of samples coming back from the worker.
    ///
    /// The session's transport type was fixed when it was built.
    pub fn set_local_transport<T>(&self, transport: T)
    where
        T: LocalTransport + 'static,
    {
        self.inner.settings.write().local_transport = Some(Arc::new(transport));
    }

    /// Sets the marker attached to subsequent snapshots.
    pub fn update_marker(&self, marker: impl Into<String>) {
        self.inner.settings.write().marker = Some(marker.into());
    }

    /// Overrides the browser id reported by the environment probe.
    pub fn set_browser_id(&self, browser_id: impl Into<String>) {
        self.inner.settings.write().browser_id = Some(browser_id.into());
    }

    /// Sets the access token or token supplier.
    pub fn set_access_token(&self, token: impl Into<AccessToken>) {
        self.inner.settings.write().access_token = Some(token.into());
    }

    /// Returns the base configuration of this session.
    #[inline]
    #[must_use]
    pub fn initial_config(&self) -> &InitialConfig {
        &self.inner.config
    }

    /// Returns the current integration tag.
    #[must_use]
    pub fn integration(&self) -> Option<Integration> {
        self.inner.settings.read().integration
    }

    /// Returns the current marker.
    #[must_use]
    pub fn marker(&self) -> Option<String> {
        self.inner.settings.read().marker.clone()
    }

    /// Returns the browser id override.
    #[must_use]
    pub fn browser_id(&self) -> Option<String> {
        self.inner.settings.read().browser_id.clone()
    }

    // ========================================================================
    // Push Events
    // ========================================================================

    /// Forwards an extension measurement to the worker.
    ///
    /// Empty or unserializable payloads are dropped.
    pub fn add_extension_stats<T>(&self, payload: &T, extension_type: Option<&str>)
    where
        T: Serialize + ?Sized,
    {
        let value = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(e) => {
                trace!(error = %e, "Unserializable extension stats dropped");
                return;
            }
        };

        let stats = ExtensionStatsPayload::new(extension_type, Some(value));
        if stats.is_empty() {
            trace!("Empty extension stats dropped");
            return;
        }

        self.inner.report(self.inner.worker.add_extension_stats(stats));
    }

    /// Reports a media device error such as a denied camera permission.
    pub async fn on_media_error(&self, media_device_error: impl Into<String>) {
        let browser_id = match self.browser_id() {
            Some(id) => id,
            None => self.inner.environment.browser_id().await,
        };

        let error = UserMediaErrorPayload {
            media_device_error: media_device_error.into(),
            browser_id: Some(browser_id),
            timestamp: epoch_millis(),
        };

        self.inner.report(self.inner.worker.send_user_media_error(error));
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Clears the registry. Polling continues.
    pub fn dispose(&self) {
        let mut peers = self.inner.peers.lock();
        if !peers.is_empty() {
            debug!(count = peers.len(), "Registry disposed");
        }
        peers.clear();
    }

    /// Clears the registry and closes the boundary.
    ///
    /// The built-in worker stops its scheduler and transport when it sees
    /// the boundary close.
    pub fn shutdown(&self) {
        self.dispose();
        self.inner.worker.close();
    }

    /// Returns `true` once the boundary is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.worker.is_closed()
    }
}

// ============================================================================
// Tests
// ============================================================================
