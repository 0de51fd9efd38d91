//! Builder pattern for session configuration.
//!
//! Provides a fluent API for configuring and creating [`Observer`] instances.
//!
//! # Example
//!
//! ```no_run
//! use rtc_observer::collector::{Integration, ObserverBuilder, RawStatsProvider};
//! use rtc_observer::protocol::InitialConfig;
//!
//! # fn example(provider: impl RawStatsProvider + 'static) -> rtc_observer::Result<()> {
//! let observer = ObserverBuilder::new(InitialConfig::new("wss://aggregator.example", 5_000))
//!     .with_stats_provider(provider)
//!     .with_integration(Integration::Janus)
//!     .with_access_token("token")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::processor::{self, LocalTransport};
use crate::processor::websocket::parse_server_address;
use crate::protocol::{InitialConfig, TransportType};
use crate::transport::{MainEndpoint, channel};

use super::environment::{EnvironmentProbe, StaticEnvironment};
use super::observer::{DEFAULT_COLLECT_TIMEOUT, ErrorHandler, Observer, ObserverParts, Settings};
use super::peer::Integration;
use super::stats::RawStatsProvider;
use super::token::AccessToken;

// ============================================================================
// ObserverBuilder
// ============================================================================

/// Builder for configuring an [`Observer`] session.
pub struct ObserverBuilder {
    /// Base configuration sent to the worker.
    config: InitialConfig,
    /// Receiver of samples in local mode.
    local_transport: Option<Arc<dyn LocalTransport>>,
    /// Media stack tag.
    integration: Option<Integration>,
    /// Application marker.
    marker: Option<String>,
    /// Browser id override.
    browser_id: Option<String>,
    /// Token or token supplier.
    access_token: Option<AccessToken>,
    environment: Option<Arc<dyn EnvironmentProbe>>,
    stats_provider: Option<Arc<dyn RawStatsProvider>>,
    error_handler: Option<ErrorHandler>,
    collect_timeout: Duration,
}

impl std::fmt::Debug for ObserverBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverBuilder")
            .field("config", &self.config)
            .field("integration", &self.integration)
            .field("marker", &self.marker)
            .field("browser_id", &self.browser_id)
            .field("access_token", &self.access_token)
            .field("collect_timeout", &self.collect_timeout)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ObserverBuilder Implementation
// ============================================================================

impl ObserverBuilder {
    /// Creates a builder over the required base configuration.
    #[must_use]
    pub fn new(config: InitialConfig) -> Self {
        Self {
            config,
            local_transport: None,
            integration: None,
            marker: None,
            browser_id: None,
            access_token: None,
            environment: None,
            stats_provider: None,
            error_handler: None,
            collect_timeout: DEFAULT_COLLECT_TIMEOUT,
        }
    }

    /// Delivers samples to `transport` instead of the remote aggregator.
    ///
    /// Switches the configuration's transport type to `local` right away.
    #[must_use]
    pub fn with_local_transport<T>(mut self, transport: T) -> Self
    where
        T: LocalTransport + 'static,
    {
        self.config.transport_type = TransportType::Local;
        self.local_transport = Some(Arc::new(transport));
        self
    }

    /// Sets the integration tag.
    #[inline]
    #[must_use]
    pub fn with_integration(mut self, integration: Integration) -> Self {
        self.integration = Some(integration);
        self
    }

    /// Sets the marker attached to snapshots.
    #[inline]
    #[must_use]
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into());
        self
    }

    /// Overrides the browser id reported by the environment probe.
    #[inline]
    #[must_use]
    pub fn with_browser_id(mut self, browser_id: impl Into<String>) -> Self {
        self.browser_id = Some(browser_id.into());
        self
    }

    /// Sets the access token or token supplier.
    #[inline]
    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<AccessToken>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Sets the environment probe.
    ///
    /// Defaults to a [`StaticEnvironment`] with a random browser id.
    #[must_use]
    pub fn with_environment<E>(mut self, environment: E) -> Self
    where
        E: EnvironmentProbe + 'static,
    {
        self.environment = Some(Arc::new(environment));
        self
    }

    /// Sets the raw-stats provider. Required.
    #[must_use]
    pub fn with_stats_provider<P>(mut self, provider: P) -> Self
    where
        P: RawStatsProvider + 'static,
    {
        self.stats_provider = Some(Arc::new(provider));
        self
    }

    /// Sets the receiver of errors that could not be handled locally.
    #[must_use]
    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Bounds each connection's snapshot.
    #[inline]
    #[must_use]
    pub fn with_collect_timeout(mut self, timeout: Duration) -> Self {
        self.collect_timeout = timeout;
        self
    }

    /// Returns the configuration as accumulated so far.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &InitialConfig {
        &self.config
    }

    /// Builds the session and spawns the built-in worker.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if called outside a Tokio runtime
    /// - [`Error::Config`] if the poll interval or collect timeout is zero
    /// - [`Error::Config`] if no stats provider was set
    /// - [`Error::InvalidAddress`] or [`Error::Url`] if a remote session has
    ///   no usable `ws`/`wss` address
    pub fn build(self) -> Result<Observer> {
        self.validate()?;
        if self.config.transport_type == TransportType::Remote {
            parse_server_address(&self.config.remote_address)?;
        }

        let (main, worker) = channel();
        processor::spawn(worker);
        self.attach(main)
    }

    /// Builds the session on an existing boundary endpoint.
    ///
    /// Used when the worker side runs elsewhere.
    ///
    /// # Errors
    ///
    /// Same as [`build`](Self::build), without the address check.
    pub fn attach(self, endpoint: MainEndpoint) -> Result<Observer> {
        self.validate()?;

        let stats_provider = self
            .stats_provider
            .ok_or_else(|| Error::config("a raw stats provider is required"))?;
        let environment = self
            .environment
            .unwrap_or_else(|| Arc::new(StaticEnvironment::new(Uuid::new_v4().to_string())));

        debug!(
            transport = ?self.config.transport_type,
            poll_interval_ms = self.config.poll_interval_ms,
            "Building observer"
        );

        let observer = Observer::attach(
            ObserverParts {
                config: self.config,
                environment,
                stats_provider,
                collect_timeout: self.collect_timeout,
                error_handler: self.error_handler,
                settings: Settings {
                    integration: self.integration,
                    local_transport: self.local_transport,
                    marker: self.marker,
                    browser_id: self.browser_id,
                    access_token: self.access_token,
                },
            },
            endpoint,
        );

        Ok(observer)
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ObserverBuilder {
    fn validate(&self) -> Result<()> {
        Handle::try_current()
            .map_err(|_| Error::config("an observer must be built within a Tokio runtime"))?;

        if self.config.poll_interval_ms == 0 {
            return Err(Error::config("poll interval must be greater than zero"));
        }

        if self.collect_timeout.is_zero() {
            return Err(Error::config("collect timeout must be greater than zero"));
        }

        if self.stats_provider.is_none() {
            return Err(Error::config(
                "a raw stats provider is required. Use .with_stats_provider() to set it.",
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use tokio::sync::mpsc;

    use crate::collector::state::ConnectionState;
    use crate::collector::stats::{PeerConnection, ProviderError, RtpEndpoint, StatsRecord};
    use crate::protocol::{ClientPayload, PeerConnectionSample, WorkerPayload};

    struct Provider;

    #[async_trait]
    impl RawStatsProvider for Provider {
        async fn raw_stats(&self, list: &[RtpEndpoint]) -> std::result::Result<Vec<StatsRecord>, ProviderError> {
            Ok(list.iter().map(|e| json!({ "id": e.id })).collect())
        }
    }

    struct Pc(Mutex<ConnectionState>);

    impl PeerConnection for Pc {
        fn connection_state(&self) -> ConnectionState {
            *self.0.lock()
        }

        fn senders(&self) -> Vec<RtpEndpoint> {
            vec![RtpEndpoint::new("s1", Some("video"))]
        }

        fn receivers(&self) -> Vec<RtpEndpoint> {
            vec![RtpEndpoint::new("r1", Some("video"))]
        }
    }

    fn config(addr: &str) -> InitialConfig {
        InitialConfig::new(addr, 100)
    }

    #[test]
    fn test_local_transport_switches_type_immediately() {
        let builder = ObserverBuilder::new(config("ws://unused"));
        assert_eq!(builder.config().transport_type, TransportType::Remote);

        let builder = builder.with_local_transport(|_: Vec<PeerConnectionSample>| {});
        assert_eq!(builder.config().transport_type, TransportType::Local);
    }

    #[test]
    fn test_build_outside_runtime() {
        let err = tokio_test::assert_err!(
            ObserverBuilder::new(config("ws://a"))
                .with_stats_provider(Provider)
                .build()
        );
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn test_build_validation() {
        let err = ObserverBuilder::new(config("ws://a")).build().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));

        let err = ObserverBuilder::new(InitialConfig::new("ws://a", 0))
            .with_stats_provider(Provider)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));

        let err = ObserverBuilder::new(config("https://a"))
            .with_stats_provider(Provider)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAddress { .. }));
    }

    #[tokio::test]
    async fn test_attach_applies_settings() {
        let (main, mut worker) = channel();
        let observer = ObserverBuilder::new(config("ws://a"))
            .with_stats_provider(Provider)
            .with_integration(Integration::Mediasoup)
            .with_marker("m")
            .with_browser_id("b")
            .with_access_token("t")
            .attach(main)
            .unwrap();

        assert_eq!(observer.integration(), Some(Integration::Mediasoup));
        assert_eq!(observer.marker().as_deref(), Some("m"));
        assert_eq!(observer.browser_id().as_deref(), Some("b"));

        worker.post(&WorkerPayload::RequestAccessToken).unwrap();
        let msg = worker.recv().await.unwrap().unwrap();
        assert!(matches!(msg, ClientPayload::OnRequestAccessToken(t) if t == "t"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_settings_in_place_before_first_reply() {
        for _ in 0..200 {
            let (main, mut worker) = channel();
            worker.post(&WorkerPayload::RequestInitialConfig).unwrap();

            let observer = ObserverBuilder::new(config("ws://a"))
                .with_stats_provider(Provider)
                .with_access_token("secret")
                .with_marker("m")
                .attach(main)
                .unwrap();

            let msg = tokio::time::timeout(Duration::from_secs(5), worker.recv())
                .await
                .expect("initial config reply")
                .unwrap()
                .unwrap();
            let ClientPayload::OnRequestInitialConfig(initial) = msg else {
                panic!("expected initial config");
            };
            assert_eq!(initial.access_token.as_deref(), Some("secret"));
            assert_eq!(observer.marker().as_deref(), Some("m"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_session_end_to_end() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let observer = ObserverBuilder::new(config("ws://unused"))
            .with_stats_provider(Provider)
            .with_marker("e2e")
            .with_local_transport(move |samples: Vec<PeerConnectionSample>| {
                let _ = tx.send(samples);
            })
            .build()
            .unwrap();

        let pc = Arc::new(Pc(Mutex::new(ConnectionState::Connected)));
        let id = observer.register(&pc, Some("call"), None);
        observer.add_extension_stats(&json!({ "fps": 30 }), Some("video"));

        let samples = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("samples delivered")
            .unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].peer_connection_id, Some(id));
        assert_eq!(samples[0].marker.as_deref(), Some("e2e"));
        assert_eq!(samples[0].sender_stats, vec![json!({ "id": "s1" })]);
        assert_eq!(samples[0].extension_stats.len(), 1);

        observer.shutdown();
    }
}
