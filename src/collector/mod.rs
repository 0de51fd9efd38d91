//! Main-context collection.
//!
//! This module owns the registry of monitored connections and answers the
//! worker's requests.
//!
//! # Components
//!
//! - [`Observer`] - Registry and protocol handler for one session
//! - [`ObserverBuilder`] - Session configuration
//! - [`ObservedPeer`] - One registered connection
//! - [`LifecycleState`] - Connection state tracking and expiry
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rtc_observer::collector::{ObserverBuilder, PeerConnection, RawStatsProvider};
//! use rtc_observer::protocol::InitialConfig;
//!
//! # async fn example(
//! #     provider: impl RawStatsProvider + 'static,
//! #     pc: Arc<impl PeerConnection + 'static>,
//! # ) -> rtc_observer::Result<()> {
//! let observer = ObserverBuilder::new(InitialConfig::new("wss://aggregator.example/samples", 5_000))
//!     .with_stats_provider(provider)
//!     .with_marker("release-42")
//!     .build()?;
//!
//! let id = observer.register(&pc, Some("call-1"), Some("alice"));
//! // ...
//! observer.deregister(id);
//! observer.shutdown();
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Session configuration.
pub mod builder;

/// Environment metadata probes.
pub mod environment;

/// Registry and protocol handler.
pub mod observer;

/// Registered connection wrapper.
pub mod peer;

/// Connection state tracking.
pub mod state;

/// Statistics collaborators and payloads.
pub mod stats;

/// Access token resolution.
pub mod token;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ObserverBuilder;
pub use environment::{ClientDetails, EnvironmentProbe, MediaDeviceInfo, StaticEnvironment};
pub use observer::{DEFAULT_COLLECT_TIMEOUT, ErrorHandler, Observer};
pub use peer::{Integration, ObservedPeer, PcDetails, PeerRegistration};
pub use state::{ConnectionState, EXPIRED_LIMIT, LifecycleState};
pub use stats::{
    ObserverStats, PeerConnection, RawStats, RawStatsProvider, RtpEndpoint, StatsRecord,
    UserMediaErrorPayload,
};
pub use token::AccessToken;

// ============================================================================
// Helpers
// ============================================================================

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, or 0 if the clock is before it.
pub(crate) fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}
