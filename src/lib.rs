//! RTC Observer - WebRTC statistics collection across a worker boundary.
//!
//! This library tracks a set of live peer connections, periodically reads
//! their statistics and ships normalized samples to a remote aggregator or
//! a local callback.
//!
//! # Architecture
//!
//! The collector is split into two contexts that share no state:
//!
//! - **Main context**: Owns the connections. [`Observer`] registers them,
//!   prunes expired ones and answers the worker's requests
//! - **Worker context**: Owns delivery. The processor drives polling, turns
//!   raw stats into samples and hands them to the transport
//!
//! The contexts talk over an ordered JSON message channel with a closed
//! vocabulary per direction ([`ClientPayload`], [`WorkerPayload`]).
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rtc_observer::{
//!     InitialConfig, ObserverBuilder, PeerConnection, PeerConnectionSample, RawStatsProvider,
//!     Result,
//! };
//!
//! # async fn example(
//! #     provider: impl RawStatsProvider + 'static,
//! #     pc: Arc<impl PeerConnection + 'static>,
//! # ) -> Result<()> {
//! let observer = ObserverBuilder::new(InitialConfig::new("ws://unused", 1_000))
//!     .with_stats_provider(provider)
//!     .with_local_transport(|samples: Vec<PeerConnectionSample>| {
//!         println!("{} samples", samples.len());
//!     })
//!     .build()?;
//!
//! observer.register(&pc, Some("call-1"), Some("alice"));
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`collector`] | Registry, connection wrapper, builder |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`processor`] | Worker-side processing and transports |
//! | [`protocol`] | Cross-boundary message types |
//! | [`transport`] | Boundary channel and dispatchers |
//! | [`updater`] | Repeating timer |

// ============================================================================
// Modules
// ============================================================================

/// Main-context collection.
///
/// - [`Observer`] - Registry and protocol handler
/// - [`ObserverBuilder`] - Session configuration
pub mod collector;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Worker-context processing.
pub mod processor;

/// Cross-boundary protocol message types.
pub mod protocol;

/// Boundary channel between the two contexts.
pub mod transport;

/// Repeating timer.
pub mod updater;

// ============================================================================
// Re-exports
// ============================================================================

// Collector types
pub use collector::{
    AccessToken, ConnectionState, EnvironmentProbe, Integration, Observer, ObserverBuilder,
    PeerConnection, RawStats, RawStatsProvider, RtpEndpoint, StaticEnvironment,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::PeerConnectionId;

// Processor types
pub use processor::{LocalTransport, SampleTransport};

// Protocol types
pub use protocol::{ClientPayload, InitialConfig, PeerConnectionSample, TransportType, WorkerPayload};

// Updater
pub use updater::IntervalUpdater;
