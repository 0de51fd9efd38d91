//! Worker-context processing.
//!
//! The processor answers the main context's protocol messages, drives the
//! polling schedule, turns raw stats into samples and hands them to a
//! [`SampleTransport`].
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `core` | [`Processor`] and its worker loop |
//! | `extension_stats` | Accumulate-then-drain extension buffer |
//! | `local` | Samples posted back to the main context |
//! | `websocket` | Reconnecting websocket delivery |

// ============================================================================
// Submodules
// ============================================================================

/// Processor and worker loop.
pub mod core;

/// Extension stats buffer.
pub mod extension_stats;

/// Local delivery.
pub mod local;

/// Websocket delivery.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::core::{Processor, run, spawn};
pub use extension_stats::ExtensionStats;
pub use local::{LocalForwarder, LocalTransport};
pub use websocket::WebSocketTransport;

// ============================================================================
// SampleTransport
// ============================================================================

use crate::error::Result;
use crate::protocol::PeerConnectionSample;

/// Destination for finished samples on the worker side.
pub trait SampleTransport: Send + Sync {
    /// Delivers one cycle's samples.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport can no longer accept samples.
    fn send_bulk(&self, samples: Vec<PeerConnectionSample>) -> Result<()>;

    /// Replaces the credential used for later deliveries.
    fn update_access_token(&self, token: Option<String>);

    /// Stops delivery.
    fn close(&self);
}
