//! Capability interfaces for each side of the boundary.
//!
//! Each dispatcher decodes incoming messages and calls exactly one method
//! of the receiving side's interface.

// ============================================================================
// Imports
// ============================================================================

use crate::collector::stats::{RawStats, UserMediaErrorPayload};
use crate::error::Error;

use super::message::{ExtensionStatsPayload, InitialConfig};
use super::sample::PeerConnectionSample;

// ============================================================================
// ClientCallback
// ============================================================================

/// Main-context receiver of worker messages.
pub trait ClientCallback: Send + Sync {
    /// The worker wants a collection cycle.
    fn on_request_raw_stats(&self);

    /// The worker wants the session configuration.
    fn on_request_initial_config(&self);

    /// The worker delivered samples for the local transport.
    fn on_transport_callback(&self, samples: Vec<PeerConnectionSample>);

    /// The worker wants a fresh access token.
    fn on_request_access_token(&self);

    /// Something failed outside a single connection snapshot.
    fn on_error(&self, err: Error);
}

// ============================================================================
// WorkerCallback
// ============================================================================

/// Worker-context receiver of main messages.
pub trait WorkerCallback: Send + Sync {
    /// Snapshots from a collection cycle.
    fn on_response_raw_stats(&self, raw_stats: Vec<RawStats>);

    /// Session configuration.
    fn on_response_initial_config(&self, config: InitialConfig);

    /// A `getUserMedia` failure.
    fn on_user_media_error(&self, error: UserMediaErrorPayload);

    /// An auxiliary measurement.
    fn on_extension_stats(&self, stats: ExtensionStatsPayload);

    /// A freshly resolved access token.
    fn on_access_token(&self, token: String);
}
