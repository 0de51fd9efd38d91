//! Error types for the RTC observer.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use rtc_observer::{ObserverBuilder, Result};
//!
//! fn example(builder: ObserverBuilder) -> Result<()> {
//!     let observer = builder.build()?;
//!     observer.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidAddress`] |
//! | Boundary | [`Error::BoundaryClosed`], [`Error::UnknownMessage`], [`Error::Protocol`] |
//! | Collection | [`Error::HandleReleased`], [`Error::StatsQuery`], [`Error::CollectTimeout`] |
//! | Transport | [`Error::Transport`], [`Error::Connection`] |
//! | External | [`Error::Json`], [`Error::WebSocket`], [`Error::Url`] |
//!
//! None of these are fatal to a session. Collection errors are confined to
//! the connection they belong to, everything else reaches the embedding
//! application through [`ClientCallback::on_error`](crate::protocol::ClientCallback::on_error).

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;
use url::ParseError;

use crate::identifiers::PeerConnectionId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when the observer configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Remote aggregator address is unusable.
    #[error("Invalid address {address}: {message}")]
    InvalidAddress {
        /// The rejected address.
        address: String,
        /// Why it was rejected.
        message: String,
    },

    // ========================================================================
    // Boundary Errors
    // ========================================================================
    /// The other execution context is gone.
    ///
    /// Returned when posting a message after the peer endpoint was dropped.
    #[error("Boundary closed")]
    BoundaryClosed,

    /// A message carried a `what` tag outside the vocabulary.
    #[error("Unknown message: {what}")]
    UnknownMessage {
        /// The unrecognized discriminator.
        what: String,
    },

    /// Malformed message or unexpected payload shape.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Collection Errors
    // ========================================================================
    /// The connection handle was released by the embedding application.
    #[error("Connection handle released: {peer_connection_id}")]
    HandleReleased {
        /// The connection whose handle is gone.
        peer_connection_id: PeerConnectionId,
    },

    /// A sender or receiver statistics query failed.
    #[error("Stats query failed for {peer_connection_id}: {message}")]
    StatsQuery {
        /// The connection being queried.
        peer_connection_id: PeerConnectionId,
        /// Error reported by the stats provider.
        message: String,
    },

    /// A connection snapshot did not settle within the collect timeout.
    #[error("Stats collection for {peer_connection_id} timed out after {timeout_ms}ms")]
    CollectTimeout {
        /// The connection being queried.
        peer_connection_id: PeerConnectionId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Sample delivery failed.
    #[error("Transport error: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },

    /// Connection to the remote aggregator failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// URL parse error.
    #[error("URL error: {0}")]
    Url(#[from] ParseError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid address error.
    #[inline]
    pub fn invalid_address(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            message: message.into(),
        }
    }

    /// Creates an unknown message error.
    #[inline]
    pub fn unknown_message(what: impl Into<String>) -> Self {
        Self::UnknownMessage { what: what.into() }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a handle released error.
    #[inline]
    pub fn handle_released(peer_connection_id: PeerConnectionId) -> Self {
        Self::HandleReleased { peer_connection_id }
    }

    /// Creates a stats query error.
    #[inline]
    pub fn stats_query(peer_connection_id: PeerConnectionId, message: impl Into<String>) -> Self {
        Self::StatsQuery {
            peer_connection_id,
            message: message.into(),
        }
    }

    /// Creates a collect timeout error.
    #[inline]
    pub fn collect_timeout(peer_connection_id: PeerConnectionId, timeout_ms: u64) -> Self {
        Self::CollectTimeout {
            peer_connection_id,
            timeout_ms,
        }
    }

    /// Creates a transport error.
    #[inline]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if the other execution context is unreachable.
    #[inline]
    #[must_use]
    pub fn is_boundary_error(&self) -> bool {
        matches!(self, Self::BoundaryClosed)
    }

    /// Returns `true` if this error belongs to a single connection snapshot.
    #[inline]
    #[must_use]
    pub fn is_collection_error(&self) -> bool {
        matches!(
            self,
            Self::HandleReleased { .. } | Self::StatsQuery { .. } | Self::CollectTimeout { .. }
        )
    }

    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::CollectTimeout { .. })
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on the next collection cycle or
    /// reconnect attempt.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::StatsQuery { .. }
                | Self::CollectTimeout { .. }
                | Self::Connection { .. }
                | Self::Transport { .. }
                | Self::WebSocket(_)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::connection("refused");
        assert_eq!(err.to_string(), "Connection failed: refused");
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("poll interval must be positive");
        assert_eq!(
            err.to_string(),
            "Configuration error: poll interval must be positive"
        );
    }

    #[test]
    fn test_invalid_address_display() {
        let err = Error::invalid_address("http://x", "scheme must be ws or wss");
        assert_eq!(
            err.to_string(),
            "Invalid address http://x: scheme must be ws or wss"
        );
    }

    #[test]
    fn test_is_collection_error() {
        let id = PeerConnectionId::generate();
        assert!(Error::handle_released(id).is_collection_error());
        assert!(Error::stats_query(id, "boom").is_collection_error());
        assert!(Error::collect_timeout(id, 100).is_collection_error());
        assert!(!Error::BoundaryClosed.is_collection_error());
    }

    #[test]
    fn test_is_timeout() {
        let id = PeerConnectionId::generate();
        assert!(Error::collect_timeout(id, 5000).is_timeout());
        assert!(!Error::stats_query(id, "boom").is_timeout());
    }

    #[test]
    fn test_is_recoverable() {
        let id = PeerConnectionId::generate();
        assert!(Error::stats_query(id, "boom").is_recoverable());
        assert!(!Error::handle_released(id).is_recoverable());
        assert!(!Error::config("bad").is_recoverable());
    }

    #[test]
    fn test_is_boundary_error() {
        assert!(Error::BoundaryClosed.is_boundary_error());
        assert!(!Error::unknown_message("x").is_boundary_error());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_from_url_error() {
        let url_err = url::Url::parse("not a url").unwrap_err();
        let err: Error = url_err.into();
        assert!(matches!(err, Error::Url(_)));
    }
}
