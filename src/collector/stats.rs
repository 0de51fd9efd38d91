//! Raw statistics collaborators and payload shapes.
//!
//! The collector does not read statistics itself. A [`RawStatsProvider`]
//! turns the senders and receivers of a [`PeerConnection`] into opaque
//! stat records, and the collector ships them as [`RawStats`].

// ============================================================================
// Imports
// ============================================================================

use std::error::Error as StdError;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::peer::PcDetails;
use super::state::ConnectionState;

// ============================================================================
// Types
// ============================================================================

/// One statistics record as produced by the stats provider.
pub type StatsRecord = Value;

/// Error type returned by external stats providers.
pub type ProviderError = Box<dyn StdError + Send + Sync>;

/// A sender or receiver attached to a peer connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RtpEndpoint {
    /// Identifier understood by the stats provider.
    pub id: String,
    /// Track kind (`audio` / `video`), if known.
    pub kind: Option<String>,
}

impl RtpEndpoint {
    /// Creates an endpoint reference.
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>, kind: Option<&str>) -> Self {
        Self {
            id: id.into(),
            kind: kind.map(str::to_string),
        }
    }
}

// ============================================================================
// PeerConnection
// ============================================================================

/// A live media session endpoint owned by the embedding application.
///
/// The collector holds only a weak reference. Once the application drops
/// its last `Arc`, the connection reads as `closed`.
pub trait PeerConnection: Send + Sync {
    /// Current connection state as reported by the handle.
    fn connection_state(&self) -> ConnectionState;

    /// Senders currently attached to the connection.
    fn senders(&self) -> Vec<RtpEndpoint>;

    /// Receivers currently attached to the connection.
    fn receivers(&self) -> Vec<RtpEndpoint>;
}

// ============================================================================
// RawStatsProvider
// ============================================================================

/// Extracts statistics for the endpoints of a connection.
#[async_trait]
pub trait RawStatsProvider: Send + Sync {
    /// Lists the senders whose statistics should be queried.
    fn sender_list(&self, pc: &dyn PeerConnection) -> Vec<RtpEndpoint> {
        pc.senders()
    }

    /// Lists the receivers whose statistics should be queried.
    fn receiver_list(&self, pc: &dyn PeerConnection) -> Vec<RtpEndpoint> {
        pc.receivers()
    }

    /// Reads the stat records for `list`.
    async fn raw_stats(&self, list: &[RtpEndpoint]) -> Result<Vec<StatsRecord>, ProviderError>;
}

// ============================================================================
// Payloads
// ============================================================================

/// Sender and receiver records of one connection snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObserverStats {
    /// Records read from the receivers.
    pub receiver_stats: Vec<StatsRecord>,
    /// Records read from the senders.
    pub sender_stats: Vec<StatsRecord>,
}

/// Snapshot of one connection as shipped across the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStats {
    /// Identity and environment metadata.
    pub details: PcDetails,
    /// Statistics read this cycle.
    pub stats: ObserverStats,
}

/// A `getUserMedia` failure reported by the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMediaErrorPayload {
    /// Error name, e.g. `NotAllowedError`.
    pub media_device_error: String,
    /// Browser the error was observed in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser_id: Option<String>,
    /// Epoch milliseconds.
    pub timestamp: u64,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    struct TwoTracks;

    impl PeerConnection for TwoTracks {
        fn connection_state(&self) -> ConnectionState {
            ConnectionState::Connected
        }

        fn senders(&self) -> Vec<RtpEndpoint> {
            vec![RtpEndpoint::new("s1", Some("audio"))]
        }

        fn receivers(&self) -> Vec<RtpEndpoint> {
            vec![RtpEndpoint::new("r1", Some("video"))]
        }
    }

    struct EchoProvider;

    #[async_trait]
    impl RawStatsProvider for EchoProvider {
        async fn raw_stats(&self, list: &[RtpEndpoint]) -> Result<Vec<StatsRecord>, ProviderError> {
            Ok(list.iter().map(|e| json!({ "id": e.id })).collect())
        }
    }

    #[tokio::test]
    async fn test_default_lists_come_from_handle() {
        let provider = EchoProvider;
        let pc = TwoTracks;
        let senders = provider.sender_list(&pc);
        let receivers = provider.receiver_list(&pc);
        assert_eq!(senders[0].id, "s1");
        assert_eq!(receivers[0].kind.as_deref(), Some("video"));

        let records = provider.raw_stats(&senders).await.unwrap();
        assert_eq!(records, vec![json!({ "id": "s1" })]);
    }

    #[test]
    fn test_observer_stats_field_names() {
        let stats = ObserverStats {
            receiver_stats: vec![json!(1)],
            sender_stats: vec![],
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json, json!({ "receiverStats": [1], "senderStats": [] }));
    }
}
