//! Finished samples handed to the transport.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::collector::environment::{ClientDetails, MediaDeviceInfo};
use crate::collector::peer::Integration;
use crate::collector::stats::{RawStats, StatsRecord, UserMediaErrorPayload};
use crate::identifiers::PeerConnectionId;

use super::message::ExtensionRecord;

// ============================================================================
// PeerConnectionSample
// ============================================================================

/// One connection's report for one collection cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerConnectionSample {
    /// Connection identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_connection_id: Option<PeerConnectionId>,
    /// Browser instance identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_id: Option<String>,
    /// Call identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    /// User identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Application marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker: Option<String>,
    /// Media stack tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration: Option<Integration>,
    /// Epoch milliseconds at collection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    /// UTC offset in minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone_offset_in_minute: Option<i32>,
    /// Client environment summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_details: Option<ClientDetails>,
    /// Active media devices.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub device_list: Vec<MediaDeviceInfo>,
    /// Receiver records.
    #[serde(default)]
    pub receiver_stats: Vec<StatsRecord>,
    /// Sender records.
    #[serde(default)]
    pub sender_stats: Vec<StatsRecord>,
    /// Extension records drained into this sample.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension_stats: Vec<ExtensionRecord>,
    /// User-media errors drained into this sample.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_media_errors: Vec<UserMediaErrorPayload>,
}

impl From<RawStats> for PeerConnectionSample {
    fn from(raw: RawStats) -> Self {
        let RawStats { details, stats } = raw;
        Self {
            peer_connection_id: details.peer_connection_id,
            browser_id: details.browser_id,
            call_id: details.call_id,
            user_id: details.user_id,
            marker: details.marker,
            integration: details.integration,
            timestamp: details.timestamp,
            time_zone_offset_in_minute: details.time_zone_offset_in_minute,
            client_details: details.client_details,
            device_list: details.device_list.unwrap_or_default(),
            receiver_stats: stats.receiver_stats,
            sender_stats: stats.sender_stats,
            extension_stats: Vec::new(),
            user_media_errors: Vec::new(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
