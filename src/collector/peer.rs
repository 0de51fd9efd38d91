//! Monitored peer connection wrapper.
//!
//! An [`ObservedPeer`] binds one externally owned [`PeerConnection`] to a
//! durable [`PeerConnectionId`], tracks its lifecycle, and produces
//! statistics snapshots through the configured [`RawStatsProvider`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{Error, Result};
use crate::identifiers::PeerConnectionId;

use super::environment::{ClientDetails, EnvironmentProbe, MediaDeviceInfo};
use super::epoch_millis;
use super::state::{ConnectionState, LifecycleState};
use super::stats::{ObserverStats, PeerConnection, RawStatsProvider};

// ============================================================================
// Integration
// ============================================================================

/// Media stack the connection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Integration {
    /// Plain WebRTC.
    General,
    /// Janus gateway.
    Janus,
    /// Jitsi Meet.
    Jitsi,
    /// mediasoup SFU.
    Mediasoup,
    /// Medooze media server.
    Medooze,
    /// PeerJS.
    #[serde(rename = "PeerJS")]
    PeerJs,
    /// Pion.
    Pion,
    /// Vonage TokBox.
    TokBox,
    /// Twilio Video.
    Twilio,
}

// ============================================================================
// PcDetails
// ============================================================================

/// Identity and environment metadata sent with every snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PcDetails {
    /// Browser instance identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser_id: Option<String>,
    /// Client environment summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_details: Option<ClientDetails>,
    /// Call the connection belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    /// Active media devices.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_list: Option<Vec<MediaDeviceInfo>>,
    /// Connection identity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_connection_id: Option<PeerConnectionId>,
    /// UTC offset captured at registration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone_offset_in_minute: Option<i32>,
    /// User the connection belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Epoch milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    /// Media stack tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integration: Option<Integration>,
    /// Free-form marker set by the application.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker: Option<String>,
}

// ============================================================================
// PeerRegistration
// ============================================================================

/// Caller-supplied metadata for a registration.
#[derive(Debug, Clone, Default)]
pub struct PeerRegistration {
    /// Call identifier.
    pub call_id: Option<String>,
    /// User identifier.
    pub user_id: Option<String>,
    /// Media stack tag in effect at registration.
    pub integration: Option<Integration>,
}

// ============================================================================
// ObservedPeer
// ============================================================================

/// A registered connection.
pub struct ObservedPeer {
    id: PeerConnectionId,
    handle: Weak<dyn PeerConnection>,
    registration: PeerRegistration,
    time_zone_offset_in_minute: i32,
    state: Mutex<LifecycleState>,
    environment: Arc<dyn EnvironmentProbe>,
    stats_provider: Arc<dyn RawStatsProvider>,
}

impl fmt::Debug for ObservedPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservedPeer")
            .field("id", &self.id)
            .field("call_id", &self.registration.call_id)
            .field("user_id", &self.registration.user_id)
            .field("state", &self.connection_state())
            .finish_non_exhaustive()
    }
}

impl ObservedPeer {
    /// Wraps `handle` under a fresh identity.
    pub fn new(
        handle: Weak<dyn PeerConnection>,
        registration: PeerRegistration,
        environment: Arc<dyn EnvironmentProbe>,
        stats_provider: Arc<dyn RawStatsProvider>,
    ) -> Self {
        Self {
            id: PeerConnectionId::generate(),
            handle,
            registration,
            time_zone_offset_in_minute: environment.time_zone_offset_in_minute(),
            state: Mutex::new(LifecycleState::new()),
            environment,
            stats_provider,
        }
    }

    /// Returns the connection identity.
    #[inline]
    #[must_use]
    pub fn id(&self) -> PeerConnectionId {
        self.id
    }

    /// Returns the registration metadata.
    #[inline]
    #[must_use]
    pub fn registration(&self) -> &PeerRegistration {
        &self.registration
    }

    /// Returns the last observed connection state.
    #[inline]
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.state.lock().current_state()
    }

    /// Returns `true` once the connection has dwelt in a terminal state
    /// beyond the expiry threshold.
    #[inline]
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.state.lock().is_expired()
    }

    /// Reads the handle's state and feeds it into the lifecycle tracker.
    ///
    /// A released handle reads as `closed`.
    pub fn refresh_connection_state(&self) {
        let next = self
            .handle
            .upgrade()
            .map_or(ConnectionState::Closed, |pc| pc.connection_state());

        if self.state.lock().update_state(next) {
            trace!(peer_connection_id = %self.id, state = %next, "Connection state changed");
        }
    }

    /// Assembles identity and environment metadata.
    ///
    /// When `browser_id` is `None` the environment probe is asked.
    pub async fn details(&self, marker: Option<&str>, browser_id: Option<&str>) -> PcDetails {
        let browser_id = match browser_id {
            Some(id) => id.to_string(),
            None => self.environment.browser_id().await,
        };

        PcDetails {
            browser_id: Some(browser_id),
            client_details: Some(self.environment.client_details()),
            call_id: self.registration.call_id.clone(),
            device_list: Some(self.environment.active_device_list()),
            peer_connection_id: Some(self.id),
            time_zone_offset_in_minute: Some(self.time_zone_offset_in_minute),
            user_id: self.registration.user_id.clone(),
            timestamp: Some(epoch_millis()),
            integration: self.registration.integration,
            marker: marker.map(str::to_string),
        }
    }

    /// Queries receiver and sender statistics concurrently.
    ///
    /// Completes once both queries resolve. Either failing fails the
    /// snapshot as a whole.
    ///
    /// # Errors
    ///
    /// - [`Error::HandleReleased`] if the handle was dropped
    /// - [`Error::StatsQuery`] if the provider failed
    pub async fn collect_stats(&self) -> Result<ObserverStats> {
        let (receivers, senders) = {
            let pc = self
                .handle
                .upgrade()
                .ok_or_else(|| Error::handle_released(self.id))?;
            (
                self.stats_provider.receiver_list(pc.as_ref()),
                self.stats_provider.sender_list(pc.as_ref()),
            )
        };

        let (receiver_stats, sender_stats) = tokio::try_join!(
            self.stats_provider.raw_stats(&receivers),
            self.stats_provider.raw_stats(&senders),
        )
        .map_err(|e| Error::stats_query(self.id, e.to_string()))?;

        Ok(ObserverStats {
            receiver_stats,
            sender_stats,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::collector::environment::StaticEnvironment;
    use crate::collector::stats::{ProviderError, RtpEndpoint, StatsRecord};

    struct FakePc(Mutex<ConnectionState>);

    impl PeerConnection for FakePc {
        fn connection_state(&self) -> ConnectionState {
            *self.0.lock()
        }

        fn senders(&self) -> Vec<RtpEndpoint> {
            vec![RtpEndpoint::new("sender", Some("audio"))]
        }

        fn receivers(&self) -> Vec<RtpEndpoint> {
            vec![
                RtpEndpoint::new("receiver-a", Some("audio")),
                RtpEndpoint::new("receiver-b", Some("video")),
            ]
        }
    }

    struct Provider {
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl RawStatsProvider for Provider {
        async fn raw_stats(&self, list: &[RtpEndpoint]) -> std::result::Result<Vec<StatsRecord>, ProviderError> {
            if let Some(bad) = self.fail_on
                && list.iter().any(|e| e.id == bad)
            {
                return Err("query rejected".into());
            }
            Ok(list.iter().map(|e| json!({ "trackId": e.id })).collect())
        }
    }

    fn peer(pc: &Arc<FakePc>, fail_on: Option<&'static str>) -> ObservedPeer {
        let handle: Arc<dyn PeerConnection> = pc.clone();
        ObservedPeer::new(
            Arc::downgrade(&handle),
            PeerRegistration {
                call_id: Some("call".into()),
                user_id: Some("alice".into()),
                integration: Some(Integration::Janus),
            },
            Arc::new(StaticEnvironment::new("probe-browser").with_time_zone_offset(60)),
            Arc::new(Provider { fail_on }),
        )
    }

    #[tokio::test]
    async fn test_collect_stats_reads_both_sides() {
        let pc = Arc::new(FakePc(Mutex::new(ConnectionState::Connected)));
        let stats = peer(&pc, None).collect_stats().await.unwrap();
        assert_eq!(stats.receiver_stats.len(), 2);
        assert_eq!(stats.sender_stats, vec![json!({ "trackId": "sender" })]);
    }

    #[tokio::test]
    async fn test_collect_stats_fails_when_one_side_fails() {
        let pc = Arc::new(FakePc(Mutex::new(ConnectionState::Connected)));
        let err = peer(&pc, Some("sender")).collect_stats().await.unwrap_err();
        assert!(matches!(err, Error::StatsQuery { .. }));
    }

    #[tokio::test]
    async fn test_released_handle() {
        let pc = Arc::new(FakePc(Mutex::new(ConnectionState::Connected)));
        let observed = peer(&pc, None);
        drop(pc);

        observed.refresh_connection_state();
        assert_eq!(observed.connection_state(), ConnectionState::Closed);

        let err = observed.collect_stats().await.unwrap_err();
        assert!(matches!(err, Error::HandleReleased { .. }));
    }

    #[test]
    fn test_refresh_tracks_handle_state() {
        let pc = Arc::new(FakePc(Mutex::new(ConnectionState::New)));
        let observed = peer(&pc, None);

        *pc.0.lock() = ConnectionState::Connecting;
        observed.refresh_connection_state();
        assert_eq!(observed.connection_state(), ConnectionState::Connecting);
        assert!(!observed.is_expired());
    }

    #[tokio::test]
    async fn test_details_prefers_explicit_browser_id() {
        let pc = Arc::new(FakePc(Mutex::new(ConnectionState::New)));
        let observed = peer(&pc, None);

        let details = observed.details(Some("m1"), Some("explicit")).await;
        assert_eq!(details.browser_id.as_deref(), Some("explicit"));
        assert_eq!(details.marker.as_deref(), Some("m1"));
        assert_eq!(details.peer_connection_id, Some(observed.id()));
        assert_eq!(details.time_zone_offset_in_minute, Some(60));
        assert_eq!(details.integration, Some(Integration::Janus));

        let details = observed.details(None, None).await;
        assert_eq!(details.browser_id.as_deref(), Some("probe-browser"));
        assert!(details.marker.is_none());
    }

    #[test]
    fn test_integration_wire_names() {
        assert_eq!(serde_json::to_string(&Integration::PeerJs).unwrap(), "\"PeerJS\"");
        assert_eq!(serde_json::to_string(&Integration::TokBox).unwrap(), "\"TokBox\"");
    }
}
