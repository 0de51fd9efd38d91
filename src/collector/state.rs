//! Connection lifecycle tracking and expiry.
//!
//! The authoritative connection state lives in the embedding environment.
//! [`LifecycleState`] only remembers the last observed value, stamps the
//! moment it changed, and reports whether a terminal state has been held
//! long enough for the connection to stop being observed.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

// ============================================================================
// Constants
// ============================================================================

/// Dwell time in a terminal state after which a connection expires.
pub const EXPIRED_LIMIT: Duration = Duration::from_secs(10);

// ============================================================================
// ConnectionState
// ============================================================================

/// Connection state as reported by a peer connection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Created, no negotiation yet.
    #[default]
    New,
    /// ICE/DTLS negotiation in progress.
    Connecting,
    /// Media can flow.
    Connected,
    /// Transport lost, may recover.
    Disconnected,
    /// Transport failed permanently.
    Failed,
    /// Closed by either side.
    Closed,
    /// The handle reported something outside the known set.
    Unknown,
}

impl ConnectionState {
    /// Every state, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::New,
        Self::Connecting,
        Self::Connected,
        Self::Disconnected,
        Self::Failed,
        Self::Closed,
        Self::Unknown,
    ];

    /// Returns `true` for `closed` and `failed`, the only states that expire.
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }

    /// Returns the wire name of the state.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
            Self::Closed => "closed",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionState {
    type Err = std::convert::Infallible;

    /// Parses a reported state. Unrecognized values map to `Unknown`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "new" => Self::New,
            "connecting" => Self::Connecting,
            "connected" => Self::Connected,
            "disconnected" => Self::Disconnected,
            "failed" => Self::Failed,
            "closed" => Self::Closed,
            _ => Self::Unknown,
        })
    }
}

// ============================================================================
// LifecycleState
// ============================================================================

/// Last observed state of one connection plus the time it was entered.
///
/// Any state may follow any other. `last_transition` moves only when the
/// observed state actually changes.
#[derive(Debug, Clone)]
pub struct LifecycleState {
    current: ConnectionState,
    last_transition: Instant,
    expired_limit: Duration,
}

impl Default for LifecycleState {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleState {
    /// Creates a tracker in state `new` with the default [`EXPIRED_LIMIT`].
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::with_expired_limit(EXPIRED_LIMIT)
    }

    /// Creates a tracker with a custom expiry threshold.
    #[inline]
    #[must_use]
    pub fn with_expired_limit(expired_limit: Duration) -> Self {
        Self {
            current: ConnectionState::New,
            last_transition: Instant::now(),
            expired_limit,
        }
    }

    /// Returns the last observed state.
    #[inline]
    #[must_use]
    pub fn current_state(&self) -> ConnectionState {
        self.current
    }

    /// Returns when the current state was entered.
    #[inline]
    #[must_use]
    pub fn last_transition(&self) -> Instant {
        self.last_transition
    }

    /// Records `next`, stamping the transition with the current time.
    ///
    /// Returns `true` if the state changed.
    #[inline]
    pub fn update_state(&mut self, next: ConnectionState) -> bool {
        self.update_state_at(next, Instant::now())
    }

    /// Records `next` as observed at `now`.
    ///
    /// Re-observing the current state is a no-op.
    pub fn update_state_at(&mut self, next: ConnectionState, now: Instant) -> bool {
        if self.current == next {
            return false;
        }
        self.current = next;
        self.last_transition = now;
        true
    }

    /// Returns `true` if the connection has expired as of now.
    #[inline]
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Returns `true` if the state is terminal and has been held for
    /// strictly longer than the expiry threshold at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        if !self.current.is_terminal() {
            return false;
        }
        now.saturating_duration_since(self.last_transition) > self.expired_limit
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn test_starts_new() {
        let state = LifecycleState::new();
        assert_eq!(state.current_state(), ConnectionState::New);
        assert!(!state.is_expired());
    }

    #[test]
    fn test_closed_expires_strictly_after_limit() {
        let t0 = Instant::now();
        let mut state = LifecycleState::new();
        state.update_state_at(ConnectionState::Closed, t0);

        assert!(!state.is_expired_at(t0 + Duration::from_millis(9_999)));
        assert!(!state.is_expired_at(t0 + Duration::from_millis(10_000)));
        assert!(state.is_expired_at(t0 + Duration::from_millis(10_001)));
    }

    #[test]
    fn test_failed_expires() {
        let t0 = Instant::now();
        let mut state = LifecycleState::new();
        state.update_state_at(ConnectionState::Failed, t0);
        assert!(state.is_expired_at(t0 + Duration::from_secs(11)));
    }

    #[test]
    fn test_non_terminal_never_expires() {
        let t0 = Instant::now();
        for next in [
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Disconnected,
            ConnectionState::Unknown,
        ] {
            let mut state = LifecycleState::new();
            state.update_state_at(next, t0);
            assert!(!state.is_expired_at(t0 + Duration::from_secs(3_600)));
        }
    }

    #[test]
    fn test_reopening_resets_dwell() {
        let t0 = Instant::now();
        let mut state = LifecycleState::new();
        state.update_state_at(ConnectionState::Closed, t0);
        state.update_state_at(ConnectionState::Connected, t0 + Duration::from_secs(5));
        state.update_state_at(ConnectionState::Closed, t0 + Duration::from_secs(6));

        assert!(!state.is_expired_at(t0 + Duration::from_secs(12)));
        assert!(state.is_expired_at(t0 + Duration::from_secs(17)));
    }

    #[test]
    fn test_custom_limit() {
        let t0 = Instant::now();
        let mut state = LifecycleState::with_expired_limit(Duration::from_millis(50));
        state.update_state_at(ConnectionState::Closed, t0);
        assert!(state.is_expired_at(t0 + Duration::from_millis(51)));
    }

    #[test]
    fn test_parse_unknown_state() {
        let parsed: ConnectionState = "bogus".parse().unwrap();
        assert_eq!(parsed, ConnectionState::Unknown);
        let parsed: ConnectionState = "connected".parse().unwrap();
        assert_eq!(parsed, ConnectionState::Connected);
    }

    #[test]
    fn test_state_serializes_lowercase() {
        let json = serde_json::to_string(&ConnectionState::Disconnected).unwrap();
        assert_eq!(json, "\"disconnected\"");
    }

    proptest! {
        #[test]
        fn prop_repeat_observation_is_noop(
            next in prop::sample::select(ConnectionState::ALL.to_vec()),
            gap_ms in 1u64..100_000,
        ) {
            let t0 = Instant::now();
            let mut state = LifecycleState::new();
            state.update_state_at(next, t0);
            let stamped = state.last_transition();

            let changed = state.update_state_at(next, t0 + Duration::from_millis(gap_ms));
            prop_assert!(!changed);
            prop_assert_eq!(state.last_transition(), stamped);
            prop_assert_eq!(state.current_state(), next);
        }

        #[test]
        fn prop_expiry_requires_terminal_state(
            next in prop::sample::select(ConnectionState::ALL.to_vec()),
            dwell_ms in 0u64..60_000,
        ) {
            let t0 = Instant::now();
            let mut state = LifecycleState::new();
            state.update_state_at(next, t0);
            let expired = state.is_expired_at(t0 + Duration::from_millis(dwell_ms));
            let expected = next.is_terminal() && dwell_ms > 10_000;
            prop_assert_eq!(expired, expected);
        }
    }
}
