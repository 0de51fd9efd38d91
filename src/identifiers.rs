//! Type-safe identifiers.
//!
//! Newtype wrappers prevent a connection identity from being mixed up with
//! the free-form `callId` / `userId` strings supplied by callers.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// PeerConnectionId
// ============================================================================

/// Identity of one monitored peer connection.
///
/// Assigned at registration and carried on the wire as the
/// `peerConnectionId` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerConnectionId(Uuid);

impl PeerConnectionId {
    /// Generates a new random identity.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[inline]
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for PeerConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PeerConnectionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for PeerConnectionId {
    #[inline]
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// Tests
// ============================================================================
