//! Shared utilities for demos.
//!
//! Provides common functionality used across all demos:
//! - Command-line argument parsing
//! - Logging initialization
//! - A synthetic peer connection and stats provider

#![allow(dead_code)]

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use rtc_observer::collector::stats::{ProviderError, StatsRecord};
use rtc_observer::{ConnectionState, PeerConnection, RawStatsProvider, RtpEndpoint};
use serde_json::json;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments for demos.
#[derive(Debug, Clone)]
pub struct Args {
    pub debug: bool,
    pub no_wait: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self {
            debug: args.iter().any(|a| a == "--debug"),
            no_wait: args.iter().any(|a| a == "--no-wait"),
        }
    }
}

/// In-memory connection with one audio and one video track.
pub struct SyntheticPc {
    state: Mutex<ConnectionState>,
}

impl SyntheticPc {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ConnectionState::Connected),
        }
    }

    pub fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }
}

impl PeerConnection for SyntheticPc {
    fn connection_state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn senders(&self) -> Vec<RtpEndpoint> {
        vec![
            RtpEndpoint::new("local-audio", Some("audio")),
            RtpEndpoint::new("local-video", Some("video")),
        ]
    }

    fn receivers(&self) -> Vec<RtpEndpoint> {
        vec![RtpEndpoint::new("remote-video", Some("video"))]
    }
}

/// Provider producing growing byte counters.
#[derive(Default)]
pub struct SyntheticStats {
    bytes: AtomicU64,
}

#[async_trait]
impl RawStatsProvider for SyntheticStats {
    async fn raw_stats(&self, list: &[RtpEndpoint]) -> Result<Vec<StatsRecord>, ProviderError> {
        let bytes = self.bytes.fetch_add(1_200, Ordering::Relaxed);
        Ok(list
            .iter()
            .map(|e| json!({ "trackId": e.id, "kind": e.kind, "bytes": bytes }))
            .collect())
    }
}

// ============================================================================
// Functions
// ============================================================================

/// Initialize tracing/logging.
pub fn init_logging(debug: bool) {
    let filter = if debug {
        "rtc_observer=debug"
    } else {
        "rtc_observer=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

/// Wait for Ctrl+C or skip if `--no-wait` flag is set.
pub async fn wait_for_exit(no_wait: bool) {
    if no_wait {
        println!("[--no-wait] Skipping wait");
        return;
    }

    println!("Press Ctrl+C to exit...");
    tokio::signal::ctrl_c().await.ok();
}
