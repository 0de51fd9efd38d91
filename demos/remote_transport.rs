//! Remote transport session.
//!
//! Demonstrates:
//! - Building an observer that ships samples to a websocket aggregator
//! - Supplying the access token through a function
//! - Reporting a user-media error
//!
//! Usage:
//!   cargo run --example remote_transport -- ws://localhost:7080/samples
//!   cargo run --example remote_transport -- ws://localhost:7080/samples --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use common::{Args, SyntheticPc, SyntheticStats};
use rtc_observer::{AccessToken, InitialConfig, ObserverBuilder, PeerConnectionId, Result};

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_ADDRESS: &str = "ws://localhost:7080/samples";
const POLL_INTERVAL_MS: u64 = 2_000;

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    println!("=== Remote Transport ===\n");

    let address = std::env::args()
        .skip(1)
        .find(|a| !a.starts_with("--"))
        .unwrap_or_else(|| DEFAULT_ADDRESS.to_string());

    let observer = ObserverBuilder::new(InitialConfig::new(address.as_str(), POLL_INTERVAL_MS))
        .with_stats_provider(SyntheticStats::default())
        .with_access_token(AccessToken::from_fn(|| {
            format!("demo-{}", PeerConnectionId::generate())
        }))
        .with_error_handler(|e| eprintln!("[Observer] {e}"))
        .build()?;

    println!("[Setup] Delivering to {address}");

    let pc = Arc::new(SyntheticPc::new());
    let id = observer.register(&pc, Some("call-7"), Some("carol"));
    println!("[Setup] Registered {id}\n");

    observer.on_media_error("NotAllowedError").await;

    common::wait_for_exit(args.no_wait).await;
    observer.shutdown();
    Ok(())
}
