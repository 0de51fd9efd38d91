//! Local transport session.
//!
//! Demonstrates:
//! - Building an observer that delivers samples to a callback
//! - Registering connections and pushing extension stats
//! - Expiry of a closed connection
//!
//! Usage:
//!   cargo run --example local_transport
//!   cargo run --example local_transport -- --no-wait
//!   cargo run --example local_transport -- --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use common::{Args, SyntheticPc, SyntheticStats};
use rtc_observer::{
    ConnectionState, InitialConfig, Integration, ObserverBuilder, PeerConnectionSample, Result,
};
use serde_json::json;

// ============================================================================
// Constants
// ============================================================================

const POLL_INTERVAL_MS: u64 = 1_000;

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
    println!("=== Local Transport ===\n");

    let observer = ObserverBuilder::new(InitialConfig::new("ws://unused", POLL_INTERVAL_MS))
        .with_stats_provider(SyntheticStats::default())
        .with_integration(Integration::General)
        .with_marker("demo")
        .with_local_transport(|samples: Vec<PeerConnectionSample>| {
            println!("[Sample] {} connection(s)", samples.len());
            for sample in &samples {
                println!(
                    "        {} sender={} receiver={} extensions={}",
                    sample
                        .peer_connection_id
                        .map(|id| id.to_string())
                        .unwrap_or_default(),
                    sample.sender_stats.len(),
                    sample.receiver_stats.len(),
                    sample.extension_stats.len(),
                );
            }
        })
        .build()?;

    let first = Arc::new(SyntheticPc::new());
    let second = Arc::new(SyntheticPc::new());
    observer.register(&first, Some("call-1"), Some("alice"));
    observer.register(&second, Some("call-1"), Some("bob"));
    println!("[Setup] {} connections registered\n", observer.connection_count());

    observer.add_extension_stats(&json!({ "cpuLoad": 0.42 }), Some("cpu"));

    tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS * 3)).await;

    println!("\n[Close] Second connection closed, expires after 10s");
    second.set_state(ConnectionState::Closed);

    tokio::time::sleep(Duration::from_secs(12)).await;
    println!("[State] {} connection(s) remain\n", observer.connection_count());

    common::wait_for_exit(args.no_wait).await;
    observer.shutdown();
    Ok(())
}
