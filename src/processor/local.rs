//! Local delivery.
//!
//! With `transportType: local`, finished samples travel back across the
//! boundary in an `onLocalTransport` message and the main context hands
//! them to the application's [`LocalTransport`].

// ============================================================================
// Imports
// ============================================================================

use tracing::{debug, trace};

use crate::error::Result;
use crate::protocol::PeerConnectionSample;
use crate::transport::ProcessorWorker;

use super::SampleTransport;

// ============================================================================
// LocalTransport
// ============================================================================

/// Application callback receiving finished samples.
pub trait LocalTransport: Send + Sync {
    /// Called once per collection cycle on the main context.
    fn on_observer_rtc_sample(&self, samples: Vec<PeerConnectionSample>);
}

impl<F> LocalTransport for F
where
    F: Fn(Vec<PeerConnectionSample>) + Send + Sync,
{
    fn on_observer_rtc_sample(&self, samples: Vec<PeerConnectionSample>) {
        self(samples);
    }
}

// ============================================================================
// LocalForwarder
// ============================================================================

/// Worker-side transport posting samples back to the main context.
#[derive(Debug)]
pub struct LocalForwarder {
    worker: ProcessorWorker,
}

impl LocalForwarder {
    /// Creates a forwarder over `worker`.
    #[inline]
    #[must_use]
    pub fn new(worker: ProcessorWorker) -> Self {
        Self { worker }
    }
}

impl SampleTransport for LocalForwarder {
    fn send_bulk(&self, samples: Vec<PeerConnectionSample>) -> Result<()> {
        trace!(count = samples.len(), "Forwarding samples to local transport");
        self.worker.send_transport_data(samples)
    }

    fn update_access_token(&self, _token: Option<String>) {}

    fn close(&self) {
        debug!("Local forwarder closed");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use parking_lot::Mutex;

    use crate::protocol::WorkerPayload;
    use crate::transport::boundary::channel;

    #[test]
    fn test_closure_is_local_transport() {
        let seen = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&seen);
        let transport = move |samples: Vec<PeerConnectionSample>| {
            *sink.lock() += samples.len();
        };

        transport.on_observer_rtc_sample(vec![PeerConnectionSample::default()]);
        assert_eq!(*seen.lock(), 1);
    }

    #[tokio::test]
    async fn test_forwarder_posts_back() {
        let (mut main, worker) = channel();
        let forwarder = LocalForwarder::new(ProcessorWorker::new(worker.poster()));

        forwarder
            .send_bulk(vec![PeerConnectionSample::default()])
            .unwrap();

        let msg = main.recv().await.unwrap().unwrap();
        assert!(matches!(msg, WorkerPayload::OnLocalTransport(samples) if samples.len() == 1));
    }
}
