//! Repeating timer.
//!
//! [`IntervalUpdater`] calls an action once per period until closed. Ticks
//! are not queued and not drift-corrected. Closing stops future ticks; an
//! invocation already running finishes normally.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::debug;

use crate::error::{Error, Result};

// ============================================================================
// IntervalUpdater
// ============================================================================

/// Calls an action on a fixed period.
///
/// Closed automatically on drop.
#[derive(Debug)]
pub struct IntervalUpdater {
    period: Duration,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl IntervalUpdater {
    /// Starts calling `action` every `period`, first after one period.
    ///
    /// Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `period` is zero.
    pub fn start<F>(period: Duration, action: F) -> Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        if period.is_zero() {
            return Err(Error::config("update period must be greater than zero"));
        }

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => action(),
                }
            }

            debug!(period_ms = period.as_millis() as u64, "Interval updater stopped");
        });

        debug!(period_ms = period.as_millis() as u64, "Interval updater started");

        Ok(Self {
            period,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
        })
    }

    /// Returns the period.
    #[inline]
    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Stops future invocations. Idempotent.
    pub fn close(&self) {
        if let Some(tx) = self.shutdown_tx.lock().take() {
            let _ = tx.send(());
        }
    }

    /// Returns `true` once closed.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shutdown_tx.lock().is_none()
    }
}

impl Drop for IntervalUpdater {
    fn drop(&mut self) {
        self.close();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::time::sleep;

    const PERIOD: Duration = Duration::from_millis(100);

    fn counting() -> (Arc<AtomicUsize>, impl Fn() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        (count, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_per_period() {
        let (count, action) = counting();
        let updater = IntervalUpdater::start(PERIOD, action).unwrap();

        sleep(PERIOD / 2).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        sleep(PERIOD * 3).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        updater.close();
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_prevents_further_invocations() {
        let (count, action) = counting();
        let updater = IntervalUpdater::start(PERIOD, action).unwrap();

        sleep(PERIOD * 2 + PERIOD / 2).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        updater.close();
        updater.close();
        assert!(updater.is_closed());

        sleep(PERIOD * 10).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_closes() {
        let (count, action) = counting();
        let updater = IntervalUpdater::start(PERIOD, action).unwrap();
        drop(updater);

        sleep(PERIOD * 5).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_zero_period_rejected() {
        let err = IntervalUpdater::start(Duration::ZERO, || {}).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
