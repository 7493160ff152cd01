//! Refresh scheduler - recurring full recomputation while live mode is on
//!
//! The pure modules never own timers. A caller that wants polling starts a
//! `RefreshScheduler` with a `refresh` closure; each tick re-derives
//! everything from scratch.
//!
//! Global invariants enforced:
//! - First refresh runs immediately, then once per period
//! - Ticks missed while a refresh overruns are skipped, not replayed
//! - A failing refresh is logged and the schedule keeps going
//! - Stopping (or dropping the handle) ends the task before the next tick

use anyhow::Result;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Handle to a running refresh loop. Must be created inside a tokio runtime.
pub struct RefreshScheduler {
    period: Duration,
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl RefreshScheduler {
    pub fn start<F>(period: Duration, mut refresh: F) -> Self
    where
        F: FnMut() -> Result<()> + Send + 'static,
    {
        let period = period.max(MIN_PERIOD);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        info!(period_ms = period.as_millis() as u64, "starting refresh scheduler");

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut ticks: u64 = 0;
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        ticks += 1;
                        if let Err(e) = refresh() {
                            warn!(tick = ticks, error = %format!("{e:#}"), "scheduled refresh failed");
                        }
                    }
                }
            }
            info!(ticks, "refresh scheduler stopped");
        });

        RefreshScheduler {
            period,
            stop_tx,
            handle,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Signal the loop to stop and wait for it to exit
    pub async fn stop(self) {
        // the loop may already be gone, in which case there is nothing to signal
        let _ = self.stop_tx.send(());
        if let Err(e) = self.handle.await {
            warn!(error = %e, "refresh scheduler task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::sleep;

    fn counting(count: &Arc<AtomicUsize>) -> impl FnMut() -> Result<()> + Send + 'static {
        let count = Arc::clone(count);
        move || {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_immediate_then_periodic() {
        let count = Arc::new(AtomicUsize::new(0));
        let scheduler = RefreshScheduler::start(Duration::from_secs(10), counting(&count));

        sleep(Duration::from_millis(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(scheduler.is_running());

        sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        sleep(Duration::from_secs(25)).await;
        assert_eq!(count.load(Ordering::SeqCst), 4);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_refreshes() {
        let count = Arc::new(AtomicUsize::new(0));
        let scheduler = RefreshScheduler::start(Duration::from_secs(12), counting(&count));
        sleep(Duration::from_millis(1)).await;
        scheduler.stop().await;

        let seen = count.load(Ordering::SeqCst);
        sleep(Duration::from_secs(120)).await;
        assert_eq!(count.load(Ordering::SeqCst), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_halts_refreshes() {
        let count = Arc::new(AtomicUsize::new(0));
        let scheduler = RefreshScheduler::start(Duration::from_secs(12), counting(&count));
        sleep(Duration::from_millis(1)).await;
        drop(scheduler);

        sleep(Duration::from_secs(120)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_refresh_keeps_schedule() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&attempts);
        let scheduler = RefreshScheduler::start(Duration::from_secs(5), move || {
            seen.fetch_add(1, Ordering::SeqCst);
            bail!("upstream unavailable")
        });

        sleep(Duration::from_millis(10_001)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_period_clamped() {
        let count = Arc::new(AtomicUsize::new(0));
        let scheduler = RefreshScheduler::start(Duration::ZERO, counting(&count));
        assert_eq!(scheduler.period(), MIN_PERIOD);
        sleep(Duration::from_millis(5)).await;
        assert!(count.load(Ordering::SeqCst) >= 1);
        scheduler.stop().await;
    }
}
