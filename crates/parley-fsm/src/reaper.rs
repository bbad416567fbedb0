//! Periodic background sweeps.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Handle to a running reaper task.
///
/// Cancelling is idempotent and does not wait for anything; the task stops at
/// its next poll without a final sweep. Dropping the handle cancels the task.
#[derive(Debug)]
pub struct ReaperHandle {
    name: &'static str,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ReaperHandle {
    /// Spawn a task on the current Tokio runtime that calls `sweep` every
    /// `interval` until cancelled. `sweep` returns how many entries it evicted.
    ///
    /// A zero `interval` disables the reaper: nothing is spawned and `None`
    /// is returned.
    pub fn spawn<F>(name: &'static str, interval: Duration, sweep: F) -> Result<Option<Self>>
    where
        F: Fn() -> usize + Send + 'static,
    {
        if interval.is_zero() {
            debug!(reaper = name, "Reaper disabled by zero interval");
            return Ok(None);
        }
        let handle = Handle::try_current().map_err(|_| Error::NoRuntime(name))?;
        let token = CancellationToken::new();
        let cancelled = token.clone();

        let task = handle.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; start sweeping one interval in.
            ticker.tick().await;

            info!(reaper = name, interval_ms = interval.as_millis() as u64, "Reaper started");
            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = sweep();
                        if evicted > 0 {
                            debug!(reaper = name, count = evicted, "Reaper sweep evicted entries");
                        }
                    }
                }
            }
            info!(reaper = name, "Reaper stopped");
        });

        Ok(Some(Self {
            name,
            token,
            task: Some(task),
        }))
    }

    /// Name given at spawn time.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signal the task to stop.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the reaper has been told to stop.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel and wait for the task to exit.
    pub async fn join(mut self) {
        self.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ReaperHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_spawn_outside_runtime_fails() {
        let result = ReaperHandle::spawn("test", Duration::from_millis(10), || 0);
        assert!(matches!(result, Err(Error::NoRuntime("test"))));
    }

    #[tokio::test]
    async fn test_zero_interval_spawns_nothing() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);

        let reaper = ReaperHandle::spawn("test", Duration::ZERO, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            0
        })
        .unwrap();
        assert!(reaper.is_none());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_zero_interval_needs_no_runtime() {
        let reaper = ReaperHandle::spawn("test", Duration::ZERO, || 0).unwrap();
        assert!(reaper.is_none());
    }

    #[tokio::test]
    async fn test_sweeps_until_cancelled() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);

        let reaper = ReaperHandle::spawn("test", Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            0
        })
        .unwrap()
        .unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        reaper.cancel();
        reaper.cancel();
        assert!(reaper.is_cancelled());
        reaper.join().await;

        let seen = ticks.load(Ordering::SeqCst);
        assert!(seen >= 2, "expected several sweeps, got {seen}");

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
    }

    #[tokio::test]
    async fn test_drop_cancels() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);

        let reaper = ReaperHandle::spawn("test", Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            0
        })
        .unwrap()
        .unwrap();
        drop(reaper);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }
}
