//! Cancellable, single-flight periodic task runner.

use std::{future::Future, time::Duration};

use tokio::{sync::watch, task::JoinHandle};

use crate::error::ClientError;

/// Runs an async action on a fixed-delay schedule on a background task.
///
/// Each run executes to completion before the next delay starts (single
/// flight - ticks never overlap). Errors raised by the action are logged and
/// swallowed; one unreachable endpoint must never kill the loop.
///
/// [`stop`](Self::stop) cancels the pending delay immediately but lets an
/// in-flight run finish; no new run starts after stop is observed. Double
/// stop is a no-op. The scheduler does not guard against overlapping starts -
/// callers stop before starting a replacement.
pub struct PollScheduler {
    shutdown: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl PollScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self { shutdown: None, handle: None }
    }

    /// Begins the loop: run `action`, log any error, wait out `period`,
    /// repeat. The first run starts immediately.
    pub fn start<F, Fut>(&mut self, mut action: F, period: Duration)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), ClientError>> + Send,
    {
        let (tx, mut rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            loop {
                if let Err(e) = action().await {
                    tracing::warn!(error = %e, "scheduled task failed");
                }

                tokio::select! {
                    () = tokio::time::sleep(period) => {}
                    changed = rx.changed() => {
                        // Sender dropped counts as a stop request too.
                        if changed.is_err() || *rx.borrow() {
                            break;
                        }
                    }
                }

                if *rx.borrow() {
                    break;
                }
            }
            tracing::debug!("scheduler loop exited");
        });

        self.shutdown = Some(tx);
        self.handle = Some(handle);
    }

    /// Requests cancellation. The pending delay is cut short; an in-flight
    /// run is allowed to finish.
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }
        self.handle.take();
    }

    /// Whether a loop has been started and not yet stopped.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shutdown.is_some()
    }
}

impl Default for PollScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    #[tokio::test]
    async fn test_runs_immediately_and_repeats() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut scheduler = PollScheduler::new();

        let c = counter.clone();
        scheduler.start(
            move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
            Duration::from_millis(20),
        );

        tokio::time::sleep(Duration::from_millis(110)).await;
        scheduler.stop();

        let runs = counter.load(Ordering::SeqCst);
        assert!(runs >= 3, "expected several runs, got {runs}");
    }

    #[tokio::test]
    async fn test_stop_prevents_further_runs() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut scheduler = PollScheduler::new();

        let c = counter.clone();
        scheduler.start(
            move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
            Duration::from_millis(10),
        );

        tokio::time::sleep(Duration::from_millis(35)).await;
        scheduler.stop();
        let at_stop = counter.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let after = counter.load(Ordering::SeqCst);
        // One in-flight run may still have completed, never more.
        assert!(after <= at_stop + 1, "runs continued after stop: {at_stop} -> {after}");
    }

    #[tokio::test]
    async fn test_errors_do_not_kill_the_loop() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut scheduler = PollScheduler::new();

        let c = counter.clone();
        scheduler.start(
            move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(ClientError::Timeout)
                }
            },
            Duration::from_millis(15),
        );

        tokio::time::sleep(Duration::from_millis(80)).await;
        scheduler.stop();

        assert!(counter.load(Ordering::SeqCst) >= 3, "failing action must keep rescheduling");
    }

    #[tokio::test]
    async fn test_double_stop_is_harmless() {
        let mut scheduler = PollScheduler::new();
        scheduler.start(|| async { Ok(()) }, Duration::from_millis(10));

        assert!(scheduler.is_running());
        scheduler.stop();
        assert!(!scheduler.is_running());
        scheduler.stop();
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_single_flight_slow_action() {
        // A run that outlives the period must not overlap with the next.
        let active = Arc::new(AtomicUsize::new(0));
        let overlapped = Arc::new(AtomicUsize::new(0));
        let mut scheduler = PollScheduler::new();

        let a = active.clone();
        let o = overlapped.clone();
        scheduler.start(
            move || {
                let a = a.clone();
                let o = o.clone();
                async move {
                    if a.fetch_add(1, Ordering::SeqCst) > 0 {
                        o.fetch_add(1, Ordering::SeqCst);
                    }
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    a.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            },
            Duration::from_millis(5),
        );

        tokio::time::sleep(Duration::from_millis(120)).await;
        scheduler.stop();

        assert_eq!(overlapped.load(Ordering::SeqCst), 0, "ticks must never overlap");
    }
}
