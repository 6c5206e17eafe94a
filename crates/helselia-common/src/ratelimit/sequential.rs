//! Serial FIFO executor with a transport-reported window
//!
//! Every task runs alone; completion reports the window the transport
//! observed (`remaining`, `reset_at`). Once the window is exhausted, the
//! next dispatch waits until the reset instant.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use tokio::sync::Mutex;

/// Window state reported by a completed task
#[derive(Debug, Clone, Copy, Default)]
pub struct RateInfo {
    /// Requests allowed per window, if the transport reported it
    pub limit: Option<u32>,
    /// Requests left in the current window
    pub remaining: Option<u32>,
    /// Instant the window rolls over
    pub reset_at: Option<Instant>,
}

struct Window {
    limit: u32,
    remaining: u32,
    reset_at: Option<Instant>,
}

/// Serial executor honoring a dynamic reset deadline
pub struct SequentialBucket {
    window: Mutex<Window>,
    in_progress: AtomicUsize,
}

impl Default for SequentialBucket {
    fn default() -> Self {
        Self::new()
    }
}

impl SequentialBucket {
    /// Create a bucket with an unknown window (first task always runs)
    #[must_use]
    pub fn new() -> Self {
        Self {
            window: Mutex::new(Window {
                limit: 1,
                remaining: 1,
                reset_at: None,
            }),
            in_progress: AtomicUsize::new(0),
        }
    }

    /// Number of tasks currently executing (0 or 1)
    #[must_use]
    pub fn in_progress(&self) -> usize {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Run a task under the bucket's serialization and window
    ///
    /// The task's output carries a [`RateInfo`] describing the window the
    /// transport reported; the next dispatch honors it.
    pub async fn run<T, F, Fut>(&self, task: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = (T, RateInfo)>,
    {
        // Queueing and serialization both come from the mutex: waiters
        // park here in FIFO order.
        let mut window = self.window.lock().await;

        if window.remaining == 0 {
            if let Some(reset_at) = window.reset_at {
                let now = Instant::now();
                if reset_at > now {
                    tokio::time::sleep_until(reset_at.into()).await;
                }
            }
            window.remaining = window.limit;
            window.reset_at = None;
        }

        self.in_progress.fetch_add(1, Ordering::AcqRel);
        let (value, info) = task().await;
        self.in_progress.fetch_sub(1, Ordering::AcqRel);

        if let Some(limit) = info.limit {
            window.limit = limit.max(1);
        }
        if let Some(remaining) = info.remaining {
            window.remaining = remaining;
        } else {
            window.remaining = window.remaining.saturating_sub(1);
        }
        if info.reset_at.is_some() {
            window.reset_at = info.reset_at;
        }

        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_tasks_run_serially() {
        let bucket = Arc::new(SequentialBucket::new());
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for id in 0..4 {
            let bucket = Arc::clone(&bucket);
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                bucket
                    .run(|| async move {
                        order.lock().unwrap().push(id);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        ((), RateInfo::default())
                    })
                    .await;
            }));
            // Give each spawn a chance to reach the lock in order.
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_exhausted_window_waits_for_reset() {
        let bucket = SequentialBucket::new();

        // First task reports the window is spent, resetting shortly.
        let reset_at = Instant::now() + Duration::from_millis(50);
        bucket
            .run(|| async move {
                (
                    (),
                    RateInfo {
                        limit: Some(1),
                        remaining: Some(0),
                        reset_at: Some(reset_at),
                    },
                )
            })
            .await;

        let started = Instant::now();
        bucket.run(|| async { ((), RateInfo::default()) }).await;
        assert!(
            started.elapsed() >= Duration::from_millis(45),
            "second task must wait for the reset deadline"
        );
    }

    #[tokio::test]
    async fn test_remaining_budget_dispatches_immediately() {
        let bucket = SequentialBucket::new();
        let reset_at = Instant::now() + Duration::from_secs(60);
        bucket
            .run(|| async move {
                (
                    (),
                    RateInfo {
                        limit: Some(5),
                        remaining: Some(4),
                        reset_at: Some(reset_at),
                    },
                )
            })
            .await;

        let started = Instant::now();
        bucket.run(|| async { ((), RateInfo::default()) }).await;
        assert!(started.elapsed() < Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_in_progress_tracks_execution() {
        let bucket = Arc::new(SequentialBucket::new());
        assert_eq!(bucket.in_progress(), 0);

        let inner = Arc::clone(&bucket);
        bucket
            .run(|| async move {
                assert_eq!(inner.in_progress(), 1);
                ((), RateInfo::default())
            })
            .await;
        assert_eq!(bucket.in_progress(), 0);
    }
}
