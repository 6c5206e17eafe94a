//! Token bucket with a reserved priority lane
//!
//! `tokens` executions are allowed per `interval`; `reserved_tokens` of
//! those are only spendable by priority tasks. Non-priority tasks run FIFO,
//! priority tasks are inserted ahead of them. An optional latency reference
//! stretches the wake-up so a refill never lands before the server's own
//! window has rolled over.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

type Task = Box<dyn FnOnce() + Send + 'static>;

struct Inner {
    used: u32,
    last_reset: Instant,
    queue: VecDeque<(Task, bool)>,
    timer_scheduled: bool,
}

/// Token-bucket rate limiter
///
/// Tasks queued here are plain closures; the async world hands the bucket
/// channel sends, which are synchronous. Dispatch happens inline when
/// tokens are available and from a timer task otherwise.
pub struct Bucket {
    tokens: u32,
    interval: Duration,
    reserved_tokens: u32,
    /// Observed network latency in ms, shared with whoever measures it
    latency: Arc<AtomicU64>,
    inner: Mutex<Inner>,
}

impl Bucket {
    /// Create a bucket allowing `tokens` runs per `interval`, with
    /// `reserved_tokens` of them set aside for priority tasks.
    #[must_use]
    pub fn new(tokens: u32, interval: Duration, reserved_tokens: u32) -> Arc<Self> {
        Self::with_latency_ref(tokens, interval, reserved_tokens, Arc::new(AtomicU64::new(0)))
    }

    /// Create a bucket whose refill wake-up is delayed by a shared
    /// latency measurement.
    #[must_use]
    pub fn with_latency_ref(
        tokens: u32,
        interval: Duration,
        reserved_tokens: u32,
        latency: Arc<AtomicU64>,
    ) -> Arc<Self> {
        Arc::new(Self {
            tokens,
            interval,
            reserved_tokens: reserved_tokens.min(tokens),
            latency,
            inner: Mutex::new(Inner {
                used: 0,
                last_reset: Instant::now(),
                queue: VecDeque::new(),
                timer_scheduled: false,
            }),
        })
    }

    /// Enqueue a task
    ///
    /// Priority tasks may consume the reserved lane and are placed ahead
    /// of all queued non-priority tasks (FIFO within each class).
    pub fn queue(self: &Arc<Self>, task: impl FnOnce() + Send + 'static, priority: bool) {
        {
            let mut inner = self.inner.lock().expect("bucket poisoned");
            let entry = (Box::new(task) as Task, priority);
            if priority {
                let at = inner
                    .queue
                    .iter()
                    .position(|(_, p)| !p)
                    .unwrap_or(inner.queue.len());
                inner.queue.insert(at, entry);
            } else {
                inner.queue.push_back(entry);
            }
        }
        self.check();
    }

    /// Tokens spent in the current window
    #[must_use]
    pub fn used(&self) -> u32 {
        self.inner.lock().expect("bucket poisoned").used
    }

    /// Queued tasks not yet dispatched
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.lock().expect("bucket poisoned").queue.len()
    }

    /// Dispatch whatever the current window allows, then schedule a wake
    /// for the remainder. Concurrent callers coalesce onto one timer.
    fn check(self: &Arc<Self>) {
        let mut runnable: Vec<Task> = Vec::new();
        {
            let mut inner = self.inner.lock().expect("bucket poisoned");

            if inner.last_reset.elapsed() >= self.interval {
                inner.used = 0;
                inner.last_reset = Instant::now();
            }

            while let Some(priority) = inner.queue.front().map(|(_, p)| *p) {
                let budget = if priority {
                    self.tokens
                } else {
                    self.tokens - self.reserved_tokens
                };
                if inner.used >= budget {
                    break;
                }
                inner.used += 1;
                if let Some((task, _)) = inner.queue.pop_front() {
                    runnable.push(task);
                }
            }

            if !inner.queue.is_empty() && !inner.timer_scheduled {
                inner.timer_scheduled = true;
                let elapsed = inner.last_reset.elapsed();
                let latency = Duration::from_millis(self.latency.load(Ordering::Relaxed));
                let wait = self.interval.saturating_sub(elapsed) + latency;
                let bucket = Arc::clone(self);
                tokio::spawn(async move {
                    tokio::time::sleep(wait).await;
                    bucket
                        .inner
                        .lock()
                        .expect("bucket poisoned")
                        .timer_scheduled = false;
                    bucket.check();
                });
            }
        }

        // Run outside the lock so a task may re-enqueue on this bucket.
        for task in runnable {
            task();
        }
    }
}

/// Queue one task across several buckets; it runs once every bucket has
/// granted it a token.
pub fn queue_joint(buckets: &[Arc<Bucket>], task: impl FnOnce() + Send + 'static, priority: bool) {
    let wait_for = buckets.len();
    if wait_for == 0 {
        task();
        return;
    }

    let remaining = Arc::new(std::sync::atomic::AtomicUsize::new(wait_for));
    let slot = Arc::new(Mutex::new(Some(Box::new(task) as Task)));

    for bucket in buckets {
        let remaining = Arc::clone(&remaining);
        let slot = Arc::clone(&slot);
        bucket.queue(
            move || {
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    if let Some(task) = slot.lock().expect("joint slot poisoned").take() {
                        task();
                    }
                }
            },
            priority,
        );
    }
}
