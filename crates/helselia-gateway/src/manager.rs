//! Shard manager
//!
//! Owns the shard collection and a serialized connect queue: one worker
//! drains the queue, waiting for each shard's pre-ready/resume signal (or
//! its identify ratelimit slot) before starting the next. Session-start
//! concurrency is bucketed by `shard_id % max_concurrency`.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use helselia_common::ClientOptions;
use helselia_core::{CacheStore, Snowflake, Token};

use crate::events::Event;
use crate::shard::Shard;

/// Minimum spacing between identifies sharing a concurrency lane
const IDENTIFY_LANE_SPACING: Duration = Duration::from_secs(5);

/// Identify budget from the `/gateway/bot` probe
#[derive(Debug, Clone)]
struct IdentifyBudget {
    total: u32,
    remaining: u32,
    reset_at: Instant,
    max_concurrency: u32,
}

impl Default for IdentifyBudget {
    fn default() -> Self {
        Self {
            total: 1000,
            remaining: 1000,
            reset_at: Instant::now() + Duration::from_secs(24 * 60 * 60),
            max_concurrency: 1,
        }
    }
}

/// Collection of shards plus the serialized connect queue
pub struct ShardManager {
    token: Token,
    options: Arc<ClientOptions>,
    cache: Arc<CacheStore>,
    events: mpsc::UnboundedSender<Event>,

    gateway_url: RwLock<String>,
    total_shards: RwLock<u32>,

    shards: DashMap<u32, Arc<Shard>>,
    connect_queue: Mutex<VecDeque<u32>>,
    worker_running: AtomicBool,

    budget: Mutex<IdentifyBudget>,
    /// Last identify instant per concurrency lane
    lanes: Mutex<HashMap<u32, Instant>>,
}

impl ShardManager {
    /// Create an empty manager
    #[must_use]
    pub fn new(
        token: Token,
        options: Arc<ClientOptions>,
        cache: Arc<CacheStore>,
        events: mpsc::UnboundedSender<Event>,
    ) -> Arc<Self> {
        Arc::new(Self {
            token,
            options,
            cache,
            events,
            gateway_url: RwLock::new(String::new()),
            total_shards: RwLock::new(1),
            shards: DashMap::new(),
            connect_queue: Mutex::new(VecDeque::new()),
            worker_running: AtomicBool::new(false),
            budget: Mutex::new(IdentifyBudget::default()),
            lanes: Mutex::new(HashMap::new()),
        })
    }

    /// Point new connections at a gateway URL
    pub fn set_gateway_url(&self, url: impl Into<String>) {
        let url = url.into();
        *self.gateway_url.write().expect("url poisoned") = url.clone();
        for shard in self.shards.iter() {
            shard.set_gateway_url(url.clone());
        }
    }

    /// Fix the total shard count before spawning
    pub fn set_total_shards(&self, total: u32) {
        *self.total_shards.write().expect("total poisoned") = total.max(1);
    }

    /// Apply the identify budget from the gateway probe
    pub fn set_session_start_limit(
        &self,
        total: u32,
        remaining: u32,
        reset_after_ms: u64,
        max_concurrency: u32,
    ) {
        let mut budget = self.budget.lock().expect("budget poisoned");
        *budget = IdentifyBudget {
            total: total.max(1),
            remaining,
            reset_at: Instant::now() + Duration::from_millis(reset_after_ms),
            max_concurrency: max_concurrency.max(1),
        };
    }

    /// Total shard count
    #[must_use]
    pub fn total_shards(&self) -> u32 {
        *self.total_shards.read().expect("total poisoned")
    }

    /// The shard owning a guild id
    #[must_use]
    pub fn shard_for_guild(&self, guild_id: Snowflake) -> Option<Arc<Shard>> {
        let id = guild_id.shard_id(self.total_shards());
        self.shard(id)
    }

    /// Get a shard by id
    #[must_use]
    pub fn shard(&self, id: u32) -> Option<Arc<Shard>> {
        self.shards.get(&id).map(|s| s.clone())
    }

    /// Number of spawned shards
    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Mean heartbeat latency across connected shards, in milliseconds
    #[must_use]
    pub fn mean_latency_ms(&self) -> u64 {
        let latencies: Vec<u64> = self.shards.iter().map(|s| s.latency_ms()).collect();
        if latencies.is_empty() {
            return 0;
        }
        latencies.iter().sum::<u64>() / latencies.len() as u64
    }

    /// Create a shard (idempotent per id)
    pub fn spawn(&self, id: u32) -> Arc<Shard> {
        if let Some(existing) = self.shard(id) {
            return existing;
        }
        let shard = Shard::new(
            id,
            self.total_shards(),
            self.token.clone(),
            self.gateway_url.read().expect("url poisoned").clone(),
            Arc::clone(&self.options),
            Arc::clone(&self.cache),
            self.events.clone(),
        );
        self.shards.insert(id, Arc::clone(&shard));
        debug!(shard_id = id, "Shard spawned");
        shard
    }

    /// Append a shard to the connect queue (no-op if already queued)
    pub fn connect(self: &Arc<Self>, shard: &Arc<Shard>) {
        {
            let mut queue = self.connect_queue.lock().expect("queue poisoned");
            if queue.contains(&shard.id()) {
                return;
            }
            queue.push_back(shard.id());
        }
        self.ensure_worker();
    }

    /// Disconnect every shard and clear the queue
    pub fn disconnect_all(&self) {
        self.connect_queue.lock().expect("queue poisoned").clear();
        for shard in self.shards.iter() {
            shard.disconnect();
        }
        info!("All shards disconnected, connect queue cleared");
    }

    /// Queued shard ids (observability)
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.connect_queue.lock().expect("queue poisoned").len()
    }

    fn ensure_worker(self: &Arc<Self>) {
        if self.worker_running.swap(true, Ordering::AcqRel) {
            return;
        }
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager.drain_queue().await;
        });
    }

    /// The single connect worker
    async fn drain_queue(self: Arc<Self>) {
        loop {
            let next = self.connect_queue.lock().expect("queue poisoned").pop_front();
            let Some(id) = next else {
                self.worker_running.store(false, Ordering::Release);
                // Re-check: a connect may have raced the flag.
                if self.connect_queue.lock().expect("queue poisoned").is_empty()
                    || self.worker_running.swap(true, Ordering::AcqRel)
                {
                    return;
                }
                continue;
            };

            let Some(shard) = self.shard(id) else {
                warn!(shard_id = id, "Queued shard no longer exists");
                continue;
            };

            self.await_identify_slot(id).await;
            debug!(shard_id = id, "Connect queue starting shard");
            shard.connect();

            let wait = Duration::from_millis(self.options.connection_timeout_ms);
            if tokio::time::timeout(wait, shard.wait_ready_signal())
                .await
                .is_err()
            {
                warn!(
                    shard_id = id,
                    "Shard did not signal ready in time, continuing queue"
                );
            }
        }
    }

    /// Honor the session-start limit for one identify
    async fn await_identify_slot(&self, shard_id: u32) {
        // Budget: when no identifies remain, wait for the window reset.
        loop {
            let wait = {
                let mut budget = self.budget.lock().expect("budget poisoned");
                if budget.remaining > 0 {
                    budget.remaining -= 1;
                    None
                } else if budget.reset_at <= Instant::now() {
                    budget.remaining = budget.total.saturating_sub(1);
                    budget.reset_at = Instant::now() + Duration::from_secs(24 * 60 * 60);
                    None
                } else {
                    Some(budget.reset_at - Instant::now())
                }
            };
            match wait {
                Some(wait) => {
                    warn!(
                        shard_id = shard_id,
                        wait_ms = wait.as_millis() as u64,
                        "Session start limit exhausted, waiting for reset"
                    );
                    tokio::time::sleep(wait).await;
                }
                None => break,
            }
        }

        // Lane: shards sharing `id % max_concurrency` identify serially.
        let lane = {
            let budget = self.budget.lock().expect("budget poisoned");
            shard_id % budget.max_concurrency
        };
        let wait = {
            let lanes = self.lanes.lock().expect("lanes poisoned");
            lanes.get(&lane).and_then(|last| {
                IDENTIFY_LANE_SPACING.checked_sub(last.elapsed())
            })
        };
        if let Some(wait) = wait {
            debug!(
                shard_id = shard_id,
                lane = lane,
                wait_ms = wait.as_millis() as u64,
                "Waiting for identify lane"
            );
            tokio::time::sleep(wait).await;
        }
        self.lanes
            .lock()
            .expect("lanes poisoned")
            .insert(lane, Instant::now());
    }
}

impl std::fmt::Debug for ShardManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardManager")
            .field("shards", &self.shards.len())
            .field("queued", &self.queue_len())
            .finish()
    }
}
