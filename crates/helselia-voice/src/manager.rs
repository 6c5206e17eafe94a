//! Voice connection manager
//!
//! Bridges gateway voice events and sessions. `join` records a pending
//! entry that a later `VOICE_SERVER_UPDATE` completes; the returned future
//! resolves when the session reaches ready, rejects on session
//! disconnect/error, and rejects with a timeout after the join deadline.
//! Listeners are one-shot and mutually exclusive.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use helselia_core::Snowflake;

use crate::error::VoiceError;
use crate::session::{VoiceConnectInfo, VoiceSession, VoiceSessionEvent};
use crate::VoiceResult;

/// Default join deadline
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Options for a voice join
#[derive(Debug, Clone)]
pub struct JoinOptions {
    /// Negotiate Opus passthrough only
    pub opus_only: bool,
    /// Allow the session to be shared
    pub shared: bool,
    pub self_mute: bool,
    pub self_deaf: bool,
    /// Join deadline override in milliseconds
    pub timeout_ms: u64,
    /// Shard that carries this join's voice-state update
    pub shard_id: Option<u32>,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self {
            opus_only: false,
            shared: false,
            self_mute: false,
            self_deaf: false,
            timeout_ms: JOIN_TIMEOUT.as_millis() as u64,
            shard_id: None,
        }
    }
}

/// A `VOICE_SERVER_UPDATE` as forwarded by a shard
#[derive(Debug, Clone)]
pub struct VoiceServerInfo {
    pub guild_id: Snowflake,
    pub endpoint: Option<String>,
    pub token: String,
    pub session_id: Option<String>,
    pub user_id: Option<Snowflake>,
}

struct PendingJoin {
    channel_id: Snowflake,
    options: JoinOptions,
    /// Completion signal; moved to the listener task on first update
    tx: Option<oneshot::Sender<VoiceResult<Arc<VoiceSession>>>>,
    timeout: JoinHandle<()>,
    /// Listeners already attached; later updates must not re-attach
    waiting: bool,
}

/// Pending-join table plus the per-guild session collection
pub struct VoiceConnectionManager {
    sessions: DashMap<Snowflake, Arc<VoiceSession>>,
    pending: Mutex<HashMap<Snowflake, PendingJoin>>,
}

impl VoiceConnectionManager {
    /// Create an empty manager
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            pending: Mutex::new(HashMap::new()),
        })
    }

    /// Session for a guild, if one exists
    #[must_use]
    pub fn get(&self, guild_id: Snowflake) -> Option<Arc<VoiceSession>> {
        self.sessions.get(&guild_id).map(|s| s.clone())
    }

    /// Number of live sessions
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Join a voice channel
    ///
    /// The caller must separately send the gateway voice-state update on
    /// the owning shard; this records the rendezvous that the resulting
    /// `VOICE_SERVER_UPDATE` completes.
    pub async fn join(
        self: &Arc<Self>,
        guild_id: Snowflake,
        channel_id: Snowflake,
        options: JoinOptions,
    ) -> VoiceResult<Arc<VoiceSession>> {
        // Live and ready: switch in place, no pending entry.
        if let Some(session) = self.get(guild_id) {
            if session.is_ready() {
                session.switch_channel(channel_id);
                return Ok(session);
            }
            // Live but mid-negotiation: ride its next lifecycle event.
            let (tx, rx) = oneshot::channel();
            attach_one_shot_listener(Arc::clone(&session), tx);
            return rx.await.map_err(|_| VoiceError::Disconnected(None))?;
        }

        let (tx, rx) = oneshot::channel();
        let timeout = Duration::from_millis(options.timeout_ms);
        let manager = Arc::clone(self);
        let timeout_task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let entry = manager.pending.lock().expect("pending poisoned").remove(&guild_id);
            if let Some(mut entry) = entry {
                warn!(guild_id = %guild_id, "Voice join timed out");
                if let Some(tx) = entry.tx.take() {
                    let _ = tx.send(Err(VoiceError::Timeout));
                }
            }
        });

        self.pending.lock().expect("pending poisoned").insert(
            guild_id,
            PendingJoin {
                channel_id,
                options,
                tx: Some(tx),
                timeout: timeout_task,
                waiting: false,
            },
        );

        rx.await.map_err(|_| VoiceError::Disconnected(None))?
    }

    /// Route a `VOICE_SERVER_UPDATE` from the identified shard
    ///
    /// Cancels the pending timeout, creates or refreshes the session,
    /// and attaches the one-shot listeners for the pending waiter.
    pub fn voice_server_update(self: &Arc<Self>, info: VoiceServerInfo, shard_id: u32) {
        let guild_id = info.guild_id;
        debug!(guild_id = %guild_id, shard_id = shard_id, "Voice server update");

        let (channel_id, options, waiter) = {
            let mut pending = self.pending.lock().expect("pending poisoned");
            match pending.get_mut(&guild_id) {
                Some(entry) => {
                    entry.timeout.abort();
                    let waiter = if entry.waiting { None } else { entry.tx.take() };
                    entry.waiting = true;
                    (Some(entry.channel_id), entry.options.clone(), waiter)
                }
                None => (None, JoinOptions::default(), None),
            }
        };

        let session = self
            .sessions
            .entry(guild_id)
            .or_insert_with(|| {
                Arc::new(VoiceSession::new(
                    guild_id,
                    options.opus_only,
                    options.shared,
                ))
            })
            .clone();

        if let Some(tx) = waiter {
            let manager = Arc::clone(self);
            attach_one_shot_listener_with(Arc::clone(&session), tx, move |_outcome| {
                manager
                    .pending
                    .lock()
                    .expect("pending poisoned")
                    .remove(&guild_id);
            });
        }

        session.connect(VoiceConnectInfo {
            channel_id: channel_id.or_else(|| session.channel_id()),
            endpoint: info.endpoint,
            token: info.token,
            session_id: info.session_id,
            user_id: info.user_id,
        });
    }

    /// Move an existing session to another channel
    pub fn switch(&self, guild_id: Snowflake, channel_id: Snowflake) -> VoiceResult<()> {
        match self.get(guild_id) {
            Some(session) => {
                session.switch_channel(channel_id);
                Ok(())
            }
            None => Err(VoiceError::Disconnected(None)),
        }
    }

    /// Disconnect and destroy a guild's session
    pub fn leave(&self, guild_id: Snowflake) {
        if let Some((_, session)) = self.sessions.remove(&guild_id) {
            session.disconnect(None);
        }
        // A join still in flight for this guild dies with the session.
        let entry = self.pending.lock().expect("pending poisoned").remove(&guild_id);
        if let Some(mut entry) = entry {
            entry.timeout.abort();
            if let Some(tx) = entry.tx.take() {
                let _ = tx.send(Err(VoiceError::Disconnected(None)));
            }
        }
    }

    /// Reject pending joins owned by a disconnecting shard
    pub fn reject_pending_for_shard(&self, shard_id: u32) {
        let mut pending = self.pending.lock().expect("pending poisoned");
        let affected: Vec<Snowflake> = pending
            .iter()
            .filter(|(_, entry)| entry.options.shard_id == Some(shard_id))
            .map(|(guild_id, _)| *guild_id)
            .collect();
        for guild_id in affected {
            if let Some(mut entry) = pending.remove(&guild_id) {
                entry.timeout.abort();
                if let Some(tx) = entry.tx.take() {
                    let _ = tx.send(Err(VoiceError::Disconnected(Some(
                        "shard disconnected".into(),
                    ))));
                }
            }
        }
    }

    /// Tear everything down (client-level disconnect)
    pub fn disconnect_all(&self) {
        let guild_ids: Vec<Snowflake> = self.sessions.iter().map(|s| *s.key()).collect();
        for guild_id in guild_ids {
            self.leave(guild_id);
        }
        let mut pending = self.pending.lock().expect("pending poisoned");
        for (_, mut entry) in pending.drain() {
            entry.timeout.abort();
            if let Some(tx) = entry.tx.take() {
                let _ = tx.send(Err(VoiceError::Disconnected(None)));
            }
        }
    }
}

impl std::fmt::Debug for VoiceConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceConnectionManager")
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

/// Resolve `tx` from the session's next lifecycle event
///
/// Ready resolves, disconnect/error reject; whichever fires first wins
/// and the listener is gone afterwards.
fn attach_one_shot_listener(
    session: Arc<VoiceSession>,
    tx: oneshot::Sender<VoiceResult<Arc<VoiceSession>>>,
) {
    attach_one_shot_listener_with(session, tx, |_| {});
}

fn attach_one_shot_listener_with(
    session: Arc<VoiceSession>,
    tx: oneshot::Sender<VoiceResult<Arc<VoiceSession>>>,
    on_settle: impl FnOnce(&VoiceResult<Arc<VoiceSession>>) + Send + 'static,
) {
    let mut events = session.subscribe();
    tokio::spawn(async move {
        let outcome = loop {
            match events.recv().await {
                Ok(VoiceSessionEvent::Ready) => break Ok(Arc::clone(&session)),
                Ok(VoiceSessionEvent::Disconnect(reason)) => {
                    break Err(VoiceError::Disconnected(reason));
                }
                Ok(VoiceSessionEvent::Error(message)) => {
                    break Err(VoiceError::Session(message));
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    break Err(VoiceError::Disconnected(None));
                }
            }
        };
        on_settle(&outcome);
        let _ = tx.send(outcome);
    });
}
