//! Client façade
//!
//! Owns the cache, options, REST handler, shard manager, and voice
//! manager; routes shard events to subscribers and into the voice
//! rendezvous; replicates presence across shards.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use helselia_common::{ClientOptions, ShardCount};
use helselia_core::{Activity, CacheStore, Snowflake, Status, Token};
use helselia_gateway::protocol::ClientPresence;
use helselia_gateway::{Event, ShardManager};
use helselia_rest::RequestHandler;
use helselia_voice::{
    JoinOptions, VoiceConnectionManager, VoiceError, VoiceServerInfo, VoiceSession,
};

use crate::ClientResult;

/// Default REST base (versioned prefix included)
const DEFAULT_API_URL: &str = "https://helselia.dev/api/v6";

/// Event fan-out buffer per subscriber
const EVENT_BUFFER: usize = 1024;

/// The client core façade
pub struct Client {
    options: Arc<ClientOptions>,
    cache: Arc<CacheStore>,
    rest: RequestHandler,
    shards: Arc<ShardManager>,
    voice: Arc<VoiceConnectionManager>,
    events: broadcast::Sender<Event>,
    presence: Mutex<ClientPresence>,
}

impl Client {
    /// Create a client against the default API endpoint
    pub fn new(token: Token, options: ClientOptions) -> ClientResult<Arc<Self>> {
        Self::with_api_url(token, options, DEFAULT_API_URL)
    }

    /// Create a client against a self-hosted API endpoint
    pub fn with_api_url(
        token: Token,
        options: ClientOptions,
        api_url: impl Into<String>,
    ) -> ClientResult<Arc<Self>> {
        options.validate()?;
        let options = Arc::new(options);
        let cache = Arc::new(CacheStore::new());

        let rest = RequestHandler::new(
            token.clone(),
            api_url,
            Duration::from_millis(options.request_timeout_ms),
        )?;

        let (shard_events_tx, shard_events_rx) = mpsc::unbounded_channel();
        let shards = ShardManager::new(
            token,
            Arc::clone(&options),
            Arc::clone(&cache),
            shard_events_tx,
        );
        let voice = VoiceConnectionManager::new();
        let (events, _) = broadcast::channel(EVENT_BUFFER);

        let client = Arc::new(Self {
            options,
            cache,
            rest,
            shards,
            voice,
            events,
            presence: Mutex::new(ClientPresence::default()),
        });
        client.spawn_router(shard_events_rx);
        Ok(client)
    }

    // ── Accessors ────────────────────────────────────────────

    /// The shared entity cache
    #[must_use]
    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// The REST request pipeline
    #[must_use]
    pub fn rest(&self) -> &RequestHandler {
        &self.rest
    }

    /// The shard manager
    #[must_use]
    pub fn shards(&self) -> &Arc<ShardManager> {
        &self.shards
    }

    /// The voice connection manager
    #[must_use]
    pub fn voice(&self) -> &Arc<VoiceConnectionManager> {
        &self.voice
    }

    /// Subscribe to the event stream
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Mean heartbeat latency across shards, in milliseconds
    #[must_use]
    pub fn latency_ms(&self) -> u64 {
        self.shards.mean_latency_ms()
    }

    // ── Lifecycle ────────────────────────────────────────────

    /// Resolve the gateway and enqueue this process's shard range
    ///
    /// Shards connect serially through the manager's queue under the
    /// session-start limit; readiness arrives as `ShardReady` events.
    pub async fn connect(&self) -> ClientResult<()> {
        let info = self.rest.get_gateway_bot().await?;
        let total = match self.options.max_shards {
            ShardCount::Auto => info.shards.max(1),
            ShardCount::Fixed(n) => n.max(1),
        };
        info!(
            total_shards = total,
            recommended = info.shards,
            remaining_identifies = info.session_start_limit.remaining,
            "Gateway resolved"
        );

        self.shards.set_gateway_url(info.url);
        self.shards.set_total_shards(total);
        self.shards.set_session_start_limit(
            info.session_start_limit.total,
            info.session_start_limit.remaining,
            info.session_start_limit.reset_after,
            info.session_start_limit.max_concurrency,
        );

        let first = self.options.first_shard_id.min(total - 1);
        let last = self.options.last_shard_id.unwrap_or(total - 1).min(total - 1);
        for id in first..=last {
            let shard = self.shards.spawn(id);
            self.shards.connect(&shard);
        }
        Ok(())
    }

    /// Disconnect every shard, clear the connect queue, and tear down
    /// voice sessions and pending joins.
    pub fn disconnect(&self) {
        self.shards.disconnect_all();
        self.voice.disconnect_all();
    }

    // ── Presence ─────────────────────────────────────────────

    /// Replace the bot's presence on every shard
    ///
    /// The presence is also re-sent with every future IDENTIFY. The
    /// local member object updates silently; listeners only observe
    /// presence changes echoed back by the platform.
    pub fn edit_status(&self, status: Status, activity: Option<Activity>) {
        let presence = ClientPresence {
            status,
            activity,
            since: None,
            afk: false,
        };
        *self.presence.lock().expect("presence poisoned") = presence.clone();
        for id in 0..self.shards.total_shards() {
            if let Some(shard) = self.shards.shard(id) {
                shard.update_presence(presence.clone());
            }
        }
    }

    // ── Voice ────────────────────────────────────────────────

    /// Join a voice channel
    ///
    /// Sends the voice-state update on the guild's shard and waits for
    /// the rendezvous with the resulting `VOICE_SERVER_UPDATE`.
    pub async fn join_voice_channel(
        &self,
        guild_id: Snowflake,
        channel_id: Snowflake,
        mut options: JoinOptions,
    ) -> ClientResult<Arc<VoiceSession>> {
        let shard = self
            .shards
            .shard_for_guild(guild_id)
            .ok_or(VoiceError::NoShard(guild_id))?;
        options.shard_id = Some(shard.id());

        shard.update_voice_state(
            guild_id,
            Some(channel_id),
            options.self_mute,
            options.self_deaf,
        );
        Ok(self.voice.join(guild_id, channel_id, options).await?)
    }

    /// Leave a guild's voice channel and destroy the session
    pub fn leave_voice_channel(&self, guild_id: Snowflake) {
        if let Some(shard) = self.shards.shard_for_guild(guild_id) {
            shard.update_voice_state(guild_id, None, false, false);
        }
        self.voice.leave(guild_id);
    }

    // ── Event routing ────────────────────────────────────────

    /// Forward shard events to subscribers and hook the voice bridge
    fn spawn_router(self: &Arc<Self>, mut shard_events: mpsc::UnboundedReceiver<Event>) {
        let client = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(event) = shard_events.recv().await {
                let Some(client) = client.upgrade() else {
                    return;
                };
                client.route_event(&event);
                // Fan out after routing so voice state is settled when
                // listeners observe the event.
                let _ = client.events.send(event);
            }
        });
    }

    fn route_event(self: &Arc<Self>, event: &Event) {
        match event {
            Event::VoiceServerUpdate {
                guild_id,
                endpoint,
                token,
                session_id,
                user_id,
                shard_id,
            } => {
                self.voice.voice_server_update(
                    VoiceServerInfo {
                        guild_id: *guild_id,
                        endpoint: endpoint.clone(),
                        token: token.clone(),
                        session_id: session_id.clone(),
                        user_id: *user_id,
                    },
                    *shard_id,
                );
            }

            Event::VoiceStateUpdate { state, .. } => {
                // The bot moved (or was moved) to another channel: keep
                // the live session pointed at it.
                let own = self
                    .cache
                    .current_user()
                    .is_some_and(|user| user.id == state.user_id);
                if !own {
                    return;
                }
                let Some(guild_id) = state.guild_id else { return };
                let Some(session) = self.voice.get(guild_id) else {
                    return;
                };
                match state.channel_id {
                    Some(channel_id) if session.channel_id() != Some(channel_id) => {
                        debug!(guild_id = %guild_id, channel_id = %channel_id, "Following own voice state");
                        session.switch_channel(channel_id);
                    }
                    None => {
                        self.voice.leave(guild_id);
                    }
                    _ => {}
                }
            }

            Event::ShardDisconnect { shard_id, .. } => {
                self.voice.reject_pending_for_shard(*shard_id);
            }

            Event::ShardReady { shard_id } => {
                if self.options.seed_voice_connections {
                    self.seed_voice_connections(*shard_id);
                }
            }

            _ => {}
        }
    }

    /// Re-establish the bot's voice sessions observed in initial voice
    /// states (the `seed_voice_connections` option).
    fn seed_voice_connections(self: &Arc<Self>, shard_id: u32) {
        let Some(user) = self.cache.current_user() else {
            return;
        };
        let total = self.shards.total_shards();

        for guild_id in self.cache.guild_ids() {
            if guild_id.shard_id(total) != shard_id {
                continue;
            }
            let Some(guild) = self.cache.guild(guild_id) else {
                continue;
            };
            let Some(state) = guild.voice_states.get(&user.id) else {
                continue;
            };
            let Some(channel_id) = state.channel_id else {
                continue;
            };

            info!(guild_id = %guild_id, channel_id = %channel_id, "Seeding voice connection");
            let client = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(e) = client
                    .join_voice_channel(guild_id, channel_id, JoinOptions::default())
                    .await
                {
                    warn!(guild_id = %guild_id, error = %e, "Voice seed failed");
                }
            });
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("shards", &self.shards.shard_count())
            .field("voice_sessions", &self.voice.session_count())
            .field("cache", &self.cache)
            .finish()
    }
}
