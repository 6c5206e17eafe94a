//! Voice session surface
//!
//! The contract the rest of the client relies on: a session holds the
//! negotiated endpoint/token/session-id triple, knows which channel it is
//! in, and emits `ready | disconnect | error`. The audio transport behind
//! `connect` is out of scope here; implementations hook the same surface.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use tokio::sync::broadcast;
use tracing::{debug, info};

use helselia_core::Snowflake;

/// Lifecycle signals a session emits
#[derive(Debug, Clone)]
pub enum VoiceSessionEvent {
    /// The session negotiated its transport and is usable
    Ready,
    /// The session dropped; `None` means a requested disconnect
    Disconnect(Option<String>),
    /// The session failed
    Error(String),
}

/// Connection parameters delivered by `VOICE_SERVER_UPDATE`
#[derive(Debug, Clone)]
pub struct VoiceConnectInfo {
    pub channel_id: Option<Snowflake>,
    pub endpoint: Option<String>,
    pub token: String,
    pub session_id: Option<String>,
    pub user_id: Option<Snowflake>,
}

/// One guild's voice session
pub struct VoiceSession {
    guild_id: Snowflake,
    channel_id: RwLock<Option<Snowflake>>,
    endpoint: RwLock<Option<String>>,
    token: RwLock<Option<String>>,
    session_id: RwLock<Option<String>>,
    ready: AtomicBool,
    /// Negotiate Opus passthrough only (no PCM pipeline)
    pub opus_only: bool,
    /// Session may be shared by several call sites
    pub shared: bool,
    events: broadcast::Sender<VoiceSessionEvent>,
}

impl VoiceSession {
    /// Create a session shell; it is not ready until `connect`
    #[must_use]
    pub fn new(guild_id: Snowflake, opus_only: bool, shared: bool) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            guild_id,
            channel_id: RwLock::new(None),
            endpoint: RwLock::new(None),
            token: RwLock::new(None),
            session_id: RwLock::new(None),
            ready: AtomicBool::new(false),
            opus_only,
            shared,
            events,
        }
    }

    /// Guild this session belongs to
    #[must_use]
    pub fn guild_id(&self) -> Snowflake {
        self.guild_id
    }

    /// Channel the session is in, if any
    #[must_use]
    pub fn channel_id(&self) -> Option<Snowflake> {
        *self.channel_id.read().expect("channel poisoned")
    }

    /// Negotiated voice endpoint, once connected
    #[must_use]
    pub fn endpoint(&self) -> Option<String> {
        self.endpoint.read().expect("endpoint poisoned").clone()
    }

    /// Voice session id delivered by the gateway, once connected
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().expect("session poisoned").clone()
    }

    /// Token for the transport negotiation, once connected
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.token.read().expect("token poisoned").clone()
    }

    /// Whether the transport negotiation has completed
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Listen for lifecycle events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<VoiceSessionEvent> {
        self.events.subscribe()
    }

    /// Apply fresh connection parameters and bring the session up
    ///
    /// Called on the first `VOICE_SERVER_UPDATE` and again on every
    /// region change / reconnect; each call re-emits `ready` once the
    /// parameters are in place.
    pub fn connect(&self, info: VoiceConnectInfo) {
        {
            *self.channel_id.write().expect("channel poisoned") = info.channel_id;
            *self.endpoint.write().expect("endpoint poisoned") = info.endpoint;
            *self.token.write().expect("token poisoned") = Some(info.token);
            *self.session_id.write().expect("session poisoned") = info.session_id;
        }
        info!(guild_id = %self.guild_id, "Voice session connected");
        self.ready.store(true, Ordering::Release);
        let _ = self.events.send(VoiceSessionEvent::Ready);
    }

    /// Move the session to another channel without renegotiating
    pub fn switch_channel(&self, channel_id: Snowflake) {
        debug!(guild_id = %self.guild_id, channel_id = %channel_id, "Voice channel switch");
        *self.channel_id.write().expect("channel poisoned") = Some(channel_id);
    }

    /// Tear the session down
    pub fn disconnect(&self, reason: Option<String>) {
        self.ready.store(false, Ordering::Release);
        *self.channel_id.write().expect("channel poisoned") = None;
        let _ = self.events.send(VoiceSessionEvent::Disconnect(reason));
    }

    /// Surface a transport failure
    pub fn fail(&self, message: impl Into<String>) {
        self.ready.store(false, Ordering::Release);
        let _ = self.events.send(VoiceSessionEvent::Error(message.into()));
    }
}

impl std::fmt::Debug for VoiceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceSession")
            .field("guild_id", &self.guild_id)
            .field("channel_id", &self.channel_id())
            .field("ready", &self.is_ready())
            .finish()
    }
}
