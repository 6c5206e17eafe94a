//! Gateway shard
//!
//! One shard drives one WebSocket session: handshake (identify/resume),
//! heartbeat with zombie detection, the payload codec, the dual-bucket
//! send path, the reconnect decision table, the readiness gate, and
//! dispatch demultiplexing. All mutable state lives behind the `Arc` so
//! the reader, writer, heartbeat, and timer tasks share one view.

mod members;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use helselia_common::{queue_joint, Bucket, ClientOptions};
use helselia_core::{CacheStore, Guild, Member, Snowflake, Token};

use crate::codec::{Encoding, Inflater};
use crate::error::GatewayError;
use crate::events::{demux, Event};
use crate::protocol::{
    redact_token, ClientPresence, CloseAction, GatewayFrame, HelloPayload, IdentifyPayload,
    IdentifyProperties, OpCode, ReadyPayload, ResumePayload, UpdateVoiceStatePayload,
};

use members::{batch_guild_ids, members_payload, MemberRequest, MembersChunk, PAYLOAD_CEILING};

/// Gateway sends allowed per shard per window
const GLOBAL_BUCKET_TOKENS: u32 = 120;
/// Gateway send window
const GLOBAL_BUCKET_INTERVAL: Duration = Duration::from_secs(60);
/// Tokens set aside for heartbeats and handshake frames
const GLOBAL_BUCKET_RESERVED: u32 = 5;
/// Presence updates allowed per window
const PRESENCE_BUCKET_TOKENS: u32 = 5;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardStatus {
    Disconnected,
    Connecting,
    Handshaking,
    Identifying,
    Resuming,
    Ready,
}

/// What one finished connection tells the reconnect loop
enum ConnectionOutcome {
    /// Caller asked for the disconnect
    Shutdown,
    /// Clean close (1000) with no retry requested
    Clean,
    /// Stop retrying and surface the error
    Fatal(GatewayError),
    /// Reconnect; `resume` says whether the session survived
    Retry {
        resume: bool,
        error: GatewayError,
    },
}

/// One decoded read off the socket
enum RawRead {
    Frame(GatewayFrame),
    Closed { code: u16, reason: String },
    Ended,
}

/// A single gateway session
pub struct Shard {
    id: u32,
    total_shards: u32,
    token: Token,
    options: Arc<ClientOptions>,
    cache: Arc<CacheStore>,
    gateway_url: RwLock<String>,

    status: RwLock<ShardStatus>,
    sequence: AtomicU64,
    session_id: RwLock<Option<String>>,
    resume_url: RwLock<Option<String>>,

    last_heartbeat_sent: Mutex<Option<Instant>>,
    last_heartbeat_received: Mutex<Option<Instant>>,
    last_heartbeat_ack: AtomicBool,
    latency_ms: Arc<AtomicU64>,

    connect_attempts: AtomicU32,
    resume_attempts: AtomicU32,
    reconnect_backoff_ms: AtomicU64,

    presence: RwLock<ClientPresence>,
    global_bucket: Arc<Bucket>,
    presence_bucket: Arc<Bucket>,

    pending_member_requests: DashMap<String, MemberRequest>,
    member_batch: Mutex<Vec<(Snowflake, oneshot::Sender<Vec<Member>>)>>,
    member_batch_scheduled: AtomicBool,

    guild_sync_queue: Mutex<Vec<Snowflake>>,
    unsynced_guilds: AtomicU32,
    get_all_users_queue: Mutex<Vec<Snowflake>>,

    unavailable_guilds: Mutex<HashSet<Snowflake>>,
    guild_gate_done: AtomicBool,
    gate_generation: AtomicU64,
    sync_started: AtomicBool,
    members_started: AtomicBool,
    ready_emitted: AtomicBool,

    server_trace: Mutex<Option<Vec<String>>>,

    events: mpsc::UnboundedSender<Event>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    shutdown: broadcast::Sender<()>,
    /// Latched disconnect request; the broadcast alone would be missed
    /// by tasks that subscribe after the send
    shutdown_requested: AtomicBool,
    running: AtomicBool,
    ready_signal: Notify,
}

impl Shard {
    /// Create a shard; does not connect
    #[must_use]
    pub fn new(
        id: u32,
        total_shards: u32,
        token: Token,
        gateway_url: String,
        options: Arc<ClientOptions>,
        cache: Arc<CacheStore>,
        events: mpsc::UnboundedSender<Event>,
    ) -> Arc<Self> {
        let latency_ms = Arc::new(AtomicU64::new(0));
        let global_bucket = Bucket::with_latency_ref(
            GLOBAL_BUCKET_TOKENS,
            GLOBAL_BUCKET_INTERVAL,
            GLOBAL_BUCKET_RESERVED,
            Arc::clone(&latency_ms),
        );
        let presence_bucket = Bucket::new(PRESENCE_BUCKET_TOKENS, GLOBAL_BUCKET_INTERVAL, 0);
        let (shutdown, _) = broadcast::channel(1);

        Arc::new(Self {
            id,
            total_shards,
            token,
            options,
            cache,
            gateway_url: RwLock::new(gateway_url),
            status: RwLock::new(ShardStatus::Disconnected),
            sequence: AtomicU64::new(0),
            session_id: RwLock::new(None),
            resume_url: RwLock::new(None),
            last_heartbeat_sent: Mutex::new(None),
            last_heartbeat_received: Mutex::new(None),
            last_heartbeat_ack: AtomicBool::new(true),
            latency_ms,
            connect_attempts: AtomicU32::new(0),
            resume_attempts: AtomicU32::new(0),
            reconnect_backoff_ms: AtomicU64::new(0),
            presence: RwLock::new(ClientPresence::default()),
            global_bucket,
            presence_bucket,
            pending_member_requests: DashMap::new(),
            member_batch: Mutex::new(Vec::new()),
            member_batch_scheduled: AtomicBool::new(false),
            guild_sync_queue: Mutex::new(Vec::new()),
            unsynced_guilds: AtomicU32::new(0),
            get_all_users_queue: Mutex::new(Vec::new()),
            unavailable_guilds: Mutex::new(HashSet::new()),
            guild_gate_done: AtomicBool::new(false),
            gate_generation: AtomicU64::new(0),
            sync_started: AtomicBool::new(false),
            members_started: AtomicBool::new(false),
            ready_emitted: AtomicBool::new(false),
            server_trace: Mutex::new(None),
            events,
            outbound: Mutex::new(None),
            shutdown,
            shutdown_requested: AtomicBool::new(false),
            running: AtomicBool::new(false),
            ready_signal: Notify::new(),
        })
    }

    // ── Public surface ───────────────────────────────────────

    /// Shard id
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Current lifecycle state
    #[must_use]
    pub fn status(&self) -> ShardStatus {
        *self.status.read().expect("status poisoned")
    }

    /// Heartbeat round-trip latency in milliseconds (0 until measured)
    #[must_use]
    pub fn latency_ms(&self) -> u64 {
        self.latency_ms.load(Ordering::Relaxed)
    }

    /// Last observed dispatch sequence (0 before the first dispatch)
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    /// Session id, if a READY has been observed this session
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().expect("session poisoned").clone()
    }

    /// Point the shard at a different gateway URL (used on restarts)
    pub fn set_gateway_url(&self, url: String) {
        *self.gateway_url.write().expect("url poisoned") = url;
    }

    /// Server trace from the last HELLO/READY, when the gateway sent one
    #[must_use]
    pub fn server_trace(&self) -> Option<Vec<String>> {
        self.server_trace.lock().expect("trace poisoned").clone()
    }

    /// Start the connection loop; idempotent while running
    pub fn connect(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::AcqRel) {
            debug!(shard_id = self.id, "Shard already running, ignoring connect");
            return;
        }
        self.shutdown_requested.store(false, Ordering::Release);
        let shard = Arc::clone(self);
        tokio::spawn(async move {
            shard.run().await;
        });
    }

    /// Stop the shard
    ///
    /// Outstanding member requests resolve with whatever has arrived;
    /// their timers are cancelled.
    pub fn disconnect(&self) {
        self.shutdown_requested.store(true, Ordering::Release);
        let _ = self.shutdown.send(());
        self.resolve_all_member_requests();
    }

    /// Wait until the shard signals pre-ready or resume
    ///
    /// The shard manager serializes its connect queue on this.
    pub async fn wait_ready_signal(&self) {
        self.ready_signal.notified().await;
    }

    /// Replace the presence and replicate it to the gateway
    pub fn update_presence(self: &Arc<Self>, presence: ClientPresence) {
        *self.presence.write().expect("presence poisoned") = presence.clone();
        if self.status() == ShardStatus::Disconnected {
            return;
        }
        let payload = match serde_json::to_value(&presence) {
            Ok(v) => v,
            Err(e) => {
                warn!(shard_id = self.id, error = %e, "Presence serialization failed");
                return;
            }
        };
        let shard = Arc::clone(self);
        let frame = GatewayFrame::new(OpCode::StatusUpdate, payload);
        queue_joint(
            &[
                Arc::clone(&self.global_bucket),
                Arc::clone(&self.presence_bucket),
            ],
            move || shard.write_frame(&frame),
            false,
        );
    }

    /// Send a voice-state update (join, move, or leave a voice channel)
    pub fn update_voice_state(
        self: &Arc<Self>,
        guild_id: Snowflake,
        channel_id: Option<Snowflake>,
        self_mute: bool,
        self_deaf: bool,
    ) {
        let payload = UpdateVoiceStatePayload {
            guild_id,
            channel_id,
            self_mute,
            self_deaf,
        };
        match serde_json::to_value(&payload) {
            Ok(v) => self.queue_frame(GatewayFrame::new(OpCode::VoiceStateUpdate, v), false),
            Err(e) => warn!(shard_id = self.id, error = %e, "Voice state serialization failed"),
        }
    }

    /// Request the member list of a guild
    ///
    /// Calls made in quick succession coalesce: sessions without intents
    /// batch several guild ids into one payload bounded by the size
    /// ceiling; sessions with intents request one guild per payload.
    /// The future resolves with whatever arrived if the request times
    /// out; it never fails.
    pub fn get_guild_members(
        self: &Arc<Self>,
        guild_id: Snowflake,
    ) -> oneshot::Receiver<Vec<Member>> {
        let (tx, rx) = oneshot::channel();
        self.member_batch
            .lock()
            .expect("member batch poisoned")
            .push((guild_id, tx));

        if !self.member_batch_scheduled.swap(true, Ordering::AcqRel) {
            let shard = Arc::clone(self);
            tokio::spawn(async move {
                // One scheduler turn of slack lets sibling calls join.
                tokio::task::yield_now().await;
                shard.flush_member_batch();
            });
        }
        rx
    }

    // ── Connection loop ──────────────────────────────────────

    async fn run(self: Arc<Self>) {
        loop {
            self.set_status(ShardStatus::Connecting);
            self.reset_connection_state();

            let mut outcome = self.connect_once().await;

            *self.outbound.lock().expect("outbound poisoned") = None;
            self.set_status(ShardStatus::Disconnected);

            if self.shutdown_requested.load(Ordering::Acquire) {
                outcome = ConnectionOutcome::Shutdown;
            }

            match outcome {
                ConnectionOutcome::Shutdown => {
                    info!(shard_id = self.id, "Shard disconnected on request");
                    self.emit(Event::ShardDisconnect {
                        shard_id: self.id,
                        error: None,
                    });
                    break;
                }
                ConnectionOutcome::Clean => {
                    info!(shard_id = self.id, "Connection closed cleanly");
                    self.emit(Event::ShardDisconnect {
                        shard_id: self.id,
                        error: None,
                    });
                    break;
                }
                ConnectionOutcome::Fatal(error) => {
                    self.clear_session();
                    self.emit(Event::ShardError {
                        shard_id: self.id,
                        message: error.to_string(),
                    });
                    self.emit(Event::ShardDisconnect {
                        shard_id: self.id,
                        error: Some(error.to_string()),
                    });
                    self.resolve_all_member_requests();
                    break;
                }
                ConnectionOutcome::Retry { resume, error } => {
                    self.emit(Event::ShardError {
                        shard_id: self.id,
                        message: error.to_string(),
                    });
                    self.emit(Event::ShardDisconnect {
                        shard_id: self.id,
                        error: Some(error.to_string()),
                    });

                    if !self.options.autoreconnect {
                        self.resolve_all_member_requests();
                        break;
                    }
                    if !self.backoff_or_stop(resume).await {
                        break;
                    }
                }
            }
        }
        self.running.store(false, Ordering::Release);
    }

    /// Sleep out the reconnect policy; `false` ends the loop
    async fn backoff_or_stop(&self, resume: bool) -> bool {
        let attempts = self.connect_attempts.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(max) = self.options.max_reconnect_attempts {
            if attempts > max {
                let error = GatewayError::ReconnectExhausted(max);
                self.emit(Event::ShardError {
                    shard_id: self.id,
                    message: error.to_string(),
                });
                return false;
            }
        }

        let resuming = resume && self.session_id().is_some();
        if resuming {
            let resumed = self.resume_attempts.fetch_add(1, Ordering::AcqRel) + 1;
            if resumed <= self.options.max_resume_attempts {
                // Resume attempts reconnect immediately.
                debug!(shard_id = self.id, attempt = resumed, "Resuming immediately");
                return !self.sleep_or_shutdown(Duration::ZERO).await;
            }
            warn!(
                shard_id = self.id,
                "Resume budget exhausted, invalidating session"
            );
            self.clear_session();
        }

        let last = self.reconnect_backoff_ms.load(Ordering::Acquire);
        let next = (self.options.reconnect_delay)(last, attempts - 1);
        self.reconnect_backoff_ms.store(next, Ordering::Release);
        info!(
            shard_id = self.id,
            delay_ms = next,
            attempt = attempts,
            "Reconnecting after backoff"
        );
        !self.sleep_or_shutdown(Duration::from_millis(next)).await
    }

    /// Sleep, returning `true` when interrupted by shutdown
    async fn sleep_or_shutdown(&self, duration: Duration) -> bool {
        if self.shutdown_requested.load(Ordering::Acquire) {
            return true;
        }
        let mut shutdown = self.shutdown.subscribe();
        tokio::select! {
            biased;
            _ = shutdown.recv() => true,
            () = tokio::time::sleep(duration) => false,
        }
    }

    /// One connection: open the socket, handshake, drive until it dies
    async fn connect_once(self: &Arc<Self>) -> ConnectionOutcome {
        let setup = tokio::time::timeout(
            Duration::from_millis(self.options.connection_timeout_ms),
            self.establish(),
        )
        .await;

        let (reader, writer, heartbeat, zombie_rx, inflater) = match setup {
            Ok(Ok(parts)) => parts,
            Ok(Err(e)) => {
                return self.retry_from_error(e);
            }
            Err(_) => {
                return self.retry_from_error(GatewayError::ConnectionTimeout);
            }
        };

        let outcome = self.drive(reader, zombie_rx, inflater).await;

        heartbeat.abort();
        // Drop the channel so the writer drains and closes the sink.
        *self.outbound.lock().expect("outbound poisoned") = None;
        let _ = tokio::time::timeout(Duration::from_secs(2), writer).await;

        outcome
    }

    /// Open the socket, wait for HELLO, start the heartbeat, authenticate
    async fn establish(
        self: &Arc<Self>,
    ) -> Result<
        (
            WsSource,
            JoinHandle<()>,
            JoinHandle<()>,
            oneshot::Receiver<()>,
            Option<Inflater>,
        ),
        GatewayError,
    > {
        let resuming = self.session_id().is_some();
        let url = self.connection_url(resuming);
        info!(shard_id = self.id, url = %url, "Connecting to gateway");

        let (ws, _response) = connect_async(&url).await?;
        self.set_status(ShardStatus::Handshaking);
        let (sink, mut reader) = ws.split();

        let (out_tx, out_rx) = mpsc::unbounded_channel::<Message>();
        *self.outbound.lock().expect("outbound poisoned") = Some(out_tx);
        let writer = spawn_writer(sink, out_rx);

        let mut inflater = self.options.compress.then(Inflater::new);

        let hello = self.wait_for_hello(&mut reader, &mut inflater).await?;
        debug!(
            shard_id = self.id,
            heartbeat_interval = hello.heartbeat_interval,
            "HELLO received"
        );
        if let Some(trace) = hello._trace {
            *self.server_trace.lock().expect("trace poisoned") = Some(trace);
        }

        let (zombie_tx, zombie_rx) = oneshot::channel();
        let heartbeat = self.spawn_heartbeat(hello.heartbeat_interval, zombie_tx);

        if resuming {
            self.set_status(ShardStatus::Resuming);
            self.send_resume();
        } else {
            self.set_status(ShardStatus::Identifying);
            self.send_identify();
        }

        Ok((reader, writer, heartbeat, zombie_rx, inflater))
    }

    /// Gateway URL with encoding/compression query parameters
    fn connection_url(&self, resuming: bool) -> String {
        let base = if resuming {
            self.resume_url
                .read()
                .expect("resume url poisoned")
                .clone()
                .filter(|u| u.starts_with("wss://"))
                .unwrap_or_else(|| self.gateway_url.read().expect("url poisoned").clone())
        } else {
            self.gateway_url.read().expect("url poisoned").clone()
        };

        let encoding = Encoding::select(self.options.binary_encoding);
        let mut url = format!("{base}?v=6&encoding={}", encoding.query_value());
        if self.options.compress {
            url.push_str("&compress=zlib-stream");
        }
        url
    }

    /// Read frames until HELLO arrives
    async fn wait_for_hello(
        &self,
        reader: &mut WsSource,
        inflater: &mut Option<Inflater>,
    ) -> Result<HelloPayload, GatewayError> {
        loop {
            match self.read_raw(reader, inflater).await? {
                RawRead::Frame(frame) if frame.op == OpCode::Hello => {
                    let data = frame
                        .d
                        .ok_or_else(|| GatewayError::Protocol("HELLO missing data".into()))?;
                    return Ok(serde_json::from_value(data)?);
                }
                RawRead::Frame(frame) => {
                    debug!(shard_id = self.id, op = %frame.op, "Frame before HELLO, ignoring");
                }
                RawRead::Closed { code, reason } => {
                    return Err(GatewayError::Closed { code, reason });
                }
                RawRead::Ended => {
                    return Err(GatewayError::Protocol(
                        "connection closed before HELLO".into(),
                    ));
                }
            }
        }
    }

    /// Event loop for one live connection
    async fn drive(
        self: &Arc<Self>,
        mut reader: WsSource,
        mut zombie_rx: oneshot::Receiver<()>,
        mut inflater: Option<Inflater>,
    ) -> ConnectionOutcome {
        let mut shutdown = self.shutdown.subscribe();
        loop {
            // Catch a disconnect that raced the handshake, before this
            // loop's subscriber existed.
            if self.shutdown_requested.load(Ordering::Acquire) {
                self.send_close(1000);
                return ConnectionOutcome::Shutdown;
            }
            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    self.send_close(1000);
                    return ConnectionOutcome::Shutdown;
                }

                _ = &mut zombie_rx => {
                    warn!(shard_id = self.id, "Heartbeat not acknowledged, closing zombie connection");
                    self.send_close(1000);
                    return ConnectionOutcome::Retry {
                        resume: true,
                        error: GatewayError::HeartbeatAckMissing,
                    };
                }

                raw = self.read_raw(&mut reader, &mut inflater) => match raw {
                    Ok(RawRead::Frame(frame)) => {
                        if let Some(outcome) = self.handle_frame(frame) {
                            return outcome;
                        }
                    }
                    Ok(RawRead::Closed { code, reason }) => {
                        return self.outcome_from_close(code, reason);
                    }
                    Ok(RawRead::Ended) => {
                        return self.retry_from_error(GatewayError::Closed {
                            code: 1006,
                            reason: "connection reset by peer".into(),
                        });
                    }
                    Err(e) => {
                        return self.retry_from_error(e);
                    }
                },
            }
        }
    }

    /// Decode one socket read; decoder failures on a single frame are
    /// dropped, inflater failures poison the connection.
    async fn read_raw(
        &self,
        reader: &mut WsSource,
        inflater: &mut Option<Inflater>,
    ) -> Result<RawRead, GatewayError> {
        loop {
            match reader.next().await {
                Some(Ok(Message::Text(text))) => match GatewayFrame::from_json(&text) {
                    Ok(frame) => return Ok(RawRead::Frame(frame)),
                    Err(e) => {
                        self.emit_decode_error(&e);
                    }
                },
                Some(Ok(Message::Binary(bytes))) => {
                    let decoded = match inflater {
                        Some(inflater) => match inflater.push(&bytes)? {
                            Some(out) => out,
                            None => continue,
                        },
                        None => bytes.to_vec(),
                    };
                    match GatewayFrame::from_bytes(&decoded) {
                        Ok(frame) => return Ok(RawRead::Frame(frame)),
                        Err(e) => {
                            self.emit_decode_error(&e);
                        }
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.to_string()))
                        .unwrap_or((1000, String::new()));
                    return Ok(RawRead::Closed { code, reason });
                }
                Some(Ok(_)) => {
                    trace!(shard_id = self.id, "Control frame");
                }
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(RawRead::Ended),
            }
        }
    }

    fn emit_decode_error(&self, error: &serde_json::Error) {
        warn!(shard_id = self.id, error = %error, "Dropping undecodable frame");
        self.emit(Event::ShardError {
            shard_id: self.id,
            message: GatewayError::Decoder(error.to_string()).to_string(),
        });
    }

    // ── Frame handling ───────────────────────────────────────

    /// Process one frame; `Some` breaks the connection with the outcome
    fn handle_frame(self: &Arc<Self>, frame: GatewayFrame) -> Option<ConnectionOutcome> {
        match frame.op {
            OpCode::Dispatch => {
                self.handle_dispatch(frame);
                None
            }
            OpCode::Heartbeat => {
                // Unsolicited server heartbeat wants an immediate reply.
                trace!(shard_id = self.id, "Server heartbeat, replying");
                self.send_heartbeat();
                None
            }
            OpCode::HeartbeatAck => {
                self.handle_heartbeat_ack();
                None
            }
            OpCode::InvalidSession => {
                self.handle_invalid_session();
                None
            }
            OpCode::Reconnect => {
                info!(shard_id = self.id, "Server requested reconnect");
                Some(ConnectionOutcome::Retry {
                    resume: self.session_id().is_some(),
                    error: GatewayError::Closed {
                        code: 0,
                        reason: "server requested reconnect".into(),
                    },
                })
            }
            OpCode::Hello => {
                debug!(shard_id = self.id, "Unexpected HELLO mid-session, ignoring");
                None
            }
            op => {
                debug!(shard_id = self.id, op = %op, "Unhandled opcode");
                None
            }
        }
    }

    fn handle_heartbeat_ack(&self) {
        self.last_heartbeat_ack.store(true, Ordering::Release);
        let now = Instant::now();
        *self
            .last_heartbeat_received
            .lock()
            .expect("heartbeat poisoned") = Some(now);
        if let Some(sent) = *self.last_heartbeat_sent.lock().expect("heartbeat poisoned") {
            let latency = now.saturating_duration_since(sent).as_millis() as u64;
            self.latency_ms.store(latency, Ordering::Relaxed);
            trace!(shard_id = self.id, latency_ms = latency, "Heartbeat acknowledged");
        }
    }

    fn handle_invalid_session(self: &Arc<Self>) {
        warn!(shard_id = self.id, "Session invalidated by gateway, re-identifying");
        self.sequence.store(0, Ordering::Release);
        self.clear_session();
        self.set_status(ShardStatus::Identifying);

        // Re-identify on this connection after a short random delay.
        let delay = Duration::from_millis(rand::thread_rng().gen_range(1_000..=5_000));
        let shard = Arc::clone(self);
        tokio::spawn(async move {
            if shard.sleep_or_shutdown(delay).await {
                return;
            }
            if shard.outbound.lock().expect("outbound poisoned").is_some() {
                shard.send_identify();
            }
        });
    }

    fn handle_dispatch(self: &Arc<Self>, frame: GatewayFrame) {
        if let Some(s) = frame.s {
            let previous = self.sequence.load(Ordering::Acquire);
            if previous != 0 && s > previous + 1 {
                warn!(
                    shard_id = self.id,
                    expected = previous + 1,
                    got = s,
                    "Non-consecutive sequence number"
                );
            }
            if s > previous {
                self.sequence.store(s, Ordering::Release);
            }
        }

        let Some(name) = frame.t else {
            warn!(shard_id = self.id, "Dispatch frame without event name");
            return;
        };
        if self.options.event_disabled(&name) {
            trace!(shard_id = self.id, event = %name, "Event disabled, dropping");
            return;
        }
        let data = frame.d.unwrap_or(Value::Null);

        match name.as_str() {
            "READY" => self.handle_ready(data),
            "RESUMED" => self.handle_resumed(),
            "GUILD_MEMBERS_CHUNK" => self.handle_members_chunk(data),
            "VOICE_SERVER_UPDATE" => self.handle_voice_server_update(data),
            "GUILD_SYNC" => {
                if let Some(event) = demux(&self.cache, "GUILD_SYNC", data) {
                    self.emit(event);
                    if self.unsynced_guilds.load(Ordering::Acquire) > 0 {
                        self.unsynced_guilds.fetch_sub(1, Ordering::AcqRel);
                    }
                    self.check_ready();
                }
            }
            "GUILD_CREATE" => {
                if let Some(event) = demux(&self.cache, "GUILD_CREATE", data) {
                    self.track_guild_arrival(&event);
                    self.emit(event);
                }
            }
            _ => {
                if let Some(event) = demux(&self.cache, &name, data) {
                    self.emit(event);
                }
            }
        }
    }

    fn handle_ready(self: &Arc<Self>, data: Value) {
        let ready: ReadyPayload = match serde_json::from_value(data) {
            Ok(r) => r,
            Err(e) => {
                warn!(shard_id = self.id, error = %e, "Malformed READY payload");
                return;
            }
        };

        info!(
            shard_id = self.id,
            session_id = %ready.session_id,
            guilds = ready.guilds.len(),
            "Session established"
        );

        *self.session_id.write().expect("session poisoned") = Some(ready.session_id);
        *self.resume_url.write().expect("resume url poisoned") = ready
            .resume_gateway_url
            .filter(|u| u.starts_with("wss://"));
        if let Some(trace) = ready._trace {
            *self.server_trace.lock().expect("trace poisoned") = Some(trace);
        }

        self.cache.set_current_user(ready.user.clone());
        self.cache.put_user(ready.user);

        self.connect_attempts.store(0, Ordering::Release);
        self.resume_attempts.store(0, Ordering::Release);
        self.reconnect_backoff_ms.store(0, Ordering::Release);

        // Catalog the initial guilds: unavailable stubs gate readiness.
        let mut unavailable = self.unavailable_guilds.lock().expect("gate poisoned");
        unavailable.clear();
        for value in ready.guilds {
            match serde_json::from_value::<Guild>(value) {
                Ok(guild) => {
                    if guild.unavailable {
                        unavailable.insert(guild.id);
                    } else {
                        self.queue_post_ready_work(guild.id);
                    }
                    self.cache.put_guild(guild);
                }
                Err(e) => {
                    debug!(shard_id = self.id, error = %e, "Skipping malformed READY guild");
                }
            }
        }
        let pending_guilds = unavailable.len();
        drop(unavailable);

        self.set_status(ShardStatus::Ready);
        self.ready_signal.notify_one();
        self.emit(Event::ShardPreReady { shard_id: self.id });

        if pending_guilds == 0 {
            self.finish_guild_gate();
        } else {
            self.arm_guild_gate_timer();
        }
    }

    fn handle_resumed(self: &Arc<Self>) {
        info!(shard_id = self.id, "Session resumed");
        self.set_status(ShardStatus::Ready);
        self.connect_attempts.store(0, Ordering::Release);
        self.resume_attempts.store(0, Ordering::Release);
        self.reconnect_backoff_ms.store(0, Ordering::Release);
        self.ready_signal.notify_one();
        self.emit(Event::ShardResumed { shard_id: self.id });
    }

    fn handle_members_chunk(self: &Arc<Self>, data: Value) {
        let chunk: MembersChunk = match serde_json::from_value(data) {
            Ok(c) => c,
            Err(e) => {
                debug!(shard_id = self.id, error = %e, "Malformed GUILD_MEMBERS_CHUNK");
                return;
            }
        };

        // Chunks double as an alive signal from the server.
        self.last_heartbeat_ack.store(true, Ordering::Release);

        // Members land in the guild cache regardless of the nonce.
        self.cache.with_guild_mut(chunk.guild_id, |g| {
            for member in &chunk.members {
                g.members.insert(member.id(), member.clone());
            }
        });

        self.emit(Event::GuildMembersChunk {
            guild_id: chunk.guild_id,
            members: chunk.members.clone(),
            chunk_index: chunk.chunk_index,
            chunk_count: chunk.chunk_count,
        });

        let Some(nonce) = chunk.nonce.clone() else {
            return;
        };
        if chunk.is_last() {
            if let Some((_, mut request)) = self.pending_member_requests.remove(&nonce) {
                request.absorb(chunk.guild_id, chunk.members, chunk.presences);
                request.resolve();
                self.check_ready();
            } else {
                debug!(shard_id = self.id, nonce = %nonce, "Chunk for unknown request");
            }
        } else if let Some(mut request) = self.pending_member_requests.get_mut(&nonce) {
            request.absorb(chunk.guild_id, chunk.members, chunk.presences);
        } else {
            debug!(shard_id = self.id, nonce = %nonce, "Chunk for unknown request");
        }
    }

    /// Forward a voice server update with provenance attached
    fn handle_voice_server_update(&self, data: Value) {
        let Some(guild_id) = data
            .get("guild_id")
            .and_then(|v| serde_json::from_value::<Snowflake>(v.clone()).ok())
        else {
            debug!(shard_id = self.id, "VOICE_SERVER_UPDATE without guild_id");
            return;
        };
        let Some(token) = data.get("token").and_then(Value::as_str) else {
            debug!(shard_id = self.id, "VOICE_SERVER_UPDATE without token");
            return;
        };
        let endpoint = data
            .get("endpoint")
            .and_then(Value::as_str)
            .map(String::from);

        // The bot's own voice session id rides along from the cache.
        let user_id = self.cache.current_user().map(|u| u.id);
        let session_id = user_id.and_then(|uid| {
            self.cache
                .guild(guild_id)
                .and_then(|g| g.voice_states.get(&uid).map(|vs| vs.session_id.clone()))
        });

        self.emit(Event::VoiceServerUpdate {
            guild_id,
            endpoint,
            token: token.to_string(),
            session_id,
            user_id,
            shard_id: self.id,
        });
    }

    // ── Readiness gate ───────────────────────────────────────

    fn track_guild_arrival(self: &Arc<Self>, event: &Event) {
        if self.guild_gate_done.load(Ordering::Acquire) {
            // Past the gate, new guilds are handled on the spot.
            if let Event::GuildCreate { guild } | Event::GuildAvailable { guild } = event {
                if self.options.get_all_users {
                    drop(self.get_guild_members(guild.id));
                }
                if !self.token.is_bot() {
                    if let Ok(value) = serde_json::to_value(vec![guild.id]) {
                        self.queue_frame(GatewayFrame::new(OpCode::SyncGuild, value), false);
                    }
                }
            }
            return;
        }

        let guild_id = match event {
            Event::GuildCreate { guild } | Event::GuildAvailable { guild } => guild.id,
            Event::GuildUnavailable { guild_id } => {
                self.unavailable_guilds
                    .lock()
                    .expect("gate poisoned")
                    .insert(*guild_id);
                return;
            }
            _ => return,
        };

        self.queue_post_ready_work(guild_id);
        let remaining = {
            let mut unavailable = self.unavailable_guilds.lock().expect("gate poisoned");
            unavailable.remove(&guild_id);
            unavailable.len()
        };
        if remaining == 0 {
            self.finish_guild_gate();
        } else {
            self.arm_guild_gate_timer();
        }
    }

    fn queue_post_ready_work(&self, guild_id: Snowflake) {
        if !self.token.is_bot() {
            self.guild_sync_queue
                .lock()
                .expect("sync queue poisoned")
                .push(guild_id);
        }
        if self.options.get_all_users {
            self.get_all_users_queue
                .lock()
                .expect("users queue poisoned")
                .push(guild_id);
        }
    }

    /// Restart the quiet-period timer; the generation counter swallows
    /// wakeups from superseded timers.
    fn arm_guild_gate_timer(self: &Arc<Self>) {
        let generation = self.gate_generation.fetch_add(1, Ordering::AcqRel) + 1;
        let timeout = Duration::from_millis(self.options.guild_create_timeout_ms);
        let shard = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if shard.gate_generation.load(Ordering::Acquire) != generation
                || shard.guild_gate_done.load(Ordering::Acquire)
            {
                return;
            }
            let missing = shard
                .unavailable_guilds
                .lock()
                .expect("gate poisoned")
                .len();
            if missing > 0 {
                warn!(
                    shard_id = shard.id,
                    missing = missing,
                    "Guilds still unavailable after timeout, proceeding"
                );
            }
            shard.finish_guild_gate();
        });
    }

    fn finish_guild_gate(self: &Arc<Self>) {
        if self.guild_gate_done.swap(true, Ordering::AcqRel) {
            return;
        }
        self.gate_generation.fetch_add(1, Ordering::AcqRel);
        self.check_ready();
    }

    /// Advance the post-ready phases and emit `ready` when drained
    fn check_ready(self: &Arc<Self>) {
        if self.ready_emitted.load(Ordering::Acquire)
            || !self.guild_gate_done.load(Ordering::Acquire)
        {
            return;
        }

        // Phase 1: guild sync for user-account sessions.
        if !self.token.is_bot() {
            if !self.sync_started.swap(true, Ordering::AcqRel) {
                self.drain_guild_sync();
            }
            if self.unsynced_guilds.load(Ordering::Acquire) > 0 {
                return;
            }
        }

        // Phase 2: member requests for getAllUsers.
        if self.options.get_all_users && !self.members_started.swap(true, Ordering::AcqRel) {
            self.drain_get_all_users();
        }
        if !self.pending_member_requests.is_empty() {
            return;
        }

        if self.ready_emitted.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(shard_id = self.id, "Shard ready");
        self.emit(Event::ShardReady { shard_id: self.id });
    }

    fn drain_guild_sync(self: &Arc<Self>) {
        let ids = std::mem::take(
            &mut *self.guild_sync_queue.lock().expect("sync queue poisoned"),
        );
        if ids.is_empty() {
            return;
        }
        self.unsynced_guilds
            .store(ids.len() as u32, Ordering::Release);

        // `{"op":12,"d":[ ... ]}` around the id array.
        for batch in batch_guild_ids(&ids, 16) {
            match serde_json::to_value(&batch) {
                Ok(value) => self.queue_frame(GatewayFrame::new(OpCode::SyncGuild, value), false),
                Err(e) => warn!(shard_id = self.id, error = %e, "Guild sync serialization failed"),
            }
        }
    }

    fn drain_get_all_users(self: &Arc<Self>) {
        let ids = std::mem::take(
            &mut *self.get_all_users_queue.lock().expect("users queue poisoned"),
        );
        if ids.is_empty() {
            return;
        }

        if self.using_intents() {
            if !self
                .options
                .intents
                .contains(helselia_core::Intents::GUILD_MEMBERS)
            {
                warn!(
                    shard_id = self.id,
                    "getAllUsers requires the GUILD_MEMBERS intent, skipping"
                );
                return;
            }
            // Intents: one guild per request.
            for id in ids {
                self.start_member_request(vec![(id, None)]);
            }
        } else {
            for batch in batch_guild_ids(&ids, 96) {
                let waiters = batch.into_iter().map(|id| (id, None)).collect();
                self.start_member_request(waiters);
            }
        }
    }

    /// Whether this session identifies with an intents bitmask
    fn using_intents(&self) -> bool {
        self.token.is_bot()
    }

    // ── Member request plumbing ──────────────────────────────

    /// Flush the coalesced `get_guild_members` calls into payloads
    fn flush_member_batch(self: &Arc<Self>) {
        self.member_batch_scheduled.store(false, Ordering::Release);
        let entries = std::mem::take(
            &mut *self.member_batch.lock().expect("member batch poisoned"),
        );
        if entries.is_empty() {
            return;
        }

        if self.using_intents() {
            // One guild per payload; calls for the same guild share it.
            let mut by_guild: Vec<(Snowflake, Vec<oneshot::Sender<Vec<Member>>>)> = Vec::new();
            for (guild_id, tx) in entries {
                match by_guild.iter_mut().find(|(g, _)| *g == guild_id) {
                    Some((_, txs)) => txs.push(tx),
                    None => by_guild.push((guild_id, vec![tx])),
                }
            }
            for (guild_id, txs) in by_guild {
                let waiters = txs.into_iter().map(|tx| (guild_id, Some(tx))).collect();
                self.start_member_request(waiters);
            }
        } else {
            // Pack every requested guild into as few payloads as fit.
            let ids: Vec<Snowflake> = entries.iter().map(|(g, _)| *g).collect();
            let mut remaining = entries;
            for batch in batch_guild_ids(&ids, 96) {
                let batch_set: HashSet<Snowflake> = batch.iter().copied().collect();
                let mut waiters = Vec::new();
                let mut rest = Vec::new();
                for (guild_id, tx) in remaining {
                    if batch_set.contains(&guild_id) {
                        waiters.push((guild_id, Some(tx)));
                    } else {
                        rest.push((guild_id, tx));
                    }
                }
                remaining = rest;
                self.start_member_request(waiters);
            }
        }
    }

    /// Register a pending request and send its payload
    ///
    /// Waiters with `None` senders only hold the ready gate open.
    fn start_member_request(
        self: &Arc<Self>,
        waiters: Vec<(Snowflake, Option<oneshot::Sender<Vec<Member>>>)>,
    ) {
        let nonce = uuid::Uuid::new_v4().to_string();
        let ids: Vec<Snowflake> = {
            let mut seen = Vec::new();
            for (guild_id, _) in &waiters {
                if !seen.contains(guild_id) {
                    seen.push(*guild_id);
                }
            }
            seen
        };

        let channel_waiters = waiters
            .into_iter()
            .filter_map(|(g, tx)| tx.map(|tx| (g, tx)))
            .collect();
        let mut request = MemberRequest::new(channel_waiters);

        let timeout = Duration::from_millis(self.options.request_timeout_ms);
        let shard = Arc::clone(self);
        let timeout_nonce = nonce.clone();
        request.timeout = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some((_, mut request)) = shard.pending_member_requests.remove(&timeout_nonce) {
                debug!(
                    shard_id = shard.id,
                    nonce = %timeout_nonce,
                    "Member request timed out, resolving with partial result"
                );
                request.resolve();
                shard.check_ready();
            }
        }));

        self.pending_member_requests.insert(nonce.clone(), request);

        let payload = members_payload(&ids, &nonce);
        match serde_json::to_value(&payload) {
            Ok(value) => {
                debug_assert!(
                    value.to_string().len() <= PAYLOAD_CEILING,
                    "member request payload over ceiling"
                );
                self.queue_frame(GatewayFrame::new(OpCode::RequestGuildMembers, value), false);
            }
            Err(e) => {
                warn!(shard_id = self.id, error = %e, "Member request serialization failed");
                if let Some((_, mut request)) = self.pending_member_requests.remove(&nonce) {
                    request.resolve();
                }
            }
        }
    }

    /// Resolve every in-flight member request with its partial result
    fn resolve_all_member_requests(&self) {
        let nonces: Vec<String> = self
            .pending_member_requests
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for nonce in nonces {
            if let Some((_, mut request)) = self.pending_member_requests.remove(&nonce) {
                request.resolve();
            }
        }
    }

    // ── Sending ──────────────────────────────────────────────

    fn send_identify(self: &Arc<Self>) {
        let identify = IdentifyPayload {
            token: self.token.expose().to_string(),
            properties: IdentifyProperties::default(),
            compress: self.options.compress,
            large_threshold: self.options.large_threshold,
            shard: [self.id, self.total_shards],
            intents: self.using_intents().then_some(self.options.intents),
            guild_subscriptions: (!self.using_intents())
                .then_some(self.options.guild_subscriptions),
            presence: {
                let presence = self.presence.read().expect("presence poisoned");
                (presence.activity.is_some()
                    || presence.status != helselia_core::Status::Offline)
                    .then(|| presence.clone())
            },
        };
        match serde_json::to_value(&identify) {
            Ok(value) => {
                self.queue_frame(GatewayFrame::new(OpCode::Identify, value), true);
                // The gateway expects a heartbeat right after Identify.
                self.send_heartbeat();
            }
            Err(e) => warn!(shard_id = self.id, error = %e, "Identify serialization failed"),
        }
    }

    fn send_resume(self: &Arc<Self>) {
        let Some(session_id) = self.session_id() else {
            warn!(shard_id = self.id, "Resume without session, identifying instead");
            self.set_status(ShardStatus::Identifying);
            self.send_identify();
            return;
        };
        let resume = ResumePayload {
            token: self.token.expose().to_string(),
            session_id,
            seq: self.sequence.load(Ordering::Acquire),
        };
        match serde_json::to_value(&resume) {
            Ok(value) => self.queue_frame(GatewayFrame::new(OpCode::Resume, value), true),
            Err(e) => warn!(shard_id = self.id, error = %e, "Resume serialization failed"),
        }
    }

    /// Queue a heartbeat through the reserved priority lane
    fn send_heartbeat(self: &Arc<Self>) {
        let shard = Arc::clone(self);
        self.global_bucket.queue(
            move || {
                let sequence = shard.sequence.load(Ordering::Acquire);
                let frame = GatewayFrame::heartbeat((sequence > 0).then_some(sequence));
                *shard
                    .last_heartbeat_sent
                    .lock()
                    .expect("heartbeat poisoned") = Some(Instant::now());
                shard.last_heartbeat_ack.store(false, Ordering::Release);
                shard.write_frame(&frame);
            },
            true,
        );
    }

    /// Queue a frame through the per-shard global bucket
    fn queue_frame(self: &Arc<Self>, frame: GatewayFrame, priority: bool) {
        let shard = Arc::clone(self);
        self.global_bucket
            .queue(move || shard.write_frame(&frame), priority);
    }

    /// Serialize and hand a frame to the writer task
    fn write_frame(&self, frame: &GatewayFrame) {
        if tracing::enabled!(tracing::Level::DEBUG) {
            let shown = frame.d.as_ref().map(redact_token);
            debug!(shard_id = self.id, op = %frame.op, payload = ?shown, "Sending frame");
        }
        let json = match frame.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!(shard_id = self.id, error = %e, "Frame serialization failed");
                return;
            }
        };
        let outbound = self.outbound.lock().expect("outbound poisoned");
        if let Some(tx) = outbound.as_ref() {
            if tx.send(Message::Text(json.into())).is_err() {
                debug!(shard_id = self.id, "Writer gone, frame dropped");
            }
        } else {
            debug!(shard_id = self.id, "No connection, frame dropped");
        }
    }

    /// Push a close frame directly, bypassing the buckets
    fn send_close(&self, code: u16) {
        let outbound = self.outbound.lock().expect("outbound poisoned");
        if let Some(tx) = outbound.as_ref() {
            let frame = CloseFrame {
                code: code.into(),
                reason: "".into(),
            };
            let _ = tx.send(Message::Close(Some(frame)));
        }
    }

    // ── Heartbeat task ───────────────────────────────────────

    /// Periodic heartbeat with zombie detection
    ///
    /// Heartbeats are suppressed while resuming; the first beat fires one
    /// full interval after HELLO (Identify sends its own immediately).
    fn spawn_heartbeat(
        self: &Arc<Self>,
        interval_ms: u64,
        zombie_tx: oneshot::Sender<()>,
    ) -> JoinHandle<()> {
        let shard = Arc::clone(self);
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            let period = Duration::from_millis(interval_ms.max(1));
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.recv() => return,
                    _ = ticker.tick() => {}
                }

                if shard.status() == ShardStatus::Resuming {
                    continue;
                }
                if !shard.last_heartbeat_ack.load(Ordering::Acquire) {
                    let _ = zombie_tx.send(());
                    return;
                }
                shard.send_heartbeat();
            }
        })
    }

    // ── Close handling ───────────────────────────────────────

    fn outcome_from_close(&self, code: u16, reason: String) -> ConnectionOutcome {
        warn!(shard_id = self.id, code = code, reason = %reason, "Connection closed");
        match CloseAction::from_code(code) {
            CloseAction::Clean => ConnectionOutcome::Clean,
            CloseAction::Fatal => {
                self.clear_session();
                ConnectionOutcome::Fatal(match code {
                    4004 => GatewayError::AuthenticationFailed,
                    4013 => GatewayError::InvalidIntents,
                    4014 => GatewayError::DisallowedIntents,
                    4010 | 4011 => GatewayError::InvalidShard(code),
                    _ => GatewayError::Closed { code, reason },
                })
            }
            CloseAction::Reconnect {
                clear_session,
                reset_sequence,
            } => {
                if clear_session {
                    self.clear_session();
                }
                if reset_sequence {
                    self.sequence.store(0, Ordering::Release);
                }
                ConnectionOutcome::Retry {
                    resume: !clear_session && self.session_id().is_some(),
                    error: GatewayError::Closed { code, reason },
                }
            }
        }
    }

    /// Map a transport/decoder error onto the retry path
    fn retry_from_error(&self, error: GatewayError) -> ConnectionOutcome {
        if error.is_fatal() {
            return ConnectionOutcome::Fatal(error);
        }
        if let GatewayError::Closed { code, reason } = &error {
            if *code >= 4000 {
                return self.outcome_from_close(*code, reason.clone());
            }
        }
        ConnectionOutcome::Retry {
            resume: self.session_id().is_some(),
            error,
        }
    }

    // ── State helpers ────────────────────────────────────────

    fn set_status(&self, status: ShardStatus) {
        *self.status.write().expect("status poisoned") = status;
    }

    fn clear_session(&self) {
        *self.session_id.write().expect("session poisoned") = None;
        *self.resume_url.write().expect("resume url poisoned") = None;
    }

    /// Per-connection soft reset; session and sequence survive
    fn reset_connection_state(&self) {
        self.last_heartbeat_ack.store(true, Ordering::Release);
        *self.last_heartbeat_sent.lock().expect("heartbeat poisoned") = None;
        *self
            .last_heartbeat_received
            .lock()
            .expect("heartbeat poisoned") = None;
        self.guild_gate_done.store(false, Ordering::Release);
        self.sync_started.store(false, Ordering::Release);
        self.members_started.store(false, Ordering::Release);
        self.ready_emitted.store(false, Ordering::Release);
        self.unsynced_guilds.store(0, Ordering::Release);
        self.gate_generation.fetch_add(1, Ordering::AcqRel);
        self.unavailable_guilds
            .lock()
            .expect("gate poisoned")
            .clear();
    }

    fn emit(&self, event: Event) {
        if self.events.send(event).is_err() {
            trace!(shard_id = self.id, "No event listener");
        }
    }
}

impl std::fmt::Debug for Shard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shard")
            .field("id", &self.id)
            .field("status", &self.status())
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .field("latency_ms", &self.latency_ms())
            .finish()
    }
}

/// Writer task: drains the outbound channel into the socket
fn spawn_writer(mut sink: WsSink, mut rx: mpsc::UnboundedReceiver<Message>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    })
}
