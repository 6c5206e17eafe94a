//! Voice errors

/// Errors produced by the voice connection manager
#[derive(Debug, Clone, thiserror::Error)]
pub enum VoiceError {
    /// No `VOICE_SERVER_UPDATE` arrived before the join deadline
    #[error("voice connection timeout")]
    Timeout,

    /// The session (or its owning shard) disconnected before ready
    #[error("voice session disconnected{}", reason_suffix(.0))]
    Disconnected(Option<String>),

    /// The session surfaced an error before ready
    #[error("voice session error: {0}")]
    Session(String),

    /// No gateway shard is available to carry the voice-state update
    #[error("no connected shard for guild {0}")]
    NoShard(helselia_core::Snowflake),
}

fn reason_suffix(reason: &Option<String>) -> String {
    match reason {
        Some(reason) => format!(": {reason}"),
        None => String::new(),
    }
}
