//! Gateway errors
//!
//! Variants map onto the behavioral families: transport, protocol,
//! authentication-fatal, configuration-fatal, rate-limited, decoder,
//! and timeout.

/// Errors produced by a shard or the shard manager
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// WebSocket transport failure
    #[error("WebSocket error: {0}")]
    Transport(Box<tokio_tungstenite::tungstenite::Error>),

    /// JSON encode/decode failure on a payload
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Decompression or frame decode failure
    #[error("Decoder error: {0}")]
    Decoder(String),

    /// The socket closed with a gateway close code
    #[error("Connection closed with code {code}: {reason}")]
    Closed { code: u16, reason: String },

    /// Token rejected (close code 4004)
    #[error("Authentication failed: the token is invalid (close code 4004)")]
    AuthenticationFailed,

    /// Privileged intents requested but not enabled (close code 4014)
    #[error("Disallowed intents: enable the privileged intents for this bot (close code 4014)")]
    DisallowedIntents,

    /// Intent bitmask rejected (close code 4013)
    #[error("Invalid intents bitmask (close code 4013)")]
    InvalidIntents,

    /// Shard configuration rejected (close codes 4010/4011)
    #[error("Invalid shard configuration (close code {0})")]
    InvalidShard(u16),

    /// Heartbeat ACK missing when the next heartbeat fired
    #[error("server didn't acknowledge previous heartbeat, connection is zombied")]
    HeartbeatAckMissing,

    /// Socket open or HELLO did not arrive within the deadline
    #[error("Connection timed out waiting for the gateway handshake")]
    ConnectionTimeout,

    /// The gateway broke protocol expectations
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Reconnect budget exhausted
    #[error("Maximum reconnect attempts ({0}) exceeded")]
    ReconnectExhausted(u32),
}

impl GatewayError {
    /// Fatal errors terminate the reconnect loop entirely
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed
                | Self::DisallowedIntents
                | Self::InvalidIntents
                | Self::InvalidShard(_)
                | Self::ReconnectExhausted(_)
        )
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for GatewayError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(GatewayError::AuthenticationFailed.is_fatal());
        assert!(GatewayError::DisallowedIntents.is_fatal());
        assert!(GatewayError::InvalidShard(4010).is_fatal());
        assert!(!GatewayError::HeartbeatAckMissing.is_fatal());
        assert!(!GatewayError::ConnectionTimeout.is_fatal());
    }

    #[test]
    fn test_zombie_message_references_ack() {
        let message = GatewayError::HeartbeatAckMissing.to_string();
        assert!(message.contains("acknowledge previous heartbeat"));
    }
}
