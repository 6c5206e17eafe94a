//! WebSocket close codes and the reconnect decision table
//!
//! Every unclean close maps to exactly one action: retry (optionally
//! dropping session state) or surface a fatal error and stop.

use serde::{Deserialize, Serialize};

/// Gateway close codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum CloseCode {
    /// Invalid opcode sent
    UnknownOpcode = 4001,
    /// Invalid payload sent
    DecodeError = 4002,
    /// Sent a payload before Identify
    NotAuthenticated = 4003,
    /// Invalid token
    AuthenticationFailed = 4004,
    /// Sent Identify twice
    AlreadyAuthenticated = 4005,
    /// Session no longer valid
    InvalidSession = 4006,
    /// Invalid sequence on Resume
    InvalidSequence = 4007,
    /// Payloads sent too quickly
    RateLimited = 4008,
    /// Session timed out
    SessionTimeout = 4009,
    /// Invalid shard sent in Identify
    InvalidShard = 4010,
    /// Too many guilds for a single shard
    ShardingRequired = 4011,
    /// Invalid intents bitmask
    InvalidIntents = 4013,
    /// Privileged intents not enabled
    DisallowedIntents = 4014,
}

impl CloseCode {
    /// Create a `CloseCode` from a raw u16 value
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            4001 => Some(Self::UnknownOpcode),
            4002 => Some(Self::DecodeError),
            4003 => Some(Self::NotAuthenticated),
            4004 => Some(Self::AuthenticationFailed),
            4005 => Some(Self::AlreadyAuthenticated),
            4006 => Some(Self::InvalidSession),
            4007 => Some(Self::InvalidSequence),
            4008 => Some(Self::RateLimited),
            4009 => Some(Self::SessionTimeout),
            4010 => Some(Self::InvalidShard),
            4011 => Some(Self::ShardingRequired),
            4013 => Some(Self::InvalidIntents),
            4014 => Some(Self::DisallowedIntents),
            _ => None,
        }
    }

    /// Get the raw u16 value
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Get the description for this close code
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::UnknownOpcode => "Invalid opcode sent",
            Self::DecodeError => "Invalid payload sent",
            Self::NotAuthenticated => "Not authenticated",
            Self::AuthenticationFailed => "Authentication failed",
            Self::AlreadyAuthenticated => "Already authenticated",
            Self::InvalidSession => "Session is no longer valid",
            Self::InvalidSequence => "Invalid sequence number",
            Self::RateLimited => "Rate limited",
            Self::SessionTimeout => "Session timed out",
            Self::InvalidShard => "Invalid shard configuration",
            Self::ShardingRequired => "Sharding required",
            Self::InvalidIntents => "Invalid intents",
            Self::DisallowedIntents => "Disallowed intents",
        }
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_u16())
    }
}

/// What a shard does after observing a close code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    /// No error; reconnect only if the caller asked for it
    Clean,
    /// Surface an error and reconnect automatically
    Reconnect {
        /// Drop `session_id` so the next handshake identifies
        clear_session: bool,
        /// Zero the sequence counter
        reset_sequence: bool,
    },
    /// Surface a fatal error, drop the session, and stop
    Fatal,
}

impl CloseAction {
    /// The reconnect decision table
    #[must_use]
    pub fn from_code(code: u16) -> Self {
        match CloseCode::from_u16(code) {
            // Retry with the session intact.
            Some(CloseCode::UnknownOpcode)
            | Some(CloseCode::DecodeError)
            | Some(CloseCode::AlreadyAuthenticated)
            | Some(CloseCode::RateLimited) => CloseAction::Reconnect {
                clear_session: false,
                reset_sequence: false,
            },
            // Session unusable: identify fresh.
            Some(CloseCode::NotAuthenticated)
            | Some(CloseCode::InvalidSession)
            | Some(CloseCode::SessionTimeout) => CloseAction::Reconnect {
                clear_session: true,
                reset_sequence: false,
            },
            // Sequence desynced: resume impossible, keep the session off.
            Some(CloseCode::InvalidSequence) => CloseAction::Reconnect {
                clear_session: false,
                reset_sequence: true,
            },
            // Fatal: bad credentials or configuration.
            Some(CloseCode::AuthenticationFailed)
            | Some(CloseCode::InvalidShard)
            | Some(CloseCode::ShardingRequired)
            | Some(CloseCode::InvalidIntents)
            | Some(CloseCode::DisallowedIntents) => CloseAction::Fatal,
            None => match code {
                1000 => CloseAction::Clean,
                // 1006 and anything unrecognized: peer went away.
                _ => CloseAction::Reconnect {
                    clear_session: false,
                    reset_sequence: false,
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_code_roundtrip() {
        assert_eq!(CloseCode::from_u16(4004), Some(CloseCode::AuthenticationFailed));
        assert_eq!(CloseCode::from_u16(4014), Some(CloseCode::DisallowedIntents));
        assert_eq!(CloseCode::from_u16(4012), None);
        assert_eq!(CloseCode::AuthenticationFailed.as_u16(), 4004);
    }

    #[test]
    fn test_clean_close() {
        assert_eq!(CloseAction::from_code(1000), CloseAction::Clean);
    }

    #[test]
    fn test_peer_reset_reconnects() {
        assert_eq!(
            CloseAction::from_code(1006),
            CloseAction::Reconnect {
                clear_session: false,
                reset_sequence: false
            }
        );
    }

    #[test]
    fn test_session_clearing_codes() {
        for code in [4003, 4006, 4009] {
            assert_eq!(
                CloseAction::from_code(code),
                CloseAction::Reconnect {
                    clear_session: true,
                    reset_sequence: false
                },
                "code {code}"
            );
        }
    }

    #[test]
    fn test_invalid_sequence_resets_counter() {
        assert_eq!(
            CloseAction::from_code(4007),
            CloseAction::Reconnect {
                clear_session: false,
                reset_sequence: true
            }
        );
    }

    #[test]
    fn test_fatal_codes() {
        for code in [4004, 4010, 4011, 4013, 4014] {
            assert_eq!(CloseAction::from_code(code), CloseAction::Fatal, "code {code}");
        }
    }

    #[test]
    fn test_retry_codes_keep_session() {
        for code in [4001, 4002, 4005, 4008] {
            assert_eq!(
                CloseAction::from_code(code),
                CloseAction::Reconnect {
                    clear_session: false,
                    reset_sequence: false
                },
                "code {code}"
            );
        }
    }
}
