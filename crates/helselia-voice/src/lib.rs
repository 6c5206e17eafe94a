//! # helselia-voice
//!
//! The control plane of voice: a pending-join table that rendezvouses
//! gateway `VOICE_SERVER_UPDATE` events with callers waiting on
//! [`VoiceConnectionManager::join`], and the minimal [`VoiceSession`]
//! surface those callers receive. The transport data plane (UDP, Opus,
//! encryption) is an external collaborator behind
//! [`VoiceSession::connect`].

mod error;
mod manager;
mod session;

pub use error::VoiceError;
pub use manager::{JoinOptions, VoiceConnectionManager, VoiceServerInfo};
pub use session::{VoiceConnectInfo, VoiceSession, VoiceSessionEvent};

/// Result type alias for voice operations
pub type VoiceResult<T> = Result<T, VoiceError>;
