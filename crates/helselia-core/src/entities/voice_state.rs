//! Voice state entity

use serde::{Deserialize, Serialize};

use crate::value_objects::Snowflake;

/// A user's voice connection state within a guild
///
/// `channel_id: None` means the user left voice entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceState {
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
    pub user_id: Snowflake,
    #[serde(default)]
    pub channel_id: Option<Snowflake>,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub deaf: bool,
    #[serde(default)]
    pub mute: bool,
    #[serde(default)]
    pub self_deaf: bool,
    #[serde(default)]
    pub self_mute: bool,
    #[serde(default)]
    pub suppress: bool,
}

impl VoiceState {
    /// Whether the user is currently in a voice channel
    #[inline]
    #[must_use]
    pub fn connected(&self) -> bool {
        self.channel_id.is_some()
    }
}
