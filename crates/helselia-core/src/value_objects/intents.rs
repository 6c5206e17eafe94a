//! Gateway intents bitflags
//!
//! An intent declares which event families the session wishes to receive.
//! Serialized as a plain integer in the IDENTIFY payload.

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

bitflags! {
    /// Gateway intent flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Intents: u64 {
        /// Guild create/update/delete, roles, channels
        const GUILDS                   = 1 << 0;
        /// Member add/update/remove and member chunks (privileged)
        const GUILD_MEMBERS            = 1 << 1;
        /// Ban add/remove
        const GUILD_BANS               = 1 << 2;
        /// Emoji updates
        const GUILD_EMOJIS             = 1 << 3;
        /// Integration updates
        const GUILD_INTEGRATIONS       = 1 << 4;
        /// Webhook updates
        const GUILD_WEBHOOKS           = 1 << 5;
        /// Invite create/delete
        const GUILD_INVITES            = 1 << 6;
        /// Voice state updates
        const GUILD_VOICE_STATES       = 1 << 7;
        /// Presence updates (privileged)
        const GUILD_PRESENCES          = 1 << 8;
        /// Guild messages
        const GUILD_MESSAGES           = 1 << 9;
        /// Guild message reactions
        const GUILD_MESSAGE_REACTIONS  = 1 << 10;
        /// Guild typing start
        const GUILD_MESSAGE_TYPING     = 1 << 11;
        /// Direct messages
        const DIRECT_MESSAGES          = 1 << 12;
        /// DM reactions
        const DIRECT_MESSAGE_REACTIONS = 1 << 13;
        /// DM typing start
        const DIRECT_MESSAGE_TYPING    = 1 << 14;

        /// Everything except the privileged intents
        const UNPRIVILEGED = Self::GUILDS.bits()
            | Self::GUILD_BANS.bits()
            | Self::GUILD_EMOJIS.bits()
            | Self::GUILD_INTEGRATIONS.bits()
            | Self::GUILD_WEBHOOKS.bits()
            | Self::GUILD_INVITES.bits()
            | Self::GUILD_VOICE_STATES.bits()
            | Self::GUILD_MESSAGES.bits()
            | Self::GUILD_MESSAGE_REACTIONS.bits()
            | Self::GUILD_MESSAGE_TYPING.bits()
            | Self::DIRECT_MESSAGES.bits()
            | Self::DIRECT_MESSAGE_REACTIONS.bits()
            | Self::DIRECT_MESSAGE_TYPING.bits();
    }
}

impl Intents {
    /// Check whether any privileged intent is requested
    ///
    /// Privileged intents must be enabled in the developer portal; the
    /// gateway closes with 4014 when they are requested but disallowed.
    #[inline]
    #[must_use]
    pub fn privileged(&self) -> bool {
        self.intersects(Intents::GUILD_MEMBERS | Intents::GUILD_PRESENCES)
    }

    /// Parse a single intent from its SCREAMING_SNAKE_CASE name
    ///
    /// Named `from_intent_name` (rather than `from_name`) to avoid colliding
    /// with the inherent `from_name` that `bitflags` generates for this type.
    #[must_use]
    pub fn from_intent_name(name: &str) -> Option<Self> {
        match name {
            "GUILDS" => Some(Self::GUILDS),
            "GUILD_MEMBERS" => Some(Self::GUILD_MEMBERS),
            "GUILD_BANS" => Some(Self::GUILD_BANS),
            "GUILD_EMOJIS" => Some(Self::GUILD_EMOJIS),
            "GUILD_INTEGRATIONS" => Some(Self::GUILD_INTEGRATIONS),
            "GUILD_WEBHOOKS" => Some(Self::GUILD_WEBHOOKS),
            "GUILD_INVITES" => Some(Self::GUILD_INVITES),
            "GUILD_VOICE_STATES" => Some(Self::GUILD_VOICE_STATES),
            "GUILD_PRESENCES" => Some(Self::GUILD_PRESENCES),
            "GUILD_MESSAGES" => Some(Self::GUILD_MESSAGES),
            "GUILD_MESSAGE_REACTIONS" => Some(Self::GUILD_MESSAGE_REACTIONS),
            "GUILD_MESSAGE_TYPING" => Some(Self::GUILD_MESSAGE_TYPING),
            "DIRECT_MESSAGES" => Some(Self::DIRECT_MESSAGES),
            "DIRECT_MESSAGE_REACTIONS" => Some(Self::DIRECT_MESSAGE_REACTIONS),
            "DIRECT_MESSAGE_TYPING" => Some(Self::DIRECT_MESSAGE_TYPING),
            _ => None,
        }
    }

    /// Combine a list of intent names into one bitmask
    ///
    /// Unknown names are ignored with no error; the gateway itself is the
    /// final authority on intent validity (close code 4013).
    #[must_use]
    pub fn from_names<'a, I>(names: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        names
            .into_iter()
            .filter_map(Self::from_intent_name)
            .fold(Intents::empty(), |acc, i| acc | i)
    }
}

impl Default for Intents {
    fn default() -> Self {
        Intents::UNPRIVILEGED
    }
}

impl fmt::Display for Intents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

// Serialized as the raw integer bitmask (IDENTIFY wire format)
impl Serialize for Intents {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(self.bits())
    }
}

impl<'de> Deserialize<'de> for Intents {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = u64::deserialize(deserializer)?;
        Ok(Intents::from_bits_truncate(bits))
    }
}
