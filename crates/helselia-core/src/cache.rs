//! Shared cache store
//!
//! Snowflake-keyed collections mutated by the event demultiplexer and read
//! by everything else. `DashMap` gives readers tolerance of concurrent
//! mutation without a global lock.

use dashmap::DashMap;

use crate::entities::{Channel, Guild, Message, User};
use crate::value_objects::Snowflake;

/// Process-wide entity cache shared across shards
#[derive(Default)]
pub struct CacheStore {
    /// Guilds, including unavailable stubs
    guilds: DashMap<Snowflake, Guild>,
    /// Users seen in any payload
    users: DashMap<Snowflake, User>,
    /// Private (DM / group) channels; guild channels live inside guilds
    private_channels: DashMap<Snowflake, Channel>,
    /// Channel id → owning guild id, for O(1) guild channel lookups
    channel_guild: DashMap<Snowflake, Snowflake>,
    /// Recently seen messages, for update/delete diffs
    messages: DashMap<Snowflake, Message>,
    /// The connected user, set on READY
    current_user: DashMap<(), User>,
}

impl CacheStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ── Current user ─────────────────────────────────────────

    /// Record the connected user (READY / USER_UPDATE)
    pub fn set_current_user(&self, user: User) {
        self.current_user.insert((), user);
    }

    /// The connected user, if READY has been observed
    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        self.current_user.get(&()).map(|u| u.clone())
    }

    // ── Guilds ───────────────────────────────────────────────

    /// Insert or replace a guild, returning the previous entry
    pub fn put_guild(&self, guild: Guild) -> Option<Guild> {
        for channel_id in guild.channels.keys() {
            self.channel_guild.insert(*channel_id, guild.id);
        }
        self.guilds.insert(guild.id, guild)
    }

    /// Clone a guild out of the cache
    #[must_use]
    pub fn guild(&self, id: Snowflake) -> Option<Guild> {
        self.guilds.get(&id).map(|g| g.clone())
    }

    /// Run a closure with mutable access to a cached guild
    ///
    /// Returns `None` when the guild is uncached (the caller logs and
    /// skips, per the missing-parent rule).
    pub fn with_guild_mut<T>(&self, id: Snowflake, f: impl FnOnce(&mut Guild) -> T) -> Option<T> {
        self.guilds.get_mut(&id).map(|mut g| f(&mut g))
    }

    /// Remove a guild and its channel index entries
    pub fn remove_guild(&self, id: Snowflake) -> Option<Guild> {
        let removed = self.guilds.remove(&id).map(|(_, g)| g);
        if let Some(guild) = &removed {
            for channel_id in guild.channels.keys() {
                self.channel_guild.remove(channel_id);
            }
        }
        removed
    }

    /// Ids of all cached guilds
    #[must_use]
    pub fn guild_ids(&self) -> Vec<Snowflake> {
        self.guilds.iter().map(|g| *g.key()).collect()
    }

    /// Number of cached guilds
    #[must_use]
    pub fn guild_count(&self) -> usize {
        self.guilds.len()
    }

    // ── Users ────────────────────────────────────────────────

    /// Insert or refresh a user, returning the previous entry
    pub fn put_user(&self, user: User) -> Option<User> {
        self.users.insert(user.id, user)
    }

    #[must_use]
    pub fn user(&self, id: Snowflake) -> Option<User> {
        self.users.get(&id).map(|u| u.clone())
    }

    // ── Channels ─────────────────────────────────────────────

    /// Insert a channel, indexing it under its guild when it has one
    pub fn put_channel(&self, channel: Channel) -> Option<Channel> {
        match channel.guild_id {
            Some(guild_id) => {
                self.channel_guild.insert(channel.id, guild_id);
                self.with_guild_mut(guild_id, |g| g.channels.insert(channel.id, channel))
                    .flatten()
            }
            None => self.private_channels.insert(channel.id, channel),
        }
    }

    /// Look up any channel by id
    #[must_use]
    pub fn channel(&self, id: Snowflake) -> Option<Channel> {
        if let Some(channel) = self.private_channels.get(&id) {
            return Some(channel.clone());
        }
        let guild_id = *self.channel_guild.get(&id)?;
        self.guilds.get(&guild_id)?.channels.get(&id).cloned()
    }

    /// Remove a channel from its guild or the private map
    pub fn remove_channel(&self, id: Snowflake) -> Option<Channel> {
        if let Some((_, channel)) = self.private_channels.remove(&id) {
            return Some(channel);
        }
        let (_, guild_id) = self.channel_guild.remove(&id)?;
        self.with_guild_mut(guild_id, |g| g.channels.remove(&id)).flatten()
    }

    // ── Messages ─────────────────────────────────────────────

    pub fn put_message(&self, message: Message) -> Option<Message> {
        self.messages.insert(message.id, message)
    }

    #[must_use]
    pub fn message(&self, id: Snowflake) -> Option<Message> {
        self.messages.get(&id).map(|m| m.clone())
    }

    pub fn remove_message(&self, id: Snowflake) -> Option<Message> {
        self.messages.remove(&id).map(|(_, m)| m)
    }

    /// Run a closure with mutable access to a cached message
    pub fn with_message_mut<T>(
        &self,
        id: Snowflake,
        f: impl FnOnce(&mut Message) -> T,
    ) -> Option<T> {
        self.messages.get_mut(&id).map(|mut m| f(&mut m))
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("guilds", &self.guilds.len())
            .field("users", &self.users.len())
            .field("private_channels", &self.private_channels.len())
            .field("messages", &self.messages.len())
            .finish()
    }
}
