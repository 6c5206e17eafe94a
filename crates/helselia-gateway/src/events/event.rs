//! Client-facing event type

use serde_json::Value;

use helselia_core::{
    Channel, Emoji, Guild, Member, Message, Presence, Role, Snowflake, User, VoiceState,
};

/// Everything the gateway can tell a listener
///
/// Update variants pair the fresh entity with the previously cached one
/// (`None` when the entity was uncached). Events referencing entities the
/// platform no longer delivers in full carry ids instead.
#[derive(Debug, Clone)]
pub enum Event {
    // ── Shard lifecycle ──────────────────────────────────────
    /// Handshake finished; the ready gate may still be draining
    ShardPreReady { shard_id: u32 },
    /// All initial guilds settled and pending syncs/requests drained
    ShardReady { shard_id: u32 },
    /// Session resumed after a drop
    ShardResumed { shard_id: u32 },
    /// Connection lost; `error` explains unclean closes
    ShardDisconnect {
        shard_id: u32,
        error: Option<String>,
    },
    /// Error surfaced on the shard's error channel
    ShardError { shard_id: u32, message: String },

    // ── User lifecycle ───────────────────────────────────────
    PresenceUpdate {
        guild_id: Option<Snowflake>,
        presence: Presence,
        old: Option<Presence>,
    },
    UserUpdate { user: User, old: Option<User> },
    UserNoteUpdate { user_id: Snowflake, note: String },
    UserSettingsUpdate { settings: Value },
    UserGuildSettingsUpdate { settings: Value },

    // ── Guild lifecycle ──────────────────────────────────────
    /// A brand-new guild (joined, or created)
    GuildCreate { guild: Guild },
    /// A previously unavailable guild came back
    GuildAvailable { guild: Guild },
    GuildUpdate { guild: Guild, old: Option<Guild> },
    /// Removed from the guild (left, kicked, or deleted)
    GuildDelete {
        guild_id: Snowflake,
        old: Option<Guild>,
    },
    /// The guild dropped to unavailable (outage)
    GuildUnavailable { guild_id: Snowflake },
    GuildSync { guild_id: Snowflake },

    // ── Membership ───────────────────────────────────────────
    GuildMemberAdd {
        guild_id: Snowflake,
        member: Member,
    },
    GuildMemberUpdate {
        guild_id: Snowflake,
        member: Member,
        old: Option<Member>,
    },
    GuildMemberRemove {
        guild_id: Snowflake,
        user: User,
    },
    GuildMembersChunk {
        guild_id: Snowflake,
        members: Vec<Member>,
        chunk_index: u32,
        chunk_count: u32,
    },
    GuildBanAdd { guild_id: Snowflake, user: User },
    GuildBanRemove { guild_id: Snowflake, user: User },

    // ── Roles ────────────────────────────────────────────────
    GuildRoleCreate { guild_id: Snowflake, role: Role },
    GuildRoleUpdate {
        guild_id: Snowflake,
        role: Role,
        old: Option<Role>,
    },
    GuildRoleDelete {
        guild_id: Snowflake,
        role_id: Snowflake,
        old: Option<Role>,
    },

    // ── Channels ─────────────────────────────────────────────
    ChannelCreate { channel: Channel },
    ChannelUpdate {
        channel: Channel,
        old: Option<Channel>,
    },
    ChannelDelete { channel: Channel },
    ChannelPinsUpdate {
        channel_id: Snowflake,
        last_pin_timestamp: Option<String>,
    },
    ChannelRecipientAdd { channel_id: Snowflake, user: User },
    ChannelRecipientRemove { channel_id: Snowflake, user: User },

    // ── Messages ─────────────────────────────────────────────
    MessageCreate { message: Message },
    MessageUpdate {
        message: Message,
        old: Option<Message>,
    },
    MessageDelete {
        message_id: Snowflake,
        channel_id: Snowflake,
        old: Option<Message>,
    },
    MessageDeleteBulk {
        message_ids: Vec<Snowflake>,
        channel_id: Snowflake,
    },
    MessageReactionAdd {
        channel_id: Snowflake,
        message_id: Snowflake,
        user_id: Snowflake,
        emoji: Emoji,
    },
    MessageReactionRemove {
        channel_id: Snowflake,
        message_id: Snowflake,
        user_id: Snowflake,
        emoji: Emoji,
    },
    MessageReactionRemoveAll {
        channel_id: Snowflake,
        message_id: Snowflake,
    },
    MessageReactionRemoveEmoji {
        channel_id: Snowflake,
        message_id: Snowflake,
        emoji: Emoji,
    },

    // ── Voice ────────────────────────────────────────────────
    VoiceStateUpdate {
        state: VoiceState,
        old: Option<VoiceState>,
    },
    /// Forwarded verbatim to the voice connection manager, with the
    /// shard identity and session attached
    VoiceServerUpdate {
        guild_id: Snowflake,
        endpoint: Option<String>,
        token: String,
        session_id: Option<String>,
        user_id: Option<Snowflake>,
        shard_id: u32,
    },

    // ── Invites ──────────────────────────────────────────────
    InviteCreate {
        guild_id: Option<Snowflake>,
        channel_id: Snowflake,
        code: String,
        data: Value,
    },
    InviteDelete {
        guild_id: Option<Snowflake>,
        channel_id: Snowflake,
        code: String,
    },

    // ── Misc ─────────────────────────────────────────────────
    TypingStart {
        channel_id: Snowflake,
        user_id: Snowflake,
        timestamp: Option<u64>,
    },
    WebhooksUpdate {
        guild_id: Snowflake,
        channel_id: Snowflake,
    },
    PresencesReplace { presences: Vec<Presence> },
    GuildEmojisUpdate {
        guild_id: Snowflake,
        emojis: Vec<Emoji>,
        old: Option<Vec<Emoji>>,
    },
    GuildIntegrationsUpdate { guild_id: Snowflake },
    RelationshipAdd { data: Value },
    RelationshipRemove { data: Value },
    FriendSuggestionCreate { data: Value },
    FriendSuggestionDelete { data: Value },

    /// Dispatch whose event name the demultiplexer does not model
    Unknown { name: String, data: Value },
}
