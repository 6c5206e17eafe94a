//! Dispatch demultiplexer
//!
//! Turns a raw `(event name, d payload)` pair into a typed [`Event`],
//! applying the frame to the cache and capturing the pre-image for
//! update/delete events. A missing cached parent downgrades the frame to
//! a debug log; the demultiplexer never fails the connection.

use serde_json::Value;
use tracing::debug;

use helselia_core::{
    CacheStore, Channel, Emoji, Guild, Member, Message, Presence, Role, Snowflake, User, VoiceState,
};

use super::Event;

/// Demultiplex one dispatch frame
///
/// Returns `None` when the frame was skipped (missing parent or
/// malformed payload); the skip reason is logged at debug level.
/// READY, RESUMED, GUILD_MEMBERS_CHUNK, and VOICE_SERVER_UPDATE carry
/// per-shard state and are handled by the shard before it gets here.
pub fn demux(cache: &CacheStore, name: &str, data: Value) -> Option<Event> {
    match name {
        // ── User lifecycle ───────────────────────────────────
        "PRESENCE_UPDATE" => presence_update(cache, data),
        "USER_UPDATE" => {
            let user: User = parse(name, data)?;
            let old = cache.current_user().or_else(|| cache.user(user.id));
            cache.set_current_user(user.clone());
            cache.put_user(user.clone());
            Some(Event::UserUpdate { user, old })
        }
        "USER_NOTE_UPDATE" => {
            let user_id = field_snowflake(&data, "id")?;
            let note = data.get("note").and_then(Value::as_str).unwrap_or_default();
            Some(Event::UserNoteUpdate {
                user_id,
                note: note.to_string(),
            })
        }
        "USER_SETTINGS_UPDATE" => Some(Event::UserSettingsUpdate { settings: data }),
        "USER_GUILD_SETTINGS_UPDATE" => Some(Event::UserGuildSettingsUpdate { settings: data }),

        // ── Guild lifecycle ──────────────────────────────────
        "GUILD_CREATE" => guild_create(cache, data),
        "GUILD_UPDATE" => {
            let fresh: Guild = parse(name, data)?;
            let old = cache.guild(fresh.id);
            match cache.with_guild_mut(fresh.id, |g| {
                g.update_from(fresh.clone());
                g.clone()
            }) {
                Some(updated) => Some(Event::GuildUpdate {
                    guild: updated,
                    old,
                }),
                None => {
                    cache.put_guild(fresh.clone());
                    Some(Event::GuildUpdate {
                        guild: fresh,
                        old: None,
                    })
                }
            }
        }
        "GUILD_DELETE" => {
            let guild_id = field_snowflake(&data, "id")?;
            if data.get("unavailable").and_then(Value::as_bool) == Some(true) {
                cache.with_guild_mut(guild_id, |g| g.unavailable = true);
                Some(Event::GuildUnavailable { guild_id })
            } else {
                let old = cache.remove_guild(guild_id);
                Some(Event::GuildDelete { guild_id, old })
            }
        }
        "GUILD_SYNC" => guild_sync(cache, data),

        // ── Membership ───────────────────────────────────────
        "GUILD_MEMBER_ADD" => {
            let guild_id = field_snowflake(&data, "guild_id")?;
            let member: Member = parse(name, data)?;
            cache.put_user(member.user.clone());
            let inserted = cache.with_guild_mut(guild_id, |g| {
                g.member_count = g.member_count.map(|c| c + 1);
                g.members.insert(member.id(), member.clone());
            });
            if inserted.is_none() {
                return skip_missing_guild(name, guild_id);
            }
            Some(Event::GuildMemberAdd { guild_id, member })
        }
        "GUILD_MEMBER_UPDATE" => {
            let guild_id = field_snowflake(&data, "guild_id")?;
            let fresh: Member = parse(name, data)?;
            let old = cache.with_guild_mut(guild_id, |g| {
                let old = g.members.get(&fresh.id()).cloned();
                match g.members.get_mut(&fresh.id()) {
                    Some(member) => member.update_from(fresh.clone()),
                    None => {
                        g.members.insert(fresh.id(), fresh.clone());
                    }
                }
                old
            });
            match old {
                Some(old) => Some(Event::GuildMemberUpdate {
                    guild_id,
                    member: fresh,
                    old,
                }),
                None => skip_missing_guild(name, guild_id),
            }
        }
        "GUILD_MEMBER_REMOVE" => {
            let guild_id = field_snowflake(&data, "guild_id")?;
            let user: User = parse_field(name, &data, "user")?;
            let removed = cache.with_guild_mut(guild_id, |g| {
                g.member_count = g.member_count.map(|c| c.saturating_sub(1));
                g.members.remove(&user.id);
            });
            if removed.is_none() {
                return skip_missing_guild(name, guild_id);
            }
            Some(Event::GuildMemberRemove { guild_id, user })
        }
        "GUILD_BAN_ADD" => {
            let guild_id = field_snowflake(&data, "guild_id")?;
            let user: User = parse_field(name, &data, "user")?;
            Some(Event::GuildBanAdd { guild_id, user })
        }
        "GUILD_BAN_REMOVE" => {
            let guild_id = field_snowflake(&data, "guild_id")?;
            let user: User = parse_field(name, &data, "user")?;
            Some(Event::GuildBanRemove { guild_id, user })
        }

        // ── Roles ────────────────────────────────────────────
        "GUILD_ROLE_CREATE" => {
            let guild_id = field_snowflake(&data, "guild_id")?;
            let role: Role = parse_field(name, &data, "role")?;
            let inserted =
                cache.with_guild_mut(guild_id, |g| g.roles.insert(role.id, role.clone()));
            if inserted.is_none() {
                return skip_missing_guild(name, guild_id);
            }
            Some(Event::GuildRoleCreate { guild_id, role })
        }
        "GUILD_ROLE_UPDATE" => {
            let guild_id = field_snowflake(&data, "guild_id")?;
            let role: Role = parse_field(name, &data, "role")?;
            let old =
                cache.with_guild_mut(guild_id, |g| g.roles.insert(role.id, role.clone()));
            match old {
                Some(old) => Some(Event::GuildRoleUpdate {
                    guild_id,
                    role,
                    old,
                }),
                None => skip_missing_guild(name, guild_id),
            }
        }
        "GUILD_ROLE_DELETE" => {
            let guild_id = field_snowflake(&data, "guild_id")?;
            let role_id = field_snowflake(&data, "role_id")?;
            let old = cache.with_guild_mut(guild_id, |g| g.roles.remove(&role_id));
            match old {
                Some(old) => Some(Event::GuildRoleDelete {
                    guild_id,
                    role_id,
                    old,
                }),
                None => skip_missing_guild(name, guild_id),
            }
        }

        // ── Channels ─────────────────────────────────────────
        "CHANNEL_CREATE" => {
            let channel: Channel = parse(name, data)?;
            cache.put_channel(channel.clone());
            Some(Event::ChannelCreate { channel })
        }
        "CHANNEL_UPDATE" => {
            let channel: Channel = parse(name, data)?;
            let old = cache.put_channel(channel.clone());
            Some(Event::ChannelUpdate { channel, old })
        }
        "CHANNEL_DELETE" => {
            let channel: Channel = parse(name, data)?;
            let cached = cache.remove_channel(channel.id);
            Some(Event::ChannelDelete {
                channel: cached.unwrap_or(channel),
            })
        }
        "CHANNEL_PINS_UPDATE" => {
            let channel_id = field_snowflake(&data, "channel_id")?;
            let last_pin_timestamp = data
                .get("last_pin_timestamp")
                .and_then(Value::as_str)
                .map(String::from);
            Some(Event::ChannelPinsUpdate {
                channel_id,
                last_pin_timestamp,
            })
        }
        "CHANNEL_RECIPIENT_ADD" | "CHANNEL_RECIPIENT_REMOVE" => {
            recipient_change(cache, name, data)
        }

        // ── Messages ─────────────────────────────────────────
        "MESSAGE_CREATE" => {
            let message: Message = parse(name, data)?;
            if let Some(author) = &message.author {
                cache.put_user(author.clone());
            }
            cache.put_message(message.clone());
            Some(Event::MessageCreate { message })
        }
        "MESSAGE_UPDATE" => message_update(cache, data),
        "MESSAGE_DELETE" => {
            let message_id = field_snowflake(&data, "id")?;
            let channel_id = field_snowflake(&data, "channel_id")?;
            let old = cache.remove_message(message_id);
            Some(Event::MessageDelete {
                message_id,
                channel_id,
                old,
            })
        }
        "MESSAGE_DELETE_BULK" => {
            let channel_id = field_snowflake(&data, "channel_id")?;
            let message_ids: Vec<Snowflake> = data
                .get("ids")
                .and_then(Value::as_array)
                .map(|ids| {
                    ids.iter()
                        .filter_map(|v| serde_json::from_value(v.clone()).ok())
                        .collect()
                })
                .unwrap_or_default();
            for id in &message_ids {
                cache.remove_message(*id);
            }
            Some(Event::MessageDeleteBulk {
                message_ids,
                channel_id,
            })
        }
        "MESSAGE_REACTION_ADD" | "MESSAGE_REACTION_REMOVE" => {
            let channel_id = field_snowflake(&data, "channel_id")?;
            let message_id = field_snowflake(&data, "message_id")?;
            let user_id = field_snowflake(&data, "user_id")?;
            let emoji: Emoji = parse_field(name, &data, "emoji")?;
            Some(if name == "MESSAGE_REACTION_ADD" {
                Event::MessageReactionAdd {
                    channel_id,
                    message_id,
                    user_id,
                    emoji,
                }
            } else {
                Event::MessageReactionRemove {
                    channel_id,
                    message_id,
                    user_id,
                    emoji,
                }
            })
        }
        "MESSAGE_REACTION_REMOVE_ALL" => {
            let channel_id = field_snowflake(&data, "channel_id")?;
            let message_id = field_snowflake(&data, "message_id")?;
            Some(Event::MessageReactionRemoveAll {
                channel_id,
                message_id,
            })
        }
        "MESSAGE_REACTION_REMOVE_EMOJI" => {
            let channel_id = field_snowflake(&data, "channel_id")?;
            let message_id = field_snowflake(&data, "message_id")?;
            let emoji: Emoji = parse_field(name, &data, "emoji")?;
            Some(Event::MessageReactionRemoveEmoji {
                channel_id,
                message_id,
                emoji,
            })
        }

        // ── Voice ────────────────────────────────────────────
        "VOICE_STATE_UPDATE" => voice_state_update(cache, data),

        // ── Invites ──────────────────────────────────────────
        "INVITE_CREATE" => {
            let channel_id = field_snowflake(&data, "channel_id")?;
            let code = data.get("code").and_then(Value::as_str)?.to_string();
            Some(Event::InviteCreate {
                guild_id: field_snowflake(&data, "guild_id"),
                channel_id,
                code,
                data,
            })
        }
        "INVITE_DELETE" => {
            let channel_id = field_snowflake(&data, "channel_id")?;
            let code = data.get("code").and_then(Value::as_str)?.to_string();
            Some(Event::InviteDelete {
                guild_id: field_snowflake(&data, "guild_id"),
                channel_id,
                code,
            })
        }

        // ── Misc ─────────────────────────────────────────────
        "TYPING_START" => {
            let channel_id = field_snowflake(&data, "channel_id")?;
            let user_id = field_snowflake(&data, "user_id")?;
            Some(Event::TypingStart {
                channel_id,
                user_id,
                timestamp: data.get("timestamp").and_then(Value::as_u64),
            })
        }
        "WEBHOOKS_UPDATE" => {
            let guild_id = field_snowflake(&data, "guild_id")?;
            let channel_id = field_snowflake(&data, "channel_id")?;
            Some(Event::WebhooksUpdate {
                guild_id,
                channel_id,
            })
        }
        "PRESENCES_REPLACE" => {
            // Items carry a guild_id next to the presence fields.
            let items = data.as_array()?.clone();
            let mut presences = Vec::with_capacity(items.len());
            for item in items {
                let guild_id = field_snowflake(&item, "guild_id");
                let Some(presence) = parse::<Presence>("PRESENCES_REPLACE", item) else {
                    continue;
                };
                if let Some(guild_id) = guild_id {
                    apply_presence(cache, guild_id, &presence);
                }
                presences.push(presence);
            }
            Some(Event::PresencesReplace { presences })
        }
        "GUILD_EMOJIS_UPDATE" => {
            let guild_id = field_snowflake(&data, "guild_id")?;
            let emojis: Vec<Emoji> = parse_field(name, &data, "emojis")?;
            let old = cache.with_guild_mut(guild_id, |g| {
                std::mem::replace(&mut g.emojis, emojis.clone())
            });
            match old {
                Some(old) => Some(Event::GuildEmojisUpdate {
                    guild_id,
                    emojis,
                    old: Some(old),
                }),
                None => skip_missing_guild(name, guild_id),
            }
        }
        "GUILD_INTEGRATIONS_UPDATE" => {
            let guild_id = field_snowflake(&data, "guild_id")?;
            Some(Event::GuildIntegrationsUpdate { guild_id })
        }
        "RELATIONSHIP_ADD" => Some(Event::RelationshipAdd { data }),
        "RELATIONSHIP_REMOVE" => Some(Event::RelationshipRemove { data }),
        "FRIEND_SUGGESTION_CREATE" => Some(Event::FriendSuggestionCreate { data }),
        "FRIEND_SUGGESTION_DELETE" => Some(Event::FriendSuggestionDelete { data }),

        _ => Some(Event::Unknown {
            name: name.to_string(),
            data,
        }),
    }
}

// ── Multi-step handlers ──────────────────────────────────────

fn guild_create(cache: &CacheStore, data: Value) -> Option<Event> {
    let guild: Guild = parse("GUILD_CREATE", data)?;
    if guild.unavailable {
        let guild_id = guild.id;
        cache.put_guild(guild);
        return Some(Event::GuildUnavailable { guild_id });
    }

    for member in guild.members.values() {
        cache.put_user(member.user.clone());
    }
    let previous = cache.put_guild(guild.clone());
    if previous.is_some_and(|g| g.unavailable) {
        Some(Event::GuildAvailable { guild })
    } else {
        Some(Event::GuildCreate { guild })
    }
}

fn guild_sync(cache: &CacheStore, data: Value) -> Option<Event> {
    let guild_id = field_snowflake(&data, "id")?;
    let fresh: Guild = parse("GUILD_SYNC", data)?;
    let applied = cache.with_guild_mut(guild_id, |g| {
        g.members = fresh.members.clone();
        g.large = fresh.large;
        for state in fresh.voice_states.values() {
            g.voice_states.insert(state.user_id, state.clone());
        }
    });
    if applied.is_none() {
        return skip_missing_guild("GUILD_SYNC", guild_id);
    }
    Some(Event::GuildSync { guild_id })
}

fn presence_update(cache: &CacheStore, data: Value) -> Option<Event> {
    let guild_id = field_snowflake(&data, "guild_id");
    let presence: Presence = parse("PRESENCE_UPDATE", data.clone())?;

    // A full user object inside the frame refreshes the user cache.
    if let Some(user) = data.get("user") {
        if user.get("username").is_some() {
            if let Ok(user) = serde_json::from_value::<User>(user.clone()) {
                cache.put_user(user);
            }
        }
    }

    let old = match guild_id {
        Some(guild_id) => match apply_presence(cache, guild_id, &presence) {
            Some(old) => old,
            None => {
                return skip_missing_guild("PRESENCE_UPDATE", guild_id);
            }
        },
        None => None,
    };

    Some(Event::PresenceUpdate {
        guild_id,
        presence,
        old,
    })
}

/// Attach a presence to its member
///
/// `None` when the guild is uncached; otherwise the member's previous
/// presence (uncached members simply carry no pre-image).
fn apply_presence(
    cache: &CacheStore,
    guild_id: Snowflake,
    presence: &Presence,
) -> Option<Option<Presence>> {
    cache.with_guild_mut(guild_id, |g| match g.members.get_mut(&presence.user_id) {
        Some(member) => {
            let old = member.presence.take();
            member.presence = Some(presence.clone());
            old
        }
        None => None,
    })
}

fn voice_state_update(cache: &CacheStore, data: Value) -> Option<Event> {
    let state: VoiceState = parse("VOICE_STATE_UPDATE", data)?;
    let Some(guild_id) = state.guild_id else {
        debug!(user_id = %state.user_id, "VOICE_STATE_UPDATE without guild, skipping");
        return None;
    };

    let old = cache.with_guild_mut(guild_id, |g| {
        if state.connected() {
            g.voice_states.insert(state.user_id, state.clone())
        } else {
            g.voice_states.remove(&state.user_id)
        }
    });
    match old {
        Some(old) => Some(Event::VoiceStateUpdate { state, old }),
        None => skip_missing_guild("VOICE_STATE_UPDATE", guild_id),
    }
}

fn message_update(cache: &CacheStore, data: Value) -> Option<Event> {
    let message_id = field_snowflake(&data, "id")?;
    let old = cache.message(message_id);

    match old {
        Some(old) => {
            let patch: helselia_core::MessagePatch = serde_json::from_value(data).ok()?;
            let updated = cache.with_message_mut(message_id, |m| {
                m.apply_update(&patch);
                m.clone()
            })?;
            Some(Event::MessageUpdate {
                message: updated,
                old: Some(old),
            })
        }
        None => {
            // Uncached: only a full message object can be surfaced.
            match serde_json::from_value::<Message>(data) {
                Ok(message) => {
                    cache.put_message(message.clone());
                    Some(Event::MessageUpdate {
                        message,
                        old: None,
                    })
                }
                Err(_) => {
                    debug!(message_id = %message_id, "MESSAGE_UPDATE for uncached partial message, skipping");
                    None
                }
            }
        }
    }
}

fn recipient_change(cache: &CacheStore, name: &str, data: Value) -> Option<Event> {
    let channel_id = field_snowflake(&data, "channel_id")?;
    let user: User = parse_field(name, &data, "user")?;

    let adding = name == "CHANNEL_RECIPIENT_ADD";
    if let Some(mut channel) = cache.channel(channel_id) {
        if adding {
            channel.recipients.push(user.clone());
        } else {
            channel.recipients.retain(|u| u.id != user.id);
        }
        cache.put_channel(channel);
    } else {
        debug!(channel_id = %channel_id, event = name, "Recipient change for uncached channel, skipping");
        return None;
    }

    Some(if adding {
        Event::ChannelRecipientAdd { channel_id, user }
    } else {
        Event::ChannelRecipientRemove { channel_id, user }
    })
}

// ── Field helpers ────────────────────────────────────────────

fn parse<T: serde::de::DeserializeOwned>(event: &str, data: Value) -> Option<T> {
    match serde_json::from_value(data) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(event = event, error = %e, "Malformed dispatch payload, skipping");
            None
        }
    }
}

fn parse_field<T: serde::de::DeserializeOwned>(
    event: &str,
    data: &Value,
    field: &str,
) -> Option<T> {
    let value = data.get(field)?.clone();
    parse(event, value)
}

fn field_snowflake(data: &Value, field: &str) -> Option<Snowflake> {
    data.get(field)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

fn skip_missing_guild(event: &str, guild_id: Snowflake) -> Option<Event> {
    debug!(event = event, guild_id = %guild_id, "Uncached guild for dispatch, skipping");
    None
}
