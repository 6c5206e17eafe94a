//! Guild entity - top-level container of channels, roles, and members

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::entities::{Channel, Emoji, Member, Presence, Role, VoiceState};
use crate::value_objects::Snowflake;

/// A guild as assembled from GUILD_CREATE / GUILD_UPDATE frames
///
/// Child collections are keyed maps rather than back-pointered objects;
/// cross-entity lookups go through the shared cache store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guild {
    pub id: Snowflake,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub owner_id: Option<Snowflake>,
    #[serde(default)]
    pub large: bool,
    #[serde(default)]
    pub unavailable: bool,
    #[serde(default)]
    pub member_count: Option<u64>,
    #[serde(default, deserialize_with = "members_by_id")]
    pub members: HashMap<Snowflake, Member>,
    #[serde(default, deserialize_with = "roles_by_id")]
    pub roles: HashMap<Snowflake, Role>,
    #[serde(default, deserialize_with = "channels_by_id")]
    pub channels: HashMap<Snowflake, Channel>,
    #[serde(default, deserialize_with = "voice_states_by_user")]
    pub voice_states: HashMap<Snowflake, VoiceState>,
    #[serde(default)]
    pub emojis: Vec<Emoji>,
}

impl Guild {
    /// A stub for an unavailable guild (GUILD_CREATE with `unavailable`)
    #[must_use]
    pub fn unavailable(id: Snowflake) -> Self {
        Self {
            id,
            name: String::new(),
            icon: None,
            owner_id: None,
            large: false,
            unavailable: true,
            member_count: None,
            members: HashMap::new(),
            roles: HashMap::new(),
            channels: HashMap::new(),
            voice_states: HashMap::new(),
            emojis: Vec::new(),
        }
    }

    /// Attach presences from a GUILD_CREATE / chunk presence list to the
    /// matching members.
    pub fn apply_presences(&mut self, presences: impl IntoIterator<Item = Presence>) {
        for presence in presences {
            if let Some(member) = self.members.get_mut(&presence.user_id) {
                member.presence = Some(presence);
            }
        }
    }

    /// Overwrite guild-level fields from a GUILD_UPDATE frame, keeping
    /// the populated child collections.
    pub fn update_from(&mut self, fresh: Guild) {
        self.name = fresh.name;
        self.icon = fresh.icon;
        if fresh.owner_id.is_some() {
            self.owner_id = fresh.owner_id;
        }
        if !fresh.emojis.is_empty() {
            self.emojis = fresh.emojis;
        }
        self.unavailable = false;
    }
}

fn members_by_id<'de, D>(deserializer: D) -> Result<HashMap<Snowflake, Member>, D::Error>
where
    D: Deserializer<'de>,
{
    let list = Vec::<Member>::deserialize(deserializer)?;
    Ok(list.into_iter().map(|m| (m.id(), m)).collect())
}

fn roles_by_id<'de, D>(deserializer: D) -> Result<HashMap<Snowflake, Role>, D::Error>
where
    D: Deserializer<'de>,
{
    let list = Vec::<Role>::deserialize(deserializer)?;
    Ok(list.into_iter().map(|r| (r.id, r)).collect())
}

fn channels_by_id<'de, D>(deserializer: D) -> Result<HashMap<Snowflake, Channel>, D::Error>
where
    D: Deserializer<'de>,
{
    let list = Vec::<Channel>::deserialize(deserializer)?;
    Ok(list.into_iter().map(|c| (c.id, c)).collect())
}

fn voice_states_by_user<'de, D>(deserializer: D) -> Result<HashMap<Snowflake, VoiceState>, D::Error>
where
    D: Deserializer<'de>,
{
    let list = Vec::<VoiceState>::deserialize(deserializer)?;
    Ok(list.into_iter().map(|v| (v.user_id, v)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Status;

    #[test]
    fn test_guild_create_payload_assembles_collections() {
        let guild: Guild = serde_json::from_str(
            r#"{
                "id": "41771983423143937",
                "name": "Helselia Devs",
                "owner_id": "80351110224678912",
                "large": false,
                "member_count": 2,
                "members": [
                    {"user": {"id": "80351110224678912", "username": "nelly"}, "roles": ["111"]},
                    {"user": {"id": "80351110224678913", "username": "otter"}}
                ],
                "roles": [{"id": "111", "name": "mods"}],
                "channels": [{"id": "222", "type": 0, "name": "general"}],
                "voice_states": [{"user_id": "80351110224678913", "channel_id": "333", "session_id": "s1"}],
                "presences": []
            }"#,
        )
        .unwrap();

        assert_eq!(guild.members.len(), 2);
        assert_eq!(guild.roles[&Snowflake::new(111)].name, "mods");
        assert_eq!(guild.channels.len(), 1);
        assert!(guild.voice_states[&Snowflake::new(80351110224678913)].connected());
    }

    #[test]
    fn test_unavailable_stub() {
        let guild = Guild::unavailable(Snowflake::new(7));
        assert!(guild.unavailable);
        assert!(guild.members.is_empty());
    }

    #[test]
    fn test_apply_presences() {
        let mut guild: Guild = serde_json::from_str(
            r#"{"id":"1","name":"g","members":[{"user":{"id":"5","username":"a"}}]}"#,
        )
        .unwrap();

        guild.apply_presences([Presence {
            user_id: Snowflake::new(5),
            status: Status::Dnd,
            activity: None,
        }]);
        assert_eq!(
            guild.members[&Snowflake::new(5)].presence.as_ref().unwrap().status,
            Status::Dnd
        );

        // Presence for an unknown member is dropped silently.
        guild.apply_presences([Presence {
            user_id: Snowflake::new(99),
            status: Status::Online,
            activity: None,
        }]);
    }

    #[test]
    fn test_update_keeps_children() {
        let mut guild: Guild = serde_json::from_str(
            r#"{"id":"1","name":"before","members":[{"user":{"id":"5","username":"a"}}]}"#,
        )
        .unwrap();
        let fresh: Guild = serde_json::from_str(r#"{"id":"1","name":"after"}"#).unwrap();

        guild.update_from(fresh);
        assert_eq!(guild.name, "after");
        assert_eq!(guild.members.len(), 1);
    }
}
