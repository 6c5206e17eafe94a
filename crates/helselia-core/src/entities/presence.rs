//! Presence: a user's online status and current activity

use serde::{Deserialize, Deserializer, Serialize};

use crate::value_objects::Snowflake;

/// Online status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Online,
    Idle,
    Dnd,
    #[default]
    Offline,
}

/// An activity attached to a presence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: u8,
}

/// A user's presence within a guild
///
/// The wire nests the user as an object; only the id is retained here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    #[serde(rename = "user", deserialize_with = "user_id_only", serialize_with = "user_id_wrap")]
    pub user_id: Snowflake,
    #[serde(default)]
    pub status: Status,
    #[serde(rename = "game", default)]
    pub activity: Option<Activity>,
}

fn user_id_only<'de, D>(deserializer: D) -> Result<Snowflake, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct IdOnly {
        id: Snowflake,
    }
    IdOnly::deserialize(deserializer).map(|u| u.id)
}

fn user_id_wrap<S>(id: &Snowflake, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    #[derive(Serialize)]
    struct IdOnly<'a> {
        id: &'a Snowflake,
    }
    IdOnly { id }.serialize(serializer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presence_from_wire() {
        let presence: Presence = serde_json::from_str(
            r#"{"user":{"id":"123","username":"n"},"status":"idle","game":{"name":"chess","type":0}}"#,
        )
        .unwrap();
        assert_eq!(presence.user_id, Snowflake::new(123));
        assert_eq!(presence.status, Status::Idle);
        assert_eq!(presence.activity.unwrap().name, "chess");
    }

    #[test]
    fn test_status_defaults_offline() {
        let presence: Presence = serde_json::from_str(r#"{"user":{"id":"9"}}"#).unwrap();
        assert_eq!(presence.status, Status::Offline);
        assert!(presence.activity.is_none());
    }
}
