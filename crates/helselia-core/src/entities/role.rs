//! Role entity

use serde::{Deserialize, Serialize};

use crate::value_objects::Snowflake;

/// A guild role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: Snowflake,
    pub name: String,
    #[serde(default)]
    pub color: u32,
    #[serde(default)]
    pub hoist: bool,
    #[serde(default)]
    pub position: i32,
    #[serde(default, deserialize_with = "crate::entities::role::permissions_bits")]
    pub permissions: u64,
    #[serde(default)]
    pub mentionable: bool,
}

// Permission bitfields arrive as strings on current API versions and as
// integers on older ones.
pub(crate) fn permissions_bits<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Bits {
        Int(u64),
        Str(String),
    }
    match Bits::deserialize(deserializer)? {
        Bits::Int(v) => Ok(v),
        Bits::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_permissions_string_or_int() {
        let role: Role =
            serde_json::from_str(r#"{"id":"1","name":"admin","permissions":"104324161"}"#).unwrap();
        assert_eq!(role.permissions, 104324161);

        let role: Role =
            serde_json::from_str(r#"{"id":"2","name":"old","permissions":2048}"#).unwrap();
        assert_eq!(role.permissions, 2048);
    }

    #[test]
    fn test_role_defaults() {
        let role: Role = serde_json::from_str(r#"{"id":"3","name":"plain"}"#).unwrap();
        assert_eq!(role.color, 0);
        assert!(!role.hoist);
        assert_eq!(role.position, 0);
    }
}
