//! User entity

use serde::{Deserialize, Serialize};

use crate::value_objects::Snowflake;

/// A platform user as delivered by the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Snowflake,
    pub username: String,
    #[serde(default)]
    pub discriminator: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

impl User {
    /// Display tag (`name#discriminator`, or just the name)
    #[must_use]
    pub fn tag(&self) -> String {
        match &self.discriminator {
            Some(d) => format!("{}#{d}", self.username),
            None => self.username.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_deserializes_from_wire() {
        let user: User = serde_json::from_str(
            r#"{"id":"80351110224678912","username":"Nelly","discriminator":"1337","avatar":null,"bot":false}"#,
        )
        .unwrap();
        assert_eq!(user.id, Snowflake::new(80351110224678912));
        assert_eq!(user.tag(), "Nelly#1337");
        assert!(!user.bot);
    }

    #[test]
    fn test_tag_without_discriminator() {
        let user = User {
            id: Snowflake::new(1),
            username: "nelly".into(),
            discriminator: None,
            avatar: None,
            bot: true,
        };
        assert_eq!(user.tag(), "nelly");
    }
}
