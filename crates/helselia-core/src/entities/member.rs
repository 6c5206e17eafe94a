//! Guild member entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::{Presence, User};
use crate::value_objects::Snowflake;

/// A user's membership in one guild
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub user: User,
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub roles: Vec<Snowflake>,
    #[serde(default)]
    pub joined_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub mute: bool,
    #[serde(default)]
    pub deaf: bool,
    /// Filled from presence events and member-chunk presence lists;
    /// not part of the member wire object itself.
    #[serde(skip)]
    pub presence: Option<Presence>,
}

impl Member {
    /// The member's user id
    #[inline]
    #[must_use]
    pub fn id(&self) -> Snowflake {
        self.user.id
    }

    /// Display name: nickname if set, else username
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.nick.as_deref().unwrap_or(&self.user.username)
    }

    /// Overwrite the mutable membership fields from a fresh wire object,
    /// keeping locally-attached presence.
    pub fn update_from(&mut self, other: Member) {
        let presence = self.presence.take();
        *self = other;
        self.presence = presence;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(nick: Option<&str>) -> Member {
        Member {
            user: User {
                id: Snowflake::new(1),
                username: "nelly".into(),
                discriminator: None,
                avatar: None,
                bot: false,
            },
            nick: nick.map(String::from),
            roles: vec![],
            joined_at: None,
            mute: false,
            deaf: false,
            presence: None,
        }
    }

    #[test]
    fn test_display_name_prefers_nick() {
        assert_eq!(member(Some("nels")).display_name(), "nels");
        assert_eq!(member(None).display_name(), "nelly");
    }

    #[test]
    fn test_update_keeps_presence() {
        let mut m = member(None);
        m.presence = Some(Presence {
            user_id: Snowflake::new(1),
            status: crate::entities::Status::Online,
            activity: None,
        });

        m.update_from(member(Some("renamed")));
        assert_eq!(m.nick.as_deref(), Some("renamed"));
        assert!(m.presence.is_some());
    }
}
