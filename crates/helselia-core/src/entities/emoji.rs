//! Custom emoji entity

use serde::{Deserialize, Serialize};

use crate::value_objects::Snowflake;

/// A guild emoji; unicode emoji in reactions have `id: None`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emoji {
    #[serde(default)]
    pub id: Option<Snowflake>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub animated: bool,
}

impl Emoji {
    /// Reaction identity: custom emoji compare by id, unicode by name
    #[must_use]
    pub fn same_as(&self, other: &Emoji) -> bool {
        match (self.id, other.id) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.name == other.name,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emoji_identity() {
        let custom = |id: u64| Emoji {
            id: Some(Snowflake::new(id)),
            name: Some("blob".into()),
            animated: false,
        };
        let unicode = |name: &str| Emoji {
            id: None,
            name: Some(name.into()),
            animated: false,
        };

        assert!(custom(1).same_as(&custom(1)));
        assert!(!custom(1).same_as(&custom(2)));
        assert!(unicode("🦀").same_as(&unicode("🦀")));
        assert!(!unicode("🦀").same_as(&custom(1)));
    }
}
