//! Credential token wrapper
//!
//! The token must never appear in logged frame dumps. `Debug` prints a
//! fixed sentinel, so a token can only leak through `expose()`.

use std::fmt;

/// Authentication token for the gateway and REST API
///
/// Bot tokens are normalized to carry the `Bot ` prefix exactly once.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    secret: String,
    bot: bool,
}

impl Token {
    /// Wrap a bot token, adding the `Bot ` prefix if absent
    #[must_use]
    pub fn bot(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let secret = if raw.starts_with("Bot ") {
            raw
        } else {
            format!("Bot {raw}")
        };
        Self { secret, bot: true }
    }

    /// Wrap a user token verbatim
    #[must_use]
    pub fn user(raw: impl Into<String>) -> Self {
        Self {
            secret: raw.into(),
            bot: false,
        }
    }

    /// Whether this is a bot credential
    #[inline]
    #[must_use]
    pub fn is_bot(&self) -> bool {
        self.bot
    }

    /// Read the secret for transmission
    ///
    /// Call sites are the IDENTIFY/RESUME builders and the REST
    /// `Authorization` header; nothing else should touch this.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bot_prefix_normalized() {
        assert_eq!(Token::bot("abc").expose(), "Bot abc");
        assert_eq!(Token::bot("Bot abc").expose(), "Bot abc");
        assert!(Token::bot("abc").is_bot());
    }

    #[test]
    fn test_user_token_verbatim() {
        let token = Token::user("raw-user-token");
        assert_eq!(token.expose(), "raw-user-token");
        assert!(!token.is_bot());
    }

    #[test]
    fn test_debug_redacts() {
        let token = Token::bot("super-secret");
        let dump = format!("{token:?}");
        assert!(!dump.contains("super-secret"));
        assert!(dump.contains("redacted"));
    }
}
