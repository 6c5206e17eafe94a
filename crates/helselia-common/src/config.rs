//! Client configuration
//!
//! Options recognized by the core; everything defaults to the gateway's
//! recommended behavior for bot accounts.

use std::collections::HashSet;

use helselia_core::Intents;

/// Shard count: fixed, or resolved from the gateway's recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShardCount {
    /// Use the `shards` value returned by the `/gateway/bot` probe
    #[default]
    Auto,
    /// Fixed total shard count
    Fixed(u32),
}

/// Configuration for the client core
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Event families the gateway should deliver
    pub intents: Intents,
    /// Enable zlib transport compression
    pub compress: bool,
    /// Prefer the binary wire encoding where available
    pub binary_encoding: bool,
    /// Guild size above which offline members are not delivered (50-250)
    pub large_threshold: u16,
    /// Request all guild members after ready
    pub get_all_users: bool,
    /// Subscribe to presence/typing when intents are not used
    pub guild_subscriptions: bool,
    /// Reconnect automatically on unclean closes
    pub autoreconnect: bool,
    /// Resume attempts before the session is invalidated
    pub max_resume_attempts: u32,
    /// Reconnect attempts before giving up (`None` = unlimited)
    pub max_reconnect_attempts: Option<u32>,
    /// Backoff policy: `(last_delay_ms, attempts) -> next_delay_ms`
    pub reconnect_delay: fn(u64, u32) -> u64,
    /// Socket open/handshake deadline
    pub connection_timeout_ms: u64,
    /// REST request deadline
    pub request_timeout_ms: u64,
    /// Quiet period after READY before declaring remaining guilds lost
    pub guild_create_timeout_ms: u64,
    /// First shard id this process runs
    pub first_shard_id: u32,
    /// Last shard id this process runs (`None` = `max_shards - 1`)
    pub last_shard_id: Option<u32>,
    /// Total shard count across all processes
    pub max_shards: ShardCount,
    /// DISPATCH frames dropped before demultiplexing
    pub disable_events: HashSet<String>,
    /// Re-establish the bot's voice sessions observed at READY
    pub seed_voice_connections: bool,
}

/// Default backoff: multiply the last delay by a random factor in [1, 3),
/// capped at 30 s. The first attempt always waits 1 s.
fn default_reconnect_delay(last_delay_ms: u64, attempts: u32) -> u64 {
    if attempts == 0 {
        return 1_000;
    }
    let factor = rand::random::<f64>() * 2.0 + 1.0;
    ((last_delay_ms as f64 * factor).round() as u64).min(30_000)
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            intents: Intents::default(),
            compress: false,
            binary_encoding: false,
            large_threshold: 250,
            get_all_users: false,
            guild_subscriptions: true,
            autoreconnect: true,
            max_resume_attempts: 10,
            max_reconnect_attempts: None,
            reconnect_delay: default_reconnect_delay,
            connection_timeout_ms: 30_000,
            request_timeout_ms: 15_000,
            guild_create_timeout_ms: 2_000,
            first_shard_id: 0,
            last_shard_id: None,
            max_shards: ShardCount::Auto,
            disable_events: HashSet::new(),
            seed_voice_connections: false,
        }
    }
}

impl ClientOptions {
    /// Validate option ranges and cross-field consistency
    pub fn validate(&self) -> Result<(), OptionsError> {
        if !(50..=250).contains(&self.large_threshold) {
            return Err(OptionsError::LargeThresholdRange(self.large_threshold));
        }
        if let (Some(last), ShardCount::Fixed(total)) = (self.last_shard_id, self.max_shards) {
            if last >= total {
                return Err(OptionsError::ShardRange { last, total });
            }
        }
        if let Some(last) = self.last_shard_id {
            if self.first_shard_id > last {
                return Err(OptionsError::ShardOrder {
                    first: self.first_shard_id,
                    last,
                });
            }
        }
        Ok(())
    }

    /// Whether an event name is filtered out before demultiplexing
    #[inline]
    #[must_use]
    pub fn event_disabled(&self, name: &str) -> bool {
        self.disable_events.contains(name)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum OptionsError {
    #[error("large_threshold must be within 50-250, got {0}")]
    LargeThresholdRange(u16),

    #[error("last_shard_id {last} must be below max_shards {total}")]
    ShardRange { last: u32, total: u32 },

    #[error("first_shard_id {first} must not exceed last_shard_id {last}")]
    ShardOrder { first: u32, last: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(ClientOptions::default().validate().is_ok());
    }

    #[test]
    fn test_large_threshold_bounds() {
        let mut options = ClientOptions::default();
        options.large_threshold = 49;
        assert!(options.validate().is_err());
        options.large_threshold = 251;
        assert!(options.validate().is_err());
        options.large_threshold = 50;
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_shard_range_consistency() {
        let mut options = ClientOptions::default();
        options.max_shards = ShardCount::Fixed(4);
        options.last_shard_id = Some(4);
        assert!(options.validate().is_err());

        options.last_shard_id = Some(3);
        assert!(options.validate().is_ok());

        options.first_shard_id = 5;
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_default_backoff_bounds() {
        let options = ClientOptions::default();
        assert_eq!((options.reconnect_delay)(0, 0), 1_000);
        for _ in 0..50 {
            let next = (options.reconnect_delay)(1_000, 1);
            assert!((1_000..=3_000).contains(&next), "delay {next} out of range");
        }
        assert_eq!((options.reconnect_delay)(60_000, 5), 30_000);
    }

    #[test]
    fn test_event_disabled() {
        let mut options = ClientOptions::default();
        options.disable_events.insert("TYPING_START".into());
        assert!(options.event_disabled("TYPING_START"));
        assert!(!options.event_disabled("MESSAGE_CREATE"));
    }
}
