//! # helselia-client
//!
//! The façade that ties the core together: resolve the gateway through
//! REST, spawn shards on the manager's connect queue, fan decoded events
//! out to subscribers, and bridge gateway voice events into the voice
//! connection manager.

mod client;
mod error;

pub use client::Client;
pub use error::ClientError;

// The surface consumers compose against.
pub use helselia_common::{ClientOptions, ShardCount};
pub use helselia_core::{CacheStore, Intents, Snowflake, Token};
pub use helselia_gateway::{Event, Shard, ShardManager, ShardStatus};
pub use helselia_voice::{JoinOptions, VoiceConnectionManager, VoiceSession};

/// Result type alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;
