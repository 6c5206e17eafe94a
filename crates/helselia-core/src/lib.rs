//! # helselia-core
//!
//! Domain layer for the Helselia client: value objects (snowflakes,
//! intents, tokens), the cached entity model, and the shared cache store.
//! This crate performs no I/O.

pub mod cache;
pub mod entities;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use cache::CacheStore;
pub use entities::{
    Activity, Channel, ChannelType, Emoji, Guild, Member, Message, MessagePatch, Presence, Role,
    Status, User, VoiceState,
};
pub use value_objects::{Intents, Snowflake, SnowflakeParseError, Token};
