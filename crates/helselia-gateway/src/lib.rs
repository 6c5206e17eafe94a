//! # helselia-gateway
//!
//! The real-time half of the client: one [`Shard`] per gateway WebSocket
//! session (handshake, heartbeat, codec, reconnect policy, event
//! demultiplexing) and the [`ShardManager`] that serializes identifies
//! across shards under the session-start limit.

pub mod codec;
pub mod error;
pub mod events;
pub mod manager;
pub mod protocol;
pub mod shard;

pub use error::GatewayError;
pub use events::Event;
pub use manager::ShardManager;
pub use shard::{Shard, ShardStatus};
