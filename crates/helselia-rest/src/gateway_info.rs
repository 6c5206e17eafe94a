//! Gateway bootstrap probe types
//!
//! `GET /gateway/bot` returns the WebSocket URL, the recommended shard
//! count, and the identify budget the shard manager's connect queue
//! must honor.

use serde::Deserialize;

/// Identify budget returned by the gateway probe
#[derive(Debug, Clone, Deserialize)]
pub struct SessionStartLimit {
    /// Identifies allowed per rolling window
    pub total: u32,
    /// Identifies left in the current window
    pub remaining: u32,
    /// Milliseconds until the window resets
    pub reset_after: u64,
    /// Concurrent identify lanes (`shard_id % max_concurrency`)
    #[serde(default = "default_concurrency")]
    pub max_concurrency: u32,
}

fn default_concurrency() -> u32 {
    1
}

/// Response of `GET /gateway/bot`
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayInfo {
    /// WebSocket URL to connect shards to
    pub url: String,
    /// Recommended total shard count
    #[serde(default = "default_shards")]
    pub shards: u32,
    /// Identify budget
    pub session_start_limit: SessionStartLimit,
}

fn default_shards() -> u32 {
    1
}
