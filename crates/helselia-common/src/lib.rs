//! # helselia-common
//!
//! Infrastructure shared by every layer of the client: configuration,
//! telemetry setup, and the rate-limiting fabric (token buckets and the
//! sequential REST bucket).

pub mod config;
pub mod ratelimit;
pub mod telemetry;

pub use config::{ClientOptions, OptionsError, ShardCount};
pub use ratelimit::{queue_joint, Bucket, RateInfo, SequentialBucket};
pub use telemetry::{init_tracing, try_init_tracing, TracingConfig};
