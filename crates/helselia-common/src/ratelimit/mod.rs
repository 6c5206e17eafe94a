//! Rate-limiting fabric
//!
//! Two limiters with different shapes: [`Bucket`] is a token bucket with a
//! reserved priority lane (gateway sends), [`SequentialBucket`] is a serial
//! executor with a transport-reported window (REST routes).

mod bucket;
mod sequential;

pub use bucket::{queue_joint, Bucket};
pub use sequential::{RateInfo, SequentialBucket};
