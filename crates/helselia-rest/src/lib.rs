//! # helselia-rest
//!
//! The HTTP side of the client core: a request pipeline that serializes
//! calls per canonical route, honors `x-ratelimit-*` windows and the
//! global lockout, and exposes the `/gateway/bot` probe the shard manager
//! bootstraps from. Resource endpoints (channels, messages, roles, ...)
//! are built on top of [`RequestHandler::request`] by consumers.

mod error;
mod gateway_info;
mod handler;
mod routes;

pub use error::RestError;
pub use gateway_info::{GatewayInfo, SessionStartLimit};
pub use handler::RequestHandler;
pub use routes::canonical_route;

/// Result type alias for REST operations
pub type RestResult<T> = Result<T, RestError>;
