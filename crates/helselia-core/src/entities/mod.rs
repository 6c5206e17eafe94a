//! Cached entity model
//!
//! These are the client-side shapes of the platform objects as the gateway
//! delivers them. They deserialize straight off the wire and live in the
//! [`CacheStore`](crate::cache::CacheStore); the event demultiplexer clones
//! them to produce before/after pairs.

mod channel;
mod emoji;
mod guild;
mod member;
mod message;
mod presence;
mod role;
mod user;
mod voice_state;

pub use channel::{Channel, ChannelType};
pub use emoji::Emoji;
pub use guild::Guild;
pub use member::Member;
pub use message::{Message, MessagePatch};
pub use presence::{Activity, Presence, Status};
pub use role::Role;
pub use user::User;
pub use voice_state::VoiceState;
