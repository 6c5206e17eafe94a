//! Gateway wire protocol
//!
//! Opcodes, close codes, the frame envelope, and the typed payloads the
//! shard sends and receives.

mod close_codes;
mod frame;
mod opcodes;
mod payloads;

pub use close_codes::{CloseAction, CloseCode};
pub use frame::GatewayFrame;
pub use opcodes::OpCode;
pub use payloads::{
    redact_token, ClientPresence, HelloPayload, IdentifyPayload, IdentifyProperties, ReadyGuild,
    ReadyPayload, RequestGuildMembersPayload, ResumePayload, UpdateVoiceStatePayload,
};
