//! Typed gateway payloads
//!
//! The shapes behind `d` for the opcodes the shard sends, plus the READY
//! payload it consumes. Everything else is demultiplexed straight from
//! `serde_json::Value` in the events module.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use helselia_core::{Activity, Intents, Snowflake, Status, User};

/// Payload for op 10 (Hello)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval: u64,
    /// Gateway server trace, when the server shares it
    #[serde(default)]
    pub _trace: Option<Vec<String>>,
}

/// Client connection properties sent with Identify
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyProperties {
    pub os: String,
    pub browser: String,
    pub device: String,
}

impl Default for IdentifyProperties {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: "helselia-rs".to_string(),
            device: "helselia-rs".to_string(),
        }
    }
}

/// Presence block replicated to every shard and re-sent on Identify
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientPresence {
    pub status: Status,
    #[serde(rename = "game")]
    pub activity: Option<Activity>,
    pub since: Option<u64>,
    pub afk: bool,
}

/// Payload for op 2 (Identify)
#[derive(Debug, Clone, Serialize)]
pub struct IdentifyPayload {
    pub token: String,
    pub properties: IdentifyProperties,
    pub compress: bool,
    pub large_threshold: u16,
    /// `[shard_id, total_shards]`
    pub shard: [u32; 2],
    /// Intent bitmask; absent for sessions using guild subscriptions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intents: Option<Intents>,
    /// Legacy presence/typing subscription flag (no-intents sessions)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guild_subscriptions: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence: Option<ClientPresence>,
}

/// Payload for op 6 (Resume)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumePayload {
    pub token: String,
    pub session_id: String,
    pub seq: u64,
}

/// Payload for op 8 (Request Guild Members)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestGuildMembersPayload {
    /// One guild id, or a batch for no-intents sessions
    pub guild_id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presences: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_ids: Option<Vec<Snowflake>>,
    pub nonce: String,
}

/// Payload for op 4 (Voice State Update)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateVoiceStatePayload {
    pub guild_id: Snowflake,
    pub channel_id: Option<Snowflake>,
    pub self_mute: bool,
    pub self_deaf: bool,
}

/// Guild entry in the READY payload
#[derive(Debug, Clone, Deserialize)]
pub struct ReadyGuild {
    pub id: Snowflake,
    #[serde(default)]
    pub unavailable: bool,
}

/// Payload of the READY dispatch
#[derive(Debug, Clone, Deserialize)]
pub struct ReadyPayload {
    #[serde(rename = "v", default)]
    pub version: u8,
    pub session_id: String,
    pub user: User,
    #[serde(default)]
    pub guilds: Vec<Value>,
    #[serde(default)]
    pub resume_gateway_url: Option<String>,
    #[serde(default)]
    pub _trace: Option<Vec<String>>,
}

/// Replace the `token` field of an outbound payload for debug traces
///
/// The credential must never reach the log stream, even at trace level.
#[must_use]
pub fn redact_token(payload: &Value) -> Value {
    let mut copy = payload.clone();
    if let Some(object) = copy.as_object_mut() {
        if object.contains_key("token") {
            object.insert("token".to_string(), Value::String("<redacted>".to_string()));
        }
    }
    copy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identify_wire_shape() {
        let payload = IdentifyPayload {
            token: "Bot X".into(),
            properties: IdentifyProperties::default(),
            compress: false,
            large_threshold: 250,
            shard: [0, 1],
            intents: Some(Intents::GUILDS | Intents::GUILD_MESSAGES),
            guild_subscriptions: None,
            presence: None,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["token"], "Bot X");
        assert_eq!(json["intents"], 513);
        assert_eq!(json["shard"][0], 0);
        assert_eq!(json["shard"][1], 1);
        assert!(json.get("guild_subscriptions").is_none());
    }

    #[test]
    fn test_identify_without_intents_uses_subscriptions() {
        let payload = IdentifyPayload {
            token: "Bot X".into(),
            properties: IdentifyProperties::default(),
            compress: true,
            large_threshold: 50,
            shard: [2, 4],
            intents: None,
            guild_subscriptions: Some(true),
            presence: None,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("intents").is_none());
        assert_eq!(json["guild_subscriptions"], true);
    }

    #[test]
    fn test_resume_wire_shape() {
        let payload = ResumePayload {
            token: "Bot X".into(),
            session_id: "abc".into(),
            seq: 42,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["session_id"], "abc");
        assert_eq!(json["seq"], 42);
    }

    #[test]
    fn test_ready_parses_minimal() {
        let ready: ReadyPayload = serde_json::from_str(
            r#"{"v":6,"session_id":"s","user":{"id":"1","username":"bot","bot":true},"guilds":[{"id":"2","unavailable":true}]}"#,
        )
        .unwrap();
        assert_eq!(ready.session_id, "s");
        assert_eq!(ready.guilds.len(), 1);
        assert!(ready.resume_gateway_url.is_none());
    }

    #[test]
    fn test_redact_token() {
        let payload = serde_json::json!({"token": "Bot secret", "intents": 513});
        let redacted = redact_token(&payload);
        assert_eq!(redacted["token"], "<redacted>");
        assert_eq!(redacted["intents"], 513);
        // Original untouched.
        assert_eq!(payload["token"], "Bot secret");
    }

    #[test]
    fn test_member_request_single_vs_batch() {
        let single = RequestGuildMembersPayload {
            guild_id: serde_json::json!("123"),
            query: Some(String::new()),
            limit: 0,
            presences: None,
            user_ids: None,
            nonce: "n".into(),
        };
        assert_eq!(serde_json::to_value(&single).unwrap()["guild_id"], "123");

        let batch = RequestGuildMembersPayload {
            guild_id: serde_json::json!(["1", "2"]),
            query: Some(String::new()),
            limit: 0,
            presences: None,
            user_ids: None,
            nonce: "n".into(),
        };
        assert!(serde_json::to_value(&batch).unwrap()["guild_id"].is_array());
    }
}
