//! Gateway frame envelope
//!
//! Every wire message is `{op, d, s?, t?}`; dispatch frames additionally
//! carry the sequence and event name.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::OpCode;

/// The `{op, d, s, t}` envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayFrame {
    /// Operation code
    pub op: OpCode,

    /// Payload (opcode-dependent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<Value>,

    /// Sequence number (dispatch only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,

    /// Event name (dispatch only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl GatewayFrame {
    /// Build a non-dispatch frame around a payload
    #[must_use]
    pub fn new(op: OpCode, d: Value) -> Self {
        Self {
            op,
            d: Some(d),
            s: None,
            t: None,
        }
    }

    /// Heartbeat frame carrying the last observed sequence (or null)
    #[must_use]
    pub fn heartbeat(sequence: Option<u64>) -> Self {
        Self {
            op: OpCode::Heartbeat,
            d: Some(sequence.map_or(Value::Null, Value::from)),
            s: None,
            t: None,
        }
    }

    /// Serialize to the JSON text form
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON text
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Deserialize from raw bytes (inflated zlib-stream output)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl std::fmt::Display for GatewayFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.t, self.s) {
            (Some(t), Some(s)) => write!(f, "GatewayFrame(op={}, t={t}, s={s})", self.op),
            _ => write!(f, "GatewayFrame(op={})", self.op),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_frame_parses() {
        let frame = GatewayFrame::from_json(
            r#"{"op":0,"t":"MESSAGE_CREATE","s":42,"d":{"id":"1","channel_id":"2"}}"#,
        )
        .unwrap();
        assert_eq!(frame.op, OpCode::Dispatch);
        assert_eq!(frame.s, Some(42));
        assert_eq!(frame.t.as_deref(), Some("MESSAGE_CREATE"));
    }

    #[test]
    fn test_heartbeat_null_and_seq() {
        let json = GatewayFrame::heartbeat(None).to_json().unwrap();
        assert_eq!(json, r#"{"op":1,"d":null}"#);

        let json = GatewayFrame::heartbeat(Some(41)).to_json().unwrap();
        assert_eq!(json, r#"{"op":1,"d":41}"#);
    }

    #[test]
    fn test_optional_fields_omitted() {
        let json = GatewayFrame::new(OpCode::Identify, serde_json::json!({"token": "t"}))
            .to_json()
            .unwrap();
        assert!(!json.contains("\"s\""));
        assert!(!json.contains("\"t\""));
    }

    #[test]
    fn test_roundtrip_via_bytes() {
        let frame = GatewayFrame::new(OpCode::Hello, serde_json::json!({"heartbeat_interval": 41250}));
        let bytes = frame.to_json().unwrap().into_bytes();
        let back = GatewayFrame::from_bytes(&bytes).unwrap();
        assert_eq!(back.op, OpCode::Hello);
    }

    #[test]
    fn test_display() {
        let frame = GatewayFrame::from_json(r#"{"op":0,"t":"READY","s":1,"d":{}}"#).unwrap();
        let shown = format!("{frame}");
        assert!(shown.contains("READY"));
        assert!(shown.contains("s=1"));
    }
}
