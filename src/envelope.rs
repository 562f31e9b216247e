//! Message envelope codec.
//!
//! Every frame on the air is one envelope: a compact JSON document with a
//! `type` tag, a sender-assigned `id`, a `timestamp` in seconds since node
//! boot, and optional `metrics` / `payload` fields that are omitted entirely
//! when unset (never emitted as null). Decoders tolerate unknown extra fields
//! so the two endpoints can evolve independently.
//!
//! [`Envelope`] is the wire-faithful representation; [`Message`] is the closed
//! typed view the rest of the crate works with, validated at decode time.

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Maximum size of an encoded packet in bytes.
///
/// The codec does not truncate: an envelope that serializes past this bound
/// fails loudly with [`CodecError::Oversize`]. Callers keep metrics and
/// payload content small enough to fit.
pub const MAX_PACKET_SIZE: usize = 256;

/// Structured metrics map carried inside DATA/STATUS/PING envelopes.
pub type Metrics = serde_json::Map<String, serde_json::Value>;

/// Wire-level message type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Ping,
    Pong,
    Data,
    Status,
}

impl MessageKind {
    /// PONG is the acknowledgment type; it is never itself acknowledged.
    pub fn is_ack(self) -> bool {
        matches!(self, MessageKind::Pong)
    }

    /// The wire string for this tag.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Ping => "ping",
            MessageKind::Pong => "pong",
            MessageKind::Data => "data",
            MessageKind::Status => "status",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire-faithful message envelope.
///
/// Field names and presence rules match the peer's expectations exactly:
/// `type`, `id` and `timestamp` are always emitted; `metrics` and `payload`
/// only when present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageKind,

    pub id: u32,

    /// Seconds since the sending node booted.
    pub timestamp: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Metrics>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

impl Envelope {
    /// Create an envelope with no optional fields.
    pub fn new(kind: MessageKind, id: u32, timestamp: u64) -> Self {
        Self { kind, id, timestamp, metrics: None, payload: None }
    }

    /// Attach a metrics map.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Attach a short text payload.
    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Serialize to wire bytes, enforcing the packet size bound.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let bytes = serde_json::to_vec(self)
            .map_err(|e| CodecError::malformed(e.to_string()))?;

        if bytes.len() > MAX_PACKET_SIZE {
            return Err(CodecError::Oversize { size: bytes.len(), max: MAX_PACKET_SIZE });
        }

        Ok(bytes)
    }

    /// Parse wire bytes into an envelope.
    ///
    /// Two-stage parse so failures are attributable: bytes that are not a
    /// well-formed document are [`CodecError::Malformed`]; a well-formed
    /// document without a `type` tag is [`CodecError::MissingField`]. Unknown
    /// extra fields are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let value: serde_json::Value = serde_json::from_slice(bytes)
            .map_err(|e| CodecError::malformed(e.to_string()))?;

        if value.get("type").is_none() {
            return Err(CodecError::MissingField { field: "type" });
        }

        serde_json::from_value(value).map_err(|e| CodecError::malformed(e.to_string()))
    }
}

/// Typed view of a decoded message.
///
/// A PONG's `acked_id` is the id of the message it acknowledges, not a fresh
/// id from the sender's counter. DATA always carries a metrics map (possibly
/// empty on the wire).
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Ping { id: u32, timestamp: u64, metrics: Option<Metrics> },
    Pong { acked_id: u32, timestamp: u64, metrics: Option<Metrics> },
    Data { id: u32, timestamp: u64, metrics: Metrics },
    Status { id: u32, timestamp: u64, metrics: Option<Metrics>, text: Option<String> },
}

impl Message {
    /// The message id; for a PONG this is the acknowledged id.
    pub fn id(&self) -> u32 {
        match self {
            Message::Ping { id, .. } => *id,
            Message::Pong { acked_id, .. } => *acked_id,
            Message::Data { id, .. } => *id,
            Message::Status { id, .. } => *id,
        }
    }

    /// The wire tag for this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Ping { .. } => MessageKind::Ping,
            Message::Pong { .. } => MessageKind::Pong,
            Message::Data { .. } => MessageKind::Data,
            Message::Status { .. } => MessageKind::Status,
        }
    }

    /// Sender timestamp, seconds since its boot.
    pub fn timestamp(&self) -> u64 {
        match self {
            Message::Ping { timestamp, .. }
            | Message::Pong { timestamp, .. }
            | Message::Data { timestamp, .. }
            | Message::Status { timestamp, .. } => *timestamp,
        }
    }

    /// The metrics map, if any.
    pub fn metrics(&self) -> Option<&Metrics> {
        match self {
            Message::Ping { metrics, .. }
            | Message::Pong { metrics, .. }
            | Message::Status { metrics, .. } => metrics.as_ref(),
            Message::Data { metrics, .. } => Some(metrics),
        }
    }

    /// Build the typed view of a decoded envelope.
    pub fn from_envelope(env: Envelope) -> Self {
        match env.kind {
            MessageKind::Ping => {
                Message::Ping { id: env.id, timestamp: env.timestamp, metrics: env.metrics }
            }
            MessageKind::Pong => {
                Message::Pong { acked_id: env.id, timestamp: env.timestamp, metrics: env.metrics }
            }
            MessageKind::Data => Message::Data {
                id: env.id,
                timestamp: env.timestamp,
                metrics: env.metrics.unwrap_or_default(),
            },
            MessageKind::Status => Message::Status {
                id: env.id,
                timestamp: env.timestamp,
                metrics: env.metrics,
                text: env.payload,
            },
        }
    }

    /// Lower back to the wire representation.
    pub fn into_envelope(self) -> Envelope {
        match self {
            Message::Ping { id, timestamp, metrics } => {
                Envelope { kind: MessageKind::Ping, id, timestamp, metrics, payload: None }
            }
            Message::Pong { acked_id, timestamp, metrics } => {
                Envelope { kind: MessageKind::Pong, id: acked_id, timestamp, metrics, payload: None }
            }
            Message::Data { id, timestamp, metrics } => Envelope {
                kind: MessageKind::Data,
                id,
                timestamp,
                metrics: Some(metrics),
                payload: None,
            },
            Message::Status { id, timestamp, metrics, text } => {
                Envelope { kind: MessageKind::Status, id, timestamp, metrics, payload: text }
            }
        }
    }

    /// Decode wire bytes straight into the typed view.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Envelope::decode(bytes).map(Message::from_envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_metrics() -> Metrics {
        let mut metrics = Metrics::new();
        metrics.insert("battery".into(), json!(3.82));
        metrics.insert("charging".into(), json!(1));
        metrics.insert("total_packets".into(), json!(42));
        metrics
    }

    #[test]
    fn roundtrip_preserves_all_fields() {
        let env = Envelope::new(MessageKind::Status, 17, 3600)
            .with_metrics(sample_metrics())
            .with_payload("Data sent successfully");

        let bytes = env.encode().expect("should encode");
        let decoded = Envelope::decode(&bytes).expect("should decode");

        assert_eq!(decoded, env);
    }

    #[test]
    fn omitted_fields_are_absent_not_null() {
        let env = Envelope::new(MessageKind::Ping, 1, 0);
        let bytes = env.encode().expect("should encode");
        let text = std::str::from_utf8(&bytes).expect("JSON is UTF-8");

        assert!(!text.contains("metrics"));
        assert!(!text.contains("payload"));
        assert!(!text.contains("null"));
    }

    #[test]
    fn wire_keys_match_peer_expectations() {
        let env = Envelope::new(MessageKind::Data, 3, 120).with_metrics(sample_metrics());
        let bytes = env.encode().expect("should encode");
        let value: serde_json::Value = serde_json::from_slice(&bytes).expect("well-formed");

        assert_eq!(value["type"], json!("data"));
        assert_eq!(value["id"], json!(3));
        assert_eq!(value["timestamp"], json!(120));
        assert!(value["metrics"].is_object());
    }

    #[test]
    fn unknown_extra_fields_are_tolerated() {
        let bytes = br#"{"type":"data","id":9,"timestamp":5,"metrics":{},"firmware":"v2.1","hops":0}"#;
        let msg = Message::decode(bytes).expect("unknown fields must not fail decode");

        assert_eq!(msg.id(), 9);
        assert_eq!(msg.kind(), MessageKind::Data);
    }

    #[test]
    fn missing_type_is_a_distinct_error() {
        let bytes = br#"{"id":1,"timestamp":0}"#;
        let err = Envelope::decode(bytes).unwrap_err();
        assert!(matches!(err, CodecError::MissingField { field: "type" }));
    }

    #[test]
    fn garbage_bytes_are_malformed() {
        let err = Envelope::decode(b"\x00\xffnot json").unwrap_err();
        assert!(matches!(err, CodecError::Malformed { .. }));

        // Well-formed JSON that is not an envelope shape is also malformed
        let err = Envelope::decode(br#"{"type":"warp","id":1,"timestamp":0}"#).unwrap_err();
        assert!(matches!(err, CodecError::Malformed { .. }));
    }

    #[test]
    fn oversize_envelope_fails_loudly() {
        let env = Envelope::new(MessageKind::Status, 1, 0).with_payload("x".repeat(300));
        let err = env.encode().unwrap_err();
        assert!(matches!(err, CodecError::Oversize { max: MAX_PACKET_SIZE, .. }));
    }

    #[test]
    fn pong_view_carries_acked_id() {
        let bytes = Envelope::new(MessageKind::Pong, 55, 10).encode().expect("should encode");
        let msg = Message::decode(&bytes).expect("should decode");

        assert!(matches!(msg, Message::Pong { acked_id: 55, .. }));
        assert_eq!(msg.id(), 55);
    }

    #[test]
    fn data_without_metrics_decodes_to_empty_map() {
        let bytes = br#"{"type":"data","id":2,"timestamp":1}"#;
        match Message::decode(bytes).expect("should decode") {
            Message::Data { metrics, .. } => assert!(metrics.is_empty()),
            other => panic!("expected Data, got {other:?}"),
        }
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn kind_strategy() -> impl Strategy<Value = MessageKind> {
            prop_oneof![
                Just(MessageKind::Ping),
                Just(MessageKind::Pong),
                Just(MessageKind::Data),
                Just(MessageKind::Status),
            ]
        }

        proptest! {
            #[test]
            fn encode_decode_is_identity(
                kind in kind_strategy(),
                id in 1u32..u32::MAX,
                timestamp in 0u64..1_000_000u64,
                payload in proptest::option::of("[a-zA-Z0-9 ]{0,40}"),
                battery in 2.5f64..4.5f64
            ) {
                let mut metrics = Metrics::new();
                metrics.insert("battery".into(), serde_json::json!(battery));

                let mut env = Envelope::new(kind, id, timestamp).with_metrics(metrics);
                env.payload = payload;

                let bytes = env.encode().expect("within size bound");
                let decoded = Envelope::decode(&bytes).expect("roundtrip decode");
                prop_assert_eq!(&decoded, &env);

                // Idempotent under repeated encode/decode
                let again = Envelope::decode(&decoded.encode().expect("encode twice")).expect("decode twice");
                prop_assert_eq!(again, env);
            }

            #[test]
            fn typed_view_is_lossless(
                kind in kind_strategy(),
                id in 1u32..u32::MAX,
                timestamp in 0u64..1_000_000u64
            ) {
                let env = Envelope::new(kind, id, timestamp);
                let msg = Message::from_envelope(env.clone());
                let back = msg.into_envelope();

                prop_assert_eq!(back.kind, env.kind);
                prop_assert_eq!(back.id, env.id);
                prop_assert_eq!(back.timestamp, env.timestamp);
            }
        }
    }
}
