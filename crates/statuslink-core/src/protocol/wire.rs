//! Phoenix Channels envelope codec
//!
//! Two input shapes reach the device. The object form is
//! `{"topic","event","payload","ref","join_ref"}` and the legacy positional
//! form is `[join_ref, ref, topic, event, payload]`. Decoding classifies the
//! frame into a [`WireShape`] first and then normalizes it into a single
//! [`Envelope`]. Only the object form is ever produced.

use serde_json::{Map, Value};

use crate::errors::DecodeError;

/// Topic used for socket-level heartbeats
pub const PHOENIX_TOPIC: &str = "phoenix";

/// Prefix shared by every channel topic on the realtime backend
pub const TOPIC_PREFIX: &str = "realtime:";

/// Event names used on the wire
pub mod events {
    pub const JOIN: &str = "phx_join";
    pub const LEAVE: &str = "phx_leave";
    pub const REPLY: &str = "phx_reply";
    pub const ERROR: &str = "phx_error";
    pub const CLOSE: &str = "phx_close";
    pub const HEARTBEAT: &str = "heartbeat";
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const BROADCAST: &str = "broadcast";
    pub const PRESENCE: &str = "presence";
    pub const PRESENCE_STATE: &str = "presence_state";
    pub const PRESENCE_DIFF: &str = "presence_diff";
    pub const POSTGRES_CHANGES: &str = "postgres_changes";
    pub const SYSTEM: &str = "system";
}

/// Events whose frames carry the channel's `join_ref`
pub fn is_join_scoped(event: &str) -> bool {
    matches!(
        event,
        events::JOIN | events::LEAVE | events::ACCESS_TOKEN | events::BROADCAST | events::PRESENCE
    )
}

// ----------------------------------------------------------------------------
// Envelope
// ----------------------------------------------------------------------------

/// Normalized protocol message
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub join_ref: Option<u64>,
    pub msg_ref: u64,
    pub topic: String,
    pub event: String,
    pub payload: Value,
}

impl Envelope {
    pub fn is_reply(&self) -> bool {
        self.event == events::REPLY
    }

    pub fn is_heartbeat_reply(&self) -> bool {
        self.is_reply() && self.topic == PHOENIX_TOPIC
    }

    /// `status` of a `phx_reply`, `"error"` when absent
    pub fn reply_status(&self) -> &str {
        self.payload
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("error")
    }

    /// Human readable reason from a rejected reply
    pub fn reply_reason(&self) -> Option<&str> {
        self.payload
            .get("response")
            .and_then(|response| response.get("reason"))
            .and_then(Value::as_str)
    }

    /// Re-encode in object form
    pub fn encode(&self) -> String {
        encode(
            &self.topic,
            &self.event,
            self.payload.clone(),
            self.msg_ref,
            self.join_ref,
        )
    }
}

// ----------------------------------------------------------------------------
// Encoding
// ----------------------------------------------------------------------------

/// Encode an object-form envelope
///
/// `ref` is always written as a decimal string. `join_ref` is written only for
/// join-scoped events and only when supplied.
pub fn encode(topic: &str, event: &str, payload: Value, msg_ref: u64, join_ref: Option<u64>) -> String {
    let mut frame = Map::with_capacity(5);
    frame.insert("topic".into(), Value::String(topic.to_string()));
    frame.insert("event".into(), Value::String(event.to_string()));
    frame.insert("payload".into(), payload);
    frame.insert("ref".into(), Value::String(msg_ref.to_string()));
    if let Some(join_ref) = join_ref.filter(|_| is_join_scoped(event)) {
        frame.insert("join_ref".into(), Value::String(join_ref.to_string()));
    }
    Value::Object(frame).to_string()
}

/// Heartbeat frame on the `phoenix` topic
pub fn heartbeat(msg_ref: u64) -> String {
    encode(
        PHOENIX_TOPIC,
        events::HEARTBEAT,
        Value::Object(Map::new()),
        msg_ref,
        None,
    )
}

// ----------------------------------------------------------------------------
// Decoding
// ----------------------------------------------------------------------------

/// The two accepted input shapes
#[derive(Debug, Clone, PartialEq)]
pub enum WireShape {
    Object(Map<String, Value>),
    Positional(Vec<Value>),
}

impl WireShape {
    /// Classify a parsed JSON value
    pub fn classify(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Object(map) => Ok(Self::Object(map)),
            Value::Array(items) if items.len() == 5 => Ok(Self::Positional(items)),
            Value::Array(items) => Err(DecodeError::WrongArity { actual: items.len() }),
            _ => Err(DecodeError::NotAnEnvelope),
        }
    }

    pub fn into_envelope(self) -> Result<Envelope, DecodeError> {
        match self {
            Self::Object(mut map) => {
                let topic = take_string(&mut map, "topic")?;
                let event = take_string(&mut map, "event")?;
                let payload = map.remove("payload").unwrap_or(Value::Null);
                let msg_ref = map.get("ref").map(parse_ref).unwrap_or(0);
                let join_ref = map.get("join_ref").filter(|v| !v.is_null()).map(parse_ref);
                Ok(Envelope {
                    join_ref,
                    msg_ref,
                    topic,
                    event,
                    payload,
                })
            }
            Self::Positional(items) => {
                let mut items = items.into_iter();
                // Null join_ref means no join scope; other non-numeric values read 0
                let join_ref = items.next().filter(|v| !v.is_null()).map(|v| parse_ref(&v));
                let msg_ref = items.next().map(|v| parse_ref(&v)).unwrap_or(0);
                let topic = positional_string(items.next(), "topic")?;
                let event = positional_string(items.next(), "event")?;
                let payload = items.next().unwrap_or(Value::Null);
                Ok(Envelope {
                    join_ref,
                    msg_ref,
                    topic,
                    event,
                    payload,
                })
            }
        }
    }
}

/// Decode either wire shape into an [`Envelope`]
pub fn decode(frame: &[u8]) -> Result<Envelope, DecodeError> {
    let value: Value = serde_json::from_slice(frame).map_err(|e| DecodeError::MalformedJson {
        reason: e.to_string(),
    })?;
    WireShape::classify(value)?.into_envelope()
}

fn take_string(map: &mut Map<String, Value>, field: &'static str) -> Result<String, DecodeError> {
    match map.remove(field) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(DecodeError::InvalidField { field }),
        None => Err(DecodeError::MissingField { field }),
    }
}

fn positional_string(value: Option<Value>, field: &'static str) -> Result<String, DecodeError> {
    match value {
        Some(Value::String(s)) => Ok(s),
        _ => Err(DecodeError::InvalidField { field }),
    }
}

/// Refs arrive as decimal strings or integers; anything else reads as 0
fn parse_ref(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n.as_u64().unwrap_or(0),
        Value::String(s) => leading_digits(s),
        _ => 0,
    }
}

fn leading_digits(s: &str) -> u64 {
    s.trim_start()
        .bytes()
        .take_while(u8::is_ascii_digit)
        .try_fold(0u64, |acc, digit| {
            acc.checked_mul(10)?.checked_add(u64::from(digit - b'0'))
        })
        .unwrap_or(0)
}
