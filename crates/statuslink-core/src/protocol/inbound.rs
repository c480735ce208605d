//! Normalization of application-level realtime messages

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::wire::{events, Envelope};

/// Application event decoded from a `postgres_changes` or `broadcast` frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub topic: String,
    /// `INSERT`/`UPDATE`/`DELETE` for row changes, the operation or event name for broadcasts
    pub event: String,
    pub table: String,
    pub schema: String,
    /// The change data (row changes) or the inner broadcast body
    pub payload: Value,
}

impl InboundMessage {
    /// Normalize an envelope; `None` for events that carry no application data
    pub fn from_envelope(envelope: &Envelope) -> Option<Self> {
        match envelope.event.as_str() {
            events::POSTGRES_CHANGES => Self::from_postgres_change(envelope),
            events::BROADCAST => Some(Self::from_broadcast(envelope)),
            _ => None,
        }
    }

    /// The `record` of a row change or broadcast body
    pub fn record(&self) -> Option<&Value> {
        self.payload.get("record").filter(|r| r.is_object())
    }

    fn from_postgres_change(envelope: &Envelope) -> Option<Self> {
        let payload = &envelope.payload;
        let data = match payload.get("data") {
            Some(Value::Object(_)) => payload.get("data"),
            Some(Value::Array(items)) => items.first().filter(|first| first.is_object()),
            _ if payload.get("schema").is_some_and(Value::is_string)
                || payload.get("table").is_some_and(Value::is_string) =>
            {
                Some(payload)
            }
            _ => None,
        }?;

        Some(Self {
            topic: envelope.topic.clone(),
            event: first_str(data, &["type", "eventType"]).to_string(),
            table: first_str(data, &["table", "relation"]).to_string(),
            schema: first_str(data, &["schema"]).to_string(),
            payload: data.clone(),
        })
    }

    fn from_broadcast(envelope: &Envelope) -> Self {
        let outer = &envelope.payload;
        let body = outer.get("payload").filter(|inner| inner.is_object()).unwrap_or(outer);
        let operation = first_str(body, &["operation"]);
        let event = if operation.is_empty() {
            first_str(outer, &["event"])
        } else {
            operation
        };

        Self {
            topic: envelope.topic.clone(),
            event: event.to_string(),
            table: first_str(body, &["table"]).to_string(),
            schema: first_str(body, &["schema"]).to_string(),
            payload: body.clone(),
        }
    }
}

fn first_str<'a>(value: &'a Value, keys: &[&str]) -> &'a str {
    keys.iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::wire::decode;

    fn normalize(frame: &str) -> Option<InboundMessage> {
        InboundMessage::from_envelope(&decode(frame.as_bytes()).unwrap())
    }

    #[test]
    fn postgres_change_object_data() {
        let msg = normalize(
            r#"{"topic":"realtime:display","event":"postgres_changes","ref":null,
                "payload":{"data":{"type":"INSERT","table":"commands","schema":"display",
                "record":{"id":"cmd-00000001"}}}}"#,
        )
        .unwrap();
        assert_eq!(msg.event, "INSERT");
        assert_eq!(msg.table, "commands");
        assert_eq!(msg.schema, "display");
        assert_eq!(msg.record().unwrap()["id"], "cmd-00000001");
    }

    #[test]
    fn postgres_change_array_uses_first_entry() {
        let msg = normalize(
            r#"{"topic":"t","event":"postgres_changes","ref":"1",
                "payload":{"data":[{"eventType":"UPDATE","relation":"pairings","schema":"display"},{"eventType":"DELETE"}]}}"#,
        )
        .unwrap();
        assert_eq!(msg.event, "UPDATE");
        assert_eq!(msg.table, "pairings");
    }

    #[test]
    fn postgres_change_inline_payload() {
        let msg = normalize(
            r#"{"topic":"t","event":"postgres_changes","ref":"1",
                "payload":{"type":"DELETE","table":"devices","schema":"display"}}"#,
        )
        .unwrap();
        assert_eq!(msg.event, "DELETE");
        assert_eq!(msg.table, "devices");
    }

    #[test]
    fn postgres_change_without_data_is_dropped() {
        assert!(normalize(r#"{"topic":"t","event":"postgres_changes","ref":"1","payload":{"ids":[1]}}"#).is_none());
    }

    #[test]
    fn broadcast_with_table_operation() {
        let msg = normalize(
            r#"{"topic":"realtime:device:x","event":"broadcast","ref":"1",
                "payload":{"event":"command","payload":{"table":"commands","operation":"INSERT",
                "record":{"id":"cmd-00000002","status":"pending"}}}}"#,
        )
        .unwrap();
        assert_eq!(msg.event, "INSERT");
        assert_eq!(msg.table, "commands");
        assert_eq!(msg.record().unwrap()["status"], "pending");
    }

    #[test]
    fn plain_broadcast_keeps_event_name() {
        let msg = normalize(
            r#"{"topic":"t","event":"broadcast","ref":"1","payload":{"event":"ping","payload":{"n":1}}}"#,
        )
        .unwrap();
        assert_eq!(msg.event, "ping");
        assert_eq!(msg.table, "");
        assert_eq!(msg.payload["n"], 1);
    }

    #[test]
    fn control_events_are_not_messages() {
        assert!(normalize(r#"{"topic":"t","event":"phx_reply","ref":"1","payload":{}}"#).is_none());
    }
}
