//! Server-side frame builders

use serde_json::{json, Value};
use statuslink_core::protocol::{encode, events, Envelope};

/// `phx_reply` to the message with `msg_ref`
pub fn reply(topic: &str, msg_ref: u64, status: &str) -> String {
    encode(
        topic,
        events::REPLY,
        json!({ "status": status, "response": {} }),
        msg_ref,
        None,
    )
}

/// Accept the join carried by `join`
pub fn join_ok(join: &Envelope) -> String {
    reply(&join.topic, join.msg_ref, "ok")
}

/// Refuse the join carried by `join`
pub fn join_error(join: &Envelope, reason: &str) -> String {
    encode(
        &join.topic,
        events::REPLY,
        json!({ "status": "error", "response": { "reason": reason } }),
        join.msg_ref,
        None,
    )
}

/// Heartbeat reply on the `phoenix` topic
pub fn heartbeat_reply(msg_ref: u64) -> String {
    reply("phoenix", msg_ref, "ok")
}

/// A `postgres_changes` INSERT on `table`
pub fn postgres_insert(topic: &str, table: &str, record: Value) -> String {
    encode(
        topic,
        events::POSTGRES_CHANGES,
        json!({
            "data": {
                "type": "INSERT",
                "schema": "public",
                "table": table,
                "record": record,
            },
            "ids": [1],
        }),
        0,
        None,
    )
}

/// A pending command row as inserted by the dashboard
pub fn command_row(id: &str, command: &str) -> Value {
    json!({
        "id": id,
        "command": command,
        "status": "pending",
        "payload": {},
        "created_at": "2026-01-01T00:00:00Z",
    })
}

/// A broadcast event carrying `payload`
pub fn broadcast(topic: &str, event: &str, payload: Value) -> String {
    encode(
        topic,
        events::BROADCAST,
        json!({ "event": event, "payload": payload }),
        0,
        None,
    )
}

/// A `presence_state` snapshot
pub fn presence_state(topic: &str) -> String {
    encode(topic, events::PRESENCE_STATE, json!({}), 0, None)
}

/// Server closes a channel
pub fn channel_close(topic: &str) -> String {
    encode(topic, events::CLOSE, json!({}), 0, None)
}
