//! Command records, acknowledgments and disruptive actions
//!
//! Commands arrive from the poll endpoint or the realtime push path in the
//! same JSON shape. Validation happens here, before anything is dispatched.

use core::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ValidationError;
use crate::protocol::InboundMessage;
use crate::types::Timestamp;

/// Table carrying device commands
pub const COMMANDS_TABLE: &str = "commands";

/// Status of a command that has not been handled yet
pub const PENDING_STATUS: &str = "pending";

// ----------------------------------------------------------------------------
// Command Record
// ----------------------------------------------------------------------------

/// A validated command addressed to this device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub id: String,
    pub command: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub created_at: String,
}

impl CommandRecord {
    /// Validate and normalize a record
    ///
    /// The id is trimmed and must be at least `min_id_len` characters; the
    /// command name must be non-empty. A missing payload becomes `{}`.
    pub fn validate(mut self, min_id_len: usize) -> Result<Self, ValidationError> {
        self.id = self.id.trim().to_string();
        self.command = self.command.trim().to_string();
        if self.id.is_empty() {
            return Err(ValidationError::EmptyId);
        }
        if self.id.chars().count() < min_id_len {
            return Err(ValidationError::IdTooShort {
                id: self.id,
                min: min_id_len,
            });
        }
        if self.command.is_empty() {
            return Err(ValidationError::EmptyCommand { id: self.id });
        }
        if self.payload.is_null() {
            self.payload = Value::Object(Default::default());
        }
        Ok(self)
    }

    /// Build and validate a record from command-shaped JSON
    pub fn from_json(value: &Value, min_id_len: usize) -> Result<Self, ValidationError> {
        let obj = value.as_object().ok_or(ValidationError::NotAnObject)?;
        let text = |key: &str| obj.get(key).and_then(Value::as_str).unwrap_or("").to_string();
        Self {
            id: text("id"),
            command: text("command"),
            payload: obj.get("payload").cloned().unwrap_or(Value::Null),
            created_at: text("created_at"),
        }
        .validate(min_id_len)
    }
}

/// What a realtime message means for the command pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum PushedCommand {
    /// Not a command insert
    NotACommand,
    /// A command row that is no longer pending
    NotPending { id: String, status: String },
    /// A command row that failed validation
    Invalid(ValidationError),
    /// A pending, valid command
    Command(CommandRecord),
}

impl PushedCommand {
    /// Extract a command from a `commands` INSERT, whether pushed as a row
    /// change or as a broadcast
    pub fn from_message(message: &InboundMessage, min_id_len: usize) -> Self {
        if message.table != COMMANDS_TABLE || message.event != "INSERT" {
            return Self::NotACommand;
        }
        let Some(record) = message.record() else {
            return Self::NotACommand;
        };
        let command = match CommandRecord::from_json(record, min_id_len) {
            Ok(command) => command,
            Err(e) => return Self::Invalid(e),
        };
        let status = record.get("status").and_then(Value::as_str).unwrap_or("");
        if status != PENDING_STATUS {
            return Self::NotPending {
                id: command.id,
                status: status.to_string(),
            };
        }
        Self::Command(command)
    }
}

// ----------------------------------------------------------------------------
// Acknowledgments
// ----------------------------------------------------------------------------

/// Acknowledgment waiting to be delivered to the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAck {
    pub id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub response: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl PendingAck {
    pub fn success(id: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: true,
            response: response.into(),
            error: String::new(),
        }
    }

    pub fn failure(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: false,
            response: String::new(),
            error: error.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Pending Actions
// ----------------------------------------------------------------------------

/// Disruptive actions deferred until memory is safe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    Reboot,
    FactoryReset,
}

impl ActionKind {
    /// Map a command name to the action it requests
    pub fn from_command(command: &str) -> Option<Self> {
        match command {
            "reboot" => Some(Self::Reboot),
            "factory_reset" => Some(Self::FactoryReset),
            _ => None,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reboot => f.write_str("reboot"),
            Self::FactoryReset => f.write_str("factory reset"),
        }
    }
}

/// The disruptive action currently waiting to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction {
    pub kind: ActionKind,
    pub id: String,
    pub requested_at: Timestamp,
}

/// Outcome of asking to queue an action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueOutcome {
    Queued,
    /// Same id already pending
    AlreadyQueued,
    /// A different action is pending
    Rejected { pending_id: String },
}

/// Single-slot holder for the pending action
#[derive(Debug, Clone, Default)]
pub struct ActionSlot {
    pending: Option<PendingAction>,
}

impl ActionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Option<&PendingAction> {
        self.pending.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_none()
    }

    pub fn queue(&mut self, kind: ActionKind, id: &str, now: Timestamp) -> QueueOutcome {
        match &self.pending {
            Some(existing) if existing.id == id => QueueOutcome::AlreadyQueued,
            Some(existing) => QueueOutcome::Rejected {
                pending_id: existing.id.clone(),
            },
            None => {
                self.pending = Some(PendingAction {
                    kind,
                    id: id.to_string(),
                    requested_at: now,
                });
                QueueOutcome::Queued
            }
        }
    }

    pub fn take(&mut self) -> Option<PendingAction> {
        self.pending.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(table: &str, event: &str, record: Value) -> InboundMessage {
        InboundMessage {
            topic: "realtime:device:x".into(),
            event: event.into(),
            table: table.into(),
            schema: "display".into(),
            payload: json!({ "record": record }),
        }
    }

    #[test]
    fn validation_trims_and_enforces_lengths() {
        let record = CommandRecord::from_json(&json!({"id": "  cmd-00000001 ", "command": "reboot"}), 8).unwrap();
        assert_eq!(record.id, "cmd-00000001");
        assert_eq!(record.payload, json!({}));

        assert_eq!(
            CommandRecord::from_json(&json!({"id": "   ", "command": "x"}), 8),
            Err(ValidationError::EmptyId)
        );
        assert!(matches!(
            CommandRecord::from_json(&json!({"id": "short", "command": "x"}), 8),
            Err(ValidationError::IdTooShort { .. })
        ));
        assert!(matches!(
            CommandRecord::from_json(&json!({"id": "cmd-00000001", "command": ""}), 8),
            Err(ValidationError::EmptyCommand { .. })
        ));
        assert_eq!(CommandRecord::from_json(&json!([1]), 8), Err(ValidationError::NotAnObject));
    }

    #[test]
    fn pushed_command_requires_pending_status() {
        let pending = message(
            "commands",
            "INSERT",
            json!({"id": "cmd-00000001", "command": "set_brightness", "status": "pending"}),
        );
        assert!(matches!(
            PushedCommand::from_message(&pending, 8),
            PushedCommand::Command(ref c) if c.command == "set_brightness"
        ));

        let acked = message(
            "commands",
            "INSERT",
            json!({"id": "cmd-00000001", "command": "reboot", "status": "acked"}),
        );
        assert_eq!(
            PushedCommand::from_message(&acked, 8),
            PushedCommand::NotPending {
                id: "cmd-00000001".into(),
                status: "acked".into()
            }
        );

        let update = message("commands", "UPDATE", json!({"id": "cmd-00000001"}));
        assert_eq!(PushedCommand::from_message(&update, 8), PushedCommand::NotACommand);
    }

    #[test]
    fn action_slot_holds_one_action() {
        let mut slot = ActionSlot::new();
        let now = Timestamp::from_secs(1);

        assert_eq!(slot.queue(ActionKind::Reboot, "cmd-00000001", now), QueueOutcome::Queued);
        assert_eq!(slot.queue(ActionKind::Reboot, "cmd-00000001", now), QueueOutcome::AlreadyQueued);
        assert_eq!(
            slot.queue(ActionKind::FactoryReset, "cmd-00000002", now),
            QueueOutcome::Rejected {
                pending_id: "cmd-00000001".into()
            }
        );
        assert_eq!(slot.pending().unwrap().kind, ActionKind::Reboot);
        assert!(slot.take().is_some());
        assert!(slot.is_empty());
    }
}
