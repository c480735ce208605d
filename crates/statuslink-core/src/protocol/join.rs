//! Channel join payloads and topic naming

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::errors::ConfigError;
use crate::protocol::wire::TOPIC_PREFIX;

// ----------------------------------------------------------------------------
// Join Configuration
// ----------------------------------------------------------------------------

/// One `postgres_changes` filter in a join request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostgresChangeFilter {
    #[serde(default = "PostgresChangeFilter::any_event")]
    pub event: String,
    pub schema: String,
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl PostgresChangeFilter {
    fn any_event() -> String {
        "*".to_string()
    }

    /// Every change on `schema.table`
    pub fn table(schema: &str, table: &str) -> Self {
        Self {
            event: Self::any_event(),
            schema: schema.to_string(),
            table: table.to_string(),
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

/// What a channel asks for when it joins
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinConfig {
    pub postgres_changes: Vec<PostgresChangeFilter>,
    /// Private channels are authorized with the access token
    pub private: bool,
    /// Echo our own broadcasts back to us
    pub broadcast_self: bool,
    pub presence_key: String,
}

impl JoinConfig {
    /// Broadcast-only channel
    pub fn broadcast(private: bool) -> Self {
        Self {
            private,
            ..Self::default()
        }
    }

    /// Channel subscribed to row changes
    pub fn postgres(filters: Vec<PostgresChangeFilter>) -> Self {
        Self {
            postgres_changes: filters,
            ..Self::default()
        }
    }

    /// Build the `phx_join` payload
    pub fn payload(&self, access_token: &str) -> Value {
        let changes: Vec<Value> = self
            .postgres_changes
            .iter()
            .map(|f| {
                let mut entry = json!({
                    "event": f.event,
                    "schema": f.schema,
                    "table": f.table,
                });
                if let (Some(filter), Some(obj)) = (&f.filter, entry.as_object_mut()) {
                    obj.insert("filter".into(), Value::String(filter.clone()));
                }
                entry
            })
            .collect();

        let mut config = Map::new();
        config.insert("broadcast".into(), json!({ "self": self.broadcast_self }));
        config.insert("presence".into(), json!({ "key": self.presence_key }));
        config.insert("postgres_changes".into(), Value::Array(changes));
        if self.private {
            config.insert("private".into(), Value::Bool(true));
        }

        let mut payload = Map::new();
        payload.insert("config".into(), Value::Object(config));
        if !access_token.is_empty() {
            payload.insert("access_token".into(), Value::String(access_token.to_string()));
        }
        Value::Object(payload)
    }
}

/// A topic together with how to join it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub topic: String,
    #[serde(flatten)]
    pub join: JoinConfig,
}

impl ChannelSpec {
    pub fn new(topic: &str, join: JoinConfig) -> Self {
        Self {
            topic: topics::qualify(topic),
            join,
        }
    }
}

// ----------------------------------------------------------------------------
// Topics
// ----------------------------------------------------------------------------

pub mod topics {
    use super::*;

    /// Add the `realtime:` prefix if it is missing
    pub fn qualify(topic: &str) -> String {
        if topic.starts_with(TOPIC_PREFIX) {
            topic.to_string()
        } else {
            format!("{TOPIC_PREFIX}{topic}")
        }
    }

    /// Private per-user broadcast channel
    pub fn user(user_id: &str) -> Result<String, ConfigError> {
        Ok(format!("{TOPIC_PREFIX}user:{}", canonical_uuid(user_id)?))
    }

    /// Private per-device broadcast channel
    pub fn device(device_id: &str) -> Result<String, ConfigError> {
        Ok(format!("{TOPIC_PREFIX}device:{}", canonical_uuid(device_id)?))
    }

    fn canonical_uuid(id: &str) -> Result<Uuid, ConfigError> {
        Uuid::parse_str(id.trim()).map_err(|_| ConfigError::InvalidChannelId { id: id.to_string() })
    }
}

// ----------------------------------------------------------------------------
// Access Tokens
// ----------------------------------------------------------------------------

/// Strip whitespace and an optional `Bearer ` prefix from a JWT
pub fn normalize_jwt(token: &str) -> String {
    let token = token.trim();
    let token = token
        .strip_prefix("Bearer ")
        .or_else(|| token.strip_prefix("bearer "))
        .unwrap_or(token);
    token.trim().to_string()
}
