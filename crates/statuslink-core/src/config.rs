//! Centralized Configuration Management
//!
//! Every tunable of the sync core lives here so the runtime, the probe CLI and
//! the tests all agree on the same defaults. Intervals are stored as
//! milliseconds to keep TOML files readable; accessors hand out [`Duration`]s.

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::heap::{HeapBudget, HeapGate};

fn ensure(condition: bool, field: &'static str, reason: &str) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            field,
            reason: reason.to_string(),
        })
    }
}

// ----------------------------------------------------------------------------
// Realtime Client Configuration
// ----------------------------------------------------------------------------

/// Socket, heartbeat and mailbox settings for the realtime client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Interval between protocol heartbeats while connected
    pub heartbeat_interval_ms: u64,
    /// Silence longer than twice this value tears the socket down
    pub heartbeat_timeout_ms: u64,
    /// Give up on a connect attempt that never reports success
    pub connect_timeout_ms: u64,
    /// First reconnect delay after a failure
    pub backoff_min_ms: u64,
    /// Ceiling for the doubling reconnect delay
    pub backoff_max_ms: u64,
    /// Frames buffered between the transport callback and the main loop
    pub mailbox_capacity: usize,
    /// Decoded application messages held until the orchestrator drains them
    pub inbox_capacity: usize,
    /// Maximum concurrent channel sessions
    pub max_channels: usize,
    /// Upper bound on a reassembled frame
    pub rx_buffer_max: usize,
    /// Broadcasts are refused below this much free memory
    pub broadcast_heap_floor: u32,
    /// Minimum spacing between low-memory warnings
    pub low_heap_log_interval_ms: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 60_000,
            connect_timeout_ms: 15_000,
            backoff_min_ms: 1_000,
            backoff_max_ms: 60_000,
            mailbox_capacity: 8,
            inbox_capacity: 16,
            max_channels: 2,
            rx_buffer_max: 65_536,
            broadcast_heap_floor: 20_000,
            low_heap_log_interval_ms: 30_000,
        }
    }
}

impl RealtimeConfig {
    /// Short intervals so tests can walk through timeouts quickly
    pub fn testing() -> Self {
        Self {
            heartbeat_interval_ms: 1_000,
            heartbeat_timeout_ms: 2_000,
            connect_timeout_ms: 1_000,
            backoff_min_ms: 100,
            backoff_max_ms: 1_600,
            ..Self::default()
        }
    }

    /// Smaller buffers for constrained targets
    pub fn low_memory() -> Self {
        Self {
            mailbox_capacity: 4,
            inbox_capacity: 8,
            max_channels: 1,
            rx_buffer_max: 16_384,
            ..Self::default()
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Silence window after which the socket is treated as half-open
    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms.saturating_mul(2))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn low_heap_log_interval(&self) -> Duration {
        Duration::from_millis(self.low_heap_log_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure(self.heartbeat_interval_ms > 0, "heartbeat_interval_ms", "must be positive")?;
        ensure(
            self.heartbeat_timeout_ms >= self.heartbeat_interval_ms,
            "heartbeat_timeout_ms",
            "must not be shorter than the heartbeat interval",
        )?;
        ensure(self.backoff_min_ms > 0, "backoff_min_ms", "must be positive")?;
        ensure(
            self.backoff_max_ms >= self.backoff_min_ms,
            "backoff_max_ms",
            "must be at least backoff_min_ms",
        )?;
        ensure(self.mailbox_capacity >= 4, "mailbox_capacity", "must hold at least 4 frames")?;
        ensure(self.inbox_capacity > 0, "inbox_capacity", "must be positive")?;
        ensure(self.max_channels > 0, "max_channels", "must allow one channel")?;
        ensure(self.rx_buffer_max > 0, "rx_buffer_max", "must be positive")
    }
}

// ----------------------------------------------------------------------------
// Watchdog Configuration
// ----------------------------------------------------------------------------

/// Reconnection watchdog timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// How often the watchdog evaluates the connection
    pub check_interval_ms: u64,
    /// Spacing between reconnect attempts once a socket has connected since boot
    pub steady_reconnect_interval_ms: u64,
    /// Spacing between attempts before the first successful connect
    pub first_connect_interval_ms: u64,
    /// Time without a subscribed channel before warning
    pub staleness_threshold_ms: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: 30_000,
            steady_reconnect_interval_ms: 60_000,
            first_connect_interval_ms: 15_000,
            staleness_threshold_ms: 60_000,
        }
    }
}

impl WatchdogConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    /// Reconnect spacing for the current boot phase
    pub fn reconnect_interval(&self, has_ever_connected: bool) -> Duration {
        if has_ever_connected {
            Duration::from_millis(self.steady_reconnect_interval_ms)
        } else {
            Duration::from_millis(self.first_connect_interval_ms)
        }
    }

    pub fn staleness_threshold(&self) -> Duration {
        Duration::from_millis(self.staleness_threshold_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure(self.check_interval_ms > 0, "check_interval_ms", "must be positive")?;
        ensure(
            self.first_connect_interval_ms <= self.steady_reconnect_interval_ms,
            "first_connect_interval_ms",
            "must not exceed the steady reconnect interval",
        )
    }
}

// ----------------------------------------------------------------------------
// Sync Orchestrator Configuration
// ----------------------------------------------------------------------------

/// Push and poll cadence for the sync orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Telemetry broadcast spacing while a channel is subscribed
    pub telemetry_interval_ms: u64,
    /// Full state push spacing while realtime is healthy
    pub full_sync_interval_ms: u64,
    /// Socket absence after which realtime counts as stale
    pub stale_threshold_ms: u64,
    /// Poll spacing while realtime is stale
    pub stale_poll_interval_ms: u64,
    /// Poll spacing with no realtime at all
    pub poll_interval_ms: u64,
    /// Commands requested per poll
    pub max_commands_per_poll: usize,
    /// Memory required before any HTTP request
    pub http_gate: HeapGate,
    /// Application events buffered for the consumer
    pub app_event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            telemetry_interval_ms: 30_000,
            full_sync_interval_ms: 300_000,
            stale_threshold_ms: 120_000,
            stale_poll_interval_ms: 15_000,
            poll_interval_ms: 10_000,
            max_commands_per_poll: 10,
            http_gate: HeapGate::TLS,
            app_event_capacity: 32,
        }
    }
}

impl SyncConfig {
    pub fn telemetry_interval(&self) -> Duration {
        Duration::from_millis(self.telemetry_interval_ms)
    }

    pub fn full_sync_interval(&self) -> Duration {
        Duration::from_millis(self.full_sync_interval_ms)
    }

    pub fn stale_threshold(&self) -> Duration {
        Duration::from_millis(self.stale_threshold_ms)
    }

    pub fn stale_poll_interval(&self) -> Duration {
        Duration::from_millis(self.stale_poll_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure(self.poll_interval_ms > 0, "poll_interval_ms", "must be positive")?;
        ensure(self.stale_poll_interval_ms > 0, "stale_poll_interval_ms", "must be positive")?;
        ensure(
            self.full_sync_interval_ms >= self.poll_interval_ms,
            "full_sync_interval_ms",
            "must not be shorter than the poll interval",
        )?;
        ensure(self.max_commands_per_poll > 0, "max_commands_per_poll", "must be positive")?;
        ensure(self.app_event_capacity > 0, "app_event_capacity", "must be positive")
    }
}

// ----------------------------------------------------------------------------
// Command Processor Configuration
// ----------------------------------------------------------------------------

/// Bounds and gates for the command pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    /// Command ids remembered for duplicate detection
    pub recency_capacity: usize,
    /// Acknowledgments buffered while the backend is unreachable
    pub ack_capacity: usize,
    /// Realtime stays down this long after a disruptive action is queued
    pub action_defer_ms: u64,
    /// Minimum spacing between "waiting for memory" logs
    pub heap_log_interval_ms: u64,
    /// Memory required before acking or running a pending action
    pub action_gate: HeapGate,
    /// Shortest accepted command id
    pub min_id_len: usize,
    /// Whether `factory_reset` may be triggered remotely
    pub allow_remote_factory_reset: bool,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            recency_capacity: 8,
            ack_capacity: 4,
            action_defer_ms: 60_000,
            heap_log_interval_ms: 10_000,
            action_gate: HeapGate::TLS,
            min_id_len: 8,
            allow_remote_factory_reset: false,
        }
    }
}

impl CommandConfig {
    pub fn action_defer(&self) -> Duration {
        Duration::from_millis(self.action_defer_ms)
    }

    pub fn heap_log_interval(&self) -> Duration {
        Duration::from_millis(self.heap_log_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure(self.recency_capacity > 0, "recency_capacity", "must be positive")?;
        ensure(self.ack_capacity > 0, "ack_capacity", "must be positive")?;
        ensure(self.min_id_len > 0, "min_id_len", "must be positive")
    }
}

// ----------------------------------------------------------------------------
// Unified Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the sync core
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusLinkConfig {
    pub realtime: RealtimeConfig,
    pub heap: HeapBudget,
    pub watchdog: WatchdogConfig,
    pub sync: SyncConfig,
    pub commands: CommandConfig,
}

impl StatusLinkConfig {
    /// Configuration tuned for fast, deterministic tests
    pub fn testing() -> Self {
        Self {
            realtime: RealtimeConfig::testing(),
            ..Self::default()
        }
    }

    /// Configuration for targets with very little free memory
    pub fn low_memory() -> Self {
        Self {
            realtime: RealtimeConfig::low_memory(),
            commands: CommandConfig {
                recency_capacity: 4,
                ack_capacity: 2,
                ..CommandConfig::default()
            },
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.realtime.validate()?;
        self.heap.validate()?;
        self.watchdog.validate()?;
        self.sync.validate()?;
        self.commands.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(StatusLinkConfig::default().validate().is_ok());
        assert!(StatusLinkConfig::testing().validate().is_ok());
        assert!(StatusLinkConfig::low_memory().validate().is_ok());
    }

    #[test]
    fn liveness_timeout_is_twice_heartbeat_timeout() {
        let config = RealtimeConfig::default();
        assert_eq!(config.liveness_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn watchdog_interval_depends_on_boot_phase() {
        let config = WatchdogConfig::default();
        assert_eq!(config.reconnect_interval(false), Duration::from_secs(15));
        assert_eq!(config.reconnect_interval(true), Duration::from_secs(60));
    }

    #[test]
    fn rejects_tiny_mailbox() {
        let config = RealtimeConfig {
            mailbox_capacity: 1,
            ..RealtimeConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "mailbox_capacity", .. })
        ));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: StatusLinkConfig =
            serde_json::from_str(r#"{"realtime":{"heartbeat_interval_ms":5000}}"#).unwrap();
        assert_eq!(config.realtime.heartbeat_interval_ms, 5_000);
        assert_eq!(config.realtime.mailbox_capacity, 8);
        assert_eq!(config.commands.ack_capacity, 4);
    }
}
