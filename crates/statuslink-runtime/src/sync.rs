//! Sync orchestrator
//!
//! Picks between push and poll based on how healthy realtime is:
//!
//! | Realtime                               | Action                 | Interval |
//! |----------------------------------------|------------------------|----------|
//! | channel subscribed                     | full device state push | 300 s    |
//! | socket seen, but not for > threshold   | poll commands          | 15 s     |
//! | otherwise                              | poll commands          | 10 s     |
//!
//! Telemetry is broadcast on its own timer while a channel is subscribed.

use core::fmt;

use statuslink_core::{ConnectionState, SyncConfig, Timestamp};
use tracing::debug;

/// How the device is currently staying in sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Realtime,
    Stale,
    Polling,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Realtime => f.write_str("realtime"),
            Self::Stale => f.write_str("stale"),
            Self::Polling => f.write_str("polling"),
        }
    }
}

/// Why a due sync was skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    RealtimeConnecting,
    LowMemory,
}

/// What the orchestrator wants done this step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    Idle,
    Skipped(SkipReason),
    /// Push full device state
    FullSync,
    /// Push device state and poll for commands
    Poll(SyncMode),
}

#[derive(Debug, Clone)]
pub struct SyncOrchestrator {
    config: SyncConfig,
    last_sync: Option<Timestamp>,
    last_telemetry: Option<Timestamp>,
    last_socket_seen: Option<Timestamp>,
}

impl SyncOrchestrator {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            last_sync: None,
            last_telemetry: None,
            last_socket_seen: None,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn last_sync(&self) -> Option<Timestamp> {
        self.last_sync
    }

    /// Classify realtime health, remembering when the socket was last up
    pub fn mode(&mut self, now: Timestamp, state: ConnectionState) -> SyncMode {
        if state.is_socket_connected() {
            self.last_socket_seen = Some(now);
        }
        if state.is_subscribed() {
            return SyncMode::Realtime;
        }
        match self.last_socket_seen {
            Some(seen) if now.is_past(seen, self.config.stale_threshold()) => SyncMode::Stale,
            _ => SyncMode::Polling,
        }
    }

    /// Decide whether a sync is due
    ///
    /// The schedule advances whenever a sync comes due, even if it is then
    /// skipped, so a memory shortage does not turn into a request every step.
    pub fn decide(&mut self, now: Timestamp, state: ConnectionState, memory_ok: bool) -> SyncDecision {
        let mode = self.mode(now, state);
        let interval = match mode {
            SyncMode::Realtime => self.config.full_sync_interval(),
            SyncMode::Stale => self.config.stale_poll_interval(),
            SyncMode::Polling => self.config.poll_interval(),
        };
        let due = self.last_sync.map_or(true, |last| now.has_elapsed(last, interval));
        if !due {
            return SyncDecision::Idle;
        }
        self.last_sync = Some(now);

        if state.is_connecting() {
            debug!(mode = %mode, "Sync skipped while realtime connects");
            return SyncDecision::Skipped(SkipReason::RealtimeConnecting);
        }
        if !memory_ok {
            debug!(mode = %mode, "Sync skipped, memory low");
            return SyncDecision::Skipped(SkipReason::LowMemory);
        }
        match mode {
            SyncMode::Realtime => SyncDecision::FullSync,
            mode => SyncDecision::Poll(mode),
        }
    }

    /// Whether a telemetry broadcast is due; records it if so
    pub fn telemetry_due(&mut self, now: Timestamp, state: ConnectionState) -> bool {
        if !state.is_subscribed() {
            return false;
        }
        let due = self
            .last_telemetry
            .map_or(true, |last| now.has_elapsed(last, self.config.telemetry_interval()));
        if due {
            self.last_telemetry = Some(now);
        }
        due
    }
}
