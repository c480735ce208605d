//! StatusLink Core
//!
//! I/O-free building blocks for keeping a memory-constrained presence display
//! in sync with its backend over a Phoenix Channels socket: the envelope codec,
//! channel join handshakes, command validation and deduplication, the heap
//! admission policy and the reconnection watchdog's decisions.
//!
//! Everything here takes time and memory readings as arguments, so the
//! stateful runtime can drive it from a single cooperative loop and tests can
//! drive it from a script.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod acks;
pub mod backoff;
pub mod command;
pub mod config;
pub mod errors;
pub mod heap;
pub mod protocol;
pub mod recency;
pub mod throttle;
pub mod types;
pub mod watchdog;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use acks::PendingAckRing;
pub use backoff::{BackoffConfig, ReconnectBackoff};
pub use command::{
    ActionKind, ActionSlot, CommandRecord, PendingAck, PendingAction, PushedCommand, QueueOutcome,
};
pub use config::{CommandConfig, RealtimeConfig, StatusLinkConfig, SyncConfig, WatchdogConfig};
pub use errors::{ConfigError, DecodeError, Result, StatusLinkError, ValidationError};
pub use heap::{HeapBudget, HeapGate, HeapSnapshot, MemoryProbe};
pub use protocol::{
    ChannelSession, ChannelSpec, Endpoint, Envelope, InboundMessage, JoinConfig, JoinOutcome,
    PostgresChangeFilter, RefCounter,
};
pub use recency::RecencyRing;
pub use throttle::LogThrottle;
pub use types::{ConnectionState, TimeSource, Timestamp, UptimeClock};
pub use watchdog::{should_reconnect, DeferWindow, Liveness, LivenessTimer, ReconnectCheck};
