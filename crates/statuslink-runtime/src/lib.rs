//! StatusLink Runtime
//!
//! The stateful half of the sync core:
//! - `RealtimeClient`: Phoenix Channels socket, heartbeats and channel sessions
//! - `Mailbox`: bounded hand-off from transport callbacks to the main loop
//! - `ConnectionSupervisor`: reconnection watchdog
//! - `SyncOrchestrator`: push/poll scheduling
//! - `CommandProcessor`: command intake, acknowledgments and deferred actions
//! - `SyncContext`: runs all of the above as one cooperative tick
//!
//! `statuslink-core` supplies the I/O-free protocol and policy types. The
//! `websocket` feature adds a tokio-tungstenite transport.

pub mod backend;
pub mod commands;
pub mod context;
pub mod error;
pub mod mailbox;
pub mod realtime;
pub mod supervisor;
pub mod sync;
pub mod transport;

#[cfg(feature = "websocket")]
pub mod ws;

pub use backend::{Backend, DeviceControl, DeviceTelemetry};
pub use commands::{AckDelivery, CommandEnv, CommandProcessor, Disposition};
pub use context::{AppEvent, AppEventReceiver, SyncContext, TELEMETRY_EVENT};
pub use error::{BackendError, GateError, Result, RuntimeError, TransportError};
pub use mailbox::{InboundFrame, Mailbox, SocketEvent, SocketFlags, TransportSink};
pub use realtime::{RealtimeClient, RealtimeLink};
pub use supervisor::{AttemptOutcome, ConnectionSupervisor, SupervisorInputs};
pub use sync::{SkipReason, SyncDecision, SyncMode, SyncOrchestrator};
pub use transport::{opcode, DataFrame, SocketTransport};

#[cfg(feature = "websocket")]
pub use ws::WebSocketTransport;

// Re-export core types for convenience
pub use statuslink_core::{
    ChannelSpec, CommandRecord, ConnectionState, Endpoint, HeapSnapshot, InboundMessage,
    JoinConfig, MemoryProbe, PostgresChangeFilter, StatusLinkConfig, TimeSource, Timestamp,
};
