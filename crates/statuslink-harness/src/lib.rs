//! StatusLink Harness
//!
//! Deterministic test doubles for the sync core: a scripted socket transport,
//! a manual clock, an adjustable heap, a recording backend and device, plus
//! builders for the frames a realtime server sends.

pub mod collaborators;
pub mod frames;
pub mod mock_transport;

pub use collaborators::{ManualClock, RecordingBackend, RecordingDevice, SimulatedMemory};
pub use mock_transport::{ScriptedTransport, ScriptedTransportConfig, TransportHandle};
