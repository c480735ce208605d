//! Collaborators owned by the application
//!
//! The sync core never performs HTTP itself and never touches hardware. The
//! application supplies a [`Backend`] for the REST side and a
//! [`DeviceControl`] for restarts, resets and telemetry.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use statuslink_core::PendingAck;

use crate::error::BackendError;

// ----------------------------------------------------------------------------
// Backend
// ----------------------------------------------------------------------------

/// Synchronous REST client shared with the rest of the firmware
pub trait Backend {
    fn is_authenticated(&self) -> bool;

    /// Another request currently owns the TLS stack
    fn is_request_in_flight(&self) -> bool;

    /// Current JWT for the realtime socket, if signed in
    fn access_token(&self) -> Option<String>;

    /// Fetch up to `limit` pending command rows
    fn poll_commands(&mut self, limit: usize) -> Result<Vec<Value>, BackendError>;

    /// Report a command's outcome
    fn ack_command(&mut self, ack: &PendingAck) -> Result<(), BackendError>;

    /// Post a device state snapshot
    fn post_device_state(&mut self, telemetry: &DeviceTelemetry) -> Result<(), BackendError>;
}

// ----------------------------------------------------------------------------
// Device
// ----------------------------------------------------------------------------

/// Device state reported to the backend and broadcast on the device channel
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceTelemetry {
    pub rssi: i32,
    pub free_heap: u32,
    pub uptime_secs: u64,
    pub firmware_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Hardware-facing operations
pub trait DeviceControl {
    /// WiFi is associated
    fn is_network_up(&self) -> bool;

    fn telemetry(&self) -> DeviceTelemetry;

    /// Erase persistent settings
    fn factory_reset(&mut self);

    /// Reboot; on real hardware this does not return
    fn restart(&mut self);
}
