//! Deterministic stand-ins for the clock, the allocator, the REST backend and
//! the device. Each is cheaply cloneable and shares state between clones, so a
//! test can hand one copy to the sync core and inspect another.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use statuslink_core::{HeapSnapshot, MemoryProbe, PendingAck, TimeSource, Timestamp};
use statuslink_runtime::{Backend, BackendError, DeviceControl, DeviceTelemetry};

// ----------------------------------------------------------------------------
// Clock
// ----------------------------------------------------------------------------

/// Clock that only moves when told to
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    millis: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance_ms(&self, millis: u64) -> Timestamp {
        Timestamp::from_millis(self.millis.fetch_add(millis, Ordering::AcqRel) + millis)
    }

    pub fn advance_secs(&self, secs: u64) -> Timestamp {
        self.advance_ms(secs * 1_000)
    }

    pub fn set(&self, now: Timestamp) {
        self.millis.store(now.as_millis(), Ordering::Release);
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.millis.load(Ordering::Acquire))
    }
}

// ----------------------------------------------------------------------------
// Memory
// ----------------------------------------------------------------------------

/// Adjustable heap reading
#[derive(Debug, Clone)]
pub struct SimulatedMemory {
    free: Arc<AtomicU32>,
    largest_block: Arc<AtomicU32>,
}

impl SimulatedMemory {
    /// Heap with `free` bytes in a single block
    pub fn new(free: u32) -> Self {
        Self {
            free: Arc::new(AtomicU32::new(free)),
            largest_block: Arc::new(AtomicU32::new(free)),
        }
    }

    /// Plenty of memory for every gate
    pub fn roomy() -> Self {
        Self::new(200_000)
    }

    pub fn set_free(&self, free: u32) {
        self.free.store(free, Ordering::Release);
        self.largest_block.store(free, Ordering::Release);
    }

    pub fn set_fragmented(&self, free: u32, largest_block: u32) {
        self.free.store(free, Ordering::Release);
        self.largest_block.store(largest_block, Ordering::Release);
    }
}

impl MemoryProbe for SimulatedMemory {
    fn snapshot(&self) -> HeapSnapshot {
        HeapSnapshot::new(
            self.free.load(Ordering::Acquire),
            self.largest_block.load(Ordering::Acquire),
        )
    }
}

// ----------------------------------------------------------------------------
// Backend
// ----------------------------------------------------------------------------

#[derive(Debug)]
struct BackendState {
    authenticated: bool,
    in_flight: bool,
    token: Option<String>,
    poll_responses: VecDeque<Vec<Value>>,
    poll_limits: Vec<usize>,
    ack_failures: usize,
    acks: Vec<PendingAck>,
    posts: Vec<DeviceTelemetry>,
}

/// Backend that records every call
#[derive(Debug, Clone)]
pub struct RecordingBackend {
    state: Arc<Mutex<BackendState>>,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingBackend {
    /// Authenticated backend with a test token
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BackendState {
                authenticated: true,
                in_flight: false,
                token: Some("test-jwt".into()),
                poll_responses: VecDeque::new(),
                poll_limits: Vec::new(),
                ack_failures: 0,
                acks: Vec::new(),
                posts: Vec::new(),
            })),
        }
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.state.lock().authenticated = authenticated;
    }

    pub fn set_in_flight(&self, in_flight: bool) {
        self.state.lock().in_flight = in_flight;
    }

    pub fn set_token(&self, token: Option<&str>) {
        self.state.lock().token = token.map(str::to_string);
    }

    /// Rows returned by the next poll
    pub fn queue_poll(&self, rows: Vec<Value>) {
        self.state.lock().poll_responses.push_back(rows);
    }

    /// Fail the next `count` ack calls
    pub fn fail_acks(&self, count: usize) {
        self.state.lock().ack_failures = count;
    }

    pub fn acks(&self) -> Vec<PendingAck> {
        self.state.lock().acks.clone()
    }

    pub fn posts(&self) -> usize {
        self.state.lock().posts.len()
    }

    pub fn polls(&self) -> usize {
        self.state.lock().poll_limits.len()
    }

    pub fn poll_limits(&self) -> Vec<usize> {
        self.state.lock().poll_limits.clone()
    }
}

impl Backend for RecordingBackend {
    fn is_authenticated(&self) -> bool {
        self.state.lock().authenticated
    }

    fn is_request_in_flight(&self) -> bool {
        self.state.lock().in_flight
    }

    fn access_token(&self) -> Option<String> {
        self.state.lock().token.clone()
    }

    fn poll_commands(&mut self, limit: usize) -> Result<Vec<Value>, BackendError> {
        let mut state = self.state.lock();
        if !state.authenticated {
            return Err(BackendError::NotAuthenticated);
        }
        state.poll_limits.push(limit);
        let mut rows = state.poll_responses.pop_front().unwrap_or_default();
        rows.truncate(limit);
        Ok(rows)
    }

    fn ack_command(&mut self, ack: &PendingAck) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        if state.ack_failures > 0 {
            state.ack_failures -= 1;
            return Err(BackendError::Status { status: 503 });
        }
        state.acks.push(ack.clone());
        Ok(())
    }

    fn post_device_state(&mut self, telemetry: &DeviceTelemetry) -> Result<(), BackendError> {
        self.state.lock().posts.push(telemetry.clone());
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Device
// ----------------------------------------------------------------------------

/// Device that counts restarts and resets instead of performing them
#[derive(Debug, Clone)]
pub struct RecordingDevice {
    network_up: Arc<AtomicBool>,
    restarts: Arc<AtomicUsize>,
    factory_resets: Arc<AtomicUsize>,
    memory: SimulatedMemory,
}

impl RecordingDevice {
    /// Device whose telemetry reports free heap from `memory`
    pub fn new(memory: SimulatedMemory) -> Self {
        Self {
            network_up: Arc::new(AtomicBool::new(true)),
            restarts: Arc::new(AtomicUsize::new(0)),
            factory_resets: Arc::new(AtomicUsize::new(0)),
            memory,
        }
    }

    pub fn set_network_up(&self, up: bool) {
        self.network_up.store(up, Ordering::Release);
    }

    pub fn restarts(&self) -> usize {
        self.restarts.load(Ordering::Acquire)
    }

    pub fn factory_resets(&self) -> usize {
        self.factory_resets.load(Ordering::Acquire)
    }
}

impl DeviceControl for RecordingDevice {
    fn is_network_up(&self) -> bool {
        self.network_up.load(Ordering::Acquire)
    }

    fn telemetry(&self) -> DeviceTelemetry {
        DeviceTelemetry {
            rssi: -58,
            free_heap: self.memory.snapshot().free,
            uptime_secs: 0,
            firmware_version: "0.0.0-test".into(),
            temperature: None,
        }
    }

    fn factory_reset(&mut self) {
        self.factory_resets.fetch_add(1, Ordering::AcqRel);
    }

    fn restart(&mut self) {
        self.restarts.fetch_add(1, Ordering::AcqRel);
    }
}
