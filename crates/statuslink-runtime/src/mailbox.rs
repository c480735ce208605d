//! Transport-to-loop hand-off
//!
//! Transport callbacks run on whatever thread the socket library uses. They
//! only ever touch a [`TransportSink`]: reassemble fragments, copy complete
//! text frames into a bounded queue and flip a few atomic flags. All protocol
//! work happens later, on the main loop, when it drains the [`Mailbox`].
//!
//! Each connection attempt gets its own generation number. Events tagged with
//! an older generation are dropped at the sink and again when drained, so a
//! late callback from a closed socket cannot disturb the next connection.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use statuslink_core::RealtimeConfig;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::transport::{opcode, DataFrame};

/// Generation value that matches no connection
const RETIRED: u64 = 0;

// ----------------------------------------------------------------------------
// Events and Flags
// ----------------------------------------------------------------------------

/// Lifecycle event reported by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Connected,
    Disconnected,
    Error(String),
}

/// A complete text frame waiting for the main loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    pub generation: u64,
    pub text: String,
}

/// State readable from any thread without locking
#[derive(Debug, Default)]
pub struct SocketFlags {
    connected: AtomicBool,
    subscribed: AtomicBool,
    message_available: AtomicBool,
}

impl SocketFlags {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::Acquire)
    }

    /// At least one frame is queued
    pub fn message_available(&self) -> bool {
        self.message_available.load(Ordering::Acquire)
    }

    pub(crate) fn set_subscribed(&self, subscribed: bool) {
        self.subscribed.store(subscribed, Ordering::Release);
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }
}

// ----------------------------------------------------------------------------
// Shared State
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Reassembly {
    generation: u64,
    opcode: u8,
    expected: usize,
    buffer: Vec<u8>,
}

impl Reassembly {
    fn clear(&mut self) {
        self.expected = 0;
        self.buffer = Vec::new();
    }
}

#[derive(Debug)]
struct Shared {
    frames: mpsc::Sender<InboundFrame>,
    events: mpsc::UnboundedSender<(u64, SocketEvent)>,
    reassembly: Mutex<Reassembly>,
    flags: Arc<SocketFlags>,
    active_generation: AtomicU64,
    dropped_frames: AtomicU64,
    close_logged: AtomicBool,
    rx_buffer_max: usize,
}

// ----------------------------------------------------------------------------
// Transport Sink
// ----------------------------------------------------------------------------

/// Callback side of the mailbox, handed to the transport on connect
#[derive(Debug, Clone)]
pub struct TransportSink {
    shared: Arc<Shared>,
    generation: u64,
}

impl TransportSink {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// False once a newer connection has replaced this one
    pub fn is_current(&self) -> bool {
        self.shared.active_generation.load(Ordering::Acquire) == self.generation
    }

    pub fn on_connected(&self) {
        if !self.is_current() {
            return;
        }
        self.shared.flags.set_connected(true);
        self.shared.close_logged.store(false, Ordering::Release);
        self.push_event(SocketEvent::Connected);
    }

    pub fn on_disconnected(&self) {
        if !self.is_current() {
            return;
        }
        self.shared.flags.set_connected(false);
        self.shared.reassembly.lock().clear();
        self.push_event(SocketEvent::Disconnected);
    }

    pub fn on_error(&self, reason: impl Into<String>) {
        if !self.is_current() {
            return;
        }
        self.push_event(SocketEvent::Error(reason.into()));
    }

    /// Accept a data callback from the transport
    ///
    /// Text messages are reassembled and queued; close frames are logged once
    /// per connection; everything else is discarded.
    pub fn on_data(&self, frame: DataFrame<'_>) {
        if !self.is_current() {
            return;
        }
        match frame.opcode {
            opcode::CLOSE => {
                self.log_close(frame.data);
                return;
            }
            opcode::PING | opcode::PONG => return,
            _ => {}
        }

        if frame.total_len > self.shared.rx_buffer_max {
            warn!(
                len = frame.total_len,
                max = self.shared.rx_buffer_max,
                "Dropping oversized realtime frame"
            );
            self.shared.reassembly.lock().clear();
            return;
        }

        if frame.is_complete() {
            if frame.opcode == opcode::TEXT {
                self.deliver(frame.data.to_vec());
            } else {
                debug!(opcode = frame.opcode, "Ignoring non-text frame");
            }
            return;
        }

        let complete = {
            let mut asm = self.shared.reassembly.lock();
            if frame.offset == 0 {
                asm.generation = self.generation;
                asm.opcode = frame.opcode;
                asm.expected = frame.total_len;
                asm.buffer = Vec::with_capacity(frame.total_len);
            } else if asm.generation != self.generation || asm.buffer.len() != frame.offset {
                warn!(
                    offset = frame.offset,
                    buffered = asm.buffer.len(),
                    "Out-of-sequence fragment, discarding message"
                );
                asm.clear();
                return;
            }
            asm.buffer.extend_from_slice(frame.data);
            if asm.buffer.len() < asm.expected {
                return;
            }
            let kind = asm.opcode;
            let bytes = std::mem::take(&mut asm.buffer);
            asm.clear();
            (kind == opcode::TEXT).then_some(bytes)
        };

        if let Some(bytes) = complete {
            self.deliver(bytes);
        }
    }

    fn deliver(&self, bytes: Vec<u8>) {
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(_) => {
                warn!("Dropping realtime frame that is not valid UTF-8");
                return;
            }
        };
        let frame = InboundFrame {
            generation: self.generation,
            text,
        };
        match self.shared.frames.try_send(frame) {
            Ok(()) => self.shared.flags.message_available.store(true, Ordering::Release),
            Err(TrySendError::Full(_)) => {
                let dropped = self.shared.dropped_frames.fetch_add(1, Ordering::AcqRel) + 1;
                warn!(dropped, "Realtime mailbox full, dropping newest frame");
            }
            Err(TrySendError::Closed(_)) => debug!("Mailbox closed, frame discarded"),
        }
    }

    fn log_close(&self, data: &[u8]) {
        if self.shared.close_logged.swap(true, Ordering::AcqRel) {
            return;
        }
        if data.len() >= 2 {
            let code = u16::from_be_bytes([data[0], data[1]]);
            let reason = String::from_utf8_lossy(&data[2..]);
            info!(code, reason = %reason, "Realtime socket close frame received");
        } else {
            info!("Realtime socket close frame received");
        }
    }

    fn push_event(&self, event: SocketEvent) {
        if self.shared.events.send((self.generation, event)).is_err() {
            debug!("Mailbox closed, socket event discarded");
        }
    }
}

// ----------------------------------------------------------------------------
// Mailbox
// ----------------------------------------------------------------------------

/// Main-loop side of the hand-off
#[derive(Debug)]
pub struct Mailbox {
    shared: Arc<Shared>,
    frames: mpsc::Receiver<InboundFrame>,
    events: mpsc::UnboundedReceiver<(u64, SocketEvent)>,
}

impl Mailbox {
    pub fn new(config: &RealtimeConfig) -> Self {
        let (frames_tx, frames) = mpsc::channel(config.mailbox_capacity.max(1));
        let (events_tx, events) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            frames: frames_tx,
            events: events_tx,
            reassembly: Mutex::new(Reassembly::default()),
            flags: Arc::new(SocketFlags::default()),
            active_generation: AtomicU64::new(RETIRED),
            dropped_frames: AtomicU64::new(0),
            close_logged: AtomicBool::new(false),
            rx_buffer_max: config.rx_buffer_max,
        });
        Self {
            shared,
            frames,
            events,
        }
    }

    /// Create the sink for a new connection, retiring every older one
    pub fn sink(&self, generation: u64) -> TransportSink {
        self.shared.active_generation.store(generation, Ordering::Release);
        self.shared.flags.set_connected(false);
        self.shared.close_logged.store(false, Ordering::Release);
        self.shared.reassembly.lock().clear();
        TransportSink {
            shared: Arc::clone(&self.shared),
            generation,
        }
    }

    /// Stop accepting callbacks from any existing sink
    pub fn retire(&self) {
        self.shared.active_generation.store(RETIRED, Ordering::Release);
        self.shared.flags.set_connected(false);
        self.shared.flags.set_subscribed(false);
    }

    pub fn next_event(&mut self) -> Option<(u64, SocketEvent)> {
        self.events.try_recv().ok()
    }

    pub fn next_frame(&mut self) -> Option<InboundFrame> {
        let frame = self.frames.try_recv().ok();
        if frame.is_none() {
            self.shared.flags.message_available.store(false, Ordering::Release);
        }
        frame
    }

    /// Thread-safe view of the connection flags
    pub fn flags(&self) -> Arc<SocketFlags> {
        Arc::clone(&self.shared.flags)
    }

    /// Frames discarded because the mailbox was full
    pub fn dropped_frames(&self) -> u64 {
        self.shared.dropped_frames.load(Ordering::Acquire)
    }
}
