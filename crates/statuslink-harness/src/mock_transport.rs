//! Scripted Transport for Testing
//!
//! A [`SocketTransport`] that never touches the network. Tests keep a
//! [`TransportHandle`] to play the server: complete or refuse connects, push
//! frames through the sink exactly as a real socket callback would, and read
//! back every frame the client sent.

use std::sync::Arc;

use parking_lot::Mutex;
use statuslink_core::protocol::{decode, Envelope};
use statuslink_runtime::{DataFrame, SocketTransport, TransportError, TransportSink};
use tracing::debug;

// ----------------------------------------------------------------------------
// Scripted Transport Configuration
// ----------------------------------------------------------------------------

/// Behavior switches for [`ScriptedTransport`]
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransportConfig {
    /// Report success as soon as `connect` is called
    pub auto_connect: bool,
    /// Make `connect` return an error
    pub fail_connect: bool,
    /// Make `send_text` return an error
    pub fail_send: bool,
}

impl ScriptedTransportConfig {
    /// Sockets that connect immediately
    pub fn instant() -> Self {
        Self {
            auto_connect: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
struct TransportState {
    config: ScriptedTransportConfig,
    sink: Option<TransportSink>,
    urls: Vec<String>,
    sent: Vec<String>,
    closes: usize,
}

// ----------------------------------------------------------------------------
// Scripted Transport
// ----------------------------------------------------------------------------

/// Transport half given to the client
#[derive(Debug, Clone)]
pub struct ScriptedTransport {
    state: Arc<Mutex<TransportState>>,
}

/// Test half used to script the server side
#[derive(Debug, Clone)]
pub struct TransportHandle {
    state: Arc<Mutex<TransportState>>,
}

impl ScriptedTransport {
    pub fn new(config: ScriptedTransportConfig) -> (Self, TransportHandle) {
        let state = Arc::new(Mutex::new(TransportState {
            config,
            ..TransportState::default()
        }));
        (
            Self {
                state: Arc::clone(&state),
            },
            TransportHandle { state },
        )
    }
}

impl SocketTransport for ScriptedTransport {
    fn connect(&mut self, url: &str, sink: TransportSink) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.urls.push(url.to_string());
        if state.config.fail_connect {
            return Err(TransportError::ConnectionFailed {
                endpoint: url.to_string(),
                reason: "scripted failure".into(),
            });
        }
        if state.config.auto_connect {
            sink.on_connected();
        }
        state.sink = Some(sink);
        Ok(())
    }

    fn send_text(&mut self, frame: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.config.fail_send {
            return Err(TransportError::SendFailed {
                reason: "scripted failure".into(),
            });
        }
        if state.sink.is_none() {
            return Err(TransportError::NotConnected);
        }
        debug!(frame, "Scripted transport send");
        state.sent.push(frame.to_string());
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state.lock();
        state.closes += 1;
        state.sink = None;
    }
}

impl TransportHandle {
    pub fn set_config(&self, config: ScriptedTransportConfig) {
        self.state.lock().config = config;
    }

    fn with_sink(&self, f: impl FnOnce(&TransportSink)) {
        let sink = self.state.lock().sink.clone();
        if let Some(sink) = sink {
            f(&sink);
        }
    }

    /// Complete the pending connect
    pub fn accept(&self) {
        self.with_sink(TransportSink::on_connected);
    }

    /// Drop the connection from the server side
    pub fn drop_connection(&self) {
        let sink = self.state.lock().sink.take();
        if let Some(sink) = sink {
            sink.on_disconnected();
        }
    }

    pub fn fail(&self, reason: &str) {
        self.with_sink(|sink| sink.on_error(reason));
    }

    /// Deliver a complete text frame
    pub fn receive(&self, text: &str) {
        self.with_sink(|sink| sink.on_data(DataFrame::text(text)));
    }

    /// Deliver raw data, for fragments and non-text frames
    pub fn receive_data(&self, frame: DataFrame<'_>) {
        self.with_sink(|sink| sink.on_data(frame));
    }

    /// Sink of the open connection
    pub fn sink(&self) -> Option<TransportSink> {
        self.state.lock().sink.clone()
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().sink.is_some()
    }

    pub fn connect_urls(&self) -> Vec<String> {
        self.state.lock().urls.clone()
    }

    pub fn connect_count(&self) -> usize {
        self.state.lock().urls.len()
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().closes
    }

    pub fn sent(&self) -> Vec<String> {
        self.state.lock().sent.clone()
    }

    /// Sent frames decoded; undecodable frames are skipped
    pub fn sent_envelopes(&self) -> Vec<Envelope> {
        self.state
            .lock()
            .sent
            .iter()
            .filter_map(|frame| decode(frame.as_bytes()).ok())
            .collect()
    }

    /// Sent frames with the given event
    pub fn sent_events(&self, event: &str) -> Vec<Envelope> {
        self.sent_envelopes()
            .into_iter()
            .filter(|envelope| envelope.event == event)
            .collect()
    }

    /// Total bytes handed to the transport
    pub fn bytes_sent(&self) -> usize {
        self.state.lock().sent.iter().map(String::len).sum()
    }

    pub fn clear_sent(&self) {
        self.state.lock().sent.clear();
    }
}
