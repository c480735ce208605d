//! Probe loop
//!
//! Drives a [`RealtimeClient`] over the tokio-tungstenite transport from a
//! fixed-period tick, the same way the device firmware drives it from its
//! main loop, and prints every application message as one JSON line.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use statuslink_core::{
    ConnectionState, HeapSnapshot, MemoryProbe, TimeSource, Timestamp, UptimeClock,
};
use statuslink_runtime::{GateError, RealtimeClient, RealtimeLink, RuntimeError, WebSocketTransport};

use crate::config::ProbeConfig;
use crate::error::Result;

/// Event name used for `--send`
pub const PROBE_EVENT: &str = "probe";

/// Host memory reported to the client's admission gates
#[derive(Debug, Clone, Copy)]
pub struct HostMemory {
    free: u32,
}

impl HostMemory {
    pub fn new(free: u32) -> Self {
        Self { free }
    }
}

impl MemoryProbe for HostMemory {
    fn snapshot(&self) -> HeapSnapshot {
        HeapSnapshot::contiguous(self.free)
    }
}

/// What happened during a run
#[derive(Debug, Default, Clone, Serialize)]
pub struct ProbeSummary {
    pub connected: bool,
    pub messages: u64,
    pub dropped_frames: u64,
    pub broadcast_sent: bool,
}

/// Run until the timeout elapses or Ctrl-C
pub async fn run(config: ProbeConfig, mut outgoing: Option<Value>) -> Result<ProbeSummary> {
    let endpoint = config.endpoint()?;
    let channel = config.channel()?;
    let memory = HostMemory::new(config.probe.host_heap_bytes);
    let clock = UptimeClock::new();
    let deadline = (config.probe.timeout_secs > 0)
        .then(|| Timestamp::ZERO + Duration::from_secs(config.probe.timeout_secs));

    let mut client = RealtimeClient::new(
        config.core.realtime.clone(),
        config.core.heap,
        WebSocketTransport::current(),
    );
    info!("Connecting to {}", endpoint.redacted_url());
    client.set_endpoint(endpoint);
    if let Some(token) = &config.probe.access_token {
        client.set_access_token(token, clock.now(), &memory);
    }

    let mut summary = ProbeSummary::default();
    let mut last_state = ConnectionState::Disconnected;
    let mut interval = tokio::time::interval(Duration::from_millis(config.probe.tick_ms.max(1)));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = &mut shutdown => {
                info!("Interrupted");
                break;
            }
        }
        let now = clock.now();
        if deadline.is_some_and(|d| now >= d) {
            info!("Timeout reached");
            break;
        }

        if !client.state().is_active() {
            match client.begin(now, &memory) {
                Ok(()) => {
                    if client.session(&channel.topic).is_none() {
                        client.subscribe(channel.clone(), now, &memory)?;
                    }
                }
                Err(RuntimeError::Gate(GateError::BackoffActive { .. })) => {}
                Err(e) => warn!(error = %e, "Connect attempt failed"),
            }
        }

        client.poll(now, &memory);

        let state = client.state();
        if state != last_state {
            info!(from = %last_state, to = %state, "Connection state changed");
            last_state = state;
        }

        for message in client.drain_messages() {
            println!("{}", serde_json::to_string(&message)?);
            summary.messages += 1;
        }

        if state.is_subscribed() {
            if let Some(payload) = outgoing.take() {
                match client.send_broadcast(&channel.topic, PROBE_EVENT, payload.clone(), now, &memory) {
                    Ok(()) => {
                        info!(topic = %channel.topic, "Broadcast sent");
                        summary.broadcast_sent = true;
                    }
                    Err(e) => {
                        debug!(error = %e, "Broadcast deferred");
                        outgoing = Some(payload);
                    }
                }
            }
        }
    }

    summary.connected = client.has_ever_connected();
    summary.dropped_frames = client.dropped_frames();
    client.disconnect();
    Ok(summary)
}
