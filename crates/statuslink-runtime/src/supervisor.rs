//! Connection supervisor
//!
//! Drives the reconnection watchdog: tracks how long realtime has been
//! unhealthy and, when [`should_reconnect`] allows it, starts a fresh socket
//! and subscribes the configured channels.

use statuslink_core::{
    should_reconnect, ChannelSpec, DeferWindow, Liveness, LivenessTimer, MemoryProbe,
    ReconnectCheck, Timestamp, WatchdogConfig,
};
use tracing::{debug, info, warn};

use crate::error::{BackendError, Result, RuntimeError};
use crate::realtime::RealtimeClient;
use crate::transport::SocketTransport;

/// Inputs sampled by the caller for one supervision step
pub struct SupervisorInputs<'a> {
    pub now: Timestamp,
    pub memory: &'a dyn MemoryProbe,
    /// WiFi up and backend authenticated
    pub network_ready: bool,
    pub request_in_flight: bool,
    pub access_token: Option<String>,
    pub defer: DeferWindow,
}

/// Result of a supervision step that attempted a reconnect
#[derive(Debug)]
pub enum AttemptOutcome {
    Started { channels: usize },
    Failed(RuntimeError),
}

// ----------------------------------------------------------------------------
// Connection Supervisor
// ----------------------------------------------------------------------------

pub struct ConnectionSupervisor {
    config: WatchdogConfig,
    channels: Vec<ChannelSpec>,
    liveness: LivenessTimer,
    last_attempt: Option<Timestamp>,
}

impl ConnectionSupervisor {
    pub fn new(config: WatchdogConfig, channels: Vec<ChannelSpec>) -> Self {
        Self {
            liveness: LivenessTimer::new(&config),
            config,
            channels,
            last_attempt: None,
        }
    }

    pub fn channels(&self) -> &[ChannelSpec] {
        &self.channels
    }

    pub fn set_channels(&mut self, channels: Vec<ChannelSpec>) {
        self.channels = channels;
    }

    pub fn last_attempt(&self) -> Option<Timestamp> {
        self.last_attempt
    }

    /// Allow the next check to reconnect without waiting out the interval
    pub fn request_immediate_attempt(&mut self) {
        self.last_attempt = None;
    }

    /// Evaluate the connection and reconnect if allowed
    pub fn check<T: SocketTransport>(
        &mut self,
        realtime: &mut RealtimeClient<T>,
        inputs: SupervisorInputs<'_>,
    ) -> Option<AttemptOutcome> {
        let state = realtime.state();
        if let Liveness::Stale { stale_for_ms, .. } =
            self.liveness
                .update(&self.config, inputs.now, state.is_subscribed(), inputs.network_ready)
        {
            debug!(stale_for_ms, state = %state, "Realtime unhealthy");
        }

        let check = ReconnectCheck {
            now: inputs.now,
            last_attempt: self.last_attempt,
            has_ever_connected: realtime.has_ever_connected(),
            state,
            request_in_flight: inputs.request_in_flight,
            defer: inputs.defer,
            network_ready: inputs.network_ready,
        };
        if !should_reconnect(&self.config, &check) {
            return None;
        }

        self.last_attempt = Some(inputs.now);
        let outcome = match self.attempt(realtime, &inputs) {
            Ok(channels) => AttemptOutcome::Started { channels },
            Err(e) => {
                warn!(error = %e, "Realtime reconnect attempt failed");
                AttemptOutcome::Failed(e)
            }
        };
        Some(outcome)
    }

    fn attempt<T: SocketTransport>(
        &self,
        realtime: &mut RealtimeClient<T>,
        inputs: &SupervisorInputs<'_>,
    ) -> Result<usize> {
        let token = inputs
            .access_token
            .as_deref()
            .ok_or(RuntimeError::Backend(BackendError::NotAuthenticated))?;
        info!(
            ever_connected = realtime.has_ever_connected(),
            channels = self.channels.len(),
            "Starting realtime reconnect"
        );
        realtime.set_access_token(token, inputs.now, inputs.memory);
        realtime.begin(inputs.now, inputs.memory)?;

        let mut subscribed = 0;
        for spec in &self.channels {
            match realtime.subscribe(spec.clone(), inputs.now, inputs.memory) {
                Ok(()) => subscribed += 1,
                Err(e) => warn!(topic = %spec.topic, error = %e, "Channel subscribe failed"),
            }
        }
        Ok(subscribed)
    }
}
