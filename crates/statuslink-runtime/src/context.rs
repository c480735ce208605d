//! Sync context: one cooperative step of the whole sync core
//!
//! All state lives in a single [`SyncContext`] owned by the main loop. Each
//! [`tick`](SyncContext::tick) runs, in order: a requested resubscribe, the
//! reconnection watchdog, the sync schedule, the realtime poll, command intake
//! from realtime messages, queued acks, and finally the pending action.
//! Results for the application leave through a bounded [`AppEvent`] queue.

use serde_json::json;
use statuslink_core::command::COMMANDS_TABLE;
use statuslink_core::{
    ActionKind, ChannelSpec, CommandRecord, ConnectionState, DeferWindow, Endpoint,
    InboundMessage, MemoryProbe, StatusLinkConfig, TimeSource, Timestamp,
};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::backend::{Backend, DeviceControl};
use crate::commands::{AckDelivery, CommandEnv, CommandProcessor};
use crate::error::Result;
use crate::realtime::{RealtimeClient, RealtimeLink};
use crate::supervisor::{ConnectionSupervisor, SupervisorInputs};
use crate::sync::{SyncDecision, SyncOrchestrator};
use crate::transport::SocketTransport;

/// Event name used for telemetry broadcasts
pub const TELEMETRY_EVENT: &str = "device_state";

// ----------------------------------------------------------------------------
// Application Events
// ----------------------------------------------------------------------------

/// Output of the sync core for the application
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// A validated, non-duplicate command for the application to run
    CommandDispatched(CommandRecord),
    /// A realtime message that was not a command
    MessageReceived(InboundMessage),
    ConnectionChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    /// The pending action ran; on hardware the device is restarting
    ActionExecuted(ActionKind),
}

pub type AppEventReceiver = mpsc::Receiver<AppEvent>;

fn emit(events: &mpsc::Sender<AppEvent>, event: AppEvent) {
    match events.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(event)) => warn!(?event, "App event queue full, dropping event"),
        Err(TrySendError::Closed(_)) => debug!("App event receiver closed"),
    }
}

// ----------------------------------------------------------------------------
// Sync Context
// ----------------------------------------------------------------------------

pub struct SyncContext<T, B, D, M>
where
    T: SocketTransport,
    B: Backend,
    D: DeviceControl,
    M: MemoryProbe,
{
    realtime: RealtimeClient<T>,
    supervisor: ConnectionSupervisor,
    orchestrator: SyncOrchestrator,
    commands: CommandProcessor,
    backend: B,
    device: D,
    memory: M,
    defer: DeferWindow,
    telemetry_topic: Option<String>,
    events: mpsc::Sender<AppEvent>,
    resubscribe_requested: bool,
    last_state: ConnectionState,
}

impl<T, B, D, M> SyncContext<T, B, D, M>
where
    T: SocketTransport,
    B: Backend,
    D: DeviceControl,
    M: MemoryProbe,
{
    /// Assemble the sync core
    ///
    /// `channels` are joined on every (re)connect. Telemetry is broadcast on
    /// the first of them.
    pub fn new(
        config: StatusLinkConfig,
        endpoint: Endpoint,
        channels: Vec<ChannelSpec>,
        transport: T,
        backend: B,
        device: D,
        memory: M,
    ) -> Result<(Self, AppEventReceiver)> {
        config.validate()?;
        let (events, receiver) = mpsc::channel(config.sync.app_event_capacity);

        let mut realtime = RealtimeClient::new(config.realtime.clone(), config.heap, transport);
        realtime.set_endpoint(endpoint);
        let telemetry_topic = channels.first().map(|spec| spec.topic.clone());

        let context = Self {
            realtime,
            supervisor: ConnectionSupervisor::new(config.watchdog.clone(), channels),
            orchestrator: SyncOrchestrator::new(config.sync.clone()),
            commands: CommandProcessor::new(config.commands.clone()),
            backend,
            device,
            memory,
            defer: DeferWindow::new(),
            telemetry_topic,
            events,
            resubscribe_requested: false,
            last_state: ConnectionState::Disconnected,
        };
        Ok((context, receiver))
    }

    pub fn realtime(&self) -> &RealtimeClient<T> {
        &self.realtime
    }

    pub fn realtime_mut(&mut self) -> &mut RealtimeClient<T> {
        &mut self.realtime
    }

    pub fn commands(&self) -> &CommandProcessor {
        &self.commands
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    pub fn defer_window(&self) -> DeferWindow {
        self.defer
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.realtime.state()
    }

    /// Drop and rebuild every subscription on the next tick
    pub fn request_resubscribe(&mut self) {
        self.resubscribe_requested = true;
    }

    /// Replace the channel plan; takes effect on the next reconnect
    pub fn set_channels(&mut self, channels: Vec<ChannelSpec>) {
        self.telemetry_topic = channels.first().map(|spec| spec.topic.clone());
        self.supervisor.set_channels(channels);
    }

    /// Report the result of a dispatched command
    pub fn complete_command(&mut self, id: &str, outcome: std::result::Result<String, String>, now: Timestamp) -> AckDelivery {
        let mut env = CommandEnv {
            now,
            memory: &self.memory,
            backend: &mut self.backend,
            realtime: &mut self.realtime,
            defer: &mut self.defer,
        };
        self.commands.complete(id, outcome, &mut env)
    }

    /// Run one step using `clock` for the current time
    pub fn tick_with(&mut self, clock: &dyn TimeSource) {
        self.tick(clock.now());
    }

    /// Run one cooperative step
    pub fn tick(&mut self, now: Timestamp) {
        if self.resubscribe_requested {
            self.resubscribe_requested = false;
            info!("Resubscribe requested, restarting realtime");
            self.realtime.disconnect();
            self.supervisor.request_immediate_attempt();
        }

        self.supervise(now);
        self.sync(now);
        self.realtime.poll(now, &self.memory);
        self.handle_messages(now);
        self.flush(now);

        let state = self.realtime.state();
        if state != self.last_state {
            emit(
                &self.events,
                AppEvent::ConnectionChanged {
                    from: self.last_state,
                    to: state,
                },
            );
            self.last_state = state;
        }
    }

    fn supervise(&mut self, now: Timestamp) {
        let network_ready = self.device.is_network_up() && self.backend.is_authenticated();
        let access_token = self.backend.access_token();
        if let Some(token) = access_token.as_deref() {
            self.realtime.set_access_token(token, now, &self.memory);
        }
        let inputs = SupervisorInputs {
            now,
            memory: &self.memory,
            network_ready,
            request_in_flight: self.backend.is_request_in_flight(),
            access_token,
            defer: self.defer,
        };
        self.supervisor.check(&mut self.realtime, inputs);
    }

    fn sync(&mut self, now: Timestamp) {
        let state = self.realtime.state();
        if self.orchestrator.telemetry_due(now, state) {
            self.broadcast_telemetry(now);
        }

        if !self.device.is_network_up() || !self.backend.is_authenticated() {
            return;
        }
        let memory_ok = self
            .orchestrator
            .config()
            .http_gate
            .passes(self.memory.snapshot());

        match self.orchestrator.decide(now, state, memory_ok) {
            SyncDecision::Idle | SyncDecision::Skipped(_) => {}
            SyncDecision::FullSync => self.post_state(),
            SyncDecision::Poll(mode) => {
                self.post_state();
                if self.backend.is_request_in_flight() {
                    return;
                }
                let limit = self.orchestrator.config().max_commands_per_poll;
                match self.backend.poll_commands(limit) {
                    Ok(rows) => {
                        debug!(mode = %mode, rows = rows.len(), "Polled commands");
                        let mut env = CommandEnv {
                            now,
                            memory: &self.memory,
                            backend: &mut self.backend,
                            realtime: &mut self.realtime,
                            defer: &mut self.defer,
                        };
                        for record in self.commands.ingest_polled(rows, &mut env) {
                            emit(&self.events, AppEvent::CommandDispatched(record));
                        }
                    }
                    Err(e) => warn!(error = %e, "Command poll failed"),
                }
            }
        }
    }

    fn post_state(&mut self) {
        let telemetry = self.device.telemetry();
        if let Err(e) = self.backend.post_device_state(&telemetry) {
            warn!(error = %e, "Device state sync failed");
        }
    }

    fn broadcast_telemetry(&mut self, now: Timestamp) {
        let Some(topic) = self.telemetry_topic.clone() else {
            return;
        };
        let telemetry = self.device.telemetry();
        let payload = match serde_json::to_value(&telemetry) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Telemetry not serializable");
                return;
            }
        };
        let payload = json!({ "state": payload, "uptime_ms": now.as_millis() });
        if let Err(e) = self
            .realtime
            .send_broadcast(&topic, TELEMETRY_EVENT, payload, now, &self.memory)
        {
            debug!(error = %e, "Telemetry broadcast skipped");
        }
    }

    fn handle_messages(&mut self, now: Timestamp) {
        if self.realtime.pending_messages() == 0 {
            return;
        }
        let messages: Vec<InboundMessage> = self.realtime.drain_messages().collect();
        for message in messages {
            let mut env = CommandEnv {
                now,
                memory: &self.memory,
                backend: &mut self.backend,
                realtime: &mut self.realtime,
                defer: &mut self.defer,
            };
            match self.commands.ingest_pushed(&message, &mut env) {
                Some(record) => emit(&self.events, AppEvent::CommandDispatched(record)),
                None if message.table != COMMANDS_TABLE => {
                    emit(&self.events, AppEvent::MessageReceived(message))
                }
                None => {}
            }
        }
    }

    fn flush(&mut self, now: Timestamp) {
        let mut env = CommandEnv {
            now,
            memory: &self.memory,
            backend: &mut self.backend,
            realtime: &mut self.realtime,
            defer: &mut self.defer,
        };
        self.commands.process_pending_acks(&mut env);
        if let Some(kind) = self.commands.process_pending_actions(&mut env, &mut self.device) {
            emit(&self.events, AppEvent::ActionExecuted(kind));
        }
    }
}
