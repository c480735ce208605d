//! Command processor
//!
//! Takes commands from either the poll endpoint or the realtime push path,
//! drops duplicates, dispatches ordinary commands to the application and holds
//! disruptive ones (reboot, factory reset) until memory allows the final
//! acknowledgment to go out.

use serde_json::Value;
use statuslink_core::{
    ActionKind, ActionSlot, CommandConfig, CommandRecord, DeferWindow, InboundMessage, LogThrottle,
    MemoryProbe, PendingAck, PendingAckRing, PendingAction, PushedCommand, QueueOutcome,
    RecencyRing, Timestamp,
};
use tracing::{debug, info, warn};

use crate::backend::{Backend, DeviceControl};
use crate::realtime::RealtimeLink;

/// Collaborators the processor needs for one step
pub struct CommandEnv<'a> {
    pub now: Timestamp,
    pub memory: &'a dyn MemoryProbe,
    pub backend: &'a mut dyn Backend,
    pub realtime: &'a mut dyn RealtimeLink,
    pub defer: &'a mut DeferWindow,
}

/// What happened to an accepted command
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Hand to the application
    Dispatch(CommandRecord),
    /// Seen recently, ignored
    Duplicate,
    /// Held as the pending action
    ActionQueued(ActionKind),
    /// Another action is already pending
    ActionBusy { pending_id: String },
    /// Refused and acknowledged as failed
    Refused,
}

/// How an acknowledgment was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckDelivery {
    Sent,
    Queued,
}

// ----------------------------------------------------------------------------
// Command Processor
// ----------------------------------------------------------------------------

pub struct CommandProcessor {
    config: CommandConfig,
    recent: RecencyRing,
    acks: PendingAckRing,
    action: ActionSlot,
    heap_log: LogThrottle,
}

impl CommandProcessor {
    pub fn new(config: CommandConfig) -> Self {
        Self {
            recent: RecencyRing::new(config.recency_capacity),
            acks: PendingAckRing::new(config.ack_capacity),
            action: ActionSlot::new(),
            heap_log: LogThrottle::new(config.heap_log_interval()),
            config,
        }
    }

    pub fn was_recently_processed(&self, id: &str) -> bool {
        self.recent.contains(id)
    }

    pub fn mark_processed(&mut self, id: &str) {
        self.recent.insert(id);
    }

    pub fn pending_action(&self) -> Option<&PendingAction> {
        self.action.pending()
    }

    pub fn pending_acks(&self) -> &PendingAckRing {
        &self.acks
    }

    // ------------------------------------------------------------------------
    // Intake
    // ------------------------------------------------------------------------

    /// Validate polled rows and return the ones to dispatch
    pub fn ingest_polled(&mut self, rows: Vec<Value>, env: &mut CommandEnv<'_>) -> Vec<CommandRecord> {
        let mut dispatch = Vec::new();
        for row in rows {
            match CommandRecord::from_json(&row, self.config.min_id_len) {
                Ok(record) => {
                    if let Disposition::Dispatch(record) = self.accept(record, env) {
                        dispatch.push(record);
                    }
                }
                Err(e) => warn!(error = %e, "Ignoring invalid polled command"),
            }
        }
        dispatch
    }

    /// Extract a command from a realtime message, if it carries one
    pub fn ingest_pushed(&mut self, message: &InboundMessage, env: &mut CommandEnv<'_>) -> Option<CommandRecord> {
        match PushedCommand::from_message(message, self.config.min_id_len) {
            PushedCommand::NotACommand => None,
            PushedCommand::NotPending { id, status } => {
                debug!(id = %id, status = %status, "Ignoring command that is no longer pending");
                None
            }
            PushedCommand::Invalid(e) => {
                warn!(error = %e, topic = %message.topic, "Ignoring invalid pushed command");
                None
            }
            PushedCommand::Command(record) => match self.accept(record, env) {
                Disposition::Dispatch(record) => Some(record),
                _ => None,
            },
        }
    }

    /// Route a validated command
    pub fn accept(&mut self, record: CommandRecord, env: &mut CommandEnv<'_>) -> Disposition {
        if self.recent.contains(&record.id) {
            debug!(id = %record.id, "Skipping recently processed command");
            return Disposition::Duplicate;
        }

        match ActionKind::from_command(&record.command) {
            Some(ActionKind::FactoryReset) if !self.config.allow_remote_factory_reset => {
                self.mark_processed(&record.id);
                warn!(id = %record.id, "Remote factory reset refused");
                let ack = PendingAck::failure(&record.id, "factory_reset must be performed on the device");
                self.send_or_queue_ack(ack, env);
                Disposition::Refused
            }
            Some(kind) => match self.queue_pending_action(kind, &record.id, env) {
                QueueOutcome::Queued | QueueOutcome::AlreadyQueued => Disposition::ActionQueued(kind),
                QueueOutcome::Rejected { pending_id } => Disposition::ActionBusy { pending_id },
            },
            None => {
                self.mark_processed(&record.id);
                info!(id = %record.id, command = %record.command, "Dispatching command");
                Disposition::Dispatch(record)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Disruptive Actions
    // ------------------------------------------------------------------------

    /// Hold a disruptive action and free the socket's memory for its ack
    ///
    /// Realtime is disconnected right away and kept down for the defer window.
    pub fn queue_pending_action(&mut self, kind: ActionKind, id: &str, env: &mut CommandEnv<'_>) -> QueueOutcome {
        let outcome = self.action.queue(kind, id, env.now);
        match &outcome {
            QueueOutcome::Queued => {
                self.mark_processed(id);
                env.realtime.disconnect();
                env.defer.extend_to(env.now + self.config.action_defer());
                info!(id, action = %kind, "Pending action queued, realtime paused");
            }
            QueueOutcome::AlreadyQueued => debug!(id, "Action already pending"),
            QueueOutcome::Rejected { pending_id } => {
                warn!(id, pending_id = %pending_id, action = %kind, "Another action is pending, ignoring")
            }
        }
        outcome
    }

    /// Run the pending action once its acknowledgment is delivered
    ///
    /// Keeps realtime deferred while waiting. The side effect runs only after
    /// the backend accepted the ack, so a failed ack is retried on a later step
    /// without the action having run. Returns the action that ran.
    pub fn process_pending_actions(
        &mut self,
        env: &mut CommandEnv<'_>,
        device: &mut dyn DeviceControl,
    ) -> Option<ActionKind> {
        let (kind, id, requested_at) = {
            let pending = self.action.pending()?;
            (pending.kind, pending.id.clone(), pending.requested_at)
        };
        env.defer.extend_to(env.now + self.config.action_defer());

        let snapshot = env.memory.snapshot();
        if !self.config.action_gate.passes(snapshot) {
            if self.heap_log.ready(env.now) {
                info!(
                    action = %kind,
                    free = snapshot.free,
                    largest_block = snapshot.largest_block,
                    waiting_ms = env.now.millis_since(requested_at),
                    "Pending action waiting for memory"
                );
            }
            return None;
        }
        if env.backend.is_request_in_flight() {
            return None;
        }

        let response = match kind {
            ActionKind::Reboot => "rebooting",
            ActionKind::FactoryReset => "factory reset started",
        };
        if let Err(e) = env.backend.ack_command(&PendingAck::success(&id, response)) {
            warn!(id = %id, error = %e, "Action ack failed, will retry");
            return None;
        }

        self.action.take();
        self.mark_processed(&id);
        info!(id = %id, action = %kind, "Executing pending action");
        if kind == ActionKind::FactoryReset {
            device.factory_reset();
        }
        device.restart();
        Some(kind)
    }

    // ------------------------------------------------------------------------
    // Acknowledgments
    // ------------------------------------------------------------------------

    /// Report a dispatched command's result
    pub fn complete(&mut self, id: &str, outcome: Result<String, String>, env: &mut CommandEnv<'_>) -> AckDelivery {
        let ack = match outcome {
            Ok(response) => PendingAck::success(id, response),
            Err(error) => PendingAck::failure(id, error),
        };
        self.send_or_queue_ack(ack, env)
    }

    /// Send now if it is safe, otherwise queue for later
    pub fn send_or_queue_ack(&mut self, ack: PendingAck, env: &mut CommandEnv<'_>) -> AckDelivery {
        if self.ack_path_open(env) && !env.backend.is_request_in_flight() {
            match env.backend.ack_command(&ack) {
                Ok(()) => {
                    debug!(id = %ack.id, success = ack.success, "Command acknowledged");
                    return AckDelivery::Sent;
                }
                Err(e) => debug!(id = %ack.id, error = %e, "Ack failed, queueing"),
            }
        }
        self.acks.push(ack);
        AckDelivery::Queued
    }

    /// Flush queued acks in order, stopping at the first failure
    pub fn process_pending_acks(&mut self, env: &mut CommandEnv<'_>) -> usize {
        if self.acks.is_empty() || !self.ack_path_open(env) {
            return 0;
        }
        let mut sent = 0;
        while let Some(ack) = self.acks.front() {
            if env.backend.is_request_in_flight() {
                break;
            }
            match env.backend.ack_command(ack) {
                Ok(()) => {
                    self.acks.pop_front();
                    sent += 1;
                }
                Err(e) => {
                    debug!(error = %e, remaining = self.acks.len(), "Queued ack failed, retrying later");
                    break;
                }
            }
        }
        if sent > 0 {
            info!(sent, remaining = self.acks.len(), "Flushed queued acks");
        }
        sent
    }

    fn ack_path_open(&self, env: &CommandEnv<'_>) -> bool {
        env.backend.is_authenticated()
            && !env.realtime.is_connecting()
            && self.config.action_gate.passes(env.memory.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DeviceTelemetry;
    use crate::error::BackendError;
    use serde_json::json;
    use statuslink_core::{ConnectionState, HeapSnapshot};

    struct Heap(u32);

    impl MemoryProbe for Heap {
        fn snapshot(&self) -> HeapSnapshot {
            HeapSnapshot::contiguous(self.0)
        }
    }

    #[derive(Default)]
    struct FakeBackend {
        acks: Vec<PendingAck>,
        fail_acks: bool,
    }

    impl Backend for FakeBackend {
        fn is_authenticated(&self) -> bool {
            true
        }

        fn is_request_in_flight(&self) -> bool {
            false
        }

        fn access_token(&self) -> Option<String> {
            None
        }

        fn poll_commands(&mut self, _limit: usize) -> Result<Vec<Value>, BackendError> {
            Ok(Vec::new())
        }

        fn ack_command(&mut self, ack: &PendingAck) -> Result<(), BackendError> {
            if self.fail_acks {
                return Err(BackendError::Status { status: 503 });
            }
            self.acks.push(ack.clone());
            Ok(())
        }

        fn post_device_state(&mut self, _telemetry: &DeviceTelemetry) -> Result<(), BackendError> {
            Ok(())
        }
    }

    struct FakeLink {
        state: ConnectionState,
        disconnects: usize,
    }

    impl RealtimeLink for FakeLink {
        fn connection_state(&self) -> ConnectionState {
            self.state
        }

        fn disconnect(&mut self) {
            self.disconnects += 1;
            self.state = ConnectionState::Disconnected;
        }
    }

    #[derive(Default)]
    struct FakeDevice {
        restarts: usize,
        resets: usize,
    }

    impl DeviceControl for FakeDevice {
        fn is_network_up(&self) -> bool {
            true
        }

        fn telemetry(&self) -> DeviceTelemetry {
            DeviceTelemetry::default()
        }

        fn factory_reset(&mut self) {
            self.resets += 1;
        }

        fn restart(&mut self) {
            self.restarts += 1;
        }
    }

    struct Fixture {
        heap: Heap,
        backend: FakeBackend,
        link: FakeLink,
        defer: DeferWindow,
    }

    impl Fixture {
        fn new(free: u32) -> Self {
            Self {
                heap: Heap(free),
                backend: FakeBackend::default(),
                link: FakeLink {
                    state: ConnectionState::ChannelSubscribed,
                    disconnects: 0,
                },
                defer: DeferWindow::new(),
            }
        }

        fn env(&mut self, now: u64) -> CommandEnv<'_> {
            CommandEnv {
                now: Timestamp::from_secs(now),
                memory: &self.heap,
                backend: &mut self.backend,
                realtime: &mut self.link,
                defer: &mut self.defer,
            }
        }
    }

    fn record(id: &str, command: &str) -> CommandRecord {
        CommandRecord {
            id: id.into(),
            command: command.into(),
            payload: json!({}),
            created_at: String::new(),
        }
    }

    #[test]
    fn duplicate_ids_dispatch_once() {
        let mut fx = Fixture::new(100_000);
        let mut processor = CommandProcessor::new(CommandConfig::default());

        let first = processor.accept(record("cmd-00000002", "set_status"), &mut fx.env(1));
        let second = processor.accept(record("cmd-00000002", "set_status"), &mut fx.env(2));

        assert!(matches!(first, Disposition::Dispatch(_)));
        assert_eq!(second, Disposition::Duplicate);
    }

    #[test]
    fn reboot_waits_for_memory_then_acks_before_restart() {
        let mut fx = Fixture::new(30_000);
        let mut device = FakeDevice::default();
        let mut processor = CommandProcessor::new(CommandConfig::default());

        let disposition = processor.accept(record("cmd-00000001", "reboot"), &mut fx.env(10));
        assert_eq!(disposition, Disposition::ActionQueued(ActionKind::Reboot));
        assert_eq!(fx.link.disconnects, 1);
        assert_eq!(fx.defer.until(), Timestamp::from_secs(70));

        assert_eq!(processor.process_pending_actions(&mut fx.env(11), &mut device), None);
        assert!(fx.backend.acks.is_empty());
        assert_eq!(device.restarts, 0);

        fx.heap = Heap(100_000);
        assert_eq!(
            processor.process_pending_actions(&mut fx.env(12), &mut device),
            Some(ActionKind::Reboot)
        );
        assert_eq!(fx.backend.acks[0].id, "cmd-00000001");
        assert!(fx.backend.acks[0].success);
        assert_eq!(device.restarts, 1);
        assert!(processor.pending_action().is_none());
    }

    #[test]
    fn failed_action_ack_does_not_run_action() {
        let mut fx = Fixture::new(100_000);
        fx.backend.fail_acks = true;
        let mut device = FakeDevice::default();
        let mut processor = CommandProcessor::new(CommandConfig::default());

        processor.accept(record("cmd-00000001", "reboot"), &mut fx.env(0));
        assert_eq!(processor.process_pending_actions(&mut fx.env(1), &mut device), None);
        assert_eq!(device.restarts, 0);
        assert!(processor.pending_action().is_some());
    }

    #[test]
    fn second_action_is_busy() {
        let mut fx = Fixture::new(100_000);
        let mut processor = CommandProcessor::new(CommandConfig::default());

        processor.accept(record("cmd-00000001", "reboot"), &mut fx.env(0));
        let second = processor.accept(record("cmd-00000009", "reboot"), &mut fx.env(1));
        assert_eq!(
            second,
            Disposition::ActionBusy {
                pending_id: "cmd-00000001".into()
            }
        );
    }

    #[test]
    fn remote_factory_reset_refused_by_default() {
        let mut fx = Fixture::new(100_000);
        let mut processor = CommandProcessor::new(CommandConfig::default());

        let disposition = processor.accept(record("cmd-00000003", "factory_reset"), &mut fx.env(0));

        assert_eq!(disposition, Disposition::Refused);
        assert!(processor.pending_action().is_none());
        assert!(!fx.backend.acks[0].success);
        assert_eq!(fx.link.disconnects, 0);
    }

    #[test]
    fn acks_queue_while_connecting_and_flush_in_order() {
        let mut fx = Fixture::new(100_000);
        fx.link.state = ConnectionState::Connecting;
        let mut processor = CommandProcessor::new(CommandConfig::default());

        for id in ["cmd-0000000a", "cmd-0000000b"] {
            let delivery = processor.complete(id, Ok("done".into()), &mut fx.env(0));
            assert_eq!(delivery, AckDelivery::Queued);
        }
        assert_eq!(processor.process_pending_acks(&mut fx.env(1)), 0);

        fx.link.state = ConnectionState::ChannelSubscribed;
        assert_eq!(processor.process_pending_acks(&mut fx.env(2)), 2);
        let ids: Vec<_> = fx.backend.acks.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["cmd-0000000a", "cmd-0000000b"]);
        assert!(processor.pending_acks().is_empty());
    }

    #[test]
    fn ack_queue_drops_oldest_when_full() {
        let mut fx = Fixture::new(10_000);
        let mut processor = CommandProcessor::new(CommandConfig::default());

        for i in 0..5 {
            processor.complete(&format!("cmd-0000000{i}"), Err("failed".into()), &mut fx.env(0));
        }
        assert_eq!(processor.pending_acks().len(), 4);
        assert_eq!(processor.pending_acks().dropped(), 1);
        assert_eq!(processor.pending_acks().front().map(|a| a.id.as_str()), Some("cmd-00000001"));
    }

    #[test]
    fn polled_rows_validated_before_dispatch() {
        let mut fx = Fixture::new(100_000);
        let mut processor = CommandProcessor::new(CommandConfig::default());
        let rows = vec![
            json!({"id": "short", "command": "ping"}),
            json!({"id": "cmd-00000004", "command": ""}),
            json!({"id": "cmd-00000005", "command": "ping"}),
            json!("not an object"),
        ];

        let dispatched = processor.ingest_polled(rows, &mut fx.env(0));

        assert_eq!(dispatched.len(), 1);
        assert_eq!(dispatched[0].id, "cmd-00000005");
        assert_eq!(dispatched[0].payload, json!({}));
    }
}
