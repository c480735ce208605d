//! Realtime client
//!
//! Owns the socket lifecycle, the channel sessions and the heartbeat. Every
//! method runs on the main loop; transport callbacks only reach it through the
//! [`Mailbox`]. Anything that would allocate for TLS or a frame is checked
//! against the [`HeapBudget`] first.

use std::collections::VecDeque;
use std::sync::Arc;

use serde_json::Value;
use smallvec::SmallVec;
use statuslink_core::protocol::{events, normalize_jwt, topics, wire};
use statuslink_core::{
    BackoffConfig, ChannelSession, ChannelSpec, ConnectionState, Endpoint, Envelope, HeapBudget,
    InboundMessage, JoinOutcome, LogThrottle, MemoryProbe, RealtimeConfig, RefCounter,
    ReconnectBackoff, Timestamp,
};
use tracing::{debug, error, info, warn};

use crate::error::{GateError, Result, RuntimeError};
use crate::mailbox::{Mailbox, SocketEvent, SocketFlags};
use crate::transport::SocketTransport;

type Sessions = SmallVec<[ChannelSession; 2]>;

// ----------------------------------------------------------------------------
// Control Seam
// ----------------------------------------------------------------------------

/// The part of the realtime client other components are allowed to drive
pub trait RealtimeLink {
    fn connection_state(&self) -> ConnectionState;

    /// Close the socket and forget every session
    fn disconnect(&mut self);

    fn is_connecting(&self) -> bool {
        self.connection_state().is_connecting()
    }
}

// ----------------------------------------------------------------------------
// Realtime Client
// ----------------------------------------------------------------------------

/// Phoenix Channels client for a single socket
pub struct RealtimeClient<T: SocketTransport> {
    config: RealtimeConfig,
    budget: HeapBudget,
    transport: T,
    mailbox: Mailbox,
    endpoint: Option<Endpoint>,
    access_token: String,

    state: ConnectionState,
    generation: u64,
    refs: RefCounter,
    sessions: Sessions,
    has_ever_connected: bool,

    backoff: ReconnectBackoff,
    retry_at: Option<Timestamp>,
    connecting_since: Timestamp,
    last_heartbeat: Timestamp,
    last_traffic: Timestamp,

    inbox: VecDeque<InboundMessage>,
    low_heap_log: LogThrottle,
    first_frame_logged: bool,
}

impl<T: SocketTransport> RealtimeClient<T> {
    pub fn new(config: RealtimeConfig, budget: HeapBudget, transport: T) -> Self {
        let mailbox = Mailbox::new(&config);
        let backoff = ReconnectBackoff::new(BackoffConfig::from(&config));
        let low_heap_log = LogThrottle::new(config.low_heap_log_interval());
        Self {
            config,
            budget,
            transport,
            mailbox,
            endpoint: None,
            access_token: String::new(),
            state: ConnectionState::Disconnected,
            generation: 0,
            refs: RefCounter::new(),
            sessions: Sessions::new(),
            has_ever_connected: false,
            backoff,
            retry_at: None,
            connecting_since: Timestamp::ZERO,
            last_heartbeat: Timestamp::ZERO,
            last_traffic: Timestamp::ZERO,
            inbox: VecDeque::new(),
            low_heap_log,
            first_frame_logged: false,
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn has_ever_connected(&self) -> bool {
        self.has_ever_connected
    }

    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    pub fn set_endpoint(&mut self, endpoint: Endpoint) {
        self.endpoint = Some(endpoint);
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn sessions(&self) -> &[ChannelSession] {
        &self.sessions
    }

    pub fn session(&self, topic: &str) -> Option<&ChannelSession> {
        let topic = topics::qualify(topic);
        self.sessions.iter().find(|s| s.topic() == topic)
    }

    /// Flags safe to read from other threads
    pub fn flags(&self) -> Arc<SocketFlags> {
        self.mailbox.flags()
    }

    /// Frames lost to a full mailbox since boot
    pub fn dropped_frames(&self) -> u64 {
        self.mailbox.dropped_frames()
    }

    /// When the backoff next allows a connect, if it is holding one back
    pub fn retry_at(&self) -> Option<Timestamp> {
        self.retry_at
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    // ------------------------------------------------------------------------
    // Connection Lifecycle
    // ------------------------------------------------------------------------

    /// Start a connection attempt
    ///
    /// A no-op unless disconnected. Refused while the reconnect backoff is
    /// running or when free memory is below the budget for this boot phase.
    pub fn begin(&mut self, now: Timestamp, memory: &dyn MemoryProbe) -> Result<()> {
        if self.state != ConnectionState::Disconnected {
            return Ok(());
        }
        let Some(endpoint) = self.endpoint.as_ref() else {
            return Err(RuntimeError::NoEndpoint);
        };
        if let Some(retry_at) = self.retry_at {
            if now < retry_at {
                return Err(GateError::BackoffActive {
                    remaining_ms: retry_at - now,
                }
                .into());
            }
        }
        let url = endpoint.socket_url();
        let redacted = endpoint.redacted_url();
        self.check_heap(now, memory, 0)?;

        self.generation += 1;
        self.state = ConnectionState::Connecting;
        self.connecting_since = now;
        info!(
            url = %redacted,
            attempt = self.backoff.attempt_count() + 1,
            "Connecting realtime socket"
        );

        let sink = self.mailbox.sink(self.generation);
        if let Err(e) = self.transport.connect(&url, sink) {
            warn!(error = %e, "Realtime connect failed to start");
            self.on_socket_lost(now);
            return Err(e.into());
        }
        Ok(())
    }

    /// Drain transport events and keep the connection healthy
    ///
    /// Processes lifecycle events before frames, then enforces the connect
    /// timeout, the liveness window and the heartbeat schedule.
    pub fn poll(&mut self, now: Timestamp, memory: &dyn MemoryProbe) {
        while let Some((generation, event)) = self.mailbox.next_event() {
            if generation != self.generation {
                debug!(generation, current = self.generation, "Ignoring stale socket event");
                continue;
            }
            self.handle_socket_event(event, now, memory);
        }

        while let Some(frame) = self.mailbox.next_frame() {
            if frame.generation != self.generation || !self.state.is_socket_connected() {
                debug!(generation = frame.generation, "Discarding frame from closed connection");
                continue;
            }
            self.handle_frame(&frame.text, now);
        }

        match self.state {
            ConnectionState::Connecting => {
                if now.is_past(self.connecting_since, self.config.connect_timeout()) {
                    warn!(
                        waited_ms = now.millis_since(self.connecting_since),
                        "Realtime connect timed out"
                    );
                    self.abandon_connection(now);
                }
            }
            ConnectionState::SocketConnected | ConnectionState::ChannelSubscribed => {
                if now.is_past(self.last_traffic, self.config.liveness_timeout()) {
                    warn!(
                        silent_ms = now.millis_since(self.last_traffic),
                        "No realtime traffic, forcing disconnect"
                    );
                    self.abandon_connection(now);
                } else if now.has_elapsed(self.last_heartbeat, self.config.heartbeat_interval()) {
                    self.heartbeat(now, memory);
                }
            }
            ConnectionState::Disconnected => {}
        }
    }

    fn handle_socket_event(&mut self, event: SocketEvent, now: Timestamp, memory: &dyn MemoryProbe) {
        match event {
            SocketEvent::Connected => {
                if self.state != ConnectionState::Connecting {
                    debug!(state = %self.state, "Unexpected connect event");
                    return;
                }
                self.state = ConnectionState::SocketConnected;
                self.has_ever_connected = true;
                self.backoff.reset();
                self.retry_at = None;
                self.last_traffic = now;
                self.last_heartbeat = now;
                self.first_frame_logged = false;
                info!("Realtime socket connected");
                self.maintain_sessions(now, memory);
            }
            SocketEvent::Disconnected => {
                if self.state.is_active() {
                    info!(state = %self.state, "Realtime socket disconnected");
                    self.on_socket_lost(now);
                }
            }
            SocketEvent::Error(reason) => {
                if self.state.is_active() {
                    warn!(reason = %reason, "Realtime socket error");
                    self.abandon_connection(now);
                }
            }
        }
    }

    /// Close a connection the client has given up on
    fn abandon_connection(&mut self, now: Timestamp) {
        self.mailbox.retire();
        self.transport.close();
        self.on_socket_lost(now);
    }

    /// Forget everything tied to the lost connection and schedule a retry
    ///
    /// Retiring the mailbox clears the connected and subscribed flags together
    /// and silences the old sink.
    fn on_socket_lost(&mut self, now: Timestamp) {
        self.state = ConnectionState::Disconnected;
        self.mailbox.retire();
        self.refs.reset();
        for session in &mut self.sessions {
            session.reset_connection();
        }
        let delay = self.backoff.next_delay();
        self.retry_at = Some(now + delay);
        debug!(delay_ms = delay.as_millis() as u64, "Reconnect backoff scheduled");
    }

    // ------------------------------------------------------------------------
    // Channels
    // ------------------------------------------------------------------------

    /// Join a channel, or rejoin it with a new configuration
    ///
    /// While the socket is down the join is held and sent once it connects.
    pub fn subscribe(&mut self, spec: ChannelSpec, now: Timestamp, memory: &dyn MemoryProbe) -> Result<()> {
        let topic = topics::qualify(&spec.topic);
        let existing = self.sessions.iter().position(|s| s.topic() == topic);
        if existing.is_none() && self.sessions.len() >= self.config.max_channels {
            return Err(RuntimeError::TooManyChannels {
                max: self.config.max_channels,
            });
        }
        // Refused joins leave every session untouched
        if self.state.is_socket_connected() {
            self.check_heap(now, memory, 0)?;
        }

        let index = match existing {
            Some(index) => {
                self.sessions[index].reconfigure(spec.join);
                index
            }
            None => {
                self.sessions.push(ChannelSession::new(topic, spec.join));
                self.sessions.len() - 1
            }
        };

        self.sessions[index].request_join(&mut self.refs, &self.access_token);
        if self.state.is_socket_connected() {
            self.flush_join(index);
        }
        self.refresh_state();
        Ok(())
    }

    /// Leave a channel and drop its session
    pub fn unsubscribe(&mut self, topic: &str, now: Timestamp, memory: &dyn MemoryProbe) {
        let topic = topics::qualify(topic);
        let Some(index) = self.sessions.iter().position(|s| s.topic() == topic) else {
            return;
        };
        let can_send = self.state.is_socket_connected() && self.check_heap(now, memory, 0).is_ok();
        let mut session = self.sessions.remove(index);
        if let Some(frame) = session.leave(&mut self.refs, can_send) {
            if let Err(e) = self.transport.send_text(&frame) {
                debug!(topic = %topic, error = %e, "Leave frame not sent");
            }
        }
        info!(topic = %topic, "Left channel");
        self.refresh_state();
    }

    /// Broadcast an event on a subscribed channel
    ///
    /// Broadcasts are held to a stricter memory floor than control frames.
    pub fn send_broadcast(
        &mut self,
        topic: &str,
        event: &str,
        payload: Value,
        now: Timestamp,
        memory: &dyn MemoryProbe,
    ) -> Result<()> {
        let topic = topics::qualify(topic);
        let index = self
            .sessions
            .iter()
            .position(|s| s.topic() == topic && s.is_subscribed())
            .ok_or(RuntimeError::NotSubscribed { topic })?;
        self.check_heap(now, memory, self.config.broadcast_heap_floor)?;
        let frame = self.sessions[index].broadcast_frame(&mut self.refs, event, payload);
        self.transport.send_text(&frame)?;
        Ok(())
    }

    /// Replace the access token and push it to joined private channels
    pub fn set_access_token(&mut self, token: &str, now: Timestamp, memory: &dyn MemoryProbe) {
        let token = normalize_jwt(token);
        if token == self.access_token {
            return;
        }
        self.access_token = token;
        debug!("Realtime access token updated");
        if self.state.is_socket_connected() && self.check_heap(now, memory, 0).is_ok() {
            self.send_access_tokens();
        }
    }

    /// Take every decoded application message received so far
    pub fn drain_messages(&mut self) -> impl Iterator<Item = InboundMessage> + '_ {
        self.inbox.drain(..)
    }

    pub fn pending_messages(&self) -> usize {
        self.inbox.len()
    }

    // ------------------------------------------------------------------------
    // Outbound Helpers
    // ------------------------------------------------------------------------

    fn heartbeat(&mut self, now: Timestamp, memory: &dyn MemoryProbe) {
        self.last_heartbeat = now;
        if self.check_heap(now, memory, 0).is_err() {
            return;
        }
        let frame = wire::heartbeat(self.refs.next_ref());
        if let Err(e) = self.transport.send_text(&frame) {
            warn!(error = %e, "Heartbeat send failed");
            return;
        }
        debug!("Heartbeat sent");
        self.send_access_tokens();
        self.maintain_sessions(now, memory);
    }

    /// Send held joins and rejoin channels the server dropped
    fn maintain_sessions(&mut self, now: Timestamp, memory: &dyn MemoryProbe) {
        if !self.sessions.iter().any(|s| s.pending_join().is_some() || s.needs_join()) {
            return;
        }
        if self.check_heap(now, memory, 0).is_err() {
            return;
        }
        for index in 0..self.sessions.len() {
            if self.sessions[index].needs_join() {
                self.sessions[index].request_join(&mut self.refs, &self.access_token);
            }
            self.flush_join(index);
        }
    }

    fn flush_join(&mut self, index: usize) {
        let Some(frame) = self.sessions[index].pending_join().map(str::to_owned) else {
            return;
        };
        match self.transport.send_text(&frame) {
            Ok(()) => {
                self.sessions[index].mark_join_sent();
                debug!(topic = %self.sessions[index].topic(), "Join sent");
            }
            Err(e) => warn!(
                topic = %self.sessions[index].topic(),
                error = %e,
                "Join send failed, will retry"
            ),
        }
    }

    fn send_access_tokens(&mut self) {
        if self.access_token.is_empty() {
            return;
        }
        for index in 0..self.sessions.len() {
            let session = &self.sessions[index];
            if !session.is_private() || !(session.is_subscribed() || session.is_awaiting_reply()) {
                continue;
            }
            let frame = session.access_token_frame(&mut self.refs, &self.access_token);
            if let Err(e) = self.transport.send_text(&frame) {
                debug!(topic = %session.topic(), error = %e, "Access token not sent");
            }
        }
    }

    /// Admission check for anything that allocates on the socket path
    fn check_heap(&mut self, now: Timestamp, memory: &dyn MemoryProbe, floor: u32) -> core::result::Result<(), GateError> {
        let free = memory.snapshot().free;
        let required = self.budget.required(self.has_ever_connected).max(floor);
        if free >= required {
            return Ok(());
        }
        if self.low_heap_log.ready(now) {
            warn!(free, required, "Low memory, deferring realtime work");
        }
        Err(GateError::HeapBelowThreshold { free, required })
    }

    // ------------------------------------------------------------------------
    // Inbound Handling
    // ------------------------------------------------------------------------

    fn handle_frame(&mut self, text: &str, now: Timestamp) {
        if !self.first_frame_logged {
            self.first_frame_logged = true;
            let preview: String = text.chars().take(200).collect();
            debug!(frame = %preview, "First realtime frame on connection");
        }
        let envelope = match wire::decode(text.as_bytes()) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Dropping malformed realtime frame");
                return;
            }
        };
        self.last_traffic = now;
        self.dispatch(envelope);
    }

    fn dispatch(&mut self, envelope: Envelope) {
        if envelope.is_heartbeat_reply() {
            debug!("Heartbeat acknowledged");
            return;
        }
        match envelope.event.as_str() {
            events::REPLY => self.handle_reply(&envelope),
            events::PRESENCE_STATE | events::PRESENCE_DIFF => {
                if let Some(session) = self.session_mut(&envelope.topic) {
                    if session.confirm_by_presence() {
                        self.refresh_state();
                    }
                }
            }
            events::ERROR | events::CLOSE => {
                if let Some(session) = self.session_mut(&envelope.topic) {
                    session.mark_unsubscribed();
                    warn!(topic = %envelope.topic, event = %envelope.event, "Channel closed by server");
                    self.refresh_state();
                }
            }
            events::POSTGRES_CHANGES | events::BROADCAST => match InboundMessage::from_envelope(&envelope) {
                Some(message) => self.push_inbox(message),
                None => warn!(
                    topic = %envelope.topic,
                    event = %envelope.event,
                    "Unrecognized realtime payload"
                ),
            },
            events::SYSTEM => debug!(topic = %envelope.topic, payload = %envelope.payload, "System message"),
            other => debug!(topic = %envelope.topic, event = other, "Ignoring realtime event"),
        }
    }

    fn handle_reply(&mut self, envelope: &Envelope) {
        let Some(session) = self.session_mut(&envelope.topic) else {
            debug!(topic = %envelope.topic, "Reply for unknown topic");
            return;
        };
        match session.on_join_reply(envelope.msg_ref, envelope.reply_status(), envelope.reply_reason()) {
            JoinOutcome::Subscribed => self.refresh_state(),
            JoinOutcome::Rejected {
                status,
                reason,
                first_occurrence,
            } => {
                if first_occurrence {
                    error!(
                        topic = %envelope.topic,
                        status = %status,
                        reason = reason.as_deref().unwrap_or("none"),
                        payload = %envelope.payload,
                        "Channel join rejected"
                    );
                } else {
                    debug!(topic = %envelope.topic, status = %status, "Channel join rejected again");
                }
                self.refresh_state();
            }
            JoinOutcome::StaleRef { .. } | JoinOutcome::Unrelated => {}
        }
    }

    fn push_inbox(&mut self, message: InboundMessage) {
        if self.inbox.len() >= self.config.inbox_capacity {
            self.inbox.pop_front();
            warn!(capacity = self.config.inbox_capacity, "Realtime inbox full, dropping oldest message");
        }
        self.inbox.push_back(message);
    }

    fn session_mut(&mut self, topic: &str) -> Option<&mut ChannelSession> {
        self.sessions.iter_mut().find(|s| s.topic() == topic)
    }

    /// Recompute the socket-level state from the sessions
    fn refresh_state(&mut self) {
        if !self.state.is_socket_connected() {
            return;
        }
        let next = if self.sessions.iter().any(ChannelSession::is_subscribed) {
            ConnectionState::ChannelSubscribed
        } else {
            ConnectionState::SocketConnected
        };
        if next != self.state {
            info!(from = %self.state, to = %next, "Realtime state changed");
            self.state = next;
            self.mailbox
                .flags()
                .set_subscribed(next == ConnectionState::ChannelSubscribed);
        }
    }
}

impl<T: SocketTransport> RealtimeLink for RealtimeClient<T> {
    fn connection_state(&self) -> ConnectionState {
        self.state
    }

    fn disconnect(&mut self) {
        if self.state == ConnectionState::Disconnected && self.sessions.is_empty() {
            return;
        }
        info!(state = %self.state, channels = self.sessions.len(), "Disconnecting realtime");
        self.mailbox.retire();
        self.transport.close();
        self.generation += 1;
        self.state = ConnectionState::Disconnected;
        self.sessions.clear();
        self.refs.reset();
        self.inbox.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::mailbox::TransportSink;
    use statuslink_core::{HeapSnapshot, JoinConfig};

    #[derive(Default)]
    struct LoopbackTransport {
        sink: Option<TransportSink>,
        sent: Vec<String>,
        closes: usize,
    }

    impl SocketTransport for LoopbackTransport {
        fn connect(&mut self, _url: &str, sink: TransportSink) -> core::result::Result<(), TransportError> {
            self.sink = Some(sink);
            Ok(())
        }

        fn send_text(&mut self, frame: &str) -> core::result::Result<(), TransportError> {
            self.sent.push(frame.to_string());
            Ok(())
        }

        fn close(&mut self) {
            self.closes += 1;
        }
    }

    struct Heap(u32);

    impl MemoryProbe for Heap {
        fn snapshot(&self) -> HeapSnapshot {
            HeapSnapshot::contiguous(self.0)
        }
    }

    fn client() -> RealtimeClient<LoopbackTransport> {
        let mut client = RealtimeClient::new(
            RealtimeConfig::testing(),
            HeapBudget::default(),
            LoopbackTransport::default(),
        );
        client.set_endpoint(Endpoint::new("https://demo.example.co", "anon").unwrap());
        client
    }

    fn connect(client: &mut RealtimeClient<LoopbackTransport>, now: Timestamp) {
        client.begin(now, &Heap(200_000)).unwrap();
        client.transport().sink.as_ref().unwrap().on_connected();
        client.poll(now, &Heap(200_000));
    }

    #[test]
    fn begin_without_endpoint_fails() {
        let mut client = RealtimeClient::new(
            RealtimeConfig::default(),
            HeapBudget::default(),
            LoopbackTransport::default(),
        );
        assert!(matches!(
            client.begin(Timestamp::ZERO, &Heap(200_000)),
            Err(RuntimeError::NoEndpoint)
        ));
    }

    #[test]
    fn first_connect_requires_larger_budget() {
        let mut client = client();
        let result = client.begin(Timestamp::ZERO, &Heap(80_000));
        assert!(matches!(
            result,
            Err(RuntimeError::Gate(GateError::HeapBelowThreshold { required: 100_000, .. }))
        ));
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(client.transport().sink.is_none());
    }

    #[test]
    fn join_is_held_until_connected() {
        let mut client = client();
        let now = Timestamp::from_secs(1);
        client.begin(now, &Heap(200_000)).unwrap();
        client
            .subscribe(ChannelSpec::new("display", JoinConfig::broadcast(false)), now, &Heap(200_000))
            .unwrap();
        assert!(client.transport().sent.is_empty());

        client.transport().sink.as_ref().unwrap().on_connected();
        client.poll(now, &Heap(200_000));

        assert_eq!(client.state(), ConnectionState::SocketConnected);
        assert_eq!(client.transport().sent.len(), 1);
        assert!(client.session("display").unwrap().is_awaiting_reply());
    }

    #[test]
    fn connect_timeout_schedules_backoff() {
        let mut client = client();
        client.begin(Timestamp::ZERO, &Heap(200_000)).unwrap();
        client.poll(Timestamp::from_millis(1_001), &Heap(200_000));

        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(client.transport().closes, 1);
        assert!(matches!(
            client.begin(Timestamp::from_millis(1_050), &Heap(200_000)),
            Err(RuntimeError::Gate(GateError::BackoffActive { .. }))
        ));
        assert!(client.begin(Timestamp::from_millis(1_101), &Heap(200_000)).is_ok());
    }

    #[test]
    fn heartbeat_follows_schedule() {
        let mut client = client();
        connect(&mut client, Timestamp::ZERO);
        client.poll(Timestamp::from_millis(999), &Heap(200_000));
        assert!(client.transport().sent.is_empty());

        client.poll(Timestamp::from_millis(1_000), &Heap(200_000));
        let envelope = wire::decode(client.transport().sent[0].as_bytes()).unwrap();
        assert_eq!(envelope.topic, "phoenix");
        assert_eq!(envelope.event, "heartbeat");
    }

    #[test]
    fn silence_forces_disconnect() {
        let mut client = client();
        connect(&mut client, Timestamp::ZERO);
        // testing() liveness window is 4s
        client.poll(Timestamp::from_millis(4_001), &Heap(200_000));
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(client.transport().closes, 1);
    }

    #[test]
    fn disconnect_clears_sessions() {
        let mut client = client();
        connect(&mut client, Timestamp::ZERO);
        client
            .subscribe(ChannelSpec::new("display", JoinConfig::default()), Timestamp::ZERO, &Heap(200_000))
            .unwrap();

        client.disconnect();
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(client.sessions().is_empty());
        assert!(!client.flags().is_connected());
    }

    #[test]
    fn channel_limit_enforced() {
        let mut client = client();
        let heap = Heap(200_000);
        for topic in ["a", "b"] {
            client
                .subscribe(ChannelSpec::new(topic, JoinConfig::default()), Timestamp::ZERO, &heap)
                .unwrap();
        }
        assert!(matches!(
            client.subscribe(ChannelSpec::new("c", JoinConfig::default()), Timestamp::ZERO, &heap),
            Err(RuntimeError::TooManyChannels { max: 2 })
        ));
    }

    #[test]
    fn transport_error_clears_connection_together() {
        let mut client = client();
        let heap = Heap(200_000);
        connect(&mut client, Timestamp::ZERO);
        client
            .subscribe(ChannelSpec::new("display", JoinConfig::default()), Timestamp::ZERO, &heap)
            .unwrap();
        let sink = client.transport().sink.clone().unwrap();
        let presence = wire::encode("realtime:display", events::PRESENCE_STATE, Value::Null, 0, None);
        sink.on_data(crate::transport::DataFrame::text(&presence));
        client.poll(Timestamp::from_millis(5), &heap);
        assert_eq!(client.state(), ConnectionState::ChannelSubscribed);
        assert!(client.flags().is_subscribed());

        sink.on_error("boom");
        client.poll(Timestamp::from_millis(10), &heap);

        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(!client.flags().is_connected());
        assert!(!client.flags().is_subscribed());
        assert_eq!(client.transport().closes, 1);

        let late = wire::encode("realtime:display", events::BROADCAST, Value::Null, 0, None);
        sink.on_data(crate::transport::DataFrame::text(&late));
        client.poll(Timestamp::from_millis(20), &heap);
        assert_eq!(client.pending_messages(), 0);
    }
}
