//! Channel session: one subscription's join handshake
//!
//! A session never touches the socket. It produces frames for the realtime
//! client to send and interprets the replies routed back to it. Refs come from
//! the connection-scoped [`RefCounter`], so a join built while offline is still
//! unique on the connection that eventually carries it.

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::protocol::join::JoinConfig;
use crate::protocol::wire::{self, events};

// ----------------------------------------------------------------------------
// Ref Counter
// ----------------------------------------------------------------------------

/// Monotonic message ref allocator for one socket connection
#[derive(Debug, Clone, Default)]
pub struct RefCounter {
    last: u64,
}

impl RefCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next ref; the first ref of a connection is 1
    pub fn next_ref(&mut self) -> u64 {
        self.last += 1;
        self.last
    }

    /// Last ref handed out, 0 if none
    pub fn last(&self) -> u64 {
        self.last
    }

    /// Start over for a new connection
    pub fn reset(&mut self) {
        self.last = 0;
    }
}

// ----------------------------------------------------------------------------
// Join Outcome
// ----------------------------------------------------------------------------

/// Result of routing a `phx_reply` to a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The latest join was accepted
    Subscribed,
    /// The latest join was refused; `first_occurrence` is false for repeats
    Rejected {
        status: String,
        reason: Option<String>,
        first_occurrence: bool,
    },
    /// Reply to an older join that has been superseded
    StaleRef { reply_ref: u64, current_ref: u64 },
    /// Not a reply to a join (access token, broadcast acks)
    Unrelated,
}

// ----------------------------------------------------------------------------
// Channel Session
// ----------------------------------------------------------------------------

/// State of one channel subscription
#[derive(Debug, Clone)]
pub struct ChannelSession {
    topic: String,
    config: JoinConfig,
    join_ref: u64,
    subscribed: bool,
    awaiting_reply: bool,
    pending_join: Option<String>,
    rejected: bool,
    rejection_logged: bool,
}

impl ChannelSession {
    pub fn new(topic: impl Into<String>, config: JoinConfig) -> Self {
        Self {
            topic: topic.into(),
            config,
            join_ref: 0,
            subscribed: false,
            awaiting_reply: false,
            pending_join: None,
            rejected: false,
            rejection_logged: false,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn config(&self) -> &JoinConfig {
        &self.config
    }

    pub fn is_private(&self) -> bool {
        self.config.private
    }

    pub fn join_ref(&self) -> u64 {
        self.join_ref
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// A join has been sent and no verdict has arrived yet
    pub fn is_awaiting_reply(&self) -> bool {
        self.awaiting_reply
    }

    pub fn pending_join(&self) -> Option<&str> {
        self.pending_join.as_deref()
    }

    /// Idle and eligible for a fresh join
    ///
    /// A rejected channel is not retried until the connection is reset.
    pub fn needs_join(&self) -> bool {
        !self.subscribed && !self.awaiting_reply && self.pending_join.is_none() && !self.rejected
    }

    /// Replace the join configuration used by future joins
    pub fn reconfigure(&mut self, config: JoinConfig) {
        self.config = config;
    }

    /// Build a fresh join and hold it as the single pending join
    ///
    /// Bumps `join_ref`, which invalidates any reply still in flight for an
    /// earlier join. The frame is returned for convenience; it stays pending
    /// until [`mark_join_sent`](Self::mark_join_sent) is called.
    pub fn request_join(&mut self, refs: &mut RefCounter, access_token: &str) -> &str {
        self.join_ref = refs.next_ref();
        self.subscribed = false;
        self.awaiting_reply = false;
        self.rejected = false;
        let payload = self.config.payload(access_token);
        let frame = wire::encode(&self.topic, events::JOIN, payload, self.join_ref, Some(self.join_ref));
        debug!(topic = %self.topic, join_ref = self.join_ref, "Join prepared");
        self.pending_join.insert(frame).as_str()
    }

    /// The pending join reached the transport
    pub fn mark_join_sent(&mut self) {
        if self.pending_join.take().is_some() {
            self.awaiting_reply = true;
        }
    }

    /// Interpret a `phx_reply` addressed to this topic
    pub fn on_join_reply(&mut self, reply_ref: u64, status: &str, reason: Option<&str>) -> JoinOutcome {
        if !self.awaiting_reply {
            return JoinOutcome::Unrelated;
        }
        if reply_ref != self.join_ref {
            if reply_ref < self.join_ref {
                debug!(
                    topic = %self.topic,
                    reply_ref,
                    current_ref = self.join_ref,
                    "Ignoring reply to superseded join"
                );
                return JoinOutcome::StaleRef {
                    reply_ref,
                    current_ref: self.join_ref,
                };
            }
            return JoinOutcome::Unrelated;
        }

        self.awaiting_reply = false;
        if status == "ok" {
            self.subscribed = true;
            self.rejection_logged = false;
            info!(topic = %self.topic, "Joined channel");
            return JoinOutcome::Subscribed;
        }

        self.subscribed = false;
        self.rejected = true;
        let first_occurrence = !self.rejection_logged;
        self.rejection_logged = true;
        JoinOutcome::Rejected {
            status: status.to_string(),
            reason: reason.map(str::to_string),
            first_occurrence,
        }
    }

    /// A presence event implies the server accepted our join
    ///
    /// Returns true if this changed the session to subscribed.
    pub fn confirm_by_presence(&mut self) -> bool {
        if self.subscribed || !self.awaiting_reply {
            return false;
        }
        self.awaiting_reply = false;
        self.subscribed = true;
        info!(topic = %self.topic, "Subscription confirmed via presence");
        true
    }

    /// Server closed or errored the channel
    pub fn mark_unsubscribed(&mut self) {
        self.subscribed = false;
        self.awaiting_reply = false;
    }

    /// Build an `access_token` frame for this channel
    pub fn access_token_frame(&self, refs: &mut RefCounter, access_token: &str) -> String {
        wire::encode(
            &self.topic,
            events::ACCESS_TOKEN,
            json!({ "access_token": access_token }),
            refs.next_ref(),
            Some(self.join_ref),
        )
    }

    /// Build a broadcast frame for this channel
    pub fn broadcast_frame(&self, refs: &mut RefCounter, event: &str, payload: Value) -> String {
        wire::encode(
            &self.topic,
            events::BROADCAST,
            json!({ "event": event, "payload": payload }),
            refs.next_ref(),
            Some(self.join_ref),
        )
    }

    /// Leave the channel
    ///
    /// Returns the leave frame when `connected`, otherwise `None`. Subscription
    /// state and any pending join are cleared either way.
    pub fn leave(&mut self, refs: &mut RefCounter, connected: bool) -> Option<String> {
        let frame = connected.then(|| {
            wire::encode(
                &self.topic,
                events::LEAVE,
                Value::Object(Default::default()),
                refs.next_ref(),
                Some(self.join_ref),
            )
        });
        self.subscribed = false;
        self.awaiting_reply = false;
        self.pending_join = None;
        frame
    }

    /// The socket went away: nothing in flight survives
    pub fn reset_connection(&mut self) {
        self.subscribed = false;
        self.awaiting_reply = false;
        self.pending_join = None;
        self.rejected = false;
        self.rejection_logged = false;
    }
}
