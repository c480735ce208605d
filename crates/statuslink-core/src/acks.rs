//! Bounded buffer of acknowledgments awaiting delivery

use std::collections::VecDeque;

use tracing::warn;

use crate::command::PendingAck;

/// Fixed-capacity FIFO of acknowledgments
///
/// When full, enqueuing drops the oldest entry and bumps [`dropped`](Self::dropped).
#[derive(Debug, Clone)]
pub struct PendingAckRing {
    acks: VecDeque<PendingAck>,
    capacity: usize,
    dropped: u64,
}

impl PendingAckRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            acks: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Append an ack, returning the entry evicted to make room
    pub fn push(&mut self, ack: PendingAck) -> Option<PendingAck> {
        let evicted = if self.acks.len() == self.capacity {
            let oldest = self.acks.pop_front();
            if let Some(oldest) = &oldest {
                self.dropped += 1;
                warn!(
                    dropped_id = %oldest.id,
                    queued_id = %ack.id,
                    total_dropped = self.dropped,
                    "Pending ack queue full, dropping oldest"
                );
            }
            oldest
        } else {
            None
        };
        self.acks.push_back(ack);
        evicted
    }

    /// Oldest ack without removing it
    pub fn front(&self) -> Option<&PendingAck> {
        self.acks.front()
    }

    pub fn pop_front(&mut self) -> Option<PendingAck> {
        self.acks.pop_front()
    }

    pub fn len(&self) -> usize {
        self.acks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.acks.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total acks lost to overflow
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingAck> {
        self.acks.iter()
    }
}
