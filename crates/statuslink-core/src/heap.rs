//! Memory admission control
//!
//! The device shares a small heap with unrelated subsystems, so free memory is
//! sampled fresh before every connect, subscribe or send. Nothing here caches a
//! reading.

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// A single reading of the allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HeapSnapshot {
    /// Total free bytes
    pub free: u32,
    /// Largest contiguous free block
    pub largest_block: u32,
}

impl HeapSnapshot {
    pub fn new(free: u32, largest_block: u32) -> Self {
        Self { free, largest_block }
    }

    /// Snapshot where the whole free heap is one block
    pub fn contiguous(free: u32) -> Self {
        Self::new(free, free)
    }
}

/// Source of live memory readings
pub trait MemoryProbe {
    fn snapshot(&self) -> HeapSnapshot;
}

impl<P: MemoryProbe + ?Sized> MemoryProbe for &P {
    fn snapshot(&self) -> HeapSnapshot {
        (**self).snapshot()
    }
}

// ----------------------------------------------------------------------------
// Heap Gate
// ----------------------------------------------------------------------------

/// Minimum free memory and contiguous block an operation needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapGate {
    pub min_free: u32,
    pub min_largest_block: u32,
}

impl HeapGate {
    /// Headroom needed for a TLS handshake plus one HTTP request
    pub const TLS: HeapGate = HeapGate {
        min_free: 65_000,
        min_largest_block: 40_000,
    };

    pub const fn free_only(min_free: u32) -> Self {
        Self {
            min_free,
            min_largest_block: 0,
        }
    }

    pub fn passes(&self, snapshot: HeapSnapshot) -> bool {
        snapshot.free >= self.min_free && snapshot.largest_block >= self.min_largest_block
    }
}

// ----------------------------------------------------------------------------
// Heap Budget
// ----------------------------------------------------------------------------

/// Socket admission policy that tightens until the first successful connect
///
/// A cold connect needs room for the TLS handshake and the initial channel
/// joins, so the first attempt demands more memory than later reconnects.
/// Neither threshold may drop below `floor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeapBudget {
    pub min_first_connect: u32,
    pub min_steady_state: u32,
    pub floor: u32,
}

impl Default for HeapBudget {
    fn default() -> Self {
        Self {
            min_first_connect: 100_000,
            min_steady_state: 60_000,
            floor: 50_000,
        }
    }
}

impl HeapBudget {
    /// Free bytes required given whether the socket has connected since boot
    pub fn required(&self, has_ever_connected: bool) -> u32 {
        let threshold = if has_ever_connected {
            self.min_steady_state
        } else {
            self.min_first_connect
        };
        threshold.max(self.floor)
    }

    pub fn gate(&self, has_ever_connected: bool) -> HeapGate {
        HeapGate::free_only(self.required(has_ever_connected))
    }

    pub fn admits(&self, snapshot: HeapSnapshot, has_ever_connected: bool) -> bool {
        self.gate(has_ever_connected).passes(snapshot)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_first_connect < self.min_steady_state {
            return Err(ConfigError::InvalidValue {
                field: "min_first_connect",
                reason: "must be at least min_steady_state".to_string(),
            });
        }
        Ok(())
    }
}
