//! Time primitives and the connection state shared across the sync core
//!
//! All timing in the core is expressed as milliseconds since device boot. The
//! cooperative loop samples a [`TimeSource`] once per tick and hands the
//! resulting [`Timestamp`] to every component, which keeps the decision logic
//! deterministic under test.

use core::fmt;
use core::ops::{Add, Sub};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Millisecond timestamp since boot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    pub const fn from_secs(secs: u64) -> Self {
        Self(secs * 1000)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    pub fn as_secs(&self) -> u64 {
        self.0 / 1000
    }

    /// Milliseconds elapsed since `earlier`, zero if `earlier` is in the future
    pub fn millis_since(&self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    /// Whether more than `duration` has passed since `earlier`
    pub fn is_past(&self, earlier: Timestamp, duration: Duration) -> bool {
        u128::from(self.millis_since(earlier)) > duration.as_millis()
    }

    /// Whether at least `duration` has passed since `earlier`
    pub fn has_elapsed(&self, earlier: Timestamp, duration: Duration) -> bool {
        u128::from(self.millis_since(earlier)) >= duration.as_millis()
    }
}

impl Add<u64> for Timestamp {
    type Output = Timestamp;

    fn add(self, millis: u64) -> Timestamp {
        Timestamp(self.0.saturating_add(millis))
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, duration: Duration) -> Timestamp {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        Timestamp(self.0.saturating_add(millis))
    }
}

impl Sub for Timestamp {
    type Output = u64;

    fn sub(self, other: Timestamp) -> u64 {
        self.0.saturating_sub(other.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

// ----------------------------------------------------------------------------
// Time Source
// ----------------------------------------------------------------------------

/// Time source abstraction for deterministic testing
pub trait TimeSource {
    /// Get the current timestamp
    fn now(&self) -> Timestamp;
}

/// Monotonic clock measuring time since construction
#[derive(Debug, Clone, Copy)]
pub struct UptimeClock {
    boot: Instant,
}

impl UptimeClock {
    pub fn new() -> Self {
        Self { boot: Instant::now() }
    }
}

impl Default for UptimeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for UptimeClock {
    fn now(&self) -> Timestamp {
        Timestamp::ZERO + self.boot.elapsed()
    }
}

// ----------------------------------------------------------------------------
// Connection State
// ----------------------------------------------------------------------------

/// Lifecycle of the realtime socket and its channel subscriptions
///
/// Only the realtime client moves between these states. The ordering is
/// meaningful: `ChannelSubscribed` implies `SocketConnected`, which in turn
/// implies the client is not `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    SocketConnected,
    ChannelSubscribed,
}

impl ConnectionState {
    pub fn is_socket_connected(&self) -> bool {
        matches!(self, Self::SocketConnected | Self::ChannelSubscribed)
    }

    pub fn is_subscribed(&self) -> bool {
        matches!(self, Self::ChannelSubscribed)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting)
    }

    /// Either connected or on the way there
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Disconnected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::SocketConnected => "socket-connected",
            Self::ChannelSubscribed => "channel-subscribed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_arithmetic_saturates() {
        let early = Timestamp::from_millis(1_000);
        let late = Timestamp::from_secs(5);

        assert_eq!(late - early, 4_000);
        assert_eq!(early - late, 0);
        assert_eq!(early.millis_since(late), 0);
        assert_eq!(Timestamp::from_millis(u64::MAX) + 10, Timestamp::from_millis(u64::MAX));
    }

    #[test]
    fn elapsed_boundaries() {
        let start = Timestamp::from_secs(10);
        let interval = Duration::from_secs(30);

        assert!(!Timestamp::from_secs(40).is_past(start, interval));
        assert!(Timestamp::from_secs(40).has_elapsed(start, interval));
        assert!(Timestamp::from_millis(40_001).is_past(start, interval));
    }

    #[test]
    fn connection_state_ordering_tracks_implication() {
        assert!(ConnectionState::ChannelSubscribed.is_socket_connected());
        assert!(ConnectionState::SocketConnected.is_active());
        assert!(!ConnectionState::Connecting.is_socket_connected());
        assert!(!ConnectionState::Disconnected.is_active());
        assert!(ConnectionState::ChannelSubscribed > ConnectionState::SocketConnected);
    }
}
