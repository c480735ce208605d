//! Reconnection watchdog decisions
//!
//! The watchdog owns no sockets. It answers two questions from the state the
//! runtime hands it: should a reconnect be attempted now, and has the link been
//! unhealthy long enough to warn about. Forcing a reconnect is always left to
//! the interval check so a flapping link does not thrash.

use tracing::warn;

use crate::config::WatchdogConfig;
use crate::throttle::LogThrottle;
use crate::types::{ConnectionState, Timestamp};

// ----------------------------------------------------------------------------
// Defer Window
// ----------------------------------------------------------------------------

/// Period during which no new socket may be opened
///
/// Other subsystems extend it while they need the heap for themselves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeferWindow {
    until: Timestamp,
}

impl DeferWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push the window out to `until`; never shortens it
    pub fn extend_to(&mut self, until: Timestamp) {
        self.until = self.until.max(until);
    }

    pub fn is_active(&self, now: Timestamp) -> bool {
        now < self.until
    }

    pub fn until(&self) -> Timestamp {
        self.until
    }
}

// ----------------------------------------------------------------------------
// Reconnect Decision
// ----------------------------------------------------------------------------

/// Inputs to [`should_reconnect`]
#[derive(Debug, Clone, Copy)]
pub struct ReconnectCheck {
    pub now: Timestamp,
    /// Time of the last attempt, `None` if none since boot
    pub last_attempt: Option<Timestamp>,
    pub has_ever_connected: bool,
    pub state: ConnectionState,
    /// An HTTP request currently owns the TLS heap
    pub request_in_flight: bool,
    pub defer: DeferWindow,
    /// WiFi associated and backend authenticated
    pub network_ready: bool,
}

/// Whether a reconnect attempt should start now
///
/// Refuses while the socket is up or connecting, while the network is not
/// ready, inside the defer window, while a request is in flight, or before the
/// boot-phase interval has passed since the last attempt.
pub fn should_reconnect(config: &WatchdogConfig, check: &ReconnectCheck) -> bool {
    if !check.network_ready || check.state.is_active() {
        return false;
    }
    if check.defer.is_active(check.now) || check.request_in_flight {
        return false;
    }
    match check.last_attempt {
        None => true,
        Some(last) => check
            .now
            .is_past(last, config.reconnect_interval(check.has_ever_connected)),
    }
}

// ----------------------------------------------------------------------------
// Liveness Timer
// ----------------------------------------------------------------------------

/// Health verdict from [`LivenessTimer::update`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Healthy,
    /// Not subscribed for `stale_for_ms`; `logged` is true when a warning was emitted
    Stale { stale_for_ms: u64, logged: bool },
}

/// Tracks how long the realtime link has gone without a subscribed channel
#[derive(Debug, Clone)]
pub struct LivenessTimer {
    last_subscribed: Option<Timestamp>,
    log_throttle: LogThrottle,
}

impl LivenessTimer {
    pub fn new(config: &WatchdogConfig) -> Self {
        Self {
            last_subscribed: None,
            log_throttle: LogThrottle::new(config.check_interval()),
        }
    }

    /// Record the current link state
    ///
    /// The clock starts on the first call and resets whenever the link is fully
    /// subscribed. Staleness is only reported while the rest of the network is
    /// healthy, and logged at most once per watchdog interval.
    pub fn update(
        &mut self,
        config: &WatchdogConfig,
        now: Timestamp,
        is_fully_connected: bool,
        network_ready: bool,
    ) -> Liveness {
        let since = *self.last_subscribed.get_or_insert(now);
        if is_fully_connected {
            self.last_subscribed = Some(now);
            return Liveness::Healthy;
        }
        if !network_ready || !now.is_past(since, config.staleness_threshold()) {
            return Liveness::Healthy;
        }

        let stale_for_ms = now.millis_since(since);
        let logged = self.log_throttle.ready(now);
        if logged {
            warn!(stale_for_ms, "Realtime not fully connected past staleness threshold");
        }
        Liveness::Stale { stale_for_ms, logged }
    }

    pub fn last_subscribed(&self) -> Option<Timestamp> {
        self.last_subscribed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(now: u64, last: Option<u64>, ever: bool) -> ReconnectCheck {
        ReconnectCheck {
            now: Timestamp::from_secs(now),
            last_attempt: last.map(Timestamp::from_secs),
            has_ever_connected: ever,
            state: ConnectionState::Disconnected,
            request_in_flight: false,
            defer: DeferWindow::new(),
            network_ready: true,
        }
    }

    #[test]
    fn first_connect_uses_short_interval() {
        let config = WatchdogConfig::default();
        assert!(should_reconnect(&config, &check(0, None, false)));
        assert!(!should_reconnect(&config, &check(15, Some(0), false)));
        assert!(should_reconnect(&config, &check(16, Some(0), false)));
    }

    #[test]
    fn steady_state_uses_long_interval() {
        let config = WatchdogConfig::default();
        assert!(!should_reconnect(&config, &check(30, Some(0), true)));
        assert!(should_reconnect(&config, &check(61, Some(0), true)));
    }

    #[test]
    fn refuses_when_busy_or_deferred() {
        let config = WatchdogConfig::default();

        let mut busy = check(100, None, true);
        busy.request_in_flight = true;
        assert!(!should_reconnect(&config, &busy));

        let mut deferred = check(100, None, true);
        deferred.defer.extend_to(Timestamp::from_secs(160));
        assert!(!should_reconnect(&config, &deferred));

        let mut connecting = check(100, None, true);
        connecting.state = ConnectionState::Connecting;
        assert!(!should_reconnect(&config, &connecting));

        let mut offline = check(100, None, true);
        offline.network_ready = false;
        assert!(!should_reconnect(&config, &offline));
    }

    #[test]
    fn defer_window_never_shrinks() {
        let mut window = DeferWindow::new();
        window.extend_to(Timestamp::from_secs(60));
        window.extend_to(Timestamp::from_secs(10));
        assert_eq!(window.until(), Timestamp::from_secs(60));
        assert!(window.is_active(Timestamp::from_secs(59)));
        assert!(!window.is_active(Timestamp::from_secs(60)));
    }

    #[test]
    fn liveness_logs_at_most_once_per_interval() {
        let config = WatchdogConfig::default();
        let mut timer = LivenessTimer::new(&config);

        assert_eq!(timer.update(&config, Timestamp::from_secs(0), false, true), Liveness::Healthy);
        assert_eq!(timer.update(&config, Timestamp::from_secs(60), false, true), Liveness::Healthy);
        assert_eq!(
            timer.update(&config, Timestamp::from_secs(61), false, true),
            Liveness::Stale { stale_for_ms: 61_000, logged: true }
        );
        assert_eq!(
            timer.update(&config, Timestamp::from_secs(70), false, true),
            Liveness::Stale { stale_for_ms: 70_000, logged: false }
        );
        assert!(matches!(
            timer.update(&config, Timestamp::from_secs(91), false, true),
            Liveness::Stale { logged: true, .. }
        ));
    }

    #[test]
    fn liveness_resets_when_subscribed_and_ignores_unhealthy_network() {
        let config = WatchdogConfig::default();
        let mut timer = LivenessTimer::new(&config);

        timer.update(&config, Timestamp::from_secs(0), false, true);
        assert_eq!(timer.update(&config, Timestamp::from_secs(100), true, true), Liveness::Healthy);
        assert_eq!(timer.update(&config, Timestamp::from_secs(150), false, true), Liveness::Healthy);
        assert_eq!(timer.update(&config, Timestamp::from_secs(300), false, false), Liveness::Healthy);
    }
}
