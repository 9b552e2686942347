// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::time::{Duration, Instant};

/// What the session core should do this tick, per spec.md §4.9.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PingAction {
    /// Nothing to do yet.
    Idle,
    /// Send PINGREQ into the ping slot now.
    SendPing,
    /// No PINGRESP arrived within `pingTimeout` of the PINGREQ.
    TimedOut,
}

/// Keep-alive scheduler, spec.md §4.9. Only meaningful while
/// `ping_enabled`; the session core starts one on entry to opened and
/// drops it on entry to opening/closing/closed.
pub struct Pinger {
    keep_alive: Duration,
    ping_timeout: Duration,
    last_activity: Instant,
    pending_since: Option<Instant>,
}

impl Pinger {
    #[must_use]
    pub fn new(keep_alive: Duration, ping_timeout: Duration, now: Instant) -> Self {
        Self {
            keep_alive,
            ping_timeout,
            last_activity: now,
            pending_since: None,
        }
    }

    /// Every outbound byte written by the session core updates this.
    pub fn record_activity(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// A PINGRESP arrived; clears the pending deadline.
    pub fn record_pong(&mut self, now: Instant) {
        self.pending_since = None;
        self.last_activity = now;
    }

    /// Evaluate scheduler state at `now`. Call on every wake -- a
    /// dedicated timer tick, or any event the session core already
    /// processes.
    pub fn poll(&mut self, now: Instant) -> PingAction {
        if let Some(sent_at) = self.pending_since {
            if now.duration_since(sent_at) >= self.ping_timeout {
                return PingAction::TimedOut;
            }
            return PingAction::Idle;
        }
        if now.duration_since(self.last_activity) >= self.keep_alive {
            self.pending_since = Some(now);
            return PingAction::SendPing;
        }
        PingAction::Idle
    }

    /// Duration until the next action is due, for scheduling a timer.
    #[must_use]
    pub fn next_deadline(&self) -> Duration {
        match self.pending_since {
            Some(sent_at) => self
                .ping_timeout
                .saturating_sub(Instant::now().saturating_duration_since(sent_at)),
            None => self
                .keep_alive
                .saturating_sub(Instant::now().saturating_duration_since(self.last_activity)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sends_ping_after_keep_alive_elapses_with_no_activity() {
        let t0 = Instant::now();
        let mut pinger = Pinger::new(Duration::from_secs(2), Duration::from_secs(1), t0);
        assert_eq!(pinger.poll(t0 + Duration::from_millis(500)), PingAction::Idle);
        assert_eq!(pinger.poll(t0 + Duration::from_secs(2)), PingAction::SendPing);
    }

    #[test]
    fn times_out_if_no_pong_within_ping_timeout() {
        let t0 = Instant::now();
        let mut pinger = Pinger::new(Duration::from_secs(2), Duration::from_secs(1), t0);
        assert_eq!(pinger.poll(t0 + Duration::from_secs(2)), PingAction::SendPing);
        assert_eq!(
            pinger.poll(t0 + Duration::from_secs(2) + Duration::from_millis(500)),
            PingAction::Idle
        );
        assert_eq!(
            pinger.poll(t0 + Duration::from_secs(3)),
            PingAction::TimedOut
        );
    }

    #[test]
    fn activity_resets_the_idle_clock() {
        let t0 = Instant::now();
        let mut pinger = Pinger::new(Duration::from_secs(2), Duration::from_secs(1), t0);
        pinger.record_activity(t0 + Duration::from_secs(1));
        assert_eq!(pinger.poll(t0 + Duration::from_secs(2)), PingAction::Idle);
    }

    #[test]
    fn pong_clears_pending_deadline() {
        let t0 = Instant::now();
        let mut pinger = Pinger::new(Duration::from_secs(2), Duration::from_secs(1), t0);
        assert_eq!(pinger.poll(t0 + Duration::from_secs(2)), PingAction::SendPing);
        pinger.record_pong(t0 + Duration::from_secs(2) + Duration::from_millis(100));
        assert_eq!(
            pinger.poll(t0 + Duration::from_secs(2) + Duration::from_millis(200)),
            PingAction::Idle
        );
    }
}
