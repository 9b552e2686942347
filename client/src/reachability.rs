// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use tokio::sync::watch;

/// OS-reported network reachability, spec.md §4.11. The underlying OS
/// status stream is an external collaborator we don't implement; this
/// models only the interface the session core consumes from it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkStatus {
    Satisfied,
    Unsatisfied,
    RequiresConnection,
}

impl NetworkStatus {
    #[must_use]
    pub const fn is_available(self) -> bool {
        !matches!(self, Self::Unsatisfied)
    }
}

/// A source of reachability transitions. Optional: when the session
/// core is built without one, it never suppresses retries for
/// availability reasons.
pub trait ReachabilityMonitor: Send + Sync {
    /// Current status, sampled on demand (e.g. before scheduling a
    /// reconnect).
    fn status(&self) -> NetworkStatus;

    /// A receiver that yields on every transition (not on every poll) --
    /// the monitor's own serial queue, per spec.md §4.11.
    fn subscribe(&self) -> watch::Receiver<NetworkStatus>;
}

/// A monitor that reports `Satisfied` forever and never transitions.
/// Used when the host platform's reachability APIs aren't wired in;
/// equivalent to having no monitor, but satisfies the trait object the
/// session core holds.
pub struct AlwaysSatisfied {
    tx: watch::Sender<NetworkStatus>,
}

impl Default for AlwaysSatisfied {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(NetworkStatus::Satisfied);
        Self { tx }
    }
}

impl ReachabilityMonitor for AlwaysSatisfied {
    fn status(&self) -> NetworkStatus {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<NetworkStatus> {
        self.tx.subscribe()
    }
}

/// A monitor driven manually -- for tests exercising spec.md §4.7's
/// "reachability transition" reconnect rule.
pub struct ManualMonitor {
    tx: watch::Sender<NetworkStatus>,
}

impl ManualMonitor {
    #[must_use]
    pub fn new(initial: NetworkStatus) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn set(&self, status: NetworkStatus) {
        self.tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

impl ReachabilityMonitor for ManualMonitor {
    fn status(&self) -> NetworkStatus {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<NetworkStatus> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_observes_transition() {
        let monitor = ManualMonitor::new(NetworkStatus::Satisfied);
        let mut rx = monitor.subscribe();
        monitor.set(NetworkStatus::Unsatisfied);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), NetworkStatus::Unsatisfied);
    }

    #[test]
    fn unsatisfied_is_the_only_unavailable_status() {
        assert!(NetworkStatus::Satisfied.is_available());
        assert!(NetworkStatus::RequiresConnection.is_available());
        assert!(!NetworkStatus::Unsatisfied.is_available());
    }
}
