// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::time::Duration;

use rand::Rng;

use crate::status::CloseReason;

/// Backoff shape for reconnect delays, spec.md §4.10.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Policy {
    /// `attempt * scale`.
    Linear(Duration),
    /// A fixed interval regardless of attempt count.
    Equals(Duration),
    /// Uniformly random delay in `[min, max)`.
    Random(Duration, Duration),
    /// `base * scale.powi(attempt)`, clamped to `max`.
    Exponential {
        base: Duration,
        scale: f64,
        max: Duration,
    },
}

impl Policy {
    fn next_delay(self, attempt: u32) -> Duration {
        match self {
            Self::Linear(scale) => scale * attempt,
            Self::Equals(interval) => interval,
            Self::Random(min, max) => {
                if max <= min {
                    min
                } else {
                    rand::thread_rng().gen_range(min..max)
                }
            }
            Self::Exponential { base, scale, max } => {
                let computed = base.mul_f64(scale.powi(attempt as i32));
                computed.min(max)
            }
        }
    }
}

/// Reconnect policy plus attempt bookkeeping, spec.md §4.10. Owned
/// exclusively by the session core, consulted on every closed transition
/// with a non-nil reason.
pub struct Retrier {
    policy: Policy,
    limit: Option<u32>,
    filter: Box<dyn Fn(&CloseReason) -> bool + Send + Sync>,
    attempt: u32,
}

impl Retrier {
    /// `filter` returns `true` to mean "do not retry this reason".
    pub fn new(
        policy: Policy,
        limit: Option<u32>,
        filter: impl Fn(&CloseReason) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            policy,
            limit,
            filter: Box::new(filter),
            attempt: 0,
        }
    }

    /// A retrier that never refuses a reason on its own -- the caller
    /// still gets [`CloseReason::never_retry`] applied by the session
    /// core before this is consulted.
    #[must_use]
    pub fn with_policy(policy: Policy, limit: Option<u32>) -> Self {
        Self::new(policy, limit, |_| false)
    }

    /// Attempt counter resets to 0 on a successful open (spec.md §4.10).
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// `None` when the filter rejects the reason, the attempt limit is
    /// exceeded, or the reason is one spec.md §4.7 marks as never-retry
    /// regardless of configuration. Otherwise the policy's next delay.
    #[must_use]
    pub fn delay(&mut self, reason: &CloseReason) -> Option<Duration> {
        if reason.never_retry() || (self.filter)(reason) {
            return None;
        }
        if let Some(limit) = self.limit {
            if self.attempt >= limit {
                return None;
            }
        }
        let delay = self.policy.next_delay(self.attempt);
        self.attempt += 1;
        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, NetworkErrorKind};

    #[test]
    fn equals_policy_is_constant() {
        let mut retrier = Retrier::with_policy(Policy::Equals(Duration::from_secs(1)), None);
        assert_eq!(retrier.delay(&CloseReason::PingTimeout), Some(Duration::from_secs(1)));
        assert_eq!(retrier.delay(&CloseReason::PingTimeout), Some(Duration::from_secs(1)));
    }

    #[test]
    fn exponential_policy_clamps_to_max() {
        let mut retrier = Retrier::with_policy(
            Policy::Exponential {
                base: Duration::from_millis(100),
                scale: 2.0,
                max: Duration::from_millis(300),
            },
            None,
        );
        assert_eq!(retrier.delay(&CloseReason::PingTimeout), Some(Duration::from_millis(100)));
        assert_eq!(retrier.delay(&CloseReason::PingTimeout), Some(Duration::from_millis(200)));
        assert_eq!(retrier.delay(&CloseReason::PingTimeout), Some(Duration::from_millis(300)));
        assert_eq!(retrier.delay(&CloseReason::PingTimeout), Some(Duration::from_millis(300)));
    }

    #[test]
    fn limit_is_enforced_until_reset() {
        let mut retrier = Retrier::with_policy(Policy::Equals(Duration::from_secs(1)), Some(1));
        assert!(retrier.delay(&CloseReason::PingTimeout).is_some());
        assert!(retrier.delay(&CloseReason::PingTimeout).is_none());
        retrier.reset();
        assert!(retrier.delay(&CloseReason::PingTimeout).is_some());
    }

    #[test]
    fn network_unreachable_never_retries_regardless_of_filter() {
        let mut retrier = Retrier::new(Policy::Equals(Duration::from_secs(1)), None, |_| false);
        let reason = CloseReason::TransportError(ErrorKind::NetworkError(
            NetworkErrorKind::NetworkUnreachable,
        ));
        assert_eq!(retrier.delay(&reason), None);
    }

    #[test]
    fn filter_can_reject_a_reason() {
        let mut retrier = Retrier::new(Policy::Equals(Duration::from_secs(1)), None, |reason| {
            matches!(reason, CloseReason::PingTimeout)
        });
        assert_eq!(retrier.delay(&CloseReason::PingTimeout), None);
    }
}
