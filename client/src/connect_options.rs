// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::time::Duration;

/// Mutable runtime configuration consulted on every open attempt and by
/// the pinger, spec.md §6. `keep_alive` may be mutated at runtime and
/// takes effect on the next ping cycle; `ping_enabled` and
/// `connect_timeout` take effect on the next open.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectOptions {
    keep_alive: Duration,
    ping_enabled: bool,
    ping_timeout: Duration,
    connect_timeout: Duration,
    publish_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            keep_alive: Duration::from_secs(60),
            ping_enabled: true,
            ping_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(30),
            publish_timeout: Duration::from_secs(5),
        }
    }
}

impl ConnectOptions {
    #[must_use]
    pub fn builder() -> ConnectOptionsBuilder {
        ConnectOptionsBuilder::default()
    }

    #[must_use]
    pub const fn keep_alive(&self) -> Duration {
        self.keep_alive
    }

    #[must_use]
    pub const fn ping_enabled(&self) -> bool {
        self.ping_enabled
    }

    #[must_use]
    pub const fn ping_timeout(&self) -> Duration {
        self.ping_timeout
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    #[must_use]
    pub const fn publish_timeout(&self) -> Duration {
        self.publish_timeout
    }

    /// Takes effect on the next ping cycle; no validation failure is
    /// possible here so it is applied immediately.
    pub fn set_keep_alive(&mut self, keep_alive: Duration) {
        self.keep_alive = keep_alive;
    }
}

/// Builder enforcing spec.md §6's "must be > 0" constraints up front
/// rather than at first use.
#[derive(Clone, Debug, Default)]
pub struct ConnectOptionsBuilder {
    options: Option<ConnectOptions>,
}

impl ConnectOptionsBuilder {
    fn options_mut(&mut self) -> &mut ConnectOptions {
        self.options.get_or_insert_with(ConnectOptions::default)
    }

    #[must_use]
    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.options_mut().keep_alive = keep_alive;
        self
    }

    #[must_use]
    pub fn ping_enabled(mut self, enabled: bool) -> Self {
        self.options_mut().ping_enabled = enabled;
        self
    }

    #[must_use]
    pub fn ping_timeout(mut self, timeout: Duration) -> Self {
        self.options_mut().ping_timeout = timeout;
        self
    }

    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options_mut().connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn publish_timeout(mut self, timeout: Duration) -> Self {
        self.options_mut().publish_timeout = timeout;
        self
    }

    /// Returns `Err` with the offending field name if any duration is
    /// zero.
    pub fn build(self) -> Result<ConnectOptions, &'static str> {
        let options = self.options.unwrap_or_default();
        if options.keep_alive.is_zero() {
            return Err("keep_alive must be > 0");
        }
        if options.ping_timeout.is_zero() {
            return Err("ping_timeout must be > 0");
        }
        if options.connect_timeout.is_zero() {
            return Err("connect_timeout must be > 0");
        }
        if options.publish_timeout.is_zero() {
            return Err("publish_timeout must be > 0");
        }
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_config_surface() {
        let options = ConnectOptions::default();
        assert_eq!(options.keep_alive(), Duration::from_secs(60));
        assert!(options.ping_enabled());
        assert_eq!(options.ping_timeout(), Duration::from_secs(5));
        assert_eq!(options.connect_timeout(), Duration::from_secs(30));
        assert_eq!(options.publish_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn builder_rejects_zero_keep_alive() {
        let result = ConnectOptions::builder()
            .keep_alive(Duration::ZERO)
            .build();
        assert_eq!(result, Err("keep_alive must be > 0"));
    }

    #[test]
    fn builder_applies_overrides() {
        let options = ConnectOptions::builder()
            .ping_enabled(false)
            .publish_timeout(Duration::from_secs(10))
            .build()
            .unwrap();
        assert!(!options.ping_enabled());
        assert_eq!(options.publish_timeout(), Duration::from_secs(10));
    }
}
