//! Process-wide settings read once at `StreamClient` construction.
//!
//! Mirrors spec.md §6's "Environment variables" section: the parse-failure
//! threshold is read from `CCXT_MAX_MSG_FAILURES` a single time, not
//! re-read per message.

use serde::Deserialize;
use std::time::Duration;

const ENV_PREFIX: &str = "CCXT";

/// Tunables for the stream-client state machine.
///
/// Constructed once via [`Settings::load`] and shared (cheaply, by value —
/// it is `Copy`) across every [`crate::client::StreamClient`] in a process.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Parse failures allowed within the rolling quarantine window before
    /// the client transitions to `Reconnecting`. Read from
    /// `CCXT_MAX_MSG_FAILURES`, default 100.
    pub max_msg_failures: u32,

    /// Width of the rolling parse-failure window, in seconds. Not
    /// externally configurable per spec.md §9's Open Question resolution
    /// (DESIGN.md): fixed at 60s.
    #[serde(skip)]
    pub failure_window_secs: u64,

    /// Initial reconnect backoff, in milliseconds.
    pub reconnect_backoff_base_ms: u64,

    /// Reconnect backoff cap, in milliseconds.
    pub reconnect_backoff_cap_ms: u64,

    /// Multiple of `ping_interval_ms` with no inbound frame before the
    /// heartbeat considers the link dead.
    pub heartbeat_deadline_multiplier: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_msg_failures: 100,
            failure_window_secs: 60,
            reconnect_backoff_base_ms: 1_000,
            reconnect_backoff_cap_ms: 60_000,
            heartbeat_deadline_multiplier: 2,
        }
    }
}

impl Settings {
    /// Load settings from the process environment (`CCXT_*` variables),
    /// falling back to the spec-mandated defaults for anything unset or
    /// unparsable.
    pub fn load() -> Self {
        let builder = config::Config::builder()
            .add_source(config::Config::try_from(&Settings::default()).unwrap_or_default())
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .separator("_"),
            );

        builder
            .build()
            .and_then(|cfg| cfg.try_deserialize::<Settings>())
            .unwrap_or_default()
    }

    pub fn failure_window(&self) -> Duration {
        Duration::from_secs(self.failure_window_secs)
    }

    pub fn reconnect_backoff_base(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_base_ms)
    }

    pub fn reconnect_backoff_cap(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_cap_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_max_msg_failures_is_100() {
        assert_eq!(Settings::default().max_msg_failures, 100);
    }

    #[test]
    fn test_env_override() {
        // SAFETY: test-only, no other test in this process reads this var concurrently.
        unsafe {
            std::env::set_var("CCXT_MAX_MSG_FAILURES", "42");
        }
        let settings = Settings::load();
        assert_eq!(settings.max_msg_failures, 42);
        unsafe {
            std::env::remove_var("CCXT_MAX_MSG_FAILURES");
        }
    }
}
