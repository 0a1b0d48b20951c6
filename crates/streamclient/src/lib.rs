#![deny(
    trivial_numeric_casts,
    missing_docs,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications,
    unused_extern_crates,
    unused_results
)]
#![warn(rust_2021_compatibility, unreachable_pub)]

//! A reusable reconnecting client for long-lived message streams (WebSocket
//! feeds), with exponential backoff and substring-based error
//! classification.

use std::time::Duration;

mod backoff;
mod client;
mod state;

pub use backoff::{classify, ErrorKind};
pub use client::{MessageHandler, StreamClient};
pub use state::{ConnectionState, StreamClientHandle};

/// All the errors of this crate.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The error was classified as unrecoverable (auth failure, malformed
    /// URL); the client transitioned to `Failed` and will not retry.
    #[error("unrecoverable stream error: {0}")]
    Unrecoverable(String),

    /// `maxReconnectAttempts` consecutive dials have failed.
    #[error("exceeded {attempts} reconnect attempts, last error: {last_error}")]
    MaxAttemptsExceeded {
        /// The number of consecutive failed dials.
        attempts: u32,
        /// The text of the last dial failure.
        last_error: String,
    },
}

/// Stream client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// The endpoint to dial. Required; no default.
    pub url: String,
    /// The `Origin` header sent on the WebSocket handshake.
    pub origin: String,
    /// Upper bound on a single dial.
    pub connection_timeout: Duration,
    /// Deadline re-armed after each received frame.
    pub read_timeout: Duration,
    /// Deadline for sends.
    pub write_timeout: Duration,
    /// Base backoff between reconnect attempts.
    pub reconnect_interval: Duration,
    /// Geometric growth factor applied to `reconnect_interval` per attempt.
    pub backoff_multiplier: f64,
    /// Cap on a single backoff wait.
    pub max_backoff_interval: Duration,
    /// After this many consecutive failed dials, transition to `Failed`.
    pub max_reconnect_attempts: u32,
}

impl Config {
    /// Creates a configuration for `url` with every other field at its
    /// default.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            origin: "http://localhost".to_string(),
            connection_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(10),
            reconnect_interval: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            max_backoff_interval: Duration::from_secs(5 * 60),
            max_reconnect_attempts: 10,
        }
    }

    /// Overrides `max_reconnect_attempts`.
    #[must_use]
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Overrides `reconnect_interval`.
    #[must_use]
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::new("wss://example.test/feed");
        assert_eq!(config.origin, "http://localhost");
        assert_eq!(config.connection_timeout, Duration::from_secs(10));
        assert_eq!(config.read_timeout, Duration::from_secs(30));
        assert_eq!(config.write_timeout, Duration::from_secs(10));
        assert_eq!(config.reconnect_interval, Duration::from_secs(5));
        assert_eq!(config.backoff_multiplier, 2.0);
        assert_eq!(config.max_backoff_interval, Duration::from_secs(300));
        assert_eq!(config.max_reconnect_attempts, 10);
    }
}
