//! Backoff computation and error classification.

use std::time::Duration;

use crate::Config;

/// Whether a stream error should be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Retrying would not help: auth failure, malformed URL, cancellation.
    Unrecoverable,
    /// Worth another dial after a backoff wait.
    Recoverable,
}

/// Classifies an error by substring matching on its text. Callers should
/// prefer structured error kinds when the transport exposes them; this is
/// the fallback for opaque error text.
pub fn classify(error_text: &str) -> ErrorKind {
    let lower = error_text.to_lowercase();
    let unrecoverable = ["401", "403", "unauthorized", "forbidden", "invalid url", "malformed", "parse"];
    if unrecoverable.iter().any(|needle| lower.contains(needle)) {
        ErrorKind::Unrecoverable
    } else {
        ErrorKind::Recoverable
    }
}

/// Computes the wait before the `attempts`-th (1-indexed) consecutive dial:
/// `min(max_backoff_interval, reconnect_interval * backoff_multiplier^(attempts-1))`.
pub fn wait_for(config: &Config, attempts: u32) -> Duration {
    let exponent = attempts.saturating_sub(1) as i32;
    let scaled = config.reconnect_interval.as_secs_f64() * config.backoff_multiplier.powi(exponent);
    let capped = scaled.min(config.max_backoff_interval.as_secs_f64());
    Duration::from_secs_f64(capped.max(0.0))
}
