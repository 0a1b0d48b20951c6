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

//! The bounded, multi-producer / single-consumer channel between collector
//! modules and the serializer, plus the serializer task itself.
//!
//! Producers call [`MetricSender::try_send`] for the default non-blocking
//! backpressure policy (drop-and-warn when full), or [`MetricSender::send`]
//! when a module's correctness depends on not losing a measurement. Exactly
//! one consumer, the [`Serializer`], drains the channel and writes one
//! line-protocol line per valid metric to its configured writer.

use std::{
    io::Write,
    sync::{atomic::{AtomicBool, Ordering}, Arc, Mutex},
};

use metric::Metric;
use tokio::sync::Notify;
use tracing::warn;

mod serializer;

pub use serializer::Serializer;

/// The default channel capacity.
pub const DEFAULT_CAPACITY: usize = 100;

/// The outcome of a send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The metric was enqueued.
    Sent,
    /// The channel was full and the metric was dropped (non-blocking sends
    /// only).
    Dropped,
    /// The channel is closed; the caller should treat this as a graceful
    /// stop, not an error.
    Closed,
}

/// A channel endpoint handed to one collector module. Cheap to clone; every
/// module gets its own clone carrying its own name for diagnostics.
#[derive(Clone)]
pub struct MetricSender {
    inner: flume::Sender<Metric>,
    module: String,
    closed: Arc<AtomicBool>,
}

impl MetricSender {
    /// Attempts to enqueue a metric without blocking. If the channel is full,
    /// the metric is dropped and a warning naming the producing module is
    /// logged. This is the default and recommended send path.
    pub fn try_send(&self, metric: Metric) -> SendOutcome {
        if self.closed.load(Ordering::Acquire) {
            return SendOutcome::Closed;
        }

        match self.inner.try_send(metric) {
            Ok(()) => SendOutcome::Sent,
            Err(flume::TrySendError::Full(_)) => {
                warn!(module = %self.module, "metric channel full, dropping metric");
                SendOutcome::Dropped
            }
            Err(flume::TrySendError::Disconnected(_)) => SendOutcome::Closed,
        }
    }

    /// Enqueues a metric, waiting for room if the channel is full. Modules
    /// MAY use this instead of `try_send` when losing the measurement would
    /// be incorrect, at the cost of being able to block that module's task.
    pub async fn send(&self, metric: Metric) -> SendOutcome {
        if self.closed.load(Ordering::Acquire) {
            return SendOutcome::Closed;
        }

        match self.inner.send_async(metric).await {
            Ok(()) => SendOutcome::Sent,
            Err(_disconnected) => SendOutcome::Closed,
        }
    }

    /// The name of the module this sender was issued to.
    pub fn module_name(&self) -> &str {
        &self.module
    }
}

/// Owns the channel between modules and the serializer: the sending side is
/// handed out (cloned, one per module) via [`MetricChannel::sender_for`], and
/// the receiving side is taken exactly once by the serializer task.
pub struct MetricChannel {
    sender: Mutex<Option<flume::Sender<Metric>>>,
    receiver: Option<flume::Receiver<Metric>>,
    closed: Arc<AtomicBool>,
    abort: Arc<Notify>,
}

impl MetricChannel {
    /// Creates a new channel with the given bounded capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, receiver) = flume::bounded(capacity);
        Self {
            sender: Mutex::new(Some(sender)),
            receiver: Some(receiver),
            closed: Arc::new(AtomicBool::new(false)),
            abort: Arc::new(Notify::new()),
        }
    }

    /// Creates a new channel with the default capacity (100).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Returns a new sender endpoint for the named module. Must not be
    /// called after [`MetricChannel::close`].
    pub fn sender_for(&self, module: impl Into<String>) -> MetricSender {
        let inner = self
            .sender
            .lock()
            .expect("metric channel sender lock poisoned")
            .as_ref()
            .expect("sender_for called after the channel was closed")
            .clone();
        MetricSender {
            inner,
            module: module.into(),
            closed: self.closed.clone(),
        }
    }

    /// Takes the receiving end of the channel, to be handed to exactly one
    /// [`Serializer`]. Returns `None` if already taken.
    pub fn take_receiver(&mut self) -> Option<flume::Receiver<Metric>> {
        self.receiver.take()
    }

    /// A clone of the abort signal, for constructing a [`Serializer`].
    pub fn abort_signal(&self) -> Arc<Notify> {
        self.abort.clone()
    }

    /// Closes the channel: idempotent, and safe to call even while module
    /// senders are still alive. Marks the channel closed so that further
    /// sends are treated as a graceful stop by producers, and drops this
    /// channel's own reference-counted sender. Per §4.2/§4.5, the serializer
    /// then drains whatever is already buffered and exits on its own once
    /// every other `MetricSender` clone (one per module task) has also been
    /// dropped, which happens as each module task returns. This does *not*
    /// abort the drain immediately; use [`MetricChannel::abort_drain`] for
    /// that.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let _ = self.sender.lock().expect("metric channel sender lock poisoned").take();
    }

    /// Aborts the serializer's drain loop immediately, even if senders still
    /// hold the channel open. Reserved for the supervisor's §5 stop timeout:
    /// when a module task fails to return within the timeout, its
    /// `MetricSender` clone keeps the channel from ever fully disconnecting,
    /// so the serializer must be told to stop rather than wait forever.
    pub fn abort_drain(&self) {
        self.abort.notify_waiters();
    }
}

impl Default for MetricChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// A sink the serializer writes line-protocol text to. Implemented for any
/// `std::io::Write`, so tests can substitute an in-memory buffer for stdout.
pub trait LineSink: Write + Send {}
impl<T: Write + Send> LineSink for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn backpressure_drops_when_full() {
        let channel = MetricChannel::with_capacity(1);
        let sender = channel.sender_for("test");

        assert_eq!(sender.try_send(Metric::new("m").field("v", 1)), SendOutcome::Sent);
        assert_eq!(sender.try_send(Metric::new("m").field("v", 2)), SendOutcome::Dropped);
    }

    #[tokio::test]
    async fn closed_channel_is_graceful() {
        let channel = MetricChannel::new();
        let sender = channel.sender_for("test");
        channel.close();
        assert_eq!(sender.try_send(Metric::new("m").field("v", 1)), SendOutcome::Closed);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let channel = MetricChannel::new();
        channel.close();
        channel.close();
        assert!(channel.closed.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn close_drains_buffered_metrics_once_module_senders_drop() {
        let mut channel = MetricChannel::new();
        let receiver = channel.take_receiver().unwrap();
        let sender = channel.sender_for("module");

        assert_eq!(sender.try_send(Metric::new("m").field("v", 1)), SendOutcome::Sent);

        // Closing drops the channel's own sender, but the module's clone is
        // still alive, so the receiver must not see a disconnect yet.
        channel.close();
        assert!(!receiver.is_disconnected());

        // Once every module clone is also dropped, the channel disconnects
        // on its own, with no need for `abort_drain`.
        drop(sender);
        assert_eq!(receiver.recv_async().await.unwrap().name(), "m");
        assert!(receiver.recv_async().await.is_err());
    }
}
