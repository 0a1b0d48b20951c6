//! The single consumer task that drains the metric channel.

use std::{io::Write, sync::Arc};

use metric::Metric;
use tokio::sync::Notify;
use tracing::{trace, warn};

/// Drains a metric channel and writes one line-protocol line per valid
/// metric to a writer (normally standard output).
pub struct Serializer<W: Write + Send> {
    receiver: flume::Receiver<Metric>,
    abort: Arc<Notify>,
    writer: W,
}

impl<W: Write + Send> Serializer<W> {
    /// Creates a new serializer over the given receiver and writer.
    pub fn new(receiver: flume::Receiver<Metric>, abort: Arc<Notify>, writer: W) -> Self {
        Self { receiver, abort, writer }
    }

    /// Runs the drain loop until the channel disconnects (every sender
    /// dropped) or the abort signal fires. A metric that fails validation
    /// is dropped with a logged warning; it never aborts the loop.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                biased;

                () = self.abort.notified() => {
                    trace!("serializer drain aborted");
                    return;
                }

                received = self.receiver.recv_async() => {
                    match received {
                        Ok(metric) => self.emit(metric),
                        Err(_disconnected) => {
                            trace!("metric channel drained and closed");
                            return;
                        }
                    }
                }
            }
        }
    }

    fn emit(&mut self, metric: Metric) {
        match metric.serialize() {
            Ok(line) => {
                if let Err(error) = writeln!(self.writer, "{line}") {
                    warn!(%error, "failed to write metric line");
                }
            }
            Err(error) => {
                warn!(metric = %metric.name(), %error, "dropping invalid metric");
            }
        }
    }
}
