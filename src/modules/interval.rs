//! A minimal periodic collector: ticks on a fixed interval and emits one
//! metric per tick. Demonstrates the plainest possible `Module`
//! implementation (no network I/O), used as the default "heartbeat"
//! module and as a template for modules that just poll a local sensor.
//!
//! This module's own measurement is synthetic. A
//! real deployment would replace [`IntervalModule::sample`] with an actual
//! reading (e.g. a sysfs file, a local sensor library) without touching the
//! supervisor/channel wiring around it.

use std::time::Duration;

use async_trait::async_trait;
use metric::Metric;
use metric_channel::MetricSender;
use module::Module;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// `custom` settings recognized by this module.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Seconds between ticks.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_interval_secs() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

/// Emits an `uptime` metric with a monotonically increasing `ticks` field
/// every `interval_secs` seconds.
pub struct IntervalModule {
    config: Config,
}

impl IntervalModule {
    /// Creates a module from its `custom` configuration object.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    fn sample(tick: u64) -> Metric {
        Metric::new("uptime").field("ticks", tick as i64)
    }
}

#[async_trait]
impl Module for IntervalModule {
    async fn run(&self, scope: CancellationToken, sender: MetricSender) -> Result<(), String> {
        let mut tick: u64 = 0;
        let interval = Duration::from_secs(self.config.interval_secs.max(1));

        loop {
            tokio::select! {
                () = scope.cancelled() => return Ok(()),
                () = tokio::time::sleep(interval) => {}
            }

            let metric = panic_safe::continue_on_fault("interval_sample", "uptime", || Self::sample(tick))
                .unwrap_or_else(|| Metric::new("uptime").field("ticks", 0));

            if sender.try_send(metric) == metric_channel::SendOutcome::Closed {
                debug!("metric channel closed, stopping interval module");
                return Ok(());
            }

            tick += 1;
        }
    }
}
