//! Full pipeline round trip: two independent modules registered under
//! `module::ModuleRegistry`, running concurrently over one
//! `metric_channel::MetricChannel`, drained by one
//! `metric_channel::Serializer` into an in-memory buffer.

use std::sync::Arc;

use async_trait::async_trait;
use metric::Metric;
use metric_channel::{MetricChannel, MetricSender, Serializer};
use module::{Module, ModuleRegistry};
use tokio_util::sync::CancellationToken;

struct FixedReading {
    name: &'static str,
    value: i64,
}

#[async_trait]
impl Module for FixedReading {
    async fn run(&self, _scope: CancellationToken, sender: MetricSender) -> Result<(), String> {
        let _ = sender.try_send(Metric::new(self.name).field("v", self.value));
        Ok(())
    }
}

#[tokio::test]
async fn two_modules_produce_one_line_each_in_order_sent() {
    let mut registry = ModuleRegistry::new();
    registry.register("alpha", Arc::new(FixedReading { name: "alpha", value: 1 }));
    registry.register("beta", Arc::new(FixedReading { name: "beta", value: 2 }));
    let registry = Arc::new(registry);

    let mut channel = MetricChannel::new();
    let receiver = channel.take_receiver().unwrap();
    let mut out = Vec::new();
    let serializer = Serializer::new(receiver, channel.abort_signal(), &mut out);
    let serializer_handle = tokio::spawn(serializer.run());

    let scope = CancellationToken::new();
    let alpha = registry.run(scope.clone(), "alpha", channel.sender_for("alpha"));
    let beta = registry.run(scope.clone(), "beta", channel.sender_for("beta"));
    let (alpha_result, beta_result) = tokio::join!(alpha, beta);
    assert!(alpha_result.is_ok());
    assert!(beta_result.is_ok());

    channel.close();
    drop(channel);
    serializer_handle.await.unwrap();

    let text = String::from_utf8(out).unwrap();
    let mut lines: Vec<&str> = text.lines().collect();
    lines.sort_unstable();
    assert_eq!(lines, vec!["alpha v=1i", "beta v=2i"]);
}

#[tokio::test]
async fn unregistered_module_name_is_reported_without_affecting_others() {
    let mut registry = ModuleRegistry::new();
    registry.register("alpha", Arc::new(FixedReading { name: "alpha", value: 1 }));
    let registry = Arc::new(registry);

    let channel = MetricChannel::new();
    let scope = CancellationToken::new();

    let result = registry.run(scope.clone(), "ghost", channel.sender_for("ghost")).await;
    assert!(result.is_err());

    let result = registry.run(scope, "alpha", channel.sender_for("alpha")).await;
    assert!(result.is_ok());
}
