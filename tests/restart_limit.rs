//! A module that keeps faulting on every restart must eventually breach
//! `module_restart_limit` and end the process non-zero, rather than
//! restart forever.

use std::{collections::HashSet, sync::Arc, time::Duration};

use async_trait::async_trait;
use metric_channel::MetricSender;
use module::{Module, ModuleRegistry};
use supervisor::{Config, Supervisor};
use tokio_util::sync::CancellationToken;

struct NeverResponds;

#[async_trait]
impl Module for NeverResponds {
    async fn run(&self, _scope: CancellationToken, _sender: MetricSender) -> Result<(), String> {
        Err("device unreachable".to_string())
    }
}

#[tokio::test]
async fn persistently_faulting_module_breaches_the_restart_limit() {
    let mut registry = ModuleRegistry::new();
    registry.register("sensor", Arc::new(NeverResponds));

    let supervisor = Supervisor::new(
        registry,
        Config {
            enabled_modules: HashSet::from(["sensor".to_string()]),
            module_restart_limit: 2,
        },
    );

    let result = tokio::time::timeout(Duration::from_secs(15), supervisor.run()).await.expect("supervisor should give up promptly, not hang");

    assert!(result.is_err(), "a persistently faulting module must end the process non-zero");
}
