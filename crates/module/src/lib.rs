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

//! The process-wide, name-to-entry-point table of collector modules.
//!
//! Populated once at startup (see [`ModuleRegistry::register`]) and read-only
//! thereafter; the supervisor is the sole caller of [`ModuleRegistry::run`].

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use metric_channel::MetricSender;
use tokio_util::sync::CancellationToken;

/// All the errors of this crate.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// No module is registered under this name.
    #[error("unknown module: {name}")]
    UnknownModule {
        /// The name that was looked up.
        name: String,
    },
    /// The module's entry point faulted or returned an error; see
    /// [`panic_safe::Error`].
    #[error(transparent)]
    Fault(#[from] panic_safe::Error),
}

/// A collector module's entry point: accepts a cancellation scope and a
/// sending endpoint of the metric channel, and runs until it stops
/// gracefully (`Ok`) or fails (`Err` with a human-readable reason).
#[async_trait]
pub trait Module: Send + Sync {
    /// Runs the module until it stops gracefully or fails. Implementations
    /// must return promptly once `scope` is cancelled.
    async fn run(&self, scope: CancellationToken, sender: MetricSender) -> Result<(), String>;
}

/// A process-wide mapping from module name to entry point. Written only
/// during startup; reads thereafter need no synchronization.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    entries: HashMap<String, Arc<dyn Module>>,
}

impl ModuleRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module under `name`, overwriting any existing entry of
    /// the same name. Not thread-safe; call only during startup before the
    /// supervisor begins reading the registry.
    pub fn register(&mut self, name: impl Into<String>, entry: Arc<dyn Module>) {
        let _ = self.entries.insert(name.into(), entry);
    }

    /// Returns the entry registered under `name`.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Module>, Error> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownModule { name: name.to_string() })
    }

    /// Returns all registered names, in unspecified order.
    pub fn list(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Looks up `name`, then runs its entry point under the convert-to-error
    /// wrapper: a panic or returned error becomes `Err(Error::Fault(..))`
    /// rather than propagating.
    pub async fn run(&self, scope: CancellationToken, name: &str, sender: MetricSender) -> Result<(), Error> {
        let entry = self.get(name)?;
        let result = panic_safe::convert_to_error(name, async move { entry.run(scope, sender).await }).await;
        result.map(|()| ()).map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metric::Metric;
    use metric_channel::MetricChannel;

    struct AlwaysOk;

    #[async_trait]
    impl Module for AlwaysOk {
        async fn run(&self, _scope: CancellationToken, sender: MetricSender) -> Result<(), String> {
            let _ = sender.try_send(Metric::new("m").field("v", 1));
            Ok(())
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl Module for AlwaysFails {
        async fn run(&self, _scope: CancellationToken, _sender: MetricSender) -> Result<(), String> {
            Err("device unreachable".to_string())
        }
    }

    #[tokio::test]
    async fn unknown_module_is_reported() {
        let registry = ModuleRegistry::new();
        let channel = MetricChannel::new();
        let result = registry.run(CancellationToken::new(), "ghost", channel.sender_for("ghost")).await;
        assert_eq!(result.unwrap_err(), Error::UnknownModule { name: "ghost".to_string() });
    }

    #[tokio::test]
    async fn registered_module_runs_and_sends() {
        let mut registry = ModuleRegistry::new();
        registry.register("demo", Arc::new(AlwaysOk));
        let channel = MetricChannel::new();
        let result = registry.run(CancellationToken::new(), "demo", channel.sender_for("demo")).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn failing_module_is_wrapped_as_fault() {
        let mut registry = ModuleRegistry::new();
        registry.register("demo", Arc::new(AlwaysFails));
        let channel = MetricChannel::new();
        let result = registry.run(CancellationToken::new(), "demo", channel.sender_for("demo")).await;
        assert!(matches!(result, Err(Error::Fault(panic_safe::Error::Fault { .. }))));
    }

    #[test]
    fn register_overwrites_existing_entry() {
        let mut registry = ModuleRegistry::new();
        registry.register("demo", Arc::new(AlwaysOk));
        registry.register("demo", Arc::new(AlwaysFails));
        assert_eq!(registry.list(), vec!["demo".to_string()]);
    }
}
