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

//! The per-module restart loop, operator signal handling, and graceful
//! shutdown/reload coordination.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    time::Duration,
};

use metric_channel::{MetricChannel, Serializer};
use module::ModuleRegistry;
use task::{labels::TaskLabels, TaskManager};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub mod signal;
mod state;

pub use signal::OperatorSignal;
pub use state::{resolve_restart_limit, ModuleState, ProcessState, RestartLimit};

/// Fixed delay between restart attempts.
const RESTART_DELAY: Duration = Duration::from_secs(1);

/// Upper bound on waiting for a module task to return after cancellation.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// All the errors of this crate.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// A module exceeded `module_restart_limit` consecutive restarts; the
    /// whole process must exit non-zero.
    #[error("module '{module}' exceeded the restart limit")]
    RestartLimitExceeded {
        /// The module that breached the limit.
        module: String,
    },
}

/// Supervisor configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// The set of module names to run this generation.
    pub enabled_modules: HashSet<String>,
    /// See [`resolve_restart_limit`] for how this is interpreted.
    pub module_restart_limit: i64,
}

/// What a completed generation (one run of the enabled module set) decided
/// to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GenerationOutcome {
    /// Exit the process cleanly.
    Terminate,
    /// Tear down and start a fresh generation from the same configuration.
    Reload,
}

/// Runs every enabled module under a restart policy, reacting to operator
/// signals, until a terminate/interrupt signal or a restart-limit breach
/// ends the process.
pub struct Supervisor {
    registry: Arc<ModuleRegistry>,
    config: Config,
}

impl Supervisor {
    /// Creates a supervisor over `registry`, running the modules named in
    /// `config.enabled_modules`.
    pub fn new(registry: ModuleRegistry, config: Config) -> Self {
        Self {
            registry: Arc::new(registry),
            config,
        }
    }

    /// Runs generations until terminate/interrupt or a restart-limit breach.
    /// Returns `Ok(())` on clean shutdown, `Err` on restart-limit breach —
    /// callers should map the latter to a non-zero exit code.
    pub async fn run(&self) -> Result<(), Error> {
        loop {
            match self.run_generation().await? {
                GenerationOutcome::Terminate => return Ok(()),
                GenerationOutcome::Reload => {
                    info!("reload complete, starting next generation from the existing configuration");
                }
            }
        }
    }

    async fn run_generation(&self) -> Result<GenerationOutcome, Error> {
        let scope = CancellationToken::new();
        let mut channel = MetricChannel::new();
        let receiver = channel.take_receiver().expect("a freshly built channel always has a receiver");
        let serializer = Serializer::new(receiver, channel.abort_signal(), std::io::stdout());
        let serializer_handle = tokio::spawn(serializer.run());

        let enabled: Vec<String> = self
            .registry
            .list()
            .into_iter()
            .filter(|name| self.config.enabled_modules.contains(name))
            .collect();

        if enabled.is_empty() {
            info!("no enabled modules, exiting cleanly");
            channel.close();
            let _ = serializer_handle.await;
            return Ok(GenerationOutcome::Terminate);
        }

        let limit = resolve_restart_limit(self.config.module_restart_limit);
        let process_state = ProcessState::new();
        let task_manager = TaskManager::new();
        let breach: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

        for name in &enabled {
            process_state.start(name);
            self.spawn_module_task(name.clone(), scope.clone(), &channel, &process_state, limit, breach.clone(), &task_manager);
        }

        let event = tokio::select! {
            () = task_manager.join() => Event::AllExited,
            operator_signal = signal::next() => Event::Signal(operator_signal),
        };

        match event {
            Event::Signal(operator_signal) => {
                info!(?operator_signal, "operator signal received, initiating graceful shutdown");
                scope.cancel();
                let stop_timed_out = tokio::time::timeout(STOP_TIMEOUT, task_manager.join()).await.is_err();
                channel.close();
                if stop_timed_out {
                    // A straggler's `MetricSender` clone would otherwise keep
                    // the channel from ever disconnecting; abort the drain
                    // instead of waiting on it forever.
                    warn!("stop timeout elapsed, aborting the drain; stragglers will be reaped when they return");
                    channel.abort_drain();
                }
                let _ = serializer_handle.await;

                match operator_signal {
                    OperatorSignal::Terminate | OperatorSignal::Interrupt => Ok(GenerationOutcome::Terminate),
                    OperatorSignal::Reload => Ok(GenerationOutcome::Reload),
                }
            }
            Event::AllExited => {
                // Every module task already returned, so every `MetricSender`
                // clone besides the channel's own is already gone; closing
                // disconnects the channel immediately and the serializer
                // drains to completion on its own.
                channel.close();
                let _ = serializer_handle.await;

                match breach.lock().expect("breach lock poisoned").clone() {
                    Some(module) => Err(Error::RestartLimitExceeded { module }),
                    None => Ok(GenerationOutcome::Terminate),
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_module_task(
        &self,
        name: String,
        scope: CancellationToken,
        channel: &MetricChannel,
        process_state: &ProcessState,
        limit: RestartLimit,
        breach: Arc<Mutex<Option<String>>>,
        task_manager: &TaskManager,
    ) {
        let registry = self.registry.clone();
        let sender = channel.sender_for(name.clone());
        let state = process_state.clone();
        let labels = TaskLabels::new("module", &name, "supervisor");
        let labels_for_task = labels.clone();

        let handle = tokio::spawn(async move {
            loop {
                state.mark_started(&name);
                info!(module = %name, "starting module");

                let result = registry.run(scope.clone(), &name, sender.clone()).await;

                if scope.is_cancelled() {
                    info!(module = %name, "module stopped on scope cancellation");
                    break;
                }

                match &result {
                    Ok(()) => info!(module = %name, "module returned, restarting per policy"),
                    Err(error) => warn!(module = %name, %error, "module faulted, restarting per policy"),
                }

                let restart_count = state.increment_restart(&name);

                if let RestartLimit::Bounded(max) = limit {
                    if restart_count >= max {
                        error!(module = %name, restart_count, max, "restart limit reached, cancelling scope");
                        *breach.lock().expect("breach lock poisoned") = Some(name.clone());
                        scope.cancel();
                        break;
                    }
                }

                tokio::select! {
                    () = scope.cancelled() => break,
                    () = tokio::time::sleep(RESTART_DELAY) => {}
                }
            }

            state.mark_stopping(&name);
            TaskManager::no_task_cleaner(Default::default(), labels_for_task)
        });

        let mut task_manager = task_manager.clone();
        task_manager.register(handle, &labels);
    }
}

enum Event {
    AllExited,
    Signal(OperatorSignal),
}
