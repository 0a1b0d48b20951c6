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

//! `metrics-agent` concurrently operates a fixed set of named collector
//! modules, each gathering measurements from an external system (MQTT
//! brokers, HTTP/REST endpoints, WebSocket feeds, OAuth2-protected APIs)
//! and emitting them on a shared channel. A single serializer drains that
//! channel and writes each measurement as one line-protocol line to
//! standard output.
//!
//! This crate is both the library that `src/main.rs` wires into a runnable
//! process and the binary-crate-level integration test surface (see
//! `tests/`); [`run`] is the single entry point both use.

use std::collections::HashSet;

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
mod modules;

pub use error::AppError;

/// Loads configuration (from `explicit_config_path`, or the fallback search
/// path), builds the module registry and supervisor, installs logging, and
/// runs the supervisor to completion.
///
/// Returns `Ok(())` on clean shutdown (exit code 0). On `Err`, the caller
/// should map [`AppError::exit_code`] to the process exit code.
pub async fn run(explicit_config_path: Option<&std::path::Path>) -> Result<(), AppError> {
    let config = config::Config::load("metrics-agent", explicit_config_path)?;
    logging::init(config.log_directive());

    let registry = modules::build_registry(&config.modules);
    let enabled_modules: HashSet<String> = config
        .modules
        .iter()
        .filter(|(_, module_config)| module_config.enabled)
        .map(|(name, _)| name.clone())
        .collect();

    let supervisor = supervisor::Supervisor::new(
        registry,
        supervisor::Config {
            enabled_modules,
            module_restart_limit: config.module_restart_limit,
        },
    );

    supervisor.run().await?;
    Ok(())
}
