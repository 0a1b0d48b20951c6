//! Demonstration collector modules and the registry wiring that turns a
//! loaded `Config` into a populated `module::ModuleRegistry`. The concrete
//! payload parsers of individual vendor modules are deliberately minimal
//! here.

use std::sync::Arc;

use module::ModuleRegistry;

use crate::config::ModuleConfig;

mod http_oauth;
mod interval;
mod websocket;

/// The app name under which per-module `KvStore`s are namespaced
/// (`/var/lib/<app>/...`).
const APP_NAME: &str = "metrics-agent";

/// Builds the process-wide module registry from every entry in the
/// configuration file's `modules` map, matching each name against a
/// built-in collector. Populated once at startup; read-only thereafter. An
/// unrecognized name, or a `custom` object that does not match the matched
/// collector's expected shape, is logged and skipped rather than failing
/// the whole process — module-specific configuration validation is a
/// module concern.
pub fn build_registry(modules: &std::collections::HashMap<String, ModuleConfig>) -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();

    for (name, module_config) in modules {
        register_one(&mut registry, name, &module_config.custom);
    }

    registry
}

fn register_one(registry: &mut ModuleRegistry, name: &str, custom: &serde_json::Value) {
    match name {
        "uptime" => {
            let config = serde_json::from_value(custom.clone()).unwrap_or_default();
            registry.register(name, Arc::new(interval::IntervalModule::new(config)));
        }
        "opendtu" => match serde_json::from_value::<websocket::Config>(custom.clone()) {
            Ok(config) => registry.register(name, Arc::new(websocket::WebSocketModule::new(name, config))),
            Err(error) => tracing::error!(module = name, %error, "invalid 'custom' config, module not started"),
        },
        "netatmo" => match serde_json::from_value::<http_oauth::Config>(custom.clone()) {
            Ok(config) => registry.register(
                name,
                Arc::new(http_oauth::HttpOAuthModule::new(name, APP_NAME, name, config)),
            ),
            Err(error) => tracing::error!(module = name, %error, "invalid 'custom' config, module not started"),
        },
        other => tracing::warn!(module = other, "no built-in collector registered under this name"),
    }
}
