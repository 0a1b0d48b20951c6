//! Configuration file loading.
//!
//! The file is a plain JSON object; module-specific settings live under each
//! module's own `custom` object and are opaque to the core.

use std::{collections::HashMap, fs, path::{Path, PathBuf}};

use serde::Deserialize;

/// All the errors of this module.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// None of the candidate paths exist and none was given explicitly.
    #[error("no configuration file found (looked at: {searched:?}): pass -c/--config explicitly")]
    NotFound {
        /// The search path candidates that were tried.
        searched: Vec<String>,
    },
    /// The file exists but could not be read.
    #[error("could not read configuration file '{path}': {source}")]
    Read {
        /// The path that failed to read.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file exists and was read, but is not valid configuration JSON.
    #[error("invalid configuration file '{path}': {source}")]
    Parse {
        /// The path that failed to parse.
        path: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// One module's entry under the top-level `modules` map.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleConfig {
    /// Whether the supervisor should run this module.
    pub enabled: bool,
    /// Module-specific settings, opaque to the core.
    #[serde(default)]
    pub custom: serde_json::Value,
}

/// The top-level configuration object.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// One of `debug`, `info`, `warn`, `error` (case-insensitive). Defaults
    /// to `info` when absent.
    #[serde(default)]
    pub log_level: Option<String>,
    /// See `supervisor::Config::module_restart_limit` for how this is
    /// interpreted.
    #[serde(default)]
    pub module_restart_limit: i64,
    /// Module name to module configuration.
    #[serde(default)]
    pub modules: HashMap<String, ModuleConfig>,
}

impl Config {
    /// Loads configuration from `explicit_path` if given, otherwise probes
    /// the fallback search path in order: `./<app>.json`,
    /// `./config/<app>.json`, `./config.json`, `./config/config.json`.
    pub fn load(app: &str, explicit_path: Option<&Path>) -> Result<Self, Error> {
        let path = match explicit_path {
            Some(path) => path.to_path_buf(),
            None => Self::resolve_search_path(app)?,
        };

        let contents = fs::read_to_string(&path).map_err(|source| Error::Read {
            path: path.display().to_string(),
            source,
        })?;

        serde_json::from_str(&contents).map_err(|source| Error::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    fn resolve_search_path(app: &str) -> Result<PathBuf, Error> {
        let candidates = [
            PathBuf::from(format!("./{app}.json")),
            PathBuf::from(format!("./config/{app}.json")),
            PathBuf::from("./config.json"),
            PathBuf::from("./config/config.json"),
        ];

        for candidate in &candidates {
            if candidate.is_file() {
                return Ok(candidate.clone());
            }
        }

        Err(Error::NotFound {
            searched: candidates.iter().map(|p| p.display().to_string()).collect(),
        })
    }

    /// The effective `tracing` filter directive for `log_level`, defaulting
    /// to `info` when absent or unrecognized.
    pub fn log_directive(&self) -> &str {
        match self.log_level.as_deref().map(str::to_lowercase).as_deref() {
            Some("debug") => "debug",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "info",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.json");
        let mut file = fs::File::create(&path).unwrap();
        write!(file, r#"{{"log_level": "debug", "module_restart_limit": 3, "modules": {{}}}}"#).unwrap();

        let config = Config::load("metrics-agent", Some(&path)).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.module_restart_limit, 3);
    }

    #[test]
    fn missing_file_reports_every_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let original = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        let result = Config::load("metrics-agent", None);
        std::env::set_current_dir(original).unwrap();

        match result {
            Err(Error::NotFound { searched }) => assert_eq!(searched.len(), 4),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn log_directive_is_case_insensitive_with_a_sane_default() {
        let mut config = Config {
            log_level: Some("WARN".to_string()),
            module_restart_limit: 0,
            modules: HashMap::new(),
        };
        assert_eq!(config.log_directive(), "warn");
        config.log_level = None;
        assert_eq!(config.log_directive(), "info");
        config.log_level = Some("nonsense".to_string());
        assert_eq!(config.log_directive(), "info");
    }

    #[test]
    fn module_custom_defaults_to_null_when_absent() {
        let json = r#"{"modules": {"demo": {"enabled": true}}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.modules["demo"].custom.is_null());
    }
}
