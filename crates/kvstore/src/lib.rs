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

//! A thread-safe, JSON-file-backed map used for module state and cached
//! OAuth2 tokens.
//!
//! Every mutation is a load-mutate-save cycle under an exclusive lock, so
//! the file on disk is always a consistent snapshot of the in-memory map. A
//! missing, empty, or corrupted file is treated as empty state rather than a
//! fatal error, since losing a token cache should only cost a re-auth, not a
//! crash.

use std::{
    collections::HashMap,
    fs,
    io,
    path::{Path, PathBuf},
    sync::RwLock,
};

use serde_json::Value;
use tracing::warn;

/// All the errors of this crate.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// None of the candidate paths (§4.8) could be created or written.
    #[error("no writable storage path found for module '{module}'")]
    NoWritablePath {
        /// The module the store was opened for.
        module: String,
    },
    /// A read or write to the backing file failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A thread-safe map of string keys to dynamic JSON values, persisted to a
/// single file.
pub struct KvStore {
    path: PathBuf,
    data: RwLock<HashMap<String, Value>>,
}

impl KvStore {
    /// Opens (creating if absent) the store for `module` under `app`'s data
    /// directory, trying candidate paths in order until one is writable:
    /// `/var/lib/<app>/<module>-storage.json`, `./.data/<module>-storage.json`,
    /// `./.<module>-storage.json`.
    pub fn open(app: &str, module: &str) -> Result<Self, Error> {
        let path = select_path(app, module)?;
        let data = load(&path);
        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Opens a store at an exact path, bypassing path selection. Used by
    /// tests and by callers that already know where storage should live.
    pub fn open_at(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = load(&path);
        Self {
            path,
            data: RwLock::new(data),
        }
    }

    /// Sets `key` to `value` and persists the store.
    pub fn set(&self, key: &str, value: Value) -> Result<(), Error> {
        let mut guard = self.data.write().expect("kvstore lock poisoned");
        let _ = guard.insert(key.to_string(), value);
        self.persist(&guard)
    }

    /// Returns the value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.read().expect("kvstore lock poisoned").get(key).cloned()
    }

    /// Returns the string value for `key`, or `""` if absent or not a string.
    pub fn get_string(&self, key: &str) -> String {
        self.get(key).and_then(|v| v.as_str().map(str::to_string)).unwrap_or_default()
    }

    /// Returns the integer value for `key`, or `0` if absent or not an
    /// integer.
    pub fn get_int(&self, key: &str) -> i64 {
        self.get(key).and_then(|v| v.as_i64()).unwrap_or(0)
    }

    /// Returns the floating-point value for `key`, or `0.0` if absent or not
    /// numeric.
    pub fn get_float(&self, key: &str) -> f64 {
        self.get(key).and_then(|v| v.as_f64()).unwrap_or(0.0)
    }

    /// Returns the boolean value for `key`, or `false` if absent or not a
    /// boolean.
    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
    }

    /// Removes `key`, if present, and persists the store.
    pub fn delete(&self, key: &str) -> Result<(), Error> {
        let mut guard = self.data.write().expect("kvstore lock poisoned");
        let _ = guard.remove(key);
        self.persist(&guard)
    }

    /// Returns whether `key` is present.
    pub fn exists(&self, key: &str) -> bool {
        self.data.read().expect("kvstore lock poisoned").contains_key(key)
    }

    /// Returns all keys currently present, in unspecified order.
    pub fn keys(&self) -> Vec<String> {
        self.data.read().expect("kvstore lock poisoned").keys().cloned().collect()
    }

    /// Removes every key and persists the now-empty store.
    pub fn clear(&self) -> Result<(), Error> {
        let mut guard = self.data.write().expect("kvstore lock poisoned");
        guard.clear();
        self.persist(&guard)
    }

    /// The path this store is persisted to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, data: &HashMap<String, Value>) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::File::create(&self.path)?;
        serde_json::to_writer_pretty(&file, data).map_err(io::Error::from)?;
        set_permissions(&self.path)?;
        Ok(())
    }
}

fn load(path: &Path) -> HashMap<String, Value> {
    match fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|error| {
            warn!(path = %path.display(), %error, "corrupted storage file, starting from empty state");
            HashMap::new()
        }),
        Err(_) => HashMap::new(),
    }
}

/// 0600 under `/var/`, 0644 otherwise.
#[cfg(unix)]
fn set_permissions(path: &Path) -> Result<(), Error> {
    use std::os::unix::fs::PermissionsExt;

    let mode = if path.starts_with("/var/") { 0o600 } else { 0o644 };
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_permissions(_path: &Path) -> Result<(), Error> {
    Ok(())
}

fn select_path(app: &str, module: &str) -> Result<PathBuf, Error> {
    let candidates = [
        PathBuf::from(format!("/var/lib/{app}/{module}-storage.json")),
        PathBuf::from(format!("./.data/{module}-storage.json")),
        PathBuf::from(format!("./.{module}-storage.json")),
    ];

    for candidate in candidates {
        if probe_writable(&candidate) {
            return Ok(candidate);
        }
    }

    Err(Error::NoWritablePath { module: module.to_string() })
}

fn probe_writable(path: &Path) -> bool {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    if fs::create_dir_all(parent).is_err() {
        return false;
    }

    let probe = parent.join(".kvstore-probe");
    let writable = fs::write(&probe, b"").is_ok();
    let _ = fs::remove_file(&probe);
    writable
}
