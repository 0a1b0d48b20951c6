//! Per-module process state.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Instant,
};

/// How many consecutive restarts a module may accumulate before the
/// supervisor cancels the whole scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartLimit {
    /// At most this many consecutive restarts.
    Bounded(u32),
    /// No limit. Logged once as not recommended.
    Unlimited,
}

/// Resolves the raw `module_restart_limit` config value: `> 0` is used
/// as-is, `= 0` means unlimited (and is logged), `< 0` falls back to the
/// default of 3.
pub fn resolve_restart_limit(configured: i64) -> RestartLimit {
    match configured {
        n if n > 0 => RestartLimit::Bounded(n as u32),
        0 => {
            tracing::warn!("module_restart_limit = 0: unlimited restarts are not recommended");
            RestartLimit::Unlimited
        }
        _ => RestartLimit::Bounded(3),
    }
}

/// The supervisor's view of one module's task.
#[derive(Debug, Clone)]
pub struct ModuleState {
    /// The module's registered name.
    pub name: String,
    /// Consecutive restarts since the module last exited gracefully.
    pub restart_count: u32,
    /// When the current attempt started.
    pub last_started_at: Instant,
    /// Set while the supervisor is waiting for this module's task to stop.
    pub stopping: bool,
    /// Set while this module is between a fault and its next restart.
    pub restarting: bool,
}

impl ModuleState {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            restart_count: 0,
            last_started_at: Instant::now(),
            stopping: false,
            restarting: false,
        }
    }
}

/// The supervisor's table of per-module state, internally locked so a
/// module's own supervisor task and the stop/restart orchestrator can both
/// touch it without holding the lock across a suspension point.
#[derive(Clone, Default)]
pub struct ProcessState {
    modules: Arc<Mutex<HashMap<String, ModuleState>>>,
}

impl ProcessState {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name` with fresh state, called once when its task spawns.
    pub fn start(&self, name: &str) {
        let mut guard = self.modules.lock().expect("process state lock poisoned");
        let _ = guard.insert(name.to_string(), ModuleState::new(name));
    }

    /// Marks an attempt as started, bumping `last_started_at`.
    pub fn mark_started(&self, name: &str) {
        let mut guard = self.modules.lock().expect("process state lock poisoned");
        if let Some(state) = guard.get_mut(name) {
            state.last_started_at = Instant::now();
            state.restarting = false;
        }
    }

    /// Increments and returns the new restart count for `name`.
    pub fn increment_restart(&self, name: &str) -> u32 {
        let mut guard = self.modules.lock().expect("process state lock poisoned");
        let state = guard.get_mut(name).expect("module state must exist before increment");
        state.restart_count += 1;
        state.restarting = true;
        state.restart_count
    }

    /// Marks `name` as being stopped.
    pub fn mark_stopping(&self, name: &str) {
        let mut guard = self.modules.lock().expect("process state lock poisoned");
        if let Some(state) = guard.get_mut(name) {
            state.stopping = true;
        }
    }

    /// Takes a point-in-time snapshot of every tracked module's state.
    /// Used by `StopAll`/`RestartAll`-style orchestration, which must not
    /// hold the lock across a suspension point.
    pub fn snapshot(&self) -> Vec<ModuleState> {
        self.modules.lock().expect("process state lock poisoned").values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_limit_is_used_as_is() {
        assert_eq!(resolve_restart_limit(3), RestartLimit::Bounded(3));
    }

    #[test]
    fn zero_means_unlimited() {
        assert_eq!(resolve_restart_limit(0), RestartLimit::Unlimited);
    }

    #[test]
    fn negative_falls_back_to_default_of_three() {
        assert_eq!(resolve_restart_limit(-1), RestartLimit::Bounded(3));
    }

    #[test]
    fn restart_count_increments_and_snapshots() {
        let state = ProcessState::new();
        state.start("demo");
        assert_eq!(state.increment_restart("demo"), 1);
        assert_eq!(state.increment_restart("demo"), 2);
        let snapshot = state.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].restart_count, 2);
    }
}
