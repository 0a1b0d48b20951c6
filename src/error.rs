//! The process's top-level error type: the only conditions that terminate
//! the process non-zero are a configuration error or a restart-limit
//! breach.

/// Wraps every fatal path that reaches `main`'s exit-code mapping.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum AppError {
    /// The configuration file could not be found, read, or parsed.
    #[error(transparent)]
    Configuration(#[from] crate::config::Error),

    /// A module exceeded `module_restart_limit` consecutive restarts.
    #[error(transparent)]
    RestartLimitExceeded(#[from] supervisor::Error),
}

impl AppError {
    /// The process exit code this error maps to.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Configuration(_) => 2,
            AppError::RestartLimitExceeded(_) => 1,
        }
    }
}
