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

//! Two wrappers used throughout the process to keep a fault in one unit of
//! work from ever propagating past the wrapper.
//!
//! [`continue_on_fault`] wraps a synchronous unit of work (one loop
//! iteration, one parsed payload) and simply logs and moves on.
//! [`convert_to_error`] wraps an asynchronous unit of work that returns a
//! `Result` (a module entry point, a request handler) and turns a fault into
//! a synthetic, loggable error instead of an unwind.

use std::any::Any;

use tracing::error;

/// All the errors of this crate.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// A unit of work wrapped by [`convert_to_error`] faulted or returned an
    /// application error. The message is always `"fault in {operation}:
    /// {detail}"`.
    #[error("fault in {operation}: {detail}")]
    Fault {
        /// The name of the wrapped operation, as passed to the wrapper.
        operation: String,
        /// The panic payload or the underlying error's `Display` output.
        detail: String,
    },
}

/// Executes a synchronous unit of work. If it panics, the panic is caught,
/// logged with `(operation, context_tag, detail)`, and the wrapper returns
/// `None` instead of unwinding. On success, returns `Some(value)`.
///
/// Used for non-critical steps where a fault in one iteration should not
/// stop the caller: one sensor reading, one processing step in a loop.
pub fn continue_on_fault<F, T>(operation: &str, context_tag: &str, f: F) -> Option<T>
where
    F: FnOnce() -> T + std::panic::UnwindSafe,
{
    match std::panic::catch_unwind(f) {
        Ok(value) => Some(value),
        Err(payload) => {
            let detail = panic_message(&payload);
            error!(operation, context_tag, detail, "fault recovered");
            None
        }
    }
}

/// Executes an asynchronous unit of work that returns a `Result`, on its own
/// tokio task. A panic inside `fut`, or an `Err` it returns, is logged and
/// converted into `Err(Error::Fault { .. })`; nothing ever unwinds past this
/// call.
///
/// Used for module entry points and request handlers, where the caller needs
/// a `Result` it can act on (count a restart, retry a request) rather than a
/// propagated panic.
pub async fn convert_to_error<F, T, E>(operation: &str, fut: F) -> Result<T, Error>
where
    F: std::future::Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: std::fmt::Display,
{
    match tokio::spawn(fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => {
            let detail = err.to_string();
            error!(operation, detail = %detail, "unit of work returned an error");
            Err(Error::Fault {
                operation: operation.to_string(),
                detail,
            })
        }
        Err(join_err) if join_err.is_panic() => {
            let detail = panic_message(&join_err.into_panic());
            error!(operation, detail, "fault recovered");
            Err(Error::Fault {
                operation: operation.to_string(),
                detail,
            })
        }
        Err(_cancelled) => {
            let detail = "task cancelled".to_string();
            error!(operation, detail, "fault recovered");
            Err(Error::Fault {
                operation: operation.to_string(),
                detail,
            })
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continue_on_fault_returns_value_on_success() {
        let result = continue_on_fault("add", "test", || 1 + 1);
        assert_eq!(result, Some(2));
    }

    #[test]
    fn continue_on_fault_swallows_panic() {
        let result: Option<()> = continue_on_fault("boom", "test", || panic!("exploded"));
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn convert_to_error_passes_through_success() {
        let result: Result<i32, Error> =
            convert_to_error("op", async { Ok::<_, std::convert::Infallible>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn convert_to_error_wraps_application_error() {
        let result: Result<i32, Error> =
            convert_to_error("op", async { Err::<i32, _>("bad input") }).await;
        assert_eq!(
            result.unwrap_err(),
            Error::Fault {
                operation: "op".to_string(),
                detail: "bad input".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn convert_to_error_wraps_panic() {
        let result: Result<i32, Error> =
            convert_to_error("op", async { panic!("task exploded") }).await;
        match result {
            Err(Error::Fault { operation, detail }) => {
                assert_eq!(operation, "op");
                assert_eq!(detail, "task exploded");
            }
            Ok(_) => panic!("expected a fault"),
        }
    }
}
