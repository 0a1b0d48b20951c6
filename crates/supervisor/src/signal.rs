//! Operator signal handling.

/// An operator-initiated lifecycle trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorSignal {
    /// Initiate graceful shutdown, then exit.
    Terminate,
    /// Initiate graceful shutdown, then exit. Distinguished from `Terminate`
    /// only for logging; handled identically.
    Interrupt,
    /// Initiate graceful shutdown of the current module set, then restart
    /// it without re-reading configuration.
    Reload,
}

/// Waits for the next recognized operator signal. On Unix, `SIGINT` maps to
/// `Interrupt`, `SIGTERM` to `Terminate`, and `SIGHUP` to `Reload` — the
/// nearest equivalent of a reload trigger on platforms without a dedicated
/// one.
pub async fn next() -> OperatorSignal {
    let interrupt = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    #[cfg(unix)]
    let reload = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
            .expect("failed to install SIGHUP handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let reload = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => OperatorSignal::Interrupt,
        () = terminate => OperatorSignal::Terminate,
        () = reload => OperatorSignal::Reload,
    }
}
