//! Process entry point: parses the command line, then hands off to
//! `metrics_agent::run`.

use clap::Parser;
use metrics_agent::{cli::{version_line, Cli}, AppError};
use tracing::error;

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    if args.version {
        eprintln!("{}", version_line());
        std::process::exit(0);
    }

    if let Err(error) = metrics_agent::run(args.config.as_deref()).await {
        // A configuration error can occur before `run` reaches
        // `logging::init`, when no `tracing` subscriber is installed yet and
        // `error!` would be silently dropped; print it directly instead so
        // it still reaches standard error.
        if let AppError::Configuration(_) = &error {
            eprintln!("fatal error: {error}");
        } else {
            error!(%error, "fatal error");
        }
        std::process::exit(error.exit_code());
    }
}
