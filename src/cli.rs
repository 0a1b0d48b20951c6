//! Command-line surface.

use std::path::PathBuf;

use clap::Parser;

/// Long-running agent that concurrently operates a fixed set of collector
/// modules and serializes their measurements to a line-protocol stream.
#[derive(Parser, Debug)]
#[command(name = "metrics-agent", disable_version_flag = true)]
pub struct Cli {
    /// Print `<name> <version> (<os> <arch>)` to standard error and exit 0.
    #[arg(long)]
    pub version: bool,

    /// Path to the configuration file. If absent, the fallback search path
    /// is probed (see `config::Config::load`).
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Renders the `--version` line: `<name> <version> (<os> <arch>)`.
pub fn version_line() -> String {
    format!(
        "{} {} ({} {})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_line_includes_os_and_arch() {
        let line = version_line();
        assert!(line.contains(std::env::consts::OS));
        assert!(line.contains(std::env::consts::ARCH));
        assert!(line.starts_with("metrics-agent "));
    }

    #[test]
    fn parses_short_and_long_config_flag() {
        let cli = Cli::parse_from(["metrics-agent", "-c", "a.json"]);
        assert_eq!(cli.config, Some(PathBuf::from("a.json")));

        let cli = Cli::parse_from(["metrics-agent", "--config", "b.json"]);
        assert_eq!(cli.config, Some(PathBuf::from("b.json")));
    }

    #[test]
    fn version_flag_defaults_to_false() {
        let cli = Cli::parse_from(["metrics-agent"]);
        assert!(!cli.version);
    }
}
