//! The `tracing` backend: every diagnostic is written to standard error as
//! `<timestamp> [<LEVEL>] [<file>:<line>] <message>`.

use std::fmt;

use tracing_subscriber::{
    fmt::{format, FmtContext, FormatEvent, FormatFields},
    registry::LookupSpan,
    EnvFilter,
};

/// Installs the global `tracing` subscriber. `log_directive` is the default
/// filter directive derived from the configuration file's `log_level`;
/// `RUST_LOG`, if set, still takes precedence (standard `EnvFilter`
/// layering).
pub fn init(log_directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .event_format(LineProtocolCompatibleFormat)
        .with_writer(std::io::stderr)
        .init();
}

/// A `FormatEvent` that renders exactly
/// `<timestamp> [<LEVEL>] [<file>:<line>] <message>`.
struct LineProtocolCompatibleFormat;

impl<S, N> FormatEvent<S, N> for LineProtocolCompatibleFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> fmt::Result {
        let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let metadata = event.metadata();
        let file = metadata.file().unwrap_or("<unknown>");
        let line = metadata.line().unwrap_or(0);

        write!(writer, "{now} [{:>5}] [{file}:{line}] ", metadata.level())?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
