//! Console logging
//!
//! Every line is rendered as `[<RFC 3339 timestamp with offset>] [<LEVEL>] <message>`.
//! The subscriber is installed once from `main`; library code only uses the
//! `tracing` macros.

use chrono::{DateTime, Local, SecondsFormat, TimeZone};
use std::fmt;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

/// Event formatter producing the console line contract.
#[derive(Debug, Default, Clone, Copy)]
pub struct LineFormat;

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(
            writer,
            "[{}] [{}] ",
            timestamp(&Local::now()),
            event.metadata().level()
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// RFC 3339 timestamp with second precision and numeric offset.
pub fn timestamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display,
{
    at.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Render one log line the way the console formatter does.
pub fn format_line<Tz: TimeZone>(at: &DateTime<Tz>, level: Level, message: &str) -> String
where
    Tz::Offset: fmt::Display,
{
    format!("[{}] [{}] {}", timestamp(at), level, message)
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the default filter; `verbose` lowers it to debug.
pub fn init(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout)
        .event_format(LineFormat)
        .try_init();

    if installed.is_err() {
        // Already installed (tests, embedding callers); keep the existing one.
        tracing::debug!("Logger already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    #[test]
    fn test_format_line_contract() {
        let offset = FixedOffset::east_opt(2 * 3600).expect("valid offset");
        let at = offset
            .with_ymd_and_hms(2024, 3, 9, 14, 5, 7)
            .single()
            .expect("valid time");

        assert_eq!(
            format_line(&at, Level::WARN, "Attempt 1/3 failed"),
            "[2024-03-09T14:05:07+02:00] [WARN] Attempt 1/3 failed"
        );
        assert_eq!(
            format_line(&at, Level::INFO, "done"),
            "[2024-03-09T14:05:07+02:00] [INFO] done"
        );
    }

    #[test]
    fn test_utc_offset_is_numeric() {
        let at = chrono::Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .expect("valid time");
        assert_eq!(timestamp(&at), "2024-01-01T00:00:00+00:00");
    }
}
