//! The daemon's log file and its `[dd-mm-YYYY HH:MM:SS]>message` line format.
//!
//! The file is written through `tracing_appender` with [`Rotation::NEVER`]:
//! opened for append, created if missing, never truncated or rolled over.

use chrono::Local;
use std::io;
use std::path::Path;
use tracing::{Event, Level, Subscriber};
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::{self, DefaultFields};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, MakeWriter};
use tracing_subscriber::registry::LookupSpan;

pub const TIMESTAMP_FORMAT: &str = "%d-%m-%Y %H:%M:%S";

/// Open `path` for append as a blocking appender.
pub fn appender(path: &Path) -> Result<RollingFileAppender, InitError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut builder = RollingFileAppender::builder().rotation(Rotation::NEVER);
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        builder = builder.filename_prefix(name);
    }
    builder.build(dir)
}

/// Whether the file at `path` is larger than `limit` bytes. There is no
/// rotation; callers only warn.
pub fn exceeds(path: &Path, limit: u64) -> io::Result<bool> {
    Ok(std::fs::metadata(path)?.len() > limit)
}

/// `[19-10-2026 14:03:07]>message key=value`. Non-info events carry their
/// level in front of the message.
#[derive(Debug, Clone, Copy, Default)]
pub struct BracketFormat;

impl<S, N> FormatEvent<S, N> for BracketFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        write!(writer, "[{}]>", Local::now().format(TIMESTAMP_FORMAT))?;
        let level = *event.metadata().level();
        if level != Level::INFO {
            write!(writer, "{level} ")?;
        }
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// A fmt layer writing [`BracketFormat`] lines to `writer`.
pub fn layer<S, W>(writer: W) -> tracing_subscriber::fmt::Layer<S, DefaultFields, BracketFormat, W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + 'static,
{
    tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .event_format(BracketFormat)
        .with_writer(writer)
}
