//! Diagnostic logging
//!
//! Every line has the shape `<YYYY-MM-DD HH:MM:SS>\t[<LEVEL>]\t<message>` and
//! goes either to stdout or to `<log_dir>/<YYYYMM>/<D>.log`. The daily file is
//! opened for each line, so rotation needs no background task. When the file
//! cannot be opened the line is written to stdout instead.

use std::backtrace::Backtrace;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Local};
use parking_lot::Mutex;
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, MakeWriter};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogMode, RelayConfig};
use crate::relay::TIME_FORMAT;

/// Install the global subscriber and panic hook.
pub fn init(config: &RelayConfig) -> anyhow::Result<()> {
    let sink = LogSink::new(config.log_type, config.log_dir.clone());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "solilog=info,solilog_client=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .event_format(LineFormat)
                .with_writer(sink),
        )
        .try_init()?;

    install_panic_hook();
    Ok(())
}

/// Route panics through the log with the panicking thread's stack, flattened
/// onto one line.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let trace = Backtrace::force_capture().to_string().replace('\n', " ");
        tracing::error!("{}\t[{}]", info, trace);
    }));
}

/// `<timestamp>\t[<LEVEL>]\t<message>`
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
            "{}\t[{}]\t",
            Local::now().format(TIME_FORMAT),
            event.metadata().level()
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Shared, internally serialized destination for formatted lines
#[derive(Clone)]
pub struct LogSink {
    inner: Arc<SinkInner>,
}

struct SinkInner {
    mode: LogMode,
    dir: PathBuf,
    lock: Mutex<()>,
}

impl LogSink {
    pub fn new(mode: LogMode, dir: PathBuf) -> Self {
        Self {
            inner: Arc::new(SinkInner {
                mode,
                dir,
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn emit(&self, line: &[u8]) -> io::Result<()> {
        self.emit_at(&Local::now(), line)
    }

    /// Write `line` as if the current time were `now`.
    pub fn emit_at(&self, now: &DateTime<Local>, line: &[u8]) -> io::Result<()> {
        let _guard = self.inner.lock.lock();

        if self.inner.mode == LogMode::Stdout {
            return io::stdout().lock().write_all(line);
        }

        let path = daily_path(&self.inner.dir, now);
        match open_append(&path) {
            Ok(mut file) => file.write_all(line),
            Err(e) => {
                let mut out = io::stdout().lock();
                writeln!(
                    out,
                    "{}\t[ERROR]\tcannot open {}: {}",
                    now.format(TIME_FORMAT),
                    path.display(),
                    e
                )?;
                out.write_all(line)
            }
        }
    }
}

/// `<dir>/<YYYYMM>/<D>.log`, day without zero padding
pub fn daily_path(dir: &Path, now: &DateTime<Local>) -> PathBuf {
    dir.join(now.format("%Y%m").to_string())
        .join(format!("{}.log", now.day()))
}

fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = SinkWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        SinkWriter { sink: self }
    }
}

pub struct SinkWriter<'a> {
    sink: &'a LogSink,
}

impl Write for SinkWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sink.emit(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
