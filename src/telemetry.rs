/// Telemetry
///
/// Structured logging for the block pipeline, built on tracing. Hosts call
/// [`init_tracing`] once at startup; the library itself only emits events.
/// Block checksums render as 128 hex characters, far too wide for a log
/// line, so pipeline events go through [`short_id`], and per-tuple events
/// are sampled with [`SampledCounter`] rather than logged unconditionally.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::checksum::Checksum;

/// Hex characters of a checksum kept in log output.
pub const LOG_ID_CHARS: usize = 16;

/// Subscriber output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// File rotation cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRotation {
    Daily,
    Hourly,
    Never,
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Filter directives used when RUST_LOG is unset, e.g. "info" or
    /// "brightchain=debug".
    pub filter: String,
    pub format: LogFormat,
    /// Write to this file (with rotation) instead of the console.
    pub log_file: Option<PathBuf>,
    pub rotation: LogRotation,
}

impl TelemetryConfig {
    /// Configuration from BRIGHTCHAIN_LOG_FORMAT / BRIGHTCHAIN_LOG_FILE,
    /// with RUST_LOG picked up by the filter at init time.
    pub fn from_env() -> Self {
        let format = match std::env::var("BRIGHTCHAIN_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };
        Self {
            filter: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            format,
            log_file: std::env::var("BRIGHTCHAIN_LOG_FILE").ok().map(PathBuf::from),
            rotation: LogRotation::Daily,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Install the global tracing subscriber.
///
/// Returns the appender guard when file logging is enabled; dropping the
/// guard stops the background writer, so hosts hold it for the process
/// lifetime. Fails when a subscriber is already installed.
pub fn init_tracing(
    config: TelemetryConfig,
) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    match &config.log_file {
        Some(path) => {
            let directory = match path.parent() {
                Some(dir) if !dir.as_os_str().is_empty() => dir,
                _ => Path::new("."),
            };
            let prefix = path
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or("log file path has no file name")?;
            let appender = match config.rotation {
                LogRotation::Daily => rolling::daily(directory, prefix),
                LogRotation::Hourly => rolling::hourly(directory, prefix),
                LogRotation::Never => rolling::never(directory, prefix),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let registry = tracing_subscriber::registry().with(filter);
            match config.format {
                LogFormat::Json => {
                    registry.with(fmt::layer().json().with_writer(writer)).try_init()?
                }
                LogFormat::Pretty => registry
                    .with(fmt::layer().with_target(false).with_writer(writer))
                    .try_init()?,
            }
            Ok(Some(guard))
        }
        None => {
            let registry = tracing_subscriber::registry().with(filter);
            match config.format {
                LogFormat::Json => registry.with(fmt::layer().json()).try_init()?,
                LogFormat::Pretty => {
                    registry.with(fmt::layer().with_target(false)).try_init()?
                }
            }
            Ok(None)
        }
    }
}

/// Shortened block id for log lines: the first [`LOG_ID_CHARS`] hex
/// characters of the checksum.
pub fn short_id(id: &Checksum) -> String {
    truncate_hex(&id.to_hex(), LOG_ID_CHARS)
}

/// Keep the first `len` characters of a hex string, marking elision.
pub fn truncate_hex(hex: &str, len: usize) -> String {
    if hex.len() <= len {
        return hex.to_string();
    }
    format!("{}..", &hex[..len])
}

/// Counts events and fires every `interval` occurrences, handing back the
/// running total for the log line. Per-tuple pipeline events tick one of
/// these instead of logging unconditionally.
pub struct SampledCounter {
    count: AtomicU64,
    interval: u64,
}

impl SampledCounter {
    pub fn new(interval: u64) -> Self {
        Self { count: AtomicU64::new(0), interval: interval.max(1) }
    }

    /// Record one event; yields the total so far when this event lands on
    /// the sampling interval.
    pub fn tick(&self) -> Option<u64> {
        let seen = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        (seen % self.interval == 0).then_some(seen)
    }

    pub fn total(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}
