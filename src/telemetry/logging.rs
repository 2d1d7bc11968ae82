//! Logging configuration and initialization
//!
//! Structured logging with tracing: compact console output for development,
//! JSON for log aggregation, and an optional non-blocking log file.

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "MIXER_LOG";

/// Environment variable selecting the output format (`json`)
pub const LOG_FORMAT_ENV: &str = "MIXER_LOG_FORMAT";

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Enable console output (default: true)
    pub console_enabled: bool,
    /// Write to this file as well (default: none)
    pub file_path: Option<PathBuf>,
    /// Use JSON format for console logs (default: false)
    pub json_format: bool,
    /// Filter used when neither `MIXER_LOG` nor `RUST_LOG` is set
    pub default_level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_enabled: true,
            file_path: None,
            json_format: false,
            default_level: "info".to_string(),
        }
    }
}

impl LogConfig {
    /// Also log to `path`, without ANSI colors.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.file_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// `MIXER_LOG_FORMAT` overrides [`LogConfig::json_format`].
    fn use_json(&self) -> bool {
        std::env::var(LOG_FORMAT_ENV)
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(self.json_format)
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_env(LOG_ENV)
            .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
            .unwrap_or_else(|_| EnvFilter::new(&self.default_level))
    }
}

/// Initialize the global subscriber.
///
/// The returned guard flushes the log file when dropped; keep it alive for
/// the duration of the program.
///
/// ```no_run
/// use immersive_mixer::telemetry::{init_logging, LogConfig};
///
/// let _guard = init_logging(&LogConfig::default()).expect("logging");
/// ```
pub fn init_logging(
    config: &LogConfig,
) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error + Send + Sync>> {
    let use_json = config.use_json();
    let subscriber = tracing_subscriber::registry().with(config.env_filter());

    let (file_layer, guard) = match &config.file_path {
        Some(path) => {
            let file = std::fs::File::create(path)?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let console = config.console_enabled;
    let json_layer = (console && use_json).then(|| {
        fmt::layer()
            .json()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
    });
    let compact_layer = (console && !use_json).then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
    });

    subscriber
        .with(file_layer)
        .with(json_layer)
        .with(compact_layer)
        .try_init()?;

    tracing::info!(
        target: "immersive_mixer",
        version = env!("CARGO_PKG_VERSION"),
        json_format = use_json,
        log_file = ?config.file_path,
        "Logging initialized"
    );

    Ok(guard)
}

// Re-export WorkerGuard so callers can store it
pub use tracing_appender::non_blocking::WorkerGuard as LogGuard;
