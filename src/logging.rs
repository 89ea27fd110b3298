use std::fmt;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::fmt::format::{DefaultFields, Format};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::{Config, LogFormat};

const LOG_FILE_PREFIX: &str = "bot";
const LOG_FILE_SUFFIX: &str = "log";

#[derive(Debug)]
pub enum LoggingError {
    /// Could not create the log directory or the first log file.
    Appender(tracing_appender::rolling::InitError),
    /// A global subscriber is already installed.
    Install(tracing_subscriber::util::TryInitError),
}

impl fmt::Display for LoggingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Appender(e) => write!(f, "failed to open log file: {}", e),
            Self::Install(e) => write!(f, "failed to install tracing subscriber: {}", e),
        }
    }
}

impl std::error::Error for LoggingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Appender(e) => Some(e),
            Self::Install(e) => Some(e),
        }
    }
}

/// Install stdout and rolling file logging.
///
/// Keep the returned guard alive until exit, dropping it flushes the file writer.
pub fn init(config: &Config) -> Result<WorkerGuard, LoggingError> {
    let appender = RollingFileAppender::builder()
        .rotation(config.log_rotation.clone())
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix(LOG_FILE_SUFFIX)
        .max_log_files(config.log_max_files)
        .build(&config.log_dir)
        .map_err(LoggingError::Appender)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false);

    let layers = vec![
        formatted(stdout_layer, config.log_format).with_filter(env_filter()).boxed(),
        formatted(file_layer, config.log_format).with_filter(env_filter()).boxed(),
    ];

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(LoggingError::Install)?;

    Ok(guard)
}

type FmtLayer<W> = tracing_subscriber::fmt::Layer<Registry, DefaultFields, Format, W>;

fn formatted<W>(layer: FmtLayer<W>, format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync>
where
    W: for<'w> tracing_subscriber::fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Full => layer.boxed(),
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
    }
}

// Default: info, overridable with RUST_LOG.
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}
