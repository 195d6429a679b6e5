//! Structured logging.
//!
//! # Responsibilities
//! - Install the process-wide `tracing` subscriber from [`LoggingConfig`]
//! - Optional non-blocking file sink next to the console output
//! - Hand back a [`LogGuard`] that flushes the file sink when dropped
//!
//! # Design Decisions
//! - `RUST_LOG` overrides the configured level
//! - JSON format for production, plain text for development
//! - A second initialisation is not an error, so tests can build many engines

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Logging could not be set up.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] ParseError),

    #[error("cannot open log file: {0}")]
    File(#[from] InitError),
}

/// Keeps the non-blocking writers alive. Dropping it flushes pending lines.
#[derive(Debug, Default)]
pub struct LogGuard {
    workers: Vec<WorkerGuard>,
}

impl LogGuard {
    /// Whether a file sink is attached.
    pub fn has_file_sink(&self) -> bool {
        !self.workers.is_empty()
    }
}

/// Install the global subscriber.
pub fn init(config: &LoggingConfig, data_directory: &Path) -> Result<LogGuard, LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)?,
    };

    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guard = LogGuard::default();

    if config.console {
        layers.push(format_layer(config.json, true, std::io::stdout));
    }

    if !config.file.is_empty() {
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(&config.file)
            .build(data_directory)?;
        let (writer, worker) = tracing_appender::non_blocking(appender);
        guard.workers.push(worker);
        layers.push(format_layer(config.json, false, writer));
    }

    if let Err(e) = tracing_subscriber::registry().with(layers).with(filter).try_init() {
        tracing::debug!(error = %e, "Logging already initialised, keeping existing subscriber");
    }

    Ok(guard)
}

fn format_layer<W>(json: bool, ansi: bool, writer: W) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed()
    }
}
