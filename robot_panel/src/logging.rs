//! Diagnostic log setup for the panel binary.
//!
//! Everything goes to stdout and to a plain-text file that is recreated on every start.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to prepare log file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid log filter '{0}'")]
    Filter(String),
    #[error("failed to install logger: {0}")]
    Install(String),
}

/// Deletes any previous log at `path` and creates an empty one.
pub fn prepare_log_file(path: &Path) -> Result<File, LoggingError> {
    let io_error = |source| LoggingError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(io_error(e)),
    }
    File::create(path).map_err(io_error)
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over `level`.
///
/// The returned guard flushes the file writer when dropped; keep it alive until exit.
pub fn init_logging(path: &Path, level: &str) -> Result<WorkerGuard, LoggingError> {
    let file = prepare_log_file(path)?;
    let (file_writer, guard) = tracing_appender::non_blocking(file);

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).map_err(|_| LoggingError::Filter(level.to_string()))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(file_writer.and(io::stdout))
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .map_err(|e| LoggingError::Install(e.to_string()))?;

    Ok(guard)
}
