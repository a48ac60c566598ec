//! # Structured Logging Module
//!
//! Console plus rolling-file logging on the tracing ecosystem. The console
//! layer is human readable; the file layer is JSON so log shippers can parse it.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::error::{AgentError, AgentResult};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Options for [`init_logging`]
#[derive(Debug, Clone)]
pub struct LoggingOptions {
    /// Log file; its directory is created if needed
    pub log_file: Option<PathBuf>,
    /// Debug level instead of info
    pub debug_mode: bool,
}

/// Level filter for the given mode; `RUST_LOG` wins when set
pub fn log_filter(debug_mode: bool) -> EnvFilter {
    let default_level = if debug_mode { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initialize logging once per process
///
/// Returns the file writer guard when a file layer was installed; it must be
/// kept alive for buffered lines to be flushed. A second call is a no-op and
/// returns `None`.
pub fn init_logging(options: &LoggingOptions) -> AgentResult<Option<WorkerGuard>> {
    if LOGGER_INITIALIZED.set(()).is_err() {
        return Ok(None);
    }

    let console = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_ansi(std::io::stdout().is_terminal())
        .with_filter(log_filter(options.debug_mode));

    let (file_layer, guard) = match &options.log_file {
        Some(path) => {
            let (directory, file_name) = split_log_path(path)?;
            std::fs::create_dir_all(&directory).map_err(|e| {
                AgentError::Logging(format!(
                    "could not create log directory {}: {e}",
                    directory.display()
                ))
            })?;

            let appender = tracing_appender::rolling::daily(&directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .json()
                .with_filter(log_filter(options.debug_mode));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let result = tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init();

    if result.is_err() {
        // Another subscriber (e.g. a test harness) is already installed
        tracing::debug!("Global tracing subscriber already initialized");
    }

    tracing::info!(
        debug_mode = options.debug_mode,
        log_file = ?options.log_file,
        "Logging initialized"
    );

    Ok(guard)
}

fn split_log_path(path: &Path) -> AgentResult<(PathBuf, String)> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| AgentError::Logging(format!("invalid log file path {}", path.display())))?
        .to_string();

    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    Ok((directory, file_name))
}
