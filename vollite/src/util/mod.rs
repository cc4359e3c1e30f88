use std::path::Path;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};
use vollite_shared::errors::{VolliteError, VolliteResult};

use crate::runtime::constants::logging;
use crate::runtime::layout::FilesystemLayout;

/// Initialize tracing with file logging.
///
/// Logs are written to `{home_dir}/logs/vollite.log` with daily rotation.
/// The returned guard must be kept alive for the background writer to flush.
/// Calling this again keeps the first subscriber.
pub fn init_logging(home_dir: &Path) -> VolliteResult<WorkerGuard> {
    let logs_dir = FilesystemLayout::new(home_dir).logs_dir();

    std::fs::create_dir_all(&logs_dir).map_err(|e| {
        VolliteError::Storage(format!(
            "Failed to create logs directory {}: {}",
            logs_dir.display(),
            e
        ))
    })?;

    let file_appender = tracing_appender::rolling::daily(&logs_dir, logging::LOG_FILE);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Defaults to "info" if RUST_LOG is not set
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(logging::DEFAULT_FILTER))
        .map_err(|e| VolliteError::InvalidConfiguration(format!("log filter: {}", e)))?;

    register_to_tracing(non_blocking, env_filter);
    Ok(guard)
}

pub fn register_to_tracing(non_blocking: NonBlocking, env_filter: EnvFilter) {
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(false),
        )
        .try_init();
}
