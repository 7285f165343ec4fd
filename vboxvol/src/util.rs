//! Small process-level helpers.

use std::path::Path;

use tracing_appender::non_blocking::NonBlocking;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber: stderr always, plus an optional file writer.
///
/// Silently does nothing if a global subscriber is already installed.
pub fn register_to_tracing(file_writer: Option<NonBlocking>, env_filter: EnvFilter) {
    let file_layer = file_writer.map(|writer| fmt::layer().with_writer(writer).with_ansi(false));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init();
}

/// Remove a stale Unix socket left behind by a previous run.
///
/// Missing files are fine; anything else is reported.
pub fn remove_stale_socket(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(socket = %path.display(), "Removed stale socket");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
