//! Tracing initialisation for the `proofreader` binary.
//!
//! Logs go to stderr (human-readable or JSON); stdout is kept for command
//! output. With a log directory configured, a daily-rolling JSON file is
//! written as well.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

const LOG_FILE_PREFIX: &str = "proofreader.log";

/// Install the global subscriber. `RUST_LOG` wins over `level`.
///
/// The returned guard flushes the file sink on drop; hold it for the life of
/// the process. Only the first call in a process takes effect.
pub fn init_tracing(level: &str, json: bool, directory: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false).json();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer);

    if json {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .json(),
            )
            .try_init()
            .ok();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }

    guard
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_init_tracing_is_idempotent() {
        let dir = tempdir().unwrap();
        let guard = init_tracing("debug", false, Some(dir.path()));
        assert!(guard.is_some());
        assert!(init_tracing("info", true, None).is_none());
        tracing::info!("still logging after a second init");
    }

    #[test]
    fn test_invalid_level_falls_back() {
        assert!(init_tracing("not a [valid] filter", false, None).is_none());
    }
}
