use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

const LOG_FILE_PREFIX: &str = "recall-scheduler.log";

/// Flushes the file writer when dropped.
pub struct FileLogGuard {
    _guard: WorkerGuard,
}

fn file_writer(log_dir: &str) -> Option<(tracing_appender::non_blocking::NonBlocking, FileLogGuard)> {
    if let Err(err) = std::fs::create_dir_all(Path::new(log_dir)) {
        eprintln!("failed to create log directory {log_dir}: {err}");
        return None;
    }
    let appender = RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    Some((writer, FileLogGuard { _guard: guard }))
}

/// Installs the global subscriber from `config`. Later calls leave the first
/// subscriber in place.
pub fn init_tracing(config: &Config) -> Option<FileLogGuard> {
    let env_filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match config.file_logs_enabled.then(|| file_writer(&config.log_dir)).flatten() {
        Some((writer, guard)) => {
            let layer = fmt::layer().with_writer(writer).with_ansi(false).with_target(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .with(file_layer)
        .try_init();

    guard
}
