use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default filter when `RUST_LOG` is unset
const DEFAULT_DIRECTIVE: &str = "attio_tools=info";

/// Initializes logging: human-readable lines on stderr and JSON lines in a
/// daily file under `log_dir`.
///
/// The returned guard flushes the file writer when dropped; hold it for the
/// life of the program.
pub fn init_logging(log_dir: &Path) -> WorkerGuard {
    // A missing log dir only costs the file layer its output
    let _ = fs::create_dir_all(log_dir);

    let file_appender = tracing_appender::rolling::daily(log_dir, "attio-tools.log");
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);

    // stdout carries the command output, so console logs go to stderr
    let console_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    guard
}
