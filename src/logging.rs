use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_FILE_PREFIX: &str = "snip_chat.log";

/// Builds the level filter. Without `debug` the level is pinned to `info`
/// and `RUST_LOG` is ignored.
pub fn env_filter(debug: bool) -> EnvFilter {
    if debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::new("info")
    }
}

/// Initialise logging to stderr and, when `log_dir` is given, to a daily
/// rolling file inside it. Keep the returned guard alive so buffered file
/// output is flushed on exit. Calling this twice is harmless.
pub fn init(debug: bool, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer().with_ansi(false).with_writer(writer);
            let installed = tracing_subscriber::registry()
                .with(env_filter(debug))
                .with(stderr_layer)
                .with(file_layer)
                .try_init()
                .is_ok();
            installed.then_some(guard)
        }
        None => {
            let _ = tracing_subscriber::registry()
                .with(env_filter(debug))
                .with(stderr_layer)
                .try_init();
            None
        }
    }
}
