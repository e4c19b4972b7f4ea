//! Logging bootstrap shared by all service binaries.
//!
//! Stdout logging is always on; when a log directory is configured a daily
//! rolling file writer is added next to it. The returned guard must be kept
//! alive for the lifetime of the process or buffered file output is lost.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialise the global tracing subscriber.
///
/// `level` overrides `RUST_LOG` when given (e.g. `"debug"` or a full filter
/// directive). `log_dir` enables daily-rolled file output named after the
/// service.
pub fn init(service: &str, level: Option<&str>, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = match level {
        Some(directive) => EnvFilter::try_new(directive)
            .unwrap_or_else(|_| EnvFilter::new(format!("{service}=info,info"))),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let stdout_layer = fmt::layer().with_target(true);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, format!("{service}.log"));
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer().with_ansi(false).with_writer(writer);
            tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer)
                .with(file_layer.boxed())
                .init();
            Some(guard)
        },
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer)
                .init();
            None
        },
    }
}
