use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;

/// Where log lines go. The worker must keep stdout free for its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Stdout,
    Stderr,
}

/// Installs the global subscriber. `RUST_LOG` wins over `level`.
pub fn init(level: &str, format: LogFormat, target: LogTarget) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info")));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match (format, target) {
        (LogFormat::Json, LogTarget::Stdout) => builder.json().init(),
        (LogFormat::Json, LogTarget::Stderr) => builder.json().with_writer(std::io::stderr).init(),
        (LogFormat::Plain, LogTarget::Stdout) => builder.init(),
        (LogFormat::Plain, LogTarget::Stderr) => {
            builder.with_ansi(false).with_writer(std::io::stderr).init()
        }
    }
}
