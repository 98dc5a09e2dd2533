use std::io::IsTerminal;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

/// Logs to stderr at `info` unless `RUST_LOG` says otherwise.
pub fn register_logger() {
    let log_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();
}
