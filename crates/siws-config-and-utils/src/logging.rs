//! Logging initialization.
//!
//! Thin wrapper over the observability crate: structured JSONL goes to
//! `~/.siws/logs/siws.jsonl`, the level comes from `RUST_LOG` or the
//! configured default.

use crate::Paths;
use observability::LogConfig;

/// Initialize the logging system.
///
/// # Example
///
/// ```ignore
/// init_logging("info", &paths, false);
/// tracing::info!("ready");
/// ```
pub fn init_logging(level: &str, paths: &Paths, also_stderr: bool) {
    observability::init_with_config(LogConfig {
        service_name: "siws".into(),
        default_level: parse_level(level).to_string().to_lowercase(),
        log_path: paths.log_file(),
        also_stderr,
    });
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
