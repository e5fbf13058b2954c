//! # Observability
//!
//! Structured logging for the siws workspace.
//!
//! The binary calls [`init_with_config`] once at startup; library crates only
//! emit `tracing` events. Every event becomes one JSON line in the configured
//! log file, which can be followed with `tail -f ~/.siws/logs/siws.jsonl | jq`.

mod file_sink;
mod json_layer;

use file_sink::AppendFile;
use json_layer::JsonLayer;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Logging setup for one process.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Written into every line as `service`.
    pub service_name: String,
    /// Filter used when `RUST_LOG` is unset.
    pub default_level: String,
    /// JSONL file events are appended to.
    pub log_path: PathBuf,
    /// Mirror events to stderr in compact form.
    pub also_stderr: bool,
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// stderr is used when asked for, and always when the file is unusable.
fn wants_stderr(config: &LogConfig, file_ok: bool) -> bool {
    config.also_stderr || !file_ok
}

/// Install the global subscriber. Later calls keep the first one.
pub fn init_with_config(config: LogConfig) {
    let file = match AppendFile::open(&config.log_path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!(
                "observability: cannot open {}: {}",
                config.log_path.display(),
                e
            );
            None
        }
    };
    let file_ok = file.is_some();

    let json = file.map(|file| {
        JsonLayer::new(&config.service_name, file).with_filter(env_filter(&config.default_level))
    });
    let stderr = wants_stderr(&config, file_ok).then(|| {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(io::stderr)
            .with_filter(env_filter(&config.default_level))
    });

    let installed = tracing_subscriber::registry()
        .with(json)
        .with(stderr)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(
            log_path = %config.log_path.display(),
            service = %config.service_name,
            "Logging initialized"
        );
    }
}
