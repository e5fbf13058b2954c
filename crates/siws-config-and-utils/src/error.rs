//! Errors raised while loading configuration or resolving paths.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// A setting parsed but holds an unusable value.
    #[error("Invalid setting {field}: {reason}")]
    InvalidSetting { field: &'static str, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A configured endpoint is not a URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The config file is not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Neither `SIWS_HOME` nor a home directory is available.
    #[error("Could not determine the siws data directory")]
    NoDataDir,
}

pub type CoreResult<T> = Result<T, CoreError>;
