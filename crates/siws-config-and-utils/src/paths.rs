//! File system paths.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Overrides the data directory.
pub const HOME_ENV: &str = "SIWS_HOME";

/// Manages file system paths (`~/.siws` by default).
#[derive(Debug, Clone)]
pub struct Paths {
    base_dir: PathBuf,
}

impl Paths {
    /// Root at `$SIWS_HOME` when set, `~/.siws` otherwise.
    pub fn new() -> CoreResult<Self> {
        Self::resolve(std::env::var_os(HOME_ENV).map(PathBuf::from), dirs::home_dir())
    }

    fn resolve(explicit: Option<PathBuf>, home: Option<PathBuf>) -> CoreResult<Self> {
        let base_dir = match (explicit, home) {
            (Some(dir), _) if !dir.as_os_str().is_empty() => dir,
            (_, Some(home)) => home.join(".siws"),
            _ => return Err(CoreError::NoDataDir),
        };
        Ok(Self { base_dir })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.siws).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.siws/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the logs directory (~/.siws/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the central log file (~/.siws/logs/siws.jsonl).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("siws.jsonl")
    }

    /// Get the default wallet keypair file (~/.siws/keypair).
    pub fn keypair_file(&self) -> PathBuf {
        self.base_dir.join("keypair")
    }

    /// Ensure the base and logs directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
