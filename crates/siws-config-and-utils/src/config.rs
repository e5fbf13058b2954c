//! Configuration management.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default ledger cluster the wallet connection is bootstrapped against.
pub const DEFAULT_CLUSTER: &str = "mainnet-beta";

/// Default ledger RPC endpoint.
pub const DEFAULT_RPC_ENDPOINT: &str = "https://api.mainnet-beta.solana.com";

/// Default timeout for challenge, verify and exchange requests.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Sign-in backend endpoints.
///
/// Both `functions_url` and `session_url` must be present for a handshake to
/// start; anything less is treated as an unconfigured backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackendConfig {
    /// Base URL of the functions serving `createSignInData` and `verifySIWS`.
    #[serde(default)]
    pub functions_url: Option<String>,
    /// Custom-token exchange endpoint of the session backend.
    #[serde(default)]
    pub session_url: Option<String>,
    /// API key sent with the exchange request.
    #[serde(default)]
    pub session_api_key: Option<String>,
    /// Optional endpoint that revokes a session on sign-out.
    #[serde(default)]
    pub revoke_url: Option<String>,
    /// Network timeout for backend requests, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            functions_url: None,
            session_url: None,
            session_api_key: None,
            revoke_url: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl BackendConfig {
    /// Returns true when both the functions and session endpoints are set.
    pub fn is_configured(&self) -> bool {
        self.functions_url.is_some() && self.session_url.is_some()
    }

    /// Request timeout as a Duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn validate(&self) -> CoreResult<()> {
        for url in [&self.functions_url, &self.session_url, &self.revoke_url]
            .into_iter()
            .flatten()
        {
            Url::parse(url)?;
        }
        if self.request_timeout_secs == 0 {
            return Err(CoreError::InvalidSetting {
                field: "request_timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Ledger cluster name.
    #[serde(default = "default_cluster")]
    pub cluster: String,
    /// Ledger RPC endpoint.
    #[serde(default = "default_rpc_endpoint")]
    pub rpc_endpoint: String,
    /// Run the full sign-in handshake even when silent reconnect succeeds
    /// but no backend session exists.
    #[serde(default)]
    pub sign_in_after_reconnect: bool,
    /// Sign-in backend endpoints.
    #[serde(default)]
    pub backend: BackendConfig,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_cluster() -> String {
    DEFAULT_CLUSTER.to_string()
}

fn default_rpc_endpoint() -> String {
    DEFAULT_RPC_ENDPOINT.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            cluster: DEFAULT_CLUSTER.to_string(),
            rpc_endpoint: DEFAULT_RPC_ENDPOINT.to_string(),
            sign_in_after_reconnect: false,
            backend: BackendConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the config file when present, falling back to
    /// defaults, then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Check that every configured URL parses.
    pub fn validate(&self) -> CoreResult<()> {
        Url::parse(&self.rpc_endpoint)?;
        self.backend.validate()
    }

    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply `SIWS_*` overrides from the given lookup. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).and_then(non_empty);

        if let Some(level) = get("SIWS_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(cluster) = get("SIWS_CLUSTER") {
            self.cluster = cluster;
        }
        if let Some(endpoint) = get("SIWS_RPC_ENDPOINT") {
            self.rpc_endpoint = endpoint;
        }
        if let Some(url) = get("SIWS_FUNCTIONS_URL") {
            self.backend.functions_url = Some(url);
        }
        if let Some(url) = get("SIWS_SESSION_URL") {
            self.backend.session_url = Some(url);
        }
        if let Some(key) = get("SIWS_SESSION_API_KEY") {
            self.backend.session_api_key = Some(key);
        }
        if let Some(url) = get("SIWS_REVOKE_URL") {
            self.backend.revoke_url = Some(url);
        }
        if let Some(secs) = get("SIWS_REQUEST_TIMEOUT_SECS").and_then(|raw| raw.parse().ok()) {
            self.backend.request_timeout_secs = secs;
        }
    }
}

fn non_empty(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
