//! Effective configuration display.

use crate::output::{self, OutputFormat};
use anyhow::Result;
use serde::Serialize;
use siws_config_and_utils::{Config, Paths};
use std::fmt;

const MASK: &str = "********";

/// Configuration as shown to the user, with secrets masked.
#[derive(Debug, Serialize)]
struct ConfigView {
    config_file: String,
    #[serde(flatten)]
    config: Config,
}

impl ConfigView {
    fn new(paths: &Paths, config: &Config) -> Self {
        let mut config = config.clone();
        if config.backend.session_api_key.is_some() {
            config.backend.session_api_key = Some(MASK.to_string());
        }
        Self {
            config_file: paths.config_file().display().to_string(),
            config,
        }
    }
}

impl fmt::Display for ConfigView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unset = |value: &Option<String>| value.clone().unwrap_or_else(|| "(not set)".to_string());
        let backend = &self.config.backend;

        let rows = [
            ("Config file", self.config_file.clone()),
            ("Log level", self.config.log_level.clone()),
            ("Cluster", self.config.cluster.clone()),
            ("RPC endpoint", self.config.rpc_endpoint.clone()),
            (
                "Reconnect",
                if self.config.sign_in_after_reconnect {
                    "sign in after reconnect".to_string()
                } else {
                    "connect only".to_string()
                },
            ),
            ("Functions URL", unset(&backend.functions_url)),
            ("Session URL", unset(&backend.session_url)),
            ("Session key", unset(&backend.session_api_key)),
            ("Revoke URL", unset(&backend.revoke_url)),
            ("Timeout", format!("{}s", backend.request_timeout_secs)),
        ];
        let lines: Vec<String> = rows
            .iter()
            .map(|(label, value)| output::row(label, value))
            .collect();
        write!(f, "{}", lines.join("\n"))
    }
}

/// Print the effective configuration, optionally persisting it.
pub fn show_config(paths: &Paths, config: &Config, write: bool, format: &OutputFormat) -> Result<()> {
    config.validate()?;

    if write {
        config.save(paths)?;
        output::print_success(
            &format!("Saved configuration to {}", paths.config_file().display()),
            format,
        );
        return Ok(());
    }

    if *format == OutputFormat::Text {
        output::print_heading("Configuration");
    }
    output::print(&ConfigView::new(paths, config), format);
    Ok(())
}
