//! Sign-in command.

use super::keypair_path;
use crate::keypair_wallet::{chain_for_cluster, read_signing_key, KeypairWallet};
use crate::output::{self, OutputFormat};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use siws_config_and_utils::{Config, Paths};
use siws_handshake::{
    AdapterHandle, CancellationToken, ConnectOutcome, HandshakeError, HandshakeOrchestrator,
    HandshakePhase, HandshakePolicy, HandshakeServices, SessionState, TracingNotifier,
    WatchSessionStore,
};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Adapter name the local keypair wallet registers under.
const WALLET_NAME: &str = "keypair";

/// Flags for `siws sign-in`.
#[derive(Debug, Default)]
pub struct SignInOptions {
    pub keypair: Option<PathBuf>,
    pub trusted: bool,
    pub connect_only: bool,
    pub direct: bool,
    pub sign_out: bool,
}

/// Result of a sign-in run. Never carries credentials.
#[derive(Debug, Serialize)]
struct SignInReport {
    adapter: String,
    address: String,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
    signed_out: bool,
}

impl SignInReport {
    fn new(address: String, outcome: &ConnectOutcome, session: &SessionState) -> Self {
        let label = match outcome {
            ConnectOutcome::Connected => "connected",
            ConnectOutcome::Authenticated(_) => "authenticated",
            ConnectOutcome::SignInUnavailable => "sign_in_unavailable",
            ConnectOutcome::Abandoned => "abandoned",
        };
        let user_id = match outcome {
            ConnectOutcome::Authenticated(user) => Some(user.user_id.clone()),
            _ => None,
        };
        Self {
            adapter: WALLET_NAME.to_string(),
            address,
            outcome: label,
            user_id,
            expires_at: session.credential().map(|c| c.expires_at),
            signed_out: false,
        }
    }
}

impl fmt::Display for SignInReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines = vec![
            output::row("Adapter", &self.adapter),
            output::row("Address", &self.address),
            output::row("Outcome", self.outcome),
        ];
        if let Some(user_id) = &self.user_id {
            lines.push(output::row("User", user_id));
        }
        if let Some(expires_at) = &self.expires_at {
            lines.push(output::row("Expires", &expires_at.to_rfc3339()));
        }
        if self.signed_out {
            lines.push(output::row("Session", "signed out"));
        }
        write!(f, "{}", lines.join("\n"))
    }
}

fn phase_label(phase: HandshakePhase) -> &'static str {
    match phase {
        HandshakePhase::Idle => "idle",
        HandshakePhase::Connecting => "connecting",
        HandshakePhase::AwaitingAutoConnect => "reconnecting",
        HandshakePhase::Connected => "connected",
        HandshakePhase::Handshaking => "signing in",
        HandshakePhase::Authenticated => "authenticated",
        HandshakePhase::Failed => "failed",
    }
}

fn describe(error: HandshakeError) -> anyhow::Error {
    let message = error.to_string();
    if message.starts_with(error.title()) {
        anyhow!(message)
    } else {
        anyhow!("{}: {}", error.title(), message)
    }
}

/// Connect the keypair wallet and run the sign-in handshake.
pub async fn sign_in(
    paths: &Paths,
    config: &Config,
    options: SignInOptions,
    format: &OutputFormat,
) -> Result<()> {
    config.validate()?;

    let key = read_signing_key(&keypair_path(paths, options.keypair))?;
    let wallet = KeypairWallet::new(
        WALLET_NAME,
        key,
        chain_for_cluster(&config.cluster),
        options.trusted,
    );
    let address = wallet.address();
    let adapter = if options.connect_only {
        AdapterHandle::connect_only(wallet)
    } else {
        AdapterHandle::with_sign_in(wallet)
    };

    let services = HandshakeServices::from_config(&config.backend).map_err(describe)?;
    if !services.is_configured() {
        debug!("No sign-in backend configured; handshake will be refused");
    }
    let policy = HandshakePolicy {
        sign_in_after_reconnect: config.sign_in_after_reconnect,
    };
    let orchestrator = HandshakeOrchestrator::new(
        services,
        Arc::new(WatchSessionStore::new()),
        Arc::new(TracingNotifier),
    )
    .with_policy(policy);

    if *format == OutputFormat::Text {
        orchestrator.set_phase_callback(|adapter, phase| {
            eprintln!("[{}] {}", adapter, phase_label(phase));
        });
    }

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted; abandoning sign-in");
                cancel.cancel();
            }
        })
    };

    let result = if options.direct {
        orchestrator.sign_in(&adapter, cancel).await
    } else {
        orchestrator.connect(&adapter, cancel).await
    };
    interrupt.abort();

    let outcome = result.map_err(describe)?;
    let mut report = SignInReport::new(address, &outcome, &orchestrator.session());

    if options.sign_out && outcome != ConnectOutcome::Abandoned {
        orchestrator.sign_out(Some(&adapter)).await;
        report.signed_out = true;
    }

    output::print(&report, format);
    Ok(())
}
