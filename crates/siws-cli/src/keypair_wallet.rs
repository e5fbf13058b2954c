//! Local wallet agent backed by an ed25519 keypair file.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use rand::RngCore;
use siws_handshake::{
    SignInChallenge, SignInWallet, WalletAccount, WalletAgent, WalletError, WalletSignInOutput,
};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

/// Domain used in the sign-in message when the challenge names none.
const DEFAULT_DOMAIN: &str = "siws-cli";

pub fn generate_signing_key() -> SigningKey {
    let mut secret = [0u8; 32];
    OsRng.fill_bytes(&mut secret);
    SigningKey::from_bytes(&secret)
}

/// Write the secret key as hex. Refuses to overwrite unless `force`.
pub fn write_signing_key(path: &Path, key: &SigningKey, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists; pass --force to overwrite it",
            path.display()
        );
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    writeln!(file, "{}", hex::encode(key.to_bytes()))?;
    Ok(())
}

pub fn read_signing_key(path: &Path) -> Result<SigningKey> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read keypair {}", path.display()))?;
    let bytes = hex::decode(raw.trim()).context("Keypair file is not valid hex")?;
    let secret: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| anyhow::anyhow!("Keypair must be 32 bytes, got {}", bytes.len()))?;
    Ok(SigningKey::from_bytes(&secret))
}

/// Base58 Solana address of a key.
pub fn address_of(key: &SigningKey) -> String {
    bs58::encode(key.verifying_key().as_bytes()).into_string()
}

/// CAIP-style chain id for a cluster name.
pub fn chain_for_cluster(cluster: &str) -> String {
    match cluster {
        "mainnet-beta" | "mainnet" => "solana:mainnet".to_string(),
        other => format!("solana:{}", other),
    }
}

/// Build the sign-in message text for `input` on behalf of `address`.
pub fn sign_in_message(input: &SignInChallenge, address: &str) -> String {
    let domain = input.domain.as_deref().unwrap_or(DEFAULT_DOMAIN);
    let mut message = format!(
        "{} wants you to sign in with your Solana account:\n{}",
        domain, address
    );
    if let Some(statement) = input.statement.as_deref() {
        message.push_str("\n\n");
        message.push_str(statement);
    }

    let mut fields = Vec::new();
    let labelled = [
        ("URI", &input.uri),
        ("Version", &input.version),
        ("Chain ID", &input.chain_id),
        ("Nonce", &input.nonce),
        ("Issued At", &input.issued_at),
        ("Expiration Time", &input.expiration_time),
        ("Not Before", &input.not_before),
        ("Request ID", &input.request_id),
    ];
    for (label, value) in labelled {
        if let Some(value) = value {
            fields.push(format!("{}: {}", label, value));
        }
    }
    if let Some(resources) = &input.resources {
        fields.push("Resources:".to_string());
        fields.extend(resources.iter().map(|r| format!("- {}", r)));
    }
    if !fields.is_empty() {
        message.push_str("\n\n");
        message.push_str(&fields.join("\n"));
    }
    message
}

/// Wallet agent holding a keypair in memory.
///
/// `trusted` stands in for a previously approved connection: only a trusted
/// wallet reconnects silently.
pub struct KeypairWallet {
    name: String,
    signing_key: SigningKey,
    chain: String,
    trusted: bool,
    connected: AtomicBool,
}

impl KeypairWallet {
    pub fn new(name: &str, signing_key: SigningKey, chain: String, trusted: bool) -> Self {
        Self {
            name: name.to_string(),
            signing_key,
            chain,
            trusted,
            connected: AtomicBool::new(false),
        }
    }

    pub fn address(&self) -> String {
        address_of(&self.signing_key)
    }
}

#[async_trait]
impl WalletAgent for KeypairWallet {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn auto_connect(&self) -> Result<(), WalletError> {
        if !self.trusted {
            return Err(WalletError::NotReady);
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), WalletError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl SignInWallet for KeypairWallet {
    async fn sign_in(&self, input: SignInChallenge) -> Result<WalletSignInOutput, WalletError> {
        let address = self.address();
        if let Some(requested) = input.address.as_deref() {
            if requested != address {
                return Err(WalletError::SignIn(format!(
                    "challenge is addressed to {}",
                    requested
                )));
            }
        }

        let message = sign_in_message(&input, &address);
        let signature = self.signing_key.sign(message.as_bytes());
        self.connected.store(true, Ordering::SeqCst);

        Ok(WalletSignInOutput {
            account: WalletAccount {
                address,
                public_key: self.signing_key.verifying_key().to_bytes().to_vec(),
                chains: vec![self.chain.clone()],
                features: vec!["solana:signIn".to_string(), "solana:signMessage".to_string()],
                label: Some(self.name.clone()),
                icon: None,
                extra: Default::default(),
            },
            signed_message: message.into_bytes(),
            signature: signature.to_bytes().to_vec(),
            signature_type: Some("ed25519".to_string()),
            extra: Default::default(),
        })
    }
}
