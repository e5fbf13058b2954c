//! Keypair generation.

use super::keypair_path;
use crate::keypair_wallet::{address_of, generate_signing_key, write_signing_key};
use crate::output::{self, OutputFormat};
use anyhow::Result;
use siws_config_and_utils::Paths;
use std::path::PathBuf;
use tracing::info;

/// Generate a keypair and write it to `out` or the default location.
pub fn keygen(paths: &Paths, out: Option<PathBuf>, force: bool, format: &OutputFormat) -> Result<()> {
    let path = keypair_path(paths, out);
    let key = generate_signing_key();
    write_signing_key(&path, &key, force)?;

    let address = address_of(&key);
    info!(path = %path.display(), address = %address, "Generated keypair");
    output::print_success(
        &format!("Wrote keypair for {} to {}", address, path.display()),
        format,
    );
    Ok(())
}
