//! CLI command implementations.

mod config;
mod keygen;
mod sign_in;

pub use config::show_config;
pub use keygen::keygen;
pub use sign_in::{sign_in, SignInOptions};

use siws_config_and_utils::Paths;
use std::path::PathBuf;

/// Keypair location: the explicit path, or the default under the data directory.
fn keypair_path(paths: &Paths, explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(|| paths.keypair_file())
}
