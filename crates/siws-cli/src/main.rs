//! siws - sign in to a wallet-authenticated backend with a local keypair.

mod commands;
mod keypair_wallet;
mod output;

use clap::{Parser, Subcommand};
use siws_config_and_utils::{init_logging, Config, Paths};
use std::path::PathBuf;
use tracing::debug;

/// siws - Sign in with a local Solana keypair.
#[derive(Parser)]
#[command(name = "siws")]
#[command(about = "Wallet sign-in handshake driven from a local keypair")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error); defaults to the configured level
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new signing keypair
    Keygen {
        /// Where to write the keypair (defaults to the data directory)
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Overwrite an existing keypair
        #[arg(long)]
        force: bool,
    },

    /// Connect the keypair wallet and sign in to the backend
    SignIn {
        /// Keypair file (defaults to the data directory)
        #[arg(short, long)]
        keypair: Option<PathBuf>,
        /// Treat the wallet as previously approved so silent reconnect succeeds
        #[arg(long)]
        trusted: bool,
        /// Expose the wallet without sign-in support
        #[arg(long, conflicts_with = "direct")]
        connect_only: bool,
        /// Skip silent reconnect and run the sign-in handshake directly
        #[arg(long)]
        direct: bool,
        /// Sign out again once signed in, releasing the session
        #[arg(long)]
        sign_out: bool,
    },

    /// Show the effective configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        write: bool,
    },
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let paths = Paths::new()?;
    paths.ensure_dirs()?;
    let config = Config::load(&paths)?;

    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    init_logging(level, &paths, false);
    debug!(base_dir = %paths.base_dir().display(), "Loaded configuration");

    match cli.command {
        Commands::Keygen { out, force } => commands::keygen(&paths, out, force, &cli.format),
        Commands::SignIn {
            keypair,
            trusted,
            connect_only,
            direct,
            sign_out,
        } => {
            let options = commands::SignInOptions {
                keypair,
                trusted,
                connect_only,
                direct,
                sign_out,
            };
            commands::sign_in(&paths, &config, options, &cli.format).await
        }
        Commands::Config { write } => commands::show_config(&paths, &config, write, &cli.format),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let format = cli.format;

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e), &format);
        std::process::exit(1);
    }
}
