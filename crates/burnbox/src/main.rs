use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use burnbox_server::{open_vault, Cleanup, Retrieval, ServerConfig};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

// ── CLI definition ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "burnbox", about = "Burnbox: secrets that burn after reading", version)]
struct Cli {
    /// Directory holding burnbox.db (default: $BURNBOX_DATA_DIR or the platform data dir)
    #[arg(long, env = "BURNBOX_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the chat-command HTTP server
    Serve {
        /// Port to listen on (default: $BURNBOX_PORT or 8080)
        #[arg(long, env = "BURNBOX_PORT", default_value = "8080")]
        port: u16,
        /// Host to bind (default: $BURNBOX_HOST or 0.0.0.0)
        #[arg(long, env = "BURNBOX_HOST", default_value = "0.0.0.0")]
        host: String,
        /// How often expired secrets are swept, e.g. 30s, 5m
        #[arg(long, env = "BURNBOX_SWEEP_INTERVAL", value_parser = humantime::parse_duration)]
        sweep_interval: Option<Duration>,
        /// Accept unsigned requests. Never use in production.
        #[arg(long, env = "BURNBOX_SKIP_SIGNATURE")]
        skip_signature: bool,
    },
    /// Delete all expired secrets immediately
    Prune,
    /// Store a secret locally and print its one-time identifier
    Seal {
        /// Secret text
        text: String,
        /// Lifetime e.g. 1h, 2d (default 7d, at most 30d)
        #[arg(long, value_parser = humantime::parse_duration)]
        expires_in: Option<Duration>,
    },
    /// Retrieve (and destroy) a secret by identifier
    Open {
        identifier: String,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.command {
        Commands::Serve { .. } => "info",
        _ => "warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("BURNBOX_LOG_LEVEL")
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut cfg = ServerConfig::from_env()?;
    if cli.data_dir.is_some() {
        cfg.data_dir = cli.data_dir;
    }

    match cli.command {
        Commands::Serve {
            port,
            host,
            sweep_interval,
            skip_signature,
        } => {
            cfg.port = port;
            cfg.host = host;
            cfg.skip_signature |= skip_signature;
            if let Some(interval) = sweep_interval {
                cfg.sweep_interval = interval;
            }
            burnbox_server::run(cfg).await
        }
        Commands::Prune => cmd_prune(&cfg),
        Commands::Seal { text, expires_in } => cmd_seal(&cfg, &text, expires_in),
        Commands::Open { identifier } => cmd_open(&cfg, &identifier),
    }
}

// ── Command implementations ───────────────────────────────────────────────────

fn cmd_prune(cfg: &ServerConfig) -> Result<()> {
    let vault = open_vault(cfg)?;
    let removed = vault
        .prune_expired(burnbox_server::store::model::now())
        .context("prune expired secrets")?;
    println!("pruned {removed} expired secret(s)");
    Ok(())
}

fn cmd_seal(cfg: &ServerConfig, text: &str, expires_in: Option<Duration>) -> Result<()> {
    let vault = open_vault(cfg)?;
    let now = burnbox_server::store::model::now();
    let requested = expires_in
        .map(|d| i64::try_from(d.as_secs()).map(|secs| now.saturating_add(secs)))
        .transpose()
        .context("expiry too far in the future")?;

    let created = vault
        .create_at(text, requested, now)
        .context("seal secret")?;
    println!("{}", created.identifier);
    eprintln!(
        "expires in {}",
        humantime::format_duration(Duration::from_secs(
            u64::try_from(created.expires_at - now).unwrap_or(0)
        ))
    );
    Ok(())
}

fn cmd_open(cfg: &ServerConfig, identifier: &str) -> Result<()> {
    let vault = open_vault(cfg)?;
    match vault.retrieve(identifier) {
        Retrieval::Delivered { plaintext, cleanup } => {
            println!("{plaintext}");
            if let Cleanup::Failed(e) = cleanup {
                eprintln!("warning: secret delivered but not deleted: {e}");
            }
            Ok(())
        }
        Retrieval::Expired { .. } => bail!("secret expired"),
        Retrieval::NotFound => bail!("secret not found: already retrieved or expired"),
        Retrieval::DecryptFailed(e) => bail!("secret could not be decrypted: {e}"),
        Retrieval::StoreError(e) => Err(e).context("read secret"),
    }
}
