use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    auth::require_signature,
    handlers::{health, interactive, slash},
    store::{spawn_sweep, LegacyKey, RedbStore},
    vault::{Vault, VaultConfig},
    AppState,
};

pub const DB_FILE: &str = "burnbox.db";

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: Option<PathBuf>,
    /// Request-signing secret shared with the chat platform.
    pub signing_secret: Option<String>,
    /// Set `BURNBOX_SKIP_SIGNATURE=true` to accept unsigned requests.
    pub skip_signature: bool,
    /// Raw AES key for secrets stored in the legacy format.
    pub legacy_key: Option<String>,
    pub sweep_interval: Duration,
    pub strict_single_use: bool,
    pub max_concurrent_kdf: usize,
}

impl ServerConfig {
    /// Build from `BURNBOX_*` environment variables. Secrets prefer their
    /// `_FILE` variant when both are set.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: std::env::var("BURNBOX_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("BURNBOX_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            data_dir: std::env::var("BURNBOX_DATA_DIR").ok().map(PathBuf::from),
            signing_secret: resolve_secret("BURNBOX_SIGNING_SECRET")?,
            skip_signature: env_flag("BURNBOX_SKIP_SIGNATURE", false),
            legacy_key: resolve_secret("BURNBOX_LEGACY_KEY")?,
            sweep_interval: match std::env::var("BURNBOX_SWEEP_INTERVAL") {
                Ok(v) => humantime::parse_duration(&v)
                    .with_context(|| format!("invalid BURNBOX_SWEEP_INTERVAL: {v}"))?,
                Err(_) => Duration::from_secs(300),
            },
            strict_single_use: env_flag("BURNBOX_STRICT_SINGLE_USE", true),
            max_concurrent_kdf: std::env::var("BURNBOX_MAX_CONCURRENT_KDF")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4),
        })
    }

    pub fn vault_config(&self) -> Result<VaultConfig> {
        let legacy_key = self
            .legacy_key
            .as_deref()
            .map(|k| LegacyKey::new(k.as_bytes()))
            .transpose()
            .context("BURNBOX_LEGACY_KEY must be 16, 24 or 32 bytes")?;
        Ok(VaultConfig {
            legacy_key,
            strict_single_use: self.strict_single_use,
        })
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| v != "false" && v != "0")
        .unwrap_or(default)
}

/// Read a key from a file, trimming surrounding whitespace.
/// Fails if the file cannot be read or is empty after trimming.
pub fn read_key_file(path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("read key file: {}", path.display()))?;
    let key = content.trim().to_string();
    if key.is_empty() {
        anyhow::bail!("key file is empty: {}", path.display());
    }
    Ok(key)
}

/// Resolve `<name>_FILE` (preferred) or `<name>`.
/// Env vars are visible via `docker inspect` and `/proc`; files are not.
fn resolve_secret(name: &str) -> Result<Option<String>> {
    if let Ok(path) = std::env::var(format!("{name}_FILE")) {
        let key = read_key_file(Path::new(&path))?;
        if std::env::var(name).is_ok() {
            warn!("both {name} and {name}_FILE are set; using file");
        }
        return Ok(Some(key));
    }
    Ok(std::env::var(name).ok().filter(|v| !v.is_empty()))
}

/// Resolve the data directory, creating it if needed.
pub fn resolve_data_dir(data_dir: Option<&PathBuf>) -> Result<PathBuf> {
    let dir = match data_dir {
        Some(d) => d.clone(),
        None => crate::dirs::platform_data_dir()?,
    };
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("create data dir {}", dir.display()))?;
    Ok(dir)
}

/// Open the on-disk store and wrap it in a vault configured from `cfg`.
pub fn open_vault(cfg: &ServerConfig) -> Result<Vault<RedbStore>> {
    let data_dir = resolve_data_dir(cfg.data_dir.as_ref())?;
    info!(data_dir = %data_dir.display(), "using data directory");

    let store = RedbStore::open(&data_dir.join(DB_FILE)).context("open store")?;
    Ok(Vault::new(store, cfg.vault_config()?))
}

pub fn build_router(state: AppState) -> Router {
    // Chat-platform callbacks must carry a valid request signature.
    let signed = Router::new()
        .route("/slash", post(slash))
        .route("/interactive", post(interactive))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_signature,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(signed)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn run(cfg: ServerConfig) -> Result<()> {
    let signing_secret = if cfg.skip_signature {
        warn!("SIGNATURE VALIDATION IS DISABLED; any caller can create and read secrets");
        None
    } else {
        Some(cfg.signing_secret.clone().context(
            "BURNBOX_SIGNING_SECRET or BURNBOX_SIGNING_SECRET_FILE is required \
             (or set BURNBOX_SKIP_SIGNATURE=true)",
        )?)
    };
    if cfg.legacy_key.is_none() {
        info!("no legacy key configured; legacy-format secrets will not decrypt");
    }

    let vault = open_vault(&cfg)?;
    spawn_sweep(vault.store().clone(), cfg.sweep_interval);

    let state = AppState::new(vault, signing_secret, cfg.max_concurrent_kdf);
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;

    info!(%addr, "burnbox server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind listener")?;

    axum::serve(listener, app).await.context("server error")
}
