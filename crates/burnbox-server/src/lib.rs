pub mod auth;
pub mod dirs;
pub mod handlers;
pub mod messages;
pub mod server;
pub mod store;
pub mod vault;

use std::sync::Arc;

use tokio::sync::Semaphore;

use store::RedbStore;
use vault::Vault;

/// Shared application state threaded through axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub vault: Vault<RedbStore>,
    /// Request-signing secret. `None` disables signature verification.
    pub signing_secret: Option<String>,
    /// Bounds concurrent Argon2id derivations (64 MiB each) on the blocking pool.
    pub kdf_permits: Arc<Semaphore>,
}

impl AppState {
    pub fn new(
        vault: Vault<RedbStore>,
        signing_secret: Option<String>,
        max_concurrent_kdf: usize,
    ) -> Self {
        Self {
            vault,
            signing_secret,
            kdf_permits: Arc::new(Semaphore::new(max_concurrent_kdf.max(1))),
        }
    }
}

pub use server::{build_router, open_vault, read_key_file, resolve_data_dir, run, ServerConfig};
pub use vault::{Cleanup, Created, Retrieval, VaultConfig, VaultError};
