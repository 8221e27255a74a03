pub mod codec;
pub mod crypto;
pub mod db;
pub mod error;
pub mod memory;
pub mod model;

use std::time::Duration;

use tokio::{task::JoinHandle, time};
use tracing::{info, warn};

pub use codec::{Codec, Format};
pub use crypto::LegacyKey;
pub use db::RedbStore;
pub use error::{CodecError, StoreError};
pub use memory::MemoryStore;
pub use model::{classify, compute_expiry, Classification, SecretRecord};

/// Persistence boundary for secret records.
///
/// Single-key operations only. Implementations share state internally so
/// clones address the same records. `delete` must be atomic and report
/// whether it actually removed a row: it is the only serialization point
/// between overlapping retrievals of the same secret.
pub trait SecretStore: Clone + Send + Sync + 'static {
    /// Insert a record under `record.storage_key`.
    fn put(&self, record: &SecretRecord) -> Result<(), StoreError>;

    /// Fetch a record. `None` when no such key exists.
    fn get(&self, storage_key: &str) -> Result<Option<SecretRecord>, StoreError>;

    /// Remove a record. Returns true only if this call removed it.
    fn delete(&self, storage_key: &str) -> Result<bool, StoreError>;

    fn exists(&self, storage_key: &str) -> Result<bool, StoreError> {
        Ok(self.get(storage_key)?.is_some())
    }

    /// Remove every record expired at `now`. Returns the removed keys.
    fn prune_expired(&self, now: i64) -> Result<Vec<String>, StoreError>;
}

/// Spawn a background Tokio task that calls `prune_expired()` every `interval`.
///
/// Lazy eviction at read time already keeps expired secrets unreadable; the
/// sweep only reclaims rows nobody ever came back for.
pub fn spawn_sweep<S: SecretStore>(store: S, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.tick().await; // skip first immediate tick
        loop {
            ticker.tick().await;
            let sweep_store = store.clone();
            let result =
                tokio::task::spawn_blocking(move || sweep_store.prune_expired(model::now())).await;
            match result {
                Ok(Ok(removed)) if !removed.is_empty() => {
                    info!(removed = removed.len(), "swept expired secrets");
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(error = %e, "background sweep error"),
                Err(e) => warn!(error = %e, "background sweep task failed"),
            }
        }
    })
}
