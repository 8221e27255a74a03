use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use super::error::StoreError;
use super::model::SecretRecord;
use super::SecretStore;

/// Non-persistent store for tests and embedders that don't need durability.
///
/// All state sits behind one `Arc<Mutex<_>>`, so clones share records and
/// `delete` is atomic.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<HashMap<String, SecretRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held, expired or not.
    pub fn len(&self) -> usize {
        self.lock().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, SecretRecord>>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Io("memory store lock poisoned".into()))
    }
}

impl SecretStore for MemoryStore {
    fn put(&self, record: &SecretRecord) -> Result<(), StoreError> {
        self.lock()?
            .insert(record.storage_key.clone(), record.clone());
        Ok(())
    }

    fn get(&self, storage_key: &str) -> Result<Option<SecretRecord>, StoreError> {
        Ok(self.lock()?.get(storage_key).cloned())
    }

    fn delete(&self, storage_key: &str) -> Result<bool, StoreError> {
        Ok(self.lock()?.remove(storage_key).is_some())
    }

    fn prune_expired(&self, now: i64) -> Result<Vec<String>, StoreError> {
        let mut map = self.lock()?;
        let expired: Vec<String> = map
            .values()
            .filter(|r| r.is_expired(now))
            .map(|r| r.storage_key.clone())
            .collect();
        for key in &expired {
            map.remove(key);
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: &str, expires_at: i64) -> SecretRecord {
        SecretRecord {
            storage_key: key.into(),
            ciphertext: "00".into(),
            created_at: 1,
            expires_at,
        }
    }

    #[test]
    fn clones_share_records() {
        let a = MemoryStore::new();
        let b = a.clone();
        a.put(&record("k", 50)).unwrap();
        assert!(b.exists("k").unwrap());
        assert!(b.delete("k").unwrap());
        assert!(!a.delete("k").unwrap());
        assert!(a.is_empty());
    }

    #[test]
    fn prune_expired_keeps_live_records() {
        let s = MemoryStore::new();
        s.put(&record("old", 5)).unwrap();
        s.put(&record("new", 50)).unwrap();
        assert_eq!(s.prune_expired(10).unwrap(), vec!["old".to_string()]);
        assert_eq!(s.len(), 1);
    }
}
