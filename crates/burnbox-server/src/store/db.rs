use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};
use tracing::{debug, warn};

use super::error::StoreError;
use super::model::SecretRecord;
use super::SecretStore;

const SECRETS: TableDefinition<&str, &[u8]> = TableDefinition::new("secrets");

/// Leading byte of every encoded record, bumped if the record layout changes.
const RECORD_V1_MARKER: u8 = 0x01;

/// Thread-safe handle to the redb store. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = Database::create(path)?;

        // Ensure the table exists so read transactions never miss it.
        let write_txn = db.begin_write()?;
        write_txn.open_table(SECRETS)?;
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl SecretStore for RedbStore {
    fn put(&self, record: &SecretRecord) -> Result<(), StoreError> {
        let bytes = encode(record)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SECRETS)?;
            table.insert(record.storage_key.as_str(), bytes.as_slice())?;
        }
        write_txn.commit()?;

        debug!(storage_key = %record.storage_key, "stored secret");
        Ok(())
    }

    fn get(&self, storage_key: &str) -> Result<Option<SecretRecord>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SECRETS)?;

        // Copy out of the AccessGuard before decoding.
        let raw_bytes: Option<Vec<u8>> =
            table.get(storage_key)?.map(|guard| guard.value().to_vec());

        raw_bytes.map(|bytes| decode(&bytes)).transpose()
    }

    fn delete(&self, storage_key: &str) -> Result<bool, StoreError> {
        // redb serializes write transactions, so exactly one concurrent
        // caller observes `existed == true`.
        let write_txn = self.db.begin_write()?;
        let existed = {
            let mut table = write_txn.open_table(SECRETS)?;
            let removed = table.remove(storage_key)?;
            removed.is_some()
        };
        write_txn.commit()?;

        debug!(storage_key = %storage_key, existed, "deleted secret");
        Ok(existed)
    }

    fn exists(&self, storage_key: &str) -> Result<bool, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SECRETS)?;
        let found = table.get(storage_key)?.is_some();
        Ok(found)
    }

    fn prune_expired(&self, now: i64) -> Result<Vec<String>, StoreError> {
        let write_txn = self.db.begin_write()?;
        let expired_keys = {
            let mut table = write_txn.open_table(SECRETS)?;

            let mut keys = Vec::new();
            for item in table.iter()? {
                let (k, v) = item?;
                match decode(v.value()) {
                    Ok(record) if record.is_expired(now) => keys.push(k.value().to_owned()),
                    Ok(_) => {}
                    Err(e) => warn!(storage_key = %k.value(), error = %e, "skipping undecodable record"),
                }
            }

            for key in &keys {
                table.remove(key.as_str())?;
            }
            keys
        };
        write_txn.commit()?;

        if !expired_keys.is_empty() {
            debug!(removed = expired_keys.len(), "pruned expired secrets");
        }
        Ok(expired_keys)
    }
}

/// Encode a record as `[RECORD_V1_MARKER] + bincode(record)`.
fn encode(record: &SecretRecord) -> Result<Vec<u8>, StoreError> {
    let payload = bincode::serde::encode_to_vec(record, bincode::config::standard())
        .map_err(|e| StoreError::Serialization(format!("bincode encode: {e}")))?;
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(RECORD_V1_MARKER);
    out.extend_from_slice(&payload);
    Ok(out)
}

fn decode(bytes: &[u8]) -> Result<SecretRecord, StoreError> {
    match bytes.split_first() {
        Some((&RECORD_V1_MARKER, payload)) => {
            let (record, _) =
                bincode::serde::decode_from_slice(payload, bincode::config::standard())
                    .map_err(|e| StoreError::Serialization(format!("bincode decode: {e}")))?;
            Ok(record)
        }
        Some((marker, _)) => Err(StoreError::Serialization(format!(
            "unknown record marker {marker:#04x}"
        ))),
        None => Err(StoreError::Serialization("empty record".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_store() -> (RedbStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let store = RedbStore::open(&path).unwrap();
        (store, dir)
    }

    fn record(key: &str, expires_at: i64) -> SecretRecord {
        SecretRecord {
            storage_key: key.into(),
            ciphertext: "v2$SALT$00ff".into(),
            created_at: 100,
            expires_at,
        }
    }

    #[test]
    fn put_get_delete() {
        let (s, _dir) = make_store();
        let r = record("k1", 10_000);
        s.put(&r).unwrap();
        assert_eq!(s.get("k1").unwrap(), Some(r));
        assert!(s.exists("k1").unwrap());
        assert!(s.delete("k1").unwrap());
        assert_eq!(s.get("k1").unwrap(), None);
        assert!(!s.exists("k1").unwrap());
    }

    #[test]
    fn second_delete_reports_nothing_removed() {
        let (s, _dir) = make_store();
        s.put(&record("once", 10_000)).unwrap();
        assert!(s.delete("once").unwrap());
        assert!(!s.delete("once").unwrap());
    }

    #[test]
    fn prune_removes_only_expired() {
        let (s, _dir) = make_store();
        s.put(&record("live", 2_000)).unwrap();
        s.put(&record("dead", 500)).unwrap();
        s.put(&record("unset", 0)).unwrap();

        let removed = s.prune_expired(1_000).unwrap();
        assert_eq!(removed, vec!["dead".to_string()]);
        assert!(s.exists("live").unwrap());
        assert!(s.exists("unset").unwrap());
        assert!(!s.exists("dead").unwrap());
    }

    #[test]
    fn survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reopen.db");
        {
            let s = RedbStore::open(&path).unwrap();
            s.put(&record("persisted", 10_000)).unwrap();
        }
        let s = RedbStore::open(&path).unwrap();
        assert!(s.exists("persisted").unwrap());
    }

    #[test]
    fn unknown_marker_rejected() {
        assert!(matches!(
            decode(&[0x7f, 0, 0]),
            Err(StoreError::Serialization(_))
        ));
        assert!(matches!(decode(&[]), Err(StoreError::Serialization(_))));
    }
}
