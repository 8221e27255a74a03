//! Create and retrieve single-use secrets.
//!
//! A secret is sealed under a fresh random identifier that doubles as its
//! passphrase. Only the SHA-256 of the identifier reaches the store, so a
//! stored record cannot be decrypted without the identifier the recipient
//! holds. A successful retrieval deletes the record.

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::store::{
    classify,
    codec::Codec,
    compute_expiry,
    crypto::{generate_identifier, storage_key},
    model::now,
    Classification, CodecError, LegacyKey, SecretRecord, SecretStore, StoreError,
};

/// Engine settings, built once at startup.
#[derive(Clone, Debug)]
pub struct VaultConfig {
    /// Key for secrets stored in the legacy CTR format.
    pub legacy_key: Option<LegacyKey>,
    /// Report `NotFound` when a concurrent retrieval already deleted the record.
    pub strict_single_use: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            legacy_key: None,
            strict_single_use: true,
        }
    }
}

#[derive(Error, Debug)]
pub enum VaultError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A freshly stored secret. `identifier` is the only way back to it.
#[derive(Clone)]
pub struct Created {
    pub identifier: String,
    pub storage_key: String,
    pub expires_at: i64,
}

impl std::fmt::Debug for Created {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Created")
            .field("identifier", &"<redacted>")
            .field("storage_key", &self.storage_key)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// What happened to the stored record after a retrieval resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cleanup {
    Removed,
    /// Nothing to remove: another retrieval or the sweep got there first.
    AlreadyGone,
    /// The delete errored; the record may linger until it expires.
    Failed(StoreError),
}

/// Outcome of [`Vault::retrieve`]. Delivery and cleanup are reported apart:
/// a failed delete never turns a delivered secret into an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Retrieval {
    Delivered { plaintext: String, cleanup: Cleanup },
    Expired { cleanup: Cleanup },
    NotFound,
    /// The record is left in place.
    DecryptFailed(CodecError),
    StoreError(StoreError),
}

/// The secret engine. Holds no state besides its store handle and codec.
#[derive(Clone)]
pub struct Vault<S: SecretStore> {
    store: S,
    codec: Codec,
    strict_single_use: bool,
}

impl<S: SecretStore> Vault<S> {
    pub fn new(store: S, config: VaultConfig) -> Self {
        Self {
            store,
            codec: Codec::new(config.legacy_key),
            strict_single_use: config.strict_single_use,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Seal `plaintext` under a new identifier and store it.
    ///
    /// `requested_expiry` is a unix timestamp; it is clamped into
    /// `[now, now + 30d]` and defaults to seven days out.
    pub fn create(
        &self,
        plaintext: &str,
        requested_expiry: Option<i64>,
    ) -> Result<Created, VaultError> {
        self.create_at(plaintext, requested_expiry, now())
    }

    pub fn create_at(
        &self,
        plaintext: &str,
        requested_expiry: Option<i64>,
        now: i64,
    ) -> Result<Created, VaultError> {
        let identifier = generate_identifier();
        let ciphertext = self.codec.encode(plaintext, &identifier)?;

        let record = SecretRecord {
            storage_key: storage_key(&identifier),
            ciphertext,
            created_at: now,
            expires_at: compute_expiry(requested_expiry, now),
        };
        self.store.put(&record)?;

        info!(
            storage_key = %record.storage_key,
            expires_at = record.expires_at,
            "secret created"
        );
        Ok(Created {
            identifier,
            storage_key: record.storage_key,
            expires_at: record.expires_at,
        })
    }

    /// Run the retrieval protocol for `identifier` at the current time.
    pub fn retrieve(&self, identifier: &str) -> Retrieval {
        self.retrieve_at(identifier, now())
    }

    pub fn retrieve_at(&self, identifier: &str, now: i64) -> Retrieval {
        let key = storage_key(identifier);

        let record = match classify(self.store.get(&key), now) {
            Classification::Fresh(record) => record,
            Classification::Expired(_) => {
                let cleanup = self.remove(&key);
                info!(storage_key = %key, ?cleanup, "secret expired");
                return Retrieval::Expired { cleanup };
            }
            Classification::NotFound => {
                debug!(storage_key = %key, "secret not found");
                return Retrieval::NotFound;
            }
            Classification::StoreError(e) => {
                error!(storage_key = %key, error = %e, "secret lookup failed");
                return Retrieval::StoreError(e);
            }
        };

        let plaintext = match self.codec.decode(&record.ciphertext, identifier) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                match &e {
                    CodecError::Cipher(_) => {
                        error!(storage_key = %key, error = %e, "secret could not be decrypted")
                    }
                    _ => warn!(storage_key = %key, error = %e, "secret could not be decrypted"),
                }
                return Retrieval::DecryptFailed(e);
            }
        };

        let cleanup = self.remove(&key);
        if cleanup == Cleanup::AlreadyGone && self.strict_single_use {
            // Lost the race: another retrieval removed the record first.
            info!(storage_key = %key, "secret already delivered elsewhere");
            return Retrieval::NotFound;
        }

        info!(storage_key = %key, ?cleanup, "secret delivered");
        Retrieval::Delivered { plaintext, cleanup }
    }

    /// Delete every record expired at `now`.
    pub fn prune_expired(&self, now: i64) -> Result<usize, StoreError> {
        let removed = self.store.prune_expired(now)?;
        Ok(removed.len())
    }

    fn remove(&self, key: &str) -> Cleanup {
        match self.store.delete(key) {
            Ok(true) => Cleanup::Removed,
            Ok(false) => Cleanup::AlreadyGone,
            Err(e) => {
                warn!(storage_key = %key, error = %e, "failed to delete secret");
                Cleanup::Failed(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Barrier,
    };

    use super::*;
    use crate::store::{model::DAY_SECS, MemoryStore};

    const NOW: i64 = 1_700_000_000;

    fn vault() -> Vault<MemoryStore> {
        Vault::new(MemoryStore::new(), VaultConfig::default())
    }

    /// Memory store whose reads or deletes can be made to fail.
    #[derive(Clone, Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_get: Arc<AtomicBool>,
        fail_delete: Arc<AtomicBool>,
        /// Deletes report "nothing removed" while leaving the record.
        lose_delete_race: Arc<AtomicBool>,
    }

    impl SecretStore for FlakyStore {
        fn put(&self, record: &SecretRecord) -> Result<(), StoreError> {
            self.inner.put(record)
        }

        fn get(&self, key: &str) -> Result<Option<SecretRecord>, StoreError> {
            if self.fail_get.load(Ordering::SeqCst) {
                return Err(StoreError::Io("read failed".into()));
            }
            self.inner.get(key)
        }

        fn delete(&self, key: &str) -> Result<bool, StoreError> {
            if self.fail_delete.load(Ordering::SeqCst) {
                return Err(StoreError::Io("delete failed".into()));
            }
            if self.lose_delete_race.load(Ordering::SeqCst) {
                return Ok(false);
            }
            self.inner.delete(key)
        }

        fn prune_expired(&self, now: i64) -> Result<Vec<String>, StoreError> {
            self.inner.prune_expired(now)
        }
    }

    #[test]
    fn create_then_retrieve_once() {
        let v = vault();
        let created = v.create_at("hunter2", None, NOW).unwrap();
        assert_eq!(created.expires_at, NOW + 7 * DAY_SECS);
        assert_eq!(created.storage_key, storage_key(&created.identifier));

        assert_eq!(
            v.retrieve_at(&created.identifier, NOW + 1),
            Retrieval::Delivered {
                plaintext: "hunter2".into(),
                cleanup: Cleanup::Removed,
            }
        );
        assert_eq!(v.retrieve_at(&created.identifier, NOW + 2), Retrieval::NotFound);
    }

    #[test]
    fn record_never_holds_identifier_or_plaintext() {
        let v = vault();
        let created = v.create_at("hunter2", None, NOW).unwrap();
        let record = v.store().get(&created.storage_key).unwrap().unwrap();
        assert!(record.ciphertext.starts_with("v2$"));
        assert!(!record.ciphertext.contains("hunter2"));
        assert!(!record.ciphertext.contains(&created.identifier));
        assert_ne!(record.storage_key, created.identifier);
    }

    #[test]
    fn create_rejects_empty_plaintext() {
        let v = vault();
        assert!(matches!(
            v.create_at("", None, NOW),
            Err(VaultError::Codec(CodecError::EmptyInput))
        ));
        assert!(v.store().is_empty());
    }

    #[test]
    fn expired_takes_precedence_and_is_deleted() {
        let v = vault();
        let created = v.create_at("soon gone", Some(NOW + 60), NOW).unwrap();

        assert_eq!(
            v.retrieve_at(&created.identifier, NOW + 61),
            Retrieval::Expired {
                cleanup: Cleanup::Removed
            }
        );
        assert!(!v.store().exists(&created.storage_key).unwrap());
        assert_eq!(v.retrieve_at(&created.identifier, NOW), Retrieval::NotFound);
    }

    #[test]
    fn unknown_identifier_not_found() {
        assert_eq!(vault().retrieve_at("nope", NOW), Retrieval::NotFound);
    }

    #[test]
    fn decrypt_failure_keeps_record() {
        let v = vault();
        let key = storage_key("some-identifier");
        v.store()
            .put(&SecretRecord {
                storage_key: key.clone(),
                ciphertext: "v2$SALTSALTSALTSALT$00112233445566778899aabbccddeeff0011".into(),
                created_at: NOW,
                expires_at: NOW + 60,
            })
            .unwrap();

        assert_eq!(
            v.retrieve_at("some-identifier", NOW),
            Retrieval::DecryptFailed(CodecError::DecryptionFailed)
        );
        assert!(v.store().exists(&key).unwrap());
    }

    #[test]
    fn legacy_record_needs_configured_key() {
        let fixture = "000102030405060708090a0b0c0d0e0f:3f38bb94f5b61617645ff528f1a9dd53293df3396a422b375920aca20bb98927c17e22";
        let store = MemoryStore::new();
        store
            .put(&SecretRecord {
                storage_key: storage_key("old-link"),
                ciphertext: fixture.into(),
                created_at: NOW,
                expires_at: 0,
            })
            .unwrap();

        let without = Vault::new(store.clone(), VaultConfig::default());
        assert!(matches!(
            without.retrieve_at("old-link", NOW),
            Retrieval::DecryptFailed(CodecError::Cipher(_))
        ));

        let with = Vault::new(
            store,
            VaultConfig {
                legacy_key: Some(LegacyKey::new(*b"0123456789abcdef0123456789abcdef").unwrap()),
                ..VaultConfig::default()
            },
        );
        assert_eq!(
            with.retrieve_at("old-link", NOW),
            Retrieval::Delivered {
                plaintext: "legacy secret from the before times".into(),
                cleanup: Cleanup::Removed,
            }
        );
    }

    #[test]
    fn v1_record_decrypts_with_identifier() {
        let v = vault();
        v.store()
            .put(&SecretRecord {
                storage_key: storage_key("monkey"),
                ciphertext: "30303030303030303030303029c9922a9be75ba2e6be5afd32d19387baea51fa577c0c51dc9809a54adb9085490f109237d15a3262a585".into(),
                created_at: NOW,
                expires_at: NOW + 60,
            })
            .unwrap();
        assert!(matches!(
            v.retrieve_at("monkey", NOW),
            Retrieval::Delivered { plaintext, .. } if plaintext == "the password is baseball123"
        ));
    }

    #[test]
    fn store_read_error_reported_without_delete() {
        let store = FlakyStore::default();
        let v = Vault::new(store.clone(), VaultConfig::default());
        let created = v.create_at("x", None, NOW).unwrap();

        store.fail_get.store(true, Ordering::SeqCst);
        assert!(matches!(
            v.retrieve_at(&created.identifier, NOW),
            Retrieval::StoreError(StoreError::Io(_))
        ));
        assert!(store.inner.exists(&created.storage_key).unwrap());
    }

    #[test]
    fn delete_failure_still_delivers() {
        let store = FlakyStore::default();
        let v = Vault::new(store.clone(), VaultConfig::default());
        let created = v.create_at("still mine", None, NOW).unwrap();

        store.fail_delete.store(true, Ordering::SeqCst);
        assert_eq!(
            v.retrieve_at(&created.identifier, NOW),
            Retrieval::Delivered {
                plaintext: "still mine".into(),
                cleanup: Cleanup::Failed(StoreError::Io("delete failed".into())),
            }
        );
    }

    #[test]
    fn lost_delete_race_depends_on_policy() {
        let store = FlakyStore::default();
        store.lose_delete_race.store(true, Ordering::SeqCst);

        let strict = Vault::new(store.clone(), VaultConfig::default());
        let created = strict.create_at("raced", None, NOW).unwrap();
        assert_eq!(strict.retrieve_at(&created.identifier, NOW), Retrieval::NotFound);

        let lenient = Vault::new(
            store,
            VaultConfig {
                strict_single_use: false,
                ..VaultConfig::default()
            },
        );
        assert_eq!(
            lenient.retrieve_at(&created.identifier, NOW),
            Retrieval::Delivered {
                plaintext: "raced".into(),
                cleanup: Cleanup::AlreadyGone,
            }
        );
    }

    #[test]
    fn concurrent_retrievals_deliver_once() {
        let v = vault();
        let created = v.create_at("only one of you", None, NOW).unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let v = v.clone();
                let id = created.identifier.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    v.retrieve_at(&id, NOW)
                })
            })
            .collect();

        let outcomes: Vec<Retrieval> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let delivered = outcomes
            .iter()
            .filter(|o| matches!(o, Retrieval::Delivered { .. }))
            .count();
        assert_eq!(delivered, 1);
        assert!(outcomes.contains(&Retrieval::NotFound));
    }

    #[test]
    fn prune_counts_removed() {
        let v = vault();
        v.create_at("a", Some(NOW + 10), NOW).unwrap();
        v.create_at("b", None, NOW).unwrap();
        assert_eq!(v.prune_expired(NOW + 11).unwrap(), 1);
        assert_eq!(v.store().len(), 1);
    }
}
