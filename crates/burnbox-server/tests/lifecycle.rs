use std::time::Duration;

use burnbox_server::{
    store::{
        crypto::storage_key, model::now, spawn_sweep, RedbStore, SecretRecord, SecretStore,
    },
    vault::Vault,
    Cleanup, Retrieval, VaultConfig,
};
use tempfile::tempdir;

#[test]
fn secret_survives_restart_and_burns_on_read() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("burnbox.db");

    let created = {
        let vault = Vault::new(RedbStore::open(&path).unwrap(), VaultConfig::default());
        vault.create("launch codes", None).unwrap()
    };

    let vault = Vault::new(RedbStore::open(&path).unwrap(), VaultConfig::default());
    assert_eq!(
        vault.retrieve(&created.identifier),
        Retrieval::Delivered {
            plaintext: "launch codes".into(),
            cleanup: Cleanup::Removed,
        }
    );
    assert_eq!(vault.retrieve(&created.identifier), Retrieval::NotFound);
}

#[test]
fn wrong_identifier_reveals_nothing() {
    let dir = tempdir().unwrap();
    let vault = Vault::new(
        RedbStore::open(&dir.path().join("burnbox.db")).unwrap(),
        VaultConfig::default(),
    );
    let created = vault.create("mine", None).unwrap();

    assert_eq!(vault.retrieve("not-the-identifier"), Retrieval::NotFound);
    assert!(vault.store().exists(&created.storage_key).unwrap());
}

#[tokio::test]
async fn sweep_evicts_expired_records() {
    let dir = tempdir().unwrap();
    let store = RedbStore::open(&dir.path().join("burnbox.db")).unwrap();

    let stale = SecretRecord {
        storage_key: storage_key("stale"),
        ciphertext: "v2$SALTSALTSALTSALT$00".into(),
        created_at: 1,
        expires_at: 2,
    };
    let live = SecretRecord {
        storage_key: storage_key("live"),
        expires_at: now() + 3600,
        ..stale.clone()
    };
    store.put(&stale).unwrap();
    store.put(&live).unwrap();

    let handle = spawn_sweep(store.clone(), Duration::from_millis(20));
    tokio::time::sleep(Duration::from_millis(300)).await;
    handle.abort();

    assert!(!store.exists(&stale.storage_key).unwrap());
    assert!(store.exists(&live.storage_key).unwrap());
}
