use thiserror::Error;

/// Failures of the cipher codec.
///
/// `DecryptionFailed` deliberately carries no detail: callers surface it as a
/// generic retrieval error and must not be able to tell a wrong key from a
/// tampered or truncated ciphertext.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Empty plaintext, passphrase or ciphertext. A caller bug, never retried.
    #[error("empty input")]
    EmptyInput,

    /// Authentication failure, malformed encoding or non-text output.
    #[error("decryption failed")]
    DecryptionFailed,

    /// A primitive could not be constructed (bad key length, missing legacy key).
    #[error("cipher error: {0}")]
    Cipher(String),
}

/// Errors raised by a [`super::SecretStore`] backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Record bytes could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Underlying database or lock failure.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<redb::Error> for StoreError {
    fn from(err: redb::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<redb::TransactionError> for StoreError {
    fn from(err: redb::TransactionError) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<redb::TableError> for StoreError {
    fn from(err: redb::TableError) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<redb::StorageError> for StoreError {
    fn from(err: redb::StorageError) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<redb::CommitError> for StoreError {
    fn from(err: redb::CommitError) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<redb::DatabaseError> for StoreError {
    fn from(err: redb::DatabaseError) -> Self {
        StoreError::Io(err.to_string())
    }
}
