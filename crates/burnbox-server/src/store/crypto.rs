use argon2::{Algorithm, Argon2, Params, Version};
use md5::Md5;
use rand::{rngs::OsRng, Rng};
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Argon2id cost parameters for Format-2 keys. Not stored alongside the
/// ciphertext, so changing any of them orphans every existing v2 secret.
pub const ARGON2_M_COST_KIB: u32 = 64 * 1024;
pub const ARGON2_T_COST: u32 = 1;
pub const ARGON2_P_COST: u32 = 1;

/// Salt tokens use the RFC 4648 base32 alphabet: 26 symbols carry 130 bits.
const SALT_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";
const SALT_LEN: usize = 26;

/// Identifiers use the unambiguous 57-symbol alphabet common to short UUIDs.
const IDENTIFIER_ALPHABET: &[u8; 57] =
    b"23456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
const IDENTIFIER_LEN: usize = 22;

/// How a passphrase becomes key material. Selected by the format a
/// ciphertext was written in, never by the caller directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMode<'a> {
    /// Raw bytes used verbatim (system-wide legacy key).
    Legacy,
    /// MD5 digest of the passphrase, AES-128.
    Md5,
    /// Argon2id over passphrase and salt, AES-256.
    Argon2id { salt: &'a [u8] },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("empty passphrase")]
    EmptyPassphrase,
    #[error("invalid AES key length {0}")]
    InvalidLength(usize),
    #[error("argon2: {0}")]
    Argon2(String),
}

/// Symmetric key sized for the AES variant it drives. Wiped on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub enum EncryptionKey {
    Aes128([u8; 16]),
    Aes192([u8; 24]),
    Aes256([u8; 32]),
}

impl EncryptionKey {
    /// Wrap raw bytes as a key, accepting only valid AES key sizes.
    pub fn from_raw(bytes: &[u8]) -> Result<Self, KeyError> {
        match bytes.len() {
            16 => {
                let mut key = [0u8; 16];
                key.copy_from_slice(bytes);
                Ok(Self::Aes128(key))
            }
            24 => {
                let mut key = [0u8; 24];
                key.copy_from_slice(bytes);
                Ok(Self::Aes192(key))
            }
            32 => {
                let mut key = [0u8; 32];
                key.copy_from_slice(bytes);
                Ok(Self::Aes256(key))
            }
            n => Err(KeyError::InvalidLength(n)),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Aes128(k) => k.as_slice(),
            Self::Aes192(k) => k.as_slice(),
            Self::Aes256(k) => k.as_slice(),
        }
    }
}

/// Operator-configured key for secrets written before per-secret keys existed.
#[derive(Clone, ZeroizeOnDrop)]
pub struct LegacyKey(Vec<u8>);

impl LegacyKey {
    /// Validate that `bytes` can key AES directly.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, KeyError> {
        let bytes = bytes.into();
        match bytes.len() {
            16 | 24 | 32 => Ok(Self(bytes)),
            n => Err(KeyError::InvalidLength(n)),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for LegacyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LegacyKey(<{} bytes>)", self.0.len())
    }
}

/// Derive key material for `mode`. Deterministic for a given input.
pub fn derive_key(passphrase: &[u8], mode: KeyMode<'_>) -> Result<EncryptionKey, KeyError> {
    match mode {
        KeyMode::Legacy => EncryptionKey::from_raw(passphrase),
        KeyMode::Md5 => {
            if passphrase.is_empty() {
                return Err(KeyError::EmptyPassphrase);
            }
            let mut key = [0u8; 16];
            key.copy_from_slice(&Md5::digest(passphrase));
            Ok(EncryptionKey::Aes128(key))
        }
        KeyMode::Argon2id { salt } => {
            if passphrase.is_empty() {
                return Err(KeyError::EmptyPassphrase);
            }
            let params = Params::new(ARGON2_M_COST_KIB, ARGON2_T_COST, ARGON2_P_COST, Some(32))
                .map_err(|e| KeyError::Argon2(e.to_string()))?;
            let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

            let mut key = [0u8; 32];
            argon2
                .hash_password_into(passphrase, salt, &mut key)
                .map_err(|e| KeyError::Argon2(e.to_string()))?;
            Ok(EncryptionKey::Aes256(key))
        }
    }
}

/// Map an ephemeral identifier to its storage key: unsalted SHA-256, hex.
/// Deterministic so creation and retrieval agree; one-way so the database
/// never reveals the identifier that doubles as the decryption passphrase.
pub fn storage_key(identifier: &str) -> String {
    hex::encode(Sha256::digest(identifier.as_bytes()))
}

/// Fresh Format-2 salt token.
pub fn generate_salt() -> String {
    (0..SALT_LEN)
        .map(|_| SALT_ALPHABET[(OsRng.gen::<u8>() & 31) as usize] as char)
        .collect()
}

/// Fresh ephemeral identifier (about 128 bits of entropy).
pub fn generate_identifier() -> String {
    (0..IDENTIFIER_LEN)
        .map(|_| IDENTIFIER_ALPHABET[OsRng.gen_range(0..IDENTIFIER_ALPHABET.len())] as char)
        .collect()
}
