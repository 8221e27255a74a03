//! Versioned secret ciphertext codec.
//!
//! Three wire formats have been written over the lifetime of the service and
//! all of them must keep decoding:
//!
//! | Format | Wire shape | Key |
//! |---|---|---|
//! | `V2` | `v2$<salt>$<hex(nonce ‖ ct ‖ tag)>` | Argon2id(identifier, salt), AES-256-GCM |
//! | `LegacyCtr` | `<32 hex IV>:<hex ct>` | system legacy key, AES-CTR, no tag |
//! | `V1` | `<hex(nonce ‖ ct ‖ tag)>` | MD5(identifier), AES-128-GCM |
//!
//! New secrets are always written as `V2`.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes128Gcm, Aes256Gcm, Nonce,
};
use ctr::cipher::{KeyIvInit, StreamCipher};
use rand::{rngs::OsRng, RngCore};
use tracing::{debug, warn};

use super::crypto::{self, derive_key, EncryptionKey, KeyError, KeyMode, LegacyKey};
use super::error::CodecError;

/// AES-GCM standard nonce size.
pub const NONCE_LEN: usize = 12;
/// AES block size; the CTR IV of legacy secrets.
const IV_LEN: usize = 16;
const V2_PREFIX: &str = "v2$";

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;
type Aes192Ctr = ctr::Ctr128BE<aes::Aes192>;
type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

/// A ciphertext string split into its format and components.
///
/// Classification is purely syntactic and ordered most-specific first: the
/// tagged `V2` shape, then the colon-delimited legacy shape, and finally the
/// untagged hex of `V1` as the fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format<'a> {
    V2 { salt: &'a str, payload: &'a str },
    LegacyCtr { iv: &'a str, payload: &'a str },
    V1 { payload: &'a str },
}

impl<'a> Format<'a> {
    pub fn classify(encoded: &'a str) -> Self {
        if let Some((salt, payload)) = encoded
            .strip_prefix(V2_PREFIX)
            .and_then(|rest| rest.split_once('$'))
        {
            if is_token(salt) && is_hex(payload) {
                return Self::V2 { salt, payload };
            }
        }
        if let Some((iv, payload)) = encoded.split_once(':') {
            if iv.len() == IV_LEN * 2 && is_hex(iv) && is_hex(payload) {
                return Self::LegacyCtr { iv, payload };
            }
        }
        Self::V1 { payload: encoded }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::V2 { .. } => "v2",
            Self::LegacyCtr { .. } => "legacy-ctr",
            Self::V1 { .. } => "v1",
        }
    }
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit())
}

fn is_token(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Encrypts with the current format and decrypts every historical one.
#[derive(Clone, Debug, Default)]
pub struct Codec {
    legacy_key: Option<LegacyKey>,
}

impl Codec {
    pub fn new(legacy_key: Option<LegacyKey>) -> Self {
        Self { legacy_key }
    }

    /// Encrypt `plaintext` under `passphrase` as a `V2` string with a fresh
    /// salt and nonce.
    pub fn encode(&self, plaintext: &str, passphrase: &str) -> Result<String, CodecError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        seal_v2(plaintext, passphrase, &crypto::generate_salt(), &nonce)
    }

    /// Decrypt any supported format. `V1` and `V2` use `passphrase`; legacy
    /// secrets use the configured system key and ignore it.
    pub fn decode(&self, encoded: &str, passphrase: &str) -> Result<String, CodecError> {
        if encoded.is_empty() {
            return Err(CodecError::EmptyInput);
        }

        let format = Format::classify(encoded);
        debug!(format = format.name(), "decoding secret");

        let plaintext = match format {
            Format::V2 { salt, payload } => {
                require_passphrase(passphrase)?;
                let key = derive_key(
                    passphrase.as_bytes(),
                    KeyMode::Argon2id {
                        salt: salt.as_bytes(),
                    },
                )
                .map_err(|_| CodecError::DecryptionFailed)?;
                open_gcm(&key, &decode_hex(payload)?)?
            }
            Format::LegacyCtr { iv, payload } => {
                let iv = decode_hex(iv)?;
                let payload = decode_hex(payload)?;
                let legacy = self.legacy_key.as_ref().ok_or_else(|| {
                    warn!("legacy secret encountered but no legacy key is configured");
                    CodecError::Cipher("legacy key not configured".into())
                })?;
                let key = derive_key(legacy.as_bytes(), KeyMode::Legacy).map_err(cipher_error)?;
                open_ctr(&key, &iv, payload)?
            }
            Format::V1 { payload } => {
                require_passphrase(passphrase)?;
                let key = derive_key(passphrase.as_bytes(), KeyMode::Md5).map_err(cipher_error)?;
                open_gcm(&key, &decode_hex(payload)?)?
            }
        };

        // The legacy branch has no tag, so this is its only integrity check.
        String::from_utf8(plaintext).map_err(|_| CodecError::DecryptionFailed)
    }
}

/// Seal `plaintext` into a `V2` string with caller-supplied salt and nonce.
pub(crate) fn seal_v2(
    plaintext: &str,
    passphrase: &str,
    salt: &str,
    nonce: &[u8; NONCE_LEN],
) -> Result<String, CodecError> {
    if plaintext.is_empty() {
        return Err(CodecError::EmptyInput);
    }
    require_passphrase(passphrase)?;

    let key = derive_key(
        passphrase.as_bytes(),
        KeyMode::Argon2id {
            salt: salt.as_bytes(),
        },
    )
    .map_err(cipher_error)?;
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| CodecError::Cipher(format!("aes-256-gcm: {e}")))?;

    let sealed = cipher
        .encrypt(Nonce::from_slice(nonce), plaintext.as_bytes())
        .map_err(|e| CodecError::Cipher(format!("seal: {e}")))?;

    let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
    out.extend_from_slice(nonce);
    out.extend_from_slice(&sealed);
    Ok(format!("{V2_PREFIX}{salt}${}", hex::encode(out)))
}

fn require_passphrase(passphrase: &str) -> Result<(), CodecError> {
    if passphrase.is_empty() {
        return Err(CodecError::EmptyInput);
    }
    Ok(())
}

fn cipher_error(err: KeyError) -> CodecError {
    CodecError::Cipher(err.to_string())
}

fn decode_hex(s: &str) -> Result<Vec<u8>, CodecError> {
    hex::decode(s).map_err(|_| CodecError::DecryptionFailed)
}

/// Split `nonce ‖ ct ‖ tag` and open it with the AES-GCM variant matching the key.
fn open_gcm(key: &EncryptionKey, data: &[u8]) -> Result<Vec<u8>, CodecError> {
    if data.len() < NONCE_LEN {
        return Err(CodecError::DecryptionFailed);
    }
    let (nonce, ciphertext) = data.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce);

    let opened = match key {
        EncryptionKey::Aes128(k) => Aes128Gcm::new_from_slice(k)
            .map_err(|e| CodecError::Cipher(format!("aes-128-gcm: {e}")))?
            .decrypt(nonce, ciphertext),
        EncryptionKey::Aes256(k) => Aes256Gcm::new_from_slice(k)
            .map_err(|e| CodecError::Cipher(format!("aes-256-gcm: {e}")))?
            .decrypt(nonce, ciphertext),
        EncryptionKey::Aes192(_) => {
            return Err(CodecError::Cipher("no AES-192-GCM secrets exist".into()))
        }
    };
    opened.map_err(|_| CodecError::DecryptionFailed)
}

/// XOR `ciphertext` with the AES-CTR keystream starting at `iv`.
fn open_ctr(key: &EncryptionKey, iv: &[u8], mut ciphertext: Vec<u8>) -> Result<Vec<u8>, CodecError> {
    if iv.len() != IV_LEN || ciphertext.is_empty() {
        return Err(CodecError::DecryptionFailed);
    }
    let invalid = |e: ctr::cipher::InvalidLength| CodecError::Cipher(format!("aes-ctr: {e}"));
    match key {
        EncryptionKey::Aes128(k) => Aes128Ctr::new_from_slices(k, iv)
            .map_err(invalid)?
            .apply_keystream(&mut ciphertext),
        EncryptionKey::Aes192(k) => Aes192Ctr::new_from_slices(k, iv)
            .map_err(invalid)?
            .apply_keystream(&mut ciphertext),
        EncryptionKey::Aes256(k) => Aes256Ctr::new_from_slices(k, iv)
            .map_err(invalid)?
            .apply_keystream(&mut ciphertext),
    }
    Ok(ciphertext)
}
