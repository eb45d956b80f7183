//! Token encryption module using AES-256-GCM with a versioned keyring
//!
//! Wearable access and refresh tokens are stored as AEAD ciphertexts bound to
//! their connection via additional authenticated data (AAD). Each ciphertext
//! is encrypted under one keyring version; the connection row records which
//! one, and the rotation batch moves rows to the current version.

use std::collections::BTreeMap;

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::models::wearable_connection::Model as ConnectionModel;

const FORMAT_ENCRYPTED: u8 = 0x01;
const FORMAT_FIELD_LEN: usize = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_ENCRYPTED_LEN: usize = FORMAT_FIELD_LEN + NONCE_LEN + TAG_LEN;

/// Crypto error types
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("invalid ciphertext format")]
    InvalidFormat,
    #[error("empty ciphertext")]
    EmptyCiphertext,
    #[error("unknown key version {0}")]
    UnknownKeyVersion(i32),
    #[error("keyring misconfigured: {0}")]
    KeyringMisconfigured(String),
}

/// Secure wrapper for encryption keys with zeroization
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct ZeroizingKey(Vec<u8>);

/// Type alias for crypto keys
pub type CryptoKey = ZeroizingKey;

impl CryptoKey {
    /// Create a new crypto key from bytes
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::KeyringMisconfigured(
                "invalid key length: expected 32 bytes".to_string(),
            ));
        }
        Ok(ZeroizingKey(bytes))
    }

    /// Get the key as bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Versioned set of token encryption keys.
///
/// Rotation re-encrypts ciphertexts from any retained version to the current
/// one, so every version still present in the database must stay in the ring
/// until no row references it.
#[derive(Debug, Clone)]
pub struct Keyring {
    keys: BTreeMap<i32, CryptoKey>,
    current_version: i32,
}

impl Keyring {
    /// Build a keyring; the current version must be present in the map.
    pub fn new(keys: BTreeMap<i32, CryptoKey>, current_version: i32) -> Result<Self, CryptoError> {
        if keys.is_empty() {
            return Err(CryptoError::KeyringMisconfigured(
                "keyring must contain at least one key".to_string(),
            ));
        }
        if !keys.contains_key(&current_version) {
            return Err(CryptoError::KeyringMisconfigured(format!(
                "current version {} has no key in the ring",
                current_version
            )));
        }
        Ok(Self {
            keys,
            current_version,
        })
    }

    /// Keyring with a single key at version 1 (tests and local profiles).
    pub fn single(key: CryptoKey) -> Self {
        let mut keys = BTreeMap::new();
        keys.insert(1, key);
        Self {
            keys,
            current_version: 1,
        }
    }

    pub fn current_version(&self) -> i32 {
        self.current_version
    }

    fn key(&self, version: i32) -> Result<&CryptoKey, CryptoError> {
        self.keys
            .get(&version)
            .ok_or(CryptoError::UnknownKeyVersion(version))
    }

    /// Encrypt plaintext under the current keyring version.
    pub fn encrypt_current(&self, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        encrypt_bytes(self.key(self.current_version)?, aad, plaintext)
    }

    /// Decrypt a ciphertext encrypted under the given version.
    pub fn decrypt(&self, version: i32, aad: &[u8], ct: &[u8]) -> Result<Vec<u8>, CryptoError> {
        decrypt_bytes(self.key(version)?, aad, ct)
    }

    /// Re-encrypt a ciphertext from `version` to the current version.
    pub fn reencrypt(&self, version: i32, aad: &[u8], ct: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let plaintext = self.decrypt(version, aad, ct)?;
        self.encrypt_current(aad, &plaintext)
    }
}

/// Encrypt bytes using AES-256-GCM
pub fn encrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(cipher_key);

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    // Format marker + nonce prefix, ciphertext+tag after
    let mut result = Vec::with_capacity(FORMAT_FIELD_LEN + NONCE_LEN + ciphertext.len());
    result.push(FORMAT_ENCRYPTED);
    result.extend_from_slice(&nonce);
    result.append(&mut ciphertext);

    Ok(result)
}

/// Decrypt bytes using AES-256-GCM
pub fn decrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.is_empty() {
        return Err(CryptoError::EmptyCiphertext);
    }

    if ciphertext[0] != FORMAT_ENCRYPTED || ciphertext.len() < MIN_ENCRYPTED_LEN {
        return Err(CryptoError::InvalidFormat);
    }

    let nonce = Nonce::from_slice(&ciphertext[FORMAT_FIELD_LEN..FORMAT_FIELD_LEN + NONCE_LEN]);
    let tag_and_ct = &ciphertext[FORMAT_FIELD_LEN + NONCE_LEN..];

    debug_assert!(tag_and_ct.len() >= TAG_LEN);

    let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(cipher_key);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: tag_and_ct,
                aad,
            },
        )
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

/// AAD binding a token ciphertext to its connection
pub fn connection_aad(connection: &ConnectionModel) -> String {
    format!(
        "{}|{}|{}",
        connection.patient_id, connection.provider, connection.external_user_id
    )
}

/// Decrypt a connection's stored tokens under its recorded key version
pub fn decrypt_connection_tokens(
    keyring: &Keyring,
    connection: &ConnectionModel,
) -> Result<(String, Option<String>), CryptoError> {
    let aad = connection_aad(connection);

    let access = keyring
        .decrypt(
            connection.token_version,
            aad.as_bytes(),
            &connection.access_token_ciphertext,
        )
        .and_then(|bytes| {
            String::from_utf8(bytes)
                .map_err(|e| CryptoError::DecryptionFailed(format!("invalid UTF-8: {}", e)))
        })?;

    let refresh = connection
        .refresh_token_ciphertext
        .as_ref()
        .map(|ct| {
            keyring
                .decrypt(connection.token_version, aad.as_bytes(), ct)
                .and_then(|bytes| {
                    String::from_utf8(bytes)
                        .map_err(|e| CryptoError::DecryptionFailed(format!("invalid UTF-8: {}", e)))
                })
        })
        .transpose()?;

    Ok((access, refresh))
}
