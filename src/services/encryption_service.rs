//! AES-256-GCM Encryption Service
//!
//! Seals remote API credentials before they are written to
//! `tenant_settings`. Every value gets its own random 96-bit nonce, and
//! the GCM tag rejects tampered or foreign-key ciphertext on open.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::RngCore;
use thiserror::Error;

use crate::models::{EncryptedCredentials, RemoteCredentials};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum EncryptionError {
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Invalid key")]
    InvalidKey,

    #[error("Invalid ciphertext format")]
    InvalidFormat,
}

pub type Result<T> = std::result::Result<T, EncryptionError>;

/// Thread-safe, cheap to clone into the shared app state.
#[derive(Clone)]
pub struct EncryptionService {
    cipher: Aes256Gcm,
}

impl EncryptionService {
    /// Key must decode to exactly 32 bytes.
    pub fn new(base64_key: &str) -> Result<Self> {
        let key_bytes = BASE64
            .decode(base64_key.trim())
            .map_err(|_| EncryptionError::InvalidKey)?;

        if key_bytes.len() != 32 {
            return Err(EncryptionError::InvalidKey);
        }

        let cipher = Aes256Gcm::new_from_slice(&key_bytes).map_err(|_| EncryptionError::InvalidKey)?;

        Ok(Self { cipher })
    }

    /// Returns base64(nonce || ciphertext || tag). Empty input stays empty.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| EncryptionError::EncryptionFailed(e.to_string()))?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(&combined))
    }

    pub fn decrypt(&self, ciphertext: &str) -> Result<String> {
        if ciphertext.is_empty() {
            return Ok(String::new());
        }

        let combined = BASE64
            .decode(ciphertext)
            .map_err(|_| EncryptionError::InvalidFormat)?;

        if combined.len() < NONCE_LEN + TAG_LEN {
            return Err(EncryptionError::InvalidFormat);
        }

        let (nonce_bytes, encrypted_data) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext_bytes = self
            .cipher
            .decrypt(nonce, encrypted_data)
            .map_err(|e| EncryptionError::DecryptionFailed(e.to_string()))?;

        String::from_utf8(plaintext_bytes)
            .map_err(|_| EncryptionError::DecryptionFailed("Invalid UTF-8".to_string()))
    }

    pub fn seal_credentials(&self, credentials: &RemoteCredentials) -> Result<EncryptedCredentials> {
        Ok(EncryptedCredentials {
            api_key_encrypted: self.encrypt(&credentials.api_key)?,
            api_token_encrypted: self.encrypt(&credentials.api_token)?,
        })
    }

    pub fn open_credentials(&self, sealed: &EncryptedCredentials) -> Result<RemoteCredentials> {
        Ok(RemoteCredentials::new(
            self.decrypt(&sealed.api_key_encrypted)?,
            self.decrypt(&sealed.api_token_encrypted)?,
        ))
    }

    /// Fresh base64 key suitable for `ENCRYPTION_KEY`.
    pub fn generate_key() -> String {
        let mut key_bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key_bytes);
        BASE64.encode(key_bytes)
    }
}
