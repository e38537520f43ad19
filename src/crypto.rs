//! At-rest encryption for persisted session records
//!
//! Persistent providers may seal each record before it touches storage.
//! Supports key rotation via key IDs: new records use the active key, and
//! any registered key can open older ones.

use crate::error::{SessionError, Result};
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// Sealed record envelope as written to storage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedRecord {
    /// Identifies which key sealed the record
    pub key_id: String,

    /// Base64-encoded 96-bit nonce
    pub nonce: String,

    /// Base64-encoded ciphertext
    pub ciphertext: String,

    /// Marker to tell sealed records from plain ones
    #[serde(default = "default_sealed")]
    pub sealed: bool,
}

fn default_sealed() -> bool {
    true
}

impl SealedRecord {
    /// Check if raw stored bytes hold a sealed envelope
    pub fn is_sealed(bytes: &[u8]) -> bool {
        serde_json::from_slice::<serde_json::Value>(bytes)
            .ok()
            .and_then(|v| v.get("sealed").and_then(|s| s.as_bool()))
            .unwrap_or(false)
    }
}

/// Trait for sealing and opening stored session records
pub trait RecordEncryptor: Send + Sync {
    /// Seal plaintext bytes into a storable envelope
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Open a sealed envelope back into plaintext bytes
    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>>;

    /// The key ID currently used for sealing
    fn active_key_id(&self) -> &str;
}

/// AES-256-GCM encryptor with key rotation support
pub struct Aes256GcmEncryptor {
    active_key_id: String,

    /// key_id → cipher
    keys: RwLock<HashMap<String, Aes256Gcm>>,
}

impl Aes256GcmEncryptor {
    /// Create an encryptor with a single 256-bit key
    pub fn new(key_id: impl Into<String>, key: &[u8; 32]) -> Self {
        let key_id = key_id.into();
        let mut keys = HashMap::new();
        keys.insert(key_id.clone(), cipher_for(key));

        Self {
            active_key_id: key_id,
            keys: RwLock::new(keys),
        }
    }

    /// Register an additional key for opening older records
    pub fn add_key(&self, key_id: impl Into<String>, key: &[u8; 32]) -> Result<()> {
        let mut keys = self.keys.write().map_err(|e| {
            SessionError::Crypto(format!("Failed to acquire key lock: {}", e))
        })?;
        keys.insert(key_id.into(), cipher_for(key));
        Ok(())
    }

    /// Switch sealing to an already registered key
    pub fn rotate_to(&mut self, key_id: &str) -> Result<()> {
        let keys = self.keys.read().map_err(|e| {
            SessionError::Crypto(format!("Failed to acquire key lock: {}", e))
        })?;
        if !keys.contains_key(key_id) {
            return Err(SessionError::Config(format!(
                "Key '{}' not registered, add it first",
                key_id
            )));
        }
        self.active_key_id = key_id.to_string();
        Ok(())
    }

    /// List all registered key IDs
    pub fn key_ids(&self) -> Vec<String> {
        self.keys
            .read()
            .map(|keys| keys.keys().cloned().collect())
            .unwrap_or_default()
    }
}

fn cipher_for(key: &[u8; 32]) -> Aes256Gcm {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key))
}

impl RecordEncryptor for Aes256GcmEncryptor {
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let keys = self.keys.read().map_err(|e| {
            SessionError::Crypto(format!("Failed to acquire key lock: {}", e))
        })?;
        let cipher = keys.get(&self.active_key_id).ok_or_else(|| {
            SessionError::Crypto(format!("Active key '{}' not found", self.active_key_id))
        })?;

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| SessionError::Crypto(format!("Encryption failed: {}", e)))?;

        let envelope = SealedRecord {
            key_id: self.active_key_id.clone(),
            nonce: BASE64.encode(nonce),
            ciphertext: BASE64.encode(ciphertext),
            sealed: true,
        };

        serde_json::to_vec(&envelope).map_err(Into::into)
    }

    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        let envelope: SealedRecord = serde_json::from_slice(sealed)?;

        let keys = self.keys.read().map_err(|e| {
            SessionError::Crypto(format!("Failed to acquire key lock: {}", e))
        })?;
        let cipher = keys.get(&envelope.key_id).ok_or_else(|| {
            SessionError::Crypto(format!(
                "Decryption key '{}' not registered",
                envelope.key_id
            ))
        })?;

        let nonce_bytes = BASE64
            .decode(&envelope.nonce)
            .map_err(|e| SessionError::Crypto(format!("Invalid nonce encoding: {}", e)))?;
        if nonce_bytes.len() != 12 {
            return Err(SessionError::Crypto(format!(
                "Invalid nonce length: {}",
                nonce_bytes.len()
            )));
        }
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = BASE64
            .decode(&envelope.ciphertext)
            .map_err(|e| SessionError::Crypto(format!("Invalid ciphertext encoding: {}", e)))?;

        cipher
            .decrypt(nonce, ciphertext.as_ref())
            .map_err(|e| SessionError::Crypto(format!("Decryption failed: {}", e)))
    }

    fn active_key_id(&self) -> &str {
        &self.active_key_id
    }
}
