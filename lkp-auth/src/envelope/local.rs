//! Software envelope service backed by AES-256-GCM.
//!
//! Used for local deployments and tests. The binding context is passed as
//! AEAD associated data, which gives the same context-mismatch guarantee a
//! managed key service provides.
//!
//! Ciphertext layout (v1):
//! - 1 byte: version
//! - 2 bytes: key id length (u16 BE)
//! - N bytes: key id (UTF-8)
//! - 12 bytes: nonce
//! - remainder: sealed payload with 16-byte tag

use std::collections::BTreeMap;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::prelude::*;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::{Decrypted, EnvelopeError, EnvelopeService};
use crate::context::BindingContext;

const CIPHERTEXT_VERSION: u8 = 1;
const NONCE_LEN: usize = 12;

/// One key in a [`Keyring`] file.
#[derive(Clone, Serialize, Deserialize)]
pub struct KeyringEntry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Base64 of 32 bytes of key material.
    pub material: String,
}

impl std::fmt::Debug for KeyringEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyringEntry")
            .field("id", &self.id)
            .field("alias", &self.alias)
            .finish_non_exhaustive()
    }
}

/// Serialized form of a [`LocalEnvelope`], stored as TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Keyring {
    #[serde(default)]
    pub keys: Vec<KeyringEntry>,
}

impl Keyring {
    /// Generate a keyring holding one fresh key.
    pub fn generate(id: impl Into<String>, alias: Option<String>) -> Self {
        let mut material = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut material[..]);
        Self {
            keys: vec![KeyringEntry {
                id: id.into(),
                alias,
                material: BASE64_STANDARD.encode(&material[..]),
            }],
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// In-process envelope service.
pub struct LocalEnvelope {
    keys: BTreeMap<String, Zeroizing<[u8; 32]>>,
    aliases: BTreeMap<String, String>,
}

impl std::fmt::Debug for LocalEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEnvelope")
            .field("keys", &self.keys.keys().collect::<Vec<_>>())
            .field("aliases", &self.aliases)
            .finish()
    }
}

impl LocalEnvelope {
    /// Load keys from a [`Keyring`].
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::UnknownKey`] naming the entry whose material
    /// is not base64 of exactly 32 bytes.
    pub fn from_keyring(keyring: &Keyring) -> Result<Self, EnvelopeError> {
        let mut keys = BTreeMap::new();
        let mut aliases = BTreeMap::new();

        for entry in &keyring.keys {
            let decoded = Zeroizing::new(
                BASE64_STANDARD
                    .decode(entry.material.as_bytes())
                    .map_err(|_| EnvelopeError::UnknownKey(entry.id.clone()))?,
            );
            let material: [u8; 32] = decoded
                .as_slice()
                .try_into()
                .map_err(|_| EnvelopeError::UnknownKey(entry.id.clone()))?;

            keys.insert(entry.id.clone(), Zeroizing::new(material));
            if let Some(alias) = &entry.alias {
                aliases.insert(alias.clone(), entry.id.clone());
            }
        }

        Ok(Self { keys, aliases })
    }

    /// Resolve a key id or alias to a canonical key id.
    pub fn resolve(&self, key_ref: &str) -> Option<&str> {
        if let Some((id, _)) = self.keys.get_key_value(key_ref) {
            return Some(id.as_str());
        }
        self.aliases.get(key_ref).map(String::as_str)
    }

    fn cipher(&self, key_id: &str) -> Result<Aes256Gcm, EnvelopeError> {
        let material = self
            .keys
            .get(key_id)
            .ok_or_else(|| EnvelopeError::UnknownKey(key_id.to_string()))?;
        Ok(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&material[..])))
    }
}

impl EnvelopeService for LocalEnvelope {
    fn encrypt(
        &self,
        plaintext: &[u8],
        key_ref: &str,
        context: &BindingContext,
    ) -> Result<Vec<u8>, EnvelopeError> {
        let key_id = self
            .resolve(key_ref)
            .ok_or_else(|| EnvelopeError::UnknownKey(key_ref.to_string()))?;
        let key_id_len =
            u16::try_from(key_id.len()).map_err(|_| EnvelopeError::UnknownKey(key_id.to_string()))?;

        let cipher = self.cipher(key_id)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let aad = context.canonical_bytes();
        let sealed = cipher
            .encrypt(&nonce, Payload { msg: plaintext, aad: &aad })
            .map_err(|_| EnvelopeError::Transport("encryption failed".to_string()))?;

        let mut out = Vec::with_capacity(1 + 2 + key_id.len() + NONCE_LEN + sealed.len());
        out.push(CIPHERTEXT_VERSION);
        out.extend_from_slice(&key_id_len.to_be_bytes());
        out.extend_from_slice(key_id.as_bytes());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn decrypt(
        &self,
        ciphertext: &[u8],
        context: &BindingContext,
    ) -> Result<Decrypted, EnvelopeError> {
        let (&version, rest) = ciphertext.split_first().ok_or(EnvelopeError::Malformed)?;
        if version != CIPHERTEXT_VERSION || rest.len() < 2 {
            return Err(EnvelopeError::Malformed);
        }

        let key_id_len = u16::from_be_bytes([rest[0], rest[1]]) as usize;
        let rest = &rest[2..];
        if rest.len() < key_id_len + NONCE_LEN {
            return Err(EnvelopeError::Malformed);
        }

        let key_id =
            std::str::from_utf8(&rest[..key_id_len]).map_err(|_| EnvelopeError::Malformed)?;
        let nonce = Nonce::from_slice(&rest[key_id_len..key_id_len + NONCE_LEN]);
        let sealed = &rest[key_id_len + NONCE_LEN..];

        // A key this service does not hold cannot decrypt, same as a denied grant.
        let cipher = self.cipher(key_id).map_err(|_| EnvelopeError::Rejected)?;
        let aad = context.canonical_bytes();
        let plaintext = cipher
            .decrypt(nonce, Payload { msg: sealed, aad: &aad })
            .map_err(|_| EnvelopeError::Rejected)?;

        Ok(Decrypted {
            plaintext,
            key_id: key_id.to_string(),
        })
    }
}
