//! Envelope (key-management) service contract.
//!
//! Tokens are bound to an external key-management service: the authority can
//! only unwrap a token if it holds decrypt rights on the key, and only when it
//! presents the exact binding context the token was created with.

mod local;

pub use local::{Keyring, KeyringEntry, LocalEnvelope};

use crate::context::BindingContext;

/// Errors returned by an [`EnvelopeService`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum EnvelopeError {
    /// Decryption failed: wrong context, corrupted ciphertext, or wrong key.
    #[error("ciphertext rejected")]
    Rejected,

    /// The requested key id or alias is not known to the service.
    #[error("unknown key: {0}")]
    UnknownKey(String),

    /// The ciphertext is not in a format this service produced.
    #[error("malformed ciphertext")]
    Malformed,

    /// The service could not be reached or failed internally.
    #[error("envelope service unavailable: {0}")]
    Transport(String),
}

/// Result of a successful decryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decrypted {
    pub plaintext: Vec<u8>,
    /// Canonical id of the key that actually decrypted the ciphertext.
    pub key_id: String,
}

/// An envelope-encryption service.
///
/// # Contract
///
/// `decrypt` must fail if `context` differs in any way from the context
/// supplied to `encrypt`. Token tamper detection depends on this.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`.
pub trait EnvelopeService: Send + Sync {
    /// Encrypt `plaintext` under `key_ref` (a key id or alias).
    fn encrypt(
        &self,
        plaintext: &[u8],
        key_ref: &str,
        context: &BindingContext,
    ) -> Result<Vec<u8>, EnvelopeError>;

    /// Decrypt `ciphertext`, authenticating `context`.
    fn decrypt(
        &self,
        ciphertext: &[u8],
        context: &BindingContext,
    ) -> Result<Decrypted, EnvelopeError>;
}
