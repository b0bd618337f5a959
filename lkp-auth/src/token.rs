//! Token creation and validation.
//!
//! A token's ciphertext wraps a tiny validity window `{NotBefore, NotAfter}`.
//! The meaningful claim is the params, bound as envelope context. Validation
//! succeeds only if:
//! 1. The envelope service accepts the re-derived context
//! 2. The key that decrypted is exactly the expected key
//! 3. The window contains `now`
//!
//! Check 2 stops a caller from submitting ciphertext made under a key they
//! control that happens to grant the authority decrypt rights.
//!
//! There is no replay cache; a token is reusable until its window closes.

use lkp_core::token::{Token, TokenParams};
use serde::{Deserialize, Serialize};

use crate::context::BindingContext;
use crate::envelope::{EnvelopeError, EnvelopeService};

/// How long a freshly created token stays valid.
pub const TOKEN_VALIDITY_SECS: i64 = 3600;

/// The encrypted payload of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ValidityWindow {
    pub not_before: i64,
    pub not_after: i64,
}

impl ValidityWindow {
    pub fn starting_at(now: i64) -> Self {
        Self {
            not_before: now,
            not_after: now + TOKEN_VALIDITY_SECS,
        }
    }

    pub fn contains(&self, now: i64) -> bool {
        self.not_before <= now && now <= self.not_after
    }
}

/// Why a token was rejected as invalid (as opposed to expired).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidReason {
    /// The envelope service refused the ciphertext under this context.
    ContextMismatch,
    /// The ciphertext decrypted, but under a different key.
    KeyMismatch { expected: String, actual: String },
    /// The decrypted payload is not a validity window.
    MalformedPayload,
}

impl std::fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ContextMismatch => f.write_str("context mismatch"),
            Self::KeyMismatch { expected, actual } => {
                write!(f, "key mismatch (expected {expected}, decrypted with {actual})")
            }
            Self::MalformedPayload => f.write_str("malformed payload"),
        }
    }
}

/// Errors from token creation and validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum TokenError {
    /// Tampered, foreign-keyed or garbled token. A security event.
    #[error("invalid token: {0}")]
    Invalid(InvalidReason),

    /// Authentic token used outside its validity window.
    #[error("token expired")]
    Expired,

    /// The envelope service failed for reasons unrelated to the token.
    #[error("envelope service failure: {0}")]
    Transport(String),
}

impl From<EnvelopeError> for TokenError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::Rejected | EnvelopeError::Malformed => {
                Self::Invalid(InvalidReason::ContextMismatch)
            }
            EnvelopeError::UnknownKey(key) => Self::Transport(format!("unknown key {key}")),
            EnvelopeError::Transport(msg) => Self::Transport(msg),
        }
    }
}

/// Create a token binding `params`, valid for one hour from `now`.
///
/// # Errors
///
/// Returns [`TokenError::Transport`] if the envelope service cannot encrypt
/// under `key_ref`.
pub fn create_token(
    envelope: &dyn EnvelopeService,
    params: TokenParams,
    key_ref: &str,
    now: i64,
) -> Result<Token, TokenError> {
    let context = BindingContext::from_params(&params);
    let plaintext = serde_json::to_vec(&ValidityWindow::starting_at(now))
        .map_err(|e| TokenError::Transport(e.to_string()))?;

    let signature = envelope
        .encrypt(&plaintext, key_ref, &context)
        .map_err(|e| match e {
            EnvelopeError::UnknownKey(key) => TokenError::Transport(format!("unknown key {key}")),
            other => TokenError::Transport(other.to_string()),
        })?;

    Ok(Token { params, signature })
}

/// Validate `token` against the key the caller expects it to be bound to.
///
/// Returns the decrypted window on success.
///
/// # Errors
///
/// - [`TokenError::Invalid`] for a context mismatch, key mismatch or bad payload
/// - [`TokenError::Expired`] if `now` falls outside the window
/// - [`TokenError::Transport`] if the envelope service itself failed
pub fn validate_token(
    envelope: &dyn EnvelopeService,
    token: &Token,
    expected_key_id: &str,
    now: i64,
) -> Result<ValidityWindow, TokenError> {
    let context = BindingContext::from_params(&token.params);
    let decrypted = envelope.decrypt(&token.signature, &context)?;

    if decrypted.key_id != expected_key_id {
        return Err(TokenError::Invalid(InvalidReason::KeyMismatch {
            expected: expected_key_id.to_string(),
            actual: decrypted.key_id,
        }));
    }

    let window: ValidityWindow = serde_json::from_slice(&decrypted.plaintext)
        .map_err(|_| TokenError::Invalid(InvalidReason::MalformedPayload))?;

    if !window.contains(now) {
        return Err(TokenError::Expired);
    }

    Ok(window)
}

/// Current wall-clock time in Unix seconds. A clock before the epoch reads as 0.
pub fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
