//! Issuance error kinds and their public rendering.

use lkp_auth::{SignError, TokenError};
use lkp_core::cert::FailurePayload;

/// Why a certificate request failed.
///
/// Every variant is terminal for the request. Only [`Self::TransportFailure`]
/// is worth retrying, and that is the caller's decision.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AuthorityError {
    /// Context mismatch, key mismatch or garbled token.
    #[error("invalid token")]
    TokenInvalid,

    #[error("token expired")]
    TokenExpired,

    /// Policy refusal, with the policy's reason if it gave one.
    #[error("{}", .0.as_deref().unwrap_or("authorization denied"))]
    AuthorizationDenied(Option<String>),

    #[error("signing failed: {0}")]
    SigningFailure(#[from] SignError),

    /// The envelope service or a policy function call failed.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    #[error("configuration missing: {0}")]
    ConfigurationMissing(String),

    /// The event is structurally unusable: unknown type, missing target.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl AuthorityError {
    /// Stable name reported as `errorType`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TokenInvalid => "TokenInvalid",
            Self::TokenExpired => "TokenExpired",
            Self::AuthorizationDenied(_) => "AuthorizationDenied",
            Self::SigningFailure(_) => "SigningFailure",
            Self::TransportFailure(_) => "TransportFailure",
            Self::ConfigurationMissing(_) => "ConfigurationMissing",
            Self::InvalidRequest(_) => "InvalidRequest",
        }
    }

    /// Render for the caller.
    ///
    /// Denial reasons and request problems are shown verbatim. Everything
    /// that could reveal keys, key ids or deployment layout is replaced by a
    /// fixed message; the detail goes to the log instead.
    pub fn to_failure(&self) -> FailurePayload {
        let message = match self {
            Self::TokenInvalid => "invalid token".to_string(),
            Self::TokenExpired => "token expired".to_string(),
            Self::AuthorizationDenied(_) | Self::InvalidRequest(_) => self.to_string(),
            Self::SigningFailure(SignError::MalformedSubjectKey(_)) => {
                "malformed public key".to_string()
            }
            Self::SigningFailure(SignError::NoPrincipals | SignError::EmptyPrincipal) => {
                "no principals authorized".to_string()
            }
            Self::SigningFailure(_) => "certificate signing failed".to_string(),
            Self::TransportFailure(_) => "upstream service failure".to_string(),
            Self::ConfigurationMissing(_) => "authority is not configured".to_string(),
        };

        FailurePayload {
            error_type: self.kind().to_string(),
            error_message: message,
        }
    }
}

impl From<TokenError> for AuthorityError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid(_) => Self::TokenInvalid,
            TokenError::Expired => Self::TokenExpired,
            TokenError::Transport(msg) => Self::TransportFailure(msg),
            _ => Self::TokenInvalid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lkp_auth::InvalidReason;

    #[test]
    fn test_key_mismatch_is_reported_generically() {
        let err = AuthorityError::from(TokenError::Invalid(InvalidReason::KeyMismatch {
            expected: "local:key/primary".into(),
            actual: "local:key/attacker".into(),
        }));
        let failure = err.to_failure();
        assert_eq!(failure.error_type, "TokenInvalid");
        assert_eq!(failure.error_message, "invalid token");
    }

    #[test]
    fn test_expired_is_distinct() {
        let failure = AuthorityError::from(TokenError::Expired).to_failure();
        assert_eq!(failure.error_type, "TokenExpired");
    }

    #[test]
    fn test_denial_message_is_verbatim() {
        let failure = AuthorityError::AuthorizationDenied(Some("mfa required".into())).to_failure();
        assert_eq!(failure.error_type, "AuthorizationDenied");
        assert_eq!(failure.error_message, "mfa required");

        let failure = AuthorityError::AuthorizationDenied(None).to_failure();
        assert_eq!(failure.error_message, "authorization denied");
    }

    #[test]
    fn test_internal_detail_is_hidden() {
        let failure =
            AuthorityError::ConfigurationMissing("LKP_CA_KEY_BYTES".into()).to_failure();
        assert!(!failure.error_message.contains("LKP_CA_KEY_BYTES"));

        let failure = AuthorityError::TransportFailure("kms at 10.0.0.1".into()).to_failure();
        assert!(!failure.error_message.contains("10.0.0.1"));
    }
}
