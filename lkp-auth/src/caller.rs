//! Caller-identity lookup.

use lkp_core::identity::{Identity, IdentityError};

/// Resolves the credential in use to an [`Identity`].
pub trait CallerIdentityService: Send + Sync {
    fn caller_identity(&self) -> Result<Identity, IdentityError>;
}

/// A caller identity fixed at construction, e.g. from environment variables.
#[derive(Debug, Clone)]
pub struct StaticCallerIdentity {
    pub account_id: String,
    pub principal_id: String,
    pub arn: String,
}

impl CallerIdentityService for StaticCallerIdentity {
    fn caller_identity(&self) -> Result<Identity, IdentityError> {
        Identity::from_caller_arn(&self.account_id, &self.principal_id, &self.arn)
    }
}

impl CallerIdentityService for Identity {
    fn caller_identity(&self) -> Result<Identity, IdentityError> {
        Ok(self.clone())
    }
}
