//! Caller identity types.

use serde::{Deserialize, Serialize};

/// The kind of principal behind a caller credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentityKind {
    /// A long-lived user principal. Carries a display name.
    User,
    /// A temporary session obtained by assuming a role.
    AssumedRole,
}

impl IdentityKind {
    /// Wire name, as bound into token contexts and policy requests.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::AssumedRole => "AssumedRole",
        }
    }
}

impl std::fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors resolving a caller identity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum IdentityError {
    /// The caller ARN does not have the `arn:partition:service:region:account:resource` shape.
    #[error("malformed caller arn: {0}")]
    MalformedArn(String),

    /// The caller is neither a user nor an assumed role.
    #[error("unsupported identity type: {0}")]
    Unsupported(String),
}

/// The resolved identity of whoever is making a request.
///
/// Derived once per session from a caller-identity lookup and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub account_id: String,
    pub principal_id: String,
    pub display_name: Option<String>,
    pub kind: IdentityKind,
}

impl Identity {
    /// Build an identity from the fields returned by a caller-identity lookup.
    ///
    /// The resource part of `arn` decides the kind: `user/<name>` yields a
    /// [`IdentityKind::User`] named `<name>`, `assumed-role/...` yields an
    /// unnamed [`IdentityKind::AssumedRole`].
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::MalformedArn`] if the ARN has fewer than six
    /// colon-separated parts, and [`IdentityError::Unsupported`] for any other
    /// resource type.
    pub fn from_caller_arn(
        account_id: impl Into<String>,
        principal_id: impl Into<String>,
        arn: &str,
    ) -> Result<Self, IdentityError> {
        let resource = arn
            .splitn(6, ':')
            .nth(5)
            .ok_or_else(|| IdentityError::MalformedArn(arn.to_string()))?;

        let (kind, display_name) = if let Some(name) = resource.strip_prefix("user/") {
            (IdentityKind::User, Some(name.to_string()))
        } else if resource.starts_with("assumed-role/") {
            (IdentityKind::AssumedRole, None)
        } else {
            return Err(IdentityError::Unsupported(resource.to_string()));
        };

        Ok(Self {
            account_id: account_id.into(),
            principal_id: principal_id.into(),
            display_name,
            kind,
        })
    }

    /// The certificate key id for this identity: `name-id`, or the bare
    /// principal id when there is no display name.
    pub fn key_id(&self) -> String {
        signing_identity(self.display_name.as_deref(), &self.principal_id)
    }
}

/// Compose the key id embedded in issued certificates.
pub fn signing_identity(display_name: Option<&str>, principal_id: &str) -> String {
    match display_name {
        Some(name) if !name.is_empty() => format!("{name}-{principal_id}"),
        _ => principal_id.to_string(),
    }
}
