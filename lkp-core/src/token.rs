//! Claim token types.
//!
//! A [`Token`] pairs a set of [`TokenParams`] with an opaque ciphertext
//! produced by the envelope service. The params travel in the clear; the
//! envelope service binds them to the ciphertext as authenticated context,
//! so changing any field without re-encrypting makes the token undecryptable.

use serde::{Deserialize, Serialize};

use crate::identity::{Identity, IdentityKind};

/// The claim payload: who is asking, who they are asking, and for what.
///
/// Exactly one of `host_instance_arn` / `remote_instance_arn` is set on a
/// certificate request token. Voucher tokens set neither.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TokenParams {
    pub from_id: String,
    pub from_account: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_name: Option<String>,
    pub to: String,
    #[serde(rename = "Type")]
    pub kind: IdentityKind,

    /// Set when an instance requests its own host certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_instance_arn: Option<String>,
    /// Set when a user requests a certificate for a specific remote host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_instance_arn: Option<String>,
    /// Username on the remote host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_username: Option<String>,
    /// Additional principals requested for a host certificate.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub principals: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vouchee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vouchers: Vec<VoucherToken>,
}

impl TokenParams {
    /// Start a claim from `identity` addressed to the authority named `to`.
    pub fn for_identity(identity: &Identity, to: impl Into<String>) -> Self {
        Self {
            from_id: identity.principal_id.clone(),
            from_account: identity.account_id.clone(),
            from_name: identity.display_name.clone(),
            to: to.into(),
            kind: identity.kind,
            host_instance_arn: None,
            remote_instance_arn: None,
            ssh_username: None,
            principals: Vec::new(),
            vouchee: None,
            context: None,
            vouchers: Vec::new(),
        }
    }

    pub fn with_remote_instance(mut self, arn: impl Into<String>) -> Self {
        self.remote_instance_arn = Some(arn.into());
        self
    }

    pub fn with_host_instance(mut self, arn: impl Into<String>) -> Self {
        self.host_instance_arn = Some(arn.into());
        self
    }

    pub fn with_ssh_username(mut self, username: impl Into<String>) -> Self {
        self.ssh_username = Some(username.into());
        self
    }

    pub fn with_vouchers(mut self, vouchers: Vec<VoucherToken>) -> Self {
        self.vouchers = vouchers;
        self
    }

    /// The remote target, if present and non-empty.
    pub fn remote_target(&self) -> Option<&str> {
        non_empty(&self.remote_instance_arn)
    }

    /// The requesting host, if present and non-empty.
    pub fn host_target(&self) -> Option<&str> {
        non_empty(&self.host_instance_arn)
    }

    /// Key id for certificates issued against this claim.
    pub fn signing_identity(&self) -> String {
        crate::identity::signing_identity(self.from_name.as_deref(), &self.from_id)
    }
}

/// Treat `Some("")` the same as `None`.
pub fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// A claim plus the envelope ciphertext that binds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Token {
    pub params: TokenParams,
    /// Opaque to everything except the envelope service.
    #[serde(with = "base64_bytes")]
    pub signature: Vec<u8>,
}

/// A token created by one identity to vouch for another.
///
/// Structurally identical to [`Token`]; the distinct type keeps vouchers
/// from being submitted where a primary claim is expected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoucherToken(pub Token);

impl VoucherToken {
    pub fn params(&self) -> &TokenParams {
        &self.0.params
    }

    pub fn into_token(self) -> Token {
        self.0
    }
}

impl From<Token> for VoucherToken {
    fn from(token: Token) -> Self {
        Self(token)
    }
}

mod base64_bytes {
    use base64::prelude::*;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64_STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64_STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity {
            account_id: "111".into(),
            principal_id: "u-1".into(),
            display_name: Some("alice".into()),
            kind: IdentityKind::User,
        }
    }

    #[test]
    fn test_params_wire_names() {
        let params = TokenParams::for_identity(&identity(), "LastKeypair")
            .with_remote_instance("arn:x:1")
            .with_ssh_username("ec2-user");
        let json = serde_json::to_value(&params).unwrap();

        assert_eq!(json["FromId"], "u-1");
        assert_eq!(json["FromAccount"], "111");
        assert_eq!(json["FromName"], "alice");
        assert_eq!(json["Type"], "User");
        assert_eq!(json["RemoteInstanceArn"], "arn:x:1");
        assert!(json.get("HostInstanceArn").is_none());
        assert!(json.get("Vouchers").is_none());
    }

    #[test]
    fn test_signature_is_base64() {
        let token = Token {
            params: TokenParams::for_identity(&identity(), "LastKeypair"),
            signature: b"abcd".to_vec(),
        };
        let json = serde_json::to_value(&token).unwrap();
        assert_eq!(json["Signature"], "YWJjZA==");

        let parsed: Token = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, token);
    }

    #[test]
    fn test_empty_target_is_absent() {
        let mut params = TokenParams::for_identity(&identity(), "LastKeypair");
        params.remote_instance_arn = Some(String::new());
        assert_eq!(params.remote_target(), None);
    }

    #[test]
    fn test_signing_identity() {
        let params = TokenParams::for_identity(&identity(), "LastKeypair");
        assert_eq!(params.signing_identity(), "alice-u-1");
    }
}
