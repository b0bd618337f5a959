//! Certificate request and response types exchanged with the authority.
//!
//! Field names are PascalCase on the wire so that policy functions and
//! clients written against the existing invocation contract keep working.

use serde::{Deserialize, Serialize};

use crate::token::Token;

/// Discriminator carried in every event sent to the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    UserCertReq,
    HostCertReq,
}

/// A request for a signed certificate over `public_key`.
///
/// Only the fields inside `token.params` are bound by the envelope; nothing
/// else in this struct should influence authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CertificateRequest {
    pub event_type: EventType,
    pub token: Token,
    /// OpenSSH `authorized_keys` formatted public key.
    pub public_key: String,
}

impl CertificateRequest {
    pub fn user(token: Token, public_key: impl Into<String>) -> Self {
        Self {
            event_type: EventType::UserCertReq,
            token,
            public_key: public_key.into(),
        }
    }

    pub fn host(token: Token, public_key: impl Into<String>) -> Self {
        Self {
            event_type: EventType::HostCertReq,
            token,
            public_key: public_key.into(),
        }
    }
}

/// Permission knobs a policy can set per certificate.
///
/// Forwarding flags absent from a policy response default to permitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CertificateOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_address: Option<String>,
    #[serde(default = "permitted")]
    pub permit_x11_forwarding: bool,
    #[serde(default = "permitted")]
    pub permit_agent_forwarding: bool,
    #[serde(default = "permitted")]
    pub permit_port_forwarding: bool,
}

fn permitted() -> bool {
    true
}

impl Default for CertificateOptions {
    fn default() -> Self {
        Self {
            force_command: None,
            source_address: None,
            permit_x11_forwarding: true,
            permit_agent_forwarding: true,
            permit_port_forwarding: true,
        }
    }
}

/// An intermediate SSH hop with its own certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Jumpbox {
    pub address: String,
    #[serde(default)]
    pub user: String,
    /// Defaults to `address` when a policy leaves it empty.
    #[serde(default)]
    pub host_key_alias: String,
    #[serde(default)]
    pub principals: Vec<String>,
    /// Filled in by the authority; policies leave it empty.
    #[serde(default)]
    pub signed_public_key: String,
    #[serde(default)]
    pub certificate_options: CertificateOptions,
}

/// Response to a [`EventType::UserCertReq`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserCertResponse {
    pub signed_public_key: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jumpboxes: Vec<Jumpbox>,
    /// Direct address of the target when no ssh-level jump is needed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_address: Option<String>,
    /// Unix seconds.
    pub expiry: i64,
}

/// Response to a [`EventType::HostCertReq`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostCertResponse {
    pub signed_host_public_key: String,
}

/// Structured failure returned by the authority in place of a response.
///
/// `error_message` is safe to show to the caller; it never carries key
/// identifiers or other internal detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailurePayload {
    pub error_type: String,
    pub error_message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_default_to_permitted() {
        let options: CertificateOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, CertificateOptions::default());

        let options: CertificateOptions =
            serde_json::from_str(r#"{"PermitX11Forwarding": false, "ForceCommand": "uptime"}"#)
                .unwrap();
        assert!(!options.permit_x11_forwarding);
        assert!(options.permit_agent_forwarding);
        assert_eq!(options.force_command.as_deref(), Some("uptime"));
    }

    #[test]
    fn test_jumpbox_from_sparse_policy_output() {
        let jumpbox: Jumpbox = serde_json::from_str(r#"{"Address": "10.0.0.1"}"#).unwrap();
        assert_eq!(jumpbox.address, "10.0.0.1");
        assert!(jumpbox.host_key_alias.is_empty());
        assert!(jumpbox.principals.is_empty());
        assert_eq!(jumpbox.certificate_options, CertificateOptions::default());
    }

    #[test]
    fn test_user_response_omits_empty_fields() {
        let response = UserCertResponse {
            signed_public_key: "ssh-ed25519-cert-v01@openssh.com AAAA".into(),
            jumpboxes: Vec::new(),
            target_address: None,
            expiry: 1700000000,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("Jumpboxes").is_none());
        assert!(json.get("TargetAddress").is_none());
        assert_eq!(json["Expiry"], 1700000000);
    }

    #[test]
    fn test_event_type_names() {
        assert_eq!(
            serde_json::to_string(&EventType::HostCertReq).unwrap(),
            r#""HostCertReq""#
        );
    }

    #[test]
    fn test_failure_payload_shape() {
        let payload = FailurePayload {
            error_type: "AuthorizationDenied".into(),
            error_message: "mfa required".into(),
        };
        assert_eq!(
            serde_json::to_string(&payload).unwrap(),
            r#"{"errorType":"AuthorizationDenied","errorMessage":"mfa required"}"#
        );
    }
}
