//! Wire types for the external authorization policy function.

use serde::{Deserialize, Serialize};

use crate::cert::{CertificateOptions, Jumpbox};
use crate::identity::IdentityKind;
use crate::token::{TokenParams, VoucherToken};

/// `Kind` tag sent with user authorization requests.
pub const USER_AUTHORIZATION_KIND: &str = "LkpUserCertAuthorizationRequest";

/// `Kind` tag sent with host authorization requests.
pub const HOST_AUTHORIZATION_KIND: &str = "LkpHostCertAuthorizationRequest";

/// The requesting identity as seen by a policy function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyIdentity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub id: String,
    pub account: String,
    #[serde(rename = "Type")]
    pub kind: IdentityKind,
}

impl From<&TokenParams> for PolicyIdentity {
    fn from(params: &TokenParams) -> Self {
        Self {
            name: params.from_name.clone(),
            id: params.from_id.clone(),
            account: params.from_account.clone(),
            kind: params.kind,
        }
    }
}

/// A voucher as seen by a policy function: the voucher's creator plus what
/// they vouched for.
///
/// Vouchers reach the policy unvalidated; a policy that relies on them must
/// validate each one itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyVoucher {
    #[serde(flatten)]
    pub from: PolicyIdentity,
    #[serde(default)]
    pub vouchee: String,
    #[serde(default)]
    pub context: String,
}

impl From<&VoucherToken> for PolicyVoucher {
    fn from(voucher: &VoucherToken) -> Self {
        let params = voucher.params();
        Self {
            from: PolicyIdentity::from(params),
            vouchee: params.vouchee.clone().unwrap_or_default(),
            context: params.context.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserAuthorizationRequest {
    pub kind: String,
    pub from: PolicyIdentity,
    pub remote_instance_arn: String,
    pub ssh_username: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vouchers: Vec<PolicyVoucher>,
}

impl UserAuthorizationRequest {
    pub fn from_params(params: &TokenParams) -> Self {
        Self {
            kind: USER_AUTHORIZATION_KIND.to_string(),
            from: PolicyIdentity::from(params),
            remote_instance_arn: params.remote_instance_arn.clone().unwrap_or_default(),
            ssh_username: params.ssh_username.clone().unwrap_or_default(),
            vouchers: params.vouchers.iter().map(PolicyVoucher::from).collect(),
        }
    }
}

/// Raw policy answer for a user request, before normalization.
///
/// `principals` is optional so that "absent" and "empty" stay distinguishable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserAuthorizationResponse {
    pub authorized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principals: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jumpboxes: Vec<Jumpbox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_address: Option<String>,
    #[serde(default)]
    pub certificate_options: CertificateOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostAuthorizationRequest {
    pub kind: String,
    pub from: PolicyIdentity,
    pub host_instance_arn: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub principals: Vec<String>,
}

impl HostAuthorizationRequest {
    pub fn from_params(params: &TokenParams) -> Self {
        Self {
            kind: HOST_AUTHORIZATION_KIND.to_string(),
            from: PolicyIdentity::from(params),
            host_instance_arn: params.host_instance_arn.clone().unwrap_or_default(),
            principals: params.principals.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostAuthorizationResponse {
    pub authorized: bool,
    #[serde(default)]
    pub key_id: String,
    #[serde(default)]
    pub principals: Vec<String>,
}
