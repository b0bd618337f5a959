//! Authorization delegate.
//!
//! Without a policy function, every request is allowed for exactly the
//! principal it asked for: the remote instance for users, the requesting
//! instance for hosts. With one, the delegate forwards who is asking and for
//! what, then fills in whatever the policy left out.

use lkp_auth::{invoke_json, FunctionInvoker, InvokeError};
use lkp_core::authz::{
    HostAuthorizationRequest, HostAuthorizationResponse, UserAuthorizationRequest,
    UserAuthorizationResponse,
};
use lkp_core::cert::CertificateOptions;
use lkp_core::token::TokenParams;

use crate::error::AuthorityError;

/// Decides whether a validated request may be signed, and for what.
pub struct AuthorizationDelegate<'a> {
    invoker: &'a dyn FunctionInvoker,
    policy_function: Option<&'a str>,
}

impl<'a> AuthorizationDelegate<'a> {
    pub fn new(invoker: &'a dyn FunctionInvoker, policy_function: Option<&'a str>) -> Self {
        Self {
            invoker,
            policy_function,
        }
    }

    /// Decide a user certificate request. `params` must carry a remote target.
    ///
    /// The returned response is normalized; a `false` `authorized` flag is
    /// for the caller to act on.
    pub fn decide_user(
        &self,
        params: &TokenParams,
    ) -> Result<UserAuthorizationResponse, AuthorityError> {
        let remote = params.remote_target().unwrap_or_default();

        let Some(function) = self.policy_function else {
            return Ok(UserAuthorizationResponse {
                authorized: true,
                message: None,
                principals: Some(vec![remote.to_string()]),
                jumpboxes: Vec::new(),
                target_address: None,
                certificate_options: CertificateOptions::default(),
            });
        };

        let request = UserAuthorizationRequest::from_params(params);
        let response = invoke_json(self.invoker, function, &request).map_err(policy_failure)?;
        Ok(normalize_user(response, remote))
    }

    /// Decide a host certificate request. `params` must carry a host target.
    pub fn decide_host(
        &self,
        params: &TokenParams,
    ) -> Result<HostAuthorizationResponse, AuthorityError> {
        let host = params.host_target().unwrap_or_default();

        let Some(function) = self.policy_function else {
            return Ok(HostAuthorizationResponse {
                authorized: true,
                key_id: host.to_string(),
                principals: vec![host.to_string()],
            });
        };

        let request = HostAuthorizationRequest::from_params(params);
        let response = invoke_json(self.invoker, function, &request).map_err(policy_failure)?;
        Ok(normalize_host(response, host))
    }
}

fn policy_failure(err: InvokeError) -> AuthorityError {
    AuthorityError::TransportFailure(format!("authorization policy: {err}"))
}

/// Fill the gaps in a policy's user answer.
///
/// - A jumpbox without a host key alias is known by its address.
/// - A jumpbox without principals is signed for its address.
/// - Absent principals mean every jumpbox alias plus `remote`. An explicit
///   empty list is kept as-is.
pub fn normalize_user(
    mut response: UserAuthorizationResponse,
    remote: &str,
) -> UserAuthorizationResponse {
    for jumpbox in &mut response.jumpboxes {
        if jumpbox.host_key_alias.is_empty() {
            jumpbox.host_key_alias = jumpbox.address.clone();
        }
        if jumpbox.principals.is_empty() {
            jumpbox.principals = vec![jumpbox.address.clone()];
        }
    }

    if response.principals.is_none() {
        let mut principals: Vec<String> = response
            .jumpboxes
            .iter()
            .map(|j| j.host_key_alias.clone())
            .collect();
        principals.push(remote.to_string());
        response.principals = Some(principals);
    }

    response.message = response.message.filter(|m| !m.is_empty());
    response.target_address = response.target_address.filter(|a| !a.is_empty());
    response
}

/// Fill the gaps in a policy's host answer: the key id and principal set
/// both default to the host itself.
pub fn normalize_host(
    mut response: HostAuthorizationResponse,
    host: &str,
) -> HostAuthorizationResponse {
    if response.key_id.is_empty() {
        response.key_id = host.to_string();
    }
    if response.principals.is_empty() {
        response.principals = vec![host.to_string()];
    }
    response
}
