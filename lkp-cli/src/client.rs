//! Client side of certificate issuance: build a bound token, send it to the
//! authority, decode the answer.

use lkp_auth::{
    create_token, decode_voucher, encode_voucher, invoke_json, vouch, CallerIdentityService,
    EnvelopeService, FunctionInvoker, InvokeError, TokenError, VoucherError,
};
use lkp_core::cert::{CertificateRequest, HostCertResponse, UserCertResponse};
use lkp_core::identity::IdentityError;
use lkp_core::token::TokenParams;

use crate::session::LoginParams;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("resolving caller identity: {0}")]
    Identity(#[from] IdentityError),

    #[error("creating token: {0}")]
    Token(#[from] TokenError),

    #[error("voucher: {0}")]
    Voucher(#[from] VoucherError),

    #[error("certificate authority: {0}")]
    Invoke(#[from] InvokeError),
}

/// Everything needed to ask the authority for a certificate.
#[derive(Clone, Copy)]
pub struct CertificateClient<'a> {
    pub caller: &'a dyn CallerIdentityService,
    pub envelope: &'a dyn EnvelopeService,
    pub invoker: &'a dyn FunctionInvoker,
    /// How to reach the authority function.
    pub function: &'a str,
    /// Key the token is bound under.
    pub key_ref: &'a str,
    /// Authority name the token is addressed to.
    pub to: &'a str,
}

impl CertificateClient<'_> {
    /// Request a user certificate for `public_key` to log in as described by `login`.
    ///
    /// Returns the request as sent alongside the response, so both can be cached.
    pub fn request_user(
        &self,
        login: &LoginParams,
        public_key: &str,
        now: i64,
    ) -> Result<(CertificateRequest, UserCertResponse), ClientError> {
        let identity = self.caller.caller_identity()?;
        let vouchers = login
            .vouchers
            .iter()
            .map(|encoded| decode_voucher(encoded))
            .collect::<Result<Vec<_>, _>>()?;

        let params = TokenParams::for_identity(&identity, self.to)
            .with_remote_instance(&login.instance_arn)
            .with_ssh_username(&login.ssh_username)
            .with_vouchers(vouchers);
        let token = create_token(self.envelope, params, self.key_ref, now)?;

        let request = CertificateRequest::user(token, public_key);
        let response = invoke_json(self.invoker, self.function, &request)?;
        Ok((request, response))
    }

    /// Request a host certificate for `host_key` on behalf of `instance_arn`.
    pub fn request_host(
        &self,
        instance_arn: &str,
        host_key: &str,
        now: i64,
    ) -> Result<HostCertResponse, ClientError> {
        let identity = self.caller.caller_identity()?;
        let params = TokenParams::for_identity(&identity, self.to).with_host_instance(instance_arn);
        let token = create_token(self.envelope, params, self.key_ref, now)?;

        let request = CertificateRequest::host(token, host_key);
        Ok(invoke_json(self.invoker, self.function, &request)?)
    }

    /// Vouch for `vouchee` and return the encoded voucher.
    pub fn vouch(&self, vouchee: &str, context: &str, now: i64) -> Result<String, ClientError> {
        let identity = self.caller.caller_identity()?;
        let voucher = vouch(
            self.envelope,
            &identity,
            self.key_ref,
            self.to,
            vouchee,
            context,
            now,
        )?;
        Ok(encode_voucher(&voucher)?)
    }
}
