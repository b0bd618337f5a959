//! Certificate issuance state machine.
//!
//! ```text
//! ReceiveRequest -> ValidateToken -> Authorize -> SignTarget -> SignJumpbox(i)... -> Respond
//!        \______________\______________\____________\______________\__________-> failure
//! ```
//!
//! Every stage can fail the request; nothing partial is ever returned. Nested
//! vouchers are forwarded to the policy as-is and are not validated here.

use lkp_auth::{
    validate_token, CaKey, CertKind, CertificateSpec, EnvelopeService, FunctionInvoker,
    Permissions, TokenError,
};
use lkp_core::cert::{CertificateRequest, HostCertResponse, UserCertResponse};
use lkp_core::token::Token;
use sha2::{Digest, Sha256};

use crate::config::AuthorityConfig;
use crate::delegate::AuthorizationDelegate;
use crate::error::AuthorityError;

/// External services an issuance talks to.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    pub envelope: &'a dyn EnvelopeService,
    pub invoker: &'a dyn FunctionInvoker,
}

/// Where in the flow a request is. Used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ReceiveRequest,
    ValidateToken,
    Authorize,
    SignTarget,
    SignJumpbox(usize),
    Respond,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReceiveRequest => f.write_str("receive_request"),
            Self::ValidateToken => f.write_str("validate_token"),
            Self::Authorize => f.write_str("authorize"),
            Self::SignTarget => f.write_str("sign_target"),
            Self::SignJumpbox(i) => write!(f, "sign_jumpbox[{i}]"),
            Self::Respond => f.write_str("respond"),
        }
    }
}

/// Short digest of a token's ciphertext, safe to log.
pub fn token_digest(token: &Token) -> String {
    let hash = Sha256::digest(&token.signature);
    hex::encode(&hash[..8])
}

/// The certificate authority for one invocation.
pub struct Authority<'a> {
    config: &'a AuthorityConfig,
    services: Services<'a>,
}

impl<'a> Authority<'a> {
    pub fn new(config: &'a AuthorityConfig, services: Services<'a>) -> Self {
        Self { config, services }
    }

    fn delegate(&self) -> AuthorizationDelegate<'a> {
        AuthorizationDelegate::new(self.services.invoker, self.config.policy_function.as_deref())
    }

    /// Issue a user certificate, plus one per jumpbox the policy returns.
    pub fn handle_user(
        &self,
        request: &CertificateRequest,
        now: i64,
    ) -> Result<UserCertResponse, AuthorityError> {
        let params = &request.token.params;
        let digest = token_digest(&request.token);
        let fail = |stage: Stage, err: AuthorityError| failed(stage, &digest, err);

        tracing::info!(
            from_id = %params.from_id,
            from_account = %params.from_account,
            remote = ?params.remote_instance_arn,
            vouchers = params.vouchers.len(),
            stage = %Stage::ReceiveRequest,
            "user certificate request"
        );

        self.validate(&request.token, &digest, now)
            .map_err(|e| fail(Stage::ValidateToken, e))?;

        let remote = params.remote_target().ok_or_else(|| {
            fail(
                Stage::ValidateToken,
                AuthorityError::InvalidRequest("target instance arn must be specified".into()),
            )
        })?;

        let decision = self
            .delegate()
            .decide_user(params)
            .map_err(|e| fail(Stage::Authorize, e))?;
        if !decision.authorized {
            return Err(fail(
                Stage::Authorize,
                AuthorityError::AuthorizationDenied(decision.message),
            ));
        }

        let ca = self.load_ca().map_err(|e| fail(Stage::SignTarget, e))?;
        let expiry = now + self.config.validity.as_secs() as i64;
        let key_id = params.signing_identity();

        let target_spec = CertificateSpec {
            kind: CertKind::User,
            valid_before: expiry as u64,
            permissions: Permissions::from_options(&decision.certificate_options),
            key_id: key_id.clone(),
            principals: decision.principals.unwrap_or_default(),
        };
        let signed_public_key = ca
            .sign(&request.public_key, &target_spec, now as u64)
            .map_err(|e| fail(Stage::SignTarget, e.into()))?;

        let mut jumpboxes = decision.jumpboxes;
        for (i, jumpbox) in jumpboxes.iter_mut().enumerate() {
            let spec = CertificateSpec {
                kind: CertKind::User,
                valid_before: expiry as u64,
                permissions: Permissions::from_options(&jumpbox.certificate_options),
                key_id: key_id.clone(),
                principals: jumpbox.principals.clone(),
            };
            jumpbox.signed_public_key = ca
                .sign(&request.public_key, &spec, now as u64)
                .map_err(|e| fail(Stage::SignJumpbox(i), e.into()))?;
        }

        tracing::info!(
            key_id = %key_id,
            remote = %remote,
            principals = ?target_spec.principals,
            jumpboxes = jumpboxes.len(),
            expiry,
            stage = %Stage::Respond,
            "issued user certificate"
        );

        Ok(UserCertResponse {
            signed_public_key,
            jumpboxes,
            target_address: decision.target_address,
            expiry,
        })
    }

    /// Issue a host certificate for the instance named in the token.
    pub fn handle_host(
        &self,
        request: &CertificateRequest,
        now: i64,
    ) -> Result<HostCertResponse, AuthorityError> {
        let params = &request.token.params;
        let digest = token_digest(&request.token);
        let fail = |stage: Stage, err: AuthorityError| failed(stage, &digest, err);

        tracing::info!(
            from_id = %params.from_id,
            host = ?params.host_instance_arn,
            stage = %Stage::ReceiveRequest,
            "host certificate request"
        );

        self.validate(&request.token, &digest, now)
            .map_err(|e| fail(Stage::ValidateToken, e))?;

        if params.host_target().is_none() {
            return Err(fail(
                Stage::ValidateToken,
                AuthorityError::InvalidRequest("host instance arn must be specified".into()),
            ));
        }

        let decision = self
            .delegate()
            .decide_host(params)
            .map_err(|e| fail(Stage::Authorize, e))?;
        if !decision.authorized {
            return Err(fail(Stage::Authorize, AuthorityError::AuthorizationDenied(None)));
        }

        let spec = CertificateSpec {
            kind: CertKind::Host,
            valid_before: lkp_auth::signer::CERT_TIME_INFINITY,
            permissions: Permissions::none(),
            key_id: decision.key_id,
            principals: decision.principals,
        };
        let ca = self.load_ca().map_err(|e| fail(Stage::SignTarget, e))?;
        let signed_host_public_key = ca
            .sign(&request.public_key, &spec, now as u64)
            .map_err(|e| fail(Stage::SignTarget, e.into()))?;

        tracing::info!(
            key_id = %spec.key_id,
            principals = ?spec.principals,
            stage = %Stage::Respond,
            "issued host certificate"
        );

        Ok(HostCertResponse {
            signed_host_public_key,
        })
    }

    fn validate(&self, token: &Token, digest: &str, now: i64) -> Result<(), AuthorityError> {
        match validate_token(self.services.envelope, token, &self.config.key_id, now) {
            Ok(_) => Ok(()),
            Err(TokenError::Invalid(reason)) => {
                // Security event. The reason stays in the log.
                tracing::warn!(token = %digest, reason = %reason, "rejected token");
                Err(AuthorityError::TokenInvalid)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn load_ca(&self) -> Result<CaKey, AuthorityError> {
        Ok(CaKey::load(&self.config.ca_key, self.config.passphrase())?)
    }
}

fn failed(stage: Stage, digest: &str, err: AuthorityError) -> AuthorityError {
    match &err {
        AuthorityError::TokenInvalid | AuthorityError::AuthorizationDenied(_) => {
            tracing::warn!(%stage, token = %digest, error = %err, "request refused");
        }
        _ => tracing::error!(%stage, token = %digest, error = %err, "request failed"),
    }
    err
}
