//! Test harness for issuance tests.
//!
//! Everything runs in-process: a software envelope service stands in for
//! the key-management service and a scripted invoker stands in for the
//! authorization policy.

use std::sync::Mutex;
use std::time::Duration;

use lkp_auth::envelope::KeyringEntry;
use lkp_auth::{create_token, FunctionInvoker, InvokeError, InvokeOutput, Keyring, LocalEnvelope};
use lkp_authority::{Authority, AuthorityConfig, Services};
use lkp_core::cert::CertificateRequest;
use lkp_core::identity::{Identity, IdentityKind};
use lkp_core::token::TokenParams;
use rand::rngs::OsRng;
use ssh_key::{Algorithm, Certificate, LineEnding, PrivateKey, PublicKey};
use zeroize::Zeroizing;

/// Canonical id of the key the authority trusts.
pub const KEY_ID: &str = "local:key/LastKeypair";
/// Alias clients create tokens with.
pub const KEY_ALIAS: &str = "alias/LastKeypair";
/// A second key the envelope service also holds, e.g. one an attacker controls.
pub const OTHER_KEY_ID: &str = "local:key/other";

pub const NOW: i64 = 1_700_000_000;

/// Policy function double: answers with a fixed JSON reply and records
/// every request it receives.
pub struct ScriptedPolicy {
    reply: String,
    pub requests: Mutex<Vec<serde_json::Value>>,
}

impl ScriptedPolicy {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl FunctionInvoker for ScriptedPolicy {
    fn invoke(&self, _function: &str, payload: &[u8]) -> Result<InvokeOutput, InvokeError> {
        self.requests
            .lock()
            .unwrap()
            .push(serde_json::from_slice(payload).expect("policy request is JSON"));
        Ok(InvokeOutput {
            payload: self.reply.as_bytes().to_vec(),
            function_error: None,
        })
    }
}

/// An authority with its CA key, envelope service and policy double.
pub struct TestAuthority {
    pub envelope: LocalEnvelope,
    pub config: AuthorityConfig,
    pub policy: ScriptedPolicy,
    pub ca_public: PublicKey,
}

impl TestAuthority {
    /// An authority with no policy function configured.
    pub fn new() -> Self {
        let ca_key = PrivateKey::random(&mut OsRng, Algorithm::Ed25519).unwrap();
        let pem = ca_key.to_openssh(LineEnding::LF).unwrap();

        let primary = Keyring::generate(KEY_ID, Some(KEY_ALIAS.to_string()));
        let other = Keyring::generate(OTHER_KEY_ID, None);
        let keyring = Keyring {
            keys: primary
                .keys
                .into_iter()
                .chain(other.keys)
                .collect::<Vec<KeyringEntry>>(),
        };

        Self {
            envelope: LocalEnvelope::from_keyring(&keyring).unwrap(),
            config: AuthorityConfig {
                key_id: KEY_ID.to_string(),
                ca_key: Zeroizing::new(pem.as_bytes().to_vec()),
                ca_key_passphrase: None,
                validity: Duration::from_secs(3600),
                policy_function: None,
            },
            policy: ScriptedPolicy::new(r#"{"Authorized": true}"#),
            ca_public: ca_key.public_key().clone(),
        }
    }

    /// An authority whose policy function always answers `reply`.
    pub fn with_policy(reply: &str) -> Self {
        let mut authority = Self::new();
        authority.config.policy_function = Some("lkp-policy".to_string());
        authority.policy = ScriptedPolicy::new(reply);
        authority
    }

    pub fn services(&self) -> Services<'_> {
        Services {
            envelope: &self.envelope,
            invoker: &self.policy,
        }
    }

    pub fn authority(&self) -> Authority<'_> {
        Authority::new(&self.config, self.services())
    }

    /// A signed user certificate request from `identity` for `remote`.
    pub fn user_request(&self, identity: &Identity, remote: &str) -> CertificateRequest {
        let params = TokenParams::for_identity(identity, "LastKeypair")
            .with_remote_instance(remote)
            .with_ssh_username("ec2-user");
        self.request_for(params, KEY_ALIAS, false)
    }

    /// A signed host certificate request for `host`.
    pub fn host_request(&self, host: &str) -> CertificateRequest {
        let params = TokenParams::for_identity(&instance_role(), "LastKeypair")
            .with_host_instance(host);
        self.request_for(params, KEY_ALIAS, true)
    }

    /// A request carrying `params`, bound under `key_ref` at [`NOW`].
    pub fn request_for(&self, params: TokenParams, key_ref: &str, host: bool) -> CertificateRequest {
        let token = create_token(&self.envelope, params, key_ref, NOW).unwrap();
        if host {
            CertificateRequest::host(token, subject_key())
        } else {
            CertificateRequest::user(token, subject_key())
        }
    }

    /// Parse `text` and check it was signed by this authority's CA.
    pub fn parse_cert(&self, text: &str) -> Certificate {
        let cert = Certificate::from_openssh(text).unwrap();
        assert_eq!(cert.signature_key(), self.ca_public.key_data());
        cert
    }
}

/// The identity from the reference scenarios.
pub fn user() -> Identity {
    Identity {
        account_id: "111".into(),
        principal_id: "u-1".into(),
        display_name: None,
        kind: IdentityKind::User,
    }
}

pub fn named_user() -> Identity {
    Identity {
        display_name: Some("alice".into()),
        ..user()
    }
}

pub fn instance_role() -> Identity {
    Identity {
        account_id: "111".into(),
        principal_id: "AROAINSTANCE:i-0abc".into(),
        display_name: None,
        kind: IdentityKind::AssumedRole,
    }
}

/// A fresh OpenSSH public key to certify.
pub fn subject_key() -> String {
    PrivateKey::random(&mut OsRng, Algorithm::Ed25519)
        .unwrap()
        .public_key()
        .to_openssh()
        .unwrap()
}
