//! Authority configuration.
//!
//! [`AuthorityConfig`] is built once per invocation from the environment and
//! passed by reference to everything that needs it. Secrets (the CA key and
//! its passphrase) can come from a parameter store, from an envelope-encrypted
//! blob, or straight from the environment.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use base64::prelude::*;
use lkp_auth::{BindingContext, EnvelopeService};
use zeroize::Zeroizing;

use crate::error::AuthorityError;

pub const ENV_KEY_ID: &str = "LKP_KEY_ID";
pub const ENV_CA_KEY: &str = "LKP_CA_KEY_BYTES";
pub const ENV_CA_KEY_PASSPHRASE: &str = "LKP_CA_KEY_PASSPHRASE_BYTES";
pub const ENV_VALIDITY: &str = "LKP_VALIDITY_DURATION";
pub const ENV_POLICY_FUNCTION: &str = "LKP_AUTHORIZATION_FUNCTION";
pub const ENV_KEYRING: &str = "LKP_KEYRING";
pub const ENV_PARAMETER_DIR: &str = "LKP_PARAMETER_DIR";

/// Prefix naming a parameter-store entry that holds the secret.
pub const PSTORE_PREFIX: &str = "PSTORE_";
/// Prefix naming a base64 envelope ciphertext that holds the secret.
pub const ENVELOPE_PREFIX: &str = "ENVELOPE_B64_";

pub const DEFAULT_VALIDITY: Duration = Duration::from_secs(3600);

/// Everything one issuance needs to know about the deployment.
pub struct AuthorityConfig {
    /// Canonical id of the key tokens must be bound to.
    pub key_id: String,
    /// OpenSSH private key text.
    pub ca_key: Zeroizing<Vec<u8>>,
    pub ca_key_passphrase: Option<Zeroizing<Vec<u8>>>,
    /// Lifetime of issued user certificates.
    pub validity: Duration,
    /// Function reference of the authorization policy, if any.
    pub policy_function: Option<String>,
}

impl std::fmt::Debug for AuthorityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorityConfig")
            .field("key_id", &self.key_id)
            .field("validity", &self.validity)
            .field("policy_function", &self.policy_function)
            .finish_non_exhaustive()
    }
}

/// Where indirect secrets are fetched from.
#[derive(Default, Clone, Copy)]
pub struct SecretSources<'a> {
    pub parameters: Option<&'a dyn ParameterStore>,
    pub envelope: Option<&'a dyn EnvelopeService>,
}

impl AuthorityConfig {
    /// Build the configuration from `env`.
    ///
    /// `env` is a lookup function so tests do not need to touch the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::ConfigurationMissing`] if the key id or CA
    /// key is absent, or if any value is unusable.
    pub fn from_env(
        env: &dyn Fn(&str) -> Option<String>,
        sources: SecretSources<'_>,
    ) -> Result<Self, AuthorityError> {
        let key_id = env(ENV_KEY_ID)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AuthorityError::ConfigurationMissing(format!("{ENV_KEY_ID} is not set")))?;

        let ca_key = resolve_secret(ENV_CA_KEY, env, sources)?.ok_or_else(|| {
            AuthorityError::ConfigurationMissing(format!("no CA key material in {ENV_CA_KEY}"))
        })?;
        let ca_key_passphrase = resolve_secret(ENV_CA_KEY_PASSPHRASE, env, sources)?
            .filter(|p| !p.is_empty());

        let validity = match env(ENV_VALIDITY).filter(|v| !v.is_empty()) {
            None => DEFAULT_VALIDITY,
            Some(raw) => raw.trim().parse().map(Duration::from_secs).map_err(|_| {
                AuthorityError::ConfigurationMissing(format!(
                    "{ENV_VALIDITY} must be a number of seconds, got {raw:?}"
                ))
            })?,
        };

        let policy_function = env(ENV_POLICY_FUNCTION).filter(|v| !v.trim().is_empty());

        Ok(Self {
            key_id,
            ca_key,
            ca_key_passphrase,
            validity,
            policy_function,
        })
    }

    pub fn passphrase(&self) -> Option<&[u8]> {
        self.ca_key_passphrase.as_ref().map(|p| p.as_slice())
    }
}

/// Resolve the secret named `name`.
///
/// Tried in order: `PSTORE_<name>` (a parameter name), `ENVELOPE_B64_<name>`
/// (ciphertext decrypted with an empty context), then `<name>` itself.
/// Returns `None` if none of them is set.
pub fn resolve_secret(
    name: &str,
    env: &dyn Fn(&str) -> Option<String>,
    sources: SecretSources<'_>,
) -> Result<Option<Zeroizing<Vec<u8>>>, AuthorityError> {
    if let Some(parameter) = env(&format!("{PSTORE_PREFIX}{name}")) {
        let store = sources.parameters.ok_or_else(|| {
            AuthorityError::ConfigurationMissing(format!(
                "{PSTORE_PREFIX}{name} is set but no parameter store is configured"
            ))
        })?;
        return store.get(&parameter).map(Some);
    }

    if let Some(encoded) = env(&format!("{ENVELOPE_PREFIX}{name}")) {
        let envelope = sources.envelope.ok_or_else(|| {
            AuthorityError::ConfigurationMissing(format!(
                "{ENVELOPE_PREFIX}{name} is set but no envelope service is configured"
            ))
        })?;
        let ciphertext = BASE64_STANDARD.decode(encoded.trim()).map_err(|_| {
            AuthorityError::ConfigurationMissing(format!("{ENVELOPE_PREFIX}{name} is not base64"))
        })?;
        let decrypted = envelope
            .decrypt(&ciphertext, &BindingContext::empty())
            .map_err(|e| AuthorityError::TransportFailure(format!("decrypting {name}: {e}")))?;
        return Ok(Some(Zeroizing::new(decrypted.plaintext)));
    }

    Ok(env(name).map(|raw| Zeroizing::new(raw.into_bytes())))
}

/// A read-only store of named secrets.
pub trait ParameterStore: Send + Sync {
    /// Fetch and decrypt the parameter `name`.
    fn get(&self, name: &str) -> Result<Zeroizing<Vec<u8>>, AuthorityError>;
}

/// Parameters stored as files under a root directory.
///
/// A parameter named `/lkp/ca-key` lives at `<root>/lkp/ca-key`.
#[derive(Debug, Clone)]
pub struct FileParameterStore {
    root: PathBuf,
}

impl FileParameterStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, name: &str) -> Option<PathBuf> {
        let relative = Path::new(name.trim_start_matches('/'));
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        (safe && !name.is_empty()).then(|| self.root.join(relative))
    }
}

impl ParameterStore for FileParameterStore {
    fn get(&self, name: &str) -> Result<Zeroizing<Vec<u8>>, AuthorityError> {
        let path = self.path_for(name).ok_or_else(|| {
            AuthorityError::ConfigurationMissing(format!("invalid parameter name {name:?}"))
        })?;
        std::fs::read(&path)
            .map(Zeroizing::new)
            .map_err(|e| AuthorityError::ConfigurationMissing(format!("parameter {name}: {e}")))
    }
}
