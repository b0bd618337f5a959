//! SSH certificate signing.
//!
//! The signer encodes exactly what it is given. Which extensions and
//! critical options a certificate carries is decided by the caller through
//! [`Permissions`]; nothing is granted by default.

use std::collections::BTreeMap;

use lkp_core::cert::CertificateOptions;
use rand::rngs::OsRng;
use ssh_key::certificate::{Builder, CertType};
use ssh_key::{Certificate, PrivateKey, PublicKey};

/// Backdate applied to `valid_after` to tolerate clock skew.
pub const CLOCK_SKEW_SECS: u64 = 300;

/// `valid_before` for certificates that never expire.
///
/// The largest timestamp the certificate encoder accepts. OpenSSH treats
/// anything this far out as unbounded.
pub const CERT_TIME_INFINITY: u64 = i64::MAX as u64;

pub const EXT_X11_FORWARDING: &str = "permit-X11-forwarding";
pub const EXT_AGENT_FORWARDING: &str = "permit-agent-forwarding";
pub const EXT_PORT_FORWARDING: &str = "permit-port-forwarding";
pub const EXT_PTY: &str = "permit-pty";
pub const EXT_USER_RC: &str = "permit-user-rc";

pub const OPT_FORCE_COMMAND: &str = "force-command";
pub const OPT_SOURCE_ADDRESS: &str = "source-address";

/// Errors from certificate signing.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SignError {
    #[error("malformed CA key: {0}")]
    MalformedCaKey(ssh_key::Error),

    #[error("CA key is encrypted and no passphrase was configured")]
    MissingPassphrase,

    #[error("CA key could not be decrypted: {0}")]
    CaKeyDecryption(ssh_key::Error),

    #[error("malformed subject public key: {0}")]
    MalformedSubjectKey(ssh_key::Error),

    /// A certificate must name at least one principal.
    #[error("no principals to sign for")]
    NoPrincipals,

    /// A blank principal matches nothing useful and is refused.
    #[error("empty principal")]
    EmptyPrincipal,

    #[error("signing failed: {0}")]
    Signing(ssh_key::Error),
}

/// Whether a certificate is for a user or a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertKind {
    User,
    Host,
}

impl From<CertKind> for CertType {
    fn from(kind: CertKind) -> Self {
        match kind {
            CertKind::User => CertType::User,
            CertKind::Host => CertType::Host,
        }
    }
}

/// The extensions and critical options encoded into a certificate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions {
    pub extensions: BTreeMap<String, String>,
    pub critical_options: BTreeMap<String, String>,
}

impl Permissions {
    /// No extensions, no critical options. Used for host certificates.
    pub fn none() -> Self {
        Self::default()
    }

    /// Translate policy-level options into certificate permissions.
    ///
    /// `permit-pty` and `permit-user-rc` are always granted. Forwarding
    /// extensions follow their flags.
    pub fn from_options(options: &CertificateOptions) -> Self {
        let mut extensions = BTreeMap::new();
        let mut grant = |name: &str| {
            extensions.insert(name.to_string(), String::new());
        };

        grant(EXT_PTY);
        grant(EXT_USER_RC);
        if options.permit_x11_forwarding {
            grant(EXT_X11_FORWARDING);
        }
        if options.permit_agent_forwarding {
            grant(EXT_AGENT_FORWARDING);
        }
        if options.permit_port_forwarding {
            grant(EXT_PORT_FORWARDING);
        }

        let mut critical_options = BTreeMap::new();
        if let Some(command) = options.force_command.as_deref().filter(|c| !c.is_empty()) {
            critical_options.insert(OPT_FORCE_COMMAND.to_string(), command.to_string());
        }
        if let Some(address) = options.source_address.as_deref().filter(|a| !a.is_empty()) {
            critical_options.insert(OPT_SOURCE_ADDRESS.to_string(), address.to_string());
        }

        Self {
            extensions,
            critical_options,
        }
    }
}

/// Everything about a certificate except the keys.
#[derive(Debug, Clone)]
pub struct CertificateSpec {
    pub kind: CertKind,
    /// Unix seconds, or [`CERT_TIME_INFINITY`].
    pub valid_before: u64,
    pub permissions: Permissions,
    pub key_id: String,
    pub principals: Vec<String>,
}

/// A decrypted CA private key, ready to sign.
pub struct CaKey(PrivateKey);

impl std::fmt::Debug for CaKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CaKey").field(&self.0.algorithm()).finish()
    }
}

impl CaKey {
    /// Parse an OpenSSH private key, decrypting it with `passphrase` if it
    /// is encrypted.
    ///
    /// # Errors
    ///
    /// - [`SignError::MalformedCaKey`] if the bytes are not an OpenSSH key
    /// - [`SignError::MissingPassphrase`] if the key is encrypted and no
    ///   passphrase was given
    /// - [`SignError::CaKeyDecryption`] if the passphrase is wrong
    pub fn load(key_bytes: &[u8], passphrase: Option<&[u8]>) -> Result<Self, SignError> {
        let key = PrivateKey::from_openssh(key_bytes).map_err(SignError::MalformedCaKey)?;
        if !key.is_encrypted() {
            return Ok(Self(key));
        }

        let passphrase = passphrase.ok_or(SignError::MissingPassphrase)?;
        key.decrypt(passphrase)
            .map(Self)
            .map_err(SignError::CaKeyDecryption)
    }

    pub fn public_key(&self) -> &PublicKey {
        self.0.public_key()
    }

    /// Sign `subject` (an OpenSSH public key line) as described by `spec`.
    ///
    /// Returns the certificate in OpenSSH text form.
    pub fn sign(&self, subject: &str, spec: &CertificateSpec, now: u64) -> Result<String, SignError> {
        if spec.principals.is_empty() {
            return Err(SignError::NoPrincipals);
        }
        if spec.principals.iter().any(|p| p.trim().is_empty()) {
            return Err(SignError::EmptyPrincipal);
        }

        let subject = PublicKey::from_openssh(subject.trim()).map_err(SignError::MalformedSubjectKey)?;
        let valid_after = now.saturating_sub(CLOCK_SKEW_SECS);

        let mut builder = Builder::new_with_random_nonce(
            &mut OsRng,
            subject.key_data().clone(),
            valid_after,
            spec.valid_before,
        )
        .map_err(SignError::Signing)?;

        builder
            .serial(0)
            .and_then(|b| b.key_id(&spec.key_id))
            .and_then(|b| b.cert_type(spec.kind.into()))
            .map_err(SignError::Signing)?;

        for principal in &spec.principals {
            builder
                .valid_principal(principal)
                .map_err(SignError::Signing)?;
        }
        for (name, data) in &spec.permissions.extensions {
            builder.extension(name, data).map_err(SignError::Signing)?;
        }
        for (name, data) in &spec.permissions.critical_options {
            builder
                .critical_option(name, data)
                .map_err(SignError::Signing)?;
        }

        let certificate: Certificate = builder.sign(&self.0).map_err(SignError::Signing)?;
        certificate.to_openssh().map_err(SignError::Signing)
    }
}

/// Load the CA key and sign one certificate.
///
/// Convenience for callers that sign a single certificate per key load.
pub fn sign_ssh(
    ca_key: &[u8],
    ca_key_passphrase: Option<&[u8]>,
    subject: &str,
    spec: &CertificateSpec,
    now: u64,
) -> Result<String, SignError> {
    CaKey::load(ca_key, ca_key_passphrase)?.sign(subject, spec, now)
}
