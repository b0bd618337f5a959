//! Login sessions.
//!
//! A [`ReifiedLogin`] starts out [`ReifiedLogin::Pending`] with only the
//! parameters the user gave. It becomes [`ReifiedLogin::Populated`] either by
//! asking the authority ([`ReifiedLogin::populate_by_invoke`]) or by reading
//! back what an earlier invocation cached ([`ReifiedLogin::populate_by_restore_cache`]).
//! Only a populated login can render an ssh config.
//!
//! Cached records are plain JSON protected only by file permissions.

mod sshconfig;

use std::io;
use std::path::{Path, PathBuf};

use lkp_core::cert::{CertificateRequest, UserCertResponse};
use serde::{Deserialize, Serialize};

use crate::client::{CertificateClient, ClientError};

pub use sshconfig::render_ssh_config;

const CACHE_FILE: &str = "conn.json";
const SSH_CONFIG_FILE: &str = "sshconf";
const KEY_FILE: &str = "id_ed25519";
const CERT_SUFFIX: &str = "-cert.pub";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no cached login for {target}, run `lkp ssh match` first")]
    NotCached { target: String },

    #[error("login for {target} has not been populated")]
    NotPopulated { target: String },

    #[error("cache holds a login for {found}, expected {expected}")]
    TargetMismatch { expected: String, found: String },

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("{}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("{}: {source}", path.display())]
    Cache {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("could not determine home directory")]
    NoHomeDirectory,

    #[error("refusing to write {key} {value:?} into ssh config")]
    UnsafeConfigValue { key: &'static str, value: String },
}

/// Filesystem-safe form of a target identifier.
pub fn cache_key(target: &str) -> String {
    target.replace([':', '/'], "-")
}

/// Where the client keeps its key, certificates and cached logins.
///
/// ```text
/// <root>/id_ed25519{,.pub}
/// <root>/tmp/<cache_key(target)>/{conn.json, sshconf, id_ed25519-cert.pub, jump<i>-cert.pub}
/// ```
#[derive(Debug, Clone)]
pub struct SessionPaths {
    root: PathBuf,
}

impl SessionPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `~/.lkp`
    pub fn default_root() -> Result<Self, SessionError> {
        let home = dirs::home_dir().ok_or(SessionError::NoHomeDirectory)?;
        Ok(Self::new(home.join(".lkp")))
    }

    pub fn private_key(&self) -> PathBuf {
        self.root.join(KEY_FILE)
    }

    pub fn public_key(&self) -> PathBuf {
        self.root.join(format!("{KEY_FILE}.pub"))
    }

    pub fn target_dir(&self, target: &str) -> PathBuf {
        self.root.join("tmp").join(cache_key(target))
    }

    pub fn certificate(&self, target: &str) -> PathBuf {
        self.target_dir(target).join(format!("{KEY_FILE}{CERT_SUFFIX}"))
    }

    pub fn jumpbox_certificate(&self, target: &str, index: usize) -> PathBuf {
        self.target_dir(target).join(format!("jump{index}{CERT_SUFFIX}"))
    }

    pub fn cache_file(&self, target: &str) -> PathBuf {
        self.target_dir(target).join(CACHE_FILE)
    }

    pub fn ssh_config(&self, target: &str) -> PathBuf {
        self.target_dir(target).join(SSH_CONFIG_FILE)
    }
}

/// What the user asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginParams {
    pub instance_arn: String,
    pub ssh_username: String,
    /// Encoded vouchers, as passed on the command line.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vouchers: Vec<String>,
}

impl LoginParams {
    pub fn new(instance_arn: impl Into<String>, ssh_username: impl Into<String>) -> Self {
        Self {
            instance_arn: instance_arn.into(),
            ssh_username: ssh_username.into(),
            vouchers: Vec::new(),
        }
    }
}

/// A login whose certificates have been issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulatedLogin {
    pub params: LoginParams,
    pub request: CertificateRequest,
    pub response: UserCertResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReifiedLogin {
    Pending(LoginParams),
    Populated(PopulatedLogin),
}

/// Persistence for reified logins, keyed by target.
pub trait SessionStore {
    fn save(&self, login: &ReifiedLogin) -> Result<(), SessionError>;

    /// Load the login cached for `target`.
    ///
    /// Returns [`SessionError::NotCached`] if there is none.
    fn load(&self, target: &str) -> Result<ReifiedLogin, SessionError>;
}

/// One JSON file per target under [`SessionPaths`].
pub struct FileSessionStore {
    paths: SessionPaths,
}

impl FileSessionStore {
    pub fn new(paths: SessionPaths) -> Self {
        Self { paths }
    }
}

impl SessionStore for FileSessionStore {
    fn save(&self, login: &ReifiedLogin) -> Result<(), SessionError> {
        let path = self.paths.cache_file(login.target());
        let serialized = serde_json::to_vec_pretty(login).map_err(|source| SessionError::Cache {
            path: path.clone(),
            source,
        })?;
        write_private(&path, &serialized)
    }

    fn load(&self, target: &str) -> Result<ReifiedLogin, SessionError> {
        let path = self.paths.cache_file(target);
        let serialized = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SessionError::NotCached {
                    target: target.to_string(),
                })
            }
            Err(source) => return Err(SessionError::Io { path, source }),
        };
        serde_json::from_slice(&serialized).map_err(|source| SessionError::Cache { path, source })
    }
}

impl ReifiedLogin {
    pub fn new(params: LoginParams) -> Self {
        Self::Pending(params)
    }

    pub fn params(&self) -> &LoginParams {
        match self {
            Self::Pending(params) => params,
            Self::Populated(login) => &login.params,
        }
    }

    pub fn target(&self) -> &str {
        &self.params().instance_arn
    }

    pub fn populated(&self) -> Option<&PopulatedLogin> {
        match self {
            Self::Pending(_) => None,
            Self::Populated(login) => Some(login),
        }
    }

    /// Ask the authority for certificates, write them next to the cache and
    /// cache the populated login.
    ///
    /// Two concurrent calls for the same target race on the same files.
    pub fn populate_by_invoke(
        self,
        client: &CertificateClient<'_>,
        public_key: &str,
        paths: &SessionPaths,
        store: &dyn SessionStore,
        now: i64,
    ) -> Result<Self, SessionError> {
        let params = self.params().clone();
        let target = params.instance_arn.clone();
        let (request, response) = client.request_user(&params, public_key, now)?;

        write_private(
            &paths.certificate(&target),
            response.signed_public_key.as_bytes(),
        )?;
        for (i, jumpbox) in response.jumpboxes.iter().enumerate() {
            write_private(
                &paths.jumpbox_certificate(&target, i),
                jumpbox.signed_public_key.as_bytes(),
            )?;
        }

        tracing::info!(
            instance_arn = %target,
            jumpboxes = response.jumpboxes.len(),
            expiry = response.expiry,
            "populated login"
        );

        let login = Self::Populated(PopulatedLogin {
            params,
            request,
            response,
        });
        store.save(&login)?;
        Ok(login)
    }

    /// Replace this login with what was cached for the same target. No
    /// network activity.
    pub fn populate_by_restore_cache(self, store: &dyn SessionStore) -> Result<Self, SessionError> {
        let target = self.target();
        let cached = store.load(target)?;

        if cached.target() != target {
            return Err(SessionError::TargetMismatch {
                expected: target.to_string(),
                found: cached.target().to_string(),
            });
        }
        if cached.populated().is_none() {
            return Err(SessionError::NotCached {
                target: target.to_string(),
            });
        }
        Ok(cached)
    }

    /// Render and write the ssh config for this login, returning its path.
    ///
    /// Rewriting for the same login produces an identical file.
    pub fn write_ssh_config(&self, paths: &SessionPaths) -> Result<PathBuf, SessionError> {
        let login = self.populated().ok_or_else(|| SessionError::NotPopulated {
            target: self.target().to_string(),
        })?;

        let path = paths.ssh_config(self.target());
        let config = render_ssh_config(login, paths)?;
        write_private(&path, config.as_bytes())?;
        Ok(path)
    }
}

/// Write `contents` to `path` readable only by the owner, creating parents.
pub(crate) fn write_private(path: &Path, contents: &[u8]) -> Result<(), SessionError> {
    let io_err = |source| SessionError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, contents).map_err(io_err)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).map_err(io_err)?;
    }
    Ok(())
}
