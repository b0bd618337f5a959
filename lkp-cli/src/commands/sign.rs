//! `lkp ssh sign`: sign a user key with a CA key on disk, no authority
//! involved. For bootstrapping and break-glass access.

use std::path::PathBuf;

use anyhow::{Context, Result};
use lkp_auth::{now_secs, sign_ssh, CertKind, CertificateSpec, Permissions};
use lkp_core::cert::CertificateOptions;

pub struct SignArgs {
    pub ca_key_path: PathBuf,
    /// Environment variable holding the CA key passphrase.
    pub passphrase_env: Option<String>,
    pub user_key_path: PathBuf,
    pub key_id: String,
    /// Seconds the certificate stays valid.
    pub duration: u64,
    pub principals: Vec<String>,
}

pub fn run(args: &SignArgs) -> Result<()> {
    let passphrase = args
        .passphrase_env
        .as_deref()
        .map(|var| std::env::var(var).with_context(|| format!("{var} is not set")))
        .transpose()?;
    let now = u64::try_from(now_secs()).unwrap_or_default();

    let certificate = sign(args, passphrase.as_deref().map(str::as_bytes), now)?;
    tracing::info!(key_id = %args.key_id, principals = ?args.principals, "signed user key");
    println!("{certificate}");
    Ok(())
}

fn sign(args: &SignArgs, passphrase: Option<&[u8]>, now: u64) -> Result<String> {
    let ca_key = std::fs::read(&args.ca_key_path)
        .with_context(|| format!("Failed to read CA key {}", args.ca_key_path.display()))?;
    let user_key = std::fs::read_to_string(&args.user_key_path)
        .with_context(|| format!("Failed to read user key {}", args.user_key_path.display()))?;

    let spec = CertificateSpec {
        kind: CertKind::User,
        valid_before: now.saturating_add(args.duration),
        permissions: Permissions::from_options(&CertificateOptions::default()),
        key_id: args.key_id.clone(),
        principals: args.principals.clone(),
    };
    sign_ssh(&ca_key, passphrase, &user_key, &spec, now).context("Failed to sign user key")
}

#[cfg(test)]
mod tests {
    use super::*;
    use lkp_auth::SignError;
    use rand::rngs::OsRng;
    use ssh_key::certificate::CertType;
    use ssh_key::{Algorithm, Certificate, LineEnding, PrivateKey};
    use tempfile::TempDir;

    const NOW: u64 = 1_700_000_000;

    struct Keys {
        _dir: TempDir,
        ca: PrivateKey,
        args: SignArgs,
    }

    fn keys(ca: PrivateKey, principals: &[&str]) -> Keys {
        let dir = TempDir::new().unwrap();
        let ca_key_path = dir.path().join("ca_key");
        std::fs::write(&ca_key_path, ca.to_openssh(LineEnding::LF).unwrap().as_bytes()).unwrap();

        let user = PrivateKey::random(&mut OsRng, Algorithm::Ed25519).unwrap();
        let user_key_path = dir.path().join("id_ed25519.pub");
        std::fs::write(&user_key_path, user.public_key().to_openssh().unwrap()).unwrap();

        Keys {
            args: SignArgs {
                ca_key_path,
                passphrase_env: None,
                user_key_path,
                key_id: "break-glass".into(),
                duration: 600,
                principals: principals.iter().map(|p| p.to_string()).collect(),
            },
            ca,
            _dir: dir,
        }
    }

    fn random_ca() -> PrivateKey {
        PrivateKey::random(&mut OsRng, Algorithm::Ed25519).unwrap()
    }

    #[test]
    fn test_signs_user_key() {
        let keys = keys(random_ca(), &["ec2-user", "root"]);

        let text = sign(&keys.args, None, NOW).unwrap();
        let cert = Certificate::from_openssh(&text).unwrap();

        assert_eq!(cert.cert_type(), CertType::User);
        assert_eq!(cert.key_id(), "break-glass");
        assert_eq!(cert.valid_principals(), ["ec2-user", "root"]);
        assert_eq!(cert.valid_before(), NOW + 600);
        assert_eq!(cert.signature_key(), keys.ca.public_key().key_data());
    }

    #[test]
    fn test_requires_principals() {
        let keys = keys(random_ca(), &[]);
        let err = sign(&keys.args, None, NOW).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SignError>(),
            Some(SignError::NoPrincipals)
        ));
    }

    #[test]
    fn test_encrypted_ca_needs_passphrase() {
        let ca = random_ca().encrypt(&mut OsRng, "hunter2").unwrap();
        let keys = keys(ca, &["ec2-user"]);

        assert!(sign(&keys.args, Some(b"hunter2"), NOW).is_ok());
        let err = sign(&keys.args, None, NOW).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SignError>(),
            Some(SignError::MissingPassphrase)
        ));
    }

    #[test]
    fn test_missing_ca_key_file() {
        let mut keys = keys(random_ca(), &["ec2-user"]);
        keys.args.ca_key_path = keys.args.ca_key_path.with_file_name("absent");
        assert!(sign(&keys.args, None, NOW).is_err());
    }
}
