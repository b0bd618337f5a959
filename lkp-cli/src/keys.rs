//! The client's own SSH keypair.

use anyhow::{Context, Result};
use rand::rngs::OsRng;
use ssh_key::{Algorithm, LineEnding, PrivateKey};

use crate::session::{write_private, SessionPaths};

/// Load the client keypair, generating it on first use.
///
/// Returns the public key in OpenSSH format.
pub fn load_or_generate(paths: &SessionPaths) -> Result<String> {
    let private_path = paths.private_key();

    let key = if private_path.exists() {
        PrivateKey::read_openssh_file(&private_path)
            .with_context(|| format!("Failed to read {}", private_path.display()))?
    } else {
        let key = PrivateKey::random(&mut OsRng, Algorithm::Ed25519)
            .context("Failed to generate client key")?;
        let pem = key
            .to_openssh(LineEnding::LF)
            .context("Failed to encode client key")?;
        write_private(&private_path, pem.as_bytes())?;
        tracing::info!(path = %private_path.display(), "generated client key");
        key
    };

    let public = key
        .public_key()
        .to_openssh()
        .context("Failed to encode public key")?;

    let public_path = paths.public_key();
    if !public_path.exists() {
        std::fs::write(&public_path, format!("{public}\n"))
            .with_context(|| format!("Failed to write {}", public_path.display()))?;
    }

    Ok(public)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssh_key::PublicKey;
    use tempfile::TempDir;

    #[test]
    fn test_generated_once() {
        let dir = TempDir::new().unwrap();
        let paths = SessionPaths::new(dir.path().join(".lkp"));

        let first = load_or_generate(&paths).unwrap();
        let second = load_or_generate(&paths).unwrap();
        assert_eq!(first, second);

        let public = PublicKey::from_openssh(&first).unwrap();
        assert_eq!(public.algorithm(), Algorithm::Ed25519);
        assert!(paths.public_key().exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_private_key_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let paths = SessionPaths::new(dir.path());
        load_or_generate(&paths).unwrap();

        let mode = std::fs::metadata(paths.private_key())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
