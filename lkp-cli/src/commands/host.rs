//! `lkp host`: obtain a host certificate for this machine's SSH host key,
//! and optionally wire sshd up to trust user certificates from the same CA.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use lkp_auth::now_secs;
use ssh_key::PublicKey;

use super::ClientContext;
use crate::session::write_private;

pub struct HostArgs {
    pub host_key_path: PathBuf,
    pub signed_host_key_path: PathBuf,
    pub instance_arn: String,
    /// OpenSSH public key of the CA, installed at `cert_authority_path`.
    pub ca_public_key: Option<PathBuf>,
    pub cert_authority_path: PathBuf,
    pub authorized_principals_path: Option<PathBuf>,
    pub sshd_config_path: Option<PathBuf>,
}

/// The sshd directives written for one host.
struct SshdDirectives<'a> {
    host_certificate: &'a Path,
    trusted_user_ca_keys: Option<&'a Path>,
    authorized_principals: Option<&'a Path>,
}

pub fn run(ctx: &ClientContext, args: &HostArgs) -> Result<()> {
    let host_key = std::fs::read_to_string(&args.host_key_path)
        .with_context(|| format!("Failed to read host key {}", args.host_key_path.display()))?;

    // Checked before the authority is asked, so a bad key wastes no certificate.
    let ca_key = args
        .ca_public_key
        .as_deref()
        .map(read_ca_public_key)
        .transpose()?;

    let response = ctx
        .client()
        .request_host(&args.instance_arn, host_key.trim(), now_secs())
        .context("Failed to obtain host certificate")?;

    write_private(
        &args.signed_host_key_path,
        response.signed_host_public_key.as_bytes(),
    )?;
    tracing::info!(
        path = %args.signed_host_key_path.display(),
        instance_arn = %args.instance_arn,
        "wrote host certificate"
    );

    if let Some(ca_key) = &ca_key {
        install_cert_authority(ca_key, &args.cert_authority_path)?;
    }

    if let Some(path) = &args.authorized_principals_path {
        write_private(path, format!("{}\n", args.instance_arn).as_bytes())?;
    }

    if let Some(path) = &args.sshd_config_path {
        let directives = SshdDirectives {
            host_certificate: &args.signed_host_key_path,
            trusted_user_ca_keys: ca_key.as_ref().map(|_| args.cert_authority_path.as_path()),
            authorized_principals: args.authorized_principals_path.as_deref(),
        };
        append_sshd_config(path, &directives)?;
    }

    println!("{}", args.signed_host_key_path.display());
    Ok(())
}

fn read_ca_public_key(path: &Path) -> Result<PublicKey> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read CA public key {}", path.display()))?;
    PublicKey::from_openssh(text.trim())
        .with_context(|| format!("{} is not an OpenSSH public key", path.display()))
}

/// Write `ca_key` as a one-line `TrustedUserCAKeys` file.
fn install_cert_authority(ca_key: &PublicKey, path: &Path) -> Result<()> {
    let line = ca_key
        .to_openssh()
        .context("Failed to encode CA public key")?;
    write_private(path, format!("{line}\n").as_bytes())?;
    tracing::info!(path = %path.display(), "installed certificate authority");
    Ok(())
}

fn append_sshd_config(path: &Path, directives: &SshdDirectives<'_>) -> Result<()> {
    let mut snippet = format!("\nHostCertificate {}\n", directives.host_certificate.display());
    if let Some(ca) = directives.trusted_user_ca_keys {
        snippet.push_str(&format!("TrustedUserCAKeys {}\n", ca.display()));
    }
    if let Some(principals) = directives.authorized_principals {
        snippet.push_str(&format!("AuthorizedPrincipalsFile {}\n", principals.display()));
    }

    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    file.write_all(snippet.as_bytes())
        .with_context(|| format!("Failed to append to {}", path.display()))?;
    Ok(())
}
