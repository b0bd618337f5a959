//! ssh client config rendering.
//!
//! Jumpboxes become `jump0`, `jump1`, ... in order, each proxying through the
//! one before it. The final `target` stanza proxies through the last jumpbox.

use std::fmt::Write;

use super::{PopulatedLogin, SessionError, SessionPaths};

/// Render the ssh config for `login`. Pure: same input, same bytes.
///
/// Values containing whitespace are quoted. Values that ssh cannot read back
/// as a single argument (control characters, double quotes) are refused.
pub fn render_ssh_config(
    login: &PopulatedLogin,
    paths: &SessionPaths,
) -> Result<String, SessionError> {
    let target = login.params.instance_arn.as_str();
    let identity_file = paths.private_key().display().to_string();
    let mut out = String::new();

    // OpenSSH before 7.2 does not know CertificateFile.
    out.push_str("IgnoreUnknown CertificateFile\n");

    for (i, jumpbox) in login.response.jumpboxes.iter().enumerate() {
        let _ = write!(out, "\nHost jump{i}\n");
        push_option(&mut out, "HostName", &jumpbox.address)?;
        push_option(&mut out, "HostKeyAlias", &jumpbox.host_key_alias)?;
        push_option(&mut out, "IdentityFile", &identity_file)?;
        push_option(
            &mut out,
            "CertificateFile",
            &paths.jumpbox_certificate(target, i).display().to_string(),
        )?;
        push_option(&mut out, "User", &jumpbox.user)?;
        if i > 0 {
            push_option(&mut out, "ProxyJump", &format!("jump{}", i - 1))?;
        }
    }

    out.push_str("\nHost target\n");
    if let Some(address) = &login.response.target_address {
        push_option(&mut out, "HostName", address)?;
    }
    push_option(&mut out, "HostKeyAlias", target)?;
    push_option(&mut out, "IdentityFile", &identity_file)?;
    push_option(
        &mut out,
        "CertificateFile",
        &paths.certificate(target).display().to_string(),
    )?;
    push_option(&mut out, "User", &login.params.ssh_username)?;
    if let Some(last) = login.response.jumpboxes.len().checked_sub(1) {
        push_option(&mut out, "ProxyJump", &format!("jump{last}"))?;
    }

    Ok(out)
}

fn push_option(out: &mut String, key: &'static str, value: &str) -> Result<(), SessionError> {
    if value.is_empty() {
        return Ok(());
    }
    if value.chars().any(|c| c.is_control() || c == '"') {
        return Err(SessionError::UnsafeConfigValue {
            key,
            value: value.to_string(),
        });
    }

    if value.contains(char::is_whitespace) {
        let _ = writeln!(out, "  {key} \"{value}\"");
    } else {
        let _ = writeln!(out, "  {key} {value}");
    }
    Ok(())
}
