//! `lkp ssh ...`: commands run by the ssh client itself.
//!
//! A typical `~/.ssh/config` entry:
//!
//! ```text
//! Match exec "lkp ssh match --instance-arn %n"
//!   ProxyCommand lkp ssh proxy --instance-arn %n --port %p
//! ```

use anyhow::{Context, Result};
use lkp_auth::now_secs;

use super::ClientContext;
use crate::bridge::{bridge_stdio, BridgeEnd};
use crate::keys;
use crate::session::{FileSessionStore, LoginParams, ReifiedLogin, SessionPaths};
use crate::utils::format_timestamp_secs;

/// Issue certificates for `login` and write its ssh config.
pub fn match_target(ctx: &ClientContext, paths: &SessionPaths, login: LoginParams) -> Result<()> {
    let public_key = keys::load_or_generate(paths)?;
    let store = FileSessionStore::new(paths.clone());

    let login = ReifiedLogin::new(login)
        .populate_by_invoke(&ctx.client(), &public_key, paths, &store, now_secs())
        .context("Failed to obtain certificate")?;
    let config = login.write_ssh_config(paths)?;

    if let Some(populated) = login.populated() {
        tracing::info!(
            instance_arn = %login.target(),
            expires = %format_timestamp_secs(populated.response.expiry),
            config = %config.display(),
            "certificate issued"
        );
    }
    Ok(())
}

/// Re-render the ssh config from the cached login and print its path.
pub fn config(paths: &SessionPaths, instance_arn: &str) -> Result<()> {
    let store = FileSessionStore::new(paths.clone());
    let login = ReifiedLogin::new(LoginParams::new(instance_arn, ""))
        .populate_by_restore_cache(&store)?;

    let path = login.write_ssh_config(paths)?;
    println!("{}", path.display());
    Ok(())
}

/// Bridge stdin/stdout to the cached target address.
pub async fn proxy(paths: &SessionPaths, instance_arn: &str, port: u16) -> Result<()> {
    let store = FileSessionStore::new(paths.clone());
    let login = ReifiedLogin::new(LoginParams::new(instance_arn, ""))
        .populate_by_restore_cache(&store)?;

    let address = login
        .populated()
        .and_then(|p| p.response.target_address.as_deref())
        .with_context(|| format!("authority returned no target address for {instance_arn}"))?;
    let addr = format!("{address}:{port}");

    match bridge_stdio(&addr)
        .await
        .with_context(|| format!("Failed to connect to {addr}"))?
    {
        BridgeEnd::Remote(Err(e)) | BridgeEnd::Local(Err(e)) => {
            Err(e).context("Connection failed")
        }
        BridgeEnd::Remote(Ok(_)) | BridgeEnd::Local(Ok(_)) => Ok(()),
    }
}
