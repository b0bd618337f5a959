//! `lkp vouch`: vouch for another identity.

use anyhow::{Context, Result};
use lkp_auth::now_secs;

use super::ClientContext;

/// Print an encoded voucher for `vouchee` on stdout.
pub fn run(ctx: &ClientContext, vouchee: &str, context: &str) -> Result<()> {
    let encoded = ctx
        .client()
        .vouch(vouchee, context, now_secs())
        .context("Failed to create voucher")?;

    tracing::info!(vouchee, context, "created voucher");
    println!("{encoded}");
    Ok(())
}
