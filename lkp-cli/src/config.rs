//! Client configuration: flags with environment fallbacks.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use lkp_auth::{Keyring, LocalEnvelope, StaticCallerIdentity};
use regex::Regex;

/// Default authority name tokens are addressed to.
pub const DEFAULT_AUTHORITY: &str = "LastKeypair";

/// Settings shared by every command that talks to the authority.
#[derive(Args, Debug, Clone)]
pub struct AuthorityArgs {
    /// Command line that runs the authority function
    #[arg(long, env = "LKP_FUNCTION", default_value = "lkp-authority invoke", global = true)]
    pub function: String,

    /// Key id, alias, or `<account>:<alias-or-key>` shorthand of the token key
    #[arg(long, env = "LKP_KEY_ID", default_value = "alias/LastKeypair", global = true)]
    pub key_id: String,

    /// Region used to expand key shorthand into a full key ARN
    #[arg(long, env = "LKP_REGION", global = true)]
    pub region: Option<String>,

    /// Path to the envelope keyring
    #[arg(long, env = "LKP_KEYRING", global = true)]
    pub keyring: Option<PathBuf>,

    /// Name of the authority tokens are addressed to
    #[arg(long, default_value = DEFAULT_AUTHORITY, global = true)]
    pub to: String,

    #[command(flatten)]
    pub caller: CallerArgs,
}

/// Who the client is, as a caller-identity lookup would report it.
#[derive(Args, Debug, Clone)]
pub struct CallerArgs {
    /// ARN of the calling principal
    #[arg(long, env = "LKP_CALLER_ARN", global = true)]
    pub caller_arn: Option<String>,

    /// Account of the calling principal
    #[arg(long, env = "LKP_ACCOUNT_ID", global = true)]
    pub account_id: Option<String>,

    /// Unique id of the calling principal
    #[arg(long, env = "LKP_PRINCIPAL_ID", global = true)]
    pub principal_id: Option<String>,
}

impl CallerArgs {
    pub fn identity_service(&self) -> Result<StaticCallerIdentity> {
        Ok(StaticCallerIdentity {
            arn: self.caller_arn.clone().context("LKP_CALLER_ARN is not set")?,
            account_id: self.account_id.clone().context("LKP_ACCOUNT_ID is not set")?,
            principal_id: self
                .principal_id
                .clone()
                .context("LKP_PRINCIPAL_ID is not set")?,
        })
    }
}

impl AuthorityArgs {
    /// The token key reference with any shorthand expanded.
    pub fn key_ref(&self) -> Result<String> {
        full_key_ref(self.region.as_deref(), &self.key_id)
    }

    pub fn envelope(&self) -> Result<LocalEnvelope> {
        let path = self.keyring.as_ref().context("LKP_KEYRING is not set")?;
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read keyring {}", path.display()))?;
        let keyring = Keyring::from_toml(&content)
            .with_context(|| format!("Failed to parse keyring {}", path.display()))?;
        LocalEnvelope::from_keyring(&keyring)
            .with_context(|| format!("Failed to load keyring {}", path.display()))
    }
}

/// Expand `<account>:<alias-or-key>` into a full key ARN in `region`.
///
/// Full ARNs and anything that is not shorthand pass through unchanged.
pub fn full_key_ref(region: Option<&str>, input: &str) -> Result<String> {
    if input.starts_with("arn:") {
        return Ok(input.to_string());
    }

    let shorthand = Regex::new(r"^(\d+):(.+)$")?;
    let Some(captures) = shorthand.captures(input) else {
        return Ok(input.to_string());
    };

    let region = region
        .filter(|r| !r.is_empty())
        .context("can't expand key shorthand without a region")?;
    Ok(format!(
        "arn:aws:kms:{region}:{}:{}",
        &captures[1], &captures[2]
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_arn_unchanged() {
        let arn = "arn:aws:kms:us-east-1:123456789012:key/abcd";
        assert_eq!(full_key_ref(None, arn).unwrap(), arn);
    }

    #[test]
    fn test_alias_unchanged() {
        assert_eq!(
            full_key_ref(Some("us-east-1"), "alias/LastKeypair").unwrap(),
            "alias/LastKeypair"
        );
        assert_eq!(
            full_key_ref(None, "local:key/LastKeypair").unwrap(),
            "local:key/LastKeypair"
        );
    }

    #[test]
    fn test_shorthand_expanded() {
        assert_eq!(
            full_key_ref(Some("ap-southeast-2"), "123456789012:alias/LastKeypair").unwrap(),
            "arn:aws:kms:ap-southeast-2:123456789012:alias/LastKeypair"
        );
    }

    #[test]
    fn test_shorthand_needs_region() {
        assert!(full_key_ref(None, "123456789012:key/abcd").is_err());
        assert!(full_key_ref(Some(""), "123456789012:key/abcd").is_err());
    }
}
