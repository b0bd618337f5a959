//! `lkp token ...`: create and check tokens by hand when debugging a
//! deployment's keys.

use std::path::Path;

use anyhow::{Context, Result};
use lkp_auth::{create_token, decode_voucher, now_secs, validate_token, LocalEnvelope, ValidityWindow};
use lkp_core::token::{Token, TokenParams};

use super::ClientContext;
use crate::client::{CertificateClient, ClientError};
use crate::config::AuthorityArgs;
use crate::utils::format_timestamp_secs;

/// Claims to bind into a hand-made token.
#[derive(Debug, Default)]
pub struct CreateArgs {
    pub remote_instance_arn: Option<String>,
    pub host_instance_arn: Option<String>,
    pub ssh_username: Option<String>,
    pub principals: Vec<String>,
}

/// Print a token for the caller as JSON.
pub fn create(ctx: &ClientContext, args: &CreateArgs) -> Result<()> {
    let token = build(&ctx.client(), args, now_secs()).context("Failed to create token")?;
    println!("{}", serde_json::to_string_pretty(&token)?);
    Ok(())
}

/// Check a token (JSON) or encoded voucher read from `path`, or stdin.
pub fn validate(args: &AuthorityArgs, path: Option<&Path>) -> Result<()> {
    let text = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => std::io::read_to_string(std::io::stdin()).context("Failed to read stdin")?,
    };

    let envelope = args.envelope()?;
    let window = check(&envelope, &args.key_ref()?, &text, now_secs())?;

    println!(
        "token valid from {} until {}",
        format_timestamp_secs(window.not_before),
        format_timestamp_secs(window.not_after)
    );
    Ok(())
}

fn build(client: &CertificateClient<'_>, args: &CreateArgs, now: i64) -> Result<Token, ClientError> {
    let identity = client.caller.caller_identity()?;

    let mut params = TokenParams::for_identity(&identity, client.to);
    if let Some(arn) = &args.remote_instance_arn {
        params = params.with_remote_instance(arn);
    }
    if let Some(arn) = &args.host_instance_arn {
        params = params.with_host_instance(arn);
    }
    if let Some(username) = &args.ssh_username {
        params = params.with_ssh_username(username);
    }
    params.principals = args.principals.clone();

    Ok(create_token(client.envelope, params, client.key_ref, now)?)
}

/// A token as JSON, or a voucher in its encoded text form.
fn parse_token(text: &str) -> Result<Token> {
    let text = text.trim();
    if text.starts_with('{') {
        return serde_json::from_str(text).context("Failed to parse token");
    }
    Ok(decode_voucher(text)
        .context("Failed to decode voucher")?
        .into_token())
}

fn check(envelope: &LocalEnvelope, key_ref: &str, text: &str, now: i64) -> Result<ValidityWindow> {
    let token = parse_token(text)?;
    let key_id = envelope
        .resolve(key_ref)
        .with_context(|| format!("key {key_ref} is not in the keyring"))?;
    Ok(validate_token(envelope, &token, key_id, now)?)
}
