//! Voucher creation and text encoding.
//!
//! A voucher is an ordinary token created by one identity with `vouchee`
//! and `context` set and no target. It travels as plain text: JSON, then
//! gzip, then RFC 4648 base32 so it survives shells and chat.

use std::io::{Read, Write};

use data_encoding::BASE32;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use lkp_core::identity::Identity;
use lkp_core::token::{TokenParams, VoucherToken};

use crate::envelope::EnvelopeService;
use crate::token::{create_token, TokenError};

/// Errors creating, encoding or decoding a voucher.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum VoucherError {
    #[error("voucher token: {0}")]
    Token(#[from] TokenError),

    /// Not valid base32.
    #[error("voucher is not valid base32")]
    Encoding,

    /// The payload could not be compressed or decompressed.
    #[error("voucher compression: {0}")]
    Compression(#[from] std::io::Error),

    /// Decompressed, but not a token.
    #[error("voucher payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Create a voucher from `identity` for `vouchee`.
///
/// # Errors
///
/// Returns [`VoucherError::Token`] if the envelope service cannot encrypt.
pub fn vouch(
    envelope: &dyn EnvelopeService,
    identity: &Identity,
    key_ref: &str,
    to: &str,
    vouchee: &str,
    context: &str,
    now: i64,
) -> Result<VoucherToken, VoucherError> {
    let params = TokenParams {
        vouchee: Some(vouchee.to_string()),
        context: Some(context.to_string()),
        ..TokenParams::for_identity(identity, to)
    };
    let token = create_token(envelope, params, key_ref, now)?;
    Ok(VoucherToken(token))
}

/// Encode a voucher for transport as a single text argument.
pub fn encode_voucher(voucher: &VoucherToken) -> Result<String, VoucherError> {
    let json = serde_json::to_vec(voucher)?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    let compressed = encoder.finish()?;

    Ok(BASE32.encode(&compressed))
}

/// Decode a voucher produced by [`encode_voucher`].
///
/// Surrounding whitespace is ignored. The voucher is not validated.
pub fn decode_voucher(encoded: &str) -> Result<VoucherToken, VoucherError> {
    let compressed = BASE32
        .decode(encoded.trim().as_bytes())
        .map_err(|_| VoucherError::Encoding)?;

    let mut json = Vec::new();
    GzDecoder::new(compressed.as_slice()).read_to_end(&mut json)?;

    Ok(serde_json::from_slice(&json)?)
}
