//! Token and certificate library for LastKeypair.
//!
//! This crate holds the cryptographic core and nothing else:
//! - No logging
//! - No configuration loading
//! - No filesystem operations
//!
//! External services are injected via traits:
//! - [`EnvelopeService`] - Key-management encrypt/decrypt with binding context
//! - [`FunctionInvoker`] - Request/response function channel
//! - [`CallerIdentityService`] - Who is making the request
//!
//! [`LocalEnvelope`] and [`ProcessInvoker`] are software implementations of
//! the first two, used by local deployments and tests.
//!
//! # Example
//!
//! ```ignore
//! use lkp_auth::{create_token, validate_token, LocalEnvelope};
//!
//! // Client binds its claim under the authority's key
//! let token = create_token(&envelope, params, "alias/LastKeypair", now)?;
//!
//! // Authority re-derives the context and checks the decrypting key
//! validate_token(&envelope, &token, &config.key_id, now)?;
//! ```

pub mod caller;
pub mod context;
pub mod envelope;
pub mod invoke;
pub mod signer;
pub mod token;
pub mod voucher;

pub use caller::{CallerIdentityService, StaticCallerIdentity};
pub use context::BindingContext;
pub use envelope::{Decrypted, EnvelopeError, EnvelopeService, Keyring, LocalEnvelope};
pub use invoke::{invoke_json, FunctionInvoker, InvokeError, InvokeOutput, ProcessInvoker};
pub use signer::{sign_ssh, CaKey, CertKind, CertificateSpec, Permissions, SignError};
pub use token::{
    create_token, now_secs, validate_token, InvalidReason, TokenError, ValidityWindow,
    TOKEN_VALIDITY_SECS,
};
pub use voucher::{decode_voucher, encode_voucher, vouch, VoucherError};
