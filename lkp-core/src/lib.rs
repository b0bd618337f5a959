//! # LastKeypair Core
//!
//! Domain types and wire formats for the LastKeypair SSH certificate
//! authority.
//!
//! ## Design Principles
//!
//! This crate is intentionally **IO-free**:
//! - No filesystem operations
//! - No network calls
//! - No cryptography
//!
//! Everything here is a plain struct or enum with a serde representation.
//! Token creation and validation live in `lkp-auth`; the issuance state
//! machine lives in `lkp-authority`.
//!
//! ## Stability
//!
//! The JSON field names of request, response and policy types are part of
//! the invocation contract with deployed policy functions and clients.
//!
//! ## Modules
//!
//! - [`identity`] - Caller identity and identity kinds
//! - [`token`] - Claim params, tokens and vouchers
//! - [`cert`] - Certificate requests, responses and jumpboxes
//! - [`authz`] - Authorization policy requests and responses

pub mod authz;
pub mod cert;
pub mod identity;
pub mod token;

pub use authz::{
    HostAuthorizationRequest, HostAuthorizationResponse, PolicyIdentity, PolicyVoucher,
    UserAuthorizationRequest, UserAuthorizationResponse,
};
pub use cert::{
    CertificateOptions, CertificateRequest, EventType, FailurePayload, HostCertResponse, Jumpbox,
    UserCertResponse,
};
pub use identity::{Identity, IdentityError, IdentityKind};
pub use token::{Token, TokenParams, VoucherToken};
