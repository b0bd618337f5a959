//! LastKeypair certificate authority.
//!
//! Validates claim tokens, asks the optional authorization policy, and signs
//! SSH certificates for users, their jumpboxes, and hosts.
//!
//! Configuration is explicit: build an [`AuthorityConfig`] once per
//! invocation and pass it, with the external [`Services`], to
//! [`handle_event`] or an [`Authority`].

pub mod config;
pub mod delegate;
pub mod error;
pub mod handler;
pub mod orchestrator;

pub use config::{AuthorityConfig, FileParameterStore, ParameterStore, SecretSources};
pub use delegate::AuthorizationDelegate;
pub use error::AuthorityError;
pub use handler::handle_event;
pub use orchestrator::{Authority, Services, Stage};
