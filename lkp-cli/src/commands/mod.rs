//! CLI commands.

pub mod host;
pub mod sign;
pub mod ssh;
pub mod token;
pub mod vouch;

use anyhow::Result;
use lkp_auth::{LocalEnvelope, ProcessInvoker, StaticCallerIdentity};

use crate::client::CertificateClient;
use crate::config::AuthorityArgs;

/// Services resolved from [`AuthorityArgs`] for one command.
pub struct ClientContext {
    caller: StaticCallerIdentity,
    envelope: LocalEnvelope,
    invoker: ProcessInvoker,
    function: String,
    key_ref: String,
    to: String,
}

impl ClientContext {
    pub fn from_args(args: &AuthorityArgs) -> Result<Self> {
        Ok(Self {
            caller: args.caller.identity_service()?,
            envelope: args.envelope()?,
            invoker: ProcessInvoker,
            function: args.function.clone(),
            key_ref: args.key_ref()?,
            to: args.to.clone(),
        })
    }

    pub fn client(&self) -> CertificateClient<'_> {
        CertificateClient {
            caller: &self.caller,
            envelope: &self.envelope,
            invoker: &self.invoker,
            function: &self.function,
            key_ref: &self.key_ref,
            to: &self.to,
        }
    }
}
