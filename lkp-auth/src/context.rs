//! Binding context derivation.
//!
//! The binding context is the set of plaintext attributes the envelope
//! service authenticates alongside a token's ciphertext. It is derived purely
//! from [`TokenParams`], so creator and validator compute the same pairs
//! independently.

use lkp_core::token::{non_empty, TokenParams};

/// Ordered `(key, value)` pairs bound into a token's envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingContext(Vec<(String, String)>);

impl BindingContext {
    /// An empty context, used for envelope payloads that are not tokens.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Derive the context for `params`.
    ///
    /// Order: the four required fields, then each non-empty optional field,
    /// then each voucher's fields under a `voucher-<i>-` prefix, then
    /// `principal-<i>` for each requested principal. Voucher entries cover the
    /// voucher's own claim fields only, not its nested vouchers or principals.
    pub fn from_params(params: &TokenParams) -> Self {
        let mut pairs = Vec::new();
        push_claim_fields(&mut pairs, "", params);

        for (i, voucher) in params.vouchers.iter().enumerate() {
            push_claim_fields(&mut pairs, &format!("voucher-{i}-"), voucher.params());
        }

        for (i, principal) in params.principals.iter().enumerate() {
            pairs.push((format!("principal-{i}"), principal.clone()));
        }

        Self(pairs)
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Order-independent byte encoding, for use as AEAD associated data.
    ///
    /// Pairs are sorted by key and each key and value is length-prefixed
    /// (u32 BE), so no two distinct contexts share an encoding.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut sorted: Vec<&(String, String)> = self.0.iter().collect();
        sorted.sort();

        let mut out = Vec::new();
        for (key, value) in sorted {
            for part in [key.as_bytes(), value.as_bytes()] {
                out.extend_from_slice(&(part.len() as u32).to_be_bytes());
                out.extend_from_slice(part);
            }
        }
        out
    }
}

fn push_claim_fields(pairs: &mut Vec<(String, String)>, prefix: &str, params: &TokenParams) {
    let mut push = |key: &str, value: &str| pairs.push((format!("{prefix}{key}"), value.to_string()));

    push("fromId", &params.from_id);
    push("fromAccount", &params.from_account);
    push("to", &params.to);
    push("type", params.kind.as_str());

    let optional = [
        ("fromName", &params.from_name),
        ("hostInstanceArn", &params.host_instance_arn),
        ("remoteInstanceArn", &params.remote_instance_arn),
        ("sshUsername", &params.ssh_username),
        ("vouchee", &params.vouchee),
        ("context", &params.context),
    ];
    for (key, value) in optional {
        if let Some(value) = non_empty(value) {
            push(key, value);
        }
    }
}
