//! Event dispatch: one JSON event in, one JSON response out.

use lkp_core::cert::{CertificateRequest, EventType};
use serde::Deserialize;

use crate::config::AuthorityConfig;
use crate::error::AuthorityError;
use crate::orchestrator::{Authority, Services};

#[derive(Deserialize)]
struct EventHeader {
    #[serde(rename = "EventType", default)]
    event_type: Option<String>,
}

/// Handle one raw event.
///
/// The event type is read first so that an unknown type is reported as such
/// rather than as a generic parse failure.
pub fn handle_event(
    raw: &[u8],
    config: &AuthorityConfig,
    services: Services<'_>,
    now: i64,
) -> Result<Vec<u8>, AuthorityError> {
    let header: EventHeader = serde_json::from_slice(raw)
        .map_err(|e| AuthorityError::InvalidRequest(format!("event is not a JSON object: {e}")))?;

    let event_type = match header.event_type.as_deref() {
        Some("UserCertReq") => EventType::UserCertReq,
        Some("HostCertReq") => EventType::HostCertReq,
        Some(other) => {
            return Err(AuthorityError::InvalidRequest(format!(
                "unexpected event type {other:?}"
            )))
        }
        None => return Err(AuthorityError::InvalidRequest("missing EventType".into())),
    };

    let request: CertificateRequest = serde_json::from_slice(raw)
        .map_err(|e| AuthorityError::InvalidRequest(format!("malformed request: {e}")))?;

    let authority = Authority::new(config, services);
    let response = match event_type {
        EventType::UserCertReq => serde_json::to_vec(&authority.handle_user(&request, now)?),
        EventType::HostCertReq => serde_json::to_vec(&authority.handle_host(&request, now)?),
    };

    response.map_err(|e| AuthorityError::InvalidRequest(format!("encoding response: {e}")))
}
