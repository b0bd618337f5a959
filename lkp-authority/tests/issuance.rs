//! End-to-end certificate issuance.
//!
//! Drives an authority with real tokens and a real CA key, and checks the
//! certificates that come back by parsing them.

mod common;

use common::*;
use lkp_auth::signer::{CERT_TIME_INFINITY, EXT_AGENT_FORWARDING, EXT_X11_FORWARDING, OPT_FORCE_COMMAND};
use lkp_auth::{vouch, SignError};
use lkp_authority::{handle_event, AuthorityError};
use lkp_core::cert::{HostCertResponse, UserCertResponse};
use lkp_core::token::TokenParams;
use ssh_key::certificate::CertType;

// ============================================================================
// User certificates
// ============================================================================

#[test]
fn test_allow_all_signs_for_remote_only() {
    let ca = TestAuthority::new();
    let request = ca.user_request(&user(), "arn:x:1");

    let response = ca.authority().handle_user(&request, NOW + 10).unwrap();

    let cert = ca.parse_cert(&response.signed_public_key);
    assert_eq!(cert.valid_principals(), ["arn:x:1".to_string()]);
    assert_eq!(cert.key_id(), "u-1");
    assert_eq!(cert.cert_type(), CertType::User);
    assert!(response.jumpboxes.is_empty());
    assert_eq!(response.target_address, None);
    assert_eq!(response.expiry, NOW + 10 + 3600);
    assert_eq!(cert.valid_before(), (NOW + 10 + 3600) as u64);
    assert_eq!(ca.policy.request_count(), 0);
}

#[test]
fn test_key_id_includes_display_name() {
    let ca = TestAuthority::new();
    let request = ca.user_request(&named_user(), "arn:x:1");

    let response = ca.authority().handle_user(&request, NOW).unwrap();
    assert_eq!(ca.parse_cert(&response.signed_public_key).key_id(), "alice-u-1");
}

#[test]
fn test_policy_denial_message_surfaces() {
    let ca = TestAuthority::with_policy(r#"{"Authorized": false, "Message": "mfa required"}"#);
    let request = ca.user_request(&user(), "arn:x:1");

    let err = ca.authority().handle_user(&request, NOW).unwrap_err();
    assert!(matches!(&err, AuthorityError::AuthorizationDenied(Some(m)) if m == "mfa required"));
    assert_eq!(err.to_failure().error_message, "mfa required");
    assert_eq!(err.to_failure().error_type, "AuthorizationDenied");
}

#[test]
fn test_policy_sees_requester_and_target() {
    let ca = TestAuthority::with_policy(r#"{"Authorized": true, "Principals": ["ec2-user"]}"#);
    let request = ca.user_request(&named_user(), "arn:x:1");

    let response = ca.authority().handle_user(&request, NOW).unwrap();
    let cert = ca.parse_cert(&response.signed_public_key);
    assert_eq!(cert.valid_principals(), ["ec2-user".to_string()]);

    let requests = ca.policy.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let sent = &requests[0];
    assert_eq!(sent["Kind"], "LkpUserCertAuthorizationRequest");
    assert_eq!(sent["From"]["Id"], "u-1");
    assert_eq!(sent["From"]["Account"], "111");
    assert_eq!(sent["From"]["Name"], "alice");
    assert_eq!(sent["RemoteInstanceArn"], "arn:x:1");
    assert_eq!(sent["SshUsername"], "ec2-user");
}

#[test]
fn test_jumpboxes_get_their_own_certificates() {
    let ca = TestAuthority::with_policy(
        r#"{
            "Authorized": true,
            "Jumpboxes": [
                {"Address": "bastion.example.com", "User": "ops", "HostKeyAlias": "bastion", "Principals": ["ops"]},
                {"Address": "10.0.0.5", "User": "ec2-user"}
            ],
            "TargetAddress": "10.0.1.9"
        }"#,
    );
    let request = ca.user_request(&user(), "arn:x:1");

    let response = ca.authority().handle_user(&request, NOW).unwrap();

    assert_eq!(response.jumpboxes.len(), 2);
    assert_eq!(response.target_address.as_deref(), Some("10.0.1.9"));

    let first = &response.jumpboxes[0];
    assert_eq!(first.host_key_alias, "bastion");
    let cert = ca.parse_cert(&first.signed_public_key);
    assert_eq!(cert.valid_principals(), ["ops".to_string()]);
    assert_eq!(cert.key_id(), "u-1");

    let second = &response.jumpboxes[1];
    assert_eq!(second.host_key_alias, "10.0.0.5");
    let cert = ca.parse_cert(&second.signed_public_key);
    assert_eq!(cert.valid_principals(), ["10.0.0.5".to_string()]);

    // Target principals default to the jumpbox aliases plus the remote.
    let target = ca.parse_cert(&response.signed_public_key);
    assert_eq!(
        target.valid_principals(),
        ["bastion".to_string(), "10.0.0.5".to_string(), "arn:x:1".to_string()]
    );
}

#[test]
fn test_jumpbox_permissions_independent_of_target() {
    let ca = TestAuthority::with_policy(
        r#"{
            "Authorized": true,
            "Principals": ["ec2-user"],
            "CertificateOptions": {"PermitAgentForwarding": false, "ForceCommand": "uptime"},
            "Jumpboxes": [{"Address": "bastion", "Principals": ["ops"]}]
        }"#,
    );
    let request = ca.user_request(&user(), "arn:x:1");

    let response = ca.authority().handle_user(&request, NOW).unwrap();

    let target = ca.parse_cert(&response.signed_public_key);
    assert!(!target.extensions().contains_key(EXT_AGENT_FORWARDING));
    assert!(target.extensions().contains_key(EXT_X11_FORWARDING));
    assert_eq!(
        target.critical_options().get(OPT_FORCE_COMMAND).map(String::as_str),
        Some("uptime")
    );

    let jumpbox = ca.parse_cert(&response.jumpboxes[0].signed_public_key);
    assert!(jumpbox.extensions().contains_key(EXT_AGENT_FORWARDING));
    assert!(jumpbox.critical_options().is_empty());
}

#[test]
fn test_one_failed_jumpbox_fails_the_whole_request() {
    let policy = r#"{
        "Authorized": true,
        "Jumpboxes": [
            {"Address": "bastion", "Principals": ["ops"]},
            {"Address": "10.0.0.5", "Principals": [""]}
        ]
    }"#;
    let ca = TestAuthority::with_policy(policy);
    let request = ca.user_request(&user(), "arn:x:1");

    let result = ca.authority().handle_user(&request, NOW);
    assert!(matches!(
        result,
        Err(AuthorityError::SigningFailure(SignError::EmptyPrincipal))
    ));
    assert_eq!(ca.policy.request_count(), 1);

    // The event path returns only the failure, never the certificates signed so far.
    let event = serde_json::to_vec(&request).unwrap();
    let err = handle_event(&event, &ca.config, ca.services(), NOW).unwrap_err();
    assert_eq!(err.to_failure().error_type, "SigningFailure");
}

#[test]
fn test_vouchers_reach_policy_unvalidated() {
    let ca = TestAuthority::with_policy(r#"{"Authorized": true}"#);

    let manager = named_user();
    let good = vouch(&ca.envelope, &manager, KEY_ALIAS, "LastKeypair", "u-1", "ticket-42", NOW)
        .unwrap();
    // A voucher whose ciphertext is garbage still reaches the policy.
    let mut forged = good.clone();
    forged.0.signature = vec![0u8; 16];

    let params = TokenParams::for_identity(&user(), "LastKeypair")
        .with_remote_instance("arn:x:1")
        .with_vouchers(vec![good, forged]);
    let request = ca.request_for(params, KEY_ALIAS, false);

    ca.authority().handle_user(&request, NOW).unwrap();

    let requests = ca.policy.requests.lock().unwrap();
    let vouchers = requests[0]["Vouchers"].as_array().unwrap();
    assert_eq!(vouchers.len(), 2);
    assert_eq!(vouchers[0]["Name"], "alice");
    assert_eq!(vouchers[0]["Vouchee"], "u-1");
    assert_eq!(vouchers[0]["Context"], "ticket-42");
}

#[test]
fn test_policy_failure_is_transport_error() {
    let ca = TestAuthority::with_policy("not json");
    let request = ca.user_request(&user(), "arn:x:1");

    let err = ca.authority().handle_user(&request, NOW).unwrap_err();
    assert!(matches!(err, AuthorityError::TransportFailure(_)));
}

// ============================================================================
// Token rejection
// ============================================================================

#[test]
fn test_tampered_params_rejected() {
    let ca = TestAuthority::new();
    let mut request = ca.user_request(&user(), "arn:x:1");
    request.token.params.remote_instance_arn = Some("arn:x:2".into());

    let err = ca.authority().handle_user(&request, NOW).unwrap_err();
    assert!(matches!(err, AuthorityError::TokenInvalid));
}

#[test]
fn test_token_under_other_key_rejected() {
    let ca = TestAuthority::new();
    let params = TokenParams::for_identity(&user(), "LastKeypair").with_remote_instance("arn:x:1");
    let request = ca.request_for(params, OTHER_KEY_ID, false);

    let err = ca.authority().handle_user(&request, NOW).unwrap_err();
    assert!(matches!(err, AuthorityError::TokenInvalid));
    // The key id never leaks to the caller.
    assert!(!err.to_failure().error_message.contains("other"));
}

#[test]
fn test_expired_token_rejected() {
    let ca = TestAuthority::new();
    let request = ca.user_request(&user(), "arn:x:1");

    assert!(ca.authority().handle_user(&request, NOW + 3600).is_ok());
    let err = ca.authority().handle_user(&request, NOW + 3601).unwrap_err();
    assert!(matches!(err, AuthorityError::TokenExpired));
}

#[test]
fn test_policy_not_called_for_bad_token() {
    let ca = TestAuthority::with_policy(r#"{"Authorized": true}"#);
    let mut request = ca.user_request(&user(), "arn:x:1");
    request.token.signature[0] ^= 0xff;

    assert!(ca.authority().handle_user(&request, NOW).is_err());
    assert_eq!(ca.policy.request_count(), 0);
}

#[test]
fn test_missing_target_is_invalid_request() {
    let ca = TestAuthority::new();
    let params = TokenParams::for_identity(&user(), "LastKeypair");
    let request = ca.request_for(params, KEY_ALIAS, false);

    let err = ca.authority().handle_user(&request, NOW).unwrap_err();
    assert!(matches!(err, AuthorityError::InvalidRequest(_)));
}

#[test]
fn test_bad_subject_key_fails_signing() {
    let ca = TestAuthority::new();
    let mut request = ca.user_request(&user(), "arn:x:1");
    request.public_key = "ssh-ed25519 not-base64".into();

    let err = ca.authority().handle_user(&request, NOW).unwrap_err();
    assert!(matches!(err, AuthorityError::SigningFailure(_)));
    assert_eq!(err.to_failure().error_message, "malformed public key");
}

// ============================================================================
// Host certificates
// ============================================================================

#[test]
fn test_host_certificate() {
    let ca = TestAuthority::new();
    let request = ca.host_request("arn:h:9");

    let response = ca.authority().handle_host(&request, NOW).unwrap();

    let cert = ca.parse_cert(&response.signed_host_public_key);
    assert_eq!(cert.cert_type(), CertType::Host);
    assert_eq!(cert.valid_principals(), ["arn:h:9".to_string()]);
    assert_eq!(cert.key_id(), "arn:h:9");
    assert_eq!(cert.valid_before(), CERT_TIME_INFINITY);
    assert!(cert.extensions().is_empty());
}

#[test]
fn test_host_denial_honored() {
    let ca = TestAuthority::with_policy(r#"{"Authorized": false}"#);
    let request = ca.host_request("arn:h:9");

    let err = ca.authority().handle_host(&request, NOW).unwrap_err();
    assert!(matches!(err, AuthorityError::AuthorizationDenied(None)));
}

#[test]
fn test_host_policy_principals() {
    let ca = TestAuthority::with_policy(
        r#"{"Authorized": true, "KeyId": "web-1", "Principals": ["web-1.internal", "10.0.0.7"]}"#,
    );
    let request = ca.host_request("arn:h:9");

    let response = ca.authority().handle_host(&request, NOW).unwrap();
    let cert = ca.parse_cert(&response.signed_host_public_key);
    assert_eq!(cert.key_id(), "web-1");
    assert_eq!(
        cert.valid_principals(),
        ["web-1.internal".to_string(), "10.0.0.7".to_string()]
    );

    let requests = ca.policy.requests.lock().unwrap();
    assert_eq!(requests[0]["Kind"], "LkpHostCertAuthorizationRequest");
    assert_eq!(requests[0]["HostInstanceArn"], "arn:h:9");
}

// ============================================================================
// Event dispatch
// ============================================================================

#[test]
fn test_event_round_trip() {
    let ca = TestAuthority::new();

    let user_event = serde_json::to_vec(&ca.user_request(&user(), "arn:x:1")).unwrap();
    let raw = handle_event(&user_event, &ca.config, ca.services(), NOW).unwrap();
    let response: UserCertResponse = serde_json::from_slice(&raw).unwrap();
    ca.parse_cert(&response.signed_public_key);

    let host_event = serde_json::to_vec(&ca.host_request("arn:h:9")).unwrap();
    let raw = handle_event(&host_event, &ca.config, ca.services(), NOW).unwrap();
    let response: HostCertResponse = serde_json::from_slice(&raw).unwrap();
    ca.parse_cert(&response.signed_host_public_key);
}
