// Authentication ceremony tests: assertions from the software authenticator
use std::sync::Arc;

use passkey_verify::data::{AttestationType, AuthenticatorFlags};
use passkey_verify::testing::constants::TEST_USER_HANDLE;
use passkey_verify::testing::{TestAttestation, TestAuthenticator, TestFixtures};
use passkey_verify::verifier::{AuthenticationObject, ExtensionPolicy, MaliciousCounterPolicy};
use passkey_verify::{
    AuthenticationParameters, AuthenticationRequest, CredentialRecord, VerificationError,
    WebAuthnManager,
};

/// Register `authenticator` and return the record the RP would persist
fn registered(authenticator: &TestAuthenticator) -> CredentialRecord {
    let request = authenticator
        .register(&TestFixtures::challenge(), TestAttestation::None)
        .expect("Should produce a registration response");
    WebAuthnManager::non_strict()
        .verify_registration_request(&request, &TestFixtures::registration_parameters())
        .expect("Registration should verify")
        .credential_record()
        .expect("Verified registration has a credential record")
}

fn assertion(authenticator: &TestAuthenticator) -> AuthenticationRequest {
    authenticator
        .authenticate(&TestFixtures::challenge())
        .expect("Should produce an assertion")
}

fn verify_counter(
    manager: &WebAuthnManager,
    stored: u32,
    presented: u32,
) -> Result<(), VerificationError> {
    let authenticator = TestAuthenticator::new().unwrap();
    let mut record = registered(&authenticator);
    record.sign_count = stored;
    let request = assertion(&authenticator.with_sign_count(presented));
    manager
        .verify_authentication_request(&request, &TestFixtures::authentication_parameters(record))
        .map(|_| ())
}

#[test]
fn test_assertion_verifies() {
    let authenticator = TestAuthenticator::new().unwrap();
    let record = registered(&authenticator);
    let request = assertion(&authenticator.clone().with_sign_count(1));

    let data = WebAuthnManager::non_strict()
        .verify_authentication_request(&request, &TestFixtures::authentication_parameters(record))
        .unwrap();
    assert_eq!(data.credential_id, authenticator.credential_id);
    assert_eq!(data.authenticator_data.sign_count, 1);
    assert_eq!(data.user_handle.as_deref(), Some(TEST_USER_HANDLE));
}

#[test]
fn test_ed25519_assertion_from_json() {
    let authenticator = TestAuthenticator::ed25519().unwrap();
    let record = registered(&authenticator);
    let request = assertion(&authenticator);
    let parsed = AuthenticationRequest::from_json(&authenticator.authentication_json(&request)).unwrap();

    assert!(WebAuthnManager::non_strict()
        .verify_authentication_request(&parsed, &TestFixtures::authentication_parameters(record))
        .is_ok());
}

#[test]
fn test_sign_counter_sequences() {
    let manager = WebAuthnManager::non_strict();

    // Authenticators without a counter always report zero
    assert!(verify_counter(&manager, 0, 0).is_ok());
    assert!(verify_counter(&manager, 5, 7).is_ok());
    assert_eq!(
        verify_counter(&manager, 7, 5),
        Err(VerificationError::MaliciousCounterValue {
            stored: 7,
            presented: 5
        })
    );
    assert_eq!(
        verify_counter(&manager, 7, 7),
        Err(VerificationError::MaliciousCounterValue {
            stored: 7,
            presented: 7
        })
    );
}

#[test]
fn test_ignored_counter_regression() {
    let manager = WebAuthnManager::builder()
        .counter_policy(MaliciousCounterPolicy::Ignore)
        .build();
    assert!(verify_counter(&manager, 7, 5).is_ok());
}

#[test]
fn test_allow_credentials() {
    let authenticator = TestAuthenticator::new().unwrap();
    let record = registered(&authenticator);
    let request = assertion(&authenticator);
    let manager = WebAuthnManager::non_strict();

    let mut parameters = TestFixtures::authentication_parameters(record);
    parameters.allow_credentials = Some(vec![vec![1, 2, 3], authenticator.credential_id.clone()]);
    assert!(manager.verify_authentication_request(&request, &parameters).is_ok());

    parameters.allow_credentials = Some(vec![vec![1, 2, 3]]);
    assert_eq!(
        manager.verify_authentication_request(&request, &parameters),
        Err(VerificationError::NotAllowedCredentialId)
    );
}

#[test]
fn test_backup_eligibility_must_not_change() {
    let authenticator = TestAuthenticator::new().unwrap();
    let record = registered(&authenticator);
    assert_eq!(record.backup_eligible, Some(false));

    let synced = authenticator.with_flags(
        AuthenticatorFlags::USER_PRESENT
            | AuthenticatorFlags::BACKUP_ELIGIBLE
            | AuthenticatorFlags::BACKUP_STATE,
    );
    let request = assertion(&synced);
    assert_eq!(
        WebAuthnManager::non_strict()
            .verify_authentication_request(&request, &TestFixtures::authentication_parameters(record)),
        Err(VerificationError::BadBackupEligibleFlag {
            stored: false,
            presented: true
        })
    );
}

#[test]
fn test_tampered_signature() {
    let authenticator = TestAuthenticator::new().unwrap();
    let record = registered(&authenticator);
    let mut request = assertion(&authenticator);
    request.authenticator_data[32] ^= AuthenticatorFlags::USER_VERIFIED;

    let result = WebAuthnManager::non_strict()
        .verify_authentication_request(&request, &TestFixtures::authentication_parameters(record));
    assert!(matches!(result, Err(VerificationError::BadSignature(_))), "got {result:?}");
}

#[test]
fn test_assertion_from_other_credential() {
    let registered_authenticator = TestAuthenticator::new().unwrap();
    let record = registered(&registered_authenticator);
    let impostor = TestAuthenticator::new()
        .unwrap()
        .with_credential_id(registered_authenticator.credential_id.clone());
    let request = assertion(&impostor);

    assert!(matches!(
        WebAuthnManager::non_strict()
            .verify_authentication_request(&request, &TestFixtures::authentication_parameters(record)),
        Err(VerificationError::BadSignature(_))
    ));
}

#[test]
fn test_user_verification_required() {
    let authenticator = TestAuthenticator::new().unwrap();
    let record = registered(&authenticator);
    let request = assertion(&authenticator.with_flags(AuthenticatorFlags::USER_PRESENT));

    let mut parameters: AuthenticationParameters = TestFixtures::authentication_parameters(record);
    parameters.user_verification_required = true;
    assert_eq!(
        WebAuthnManager::non_strict().verify_authentication_request(&request, &parameters),
        Err(VerificationError::UserNotVerified)
    );
}

#[test]
fn test_unsolicited_client_extension() {
    let authenticator = TestAuthenticator::new().unwrap();
    let record = registered(&authenticator);
    let mut request = assertion(&authenticator);
    request.client_extensions_json = Some(r#"{"appid":true}"#.to_string());
    let parameters = TestFixtures::authentication_parameters(record);

    assert!(WebAuthnManager::non_strict()
        .verify_authentication_request(&request, &parameters)
        .is_ok());

    let strict = WebAuthnManager::builder()
        .extension_policy(ExtensionPolicy {
            reject_unsolicited: true,
        })
        .build();
    assert_eq!(
        strict.verify_authentication_request(&request, &parameters),
        Err(VerificationError::UnexpectedExtension("appid".into()))
    );

    let mut requested = parameters;
    requested.requested_extensions = Some(vec!["appid".into()]);
    assert!(strict.verify_authentication_request(&request, &requested).is_ok());
}

fn require_user_handle(object: &AuthenticationObject<'_>) -> Result<(), VerificationError> {
    match object.data.user_handle.as_deref() {
        Some(TEST_USER_HANDLE) => Ok(()),
        _ => Err(VerificationError::Custom("user handle does not own the credential".into())),
    }
}

#[test]
fn test_custom_verifier_checks_user_handle() {
    let authenticator = TestAuthenticator::new().unwrap();
    let record = registered(&authenticator);
    let parameters = TestFixtures::authentication_parameters(record);
    let manager = WebAuthnManager::builder()
        .authentication_verifier(Arc::new(require_user_handle))
        .build();

    let request = assertion(&authenticator);
    assert!(manager.verify_authentication_request(&request, &parameters).is_ok());

    let mut request = request;
    request.user_handle = Some(b"someone-else".to_vec());
    assert_eq!(
        manager.verify_authentication_request(&request, &parameters),
        Err(VerificationError::Custom("user handle does not own the credential".into()))
    );
}

#[test]
fn test_stored_attestation_type_is_not_consulted() {
    let authenticator = TestAuthenticator::new().unwrap();
    let mut record = registered(&authenticator);
    record.attestation_type = AttestationType::Basic;

    assert!(WebAuthnManager::non_strict()
        .verify_authentication_request(
            &assertion(&authenticator),
            &TestFixtures::authentication_parameters(record)
        )
        .is_ok());
}

#[tokio::test]
async fn test_async_authentication_matches_sync() {
    let authenticator = TestAuthenticator::new().unwrap();
    let mut record = registered(&authenticator);
    record.sign_count = 9;
    let parameters = TestFixtures::authentication_parameters(record);
    let sync = WebAuthnManager::non_strict();
    let asynchronous = WebAuthnManager::builder().build_async();

    for presented in [0, 4, 10] {
        let request = assertion(&authenticator.clone().with_sign_count(presented));
        assert_eq!(
            asynchronous
                .verify_authentication_request(&request, &parameters)
                .await,
            sync.verify_authentication_request(&request, &parameters)
        );
    }
}
