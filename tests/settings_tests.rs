// Settings loading: config directory, environment overrides and manager construction
use std::fs;

use passkey_verify::data::AttestationFormat;
use passkey_verify::settings::{SettingsError, CONFIG_DIR_ENV};
use passkey_verify::testing::{TestAttestation, TestAuthenticator, TestCertificateAuthority, TestFixtures};
use passkey_verify::{VerificationError, VerifierSettings, WebAuthnManagerBuilder};
use serial_test::serial;
use tempfile::TempDir;

const OVERRIDE_VARS: [&str; 9] = [
    "RP_ID",
    "RP_ORIGINS",
    "MAX_CREDENTIAL_ID_LENGTH",
    "USER_VERIFICATION_REQUIRED",
    "MDS_ENDPOINT",
    "MDS_LOCAL_BLOB",
    "MDS_ROOT_CERTIFICATE",
    "RUST_LOG",
    CONFIG_DIR_ENV,
];

fn clean_env_vars() {
    for name in OVERRIDE_VARS {
        std::env::remove_var(name);
    }
}

fn config_dir(settings_toml: &str) -> TempDir {
    let dir = TempDir::new().expect("Should create config dir");
    fs::write(dir.path().join("Settings.toml"), settings_toml).expect("Should write Settings.toml");
    dir
}

#[test]
#[serial]
fn test_config_dir_settings_are_loaded() {
    clean_env_vars();
    let dir = config_dir(
        r#"
        [relying_party]
        rp_id = "example.com"
        origins = ["https://example.com", "android:apk-key-hash:pNiP5iKyQ8JwgGOaKA1zGPUPJIS-0H1xKCQcfIoGLck"]

        [policy]
        user_verification_required = true
        allowed_algorithms = ["ES256"]

        [attestation]
        formats = ["none", "packed"]
        self_attestation_allowed = false
        "#,
    );
    std::env::set_var(CONFIG_DIR_ENV, dir.path());

    let settings = VerifierSettings::load_without_logger().expect("Settings should load");
    assert_eq!(settings.relying_party.rp_id, "example.com");
    assert_eq!(settings.origins().unwrap().len(), 2);
    assert!(settings.policy.user_verification_required);
    assert_eq!(
        settings.formats().unwrap(),
        vec![AttestationFormat::None, AttestationFormat::Packed]
    );
    assert!(!settings.attestation.self_attestation_allowed);
    // Unset sections keep their defaults
    assert_eq!(settings.policy.max_credential_id_length, 1023);
    assert_eq!(settings.logging.level, "info");

    clean_env_vars();
}

#[test]
#[serial]
fn test_env_overrides_win_over_config_dir() {
    clean_env_vars();
    let dir = config_dir(
        r#"
        [relying_party]
        rp_id = "example.com"
        origins = ["https://example.com"]
        "#,
    );
    std::env::set_var(CONFIG_DIR_ENV, dir.path());
    std::env::set_var("RP_ID", "login.example.com");
    std::env::set_var("RP_ORIGINS", "https://login.example.com,,");
    std::env::set_var("MDS_LOCAL_BLOB", "/var/lib/passkey-verify/blob.jwt");
    std::env::set_var("RUST_LOG", "debug");

    let settings = VerifierSettings::load_without_logger().unwrap();
    assert_eq!(settings.relying_party.rp_id, "login.example.com");
    assert_eq!(settings.relying_party.origins, vec!["https://login.example.com".to_string()]);
    assert!(settings.metadata.enabled);
    assert_eq!(
        settings.metadata.local_blob_path.as_deref(),
        Some("/var/lib/passkey-verify/blob.jwt")
    );
    assert_eq!(settings.logging.level, "debug");
    // Metadata enabled from the environment still needs a root certificate
    assert_eq!(settings.validate(), Err(SettingsError::MissingMetadataRoot));

    clean_env_vars();
}

#[test]
#[serial]
fn test_missing_config_dir_file_falls_back_to_defaults() {
    clean_env_vars();
    let dir = TempDir::new().unwrap();
    std::env::set_var(CONFIG_DIR_ENV, dir.path());

    let settings = VerifierSettings::load_without_logger().unwrap();
    assert_eq!(settings.relying_party.rp_id, "localhost");
    assert!(settings.validate().is_ok());

    clean_env_vars();
}

#[test]
#[serial]
fn test_malformed_settings_file_is_an_error() {
    clean_env_vars();
    let dir = config_dir("[relying_party\nrp_id = ");
    std::env::set_var(CONFIG_DIR_ENV, dir.path());

    assert!(VerifierSettings::load_without_logger().is_err());

    clean_env_vars();
}

#[test]
fn test_from_file_ignores_environment() {
    let dir = config_dir(
        r#"
        [policy]
        max_credential_id_length = 64
        "#,
    );
    let settings = VerifierSettings::from_file(&dir.path().join("Settings.toml")).unwrap();
    assert_eq!(settings.policy.max_credential_id_length, 64);
}

#[test]
fn test_settings_drive_manager_policy() {
    let ca = TestCertificateAuthority::root("Settings Anchor").unwrap();
    let dir = TempDir::new().unwrap();
    let anchor_path = dir.path().join("anchor.pem");
    fs::write(&anchor_path, ca.certificate.to_pem().unwrap()).unwrap();

    let mut settings = VerifierSettings::default();
    settings.attestation.trust_anchor_paths = vec![anchor_path.display().to_string()];
    settings.attestation.self_attestation_allowed = false;
    settings.policy.max_credential_id_length = 16;
    let manager = WebAuthnManagerBuilder::from_settings(&settings).unwrap().build();
    let defaults = manager.defaults().unwrap().clone();
    let parameters = defaults.registration_parameters(TestFixtures::challenge());

    // Attestation chains to the configured anchor
    let authenticator = TestAuthenticator::new()
        .unwrap()
        .with_credential_id(vec![7; 16]);
    let request = authenticator
        .register(&TestFixtures::challenge(), TestAttestation::Packed(&ca))
        .unwrap();
    assert!(manager.verify_registration_request(&request, &parameters).is_ok());

    // Self attestation disabled
    let request = authenticator
        .register(&TestFixtures::challenge(), TestAttestation::SelfAttestation)
        .unwrap();
    assert!(matches!(
        manager.verify_registration_request(&request, &parameters),
        Err(VerificationError::SelfAttestationProhibited(_))
    ));

    // Credential id limit from settings
    let long_id = authenticator.with_credential_id(vec![7; 17]);
    let request = long_id
        .register(&TestFixtures::challenge(), TestAttestation::None)
        .unwrap();
    assert_eq!(
        manager.verify_registration_request(&request, &parameters),
        Err(VerificationError::CredentialIdTooLong { length: 17, max: 16 })
    );
}

#[test]
fn test_settings_revocation_uses_configured_crls() {
    let ca = TestCertificateAuthority::root("Settings CRL Root").unwrap();
    let dir = TempDir::new().unwrap();
    let anchor_path = dir.path().join("anchor.pem");
    let crl_path = dir.path().join("ca.crl");
    fs::write(&anchor_path, ca.certificate.to_pem().unwrap()).unwrap();
    fs::write(&crl_path, ca.crl(&[]).unwrap().to_der().unwrap()).unwrap();

    let mut settings = VerifierSettings::default();
    settings.attestation.trust_anchor_paths = vec![anchor_path.display().to_string()];
    settings.attestation.revocation_check = true;
    let request = TestAuthenticator::new()
        .unwrap()
        .register(&TestFixtures::challenge(), TestAttestation::Packed(&ca))
        .unwrap();
    let parameters = TestFixtures::registration_parameters();

    let without_crls = WebAuthnManagerBuilder::from_settings(&settings).unwrap().build();
    assert_eq!(
        without_crls.verify_registration_request(&request, &parameters).map(|v| v.attestation_type),
        Err(VerificationError::CertPath("revocation status unknown".into()))
    );

    settings.attestation.crl_paths = vec![crl_path.display().to_string()];
    let with_crls = WebAuthnManagerBuilder::from_settings(&settings).unwrap().build();
    assert!(with_crls.verify_registration_request(&request, &parameters).is_ok());

    settings.attestation.crl_paths = vec![anchor_path.display().to_string()];
    assert!(matches!(
        WebAuthnManagerBuilder::from_settings(&settings),
        Err(SettingsError::Unreadable { .. })
    ));
}

#[test]
fn test_unreadable_anchor_is_reported() {
    let mut settings = VerifierSettings::default();
    settings.attestation.trust_anchor_paths = vec!["/nonexistent/anchor.pem".into()];

    assert!(matches!(
        WebAuthnManagerBuilder::from_settings(&settings),
        Err(SettingsError::Unreadable { .. })
    ));
}
