// Metadata BLOB caching, loading and trust anchor tests
use std::io::Write;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use passkey_verify::data::AttestationType;
use passkey_verify::error::MetadataError;
use passkey_verify::metadata::{
    CacheState, CachingMetadataBlobProvider, Clock, LocalFileBlobProvider, MetadataBlob,
    MetadataBlobPayload, MetadataBlobProvider, MetadataBlobTrustAnchorRepository, MetadataEntry,
    MetadataPolicy, MetadataTrustAnchorRepository,
};
use passkey_verify::testing::metadata::{blob_payload, entry_json, sign_blob, MetadataSigner};
use passkey_verify::testing::{
    MockBlobProvider, TestAttestation, TestAuthenticator, TestCertificateAuthority, TestFixtures,
};
use passkey_verify::{VerificationError, VerifierSettings, WebAuthnManager, WebAuthnManagerBuilder};
use tempfile::NamedTempFile;

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

fn fixed_clock(today: NaiveDate) -> (Clock, Arc<AtomicI64>) {
    let offset = Arc::new(AtomicI64::new(0));
    let days = Arc::clone(&offset);
    let clock: Clock = Arc::new(move || today + chrono::Duration::days(days.load(Ordering::SeqCst)));
    (clock, offset)
}

fn vendor_entry(vendor: &TestCertificateAuthority, status: &str) -> MetadataEntry {
    let json = entry_json(TestFixtures::aaguid(), &vendor.certificate, status).unwrap();
    serde_json::from_value(json).expect("Entry JSON should deserialize")
}

fn write_temp(contents: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Should create temp file");
    file.write_all(contents).expect("Should write temp file");
    file
}

#[tokio::test]
async fn test_concurrent_callers_share_one_refresh() {
    let mock = Arc::new(MockBlobProvider::gated(date(2030, 1, 1)));
    let cache = CachingMetadataBlobProvider::new(mock.clone());

    let callers = futures::future::join_all((0..8).map(|_| cache.provide()));
    let (results, ()) = tokio::join!(callers, async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(cache.state(), CacheState::Refreshing);
        mock.release();
    });

    let blobs: Vec<_> = results.into_iter().map(Result::unwrap).collect();
    assert_eq!(mock.fetch_count(), 1);
    assert!(blobs.iter().all(|blob| Arc::ptr_eq(blob, &blobs[0])));
    assert_eq!(cache.state(), CacheState::Cached);
}

#[tokio::test]
async fn test_failed_refresh_is_not_cached() {
    let mock = Arc::new(MockBlobProvider::new(date(2030, 1, 1)));
    mock.fail_next(MetadataError::FetchFailed("connection reset".into()));
    let cache = CachingMetadataBlobProvider::new(mock.clone());

    assert_eq!(
        cache.provide().await,
        Err(MetadataError::FetchFailed("connection reset".into()))
    );
    assert_eq!(cache.state(), CacheState::Empty);

    let blob = cache.provide().await.unwrap();
    assert_eq!(blob.serial(), 2);
    assert_eq!(mock.fetch_count(), 2);
}

#[tokio::test]
async fn test_concurrent_callers_share_one_failure() {
    let mock = Arc::new(MockBlobProvider::gated(date(2030, 1, 1)));
    mock.fail_next(MetadataError::FetchFailed("bad gateway".into()));
    let cache = CachingMetadataBlobProvider::new(mock.clone());

    let callers = futures::future::join_all((0..5).map(|_| cache.provide()));
    let (results, ()) = tokio::join!(callers, async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(cache.state(), CacheState::Refreshing);
        mock.release();
    });

    assert!(results
        .iter()
        .all(|result| result == &Err(MetadataError::FetchFailed("bad gateway".into()))));
    assert_eq!(mock.fetch_count(), 1);
    assert_eq!(cache.state(), CacheState::Empty);

    // The next caller starts a new refresh
    mock.release();
    let blob = cache.provide().await.unwrap();
    assert_eq!(blob.serial(), 2);
    assert_eq!(mock.fetch_count(), 2);
}

#[tokio::test]
async fn test_stale_blob_is_replaced_after_next_update() {
    let mock = Arc::new(MockBlobProvider::new(date(2026, 11, 1)));
    let (clock, offset) = fixed_clock(date(2026, 10, 30));
    let cache = CachingMetadataBlobProvider::with_clock(mock.clone(), clock);

    assert_eq!(cache.provide().await.unwrap().serial(), 1);
    offset.store(1, Ordering::SeqCst);
    assert_eq!(cache.provide().await.unwrap().serial(), 1);

    // nextUpdate reached
    offset.store(2, Ordering::SeqCst);
    assert_eq!(cache.state(), CacheState::Stale);
    assert_eq!(cache.provide().await.unwrap().serial(), 2);
    assert_eq!(mock.fetch_count(), 2);
}

#[tokio::test]
async fn test_stale_blob_survives_failed_refresh() {
    let mock = Arc::new(MockBlobProvider::new(date(2026, 11, 1)));
    let (clock, offset) = fixed_clock(date(2026, 10, 31));
    let cache = CachingMetadataBlobProvider::with_clock(mock.clone(), clock);
    let first = cache.provide().await.unwrap();

    offset.store(5, Ordering::SeqCst);
    mock.fail_next(MetadataError::FetchFailed("service unavailable".into()));
    assert!(cache.provide().await.is_err());

    let kept = cache.cached().expect("Previous BLOB should be kept");
    assert!(Arc::ptr_eq(&kept, &first));
}

#[tokio::test]
async fn test_local_blob_provider() {
    let signer = MetadataSigner::new().unwrap();
    let vendor = TestCertificateAuthority::root("Vendor Root").unwrap();
    let payload = blob_payload(
        12,
        date(2030, 1, 1),
        &[entry_json(TestFixtures::aaguid(), &vendor.certificate, "FIDO_CERTIFIED").unwrap()],
    );
    let file = write_temp(sign_blob(&signer, &payload).unwrap().as_bytes());

    let provider = LocalFileBlobProvider::new(file.path(), vec![signer.root.certificate.clone()]);
    let blob = provider.fetch().await.unwrap();
    assert_eq!(blob.serial(), 12);
    assert!(blob.find_by_aaguid(&TestFixtures::aaguid()).is_some());

    let other_root = TestCertificateAuthority::root("Unrelated Root").unwrap();
    let untrusted = LocalFileBlobProvider::new(file.path(), vec![other_root.certificate.clone()]);
    assert!(matches!(
        untrusted.fetch().await,
        Err(MetadataError::UntrustedSigner(_))
    ));

    let missing = LocalFileBlobProvider::new("/nonexistent/blob.jwt", vec![]);
    assert!(matches!(missing.fetch().await, Err(MetadataError::FetchFailed(_))));
}

#[tokio::test]
async fn test_async_manager_trusts_metadata_anchors() {
    let vendor = TestCertificateAuthority::root("Certified Vendor").unwrap();
    let mock = Arc::new(
        MockBlobProvider::new(date(2030, 1, 1)).with_entries(vec![vendor_entry(&vendor, "FIDO_CERTIFIED")]),
    );
    let repository = MetadataTrustAnchorRepository::new(
        CachingMetadataBlobProvider::new(mock.clone()),
        MetadataPolicy::default(),
    );
    let manager = WebAuthnManager::builder()
        .metadata_repository(Arc::new(repository))
        .build_async();

    let authenticator = TestAuthenticator::new().unwrap();
    let parameters = TestFixtures::registration_parameters();
    for _ in 0..3 {
        let request = authenticator
            .register(&TestFixtures::challenge(), TestAttestation::Packed(&vendor))
            .unwrap();
        let verified = manager
            .verify_registration_request(&request, &parameters)
            .await
            .unwrap();
        assert_eq!(verified.attestation_type, AttestationType::Basic);
    }
    assert_eq!(mock.fetch_count(), 1);

    // Another vendor's certificate does not chain to the listed root
    let rogue = TestCertificateAuthority::root("Rogue Vendor").unwrap();
    let request = authenticator
        .register(&TestFixtures::challenge(), TestAttestation::Packed(&rogue))
        .unwrap();
    assert!(matches!(
        manager.verify_registration_request(&request, &parameters).await,
        Err(VerificationError::CertPath(_))
    ));
}

#[tokio::test]
async fn test_metadata_failure_fails_registration() {
    let mock = Arc::new(MockBlobProvider::new(date(2030, 1, 1)));
    mock.fail_next(MetadataError::FetchFailed("timeout".into()));
    let manager = WebAuthnManager::builder()
        .metadata_repository(Arc::new(MetadataTrustAnchorRepository::new(
            CachingMetadataBlobProvider::new(mock),
            MetadataPolicy::default(),
        )))
        .build_async();

    let ca = TestCertificateAuthority::root("Any Vendor").unwrap();
    let request = TestAuthenticator::new()
        .unwrap()
        .register(&TestFixtures::challenge(), TestAttestation::Packed(&ca))
        .unwrap();
    assert_eq!(
        manager
            .verify_registration_request(&request, &TestFixtures::registration_parameters())
            .await,
        Err(VerificationError::Metadata(MetadataError::FetchFailed(
            "timeout".into()
        )))
    );
}

#[test]
fn test_status_reports_gate_trust() {
    let vendor = TestCertificateAuthority::root("Status Vendor").unwrap();
    let authenticator = TestAuthenticator::new().unwrap();
    let request = authenticator
        .register(&TestFixtures::challenge(), TestAttestation::Packed(&vendor))
        .unwrap();
    let parameters = TestFixtures::registration_parameters();

    let verify = |status: &str, policy: MetadataPolicy| {
        let blob = MetadataBlob::from_payload(MetadataBlobPayload {
            legal_header: None,
            no: 1,
            next_update: date(2030, 1, 1),
            entries: vec![vendor_entry(&vendor, status)],
        });
        WebAuthnManager::builder()
            .trust_anchor_repository(Arc::new(MetadataBlobTrustAnchorRepository::new(
                Arc::new(blob),
                policy,
            )))
            .build()
            .verify_registration_request(&request, &parameters)
            .map(|verified| verified.attestation_type)
    };

    assert_eq!(
        verify("FIDO_CERTIFIED_L1", MetadataPolicy::default()),
        Ok(AttestationType::Basic)
    );
    assert!(matches!(
        verify("ATTESTATION_KEY_COMPROMISE", MetadataPolicy::default()),
        Err(VerificationError::TrustAnchorNotFound(_))
    ));
    assert!(matches!(
        verify("NOT_FIDO_CERTIFIED", MetadataPolicy::default()),
        Err(VerificationError::TrustAnchorNotFound(_))
    ));
    assert_eq!(
        verify(
            "NOT_FIDO_CERTIFIED",
            MetadataPolicy {
                not_fido_certified_allowed: true,
                ..MetadataPolicy::default()
            }
        ),
        Ok(AttestationType::Basic)
    );
}

#[tokio::test]
async fn test_manager_from_settings_with_local_metadata() {
    let signer = MetadataSigner::new().unwrap();
    let vendor = TestCertificateAuthority::root("Settings Vendor").unwrap();
    let payload = blob_payload(
        3,
        date(2030, 1, 1),
        &[entry_json(TestFixtures::aaguid(), &vendor.certificate, "FIDO_CERTIFIED").unwrap()],
    );
    let blob_file = write_temp(sign_blob(&signer, &payload).unwrap().as_bytes());
    let root_file = write_temp(&signer.root.certificate.to_pem().unwrap());

    let mut settings = VerifierSettings::default();
    settings.metadata.enabled = true;
    settings.metadata.local_blob_path = Some(blob_file.path().display().to_string());
    settings.metadata.root_certificate_path = Some(root_file.path().display().to_string());
    let manager = WebAuthnManagerBuilder::from_settings(&settings)
        .expect("Settings should build a manager")
        .build_async();

    let defaults = manager.defaults().expect("Settings carry ceremony defaults").clone();
    let request = TestAuthenticator::new()
        .unwrap()
        .register(&TestFixtures::challenge(), TestAttestation::Packed(&vendor))
        .unwrap();
    let verified = manager
        .verify_registration_request(
            &request,
            &defaults.registration_parameters(TestFixtures::challenge()),
        )
        .await
        .unwrap();
    assert_eq!(verified.attestation_type, AttestationType::Basic);
}
