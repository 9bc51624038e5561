//! Verification facades
//!
//! [`WebAuthnManager`] runs both ceremonies on the caller's thread;
//! [`WebAuthnAsyncManager`] runs the same steps but may suspend for metadata,
//! CRL downloads and async caller verifiers. Both are assembled with
//! [`WebAuthnManagerBuilder`], directly or from [`VerifierSettings`].

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};
use openssl::x509::X509Crl;
use url::Url;

use crate::codec;
use crate::data::{
    Aaguid, AttestationFormat, AuthenticationData, AuthenticationParameters,
    AuthenticationRequest, Challenge, CoseAlgorithm, CredentialRecord, Origin, RegistrationData,
    RegistrationParameters, RegistrationRequest, ServerProperty, VerifiedRegistration,
};
use crate::error::VerificationError;
use crate::metadata::provider::parse_root_certificates;
use crate::metadata::{
    CachingMetadataBlobProvider, FidoMds3BlobProvider, LocalFileBlobProvider, MetadataBlobProvider,
    MetadataPolicy, MetadataTrustAnchorRepository,
};
use crate::settings::{SettingsError, VerifierSettings};
use crate::verifier::attestation::{AndroidKeyOptions, SafetyNetOptions};
use crate::verifier::trust::revocation::parse_crl;
use crate::verifier::{
    AcceptSelfAttestation, AsyncAttestationVerifier, AsyncAuthenticationVerifier,
    AsyncCustomAuthenticationVerifier, AsyncCustomRegistrationVerifier, AsyncRegistrationVerifier,
    AsyncTrustAnchorRepository, AttestationStatementVerifiers, AttestationVerifier,
    AuthenticationPolicy, AuthenticationVerifier, CertPathVerifier, CustomAuthenticationVerifier,
    CustomRegistrationVerifier, ExtensionPolicy, MaliciousCounterPolicy, OriginPolicy,
    RegistrationPolicy, RegistrationVerifier, RejectSelfAttestation, SelfAttestationPolicy,
    StaticTrustAnchorRepository, TrustAnchor, TrustAnchorRepository,
};

/// Relying party defaults used to build ceremony parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CeremonyDefaults {
    pub rp_id: String,
    pub origins: Vec<Origin>,
    pub allowed_algorithms: Vec<CoseAlgorithm>,
    pub user_presence_required: bool,
    pub user_verification_required: bool,
}

impl CeremonyDefaults {
    #[must_use]
    pub fn server_property(&self, challenge: Challenge) -> ServerProperty {
        ServerProperty::with_origins(self.origins.iter().cloned(), self.rp_id.clone(), challenge)
    }

    #[must_use]
    pub fn registration_parameters(&self, challenge: Challenge) -> RegistrationParameters {
        let mut parameters = RegistrationParameters::new(
            self.server_property(challenge),
            self.allowed_algorithms.clone(),
            self.user_verification_required,
        );
        parameters.user_presence_required = self.user_presence_required;
        parameters
    }

    #[must_use]
    pub fn authentication_parameters(
        &self,
        challenge: Challenge,
        credential_record: CredentialRecord,
    ) -> AuthenticationParameters {
        let mut parameters = AuthenticationParameters::new(
            self.server_property(challenge),
            credential_record,
            self.user_verification_required,
        );
        parameters.user_presence_required = self.user_presence_required;
        parameters
    }
}

/// Static anchors consulted alongside a metadata repository
struct LayeredTrustAnchors {
    fixed: StaticTrustAnchorRepository,
    metadata: Arc<dyn AsyncTrustAnchorRepository>,
}

#[async_trait]
impl AsyncTrustAnchorRepository for LayeredTrustAnchors {
    async fn find_by_aaguid(&self, aaguid: &Aaguid) -> Result<Vec<TrustAnchor>, VerificationError> {
        let mut anchors = TrustAnchorRepository::find_by_aaguid(&self.fixed, aaguid)?;
        anchors.extend(self.metadata.find_by_aaguid(aaguid).await?);
        Ok(anchors)
    }

    async fn find_by_key_identifier(
        &self,
        key_identifier: &[u8],
    ) -> Result<Vec<TrustAnchor>, VerificationError> {
        let mut anchors = TrustAnchorRepository::find_by_key_identifier(&self.fixed, key_identifier)?;
        anchors.extend(self.metadata.find_by_key_identifier(key_identifier).await?);
        Ok(anchors)
    }
}

/// Configures and assembles the managers
#[derive(Clone)]
pub struct WebAuthnManagerBuilder {
    formats: Vec<AttestationFormat>,
    android_key: AndroidKeyOptions,
    safetynet: SafetyNetOptions,
    registration_policy: RegistrationPolicy,
    authentication_policy: AuthenticationPolicy,
    self_attestation: Arc<dyn SelfAttestationPolicy>,
    cert_path: CertPathVerifier,
    trust_anchors: StaticTrustAnchorRepository,
    custom_trust_anchors: Option<Arc<dyn TrustAnchorRepository>>,
    metadata: Option<Arc<dyn AsyncTrustAnchorRepository>>,
    registration_verifiers: Vec<Arc<dyn CustomRegistrationVerifier>>,
    authentication_verifiers: Vec<Arc<dyn CustomAuthenticationVerifier>>,
    async_registration_verifiers: Vec<Arc<dyn AsyncCustomRegistrationVerifier>>,
    async_authentication_verifiers: Vec<Arc<dyn AsyncCustomAuthenticationVerifier>>,
    defaults: Option<CeremonyDefaults>,
}

impl Default for WebAuthnManagerBuilder {
    fn default() -> Self {
        Self {
            formats: AttestationFormat::ALL.to_vec(),
            android_key: AndroidKeyOptions::default(),
            safetynet: SafetyNetOptions::default(),
            registration_policy: RegistrationPolicy::default(),
            authentication_policy: AuthenticationPolicy::default(),
            self_attestation: Arc::new(AcceptSelfAttestation),
            cert_path: CertPathVerifier::new(),
            trust_anchors: StaticTrustAnchorRepository::new(),
            custom_trust_anchors: None,
            metadata: None,
            registration_verifiers: Vec::new(),
            authentication_verifiers: Vec::new(),
            async_registration_verifiers: Vec::new(),
            async_authentication_verifiers: Vec::new(),
            defaults: None,
        }
    }
}

fn unreadable(path: &str, reason: impl ToString) -> SettingsError {
    SettingsError::Unreadable {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

impl WebAuthnManagerBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder configured from validated settings
    ///
    /// Reads the configured trust anchor and metadata root certificate files.
    /// No metadata is fetched until the first async registration needs it.
    ///
    /// # Errors
    /// Any [`VerifierSettings::validate`] failure, or an unreadable certificate.
    pub fn from_settings(settings: &VerifierSettings) -> Result<Self, SettingsError> {
        settings.validate()?;
        let policy = &settings.policy;
        let attestation = &settings.attestation;

        let mut builder = Self::new()
            .attestation_formats(settings.formats()?)
            .max_credential_id_length(policy.max_credential_id_length)
            .extension_policy(ExtensionPolicy {
                reject_unsolicited: policy.reject_unsolicited_extensions,
            })
            .counter_policy(if policy.ignore_malicious_counter {
                MaliciousCounterPolicy::Ignore
            } else {
                MaliciousCounterPolicy::Reject
            })
            .full_chain_prohibited(attestation.full_chain_prohibited)
            .revocation_check(attestation.revocation_check)
            .defaults(CeremonyDefaults {
                rp_id: settings.relying_party.rp_id.clone(),
                origins: settings.origins()?,
                allowed_algorithms: settings.allowed_algorithms()?,
                user_presence_required: policy.user_presence_required,
                user_verification_required: policy.user_verification_required,
            });
        if !attestation.self_attestation_allowed {
            builder = builder.self_attestation_policy(Arc::new(RejectSelfAttestation));
        }

        for path in &attestation.trust_anchor_paths {
            let bytes = std::fs::read(path).map_err(|e| unreadable(path, e))?;
            let anchor = TrustAnchor::from_der_or_pem(&bytes).map_err(|e| unreadable(path, e))?;
            builder.trust_anchors = builder.trust_anchors.with_anchor(anchor.certificate);
        }
        let mut crls = Vec::with_capacity(attestation.crl_paths.len());
        for path in &attestation.crl_paths {
            let bytes = std::fs::read(path).map_err(|e| unreadable(path, e))?;
            crls.push(parse_crl(&bytes).map_err(|e| unreadable(path, e))?);
        }
        if !crls.is_empty() {
            info!("📜 Loaded {} CRL(s) for revocation checks", crls.len());
            builder = builder.crls(crls);
        }

        if settings.metadata.enabled {
            builder = builder.metadata_from_settings(settings)?;
        }
        Ok(builder)
    }

    fn metadata_from_settings(self, settings: &VerifierSettings) -> Result<Self, SettingsError> {
        let metadata = &settings.metadata;
        let root_path = metadata
            .root_certificate_path
            .as_deref()
            .ok_or(SettingsError::MissingMetadataRoot)?;
        let root_bytes = std::fs::read(root_path).map_err(|e| unreadable(root_path, e))?;
        let roots = parse_root_certificates(&root_bytes).map_err(|e| unreadable(root_path, e))?;

        let provider: Arc<dyn MetadataBlobProvider> = match &metadata.local_blob_path {
            Some(path) => {
                info!("📂 Metadata BLOB will be read from {path}");
                Arc::new(LocalFileBlobProvider::new(Path::new(path), roots))
            }
            None => {
                let endpoint = Url::parse(&metadata.blob_endpoint)
                    .map_err(|_| SettingsError::InvalidEndpoint(metadata.blob_endpoint.clone()))?;
                info!("🌐 Metadata BLOB will be downloaded from {endpoint}");
                Arc::new(
                    FidoMds3BlobProvider::new(endpoint, roots)
                        .with_revocation_check(settings.attestation.revocation_check),
                )
            }
        };
        let policy = MetadataPolicy {
            not_fido_certified_allowed: metadata.not_fido_certified_allowed,
            self_assertion_submitted_allowed: metadata.self_assertion_submitted_allowed,
        };
        Ok(self.metadata_repository(Arc::new(MetadataTrustAnchorRepository::new(
            CachingMetadataBlobProvider::new(provider),
            policy,
        ))))
    }

    /// Statement formats in dispatch order; the first match wins
    #[must_use]
    pub fn attestation_formats(mut self, formats: Vec<AttestationFormat>) -> Self {
        self.formats = formats;
        self
    }

    #[must_use]
    pub fn android_key_options(mut self, options: AndroidKeyOptions) -> Self {
        self.android_key = options;
        self
    }

    #[must_use]
    pub fn safetynet_options(mut self, options: SafetyNetOptions) -> Self {
        self.safetynet = options;
        self
    }

    #[must_use]
    pub fn max_credential_id_length(mut self, max: usize) -> Self {
        self.registration_policy.max_credential_id_length = max;
        self
    }

    /// Origin policy for both ceremonies
    #[must_use]
    pub fn origin_policy(mut self, policy: Arc<dyn OriginPolicy>) -> Self {
        self.registration_policy.origin_policy = Arc::clone(&policy);
        self.authentication_policy.origin_policy = policy;
        self
    }

    #[must_use]
    pub fn extension_policy(mut self, policy: ExtensionPolicy) -> Self {
        self.registration_policy.extension_policy = policy;
        self.authentication_policy.extension_policy = policy;
        self
    }

    #[must_use]
    pub fn counter_policy(mut self, policy: MaliciousCounterPolicy) -> Self {
        self.authentication_policy.counter_policy = policy;
        self
    }

    #[must_use]
    pub fn self_attestation_policy(mut self, policy: Arc<dyn SelfAttestationPolicy>) -> Self {
        self.self_attestation = policy;
        self
    }

    #[must_use]
    pub fn full_chain_prohibited(mut self, prohibited: bool) -> Self {
        self.cert_path = self.cert_path.with_full_chain_prohibited(prohibited);
        self
    }

    #[must_use]
    pub fn revocation_check(mut self, enabled: bool) -> Self {
        self.cert_path = self.cert_path.with_revocation_check(enabled);
        self
    }

    /// CRLs available to both managers; the only ones the sync manager sees
    #[must_use]
    pub fn crls(mut self, crls: Vec<X509Crl>) -> Self {
        self.cert_path = self.cert_path.with_crls(crls);
        self
    }

    #[must_use]
    pub fn trust_anchors(mut self, repository: StaticTrustAnchorRepository) -> Self {
        self.trust_anchors = repository;
        self
    }

    /// Replace the static anchors with another synchronous source
    #[must_use]
    pub fn trust_anchor_repository(mut self, repository: Arc<dyn TrustAnchorRepository>) -> Self {
        self.custom_trust_anchors = Some(repository);
        self
    }

    /// Metadata-backed anchors, consulted by the async manager only
    #[must_use]
    pub fn metadata_repository(mut self, repository: Arc<dyn AsyncTrustAnchorRepository>) -> Self {
        self.metadata = Some(repository);
        self
    }

    #[must_use]
    pub fn registration_verifier(mut self, verifier: Arc<dyn CustomRegistrationVerifier>) -> Self {
        self.registration_verifiers.push(verifier);
        self
    }

    #[must_use]
    pub fn authentication_verifier(
        mut self,
        verifier: Arc<dyn CustomAuthenticationVerifier>,
    ) -> Self {
        self.authentication_verifiers.push(verifier);
        self
    }

    /// Runs after every synchronous registration verifier; async manager only
    #[must_use]
    pub fn async_registration_verifier(
        mut self,
        verifier: Arc<dyn AsyncCustomRegistrationVerifier>,
    ) -> Self {
        self.async_registration_verifiers.push(verifier);
        self
    }

    #[must_use]
    pub fn async_authentication_verifier(
        mut self,
        verifier: Arc<dyn AsyncCustomAuthenticationVerifier>,
    ) -> Self {
        self.async_authentication_verifiers.push(verifier);
        self
    }

    #[must_use]
    pub fn defaults(mut self, defaults: CeremonyDefaults) -> Self {
        self.defaults = Some(defaults);
        self
    }

    fn statements(&self) -> AttestationStatementVerifiers {
        AttestationStatementVerifiers::new(self.formats.clone())
            .with_android_key_options(self.android_key)
            .with_safetynet_options(self.safetynet)
    }

    fn sync_trust_anchors(&self) -> Arc<dyn TrustAnchorRepository> {
        match &self.custom_trust_anchors {
            Some(repository) => Arc::clone(repository),
            None => Arc::new(self.trust_anchors.clone()),
        }
    }

    #[must_use]
    pub fn build(self) -> WebAuthnManager {
        if self.metadata.is_some() {
            warn!("⚠️ Metadata trust anchors are only consulted by the async manager");
        }
        if !self.async_registration_verifiers.is_empty()
            || !self.async_authentication_verifiers.is_empty()
        {
            warn!("⚠️ Async custom verifiers are only run by the async manager");
        }
        let attestation = AttestationVerifier::new(self.statements(), self.sync_trust_anchors())
            .with_self_attestation_policy(Arc::clone(&self.self_attestation))
            .with_cert_path_verifier(self.cert_path.clone());

        WebAuthnManager {
            registration: RegistrationVerifier::new(
                self.registration_policy,
                attestation,
                self.registration_verifiers,
            ),
            authentication: AuthenticationVerifier::new(
                self.authentication_policy,
                self.authentication_verifiers,
            ),
            defaults: self.defaults,
        }
    }

    #[must_use]
    pub fn build_async(self) -> WebAuthnAsyncManager {
        let trust_anchors: Arc<dyn AsyncTrustAnchorRepository> =
            match (&self.metadata, &self.custom_trust_anchors) {
                (Some(metadata), None) if !self.trust_anchors.is_empty() => {
                    Arc::new(LayeredTrustAnchors {
                        fixed: self.trust_anchors.clone(),
                        metadata: Arc::clone(metadata),
                    })
                }
                (Some(metadata), _) => Arc::clone(metadata),
                (None, Some(_)) => {
                    warn!("⚠️ Custom synchronous trust anchor repository ignored by the async manager");
                    Arc::new(self.trust_anchors.clone())
                }
                (None, None) => Arc::new(self.trust_anchors.clone()),
            };
        let attestation = AsyncAttestationVerifier::new(self.statements(), trust_anchors)
            .with_self_attestation_policy(Arc::clone(&self.self_attestation))
            .with_cert_path_verifier(self.cert_path.clone());

        WebAuthnAsyncManager {
            registration: AsyncRegistrationVerifier::new(
                self.registration_policy,
                attestation,
                self.registration_verifiers,
                self.async_registration_verifiers,
            ),
            authentication: AsyncAuthenticationVerifier::new(
                self.authentication_policy,
                self.authentication_verifiers,
                self.async_authentication_verifiers,
            ),
            defaults: self.defaults,
        }
    }
}

/// Synchronous ceremony verification
#[derive(Clone, Default)]
pub struct WebAuthnManager {
    registration: RegistrationVerifier,
    authentication: AuthenticationVerifier,
    defaults: Option<CeremonyDefaults>,
}

impl WebAuthnManager {
    #[must_use]
    pub fn builder() -> WebAuthnManagerBuilder {
        WebAuthnManagerBuilder::new()
    }

    /// Manager with every format enabled and no trust anchors
    #[must_use]
    pub fn non_strict() -> Self {
        WebAuthnManagerBuilder::new().build()
    }

    #[must_use]
    pub fn defaults(&self) -> Option<&CeremonyDefaults> {
        self.defaults.as_ref()
    }

    #[must_use]
    pub fn registration_verifier(&self) -> &RegistrationVerifier {
        &self.registration
    }

    #[must_use]
    pub fn authentication_verifier(&self) -> &AuthenticationVerifier {
        &self.authentication
    }

    /// # Errors
    /// `DataConversion` for malformed request bytes.
    pub fn parse_registration_request(
        &self,
        request: &RegistrationRequest,
    ) -> Result<RegistrationData, VerificationError> {
        codec::parse_registration(request)
    }

    /// # Errors
    /// The first failing registration step.
    pub fn verify_registration(
        &self,
        data: &RegistrationData,
        parameters: &RegistrationParameters,
    ) -> Result<VerifiedRegistration, VerificationError> {
        self.registration.verify(data, parameters)
    }

    /// Parse, then verify
    ///
    /// # Errors
    /// A parse failure or the first failing registration step.
    pub fn verify_registration_request(
        &self,
        request: &RegistrationRequest,
        parameters: &RegistrationParameters,
    ) -> Result<VerifiedRegistration, VerificationError> {
        let data = self.parse_registration_request(request)?;
        self.verify_registration(&data, parameters)
    }

    /// # Errors
    /// `DataConversion` for malformed request bytes.
    pub fn parse_authentication_request(
        &self,
        request: &AuthenticationRequest,
    ) -> Result<AuthenticationData, VerificationError> {
        codec::parse_authentication(request)
    }

    /// # Errors
    /// The first failing authentication step.
    pub fn verify_authentication(
        &self,
        data: &AuthenticationData,
        parameters: &AuthenticationParameters,
    ) -> Result<AuthenticationData, VerificationError> {
        self.authentication.verify(data, parameters)
    }

    /// # Errors
    /// A parse failure or the first failing authentication step.
    pub fn verify_authentication_request(
        &self,
        request: &AuthenticationRequest,
        parameters: &AuthenticationParameters,
    ) -> Result<AuthenticationData, VerificationError> {
        let data = self.parse_authentication_request(request)?;
        self.verify_authentication(&data, parameters)
    }
}

/// Asynchronous ceremony verification with the same step order
#[derive(Clone, Default)]
pub struct WebAuthnAsyncManager {
    registration: AsyncRegistrationVerifier,
    authentication: AsyncAuthenticationVerifier,
    defaults: Option<CeremonyDefaults>,
}

impl WebAuthnAsyncManager {
    #[must_use]
    pub fn builder() -> WebAuthnManagerBuilder {
        WebAuthnManagerBuilder::new()
    }

    #[must_use]
    pub fn defaults(&self) -> Option<&CeremonyDefaults> {
        self.defaults.as_ref()
    }

    /// # Errors
    /// `DataConversion` for malformed request bytes.
    pub fn parse_registration_request(
        &self,
        request: &RegistrationRequest,
    ) -> Result<RegistrationData, VerificationError> {
        codec::parse_registration(request)
    }

    /// # Errors
    /// The first failing registration step.
    pub async fn verify_registration(
        &self,
        data: &RegistrationData,
        parameters: &RegistrationParameters,
    ) -> Result<VerifiedRegistration, VerificationError> {
        self.registration.verify(data, parameters).await
    }

    /// # Errors
    /// A parse failure or the first failing registration step.
    pub async fn verify_registration_request(
        &self,
        request: &RegistrationRequest,
        parameters: &RegistrationParameters,
    ) -> Result<VerifiedRegistration, VerificationError> {
        let data = self.parse_registration_request(request)?;
        self.verify_registration(&data, parameters).await
    }

    /// # Errors
    /// `DataConversion` for malformed request bytes.
    pub fn parse_authentication_request(
        &self,
        request: &AuthenticationRequest,
    ) -> Result<AuthenticationData, VerificationError> {
        codec::parse_authentication(request)
    }

    /// # Errors
    /// The first failing authentication step.
    pub async fn verify_authentication(
        &self,
        data: &AuthenticationData,
        parameters: &AuthenticationParameters,
    ) -> Result<AuthenticationData, VerificationError> {
        self.authentication.verify(data, parameters).await
    }

    /// # Errors
    /// A parse failure or the first failing authentication step.
    pub async fn verify_authentication_request(
        &self,
        request: &AuthenticationRequest,
        parameters: &AuthenticationParameters,
    ) -> Result<AuthenticationData, VerificationError> {
        let data = self.parse_authentication_request(request)?;
        self.verify_authentication(&data, parameters).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_settings_carries_policy() {
        let mut settings = VerifierSettings::default();
        settings.attestation.formats = vec!["none".into(), "packed".into()];
        settings.policy.max_credential_id_length = 64;
        settings.policy.user_verification_required = true;

        let manager = WebAuthnManagerBuilder::from_settings(&settings)
            .unwrap()
            .build();
        assert_eq!(
            manager.registration_verifier().attestation().statements().formats(),
            &[AttestationFormat::None, AttestationFormat::Packed]
        );
        assert_eq!(
            manager.registration_verifier().policy().max_credential_id_length,
            64
        );
        let defaults = manager.defaults().unwrap();
        assert_eq!(defaults.rp_id, "localhost");
        assert!(defaults.user_verification_required);

        let challenge = Challenge::new(vec![1, 2, 3]);
        let parameters = defaults.registration_parameters(challenge.clone());
        assert_eq!(parameters.server_property.challenge, challenge);
        assert!(parameters.user_verification_required);
    }

    #[test]
    fn test_from_settings_rejects_missing_anchor_file() {
        let mut settings = VerifierSettings::default();
        settings.attestation.trust_anchor_paths = vec!["/nonexistent/root.pem".into()];
        assert!(matches!(
            WebAuthnManagerBuilder::from_settings(&settings),
            Err(SettingsError::Unreadable { .. })
        ));
    }

    #[test]
    fn test_unknown_format_in_settings() {
        let mut settings = VerifierSettings::default();
        settings.attestation.formats = vec!["u2f".into()];
        assert!(matches!(
            WebAuthnManagerBuilder::from_settings(&settings),
            Err(SettingsError::UnknownFormat(_))
        ));
    }
}
