//! Registration ceremony pipeline
//!
//! Steps run in a fixed order and the first failure aborts the ceremony:
//! structure, client data type, challenge, origin, token binding, rpIdHash,
//! user flags, backup flags, algorithm, extensions, attestation, credential
//! id length, then caller verifiers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::info;

use crate::data::{AttestationType, ClientDataType, RegistrationData, RegistrationParameters, VerifiedRegistration};
use crate::error::VerificationError;
use crate::verifier::attestation_verifier::{AsyncAttestationVerifier, AttestationVerifier};
use crate::verifier::checks::{self, ExtensionPolicy, DEFAULT_MAX_CREDENTIAL_ID_LENGTH};
use crate::verifier::custom::{AsyncCustomRegistrationVerifier, CustomRegistrationVerifier};
use crate::verifier::{OriginPolicy, RegistrationObject, ServerPropertyOrigins};

/// Built-in registration checks shared by the sync and async pipelines
#[derive(Clone)]
pub struct RegistrationPolicy {
    pub origin_policy: Arc<dyn OriginPolicy>,
    pub max_credential_id_length: usize,
    pub extension_policy: ExtensionPolicy,
}

impl Default for RegistrationPolicy {
    fn default() -> Self {
        Self {
            origin_policy: Arc::new(ServerPropertyOrigins),
            max_credential_id_length: DEFAULT_MAX_CREDENTIAL_ID_LENGTH,
            extension_policy: ExtensionPolicy::default(),
        }
    }
}

impl RegistrationPolicy {
    /// Every check that precedes attestation
    ///
    /// # Errors
    /// The first failing check.
    pub fn check_before_attestation(
        &self,
        object: &RegistrationObject<'_>,
    ) -> Result<(), VerificationError> {
        let attested = object.attested_credential_data()?;
        let credential_key = &attested.credential_public_key;
        if !credential_key.has_public_key() {
            return Err(VerificationError::ConstraintViolation(
                "credential public key has no public part".into(),
            ));
        }

        let client_data = &object.data.client_data;
        let server_property = &object.parameters.server_property;
        let authenticator_data = object.authenticator_data();

        checks::check_client_data_type(client_data.client_data_type, ClientDataType::Create)?;
        checks::check_challenge(&client_data.challenge, &server_property.challenge)?;
        checks::check_origin(client_data, server_property, self.origin_policy.as_ref())?;
        checks::check_token_binding(client_data, server_property.token_binding_id.as_deref())?;
        checks::check_rp_id_hash(&authenticator_data.rp_id_hash, &server_property.rp_id)?;
        checks::check_user_flags(
            authenticator_data.flags,
            object.parameters.user_presence_required,
            object.parameters.user_verification_required,
        )?;
        checks::check_backup_state(authenticator_data.flags)?;
        checks::check_algorithm(credential_key, &object.parameters.pub_key_cred_params)?;
        checks::check_extensions(
            &authenticator_data.extensions,
            &object.data.client_extensions,
            object.parameters.requested_extensions.as_deref(),
            self.extension_policy,
        )
    }

    /// # Errors
    /// `CredentialIdTooLong`.
    pub fn check_after_attestation(
        &self,
        object: &RegistrationObject<'_>,
    ) -> Result<(), VerificationError> {
        let attested = object.attested_credential_data()?;
        checks::check_credential_id_length(&attested.credential_id, self.max_credential_id_length)
    }
}

fn run_custom(
    custom: &[Arc<dyn CustomRegistrationVerifier>],
    object: &RegistrationObject<'_>,
) -> Result<(), VerificationError> {
    for verifier in custom {
        verifier.verify(object)?;
    }
    Ok(())
}

fn verified(data: &RegistrationData, attestation_type: AttestationType) -> VerifiedRegistration {
    info!(
        "✅ Registration verified ({:?} attestation, format '{}')",
        attestation_type, data.attestation_object.format
    );
    VerifiedRegistration {
        data: data.clone(),
        attestation_type,
    }
}

/// Synchronous registration pipeline
#[derive(Clone, Default)]
pub struct RegistrationVerifier {
    policy: RegistrationPolicy,
    attestation: AttestationVerifier,
    custom: Vec<Arc<dyn CustomRegistrationVerifier>>,
}

impl RegistrationVerifier {
    #[must_use]
    pub fn new(
        policy: RegistrationPolicy,
        attestation: AttestationVerifier,
        custom: Vec<Arc<dyn CustomRegistrationVerifier>>,
    ) -> Self {
        Self {
            policy,
            attestation,
            custom,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &RegistrationPolicy {
        &self.policy
    }

    #[must_use]
    pub fn attestation(&self) -> &AttestationVerifier {
        &self.attestation
    }

    /// # Errors
    /// The first failing pipeline step.
    pub fn verify(
        &self,
        data: &RegistrationData,
        parameters: &RegistrationParameters,
    ) -> Result<VerifiedRegistration, VerificationError> {
        self.verify_at(data, parameters, Utc::now())
    }

    /// Verify with an explicit reference time for certificate validity
    ///
    /// # Errors
    /// The first failing pipeline step.
    pub fn verify_at(
        &self,
        data: &RegistrationData,
        parameters: &RegistrationParameters,
        timestamp: DateTime<Utc>,
    ) -> Result<VerifiedRegistration, VerificationError> {
        let object = RegistrationObject::at(data, parameters, timestamp);
        self.policy.check_before_attestation(&object)?;
        let attestation_type = self.attestation.verify(&object)?;
        self.policy.check_after_attestation(&object)?;
        run_custom(&self.custom, &object)?;
        Ok(verified(data, attestation_type))
    }
}

/// Registration pipeline with suspending attestation and caller verifiers
#[derive(Clone, Default)]
pub struct AsyncRegistrationVerifier {
    policy: RegistrationPolicy,
    attestation: AsyncAttestationVerifier,
    custom: Vec<Arc<dyn CustomRegistrationVerifier>>,
    async_custom: Vec<Arc<dyn AsyncCustomRegistrationVerifier>>,
}

impl AsyncRegistrationVerifier {
    #[must_use]
    pub fn new(
        policy: RegistrationPolicy,
        attestation: AsyncAttestationVerifier,
        custom: Vec<Arc<dyn CustomRegistrationVerifier>>,
        async_custom: Vec<Arc<dyn AsyncCustomRegistrationVerifier>>,
    ) -> Self {
        Self {
            policy,
            attestation,
            custom,
            async_custom,
        }
    }

    #[must_use]
    pub fn attestation(&self) -> &AsyncAttestationVerifier {
        &self.attestation
    }

    /// # Errors
    /// The first failing pipeline step.
    pub async fn verify(
        &self,
        data: &RegistrationData,
        parameters: &RegistrationParameters,
    ) -> Result<VerifiedRegistration, VerificationError> {
        self.verify_at(data, parameters, Utc::now()).await
    }

    /// # Errors
    /// The first failing pipeline step.
    pub async fn verify_at(
        &self,
        data: &RegistrationData,
        parameters: &RegistrationParameters,
        timestamp: DateTime<Utc>,
    ) -> Result<VerifiedRegistration, VerificationError> {
        let object = RegistrationObject::at(data, parameters, timestamp);
        self.policy.check_before_attestation(&object)?;
        let attestation_type = self.attestation.verify(&object).await?;
        self.policy.check_after_attestation(&object)?;
        run_custom(&self.custom, &object)?;
        for verifier in &self.async_custom {
            verifier.verify(&object).await?;
        }
        Ok(verified(data, attestation_type))
    }
}
