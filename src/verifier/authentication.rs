//! Authentication ceremony pipeline

use std::sync::Arc;

use log::{info, warn};

use crate::crypto::signature::verify_cose_signature;
use crate::crypto::signed_data;
use crate::data::{AuthenticationData, AuthenticationParameters, ClientDataType};
use crate::error::VerificationError;
use crate::verifier::checks::{self, ExtensionPolicy};
use crate::verifier::custom::{AsyncCustomAuthenticationVerifier, CustomAuthenticationVerifier};
use crate::verifier::{AuthenticationObject, OriginPolicy, ServerPropertyOrigins};

/// What to do when the sign counter did not increase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MaliciousCounterPolicy {
    /// Fail with `MaliciousCounterValue`
    #[default]
    Reject,
    /// Log and accept
    Ignore,
}

/// Built-in authentication checks shared by the sync and async pipelines
#[derive(Clone)]
pub struct AuthenticationPolicy {
    pub origin_policy: Arc<dyn OriginPolicy>,
    pub extension_policy: ExtensionPolicy,
    pub counter_policy: MaliciousCounterPolicy,
}

impl Default for AuthenticationPolicy {
    fn default() -> Self {
        Self {
            origin_policy: Arc::new(ServerPropertyOrigins),
            extension_policy: ExtensionPolicy::default(),
            counter_policy: MaliciousCounterPolicy::default(),
        }
    }
}

impl AuthenticationPolicy {
    /// Every built-in authentication step, in order
    ///
    /// # Errors
    /// The first failing check.
    pub fn check(&self, object: &AuthenticationObject<'_>) -> Result<(), VerificationError> {
        let data = object.data;
        let parameters = object.parameters;
        let record = &parameters.credential_record;
        let server_property = &parameters.server_property;
        let authenticator_data = &data.authenticator_data;

        if authenticator_data.attested_credential_data.is_some() {
            return Err(VerificationError::ConstraintViolation(
                "attested credential data must be absent in an assertion".into(),
            ));
        }
        checks::check_allow_credentials(&data.credential_id, parameters.allow_credentials.as_deref())?;

        checks::check_client_data_type(data.client_data.client_data_type, ClientDataType::Get)?;
        checks::check_challenge(&data.client_data.challenge, &server_property.challenge)?;
        checks::check_origin(&data.client_data, server_property, self.origin_policy.as_ref())?;
        checks::check_token_binding(&data.client_data, server_property.token_binding_id.as_deref())?;
        checks::check_rp_id_hash(&authenticator_data.rp_id_hash, &server_property.rp_id)?;
        checks::check_user_flags(
            authenticator_data.flags,
            parameters.user_presence_required,
            parameters.user_verification_required,
        )?;
        checks::check_backup_state(authenticator_data.flags)?;
        checks::check_backup_eligible_unchanged(record.backup_eligible, authenticator_data.flags)?;
        checks::check_extensions(
            &authenticator_data.extensions,
            &data.client_extensions,
            parameters.requested_extensions.as_deref(),
            self.extension_policy,
        )?;

        let algorithm = record.public_key.algorithm.ok_or_else(|| {
            VerificationError::BadSignature("stored credential key declares no algorithm".into())
        })?;
        let message = signed_data(&data.authenticator_data_bytes, &object.client_data_hash);
        verify_cose_signature(&record.public_key, algorithm, &message, &data.signature)?;

        match checks::check_sign_count(record.sign_count, authenticator_data.sign_count) {
            Err(error) if self.counter_policy == MaliciousCounterPolicy::Ignore => {
                warn!("⚠️ Ignoring non-increasing sign counter: {error}");
                Ok(())
            }
            result => result,
        }
    }
}

fn run_custom(
    custom: &[Arc<dyn CustomAuthenticationVerifier>],
    object: &AuthenticationObject<'_>,
) -> Result<(), VerificationError> {
    for verifier in custom {
        verifier.verify(object)?;
    }
    Ok(())
}

/// Synchronous authentication pipeline
#[derive(Clone, Default)]
pub struct AuthenticationVerifier {
    policy: AuthenticationPolicy,
    custom: Vec<Arc<dyn CustomAuthenticationVerifier>>,
}

impl AuthenticationVerifier {
    #[must_use]
    pub fn new(
        policy: AuthenticationPolicy,
        custom: Vec<Arc<dyn CustomAuthenticationVerifier>>,
    ) -> Self {
        Self { policy, custom }
    }

    #[must_use]
    pub fn policy(&self) -> &AuthenticationPolicy {
        &self.policy
    }

    /// # Errors
    /// The first failing pipeline step.
    pub fn verify(
        &self,
        data: &AuthenticationData,
        parameters: &AuthenticationParameters,
    ) -> Result<AuthenticationData, VerificationError> {
        let object = AuthenticationObject::new(data, parameters);
        self.policy.check(&object)?;
        run_custom(&self.custom, &object)?;
        info!("✅ Authentication verified (sign count {})", data.authenticator_data.sign_count);
        Ok(data.clone())
    }
}

/// Authentication pipeline with suspending caller verifiers
#[derive(Clone, Default)]
pub struct AsyncAuthenticationVerifier {
    policy: AuthenticationPolicy,
    custom: Vec<Arc<dyn CustomAuthenticationVerifier>>,
    async_custom: Vec<Arc<dyn AsyncCustomAuthenticationVerifier>>,
}

impl AsyncAuthenticationVerifier {
    #[must_use]
    pub fn new(
        policy: AuthenticationPolicy,
        custom: Vec<Arc<dyn CustomAuthenticationVerifier>>,
        async_custom: Vec<Arc<dyn AsyncCustomAuthenticationVerifier>>,
    ) -> Self {
        Self {
            policy,
            custom,
            async_custom,
        }
    }

    /// # Errors
    /// The first failing pipeline step.
    pub async fn verify(
        &self,
        data: &AuthenticationData,
        parameters: &AuthenticationParameters,
    ) -> Result<AuthenticationData, VerificationError> {
        let object = AuthenticationObject::new(data, parameters);
        self.policy.check(&object)?;
        run_custom(&self.custom, &object)?;
        for verifier in &self.async_custom {
            verifier.verify(&object).await?;
        }
        info!("✅ Authentication verified (sign count {})", data.authenticator_data.sign_count);
        Ok(data.clone())
    }
}
