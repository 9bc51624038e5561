//! Caller-supplied verifiers that run after the built-in checks

use async_trait::async_trait;

use crate::error::VerificationError;
use crate::verifier::{AuthenticationObject, RegistrationObject};

/// Extra registration check, run after every built-in step passed
///
/// Closures of the right shape implement this directly.
pub trait CustomRegistrationVerifier: Send + Sync {
    /// # Errors
    /// Any error aborts the ceremony and is returned unchanged.
    fn verify(&self, object: &RegistrationObject<'_>) -> Result<(), VerificationError>;
}

impl<F> CustomRegistrationVerifier for F
where
    F: Fn(&RegistrationObject<'_>) -> Result<(), VerificationError> + Send + Sync,
{
    fn verify(&self, object: &RegistrationObject<'_>) -> Result<(), VerificationError> {
        self(object)
    }
}

/// Extra authentication check, run after every built-in step passed
pub trait CustomAuthenticationVerifier: Send + Sync {
    /// # Errors
    /// Any error aborts the ceremony and is returned unchanged.
    fn verify(&self, object: &AuthenticationObject<'_>) -> Result<(), VerificationError>;
}

impl<F> CustomAuthenticationVerifier for F
where
    F: Fn(&AuthenticationObject<'_>) -> Result<(), VerificationError> + Send + Sync,
{
    fn verify(&self, object: &AuthenticationObject<'_>) -> Result<(), VerificationError> {
        self(object)
    }
}

/// Registration check that may perform I/O
#[async_trait]
pub trait AsyncCustomRegistrationVerifier: Send + Sync {
    /// # Errors
    /// Any error aborts the ceremony and is returned unchanged.
    async fn verify(&self, object: &RegistrationObject<'_>) -> Result<(), VerificationError>;
}

/// Authentication check that may perform I/O
#[async_trait]
pub trait AsyncCustomAuthenticationVerifier: Send + Sync {
    /// # Errors
    /// Any error aborts the ceremony and is returned unchanged.
    async fn verify(&self, object: &AuthenticationObject<'_>) -> Result<(), VerificationError>;
}
