//! Verification error types
//!
//! Every failure the engine can raise, grouped into three kinds: malformed
//! input that never reached verification (conversion), well-formed input that
//! is structurally invalid (constraint), and failed checks (verification).

use thiserror::Error;

/// Coarse classification of a [`VerificationError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed bytes or JSON
    Conversion,
    /// Well-formed but missing or inconsistent fields
    Constraint,
    /// A verification check failed
    Verification,
}

/// Failure raised by the registration and authentication pipelines
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error("Data conversion failed: {0}")]
    DataConversion(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Bad client data type: expected '{expected}', got '{actual}'")]
    BadClientDataType { expected: String, actual: String },

    #[error("Bad challenge: expected '{expected}', got '{actual}'")]
    BadChallenge { expected: String, actual: String },

    #[error("Bad origin: '{origin}' is not a trusted origin")]
    BadOrigin { origin: String },

    #[error("Bad token binding: {0}")]
    BadTokenBinding(String),

    #[error("Bad rpIdHash: expected '{expected}', got '{actual}'")]
    BadRpIdHash { expected: String, actual: String },

    #[error("User not present")]
    UserNotPresent,

    #[error("User not verified")]
    UserNotVerified,

    #[error("Illegal backup state: BS flag set without BE flag")]
    IllegalBackupState,

    #[error("Backup eligible flag changed: stored {stored}, presented {presented}")]
    BadBackupEligibleFlag { stored: bool, presented: bool },

    #[error("Algorithm '{algorithm}' is not allowed")]
    NotAllowedAlgorithm { algorithm: String },

    #[error("Unexpected extension: {0}")]
    UnexpectedExtension(String),

    #[error("Bad extension output '{identifier}': {reason}")]
    BadExtensionOutput { identifier: String, reason: String },

    #[error("Credential id too long: {length} bytes exceeds maximum of {max}")]
    CredentialIdTooLong { length: usize, max: usize },

    #[error("Credential id is not in allowCredentials")]
    NotAllowedCredentialId,

    #[error("Malicious counter value: stored {stored}, presented {presented}")]
    MaliciousCounterValue { stored: u32, presented: u32 },

    #[error("Bad signature: {0}")]
    BadSignature(String),

    #[error("Bad attestation statement: {0}")]
    BadAttestationStatement(String),

    #[error("Bad AAGUID: expected '{expected}', got '{actual}'")]
    BadAaguid { expected: String, actual: String },

    #[error("Certificate path validation failed: {0}")]
    CertPath(String),

    #[error("No trust anchor registered for {0}")]
    TrustAnchorNotFound(String),

    #[error("Self attestation rejected: {0}")]
    SelfAttestationProhibited(String),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Custom verification failed: {0}")]
    Custom(String),
}

impl VerificationError {
    /// Classify the error for caller-side reporting policy
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DataConversion(_) => ErrorKind::Conversion,
            Self::ConstraintViolation(_) => ErrorKind::Constraint,
            _ => ErrorKind::Verification,
        }
    }
}

/// Failure while fetching or validating a metadata BLOB
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    #[error("Failed to fetch metadata BLOB: {0}")]
    FetchFailed(String),

    #[error("Malformed metadata BLOB: {0}")]
    Malformed(String),

    #[error("Metadata BLOB signature invalid: {0}")]
    BadSignature(String),

    #[error("Metadata BLOB signer chain invalid: {0}")]
    UntrustedSigner(String),
}

/// Shorthand result type used across the crate
pub type Result<T, E = VerificationError> = std::result::Result<T, E>;

impl From<openssl::error::ErrorStack> for VerificationError {
    fn from(err: openssl::error::ErrorStack) -> Self {
        Self::BadAttestationStatement(format!("openssl: {err}"))
    }
}

impl From<serde_json::Error> for VerificationError {
    fn from(err: serde_json::Error) -> Self {
        Self::DataConversion(format!("json: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            VerificationError::DataConversion("x".into()).kind(),
            ErrorKind::Conversion
        );
        assert_eq!(
            VerificationError::ConstraintViolation("x".into()).kind(),
            ErrorKind::Constraint
        );
        assert_eq!(
            VerificationError::MaliciousCounterValue {
                stored: 7,
                presented: 5
            }
            .kind(),
            ErrorKind::Verification
        );
    }

    #[test]
    fn test_display_carries_context() {
        let err = VerificationError::CredentialIdTooLong {
            length: 1024,
            max: 1023,
        };
        assert_eq!(
            err.to_string(),
            "Credential id too long: 1024 bytes exceeds maximum of 1023"
        );
    }
}
