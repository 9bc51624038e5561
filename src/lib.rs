#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! `WebAuthn`/FIDO2 ceremony verification
//!
//! Parses registration and authentication responses, runs the ordered
//! verification pipelines, assesses attestation trust against static or
//! FIDO metadata trust anchors and returns the credential record to persist.

/// Version of the passkey-verify library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod asn1;
pub mod codec;
pub mod crypto;
pub mod data;
pub mod error;
pub mod manager;
pub mod metadata;
pub mod settings;
pub mod verifier;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use data::{
    AuthenticationParameters, AuthenticationRequest, Challenge, CredentialRecord, Origin,
    RegistrationParameters, RegistrationRequest, ServerProperty, VerifiedRegistration,
};
pub use error::{ErrorKind, MetadataError, VerificationError};
pub use manager::{CeremonyDefaults, WebAuthnAsyncManager, WebAuthnManager, WebAuthnManagerBuilder};
pub use settings::VerifierSettings;
