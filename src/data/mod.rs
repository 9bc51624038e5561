//! `WebAuthn` data model
//!
//! Owned, immutable representations of everything a ceremony carries. The
//! [`codec`](crate::codec) module produces these from raw bytes.

pub mod attestation;
pub mod authenticator_data;
pub mod ceremony;
pub mod client_data;
pub mod cose;
pub mod origin;

pub use attestation::{
    AndroidKeyStatement, AndroidSafetyNetStatement, AppleStatement, AttestationFormat,
    AttestationObject, AttestationStatement, AttestationType, FidoU2fStatement, PackedStatement,
    TpmStatement,
};
pub use authenticator_data::{
    Aaguid, AttestedCredentialData, AuthenticatorData, AuthenticatorExtensions, AuthenticatorFlags,
};
pub use ceremony::{
    AuthenticationData, AuthenticationParameters, AuthenticationRequest, ClientExtensionOutputs,
    CredentialRecord, RegistrationData, RegistrationParameters, RegistrationRequest,
    ServerProperty, VerifiedRegistration,
};
pub use client_data::{Challenge, ClientData, ClientDataType, TokenBinding, TokenBindingStatus};
pub use cose::{CoseAlgorithm, CoseCurve, CoseKey, CoseKeyParams};
pub use origin::Origin;
