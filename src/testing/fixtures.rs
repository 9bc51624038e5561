//! Ceremony fixtures shared by unit and integration tests

use uuid::Uuid;

use crate::data::{
    AuthenticationParameters, Challenge, CoseAlgorithm, CredentialRecord, Origin,
    RegistrationParameters, ServerProperty,
};

use super::constants::{TEST_AAGUID, TEST_CHALLENGE, TEST_ORIGIN, TEST_RP_ID};

/// Central fixture provider for ceremony inputs
pub struct TestFixtures;

impl TestFixtures {
    /// # Panics
    /// Never; the constant is valid base64url.
    #[must_use]
    pub fn challenge() -> Challenge {
        Challenge::from_base64url(TEST_CHALLENGE).expect("valid test challenge")
    }

    /// # Panics
    /// Never; the constant is a valid origin.
    #[must_use]
    pub fn origin() -> Origin {
        Origin::parse(TEST_ORIGIN).expect("valid test origin")
    }

    #[must_use]
    pub fn aaguid() -> Uuid {
        Uuid::from_bytes(TEST_AAGUID)
    }

    #[must_use]
    pub fn server_property() -> ServerProperty {
        ServerProperty::new(Self::origin(), TEST_RP_ID, Self::challenge())
    }

    /// ES256, EdDSA and RS256 allowed, user verification not required
    #[must_use]
    pub fn registration_parameters() -> RegistrationParameters {
        RegistrationParameters::new(
            Self::server_property(),
            vec![CoseAlgorithm::Es256, CoseAlgorithm::EdDsa, CoseAlgorithm::Rs256],
            false,
        )
    }

    #[must_use]
    pub fn authentication_parameters(record: CredentialRecord) -> AuthenticationParameters {
        AuthenticationParameters::new(Self::server_property(), record, false)
    }
}
