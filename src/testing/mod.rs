//! Test utilities for passkey-verify
//!
//! Everything here builds real cryptographic material at test time so the
//! verifiers run against the same checks they apply in production.
//!
//! ## Organization
//!
//! - [`authenticator`] - software authenticator producing registration and
//!   authentication responses in every attestation format
//! - [`certificates`] - throwaway CAs, attestation certificates and CRLs
//! - [`fixtures`] - challenge, origin and parameter fixtures
//! - [`metadata`] - signed metadata BLOBs
//! - [`mock`] - in-memory metadata BLOB provider
//!
//! ## Usage
//!
//! ```rust,ignore
//! use passkey_verify::testing::{TestAttestation, TestAuthenticator, TestFixtures};
//! use passkey_verify::WebAuthnManager;
//!
//! let authenticator = TestAuthenticator::new()?;
//! let request = authenticator.register(&TestFixtures::challenge(), TestAttestation::None)?;
//! let verified = WebAuthnManager::default()
//!     .verify_registration_request(&request, &TestFixtures::registration_parameters())?;
//! ```

pub mod authenticator;
pub mod certificates;
pub mod der;
pub mod fixtures;
pub mod jws;
pub mod metadata;
pub mod mock;

pub use authenticator::{TestAttestation, TestAuthenticator};
pub use certificates::{LeafOptions, TestCertificateAuthority};
pub use fixtures::TestFixtures;
pub use mock::MockBlobProvider;

/// Common test constants
pub mod constants {
    /// Challenge issued for test ceremonies (base64url)
    pub const TEST_CHALLENGE: &str = "tk31UH1ETGGTPj33OhOMzw";

    pub const TEST_ORIGIN: &str = "http://localhost:8080";

    pub const TEST_RP_ID: &str = "localhost";

    /// AAGUID of the software authenticator
    pub const TEST_AAGUID: [u8; 16] = [
        0x7e, 0x3b, 0x5c, 0x1a, 0x42, 0x90, 0x4d, 0x8e, 0xa1, 0x6f, 0x0c, 0x2d, 0x93, 0x55, 0xb4,
        0x08,
    ];

    pub const TEST_USER_HANDLE: &[u8] = b"test-user-handle";
}
