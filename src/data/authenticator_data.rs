//! Authenticator data and attested credential data

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::data::cose::CoseKey;

/// 16-byte authenticator model identifier
pub type Aaguid = Uuid;

/// Authenticator extension outputs keyed by extension identifier
pub type AuthenticatorExtensions = BTreeMap<String, ciborium::Value>;

/// Flags byte of authenticator data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuthenticatorFlags(u8);

impl AuthenticatorFlags {
    pub const USER_PRESENT: u8 = 0x01;
    pub const USER_VERIFIED: u8 = 0x04;
    pub const BACKUP_ELIGIBLE: u8 = 0x08;
    pub const BACKUP_STATE: u8 = 0x10;
    pub const ATTESTED_CREDENTIAL_DATA: u8 = 0x40;
    pub const EXTENSION_DATA: u8 = 0x80;

    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    #[must_use]
    pub fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn with(self, flag: u8) -> Self {
        Self(self.0 | flag)
    }

    #[must_use]
    pub fn without(self, flag: u8) -> Self {
        Self(self.0 & !flag)
    }

    #[must_use]
    pub fn user_present(self) -> bool {
        self.0 & Self::USER_PRESENT != 0
    }

    #[must_use]
    pub fn user_verified(self) -> bool {
        self.0 & Self::USER_VERIFIED != 0
    }

    #[must_use]
    pub fn backup_eligible(self) -> bool {
        self.0 & Self::BACKUP_ELIGIBLE != 0
    }

    #[must_use]
    pub fn backup_state(self) -> bool {
        self.0 & Self::BACKUP_STATE != 0
    }

    #[must_use]
    pub fn attested_credential_data(self) -> bool {
        self.0 & Self::ATTESTED_CREDENTIAL_DATA != 0
    }

    #[must_use]
    pub fn extension_data(self) -> bool {
        self.0 & Self::EXTENSION_DATA != 0
    }
}

/// Credential created during registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedCredentialData {
    pub aaguid: Aaguid,
    pub credential_id: Vec<u8>,
    pub credential_public_key: CoseKey,
}

/// Parsed authenticator data
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; 32],
    pub flags: AuthenticatorFlags,
    pub sign_count: u32,
    pub attested_credential_data: Option<AttestedCredentialData>,
    pub extensions: AuthenticatorExtensions,
}
