//! Attestation objects and per-format attestation statements

use std::fmt;

use crate::data::authenticator_data::AuthenticatorData;
use crate::data::cose::CoseAlgorithm;

/// Attestation statement formats understood by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttestationFormat {
    None,
    Packed,
    FidoU2f,
    Tpm,
    AndroidKey,
    AndroidSafetyNet,
    Apple,
}

impl AttestationFormat {
    pub const ALL: [Self; 7] = [
        Self::Packed,
        Self::FidoU2f,
        Self::AndroidKey,
        Self::AndroidSafetyNet,
        Self::Tpm,
        Self::Apple,
        Self::None,
    ];

    /// Format identifier used in the `fmt` field
    #[must_use]
    pub fn identifier(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Packed => "packed",
            Self::FidoU2f => "fido-u2f",
            Self::Tpm => "tpm",
            Self::AndroidKey => "android-key",
            Self::AndroidSafetyNet => "android-safetynet",
            Self::Apple => "apple",
        }
    }
}

impl TryFrom<&str> for AttestationFormat {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|format| format.identifier() == value)
            .ok_or_else(|| format!("unknown attestation format '{value}'"))
    }
}

impl fmt::Display for AttestationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

/// How much trust an attestation statement conveys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum AttestationType {
    None,
    #[serde(rename = "Self")]
    SelfAttestation,
    Basic,
    AttCa,
    AnonCa,
    Ecdaa,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedStatement {
    pub alg: CoseAlgorithm,
    pub sig: Vec<u8>,
    pub x5c: Vec<Vec<u8>>,
    pub ecdaa_key_id: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FidoU2fStatement {
    pub sig: Vec<u8>,
    pub x5c: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmStatement {
    pub ver: String,
    pub alg: CoseAlgorithm,
    pub x5c: Vec<Vec<u8>>,
    pub sig: Vec<u8>,
    pub cert_info: Vec<u8>,
    pub pub_area: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AndroidKeyStatement {
    pub alg: CoseAlgorithm,
    pub sig: Vec<u8>,
    pub x5c: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AndroidSafetyNetStatement {
    pub ver: String,
    /// Compact JWS returned by the SafetyNet API
    pub response: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppleStatement {
    pub x5c: Vec<Vec<u8>>,
}

/// Format-specific attestation statement (`attStmt`)
///
/// Certificates are kept as DER bytes, leaf first.
#[derive(Debug, Clone, PartialEq)]
pub enum AttestationStatement {
    None,
    Packed(PackedStatement),
    FidoU2f(FidoU2fStatement),
    Tpm(TpmStatement),
    AndroidKey(AndroidKeyStatement),
    AndroidSafetyNet(AndroidSafetyNetStatement),
    Apple(AppleStatement),
    /// A format the codec does not model; kept so dispatch can reject it
    Unknown(ciborium::Value),
}

impl AttestationStatement {
    /// Statement certificate chain, when the format carries one in `x5c`
    #[must_use]
    pub fn x5c(&self) -> Option<&[Vec<u8>]> {
        match self {
            Self::Packed(stmt) if !stmt.x5c.is_empty() => Some(&stmt.x5c),
            Self::FidoU2f(stmt) => Some(&stmt.x5c),
            Self::Tpm(stmt) => Some(&stmt.x5c),
            Self::AndroidKey(stmt) => Some(&stmt.x5c),
            Self::Apple(stmt) => Some(&stmt.x5c),
            _ => None,
        }
    }
}

/// Decoded attestation object
#[derive(Debug, Clone, PartialEq)]
pub struct AttestationObject {
    pub format: String,
    pub statement: AttestationStatement,
    pub authenticator_data: AuthenticatorData,
    /// `authData` bytes exactly as signed by the authenticator
    pub authenticator_data_bytes: Vec<u8>,
}
