//! COSE key model (RFC 9052/9053 subset used by `WebAuthn`)

use std::fmt;

/// COSE signature algorithm identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoseAlgorithm {
    Es256,
    Es384,
    Es512,
    EdDsa,
    Rs256,
    Rs384,
    Rs512,
    Ps256,
    Ps384,
    Ps512,
    /// RSASSA-PKCS1-v1_5 with SHA-1, only seen in TPM attestation
    Rs1,
    Other(i64),
}

impl CoseAlgorithm {
    #[must_use]
    pub fn from_i64(value: i64) -> Self {
        match value {
            -7 => Self::Es256,
            -35 => Self::Es384,
            -36 => Self::Es512,
            -8 => Self::EdDsa,
            -257 => Self::Rs256,
            -258 => Self::Rs384,
            -259 => Self::Rs512,
            -37 => Self::Ps256,
            -38 => Self::Ps384,
            -39 => Self::Ps512,
            -65535 => Self::Rs1,
            other => Self::Other(other),
        }
    }

    #[must_use]
    pub fn value(self) -> i64 {
        match self {
            Self::Es256 => -7,
            Self::Es384 => -35,
            Self::Es512 => -36,
            Self::EdDsa => -8,
            Self::Rs256 => -257,
            Self::Rs384 => -258,
            Self::Rs512 => -259,
            Self::Ps256 => -37,
            Self::Ps384 => -38,
            Self::Ps512 => -39,
            Self::Rs1 => -65535,
            Self::Other(value) => value,
        }
    }

    /// Look up an algorithm by its JOSE-style name (`ES256`, `RS256`, ...)
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let alg = match name.to_ascii_uppercase().as_str() {
            "ES256" => Self::Es256,
            "ES384" => Self::Es384,
            "ES512" => Self::Es512,
            "EDDSA" => Self::EdDsa,
            "RS256" => Self::Rs256,
            "RS384" => Self::Rs384,
            "RS512" => Self::Rs512,
            "PS256" => Self::Ps256,
            "PS384" => Self::Ps384,
            "PS512" => Self::Ps512,
            "RS1" => Self::Rs1,
            _ => return None,
        };
        Some(alg)
    }
}

impl fmt::Display for CoseAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Es256 => f.write_str("ES256"),
            Self::Es384 => f.write_str("ES384"),
            Self::Es512 => f.write_str("ES512"),
            Self::EdDsa => f.write_str("EdDSA"),
            Self::Rs256 => f.write_str("RS256"),
            Self::Rs384 => f.write_str("RS384"),
            Self::Rs512 => f.write_str("RS512"),
            Self::Ps256 => f.write_str("PS256"),
            Self::Ps384 => f.write_str("PS384"),
            Self::Ps512 => f.write_str("PS512"),
            Self::Rs1 => f.write_str("RS1"),
            Self::Other(value) => write!(f, "COSE({value})"),
        }
    }
}

/// COSE elliptic curve identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoseCurve {
    P256,
    P384,
    P521,
    Ed25519,
    Other(i64),
}

impl CoseCurve {
    #[must_use]
    pub fn from_i64(value: i64) -> Self {
        match value {
            1 => Self::P256,
            2 => Self::P384,
            3 => Self::P521,
            6 => Self::Ed25519,
            other => Self::Other(other),
        }
    }

    #[must_use]
    pub fn value(self) -> i64 {
        match self {
            Self::P256 => 1,
            Self::P384 => 2,
            Self::P521 => 3,
            Self::Ed25519 => 6,
            Self::Other(value) => value,
        }
    }

    /// Byte length of one affine coordinate
    #[must_use]
    pub fn coordinate_length(self) -> Option<usize> {
        match self {
            Self::P256 | Self::Ed25519 => Some(32),
            Self::P384 => Some(48),
            Self::P521 => Some(66),
            Self::Other(_) => None,
        }
    }
}

/// Key-type specific parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoseKeyParams {
    Ec2 { curve: CoseCurve, x: Vec<u8>, y: Vec<u8> },
    Okp { curve: CoseCurve, x: Vec<u8> },
    Rsa { n: Vec<u8>, e: Vec<u8> },
    Symmetric { k: Vec<u8> },
}

/// A credential public key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoseKey {
    pub key_id: Option<Vec<u8>>,
    pub algorithm: Option<CoseAlgorithm>,
    pub params: CoseKeyParams,
}

impl CoseKey {
    /// COSE `kty` value (1 OKP, 2 EC2, 3 RSA, 4 Symmetric)
    #[must_use]
    pub fn key_type(&self) -> i64 {
        match self.params {
            CoseKeyParams::Okp { .. } => 1,
            CoseKeyParams::Ec2 { .. } => 2,
            CoseKeyParams::Rsa { .. } => 3,
            CoseKeyParams::Symmetric { .. } => 4,
        }
    }

    /// Symmetric keys carry no public part and cannot verify signatures
    #[must_use]
    pub fn has_public_key(&self) -> bool {
        !matches!(self.params, CoseKeyParams::Symmetric { .. })
    }

    /// SEC1 uncompressed point `0x04 || x || y` for EC2 keys
    #[must_use]
    pub fn uncompressed_point(&self) -> Option<Vec<u8>> {
        match &self.params {
            CoseKeyParams::Ec2 { x, y, .. } => {
                let mut point = Vec::with_capacity(1 + x.len() + y.len());
                point.push(0x04);
                point.extend_from_slice(x);
                point.extend_from_slice(y);
                Some(point)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_values() {
        for alg in [
            CoseAlgorithm::Es256,
            CoseAlgorithm::Es384,
            CoseAlgorithm::Es512,
            CoseAlgorithm::EdDsa,
            CoseAlgorithm::Rs256,
            CoseAlgorithm::Ps256,
            CoseAlgorithm::Rs1,
        ] {
            assert_eq!(CoseAlgorithm::from_i64(alg.value()), alg);
            assert_eq!(CoseAlgorithm::from_name(&alg.to_string()), Some(alg));
        }
        assert_eq!(CoseAlgorithm::from_i64(-999), CoseAlgorithm::Other(-999));
    }

    #[test]
    fn test_uncompressed_point() {
        let key = CoseKey {
            key_id: None,
            algorithm: Some(CoseAlgorithm::Es256),
            params: CoseKeyParams::Ec2 {
                curve: CoseCurve::P256,
                x: vec![1; 32],
                y: vec![2; 32],
            },
        };
        let point = key.uncompressed_point().unwrap();
        assert_eq!(point.len(), 65);
        assert_eq!(point[0], 0x04);
        assert_eq!(point[64], 2);
        assert!(key.has_public_key());
    }
}
