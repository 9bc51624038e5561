//! Binary authenticator data
//!
//! Layout: rpIdHash(32) | flags(1) | signCount(4, BE) | [attested credential
//! data] | [extensions CBOR map]. Attested credential data is
//! AAGUID(16) | credentialIdLength(2, BE) | credentialId | COSE key.

use ciborium::value::Value;
use uuid::Uuid;

use super::{cbor, cose};
use crate::data::{AttestedCredentialData, AuthenticatorData, AuthenticatorExtensions, AuthenticatorFlags};
use crate::error::VerificationError;

const FIXED_PART_LENGTH: usize = 37;

fn conversion(msg: impl Into<String>) -> VerificationError {
    VerificationError::DataConversion(msg.into())
}

/// Decode authenticator data
///
/// # Errors
/// Returns `DataConversion` on truncation, malformed CBOR, or trailing bytes.
pub fn decode(bytes: &[u8]) -> Result<AuthenticatorData, VerificationError> {
    if bytes.len() < FIXED_PART_LENGTH {
        return Err(conversion(format!(
            "authenticator data too short: {} bytes",
            bytes.len()
        )));
    }

    let mut rp_id_hash = [0u8; 32];
    rp_id_hash.copy_from_slice(&bytes[..32]);
    let flags = AuthenticatorFlags::from_bits(bytes[32]);
    let sign_count = u32::from_be_bytes([bytes[33], bytes[34], bytes[35], bytes[36]]);
    let mut rest = &bytes[FIXED_PART_LENGTH..];

    let attested_credential_data = if flags.attested_credential_data() {
        let (attested, remaining) = decode_attested_credential_data(rest)?;
        rest = remaining;
        Some(attested)
    } else {
        None
    };

    let extensions = if flags.extension_data() {
        let (value, consumed) = cbor::decode_prefix(rest)?;
        rest = &rest[consumed..];
        decode_extensions(&value)?
    } else {
        AuthenticatorExtensions::new()
    };

    if !rest.is_empty() {
        return Err(conversion(format!(
            "{} unexpected trailing bytes in authenticator data",
            rest.len()
        )));
    }

    Ok(AuthenticatorData {
        rp_id_hash,
        flags,
        sign_count,
        attested_credential_data,
        extensions,
    })
}

/// Decode attested credential data, returning whatever follows the COSE key
///
/// # Errors
/// Returns `DataConversion` on truncation or an undecodable COSE key.
pub fn decode_attested_credential_data(
    bytes: &[u8],
) -> Result<(AttestedCredentialData, &[u8]), VerificationError> {
    if bytes.len() < 18 {
        return Err(conversion("attested credential data too short"));
    }
    let mut aaguid = [0u8; 16];
    aaguid.copy_from_slice(&bytes[..16]);
    let id_length = usize::from(u16::from_be_bytes([bytes[16], bytes[17]]));
    let rest = &bytes[18..];
    if rest.len() < id_length {
        return Err(conversion(format!(
            "credential id length {id_length} exceeds remaining {} bytes",
            rest.len()
        )));
    }
    let (credential_id, rest) = rest.split_at(id_length);
    let (key_value, consumed) = cbor::decode_prefix(rest)?;
    let credential_public_key = cose::decode_value(&key_value)?;

    Ok((
        AttestedCredentialData {
            aaguid: Uuid::from_bytes(aaguid),
            credential_id: credential_id.to_vec(),
            credential_public_key,
        },
        &rest[consumed..],
    ))
}

fn decode_extensions(value: &Value) -> Result<AuthenticatorExtensions, VerificationError> {
    cbor::as_map(value, "authenticator extensions")?
        .iter()
        .map(|(key, output)| {
            key.as_text()
                .map(|id| (id.to_string(), output.clone()))
                .ok_or_else(|| conversion("authenticator extension identifier is not text"))
        })
        .collect()
}

/// Encode attested credential data
///
/// # Errors
/// Returns `DataConversion` if the credential id exceeds 65535 bytes.
pub fn encode_attested_credential_data(
    attested: &AttestedCredentialData,
) -> Result<Vec<u8>, VerificationError> {
    let id_length = u16::try_from(attested.credential_id.len())
        .map_err(|_| conversion("credential id longer than 65535 bytes"))?;
    let mut out = Vec::with_capacity(18 + attested.credential_id.len() + 77);
    out.extend_from_slice(attested.aaguid.as_bytes());
    out.extend_from_slice(&id_length.to_be_bytes());
    out.extend_from_slice(&attested.credential_id);
    out.extend_from_slice(&cose::encode(&attested.credential_public_key)?);
    Ok(out)
}

/// Encode authenticator data
///
/// The AT and ED flags are taken from the data present, not from `flags`.
///
/// # Errors
/// Returns `DataConversion` if a part cannot be encoded.
pub fn encode(data: &AuthenticatorData) -> Result<Vec<u8>, VerificationError> {
    let mut flags = data
        .flags
        .without(AuthenticatorFlags::ATTESTED_CREDENTIAL_DATA | AuthenticatorFlags::EXTENSION_DATA);
    if data.attested_credential_data.is_some() {
        flags = flags.with(AuthenticatorFlags::ATTESTED_CREDENTIAL_DATA);
    }
    if !data.extensions.is_empty() {
        flags = flags.with(AuthenticatorFlags::EXTENSION_DATA);
    }

    let mut out = Vec::with_capacity(FIXED_PART_LENGTH + 128);
    out.extend_from_slice(&data.rp_id_hash);
    out.push(flags.bits());
    out.extend_from_slice(&data.sign_count.to_be_bytes());
    if let Some(attested) = &data.attested_credential_data {
        out.extend_from_slice(&encode_attested_credential_data(attested)?);
    }
    if !data.extensions.is_empty() {
        let map = data
            .extensions
            .iter()
            .map(|(id, output)| (cbor::text(id), output.clone()))
            .collect();
        out.extend_from_slice(&cbor::encode(&Value::Map(map))?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CoseAlgorithm, CoseCurve, CoseKey, CoseKeyParams};

    fn sample_key() -> CoseKey {
        CoseKey {
            key_id: None,
            algorithm: Some(CoseAlgorithm::Es256),
            params: CoseKeyParams::Ec2 {
                curve: CoseCurve::P256,
                x: (0..32).collect(),
                y: (32..64).collect(),
            },
        }
    }

    fn sample_credential_id() -> Vec<u8> {
        let mut id = vec![0x71, 0x22, 0xCE, 0x2C, 0x86, 0xA2, 0x10, 0x85];
        id.extend((0u8..24).map(|i| i.wrapping_mul(37)));
        id
    }

    #[test]
    fn test_attested_credential_data_layout() {
        let aaguid = Uuid::from_bytes([
            0x55, 0x0E, 0x4B, 0x54, 0xAA, 0x47, 0x40, 0x9F, 0x9A, 0x95, 0x1A, 0xB7, 0x6C, 0x13,
            0x01, 0x31,
        ]);
        let attested = AttestedCredentialData {
            aaguid,
            credential_id: sample_credential_id(),
            credential_public_key: sample_key(),
        };

        let encoded = encode_attested_credential_data(&attested).unwrap();
        assert_eq!(&encoded[..16], aaguid.as_bytes());
        assert_eq!(&encoded[16..18], &[0x00, 0x20]);
        assert_eq!(&encoded[18..26], &[0x71, 0x22, 0xCE, 0x2C, 0x86, 0xA2, 0x10, 0x85]);

        let (decoded, rest) = decode_attested_credential_data(&encoded).unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded, attested);
        assert_eq!(decoded.credential_id.len(), 32);
    }

    #[test]
    fn test_authenticator_data_with_extensions() {
        let mut extensions = AuthenticatorExtensions::new();
        extensions.insert("credProtect".into(), cbor::int(2));
        let data = AuthenticatorData {
            rp_id_hash: [7; 32],
            flags: AuthenticatorFlags::from_bits(AuthenticatorFlags::USER_PRESENT),
            sign_count: 0x0102_0304,
            attested_credential_data: Some(AttestedCredentialData {
                aaguid: Uuid::nil(),
                credential_id: vec![1, 2, 3],
                credential_public_key: sample_key(),
            }),
            extensions,
        };

        let bytes = encode(&data).unwrap();
        assert_eq!(&bytes[33..37], &[1, 2, 3, 4]);
        assert_eq!(bytes[32], 0x01 | 0x40 | 0x80);

        let decoded = decode(&bytes).unwrap();
        assert!(decoded.flags.attested_credential_data());
        assert!(decoded.flags.extension_data());
        assert_eq!(decoded.sign_count, 0x0102_0304);
        assert_eq!(decoded.extensions.get("credProtect"), Some(&cbor::int(2)));
        assert_eq!(decoded.attested_credential_data, data.attested_credential_data);
    }

    #[test]
    fn test_truncated_and_trailing_bytes_rejected() {
        assert!(matches!(
            decode(&[0u8; 36]),
            Err(VerificationError::DataConversion(_))
        ));

        let mut bytes = vec![0u8; 37];
        bytes.push(0xff);
        assert!(matches!(
            decode(&bytes),
            Err(VerificationError::DataConversion(_))
        ));
    }

    #[test]
    fn test_credential_id_length_overruns_buffer() {
        let mut bytes = vec![0u8; 16];
        bytes.extend_from_slice(&[0x01, 0x00]);
        bytes.extend_from_slice(&[0xAA; 10]);
        assert!(decode_attested_credential_data(&bytes).is_err());
    }
}
