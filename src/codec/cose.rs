//! COSE key CBOR encoding

use ciborium::value::Value;

use super::cbor;
use crate::data::{CoseAlgorithm, CoseCurve, CoseKey, CoseKeyParams};
use crate::error::VerificationError;

const KTY: i64 = 1;
const KID: i64 = 2;
const ALG: i64 = 3;

const KTY_OKP: i64 = 1;
const KTY_EC2: i64 = 2;
const KTY_RSA: i64 = 3;
const KTY_SYMMETRIC: i64 = 4;

fn required_bytes(map: &[(Value, Value)], label: i64) -> Result<Vec<u8>, VerificationError> {
    cbor::get_int(map, label)
        .and_then(Value::as_bytes)
        .cloned()
        .ok_or_else(|| VerificationError::DataConversion(format!("COSE key: missing label {label}")))
}

fn required_int(map: &[(Value, Value)], label: i64) -> Result<i64, VerificationError> {
    cbor::get_int(map, label)
        .and_then(cbor::to_i64)
        .ok_or_else(|| VerificationError::DataConversion(format!("COSE key: missing label {label}")))
}

/// Decode a COSE key from an already-parsed CBOR value
///
/// # Errors
/// Returns `DataConversion` for unknown key types or missing parameters.
pub fn decode_value(value: &Value) -> Result<CoseKey, VerificationError> {
    let map = cbor::as_map(value, "COSE key")?;
    let key_type = required_int(map, KTY)?;
    let key_id = cbor::get_int(map, KID).and_then(Value::as_bytes).cloned();
    let algorithm = cbor::get_int(map, ALG)
        .and_then(cbor::to_i64)
        .map(CoseAlgorithm::from_i64);

    let params = match key_type {
        KTY_EC2 => CoseKeyParams::Ec2 {
            curve: CoseCurve::from_i64(required_int(map, -1)?),
            x: required_bytes(map, -2)?,
            y: required_bytes(map, -3)?,
        },
        KTY_OKP => CoseKeyParams::Okp {
            curve: CoseCurve::from_i64(required_int(map, -1)?),
            x: required_bytes(map, -2)?,
        },
        KTY_RSA => CoseKeyParams::Rsa {
            n: required_bytes(map, -1)?,
            e: required_bytes(map, -2)?,
        },
        KTY_SYMMETRIC => CoseKeyParams::Symmetric {
            k: required_bytes(map, -1)?,
        },
        other => {
            return Err(VerificationError::DataConversion(format!(
                "COSE key: unsupported key type {other}"
            )))
        }
    };

    Ok(CoseKey {
        key_id,
        algorithm,
        params,
    })
}

/// Decode COSE key bytes
///
/// # Errors
/// Returns `DataConversion` for malformed CBOR or key parameters.
pub fn decode(bytes: &[u8]) -> Result<CoseKey, VerificationError> {
    decode_value(&cbor::decode(bytes)?)
}

/// CBOR value with labels in CTAP2 canonical order
#[must_use]
pub fn to_value(key: &CoseKey) -> Value {
    let mut map = vec![(cbor::int(KTY), cbor::int(key.key_type()))];
    if let Some(kid) = &key.key_id {
        map.push((cbor::int(KID), cbor::bytes(kid)));
    }
    if let Some(alg) = key.algorithm {
        map.push((cbor::int(ALG), cbor::int(alg.value())));
    }
    match &key.params {
        CoseKeyParams::Ec2 { curve, x, y } => {
            map.push((cbor::int(-1), cbor::int(curve.value())));
            map.push((cbor::int(-2), cbor::bytes(x)));
            map.push((cbor::int(-3), cbor::bytes(y)));
        }
        CoseKeyParams::Okp { curve, x } => {
            map.push((cbor::int(-1), cbor::int(curve.value())));
            map.push((cbor::int(-2), cbor::bytes(x)));
        }
        CoseKeyParams::Rsa { n, e } => {
            map.push((cbor::int(-1), cbor::bytes(n)));
            map.push((cbor::int(-2), cbor::bytes(e)));
        }
        CoseKeyParams::Symmetric { k } => {
            map.push((cbor::int(-1), cbor::bytes(k)));
        }
    }
    Value::Map(map)
}

/// # Errors
/// Returns `DataConversion` if CBOR serialization fails.
pub fn encode(key: &CoseKey) -> Result<Vec<u8>, VerificationError> {
    cbor::encode(&to_value(key))
}
