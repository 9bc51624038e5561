//! Attestation object CBOR (`{fmt, attStmt, authData}`)

use ciborium::value::Value;

use super::{authenticator_data, cbor};
use crate::data::{
    AndroidKeyStatement, AndroidSafetyNetStatement, AppleStatement, AttestationObject,
    AttestationStatement, CoseAlgorithm, FidoU2fStatement, PackedStatement, TpmStatement,
};
use crate::error::VerificationError;

/// Decode an attestation object
///
/// # Errors
/// Returns `DataConversion` when the CBOR, the statement for a known format,
/// or the embedded authenticator data is malformed.
pub fn decode(bytes: &[u8]) -> Result<AttestationObject, VerificationError> {
    let value = cbor::decode(bytes)?;
    let map = cbor::as_map(&value, "attestation object")?;

    let format = cbor::require_text(map, "fmt", "attestation object")?;
    let statement_value = cbor::get_text(map, "attStmt").ok_or_else(|| {
        VerificationError::DataConversion("attestation object: missing 'attStmt'".into())
    })?;
    let authenticator_data_bytes = cbor::require_bytes(map, "authData", "attestation object")?;

    let statement = decode_statement(&format, statement_value)?;
    let authenticator_data = authenticator_data::decode(&authenticator_data_bytes)?;

    Ok(AttestationObject {
        format,
        statement,
        authenticator_data,
        authenticator_data_bytes,
    })
}

fn algorithm(map: &[(Value, Value)], what: &str) -> Result<CoseAlgorithm, VerificationError> {
    cbor::require_i64(map, "alg", what).map(CoseAlgorithm::from_i64)
}

fn required_chain(map: &[(Value, Value)], what: &str) -> Result<Vec<Vec<u8>>, VerificationError> {
    match cbor::certificate_array(map, "x5c", what)? {
        Some(chain) if !chain.is_empty() => Ok(chain),
        _ => Err(VerificationError::DataConversion(format!(
            "{what}: missing 'x5c'"
        ))),
    }
}

/// Decode the `attStmt` map for the given format identifier
///
/// # Errors
/// Returns `DataConversion` if a required field for a known format is missing.
pub fn decode_statement(
    format: &str,
    value: &Value,
) -> Result<AttestationStatement, VerificationError> {
    let map = cbor::as_map(value, "attestation statement")?;

    let statement = match format {
        "none" => {
            if !map.is_empty() {
                return Err(VerificationError::DataConversion(
                    "none attestation statement must be empty".into(),
                ));
            }
            AttestationStatement::None
        }
        "packed" => AttestationStatement::Packed(PackedStatement {
            alg: algorithm(map, "packed")?,
            sig: cbor::require_bytes(map, "sig", "packed")?,
            x5c: cbor::certificate_array(map, "x5c", "packed")?.unwrap_or_default(),
            ecdaa_key_id: cbor::get_text(map, "ecdaaKeyId")
                .and_then(Value::as_bytes)
                .cloned(),
        }),
        "fido-u2f" => AttestationStatement::FidoU2f(FidoU2fStatement {
            sig: cbor::require_bytes(map, "sig", "fido-u2f")?,
            x5c: required_chain(map, "fido-u2f")?,
        }),
        "tpm" => AttestationStatement::Tpm(TpmStatement {
            ver: cbor::require_text(map, "ver", "tpm")?,
            alg: algorithm(map, "tpm")?,
            x5c: required_chain(map, "tpm")?,
            sig: cbor::require_bytes(map, "sig", "tpm")?,
            cert_info: cbor::require_bytes(map, "certInfo", "tpm")?,
            pub_area: cbor::require_bytes(map, "pubArea", "tpm")?,
        }),
        "android-key" => AttestationStatement::AndroidKey(AndroidKeyStatement {
            alg: algorithm(map, "android-key")?,
            sig: cbor::require_bytes(map, "sig", "android-key")?,
            x5c: required_chain(map, "android-key")?,
        }),
        "android-safetynet" => AttestationStatement::AndroidSafetyNet(AndroidSafetyNetStatement {
            ver: cbor::require_text(map, "ver", "android-safetynet")?,
            response: cbor::require_bytes(map, "response", "android-safetynet")?,
        }),
        "apple" => AttestationStatement::Apple(AppleStatement {
            x5c: required_chain(map, "apple")?,
        }),
        _ => AttestationStatement::Unknown(value.clone()),
    };
    Ok(statement)
}

/// CBOR value of an attestation statement
#[must_use]
pub fn statement_to_value(statement: &AttestationStatement) -> Value {
    let entries = match statement {
        AttestationStatement::None => Vec::new(),
        AttestationStatement::Packed(stmt) => {
            let mut entries = vec![
                (cbor::text("alg"), cbor::int(stmt.alg.value())),
                (cbor::text("sig"), cbor::bytes(&stmt.sig)),
            ];
            if !stmt.x5c.is_empty() {
                entries.push((cbor::text("x5c"), cbor::certificates(&stmt.x5c)));
            }
            if let Some(key_id) = &stmt.ecdaa_key_id {
                entries.push((cbor::text("ecdaaKeyId"), cbor::bytes(key_id)));
            }
            entries
        }
        AttestationStatement::FidoU2f(stmt) => vec![
            (cbor::text("sig"), cbor::bytes(&stmt.sig)),
            (cbor::text("x5c"), cbor::certificates(&stmt.x5c)),
        ],
        AttestationStatement::Tpm(stmt) => vec![
            (cbor::text("ver"), cbor::text(&stmt.ver)),
            (cbor::text("alg"), cbor::int(stmt.alg.value())),
            (cbor::text("x5c"), cbor::certificates(&stmt.x5c)),
            (cbor::text("sig"), cbor::bytes(&stmt.sig)),
            (cbor::text("certInfo"), cbor::bytes(&stmt.cert_info)),
            (cbor::text("pubArea"), cbor::bytes(&stmt.pub_area)),
        ],
        AttestationStatement::AndroidKey(stmt) => vec![
            (cbor::text("alg"), cbor::int(stmt.alg.value())),
            (cbor::text("sig"), cbor::bytes(&stmt.sig)),
            (cbor::text("x5c"), cbor::certificates(&stmt.x5c)),
        ],
        AttestationStatement::AndroidSafetyNet(stmt) => vec![
            (cbor::text("ver"), cbor::text(&stmt.ver)),
            (cbor::text("response"), cbor::bytes(&stmt.response)),
        ],
        AttestationStatement::Apple(stmt) => {
            vec![(cbor::text("x5c"), cbor::certificates(&stmt.x5c))]
        }
        AttestationStatement::Unknown(value) => return value.clone(),
    };
    Value::Map(entries)
}

/// Encode an attestation object
///
/// `authData` is written from `authenticator_data_bytes` so signatures made
/// over those bytes stay valid.
///
/// # Errors
/// Returns `DataConversion` if CBOR serialization fails.
pub fn encode(object: &AttestationObject) -> Result<Vec<u8>, VerificationError> {
    let value = Value::Map(vec![
        (cbor::text("fmt"), cbor::text(&object.format)),
        (cbor::text("attStmt"), statement_to_value(&object.statement)),
        (
            cbor::text("authData"),
            cbor::bytes(&object.authenticator_data_bytes),
        ),
    ]);
    cbor::encode(&value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_format_is_preserved() {
        let value = Value::Map(vec![(cbor::text("foo"), cbor::int(1))]);
        let statement = decode_statement("future-format", &value).unwrap();
        assert_eq!(statement, AttestationStatement::Unknown(value));
    }

    #[test]
    fn test_fido_u2f_requires_certificate() {
        let value = Value::Map(vec![(cbor::text("sig"), cbor::bytes(&[1, 2]))]);
        assert!(matches!(
            decode_statement("fido-u2f", &value),
            Err(VerificationError::DataConversion(_))
        ));
    }

    #[test]
    fn test_packed_statement_roundtrip() {
        let statement = AttestationStatement::Packed(PackedStatement {
            alg: CoseAlgorithm::Es256,
            sig: vec![0x30, 0x44],
            x5c: vec![vec![0x30, 0x82]],
            ecdaa_key_id: None,
        });
        let value = statement_to_value(&statement);
        assert_eq!(decode_statement("packed", &value).unwrap(), statement);
    }

    #[test]
    fn test_none_statement_must_be_empty() {
        let value = Value::Map(vec![(cbor::text("sig"), cbor::bytes(&[1]))]);
        assert!(decode_statement("none", &value).is_err());
        assert_eq!(
            decode_statement("none", &Value::Map(vec![])).unwrap(),
            AttestationStatement::None
        );
    }
}
