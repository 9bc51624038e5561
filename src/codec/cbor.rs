//! Helpers over `ciborium::Value`

use ciborium::value::Value;

use crate::error::VerificationError;

/// Decode one CBOR item from the front of `bytes`
///
/// Returns the item and the number of bytes it occupied, so callers can
/// continue with whatever follows (COSE key followed by extensions).
pub fn decode_prefix(bytes: &[u8]) -> Result<(Value, usize), VerificationError> {
    let mut rest = bytes;
    let value: Value = ciborium::de::from_reader(&mut rest)
        .map_err(|e| VerificationError::DataConversion(format!("invalid CBOR: {e:?}")))?;
    Ok((value, bytes.len() - rest.len()))
}

/// Decode exactly one CBOR item, rejecting trailing bytes
pub fn decode(bytes: &[u8]) -> Result<Value, VerificationError> {
    let (value, consumed) = decode_prefix(bytes)?;
    if consumed != bytes.len() {
        return Err(VerificationError::DataConversion(format!(
            "{} trailing bytes after CBOR item",
            bytes.len() - consumed
        )));
    }
    Ok(value)
}

pub fn encode(value: &Value) -> Result<Vec<u8>, VerificationError> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(value, &mut out)
        .map_err(|e| VerificationError::DataConversion(format!("CBOR encoding failed: {e:?}")))?;
    Ok(out)
}

pub fn as_map<'a>(value: &'a Value, what: &str) -> Result<&'a [(Value, Value)], VerificationError> {
    value
        .as_map()
        .map(Vec::as_slice)
        .ok_or_else(|| VerificationError::DataConversion(format!("{what} is not a CBOR map")))
}

#[must_use]
pub fn get_text<'a>(map: &'a [(Value, Value)], key: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| k.as_text() == Some(key))
        .map(|(_, v)| v)
}

#[must_use]
pub fn get_int(map: &[(Value, Value)], key: i64) -> Option<&Value> {
    map.iter()
        .find(|(k, _)| to_i64(k) == Some(key))
        .map(|(_, v)| v)
}

#[must_use]
pub fn to_i64(value: &Value) -> Option<i64> {
    value
        .as_integer()
        .and_then(|integer| i64::try_from(i128::from(integer)).ok())
}

pub fn require_bytes(
    map: &[(Value, Value)],
    key: &str,
    what: &str,
) -> Result<Vec<u8>, VerificationError> {
    get_text(map, key)
        .and_then(Value::as_bytes)
        .cloned()
        .ok_or_else(|| VerificationError::DataConversion(format!("{what}: missing byte string '{key}'")))
}

pub fn require_text(
    map: &[(Value, Value)],
    key: &str,
    what: &str,
) -> Result<String, VerificationError> {
    get_text(map, key)
        .and_then(Value::as_text)
        .map(ToString::to_string)
        .ok_or_else(|| VerificationError::DataConversion(format!("{what}: missing text '{key}'")))
}

pub fn require_i64(
    map: &[(Value, Value)],
    key: &str,
    what: &str,
) -> Result<i64, VerificationError> {
    get_text(map, key)
        .and_then(to_i64)
        .ok_or_else(|| VerificationError::DataConversion(format!("{what}: missing integer '{key}'")))
}

/// Certificate chain stored as an array of byte strings
pub fn certificate_array(
    map: &[(Value, Value)],
    key: &str,
    what: &str,
) -> Result<Option<Vec<Vec<u8>>>, VerificationError> {
    let Some(value) = get_text(map, key) else {
        return Ok(None);
    };
    let items = value
        .as_array()
        .ok_or_else(|| VerificationError::DataConversion(format!("{what}: '{key}' is not an array")))?;
    items
        .iter()
        .map(|item| {
            item.as_bytes().cloned().ok_or_else(|| {
                VerificationError::DataConversion(format!("{what}: '{key}' entry is not bytes"))
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

#[must_use]
pub fn text(key: &str) -> Value {
    Value::Text(key.to_string())
}

#[must_use]
pub fn int(value: i64) -> Value {
    Value::Integer(value.into())
}

#[must_use]
pub fn bytes(value: &[u8]) -> Value {
    Value::Bytes(value.to_vec())
}

#[must_use]
pub fn certificates(chain: &[Vec<u8>]) -> Value {
    Value::Array(chain.iter().map(|cert| bytes(cert)).collect())
}
