//! Small DER writer for test certificate extensions and CRLs

use chrono::{DateTime, Utc};

pub const TAG_INTEGER: u8 = 0x02;
pub const TAG_BIT_STRING: u8 = 0x03;
pub const TAG_OCTET_STRING: u8 = 0x04;
pub const TAG_OID: u8 = 0x06;
pub const TAG_ENUMERATED: u8 = 0x0a;
pub const TAG_UTC_TIME: u8 = 0x17;
pub const TAG_SEQUENCE: u8 = 0x30;
pub const TAG_SET: u8 = 0x31;

fn length(len: usize) -> Vec<u8> {
    if len < 0x80 {
        // fits in the short form
        return vec![len as u8];
    }
    let bytes: Vec<u8> = len
        .to_be_bytes()
        .into_iter()
        .skip_while(|byte| *byte == 0)
        .collect();
    let mut out = vec![0x80 | bytes.len() as u8];
    out.extend(bytes);
    out
}

/// Element with a single-byte identifier
#[must_use]
pub fn tlv(identifier: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![identifier];
    out.extend(length(content.len()));
    out.extend_from_slice(content);
    out
}

#[must_use]
pub fn sequence(items: &[Vec<u8>]) -> Vec<u8> {
    tlv(TAG_SEQUENCE, &items.concat())
}

#[must_use]
pub fn set(items: &[Vec<u8>]) -> Vec<u8> {
    tlv(TAG_SET, &items.concat())
}

#[must_use]
pub fn octet_string(bytes: &[u8]) -> Vec<u8> {
    tlv(TAG_OCTET_STRING, bytes)
}

/// BIT STRING without unused bits
#[must_use]
pub fn bit_string(bytes: &[u8]) -> Vec<u8> {
    let mut content = vec![0];
    content.extend_from_slice(bytes);
    tlv(TAG_BIT_STRING, &content)
}

/// Unsigned big-endian magnitude as an INTEGER
#[must_use]
pub fn unsigned_integer(magnitude: &[u8]) -> Vec<u8> {
    let trimmed: Vec<u8> = magnitude.iter().copied().skip_while(|byte| *byte == 0).collect();
    let mut content = Vec::with_capacity(trimmed.len() + 1);
    if trimmed.first().map_or(true, |byte| byte & 0x80 != 0) {
        content.push(0);
    }
    content.extend(trimmed);
    tlv(TAG_INTEGER, &content)
}

#[must_use]
pub fn integer(value: u64) -> Vec<u8> {
    unsigned_integer(&value.to_be_bytes())
}

#[must_use]
pub fn enumerated(value: u8) -> Vec<u8> {
    tlv(TAG_ENUMERATED, &[value])
}

#[must_use]
pub fn utc_time(time: DateTime<Utc>) -> Vec<u8> {
    tlv(TAG_UTC_TIME, time.format("%y%m%d%H%M%SZ").to_string().as_bytes())
}

/// OBJECT IDENTIFIER from dotted notation
///
/// # Panics
/// On a malformed dotted string; test OIDs are constants.
#[must_use]
pub fn oid(dotted: &str) -> Vec<u8> {
    let arcs: Vec<u64> = dotted
        .split('.')
        .map(|arc| arc.parse().expect("numeric OID arc"))
        .collect();
    let mut content = vec![u8::try_from(arcs[0] * 40 + arcs[1]).expect("small first arcs")];
    for arc in &arcs[2..] {
        content.extend(base128(*arc));
    }
    tlv(TAG_OID, &content)
}

fn base128(mut value: u64) -> Vec<u8> {
    let mut out = vec![(value & 0x7f) as u8];
    value >>= 7;
    while value > 0 {
        out.push(0x80 | (value & 0x7f) as u8);
        value >>= 7;
    }
    out.reverse();
    out
}

/// Constructed context-specific `[tag]`, including high tag numbers
#[must_use]
pub fn explicit(tag: u32, inner: &[u8]) -> Vec<u8> {
    let mut out = if tag < 0x1f {
        vec![0xa0 | tag as u8]
    } else {
        let mut identifier = vec![0xbf];
        identifier.extend(base128(u64::from(tag)));
        identifier
    };
    out.extend(length(inner.len()));
    out.extend_from_slice(inner);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asn1::{self, CLASS_CONTEXT};

    #[test]
    fn test_integer_encoding() {
        assert_eq!(integer(0), vec![0x02, 0x01, 0x00]);
        assert_eq!(integer(300), vec![0x02, 0x02, 0x01, 0x2c]);
        assert_eq!(integer(0x80), vec![0x02, 0x02, 0x00, 0x80]);
    }

    #[test]
    fn test_oid_encoding() {
        // ecdsa-with-SHA256
        assert_eq!(
            oid("1.2.840.10045.4.3.2"),
            vec![0x06, 0x08, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x04, 0x03, 0x02]
        );
    }

    #[test]
    fn test_high_tag_number_reads_back() {
        let der = explicit(702, &integer(0));
        let tlv = asn1::parse_single(&der).unwrap();
        assert!(tlv.is(CLASS_CONTEXT, 702));
        assert_eq!(asn1::parse_single(tlv.value).unwrap().as_u64().unwrap(), 0);
    }

    #[test]
    fn test_long_form_length() {
        let der = octet_string(&[0u8; 200]);
        assert_eq!(&der[..3], &[0x04, 0x81, 200]);
    }
}
