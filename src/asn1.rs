//! Minimal DER reader for vendor extension payloads
//!
//! Certificates themselves are parsed by `openssl`/`x509-parser`; this only
//! walks the small structures nested inside extension values (Android key
//! description, Apple nonce, FIDO AAGUID).

pub const CLASS_UNIVERSAL: u8 = 0;
pub const CLASS_CONTEXT: u8 = 2;

pub const TAG_INTEGER: u32 = 0x02;
pub const TAG_OCTET_STRING: u32 = 0x04;
pub const TAG_NULL: u32 = 0x05;
pub const TAG_ENUMERATED: u32 = 0x0a;
pub const TAG_SEQUENCE: u32 = 0x10;
pub const TAG_SET: u32 = 0x11;

/// One tag-length-value element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tlv<'a> {
    pub class: u8,
    pub constructed: bool,
    pub tag: u32,
    pub value: &'a [u8],
}

impl<'a> Tlv<'a> {
    #[must_use]
    pub fn is(&self, class: u8, tag: u32) -> bool {
        self.class == class && self.tag == tag
    }

    /// Reader over the contents of a constructed element
    #[must_use]
    pub fn children(&self) -> DerReader<'a> {
        DerReader::new(self.value)
    }

    /// Non-negative INTEGER/ENUMERATED that fits in a `u64`
    ///
    /// # Errors
    /// Returns a message if the content is empty, negative or too large.
    pub fn as_u64(&self) -> Result<u64, String> {
        let bytes = self.value;
        if bytes.is_empty() {
            return Err("empty integer".into());
        }
        if bytes[0] & 0x80 != 0 {
            return Err("negative integer".into());
        }
        let significant: &[u8] = if bytes.len() > 1 && bytes[0] == 0 {
            &bytes[1..]
        } else {
            bytes
        };
        if significant.len() > 8 {
            return Err("integer too large".into());
        }
        Ok(significant
            .iter()
            .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte)))
    }
}

/// Sequential reader over concatenated DER elements
#[derive(Debug, Clone)]
pub struct DerReader<'a> {
    data: &'a [u8],
}

impl<'a> DerReader<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read the next element
    ///
    /// # Errors
    /// Returns a message on truncated or unsupported encodings.
    pub fn read(&mut self) -> Result<Tlv<'a>, String> {
        let (&first, mut rest) = self
            .data
            .split_first()
            .ok_or_else(|| "unexpected end of DER data".to_string())?;

        let class = first >> 6;
        let constructed = first & 0x20 != 0;
        let mut tag = u32::from(first & 0x1f);
        if tag == 0x1f {
            tag = 0;
            loop {
                let (&byte, remaining) = rest
                    .split_first()
                    .ok_or_else(|| "truncated DER tag".to_string())?;
                rest = remaining;
                if tag > (u32::MAX >> 7) {
                    return Err("DER tag too large".into());
                }
                tag = (tag << 7) | u32::from(byte & 0x7f);
                if byte & 0x80 == 0 {
                    break;
                }
            }
        }

        let (&len_byte, remaining) = rest
            .split_first()
            .ok_or_else(|| "truncated DER length".to_string())?;
        rest = remaining;
        let length = if len_byte & 0x80 == 0 {
            usize::from(len_byte)
        } else {
            let count = usize::from(len_byte & 0x7f);
            if count == 0 || count > 4 || rest.len() < count {
                return Err("unsupported DER length".into());
            }
            let (len_bytes, remaining) = rest.split_at(count);
            rest = remaining;
            len_bytes
                .iter()
                .fold(0usize, |acc, byte| (acc << 8) | usize::from(*byte))
        };

        if rest.len() < length {
            return Err("DER value exceeds available data".into());
        }
        let (value, remaining) = rest.split_at(length);
        self.data = remaining;
        Ok(Tlv {
            class,
            constructed,
            tag,
            value,
        })
    }

    /// Read the next element and require a universal tag
    ///
    /// # Errors
    /// Returns a message if the next element has a different tag.
    pub fn expect(&mut self, tag: u32) -> Result<Tlv<'a>, String> {
        let tlv = self.read()?;
        if tlv.is(CLASS_UNIVERSAL, tag) {
            Ok(tlv)
        } else {
            Err(format!(
                "expected universal tag {tag:#x}, found class {} tag {:#x}",
                tlv.class, tlv.tag
            ))
        }
    }
}

/// Parse a single DER element that must span the whole input
///
/// # Errors
/// Returns a message on malformed input or trailing bytes.
pub fn parse_single(data: &[u8]) -> Result<Tlv<'_>, String> {
    let mut reader = DerReader::new(data);
    let tlv = reader.read()?;
    if reader.is_empty() {
        Ok(tlv)
    } else {
        Err("trailing bytes after DER element".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_of_integers() {
        // SEQUENCE { INTEGER 5, INTEGER 300 }
        let der = [0x30, 0x07, 0x02, 0x01, 0x05, 0x02, 0x02, 0x01, 0x2c];
        let seq = parse_single(&der).unwrap();
        assert!(seq.is(CLASS_UNIVERSAL, TAG_SEQUENCE));
        assert!(seq.constructed);
        let mut children = seq.children();
        assert_eq!(children.expect(TAG_INTEGER).unwrap().as_u64().unwrap(), 5);
        assert_eq!(children.expect(TAG_INTEGER).unwrap().as_u64().unwrap(), 300);
        assert!(children.is_empty());
    }

    #[test]
    fn test_high_tag_number_context_element() {
        // [702] EXPLICIT INTEGER 0  -> tag 702 = 0x05 0x3e in base-128
        let der = [0xbf, 0x85, 0x3e, 0x03, 0x02, 0x01, 0x00];
        let tlv = parse_single(&der).unwrap();
        assert_eq!(tlv.class, CLASS_CONTEXT);
        assert_eq!(tlv.tag, 702);
        let inner = parse_single(tlv.value).unwrap();
        assert_eq!(inner.as_u64().unwrap(), 0);
    }

    #[test]
    fn test_long_form_length() {
        let mut der = vec![0x04, 0x81, 0x80];
        der.extend_from_slice(&[0xAB; 128]);
        let tlv = parse_single(&der).unwrap();
        assert_eq!(tlv.value.len(), 128);
    }

    #[test]
    fn test_truncated_value() {
        assert!(parse_single(&[0x04, 0x05, 0x01]).is_err());
        assert!(DerReader::new(&[0x02, 0x01, 0xff])
            .read()
            .unwrap()
            .as_u64()
            .is_err());
    }
}
