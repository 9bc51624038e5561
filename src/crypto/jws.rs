//! Compact JWS with an `x5c` certificate header
//!
//! Used by the metadata BLOB and by SafetyNet attestation responses.

use openssl::bn::BigNum;
use openssl::ecdsa::EcdsaSig;
use openssl::x509::X509;
use serde::Deserialize;

use crate::codec::base64url;
use crate::crypto::signature::verify_with_pkey;
use crate::data::CoseAlgorithm;

#[derive(Debug, Clone, Deserialize)]
pub struct JwsHeader {
    pub alg: String,
    #[serde(default)]
    pub typ: Option<String>,
    #[serde(default)]
    pub x5c: Vec<String>,
}

/// A parsed but not yet verified compact JWS
#[derive(Debug, Clone)]
pub struct CompactJws {
    pub header: JwsHeader,
    pub payload: Vec<u8>,
    signing_input: Vec<u8>,
    signature: Vec<u8>,
}

impl CompactJws {
    /// Split and decode `header.payload.signature`
    ///
    /// # Errors
    /// Returns a message if the token does not have three base64url parts or
    /// the header is not valid JSON.
    pub fn parse(token: &str) -> Result<Self, String> {
        let token = token.trim();
        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err("JWS must have exactly three parts".into());
        };

        let header_bytes = base64url::decode(header).map_err(|e| format!("JWS header: {e}"))?;
        let header: JwsHeader =
            serde_json::from_slice(&header_bytes).map_err(|e| format!("JWS header: {e}"))?;

        Ok(Self {
            header,
            payload: base64url::decode(payload).map_err(|e| format!("JWS payload: {e}"))?,
            signing_input: token[..token.len() - signature.len() - 1].as_bytes().to_vec(),
            signature: base64url::decode(signature).map_err(|e| format!("JWS signature: {e}"))?,
        })
    }

    /// Decode the `x5c` header (standard base64 DER), leaf first
    ///
    /// # Errors
    /// Returns a message if the header is empty or a certificate is invalid.
    pub fn certificates(&self) -> Result<Vec<X509>, String> {
        if self.header.x5c.is_empty() {
            return Err("JWS header has no x5c certificates".into());
        }
        self.header
            .x5c
            .iter()
            .map(|encoded| {
                let der = base64url::decode_standard(encoded).map_err(|e| format!("x5c: {e}"))?;
                X509::from_der(&der).map_err(|e| format!("x5c: {e}"))
            })
            .collect()
    }

    /// Verify the signature with the given certificate's public key
    ///
    /// # Errors
    /// Returns a message for unsupported algorithms or a bad signature.
    pub fn verify(&self, certificate: &X509) -> Result<(), String> {
        let alg = CoseAlgorithm::from_name(&self.header.alg)
            .filter(|alg| {
                matches!(
                    alg,
                    CoseAlgorithm::Es256
                        | CoseAlgorithm::Es384
                        | CoseAlgorithm::Rs256
                        | CoseAlgorithm::Rs384
                        | CoseAlgorithm::Rs512
                        | CoseAlgorithm::Ps256
                )
            })
            .ok_or_else(|| format!("unsupported JWS algorithm '{}'", self.header.alg))?;

        let signature = match alg {
            CoseAlgorithm::Es256 => raw_ecdsa_to_der(&self.signature, 32)?,
            CoseAlgorithm::Es384 => raw_ecdsa_to_der(&self.signature, 48)?,
            _ => self.signature.clone(),
        };

        let key = certificate.public_key().map_err(|e| e.to_string())?;
        verify_with_pkey(&key, alg, &self.signing_input, &signature).map_err(|e| e.to_string())
    }
}

/// JWS ECDSA signatures are `r || s`; `openssl` wants DER
fn raw_ecdsa_to_der(signature: &[u8], coordinate_length: usize) -> Result<Vec<u8>, String> {
    if signature.len() != coordinate_length * 2 {
        return Err(format!(
            "ECDSA signature must be {} bytes, got {}",
            coordinate_length * 2,
            signature.len()
        ));
    }
    let (r, s) = signature.split_at(coordinate_length);
    let sig = BigNum::from_slice(r)
        .and_then(|r| BigNum::from_slice(s).map(|s| (r, s)))
        .and_then(|(r, s)| EcdsaSig::from_private_components(r, s))
        .map_err(|e| e.to_string())?;
    sig.to_der().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_wrong_part_count() {
        assert!(CompactJws::parse("a.b").is_err());
        assert!(CompactJws::parse("a.b.c.d").is_err());
    }

    #[test]
    fn test_parse_header_and_payload() {
        let header = base64url::encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let payload = base64url::encode(br#"{"no":1}"#);
        let token = format!("{header}.{payload}.AAAA");
        let jws = CompactJws::parse(&token).unwrap();
        assert_eq!(jws.header.alg, "RS256");
        assert_eq!(jws.payload, br#"{"no":1}"#);
        assert_eq!(jws.signing_input, format!("{header}.{payload}").as_bytes());
        assert!(jws.certificates().is_err());
    }

    #[test]
    fn test_raw_ecdsa_length_check() {
        assert!(raw_ecdsa_to_der(&[1; 63], 32).is_err());
        assert!(raw_ecdsa_to_der(&[1; 64], 32).is_ok());
    }
}
