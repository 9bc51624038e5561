//! ES256 compact JWS signing with an `x5c` header

use openssl::ecdsa::EcdsaSig;
use openssl::error::ErrorStack;
use openssl::pkey::{PKey, Private};
use openssl::x509::X509;
use serde_json::json;

use crate::codec::base64url;
use crate::crypto::sha256;

/// Sign `payload` with `key`; `chain` goes into `x5c`, signer first
///
/// # Errors
/// Any `openssl` failure, including a key that is not an EC key.
pub fn sign_compact(key: &PKey<Private>, chain: &[&X509], payload: &[u8]) -> Result<String, ErrorStack> {
    let x5c = chain
        .iter()
        .map(|certificate| certificate.to_der().map(|der| base64url::encode_standard(&der)))
        .collect::<Result<Vec<_>, _>>()?;
    let header = json!({ "alg": "ES256", "typ": "JWT", "x5c": x5c });

    let signing_input = format!(
        "{}.{}",
        base64url::encode(header.to_string().as_bytes()),
        base64url::encode(payload)
    );
    let ec_key = key.ec_key()?;
    let signature = EcdsaSig::sign(&sha256(signing_input.as_bytes()), &ec_key)?;
    let mut raw = signature.r().to_vec_padded(32)?;
    raw.extend(signature.s().to_vec_padded(32)?);

    Ok(format!("{signing_input}.{}", base64url::encode(&raw)))
}
