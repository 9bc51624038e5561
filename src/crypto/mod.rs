//! Cryptographic helpers
//!
//! Hashing uses `sha2`, credential signatures are verified with `ring`, and
//! everything certificate-shaped goes through `openssl` (with `x509-parser`
//! for extension inspection).

pub mod jws;
pub mod signature;
pub mod x509;

use sha2::{Digest, Sha256};

#[must_use]
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// `authenticatorData || SHA-256(clientDataJSON)`, the message every
/// assertion and most attestation signatures cover
#[must_use]
pub fn signed_data(authenticator_data: &[u8], client_data_hash: &[u8; 32]) -> Vec<u8> {
    let mut data = Vec::with_capacity(authenticator_data.len() + 32);
    data.extend_from_slice(authenticator_data);
    data.extend_from_slice(client_data_hash);
    data
}

/// Lowercase hex, used for diagnostics and key identifiers
#[must_use]
pub fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_of_rp_id() {
        assert_eq!(
            hex(&sha256(b"localhost")),
            "49960de5880e8c687434170f6476605b8fe4aeb9a28632c7995cf3ba831d9763"
        );
    }

    #[test]
    fn test_signed_data_layout() {
        let data = signed_data(&[1, 2, 3], &[9; 32]);
        assert_eq!(data.len(), 35);
        assert_eq!(&data[..3], &[1, 2, 3]);
        assert_eq!(data[34], 9);
    }
}
