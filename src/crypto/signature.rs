//! Signature verification for COSE keys and certificate keys

use log::debug;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{Id, PKey, PKeyRef, Public};
use openssl::rsa::{Padding, Rsa};
use openssl::sign::{RsaPssSaltlen, Verifier};
use ring::signature;

use crate::data::{CoseAlgorithm, CoseCurve, CoseKey, CoseKeyParams};
use crate::error::VerificationError;

fn bad_signature(msg: impl Into<String>) -> VerificationError {
    VerificationError::BadSignature(msg.into())
}

/// Verify `sig` over `message` with a credential public key
///
/// # Errors
/// Returns `BadSignature` if the key cannot be used with `alg` or the
/// signature does not verify.
pub fn verify_cose_signature(
    key: &CoseKey,
    alg: CoseAlgorithm,
    message: &[u8],
    sig: &[u8],
) -> Result<(), VerificationError> {
    let result = match (&key.params, alg) {
        (CoseKeyParams::Ec2 { curve: CoseCurve::P256, .. }, CoseAlgorithm::Es256) => {
            let point = key.uncompressed_point().unwrap_or_default();
            signature::UnparsedPublicKey::new(&signature::ECDSA_P256_SHA256_ASN1, &point)
                .verify(message, sig)
        }
        (CoseKeyParams::Ec2 { curve: CoseCurve::P384, .. }, CoseAlgorithm::Es384) => {
            let point = key.uncompressed_point().unwrap_or_default();
            signature::UnparsedPublicKey::new(&signature::ECDSA_P384_SHA384_ASN1, &point)
                .verify(message, sig)
        }
        (CoseKeyParams::Ec2 { curve: CoseCurve::P521, .. }, CoseAlgorithm::Es512) => {
            let pkey = cose_key_to_pkey(key)?;
            return verify_with_pkey(&pkey, alg, message, sig);
        }
        (CoseKeyParams::Okp { curve: CoseCurve::Ed25519, x }, CoseAlgorithm::EdDsa) => {
            signature::UnparsedPublicKey::new(&signature::ED25519, x).verify(message, sig)
        }
        (CoseKeyParams::Rsa { n, e }, alg) => {
            let params: &dyn signature::VerificationAlgorithm = match alg {
                CoseAlgorithm::Rs256 => &signature::RSA_PKCS1_2048_8192_SHA256,
                CoseAlgorithm::Rs384 => &signature::RSA_PKCS1_2048_8192_SHA384,
                CoseAlgorithm::Rs512 => &signature::RSA_PKCS1_2048_8192_SHA512,
                CoseAlgorithm::Rs1 => &signature::RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY,
                CoseAlgorithm::Ps256 => &signature::RSA_PSS_2048_8192_SHA256,
                CoseAlgorithm::Ps384 => &signature::RSA_PSS_2048_8192_SHA384,
                CoseAlgorithm::Ps512 => &signature::RSA_PSS_2048_8192_SHA512,
                other => return Err(bad_signature(format!("{other} cannot be used with an RSA key"))),
            };
            let der = rsa_public_key_der(n, e)?;
            signature::UnparsedPublicKey::new(params, &der).verify(message, sig)
        }
        (_, alg) => {
            return Err(bad_signature(format!(
                "{alg} is not supported for COSE key type {}",
                key.key_type()
            )))
        }
    };

    result.map_err(|_| {
        debug!("❌ Signature verification failed for {alg}");
        bad_signature("signature does not verify with the credential public key")
    })
}

/// PKCS#1 `RSAPublicKey` DER as `ring` expects it
fn rsa_public_key_der(n: &[u8], e: &[u8]) -> Result<Vec<u8>, VerificationError> {
    let rsa = Rsa::from_public_components(BigNum::from_slice(n)?, BigNum::from_slice(e)?)?;
    Ok(rsa.public_key_to_der_pkcs1()?)
}

fn curve_nid(curve: CoseCurve) -> Result<Nid, VerificationError> {
    match curve {
        CoseCurve::P256 => Ok(Nid::X9_62_PRIME256V1),
        CoseCurve::P384 => Ok(Nid::SECP384R1),
        CoseCurve::P521 => Ok(Nid::SECP521R1),
        other => Err(bad_signature(format!("unsupported EC curve {other:?}"))),
    }
}

/// Convert a COSE key into an `openssl` public key
///
/// # Errors
/// Returns `BadSignature` for symmetric keys or unsupported curves.
pub fn cose_key_to_pkey(key: &CoseKey) -> Result<PKey<Public>, VerificationError> {
    match &key.params {
        CoseKeyParams::Ec2 { curve, x, y } => {
            let group = EcGroup::from_curve_name(curve_nid(*curve)?)?;
            let x = BigNum::from_slice(x)?;
            let y = BigNum::from_slice(y)?;
            let ec = EcKey::from_public_key_affine_coordinates(&group, &x, &y)?;
            Ok(PKey::from_ec_key(ec)?)
        }
        CoseKeyParams::Rsa { n, e } => {
            let rsa = Rsa::from_public_components(BigNum::from_slice(n)?, BigNum::from_slice(e)?)?;
            Ok(PKey::from_rsa(rsa)?)
        }
        CoseKeyParams::Okp {
            curve: CoseCurve::Ed25519,
            x,
        } => Ok(PKey::public_key_from_raw_bytes(x, Id::ED25519)?),
        CoseKeyParams::Okp { curve, .. } => {
            Err(bad_signature(format!("unsupported OKP curve {curve:?}")))
        }
        CoseKeyParams::Symmetric { .. } => Err(bad_signature("symmetric key has no public part")),
    }
}

fn message_digest(alg: CoseAlgorithm) -> Result<MessageDigest, VerificationError> {
    match alg {
        CoseAlgorithm::Es256 | CoseAlgorithm::Rs256 | CoseAlgorithm::Ps256 => {
            Ok(MessageDigest::sha256())
        }
        CoseAlgorithm::Es384 | CoseAlgorithm::Rs384 | CoseAlgorithm::Ps384 => {
            Ok(MessageDigest::sha384())
        }
        CoseAlgorithm::Es512 | CoseAlgorithm::Rs512 | CoseAlgorithm::Ps512 => {
            Ok(MessageDigest::sha512())
        }
        CoseAlgorithm::Rs1 => Ok(MessageDigest::sha1()),
        other => Err(bad_signature(format!("no digest for {other}"))),
    }
}

/// Verify a signature with an `openssl` public key
///
/// # Errors
/// Returns `BadSignature` if the signature does not verify.
pub fn verify_with_pkey(
    pkey: &PKeyRef<Public>,
    alg: CoseAlgorithm,
    message: &[u8],
    sig: &[u8],
) -> Result<(), VerificationError> {
    let verified = if alg == CoseAlgorithm::EdDsa {
        Verifier::new_without_digest(pkey).and_then(|mut verifier| verifier.verify_oneshot(sig, message))
    } else {
        let digest = message_digest(alg)?;
        let pss = matches!(
            alg,
            CoseAlgorithm::Ps256 | CoseAlgorithm::Ps384 | CoseAlgorithm::Ps512
        );
        Verifier::new(digest, pkey).and_then(|mut verifier| {
            if pss {
                verifier.set_rsa_padding(Padding::PKCS1_PSS)?;
                verifier.set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)?;
            }
            verifier.update(message)?;
            verifier.verify(sig)
        })
    };

    match verified {
        Ok(true) => Ok(()),
        Ok(false) | Err(_) => {
            debug!("❌ Certificate signature verification failed for {alg}");
            Err(bad_signature("signature does not verify with the certificate key"))
        }
    }
}

/// Whether a COSE key and an `openssl` key are the same public key
///
/// # Errors
/// Returns `BadSignature` if the COSE key cannot be converted.
pub fn same_public_key(
    key: &CoseKey,
    other: &PKeyRef<Public>,
) -> Result<bool, VerificationError> {
    let converted = cose_key_to_pkey(key)?;
    Ok(converted.public_eq(other))
}
