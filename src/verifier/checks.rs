//! Atomic ceremony checks
//!
//! Each check is a pure function of the observed value and the expectation.

use std::collections::HashSet;

use log::debug;

use crate::codec::base64url;
use crate::crypto::{hex, sha256};
use crate::data::{
    AuthenticatorExtensions, AuthenticatorFlags, Challenge, ClientData, ClientDataType,
    ClientExtensionOutputs, CoseAlgorithm, CoseKey, ServerProperty, TokenBindingStatus,
};
use crate::error::VerificationError;
use crate::verifier::OriginPolicy;

/// Default upper bound on credential id length
pub const DEFAULT_MAX_CREDENTIAL_ID_LENGTH: usize = 1023;

/// Client data must be for the expected ceremony
///
/// # Errors
/// `BadClientDataType` on mismatch.
pub fn check_client_data_type(
    observed: ClientDataType,
    expected: ClientDataType,
) -> Result<(), VerificationError> {
    if observed == expected {
        Ok(())
    } else {
        Err(VerificationError::BadClientDataType {
            expected: expected.as_str().to_string(),
            actual: observed.as_str().to_string(),
        })
    }
}

/// # Errors
/// `BadChallenge` when the decoded challenge bytes differ.
pub fn check_challenge(observed: &Challenge, expected: &Challenge) -> Result<(), VerificationError> {
    if observed == expected {
        Ok(())
    } else {
        Err(VerificationError::BadChallenge {
            expected: expected.to_base64url(),
            actual: observed.to_base64url(),
        })
    }
}

/// The client origin must be trusted by the origin policy
///
/// `topOrigin` is carried through untouched.
///
/// # Errors
/// `BadOrigin` when the policy rejects the origin.
pub fn check_origin(
    client_data: &ClientData,
    server_property: &ServerProperty,
    policy: &dyn OriginPolicy,
) -> Result<(), VerificationError> {
    if policy.is_trusted(&client_data.origin, server_property) {
        Ok(())
    } else {
        debug!("❌ Untrusted origin {}", client_data.origin);
        Err(VerificationError::BadOrigin {
            origin: client_data.origin.to_string(),
        })
    }
}

/// A `present` token binding must carry the server's token binding id
///
/// # Errors
/// `BadTokenBinding` on mismatch or when the server has no id to compare.
pub fn check_token_binding(
    client_data: &ClientData,
    server_token_binding_id: Option<&[u8]>,
) -> Result<(), VerificationError> {
    let Some(token_binding) = &client_data.token_binding else {
        return Ok(());
    };
    if token_binding.status != TokenBindingStatus::Present {
        return Ok(());
    }

    let client_id = token_binding
        .id_bytes()
        .ok_or_else(|| VerificationError::BadTokenBinding("status is present but id is missing".into()))?;
    match server_token_binding_id {
        Some(server_id) if server_id == client_id.as_slice() => Ok(()),
        Some(_) => Err(VerificationError::BadTokenBinding("token binding id mismatch".into())),
        None => Err(VerificationError::BadTokenBinding(
            "client reported token binding but server has no token binding id".into(),
        )),
    }
}

/// # Errors
/// `BadRpIdHash` when `rp_id_hash != SHA-256(rp_id)`.
pub fn check_rp_id_hash(rp_id_hash: &[u8; 32], rp_id: &str) -> Result<(), VerificationError> {
    let expected = sha256(rp_id.as_bytes());
    if &expected == rp_id_hash {
        Ok(())
    } else {
        Err(VerificationError::BadRpIdHash {
            expected: hex(&expected),
            actual: hex(rp_id_hash),
        })
    }
}

/// # Errors
/// `UserNotPresent` / `UserNotVerified` when a required flag is missing.
pub fn check_user_flags(
    flags: AuthenticatorFlags,
    user_presence_required: bool,
    user_verification_required: bool,
) -> Result<(), VerificationError> {
    if user_presence_required && !flags.user_present() {
        return Err(VerificationError::UserNotPresent);
    }
    if user_verification_required && !flags.user_verified() {
        return Err(VerificationError::UserNotVerified);
    }
    Ok(())
}

/// BS may only be set together with BE
///
/// # Errors
/// `IllegalBackupState` otherwise.
pub fn check_backup_state(flags: AuthenticatorFlags) -> Result<(), VerificationError> {
    if flags.backup_state() && !flags.backup_eligible() {
        Err(VerificationError::IllegalBackupState)
    } else {
        Ok(())
    }
}

/// BE is fixed at credential creation and must not change afterwards
///
/// # Errors
/// `BadBackupEligibleFlag` if the stored value differs.
pub fn check_backup_eligible_unchanged(
    stored: Option<bool>,
    flags: AuthenticatorFlags,
) -> Result<(), VerificationError> {
    match stored {
        Some(stored) if stored != flags.backup_eligible() => {
            Err(VerificationError::BadBackupEligibleFlag {
                stored,
                presented: flags.backup_eligible(),
            })
        }
        _ => Ok(()),
    }
}

/// The credential key algorithm must be one the RP asked for
///
/// # Errors
/// `NotAllowedAlgorithm` when absent from `allowed` or undeclared.
pub fn check_algorithm(key: &CoseKey, allowed: &[CoseAlgorithm]) -> Result<(), VerificationError> {
    match key.algorithm {
        Some(alg) if allowed.contains(&alg) => Ok(()),
        Some(alg) => Err(VerificationError::NotAllowedAlgorithm {
            algorithm: alg.to_string(),
        }),
        None => Err(VerificationError::NotAllowedAlgorithm {
            algorithm: "unspecified".into(),
        }),
    }
}

/// # Errors
/// `CredentialIdTooLong` when longer than `max`.
pub fn check_credential_id_length(credential_id: &[u8], max: usize) -> Result<(), VerificationError> {
    if credential_id.len() > max {
        Err(VerificationError::CredentialIdTooLong {
            length: credential_id.len(),
            max,
        })
    } else {
        Ok(())
    }
}

/// # Errors
/// `NotAllowedCredentialId` when an allow list is given and lacks the id.
pub fn check_allow_credentials(
    credential_id: &[u8],
    allow_credentials: Option<&[Vec<u8>]>,
) -> Result<(), VerificationError> {
    match allow_credentials {
        Some(allowed) if !allowed.is_empty() && !allowed.iter().any(|id| id == credential_id) => {
            debug!(
                "❌ Credential {} not in allowCredentials",
                base64url::encode(credential_id)
            );
            Err(VerificationError::NotAllowedCredentialId)
        }
        _ => Ok(()),
    }
}

/// Sign counter must be 0 (unsupported) or strictly increase
///
/// # Errors
/// `MaliciousCounterValue` for a non-increasing non-zero counter.
pub fn check_sign_count(stored: u32, presented: u32) -> Result<(), VerificationError> {
    if presented == 0 || presented > stored {
        Ok(())
    } else {
        Err(VerificationError::MaliciousCounterValue { stored, presented })
    }
}

/// How unsolicited client extension outputs are treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtensionPolicy {
    pub reject_unsolicited: bool,
}

fn bad_output(identifier: &str, reason: &str) -> VerificationError {
    VerificationError::BadExtensionOutput {
        identifier: identifier.to_string(),
        reason: reason.to_string(),
    }
}

fn check_authenticator_extension(
    identifier: &str,
    output: &ciborium::Value,
) -> Result<(), VerificationError> {
    match identifier {
        "credProtect" => match crate::codec::cbor::to_i64(output) {
            Some(1..=3) => Ok(()),
            _ => Err(bad_output(identifier, "must be 1, 2 or 3")),
        },
        "hmac-secret" if !output.is_bool() => Err(bad_output(identifier, "must be a boolean")),
        "minPinLength" => match crate::codec::cbor::to_i64(output) {
            Some(value) if value >= 0 => Ok(()),
            _ => Err(bad_output(identifier, "must be an unsigned integer")),
        },
        "credBlob" if !output.is_bool() && !output.is_bytes() => {
            Err(bad_output(identifier, "must be a boolean or byte string"))
        }
        _ => Ok(()),
    }
}

/// Authenticator outputs must be well-formed; client outputs must have been
/// requested or echo an authenticator output when the policy demands it
///
/// # Errors
/// `BadExtensionOutput` or `UnexpectedExtension`.
pub fn check_extensions(
    authenticator_extensions: &AuthenticatorExtensions,
    client_extensions: &ClientExtensionOutputs,
    requested: Option<&[String]>,
    policy: ExtensionPolicy,
) -> Result<(), VerificationError> {
    for (identifier, output) in authenticator_extensions {
        check_authenticator_extension(identifier, output)?;
    }

    let requested: HashSet<&str> = requested
        .unwrap_or_default()
        .iter()
        .map(String::as_str)
        .collect();
    for identifier in client_extensions.keys() {
        let known = requested.contains(identifier.as_str())
            || authenticator_extensions.contains_key(identifier);
        if known {
            continue;
        }
        if policy.reject_unsolicited {
            return Err(VerificationError::UnexpectedExtension(identifier.clone()));
        }
        debug!("ℹ Unsolicited client extension output '{identifier}' kept");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::cbor;
    use crate::data::{CoseCurve, CoseKeyParams, Origin, TokenBinding};
    use crate::verifier::ServerPropertyOrigins;

    fn client_data(origin: &str) -> ClientData {
        ClientData {
            client_data_type: ClientDataType::Create,
            challenge: Challenge::from_base64url("tk31UH1ETGGTPj33OhOMzw").unwrap(),
            origin: Origin::parse(origin).unwrap(),
            cross_origin: None,
            top_origin: None,
            token_binding: None,
        }
    }

    fn server_property() -> ServerProperty {
        ServerProperty::new(
            Origin::parse("http://localhost:8080").unwrap(),
            "localhost",
            Challenge::from_base64url("tk31UH1ETGGTPj33OhOMzw").unwrap(),
        )
    }

    #[test]
    fn test_challenge_compares_bytes() {
        let expected = Challenge::from_base64url("tk31UH1ETGGTPj33OhOMzw").unwrap();
        let padded = Challenge::from_base64url("tk31UH1ETGGTPj33OhOMzw==").unwrap();
        assert!(check_challenge(&padded, &expected).is_ok());

        let other = Challenge::new(vec![1, 2, 3]);
        let err = check_challenge(&other, &expected).unwrap_err();
        assert_eq!(
            err,
            VerificationError::BadChallenge {
                expected: "tk31UH1ETGGTPj33OhOMzw".into(),
                actual: "AQID".into()
            }
        );
    }

    #[test]
    fn test_origin_membership() {
        let server = server_property();
        assert!(check_origin(&client_data("http://localhost:8080"), &server, &ServerPropertyOrigins).is_ok());
        assert!(matches!(
            check_origin(&client_data("http://localhost:8081"), &server, &ServerPropertyOrigins),
            Err(VerificationError::BadOrigin { .. })
        ));
    }

    #[test]
    fn test_token_binding() {
        let mut data = client_data("http://localhost:8080");
        assert!(check_token_binding(&data, None).is_ok());

        data.token_binding = Some(TokenBinding {
            status: TokenBindingStatus::Supported,
            id: None,
        });
        assert!(check_token_binding(&data, None).is_ok());

        data.token_binding = Some(TokenBinding {
            status: TokenBindingStatus::Present,
            id: Some("AQID".into()),
        });
        assert!(check_token_binding(&data, Some(&[1, 2, 3])).is_ok());
        assert!(check_token_binding(&data, Some(&[1, 2, 4])).is_err());
        assert!(check_token_binding(&data, None).is_err());
    }

    #[test]
    fn test_rp_id_hash() {
        let hash = sha256(b"localhost");
        assert!(check_rp_id_hash(&hash, "localhost").is_ok());
        assert!(matches!(
            check_rp_id_hash(&hash, "example.com"),
            Err(VerificationError::BadRpIdHash { .. })
        ));
    }

    #[test]
    fn test_user_flags() {
        let up = AuthenticatorFlags::from_bits(AuthenticatorFlags::USER_PRESENT);
        assert!(check_user_flags(up, true, false).is_ok());
        assert_eq!(
            check_user_flags(up, true, true),
            Err(VerificationError::UserNotVerified)
        );
        assert_eq!(
            check_user_flags(AuthenticatorFlags::default(), true, false),
            Err(VerificationError::UserNotPresent)
        );
        assert!(check_user_flags(AuthenticatorFlags::default(), false, false).is_ok());
    }

    #[test]
    fn test_backup_state_requires_eligibility() {
        for bits in 0u8..=u8::MAX {
            let flags = AuthenticatorFlags::from_bits(bits);
            let result = check_backup_state(flags);
            if flags.backup_state() && !flags.backup_eligible() {
                assert_eq!(result, Err(VerificationError::IllegalBackupState));
            } else {
                assert!(result.is_ok());
            }
        }
    }

    #[test]
    fn test_backup_eligible_unchanged() {
        let be = AuthenticatorFlags::from_bits(AuthenticatorFlags::BACKUP_ELIGIBLE);
        assert!(check_backup_eligible_unchanged(Some(true), be).is_ok());
        assert!(check_backup_eligible_unchanged(None, be).is_ok());
        assert!(matches!(
            check_backup_eligible_unchanged(Some(false), be),
            Err(VerificationError::BadBackupEligibleFlag { .. })
        ));
    }

    #[test]
    fn test_algorithm_allow_list() {
        let mut key = CoseKey {
            key_id: None,
            algorithm: Some(CoseAlgorithm::Es256),
            params: CoseKeyParams::Ec2 {
                curve: CoseCurve::P256,
                x: vec![0; 32],
                y: vec![0; 32],
            },
        };
        assert!(check_algorithm(&key, &[CoseAlgorithm::Es256]).is_ok());
        assert!(matches!(
            check_algorithm(&key, &[CoseAlgorithm::Rs256]),
            Err(VerificationError::NotAllowedAlgorithm { .. })
        ));
        key.algorithm = None;
        assert!(check_algorithm(&key, &[CoseAlgorithm::Es256]).is_err());
    }

    #[test]
    fn test_credential_id_length_boundary() {
        assert!(check_credential_id_length(&[0; 1023], DEFAULT_MAX_CREDENTIAL_ID_LENGTH).is_ok());
        assert_eq!(
            check_credential_id_length(&[0; 1024], DEFAULT_MAX_CREDENTIAL_ID_LENGTH),
            Err(VerificationError::CredentialIdTooLong {
                length: 1024,
                max: 1023
            })
        );
    }

    #[test]
    fn test_sign_count_sequences() {
        assert!(check_sign_count(0, 0).is_ok());
        assert!(check_sign_count(5, 7).is_ok());
        assert_eq!(
            check_sign_count(7, 5),
            Err(VerificationError::MaliciousCounterValue {
                stored: 7,
                presented: 5
            })
        );
        assert!(check_sign_count(7, 7).is_err());
        assert!(check_sign_count(7, 0).is_ok());
    }

    #[test]
    fn test_allow_credentials() {
        let allowed = vec![vec![1, 2], vec![3]];
        assert!(check_allow_credentials(&[3], Some(&allowed)).is_ok());
        assert!(check_allow_credentials(&[4], None).is_ok());
        assert!(check_allow_credentials(&[4], Some(&[])).is_ok());
        assert_eq!(
            check_allow_credentials(&[4], Some(&allowed)),
            Err(VerificationError::NotAllowedCredentialId)
        );
    }

    #[test]
    fn test_extension_consistency() {
        let mut authenticator = AuthenticatorExtensions::new();
        authenticator.insert("credProtect".into(), cbor::int(2));
        let mut client = ClientExtensionOutputs::new();
        client.insert("credProps".into(), serde_json::json!({"rk": true}));

        let lenient = ExtensionPolicy::default();
        let strict = ExtensionPolicy {
            reject_unsolicited: true,
        };
        assert!(check_extensions(&authenticator, &client, None, lenient).is_ok());
        assert!(matches!(
            check_extensions(&authenticator, &client, None, strict),
            Err(VerificationError::UnexpectedExtension(id)) if id == "credProps"
        ));
        let requested = vec!["credProps".to_string()];
        assert!(check_extensions(&authenticator, &client, Some(&requested), strict).is_ok());

        authenticator.insert("credProtect".into(), cbor::int(7));
        assert!(matches!(
            check_extensions(&authenticator, &client, Some(&requested), lenient),
            Err(VerificationError::BadExtensionOutput { .. })
        ));
    }
}
