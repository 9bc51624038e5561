//! Software authenticator
//!
//! Produces registration responses in every supported attestation format
//! and signed assertions, from a P-256 or Ed25519 credential key generated
//! at construction time.

use anyhow::{Context, Result};
use chrono::Utc;
use openssl::bn::{BigNum, BigNumContext};
use openssl::hash::MessageDigest;
use openssl::pkey::{Id, PKey, Private};
use openssl::sign::Signer;
use serde_json::json;
use uuid::Uuid;

use crate::codec::{self, base64url};
use crate::crypto::{sha256, signed_data};
use crate::data::{
    AndroidKeyStatement, AndroidSafetyNetStatement, AppleStatement, AttestationFormat,
    AttestationObject, AttestationStatement, AttestationType, AttestedCredentialData,
    AuthenticationRequest, AuthenticatorData, AuthenticatorExtensions, AuthenticatorFlags,
    Challenge, ClientData, ClientDataType, CoseAlgorithm, CoseCurve, CoseKey, CoseKeyParams,
    CredentialRecord, FidoU2fStatement, Origin, PackedStatement, RegistrationRequest,
    TpmStatement,
};
use crate::testing::certificates::{generate_p256_key, LeafOptions, TestCertificateAuthority};
use crate::testing::constants::{TEST_AAGUID, TEST_ORIGIN, TEST_RP_ID, TEST_USER_HANDLE};
use crate::testing::der;
use crate::testing::jws::sign_compact;
use crate::verifier::attestation::tpm::{
    TPM_ALG_ECC, TPM_ALG_SHA256, TPM_ECC_NIST_P256, TPM_GENERATED_VALUE, TPM_ST_ATTEST_CERTIFY,
};

const TPM_ALG_NULL: u16 = 0x0010;

/// Attestation to produce, with the CA that issues its certificates
#[derive(Debug, Clone, Copy)]
pub enum TestAttestation<'a> {
    None,
    /// `packed` without `x5c`
    SelfAttestation,
    Packed(&'a TestCertificateAuthority),
    FidoU2f(&'a TestCertificateAuthority),
    Tpm(&'a TestCertificateAuthority),
    AndroidKey(&'a TestCertificateAuthority),
    AndroidSafetyNet(&'a TestCertificateAuthority),
    Apple(&'a TestCertificateAuthority),
}

impl TestAttestation<'_> {
    #[must_use]
    pub fn format(&self) -> AttestationFormat {
        match self {
            Self::None => AttestationFormat::None,
            Self::SelfAttestation | Self::Packed(_) => AttestationFormat::Packed,
            Self::FidoU2f(_) => AttestationFormat::FidoU2f,
            Self::Tpm(_) => AttestationFormat::Tpm,
            Self::AndroidKey(_) => AttestationFormat::AndroidKey,
            Self::AndroidSafetyNet(_) => AttestationFormat::AndroidSafetyNet,
            Self::Apple(_) => AttestationFormat::Apple,
        }
    }

    /// Attestation type a successful verification reports
    #[must_use]
    pub fn expected_type(&self) -> AttestationType {
        match self {
            Self::None => AttestationType::None,
            Self::SelfAttestation => AttestationType::SelfAttestation,
            Self::Packed(_) | Self::FidoU2f(_) | Self::AndroidKey(_) | Self::AndroidSafetyNet(_) => {
                AttestationType::Basic
            }
            Self::Tpm(_) => AttestationType::AttCa,
            Self::Apple(_) => AttestationType::AnonCa,
        }
    }
}

/// A single-credential authenticator
#[derive(Debug, Clone)]
pub struct TestAuthenticator {
    pub rp_id: String,
    pub origin: String,
    pub aaguid: Uuid,
    pub credential_id: Vec<u8>,
    pub flags: AuthenticatorFlags,
    pub sign_count: u32,
    pub extensions: AuthenticatorExtensions,
    pub transports: Vec<String>,
    key: PKey<Private>,
}

impl TestAuthenticator {
    /// P-256 credential for `localhost`, user present and verified
    ///
    /// # Errors
    /// Any `openssl` failure.
    pub fn new() -> Result<Self> {
        Self::with_key(generate_p256_key()?)
    }

    /// Ed25519 credential; only `none` and self attestation apply
    ///
    /// # Errors
    /// Any `openssl` failure.
    pub fn ed25519() -> Result<Self> {
        Self::with_key(PKey::generate_ed25519()?)
    }

    fn with_key(key: PKey<Private>) -> Result<Self> {
        let mut credential_id = vec![0; 32];
        openssl::rand::rand_bytes(&mut credential_id)?;
        Ok(Self {
            rp_id: TEST_RP_ID.into(),
            origin: TEST_ORIGIN.into(),
            aaguid: Uuid::from_bytes(TEST_AAGUID),
            credential_id,
            flags: AuthenticatorFlags::from_bits(
                AuthenticatorFlags::USER_PRESENT | AuthenticatorFlags::USER_VERIFIED,
            ),
            sign_count: 0,
            extensions: AuthenticatorExtensions::new(),
            transports: vec!["internal".into()],
            key,
        })
    }

    #[must_use]
    pub fn with_rp_id(mut self, rp_id: &str) -> Self {
        self.rp_id = rp_id.into();
        self
    }

    #[must_use]
    pub fn with_origin(mut self, origin: &str) -> Self {
        self.origin = origin.into();
        self
    }

    #[must_use]
    pub fn with_aaguid(mut self, aaguid: Uuid) -> Self {
        self.aaguid = aaguid;
        self
    }

    #[must_use]
    pub fn with_credential_id(mut self, credential_id: Vec<u8>) -> Self {
        self.credential_id = credential_id;
        self
    }

    #[must_use]
    pub fn with_flags(mut self, flags: u8) -> Self {
        self.flags = AuthenticatorFlags::from_bits(flags);
        self
    }

    #[must_use]
    pub fn with_sign_count(mut self, sign_count: u32) -> Self {
        self.sign_count = sign_count;
        self
    }

    #[must_use]
    pub fn with_extension(mut self, identifier: &str, output: ciborium::Value) -> Self {
        self.extensions.insert(identifier.into(), output);
        self
    }

    /// COSE algorithm of the credential key
    #[must_use]
    pub fn algorithm(&self) -> CoseAlgorithm {
        if self.key.id() == Id::ED25519 {
            CoseAlgorithm::EdDsa
        } else {
            CoseAlgorithm::Es256
        }
    }

    /// # Errors
    /// Any `openssl` failure.
    pub fn credential_public_key(&self) -> Result<CoseKey> {
        let params = if self.key.id() == Id::ED25519 {
            CoseKeyParams::Okp {
                curve: CoseCurve::Ed25519,
                x: self.key.raw_public_key()?,
            }
        } else {
            let ec = self.key.ec_key()?;
            let mut ctx = BigNumContext::new()?;
            let mut x = BigNum::new()?;
            let mut y = BigNum::new()?;
            ec.public_key()
                .affine_coordinates(ec.group(), &mut x, &mut y, &mut ctx)?;
            CoseKeyParams::Ec2 {
                curve: CoseCurve::P256,
                x: x.to_vec_padded(32)?,
                y: y.to_vec_padded(32)?,
            }
        };
        Ok(CoseKey {
            key_id: None,
            algorithm: Some(self.algorithm()),
            params,
        })
    }

    /// The record a relying party would have stored after registration
    ///
    /// # Errors
    /// Any `openssl` failure.
    pub fn credential_record(&self, attestation_type: AttestationType) -> Result<CredentialRecord> {
        Ok(CredentialRecord {
            credential_id: self.credential_id.clone(),
            public_key: self.credential_public_key()?,
            sign_count: self.sign_count,
            aaguid: self.aaguid,
            attestation_type,
            backup_eligible: Some(self.flags.backup_eligible()),
            backup_state: Some(self.flags.backup_state()),
            uv_initialized: Some(self.flags.user_verified()),
            transports: self.transports.clone(),
        })
    }

    /// # Errors
    /// An unparsable origin or a serialization failure.
    pub fn client_data_json(&self, client_data_type: ClientDataType, challenge: &Challenge) -> Result<Vec<u8>> {
        let client_data = ClientData {
            client_data_type,
            challenge: challenge.clone(),
            origin: Origin::parse(&self.origin)?,
            cross_origin: Some(false),
            top_origin: None,
            token_binding: None,
        };
        Ok(codec::encode_client_data(&client_data)?)
    }

    fn sign(key: &PKey<Private>, message: &[u8]) -> Result<Vec<u8>> {
        let signature = if key.id() == Id::ED25519 {
            Signer::new_without_digest(key)?.sign_oneshot_to_vec(message)?
        } else {
            let mut signer = Signer::new(MessageDigest::sha256(), key)?;
            signer.update(message)?;
            signer.sign_to_vec()?
        };
        Ok(signature)
    }

    fn authenticator_data(&self, attested: Option<AttestedCredentialData>) -> AuthenticatorData {
        AuthenticatorData {
            rp_id_hash: sha256(self.rp_id.as_bytes()),
            flags: self.flags,
            sign_count: self.sign_count,
            attested_credential_data: attested,
            extensions: self.extensions.clone(),
        }
    }

    /// Respond to `navigator.credentials.create()`
    ///
    /// # Errors
    /// Certificate issuance, signing or encoding failures.
    pub fn register(&self, challenge: &Challenge, attestation: TestAttestation<'_>) -> Result<RegistrationRequest> {
        let client_data_json = self.client_data_json(ClientDataType::Create, challenge)?;
        let client_data_hash = sha256(&client_data_json);

        // U2F devices have no AAGUID
        let aaguid = match attestation {
            TestAttestation::FidoU2f(_) => Uuid::nil(),
            _ => self.aaguid,
        };
        let authenticator_data = self.authenticator_data(Some(AttestedCredentialData {
            aaguid,
            credential_id: self.credential_id.clone(),
            credential_public_key: self.credential_public_key()?,
        }));
        let authenticator_data_bytes = codec::encode_authenticator_data(&authenticator_data)?;
        let statement = self
            .statement(attestation, &authenticator_data_bytes, &client_data_hash)
            .with_context(|| format!("building '{}' statement", attestation.format()))?;

        let object = AttestationObject {
            format: attestation.format().identifier().to_string(),
            statement,
            authenticator_data,
            authenticator_data_bytes,
        };
        Ok(RegistrationRequest {
            attestation_object: codec::encode_attestation_object(&object)?,
            client_data_json,
            client_extensions_json: None,
            transports: self.transports.clone(),
        })
    }

    fn statement(
        &self,
        attestation: TestAttestation<'_>,
        authenticator_data: &[u8],
        client_data_hash: &[u8; 32],
    ) -> Result<AttestationStatement> {
        let signed = signed_data(authenticator_data, client_data_hash);

        let statement = match attestation {
            TestAttestation::None => AttestationStatement::None,
            TestAttestation::SelfAttestation => AttestationStatement::Packed(PackedStatement {
                alg: self.algorithm(),
                sig: Self::sign(&self.key, &signed)?,
                x5c: Vec::new(),
                ecdaa_key_id: None,
            }),
            TestAttestation::Packed(ca) => {
                let options = LeafOptions::packed("Passkey Verify Test Authenticator").with_aaguid(self.aaguid);
                let (leaf, key) = ca.issue_leaf(&options)?;
                AttestationStatement::Packed(PackedStatement {
                    alg: CoseAlgorithm::Es256,
                    sig: Self::sign(&key, &signed)?,
                    x5c: vec![leaf.to_der()?],
                    ecdaa_key_id: None,
                })
            }
            TestAttestation::FidoU2f(ca) => {
                let (leaf, key) = ca.issue_leaf(&LeafOptions::fido_u2f("Passkey Verify Test U2F"))?;
                let point = self
                    .credential_public_key()?
                    .uncompressed_point()
                    .context("fido-u2f needs a P-256 credential")?;
                let mut registration_data = vec![0x00];
                registration_data.extend_from_slice(&sha256(self.rp_id.as_bytes()));
                registration_data.extend_from_slice(client_data_hash);
                registration_data.extend_from_slice(&self.credential_id);
                registration_data.extend_from_slice(&point);
                AttestationStatement::FidoU2f(FidoU2fStatement {
                    sig: Self::sign(&key, &registration_data)?,
                    x5c: vec![leaf.to_der()?],
                })
            }
            TestAttestation::Tpm(ca) => {
                let (aik, aik_key) = ca.issue_leaf(&LeafOptions::tpm_aik().with_aaguid(self.aaguid))?;
                let pub_area = self.tpm_pub_area()?;
                let cert_info = tpm_cert_info(&sha256(&signed), &pub_area);
                AttestationStatement::Tpm(TpmStatement {
                    ver: "2.0".into(),
                    alg: CoseAlgorithm::Es256,
                    x5c: vec![aik.to_der()?],
                    sig: Self::sign(&aik_key, &cert_info)?,
                    cert_info,
                    pub_area,
                })
            }
            TestAttestation::AndroidKey(ca) => {
                let options =
                    LeafOptions::android_key(key_description(client_data_hash)).with_key(self.key.clone());
                let (leaf, _) = ca.issue_leaf(&options)?;
                AttestationStatement::AndroidKey(AndroidKeyStatement {
                    alg: CoseAlgorithm::Es256,
                    sig: Self::sign(&self.key, &signed)?,
                    x5c: vec![leaf.to_der()?],
                })
            }
            TestAttestation::AndroidSafetyNet(ca) => {
                let (leaf, key) = ca.issue_leaf(&LeafOptions::safetynet())?;
                let payload = json!({
                    "nonce": base64url::encode_standard(&sha256(&signed)),
                    "timestampMs": Utc::now().timestamp_millis(),
                    "apkPackageName": "com.google.android.gms",
                    "ctsProfileMatch": true,
                    "basicIntegrity": true,
                });
                let response = sign_compact(&key, &[&leaf], payload.to_string().as_bytes())?;
                AttestationStatement::AndroidSafetyNet(AndroidSafetyNetStatement {
                    ver: "210613000".into(),
                    response: response.into_bytes(),
                })
            }
            TestAttestation::Apple(ca) => {
                let options = LeafOptions::apple(&sha256(&signed)).with_key(self.key.clone());
                let (leaf, _) = ca.issue_leaf(&options)?;
                AttestationStatement::Apple(AppleStatement {
                    x5c: vec![leaf.to_der()?],
                })
            }
        };
        Ok(statement)
    }

    /// `TPMT_PUBLIC` for the P-256 credential key
    fn tpm_pub_area(&self) -> Result<Vec<u8>> {
        let CoseKeyParams::Ec2 { x, y, .. } = self.credential_public_key()?.params else {
            anyhow::bail!("tpm attestation needs a P-256 credential");
        };
        let mut out = Vec::new();
        out.extend_from_slice(&TPM_ALG_ECC.to_be_bytes());
        out.extend_from_slice(&TPM_ALG_SHA256.to_be_bytes());
        out.extend_from_slice(&0x0006_0472u32.to_be_bytes());
        push_sized(&mut out, &[]); // authPolicy
        out.extend_from_slice(&TPM_ALG_NULL.to_be_bytes()); // symmetric
        out.extend_from_slice(&TPM_ALG_NULL.to_be_bytes()); // scheme
        out.extend_from_slice(&TPM_ECC_NIST_P256.to_be_bytes());
        out.extend_from_slice(&TPM_ALG_NULL.to_be_bytes()); // kdf
        push_sized(&mut out, &x);
        push_sized(&mut out, &y);
        Ok(out)
    }

    /// Respond to `navigator.credentials.get()`
    ///
    /// # Errors
    /// Signing or encoding failures.
    pub fn authenticate(&self, challenge: &Challenge) -> Result<AuthenticationRequest> {
        let client_data_json = self.client_data_json(ClientDataType::Get, challenge)?;
        let authenticator_data = codec::encode_authenticator_data(&self.authenticator_data(None))?;
        let signature = Self::sign(
            &self.key,
            &signed_data(&authenticator_data, &sha256(&client_data_json)),
        )?;

        Ok(AuthenticationRequest {
            credential_id: self.credential_id.clone(),
            user_handle: Some(TEST_USER_HANDLE.to_vec()),
            authenticator_data,
            client_data_json,
            client_extensions_json: None,
            signature,
        })
    }

    /// `PublicKeyCredential` JSON as a browser would post it
    #[must_use]
    pub fn registration_json(&self, request: &RegistrationRequest) -> String {
        let id = base64url::encode(&self.credential_id);
        json!({
            "id": id,
            "rawId": id,
            "type": "public-key",
            "response": {
                "attestationObject": base64url::encode(&request.attestation_object),
                "clientDataJSON": base64url::encode(&request.client_data_json),
                "transports": request.transports,
            },
            "clientExtensionResults": {},
        })
        .to_string()
    }

    #[must_use]
    pub fn authentication_json(&self, request: &AuthenticationRequest) -> String {
        let id = base64url::encode(&request.credential_id);
        json!({
            "id": id,
            "rawId": id,
            "type": "public-key",
            "response": {
                "authenticatorData": base64url::encode(&request.authenticator_data),
                "clientDataJSON": base64url::encode(&request.client_data_json),
                "signature": base64url::encode(&request.signature),
                "userHandle": request.user_handle.as_deref().map(base64url::encode),
            },
            "clientExtensionResults": {},
        })
        .to_string()
    }
}

fn push_sized(out: &mut Vec<u8>, bytes: &[u8]) {
    let len = u16::try_from(bytes.len()).unwrap_or(u16::MAX);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(bytes);
}

/// `TPMS_ATTEST` certifying `pub_area`, with `extra_data` as the qualifying data
fn tpm_cert_info(extra_data: &[u8], pub_area: &[u8]) -> Vec<u8> {
    let mut name = TPM_ALG_SHA256.to_be_bytes().to_vec();
    name.extend_from_slice(&sha256(pub_area));

    let mut out = Vec::new();
    out.extend_from_slice(&TPM_GENERATED_VALUE.to_be_bytes());
    out.extend_from_slice(&TPM_ST_ATTEST_CERTIFY.to_be_bytes());
    push_sized(&mut out, &[0x00, 0x0b, 0x5a, 0x5a]); // qualifiedSigner
    push_sized(&mut out, extra_data);
    out.extend_from_slice(&[0; 17]); // clockInfo
    out.extend_from_slice(&[0; 8]); // firmwareVersion
    push_sized(&mut out, &name);
    push_sized(&mut out, &[0x00, 0x0b, 0xa5, 0xa5]); // qualifiedName
    out
}

/// Keymaster `KeyDescription` for a generated signing key
fn key_description(attestation_challenge: &[u8]) -> Vec<u8> {
    let tee_enforced = der::sequence(&[
        der::explicit(1, &der::set(&[der::integer(2)])), // purpose: sign
        der::explicit(702, &der::integer(0)),            // origin: generated
    ]);
    der::sequence(&[
        der::integer(3),
        der::enumerated(1),
        der::integer(4),
        der::enumerated(1),
        der::octet_string(attestation_challenge),
        der::octet_string(&[]),
        der::sequence(&[]),
        tee_enforced,
    ])
}
