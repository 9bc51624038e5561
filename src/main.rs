#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! passkey-verify CLI - verify a registration response or inspect an attestation object

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;

use passkey_verify::codec::{self, base64url};
use passkey_verify::data::{AttestationObject, Challenge, CredentialRecord, RegistrationRequest};
use passkey_verify::{VerifierSettings, WebAuthnManagerBuilder};

#[derive(Parser)]
#[command(name = "passkey-verify")]
#[command(author, version, about = "WebAuthn registration verification", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a registration response and print the credential record
    Register {
        /// `PublicKeyCredential` JSON produced by `navigator.credentials.create()`
        #[arg(value_name = "REQUEST")]
        request: PathBuf,

        /// Challenge issued for the ceremony (base64url)
        #[arg(value_name = "CHALLENGE")]
        challenge: String,
    },

    /// Decode an attestation object and print a summary
    Inspect {
        /// `attestationObject` bytes (base64url)
        #[arg(value_name = "ATTESTATION_OBJECT")]
        attestation_object: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Register { request, challenge } => register(request, &challenge).await,
        Commands::Inspect { attestation_object } => inspect(&attestation_object),
    }
}

async fn register(path: PathBuf, challenge: &str) -> Result<()> {
    // Also initializes the logger
    let settings =
        VerifierSettings::load().map_err(|e| anyhow!("Failed to load settings: {e}"))?;
    let manager = WebAuthnManagerBuilder::from_settings(&settings)
        .context("Invalid settings")?
        .build_async();
    let defaults = manager
        .defaults()
        .ok_or_else(|| anyhow!("relying party settings missing"))?;

    let json = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let request = RegistrationRequest::from_json(&json)?;
    let challenge = Challenge::from_base64url(challenge)
        .map_err(|e| anyhow!("Challenge is not base64url: {e}"))?;
    let parameters = defaults.registration_parameters(challenge);

    let verified = manager
        .verify_registration_request(&request, &parameters)
        .await
        .context("Registration rejected")?;
    let record = verified.credential_record()?;
    println!("{}", serde_json::to_string_pretty(&record_json(&record)?)?);
    Ok(())
}

fn record_json(record: &CredentialRecord) -> Result<serde_json::Value> {
    Ok(json!({
        "credentialId": base64url::encode(&record.credential_id),
        "publicKey": base64url::encode(&codec::encode_cose_key(&record.public_key)?),
        "algorithm": record.public_key.algorithm.map(|alg| alg.to_string()),
        "signCount": record.sign_count,
        "aaguid": record.aaguid.to_string(),
        "attestationType": record.attestation_type,
        "backupEligible": record.backup_eligible,
        "backupState": record.backup_state,
        "uvInitialized": record.uv_initialized,
        "transports": record.transports,
    }))
}

fn inspect(encoded: &str) -> Result<()> {
    let bytes =
        base64url::decode(encoded).map_err(|e| anyhow!("Attestation object is not base64url: {e}"))?;
    let object = codec::decode_attestation_object(&bytes)?;
    println!("{}", serde_json::to_string_pretty(&summary_json(&object))?);
    Ok(())
}

fn summary_json(object: &AttestationObject) -> serde_json::Value {
    let authenticator_data = &object.authenticator_data;
    let flags = authenticator_data.flags;
    let credential = authenticator_data.attested_credential_data.as_ref().map(|attested| {
        json!({
            "aaguid": attested.aaguid.to_string(),
            "credentialId": base64url::encode(&attested.credential_id),
            "credentialIdLength": attested.credential_id.len(),
            "algorithm": attested.credential_public_key.algorithm.map(|alg| alg.to_string()),
        })
    });

    json!({
        "fmt": object.format,
        "certificates": object.statement.x5c().map_or(0, <[Vec<u8>]>::len),
        "rpIdHash": passkey_verify::crypto::hex(&authenticator_data.rp_id_hash),
        "flags": {
            "userPresent": flags.user_present(),
            "userVerified": flags.user_verified(),
            "backupEligible": flags.backup_eligible(),
            "backupState": flags.backup_state(),
            "attestedCredentialData": flags.attested_credential_data(),
            "extensionData": flags.extension_data(),
        },
        "signCount": authenticator_data.sign_count,
        "credential": credential,
        "extensions": authenticator_data.extensions.keys().collect::<Vec<_>>(),
    })
}
