use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::data::{AttestationFormat, CoseAlgorithm, Origin};

/// Environment variable naming a directory whose `Settings.toml` overrides the local one
pub const CONFIG_DIR_ENV: &str = "PASSKEY_VERIFY_CONFIG_DIR";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct VerifierSettings {
    pub relying_party: RelyingPartySettings,
    pub policy: PolicySettings,
    pub attestation: AttestationSettings,
    pub metadata: MetadataSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelyingPartySettings {
    pub rp_id: String,
    /// Trusted origins; `android:apk-key-hash:` origins are allowed verbatim
    pub origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySettings {
    pub user_presence_required: bool,
    pub user_verification_required: bool,
    pub max_credential_id_length: usize,
    /// COSE algorithm names (`ES256`, `RS256`, `EdDSA`, ...)
    pub allowed_algorithms: Vec<String>,
    pub reject_unsolicited_extensions: bool,
    /// Accept assertions whose sign counter did not increase
    pub ignore_malicious_counter: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttestationSettings {
    /// Statement formats in dispatch order
    pub formats: Vec<String>,
    pub full_chain_prohibited: bool,
    pub revocation_check: bool,
    pub self_attestation_allowed: bool,
    /// PEM or DER certificates trusted for every authenticator
    pub trust_anchor_paths: Vec<String>,
    /// PEM or DER CRLs consulted when `revocation_check` is on
    pub crl_paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataSettings {
    pub enabled: bool,
    pub blob_endpoint: String,
    /// Read the BLOB from this file instead of the endpoint
    pub local_blob_path: Option<String>,
    pub root_certificate_path: Option<String>,
    pub not_fido_certified_allowed: bool,
    pub self_assertion_submitted_allowed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

/// Rejected configuration value
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("relying_party.rp_id must not be empty")]
    MissingRpId,
    #[error("relying_party.origins must list at least one origin")]
    MissingOrigins,
    #[error("invalid origin '{0}'")]
    InvalidOrigin(String),
    #[error("unknown attestation format '{0}'")]
    UnknownFormat(String),
    #[error("unknown algorithm '{0}'")]
    UnknownAlgorithm(String),
    #[error("policy.max_credential_id_length must be positive")]
    InvalidMaxCredentialIdLength,
    #[error("metadata is enabled but metadata.root_certificate_path is not set")]
    MissingMetadataRoot,
    #[error("invalid metadata endpoint '{0}'")]
    InvalidEndpoint(String),
    #[error("cannot load {path}: {reason}")]
    Unreadable { path: String, reason: String },
}

impl Default for RelyingPartySettings {
    fn default() -> Self {
        Self {
            rp_id: "localhost".to_string(),
            origins: vec!["http://localhost:8080".to_string()],
        }
    }
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            user_presence_required: true,
            user_verification_required: false,
            max_credential_id_length: crate::verifier::DEFAULT_MAX_CREDENTIAL_ID_LENGTH,
            allowed_algorithms: vec!["ES256".to_string(), "EdDSA".to_string(), "RS256".to_string()],
            reject_unsolicited_extensions: false,
            ignore_malicious_counter: false,
        }
    }
}

impl Default for AttestationSettings {
    fn default() -> Self {
        Self {
            formats: AttestationFormat::ALL
                .iter()
                .map(|format| format.identifier().to_string())
                .collect(),
            full_chain_prohibited: false,
            revocation_check: false,
            self_attestation_allowed: true,
            trust_anchor_paths: Vec::new(),
            crl_paths: Vec::new(),
        }
    }
}

impl Default for MetadataSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            blob_endpoint: crate::metadata::provider::FIDO_MDS3_ENDPOINT.to_string(),
            local_blob_path: None,
            root_certificate_path: None,
            not_fido_certified_allowed: false,
            self_assertion_submitted_allowed: false,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl VerifierSettings {
    /// Load settings from TOML file(s) and environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Logger initialization fails
    /// - A settings file cannot be read or parsed
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        Self::initialize_environment()?;
        let mut settings = Self::load_base_settings()?;
        Self::apply_env_overrides(&mut settings);
        Ok(settings)
    }

    /// Load settings without touching the global logger
    ///
    /// # Errors
    ///
    /// Returns an error if a settings file cannot be read or parsed
    pub fn load_without_logger() -> Result<Self, Box<dyn std::error::Error>> {
        let mut settings = Self::load_base_settings()?;
        Self::apply_env_overrides(&mut settings);
        Ok(settings)
    }

    /// Parse settings from a TOML file, without environment overrides
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let toml_content = fs::read_to_string(path)?;
        Ok(basic_toml::from_str(&toml_content)?)
    }

    /// Initialize logging
    ///
    /// # Errors
    ///
    /// Returns an error if logger initialization fails
    fn initialize_environment() -> Result<(), Box<dyn std::error::Error>> {
        env_logger::try_init()?;
        Ok(())
    }

    /// Settings are loaded with the following priority (highest to lowest):
    /// 1. Environment variables (applied separately after loading base settings)
    /// 2. Settings.toml in `PASSKEY_VERIFY_CONFIG_DIR` (if specified and exists)
    /// 3. Settings.toml in current directory (if exists)
    /// 4. Default settings
    ///
    /// # Errors
    ///
    /// Returns an error if a settings file cannot be read or TOML parsing fails
    fn load_base_settings() -> Result<Self, Box<dyn std::error::Error>> {
        let mut settings = Self::default();

        let default_config_path = PathBuf::from("Settings.toml");
        if default_config_path.exists() {
            settings = Self::from_file(&default_config_path)?;
            println!(
                "✓ Loaded base settings from {}",
                default_config_path.display()
            );
        }

        if let Ok(config_dir) = std::env::var(CONFIG_DIR_ENV) {
            let config_path = Path::new(&config_dir).join("Settings.toml");
            if config_path.exists() {
                settings = Self::from_file(&config_path)?;
                println!("✓ Overriding settings from {}", config_path.display());
            } else {
                println!(
                    "ℹ {CONFIG_DIR_ENV} set but no Settings.toml found at: {}",
                    config_path.display()
                );
            }
        }

        Ok(settings)
    }

    /// Apply environment variable overrides to settings
    pub fn apply_env_overrides(settings: &mut Self) {
        Self::apply_relying_party_env_overrides(&mut settings.relying_party);
        Self::apply_policy_env_overrides(&mut settings.policy);
        Self::apply_metadata_env_overrides(&mut settings.metadata);
        Self::apply_logging_env_overrides(&mut settings.logging);
    }

    fn apply_relying_party_env_overrides(rp_settings: &mut RelyingPartySettings) {
        if let Ok(rp_id) = std::env::var("RP_ID") {
            rp_settings.rp_id = rp_id;
        }
        if let Ok(origins) = std::env::var("RP_ORIGINS") {
            rp_settings.origins = origins
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(ToString::to_string)
                .collect();
        }
    }

    fn apply_policy_env_overrides(policy_settings: &mut PolicySettings) {
        if let Ok(value_str) = std::env::var("MAX_CREDENTIAL_ID_LENGTH") {
            if let Ok(value) = value_str.parse::<usize>() {
                policy_settings.max_credential_id_length = value;
            }
        }
        if let Ok(value_str) = std::env::var("USER_VERIFICATION_REQUIRED") {
            if let Ok(value) = value_str.parse::<bool>() {
                policy_settings.user_verification_required = value;
            }
        }
    }

    fn apply_metadata_env_overrides(metadata_settings: &mut MetadataSettings) {
        if let Ok(endpoint) = std::env::var("MDS_ENDPOINT") {
            metadata_settings.blob_endpoint = endpoint;
            metadata_settings.enabled = true;
        }
        if let Ok(path) = std::env::var("MDS_LOCAL_BLOB") {
            metadata_settings.local_blob_path = Some(path);
            metadata_settings.enabled = true;
        }
        if let Ok(path) = std::env::var("MDS_ROOT_CERTIFICATE") {
            metadata_settings.root_certificate_path = Some(path);
        }
    }

    fn apply_logging_env_overrides(logging_settings: &mut LoggingSettings) {
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            logging_settings.level = log_level;
        }
    }

    /// Check that every value can be turned into verifier configuration
    ///
    /// # Errors
    ///
    /// Returns the first invalid value found
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.relying_party.rp_id.trim().is_empty() {
            return Err(SettingsError::MissingRpId);
        }
        self.origins()?;
        self.formats()?;
        self.allowed_algorithms()?;
        if self.policy.max_credential_id_length == 0 {
            return Err(SettingsError::InvalidMaxCredentialIdLength);
        }
        if self.metadata.enabled && self.metadata.root_certificate_path.is_none() {
            return Err(SettingsError::MissingMetadataRoot);
        }
        Ok(())
    }

    /// Parsed trusted origins
    ///
    /// # Errors
    ///
    /// Returns `MissingOrigins` or the first unparsable origin
    pub fn origins(&self) -> Result<Vec<Origin>, SettingsError> {
        if self.relying_party.origins.is_empty() {
            return Err(SettingsError::MissingOrigins);
        }
        self.relying_party
            .origins
            .iter()
            .map(|origin| {
                Origin::parse(origin).map_err(|_| SettingsError::InvalidOrigin(origin.clone()))
            })
            .collect()
    }

    /// Attestation formats in configured dispatch order
    ///
    /// # Errors
    ///
    /// Returns the first unknown format name
    pub fn formats(&self) -> Result<Vec<AttestationFormat>, SettingsError> {
        self.attestation
            .formats
            .iter()
            .map(|name| {
                AttestationFormat::try_from(name.as_str())
                    .map_err(|_| SettingsError::UnknownFormat(name.clone()))
            })
            .collect()
    }

    /// # Errors
    ///
    /// Returns the first unknown algorithm name
    pub fn allowed_algorithms(&self) -> Result<Vec<CoseAlgorithm>, SettingsError> {
        self.policy
            .allowed_algorithms
            .iter()
            .map(|name| {
                CoseAlgorithm::from_name(name)
                    .ok_or_else(|| SettingsError::UnknownAlgorithm(name.clone()))
            })
            .collect()
    }
}
