//
// config.rs
// Dicom-Inference-Client
//
// Loads service endpoint, license, retry settings, and the anonymization protocol from TOML.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use dicom::core::Tag;
use secrecy::SecretString;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::policy::AnonymizationPolicy;
use crate::protocol::parse_policy;
use crate::registry::FieldRegistry;
use crate::retry::RetryConfig;

pub const ENV_BASE_URL: &str = "DICOM_INFERENCE_BASE_URL";
pub const ENV_LICENSE: &str = "DICOM_INFERENCE_LICENSE";
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 300;

/// Fields always copied back from the first reference record when restoring a result.
pub const DEFAULT_TOP_LEVEL: &[&str] = &[
    "PatientID",
    "PatientName",
    "PatientBirthDate",
    "PatientSex",
    "StudyDate",
    "StudyTime",
    "AccessionNumber",
];

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub protocol: ProtocolConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub base_url: String,
    pub license: SecretString,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolConfig {
    pub id: Option<String>,
    #[serde(default = "default_top_level")]
    pub top_level: Vec<String>,
    #[serde(default)]
    pub methods: BTreeMap<String, Vec<String>>,
}

fn default_top_level() -> Vec<String> {
    DEFAULT_TOP_LEVEL.iter().map(|s| s.to_string()).collect()
}

impl AppConfig {
    /// Read a TOML file and apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!(
                "Failed to read configuration file {}: {}",
                path.display(),
                e
            ))
        })?;
        let mut config = Self::from_toml(&contents)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| Error::Configuration(format!("Failed to parse TOML: {}", e)))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(ENV_BASE_URL) {
            self.service.base_url = val;
        }
        if let Ok(val) = std::env::var(ENV_LICENSE) {
            self.service.license = SecretString::new(val);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.service.base_url.trim().is_empty() {
            return Err(Error::Configuration("service.base_url is empty".into()));
        }
        if self.service.timeout_seconds == 0 {
            return Err(Error::Configuration(
                "service.timeout_seconds must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Run the protocol parser over `[protocol.methods]`.
    pub fn policy(&self, registry: &FieldRegistry) -> Result<AnonymizationPolicy> {
        parse_policy(
            self.protocol.id.as_deref(),
            &self.protocol.methods,
            registry,
        )
    }

    pub fn top_level_fields(&self, registry: &FieldRegistry) -> Result<Vec<Tag>> {
        registry.resolve_all(&self.protocol.top_level)
    }
}
