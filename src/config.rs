//! Provisioning configuration.
//!
//! Every option has a documented default except the export passphrase, which the
//! operator must supply. Values can come from a JSON file, the command line, or the
//! builder, with later sources overriding earlier ones.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use bon::Builder;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::cert::params::DistinguishedName;
use crate::error::{LocalCaError, Result};
use crate::key::{KeyAlgorithm, SUPPORTED_RSA_BITS};

/// Default key directory.
pub const DEFAULT_KEY_DIR: &str = "certs";
/// Default server common name.
pub const DEFAULT_HOSTNAME: &str = "localhost";
/// Default validity of every certificate, in days.
pub const DEFAULT_VALIDITY_DAYS: u32 = 3650;
/// Common name of the root certificate.
pub const DEFAULT_CA_COMMON_NAME: &str = "Video Server Certificate Authority";
/// Common name of the client certificate.
pub const DEFAULT_CLIENT_COMMON_NAME: &str = "Client Certs";
/// Label attached to the client archive.
pub const DEFAULT_CLIENT_FRIENDLY_NAME: &str = "client";
/// Environment variable the CLI reads the passphrase from.
pub const PASSPHRASE_ENV: &str = "LOCALCA_PASSPHRASE";

const MAX_VALIDITY_DAYS: u32 = 36_500;

static HOSTNAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*$")
        .expect("hostname pattern is valid")
});

/// Options for one provisioning run.
#[derive(Clone, Debug, Builder, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProvisionConfig {
    /// Directory all artifacts are written to.
    #[builder(default = PathBuf::from(DEFAULT_KEY_DIR))]
    pub key_dir: PathBuf,
    /// Server common name, also placed in the subject alternative names.
    #[builder(default = DEFAULT_HOSTNAME.to_string())]
    pub hostname: String,
    /// Additional DNS names or IP addresses for the server certificate.
    #[builder(default)]
    pub extra_subject_alt_names: Vec<String>,
    /// Passphrase protecting the client archive. Never written back out.
    #[serde(skip_serializing)]
    pub passphrase: Option<String>,
    #[builder(default = DEFAULT_VALIDITY_DAYS)]
    pub validity_days: u32,
    #[builder(default)]
    pub key_algorithm: KeyAlgorithm,
    #[builder(default = default_ca_subject())]
    pub ca_subject: DistinguishedName,
    /// Template for the leaf subjects; its common name is replaced per identity.
    #[builder(default = default_leaf_subject())]
    pub leaf_subject: DistinguishedName,
    #[builder(default = DEFAULT_CLIENT_COMMON_NAME.to_string())]
    pub client_common_name: String,
    #[builder(default = DEFAULT_CLIENT_FRIENDLY_NAME.to_string())]
    pub client_friendly_name: String,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        ProvisionConfig::builder().build()
    }
}

fn default_ca_subject() -> DistinguishedName {
    DistinguishedName::builder()
        .common_name(DEFAULT_CA_COMMON_NAME.to_string())
        .country("US".to_string())
        .organization("Local Video Streaming".to_string())
        .build()
}

fn default_leaf_subject() -> DistinguishedName {
    DistinguishedName::builder()
        .common_name(String::new())
        .country("US".to_string())
        .organization("Local Video Streaming".to_string())
        .build()
}

impl ProvisionConfig {
    /// Reads a JSON configuration file. Missing keys take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| LocalCaError::io(path, e))?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// The passphrase, or an error if none was supplied.
    pub fn passphrase(&self) -> Result<&str> {
        match self.passphrase.as_deref() {
            Some(passphrase) if !passphrase.is_empty() => Ok(passphrase),
            _ => Err(LocalCaError::ConfigError(format!(
                "an export passphrase is required (--passphrase or {PASSPHRASE_ENV})"
            ))),
        }
    }

    pub fn server_subject(&self) -> DistinguishedName {
        DistinguishedName {
            common_name: self.hostname.clone(),
            ..self.leaf_subject.clone()
        }
    }

    pub fn client_subject(&self) -> DistinguishedName {
        DistinguishedName {
            common_name: self.client_common_name.clone(),
            ..self.leaf_subject.clone()
        }
    }

    /// Hostname first, then the extra names, without duplicates.
    pub fn server_subject_alt_names(&self) -> Vec<String> {
        let mut names = vec![self.hostname.clone()];
        for name in &self.extra_subject_alt_names {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }

    /// Checks every option, including the passphrase.
    pub fn validate(&self) -> Result<()> {
        self.passphrase()?;

        for name in self.server_subject_alt_names() {
            if name.parse::<IpAddr>().is_err() && !HOSTNAME_RE.is_match(&name) {
                return Err(LocalCaError::ConfigError(format!(
                    "{name:?} is neither a hostname nor an IP address"
                )));
            }
        }

        if !(1..=MAX_VALIDITY_DAYS).contains(&self.validity_days) {
            return Err(LocalCaError::ConfigError(format!(
                "validity_days must be between 1 and {MAX_VALIDITY_DAYS}, got {}",
                self.validity_days
            )));
        }

        if let KeyAlgorithm::Rsa { bits } = self.key_algorithm {
            if !SUPPORTED_RSA_BITS.contains(&bits) {
                return Err(LocalCaError::ConfigError(format!(
                    "RSA key size {bits} is not one of {SUPPORTED_RSA_BITS:?}"
                )));
            }
        }

        if self.ca_subject.common_name.trim().is_empty() {
            return Err(LocalCaError::ConfigError(
                "ca_subject.common_name must not be empty".to_string(),
            ));
        }
        if self.client_common_name.trim().is_empty() {
            return Err(LocalCaError::ConfigError(
                "client_common_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
