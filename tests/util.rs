#![allow(dead_code)]

use std::collections::BTreeSet;
use std::path::Path;

use localca::cert::Certificate;
use localca::cert::extensions::ToAndFromX509Extension;
use localca::config::ProvisionConfig;
use localca::error::{LocalCaError, Result};
use localca::key::KeyAlgorithm;
use tempfile::TempDir;

pub const PASSPHRASE: &str = "correct horse battery staple";

/// A scratch directory and a config pointing at a `certs` directory inside it.
pub fn test_config() -> Result<(TempDir, ProvisionConfig)> {
    test_config_with(KeyAlgorithm::default())
}

pub fn test_config_with(key_algorithm: KeyAlgorithm) -> Result<(TempDir, ProvisionConfig)> {
    let dir = tempfile::tempdir().map_err(|e| LocalCaError::io(std::env::temp_dir(), e))?;
    let config = ProvisionConfig::builder()
        .key_dir(dir.path().join("certs"))
        .passphrase(PASSPHRASE.to_string())
        .key_algorithm(key_algorithm)
        .build();
    Ok((dir, config))
}

/// File names directly inside `dir`.
pub fn file_names(dir: &Path) -> Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    for entry in std::fs::read_dir(dir).map_err(|e| LocalCaError::io(dir, e))? {
        let entry = entry.map_err(|e| LocalCaError::io(dir, e))?;
        names.insert(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}

pub fn final_layout() -> BTreeSet<String> {
    ["client.pfx", "root.crt", "server.crt", "server.key"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// The extension `E` of `cert`, which must be present.
pub fn required_extension<E: ToAndFromX509Extension>(cert: &Certificate) -> Result<E> {
    cert.extension::<E>()?.ok_or_else(|| {
        LocalCaError::CertificateError(format!("extension {} is missing", E::OID))
    })
}
