//! Crate-wide error type; every fallible operation returns [`Result`].

use std::path::PathBuf;

use thiserror::Error;

use crate::workflow::Stage;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LocalCaError>;

/// Represents errors that can occur while provisioning certificate material.
///
/// This enum provides detailed error messages for various failure scenarios.
#[derive(Debug, Error)]
pub enum LocalCaError {
    /// Error during data encoding.
    #[error("Failed to encode data: {0}")]
    EncodingError(String),

    /// Error during data decoding.
    #[error("Failed to decode data: {0}")]
    DecodingError(String),

    /// Error due to invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Error during key generation.
    #[error("Key generation error: {0}")]
    KeyGenerationError(String),

    /// Error related to certificate operations.
    #[error("Certificate error: {0}")]
    CertificateError(String),

    /// Error while producing a signature.
    #[error("Signing error: {0}")]
    SigningError(String),

    /// A signature, name or validity check did not hold.
    #[error("Verification failed: {0}")]
    VerificationError(String),

    /// Error from RSA operations.
    #[error("RSA error: {0}")]
    RsaError(String),

    /// Error while building or opening a PKCS#12 archive.
    #[error("PKCS#12 error: {0}")]
    Pkcs12Error(String),

    /// Invalid or unreadable configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Filesystem error on a specific path.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A pipeline stage failed; wraps the underlying cause.
    #[error("{stage} failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<LocalCaError>,
    },
}

impl LocalCaError {
    /// Attaches a path to an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LocalCaError::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns the pipeline stage that failed, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            LocalCaError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

impl From<der::Error> for LocalCaError {
    /// Converts a `der::Error` into a `LocalCaError`.
    fn from(err: der::Error) -> Self {
        LocalCaError::DecodingError(err.to_string())
    }
}

impl From<rsa::Error> for LocalCaError {
    fn from(err: rsa::Error) -> Self {
        LocalCaError::RsaError(err.to_string())
    }
}

impl From<pkcs8::Error> for LocalCaError {
    fn from(err: pkcs8::Error) -> Self {
        LocalCaError::DecodingError(err.to_string())
    }
}

impl From<pkcs8::spki::Error> for LocalCaError {
    fn from(err: pkcs8::spki::Error) -> Self {
        LocalCaError::EncodingError(err.to_string())
    }
}

impl From<rsa::signature::Error> for LocalCaError {
    fn from(err: rsa::signature::Error) -> Self {
        LocalCaError::VerificationError(err.to_string())
    }
}

impl From<serde_json::Error> for LocalCaError {
    fn from(err: serde_json::Error) -> Self {
        LocalCaError::ConfigError(err.to_string())
    }
}

impl From<pem::PemError> for LocalCaError {
    fn from(err: pem::PemError) -> Self {
        LocalCaError::DecodingError(err.to_string())
    }
}
