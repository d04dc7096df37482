//! # localca - Local Certificate Authority Provisioning
//!
//! localca provisions the certificate material a TLS-secured local video streaming
//! server needs when it insists on client certificates: a self-signed root CA, a server
//! certificate for the streaming host, and a password-protected PKCS#12 archive holding
//! the client certificate and key. It is built entirely on rustcrypto libraries; OpenSSL
//! is only used by the test suite, as an independent check.
//!
//! ## What a run produces
//!
//! | File | Lifetime |
//! |---|---|
//! | `root.crt` | kept, the trust anchor |
//! | `server.key`, `server.crt` | kept |
//! | `client.pfx` | kept, the distributable client credential |
//! | `root.key`, `root.srl`, `*.csr`, `client.key`, `client.crt` | deleted at the end |
//!
//! Leaf certificates are verified against the root before the client archive is
//! exported and before anything is deleted. Any failure stops the run and reports the
//! stage it happened in.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use localca::config::ProvisionConfig;
//!
//! # fn main() -> Result<(), localca::error::LocalCaError> {
//! let config = ProvisionConfig::builder()
//!     .key_dir("certs".into())
//!     .hostname("camera.local".to_string())
//!     .passphrase("correct horse battery staple".to_string())
//!     .build();
//!
//! let report = localca::workflow::provision(&config, false)?;
//! for path in &report.persisted {
//!     println!("{}", path.display());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Issuing by hand
//!
//! ```rust,no_run
//! use localca::{
//!     key::{KeyPair, PublicKey},
//!     cert::{Certificate, CertificateWithPrivateKey, params::{CertificationRequestInfo, DistinguishedName, Validity}},
//!     csr::CertificateSigningRequest,
//!     issuer::Issuer,
//!     serial::random_serial,
//! };
//!
//! # fn main() -> Result<(), localca::error::LocalCaError> {
//! let ca_key = KeyPair::generate_rsa(2048)?;
//! let ca_info = CertificationRequestInfo::builder()
//!     .subject(DistinguishedName::builder().common_name("Example CA".to_string()).build())
//!     .subject_public_key(PublicKey::from_key_pair(&ca_key))
//!     .is_ca(true)
//!     .build();
//! let ca = CertificateWithPrivateKey {
//!     cert: Certificate::new_self_signed(&ca_info, &ca_key, Validity::for_days(3650), &random_serial())?,
//!     key: ca_key,
//! };
//!
//! let server_key = KeyPair::generate_rsa(2048)?;
//! let subject = DistinguishedName::builder().common_name("localhost".to_string()).build();
//! let request = CertificateSigningRequest::new(&subject, &server_key)?.into_cert_info()?;
//! let server_cert = ca.issue(&request, Validity::for_days(3650), &random_serial())?;
//! localca::verify::verify_issued_by(&server_cert, &ca.cert, time::OffsetDateTime::now_utc())?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`key`]: Key generation, PKCS#8 import/export, signing and verification
//! - [`cert`]: Certificate creation, encoding/decoding, names and extensions
//! - [`csr`]: PKCS#10 certificate signing requests
//! - [`issuer`]: Certificate issuing functionality and CA operations
//! - [`serial`]: The CA serial counter file
//! - [`verify`]: Self-signature and chain verification
//! - [`pkcs12`]: Client archive export and opening
//! - [`store`]: Key directory layout and file handling
//! - [`config`]: Provisioning options and their defaults
//! - [`workflow`]: The provisioning, check and ensure pipelines
//! - [`error`]: Error types and handling

pub mod cert;
pub mod config;
pub mod csr;
pub mod error;
pub mod issuer;
pub mod key;
pub mod pem_utils;
pub mod pkcs12;
pub mod serial;
pub mod store;
pub mod tbs_certificate;
pub mod verify;
pub mod workflow;
