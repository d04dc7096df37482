//! The provisioning pipeline.
//!
//! A run is a fixed sequence of stages. Each stage returns a `Result`; the first
//! failure stops the run and is reported wrapped in [`LocalCaError::Stage`] so the
//! operator can see which step broke. Leaf certificates are verified against the
//! root before anything is exported or deleted.

use std::fmt;
use std::path::PathBuf;

use time::OffsetDateTime;
use tracing::{error, info, info_span};

use crate::cert::extensions::ExtendedKeyUsageOption;
use crate::cert::params::{CertificationRequestInfo, DistinguishedName, Validity};
use crate::cert::{Certificate, CertificateWithPrivateKey};
use crate::config::ProvisionConfig;
use crate::csr::CertificateSigningRequest;
use crate::error::{LocalCaError, Result};
use crate::issuer::Issuer;
use crate::key::{KeyPair, PublicKey};
use crate::pkcs12;
use crate::serial::{encode_hex, random_serial};
use crate::store::{Artifact, Identity, KeyDirectory, Lifetime, join};
use crate::verify::{verify_issued_by, verify_self_signed};

/// One step of a provisioning or checking run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ValidateConfig,
    PrepareDirectory,
    GenerateRootCa,
    VerifyRoot,
    GenerateLeaf(Identity),
    SignLeaf(Identity),
    VerifyLeaf(Identity),
    ExportClient,
    Cleanup,
    FinalCheck,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::ValidateConfig => write!(f, "validate configuration"),
            Stage::PrepareDirectory => write!(f, "prepare key directory"),
            Stage::GenerateRootCa => write!(f, "generate root CA"),
            Stage::VerifyRoot => write!(f, "verify root certificate"),
            Stage::GenerateLeaf(identity) => write!(f, "generate {identity} key and CSR"),
            Stage::SignLeaf(identity) => write!(f, "sign {identity} certificate"),
            Stage::VerifyLeaf(identity) => write!(f, "verify {identity} certificate"),
            Stage::ExportClient => write!(f, "export client archive"),
            Stage::Cleanup => write!(f, "clean up intermediate files"),
            Stage::FinalCheck => write!(f, "check final layout"),
        }
    }
}

fn run_stage<T>(stage: Stage, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let _span = info_span!("stage", %stage).entered();
    f().map_err(|source| {
        error!(%stage, error = %source, "stage failed");
        LocalCaError::Stage {
            stage,
            source: Box::new(source),
        }
    })
}

/// Summary of a successful provisioning run.
#[derive(Debug, Clone)]
pub struct ProvisionReport {
    pub key_dir: PathBuf,
    pub root_subject: DistinguishedName,
    pub server_subject: DistinguishedName,
    pub client_subject: DistinguishedName,
    /// Hex serial numbers of the issued leaves, server first.
    pub serials: Vec<(Identity, String)>,
    /// Files that remain.
    pub persisted: Vec<PathBuf>,
    /// Files deleted during cleanup.
    pub removed: Vec<Artifact>,
}

/// Summary of a successful check of an existing directory.
#[derive(Debug, Clone)]
pub struct CheckReport {
    pub key_dir: PathBuf,
    pub root_subject: DistinguishedName,
    pub server_subject: DistinguishedName,
    pub client_subject: DistinguishedName,
    pub expires: OffsetDateTime,
}

/// What [`ensure`] did.
#[derive(Debug, Clone)]
pub enum EnsureOutcome {
    AlreadyProvisioned(CheckReport),
    Provisioned(ProvisionReport),
}

/// Runs the whole pipeline against `config.key_dir`.
///
/// The directory must hold none of the managed artifacts unless `force` is set, in
/// which case they are removed first.
pub fn provision(config: &ProvisionConfig, force: bool) -> Result<ProvisionReport> {
    run_stage(Stage::ValidateConfig, || config.validate())?;

    let dir = KeyDirectory::new(&config.key_dir);
    info!(key_dir = %dir.root().display(), algorithm = %config.key_algorithm, "provisioning");
    run_stage(Stage::PrepareDirectory, || dir.prepare(force))?;

    let ca = run_stage(Stage::GenerateRootCa, || generate_root_ca(&dir, config))?;

    for identity in Identity::ALL {
        run_stage(Stage::GenerateLeaf(identity), || {
            generate_leaf(&dir, identity, config)
        })?;
    }

    let mut serials = Vec::new();
    for identity in Identity::ALL {
        let cert = run_stage(Stage::SignLeaf(identity), || {
            sign_leaf(&dir, identity, &ca, config)
        })?;
        serials.push((identity, encode_hex(&cert.serial_number())));
    }

    for identity in Identity::ALL {
        run_stage(Stage::VerifyLeaf(identity), || {
            verify_leaf(&dir, identity, &ca.cert)
        })?;
    }

    run_stage(Stage::ExportClient, || export_client(&dir, config))?;

    let removed = run_stage(Stage::Cleanup, || dir.cleanup())?;
    info!(removed = %join(&removed), "removed intermediate files");

    run_stage(Stage::FinalCheck, || final_layout(&dir))?;

    let persisted = Artifact::with_lifetime(Lifetime::Persistent)
        .map(|a| dir.path(a))
        .collect();

    Ok(ProvisionReport {
        key_dir: dir.root().to_path_buf(),
        root_subject: config.ca_subject.clone(),
        server_subject: config.server_subject(),
        client_subject: config.client_subject(),
        serials,
        persisted,
        removed,
    })
}

/// Creates the root key and self-signed root certificate, writes both, and checks
/// the self-signature.
pub fn generate_root_ca(
    dir: &KeyDirectory,
    config: &ProvisionConfig,
) -> Result<CertificateWithPrivateKey> {
    let key = KeyPair::generate(config.key_algorithm)?;
    let info = CertificationRequestInfo::builder()
        .subject(config.ca_subject.clone())
        .subject_public_key(PublicKey::from_key_pair(&key))
        .is_ca(true)
        .build();
    let serial = random_serial();
    let cert = Certificate::new_self_signed(
        &info,
        &key,
        Validity::for_days(i64::from(config.validity_days)),
        &serial,
    )?;
    verify_self_signed(&cert)?;

    dir.write_key(Artifact::RootKey, &key)?;
    dir.write_cert(Artifact::RootCert, &cert)?;
    info!(
        subject = %config.ca_subject.common_name,
        serial = %encode_hex(&serial),
        "root CA created"
    );
    Ok(CertificateWithPrivateKey { cert, key })
}

/// Creates the key and signing request for one identity and writes both.
pub fn generate_leaf(
    dir: &KeyDirectory,
    identity: Identity,
    config: &ProvisionConfig,
) -> Result<KeyPair> {
    let subject = match identity {
        Identity::Server => config.server_subject(),
        Identity::Client => config.client_subject(),
    };
    let key = KeyPair::generate(config.key_algorithm)?;
    let csr = CertificateSigningRequest::new(&subject, &key)?;

    dir.write_key(identity.key(), &key)?;
    dir.write_csr(identity.csr(), &csr)?;
    info!(%identity, subject = %subject.common_name, "key and CSR written");
    Ok(key)
}

/// Reads the identity's CSR, checks it, and issues its certificate from `ca`.
pub fn sign_leaf(
    dir: &KeyDirectory,
    identity: Identity,
    ca: &CertificateWithPrivateKey,
    config: &ProvisionConfig,
) -> Result<Certificate> {
    let csr = dir.read_csr(identity.csr())?;
    let mut request = csr.into_cert_info()?;
    match identity {
        Identity::Server => {
            request.usages = vec![ExtendedKeyUsageOption::ServerAuth];
            request.subject_alt_names = config.server_subject_alt_names();
        }
        Identity::Client => {
            request.usages = vec![ExtendedKeyUsageOption::ClientAuth];
        }
    }

    let mut validity = Validity::for_days(i64::from(config.validity_days));
    validity.not_after = validity.not_after.min(ca.cert.validity().not_after);

    let serial = dir.serial_file().next()?;
    let cert = ca.issue(&request, validity, &serial)?;
    dir.write_cert(identity.cert(), &cert)?;
    info!(%identity, serial = %encode_hex(&serial), "certificate issued");
    Ok(cert)
}

/// Verifies the identity's certificate on disk against the root.
pub fn verify_leaf(dir: &KeyDirectory, identity: Identity, root: &Certificate) -> Result<()> {
    let cert = dir.read_cert(identity.cert())?;
    verify_issued_by(&cert, root, OffsetDateTime::now_utc())?;
    info!(%identity, "certificate verifies against root");
    Ok(())
}

/// Bundles the client certificate and key into `client.pfx` and reopens it.
pub fn export_client(dir: &KeyDirectory, config: &ProvisionConfig) -> Result<PathBuf> {
    let passphrase = config.passphrase()?;
    let cert = dir.read_cert(Artifact::ClientCert)?;
    let key = dir.read_key(Artifact::ClientKey)?;

    let archive = pkcs12::export(&cert, &key, passphrase, &config.client_friendly_name)?;
    let reopened = pkcs12::open(&archive, passphrase)?;
    if reopened.cert != cert {
        return Err(LocalCaError::Pkcs12Error(
            "archive does not round-trip the client certificate".to_string(),
        ));
    }

    let path = dir.write_new(Artifact::ClientArchive, &archive)?;
    info!(path = %path.display(), "client archive written");
    Ok(path)
}

fn final_layout(dir: &KeyDirectory) -> Result<()> {
    let missing = dir.missing_persistent();
    if !missing.is_empty() {
        return Err(LocalCaError::InvalidInput(format!(
            "expected files are missing: {}",
            join(&missing)
        )));
    }
    let leftover: Vec<_> = Artifact::with_lifetime(Lifetime::Ephemeral)
        .filter(|a| dir.exists(*a))
        .collect();
    if !leftover.is_empty() {
        return Err(LocalCaError::InvalidInput(format!(
            "intermediate files were not removed: {}",
            join(&leftover)
        )));
    }
    Ok(())
}

/// Verifies an already provisioned directory. Needs the passphrase but no CA key.
pub fn check(config: &ProvisionConfig) -> Result<CheckReport> {
    let dir = KeyDirectory::new(&config.key_dir);
    let now = OffsetDateTime::now_utc();

    let root = run_stage(Stage::VerifyRoot, || {
        let root = dir.read_cert(Artifact::RootCert)?;
        verify_self_signed(&root)?;
        Ok(root)
    })?;

    let server = run_stage(Stage::VerifyLeaf(Identity::Server), || {
        let server = dir.read_cert(Artifact::ServerCert)?;
        verify_issued_by(&server, &root, now)?;
        pkcs12::ensure_key_matches(&server, &dir.read_key(Artifact::ServerKey)?)?;
        Ok(server)
    })?;

    let client = run_stage(Stage::VerifyLeaf(Identity::Client), || {
        let archive = dir.read(Artifact::ClientArchive)?;
        let identity = pkcs12::open(&archive, config.passphrase()?)?;
        verify_issued_by(&identity.cert, &root, now)?;
        Ok(identity.cert)
    })?;

    let expires = [&root, &server, &client]
        .iter()
        .map(|cert| cert.validity().not_after)
        .min()
        .unwrap_or(now);

    info!(key_dir = %dir.root().display(), %expires, "existing material verifies");
    Ok(CheckReport {
        key_dir: dir.root().to_path_buf(),
        root_subject: root.subject()?,
        server_subject: server.subject()?,
        client_subject: client.subject()?,
        expires,
    })
}

/// Provisions only when nothing is there yet; otherwise checks what is there.
///
/// A directory holding some but not all of the final files is an error.
pub fn ensure(config: &ProvisionConfig) -> Result<EnsureOutcome> {
    let dir = KeyDirectory::new(&config.key_dir);
    let present = dir.present();

    if present.is_empty() {
        info!(key_dir = %dir.root().display(), "no existing material, provisioning");
        return provision(config, false).map(EnsureOutcome::Provisioned);
    }

    let missing = dir.missing_persistent();
    let leftover: Vec<_> = present
        .into_iter()
        .filter(|a| a.lifetime() == Lifetime::Ephemeral)
        .collect();
    if !missing.is_empty() || !leftover.is_empty() {
        let mut problems = Vec::new();
        if !missing.is_empty() {
            problems.push(format!("missing {}", join(&missing)));
        }
        if !leftover.is_empty() {
            problems.push(format!("leftover {}", join(&leftover)));
        }
        return Err(LocalCaError::Stage {
            stage: Stage::PrepareDirectory,
            source: Box::new(LocalCaError::InvalidInput(format!(
                "{} holds a partial run ({}); rerun provision with --force",
                dir.root().display(),
                problems.join("; ")
            ))),
        });
    }

    run_stage(Stage::ValidateConfig, || config.passphrase().map(|_| ()))?;
    check(config).map(EnsureOutcome::AlreadyProvisioned)
}
