mod util;

use localca::cert::extensions::{
    BasicConstraints, ExtendedKeyUsage, ExtendedKeyUsageOption, SubjectAltName,
};
use localca::error::{LocalCaError, Result};
use localca::key::KeyAlgorithm;
use localca::pkcs12;
use localca::store::{Artifact, Identity, KeyDirectory};
use localca::verify::verify_issued_by;
use localca::workflow::{self, EnsureOutcome, Stage};
use time::OffsetDateTime;

/// A full run leaves exactly the four final files and removes the intermediates.
#[test]
fn provision_leaves_final_layout() -> Result<()> {
    let (_tmp, config) = util::test_config()?;
    let report = workflow::provision(&config, false)?;

    assert_eq!(util::file_names(&config.key_dir)?, util::final_layout());
    assert_eq!(report.persisted.len(), 4);
    assert_eq!(report.removed.len(), 6);
    assert!(report.removed.contains(&Artifact::RootKey));
    assert!(report.removed.contains(&Artifact::Serial));
    Ok(())
}

/// The server certificate names the configured host and chains to the root.
#[test]
fn server_certificate_chains_to_root() -> Result<()> {
    let (_tmp, config) = util::test_config()?;
    workflow::provision(&config, false)?;

    let dir = KeyDirectory::new(&config.key_dir);
    let root = dir.read_cert(Artifact::RootCert)?;
    let server = dir.read_cert(Artifact::ServerCert)?;

    assert_eq!(server.subject()?.common_name, "localhost");
    assert_eq!(
        root.subject()?.common_name,
        "Video Server Certificate Authority"
    );
    assert_eq!(server.issuer()?, root.subject()?);
    verify_issued_by(&server, &root, OffsetDateTime::now_utc())?;

    assert!(util::required_extension::<BasicConstraints>(&root)?.is_ca);
    assert!(!util::required_extension::<BasicConstraints>(&server)?.is_ca);

    let eku: ExtendedKeyUsage = util::required_extension(&server)?;
    assert_eq!(eku.usage, vec![ExtendedKeyUsageOption::ServerAuth]);
    let san: SubjectAltName = util::required_extension(&server)?;
    assert_eq!(san.names, vec!["localhost".to_string()]);

    pkcs12::ensure_key_matches(&server, &dir.read_key(Artifact::ServerKey)?)?;
    Ok(())
}

/// Leaves get distinct serials and roughly ten years of validity.
#[test]
fn leaves_have_distinct_serials_and_long_validity() -> Result<()> {
    let (_tmp, config) = util::test_config()?;
    let report = workflow::provision(&config, false)?;

    assert_eq!(report.serials.len(), 2);
    assert_eq!(report.serials[0].0, Identity::Server);
    assert_eq!(report.serials[1].0, Identity::Client);
    assert_ne!(report.serials[0].1, report.serials[1].1);

    let dir = KeyDirectory::new(&config.key_dir);
    let validity = dir.read_cert(Artifact::ServerCert)?.validity();
    let days = (validity.not_after - validity.not_before).whole_days();
    assert!((3649..=3650).contains(&days), "validity was {days} days");
    Ok(())
}

/// The client archive opens with the passphrase and holds a client-auth identity.
#[test]
fn client_archive_opens_with_passphrase() -> Result<()> {
    let (_tmp, config) = util::test_config()?;
    workflow::provision(&config, false)?;

    let dir = KeyDirectory::new(&config.key_dir);
    let archive = dir.read(Artifact::ClientArchive)?;
    let identity = pkcs12::open(&archive, util::PASSPHRASE)?;

    assert_eq!(identity.friendly_name, "client");
    assert_eq!(identity.cert.subject()?.common_name, "Client Certs");
    let eku: ExtendedKeyUsage = util::required_extension(&identity.cert)?;
    assert_eq!(eku.usage, vec![ExtendedKeyUsageOption::ClientAuth]);

    let root = dir.read_cert(Artifact::RootCert)?;
    verify_issued_by(&identity.cert, &root, OffsetDateTime::now_utc())?;

    assert!(pkcs12::open(&archive, "not the passphrase").is_err());
    Ok(())
}

/// Clearing the directory and running again produces the same layout with a new root.
#[test]
fn rerun_after_clearing_directory() -> Result<()> {
    let (_tmp, config) = util::test_config()?;
    workflow::provision(&config, false)?;
    let dir = KeyDirectory::new(&config.key_dir);
    let first_root = dir.read_cert(Artifact::RootCert)?;

    std::fs::remove_dir_all(&config.key_dir).map_err(|e| LocalCaError::io(&config.key_dir, e))?;
    workflow::provision(&config, false)?;

    assert_eq!(util::file_names(&config.key_dir)?, util::final_layout());
    let second_root = dir.read_cert(Artifact::RootCert)?;
    assert_ne!(first_root.public_key()?, second_root.public_key()?);
    Ok(())
}

/// Existing artifacts stop a run unless forced.
#[test]
fn existing_artifacts_require_force() -> Result<()> {
    let (_tmp, config) = util::test_config()?;
    workflow::provision(&config, false)?;

    let err = workflow::provision(&config, false).unwrap_err();
    assert_eq!(err.stage(), Some(Stage::PrepareDirectory));
    assert!(err.to_string().starts_with("prepare key directory failed"));
    assert_eq!(util::file_names(&config.key_dir)?, util::final_layout());

    workflow::provision(&config, true)?;
    assert_eq!(util::file_names(&config.key_dir)?, util::final_layout());
    Ok(())
}

/// A run without a passphrase fails before anything is written.
#[test]
fn missing_passphrase_is_a_configuration_failure() -> Result<()> {
    let (_tmp, mut config) = util::test_config()?;
    config.passphrase = None;

    let err = workflow::provision(&config, false).unwrap_err();
    assert_eq!(err.stage(), Some(Stage::ValidateConfig));
    assert!(!config.key_dir.exists());
    Ok(())
}

/// `ensure` provisions an empty directory and leaves a complete one alone.
#[test]
fn ensure_is_idempotent() -> Result<()> {
    let (_tmp, config) = util::test_config()?;

    let outcome = workflow::ensure(&config)?;
    assert!(matches!(outcome, EnsureOutcome::Provisioned(_)));

    let dir = KeyDirectory::new(&config.key_dir);
    let root_pem = dir.read_to_string(Artifact::RootCert)?;

    match workflow::ensure(&config)? {
        EnsureOutcome::AlreadyProvisioned(report) => {
            assert_eq!(report.server_subject.common_name, "localhost");
            assert_eq!(report.client_subject.common_name, "Client Certs");
        }
        EnsureOutcome::Provisioned(_) => panic!("second ensure provisioned again"),
    }
    assert_eq!(dir.read_to_string(Artifact::RootCert)?, root_pem);
    Ok(())
}

/// `ensure` refuses a directory left half-way.
#[test]
fn ensure_rejects_partial_directory() -> Result<()> {
    let (_tmp, config) = util::test_config()?;
    workflow::provision(&config, false)?;
    KeyDirectory::new(&config.key_dir).remove(Artifact::ClientArchive)?;

    let err = workflow::ensure(&config).unwrap_err();
    assert_eq!(err.stage(), Some(Stage::PrepareDirectory));
    assert!(err.to_string().contains("client.pfx"));
    Ok(())
}

/// `check` verifies a provisioned directory and rejects a wrong passphrase.
#[test]
fn check_verifies_existing_material() -> Result<()> {
    let (_tmp, mut config) = util::test_config()?;
    workflow::provision(&config, false)?;

    let report = workflow::check(&config)?;
    assert_eq!(
        report.root_subject.common_name,
        "Video Server Certificate Authority"
    );
    assert!(report.expires > OffsetDateTime::now_utc());

    config.passphrase = Some("wrong".to_string());
    let err = workflow::check(&config).unwrap_err();
    assert_eq!(err.stage(), Some(Stage::VerifyLeaf(Identity::Client)));
    match err {
        LocalCaError::Stage { source, .. } => {
            assert!(matches!(*source, LocalCaError::Pkcs12Error(_)))
        }
        other => panic!("unexpected error {other:?}"),
    }
    Ok(())
}

/// `check` notices a server certificate swapped for one from a different root.
#[test]
fn check_rejects_foreign_server_certificate() -> Result<()> {
    let (_tmp, config) = util::test_config()?;
    workflow::provision(&config, false)?;
    let (_other_tmp, other) = util::test_config()?;
    workflow::provision(&other, false)?;

    let ours = KeyDirectory::new(&config.key_dir);
    let theirs = KeyDirectory::new(&other.key_dir);
    ours.remove(Artifact::ServerCert)?;
    ours.write_new(Artifact::ServerCert, &theirs.read(Artifact::ServerCert)?)?;

    let err = workflow::check(&config).unwrap_err();
    assert_eq!(err.stage(), Some(Stage::VerifyLeaf(Identity::Server)));
    Ok(())
}

/// The ECDSA variant goes through the same pipeline.
#[test]
fn provision_with_ecdsa_keys() -> Result<()> {
    let (_tmp, config) = util::test_config_with(KeyAlgorithm::EcdsaP256)?;
    workflow::provision(&config, false)?;

    assert_eq!(util::file_names(&config.key_dir)?, util::final_layout());
    workflow::check(&config)?;
    Ok(())
}

/// Extra names and a custom hostname land in the server certificate.
#[test]
fn custom_hostname_and_extra_names() -> Result<()> {
    let (_tmp, mut config) = util::test_config()?;
    config.hostname = "camera.local".to_string();
    config.extra_subject_alt_names = vec!["192.168.1.20".to_string()];
    workflow::provision(&config, false)?;

    let server = KeyDirectory::new(&config.key_dir).read_cert(Artifact::ServerCert)?;
    assert_eq!(server.subject()?.common_name, "camera.local");
    let san: SubjectAltName = util::required_extension(&server)?;
    assert_eq!(
        san.names,
        vec!["camera.local".to_string(), "192.168.1.20".to_string()]
    );
    Ok(())
}
