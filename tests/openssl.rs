mod util;

use std::process::Command;

use localca::store::{Artifact, KeyDirectory};
use localca::workflow;
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::PKey;
use openssl::stack::Stack;
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::{X509, X509NameRef, X509StoreContext};
use regex::Regex;

fn common_name(name: &X509NameRef) -> String {
    name.entries_by_nid(Nid::COMMONNAME)
        .next()
        .unwrap()
        .data()
        .as_utf8()
        .unwrap()
        .to_string()
}

fn verify_against(root: &X509, cert: &X509) -> bool {
    let mut builder = X509StoreBuilder::new().unwrap();
    builder.add_cert(root.clone()).unwrap();
    let store = builder.build();
    let chain = Stack::new().unwrap();
    let mut ctx = X509StoreContext::new().unwrap();
    ctx.init(&store, cert, &chain, |c| c.verify_cert())
        .unwrap()
}

#[test]
fn test_openssl_crate_validate_chain() {
    let (_tmp, config) = util::test_config().unwrap();
    workflow::provision(&config, false).unwrap();
    let dir = KeyDirectory::new(&config.key_dir);

    let root = X509::from_pem(&dir.read(Artifact::RootCert).unwrap()).expect("Failed to parse root");
    let server =
        X509::from_pem(&dir.read(Artifact::ServerCert).unwrap()).expect("Failed to parse server");

    // Root is self-signed, server is signed by root
    let root_key = root.public_key().unwrap();
    assert!(root.verify(&root_key).unwrap(), "Root self-signature invalid");
    assert!(server.verify(&root_key).unwrap(), "Server signature invalid");

    assert_eq!(common_name(root.subject_name()), "Video Server Certificate Authority");
    assert_eq!(common_name(server.subject_name()), "localhost");
    assert_eq!(
        common_name(server.issuer_name()),
        "Video Server Certificate Authority"
    );
    assert_eq!(server.version(), 2, "X509 version should be 3 (0-based index)");
    assert_eq!(
        server.signature_algorithm().object().nid(),
        Nid::SHA256WITHRSAENCRYPTION
    );

    // Full path validation against a store holding only the root
    assert!(verify_against(&root, &server), "chain verification failed");

    // The server key on disk is the key the certificate names
    let key = PKey::private_key_from_pem(&dir.read(Artifact::ServerKey).unwrap())
        .expect("Failed to parse server key");
    assert!(server.public_key().unwrap().public_eq(&key));
}

#[test]
fn test_openssl_crate_validate_ecdsa_chain() {
    let (_tmp, config) = util::test_config_with(localca::key::KeyAlgorithm::EcdsaP256).unwrap();
    workflow::provision(&config, false).unwrap();
    let dir = KeyDirectory::new(&config.key_dir);

    let root = X509::from_pem(&dir.read(Artifact::RootCert).unwrap()).unwrap();
    let server = X509::from_pem(&dir.read(Artifact::ServerCert).unwrap()).unwrap();

    assert!(server.verify(&root.public_key().unwrap()).unwrap());
    assert_eq!(
        server.signature_algorithm().object().nid(),
        Nid::ECDSA_WITH_SHA256
    );
}

#[test]
fn test_openssl_cli_verify_server_cert() {
    let (_tmp, config) = util::test_config().unwrap();
    workflow::provision(&config, false).unwrap();
    let dir = KeyDirectory::new(&config.key_dir);

    let output = Command::new("openssl")
        .arg("verify")
        .arg("-purpose")
        .arg("sslserver")
        .arg("-CAfile")
        .arg(dir.path(Artifact::RootCert))
        .arg(dir.path(Artifact::ServerCert))
        .output()
        .expect("Failed to execute OpenSSL command");
    assert!(
        output.status.success(),
        "OpenSSL verify failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let output = Command::new("openssl")
        .arg("x509")
        .arg("-in")
        .arg(dir.path(Artifact::ServerCert))
        .arg("-noout")
        .arg("-text")
        .output()
        .expect("Failed to execute OpenSSL command");
    assert!(
        output.status.success(),
        "OpenSSL command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let output_text = String::from_utf8_lossy(&output.stdout);

    // Spacing around '=' differs between OpenSSL versions
    let subject = Regex::new(r"Subject: C ?= ?US, O ?= ?Local Video Streaming, CN ?= ?localhost").unwrap();
    let issuer = Regex::new(
        r"Issuer: C ?= ?US, O ?= ?Local Video Streaming, CN ?= ?Video Server Certificate Authority",
    )
    .unwrap();
    assert!(subject.is_match(&output_text), "Subject field is incorrect");
    assert!(issuer.is_match(&output_text), "Issuer field is incorrect");
    assert!(output_text.contains("Version: 3 (0x2)"));
    assert!(output_text.contains("Public-Key: (2048 bit)"));
    assert!(output_text.contains("Signature Algorithm: sha256WithRSAEncryption"));
    assert!(output_text.contains("CA:FALSE"));
    assert!(output_text.contains("TLS Web Server Authentication"));
    assert!(output_text.contains("DNS:localhost"));
}

#[test]
fn test_openssl_cli_root_is_ca() {
    let (_tmp, config) = util::test_config().unwrap();
    workflow::provision(&config, false).unwrap();
    let dir = KeyDirectory::new(&config.key_dir);

    let output = Command::new("openssl")
        .arg("x509")
        .arg("-in")
        .arg(dir.path(Artifact::RootCert))
        .arg("-noout")
        .arg("-text")
        .output()
        .expect("Failed to execute OpenSSL command");
    assert!(output.status.success());
    let output_text = String::from_utf8_lossy(&output.stdout);

    assert!(output_text.contains("CA:TRUE"));
    assert!(output_text.contains("Certificate Sign"));
}

#[test]
fn test_openssl_crate_opens_client_archive() {
    let (_tmp, config) = util::test_config().unwrap();
    workflow::provision(&config, false).unwrap();
    let dir = KeyDirectory::new(&config.key_dir);

    let archive = Pkcs12::from_der(&dir.read(Artifact::ClientArchive).unwrap())
        .expect("Failed to parse client archive");
    let parsed = archive
        .parse2(util::PASSPHRASE)
        .expect("OpenSSL could not decrypt the client archive");
    let cert = parsed.cert.expect("archive holds no certificate");
    let key = parsed.pkey.expect("archive holds no private key");

    assert_eq!(common_name(cert.subject_name()), "Client Certs");
    assert!(cert.public_key().unwrap().public_eq(&key));

    let root = X509::from_pem(&dir.read(Artifact::RootCert).unwrap()).unwrap();
    assert!(verify_against(&root, &cert), "client chain verification failed");

    assert!(
        Pkcs12::from_der(&dir.read(Artifact::ClientArchive).unwrap())
            .unwrap()
            .parse2("not the passphrase")
            .is_err()
    );
}

#[test]
fn test_openssl_cli_reads_client_archive() {
    let (tmp, config) = util::test_config().unwrap();
    workflow::provision(&config, false).unwrap();
    let dir = KeyDirectory::new(&config.key_dir);
    let extracted = tmp.path().join("client-from-pfx.crt");

    let output = Command::new("openssl")
        .arg("pkcs12")
        .arg("-in")
        .arg(dir.path(Artifact::ClientArchive))
        .arg("-passin")
        .arg(format!("pass:{}", util::PASSPHRASE))
        .arg("-clcerts")
        .arg("-nokeys")
        .arg("-out")
        .arg(&extracted)
        .output()
        .expect("Failed to execute OpenSSL command");
    assert!(
        output.status.success(),
        "OpenSSL pkcs12 failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let output = Command::new("openssl")
        .arg("verify")
        .arg("-purpose")
        .arg("sslclient")
        .arg("-CAfile")
        .arg(dir.path(Artifact::RootCert))
        .arg(&extracted)
        .output()
        .expect("Failed to execute OpenSSL command");
    assert!(
        output.status.success(),
        "OpenSSL verify failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}
