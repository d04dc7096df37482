//! Password-protected PKCS#12 archives holding a certificate and its private key.
//!
//! Archives use PBES2 (PBKDF2-HMAC-SHA256, AES-256-CBC) for the bags and an
//! HMAC-SHA256 MAC; no legacy RC2 or 3DES algorithms are emitted.

use p12_keystore::{KeyStore, KeyStoreEntry, PrivateKeyChain};
use sha1::{Digest, Sha1};

use crate::cert::Certificate;
use crate::error::{LocalCaError, Result};
use crate::key::{KeyPair, PublicKey};

/// A certificate and key recovered from an archive.
#[derive(Debug, Clone)]
pub struct ArchivedIdentity {
    pub friendly_name: String,
    pub cert: Certificate,
    pub key: KeyPair,
}

fn pkcs12_error(err: impl std::fmt::Display) -> LocalCaError {
    LocalCaError::Pkcs12Error(err.to_string())
}

/// Packages `cert` and `key` into a DER-encoded PKCS#12 archive.
///
/// # Arguments
/// * `cert` - The certificate to export.
/// * `key` - The private key belonging to `cert`.
/// * `passphrase` - Protects both the key bag and the archive MAC. Must not be empty.
/// * `friendly_name` - The label shown when the archive is imported.
pub fn export(
    cert: &Certificate,
    key: &KeyPair,
    passphrase: &str,
    friendly_name: &str,
) -> Result<Vec<u8>> {
    if passphrase.is_empty() {
        return Err(LocalCaError::InvalidInput(
            "PKCS#12 passphrase must not be empty".to_string(),
        ));
    }
    ensure_key_matches(cert, key)?;

    let cert_der = cert.to_der()?;
    let local_key_id = Sha1::digest(&cert_der);
    let chain = PrivateKeyChain::new(
        key.to_pkcs8_der()?,
        local_key_id.as_slice(),
        [p12_keystore::Certificate::from_der(&cert_der).map_err(pkcs12_error)?],
    );

    let mut store = KeyStore::new();
    store.add_entry(friendly_name, KeyStoreEntry::PrivateKeyChain(chain));
    store.writer(passphrase).write().map_err(pkcs12_error)
}

/// Opens an archive produced by [`export`], checking the MAC and that the
/// recovered key belongs to the recovered certificate.
pub fn open(der: &[u8], passphrase: &str) -> Result<ArchivedIdentity> {
    let store = KeyStore::from_pkcs12(der, passphrase).map_err(pkcs12_error)?;
    let (alias, chain) = store
        .private_key_chain()
        .ok_or_else(|| LocalCaError::Pkcs12Error("archive holds no private key".to_string()))?;
    let leaf = chain
        .chain()
        .first()
        .ok_or_else(|| LocalCaError::Pkcs12Error("archive holds no certificate".to_string()))?;

    let cert = Certificate::from_der(leaf.as_der())?;
    let key = KeyPair::import_from_pkcs8_der(chain.key())?;
    ensure_key_matches(&cert, &key)?;
    Ok(ArchivedIdentity {
        friendly_name: alias.to_string(),
        cert,
        key,
    })
}

/// Fails unless `key` is the private half of the key certified by `cert`.
pub fn ensure_key_matches(cert: &Certificate, key: &KeyPair) -> Result<()> {
    if cert.public_key()? != PublicKey::from_key_pair(key) {
        return Err(LocalCaError::VerificationError(
            "private key does not belong to the certificate".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::params::{CertificationRequestInfo, DistinguishedName, Validity};

    fn identity() -> (Certificate, KeyPair) {
        let key = KeyPair::generate_ecdsa_p256();
        let info = CertificationRequestInfo::builder()
            .subject(
                DistinguishedName::builder()
                    .common_name("Client Certs".to_string())
                    .build(),
            )
            .subject_public_key(PublicKey::from_key_pair(&key))
            .build();
        let cert = Certificate::new_self_signed(&info, &key, Validity::for_days(1), &[1]).unwrap();
        (cert, key)
    }

    #[test]
    fn test_archive_opens_with_passphrase() {
        let (cert, key) = identity();
        let der = export(&cert, &key, "s3cret", "client").unwrap();
        let opened = open(&der, "s3cret").unwrap();
        assert_eq!(opened.friendly_name, "client");
        assert_eq!(opened.cert, cert);
        assert_eq!(
            PublicKey::from_key_pair(&opened.key),
            PublicKey::from_key_pair(&key)
        );
    }

    fn contains_oid(der: &[u8], oid: &str) -> bool {
        use der::Encode;
        let encoded = const_oid::ObjectIdentifier::new_unwrap(oid).to_der().unwrap();
        der.windows(encoded.len()).any(|w| w == encoded.as_slice())
    }

    #[test]
    fn test_archive_uses_pbes2_and_sha256_mac() {
        let (cert, key) = identity();
        let der = export(&cert, &key, "s3cret", "client").unwrap();
        // PBES2 with AES-256-CBC, SHA-256 MAC digest
        assert!(contains_oid(&der, "1.2.840.113549.1.5.13"));
        assert!(contains_oid(&der, "2.16.840.1.101.3.4.1.42"));
        assert!(contains_oid(&der, "2.16.840.1.101.3.4.2.1"));
        // pbeWithSHAAnd40BitRC2-CBC and pbeWithSHAAnd3-KeyTripleDES-CBC
        assert!(!contains_oid(&der, "1.2.840.113549.1.12.1.6"));
        assert!(!contains_oid(&der, "1.2.840.113549.1.12.1.3"));
    }

    #[test]
    fn test_wrong_passphrase_is_rejected() {
        let (cert, key) = identity();
        let der = export(&cert, &key, "s3cret", "client").unwrap();
        assert!(matches!(
            open(&der, "guess"),
            Err(LocalCaError::Pkcs12Error(_))
        ));
    }

    #[test]
    fn test_mismatched_key_is_not_exported() {
        let (cert, _) = identity();
        let stranger = KeyPair::generate_ecdsa_p256();
        assert!(export(&cert, &stranger, "s3cret", "client").is_err());
    }

    #[test]
    fn test_empty_passphrase_is_rejected() {
        let (cert, key) = identity();
        assert!(matches!(
            export(&cert, &key, "", "client"),
            Err(LocalCaError::InvalidInput(_))
        ));
    }
}
