pub mod extensions;
pub mod params;

use der::{Decode, Encode};
use extensions::ToAndFromX509Extension;
use params::{CertificationRequestInfo, ExtensionParam, Validity};
use x509_cert::certificate::CertificateInner;

pub use crate::error::Result;
use crate::error::LocalCaError;
use crate::issuer::Issuer;
use crate::key::{KeyPair, PublicKey};
use crate::pem_utils::{self, CERTIFICATE_LABEL};

/// Represents the supported signature algorithms for certificates.
///
/// This enum provides a mapping to the corresponding OIDs for each algorithm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// SHA-256 with RSA encryption.
    Sha256WithRSA,
    /// SHA-256 with ECDSA.
    Sha256WithECDSA,
}

impl SignatureAlgorithm {
    /// Maps an algorithm identifier found in a certificate or request back to the enum.
    pub fn from_algorithm_identifier(
        identifier: &x509_cert::spki::AlgorithmIdentifierOwned,
    ) -> Result<Self> {
        match identifier.oid {
            const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION => Ok(Self::Sha256WithRSA),
            const_oid::db::rfc5912::ECDSA_WITH_SHA_256 => Ok(Self::Sha256WithECDSA),
            oid => Err(LocalCaError::DecodingError(format!(
                "Unsupported signature algorithm {oid}"
            ))),
        }
    }
}

impl From<SignatureAlgorithm> for x509_cert::spki::AlgorithmIdentifierOwned {
    /// Converts a `SignatureAlgorithm` into an `AlgorithmIdentifierOwned`.
    ///
    /// RSA identifiers carry an explicit NULL parameter (RFC 4055); ECDSA ones carry none.
    fn from(value: SignatureAlgorithm) -> Self {
        match value {
            SignatureAlgorithm::Sha256WithRSA => x509_cert::spki::AlgorithmIdentifierOwned {
                oid: const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
                parameters: Some(der::asn1::Any::null()),
            },
            SignatureAlgorithm::Sha256WithECDSA => x509_cert::spki::AlgorithmIdentifierOwned {
                oid: const_oid::db::rfc5912::ECDSA_WITH_SHA_256,
                parameters: None,
            },
        }
    }
}

/// Represents an X.509 certificate.
///
/// This struct provides methods to encode the certificate into DER or PEM formats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// The inner representation of the certificate.
    pub inner: CertificateInner,
}

impl Certificate {
    /// Encodes the certificate into DER format.
    ///
    /// # Returns
    /// A byte vector containing the DER-encoded certificate.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.inner
            .to_der()
            .map_err(|e| LocalCaError::EncodingError(e.to_string()))
    }

    /// Encodes the certificate into PEM format.
    ///
    /// # Returns
    /// A string containing the PEM-encoded certificate.
    pub fn to_pem(&self) -> Result<String> {
        Ok(pem_utils::der_to_pem(&self.to_der()?, CERTIFICATE_LABEL))
    }

    pub fn from_der(der: &[u8]) -> Result<Self> {
        Ok(Self {
            inner: CertificateInner::from_der(der)?,
        })
    }

    pub fn from_pem(pem: &str) -> Result<Self> {
        Self::from_der(&pem_utils::pem_to_der(pem, CERTIFICATE_LABEL)?)
    }

    /// The subject distinguished name.
    pub fn subject(&self) -> Result<params::DistinguishedName> {
        params::DistinguishedName::from_x509_name(&self.inner.tbs_certificate.subject)
    }

    /// The issuer distinguished name.
    pub fn issuer(&self) -> Result<params::DistinguishedName> {
        params::DistinguishedName::from_x509_name(&self.inner.tbs_certificate.issuer)
    }

    /// The public key bound into the certificate.
    pub fn public_key(&self) -> Result<PublicKey> {
        PublicKey::from_x509spki(&self.inner.tbs_certificate.subject_public_key_info)
    }

    /// The raw serial number bytes.
    pub fn serial_number(&self) -> Vec<u8> {
        self.inner
            .tbs_certificate
            .serial_number
            .as_bytes()
            .to_vec()
    }

    /// The validity window stated in the certificate.
    pub fn validity(&self) -> Validity {
        let validity = &self.inner.tbs_certificate.validity;
        Validity {
            not_before: validity.not_before.to_system_time().into(),
            not_after: validity.not_after.to_system_time().into(),
        }
    }

    /// Returns the decoded extension of type `E`, if the certificate carries one.
    pub fn extension<E: ToAndFromX509Extension>(&self) -> Result<Option<E>> {
        self.extensions()
            .iter()
            .find(|ext| ext.oid == E::OID)
            .map(|ext| ext.to_extension())
            .transpose()
    }

    fn extensions(&self) -> Vec<ExtensionParam> {
        self.inner
            .tbs_certificate
            .extensions
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|ext| ExtensionParam {
                oid: ext.extn_id,
                critical: ext.critical,
                value: ext.extn_value.as_bytes().to_vec(),
            })
            .collect()
    }

    /// Extracts certificate information into a `CertificationRequestInfo` object.
    ///
    /// Extensions are described by the typed fields only; the ones [`Issuer::issue`]
    /// generates are not copied, so re-issuing never duplicates them.
    ///
    /// # Returns
    /// A `CertificationRequestInfo` object containing the certificate details.
    pub fn to_cert_info(&self) -> Result<CertificationRequestInfo> {
        let usages = self
            .extension::<extensions::ExtendedKeyUsage>()?
            .map(|eku| eku.usage)
            .unwrap_or_default();

        let subject_alt_names = self
            .extension::<extensions::SubjectAltName>()?
            .map(|san| san.names)
            .unwrap_or_default();

        let is_ca = self
            .extension::<extensions::BasicConstraints>()?
            .is_some_and(|bc| bc.is_ca);

        Ok(CertificationRequestInfo {
            subject: self.subject()?,
            subject_public_key: self.public_key()?,
            usages,
            subject_alt_names,
            is_ca,
            extensions: Vec::new(),
        })
    }

    /// Creates a new self-signed certificate.
    ///
    /// # Arguments
    /// * `cert_info` - The certification request information.
    /// * `key` - The key pair used to sign the certificate.
    /// * `validity` - The validity window of the certificate.
    /// * `serial_number` - The serial number to embed.
    ///
    /// # Returns
    /// A `Certificate` object representing the self-signed certificate.
    pub fn new_self_signed(
        cert_info: &CertificationRequestInfo,
        key: &KeyPair,
        validity: Validity,
        serial_number: &[u8],
    ) -> Result<Self> {
        // For self-signed certificates, the issuer is the same as the subject
        let self_issuer = SelfIssuer {
            name: cert_info.subject.as_x509_name()?,
            key,
        };

        self_issuer.issue(cert_info, validity, serial_number)
    }
}

// Helper struct for self-signed certificates
struct SelfIssuer<'a> {
    name: x509_cert::name::Name,
    key: &'a KeyPair,
}

impl Issuer for SelfIssuer<'_> {
    fn issuer_name(&self) -> Result<x509_cert::name::Name> {
        Ok(self.name.clone())
    }

    fn signing_key(&self) -> &KeyPair {
        self.key
    }
}

/// A certificate together with the private key that can sign on its behalf.
#[derive(Debug, Clone)]
pub struct CertificateWithPrivateKey {
    pub cert: Certificate,
    pub key: crate::key::KeyPair,
}

impl Issuer for CertificateWithPrivateKey {
    fn issuer_name(&self) -> Result<x509_cert::name::Name> {
        // The name of the issuer is the subject of the certificate, byte for byte
        Ok(self.cert.inner.tbs_certificate.subject.clone())
    }

    fn signing_key(&self) -> &KeyPair {
        &self.key
    }
}
