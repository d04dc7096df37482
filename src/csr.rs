//! PKCS#10 certificate signing requests.
//!
//! A request binds a subject name to a public key and is signed by the matching
//! private key, so the signer can check the requester actually holds it.

use der::{Decode, Encode};
use x509_cert::request::{CertReq, CertReqInfo, Version};

use crate::cert::SignatureAlgorithm;
use crate::cert::params::{CertificationRequestInfo, DistinguishedName};
use crate::error::{LocalCaError, Result};
use crate::key::{KeyPair, PublicKey};
use crate::pem_utils::{self, CERTIFICATE_REQUEST_LABEL};

/// A signed certificate signing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSigningRequest {
    pub inner: CertReq,
}

impl CertificateSigningRequest {
    /// Builds a request for `subject` and signs it with `key`.
    pub fn new(subject: &DistinguishedName, key: &KeyPair) -> Result<Self> {
        let info = CertReqInfo {
            version: Version::V1,
            subject: subject.as_x509_name()?,
            public_key: key.as_spki()?,
            attributes: Default::default(),
        };

        let signature_algo = key.signature_algorithm();
        let signature = key.sign_data(&info.to_der()?)?;

        Ok(Self {
            inner: CertReq {
                info,
                algorithm: signature_algo.into(),
                signature: der::asn1::BitString::from_bytes(&signature)?,
            },
        })
    }

    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.inner
            .to_der()
            .map_err(|e| LocalCaError::EncodingError(e.to_string()))
    }

    pub fn to_pem(&self) -> Result<String> {
        Ok(pem_utils::der_to_pem(&self.to_der()?, CERTIFICATE_REQUEST_LABEL))
    }

    pub fn from_der(der: &[u8]) -> Result<Self> {
        Ok(Self {
            inner: CertReq::from_der(der)?,
        })
    }

    pub fn from_pem(pem: &str) -> Result<Self> {
        Self::from_der(&pem_utils::pem_to_der(pem, CERTIFICATE_REQUEST_LABEL)?)
    }

    pub fn subject(&self) -> Result<DistinguishedName> {
        DistinguishedName::from_x509_name(&self.inner.info.subject)
    }

    pub fn public_key(&self) -> Result<PublicKey> {
        PublicKey::from_x509spki(&self.inner.info.public_key)
    }

    /// Checks the request's self-attestation: its signature must verify with the
    /// public key it carries.
    pub fn verify(&self) -> Result<()> {
        let algorithm = SignatureAlgorithm::from_algorithm_identifier(&self.inner.algorithm)?;
        let signature = self.inner.signature.as_bytes().ok_or_else(|| {
            LocalCaError::VerificationError("request signature has unused bits".to_string())
        })?;
        self.public_key()?
            .verify(&algorithm, &self.inner.info.to_der()?, signature)
            .map_err(|e| {
                LocalCaError::VerificationError(format!("request self-signature invalid: {e}"))
            })
    }

    /// Verifies the request and turns it into issuance parameters.
    pub fn into_cert_info(self) -> Result<CertificationRequestInfo> {
        self.verify()?;
        Ok(CertificationRequestInfo::builder()
            .subject(self.subject()?)
            .subject_public_key(self.public_key()?)
            .build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject() -> DistinguishedName {
        DistinguishedName::builder()
            .common_name("localhost".to_string())
            .build()
    }

    #[test]
    fn test_request_verifies_and_survives_pem() {
        let key = KeyPair::generate_rsa(2048).unwrap();
        let csr = CertificateSigningRequest::new(&subject(), &key).unwrap();
        csr.verify().unwrap();

        let pem = csr.to_pem().unwrap();
        assert!(pem.starts_with("-----BEGIN CERTIFICATE REQUEST-----"));
        let parsed = CertificateSigningRequest::from_pem(&pem).unwrap();
        assert_eq!(parsed, csr);

        let info = parsed.into_cert_info().unwrap();
        assert_eq!(info.subject.common_name, "localhost");
        assert_eq!(info.subject_public_key, PublicKey::from_key_pair(&key));
    }

    #[test]
    fn test_tampered_request_is_rejected() {
        let key = KeyPair::generate_ecdsa_p256();
        let mut csr = CertificateSigningRequest::new(&subject(), &key).unwrap();
        csr.inner.info.subject = DistinguishedName::builder()
            .common_name("attacker.example".to_string())
            .build()
            .as_x509_name()
            .unwrap();
        assert!(matches!(
            csr.verify(),
            Err(LocalCaError::VerificationError(_))
        ));
        assert!(csr.into_cert_info().is_err());
    }

    #[test]
    fn test_request_with_foreign_key_is_rejected() {
        let key = KeyPair::generate_ecdsa_p256();
        let other = KeyPair::generate_ecdsa_p256();
        let mut csr = CertificateSigningRequest::new(&subject(), &key).unwrap();
        csr.inner.info.public_key = other.as_spki().unwrap();
        assert!(csr.verify().is_err());
    }

    #[test]
    fn test_private_key_pem_is_not_a_request() {
        let key = KeyPair::generate_ecdsa_p256();
        let pem = key.to_pkcs8_pem().unwrap();
        assert!(matches!(
            CertificateSigningRequest::from_pem(&pem),
            Err(LocalCaError::DecodingError(_))
        ));
    }
}
