use der::Encode;
use der::flagset::FlagSet;
use sha1::Sha1;
use x509_cert::certificate::CertificateInner;
use x509_cert::name::Name;

use crate::cert::Certificate;
use crate::cert::extensions::AuthorityKeyIdentifier;
use crate::cert::extensions::BasicConstraints;
use crate::cert::extensions::ExtendedKeyUsage;
use crate::cert::extensions::KeyUsage;
use crate::cert::extensions::KeyUsages;
use crate::cert::extensions::SubjectAltName;
use crate::cert::extensions::SubjectKeyIdentifier;
use crate::cert::params::Validity;
use crate::cert::params::{CertificationRequestInfo, ExtensionParam};
use crate::error::{LocalCaError, Result};
use crate::key::{KeyPair, PublicKey};
use crate::tbs_certificate::TbsCertificate;

/// SHA-1 over the subjectPublicKey bits (RFC 5280 section 4.2.1.2, method 1).
pub fn key_identifier(public_key: &PublicKey) -> Result<Vec<u8>> {
    let spki = public_key.to_spki()?;
    Ok(<Sha1 as sha1::Digest>::digest(spki.subject_public_key.raw_bytes()).to_vec())
}

/// Represents an entity capable of issuing certificates.
///
/// This trait provides methods to retrieve issuer details and issue certificates.
pub trait Issuer {
    /// Returns the encoded name of the issuer, exactly as issued certificates will carry it.
    fn issuer_name(&self) -> Result<Name>;

    /// Returns the signing key of the issuer.
    fn signing_key(&self) -> &KeyPair;

    /// Issues a certificate based on the provided certification request information.
    ///
    /// # Arguments
    /// * `cert_request` - The certification request information containing details about the certificate to be issued.
    /// * `validity` - The validity window of the new certificate.
    /// * `serial_number` - The serial number assigned to the new certificate.
    ///
    /// # Returns
    /// A `Certificate` object representing the issued certificate.
    fn issue(
        &self,
        cert_request: &CertificationRequestInfo,
        validity: Validity,
        serial_number: &[u8],
    ) -> Result<Certificate> {
        if validity.not_after <= validity.not_before {
            return Err(LocalCaError::InvalidInput(
                "validity must end after it begins".to_string(),
            ));
        }

        let signature_algo = self.signing_key().signature_algorithm();
        let issuer_public_key = PublicKey::from_key_pair(self.signing_key());

        let basic_constraints = BasicConstraints {
            is_ca: cert_request.is_ca,
            max_path_length: None,
        };

        let mut extensions: Vec<ExtensionParam> = vec![
            ExtensionParam::from_extension(basic_constraints, true)?,
            ExtensionParam::from_extension(
                SubjectKeyIdentifier(key_identifier(&cert_request.subject_public_key)?),
                false,
            )?,
            ExtensionParam::from_extension(
                AuthorityKeyIdentifier::from_key_id(key_identifier(&issuer_public_key)?),
                false,
            )?,
        ];

        let mut key_usage_flags: FlagSet<KeyUsages> = KeyUsages::DigitalSignature.into();

        if cert_request.is_ca {
            key_usage_flags |= KeyUsages::KeyCertSign;
            key_usage_flags |= KeyUsages::CRLSign;
        } else if matches!(cert_request.subject_public_key, PublicKey::Rsa(_)) {
            // RSA key transport for TLS servers and clients
            key_usage_flags |= KeyUsages::KeyEncipherment;
        }

        extensions.push(ExtensionParam::from_extension(
            KeyUsage(key_usage_flags),
            true,
        )?);

        if !cert_request.usages.is_empty() {
            let extended_key_usage = ExtendedKeyUsage {
                usage: cert_request.usages.clone(),
            };
            extensions.push(ExtensionParam::from_extension(extended_key_usage, false)?);
        }

        if !cert_request.subject_alt_names.is_empty() {
            let san = SubjectAltName {
                names: cert_request.subject_alt_names.clone(),
            };
            extensions.push(ExtensionParam::from_extension(san, false)?);
        }

        // Caller-supplied extensions never shadow the generated ones
        let mut combined_extensions: Vec<ExtensionParam> = cert_request
            .extensions
            .iter()
            .filter(|ext| !extensions.iter().any(|own| own.oid == ext.oid))
            .cloned()
            .collect();
        combined_extensions.extend(extensions);

        let tbs_cert = TbsCertificate {
            serial_number: serial_number.to_vec(),
            signature_algorithm: signature_algo.clone(),
            issuer: self.issuer_name()?,
            not_before: validity.not_before,
            not_after: validity.not_after,
            subject: cert_request.subject.clone(),
            subject_public_key: cert_request.subject_public_key.clone(),
            extensions: combined_extensions,
        };

        let tbs_cert_inner = tbs_cert.to_tbs_certificate_inner()?;

        let signature = self.signing_key().sign_data(&tbs_cert_inner.to_der()?)?;

        let cert_inner = CertificateInner {
            tbs_certificate: tbs_cert_inner,
            signature_algorithm: signature_algo.into(),
            signature: der::asn1::BitString::from_bytes(&signature)?,
        };

        Ok(Certificate { inner: cert_inner })
    }
}
