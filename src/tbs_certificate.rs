use der::asn1::{GeneralizedTime, OctetString, UtcTime};
use time::OffsetDateTime;
use x509_cert::Version;
use x509_cert::certificate::TbsCertificateInner;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;

use crate::cert::SignatureAlgorithm;
use crate::cert::params::{DistinguishedName, ExtensionParam};
use crate::error::Result;
use crate::key::PublicKey;

/// Represents the "To Be Signed" (TBS) portion of an X.509 certificate.
/// This struct contains all the fields required to generate a valid X.509 certificate.
///
/// # Fields
/// * `serial_number` - The unique identifier for the certificate.
/// * `signature_algorithm` - The algorithm used to sign the certificate.
/// * `issuer` - The encoded name of the certificate issuer.
/// * `not_before` - The start of the certificate's validity period.
/// * `not_after` - The end of the certificate's validity period.
/// * `subject` - The distinguished name of the certificate subject.
/// * `subject_public_key` - The public key of the certificate subject.
/// * `extensions` - Additional X.509 extensions for the certificate.
pub struct TbsCertificate {
    /// Certificate serial number
    pub serial_number: Vec<u8>,
    /// Certificate signature algorithm
    pub signature_algorithm: SignatureAlgorithm,
    /// Certificate issuer name, copied verbatim from the issuer's subject
    pub issuer: Name,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
    /// Certificate subject distinguished name
    pub subject: DistinguishedName,
    /// Subject's public key
    pub subject_public_key: PublicKey,
    /// Certificate extensions
    pub extensions: Vec<ExtensionParam>,
}

impl TbsCertificate {
    /// Converts the `TbsCertificate` into a `TbsCertificateInner` for DER encoding.
    ///
    /// # Returns
    /// A `TbsCertificateInner` object suitable for DER encoding.
    pub fn to_tbs_certificate_inner(&self) -> Result<TbsCertificateInner> {
        let algorithm_id: x509_cert::spki::AlgorithmIdentifierOwned =
            self.signature_algorithm.clone().into();

        let extensions = self
            .extensions
            .iter()
            .map(|ext| {
                Ok(x509_cert::ext::Extension {
                    extn_id: ext.oid,
                    critical: ext.critical,
                    extn_value: OctetString::new(ext.value.clone())?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let validity = x509_cert::time::Validity {
            not_before: to_x509_time(self.not_before)?,
            not_after: to_x509_time(self.not_after)?,
        };

        Ok(TbsCertificateInner {
            version: Version::V3,
            serial_number: SerialNumber::new(self.serial_number.as_slice())?,
            signature: algorithm_id,
            issuer: self.issuer.clone(),
            validity,
            subject: self.subject.as_x509_name()?,
            subject_public_key_info: self.subject_public_key.to_spki()?,
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: Some(extensions),
        })
    }
}

/// RFC 5280 section 4.1.2.5: UTCTime through 2049, GeneralizedTime from 2050 on.
fn to_x509_time(at: OffsetDateTime) -> Result<x509_cert::time::Time> {
    let at = at.replace_nanosecond(0).unwrap_or(at);
    if at.year() < 2050 {
        Ok(x509_cert::time::Time::UtcTime(UtcTime::from_system_time(
            at.into(),
        )?))
    } else {
        Ok(x509_cert::time::Time::GeneralTime(
            GeneralizedTime::from_system_time(at.into())?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyPair;

    fn tbs(not_after: OffsetDateTime) -> TbsCertificate {
        let key = KeyPair::generate_ecdsa_p256();
        let subject = DistinguishedName::builder()
            .common_name("localhost".to_string())
            .build();
        TbsCertificate {
            serial_number: vec![0x01, 0x02],
            signature_algorithm: SignatureAlgorithm::Sha256WithECDSA,
            issuer: subject.as_x509_name().unwrap(),
            not_before: OffsetDateTime::now_utc(),
            not_after,
            subject,
            subject_public_key: PublicKey::from_key_pair(&key),
            extensions: vec![],
        }
    }

    #[test]
    fn test_validity_encoding_switches_at_2050() {
        let near = tbs(OffsetDateTime::now_utc() + time::Duration::days(3650))
            .to_tbs_certificate_inner()
            .unwrap();
        assert!(matches!(
            near.validity.not_after,
            x509_cert::time::Time::UtcTime(_)
        ));

        let far = tbs(OffsetDateTime::from_unix_timestamp(2_556_144_000).unwrap())
            .to_tbs_certificate_inner()
            .unwrap();
        assert!(matches!(
            far.validity.not_after,
            x509_cert::time::Time::GeneralTime(_)
        ));
    }

    #[test]
    fn test_tbs_is_version_three() {
        let inner = tbs(OffsetDateTime::now_utc() + time::Duration::days(1))
            .to_tbs_certificate_inner()
            .unwrap();
        assert_eq!(inner.version, Version::V3);
    }
}
