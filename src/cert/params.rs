use bon::Builder;
use const_oid::ObjectIdentifier;
use der::asn1::{Any, Ia5StringRef, PrintableStringRef, SetOfVec, Utf8StringRef};
use der::{Tag, Tagged};
use serde::{Deserialize, Serialize};
use time::Duration;
use time::OffsetDateTime;
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::name::{RdnSequence, RelativeDistinguishedName};

use super::extensions::ToAndFromX509Extension;
pub use crate::cert::extensions::ExtendedKeyUsage;
pub use crate::cert::extensions::ExtendedKeyUsageOption;
use crate::error::{LocalCaError, Result};
use crate::key::PublicKey;

const COUNTRY_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.6");
const STATE_OR_PROVINCE_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.8");
const LOCALITY_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.7");
const ORGANIZATION_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
const ORGANIZATIONAL_UNIT_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.11");
const COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
const EMAIL_ADDRESS: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.1");

/// Parameters for building an X.509 certificate.
///
/// This struct contains the subject, public key, and optional extensions for the certificate.
///
/// # Fields
/// * `subject` - The distinguished name of the certificate subject.
/// * `subject_public_key` - The public key of the certificate subject.
/// * `usages` - A list of extended key usage options.
/// * `subject_alt_names` - DNS names or IP addresses the certificate is valid for.
/// * `is_ca` - Indicates if the certificate is a CA.
/// * `extensions` - Additional X.509 extensions.
#[derive(Clone, Debug, Builder)]
pub struct CertificationRequestInfo {
    pub subject: DistinguishedName,
    pub subject_public_key: PublicKey,
    #[builder(default)]
    pub usages: Vec<ExtendedKeyUsageOption>,
    #[builder(default)]
    pub subject_alt_names: Vec<String>,
    #[builder(default)]
    pub is_ca: bool,
    #[builder(default)]
    pub extensions: Vec<ExtensionParam>,
}

/// Distinguished name parameters for building an X.509 certificate.
///
/// Attributes are encoded in the conventional order C, ST, L, O, OU, CN, emailAddress.
/// Absent or blank attributes are left out of the encoded name entirely.
///
/// # Fields
/// * `common_name` - The common name (CN).
/// * `country` - The two-letter country code (C).
/// * `state` - The state or province (ST).
/// * `locality` - The locality or city (L).
/// * `organization` - The organization (O).
/// * `organization_unit` - The organizational unit (OU).
/// * `email` - The email address (emailAddress).
#[derive(Clone, Debug, Builder, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistinguishedName {
    pub common_name: String,
    pub country: Option<String>,
    pub state: Option<String>,
    pub locality: Option<String>,
    pub organization: Option<String>,
    pub organization_unit: Option<String>,
    pub email: Option<String>,
}

impl DistinguishedName {
    /// Converts the distinguished name to an X.509-compatible format.
    ///
    /// # Returns
    /// An `x509_cert::name::DistinguishedName` object.
    pub fn as_x509_name(&self) -> Result<x509_cert::name::DistinguishedName> {
        if self.common_name.trim().is_empty() {
            return Err(LocalCaError::InvalidInput(
                "common name must not be empty".to_string(),
            ));
        }

        let attributes = [
            (COUNTRY_NAME, self.country.as_deref()),
            (STATE_OR_PROVINCE_NAME, self.state.as_deref()),
            (LOCALITY_NAME, self.locality.as_deref()),
            (ORGANIZATION_NAME, self.organization.as_deref()),
            (ORGANIZATIONAL_UNIT_NAME, self.organization_unit.as_deref()),
            (COMMON_NAME, Some(self.common_name.as_str())),
            (EMAIL_ADDRESS, self.email.as_deref()),
        ];

        let mut rdns = Vec::new();
        for (oid, value) in attributes {
            let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
                continue;
            };
            let atv = AttributeTypeAndValue {
                oid,
                value: encode_attribute_value(oid, value)?,
            };
            rdns.push(RelativeDistinguishedName(SetOfVec::try_from(vec![atv])?));
        }
        Ok(RdnSequence(rdns))
    }

    /// Creates a `DistinguishedName` from an X.509-compatible format.
    ///
    /// # Arguments
    /// * `x509dn` - An `x509_cert::name::DistinguishedName` object.
    ///
    /// # Returns
    /// A `DistinguishedName` object.
    pub fn from_x509_name(x509dn: &x509_cert::name::DistinguishedName) -> Result<Self> {
        let mut name = DistinguishedName::default();

        for rdn in x509dn.0.iter() {
            for attr in rdn.0.iter() {
                let value = decode_attribute_value(&attr.value)?;
                match attr.oid {
                    COUNTRY_NAME => name.country = Some(value),
                    STATE_OR_PROVINCE_NAME => name.state = Some(value),
                    LOCALITY_NAME => name.locality = Some(value),
                    ORGANIZATION_NAME => name.organization = Some(value),
                    ORGANIZATIONAL_UNIT_NAME => name.organization_unit = Some(value),
                    COMMON_NAME => name.common_name = value,
                    EMAIL_ADDRESS => name.email = Some(value),
                    _ => {}
                }
            }
        }

        Ok(name)
    }
}

fn encode_attribute_value(oid: ObjectIdentifier, value: &str) -> Result<Any> {
    let any = match oid {
        COUNTRY_NAME => {
            if value.len() != 2 {
                return Err(LocalCaError::InvalidInput(format!(
                    "country must be a two-letter code, got {value:?}"
                )));
            }
            Any::encode_from(&PrintableStringRef::new(value)?)?
        }
        EMAIL_ADDRESS => Any::encode_from(&Ia5StringRef::new(value)?)?,
        _ => Any::encode_from(&Utf8StringRef::new(value)?)?,
    };
    Ok(any)
}

fn decode_attribute_value(value: &Any) -> Result<String> {
    match value.tag() {
        Tag::Utf8String | Tag::PrintableString | Tag::Ia5String => {
            std::str::from_utf8(value.value())
                .map(str::to_string)
                .map_err(|e| LocalCaError::DecodingError(e.to_string()))
        }
        tag => Err(LocalCaError::DecodingError(format!(
            "unsupported name attribute encoding {tag}"
        ))),
    }
}

/// Certificate validity period.
///
/// This struct represents the `notBefore` and `notAfter` fields in a certificate.
///
/// # Fields
/// * `not_before` - The start of the validity period.
/// * `not_after` - The end of the validity period.
#[derive(Clone, Debug)]
pub struct Validity {
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

impl Validity {
    /// Creates a validity period starting now for the given number of days.
    ///
    /// # Arguments
    /// * `days` - The number of days for the validity period.
    ///
    /// # Returns
    /// A `Validity` object.
    pub fn for_days(days: i64) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            not_before: now,
            not_after: now + Duration::days(days),
        }
    }

    /// Whether `at` falls inside the period, bounds included.
    pub fn contains(&self, at: OffsetDateTime) -> bool {
        self.not_before <= at && at <= self.not_after
    }
}

/// Represents an X.509 extension.
///
/// This struct contains the OID, criticality, and value of an extension.
///
/// # Fields
/// * `oid` - The object identifier of the extension.
/// * `critical` - Indicates if the extension is critical.
/// * `value` - The DER-encoded value of the extension.
#[derive(Clone, Debug)]
pub struct ExtensionParam {
    pub oid: ObjectIdentifier,
    pub critical: bool,
    /// DER-encoded extension value
    pub value: Vec<u8>,
}

impl ExtensionParam {
    /// Creates an `ExtensionParam` from a specific extension.
    ///
    /// # Arguments
    /// * `extension` - The extension to encode.
    /// * `critical` - Indicates if the extension is critical.
    ///
    /// # Returns
    /// An `ExtensionParam` object.
    pub fn from_extension<E: ToAndFromX509Extension>(extension: E, critical: bool) -> Result<Self> {
        Ok(Self {
            oid: E::OID,
            critical,
            value: extension.to_x509_extension_value()?,
        })
    }

    /// Decodes an `ExtensionParam` into a specific extension.
    ///
    /// # Returns
    /// A decoded extension object.
    pub fn to_extension<E: ToAndFromX509Extension>(&self) -> Result<E> {
        E::from_x509_extension_value(&self.value)
    }
}
