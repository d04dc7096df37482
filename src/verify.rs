//! Certificate chain checks.
//!
//! Only the single-level chain this crate issues is handled: a leaf signed directly
//! by a self-signed root.

use der::Encode;
use time::OffsetDateTime;

use crate::cert::extensions::{BasicConstraints, KeyUsage, KeyUsages};
use crate::cert::{Certificate, SignatureAlgorithm};
use crate::error::{LocalCaError, Result};
use crate::key::PublicKey;

/// Verifies that `cert` is signed by the key it carries and names itself as issuer.
pub fn verify_self_signed(cert: &Certificate) -> Result<()> {
    let tbs = &cert.inner.tbs_certificate;
    if tbs.issuer != tbs.subject {
        return Err(LocalCaError::VerificationError(
            "issuer and subject differ on a self-signed certificate".to_string(),
        ));
    }
    verify_signature(cert, &cert.public_key()?)
}

/// Verifies that `leaf` was issued by `ca` and is valid at `at`.
///
/// Checks the issuer name, the CA's basic constraints and key usage, the signature
/// over the to-be-signed body, and both validity windows.
pub fn verify_issued_by(leaf: &Certificate, ca: &Certificate, at: OffsetDateTime) -> Result<()> {
    if leaf.inner.tbs_certificate.issuer != ca.inner.tbs_certificate.subject {
        return Err(LocalCaError::VerificationError(format!(
            "issuer {} does not match CA subject {}",
            leaf.inner.tbs_certificate.issuer, ca.inner.tbs_certificate.subject
        )));
    }

    let is_ca = ca
        .extension::<BasicConstraints>()?
        .is_some_and(|bc| bc.is_ca);
    if !is_ca {
        return Err(LocalCaError::VerificationError(
            "issuing certificate is not a CA".to_string(),
        ));
    }

    if let Some(usage) = ca.extension::<KeyUsage>()? {
        if !usage.0.contains(KeyUsages::KeyCertSign) {
            return Err(LocalCaError::VerificationError(
                "CA key usage does not allow certificate signing".to_string(),
            ));
        }
    }

    verify_signature(leaf, &ca.public_key()?)?;

    for (label, cert) in [("certificate", leaf), ("CA certificate", ca)] {
        let validity = cert.validity();
        if !validity.contains(at) {
            return Err(LocalCaError::VerificationError(format!(
                "{label} is not valid at {at} (valid {} to {})",
                validity.not_before, validity.not_after
            )));
        }
    }

    Ok(())
}

fn verify_signature(cert: &Certificate, issuer_key: &PublicKey) -> Result<()> {
    if cert.inner.signature_algorithm != cert.inner.tbs_certificate.signature {
        return Err(LocalCaError::VerificationError(
            "outer and inner signature algorithms differ".to_string(),
        ));
    }
    let algorithm = SignatureAlgorithm::from_algorithm_identifier(&cert.inner.signature_algorithm)?;
    let signature = cert.inner.signature.as_bytes().ok_or_else(|| {
        LocalCaError::VerificationError("signature has unused bits".to_string())
    })?;
    let tbs_der = cert.inner.tbs_certificate.to_der()?;
    issuer_key
        .verify(&algorithm, &tbs_der, signature)
        .map_err(|e| LocalCaError::VerificationError(format!("bad signature: {e}")))
}
