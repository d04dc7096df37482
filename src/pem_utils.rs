use crate::error::{LocalCaError, Result};

pub const CERTIFICATE_LABEL: &str = "CERTIFICATE";
pub const CERTIFICATE_REQUEST_LABEL: &str = "CERTIFICATE REQUEST";
pub const PRIVATE_KEY_LABEL: &str = "PRIVATE KEY";

/// Convert DER‑encoded data into a PEM‑encoded string with the provided label.
pub fn der_to_pem(der: &[u8], label: &str) -> String {
    let pem = pem::Pem::new(label, der);
    pem::encode_config(&pem, pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF))
}

/// Convert a PEM‑encoded string to DER‑encoded bytes, checking the block label.
pub fn pem_to_der(pem_str: &str, expected_label: &str) -> Result<Vec<u8>> {
    let pem = pem::parse(pem_str)?;
    if pem.tag() != expected_label {
        return Err(LocalCaError::DecodingError(format!(
            "expected a PEM block labelled {expected_label:?}, found {:?}",
            pem.tag()
        )));
    }
    Ok(pem.contents().to_vec())
}
