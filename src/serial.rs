//! CA serial counter, kept in `root.srl` as a single line of uppercase hex.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{LocalCaError, Result};

/// Length of a freshly generated serial, in bytes.
pub const SERIAL_LEN: usize = 16;

/// Returns a random positive serial number of [`SERIAL_LEN`] bytes.
///
/// The top bit is cleared so the DER INTEGER stays positive, and the first byte is
/// never zero so the encoding stays minimal.
pub fn random_serial() -> Vec<u8> {
    let mut serial: [u8; SERIAL_LEN] = rand::random();
    serial[0] = (serial[0] & 0x7f).max(1);
    serial.to_vec()
}

/// The serial counter file of a CA.
#[derive(Debug, Clone)]
pub struct SerialFile {
    path: PathBuf,
}

impl SerialFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the serial to use for the next certificate and advances the counter.
    ///
    /// A missing file is created with a random serial first.
    pub fn next(&self) -> Result<Vec<u8>> {
        let current = if self.path.exists() {
            let text = fs::read_to_string(&self.path)
                .map_err(|e| LocalCaError::io(&self.path, e))?;
            decode_hex(text.trim())?
        } else {
            let serial = random_serial();
            debug!(path = %self.path.display(), "creating serial file");
            serial
        };

        let following = increment(&current);
        fs::write(&self.path, format!("{}\n", encode_hex(&following)))
            .map_err(|e| LocalCaError::io(&self.path, e))?;
        Ok(current)
    }
}

/// Big-endian increment keeping the value positive.
fn increment(serial: &[u8]) -> Vec<u8> {
    let mut next = serial.to_vec();
    for byte in next.iter_mut().rev() {
        let (value, overflow) = byte.overflowing_add(1);
        *byte = value;
        if !overflow {
            break;
        }
    }
    if next.iter().all(|b| *b == 0) {
        next.insert(0, 1);
    } else if next[0] & 0x80 != 0 {
        next.insert(0, 0);
    }
    next
}

pub fn encode_hex(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

fn decode_hex(text: &str) -> Result<Vec<u8>> {
    let serial = hex::decode(text)
        .map_err(|e| LocalCaError::DecodingError(format!("invalid hex serial {text:?}: {e}")))?;
    if serial.is_empty() {
        return Err(LocalCaError::DecodingError("serial file is empty".to_string()));
    }
    Ok(serial)
}
