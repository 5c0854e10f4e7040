//! Content fingerprints used to decide whether a unit must be recompiled.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// SHA-256 of a serializable value.
///
/// The value is serialized to JSON before hashing, so equal sources always
/// produce equal fingerprints. Returns a 64-character lowercase hex string.
///
/// # Errors
/// Returns an error if the value cannot be serialized to JSON.
pub fn fingerprint<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(value)?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Fingerprint of several fingerprints, order-sensitive.
pub fn combine<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}
