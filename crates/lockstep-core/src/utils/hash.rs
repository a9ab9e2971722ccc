//! Blake3 hashing utilities for fingerprints and content hashes.
//!
//! Everything that identifies a spec or a lock is a Blake3 digest over a
//! canonical JSON serialization, rendered as lowercase hex.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{LockError, LockResult};

/// A Blake3 digest rendered as 64 lowercase hex characters
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Parse a fingerprint from its hex form
    pub fn from_hex(hex_str: &str) -> LockResult<Self> {
        let bytes = hex::decode(hex_str).map_err(|e| LockError::IntegrityFailure {
            subject: "fingerprint".to_string(),
            expected: "valid hex string".to_string(),
            actual: format!("invalid hex: {}", e),
        })?;
        if bytes.len() != 32 {
            return Err(LockError::IntegrityFailure {
                subject: "fingerprint".to_string(),
                expected: "32 bytes".to_string(),
                actual: format!("{} bytes", bytes.len()),
            });
        }
        Ok(Self(hex::encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First twelve hex characters, for log lines
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = LockError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<Fingerprint> for String {
    fn from(fingerprint: Fingerprint) -> Self {
        fingerprint.0
    }
}

/// Compute Blake3 hash of data
pub fn blake3_hash(data: &[u8]) -> Fingerprint {
    Fingerprint(blake3::hash(data).to_hex().to_string())
}

/// Hash the canonical JSON serialization of a value.
///
/// Callers are responsible for handing in a value whose serialization is
/// already order-stable (sorted collections, no timestamps).
pub fn canonical_hash<T: Serialize + ?Sized>(value: &T) -> LockResult<Fingerprint> {
    let bytes = serde_json::to_vec(value).map_err(|e| LockError::Serialization {
        message: format!("canonical serialization failed: {}", e),
    })?;
    Ok(blake3_hash(&bytes))
}
