use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};

/// Validates cached data integrity using SHA-256 checksums
///
/// This module provides protection against cache poisoning by:
/// 1. Generating a checksum when data is cached
/// 2. Validating the checksum when data is retrieved
/// 3. Rejecting corrupted or tampered data
///
/// # Wire format
///
/// `[32-byte SHA-256 of payload][payload]`, where the payload is the JSON
/// serialization of the cached value.
const CHECKSUM_LEN: usize = 32;

/// Wrapper for cached data with integrity validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCacheEntry {
    /// The actual cached data (serialized value)
    pub data: Vec<u8>,
    /// SHA-256 checksum of the data
    pub checksum: [u8; CHECKSUM_LEN],
}

impl ValidatedCacheEntry {
    /// Creates a new validated cache entry with computed checksum
    pub fn new(data: Vec<u8>) -> Self {
        let checksum = Self::compute_checksum(&data);
        Self { data, checksum }
    }

    /// Serializes a typed value and wraps it in a validated entry.
    pub fn from_value<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::to_vec(value)?))
    }

    fn compute_checksum(data: &[u8]) -> [u8; CHECKSUM_LEN] {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hasher.finalize().into()
    }

    /// Validates the integrity of the cached data
    ///
    /// Returns true if the checksum matches, false if tampered
    pub fn is_valid(&self) -> bool {
        Self::compute_checksum(&self.data) == self.checksum
    }

    /// Encodes the entry for storage in the cache backend.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(CHECKSUM_LEN + self.data.len());
        bytes.extend_from_slice(&self.checksum);
        bytes.extend_from_slice(&self.data);
        bytes
    }

    /// Decodes and validates stored bytes.
    ///
    /// Returns Some(payload) if valid, None if truncated or corrupted.
    pub fn decode_and_validate(bytes: &[u8]) -> Option<Vec<u8>> {
        if bytes.len() < CHECKSUM_LEN {
            tracing::warn!(
                "Cache validation failed: entry shorter than checksum ({} bytes)",
                bytes.len()
            );
            return None;
        }
        let (checksum, data) = bytes.split_at(CHECKSUM_LEN);
        let entry = ValidatedCacheEntry {
            data: data.to_vec(),
            checksum: checksum.try_into().ok()?,
        };

        if entry.is_valid() {
            Some(entry.data)
        } else {
            // Checksum mismatch - cache poisoned
            tracing::warn!(
                "Cache validation failed: checksum mismatch. Expected: {}, Data length: {}",
                hex::encode(entry.checksum),
                entry.data.len()
            );
            None
        }
    }

    /// Decodes, validates and deserializes stored bytes into a typed value.
    pub fn decode_value<T: DeserializeOwned>(bytes: &[u8]) -> Option<T> {
        let payload = Self::decode_and_validate(bytes)?;
        match serde_json::from_slice(&payload) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Cached payload failed to deserialize: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Nested {
        label: Option<String>,
        values: Vec<Option<f64>>,
    }

    #[test]
    fn test_cache_entry_validation() {
        let data = br#"{"label": "B"}"#.to_vec();
        let entry = ValidatedCacheEntry::new(data.clone());

        assert!(entry.is_valid());
        assert_eq!(entry.data, data);
    }

    #[test]
    fn test_typed_value_survives_encoding() {
        let value = Nested {
            label: None,
            values: vec![Some(1.5), None, Some(-3.0)],
        };
        let bytes = ValidatedCacheEntry::from_value(&value).unwrap().to_bytes();
        let back: Nested = ValidatedCacheEntry::decode_value(&bytes).unwrap();

        assert_eq!(back, value);
    }

    #[test]
    fn test_tampered_data_rejected() {
        let entry = ValidatedCacheEntry::new(br#"{"original": "data"}"#.to_vec());
        let mut bytes = entry.to_bytes();
        let last = bytes.len() - 2;
        bytes[last] = b'X';

        assert_eq!(ValidatedCacheEntry::decode_and_validate(&bytes), None);
    }

    #[test]
    fn test_truncated_entry_rejected() {
        assert_eq!(ValidatedCacheEntry::decode_and_validate(&[1, 2, 3]), None);
    }

    #[test]
    fn test_checksum_consistency() {
        let entry1 = ValidatedCacheEntry::new(b"test data".to_vec());
        let entry2 = ValidatedCacheEntry::new(b"test data".to_vec());

        assert_eq!(entry1.checksum, entry2.checksum);
    }
}
