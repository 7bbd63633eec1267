use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Checksum envelope for values persisted between runs.
///
/// The payload is stored as a JSON string next to its SHA-256 digest. On read,
/// a digest mismatch or unparseable file is reported as "no value" so the
/// caller falls back to fetching a fresh one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedCacheEntry {
    /// The cached value (JSON string)
    pub data: String,
    /// SHA-256 checksum of the data (hex encoded)
    pub checksum: String,
}

impl ValidatedCacheEntry {
    /// Wraps `data`, computing its checksum.
    pub fn new(data: String) -> Self {
        let checksum = Self::compute_checksum(&data);
        Self { data, checksum }
    }

    /// Serializes `value` and wraps it.
    pub fn seal<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::to_string(value)?))
    }

    fn compute_checksum(data: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn is_valid(&self) -> bool {
        Self::compute_checksum(&self.data) == self.checksum
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parses an envelope and its payload. `None` if either layer is invalid.
    pub fn open<T: DeserializeOwned>(serialized: &str) -> Option<T> {
        let entry: ValidatedCacheEntry = match serde_json::from_str(serialized) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Cache file is not a valid envelope: {}", e);
                return None;
            }
        };

        if !entry.is_valid() {
            tracing::warn!(
                "Cache validation failed: checksum mismatch (data length {})",
                entry.data.len()
            );
            return None;
        }

        match serde_json::from_str(&entry.data) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Cached payload has unexpected shape: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_seal_and_open() {
        let value = json!({"accessToken": "t", "expires_at": 1_900_000_000});
        let sealed = ValidatedCacheEntry::seal(&value).unwrap();
        assert!(sealed.is_valid());

        let opened: Option<Value> = ValidatedCacheEntry::open(&sealed.to_json().unwrap());
        assert_eq!(opened, Some(value));
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let sealed = ValidatedCacheEntry::seal(&json!({"accessToken": "original"})).unwrap();
        let tampered = sealed.to_json().unwrap().replace("original", "forged");

        let opened: Option<Value> = ValidatedCacheEntry::open(&tampered);
        assert_eq!(opened, None);
    }

    #[test]
    fn test_garbage_is_rejected() {
        let opened: Option<Value> = ValidatedCacheEntry::open("not json at all");
        assert_eq!(opened, None);
    }

    #[test]
    fn test_checksum_consistency() {
        let a = ValidatedCacheEntry::new("same".to_string());
        let b = ValidatedCacheEntry::new("same".to_string());
        assert_eq!(a.checksum, b.checksum);
    }
}
