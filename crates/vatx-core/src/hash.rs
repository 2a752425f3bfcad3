//! Content-addressed digests for duplicate and tamper detection.
//!
//! Digests are plain SHA-256 over the exact bytes. They identify content;
//! they are not signatures.

use std::fmt;

use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

/// SHA-256 digest of a document's bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hash a byte buffer.
    pub fn of(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-character hex digest.
    pub fn from_hex(s: &str) -> Option<Self> {
        let mut out = [0u8; 32];
        hex::decode_to_slice(s.trim(), &mut out).ok()?;
        Some(Self(out))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..12])
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Stateless hasher used by the pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegrityHasher;

impl IntegrityHasher {
    pub fn new() -> Self {
        Self
    }

    /// Digest of `bytes`.
    pub fn hash(&self, bytes: &[u8]) -> ContentHash {
        ContentHash::of(bytes)
    }

    /// Check that `bytes` still hash to `expected`.
    pub fn verify(&self, bytes: &[u8], expected: &ContentHash) -> bool {
        self.hash(bytes) == *expected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_hash_deterministic() {
        let hasher = IntegrityHasher::new();
        let data = b"Order ID,Item Tax Amt.\n1001,23.00\n";

        assert_eq!(hasher.hash(data), hasher.hash(data));
        assert!(hasher.verify(data, &hasher.hash(data)));
    }

    #[test]
    fn test_single_bit_flip_changes_digest() {
        let hasher = IntegrityHasher::new();
        let original = b"VAT on sales: 1,230.00".to_vec();
        let digest = hasher.hash(&original);

        for byte in 0..original.len() {
            for bit in 0..8 {
                let mut flipped = original.clone();
                flipped[byte] ^= 1 << bit;
                assert_ne!(hasher.hash(&flipped), digest, "byte {} bit {}", byte, bit);
                assert!(!hasher.verify(&flipped, &digest));
            }
        }
    }

    #[test]
    fn test_known_digest_and_hex_round_trip() {
        let digest = ContentHash::of(b"");
        assert_eq!(
            digest.to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(ContentHash::from_hex(&digest.to_hex()), Some(digest));
        assert_eq!(ContentHash::from_hex("not-hex"), None);
        assert_eq!(
            serde_json::to_string(&digest).unwrap(),
            format!("\"{}\"", digest.to_hex())
        );
    }
}
