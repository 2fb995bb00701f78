//! Checksum utilities for cache artifacts

use sha2::{Digest, Sha256};
use std::fmt;

/// SHA256 checksum of serialized content
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Checksum(String);

impl Checksum {
    /// Compute checksum from raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    /// Compute checksum of a file's contents, `None` if it cannot be read
    pub fn of_file(path: &std::path::Path) -> Option<Self> {
        std::fs::read(path).ok().map(|bytes| Self::from_bytes(&bytes))
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First `len` hex characters, used to disambiguate file names
    pub fn short(&self, len: usize) -> &str {
        &self.0[..len.min(self.0.len())]
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_consistency() {
        let content = br#"{"name": "LoginTest"}"#;
        assert_eq!(Checksum::from_bytes(content), Checksum::from_bytes(content));
    }

    #[test]
    fn test_checksum_different_content() {
        let checksum1 = Checksum::from_bytes(b"<test name=\"A\"/>");
        let checksum2 = Checksum::from_bytes(b"<test name=\"B\"/>");
        assert_ne!(checksum1, checksum2);
    }

    #[test]
    fn test_short_prefix() {
        let checksum = Checksum::from_bytes(b"abc");
        assert_eq!(checksum.short(8).len(), 8);
        assert!(checksum.as_str().starts_with(checksum.short(8)));
        assert_eq!(checksum.short(1000), checksum.as_str());
    }

    #[test]
    fn test_of_missing_file() {
        assert!(Checksum::of_file(std::path::Path::new("/nonexistent/artifact.json")).is_none());
    }
}
