use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Filesystem-safe cache key: BLAKE3 hex digest of an image's logical
/// identity (normally its source URL).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn for_identity(identity: &str) -> Self {
        Self(blake3::hash(identity.as_bytes()).to_hex().to_string())
    }

    /// Rebuild a key from a stored file name. Only 64-char lowercase hex
    /// names are accepted.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let valid = hex.len() == 64
            && hex
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        valid.then(|| Self(hex.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An image blob as held by the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedImage {
    pub key: CacheKey,
    pub bytes: Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_stable_and_path_safe() {
        let url = "https://cdn.example.com/images/a b/../dosa.jpg?w=200";
        let a = CacheKey::for_identity(url);
        let b = CacheKey::for_identity(url);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, CacheKey::for_identity("https://cdn.example.com/other.jpg"));
    }

    #[test]
    fn from_hex_round_trips_file_names() {
        let key = CacheKey::for_identity("x");
        assert_eq!(CacheKey::from_hex(key.as_str()), Some(key));
        assert_eq!(CacheKey::from_hex("../etc/passwd"), None);
        assert_eq!(CacheKey::from_hex(".tmp"), None);
    }
}
