//! Checksums of downloaded archives and fingerprints of build steps.

use std::path::Path;

use anyhow::{bail, Result};
use sha2::{Digest, Sha256};

/// Compute SHA256 hash of a byte slice.
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Check data against an expected hex SHA256 (case-insensitive).
pub fn verify_sha256(data: &[u8], expected: &str) -> Result<()> {
    let actual = sha256_bytes(data);
    if !actual.eq_ignore_ascii_case(expected) {
        bail!("checksum mismatch: expected {}, got {}", expected, actual);
    }
    Ok(())
}

/// A hasher for building fingerprints from multiple components.
#[derive(Default)]
pub struct Fingerprint {
    hasher: Sha256,
}

impl Fingerprint {
    /// Create a new fingerprint builder.
    pub fn new() -> Self {
        Fingerprint {
            hasher: Sha256::new(),
        }
    }

    /// Add a string component to the fingerprint.
    pub fn update_str(&mut self, s: &str) -> &mut Self {
        self.hasher.update(s.as_bytes());
        self.hasher.update(b"\0");
        self
    }

    /// Add a list of strings, length-prefixed so adjacent lists cannot alias.
    pub fn update_list<'a>(&mut self, items: impl IntoIterator<Item = &'a str>) -> &mut Self {
        let items: Vec<&str> = items.into_iter().collect();
        self.update_str(&items.len().to_string());
        for s in items {
            self.update_str(s);
        }
        self
    }

    /// Add an optional string component.
    pub fn update_opt(&mut self, opt: Option<&str>) -> &mut Self {
        match opt {
            Some(s) => {
                self.hasher.update(b"\x01");
                self.update_str(s);
            }
            None => {
                self.hasher.update(b"\x00");
            }
        }
        self
    }

    /// Add a path component.
    pub fn update_path(&mut self, path: &Path) -> &mut Self {
        self.update_str(&path.to_string_lossy())
    }

    /// Add a boolean component.
    pub fn update_bool(&mut self, b: bool) -> &mut Self {
        self.hasher.update([b as u8]);
        self
    }

    /// Finalize and return the fingerprint as a hex string.
    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }

    /// Finalize and return a short fingerprint (first 16 chars).
    pub fn finish_short(self) -> String {
        self.finish()[..16].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn test_sha256_bytes() {
        assert_eq!(sha256_bytes(b"hello"), HELLO);
    }

    #[test]
    fn test_verify_sha256() {
        assert!(verify_sha256(b"hello", HELLO).is_ok());
        assert!(verify_sha256(b"hello", &HELLO.to_uppercase()).is_ok());
        let err = verify_sha256(b"hello!", HELLO).unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn test_fingerprint_lists_do_not_alias() {
        let a = {
            let mut fp = Fingerprint::new();
            fp.update_list(["a", "b"]).update_list(["c"]);
            fp.finish()
        };
        let b = {
            let mut fp = Fingerprint::new();
            fp.update_list(["a"]).update_list(["b", "c"]);
            fp.finish()
        };
        assert_ne!(a, b);
    }
}
