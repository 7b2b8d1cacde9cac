//! Module Ids
//!
//! Ids combine the first 16 bits of the MD5 digest of a module's source
//! with a per-compilation counter in the bits above, so two instances of the
//! same module never collide within one compilation.

use md5::{Digest, Md5};
use std::cell::Cell;

/// Prefix of module ids as written to the `id` attribute
pub const MODULE_ID_PREFIX: &str = "mod-";

/// Per-compilation id generator
#[derive(Debug, Default)]
pub struct IdGenerator {
    counter: Cell<u64>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id for content `seed`: lowercase hex, at least 7 digits
    pub fn next(&self, seed: &str) -> String {
        let digest = Md5::digest(seed.as_bytes());
        let hash = u64::from(u16::from_be_bytes([digest[0], digest[1]]));
        let count = self.counter.get() + 1;
        self.counter.set(count);
        format!("{:07x}", hash + (count << 16))
    }

    /// Next module id (`mod-<id>`)
    pub fn next_module_id(&self, seed: &str) -> String {
        format!("{MODULE_ID_PREFIX}{}", self.next(seed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        // md5("") = d41d8cd9...
        let ids = IdGenerator::new();
        assert_eq!(ids.next(""), "001d41d");
        assert_eq!(ids.next(""), "002d41d");
    }

    #[test]
    fn test_ids_are_unique_and_padded() {
        let ids = IdGenerator::new();
        let first = ids.next_module_id("<div></div>");
        let second = ids.next_module_id("<div></div>");
        assert_ne!(first, second);
        assert!(first.starts_with(MODULE_ID_PREFIX));
        assert_eq!(first.len(), MODULE_ID_PREFIX.len() + 7);
        assert!(first[MODULE_ID_PREFIX.len()..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_generators_are_independent() {
        assert_eq!(IdGenerator::new().next("x"), IdGenerator::new().next("x"));
    }
}
