//! Small shared helpers.

use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;

/// Stable 64-bit hash of a byte string.
///
/// `DefaultHasher::new()` is SipHash-1-3 with fixed zero keys, so the value
/// is identical across processes and runs. Used for config version hashing
/// and the route hash policy; both sides of a comparison must use this
/// function.
pub fn stable_hash64(bytes: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    hasher.write(bytes);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(stable_hash64(b"abc"), stable_hash64(b"abc"));
        assert_ne!(stable_hash64(b"abc"), stable_hash64(b"abd"));
        assert_ne!(stable_hash64(b""), stable_hash64(b"\0"));
    }
}
