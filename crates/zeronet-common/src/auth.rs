//! Service-key authentication for ZeroNet wire messages.
//!
//! Every request a station sends ends with one extra frame carrying the
//! service key of the sending process. The description frame always declares
//! it as its last tag; the payload is appended when the request is flattened
//! into wire frames.
//!
//! Receivers (the center, worker stations, the test fakes in this workspace)
//! compare the trailing frame against their own key in constant time.
//!
//! # Example
//!
//! ```
//! use zeronet_common::auth::ServiceKey;
//!
//! let key = ServiceKey::new("agebull");
//! assert!(key.matches(b"agebull"));
//! assert!(!key.matches(b"other"));
//! ```

use bytes::Bytes;
use std::fmt;

/// Service key used when no key is configured.
pub const DEFAULT_SERVICE_KEY: &str = "zeronet";

/// The shared service key of a ZeroNet deployment.
///
/// The key is an opaque byte string. It is cheap to clone (backed by
/// [`Bytes`]) because every outgoing request carries a copy of it.
#[derive(Clone, PartialEq, Eq)]
pub struct ServiceKey {
    key: Bytes,
}

impl ServiceKey {
    /// Creates a service key from a string.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: Bytes::from(key.into()),
        }
    }

    /// Returns the frame appended after the last payload frame.
    pub fn frame(&self) -> Bytes {
        self.key.clone()
    }

    /// Validates a received service-key frame.
    ///
    /// Uses constant-time comparison so the key cannot be guessed byte by byte.
    pub fn matches(&self, provided: &[u8]) -> bool {
        constant_time_eq(&self.key, provided)
    }
}

impl Default for ServiceKey {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE_KEY)
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceKey(*****)")
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "*****")
    }
}

/// Performs constant-time byte comparison.
///
/// Always walks the full input regardless of where the first difference
/// occurs.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (byte_a, byte_b) in a.iter().zip(b.iter()) {
        result |= byte_a ^ byte_b;
    }

    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_key_matches() {
        let key = ServiceKey::new("test-key");
        assert!(key.matches(b"test-key"));
        assert!(!key.matches(b"wrong-key"));
        assert!(!key.matches(b""));
    }

    #[test]
    fn test_service_key_default() {
        let key = ServiceKey::default();
        assert!(key.matches(DEFAULT_SERVICE_KEY.as_bytes()));
        assert_eq!(key.frame(), Bytes::from_static(b"zeronet"));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(constant_time_eq(b"", b""));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"short", b"longer"));
    }

    #[test]
    fn test_service_key_is_not_printed() {
        let key = ServiceKey::new("secret");
        assert_eq!(format!("{}", key), "*****");
        assert_eq!(format!("{:?}", key), "ServiceKey(*****)");
    }
}
