//! Client identity carried in the TLS handshake
//!
//! A [`ClientIdentity`] is an opaque byte string (a device id, product key, or
//! fleet token) that the TLS engine attaches to its handshake
//! authentication-extension data. The connector never interprets the bytes;
//! it only hands them to the engine along with their length.
//!
//! Identities are routinely secrets, so `Debug` and `Display` render a
//! SHA-256 fingerprint instead of the raw bytes. Log output and spans use the
//! fingerprint exclusively.

use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::fmt;

/// Opaque client-identity byte string offered during the handshake.
///
/// An empty identity is valid and is forwarded as-is; whether the engine (or
/// the server) accepts it is engine policy.
///
/// # Examples
///
/// ```
/// use devlink_tls::ClientIdentity;
///
/// let identity = ClientIdentity::new("device-7f3a.fleet-eu");
/// assert_eq!(identity.len(), 20);
/// assert_eq!(identity.fingerprint().len(), 16);
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity {
    bytes: Bytes,
}

impl ClientIdentity {
    /// Creates an identity from any byte source (`String`, `Vec<u8>`,
    /// `&'static str`, `Bytes`, ...).
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        ClientIdentity {
            bytes: bytes.into(),
        }
    }

    /// Creates an identity by copying a borrowed byte slice.
    pub fn from_slice(bytes: &[u8]) -> Self {
        ClientIdentity {
            bytes: Bytes::copy_from_slice(bytes),
        }
    }

    /// Creates an empty identity (anonymous connection, engine permitting).
    pub fn empty() -> Self {
        ClientIdentity {
            bytes: Bytes::new(),
        }
    }

    /// Raw identity bytes, exactly as they will be handed to the engine.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Identity length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` for the empty identity.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Short SHA-256 fingerprint (16 hex chars) safe to log.
    ///
    /// Stable for a given identity, so it can correlate log lines across
    /// processes without ever exposing the identity itself.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(&self.bytes);
        let mut out = String::with_capacity(16);
        for byte in &digest[..8] {
            use std::fmt::Write;
            let _ = write!(out, "{:02x}", byte);
        }
        out
    }
}

impl fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("fingerprint", &self.fingerprint())
            .field("len", &self.len())
            .finish()
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fingerprint())
    }
}

impl From<&str> for ClientIdentity {
    fn from(s: &str) -> Self {
        ClientIdentity::from_slice(s.as_bytes())
    }
}

impl From<String> for ClientIdentity {
    fn from(s: String) -> Self {
        ClientIdentity::new(s)
    }
}

impl From<Vec<u8>> for ClientIdentity {
    fn from(v: Vec<u8>) -> Self {
        ClientIdentity::new(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable_and_short() {
        let a = ClientIdentity::new("device-0042");
        let b = ClientIdentity::from_slice(b"device-0042");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 16);
        assert!(a.fingerprint().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_different_identities_differ() {
        let a = ClientIdentity::new("device-0042");
        let b = ClientIdentity::new("device-0043");
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_ne!(a, b);
    }

    #[test]
    fn test_debug_redacts_raw_bytes() {
        let identity = ClientIdentity::new("super-secret-device-key");
        let rendered = format!("{:?}", identity);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("fingerprint"));
    }

    #[test]
    fn test_empty_identity() {
        let identity = ClientIdentity::empty();
        assert!(identity.is_empty());
        assert_eq!(identity.len(), 0);
        assert_eq!(identity.as_bytes(), b"");
        // SHA-256 of the empty string is well-defined, so even the empty
        // identity fingerprints cleanly.
        assert_eq!(identity.fingerprint(), "e3b0c44298fc1c14");
    }
}
