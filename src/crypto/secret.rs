//! Master secret handling.

use std::fmt;

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::MASTER_SECRET_ENTROPY_LEN;

/// The passphrase that actually unlocks the backend volume.
///
/// All authorized users share one master secret; each user's envelope seals
/// their own copy of it. Instances exist only transiently in memory and are
/// zeroized on drop. `Debug` never prints the contents, and callers must go
/// through [`expose`](Self::expose) deliberately.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterSecret(String);

impl MasterSecret {
    /// Wraps an existing passphrase.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Generates a fresh random master secret with 128 bits of entropy,
    /// rendered as a 32-character hexadecimal password.
    pub fn generate() -> Self {
        let mut entropy = [0u8; MASTER_SECRET_ENTROPY_LEN];
        OsRng.fill_bytes(&mut entropy);
        let secret = Self(hex::encode(entropy));
        entropy.zeroize();
        secret
    }

    /// Returns the passphrase itself.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns the passphrase bytes, as sealed into envelopes and fed to
    /// the volume backend.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MasterSecret").field(&"[REDACTED]").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_32_hex_chars() {
        let secret = MasterSecret::generate();
        assert_eq!(secret.expose().len(), 2 * MASTER_SECRET_ENTROPY_LEN);
        assert!(secret.expose().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_is_fresh() {
        let a = MasterSecret::generate();
        let b = MasterSecret::generate();
        assert_ne!(a.expose(), b.expose());
    }

    #[test]
    fn test_expose_roundtrip() {
        let secret = MasterSecret::new("M4sterSecret");
        assert_eq!(secret.expose(), "M4sterSecret");
        assert_eq!(secret.as_bytes(), b"M4sterSecret");
    }

    #[test]
    fn test_debug_is_redacted() {
        let secret = MasterSecret::new("M4sterSecret");
        let formatted = format!("{secret:?}");
        assert!(!formatted.contains("M4sterSecret"));
        assert!(formatted.contains("REDACTED"));
    }
}
