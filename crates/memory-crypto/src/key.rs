//! Encryption key handling.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// Key length in bytes.
pub const KEY_LEN: usize = 32;

/// Key used on development machines when none is configured.
/// Never accepted in production.
const DEVELOPMENT_KEY: [u8; KEY_LEN] = *b"agent-memory-development-key-v1!";

/// 256-bit symmetric key. Wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_LEN],
}

impl EncryptionKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(hex_key: &str) -> Result<Self, CryptoError> {
        let mut decoded = hex::decode(hex_key.trim())
            .map_err(|e| CryptoError::InvalidKey(format!("not hex: {}", e)))?;
        if decoded.len() != KEY_LEN {
            let len = decoded.len();
            decoded.zeroize();
            return Err(CryptoError::InvalidKey(format!(
                "expected {} bytes, got {}",
                KEY_LEN, len
            )));
        }
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self { bytes })
    }

    /// Parse a hex key held in a secret string.
    pub fn from_secret(secret: &SecretString) -> Result<Self, CryptoError> {
        Self::from_hex(secret.expose_secret())
    }

    /// The fixed development key.
    pub fn development() -> Self {
        Self {
            bytes: DEVELOPMENT_KEY,
        }
    }

    pub fn is_development(&self) -> bool {
        self.bytes == DEVELOPMENT_KEY
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey([REDACTED])")
    }
}
