//! Encryption error types.

use thiserror::Error;

/// Errors that can occur while sealing or opening payloads.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key material could not be parsed
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Payload is shorter than nonce + tag
    #[error("Payload truncated: {len} bytes, need at least {min}")]
    Truncated { len: usize, min: usize },

    /// Encryption failed
    #[error("Encryption failed")]
    Encrypt,

    /// Authentication failed: wrong key or tampered payload
    #[error("Decryption failed")]
    Decrypt,

    /// Decrypted bytes were not valid UTF-8
    #[error("Decrypted payload is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}
