//! ChaCha20-Poly1305 sealing of opaque payloads.

use std::fmt;

use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    ChaCha20Poly1305, Key, Nonce,
};

use crate::error::CryptoError;
use crate::key::EncryptionKey;

/// Nonce length prepended to every payload.
pub const NONCE_LEN: usize = 12;

/// Poly1305 tag length appended by the AEAD.
pub const TAG_LEN: usize = 16;

/// Encrypts and decrypts payloads under one fixed key.
#[derive(Clone)]
pub struct Cipher {
    cipher: ChaCha20Poly1305,
    development: bool,
}

impl Cipher {
    pub fn new(key: &EncryptionKey) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key.as_bytes())),
            development: key.is_development(),
        }
    }

    /// Whether this cipher runs on the development key.
    pub fn is_development(&self) -> bool {
        self.development
    }

    /// Seal `plaintext` under a fresh random nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CryptoError::Encrypt)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Open a payload produced by [`Cipher::encrypt`].
    pub fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let min = NONCE_LEN + TAG_LEN;
        if sealed.len() < min {
            return Err(CryptoError::Truncated {
                len: sealed.len(),
                min,
            });
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Decrypt)
    }

    pub fn encrypt_str(&self, plaintext: &str) -> Result<Vec<u8>, CryptoError> {
        self.encrypt(plaintext.as_bytes())
    }

    pub fn decrypt_string(&self, sealed: &[u8]) -> Result<String, CryptoError> {
        Ok(String::from_utf8(self.decrypt(sealed)?)?)
    }
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cipher")
            .field("development", &self.development)
            .finish_non_exhaustive()
    }
}
