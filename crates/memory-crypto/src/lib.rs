//! # memory-crypto
//!
//! Content-at-rest encryption for the memory engine.
//!
//! Payloads are sealed with ChaCha20-Poly1305 under a fixed 256-bit key.
//! Every call draws a fresh random nonce which is prepended to the output:
//!
//! ```text
//! | nonce (12) | ciphertext | tag (16) |
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use memory_crypto::{Cipher, EncryptionKey};
//!
//! let key = EncryptionKey::from_hex(&"11".repeat(32)).unwrap();
//! let cipher = Cipher::new(&key);
//! let sealed = cipher.encrypt(b"remember this").unwrap();
//! assert_eq!(cipher.decrypt(&sealed).unwrap(), b"remember this");
//! ```

pub mod cipher;
pub mod error;
pub mod key;

pub use cipher::{Cipher, NONCE_LEN, TAG_LEN};
pub use error::CryptoError;
pub use key::{EncryptionKey, KEY_LEN};
