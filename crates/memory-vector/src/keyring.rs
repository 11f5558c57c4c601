//! Resolve the payload cipher from settings.

use memory_crypto::{Cipher, EncryptionKey};
use memory_types::Settings;
use secrecy::ExposeSecret;
use tracing::warn;

use crate::error::VectorError;

/// Build the cipher both stores encrypt with.
///
/// Production requires an explicit key and refuses the development key.
/// Development without a key falls back to the fixed development key.
pub fn cipher_from_settings(settings: &Settings) -> Result<Cipher, VectorError> {
    let configured = settings
        .encryption_key
        .as_ref()
        .filter(|secret| !secret.expose_secret().trim().is_empty());

    let key = match configured {
        Some(secret) => EncryptionKey::from_secret(secret)
            .map_err(|e| VectorError::Config(format!("encryption_key: {}", e)))?,
        _ if settings.is_production() => {
            return Err(VectorError::Config(
                "encryption_key is required in production (set MEMORY_ENCRYPTION_KEY)".to_string(),
            ));
        }
        _ => {
            warn!("No encryption key configured, using the development key");
            EncryptionKey::development()
        }
    };

    if settings.is_production() && key.is_development() {
        return Err(VectorError::Config(
            "the development key cannot be used in production".to_string(),
        ));
    }

    Ok(Cipher::new(&key))
}
