//! Cryptographic error types for `cadenas-crypto-core`.

use thiserror::Error;

/// Errors produced by cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key derivation failed (short salt, zero iteration count).
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Envelope encryption failure (invalid key, CSPRNG or AEAD failure).
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Envelope could not be opened.
    ///
    /// Carries no detail on purpose: a malformed encoding, an unknown format
    /// version, a tampered payload and a wrong key all look the same.
    #[error("decryption failed: authentication tag mismatch")]
    Decryption,

    /// Invalid key material (wrong length, corrupted bytes).
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// Secure memory allocation failure (mlock, CSPRNG fill).
    #[error("secure memory error: {0}")]
    SecureMemory(String),

    /// Password generation failure (invalid parameters).
    #[error("password generation error: {0}")]
    PasswordGeneration(String),
}
