//! Vault error types for `cadenas-vault`.

use cadenas_crypto_core::CryptoError;
use thiserror::Error;

use crate::policy::PolicyViolation;

/// Errors produced by vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Wrong master password, a malformed configuration, or an envelope that
    /// failed to open under the session key.
    #[error("authentication failed")]
    Authentication,

    /// Proposed master password violates the strength policy.
    #[error("password policy violation: {0}")]
    Policy(#[from] PolicyViolation),

    /// No credential with this id.
    #[error("credential not found: {0}")]
    NotFound(i64),

    /// Rotation stopped before writing anything because a record could not
    /// be decrypted under the old key.
    #[error("rotation aborted: credential {record_id} could not be decrypted")]
    MigrationAborted {
        /// Id of the first record that failed.
        record_id: i64,
    },

    /// Database error.
    #[error("storage error: {0}")]
    Storage(String),

    /// I/O error from the filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation requires an unlocked vault.
    #[error("vault is locked")]
    Locked,

    /// No master password has been set yet.
    #[error("vault is not initialized")]
    NotInitialized,

    /// `bootstrap` on a vault that already has a configuration.
    #[error("vault is already initialized")]
    AlreadyInitialized,

    /// `unlock` while a session is open.
    #[error("vault is already unlocked")]
    AlreadyUnlocked,

    /// Empty service, email or password.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Another session holds the vault directory.
    #[error("vault is busy: {0}")]
    Busy(String),

    /// Invalid or unreadable settings file.
    #[error("settings error: {0}")]
    Settings(String),

    /// Cryptographic fault unrelated to authentication (CSPRNG, key setup).
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl VaultError {
    /// `true` for the storage/I-O failure kind.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Io(_))
    }

    /// `true` if the caller can simply retry with different input.
    ///
    /// Everything except the storage kind, settings and crypto faults leaves
    /// the vault exactly as it was. An aborted rotation commits nothing, so
    /// the old password stays valid.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Authentication
                | Self::Policy(_)
                | Self::NotFound(_)
                | Self::MigrationAborted { .. }
                | Self::Locked
                | Self::NotInitialized
                | Self::AlreadyInitialized
                | Self::AlreadyUnlocked
                | Self::InvalidInput(_)
                | Self::Busy(_)
        )
    }
}

impl From<rusqlite::Error> for VaultError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
