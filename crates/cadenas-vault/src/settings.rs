//! Vault settings, persisted as `settings.json` in the vault directory.
//!
//! Every field has a default, so a missing file or a partial one is fine.
//! Values are range-checked on [`VaultSettings::load`]; settings built in
//! code are taken as given.

use std::fs;
use std::path::Path;
use std::time::Duration;

use cadenas_crypto_core::kdf::{Pbkdf2Params, DEFAULT_ITERATIONS, MIN_ITERATIONS};
use cadenas_crypto_core::password::{
    DEFAULT_PASSWORD_LENGTH, MAX_PASSWORD_LENGTH, MIN_PASSWORD_LENGTH,
};
use serde::{Deserialize, Serialize};

use crate::config_file::write_atomic;
use crate::error::VaultError;
use crate::idle::DEFAULT_IDLE_TIMEOUT;

/// Settings file name inside the vault directory.
pub const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultSettings {
    /// PBKDF2 iterations for the master key.
    pub kdf_iterations: u32,
    /// Inactivity window before an interactive session locks itself.
    pub auto_lock_secs: u64,
    /// Length of generated credential passwords.
    pub generator_length: usize,
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            kdf_iterations: DEFAULT_ITERATIONS,
            auto_lock_secs: DEFAULT_IDLE_TIMEOUT.as_secs(),
            generator_length: DEFAULT_PASSWORD_LENGTH,
        }
    }
}

impl VaultSettings {
    /// Load `<vault_dir>/settings.json`, falling back to defaults when the
    /// file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Settings`] if the file is unreadable, is not
    /// valid JSON, or holds an out-of-range value.
    pub fn load(vault_dir: &Path) -> Result<Self, VaultError> {
        let path = vault_dir.join(SETTINGS_FILE);
        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(VaultError::Settings(format!(
                    "cannot read {}: {e}",
                    path.display()
                )))
            }
        };
        let settings: Self = serde_json::from_str(&contents)
            .map_err(|e| VaultError::Settings(format!("invalid {SETTINGS_FILE}: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Persist to `<vault_dir>/settings.json` atomically, owner-only on Unix.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Settings`] for out-of-range values, or
    /// [`VaultError::Io`] if the write fails.
    pub fn save(&self, vault_dir: &Path) -> Result<(), VaultError> {
        self.validate()?;
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| VaultError::Settings(format!("cannot serialize settings: {e}")))?;
        write_atomic(vault_dir, SETTINGS_FILE, json.as_bytes())?;
        Ok(())
    }

    /// Range-check every field.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Settings`] naming the first offending field.
    pub fn validate(&self) -> Result<(), VaultError> {
        if self.kdf_iterations < MIN_ITERATIONS {
            return Err(VaultError::Settings(format!(
                "kdf_iterations must be at least {MIN_ITERATIONS}, got {}",
                self.kdf_iterations
            )));
        }
        if self.auto_lock_secs == 0 {
            return Err(VaultError::Settings(
                "auto_lock_secs must be greater than zero".into(),
            ));
        }
        if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&self.generator_length) {
            return Err(VaultError::Settings(format!(
                "generator_length must be between {MIN_PASSWORD_LENGTH} and \
                 {MAX_PASSWORD_LENGTH}, got {}",
                self.generator_length
            )));
        }
        Ok(())
    }

    #[must_use]
    pub const fn kdf_params(&self) -> Pbkdf2Params {
        Pbkdf2Params {
            iterations: self.kdf_iterations,
        }
    }

    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.auto_lock_secs)
    }
}

// ── Tests ──────────────────────────────────────────────────────────
