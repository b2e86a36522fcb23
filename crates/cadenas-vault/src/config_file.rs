//! Vault configuration: the salt and password verifier.
//!
//! `vault.cfg` is exactly 48 bytes, `salt (16) || verifier (32)`. It is the
//! only thing that decides which master password is valid, so replacing it
//! is the commit point of a master-password rotation.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use cadenas_crypto_core::kdf::{self, Pbkdf2Params, SALT_LEN, VERIFIER_LEN};
use cadenas_crypto_core::memory::SecretBytes;

use crate::error::VaultError;

/// Configuration file name inside the vault directory.
pub const CONFIG_FILE: &str = "vault.cfg";

/// On-disk size of a configuration.
pub const CONFIG_LEN: usize = SALT_LEN + VERIFIER_LEN;

// ---------------------------------------------------------------------------
// VaultConfig
// ---------------------------------------------------------------------------

/// Salt plus the verifier derived from the master key.
#[derive(Clone, PartialEq, Eq)]
pub struct VaultConfig {
    salt: [u8; SALT_LEN],
    verifier: [u8; VERIFIER_LEN],
}

impl fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VaultConfig(***)")
    }
}

impl VaultConfig {
    /// Build a fresh configuration for `password` under a new random salt.
    ///
    /// Returns the derived master key alongside so callers do not pay for a
    /// second derivation.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Crypto`] if the CSPRNG or KDF fails.
    pub fn create(
        password: &str,
        params: &Pbkdf2Params,
    ) -> Result<(Self, SecretBytes<32>), VaultError> {
        let salt = kdf::generate_salt()?;
        let key = kdf::derive(password.as_bytes(), &salt, params)?;
        let verifier = kdf::derive_verifier(&key)?;
        Ok((Self { salt, verifier }, key))
    }

    /// Derive the key for `password` and check it against the verifier.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Authentication`] if the password does not match.
    /// - [`VaultError::Crypto`] if the KDF itself fails.
    pub fn verify(
        &self,
        password: &str,
        params: &Pbkdf2Params,
    ) -> Result<SecretBytes<32>, VaultError> {
        let key = kdf::derive(password.as_bytes(), &self.salt, params)?;
        let candidate = kdf::derive_verifier(&key)?;
        if kdf::verifier_matches(&self.verifier, &candidate) {
            Ok(key)
        } else {
            Err(VaultError::Authentication)
        }
    }

    /// Reassemble a configuration from stored parts.
    #[must_use]
    pub const fn from_parts(salt: [u8; SALT_LEN], verifier: [u8; VERIFIER_LEN]) -> Self {
        Self { salt, verifier }
    }

    #[must_use]
    pub const fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    #[must_use]
    pub const fn verifier(&self) -> &[u8; VERIFIER_LEN] {
        &self.verifier
    }

    /// Serialize to the 48-byte file format.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; CONFIG_LEN] {
        let mut out = [0u8; CONFIG_LEN];
        out[..SALT_LEN].copy_from_slice(&self.salt);
        out[SALT_LEN..].copy_from_slice(&self.verifier);
        out
    }

    /// Parse the file format.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Authentication`] unless `bytes` is exactly
    /// [`CONFIG_LEN`] long. A damaged file is reported the same way as a
    /// wrong password.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VaultError> {
        if bytes.len() != CONFIG_LEN {
            return Err(VaultError::Authentication);
        }
        let mut salt = [0u8; SALT_LEN];
        let mut verifier = [0u8; VERIFIER_LEN];
        salt.copy_from_slice(&bytes[..SALT_LEN]);
        verifier.copy_from_slice(&bytes[SALT_LEN..]);
        Ok(Self { salt, verifier })
    }
}

// ---------------------------------------------------------------------------
// ConfigStore
// ---------------------------------------------------------------------------

/// Durable home of the [`VaultConfig`].
pub trait ConfigStore {
    /// Read the current configuration, `None` if none was ever written.
    ///
    /// # Errors
    ///
    /// [`VaultError::Authentication`] if the stored bytes are malformed,
    /// [`VaultError::Io`] if they cannot be read.
    fn load(&self) -> Result<Option<VaultConfig>, VaultError>;

    /// Persist the first configuration.
    ///
    /// # Errors
    ///
    /// [`VaultError::AlreadyInitialized`] if one exists, or an I/O error.
    fn create(&self, config: &VaultConfig) -> Result<(), VaultError>;

    /// Atomically swap in a new configuration. Readers see either the old
    /// bytes or the new ones, never a mix.
    ///
    /// # Errors
    ///
    /// An I/O error; the previous configuration is then still in place.
    fn replace(&self, config: &VaultConfig) -> Result<(), VaultError>;
}

/// [`ConfigStore`] backed by `<vault_dir>/vault.cfg`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    dir: PathBuf,
}

impl ConfigFile {
    #[must_use]
    pub fn new(vault_dir: &Path) -> Self {
        Self {
            dir: vault_dir.to_path_buf(),
        }
    }

    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }
}

impl ConfigStore for ConfigFile {
    fn load(&self) -> Result<Option<VaultConfig>, VaultError> {
        match fs::read(self.path()) {
            Ok(bytes) => VaultConfig::from_bytes(&bytes).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(VaultError::Io(e)),
        }
    }

    fn create(&self, config: &VaultConfig) -> Result<(), VaultError> {
        if self.path().exists() {
            return Err(VaultError::AlreadyInitialized);
        }
        write_atomic(&self.dir, CONFIG_FILE, &config.to_bytes())?;
        Ok(())
    }

    fn replace(&self, config: &VaultConfig) -> Result<(), VaultError> {
        write_atomic(&self.dir, CONFIG_FILE, &config.to_bytes())?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Atomic write
// ---------------------------------------------------------------------------

/// Replace `<dir>/<name>` with `contents` so that a crash leaves either the
/// old file or the new one.
///
/// Writes `.<name>.tmp`, flushes it to disk, restricts it to the owner on
/// Unix, renames it over the target and finally syncs the directory entry.
pub(crate) fn write_atomic(dir: &Path, name: &str, contents: &[u8]) -> std::io::Result<()> {
    let path = dir.join(name);
    let tmp = dir.join(format!(".{name}.tmp"));

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(&tmp)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);

    // An existing tmp file keeps its old mode; tighten it regardless.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
    }

    fs::rename(&tmp, &path)?;

    #[cfg(unix)]
    fs::File::open(dir)?.sync_all()?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
