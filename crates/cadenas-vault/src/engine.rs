//! Vault state machine: bootstrap, unlock, lock, rotate and the
//! session-scoped credential operations.
//!
//! ```text
//! Uninitialized --bootstrap--> Unlocked <--unlock/lock--> Locked
//!                                  \______ rotate ______/
//! ```
//!
//! # Rotation
//!
//! The configuration file decides which password is valid, so replacing it
//! is the single commit point. Re-encrypted ciphertexts are staged in the
//! database next to the configuration they belong to before that point, and
//! folded into the live rows only once the file on disk matches. The same
//! reconciliation runs on [`VaultEngine::open`]:
//!
//! - config on disk == staged config: roll forward
//! - anything else: discard the staging, the old password is still valid
//!
//! A crash at any step therefore leaves either the complete old vault or the
//! complete new one, and retrying with the old password re-runs the
//! migration from the untouched old ciphertexts.

use std::fs;
use std::path::{Path, PathBuf};

use cadenas_crypto_core::envelope::{self, Envelope};
use cadenas_crypto_core::kdf::Pbkdf2Params;
use cadenas_crypto_core::memory::{SecretBuffer, SecretBytes};
use secrecy::SecretString;
use tracing::{debug, info, warn};

use crate::config_file::{ConfigFile, ConfigStore, VaultConfig};
use crate::db::DB_FILE;
use crate::error::VaultError;
use crate::policy::check_master_password;
use crate::session_lock::SessionLock;
use crate::settings::VaultSettings;
use crate::store::{CredentialRecord, CredentialStore, CredentialSummary};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Observable engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultState {
    /// No configuration exists yet.
    Uninitialized,
    /// Configuration exists, no session key held.
    Locked,
    /// Session key held; credential operations are available.
    Unlocked,
}

/// What the engine last read from its [`ConfigStore`].
enum StoredConfig {
    Absent,
    Valid(VaultConfig),
    /// Present but malformed. Unlock and rotate report `Authentication`.
    Unreadable,
}

/// An unlocked session. Dropping it zeroizes the master key.
struct VaultSession {
    key: SecretBytes<32>,
}

/// The vault engine. Owns the directory lock, the credential store and the
/// session key for its whole lifetime.
pub struct VaultEngine<C: ConfigStore = ConfigFile> {
    vault_dir: PathBuf,
    params: Pbkdf2Params,
    config_store: C,
    store: CredentialStore,
    config: StoredConfig,
    session: Option<VaultSession>,
    _lock: SessionLock,
}

impl<C: ConfigStore> std::fmt::Debug for VaultEngine<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultEngine")
            .field("vault_dir", &self.vault_dir)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Opening
// ---------------------------------------------------------------------------

impl VaultEngine<ConfigFile> {
    /// Open the vault in `vault_dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Busy`] if another session holds the directory
    /// - [`VaultError::Storage`] / [`VaultError::Io`] on storage failures
    pub fn open(vault_dir: &Path, settings: &VaultSettings) -> Result<Self, VaultError> {
        Self::open_with(vault_dir, settings, ConfigFile::new(vault_dir))
    }
}

impl<C: ConfigStore> VaultEngine<C> {
    /// Open the vault with a caller-supplied [`ConfigStore`].
    ///
    /// Any rotation interrupted by a crash is reconciled before this returns.
    ///
    /// # Errors
    ///
    /// Same as [`VaultEngine::open`].
    pub fn open_with(
        vault_dir: &Path,
        settings: &VaultSettings,
        config_store: C,
    ) -> Result<Self, VaultError> {
        create_private_dir(vault_dir)?;
        let lock = SessionLock::acquire(vault_dir)?;
        let store = CredentialStore::open(&vault_dir.join(DB_FILE))?;

        let mut engine = Self {
            vault_dir: vault_dir.to_path_buf(),
            params: settings.kdf_params(),
            config_store,
            store,
            config: StoredConfig::Absent,
            session: None,
            _lock: lock,
        };
        engine.reconcile()?;
        engine.config = engine.load_config()?;

        info!(
            vault_dir = %engine.vault_dir.display(),
            state = ?engine.state(),
            "vault opened"
        );
        Ok(engine)
    }

    #[must_use]
    pub fn state(&self) -> VaultState {
        match (&self.config, &self.session) {
            (StoredConfig::Absent, _) => VaultState::Uninitialized,
            (_, Some(_)) => VaultState::Unlocked,
            (_, None) => VaultState::Locked,
        }
    }

    #[must_use]
    pub fn vault_dir(&self) -> &Path {
        &self.vault_dir
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Set the first master password and open a session with it.
    ///
    /// # Errors
    ///
    /// - [`VaultError::AlreadyInitialized`] unless the vault is uninitialized
    /// - [`VaultError::Policy`] if the password is too weak
    /// - [`VaultError::Io`] if the configuration cannot be written
    pub fn bootstrap(&mut self, password: &str) -> Result<(), VaultError> {
        if !matches!(self.config, StoredConfig::Absent) {
            return Err(VaultError::AlreadyInitialized);
        }
        check_master_password(password)?;

        let (config, key) = VaultConfig::create(password, &self.params)?;
        self.config_store.create(&config)?;
        self.config = StoredConfig::Valid(config);
        self.session = Some(VaultSession { key });

        info!(iterations = self.params.iterations, "vault initialized");
        Ok(())
    }

    /// Open a session.
    ///
    /// # Errors
    ///
    /// - [`VaultError::NotInitialized`] before bootstrap
    /// - [`VaultError::AlreadyUnlocked`] while a session is open
    /// - [`VaultError::Authentication`] for a wrong password or a damaged
    ///   configuration; the vault stays locked
    pub fn unlock(&mut self, password: &str) -> Result<(), VaultError> {
        match self.state() {
            VaultState::Uninitialized => return Err(VaultError::NotInitialized),
            VaultState::Unlocked => return Err(VaultError::AlreadyUnlocked),
            VaultState::Locked => {}
        }

        let key = self.verify_current(password)?;
        self.session = Some(VaultSession { key });
        info!("vault unlocked");
        Ok(())
    }

    /// Close the session and wipe the master key. Locking a vault that is
    /// not unlocked does nothing.
    pub fn lock(&mut self) {
        if self.session.take().is_some() {
            info!("vault locked");
        }
    }

    /// Replace the master password and re-encrypt every credential.
    ///
    /// Callable while locked or unlocked. On success the engine is unlocked
    /// under the new key. On any error the old password remains valid and
    /// every credential still opens under it.
    ///
    /// # Errors
    ///
    /// - [`VaultError::NotInitialized`] before bootstrap
    /// - [`VaultError::Authentication`] if `old_password` is wrong
    /// - [`VaultError::Policy`] if `new_password` is too weak
    /// - [`VaultError::MigrationAborted`] if a record does not open under the
    ///   old key; nothing is written
    /// - [`VaultError::Storage`] / [`VaultError::Io`] if staging or the
    ///   configuration swap fails
    pub fn rotate(&mut self, old_password: &str, new_password: &str) -> Result<(), VaultError> {
        if matches!(self.config, StoredConfig::Absent) {
            return Err(VaultError::NotInitialized);
        }
        let old_key = self.verify_current(old_password)?;
        check_master_password(new_password)?;

        if self.reconcile()? {
            // The leftover staging belonged to a rotation that had already
            // committed, so `old_password` can no longer be current.
            self.config = self.load_config()?;
            self.session = None;
            return Err(VaultError::Authentication);
        }

        let records = self.store.all_records()?;
        let plaintexts = decrypt_all(&records, &old_key)?;

        let (new_config, new_key) = VaultConfig::create(new_password, &self.params)?;
        let reencrypted = plaintexts
            .iter()
            .map(|(id, plain)| Ok((*id, envelope::encrypt(new_key.expose(), plain.expose())?)))
            .collect::<Result<Vec<_>, VaultError>>()?;
        drop(plaintexts);

        self.store.stage_rotation(&new_config, &reencrypted)?;
        debug!(records = reencrypted.len(), "rotation staged");

        let replaced = self.config_store.replace(&new_config);
        let committed = match self.reconcile() {
            Ok(committed) => committed,
            Err(e) => {
                self.session = None;
                self.config = self.load_config().unwrap_or(StoredConfig::Unreadable);
                return Err(e);
            }
        };

        match (committed, replaced) {
            (true, replaced) => {
                if let Err(e) = replaced {
                    warn!(error = %e, "configuration write reported an error after it landed");
                }
                self.config = StoredConfig::Valid(new_config);
                self.session = Some(VaultSession { key: new_key });
                info!(records = reencrypted.len(), "master password rotated");
                Ok(())
            }
            (false, Err(e)) => {
                warn!(error = %e, "rotation rolled back: configuration not replaced");
                Err(e)
            }
            (false, Ok(())) => Err(VaultError::Storage(
                "configuration changed underneath the rotation".into(),
            )),
        }
    }

    // -----------------------------------------------------------------------
    // Credentials
    // -----------------------------------------------------------------------

    /// Encrypt and store a new credential.
    ///
    /// # Errors
    ///
    /// [`VaultError::Locked`], [`VaultError::InvalidInput`] for empty fields,
    /// or a storage error.
    pub fn add_credential(
        &mut self,
        service: &str,
        email: &str,
        password: &str,
    ) -> Result<i64, VaultError> {
        let key = self.session_key()?;
        validate_fields(service, email, password)?;
        let ciphertext = envelope::encrypt(key.expose(), password.as_bytes())?;
        let id = self.store.add(service, email, &ciphertext)?;
        debug!(id, "credential added");
        Ok(id)
    }

    /// Decrypt one credential's password.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Locked`] without a session
    /// - [`VaultError::NotFound`] for an unknown id
    /// - [`VaultError::Authentication`] if the envelope does not open
    pub fn reveal_password(&self, id: i64) -> Result<SecretString, VaultError> {
        let plain = self.open_record(&self.store.get(id)?)?;
        Ok(plain.to_secret_string()?)
    }

    /// When the password of `id` was last sealed, in Unix seconds.
    ///
    /// # Errors
    ///
    /// Same as [`reveal_password`](Self::reveal_password).
    pub fn password_changed_at(&self, id: i64) -> Result<u64, VaultError> {
        let record = self.store.get(id)?;
        // Authenticate before trusting the header.
        self.open_record(&record)?;
        let sealed = Envelope::decode(&record.ciphertext).map_err(|_| VaultError::Authentication)?;
        Ok(sealed.timestamp())
    }

    /// Replace service, email and password of an existing credential.
    ///
    /// # Errors
    ///
    /// [`VaultError::Locked`], [`VaultError::InvalidInput`],
    /// [`VaultError::NotFound`] or a storage error.
    pub fn update_credential(
        &mut self,
        id: i64,
        service: &str,
        email: &str,
        password: &str,
    ) -> Result<(), VaultError> {
        let key = self.session_key()?;
        validate_fields(service, email, password)?;
        let ciphertext = envelope::encrypt(key.expose(), password.as_bytes())?;
        self.store.update(id, service, email, &ciphertext)?;
        debug!(id, "credential updated");
        Ok(())
    }

    /// # Errors
    ///
    /// [`VaultError::Locked`], [`VaultError::NotFound`] or a storage error.
    pub fn delete_credential(&mut self, id: i64) -> Result<(), VaultError> {
        self.session_key()?;
        self.store.delete(id)?;
        debug!(id, "credential deleted");
        Ok(())
    }

    /// # Errors
    ///
    /// [`VaultError::Locked`] or a storage error.
    pub fn list_credentials(&self) -> Result<Vec<CredentialSummary>, VaultError> {
        self.session_key()?;
        self.store.list()
    }

    /// Case-insensitive search on service and email.
    ///
    /// # Errors
    ///
    /// [`VaultError::Locked`] or a storage error.
    pub fn filter_credentials(&self, term: &str) -> Result<Vec<CredentialSummary>, VaultError> {
        self.session_key()?;
        self.store.filter(term)
    }

    /// Raw stored record, ciphertext included.
    ///
    /// # Errors
    ///
    /// [`VaultError::Locked`], [`VaultError::NotFound`] or a storage error.
    pub fn credential(&self, id: i64) -> Result<CredentialRecord, VaultError> {
        self.session_key()?;
        self.store.get(id)
    }

    /// # Errors
    ///
    /// [`VaultError::Locked`] or a storage error.
    pub fn credential_count(&self) -> Result<usize, VaultError> {
        self.session_key()?;
        self.store.count()
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn session_key(&self) -> Result<&SecretBytes<32>, VaultError> {
        self.session
            .as_ref()
            .map(|s| &s.key)
            .ok_or(VaultError::Locked)
    }

    fn open_record(&self, record: &CredentialRecord) -> Result<SecretBuffer, VaultError> {
        let key = self.session_key()?;
        envelope::decrypt(key.expose(), &record.ciphertext).map_err(|_| {
            warn!(id = record.id, "credential failed authentication");
            VaultError::Authentication
        })
    }

    fn verify_current(&self, password: &str) -> Result<SecretBytes<32>, VaultError> {
        let result = match &self.config {
            StoredConfig::Valid(config) => config.verify(password, &self.params),
            StoredConfig::Unreadable => Err(VaultError::Authentication),
            StoredConfig::Absent => Err(VaultError::NotInitialized),
        };
        if matches!(result, Err(VaultError::Authentication)) {
            warn!("master password rejected");
        }
        result
    }

    fn load_config(&self) -> Result<StoredConfig, VaultError> {
        match self.config_store.load() {
            Ok(Some(config)) => Ok(StoredConfig::Valid(config)),
            Ok(None) => Ok(StoredConfig::Absent),
            Err(VaultError::Authentication) => {
                warn!("vault configuration is malformed");
                Ok(StoredConfig::Unreadable)
            }
            Err(e) => Err(e),
        }
    }

    /// Settle any staged rotation against the configuration on disk.
    /// Returns `true` if staging was rolled forward.
    fn reconcile(&mut self) -> Result<bool, VaultError> {
        let Some(pending) = self.store.pending_rotation()? else {
            return Ok(false);
        };
        let on_disk = match self.config_store.load() {
            Ok(config) => config,
            Err(VaultError::Authentication) => None,
            Err(e) => return Err(e),
        };

        if on_disk.as_ref() == Some(&pending) {
            let records = self.store.apply_staged_rotation()?;
            info!(records, "rotation committed");
            Ok(true)
        } else {
            self.store.discard_staged_rotation()?;
            warn!("discarded uncommitted rotation");
            Ok(false)
        }
    }
}

// ---------------------------------------------------------------------------
// Free helpers
// ---------------------------------------------------------------------------

/// Open every record under `key`, stopping at the first failure.
fn decrypt_all(
    records: &[CredentialRecord],
    key: &SecretBytes<32>,
) -> Result<Vec<(i64, SecretBuffer)>, VaultError> {
    let mut out = Vec::with_capacity(records.len());
    for record in records {
        let Ok(plain) = envelope::decrypt(key.expose(), &record.ciphertext) else {
            warn!(record_id = record.id, "rotation aborted: record does not open");
            return Err(VaultError::MigrationAborted {
                record_id: record.id,
            });
        };
        out.push((record.id, plain));
    }
    Ok(out)
}

fn validate_fields(service: &str, email: &str, password: &str) -> Result<(), VaultError> {
    for (name, value) in [("service", service), ("email", email), ("password", password)] {
        if value.trim().is_empty() {
            return Err(VaultError::InvalidInput(format!("{name} must not be empty")));
        }
    }
    Ok(())
}

fn create_private_dir(dir: &Path) -> Result<(), VaultError> {
    if dir.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
