#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! Integration tests for master-password rotation: correctness, atomicity
//! and recovery from a failure on either side of the configuration swap.

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cadenas_crypto_core::envelope;
use cadenas_crypto_core::CryptoError;
use cadenas_crypto_core::kdf::Pbkdf2Params;
use cadenas_vault::config_file::CONFIG_FILE;
use cadenas_vault::db::DB_FILE;
use cadenas_vault::{
    ConfigFile, ConfigStore, CredentialStore, VaultConfig, VaultEngine, VaultError, VaultSettings,
    VaultState,
};
use secrecy::ExposeSecret;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

const OLD: &str = "Old-Passw0rd";
const NEW: &str = "New-Passw0rd";

const TEST_PARAMS: Pbkdf2Params = Pbkdf2Params { iterations: 1_000 };

fn fast_settings() -> VaultSettings {
    VaultSettings {
        kdf_iterations: TEST_PARAMS.iterations,
        ..VaultSettings::default()
    }
}

fn open(dir: &TempDir) -> VaultEngine {
    VaultEngine::open(dir.path(), &fast_settings()).expect("open should succeed")
}

/// Bootstrap under `OLD` and add `n` credentials; returns their ids and
/// plaintexts.
fn seeded(dir: &TempDir, n: usize) -> Vec<(i64, String)> {
    let mut engine = open(dir);
    engine.bootstrap(OLD).unwrap();
    (0..n)
        .map(|i| {
            let secret = format!("secret-{i}");
            let id = engine
                .add_credential(&format!("svc-{i}"), &format!("user{i}@x.io"), &secret)
                .unwrap();
            (id, secret)
        })
        .collect()
}

fn assert_readable<C: ConfigStore>(engine: &VaultEngine<C>, expected: &[(i64, String)]) {
    for (id, secret) in expected {
        assert_eq!(
            engine.reveal_password(*id).unwrap().expose_secret(),
            secret.as_str(),
            "record {id}"
        );
    }
}

fn raw_store(dir: &TempDir) -> CredentialStore {
    CredentialStore::open(&dir.path().join(DB_FILE)).unwrap()
}

/// A [`ConfigFile`] whose `replace` can be made to fail.
struct FlakyConfig {
    inner: ConfigFile,
    fail_replace: Arc<AtomicBool>,
}

impl ConfigStore for FlakyConfig {
    fn load(&self) -> Result<Option<VaultConfig>, VaultError> {
        self.inner.load()
    }

    fn create(&self, config: &VaultConfig) -> Result<(), VaultError> {
        self.inner.create(config)
    }

    fn replace(&self, config: &VaultConfig) -> Result<(), VaultError> {
        if self.fail_replace.load(Ordering::SeqCst) {
            return Err(VaultError::Io(std::io::Error::other("disk full")));
        }
        self.inner.replace(config)
    }
}

// ---------------------------------------------------------------------------
// Correctness
// ---------------------------------------------------------------------------

#[test]
fn rotation_switches_password_and_keeps_every_record() {
    let dir = TempDir::new().unwrap();
    let records = seeded(&dir, 5);

    let mut engine = open(&dir);
    engine.rotate(OLD, NEW).expect("rotate should succeed");
    assert_eq!(engine.state(), VaultState::Unlocked);
    assert_readable(&engine, &records);
    drop(engine);

    let mut engine = open(&dir);
    assert!(matches!(engine.unlock(OLD), Err(VaultError::Authentication)));
    engine.unlock(NEW).unwrap();
    assert_readable(&engine, &records);
}

#[test]
fn rotation_rewrites_ciphertexts_but_not_metadata() {
    let dir = TempDir::new().unwrap();
    seeded(&dir, 3);
    let before = raw_store(&dir).all_records().unwrap();
    let old_cfg = fs::read(dir.path().join(CONFIG_FILE)).unwrap();

    let mut engine = open(&dir);
    engine.rotate(OLD, NEW).unwrap();
    drop(engine);

    let old_key = VaultConfig::from_bytes(&old_cfg)
        .unwrap()
        .verify(OLD, &TEST_PARAMS)
        .expect("old password should match the old config");

    let after = raw_store(&dir).all_records().unwrap();
    assert_eq!(before.len(), after.len());
    for (b, a) in before.iter().zip(&after) {
        assert_eq!((b.id, &b.service, &b.email), (a.id, &a.service, &a.email));
        assert_ne!(b.ciphertext, a.ciphertext);
        assert!(
            matches!(
                envelope::decrypt(old_key.expose(), &a.ciphertext),
                Err(CryptoError::Decryption)
            ),
            "record {} still opens under the old key",
            a.id
        );
    }
}

#[test]
fn rotation_with_zero_records_only_replaces_config() {
    let dir = TempDir::new().unwrap();
    seeded(&dir, 0);
    let before = fs::read(dir.path().join(CONFIG_FILE)).unwrap();

    let mut engine = open(&dir);
    engine.rotate(OLD, NEW).unwrap();
    drop(engine);

    let after = fs::read(dir.path().join(CONFIG_FILE)).unwrap();
    assert_ne!(before, after);
    let mut engine = open(&dir);
    engine.unlock(NEW).unwrap();
    assert_eq!(engine.credential_count().unwrap(), 0);
}

#[test]
fn rotation_from_unlocked_state() {
    let dir = TempDir::new().unwrap();
    let mut engine = open(&dir);
    engine.bootstrap(OLD).unwrap();
    let id = engine.add_credential("svc", "e@x", "pw").unwrap();
    engine.rotate(OLD, NEW).unwrap();
    assert_eq!(engine.reveal_password(id).unwrap().expose_secret(), "pw");
}

#[test]
fn rotation_requires_old_password() {
    let dir = TempDir::new().unwrap();
    let records = seeded(&dir, 2);
    let mut engine = open(&dir);

    assert!(matches!(
        engine.rotate("Wrong-Passw0rd", NEW),
        Err(VaultError::Authentication)
    ));
    engine.unlock(OLD).unwrap();
    assert_readable(&engine, &records);
}

#[test]
fn rotation_enforces_policy_on_new_password() {
    let dir = TempDir::new().unwrap();
    seeded(&dir, 1);
    let mut engine = open(&dir);
    assert!(matches!(
        engine.rotate(OLD, "weak"),
        Err(VaultError::Policy(_))
    ));
    engine.unlock(OLD).unwrap();
}

#[test]
fn rotation_before_bootstrap_is_not_initialized() {
    let dir = TempDir::new().unwrap();
    let mut engine = open(&dir);
    assert!(matches!(
        engine.rotate(OLD, NEW),
        Err(VaultError::NotInitialized)
    ));
}

// ---------------------------------------------------------------------------
// Atomicity
// ---------------------------------------------------------------------------

#[test]
fn corrupt_record_aborts_without_changes() {
    let dir = TempDir::new().unwrap();
    let records = seeded(&dir, 5);
    let bad_id = records[3].0;

    // Seal record 4 under an unrelated key.
    {
        let store = raw_store(&dir);
        let rec = store.get(bad_id).unwrap();
        let foreign = envelope::encrypt(&[0x42; 32], b"foreign").unwrap();
        store.update(bad_id, &rec.service, &rec.email, &foreign).unwrap();
    }
    let config_before = fs::read(dir.path().join(CONFIG_FILE)).unwrap();
    let rows_before = raw_store(&dir).all_records().unwrap();

    let mut engine = open(&dir);
    let err = engine.rotate(OLD, NEW).unwrap_err();
    assert!(matches!(err, VaultError::MigrationAborted { record_id } if record_id == bad_id));
    assert!(err.is_recoverable());
    drop(engine);

    assert_eq!(fs::read(dir.path().join(CONFIG_FILE)).unwrap(), config_before);
    assert_eq!(raw_store(&dir).all_records().unwrap(), rows_before);
    assert!(raw_store(&dir).pending_rotation().unwrap().is_none());

    let mut engine = open(&dir);
    engine.unlock(OLD).unwrap();
    let intact: Vec<_> = records.iter().filter(|(id, _)| *id != bad_id).cloned().collect();
    assert_readable(&engine, &intact);
}

#[test]
fn failed_config_replace_rolls_back_and_retry_succeeds() {
    let dir = TempDir::new().unwrap();
    let records = seeded(&dir, 4);
    let fail = Arc::new(AtomicBool::new(true));

    let flaky = FlakyConfig {
        inner: ConfigFile::new(dir.path()),
        fail_replace: Arc::clone(&fail),
    };
    let mut engine = VaultEngine::open_with(dir.path(), &fast_settings(), flaky).unwrap();

    let err = engine.rotate(OLD, NEW).unwrap_err();
    assert!(err.is_storage());

    // Old password still valid, nothing half-migrated, staging gone.
    engine.unlock(OLD).unwrap();
    assert_readable(&engine, &records);
    engine.lock();

    fail.store(false, Ordering::SeqCst);
    engine.rotate(OLD, NEW).expect("retry should succeed");
    assert_readable(&engine, &records);
    drop(engine);

    let mut engine = open(&dir);
    engine.unlock(NEW).unwrap();
    assert_readable(&engine, &records);
}

// ---------------------------------------------------------------------------
// Crash recovery
// ---------------------------------------------------------------------------

/// Stage a rotation to `NEW` by hand, as if the process died right after
/// staging. Returns the pending config.
fn stage_by_hand(dir: &TempDir, records: &[(i64, String)]) -> VaultConfig {
    let (pending, new_key) = VaultConfig::create(NEW, &TEST_PARAMS).unwrap();
    let staged: Vec<(i64, String)> = records
        .iter()
        .map(|(id, secret)| (*id, envelope::encrypt(new_key.expose(), secret.as_bytes()).unwrap()))
        .collect();
    raw_store(dir).stage_rotation(&pending, &staged).unwrap();
    pending
}

#[test]
fn crash_before_commit_point_keeps_old_password_and_retry_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let records = seeded(&dir, 3);
    stage_by_hand(&dir, &records);

    // Reopen discards the uncommitted staging.
    let mut engine = open(&dir);
    assert!(raw_store(&dir).pending_rotation().unwrap().is_none());
    assert!(matches!(engine.unlock(NEW), Err(VaultError::Authentication)));
    engine.unlock(OLD).unwrap();
    assert_readable(&engine, &records);
    engine.lock();

    // Retrying with the old password migrates exactly once.
    engine.rotate(OLD, NEW).unwrap();
    assert_readable(&engine, &records);
}

#[test]
fn crash_after_commit_point_rolls_forward_on_open() {
    let dir = TempDir::new().unwrap();
    let records = seeded(&dir, 3);
    let pending = stage_by_hand(&dir, &records);
    ConfigFile::new(dir.path()).replace(&pending).unwrap();

    let mut engine = open(&dir);
    assert!(raw_store(&dir).pending_rotation().unwrap().is_none());
    assert!(matches!(engine.unlock(OLD), Err(VaultError::Authentication)));
    engine.unlock(NEW).unwrap();
    assert_readable(&engine, &records);
}
