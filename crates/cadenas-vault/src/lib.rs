//! `cadenas-vault`: credential vault engine for CADENAS.
//!
//! Owns the master-key lifecycle (bootstrap, unlock, lock, rotate), the
//! `SQLite` credential table and the on-disk vault configuration.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod config_file;
pub mod db;
pub mod engine;
pub mod error;
pub mod idle;
pub mod policy;
pub mod session_lock;
pub mod settings;
pub mod store;

pub use config_file::{ConfigFile, ConfigStore, VaultConfig};
pub use engine::{VaultEngine, VaultState};
pub use error::VaultError;
pub use idle::IdleTracker;
pub use policy::{check_master_password, PolicyViolation};
pub use session_lock::SessionLock;
pub use settings::VaultSettings;
pub use store::{CredentialRecord, CredentialStore, CredentialSummary};
