//! `cadenas-crypto-core`: cryptographic primitives for the CADENAS vault.
//!
//! No I/O, no logging, no storage: key derivation, per-secret envelopes,
//! zeroizing containers and password generation.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod error;
pub mod memory;

pub mod envelope;
pub mod kdf;

pub mod password;

pub use envelope::{decrypt, encrypt, Envelope};
pub use error::CryptoError;
pub use kdf::{derive, derive_verifier, generate_salt, verifier_matches, Pbkdf2Params};
pub use memory::{disable_core_dumps, LockedRegion, SecretBuffer, SecretBytes};
pub use password::{generate_random_password, CharsetConfig, DEFAULT_PASSWORD_LENGTH};
