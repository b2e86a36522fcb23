//! PBKDF2-HMAC-SHA256 master-key derivation.
//!
//! This module provides:
//! - [`derive`]: derive a 256-bit master key from a password + salt
//! - [`derive_verifier`]: derive the on-disk password verifier from a master key
//! - [`verifier_matches`]: constant-time verifier comparison
//! - [`generate_salt`]: fresh 16-byte salt from the OS CSPRNG
//! - [`Pbkdf2Params`]: iteration count (serializable, lives in vault settings)
//!
//! # Key separation
//!
//! The master key never touches the disk. What the vault configuration stores
//! is an HKDF-SHA256 expansion of it under [`VERIFIER_INFO`], so the verifier
//! authenticates a password without handing out the key that encrypts the
//! credentials.

use std::num::NonZeroU32;

use rand::rngs::OsRng;
use rand::RngCore;
use ring::{hkdf, pbkdf2};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::memory::SecretBytes;

/// Output length of the KDF in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Salt length in bytes.
pub const SALT_LEN: usize = 16;

/// Verifier length in bytes.
pub const VERIFIER_LEN: usize = 32;

/// Default PBKDF2 work factor.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Lowest work factor accepted from a settings file.
pub const MIN_ITERATIONS: u32 = 100_000;

/// HKDF info label for the password verifier.
const VERIFIER_INFO: &[u8] = b"cadenas-config-verifier-v1";

static PBKDF2_ALG: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// PBKDF2 parameter set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pbkdf2Params {
    /// Number of HMAC-SHA256 iterations.
    pub iterations: u32,
}

impl Default for Pbkdf2Params {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

/// Fixed-length output type for `ring::hkdf`.
struct VerifierLen;

impl hkdf::KeyType for VerifierLen {
    fn len(&self) -> usize {
        VERIFIER_LEN
    }
}

// ---------------------------------------------------------------------------
// Core KDF
// ---------------------------------------------------------------------------

/// Derive a 256-bit master key from a password and salt.
///
/// Deterministic: the same `(password, salt, params)` always yields the same
/// key. The intermediate stack buffer is zeroized after it is moved into the
/// returned [`SecretBytes`].
///
/// Password strength is not checked here; the vault layer enforces its
/// policy before calling in.
///
/// # Errors
///
/// Returns `CryptoError::KeyDerivation` if:
/// - The salt is shorter than 16 bytes
/// - `params.iterations` is zero
pub fn derive(
    password: &[u8],
    salt: &[u8],
    params: &Pbkdf2Params,
) -> Result<SecretBytes<KEY_LEN>, CryptoError> {
    if salt.len() < SALT_LEN {
        return Err(CryptoError::KeyDerivation(format!(
            "salt too short: {} bytes (minimum {SALT_LEN})",
            salt.len()
        )));
    }

    let iterations = NonZeroU32::new(params.iterations)
        .ok_or_else(|| CryptoError::KeyDerivation("iteration count must be non-zero".into()))?;

    let mut output = [0u8; KEY_LEN];
    pbkdf2::derive(PBKDF2_ALG, iterations, salt, password, &mut output);

    let key = SecretBytes::new(output);
    output.zeroize();
    Ok(key)
}

/// Derive the password verifier stored in the vault configuration.
///
/// # Errors
///
/// Returns `CryptoError::KeyDerivation` if HKDF expansion fails.
pub fn derive_verifier(key: &SecretBytes<KEY_LEN>) -> Result<[u8; VERIFIER_LEN], CryptoError> {
    let prk = hkdf::Salt::new(hkdf::HKDF_SHA256, &[]).extract(key.expose());
    let info = [VERIFIER_INFO];
    let okm = prk
        .expand(&info, VerifierLen)
        .map_err(|_| CryptoError::KeyDerivation("HKDF expand failed".into()))?;

    let mut verifier = [0u8; VERIFIER_LEN];
    okm.fill(&mut verifier)
        .map_err(|_| CryptoError::KeyDerivation("HKDF fill failed".into()))?;
    Ok(verifier)
}

/// Compare two verifiers without short-circuiting on the first mismatch.
#[must_use]
pub fn verifier_matches(expected: &[u8; VERIFIER_LEN], actual: &[u8; VERIFIER_LEN]) -> bool {
    let mut diff = 0u8;
    for (x, y) in expected.iter().zip(actual.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Generate a fresh random salt.
///
/// # Errors
///
/// Returns `CryptoError::SecureMemory` if the CSPRNG fails.
pub fn generate_salt() -> Result<[u8; SALT_LEN], CryptoError> {
    let mut salt = [0u8; SALT_LEN];
    OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|e| CryptoError::SecureMemory(format!("CSPRNG fill failed: {e}")))?;
    Ok(salt)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
