//! Random credential password generation.
//!
//! [`generate_random_password`] draws every character from `OsRng`,
//! guarantees one character from each enabled class and can leave out
//! glyphs that are easily confused when read back (`I O 0 1 l`).

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::CryptoError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Minimum allowed password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum allowed password length.
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// Default password length.
pub const DEFAULT_PASSWORD_LENGTH: usize = 16;

/// Characters dropped when [`CharsetConfig::exclude_ambiguous`] is set.
pub const AMBIGUOUS: &[u8] = b"IO01l";

const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";
const SYMBOLS: &[u8] = b"!@#$%^&*()-_=+[]{}|;:',.<>?/~";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which character classes a generated password may contain.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CharsetConfig {
    /// A-Z
    pub uppercase: bool,
    /// a-z
    pub lowercase: bool,
    /// 0-9
    pub digits: bool,
    /// ASCII punctuation.
    pub symbols: bool,
    /// Drop [`AMBIGUOUS`] from every class.
    pub exclude_ambiguous: bool,
}

impl Default for CharsetConfig {
    fn default() -> Self {
        Self {
            uppercase: true,
            lowercase: true,
            digits: true,
            symbols: true,
            exclude_ambiguous: true,
        }
    }
}

impl CharsetConfig {
    /// The enabled classes, already filtered for ambiguity.
    fn classes(&self) -> Vec<Vec<u8>> {
        [
            (self.uppercase, UPPERCASE),
            (self.lowercase, LOWERCASE),
            (self.digits, DIGITS),
            (self.symbols, SYMBOLS),
        ]
        .into_iter()
        .filter(|(enabled, _)| *enabled)
        .map(|(_, set)| {
            set.iter()
                .copied()
                .filter(|c| !(self.exclude_ambiguous && AMBIGUOUS.contains(c)))
                .collect()
        })
        .collect()
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Generate a random password of `length` characters.
///
/// One character of each enabled class is placed first, the rest are drawn
/// from the union of all classes, then the whole buffer is shuffled so the
/// mandatory characters carry no positional bias.
///
/// # Errors
///
/// Returns [`CryptoError::PasswordGeneration`] if:
/// - `length` is outside [`MIN_PASSWORD_LENGTH`]..=[`MAX_PASSWORD_LENGTH`]
/// - No class is enabled
pub fn generate_random_password(
    length: usize,
    charsets: &CharsetConfig,
) -> Result<String, CryptoError> {
    if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&length) {
        return Err(CryptoError::PasswordGeneration(format!(
            "length must be between {MIN_PASSWORD_LENGTH} and {MAX_PASSWORD_LENGTH}, got {length}"
        )));
    }

    let classes = charsets.classes();
    if classes.is_empty() {
        return Err(CryptoError::PasswordGeneration(
            "at least one charset must be enabled".to_string(),
        ));
    }

    let mut rng = rand::rngs::OsRng;
    let pool: Vec<u8> = classes.iter().flatten().copied().collect();

    let mut chars: Vec<u8> = Vec::with_capacity(length);
    for class in &classes {
        if let Some(&c) = class.choose(&mut rng) {
            chars.push(c);
        }
    }
    while chars.len() < length {
        chars.push(pool[rng.gen_range(0..pool.len())]);
    }

    chars.shuffle(&mut rng);

    String::from_utf8(chars)
        .map_err(|_| CryptoError::PasswordGeneration("generated non-ASCII output".to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
