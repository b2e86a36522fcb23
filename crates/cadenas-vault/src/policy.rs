//! Master-password strength rules.

use thiserror::Error;

/// Minimum master-password length, in characters.
pub const MIN_MASTER_PASSWORD_CHARS: usize = 8;

/// First rule a proposed master password breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("must be at least {min} characters long")]
    TooShort {
        /// Required minimum, in characters.
        min: usize,
    },
    #[error("must contain an uppercase letter")]
    MissingUppercase,
    #[error("must contain a lowercase letter")]
    MissingLowercase,
    #[error("must contain a digit")]
    MissingDigit,
}

/// Check a proposed master password.
///
/// Length is counted in Unicode scalar values. Rules are checked in the
/// order length, uppercase, lowercase, digit; the first failure is returned.
///
/// # Errors
///
/// Returns the first [`PolicyViolation`] encountered.
pub fn check_master_password(password: &str) -> Result<(), PolicyViolation> {
    if password.chars().count() < MIN_MASTER_PASSWORD_CHARS {
        return Err(PolicyViolation::TooShort {
            min: MIN_MASTER_PASSWORD_CHARS,
        });
    }
    if !password.chars().any(char::is_uppercase) {
        return Err(PolicyViolation::MissingUppercase);
    }
    if !password.chars().any(char::is_lowercase) {
        return Err(PolicyViolation::MissingLowercase);
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(PolicyViolation::MissingDigit);
    }
    Ok(())
}
