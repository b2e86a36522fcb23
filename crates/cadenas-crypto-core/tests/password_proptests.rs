#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! Property-based tests for the password generator.

use cadenas_crypto_core::password::{
    generate_random_password, CharsetConfig, AMBIGUOUS, MAX_PASSWORD_LENGTH, MIN_PASSWORD_LENGTH,
};
use proptest::prelude::*;

proptest! {
    /// Output length always equals the requested length.
    #[test]
    fn length_is_exact(length in MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH) {
        let pw = generate_random_password(length, &CharsetConfig::default())
            .expect("generation should succeed");
        prop_assert_eq!(pw.len(), length);
        prop_assert!(pw.is_ascii());
    }

    /// Any non-empty class selection is honored.
    #[test]
    fn only_enabled_classes_appear(
        uppercase in any::<bool>(),
        lowercase in any::<bool>(),
        digits in any::<bool>(),
        symbols in any::<bool>(),
        exclude_ambiguous in any::<bool>(),
    ) {
        prop_assume!(uppercase || lowercase || digits || symbols);
        let config = CharsetConfig { uppercase, lowercase, digits, symbols, exclude_ambiguous };
        let pw = generate_random_password(32, &config).expect("generation should succeed");

        for c in pw.chars() {
            let allowed = (uppercase && c.is_ascii_uppercase())
                || (lowercase && c.is_ascii_lowercase())
                || (digits && c.is_ascii_digit())
                || (symbols && c.is_ascii_punctuation());
            prop_assert!(allowed, "unexpected {c:?} in {pw}");
            if exclude_ambiguous {
                prop_assert!(!AMBIGUOUS.contains(&(c as u8)));
            }
        }
    }
}
