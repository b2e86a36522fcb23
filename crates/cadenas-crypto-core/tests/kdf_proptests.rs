#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! Property-based tests for PBKDF2 key derivation.

use cadenas_crypto_core::kdf::{derive, derive_verifier, verifier_matches, Pbkdf2Params};
use proptest::prelude::*;

/// Small work factor for fast property tests.
const PROP_PARAMS: Pbkdf2Params = Pbkdf2Params { iterations: 10 };

proptest! {
    /// Derived key is always 32 bytes and deterministic.
    #[test]
    fn derive_is_deterministic_and_32_bytes(
        password in proptest::collection::vec(any::<u8>(), 0..128),
        salt in proptest::collection::vec(any::<u8>(), 16..64),
    ) {
        let a = derive(&password, &salt, &PROP_PARAMS).expect("derive should succeed");
        let b = derive(&password, &salt, &PROP_PARAMS).expect("derive should succeed");
        prop_assert_eq!(a.expose().len(), 32);
        prop_assert_eq!(a.expose(), b.expose());
    }

    /// Salts shorter than 16 bytes are always rejected.
    #[test]
    fn short_salts_rejected(salt in proptest::collection::vec(any::<u8>(), 0..16)) {
        prop_assert!(derive(b"password", &salt, &PROP_PARAMS).is_err());
    }

    /// Different passwords never share a verifier.
    #[test]
    fn different_passwords_different_verifiers(
        a in "[a-zA-Z0-9]{1,32}",
        b in "[a-zA-Z0-9]{1,32}",
    ) {
        prop_assume!(a != b);
        let salt = b"proptest_salt_16";
        let ka = derive(a.as_bytes(), salt, &PROP_PARAMS).expect("derive should succeed");
        let kb = derive(b.as_bytes(), salt, &PROP_PARAMS).expect("derive should succeed");
        let va = derive_verifier(&ka).expect("verifier should derive");
        let vb = derive_verifier(&kb).expect("verifier should derive");
        prop_assert!(!verifier_matches(&va, &vb));
    }
}
