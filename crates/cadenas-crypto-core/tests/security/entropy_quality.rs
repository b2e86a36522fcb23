//! Smoke tests that `OsRng` output feeding salts and nonces is not degenerate.

use cadenas_crypto_core::envelope::seal;
use cadenas_crypto_core::kdf::generate_salt;

/// Shannon entropy in bits per byte.
#[allow(clippy::cast_precision_loss)]
fn shannon_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut freq = [0u64; 256];
    for &b in data {
        freq[b as usize] = freq[b as usize].saturating_add(1);
    }
    let len = data.len() as f64;
    freq.iter()
        .filter(|&&f| f > 0)
        .map(|&f| {
            let p = f as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// 4096 bytes of concatenated salts. Expected entropy is ~7.95.
#[test]
fn salt_stream_entropy() {
    let mut stream = Vec::with_capacity(4096);
    for _ in 0..256 {
        stream.extend_from_slice(&generate_salt().expect("salt"));
    }
    let entropy = shannon_entropy(&stream);
    assert!(entropy > 7.8, "salt entropy too low: {entropy:.4}");
}

/// 3072 bytes of concatenated nonces from sealing the same plaintext.
#[test]
fn nonce_stream_entropy() {
    let key = [0x11u8; 32];
    let mut stream = Vec::with_capacity(3072);
    for _ in 0..256 {
        let env = seal(b"same plaintext", &key).expect("seal should succeed");
        stream.extend_from_slice(&env.nonce);
    }
    let entropy = shannon_entropy(&stream);
    assert!(entropy > 7.7, "nonce entropy too low: {entropy:.4}");
}

#[test]
fn nonces_never_repeat() {
    let key = [0x22u8; 32];
    let nonces: std::collections::HashSet<[u8; 12]> = (0..1000)
        .map(|_| seal(b"x", &key).expect("seal should succeed").nonce)
        .collect();
    assert_eq!(nonces.len(), 1000);
}
