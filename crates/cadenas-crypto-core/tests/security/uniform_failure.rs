//! Every way an envelope can fail to open must look identical to the caller.

use cadenas_crypto_core::envelope::{decrypt, encrypt};
use cadenas_crypto_core::CryptoError;
use data_encoding::BASE64URL_NOPAD;

const KEY: [u8; 32] = [0x5A; 32];

fn failure_message(key: &[u8], text: &str) -> String {
    match decrypt(key, text) {
        Err(e @ CryptoError::Decryption) => e.to_string(),
        Err(other) => panic!("unexpected error kind: {other:?}"),
        Ok(_) => panic!("decryption unexpectedly succeeded"),
    }
}

#[test]
fn all_failure_causes_share_one_message() {
    let valid = encrypt(&KEY, b"account password").expect("encrypt should succeed");
    let mut bytes = BASE64URL_NOPAD.decode(valid.as_bytes()).unwrap();

    let mut tampered = bytes.clone();
    let last = tampered.len() - 1;
    tampered[last] ^= 0x01;

    bytes[0] = 0x7F;
    let bad_version = BASE64URL_NOPAD.encode(&bytes);

    let messages = [
        failure_message(&[0x00; 32], &valid),
        failure_message(&KEY, &BASE64URL_NOPAD.encode(&tampered)),
        failure_message(&KEY, &bad_version),
        failure_message(&KEY, "%%% not base64 %%%"),
        failure_message(&KEY, "AAAA"),
    ];
    assert!(messages.windows(2).all(|w| w[0] == w[1]), "{messages:?}");
}
