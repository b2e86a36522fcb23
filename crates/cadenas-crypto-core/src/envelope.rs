//! AES-256-GCM envelope for a single stored secret.
//!
//! This module provides:
//! - [`encrypt`]: seal a secret under the master key, returning text
//! - [`decrypt`]: authenticate and open the text form, returning [`SecretBuffer`]
//! - [`Envelope`]: parsed envelope (version, timestamp, nonce, ciphertext, tag)
//!
//! # Wire format
//!
//! `version (1) || timestamp (8, BE unix secs) || nonce (12) || ciphertext || tag (16)`,
//! text-encoded as unpadded URL-safe base64 for the credential table.
//!
//! The version byte and timestamp are the AEAD associated data, so editing
//! either one breaks authentication exactly like editing the ciphertext.

use data_encoding::BASE64URL_NOPAD;
use rand::rngs::OsRng;
use rand::RngCore;
use ring::aead;
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::memory::SecretBuffer;

/// Current envelope format version.
pub const FORMAT_VERSION: u8 = 1;

/// AES-256-GCM nonce length in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// AES-256-GCM authentication tag length in bytes (128 bits).
pub const TAG_LEN: usize = 16;

/// AES-256-GCM key length in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Version byte + timestamp.
const HEADER_LEN: usize = 1 + 8;

/// Minimum valid binary length: header + nonce + empty ciphertext + tag.
const MIN_ENVELOPE_LEN: usize = HEADER_LEN + NONCE_LEN + TAG_LEN;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A parsed, still-sealed envelope.
#[must_use = "encrypted data must be stored"]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    /// Format version (always [`FORMAT_VERSION`] once parsed).
    pub version: u8,
    /// Seconds since the Unix epoch at sealing time.
    pub timestamp: u64,
    /// 96-bit random nonce, unique per encryption.
    pub nonce: [u8; NONCE_LEN],
    /// Encrypted payload (same length as the plaintext).
    pub ciphertext: Vec<u8>,
    /// 128-bit authentication tag.
    pub tag: [u8; TAG_LEN],
}

impl Envelope {
    /// The authenticated-but-unencrypted header bytes.
    fn header(&self) -> [u8; HEADER_LEN] {
        let mut header = [0u8; HEADER_LEN];
        header[0] = self.version;
        header[1..].copy_from_slice(&self.timestamp.to_be_bytes());
        header
    }

    /// Seconds since the Unix epoch at which the secret was sealed.
    #[must_use]
    pub const fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Serialize to the binary wire format.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let capacity = MIN_ENVELOPE_LEN.saturating_add(self.ciphertext.len());
        let mut out = Vec::with_capacity(capacity);
        out.extend_from_slice(&self.header());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out.extend_from_slice(&self.tag);
        out
    }

    /// Parse the binary wire format.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Decryption` if the input is too short or carries
    /// an unknown version. Parsing failures are deliberately indistinguishable
    /// from authentication failures.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < MIN_ENVELOPE_LEN || bytes[0] != FORMAT_VERSION {
            return Err(CryptoError::Decryption);
        }

        let mut ts = [0u8; 8];
        ts.copy_from_slice(&bytes[1..HEADER_LEN]);

        let nonce_end = HEADER_LEN.saturating_add(NONCE_LEN);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&bytes[HEADER_LEN..nonce_end]);

        let ct_end = bytes
            .len()
            .checked_sub(TAG_LEN)
            .ok_or(CryptoError::Decryption)?;
        let ciphertext = bytes[nonce_end..ct_end].to_vec();

        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&bytes[ct_end..]);

        Ok(Self {
            version: bytes[0],
            timestamp: u64::from_be_bytes(ts),
            nonce,
            ciphertext,
            tag,
        })
    }

    /// Text form stored in the credential table.
    #[must_use]
    pub fn encode(&self) -> String {
        BASE64URL_NOPAD.encode(&self.to_bytes())
    }

    /// Parse the text form.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Decryption` for invalid base64 or an invalid
    /// binary envelope.
    pub fn decode(text: &str) -> Result<Self, CryptoError> {
        let bytes = BASE64URL_NOPAD
            .decode(text.as_bytes())
            .map_err(|_| CryptoError::Decryption)?;
        Self::from_bytes(&bytes)
    }
}

// ---------------------------------------------------------------------------
// Core encryption
// ---------------------------------------------------------------------------

/// Seal `plaintext` under `key`, returning the raw [`Envelope`].
///
/// A fresh nonce is drawn from `OsRng` on every call, so sealing the same
/// plaintext twice yields unrelated ciphertexts.
///
/// # Errors
///
/// Returns `CryptoError::Encryption` if the key is not exactly 32 bytes or
/// the CSPRNG/AEAD operation fails.
pub fn seal(plaintext: &[u8], key: &[u8]) -> Result<Envelope, CryptoError> {
    let sealing_key = aead_key(key)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng
        .try_fill_bytes(&mut nonce_bytes)
        .map_err(|e| CryptoError::Encryption(format!("CSPRNG fill failed: {e}")))?;

    let mut envelope = Envelope {
        version: FORMAT_VERSION,
        timestamp: current_epoch_secs(),
        nonce: nonce_bytes,
        ciphertext: Vec::new(),
        tag: [0u8; TAG_LEN],
    };
    let header = envelope.header();

    // Encrypt in place: the plaintext copy becomes the ciphertext.
    let mut in_out = plaintext.to_vec();
    let Ok(tag) = sealing_key.seal_in_place_separate_tag(
        aead::Nonce::assume_unique_for_key(nonce_bytes),
        aead::Aad::from(&header),
        &mut in_out,
    ) else {
        in_out.zeroize();
        return Err(CryptoError::Encryption(
            "AES-256-GCM encryption failed".into(),
        ));
    };

    envelope.tag.copy_from_slice(tag.as_ref());
    envelope.ciphertext = in_out;
    Ok(envelope)
}

/// Authenticate and open an [`Envelope`].
///
/// # Errors
///
/// Returns `CryptoError::Decryption` on any failure, including a key of the
/// wrong length.
pub fn open(envelope: &Envelope, key: &[u8]) -> Result<SecretBuffer, CryptoError> {
    let opening_key = aead_key(key).map_err(|_| CryptoError::Decryption)?;
    let header = envelope.header();

    let mut ct_tag = Vec::with_capacity(envelope.ciphertext.len().saturating_add(TAG_LEN));
    ct_tag.extend_from_slice(&envelope.ciphertext);
    ct_tag.extend_from_slice(&envelope.tag);

    let result = opening_key
        .open_in_place(
            aead::Nonce::assume_unique_for_key(envelope.nonce),
            aead::Aad::from(&header),
            &mut ct_tag,
        )
        .map_err(|_| CryptoError::Decryption)
        .and_then(|plaintext| {
            SecretBuffer::new(plaintext).map_err(|_| CryptoError::Decryption)
        });

    ct_tag.zeroize();
    result
}

/// Encrypt a secret and return its stored text form.
///
/// # Errors
///
/// See [`seal`].
pub fn encrypt(key: &[u8], plaintext: &[u8]) -> Result<String, CryptoError> {
    Ok(seal(plaintext, key)?.encode())
}

/// Decrypt the stored text form of a secret.
///
/// Fails closed: no plaintext is ever returned unless the tag verifies.
///
/// # Errors
///
/// Returns `CryptoError::Decryption` for every failure cause.
pub fn decrypt(key: &[u8], text: &str) -> Result<SecretBuffer, CryptoError> {
    let envelope = Envelope::decode(text)?;
    open(&envelope, key)
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn aead_key(key: &[u8]) -> Result<aead::LessSafeKey, CryptoError> {
    if key.len() != KEY_LEN {
        return Err(CryptoError::Encryption(format!(
            "invalid key length: {} bytes (expected {KEY_LEN})",
            key.len()
        )));
    }
    let unbound = aead::UnboundKey::new(&aead::AES_256_GCM, key)
        .map_err(|_| CryptoError::Encryption("failed to create AES-256-GCM key".into()))?;
    Ok(aead::LessSafeKey::new(unbound))
}

fn current_epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
