//! Zeroizing containers for the master key and decrypted credentials.
//!
//! - [`SecretBytes`] holds fixed-size key material (the 256-bit master key).
//! - [`SecretBuffer`] holds a variable-length plaintext returned by
//!   [`crate::envelope::decrypt`].
//!
//! Both are wiped on drop, `mlock`'d on a best-effort basis and print as
//! `***` through `Debug` and `Display`.

use std::fmt;

use secrecy::{ExposeSecret, SecretSlice, SecretString};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

// ---------------------------------------------------------------------------
// Page locking
// ---------------------------------------------------------------------------

/// Keeps a region `mlock`'d until dropped.
///
/// A failed `mlock` is not an error: the region simply stays swappable and a
/// single warning is written to stderr for the whole process.
pub struct LockedRegion {
    ptr: *const u8,
    len: usize,
    locked: bool,
}

// SAFETY: the pointer is only ever handed to mlock/munlock, never dereferenced.
unsafe impl Send for LockedRegion {}
unsafe impl Sync for LockedRegion {}

impl LockedRegion {
    const fn unlocked() -> Self {
        Self {
            ptr: std::ptr::null(),
            len: 0,
            locked: false,
        }
    }

    /// Lock `len` bytes at `ptr`. Callers own the pointed-to memory and must
    /// keep it alive for as long as the guard.
    #[must_use]
    pub(crate) fn try_lock(ptr: *const u8, len: usize) -> Self {
        if len == 0 {
            return Self::unlocked();
        }
        let locked = platform::try_mlock(ptr, len);
        if !locked {
            static WARNED: std::sync::Once = std::sync::Once::new();
            WARNED.call_once(|| {
                eprintln!(
                    "[cadenas-crypto-core] WARNING: mlock failed, \
                     vault secrets may reach swap. \
                     Raise RLIMIT_MEMLOCK to silence this."
                );
            });
        }
        Self { ptr, len, locked }
    }

    /// Whether the region is currently pinned in RAM.
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.locked
    }
}

impl Drop for LockedRegion {
    fn drop(&mut self) {
        if self.locked {
            platform::try_munlock(self.ptr, self.len);
        }
    }
}

// ---------------------------------------------------------------------------
// SecretBuffer
// ---------------------------------------------------------------------------

/// Heap buffer for a decrypted credential.
///
/// Backed by [`SecretSlice<u8>`], which zeroizes its allocation on drop.
pub struct SecretBuffer {
    inner: SecretSlice<u8>,
    lock: LockedRegion,
}

impl SecretBuffer {
    /// Copy `data` into a fresh locked allocation.
    ///
    /// The source slice is left untouched; wipe it yourself if it was secret.
    ///
    /// # Errors
    ///
    /// Currently infallible; the `Result` leaves room for allocators that can
    /// refuse locked memory.
    pub fn new(data: &[u8]) -> Result<Self, CryptoError> {
        let inner: SecretSlice<u8> = data.to_vec().into();
        let exposed = inner.expose_secret();
        let lock = LockedRegion::try_lock(exposed.as_ptr(), exposed.len());
        Ok(Self { inner, lock })
    }

    /// Borrow the plaintext bytes.
    #[must_use]
    pub fn expose(&self) -> &[u8] {
        self.inner.expose_secret()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.expose().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub const fn is_mlocked(&self) -> bool {
        self.lock.is_locked()
    }

    /// Convert the plaintext into a [`SecretString`] for display to the user.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKeyMaterial` if the bytes are not UTF-8.
    pub fn to_secret_string(&self) -> Result<SecretString, CryptoError> {
        let text = std::str::from_utf8(self.expose())
            .map_err(|_| CryptoError::InvalidKeyMaterial("plaintext is not valid UTF-8".into()))?;
        Ok(SecretString::from(text))
    }
}

impl fmt::Debug for SecretBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretBuffer(***)")
    }
}

impl fmt::Display for SecretBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretBuffer(***)")
    }
}

// ---------------------------------------------------------------------------
// SecretBytes<N>
// ---------------------------------------------------------------------------

/// Fixed-size key material, zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretBytes<const N: usize> {
    bytes: [u8; N],
    #[zeroize(skip)]
    lock: LockedRegion,
}

impl<const N: usize> SecretBytes<N> {
    /// Take ownership of `data`.
    ///
    /// The lock is taken at the address the bytes have inside this function.
    /// Moving the value afterwards leaves that lock stale, which is harmless:
    /// zeroize-on-drop does not depend on it and `munlock` of an unmapped
    /// range is a no-op.
    #[must_use]
    pub fn new(data: [u8; N]) -> Self {
        let mut s = Self {
            bytes: data,
            lock: LockedRegion::unlocked(),
        };
        s.lock = LockedRegion::try_lock(s.bytes.as_ptr(), N);
        s
    }

    #[must_use]
    pub const fn expose(&self) -> &[u8; N] {
        &self.bytes
    }
}

impl<const N: usize> fmt::Debug for SecretBytes<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBytes<{N}>(***)")
    }
}

impl<const N: usize> fmt::Display for SecretBytes<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBytes<{N}>(***)")
    }
}

// ---------------------------------------------------------------------------
// Process hardening
// ---------------------------------------------------------------------------

/// Set `RLIMIT_CORE` to zero so a crash cannot dump an unlocked session.
///
/// No-op outside Unix.
///
/// # Errors
///
/// Returns `CryptoError::SecureMemory` if `setrlimit` fails.
pub fn disable_core_dumps() -> Result<(), CryptoError> {
    platform::disable_core_dumps_impl()
}

#[cfg(unix)]
mod platform {
    use crate::error::CryptoError;

    pub(super) fn try_mlock(ptr: *const u8, len: usize) -> bool {
        // SAFETY: mlock validates the range itself and reports ENOMEM on bad input.
        unsafe { libc::mlock(ptr.cast(), len) == 0 }
    }

    pub(super) fn try_munlock(ptr: *const u8, len: usize) {
        // SAFETY: munlock never touches the memory; failure is ignored.
        unsafe {
            libc::munlock(ptr.cast(), len);
        }
    }

    pub(super) fn disable_core_dumps_impl() -> Result<(), CryptoError> {
        let limit = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        // SAFETY: plain POSIX call with a valid pointer to a stack value.
        let ret = unsafe { libc::setrlimit(libc::RLIMIT_CORE, &raw const limit) };
        if ret != 0 {
            return Err(CryptoError::SecureMemory(
                "failed to disable core dumps via RLIMIT_CORE".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(not(unix))]
mod platform {
    use crate::error::CryptoError;

    pub(super) fn try_mlock(_ptr: *const u8, _len: usize) -> bool {
        false
    }

    pub(super) fn try_munlock(_ptr: *const u8, _len: usize) {}

    pub(super) fn disable_core_dumps_impl() -> Result<(), CryptoError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_buffer_holds_copy_of_input() {
        let buf = SecretBuffer::new(b"s3cret-Passw0rd").expect("allocation should succeed");
        assert_eq!(buf.expose(), b"s3cret-Passw0rd");
        assert_eq!(buf.len(), 15);
        assert!(!buf.is_empty());
    }

    #[test]
    fn empty_secret_buffer_is_not_locked() {
        let buf = SecretBuffer::new(b"").expect("allocation should succeed");
        assert!(buf.is_empty());
        assert!(!buf.is_mlocked());
    }

    #[test]
    fn secret_buffer_formatting_is_masked() {
        let buf = SecretBuffer::new(b"hunter2").expect("allocation should succeed");
        assert_eq!(format!("{buf:?}"), "SecretBuffer(***)");
        assert_eq!(format!("{buf}"), "SecretBuffer(***)");
    }

    #[test]
    fn to_secret_string_preserves_unicode() {
        let buf = SecretBuffer::new("pässwörd-✓".as_bytes()).expect("allocation should succeed");
        let s = buf.to_secret_string().expect("valid UTF-8");
        assert_eq!(s.expose_secret(), "pässwörd-✓");
    }

    #[test]
    fn to_secret_string_rejects_invalid_utf8() {
        let buf = SecretBuffer::new(&[0xFF, 0xFE]).expect("allocation should succeed");
        assert!(matches!(
            buf.to_secret_string(),
            Err(CryptoError::InvalidKeyMaterial(_))
        ));
    }

    #[test]
    fn secret_bytes_expose_returns_input() {
        let key = SecretBytes::new([0xAB; 32]);
        assert_eq!(key.expose(), &[0xAB; 32]);
    }

    #[test]
    fn secret_bytes_formatting_is_masked() {
        let key = SecretBytes::<32>::new([0xFF; 32]);
        let debug = format!("{key:?}");
        assert_eq!(debug, "SecretBytes<32>(***)");
        assert!(!debug.to_lowercase().contains("ff"));
        assert_eq!(format!("{key}"), "SecretBytes<32>(***)");
    }

    #[test]
    fn secret_bytes_zeroize_clears_bytes() {
        let mut key = SecretBytes::<16>::new([0x42; 16]);
        key.zeroize();
        assert_eq!(key.expose(), &[0u8; 16]);
    }

    #[cfg(unix)]
    #[test]
    fn disable_core_dumps_sets_zero_limit() {
        disable_core_dumps().expect("disable_core_dumps should succeed");

        let mut limit = libc::rlimit {
            rlim_cur: 1,
            rlim_max: 1,
        };
        let ret = unsafe { libc::getrlimit(libc::RLIMIT_CORE, &raw mut limit) };
        assert_eq!(ret, 0);
        assert_eq!(limit.rlim_cur, 0);
        assert_eq!(limit.rlim_max, 0);
    }
}
