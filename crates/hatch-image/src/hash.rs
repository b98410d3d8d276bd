//! SHA-256 content verification.
//!
//! Blobs are hashed while they stream into the extractor, so verification
//! never needs a second pass or a temporary copy of the layer.

use std::io::{self, Read};

use hatch_common::error::{HatchError, Result};
use hatch_common::types::Sha256Hash;
use sha2::{Digest, Sha256};

/// A reader that hashes every byte passing through it.
#[derive(Debug)]
pub struct DigestReader<R> {
    inner: R,
    hasher: Sha256,
    bytes: u64,
}

impl<R: Read> DigestReader<R> {
    /// Wraps `inner`.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            bytes: 0,
        }
    }

    /// Number of bytes read so far.
    pub const fn bytes_read(&self) -> u64 {
        self.bytes
    }

    /// Reads the remainder of the stream and returns the digest of
    /// everything read through this wrapper.
    ///
    /// Consumers like the tar reader stop at the archive end marker, which
    /// can leave trailing padding unread.
    ///
    /// # Errors
    ///
    /// Returns the underlying read error.
    pub fn finish(mut self) -> io::Result<(Sha256Hash, u64)> {
        let _ = io::copy(&mut self, &mut io::sink())?;
        let digest = self.hasher.finalize();
        Ok((Sha256Hash::from_bytes(digest.as_slice()), self.bytes))
    }
}

impl<R: Read> Read for DigestReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes += n as u64;
        Ok(n)
    }
}

/// Computes the SHA-256 digest of an in-memory buffer.
#[must_use]
pub fn sha256_digest(data: &[u8]) -> Sha256Hash {
    Sha256Hash::from_bytes(Sha256::digest(data).as_slice())
}

/// Checks a computed hash against a registry digest string.
///
/// Digests using an algorithm other than `sha256` are accepted without
/// comparison.
///
/// # Errors
///
/// Returns [`HatchError::DigestMismatch`] if the hashes differ.
pub fn verify_digest(expected: &str, actual: &Sha256Hash) -> Result<()> {
    let Some(want) = Sha256Hash::from_digest(expected) else {
        tracing::debug!(digest = expected, "unsupported digest algorithm, not verified");
        return Ok(());
    };
    if &want != actual {
        return Err(HatchError::DigestMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    tracing::debug!(digest = expected, "blob digest verified");
    Ok(())
}
