use sha1::{Digest, Sha1};
use std::io::{self, Write};

use crate::hash::SHA1_SIZE;

/// A writer that feeds every byte it forwards into a running SHA-1.
///
/// Only bytes the inner writer accepted are hashed, so a failed or short
/// write never leaves the digest ahead of the output.
pub struct HashingWriter<W> {
    inner: W,
    hasher: Sha1,
    written: u64,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha1::new(),
            written: 0,
        }
    }

    /// Number of bytes hashed so far.
    pub const fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Access the inner writer to emit bytes that must stay out of the digest.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Finish hashing and return the inner writer together with the digest.
    pub fn finalize(self) -> (W, [u8; SHA1_SIZE]) {
        (self.inner, self.hasher.finalize().into())
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
