//! Streaming digest computation.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::sync::Arc;

use md5::Md5;
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use tokio_util::sync::CancellationToken;

use hashsieve_core::{Digest, HashAlgorithm, HashError};

/// Something that can fingerprint a file's content.
///
/// Implementations run on a blocking thread and must poll `cancel` often
/// enough that an aborted computation stops promptly.
pub trait DigestEngine: Send + Sync + 'static {
    /// Compute the digest of the file at `path`.
    fn compute(
        &self,
        path: &Path,
        algorithm: HashAlgorithm,
        cancel: &CancellationToken,
    ) -> Result<Digest, HashError>;
}

impl<T: DigestEngine> DigestEngine for Arc<T> {
    fn compute(
        &self,
        path: &Path,
        algorithm: HashAlgorithm,
        cancel: &CancellationToken,
    ) -> Result<Digest, HashError> {
        (**self).compute(path, algorithm, cancel)
    }
}

/// Chunked file hasher.
#[derive(Debug, Clone)]
pub struct HashEngine {
    chunk_size: usize,
}

impl HashEngine {
    /// Default read buffer size.
    pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

    /// Create an engine with the default chunk size.
    pub fn new() -> Self {
        Self {
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
        }
    }

    /// Create an engine reading `chunk_size` bytes at a time.
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Compute the digest of an arbitrary byte stream.
    ///
    /// `origin` is only used to give I/O errors path context.
    pub fn compute_reader<R: Read>(
        &self,
        reader: R,
        origin: &Path,
        algorithm: HashAlgorithm,
        cancel: &CancellationToken,
    ) -> Result<Digest, HashError> {
        if cancel.is_cancelled() {
            return Err(HashError::Cancelled);
        }

        match algorithm {
            HashAlgorithm::None => Ok(Digest::empty()),
            HashAlgorithm::Md5 => self.stream::<Md5, R>(reader, origin, cancel),
            HashAlgorithm::Sha1 => self.stream::<Sha1, R>(reader, origin, cancel),
            HashAlgorithm::Sha256 => self.stream::<Sha256, R>(reader, origin, cancel),
            HashAlgorithm::Sha384 => self.stream::<Sha384, R>(reader, origin, cancel),
            HashAlgorithm::Sha512 => self.stream::<Sha512, R>(reader, origin, cancel),
        }
    }

    fn stream<D, R>(
        &self,
        mut reader: R,
        origin: &Path,
        cancel: &CancellationToken,
    ) -> Result<Digest, HashError>
    where
        D: digest::Digest,
        R: Read,
    {
        let mut hasher = D::new();
        let mut buffer = vec![0u8; self.chunk_size];

        loop {
            if cancel.is_cancelled() {
                return Err(HashError::Cancelled);
            }

            let bytes_read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(HashError::io(origin, e)),
            };
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(Digest::from_bytes(&hasher.finalize()))
    }
}

impl Default for HashEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DigestEngine for HashEngine {
    fn compute(
        &self,
        path: &Path,
        algorithm: HashAlgorithm,
        cancel: &CancellationToken,
    ) -> Result<Digest, HashError> {
        if cancel.is_cancelled() {
            return Err(HashError::Cancelled);
        }
        if algorithm == HashAlgorithm::None {
            return Ok(Digest::empty());
        }

        // Read-only; std opens with shared read access on every platform.
        let file = File::open(path).map_err(|e| HashError::io(path, e))?;
        let digest = self.compute_reader(file, path, algorithm, cancel)?;

        tracing::trace!(path = %path.display(), %algorithm, "hashed file");
        Ok(digest)
    }
}
