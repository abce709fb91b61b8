//! Cancellable streaming file hashing for hashsieve.
//!
//! [`HashEngine`] reads a file in fixed-size chunks and feeds it through one
//! of the supported digest algorithms (MD5, SHA-1, SHA-256, SHA-384,
//! SHA-512). The cancellation token is polled before the file is opened and
//! at every chunk boundary, so an aborted computation stops after at most
//! one more read.
//!
//! ```rust,no_run
//! use hashsieve_hash::{DigestEngine, HashAlgorithm, HashEngine};
//! use tokio_util::sync::CancellationToken;
//!
//! let engine = HashEngine::new();
//! let cancel = CancellationToken::new();
//! let digest = engine
//!     .compute("/path/to/file".as_ref(), HashAlgorithm::Sha256, &cancel)
//!     .unwrap();
//! println!("{digest}");
//! ```

mod engine;

pub use engine::{DigestEngine, HashEngine};

// Re-export core types for convenience
pub use hashsieve_core::{Digest, HashAlgorithm, HashError};
