//! Input path expansion for hashsieve.
//!
//! Turns the paths a user drops into the pipeline into a flat, ordered list
//! of regular files. Directories are walked recursively with jwalk in
//! lexical order, so the same input always expands the same way.
//!
//! # Example
//!
//! ```rust,no_run
//! use hashsieve_scan::Ingestor;
//!
//! let expansion = Ingestor::new().expand(&["/photos", "/backup/img.jpg"]);
//! for candidate in &expansion.candidates {
//!     println!("{} ({} bytes)", candidate.path.display(), candidate.size);
//! }
//! for warning in &expansion.warnings {
//!     eprintln!("skipped: {}", warning.message);
//! }
//! ```

mod ingest;

pub use ingest::{Candidate, Expansion, IngestWarning, Ingestor, WarningKind};
