//! JWalk-based expansion of input paths into file candidates.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use jwalk::{Parallelism, WalkDir};
use serde::{Deserialize, Serialize};

/// A regular file found while expanding inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Canonical path, or joined under its canonical directory input.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
}

/// Kind of ingest warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// Input does not exist.
    NotFound,
    /// Input is neither a regular file nor a directory.
    Unsupported,
    /// Error reading a directory entry.
    ReadError,
    /// Error reading metadata.
    MetadataError,
}

/// Non-fatal problem encountered while expanding inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestWarning {
    /// Path where the warning occurred.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl IngestWarning {
    /// Create a new ingest warning.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Create a warning for an input that does not exist.
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            message: format!("No such file or directory: {}", path.display()),
            path,
            kind: WarningKind::NotFound,
        }
    }
}

/// Result of expanding a list of inputs.
#[derive(Debug, Clone, Default)]
pub struct Expansion {
    /// Unique file candidates in traversal order.
    pub candidates: Vec<Candidate>,
    /// Inputs or entries that were skipped.
    pub warnings: Vec<IngestWarning>,
}

impl Expansion {
    /// Drop candidates whose path is already tracked elsewhere.
    pub fn retain_unknown(&mut self, is_known: impl Fn(&Path) -> bool) {
        self.candidates.retain(|c| !is_known(&c.path));
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Expands files and directories into regular file candidates.
#[derive(Debug, Clone, Default)]
pub struct Ingestor {
    follow_symlinks: bool,
}

impl Ingestor {
    /// Create a new ingestor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Follow symbolic links while walking directories.
    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Expand `inputs` into unique regular files.
    ///
    /// Every input is canonicalised first, so different spellings of the same
    /// location (`dir`, `dir/../dir`, relative or absolute) expand to the
    /// same paths. Files are taken directly; directories are walked
    /// recursively in lexical order. A path reached twice within one call is
    /// kept once.
    pub fn expand<P: AsRef<Path>>(&self, inputs: &[P]) -> Expansion {
        let mut expansion = Expansion::default();
        let mut seen: HashSet<PathBuf> = HashSet::new();

        for input in inputs {
            let input = input.as_ref();
            let canonical = match input.canonicalize() {
                Ok(path) => path,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    tracing::warn!(path = %input.display(), "input does not exist, skipping");
                    expansion.warnings.push(IngestWarning::not_found(input));
                    continue;
                }
                Err(err) => {
                    tracing::warn!(path = %input.display(), error = %err, "cannot resolve input");
                    expansion.warnings.push(IngestWarning::new(
                        input,
                        format!("Cannot resolve {}: {err}", input.display()),
                        WarningKind::ReadError,
                    ));
                    continue;
                }
            };

            let metadata = match std::fs::metadata(&canonical) {
                Ok(m) => m,
                Err(err) => {
                    expansion.warnings.push(IngestWarning::new(
                        input,
                        err.to_string(),
                        WarningKind::MetadataError,
                    ));
                    continue;
                }
            };

            if metadata.is_file() {
                push_unique(&mut expansion, &mut seen, canonical, metadata.len());
            } else if metadata.is_dir() {
                self.walk_directory(&canonical, &mut expansion, &mut seen);
            } else {
                tracing::warn!(path = %input.display(), "unsupported input, skipping");
                expansion.warnings.push(IngestWarning::new(
                    input,
                    format!("Not a regular file or directory: {}", input.display()),
                    WarningKind::Unsupported,
                ));
            }
        }

        tracing::debug!(
            inputs = inputs.len(),
            files = expansion.candidates.len(),
            warnings = expansion.warnings.len(),
            "expanded inputs"
        );
        expansion
    }

    /// Collect every regular file beneath `root`.
    fn walk_directory(&self, root: &Path, expansion: &mut Expansion, seen: &mut HashSet<PathBuf>) {
        let walker = WalkDir::new(root)
            .parallelism(Parallelism::RayonDefaultPool {
                busy_timeout: std::time::Duration::from_millis(100),
            })
            .sort(true)
            .skip_hidden(false)
            .follow_links(self.follow_symlinks)
            .min_depth(1);

        for entry_result in walker {
            let entry = match entry_result {
                Ok(e) => e,
                Err(err) => {
                    let path = err.path().map(|p| p.to_path_buf()).unwrap_or_default();
                    tracing::warn!(path = %path.display(), error = %err, "unreadable entry");
                    expansion
                        .warnings
                        .push(IngestWarning::new(path, err.to_string(), WarningKind::ReadError));
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            match entry.metadata() {
                Ok(metadata) => push_unique(expansion, seen, path, metadata.len()),
                Err(err) => {
                    expansion.warnings.push(IngestWarning::new(
                        &path,
                        err.to_string(),
                        WarningKind::MetadataError,
                    ));
                }
            }
        }
    }
}

fn push_unique(expansion: &mut Expansion, seen: &mut HashSet<PathBuf>, path: PathBuf, size: u64) {
    if seen.insert(path.clone()) {
        expansion.candidates.push(Candidate { path, size });
    }
}
