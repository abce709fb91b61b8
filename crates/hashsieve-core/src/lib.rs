//! Core types and configuration for hashsieve.
//!
//! This crate provides the data structures shared by the hashing engine,
//! the ingestion walker and the pipeline coordinator: file records and their
//! lifecycle stages, digest algorithms, duplicate-group markers, errors and
//! pipeline configuration.

mod algorithm;
mod config;
mod error;
mod record;

pub use algorithm::{Digest, HashAlgorithm};
pub use config::{ConfigError, Concurrency, PipelineConfig, PipelineConfigBuilder};
pub use error::{FailureKind, HashError, PipelineError, RecordFailure};
pub use record::{FileRecord, GroupMarker, MARKER_PALETTE, RecordId, Stage};
