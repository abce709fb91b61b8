//! hashsieve - Concurrent file hashing and duplicate detection.
//!
//! Usage:
//!   hashsieve [PATHS]...                       Hash files and report duplicates
//!   hashsieve -a sha256 -j 8 [PATHS]...        Choose algorithm and concurrency
//!   hashsieve --select-duplicates [PATHS]...   List the copies that would go
//!   hashsieve --delete [PATHS]...              Move extra copies to the trash
//!   hashsieve --help                           Show help

use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};
use color_eyre::eyre::{Context, Result};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use hashsieve_core::{HashAlgorithm, PipelineConfig};
use hashsieve_ops::{DeletionReport, PermanentDeleter, TrashDeleter};
use hashsieve_pipeline::{DuplicateGroup, DuplicateReport, EventKind, Pipeline, PipelineEvent};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::oneshot;

/// Environment variable holding a tracing filter directive.
const LOG_ENV: &str = "HASHSIEVE_LOG";

#[derive(Parser)]
#[command(
    name = "hashsieve",
    version,
    about = "Hash files concurrently and find duplicates",
    long_about = "hashsieve streams every file through a bounded pool of hash workers, \
                  groups files with equal digests, and can remove the extra copies.\n\n\
                  Defaults are read from the user config file when present."
)]
struct Cli {
    /// Files or directories to hash
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Hash algorithm (md5, sha1, sha256, sha384, sha512)
    #[arg(short, long)]
    algorithm: Option<HashAlgorithm>,

    /// Concurrent hash computations (1, 2, 4, 8, 16 or 32)
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Output format
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    /// Config file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Select every duplicate except the first copy of each group
    #[arg(long)]
    select_duplicates: bool,

    /// Delete selected duplicates (moves them to the trash)
    #[arg(long)]
    delete: bool,

    /// Delete permanently instead of using the trash
    #[arg(long, requires = "delete")]
    permanent: bool,

    /// Show what would be deleted without touching any file
    #[arg(long)]
    dry_run: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// What happened to the selected duplicates.
enum Removal {
    None,
    Planned(Vec<PathBuf>),
    Done(DeletionReport),
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path)
            .wrap_err_with(|| format!("Failed to load config from {}", path.display()))?,
        None => PipelineConfig::load_or_default(&PipelineConfig::default_path())
            .context("Failed to load user config")?,
    };
    tracing::debug!(?config, "loaded config");

    let pipeline = Pipeline::new(config);
    if let Some(algorithm) = cli.algorithm {
        pipeline.set_algorithm(algorithm)?;
    }
    if let Some(concurrency) = cli.concurrency {
        pipeline.set_concurrency(concurrency)?;
    }

    let progress = Progress::spawn(&pipeline);
    let worker = pipeline.clone();
    let inputs = cli.paths.clone();
    let summary = tokio::task::spawn_blocking(move || worker.add_paths(&inputs))
        .await
        .context("Ingestion task failed")?;
    for warning in &summary.warnings {
        eprintln!("warning: {}", warning.message);
    }

    eprintln!(
        "Hashing {} files with {} ({} at a time)...",
        summary.added.len(),
        pipeline.algorithm(),
        pipeline.concurrency()
    );
    pipeline.wait_idle().await;
    progress.finish().await;

    let report = pipeline.report();

    let removal = if cli.select_duplicates || cli.delete {
        pipeline.select_duplicates();
        if cli.delete && !cli.dry_run {
            let worker = pipeline.clone();
            let permanent = cli.permanent;
            let deletion = tokio::task::spawn_blocking(move || {
                if permanent {
                    worker.delete_selected(&PermanentDeleter)
                } else {
                    worker.delete_selected(&TrashDeleter)
                }
            })
            .await
            .context("Deletion task failed")?;
            Removal::Done(deletion)
        } else {
            let selected = pipeline
                .completed()
                .iter()
                .filter(|r| r.is_selected())
                .map(|r| r.path().to_path_buf())
                .collect();
            Removal::Planned(selected)
        }
    } else {
        Removal::None
    };

    match cli.format {
        OutputFormat::Text => print_text(&report, &removal),
        OutputFormat::Json => print_json(&report, &removal)?,
    }

    Ok(())
}

/// Route tracing output to stderr, filtered by `HASHSIEVE_LOG` or `-v`.
fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .with(filter)
        .init();
}

/// Prints per-file failures as they happen.
struct Progress {
    handle: tokio::task::JoinHandle<()>,
    stop: oneshot::Sender<()>,
}

impl Progress {
    fn spawn(pipeline: &Pipeline) -> Self {
        let mut events = pipeline.subscribe();
        let observer = pipeline.clone();
        let (stop, mut stopped) = oneshot::channel();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(event) => print_failure(&observer, &event),
                        Err(RecvError::Lagged(missed)) => {
                            tracing::debug!(missed, "progress output lagged");
                        }
                        Err(RecvError::Closed) => return,
                    },
                    _ = &mut stopped => break,
                }
            }

            // Events sent before the stop signal are still buffered.
            loop {
                match events.try_recv() {
                    Ok(event) => print_failure(&observer, &event),
                    Err(TryRecvError::Lagged(_)) => continue,
                    Err(_) => break,
                }
            }
        });

        Self { handle, stop }
    }

    /// Flush buffered events and wait for the printer to exit.
    async fn finish(self) {
        let _ = self.stop.send(());
        if let Err(err) = self.handle.await {
            tracing::warn!(error = %err, "progress task failed");
        }
    }
}

fn print_failure(pipeline: &Pipeline, event: &PipelineEvent) {
    if let EventKind::Failed { id, failure } = &event.kind {
        let path = pipeline
            .record(*id)
            .map(|r| r.path().display().to_string())
            .unwrap_or_else(|| id.to_string());
        eprintln!("failed: {path}: {failure}");
    }
}

fn print_text(report: &DuplicateReport, removal: &Removal) {
    println!();
    println!("{}", "─".repeat(70));
    println!(" Duplicate File Report");
    println!("{}", "─".repeat(70));
    println!();
    println!(
        " {} files hashed, {} failed",
        report.files_hashed, report.files_failed
    );

    if report.groups.is_empty() {
        println!(" No duplicate files found.");
    } else {
        println!(
            " Found {} duplicate groups ({} files)",
            report.group_count, report.files_with_duplicates
        );
        println!(
            " Total wasted space: {}",
            format_size(report.total_wasted_space)
        );
        println!();

        for (i, group) in report.groups.iter().enumerate() {
            println!(
                " Group {} [{}] ({} files, {} each, {} wasted) {}",
                i + 1,
                group_color(group),
                group.count(),
                format_size(group.size),
                format_size(group.wasted_bytes),
                group.digest
            );
            for path in &group.paths {
                println!("   {}", path.display());
            }
            println!();
        }
    }

    if !report.failures.is_empty() {
        println!(" Failures:");
        for entry in &report.failures {
            println!("   {}: {}", entry.path.display(), entry.failure);
        }
        println!();
    }

    match removal {
        Removal::None => {}
        Removal::Planned(paths) => {
            println!(" Selected {} duplicates:", paths.len());
            for path in paths {
                println!("   {}", path.display());
            }
        }
        Removal::Done(deletion) => {
            println!(
                " {} ({} freed)",
                deletion.summary(),
                format_size(deletion.bytes_freed)
            );
            for error in &deletion.errors {
                println!("   {error}");
            }
        }
    }
}

fn print_json(report: &DuplicateReport, removal: &Removal) -> Result<()> {
    let value = match removal {
        Removal::None => serde_json::json!({ "report": report }),
        Removal::Planned(paths) => serde_json::json!({ "report": report, "selected": paths }),
        Removal::Done(deletion) => serde_json::json!({ "report": report, "deletion": deletion }),
    };
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn group_color(group: &DuplicateGroup) -> &str {
    group.color.as_deref().unwrap_or("-")
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
