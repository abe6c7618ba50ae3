//! Events published during the three processing phases.
//!
//! These are plain data carriers used with [`crate::event_bus::EventBus`]
//! to notify subscribers (CLI, report generator, library observers) about
//! progress, errors, and results. Per file the ordering is strict:
//! `*Start` is always followed by exactly one terminal event of the same
//! phase (`*Complete`, `*Error`, or `*Skipped`). Ordering across files is
//! undefined.

use std::path::PathBuf;
use std::time::Duration;

// ── Phase 1: Analyze ─────────────────────────────────────────────────────────

/// Analysis of a file has begun.
#[derive(Debug, Clone)]
pub struct FileAnalyzeStart {
    pub path: PathBuf,
}

/// Analysis finished and at least one operation was scheduled.
#[derive(Debug, Clone)]
pub struct FileAnalyzeComplete {
    pub path: PathBuf,
    /// The file was identified as a container and its children extracted.
    pub extracted: bool,
    /// The file itself was scheduled for recompression.
    pub scheduled: bool,
    /// Number of children extracted (0 when `extracted` is false).
    pub num_children: u64,
}

/// Analysis failed; the file is not scheduled further.
#[derive(Debug, Clone)]
pub struct FileAnalyzeError {
    pub path: PathBuf,
    pub message: String,
}

/// The file was skipped during analysis (junk, unsupported, nothing to do).
#[derive(Debug, Clone)]
pub struct FileAnalyzeSkipped {
    pub path: PathBuf,
    pub reason: String,
}

// ── Phase 2: Process ─────────────────────────────────────────────────────────

/// Recompression of a file has begun.
#[derive(Debug, Clone)]
pub struct FileProcessStart {
    pub path: PathBuf,
}

/// Recompression finished; `replaced` tells whether the file on disk was
/// actually swapped (false under `--dry-run`).
#[derive(Debug, Clone)]
pub struct FileProcessComplete {
    pub path: PathBuf,
    pub original_size: u64,
    pub new_size: u64,
    pub replaced: bool,
    pub duration: Duration,
}

/// Recompression failed; the original file is untouched.
#[derive(Debug, Clone)]
pub struct FileProcessError {
    pub path: PathBuf,
    pub message: String,
}

/// The file was skipped during processing (interrupted, unsupported, no
/// size improvement, checksum mismatch).
#[derive(Debug, Clone)]
pub struct FileProcessSkipped {
    pub path: PathBuf,
    pub reason: String,
}

// ── Phase 3: Finalize ────────────────────────────────────────────────────────

/// Re-assembly of a container has begun.
#[derive(Debug, Clone)]
pub struct ContainerFinalizeStart {
    pub path: PathBuf,
}

/// Re-assembly finished; `final_size` is the size of the container on disk
/// after finalization (unchanged if nothing improved).
#[derive(Debug, Clone)]
pub struct ContainerFinalizeComplete {
    pub path: PathBuf,
    pub final_size: u64,
}

/// Re-assembly failed; the original container is untouched.
#[derive(Debug, Clone)]
pub struct ContainerFinalizeError {
    pub path: PathBuf,
    pub message: String,
}

/// Re-assembly was skipped (cancellation drained the finalize stack).
#[derive(Debug, Clone)]
pub struct ContainerFinalizeSkipped {
    pub path: PathBuf,
    pub reason: String,
}
