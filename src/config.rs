//! Executor configuration.
//!
//! [`Settings`] is the single value handed to the executor; the CLI and the
//! [`crate::chisel::Chisel`] façade both build one. Defaults match the
//! documented behavior: metadata preserved, checksums off, pipe mode,
//! half the hardware parallelism (at least one worker).

use std::path::PathBuf;

use crate::format::ContainerFormat;

/// Strategy for applying multiple candidate processors to a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeMode {
    /// Chain candidates: the output of one is the input of the next.
    Pipe,
    /// Run every candidate against the original file and keep the smallest
    /// successful result.
    Parallel,
}

/// Complete executor configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Forwarded to processors; controls whether format metadata blocks
    /// survive recompression. The replacement policy also re-applies the
    /// original mtime and permission bits when set.
    pub preserve_metadata: bool,
    /// Require `raw_equal(original, winner)` before replacing a file.
    pub verify_checksums: bool,
    /// Log what would happen but never touch user files.
    pub dry_run: bool,
    /// When set, optimized files are written here instead of in-place.
    pub output_dir: Option<PathBuf>,
    /// Candidate dispatch strategy for Phase 2.
    pub encode_mode: EncodeMode,
    /// Worker count for the Phase 2 pool; clamped to >= 1.
    pub num_threads: usize,
    /// Output format used when a container's source format is readable but
    /// not writable. `Unknown` means "keep the original".
    pub fallback_format: ContainerFormat,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            preserve_metadata: true,
            verify_checksums: false,
            dry_run: false,
            output_dir: None,
            encode_mode: EncodeMode::Pipe,
            num_threads: default_thread_count(),
            fallback_format: ContainerFormat::Unknown,
        }
    }
}

/// Default worker count: half the hardware parallelism, at least 1.
pub fn default_thread_count() -> usize {
    (num_cpus::get() / 2).max(1)
}
