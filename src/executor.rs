//! The orchestration core: Analyze → Process → Finalize.
//!
//! Phase 1 walks the inputs depth-first on the calling thread, asking the
//! registry who can handle each file. Containers are unpacked through
//! their processor and their children analyzed recursively; files with a
//! recompressing processor are appended to the work list. Phase 2 fans
//! the work list out over the worker pool; each task chains (`Pipe`) or
//! fans out (`Parallel`) the candidate processors into temp files and
//! hands the winner to the replacement policy. Phase 3 pops the finalize
//! stack LIFO so inner containers are re-assembled before their parents.
//!
//! The replacement policy is the only code path that mutates user files;
//! everything upstream works in uniquely named temp files. Cancellation
//! is cooperative throughout: the stop flag is polled between analyzed
//! paths, at task start, between candidate stages, and between finalized
//! records.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;

use crate::config::{EncodeMode, Settings};
use crate::error::{Error, Result};
use crate::event_bus::EventBus;
use crate::events::{
    ContainerFinalizeComplete, ContainerFinalizeError, ContainerFinalizeSkipped,
    ContainerFinalizeStart, FileAnalyzeComplete, FileAnalyzeError, FileAnalyzeSkipped,
    FileAnalyzeStart, FileProcessComplete, FileProcessError, FileProcessSkipped, FileProcessStart,
};
use crate::processor::{ExtractionRecord, Processor};
use crate::registry::ProcessorRegistry;
use crate::threadpool::{StopToken, WorkerPool};
use crate::util::file_size::safe_file_size;
use crate::util::temp::{cleanup_dir, make_temp_file, remove_file_quiet};
use crate::util::{apply_file_stat, capture_file_stat, is_junk};

/// A file scheduled for recompression.
struct WorkItem {
    path: PathBuf,
    /// True when the file lives inside a container's temp directory. Such
    /// files are always replaced in place, regardless of `--output`, so
    /// the repack sees the optimized bytes.
    embedded: bool,
}

/// State shared between the executor and its worker tasks.
struct Shared {
    registry: Arc<ProcessorRegistry>,
    settings: Settings,
    bus: Arc<EventBus>,
}

impl Shared {
    /// Candidate processors for `path`: MIME lookup first, extension
    /// lookup as fallback.
    fn resolve_processors(&self, path: &Path) -> Vec<&dyn Processor> {
        let mut procs = match crate::mime::detect(path) {
            Some(mime) => self.registry.find_by_mime(&mime),
            None => Vec::new(),
        };
        if procs.is_empty() {
            if let Some(ext) = crate::mime::extension_of(path) {
                procs = self.registry.find_by_extension(&ext);
            }
        }
        procs
    }
}

/// Drives the three-phase pipeline over a worker pool.
pub struct Executor {
    shared: Arc<Shared>,
    pool: WorkerPool,
    stop: Arc<AtomicBool>,
}

impl Executor {
    /// Build an executor. Fails only on configuration errors (an output
    /// directory that cannot be created).
    pub fn new(
        registry: Arc<ProcessorRegistry>,
        settings: Settings,
        bus: Arc<EventBus>,
    ) -> Result<Self> {
        if let Some(dir) = &settings.output_dir {
            if !settings.dry_run {
                std::fs::create_dir_all(dir).map_err(|e| {
                    Error::Config(format!(
                        "failed to create output directory {}: {e}",
                        dir.display()
                    ))
                })?;
            }
        }
        let pool = WorkerPool::new(settings.num_threads.max(1));
        Ok(Executor {
            shared: Arc::new(Shared {
                registry,
                settings,
                bus,
            }),
            pool,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// True once [`Executor::request_stop`] has been called.
    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Request a graceful stop. Thread-safe; returns immediately.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
        self.pool.request_stop();
    }

    /// Run the full pipeline over `inputs`. Blocks until every phase has
    /// finished or the run was cancelled. Per-file failures surface as
    /// events, never as an error return.
    pub fn run(&self, inputs: &[PathBuf]) {
        let mut work_list = Vec::new();
        let mut finalize_stack: Vec<(ExtractionRecord, bool)> = Vec::new();

        for path in inputs {
            if self.is_stopped() {
                break;
            }
            self.analyze_path(path, false, &mut work_list, &mut finalize_stack);
        }
        if !self.is_stopped() {
            self.process_work_list(work_list);
        }
        if !self.is_stopped() {
            self.finalize_containers(&mut finalize_stack);
        }
        self.discard_records(finalize_stack);
    }

    // ── Phase 1: Analyze ─────────────────────────────────────────────────

    fn analyze_path(
        &self,
        path: &Path,
        embedded: bool,
        work_list: &mut Vec<WorkItem>,
        finalize_stack: &mut Vec<(ExtractionRecord, bool)>,
    ) {
        if self.is_stopped() {
            return;
        }
        let bus = &self.shared.bus;

        if is_junk(path) {
            bus.publish(FileAnalyzeSkipped {
                path: path.to_path_buf(),
                reason: "Junk file".to_owned(),
            });
            return;
        }

        bus.publish(FileAnalyzeStart {
            path: path.to_path_buf(),
        });

        let candidates = self.shared.resolve_processors(path);
        let Some(primary) = candidates.first() else {
            log::warn!("no processor for {}", path.display());
            bus.publish(FileAnalyzeSkipped {
                path: path.to_path_buf(),
                reason: "Unsupported format".to_owned(),
            });
            return;
        };

        let mut extracted = false;
        let mut scheduled = false;
        let mut num_children = 0u64;

        if primary.can_extract_contents() {
            match primary.prepare_extraction(path) {
                Ok(Some(record)) => {
                    num_children = record.extracted_files.len() as u64;
                    let children = record.extracted_files.clone();
                    finalize_stack.push((record, embedded));
                    extracted = true;
                    for child in &children {
                        self.analyze_path(child, true, work_list, finalize_stack);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    log::error!("prepare_extraction failed for {}: {e}", path.display());
                    bus.publish(FileAnalyzeError {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    });
                    return;
                }
            }
        }

        if primary.can_recompress() {
            work_list.push(WorkItem {
                path: path.to_path_buf(),
                embedded,
            });
            scheduled = true;
        }

        if extracted || scheduled {
            bus.publish(FileAnalyzeComplete {
                path: path.to_path_buf(),
                extracted,
                scheduled,
                num_children,
            });
        } else {
            log::debug!("file ignored: {}", path.display());
            bus.publish(FileAnalyzeSkipped {
                path: path.to_path_buf(),
                reason: "No operations available".to_owned(),
            });
        }
    }

    // ── Phase 2: Process ─────────────────────────────────────────────────

    fn process_work_list(&self, work_list: Vec<WorkItem>) {
        for item in work_list {
            if self.is_stopped() {
                break;
            }
            let shared = Arc::clone(&self.shared);
            let enqueued = self
                .pool
                .enqueue(move |token| process_one_file(&shared, &item, token));
            if enqueued.is_err() {
                break;
            }
        }
        self.pool.wait_idle();
    }

    // ── Phase 3: Finalize ────────────────────────────────────────────────

    fn finalize_containers(&self, finalize_stack: &mut Vec<(ExtractionRecord, bool)>) {
        let shared = &self.shared;
        let bus = &shared.bus;

        while !self.is_stopped() {
            let Some((record, embedded)) = finalize_stack.pop() else {
                break;
            };
            let path = record.original_path.clone();

            bus.publish(ContainerFinalizeStart { path: path.clone() });

            let candidates = shared.resolve_processors(&path);
            let Some(primary) = candidates.first() else {
                log::warn!("no processor to finalize {}", path.display());
                cleanup_dir(&record.temp_dir);
                bus.publish(ContainerFinalizeError {
                    path,
                    message: "Unsupported format".to_owned(),
                });
                continue;
            };

            let original_size = safe_file_size(&path);
            let start = Instant::now();
            match primary.finalize_extraction(record, shared.settings.fallback_format) {
                Ok(None) => {
                    log::debug!("container finalize kept original: {}", path.display());
                    bus.publish(ContainerFinalizeComplete {
                        final_size: safe_file_size(&path),
                        path,
                    });
                }
                Ok(Some(candidate)) => {
                    apply_replacement(
                        shared,
                        ReplaceScope::Finalize,
                        &path,
                        &candidate,
                        original_size,
                        start.elapsed(),
                        embedded,
                    );
                }
                Err(e) => {
                    log::error!("finalize error for {}: {e}", path.display());
                    bus.publish(ContainerFinalizeError {
                        path,
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    /// Cancellation cleanup: drop any records the finalize phase never
    /// reached, removing their temp directories.
    fn discard_records(&self, finalize_stack: Vec<(ExtractionRecord, bool)>) {
        for (record, _) in finalize_stack {
            cleanup_dir(&record.temp_dir);
            self.shared.bus.publish(ContainerFinalizeSkipped {
                path: record.original_path,
                reason: "Interrupted".to_owned(),
            });
        }
    }
}

// ── Per-file processing (worker task body) ───────────────────────────────────

enum CandidateOutcome {
    /// Last surviving temp file of the pipeline / smallest parallel result.
    Winner(PathBuf),
    /// Stop was observed mid-run; all intermediates removed.
    Interrupted,
    /// The chain aborted (pipe mode) or a stage could not be set up.
    Failed(String),
    /// Every parallel candidate failed; tolerated, nothing to accept.
    NoResult,
}

fn process_one_file(shared: &Shared, item: &WorkItem, token: &StopToken) {
    let path = &item.path;
    let bus = &shared.bus;

    if token.is_stop_requested() {
        bus.publish(FileProcessSkipped {
            path: path.clone(),
            reason: "Interrupted".to_owned(),
        });
        return;
    }

    bus.publish(FileProcessStart { path: path.clone() });

    let candidates: Vec<&dyn Processor> = shared
        .resolve_processors(path)
        .into_iter()
        .filter(|p| p.can_recompress())
        .collect();
    if candidates.is_empty() {
        log::warn!("no recompressing processor for {}", path.display());
        bus.publish(FileProcessSkipped {
            path: path.clone(),
            reason: "Unsupported format".to_owned(),
        });
        return;
    }

    let original_size = safe_file_size(path);
    let start = Instant::now();
    let outcome = match shared.settings.encode_mode {
        EncodeMode::Pipe => run_pipe(shared, path, &candidates, token),
        EncodeMode::Parallel => run_parallel(shared, path, &candidates, token),
    };
    let duration = start.elapsed();

    let winner = match outcome {
        CandidateOutcome::Winner(winner) => winner,
        CandidateOutcome::Interrupted => {
            bus.publish(FileProcessSkipped {
                path: path.clone(),
                reason: "Interrupted".to_owned(),
            });
            return;
        }
        CandidateOutcome::Failed(message) => {
            log::error!("processing failed for {}: {message}", path.display());
            bus.publish(FileProcessError {
                path: path.clone(),
                message,
            });
            return;
        }
        CandidateOutcome::NoResult => {
            bus.publish(FileProcessSkipped {
                path: path.clone(),
                reason: "No size improvement".to_owned(),
            });
            return;
        }
    };

    // Acceptance test: strictly smaller, and content-equivalent when
    // verification is on. The primary candidate defines equivalence.
    let new_size = safe_file_size(&winner);
    if new_size == 0 || new_size >= original_size {
        remove_file_quiet(&winner);
        bus.publish(FileProcessSkipped {
            path: path.clone(),
            reason: "No size improvement".to_owned(),
        });
        return;
    }
    if shared.settings.verify_checksums {
        let equal = candidates[0].raw_equal(path, &winner).unwrap_or_else(|e| {
            log::warn!("raw_equal failed for {}: {e}", path.display());
            false
        });
        if !equal {
            log::warn!("checksum mismatch for {}; keeping original", path.display());
            remove_file_quiet(&winner);
            bus.publish(FileProcessSkipped {
                path: path.clone(),
                reason: "Checksum mismatch".to_owned(),
            });
            return;
        }
    }

    apply_replacement(
        shared,
        ReplaceScope::Process,
        path,
        &winner,
        original_size,
        duration,
        item.embedded,
    );
}

/// Pipe mode: chain candidates left-to-right, each stage reading the
/// previous stage's output.
fn run_pipe(
    shared: &Shared,
    path: &Path,
    candidates: &[&dyn Processor],
    token: &StopToken,
) -> CandidateOutcome {
    let mut current = path.to_path_buf();
    let mut last_tmp: Option<PathBuf> = None;

    for (i, proc) in candidates.iter().enumerate() {
        if token.is_stop_requested() {
            if let Some(tmp) = last_tmp {
                remove_file_quiet(&tmp);
            }
            return CandidateOutcome::Interrupted;
        }

        let tmp = match make_temp_file(&proc.tag(), path, &format!("pipe.{i}")) {
            Ok(tmp) => tmp,
            Err(e) => {
                if let Some(tmp) = last_tmp {
                    remove_file_quiet(&tmp);
                }
                return CandidateOutcome::Failed(format!("temp file creation failed: {e}"));
            }
        };

        let stage = proc.recompress(&current, &tmp, shared.settings.preserve_metadata);
        let produced = safe_file_size(&tmp);
        match stage {
            Ok(()) if produced > 0 => {
                if current != *path {
                    remove_file_quiet(&current);
                }
                current = tmp.clone();
                last_tmp = Some(tmp);
            }
            Ok(()) => {
                remove_file_quiet(&tmp);
                if let Some(prev) = last_tmp {
                    remove_file_quiet(&prev);
                }
                return CandidateOutcome::Failed(format!(
                    "{} produced an empty output",
                    proc.name()
                ));
            }
            Err(e) => {
                remove_file_quiet(&tmp);
                if let Some(prev) = last_tmp {
                    remove_file_quiet(&prev);
                }
                return CandidateOutcome::Failed(format!("{}: {e}", proc.name()));
            }
        }
    }

    match last_tmp {
        Some(winner) => CandidateOutcome::Winner(winner),
        None => CandidateOutcome::Failed("empty pipeline".to_owned()),
    }
}

/// Parallel mode: every candidate runs against the original; keep the
/// smallest successful result. Individual failures are tolerated.
fn run_parallel(
    shared: &Shared,
    path: &Path,
    candidates: &[&dyn Processor],
    token: &StopToken,
) -> CandidateOutcome {
    let results: Vec<(PathBuf, u64)> = candidates
        .par_iter()
        .enumerate()
        .filter_map(|(i, proc)| {
            if token.is_stop_requested() {
                return None;
            }
            let tmp = match make_temp_file(&proc.tag(), path, &format!("cand.{i}")) {
                Ok(tmp) => tmp,
                Err(e) => {
                    log::warn!("temp file creation failed for {}: {e}", proc.name());
                    return None;
                }
            };
            match proc.recompress(path, &tmp, shared.settings.preserve_metadata) {
                Ok(()) => {
                    let size = safe_file_size(&tmp);
                    if size > 0 {
                        Some((tmp, size))
                    } else {
                        remove_file_quiet(&tmp);
                        None
                    }
                }
                Err(e) => {
                    log::warn!("candidate {} failed on {}: {e}", proc.name(), path.display());
                    remove_file_quiet(&tmp);
                    None
                }
            }
        })
        .collect();

    if token.is_stop_requested() {
        for (tmp, _) in results {
            remove_file_quiet(&tmp);
        }
        return CandidateOutcome::Interrupted;
    }

    let mut results = results;
    results.sort_by_key(|(_, size)| *size);
    let mut iter = results.into_iter();
    match iter.next() {
        Some((winner, _)) => {
            for (loser, _) in iter {
                remove_file_quiet(&loser);
            }
            CandidateOutcome::Winner(winner)
        }
        None => CandidateOutcome::NoResult,
    }
}

// ── Replacement policy ───────────────────────────────────────────────────────

/// Which phase invoked the policy; decides which terminal events the
/// policy publishes so Start/terminal pairing stays exact per phase.
#[derive(Clone, Copy)]
enum ReplaceScope {
    Process,
    Finalize,
}

/// The single code path that mutates user-visible files.
fn apply_replacement(
    shared: &Shared,
    scope: ReplaceScope,
    original: &Path,
    candidate: &Path,
    original_size: u64,
    duration: Duration,
    embedded: bool,
) {
    let bus = &shared.bus;
    let settings = &shared.settings;

    let new_size = safe_file_size(candidate);
    if new_size == 0 {
        log::warn!("candidate file is invalid or empty: {}", candidate.display());
        remove_file_quiet(candidate);
        publish_scope_error(
            bus,
            scope,
            original,
            "Failed to create optimized file".to_owned(),
        );
        return;
    }

    let stat = if settings.preserve_metadata {
        capture_file_stat(original)
    } else {
        None
    };

    let mut replaced = false;
    if settings.dry_run {
        log::info!("[dry-run] would replace {}", original.display());
        remove_file_quiet(candidate);
    } else {
        let (dest, delay) = match (&settings.output_dir, embedded) {
            (Some(dir), false) => {
                let name = original.file_name().unwrap_or(original.as_os_str());
                (dir.join(name), Duration::from_millis(250))
            }
            _ => (original.to_path_buf(), Duration::from_millis(500)),
        };
        match rename_with_retry(candidate, &dest, 10, delay) {
            Ok(()) => {
                replaced = true;
                if let Some(stat) = &stat {
                    if let Err(e) = apply_file_stat(&dest, stat) {
                        log::debug!("failed to restore metadata on {}: {e}", dest.display());
                    }
                }
            }
            Err(e) => {
                log::error!("rename failed for {}: {e}", original.display());
                remove_file_quiet(candidate);
                publish_scope_error(bus, scope, original, format!("Rename failed: {e}"));
                return;
            }
        }
    }

    match scope {
        ReplaceScope::Process => bus.publish(FileProcessComplete {
            path: original.to_path_buf(),
            original_size,
            new_size,
            replaced,
            duration,
        }),
        ReplaceScope::Finalize => bus.publish(ContainerFinalizeComplete {
            path: original.to_path_buf(),
            final_size: new_size,
        }),
    }
}

fn publish_scope_error(bus: &EventBus, scope: ReplaceScope, path: &Path, message: String) {
    match scope {
        ReplaceScope::Process => bus.publish(FileProcessError {
            path: path.to_path_buf(),
            message,
        }),
        ReplaceScope::Finalize => bus.publish(ContainerFinalizeError {
            path: path.to_path_buf(),
            message,
        }),
    }
}

/// Rename with a bounded retry loop for transient sharing/access errors,
/// and a copy+delete fallback when source and destination are on
/// different filesystems (the OS temp dir usually is).
fn rename_with_retry(
    src: &Path,
    dest: &Path,
    max_attempts: u32,
    delay: Duration,
) -> std::io::Result<()> {
    let mut attempt = 1;
    loop {
        match std::fs::rename(src, dest) {
            Ok(()) => return Ok(()),
            Err(e) if is_cross_device(&e) => return copy_then_remove(src, dest),
            Err(e) if attempt < max_attempts && is_transient(&e) => {
                log::debug!(
                    "rename to {} failed ({e}); retry {attempt}/{max_attempts} in {}ms",
                    dest.display(),
                    delay.as_millis()
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Sharing violations, access denials, and not-found races (antivirus and
/// indexer interference on some platforms) are worth retrying.
fn is_transient(e: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(e.kind(), ErrorKind::PermissionDenied | ErrorKind::NotFound)
        || e.raw_os_error() == Some(32)
}

#[cfg(unix)]
fn is_cross_device(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(libc::EXDEV)
}

#[cfg(windows)]
fn is_cross_device(e: &std::io::Error) -> bool {
    // ERROR_NOT_SAME_DEVICE
    e.raw_os_error() == Some(17)
}

fn copy_then_remove(src: &Path, dest: &Path) -> std::io::Result<()> {
    match std::fs::copy(src, dest) {
        Ok(_) => {
            remove_file_quiet(src);
            Ok(())
        }
        Err(e) => {
            remove_file_quiet(dest);
            Err(e)
        }
    }
}
