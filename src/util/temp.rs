//! Temp file and temp directory helpers.
//!
//! Every scratch path the engine creates lives in the OS temp directory
//! and carries a `chisel-<tag>-` prefix plus a random component, so
//! concurrent tasks working on identically named files never collide.
//! Paths are detached from their `tempfile` guards because their lifetime
//! spans phases; cleanup is explicit.

use std::io;
use std::path::{Path, PathBuf};

/// Create a unique scratch directory for processing `input`.
///
/// The directory is named `chisel-<tag>-<stem>-<random>` and is owned by
/// the caller; it is not removed automatically.
pub fn make_temp_dir(tag: &str, input: &Path) -> io::Result<PathBuf> {
    let dir = tempfile::Builder::new()
        .prefix(&format!("chisel-{}-{}-", tag, stem_of(input)))
        .tempdir()?;
    Ok(dir.keep())
}

/// Create a unique, empty temp file for a candidate output.
///
/// `label` distinguishes pipeline stages and parallel candidates, e.g.
/// `pipe.0` or `cand.2`. The file is named
/// `chisel-<tag>-<stem>.<label>.<random>.tmp` and owned by the caller.
pub fn make_temp_file(tag: &str, input: &Path, label: &str) -> io::Result<PathBuf> {
    let file = tempfile::Builder::new()
        .prefix(&format!("chisel-{}-{}.{}.", tag, stem_of(input), label))
        .suffix(".tmp")
        .tempfile()?;
    let (_, path) = file.keep().map_err(|e| e.error)?;
    Ok(path)
}

/// Remove a scratch directory, logging (but swallowing) failures.
pub fn cleanup_dir(dir: &Path) {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("failed to remove temp dir {}: {e}", dir.display()),
    }
}

/// Remove a temp file, ignoring a missing one.
pub fn remove_file_quiet(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => log::debug!("failed to remove temp file {}: {e}", path.display()),
    }
}

fn stem_of(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_owned())
}
