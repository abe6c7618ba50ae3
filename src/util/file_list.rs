//! Input collection with directory expansion.
//!
//! Given the mixed list of paths from the command line, produce the flat
//! list of regular files the executor will analyze. Directories are
//! walked with the [`walkdir`] crate (depth 1 unless recursive); symlinks
//! are never followed. Filesystem junk (`.DS_Store`, `desktop.ini`,
//! AppleDouble `._*` files) is filtered here for directory walks and again
//! by the analyzer for direct inputs.
//!
//! The special input `-` spools stdin into a temp file and marks the set
//! as pipe mode: the CLI will stream the optimized bytes back to stdout.

use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Result of input collection.
pub struct InputSet {
    /// Regular files to analyze, in input order.
    pub files: Vec<PathBuf>,
    /// True when stdin was spooled; `files[0]` is the spool file.
    pub from_stdin: bool,
}

/// True for filesystem junk that should never be analyzed.
pub fn is_junk(path: &Path) -> bool {
    let Some(name) = path.file_name() else {
        return false;
    };
    let name = name.to_string_lossy().to_ascii_lowercase();
    name == ".ds_store" || name == "desktop.ini" || name.starts_with("._")
}

/// Expand CLI inputs into a flat list of regular files.
///
/// Missing inputs are logged and skipped; an empty result is the caller's
/// problem to report. `-` may appear at most once and spools stdin.
pub fn collect_input_files(inputs: &[PathBuf], recursive: bool) -> io::Result<InputSet> {
    let mut files = Vec::new();
    let mut from_stdin = false;

    for input in inputs {
        if input.as_os_str() == "-" {
            files.push(spool_stdin()?);
            from_stdin = true;
            continue;
        }
        if !input.exists() {
            log::error!("input not found: {}", input.display());
            continue;
        }
        if input.is_dir() {
            let max_depth = if recursive { usize::MAX } else { 1 };
            for entry in WalkDir::new(input).max_depth(max_depth) {
                let entry = entry.map_err(|e| {
                    e.io_error()
                        .map(|io| io::Error::new(io.kind(), io.to_string()))
                        .unwrap_or_else(|| io::Error::other(e.to_string()))
                })?;
                if entry.file_type().is_file() && !is_junk(entry.path()) {
                    files.push(entry.into_path());
                }
            }
        } else if input.is_file() && !is_junk(input) {
            files.push(input.clone());
        }
    }

    log::info!("collected {} input file(s)", files.len());
    Ok(InputSet { files, from_stdin })
}

/// Copy stdin into a `chisel-stdin-*` temp file and return its path.
fn spool_stdin() -> io::Result<PathBuf> {
    let file = tempfile::Builder::new()
        .prefix("chisel-stdin-")
        .suffix(".bin")
        .tempfile()?;
    let (mut handle, path) = file.keep().map_err(|e| e.error)?;
    io::copy(&mut io::stdin().lock(), &mut handle)?;
    Ok(path)
}
