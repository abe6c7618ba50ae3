//! Capture and re-apply file attributes around replacement.
//!
//! When metadata preservation is on, the replacement policy snapshots the
//! original file's modification time and permission bits before the swap
//! and re-applies them to the replacement. Application is best-effort;
//! a file that shrank but lost its mtime beats no optimization at all.

use std::io;
use std::path::Path;

use filetime::FileTime;

/// Snapshot of the attributes worth carrying across a replacement.
#[derive(Debug, Clone)]
pub struct FileStat {
    mtime: FileTime,
    #[cfg(unix)]
    mode: u32,
}

/// Read the attributes of `path`, or `None` if it cannot be stat'ed.
pub fn capture_file_stat(path: &Path) -> Option<FileStat> {
    let meta = std::fs::metadata(path).ok()?;
    Some(FileStat {
        mtime: FileTime::from_last_modification_time(&meta),
        #[cfg(unix)]
        mode: {
            use std::os::unix::fs::PermissionsExt;
            meta.permissions().mode()
        },
    })
}

/// Apply a previously captured snapshot to `path`.
pub fn apply_file_stat(path: &Path, stat: &FileStat) -> io::Result<()> {
    filetime::set_file_mtime(path, stat.mtime)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(stat.mode & 0o7777))?;
    }
    Ok(())
}
