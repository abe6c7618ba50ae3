//! Size queries that never fail.

use std::path::Path;

/// Size of `path` in bytes, or 0 when the file cannot be stat'ed.
///
/// The executor treats a zero-byte candidate as a failed candidate, so
/// folding errors into 0 keeps every acceptance check a single comparison.
pub fn safe_file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_length_for_existing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("f.bin");
        std::fs::write(&path, b"12345").unwrap();
        assert_eq!(safe_file_size(&path), 5);
    }

    #[test]
    fn returns_zero_for_missing_file() {
        assert_eq!(safe_file_size(Path::new("/nonexistent/__chisel_size__")), 0);
    }
}
