//! The processor contract every codec plug-in implements.
//!
//! A processor targets one file format (or a family of related formats),
//! describes itself through MIME types and extensions, and declares its
//! capabilities: direct recompression, container extraction, or both.
//! Implementations are stateless with respect to the files being
//! processed; any state that must survive from extraction to finalization
//! travels in [`ExtractionRecord::extras`].

use std::any::Any;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::format::ContainerFormat;

/// Bookkeeping for a container whose contents were extracted.
///
/// Produced by [`Processor::prepare_extraction`], consumed exactly once by
/// [`Processor::finalize_extraction`]. Every path in `extracted_files`
/// lies under `temp_dir`; the processor guarantees `temp_dir` is deleted
/// on every exit path of finalization, and the executor removes it if the
/// record is discarded by a cancelled run.
pub struct ExtractionRecord {
    /// The container being rebuilt.
    pub original_path: PathBuf,
    /// Scratch directory exclusively owned by this record.
    pub temp_dir: PathBuf,
    /// Absolute paths of the extracted children, in archive order.
    pub extracted_files: Vec<PathBuf>,
    /// Source container format.
    pub format: ContainerFormat,
    /// Opaque processor-defined payload (entry manifests, object maps, …).
    pub extras: Option<Box<dyn Any + Send>>,
}

/// A file-format plug-in.
pub trait Processor: Send + Sync {
    /// Human-readable name, e.g. "PNG" or "Archive".
    fn name(&self) -> &'static str;

    /// Supported MIME type strings, e.g. `"image/png"`.
    fn supported_mime_types(&self) -> &'static [&'static str];

    /// Supported extensions, dot-prefixed lowercase, e.g. `".png"`.
    fn supported_extensions(&self) -> &'static [&'static str];

    /// Lowercase tag used in temp file names (`chisel-<tag>-…`).
    fn tag(&self) -> String {
        self.name().to_ascii_lowercase()
    }

    /// True if this processor can perform direct lossless recompression.
    fn can_recompress(&self) -> bool {
        false
    }

    /// True if this processor can extract container contents.
    fn can_extract_contents(&self) -> bool {
        false
    }

    /// Rewrite `input` into `output` such that the decoded content is
    /// identical. Must not delete or modify `input`.
    fn recompress(&self, _input: &Path, _output: &Path, _preserve_metadata: bool) -> Result<()> {
        Err(Error::Unsupported)
    }

    /// Inspect `input`; if it is a container with processable children,
    /// extract them into a fresh temp directory and return the record.
    /// Returns `Ok(None)` — leaving no residue — when there is nothing
    /// useful to extract.
    fn prepare_extraction(&self, _input: &Path) -> Result<Option<ExtractionRecord>> {
        Ok(None)
    }

    /// Rebuild a container from the (possibly modified) children under
    /// `record.temp_dir`. Returns the path of a newly written temporary
    /// file, or `Ok(None)` to mean "no improvement; keep the original".
    /// The temp directory must be removed on every exit path.
    fn finalize_extraction(
        &self,
        record: ExtractionRecord,
        _fallback: ContainerFormat,
    ) -> Result<Option<PathBuf>> {
        crate::util::temp::cleanup_dir(&record.temp_dir);
        Err(Error::Unsupported)
    }

    /// Stable fingerprint of the decoded content. May be empty when the
    /// format has no meaningful notion of one; such processors must
    /// override [`Processor::raw_equal`].
    fn raw_checksum(&self, _path: &Path) -> Result<String> {
        Ok(String::new())
    }

    /// Content-level equivalence of two files (decode and compare).
    fn raw_equal(&self, a: &Path, b: &Path) -> Result<bool> {
        Ok(self.raw_checksum(a)? == self.raw_checksum(b)?)
    }
}
