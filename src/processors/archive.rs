//! Container extraction and re-assembly for zip- and tar-family archives.
//!
//! `prepare_extraction` unpacks entries into a scratch directory with
//! path sanitization (hostile entry names are skipped, never written
//! outside the scratch dir) and records an ordered entry manifest in the
//! extraction record's extras. `finalize_extraction` replays the manifest
//! against the (possibly optimized) children, deflating at the maximum
//! level; the `mimetype` entry of epub/ODF documents stays first and
//! uncompressed, as their readers require. The rebuilt archive is only
//! offered for replacement when it is strictly smaller than the original.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use xxhash_rust::xxh64::{xxh64, Xxh64};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Error, Result};
use crate::format::ContainerFormat;
use crate::processor::{ExtractionRecord, Processor};
use crate::util::file_size::safe_file_size;
use crate::util::temp::{cleanup_dir, make_temp_dir, make_temp_file, remove_file_quiet};

pub struct ArchiveProcessor;

enum EntryKind {
    File,
    Dir,
    Symlink { target: String },
}

/// One archive entry, in original order. `name` is the sanitized
/// archive-internal path with forward slashes; it doubles as the entry's
/// relative location inside the scratch directory.
struct EntryMeta {
    name: String,
    kind: EntryKind,
    mode: Option<u32>,
    zip_time: Option<zip::DateTime>,
    mtime_secs: Option<u64>,
}

/// Opaque payload carried from prepare to finalize.
struct ArchiveManifest {
    entries: Vec<EntryMeta>,
}

/// Removes the scratch directory when dropped; finalize must clean up on
/// every exit path.
struct DirCleanup(PathBuf);

impl Drop for DirCleanup {
    fn drop(&mut self) {
        cleanup_dir(&self.0);
    }
}

fn zip_err(e: zip::result::ZipError) -> Error {
    Error::codec(format!("zip: {e}"))
}

/// Resolve the container format of `path`: sniffed MIME first, extension
/// second.
fn detect_format(path: &Path) -> ContainerFormat {
    if let Some(fmt) = crate::mime::detect(path)
        .as_deref()
        .and_then(ContainerFormat::from_mime)
    {
        return fmt;
    }
    crate::mime::extension_of(path)
        .and_then(|ext| ext.parse().ok())
        .unwrap_or(ContainerFormat::Unknown)
}

impl ArchiveProcessor {
    fn extract_zip(
        input: &Path,
        temp_dir: &Path,
    ) -> Result<(Vec<PathBuf>, ArchiveManifest)> {
        let mut archive = ZipArchive::new(File::open(input)?).map_err(zip_err)?;
        let mut files = Vec::new();
        let mut entries = Vec::new();

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(zip_err)?;
            let Some(rel) = entry.enclosed_name().map(|p| p.to_owned()) else {
                log::warn!("skipping suspicious archive entry: {}", entry.name());
                continue;
            };
            let name = rel.to_string_lossy().replace('\\', "/");
            let mode = entry.unix_mode();
            let zip_time = Some(entry.last_modified());

            if entry.is_dir() {
                std::fs::create_dir_all(temp_dir.join(&rel))?;
                entries.push(EntryMeta {
                    name,
                    kind: EntryKind::Dir,
                    mode,
                    zip_time,
                    mtime_secs: None,
                });
                continue;
            }

            let dest = temp_dir.join(&rel);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&dest)?;
            std::io::copy(&mut entry, &mut out)?;
            entries.push(EntryMeta {
                name,
                kind: EntryKind::File,
                mode,
                zip_time,
                mtime_secs: None,
            });
            files.push(dest);
        }

        Ok((files, ArchiveManifest { entries }))
    }

    fn extract_tar(
        input: &Path,
        temp_dir: &Path,
    ) -> Result<(Vec<PathBuf>, ArchiveManifest)> {
        let mut archive = tar::Archive::new(File::open(input)?);
        let mut files = Vec::new();
        let mut entries = Vec::new();

        for entry in archive.entries()? {
            let mut entry = entry?;
            let rel = entry.path()?.to_path_buf();
            let name = rel.to_string_lossy().replace('\\', "/");
            let mode = entry.header().mode().ok();
            let mtime_secs = entry.header().mtime().ok();

            match entry.header().entry_type() {
                tar::EntryType::Directory => {
                    std::fs::create_dir_all(temp_dir.join(&rel))?;
                    entries.push(EntryMeta {
                        name,
                        kind: EntryKind::Dir,
                        mode,
                        zip_time: None,
                        mtime_secs,
                    });
                }
                tar::EntryType::Symlink => {
                    let Some(target) = entry.link_name()? else {
                        continue;
                    };
                    entries.push(EntryMeta {
                        name,
                        kind: EntryKind::Symlink {
                            target: target.to_string_lossy().into_owned(),
                        },
                        mode,
                        zip_time: None,
                        mtime_secs,
                    });
                }
                tar::EntryType::Regular => {
                    // unpack_in refuses entries that would escape temp_dir.
                    if entry.unpack_in(temp_dir)? {
                        entries.push(EntryMeta {
                            name,
                            kind: EntryKind::File,
                            mode,
                            zip_time: None,
                            mtime_secs,
                        });
                        files.push(temp_dir.join(&rel));
                    } else {
                        log::warn!("skipping suspicious archive entry: {}", rel.display());
                    }
                }
                other => {
                    log::debug!("ignoring tar entry type {other:?}: {}", rel.display());
                }
            }
        }

        Ok((files, ArchiveManifest { entries }))
    }

    fn write_zip(out_path: &Path, temp_dir: &Path, manifest: &ArchiveManifest) -> Result<()> {
        let mut writer = ZipWriter::new(File::create(out_path)?);

        for entry in &manifest.entries {
            let mut options = FileOptions::default();
            if let Some(mode) = entry.mode {
                options = options.unix_permissions(mode);
            }
            if let Some(time) = entry.zip_time {
                options = options.last_modified_time(time);
            }
            match &entry.kind {
                EntryKind::Dir => {
                    writer
                        .add_directory(entry.name.as_str(), options)
                        .map_err(zip_err)?;
                }
                EntryKind::Symlink { target } => {
                    writer
                        .add_symlink(entry.name.as_str(), target.as_str(), options)
                        .map_err(zip_err)?;
                }
                EntryKind::File => {
                    // Document readers expect `mimetype` first and
                    // uncompressed; everything else gets maximum deflate.
                    let options = if entry.name == "mimetype" {
                        options.compression_method(CompressionMethod::Stored)
                    } else {
                        options
                            .compression_method(CompressionMethod::Deflated)
                            .compression_level(Some(9))
                    };
                    writer
                        .start_file(entry.name.as_str(), options)
                        .map_err(zip_err)?;
                    let mut src = File::open(temp_dir.join(&entry.name))?;
                    std::io::copy(&mut src, &mut writer)?;
                }
            }
        }

        writer.finish().map_err(zip_err)?;
        Ok(())
    }

    fn write_tar(out_path: &Path, temp_dir: &Path, manifest: &ArchiveManifest) -> Result<()> {
        let mut builder = tar::Builder::new(File::create(out_path)?);

        for entry in &manifest.entries {
            let mut header = tar::Header::new_gnu();
            header.set_mtime(entry.mtime_secs.unwrap_or(0));
            match &entry.kind {
                EntryKind::Dir => {
                    header.set_entry_type(tar::EntryType::Directory);
                    header.set_mode(entry.mode.unwrap_or(0o755));
                    header.set_size(0);
                    builder.append_data(&mut header, &entry.name, std::io::empty())?;
                }
                EntryKind::Symlink { target } => {
                    header.set_entry_type(tar::EntryType::Symlink);
                    header.set_mode(entry.mode.unwrap_or(0o777));
                    header.set_size(0);
                    builder.append_link(&mut header, &entry.name, target)?;
                }
                EntryKind::File => {
                    let mut src = File::open(temp_dir.join(&entry.name))?;
                    header.set_entry_type(tar::EntryType::Regular);
                    header.set_mode(entry.mode.unwrap_or(0o644));
                    header.set_size(src.metadata()?.len());
                    builder.append_data(&mut header, &entry.name, &mut src)?;
                }
            }
        }

        builder.finish()?;
        Ok(())
    }

    /// Fingerprint of the entry set: per-entry content hashes combined in
    /// name order, so compression levels and entry metadata don't matter.
    fn entry_hashes(path: &Path, format: ContainerFormat) -> Result<Vec<(String, u64)>> {
        let mut hashes = Vec::new();
        if format.is_zip_based() {
            let mut archive = ZipArchive::new(File::open(path)?).map_err(zip_err)?;
            for i in 0..archive.len() {
                let mut entry = archive.by_index(i).map_err(zip_err)?;
                if entry.is_dir() {
                    continue;
                }
                let name = entry.name().to_owned();
                let mut data = Vec::new();
                entry.read_to_end(&mut data)?;
                hashes.push((name, xxh64(&data, 0)));
            }
        } else if format.is_tar_based() {
            let mut archive = tar::Archive::new(File::open(path)?);
            for entry in archive.entries()? {
                let mut entry = entry?;
                if entry.header().entry_type() != tar::EntryType::Regular {
                    continue;
                }
                let name = entry.path()?.to_string_lossy().into_owned();
                let mut data = Vec::new();
                entry.read_to_end(&mut data)?;
                hashes.push((name, xxh64(&data, 0)));
            }
        }
        hashes.sort();
        Ok(hashes)
    }
}

impl Processor for ArchiveProcessor {
    fn name(&self) -> &'static str {
        "Archive"
    }

    fn supported_mime_types(&self) -> &'static [&'static str] {
        &[
            "application/zip",
            "application/x-zip-compressed",
            "application/epub+zip",
            "application/vnd.comicbook+zip",
            "application/java-archive",
            "application/x-xpinstall",
            "image/openraster",
            "model/vnd.dwfx+xps",
            "application/vnd.ms-xpsdocument",
            "application/oxps",
            "application/vnd.android.package-archive",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            "application/vnd.oasis.opendocument.text",
            "application/vnd.oasis.opendocument.spreadsheet",
            "application/vnd.oasis.opendocument.presentation",
            "application/vnd.oasis.opendocument.graphics",
            "application/vnd.oasis.opendocument.formula",
            "application/x-tar",
            "application/vnd.comicbook+tar",
        ]
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &[
            ".zip", ".epub", ".cbz", ".jar", ".xpi", ".ora", ".dwfx", ".xps", ".oxps", ".apk",
            ".docx", ".xlsx", ".pptx", ".ods", ".odt", ".odp", ".odg", ".odf", ".tar", ".cbt",
        ]
    }

    fn can_extract_contents(&self) -> bool {
        true
    }

    fn prepare_extraction(&self, input: &Path) -> Result<Option<ExtractionRecord>> {
        let format = detect_format(input);
        if !format.is_zip_based() && !format.is_tar_based() {
            return Ok(None);
        }

        let temp_dir = make_temp_dir(&self.tag(), input)?;
        let extracted = if format.is_zip_based() {
            Self::extract_zip(input, &temp_dir)
        } else {
            Self::extract_tar(input, &temp_dir)
        };

        match extracted {
            Ok((files, manifest)) if !files.is_empty() => Ok(Some(ExtractionRecord {
                original_path: input.to_path_buf(),
                temp_dir,
                extracted_files: files,
                format,
                extras: Some(Box::new(manifest)),
            })),
            Ok(_) => {
                cleanup_dir(&temp_dir);
                Ok(None)
            }
            Err(e) => {
                cleanup_dir(&temp_dir);
                Err(e)
            }
        }
    }

    fn finalize_extraction(
        &self,
        record: ExtractionRecord,
        fallback: ContainerFormat,
    ) -> Result<Option<PathBuf>> {
        let _cleanup = DirCleanup(record.temp_dir.clone());

        let target = if record.format.is_writable() {
            record.format
        } else if fallback != ContainerFormat::Unknown {
            fallback
        } else {
            log::info!(
                "{} is read-only and no fallback format is set; keeping original",
                record.format
            );
            return Ok(None);
        };

        let manifest = record
            .extras
            .and_then(|extras| extras.downcast::<ArchiveManifest>().ok())
            .ok_or_else(|| Error::codec("missing archive manifest"))?;

        let out_path = make_temp_file(&self.tag(), &record.original_path, "repack")?;
        let written = if target.is_zip_based() {
            Self::write_zip(&out_path, &record.temp_dir, &manifest)
        } else if target.is_tar_based() {
            Self::write_tar(&out_path, &record.temp_dir, &manifest)
        } else {
            Err(Error::codec(format!("cannot write {target} archives")))
        };

        match written {
            Ok(()) => {
                let new_size = safe_file_size(&out_path);
                let original_size = safe_file_size(&record.original_path);
                if new_size > 0 && new_size < original_size {
                    Ok(Some(out_path))
                } else {
                    remove_file_quiet(&out_path);
                    Ok(None)
                }
            }
            Err(e) => {
                remove_file_quiet(&out_path);
                Err(e)
            }
        }
    }

    fn raw_equal(&self, a: &Path, b: &Path) -> Result<bool> {
        Ok(Self::entry_hashes(a, detect_format(a))? == Self::entry_hashes(b, detect_format(b))?)
    }

    fn raw_checksum(&self, path: &Path) -> Result<String> {
        let hashes = Self::entry_hashes(path, detect_format(path))?;
        let mut hasher = Xxh64::new(0);
        for (name, hash) in &hashes {
            hasher.update(name.as_bytes());
            hasher.update(&hash.to_le_bytes());
        }
        Ok(format!("{:016x}", hasher.digest()))
    }
}
