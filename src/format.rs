//! Container format tags.
//!
//! [`ContainerFormat`] classifies every archive-like format the engine can
//! interact with. Each tag answers two questions: can a processor unpack it
//! ([`ContainerFormat::is_readable`]) and can a processor re-create it
//! ([`ContainerFormat::is_writable`]). Formats such as RAR or WIM are
//! readable but not writable; re-packing them requires the configured
//! fallback format.

use std::fmt;
use std::str::FromStr;

/// Known container formats, plus `Unknown` for everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerFormat {
    Zip,
    SevenZip,
    Tar,
    GZip,
    BZip2,
    Xz,
    Rar,
    Wim,
    Pdf,
    Docx,
    Xlsx,
    Pptx,
    Ods,
    Odt,
    Odp,
    Odg,
    Odf,
    Epub,
    Cbz,
    Cbt,
    Jar,
    Xpi,
    Ora,
    Dwfx,
    Xps,
    Apk,
    Iso,
    Cpio,
    Ar,
    Zstd,
    Unknown,
}

impl ContainerFormat {
    /// Canonical lowercase name (also the primary file extension, without
    /// the dot).
    pub fn as_str(self) -> &'static str {
        use ContainerFormat::*;
        match self {
            Zip => "zip",
            SevenZip => "7z",
            Tar => "tar",
            GZip => "gz",
            BZip2 => "bz2",
            Xz => "xz",
            Rar => "rar",
            Wim => "wim",
            Pdf => "pdf",
            Docx => "docx",
            Xlsx => "xlsx",
            Pptx => "pptx",
            Ods => "ods",
            Odt => "odt",
            Odp => "odp",
            Odg => "odg",
            Odf => "odf",
            Epub => "epub",
            Cbz => "cbz",
            Cbt => "cbt",
            Jar => "jar",
            Xpi => "xpi",
            Ora => "ora",
            Dwfx => "dwfx",
            Xps => "xps",
            Apk => "apk",
            Iso => "iso",
            Cpio => "cpio",
            Ar => "a",
            Zstd => "zst",
            Unknown => "unknown",
        }
    }

    /// Primary file extension, dot-prefixed.
    pub fn primary_extension(self) -> String {
        format!(".{}", self.as_str())
    }

    /// True if some processor can unpack this format.
    pub fn is_readable(self) -> bool {
        self != ContainerFormat::Unknown
    }

    /// True if some processor can re-create this format.
    ///
    /// RAR and WIM archives can only be read; 7z writing is too limited to
    /// rely on. Everything else known here round-trips.
    pub fn is_writable(self) -> bool {
        use ContainerFormat::*;
        !matches!(self, Rar | Wim | SevenZip | Unknown)
    }

    /// True for formats that are physically a zip archive (OOXML, ODF,
    /// epub, comic-book zip, Java/Mozilla/Android packages, OpenRaster,
    /// XPS).
    pub fn is_zip_based(self) -> bool {
        use ContainerFormat::*;
        matches!(
            self,
            Zip | Docx | Xlsx | Pptx | Ods | Odt | Odp | Odg | Odf | Epub | Cbz | Jar | Xpi
                | Ora | Dwfx | Xps | Apk
        )
    }

    /// True for formats that are physically a tar archive.
    pub fn is_tar_based(self) -> bool {
        matches!(self, ContainerFormat::Tar | ContainerFormat::Cbt)
    }

    /// Map a MIME type string to a format tag.
    pub fn from_mime(mime: &str) -> Option<ContainerFormat> {
        use ContainerFormat::*;
        let fmt = match mime {
            "application/zip" | "application/x-zip-compressed" => Zip,
            "application/x-7z-compressed" => SevenZip,
            "application/x-tar" => Tar,
            "application/gzip" | "application/x-gzip" => GZip,
            "application/x-bzip2" => BZip2,
            "application/x-xz" => Xz,
            "application/vnd.rar" | "application/x-rar-compressed" | "application/x-cbr"
            | "application/vnd.comicbook+rar" => Rar,
            "application/x-ms-wim" => Wim,
            "application/pdf" => Pdf,
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => Docx,
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => Xlsx,
            "application/vnd.ms-powerpoint"
            | "application/vnd.openxmlformats-officedocument.presentationml.presentation" => Pptx,
            "application/vnd.oasis.opendocument.spreadsheet" => Ods,
            "application/vnd.oasis.opendocument.text" => Odt,
            "application/vnd.oasis.opendocument.presentation" => Odp,
            "application/vnd.oasis.opendocument.graphics" => Odg,
            "application/vnd.oasis.opendocument.formula" => Odf,
            "application/epub+zip" => Epub,
            "application/vnd.comicbook+zip" => Cbz,
            "application/vnd.comicbook+tar" => Cbt,
            "application/java-archive" => Jar,
            "application/x-xpinstall" => Xpi,
            "image/openraster" => Ora,
            "model/vnd.dwfx+xps" => Dwfx,
            "application/vnd.ms-xpsdocument" | "application/oxps" => Xps,
            "application/vnd.android.package-archive" => Apk,
            "application/x-iso9660-image" => Iso,
            "application/x-cpio" => Cpio,
            "application/x-archive" => Ar,
            "application/zstd" | "application/x-zstd" => Zstd,
            _ => return None,
        };
        Some(fmt)
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContainerFormat {
    type Err = String;

    /// Parse a format name or file extension, case-insensitively and with
    /// or without a leading dot.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use ContainerFormat::*;
        let s = s.trim_start_matches('.').to_ascii_lowercase();
        let fmt = match s.as_str() {
            "zip" => Zip,
            "7z" | "cb7" => SevenZip,
            "tar" => Tar,
            "gz" | "gzip" | "tgz" => GZip,
            "bz2" | "bzip2" => BZip2,
            "xz" => Xz,
            "rar" | "cbr" => Rar,
            "wim" => Wim,
            "pdf" => Pdf,
            "docx" => Docx,
            "xlsx" => Xlsx,
            "pptx" => Pptx,
            "ods" => Ods,
            "odt" => Odt,
            "odp" => Odp,
            "odg" => Odg,
            "odf" => Odf,
            "epub" => Epub,
            "cbz" => Cbz,
            "cbt" => Cbt,
            "jar" => Jar,
            "xpi" => Xpi,
            "ora" => Ora,
            "dwfx" => Dwfx,
            "xps" | "oxps" => Xps,
            "apk" => Apk,
            "iso" => Iso,
            "cpio" => Cpio,
            "a" | "ar" | "lib" => Ar,
            "zst" | "zstd" | "tzst" => Zstd,
            _ => return Err(format!("unknown container format: {s}")),
        };
        Ok(fmt)
    }
}
