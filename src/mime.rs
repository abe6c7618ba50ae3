//! File type detection.
//!
//! Detection is content-first: the file's leading bytes are matched
//! against a signature table, with a user-extensible table installed under
//! the per-user data directory taking precedence over the built-ins. A
//! generic zip signature is refined through the extension map so that
//! OOXML/ODF/epub documents keep their specific MIME types. Extension
//! lookup is exposed separately; the executor uses it as a fallback when
//! no processor claims the sniffed type.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Bundled copy of the user-editable magic table, installed on first run.
const BUNDLED_MAGIC_TABLE: &str = include_str!("../data/magic.table");

/// How many leading bytes are enough for every signature we know
/// (the tar magic sits at offset 257).
const SNIFF_LEN: usize = 512;

/// Built-in content signatures: (offset, magic bytes, MIME type).
const SIGNATURES: &[(usize, &[u8], &str)] = &[
    (0, b"\x89PNG\r\n\x1a\n", "image/png"),
    (0, &[0xFF, 0xD8, 0xFF], "image/jpeg"),
    (0, b"GIF87a", "image/gif"),
    (0, b"GIF89a", "image/gif"),
    (0, b"PK\x03\x04", "application/zip"),
    (0, &[0x1F, 0x8B], "application/gzip"),
    (0, b"BZh", "application/x-bzip2"),
    (0, b"\xFD7zXZ\x00", "application/x-xz"),
    (0, b"7z\xBC\xAF\x27\x1C", "application/x-7z-compressed"),
    (0, b"Rar!\x1A\x07", "application/vnd.rar"),
    (0, &[0x28, 0xB5, 0x2F, 0xFD], "application/zstd"),
    (0, b"%PDF", "application/pdf"),
    (0, b"fLaC", "audio/flac"),
    (0, b"wvpk", "audio/x-wavpack"),
    (0, b"MAC ", "audio/x-ape"),
    (0, b"OggS", "audio/ogg"),
    (0, b"ID3", "audio/mpeg"),
    (0, &[0x1A, 0x45, 0xDF, 0xA3], "video/x-matroska"),
    (0, b"SQLite format 3\x00", "application/vnd.sqlite3"),
    (0, b"BM", "image/bmp"),
    (0, b"II*\x00", "image/tiff"),
    (0, b"MM\x00*", "image/tiff"),
    (0, b"\xFF\x0A", "image/jxl"),
    (0, b"!<arch>\n", "application/x-archive"),
    (257, b"ustar", "application/x-tar"),
];

/// Extension → primary MIME type table (dot-prefixed lowercase keys).
const EXT_TO_MIME: &[(&str, &str)] = &[
    // archives
    (".zip", "application/zip"),
    (".7z", "application/x-7z-compressed"),
    (".cb7", "application/x-7z-compressed"),
    (".tar", "application/x-tar"),
    (".gz", "application/gzip"),
    (".bz2", "application/x-bzip2"),
    (".xz", "application/x-xz"),
    (".wim", "application/x-ms-wim"),
    (".rar", "application/vnd.rar"),
    (".cbr", "application/vnd.comicbook+rar"),
    (".iso", "application/x-iso9660-image"),
    (".cpio", "application/x-cpio"),
    (".epub", "application/epub+zip"),
    (".cbz", "application/vnd.comicbook+zip"),
    (".cbt", "application/vnd.comicbook+tar"),
    (".jar", "application/java-archive"),
    (".xpi", "application/x-xpinstall"),
    (".ora", "image/openraster"),
    (".dwfx", "model/vnd.dwfx+xps"),
    (".xps", "application/vnd.ms-xpsdocument"),
    (".oxps", "application/oxps"),
    (".apk", "application/vnd.android.package-archive"),
    (".zst", "application/zstd"),
    // images
    (".jpg", "image/jpeg"),
    (".jpeg", "image/jpeg"),
    (".png", "image/png"),
    (".jxl", "image/jxl"),
    (".tif", "image/tiff"),
    (".tiff", "image/tiff"),
    (".webp", "image/webp"),
    (".gif", "image/gif"),
    (".bmp", "image/bmp"),
    (".svg", "image/svg+xml"),
    // documents
    (
        ".docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    (
        ".xlsx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
    (
        ".pptx",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    ),
    (".odt", "application/vnd.oasis.opendocument.text"),
    (".ods", "application/vnd.oasis.opendocument.spreadsheet"),
    (".odp", "application/vnd.oasis.opendocument.presentation"),
    (".odg", "application/vnd.oasis.opendocument.graphics"),
    (".odf", "application/vnd.oasis.opendocument.formula"),
    (".pdf", "application/pdf"),
    // databases
    (".sqlite", "application/vnd.sqlite3"),
    (".db", "application/vnd.sqlite3"),
    // audio
    (".flac", "audio/flac"),
    (".wv", "audio/x-wavpack"),
    (".wvp", "audio/x-wavpack"),
    (".wvc", "audio/x-wavpack"),
    (".mp3", "audio/mpeg"),
    (".wav", "audio/wav"),
    (".ape", "audio/x-ape"),
    (".ogg", "audio/ogg"),
    // video containers
    (".mkv", "video/x-matroska"),
    (".webm", "video/webm"),
];

/// A signature loaded from the installed user magic table.
struct UserSignature {
    offset: usize,
    magic: Vec<u8>,
    mime: String,
}

fn user_signatures() -> &'static [UserSignature] {
    static LOADED: OnceLock<Vec<UserSignature>> = OnceLock::new();
    LOADED.get_or_init(|| {
        let Some(path) = magic_table_path() else {
            return Vec::new();
        };
        let Ok(content) = std::fs::read_to_string(&path) else {
            return Vec::new();
        };
        parse_magic_table(&content)
    })
}

/// Parse `mime<TAB>offset<TAB>hexbytes` lines; `#` starts a comment.
fn parse_magic_table(content: &str) -> Vec<UserSignature> {
    let mut sigs = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split('\t');
        let (Some(mime), Some(offset), Some(hex)) = (parts.next(), parts.next(), parts.next())
        else {
            continue;
        };
        let Ok(offset) = offset.parse::<usize>() else {
            continue;
        };
        let Some(magic) = decode_hex(hex) else {
            continue;
        };
        if magic.is_empty() || offset + magic.len() > SNIFF_LEN {
            continue;
        }
        sigs.push(UserSignature {
            offset,
            magic,
            mime: mime.to_owned(),
        });
    }
    sigs
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    let s: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

/// Detect the MIME type of a file by content.
///
/// Returns `None` when the file cannot be read or no signature matches.
pub fn detect(path: &Path) -> Option<String> {
    let mut head = [0u8; SNIFF_LEN];
    let read = {
        let mut file = File::open(path).ok()?;
        read_head(&mut file, &mut head).ok()?
    };
    let head = &head[..read];
    detect_bytes(head).map(|mime| {
        if mime == "application/zip" {
            refine_zip_mime(path)
        } else {
            mime.to_owned()
        }
    })
}

/// Match sniffed bytes against the user table, then the built-ins.
pub fn detect_bytes(head: &[u8]) -> Option<&str> {
    for sig in user_signatures() {
        if matches_at(head, sig.offset, &sig.magic) {
            return Some(&sig.mime);
        }
    }
    // RIFF needs a secondary tag at offset 8.
    if matches_at(head, 0, b"RIFF") && head.len() >= 12 {
        match &head[8..12] {
            b"WEBP" => return Some("image/webp"),
            b"WAVE" => return Some("audio/wav"),
            _ => {}
        }
    }
    for (offset, magic, mime) in SIGNATURES {
        if matches_at(head, *offset, magic) {
            return Some(mime);
        }
    }
    None
}

fn matches_at(head: &[u8], offset: usize, magic: &[u8]) -> bool {
    head.len() >= offset + magic.len() && &head[offset..offset + magic.len()] == magic
}

fn read_head(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = file.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

/// A zip signature can be a plain archive or any of the zip-packaged
/// document formats; trust the extension when it names one of those.
fn refine_zip_mime(path: &Path) -> String {
    if let Some(mime) = extension_of(path).and_then(|ext| mime_for_extension(&ext)) {
        if crate::format::ContainerFormat::from_mime(mime)
            .map(|f| f.is_zip_based())
            .unwrap_or(false)
        {
            return mime.to_owned();
        }
    }
    "application/zip".to_owned()
}

/// Primary MIME type for a dot-prefixed extension, case-insensitive.
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let ext = ext.to_ascii_lowercase();
    EXT_TO_MIME
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, m)| *m)
}

/// Dot-prefixed lowercase extension of `path`, if any.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_ascii_lowercase()))
}

// ── Magic table installation ─────────────────────────────────────────────────

/// Platform-conventional per-user data directory for chisel.
pub fn data_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|d| PathBuf::from(d).join("chisel"))
    }
    #[cfg(target_os = "macos")]
    {
        home::home_dir().map(|h| h.join("Library/Application Support/chisel"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        match std::env::var_os("XDG_DATA_HOME") {
            Some(d) if !d.is_empty() => Some(PathBuf::from(d).join("chisel")),
            _ => home::home_dir().map(|h| h.join(".local/share/chisel")),
        }
    }
}

/// Location of the installed user magic table.
pub fn magic_table_path() -> Option<PathBuf> {
    data_dir().map(|d| d.join("magic.table"))
}

/// Install the bundled magic table into the data directory. With `force`
/// the installed copy is overwritten; otherwise it is only written when
/// missing. Returns the installed path.
pub fn install_magic_table(force: bool) -> std::io::Result<PathBuf> {
    let path = magic_table_path().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, "no user data directory")
    })?;
    if force || !path.exists() {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, BUNDLED_MAGIC_TABLE)?;
        log::info!("installed magic table at {}", path.display());
    }
    Ok(path)
}
