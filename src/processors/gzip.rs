//! Gzip recompression.
//!
//! Decodes the stream and re-encodes it at the maximum deflate level.
//! With metadata preservation on, the original header's stored filename
//! and timestamp are carried over; otherwise the new member gets a bare
//! header. Multi-member streams decode to the concatenation of their
//! members and re-encode as a single member, which preserves the decoded
//! content exactly.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use flate2::read::{GzDecoder, MultiGzDecoder};
use flate2::{Compression, GzBuilder};
use xxhash_rust::xxh64::Xxh64;

use crate::error::{Error, Result};
use crate::processor::Processor;

pub struct GzipProcessor;

/// Filename and mtime from a gzip member header.
struct HeaderInfo {
    filename: Option<Vec<u8>>,
    mtime: u32,
}

impl GzipProcessor {
    fn read_header(bytes: &[u8]) -> Option<HeaderInfo> {
        let mut decoder = GzDecoder::new(bytes);
        // The header is parsed lazily; pull one byte to force it.
        let mut probe = [0u8; 1];
        let _ = decoder.read(&mut probe);
        decoder.header().map(|h| HeaderInfo {
            filename: h.filename().map(|f| f.to_vec()),
            mtime: h.mtime(),
        })
    }

    fn decode_all(bytes: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = MultiGzDecoder::new(bytes);
        let mut data = Vec::new();
        decoder
            .read_to_end(&mut data)
            .map_err(|e| Error::codec(format!("gzip decode failed: {e}")))?;
        Ok(data)
    }
}

impl Processor for GzipProcessor {
    fn name(&self) -> &'static str {
        "GZip"
    }

    fn supported_mime_types(&self) -> &'static [&'static str] {
        &["application/gzip", "application/x-gzip"]
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &[".gz"]
    }

    fn can_recompress(&self) -> bool {
        true
    }

    fn recompress(&self, input: &Path, output: &Path, preserve_metadata: bool) -> Result<()> {
        let bytes = std::fs::read(input)?;
        let data = Self::decode_all(&bytes)?;

        let out = BufWriter::new(File::create(output)?);
        let mut builder = GzBuilder::new();
        if preserve_metadata {
            if let Some(header) = Self::read_header(&bytes) {
                if let Some(name) = header.filename {
                    builder = builder.filename(name);
                }
                builder = builder.mtime(header.mtime);
            }
        }
        let mut encoder = builder.write(out, Compression::best());
        encoder.write_all(&data)?;
        encoder.finish()?.flush()?;
        Ok(())
    }

    fn raw_checksum(&self, path: &Path) -> Result<String> {
        let file = File::open(path)?;
        let mut decoder = MultiGzDecoder::new(file);
        let mut hasher = Xxh64::new(0);
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = decoder
                .read(&mut buf)
                .map_err(|e| Error::codec(format!("gzip decode failed: {e}")))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(format!("{:016x}", hasher.digest()))
    }
}
