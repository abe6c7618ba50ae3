//! PNG recompression.
//!
//! The filtered scanline stream inside the IDAT chunks is inflated and
//! re-deflated at the maximum level, then written back as a single IDAT
//! chunk. The pixel data is untouched, so the result decodes identically.
//! Without metadata preservation the textual/ancillary metadata chunks
//! (tEXt, zTXt, iTXt, tIME, eXIf) are dropped as well.

use std::io::{Read, Write};
use std::path::Path;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::{Compression, Crc};
use xxhash_rust::xxh64::xxh64;

use crate::error::{Error, Result};
use crate::processor::Processor;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1A, b'\n'];

/// Ancillary chunks treated as metadata.
const METADATA_CHUNKS: [&[u8; 4]; 5] = [b"tEXt", b"zTXt", b"iTXt", b"tIME", b"eXIf"];

struct Chunk {
    kind: [u8; 4],
    data: Vec<u8>,
}

pub struct PngProcessor;

impl PngProcessor {
    fn parse_chunks(bytes: &[u8]) -> Result<Vec<Chunk>> {
        if bytes.len() < PNG_SIGNATURE.len() || bytes[..8] != PNG_SIGNATURE {
            return Err(Error::codec("not a PNG file"));
        }
        let mut chunks = Vec::new();
        let mut offset = 8;
        while offset + 8 <= bytes.len() {
            let len = u32::from_be_bytes(bytes[offset..offset + 4].try_into().unwrap()) as usize;
            let kind: [u8; 4] = bytes[offset + 4..offset + 8].try_into().unwrap();
            let data_start = offset + 8;
            let data_end = data_start + len;
            // 4 trailing CRC bytes follow the data.
            if data_end + 4 > bytes.len() {
                return Err(Error::codec("truncated PNG chunk"));
            }
            chunks.push(Chunk {
                kind,
                data: bytes[data_start..data_end].to_vec(),
            });
            offset = data_end + 4;
            if &kind == b"IEND" {
                break;
            }
        }
        if !chunks.iter().any(|c| &c.kind == b"IEND") {
            return Err(Error::codec("PNG missing IEND chunk"));
        }
        Ok(chunks)
    }

    fn concat_idat(chunks: &[Chunk]) -> Vec<u8> {
        let mut idat = Vec::new();
        for chunk in chunks.iter().filter(|c| &c.kind == b"IDAT") {
            idat.extend_from_slice(&chunk.data);
        }
        idat
    }

    fn inflate(idat: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = ZlibDecoder::new(idat);
        let mut raw = Vec::new();
        decoder
            .read_to_end(&mut raw)
            .map_err(|e| Error::codec(format!("IDAT inflate failed: {e}")))?;
        Ok(raw)
    }

    fn write_chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(kind);
        out.extend_from_slice(data);
        let mut crc = Crc::new();
        crc.update(kind);
        crc.update(data);
        out.extend_from_slice(&crc.sum().to_be_bytes());
    }
}

impl Processor for PngProcessor {
    fn name(&self) -> &'static str {
        "PNG"
    }

    fn supported_mime_types(&self) -> &'static [&'static str] {
        &["image/png"]
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &[".png"]
    }

    fn can_recompress(&self) -> bool {
        true
    }

    fn recompress(&self, input: &Path, output: &Path, preserve_metadata: bool) -> Result<()> {
        let bytes = std::fs::read(input)?;
        let chunks = Self::parse_chunks(&bytes)?;

        let idat = Self::concat_idat(&chunks);
        if idat.is_empty() {
            return Err(Error::codec("PNG has no image data"));
        }
        let raw = Self::inflate(&idat)?;

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(&raw)?;
        let recompressed = encoder.finish()?;

        // Keep whichever deflate stream is shorter.
        let new_idat = if recompressed.len() < idat.len() {
            recompressed
        } else {
            idat
        };

        let mut out = Vec::with_capacity(bytes.len());
        out.extend_from_slice(&PNG_SIGNATURE);
        let mut idat_written = false;
        for chunk in &chunks {
            if &chunk.kind == b"IDAT" {
                if !idat_written {
                    Self::write_chunk(&mut out, b"IDAT", &new_idat);
                    idat_written = true;
                }
                continue;
            }
            if !preserve_metadata && METADATA_CHUNKS.contains(&&chunk.kind) {
                continue;
            }
            Self::write_chunk(&mut out, &chunk.kind, &chunk.data);
        }

        std::fs::write(output, out)?;
        Ok(())
    }

    fn raw_checksum(&self, path: &Path) -> Result<String> {
        let bytes = std::fs::read(path)?;
        let chunks = Self::parse_chunks(&bytes)?;
        let ihdr = chunks
            .iter()
            .find(|c| &c.kind == b"IHDR")
            .ok_or_else(|| Error::codec("PNG missing IHDR chunk"))?;
        let raw = Self::inflate(&Self::concat_idat(&chunks))?;

        let mut decoded = ihdr.data.clone();
        decoded.extend_from_slice(&raw);
        Ok(format!("{:016x}", xxh64(&decoded, 0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 1x1 grayscale PNG with the IDAT stream deflated at the given level.
    fn make_png(level: Compression, with_text: bool) -> Vec<u8> {
        // IHDR: 1x1, 8-bit grayscale, default compression/filter, no interlace
        let ihdr = [0u8, 0, 0, 1, 0, 0, 0, 1, 8, 0, 0, 0, 0];
        // One scanline: filter byte + one gray pixel.
        let raw = vec![0x00, 0x80];
        let mut encoder = ZlibEncoder::new(Vec::new(), level);
        encoder.write_all(&raw).unwrap();
        let idat = encoder.finish().unwrap();

        let mut png = Vec::new();
        png.extend_from_slice(&PNG_SIGNATURE);
        PngProcessor::write_chunk(&mut png, b"IHDR", &ihdr);
        if with_text {
            PngProcessor::write_chunk(&mut png, b"tEXt", b"Comment\0generated");
        }
        PngProcessor::write_chunk(&mut png, b"IDAT", &idat);
        PngProcessor::write_chunk(&mut png, b"IEND", b"");
        png
    }

    #[test]
    fn recompress_keeps_decoded_content() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("img.png");
        let output = dir.path().join("img.out.png");
        std::fs::write(&input, make_png(Compression::none(), false)).unwrap();

        let p = PngProcessor;
        p.recompress(&input, &output, true).unwrap();
        assert!(p.raw_equal(&input, &output).unwrap());
    }

    #[test]
    fn stored_idat_shrinks_at_best_level() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("big.png");
        let output = dir.path().join("big.out.png");

        // A wider image with redundant scanlines compresses well.
        let ihdr = [0u8, 0, 0, 64, 0, 0, 0, 16, 8, 0, 0, 0, 0];
        let mut raw = Vec::new();
        for _ in 0..16 {
            raw.push(0x00);
            raw.extend(std::iter::repeat(0xAB).take(64));
        }
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::none());
        encoder.write_all(&raw).unwrap();
        let idat = encoder.finish().unwrap();
        let mut png = Vec::new();
        png.extend_from_slice(&PNG_SIGNATURE);
        PngProcessor::write_chunk(&mut png, b"IHDR", &ihdr);
        PngProcessor::write_chunk(&mut png, b"IDAT", &idat);
        PngProcessor::write_chunk(&mut png, b"IEND", b"");
        std::fs::write(&input, &png).unwrap();

        let p = PngProcessor;
        p.recompress(&input, &output, true).unwrap();
        assert!(
            std::fs::metadata(&output).unwrap().len() < std::fs::metadata(&input).unwrap().len()
        );
        assert!(p.raw_equal(&input, &output).unwrap());
    }

    #[test]
    fn metadata_chunks_are_dropped_on_request() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("meta.png");
        let kept = dir.path().join("kept.png");
        let stripped = dir.path().join("stripped.png");
        std::fs::write(&input, make_png(Compression::best(), true)).unwrap();

        let p = PngProcessor;
        p.recompress(&input, &kept, true).unwrap();
        p.recompress(&input, &stripped, false).unwrap();

        let has_text = |path: &Path| {
            let bytes = std::fs::read(path).unwrap();
            PngProcessor::parse_chunks(&bytes)
                .unwrap()
                .iter()
                .any(|c| &c.kind == b"tEXt")
        };
        assert!(has_text(&kept));
        assert!(!has_text(&stripped));
        // Stripping never changes the decoded content.
        assert!(p.raw_equal(&input, &stripped).unwrap());
    }

    #[test]
    fn multiple_idat_chunks_are_merged() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("split.png");
        let output = dir.path().join("merged.png");

        let ihdr = [0u8, 0, 0, 1, 0, 0, 0, 1, 8, 0, 0, 0, 0];
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(&[0x00, 0x80]).unwrap();
        let idat = encoder.finish().unwrap();
        let (first, second) = idat.split_at(idat.len() / 2);

        let mut png = Vec::new();
        png.extend_from_slice(&PNG_SIGNATURE);
        PngProcessor::write_chunk(&mut png, b"IHDR", &ihdr);
        PngProcessor::write_chunk(&mut png, b"IDAT", first);
        PngProcessor::write_chunk(&mut png, b"IDAT", second);
        PngProcessor::write_chunk(&mut png, b"IEND", b"");
        std::fs::write(&input, &png).unwrap();

        let p = PngProcessor;
        p.recompress(&input, &output, true).unwrap();

        let out_bytes = std::fs::read(&output).unwrap();
        let idat_count = PngProcessor::parse_chunks(&out_bytes)
            .unwrap()
            .iter()
            .filter(|c| &c.kind == b"IDAT")
            .count();
        assert_eq!(idat_count, 1);
        assert!(p.raw_equal(&input, &output).unwrap());
    }

    #[test]
    fn non_png_input_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("not.png");
        std::fs::write(&input, b"definitely not a png").unwrap();
        let p = PngProcessor;
        assert!(p.recompress(&input, &dir.path().join("o.png"), true).is_err());
        assert!(p.raw_checksum(&input).is_err());
    }
}
