// Round-trip laws for the built-in processors, driven through the
// executor with the real registry.
//
// R2 (codec losslessness): for every processor claiming recompression,
// the optimized file decodes to the same content as the original.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::{Compression, Crc};

use chisel::config::Settings;
use chisel::event_bus::EventBus;
use chisel::executor::Executor;
use chisel::processor::Processor;
use chisel::processors::{GzipProcessor, PngProcessor};
use chisel::registry::ProcessorRegistry;

fn run_builtin(inputs: &[PathBuf], settings: Settings) {
    let registry = Arc::new(ProcessorRegistry::with_builtin());
    let bus = Arc::new(EventBus::new());
    Executor::new(registry, settings, bus).unwrap().run(inputs);
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

/// A 32x8 grayscale PNG with its scanlines deflated at the given level.
fn write_png(path: &Path, level: Compression) {
    let ihdr = [0u8, 0, 0, 32, 0, 0, 0, 8, 8, 0, 0, 0, 0];
    let mut raw = Vec::new();
    for row in 0..8u8 {
        raw.push(0x00);
        raw.extend(std::iter::repeat(row * 16).take(32));
    }
    let mut encoder = ZlibEncoder::new(Vec::new(), level);
    encoder.write_all(&raw).unwrap();
    let idat = encoder.finish().unwrap();

    let mut png = Vec::new();
    png.extend_from_slice(&[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1A, b'\n']);
    write_chunk(&mut png, b"IHDR", &ihdr);
    write_chunk(&mut png, b"IDAT", &idat);
    write_chunk(&mut png, b"IEND", b"");
    std::fs::write(path, png).unwrap();
}

#[test]
fn png_survives_the_full_pipeline_losslessly() {
    let dir = tempfile::TempDir::new().unwrap();
    let input = dir.path().join("image.png");
    write_png(&input, Compression::none());
    let original = dir.path().join("image.orig.png");
    std::fs::copy(&input, &original).unwrap();
    let original_size = std::fs::metadata(&input).unwrap().len();

    run_builtin(
        &[input.clone()],
        Settings {
            num_threads: 1,
            ..Settings::default()
        },
    );

    assert!(std::fs::metadata(&input).unwrap().len() < original_size);
    assert!(PngProcessor.raw_equal(&original, &input).unwrap());
}

#[test]
fn gzip_survives_the_full_pipeline_losslessly() {
    let dir = tempfile::TempDir::new().unwrap();
    let input = dir.path().join("data.gz");
    let file = File::create(&input).unwrap();
    let mut encoder = GzEncoder::new(file, Compression::none());
    encoder.write_all(&b"round trip payload ".repeat(200)).unwrap();
    encoder.finish().unwrap();
    let original = dir.path().join("data.orig.gz");
    std::fs::copy(&input, &original).unwrap();
    let original_size = std::fs::metadata(&input).unwrap().len();

    run_builtin(
        &[input.clone()],
        Settings {
            num_threads: 1,
            verify_checksums: true,
            ..Settings::default()
        },
    );

    assert!(std::fs::metadata(&input).unwrap().len() < original_size);
    assert!(GzipProcessor.raw_equal(&original, &input).unwrap());
}

#[test]
fn already_optimal_files_are_never_grown() {
    let dir = tempfile::TempDir::new().unwrap();
    let png = dir.path().join("tight.png");
    write_png(&png, Compression::best());
    let gz = dir.path().join("tight.gz");
    let file = File::create(&gz).unwrap();
    let mut encoder = GzEncoder::new(file, Compression::best());
    encoder.write_all(&b"tight payload ".repeat(64)).unwrap();
    encoder.finish().unwrap();

    let before_png = std::fs::read(&png).unwrap();
    let before_gz = std::fs::read(&gz).unwrap();

    run_builtin(
        &[png.clone(), gz.clone()],
        Settings {
            num_threads: 2,
            ..Settings::default()
        },
    );

    // P5: a file that cannot improve must stay byte-identical.
    assert!(std::fs::read(&png).unwrap().len() <= before_png.len());
    assert!(std::fs::read(&gz).unwrap().len() <= before_gz.len());
}
