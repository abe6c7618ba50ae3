// End-to-end tests through the public façade with the built-in
// processors: real gzip, PNG, and zip files on disk.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use flate2::write::GzEncoder;
use flate2::Compression;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use chisel::{Chisel, Observer};

/// A poorly compressed gzip file the engine is guaranteed to improve.
fn write_fat_gz(path: &Path, payload: &[u8]) {
    let file = File::create(path).unwrap();
    let mut encoder = GzEncoder::new(file, Compression::none());
    encoder.write_all(payload).unwrap();
    encoder.finish().unwrap();
}

#[test]
fn gzip_file_shrinks_and_observer_fires() {
    let dir = tempfile::TempDir::new().unwrap();
    let input = dir.path().join("notes.gz");
    let payload = b"observable test payload ".repeat(256);
    write_fat_gz(&input, &payload);
    let original_size = std::fs::metadata(&input).unwrap().len();

    let starts = Arc::new(AtomicUsize::new(0));
    let finishes = Arc::new(Mutex::new(Vec::new()));

    let mut engine = Chisel::new().threads(1);
    let s = Arc::clone(&starts);
    let f = Arc::clone(&finishes);
    engine.set_observer(Observer {
        on_file_start: Some(Box::new(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        })),
        on_file_finish: Some(Box::new(move |path, before, after, replaced| {
            f.lock()
                .unwrap()
                .push((path.to_path_buf(), before, after, replaced));
        })),
        ..Observer::default()
    });

    engine.recompress(&[&input]).unwrap();

    assert_eq!(starts.load(Ordering::SeqCst), 1);
    let finishes = finishes.lock().unwrap();
    assert_eq!(finishes.len(), 1);
    let (path, before, after, replaced) = &finishes[0];
    assert_eq!(path, &input);
    assert_eq!(*before, original_size);
    assert!(after < before);
    assert!(*replaced);
    assert_eq!(std::fs::metadata(&input).unwrap().len(), *after);
}

#[test]
fn second_run_is_idempotent() {
    let dir = tempfile::TempDir::new().unwrap();
    let input = dir.path().join("twice.gz");
    write_fat_gz(&input, &b"idempotence payload ".repeat(256));

    let engine = Chisel::new().threads(1);
    engine.recompress(&[&input]).unwrap();
    let after_first = std::fs::read(&input).unwrap();

    engine.recompress(&[&input]).unwrap();
    let after_second = std::fs::read(&input).unwrap();

    // No file may grow; an already optimal file stays byte-identical.
    assert!(after_second.len() <= after_first.len());
    if after_second.len() == after_first.len() {
        assert_eq!(after_first, after_second);
    }
}

#[test]
fn unsupported_file_is_left_alone() {
    let dir = tempfile::TempDir::new().unwrap();
    let note = dir.path().join("note.txt");
    std::fs::write(&note, "nothing to optimize here").unwrap();

    let errors = Arc::new(AtomicUsize::new(0));
    let mut engine = Chisel::new();
    let e = Arc::clone(&errors);
    engine.set_observer(Observer {
        on_file_error: Some(Box::new(move |_, _| {
            e.fetch_add(1, Ordering::SeqCst);
        })),
        ..Observer::default()
    });
    engine.recompress(&[&note]).unwrap();

    assert_eq!(errors.load(Ordering::SeqCst), 0);
    assert_eq!(
        std::fs::read_to_string(&note).unwrap(),
        "nothing to optimize here"
    );
}

#[test]
fn dry_run_never_touches_files() {
    let dir = tempfile::TempDir::new().unwrap();
    let input = dir.path().join("dry.gz");
    write_fat_gz(&input, &b"dry run payload ".repeat(128));
    let before = std::fs::read(&input).unwrap();

    let engine = Chisel::new().dry_run(true).threads(1);
    engine.recompress(&[&input]).unwrap();

    assert_eq!(std::fs::read(&input).unwrap(), before);
}

#[test]
fn verify_checksums_accepts_honest_codecs() {
    let dir = tempfile::TempDir::new().unwrap();
    let input = dir.path().join("verified.gz");
    write_fat_gz(&input, &b"verified payload ".repeat(256));
    let original_size = std::fs::metadata(&input).unwrap().len();

    let engine = Chisel::new().verify_checksums(true).threads(1);
    engine.recompress(&[&input]).unwrap();

    assert!(std::fs::metadata(&input).unwrap().len() < original_size);
}

#[test]
fn zip_with_compressible_child_shrinks_after_finalize() {
    // Scenario: a zip container holding a poorly compressed gzip member.
    // The child is recompressed inside the scratch dir, then the
    // container is re-assembled smaller.
    let dir = tempfile::TempDir::new().unwrap();
    let pack = dir.path().join("pack.zip");

    let mut gz_bytes = Vec::new();
    let mut encoder = GzEncoder::new(&mut gz_bytes, Compression::none());
    encoder
        .write_all(&b"zip child payload ".repeat(512))
        .unwrap();
    encoder.finish().unwrap();

    let mut writer = ZipWriter::new(File::create(&pack).unwrap());
    let stored = FileOptions::default().compression_method(CompressionMethod::Stored);
    writer.start_file("inner.gz", stored).unwrap();
    writer.write_all(&gz_bytes).unwrap();
    writer.finish().unwrap();

    let original_size = std::fs::metadata(&pack).unwrap().len();

    let engine = Chisel::new().threads(2);
    engine.recompress(&[&pack]).unwrap();

    assert!(
        std::fs::metadata(&pack).unwrap().len() < original_size,
        "container must shrink after its child was optimized"
    );

    // The result is still a readable zip with the same entry set.
    let mut zip = zip::ZipArchive::new(File::open(&pack).unwrap()).unwrap();
    assert_eq!(zip.len(), 1);
    assert_eq!(zip.by_index(0).unwrap().name(), "inner.gz");
}

#[test]
fn stop_without_active_run_is_a_no_op() {
    let engine = Chisel::new();
    engine.stop();
    engine.stop_handle().stop();
}

#[test]
fn empty_input_list_returns_ok() {
    let engine = Chisel::new();
    let paths: [&Path; 0] = [];
    engine.recompress(&paths).unwrap();
}
