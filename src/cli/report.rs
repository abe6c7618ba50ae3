//! CSV report generation.
//!
//! Rows are collected from bus events during the run and written once at
//! the end: one row per processed input, followed by one row per
//! finalized container. The CSV is the structured source of truth for a
//! run; the console and log file are for humans.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::config::EncodeMode;
use crate::event_bus::EventBus;
use crate::events::{
    ContainerFinalizeComplete, ContainerFinalizeError, FileProcessComplete, FileProcessError,
};

#[derive(Debug, Clone)]
pub struct FileRow {
    pub path: PathBuf,
    pub mime: String,
    pub size_before: u64,
    pub size_after: u64,
    pub success: bool,
    pub replaced: bool,
    pub seconds: f64,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct ContainerRow {
    pub filename: PathBuf,
    pub success: bool,
    pub size_after: u64,
    pub error: String,
}

/// Collects result rows from bus events.
#[derive(Default)]
pub struct ReportCollector {
    files: Mutex<Vec<FileRow>>,
    containers: Mutex<Vec<ContainerRow>>,
}

impl ReportCollector {
    pub fn new() -> Arc<Self> {
        Arc::new(ReportCollector::default())
    }

    /// Subscribe the collector to every reportable event.
    pub fn attach(self: &Arc<Self>, bus: &Arc<EventBus>) {
        {
            let collector = Arc::clone(self);
            bus.subscribe::<FileProcessComplete>(move |e| {
                collector.files.lock().unwrap().push(FileRow {
                    path: e.path.clone(),
                    mime: crate::mime::detect(&e.path).unwrap_or_default(),
                    size_before: e.original_size,
                    size_after: e.new_size,
                    success: true,
                    replaced: e.replaced,
                    seconds: e.duration.as_secs_f64(),
                    error: String::new(),
                });
            });
        }
        {
            let collector = Arc::clone(self);
            bus.subscribe::<FileProcessError>(move |e| {
                collector.files.lock().unwrap().push(FileRow {
                    path: e.path.clone(),
                    mime: crate::mime::detect(&e.path).unwrap_or_default(),
                    size_before: 0,
                    size_after: 0,
                    success: false,
                    replaced: false,
                    seconds: 0.0,
                    error: e.message.clone(),
                });
            });
        }
        {
            let collector = Arc::clone(self);
            bus.subscribe::<ContainerFinalizeComplete>(move |e| {
                // The container may also appear as a processed file; keep
                // its final size in sync.
                let mut files = collector.files.lock().unwrap();
                if let Some(row) = files.iter_mut().find(|r| r.path == e.path) {
                    row.size_after = e.final_size;
                }
                drop(files);
                collector.containers.lock().unwrap().push(ContainerRow {
                    filename: e.path.clone(),
                    success: true,
                    size_after: e.final_size,
                    error: String::new(),
                });
            });
        }
        {
            let collector = Arc::clone(self);
            bus.subscribe::<ContainerFinalizeError>(move |e| {
                collector.containers.lock().unwrap().push(ContainerRow {
                    filename: e.path.clone(),
                    success: false,
                    size_after: 0,
                    error: e.message.clone(),
                });
            });
        }
    }

    /// Write the collected rows as CSV.
    pub fn write_csv(
        &self,
        path: &Path,
        total_seconds: f64,
        mode: EncodeMode,
    ) -> io::Result<()> {
        let mut out = std::fs::File::create(path)?;
        let mode = match mode {
            EncodeMode::Pipe => "pipe",
            EncodeMode::Parallel => "parallel",
        };
        writeln!(out, "# chisel report: mode={mode} total_seconds={total_seconds:.3}")?;

        writeln!(
            out,
            "path,mime,size_before,size_after,success,replaced,seconds,error"
        )?;
        for row in self.files.lock().unwrap().iter() {
            writeln!(
                out,
                "{},{},{},{},{},{},{:.3},{}",
                csv_field(&row.path.display().to_string()),
                csv_field(&row.mime),
                row.size_before,
                row.size_after,
                row.success,
                row.replaced,
                row.seconds,
                csv_field(&row.error),
            )?;
        }

        let containers = self.containers.lock().unwrap();
        if !containers.is_empty() {
            writeln!(out)?;
            writeln!(out, "filename,success,size_after,error")?;
            for row in containers.iter() {
                writeln!(
                    out,
                    "{},{},{},{}",
                    csv_field(&row.filename.display().to_string()),
                    row.success,
                    row.size_after,
                    csv_field(&row.error),
                )?;
            }
        }
        Ok(())
    }
}

/// Quote a field when it contains a separator, quote, or newline.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_owned()
    }
}
