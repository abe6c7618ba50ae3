//! Public façade for the library.
//!
//! [`Chisel`] wraps registry construction, event wiring, and executor
//! lifetime behind a small builder-style API. Configuration methods
//! consume and return the builder; [`Chisel::recompress`] blocks until
//! the run finishes. An optional [`Observer`] receives per-file progress
//! callbacks and, through `on_log`, every log record emitted while the
//! run is active.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::config::{EncodeMode, Settings};
use crate::error::Result;
use crate::event_bus::EventBus;
use crate::events::{
    ContainerFinalizeError, FileProcessComplete, FileProcessError, FileProcessStart,
};
use crate::executor::Executor;
use crate::format::ContainerFormat;
use crate::logging::{self, LogSink};
use crate::registry::ProcessorRegistry;

/// Progress callbacks for a run. Every slot is optional.
#[derive(Default)]
pub struct Observer {
    /// A file entered Phase 2 processing.
    pub on_file_start: Option<Box<dyn Fn(&Path) + Send + Sync>>,
    /// A file finished processing: `(path, size_before, size_after,
    /// replaced)`.
    pub on_file_finish: Option<Box<dyn Fn(&Path, u64, u64, bool) + Send + Sync>>,
    /// A file or container failed: `(path, message)`.
    pub on_file_error: Option<Box<dyn Fn(&Path, &str) + Send + Sync>>,
    /// A log record was emitted: `(level, target, message)`.
    pub on_log: Option<Box<dyn Fn(log::Level, &str, &str) + Send + Sync>>,
}

/// Forwards log records to `Observer::on_log` while a run is active.
struct ObserverLogSink(Arc<Observer>);

impl LogSink for ObserverLogSink {
    fn log(&self, level: log::Level, target: &str, message: &str) {
        if let Some(on_log) = &self.0.on_log {
            on_log(level, target, message);
        }
    }
}

/// Blocking, builder-configured entry point to the optimization pipeline.
pub struct Chisel {
    settings: Settings,
    observer: Option<Arc<Observer>>,
    active: Arc<Mutex<Option<Arc<Executor>>>>,
}

impl Default for Chisel {
    fn default() -> Self {
        Chisel::new()
    }
}

impl Chisel {
    pub fn new() -> Self {
        Chisel {
            settings: Settings::default(),
            observer: None,
            active: Arc::new(Mutex::new(None)),
        }
    }

    // ── Configuration ────────────────────────────────────────────────────

    /// Preserve format metadata and file attributes. Default: true.
    pub fn preserve_metadata(mut self, value: bool) -> Self {
        self.settings.preserve_metadata = value;
        self
    }

    /// Verify decoded-content checksums before replacing. Default: false.
    pub fn verify_checksums(mut self, value: bool) -> Self {
        self.settings.verify_checksums = value;
        self
    }

    /// Log intent without touching files. Default: false.
    pub fn dry_run(mut self, value: bool) -> Self {
        self.settings.dry_run = value;
        self
    }

    /// Worker thread count. Default: half the hardware parallelism.
    pub fn threads(mut self, value: usize) -> Self {
        self.settings.num_threads = value.max(1);
        self
    }

    /// Candidate dispatch strategy. Default: [`EncodeMode::Pipe`].
    pub fn mode(mut self, mode: EncodeMode) -> Self {
        self.settings.encode_mode = mode;
        self
    }

    /// Write optimized files here instead of in-place.
    pub fn output_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.settings.output_dir = Some(dir.into());
        self
    }

    /// Container format to fall back to when a source format is readable
    /// but not writable. Default: keep the original.
    pub fn fallback_format(mut self, format: ContainerFormat) -> Self {
        self.settings.fallback_format = format;
        self
    }

    /// Install progress callbacks for subsequent runs.
    pub fn set_observer(&mut self, observer: Observer) {
        self.observer = Some(Arc::new(observer));
    }

    // ── Execution ────────────────────────────────────────────────────────

    /// Optimize `paths` with the built-in processors. Blocks until the
    /// run finishes; per-file failures surface through events and the
    /// observer, not through the return value.
    pub fn recompress<P: AsRef<Path>>(&self, paths: &[P]) -> Result<()> {
        let registry = Arc::new(ProcessorRegistry::with_builtin());
        self.recompress_with(registry, paths)
    }

    /// Like [`Chisel::recompress`] but with a caller-supplied registry.
    pub fn recompress_with<P: AsRef<Path>>(
        &self,
        registry: Arc<ProcessorRegistry>,
        paths: &[P],
    ) -> Result<()> {
        logging::init();

        let bus = Arc::new(EventBus::new());
        if let Some(observer) = &self.observer {
            wire_observer(&bus, observer);
        }
        let log_sink = self
            .observer
            .as_ref()
            .filter(|o| o.on_log.is_some())
            .map(|o| logging::add_sink(Box::new(ObserverLogSink(Arc::clone(o)))));

        let result = (|| {
            let executor = Arc::new(Executor::new(
                registry,
                self.settings.clone(),
                Arc::clone(&bus),
            )?);

            // Register for stop() while the run is active.
            *self.active.lock().unwrap() = Some(Arc::clone(&executor));
            let inputs: Vec<PathBuf> = paths.iter().map(|p| p.as_ref().to_path_buf()).collect();
            executor.run(&inputs);
            *self.active.lock().unwrap() = None;
            Ok(())
        })();

        if let Some(id) = log_sink {
            logging::remove_sink(id);
        }
        result
    }

    // ── Control ──────────────────────────────────────────────────────────

    /// Request cancellation of the active run, if any. Thread-safe.
    pub fn stop(&self) {
        if let Some(executor) = self.active.lock().unwrap().as_ref() {
            executor.request_stop();
        }
    }

    /// Handle that lets another thread (e.g. a signal handler) stop the
    /// active run without holding the `Chisel` itself.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            active: Arc::clone(&self.active),
        }
    }
}

/// Cloneable handle forwarding [`Chisel::stop`].
#[derive(Clone)]
pub struct StopHandle {
    active: Arc<Mutex<Option<Arc<Executor>>>>,
}

impl StopHandle {
    pub fn stop(&self) {
        if let Some(executor) = self.active.lock().unwrap().as_ref() {
            executor.request_stop();
        }
    }
}

fn wire_observer(bus: &EventBus, observer: &Arc<Observer>) {
    if observer.on_file_start.is_some() {
        let obs = Arc::clone(observer);
        bus.subscribe::<FileProcessStart>(move |e| {
            if let Some(cb) = &obs.on_file_start {
                cb(&e.path);
            }
        });
    }
    if observer.on_file_finish.is_some() {
        let obs = Arc::clone(observer);
        bus.subscribe::<FileProcessComplete>(move |e| {
            if let Some(cb) = &obs.on_file_finish {
                cb(&e.path, e.original_size, e.new_size, e.replaced);
            }
        });
    }
    if observer.on_file_error.is_some() {
        let obs = Arc::clone(observer);
        bus.subscribe::<FileProcessError>(move |e| {
            if let Some(cb) = &obs.on_file_error {
                cb(&e.path, &e.message);
            }
        });
        let obs = Arc::clone(observer);
        bus.subscribe::<ContainerFinalizeError>(move |e| {
            if let Some(cb) = &obs.on_file_error {
                cb(&e.path, &e.message);
            }
        });
    }
}
