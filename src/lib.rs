//! Chisel — lossless file optimization engine.
//!
//! Given a set of input files, chisel rewrites each in a smaller byte
//! representation while preserving its decoded content. Format-specific
//! work is delegated to pluggable [`processor::Processor`]s held by a
//! [`registry::ProcessorRegistry`]; the [`executor::Executor`] drives the
//! three-phase Analyze → Process → Finalize pipeline across a cooperative
//! worker pool and publishes progress on a typed [`event_bus::EventBus`].
//!
//! Library consumers normally go through the [`chisel::Chisel`] façade:
//!
//! ```no_run
//! use chisel::Chisel;
//!
//! let engine = Chisel::new().dry_run(true).threads(2);
//! engine.recompress(&["photo.png", "archive.zip"]).unwrap();
//! ```

pub mod chisel;
pub mod cli;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod events;
pub mod executor;
pub mod format;
pub mod logging;
pub mod mime;
pub mod processor;
pub mod processors;
pub mod registry;
pub mod threadpool;
pub mod util;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level re-exports for the most common entry points.
// ─────────────────────────────────────────────────────────────────────────────

pub use crate::chisel::{Chisel, Observer};
pub use crate::config::{default_thread_count, EncodeMode, Settings};
pub use crate::error::{Error, Result};
pub use crate::event_bus::EventBus;
pub use crate::executor::Executor;
pub use crate::format::ContainerFormat;
pub use crate::processor::{ExtractionRecord, Processor};
pub use crate::registry::ProcessorRegistry;
pub use crate::threadpool::{StopToken, WorkerPool};
