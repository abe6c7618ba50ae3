//! Built-in format processors.
//!
//! Each processor is a leaf plug-in behind [`crate::processor::Processor`].
//! Registration order matters: it is the preference order the executor
//! uses when several processors claim the same file type.

pub mod archive;
pub mod gzip;
pub mod png;

use crate::registry::ProcessorRegistry;

pub use archive::ArchiveProcessor;
pub use gzip::GzipProcessor;
pub use png::PngProcessor;

/// Register every built-in processor.
pub fn register_builtin(registry: &mut ProcessorRegistry) {
    registry.register(Box::new(PngProcessor));
    registry.register(Box::new(GzipProcessor));
    registry.register(Box::new(ArchiveProcessor));
}
