//! Registry of available processors.
//!
//! The registry owns every [`Processor`] instance for the lifetime of an
//! execution and answers "who can handle this file?" by MIME type or by
//! extension. Registration order is the preference order: when several
//! processors claim the same type, lookups return them in the order they
//! were registered, and the executor treats the first as the primary.
//! The registry is immutable after construction, so concurrent lookups
//! from worker threads need no locking.

use crate::processor::Processor;

#[derive(Default)]
pub struct ProcessorRegistry {
    processors: Vec<Box<dyn Processor>>,
}

impl ProcessorRegistry {
    /// An empty registry; useful for tests and embedders that bring their
    /// own processors.
    pub fn new() -> Self {
        ProcessorRegistry::default()
    }

    /// A registry pre-populated with every built-in processor.
    pub fn with_builtin() -> Self {
        let mut registry = ProcessorRegistry::new();
        crate::processors::register_builtin(&mut registry);
        registry
    }

    /// Append a processor. Order of registration determines lookup order.
    pub fn register(&mut self, processor: Box<dyn Processor>) {
        self.processors.push(processor);
    }

    /// All processors whose MIME set contains `mime`, in registration
    /// order.
    pub fn find_by_mime(&self, mime: &str) -> Vec<&dyn Processor> {
        self.processors
            .iter()
            .filter(|p| p.supported_mime_types().contains(&mime))
            .map(|p| p.as_ref())
            .collect()
    }

    /// All processors supporting the (dot-prefixed) extension `ext`,
    /// case-insensitively, in registration order.
    pub fn find_by_extension(&self, ext: &str) -> Vec<&dyn Processor> {
        if ext.is_empty() {
            return Vec::new();
        }
        let ext = ext.to_ascii_lowercase();
        self.processors
            .iter()
            .filter(|p| p.supported_extensions().iter().any(|e| *e == ext))
            .map(|p| p.as_ref())
            .collect()
    }

    /// All registered processors.
    pub fn all(&self) -> &[Box<dyn Processor>] {
        &self.processors
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}
