//! Crate-wide error type.
//!
//! Processors report failure for a single file by returning [`Error`]; the
//! executor catches those at task boundaries and converts them into error
//! events. Only configuration problems (bad output directory, stopped pool)
//! propagate out of the orchestrator itself.

use std::io;

use thiserror::Error;

/// Error type shared by processors, the worker pool, and the executor.
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying filesystem or stream failure.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// A codec could not read or rewrite the file (malformed input,
    /// unsupported sub-format, library failure).
    #[error("{0}")]
    Codec(String),

    /// The operation is not implemented by this processor.
    #[error("operation not supported by this processor")]
    Unsupported,

    /// Invalid executor configuration; fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Work was submitted to a pool that has been stopped.
    #[error("cannot enqueue work: pool is stopped")]
    PoolStopped,
}

impl Error {
    /// Shorthand for a codec failure with a formatted message.
    pub fn codec(msg: impl Into<String>) -> Self {
        Error::Codec(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
