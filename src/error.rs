//! Error types shared across the crate.

use thiserror::Error;

/// Errors produced while building or running a simulation.
///
/// Configuration and I/O errors are fatal: the driver reports them once and
/// exits nonzero. Numerics errors are recoverable at the iteration level: the
/// learning engine logs them and skips the parameter update for the affected
/// iteration.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or inconsistent input (unknown names, missing fields,
    /// mismatched dimensions).
    #[error("configuration error: {0}")]
    Config(String),

    /// A numerical procedure failed (singular linear system, solver
    /// non-convergence, non-finite values).
    #[error("numerical error: {0}")]
    Numerics(String),

    /// File input/output failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON in the input file or a checkpoint.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn numerics(msg: impl Into<String>) -> Self {
        Error::Numerics(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
