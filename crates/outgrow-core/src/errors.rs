//! Error types for the outgrow core library.
//!
//! Only fatal conditions live here. Everything the pipeline can recover from
//! is recorded in a [`crate::diagnostics::DiagnosticsReport`] instead.

use std::path::PathBuf;

/// Top-level error enum for the outgrow core library.
#[derive(Debug, thiserror::Error)]
pub enum OutgrowError {
    #[error("Parse error at line {line}, column {column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("Plugin {plugin:?} failed at checkpoint {checkpoint}: {message}")]
    Plugin {
        plugin: String,
        checkpoint: String,
        message: String,
    },

    #[error("Target {} already exists and is not empty (pass overwrite to replace it)", .0.display())]
    TargetExists(PathBuf),

    #[error("Target {} is locked by another conversion", .0.display())]
    TargetLocked(PathBuf),

    #[error("Incomplete output at {}: {message}; delete it and retry", path.display())]
    IncompleteOutput { path: PathBuf, message: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl OutgrowError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            OutgrowError::Parse { .. } => 2,
            OutgrowError::Plugin { .. } => 3,
            OutgrowError::TargetExists(_) | OutgrowError::TargetLocked(_) => 4,
            OutgrowError::Config(_) | OutgrowError::Regex(_) => 5,
            OutgrowError::IncompleteOutput { .. } => 6,
            OutgrowError::Io(_) | OutgrowError::Json(_) => 1,
        }
    }
}

#[cfg(feature = "python")]
impl From<OutgrowError> for pyo3::PyErr {
    fn from(err: OutgrowError) -> pyo3::PyErr {
        use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};
        match &err {
            OutgrowError::Parse { .. } | OutgrowError::Config(_) | OutgrowError::Regex(_) => {
                PyValueError::new_err(err.to_string())
            }
            OutgrowError::Io(_) => PyIOError::new_err(err.to_string()),
            _ => PyRuntimeError::new_err(err.to_string()),
        }
    }
}

pub type OutgrowResult<T> = Result<T, OutgrowError>;
