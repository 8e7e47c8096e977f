//! Failure outcomes returned by each component contract.
//!
//! None of these are fatal; callers turn them into a [`crate::session::Notice`]
//! at the boundary where the user action started.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("claim must be at least {min} characters (got {len})")]
    Validation { len: usize, min: usize },

    #[error("analysis already in progress")]
    Concurrency,
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("no analysis data to export")]
    EmptyHistory,

    #[error("document rendering failed: {0}")]
    Document(String),

    #[error("failed to write export: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
pub type ExportResult<T> = Result<T, ExportError>;
pub type StorageResult<T> = Result<T, StorageError>;
