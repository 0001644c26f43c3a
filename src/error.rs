//! Error taxonomy for the ingestion pipeline.
//!
//! Library modules return [`Result`]; the CLI wraps these in `anyhow`.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The OCR binary is missing or misconfigured. Never retried.
    #[error("OCR engine unavailable: {0}")]
    EngineUnavailable(String),

    /// One image could not be read or recognized.
    #[error("extraction failed for {path:?}: {reason}")]
    ExtractionFailed { path: PathBuf, reason: String },

    /// The report could not be opened or persisted. Nothing from the failed
    /// call is committed.
    #[error("report write failed for {path:?}: {reason}")]
    ReportWriteFailed { path: PathBuf, reason: String },

    /// Copy or delete failure inside the staging directory.
    #[error("staging I/O error at {path:?}: {source}")]
    StagingIo {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("a batch is already running")]
    Busy,

    #[error("batch worker panicked")]
    WorkerPanicked,

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn extraction(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ExtractionFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn report(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ReportWriteFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn staging(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::StagingIo {
            path: path.into(),
            source,
        }
    }

    /// Errors that end a batch regardless of `pipeline.on_file_error`.
    pub fn is_batch_fatal(&self) -> bool {
        !matches!(self, Self::ExtractionFailed { .. })
    }
}
