//! Error types for the pdf-crop library

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the pdf-crop library
#[derive(Error, Debug)]
pub enum Error {
    /// PDF processing error
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File not found
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Resources needed by the task could not be acquired
    #[error("Unable to acquire {resource}: {cause}")]
    ResourceAcquisition {
        resource: String,
        #[source]
        cause: std::io::Error,
    },

    /// Opening, reading or saving a specific source failed
    #[error("Unable to process '{source_name}': {cause}")]
    EngineIo {
        source_name: String,
        #[source]
        cause: Box<Error>,
    },

    /// Inconsistent form, annotation or outline structures
    #[error("Invalid document structure: {0}")]
    StructuralMerge(String),

    /// Cancellation was requested
    #[error("Task cancelled")]
    Cancelled,

    /// Output file exists and the policy forbids touching it
    #[error("Output already exists: {}", .0.display())]
    OutputExists(PathBuf),

    /// Encrypted input
    #[error("Encrypted documents are not supported: {0}")]
    Encrypted(String),

    /// Rectangle could not be parsed or is degenerate
    #[error("Invalid rectangle: {0}")]
    InvalidRectangle(String),

    /// Page selection could not be parsed
    #[error("Invalid page selection: {0}")]
    InvalidPageSelection(String),

    /// Task parameters are not usable
    #[error("Invalid task parameters: {0}")]
    InvalidParameters(String),

    /// Task method called out of order
    #[error("Invalid task state: {0}")]
    InvalidState(String),

    /// General error
    #[error("{0}")]
    General(String),
}

impl Error {
    /// Wrap an engine failure with the name of the source being processed
    pub fn engine_io(source_name: impl Into<String>, cause: Error) -> Self {
        match cause {
            // never hide a cancellation or an already attributed failure
            Error::Cancelled | Error::EngineIo { .. } => cause,
            cause => Error::EngineIo {
                source_name: source_name.into(),
                cause: Box::new(cause),
            },
        }
    }

    /// True when the run stopped because cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// True when a lenient run may downgrade this error to a warning
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::EngineIo { .. } | Error::StructuralMerge(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_io_keeps_cancellation() {
        let err = Error::engine_io("a.pdf", Error::Cancelled);
        assert!(err.is_cancelled());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_engine_io_wraps_once() {
        let inner = Error::engine_io("a.pdf", Error::FileNotFound(PathBuf::from("a.pdf")));
        let outer = Error::engine_io("b.pdf", inner);
        assert!(outer.to_string().contains("'a.pdf'"));
        assert!(outer.is_recoverable());
    }

    #[test]
    fn test_structural_merge_is_recoverable() {
        assert!(Error::StructuralMerge("bad field".into()).is_recoverable());
        assert!(!Error::OutputExists(PathBuf::from("x.pdf")).is_recoverable());
    }
}
