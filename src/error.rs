//! Error types for chmweb operations.

use thiserror::Error;

/// Errors that can occur while converting a help archive.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("UTF-8 decoding error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Invalid help archive: {0}")]
    InvalidArchive(String),

    #[error("Invalid contents file: {0}")]
    InvalidContents(String),

    #[error("Worker failed: {0}")]
    Worker(String),

    #[error("Archive extractor failed: {0}")]
    Extractor(String),

    #[error("Duplicate archive stem: {0}")]
    DuplicateStem(String),
}

pub type Result<T> = std::result::Result<T, Error>;
