// src/error.rs

use crate::compression::CompressionError;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while generating repositories
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or unsupported package container or index file
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Index serialization failed
    #[error("Metadata generation error: {0}")]
    MetadataError(String),

    /// Key load, decrypt or sign failure
    #[error("Signing error: {0}")]
    SigningError(String),

    /// Copy or write failure on a specific path
    #[error("File operation failed on {path}: {source}")]
    FileOpError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Incremental identity collision
    #[error("Package conflict: {0}")]
    ConflictError(String),

    /// Missing or invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Compression error: {0}")]
    Compression(#[from] CompressionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generation cancelled")]
    Cancelled,
}

impl Error {
    /// Wrap an I/O error with the path it happened on
    pub fn file_op(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::FileOpError {
            path: path.into(),
            source,
        }
    }

    /// Prefix a parse error with the file it came from
    pub fn for_file(self, path: &Path) -> Self {
        match self {
            Error::ParseError(msg) => Error::ParseError(format!("{}: {}", path.display(), msg)),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
