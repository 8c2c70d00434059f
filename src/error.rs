//! Error types for docbook-xtm operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while flattening or restoring a guide package.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No 'Book_Info.xml' file found in {0}")]
    MissingMetadata(String),

    #[error("Multiple 'Book_Info.xml' files found in {archive} and none is en-US: {candidates:?}")]
    AmbiguousMetadata {
        archive: String,
        candidates: Vec<String>,
    },

    #[error("No table of contents '{course}-SG.xml' found in {archive}")]
    MissingToc { course: String, archive: String },

    #[error("Metadata file has no <{0}> value")]
    MissingField(&'static str),

    #[error("Invalid archive: {0}")]
    InvalidArchive(String),

    #[error("Failed to move {from:?} to {to:?}: {source}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
