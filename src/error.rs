use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ViewerError {
    #[error("Unable to display image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Unable to read image {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to extract archive {path}: {reason}")]
    ArchiveExtraction { path: PathBuf, reason: String },

    #[error("No image or CBZ file selected: {0}")]
    EmptySelection(String),

    #[error("Unable to write temp scaled image {path}: {source}")]
    TempIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ViewerError {
    /// Short title for the error dialog.
    pub fn title(&self) -> &'static str {
        match self {
            ViewerError::Decode { .. } | ViewerError::Read { .. } => "Decode error",
            ViewerError::ArchiveExtraction { .. } => "Archive error",
            ViewerError::EmptySelection(_) => "Nothing to show",
            ViewerError::TempIo { .. } => "Temp file error",
            ViewerError::Io(_) => "Error",
        }
    }
}

pub type Result<T> = std::result::Result<T, ViewerError>;
