use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failures while reading telemetry or the photographs it references.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode image {}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("telemetry line {line}: {reason}")]
    Row { line: usize, reason: String },
}

impl LoadError {
    /// Returns the file that could not be loaded, if the failure concerns a file.
    pub fn path(&self) -> Option<&Path> {
        match self {
            LoadError::Io { path, .. } | LoadError::Image { path, .. } => Some(path),
            LoadError::Row { .. } => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("{angle} = {degrees:.1}° makes rotation matrix singular")]
    SingularMatrix { angle: &'static str, degrees: f64 },

    #[error("invalid transform: {0}")]
    InvalidTransform(String),

    #[error("telemetry has {rows} rows but {images} images were supplied")]
    DimensionMismatch { rows: usize, images: usize },

    #[error("image {index} ({filename}): {source}")]
    Item {
        index: usize,
        filename: String,
        #[source]
        source: Box<Error>,
    },

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, Error>;
