use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the smpl tooling. Every variant is terminal for the
/// tool that hits it.
#[derive(Debug, Error)]
pub enum SmplError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },

    /// Two tables that should be compared element-wise have different
    /// `(rows, cols)`
    #[error("Shape mismatch between files! {lhs:?} vs {rhs:?}")]
    ShapeMismatch { lhs: (usize, usize), rhs: (usize, usize) },

    #[error("missing array `{0}` in model file")]
    MissingArray(String),

    #[error("invalid model: {0}")]
    InvalidModel(String),

    #[error("unsupported file `{path}`: {reason}")]
    UnsupportedFile { path: PathBuf, reason: String },

    #[error("invalid point cloud: {0}")]
    InvalidPointCloud(String),

    #[error(transparent)]
    Npz(#[from] ndarray_npy::ReadNpzError),

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("malformed pickle at byte {offset}: {reason}")]
    Pickle { offset: usize, reason: String },
}

impl SmplError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}
