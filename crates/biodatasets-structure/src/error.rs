use biodatasets_features::FeatureError;
use std::path::PathBuf;

/// Errors raised while reading, parsing or scanning structure files.
#[derive(Debug, thiserror::Error)]
pub enum StructureError {
    #[error("unsupported structure format `{0}`")]
    UnsupportedFormat(String),

    #[error("failed to parse {format} structure: {message}")]
    Parse { format: String, message: String },

    #[error("structure contains no atoms")]
    Empty,

    #[error("atom array column `{column}` has {len} entries, expected {expected}")]
    ColumnLength {
        column: &'static str,
        len: usize,
        expected: usize,
    },

    #[error("atom array is missing column `{0}`")]
    MissingColumn(&'static str),

    #[error("failed to access {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("metadata file {}: {message}", path.display())]
    Metadata { path: PathBuf, message: String },

    #[error(transparent)]
    Polars(#[from] polars::prelude::PolarsError),

    #[error(transparent)]
    Walk(#[from] walkdir::Error),

    #[error(transparent)]
    Feature(#[from] FeatureError),
}

impl StructureError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StructureError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<StructureError> for FeatureError {
    fn from(err: StructureError) -> Self {
        match err {
            StructureError::Feature(inner) => inner,
            other => FeatureError::custom("structure", other),
        }
    }
}

pub type Result<T, E = StructureError> = std::result::Result<T, E>;
