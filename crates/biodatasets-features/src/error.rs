use std::path::PathBuf;

/// Errors raised while describing, encoding or decoding features.
#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    /// The shape of an example does not match the declared schema.
    #[error("schema mismatch: expected {expected}, got {got}")]
    SchemaMismatch { expected: String, got: String },

    /// A class label id mapping does not cover `[0, max]`.
    #[error("ClassLabel expected a value for all label ids [0:{expected_len}] but some ids are missing")]
    InvalidClassLabel { expected_len: usize },

    /// A label name or id that is not part of a `ClassLabel`.
    #[error("invalid label {label:?}, expected one of {names:?}")]
    UnknownLabel { label: String, names: Vec<String> },

    #[error("{0}")]
    NotImplemented(String),

    /// A `_type` tag with no registered feature.
    #[error("unknown feature type `{0}`")]
    UnknownFeatureType(String),

    /// Malformed dict or YAML representation of a feature.
    #[error("invalid feature definition: {0}")]
    InvalidFeature(String),

    #[error("arrow type {0} has no feature equivalent")]
    UnsupportedArrowType(String),

    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error("hub request failed: {0}")]
    Hub(String),

    /// Errors raised by custom feature implementations.
    #[error("{feature}: {source}")]
    Custom {
        feature: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl FeatureError {
    pub fn mismatch(expected: impl Into<String>, got: impl Into<String>) -> Self {
        FeatureError::SchemaMismatch {
            expected: expected.into(),
            got: got.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        FeatureError::InvalidFeature(message.into())
    }

    pub fn custom<E>(feature: impl Into<String>, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        FeatureError::Custom {
            feature: feature.into(),
            source: source.into(),
        }
    }
}

pub type Result<T, E = FeatureError> = std::result::Result<T, E>;
