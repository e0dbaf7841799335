use thiserror::Error;

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Division by zero: {0}")]
    DivisionByZero(String),

    #[error("Invalid projection: {0}")]
    InvalidProjection(String),

    #[error("Invalid reference '{field}' in {stage}")]
    InvalidReference { stage: String, field: String },

    #[error("Malformed input: expected {expected} for '{key}' but found {actual}")]
    MalformedInput { key: String, expected: &'static str, actual: String },

    #[error("Maximum mapping depth of {0} exceeded")]
    DepthExceeded(usize),

    #[error("Unresolvable reference: {0}")]
    UnresolvableReference(String),

    #[error("Path conflict at '{path}': segment '{segment}' holds a non-document value")]
    PathConflict { path: String, segment: String },

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Expression error: {0}")]
    Expression(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Serde JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, MappingError>;

impl MappingError {
    pub(crate) fn malformed(key: &str, expected: &'static str, actual: &str) -> Self {
        Self::MalformedInput { key: key.to_string(), expected, actual: actual.to_string() }
    }
}
