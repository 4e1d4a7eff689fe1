use thiserror::Error;

/// One validation failure, in the vocabulary the Control API surfaces to
/// callers verbatim (`error.details[]` in the JSON wire format).
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ValidationError {
    pub path: String,
    pub code: ValidationErrorCode,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, code: ValidationErrorCode, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationErrorCode {
    Malformed,
    MissingRequired,
    BadDuration,
    BadLicense,
    UnknownField,
    OutOfRange,
    InvalidLabelKey,
    InvalidType,
}

/// Errors internal to the Config Engine that are not validation failures
/// (e.g. I/O while persisting a version). These are 500-class errors per
/// spec.md §7 `GenerationError`.
#[derive(Debug, Error)]
pub enum ConfigEngineError {
    #[error("validation failed")]
    Validation(Vec<ValidationError>),

    #[error("persistence error: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("no version with id {0}")]
    VersionNotFound(u64),

    #[error("no superseded version available to roll back to")]
    NoRollbackTarget,
}
