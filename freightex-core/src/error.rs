/// Business-rule error taxonomy shared by every service operation.
///
/// All variants surface synchronously to the caller except
/// `ExternalServiceUnavailable` from notification delivery, which the engine
/// swallows after the owning transaction has committed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("validation failed on `{field}`: {message}")]
    Validation { field: String, message: String },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("external service unavailable: {0}")]
    ExternalServiceUnavailable(String),
}

impl Error {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }
}
