/// Errors that can occur during schema loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// A schema file could not be loaded.
    #[error("failed to load schema: {0}")]
    LoadFailed(String),

    /// A schema could not be compiled.
    #[error("failed to compile schema: {0}")]
    CompileFailed(String),

    /// The payload failed schema validation.
    #[error("validation failed for event {event}: {message}")]
    ValidationFailed { event: String, message: String },

    /// Schema text is not valid JSON.
    #[error("schema is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// No schema registered for the given event.
    #[error("no schema registered for event {0}")]
    NoSchema(String),
}

pub type Result<T> = std::result::Result<T, SchemaError>;
