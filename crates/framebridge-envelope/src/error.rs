/// Errors that can occur while building an envelope.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// The payload could not be converted to JSON.
    #[error("payload is not serializable: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EnvelopeError>;
