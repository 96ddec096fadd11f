use std::time::Duration;

/// Errors that can occur in bridge operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// The hosting environment refused an operation.
    #[error("transport error: {0}")]
    Transport(#[from] framebridge_transport::TransportError),

    /// An envelope could not be built.
    #[error("envelope error: {0}")]
    Envelope(#[from] framebridge_envelope::EnvelopeError),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An event was triggered with a payload its handler cannot use.
    #[error("invalid payload for {event}: {reason}")]
    InvalidPayload { event: String, reason: String },

    /// A remote method call did not get a response in time.
    #[error("rpc call timed out after {0:?}")]
    Timeout(Duration),

    /// The response slot of a remote method call was torn down.
    #[error("disconnected: {0}")]
    Disconnected(String),
}

pub type Result<T> = std::result::Result<T, PeerError>;
