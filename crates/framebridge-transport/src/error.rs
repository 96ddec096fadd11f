/// Errors reported by a hosting environment.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The environment refused to deliver a posted message.
    #[error("failed to post message to window {window}: {reason}")]
    Post { window: u64, reason: String },

    /// The embedded frame could not be created.
    #[error("failed to create embedded frame for {src}: {reason}")]
    FrameCreation { src: String, reason: String },

    /// A location replace was rejected.
    #[error("failed to navigate to {url}: {reason}")]
    Navigation { url: String, reason: String },

    /// The target window is gone.
    #[error("window {0} is closed")]
    Closed(u64),
}

pub type Result<T> = std::result::Result<T, TransportError>;
