//! Hosting-environment abstraction for cross-window frame messaging.
//!
//! The bridge never talks to a browser directly. Everything it needs from the
//! hosting environment goes through the traits defined here:
//! - [`MessageTarget`]: post a string message to another window
//! - [`MessageEvent`]: a message event received from some window
//! - [`EmbeddedFrame`] / [`ParentHost`]: the parent page and the frame it owns
//! - [`ChildHost`]: the document running inside the frame
//!
//! This is the lowest layer of framebridge. The [`memory`] module provides an
//! in-process implementation for tests and simulations.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{Result, TransportError};
pub use traits::{
    ChildHost, Deferred, DocumentState, EmbeddedFrame, FrameAttributes, MessageEvent,
    MessageTarget, ParentHost, SandboxFlag, WindowId, BLANK_URL,
};

/// Serialize the origin of `url` the way a browser reports `location.origin`.
///
/// Returns `None` for URLs without a tuple origin (`about:blank`, `data:`).
pub fn origin_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    match parsed.origin() {
        origin @ url::Origin::Tuple(..) => Some(origin.ascii_serialization()),
        url::Origin::Opaque(_) => None,
    }
}
