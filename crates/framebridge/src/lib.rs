//! Cross-window messaging between a page and the frame it embeds.
//!
//! A parent page creates a sandboxed frame and talks to the document inside
//! it through tagged JSON envelopes. Events wait in a queue until the child
//! reports ready, stale events are dropped when the parent navigates the
//! child again, and the parent can call methods the child registers.
//!
//! # Crate Structure
//!
//! - [`transport`] - Hosting-environment seam and the in-memory host
//! - [`envelope`] - Wire envelope codec and event vocabulary
//! - [`schema`] - Optional JSON Schema validation (behind `schema` feature)
//! - [`peer`] - Parent and child controllers (behind `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use framebridge_transport::*;
}

/// Re-export envelope types.
pub mod envelope {
    pub use framebridge_envelope::*;
}

/// Re-export schema types (requires `schema` feature).
#[cfg(feature = "schema")]
pub mod schema {
    pub use framebridge_schema::*;
}

/// Re-export controller types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use framebridge_peer::*;
}
