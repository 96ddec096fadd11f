//! Tagged JSON message envelopes for cross-window frame messaging.
//!
//! Every message on the wire is a JSON string of the form:
//! - `eventName`: which event this is
//! - `data`: arbitrary JSON payload (omitted when there is none)
//! - `isMobifyFrameBridge: true`: the protocol tag
//!
//! The window message channel is shared with unrelated senders, so decoding
//! never fails loudly: anything that is not a tagged envelope is "not ours".

pub mod codec;
pub mod error;
pub mod events;

pub use codec::{decode, decode_str, encode, encode_serialized, Envelope, PROTOCOL_TAG};
pub use error::{EnvelopeError, Result};
pub use events::{
    event_kind, is_navigation, rpc_response_event, EventKind, CHILD_NAVIGATING, CHILD_READY,
    NAVIGATE, RPC_CALL,
};
