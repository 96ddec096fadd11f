//! Parent and child controllers for cross-window frame messaging.
//!
//! The parent page owns an embedded frame through a [`FrameBridge`]; the
//! document inside the frame runs a [`ChildFrame`]. Both share the
//! origin-gated dispatch of [`FrameEndpoint`]. On top of that the bridge
//! queues events until the child is ready and coalesces them around
//! navigations, and the child executes remote methods the parent calls.

pub mod child;
pub mod config;
pub mod endpoint;
pub mod error;
mod location;
pub mod loopback;
pub mod parent;
pub mod registry;
pub mod rpc;

pub use child::ChildFrame;
pub use config::{BridgeConfig, ChildConfig, ReadyCheck, DEFAULT_RPC_TIMEOUT};
#[cfg(feature = "schema")]
pub use config::SchemaRegistryHandle;
pub use endpoint::{
    listener, Dispatch, Endpoint, EndpointOptions, FrameEndpoint, Listener, Rejection,
};
pub use error::{PeerError, Result};
pub use loopback::{ChildSetup, Delivery, Direction, Loopback, TranscriptEntry};
pub use parent::{coalesce, FrameBridge, QueuedEvent};
pub use registry::FrameRegistry;
pub use rpc::{
    arg, MethodError, MethodFuture, MethodResult, PendingCall, RemoteMethod, RpcCall, RpcResponse,
};
