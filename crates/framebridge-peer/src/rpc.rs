//! Remote method calls layered on the event transport.
//!
//! The parent sends [`RPC_CALL`](framebridge_envelope::RPC_CALL) with a
//! [`RpcCall`] payload and listens once on `bridge:rpc-call:<uid>` for the
//! child's response.

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use framebridge_envelope::Envelope;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::endpoint::{FrameEndpoint, Listener};
use crate::error::{PeerError, Result};

/// Wire payload of an RPC call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcCall {
    /// Correlation id, unique per bridge.
    pub uid: u64,
    /// Registered method name.
    #[serde(rename = "fnName")]
    pub fn_name: String,
    /// Positional arguments.
    #[serde(default)]
    pub args: Vec<Value>,
}

/// The child's answer to a call.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcResponse {
    /// Value returned by the remote method.
    pub data: Value,
    /// Id-suffixed response event name.
    pub event_name: String,
    /// Full decoded envelope.
    pub envelope: Envelope,
}

/// Failure reported by a registered method.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct MethodError(String);

impl MethodError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<String> for MethodError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for MethodError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

impl From<serde_json::Error> for MethodError {
    fn from(err: serde_json::Error) -> Self {
        Self(format!("invalid argument: {err}"))
    }
}

pub type MethodResult = std::result::Result<Value, MethodError>;

pub type MethodFuture = Pin<Box<dyn Future<Output = MethodResult> + Send + 'static>>;

/// A method the child exposes to the parent.
#[derive(Clone)]
pub enum RemoteMethod {
    /// Returns its value directly.
    Sync(Arc<dyn Fn(Vec<Value>) -> MethodResult + Send + Sync>),
    /// Returns a future of its value.
    Async(Arc<dyn Fn(Vec<Value>) -> MethodFuture + Send + Sync>),
}

impl std::fmt::Debug for RemoteMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteMethod::Sync(_) => f.write_str("RemoteMethod::Sync"),
            RemoteMethod::Async(_) => f.write_str("RemoteMethod::Async"),
        }
    }
}

/// Deserialize positional argument `index`.
pub fn arg<T: DeserializeOwned>(
    args: &[Value],
    index: usize,
) -> std::result::Result<T, MethodError> {
    let value = args
        .get(index)
        .ok_or_else(|| MethodError::new(format!("missing argument {index}")))?;
    Ok(serde_json::from_value(value.clone())?)
}

/// Removes a listener from its endpoint when dropped.
pub(crate) struct ListenerGuard {
    endpoint: Arc<FrameEndpoint>,
    event_name: String,
    listener: Listener,
}

impl ListenerGuard {
    pub(crate) fn new(
        endpoint: Arc<FrameEndpoint>,
        event_name: String,
        listener: Listener,
    ) -> Self {
        Self {
            endpoint,
            event_name,
            listener,
        }
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.endpoint.off(&self.event_name, &self.listener);
    }
}

/// An RPC call that has been sent (or queued) and awaits its response.
///
/// Await it directly. Dropping it abandons the call and unregisters the
/// response listener.
pub struct PendingCall {
    uid: u64,
    guard: ListenerGuard,
    response: oneshot::Receiver<RpcResponse>,
    timeout: Option<Duration>,
}

impl PendingCall {
    pub(crate) fn new(
        uid: u64,
        guard: ListenerGuard,
        response: oneshot::Receiver<RpcResponse>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            uid,
            guard,
            response,
            timeout,
        }
    }

    /// Correlation id of this call.
    pub fn uid(&self) -> u64 {
        self.uid
    }

    /// Event name the response will arrive on.
    pub fn response_event(&self) -> &str {
        &self.guard.event_name
    }

    /// Wait for the response, bounded by the bridge's RPC timeout.
    pub async fn response(self) -> Result<RpcResponse> {
        let PendingCall {
            uid,
            guard,
            response,
            timeout,
        } = self;

        let received = match timeout {
            Some(limit) => match tokio::time::timeout(limit, response).await {
                Ok(received) => received,
                Err(_) => {
                    tracing::warn!(uid, timeout = ?limit, "rpc call timed out");
                    return Err(PeerError::Timeout(limit));
                }
            },
            None => response.await,
        };
        drop(guard);

        received.map_err(|_| PeerError::Disconnected(format!("rpc call {uid} was abandoned")))
    }
}

impl IntoFuture for PendingCall {
    type Output = Result<RpcResponse>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send + 'static>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.response())
    }
}

impl std::fmt::Debug for PendingCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCall")
            .field("uid", &self.uid)
            .field("response_event", &self.guard.event_name)
            .field("timeout", &self.timeout)
            .finish()
    }
}
