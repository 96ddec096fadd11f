use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;

use framebridge_envelope::{
    is_navigation, rpc_response_event, Envelope, CHILD_NAVIGATING, CHILD_READY, NAVIGATE,
    RPC_CALL,
};
use framebridge_transport::{
    EmbeddedFrame, FrameAttributes, MessageEvent, ParentHost, SandboxFlag, BLANK_URL,
};
use serde_json::{json, Value};
use tokio::sync::oneshot;

use crate::config::BridgeConfig;
use crate::endpoint::{
    listener, lock, traffic, Dispatch, Endpoint, EndpointOptions, FrameEndpoint,
};
use crate::error::{PeerError, Result};
use crate::location;
use crate::rpc::{ListenerGuard, PendingCall, RpcCall, RpcResponse};

const FRAME_SANDBOX: [SandboxFlag; 3] = [
    SandboxFlag::AllowScripts,
    SandboxFlag::AllowSameOrigin,
    SandboxFlag::AllowForms,
];

/// An event waiting for the child to become ready.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedEvent {
    pub event_name: String,
    pub data: Value,
}

impl QueuedEvent {
    pub fn new(event_name: impl Into<String>, data: Value) -> Self {
        Self {
            event_name: event_name.into(),
            data,
        }
    }
}

/// Split a queue at drain time into `(send_now, still_queued)`.
///
/// With a navigation present, only the last navigation is sent and the
/// events after it stay queued for the child's next ready signal; everything
/// before it is discarded. Without one, every event is sent in order.
pub fn coalesce(mut queue: Vec<QueuedEvent>) -> (Vec<QueuedEvent>, Vec<QueuedEvent>) {
    match queue.iter().rposition(|event| is_navigation(&event.event_name)) {
        Some(index) => {
            let mut navigation = queue.split_off(index);
            let remaining = navigation.split_off(1);
            (navigation, remaining)
        }
        None => (queue, Vec::new()),
    }
}

/// Parent-side controller. Owns the embedded frame.
pub struct FrameBridge {
    endpoint: Arc<FrameEndpoint>,
    host: Arc<dyn ParentHost>,
    frame: Arc<dyn EmbeddedFrame>,
    src: String,
    queue: Mutex<Vec<QueuedEvent>>,
    next_uid: AtomicU64,
    rpc_timeout: Option<Duration>,
}

impl FrameBridge {
    /// Create the embedded frame and a bridge to it.
    ///
    /// Use [`crate::FrameRegistry::bridge_or_create`] to keep a single bridge
    /// per hosting page.
    pub fn new(host: Arc<dyn ParentHost>, config: BridgeConfig) -> Result<Arc<Self>> {
        let origin = config.origin.clone().unwrap_or_else(|| host.origin());
        let src = config.src.clone().unwrap_or_else(|| host.href());

        let attributes = FrameAttributes {
            src: src.clone(),
            sandbox: FRAME_SANDBOX.to_vec(),
            visible: config.debug,
        };
        let frame = host.create_frame(&attributes)?;

        let endpoint = FrameEndpoint::new(EndpointOptions {
            origin,
            debug: config.debug,
        });
        #[cfg(feature = "schema")]
        let endpoint = endpoint.with_schema_registry(config.schema_registry.clone());
        let endpoint = Arc::new(endpoint);

        let bridge = Arc::new_cyclic(|weak: &Weak<FrameBridge>| {
            let ready = weak.clone();
            endpoint.on(
                CHILD_READY,
                listener(move |_, _, _| {
                    if let Some(bridge) = ready.upgrade() {
                        bridge.handle_child_ready();
                    }
                }),
            );
            let navigating = weak.clone();
            endpoint.on(
                CHILD_NAVIGATING,
                listener(move |_, _, _| {
                    if let Some(bridge) = navigating.upgrade() {
                        bridge.handle_child_navigating();
                    }
                }),
            );

            FrameBridge {
                endpoint: Arc::clone(&endpoint),
                host,
                frame,
                src,
                queue: Mutex::new(Vec::new()),
                next_uid: AtomicU64::new(1),
                rpc_timeout: config.rpc_timeout,
            }
        });

        tracing::debug!(
            src = %bridge.src,
            origin = %bridge.endpoint.origin(),
            sandbox = %attributes.sandbox_attribute(),
            "embedded frame created"
        );
        Ok(bridge)
    }

    /// Initial frame address.
    pub fn src(&self) -> &str {
        &self.src
    }

    /// The frame owned by this bridge.
    pub fn frame(&self) -> &Arc<dyn EmbeddedFrame> {
        &self.frame
    }

    /// Snapshot of the pending queue.
    pub fn queued(&self) -> Vec<QueuedEvent> {
        lock(&self.queue).clone()
    }

    /// Number of queued events.
    pub fn queue_len(&self) -> usize {
        lock(&self.queue).len()
    }

    /// Navigate the child to `url`.
    pub fn navigate(&self, url: &str) -> Result<()> {
        self.trigger(NAVIGATE, json!({ "url": url }))
    }

    /// Invoke `method` on the child.
    ///
    /// The call is sent (or queued) immediately; await the returned
    /// [`PendingCall`] for the response.
    pub fn call_method(&self, method: &str, args: Vec<Value>) -> Result<PendingCall> {
        let uid = self.next_uid.fetch_add(1, Ordering::Relaxed);
        let response_event = rpc_response_event(uid);

        let (tx, rx) = oneshot::channel::<RpcResponse>();
        let slot = Mutex::new(Some(tx));
        let endpoint = Arc::downgrade(&self.endpoint);
        let own: Arc<OnceLock<Weak<dyn Fn(&Value, &str, &Envelope) + Send + Sync>>> =
            Arc::new(OnceLock::new());
        let me = Arc::clone(&own);
        let responder = listener(move |data, event_name, envelope| {
            let Some(tx) = lock(&slot).take() else {
                return;
            };
            let _ = tx.send(RpcResponse {
                data: data.clone(),
                event_name: event_name.to_string(),
                envelope: envelope.clone(),
            });
            // One response per uid; later duplicates find no listener.
            let registered = me.get().and_then(Weak::upgrade);
            if let (Some(endpoint), Some(registered)) = (endpoint.upgrade(), registered) {
                endpoint.off(event_name, &registered);
            }
        });
        let _ = own.set(Arc::downgrade(&responder));
        self.endpoint.on(&response_event, Arc::clone(&responder));
        let guard = ListenerGuard::new(Arc::clone(&self.endpoint), response_event, responder);

        let call = RpcCall {
            uid,
            fn_name: method.to_string(),
            args,
        };
        traffic!(self.endpoint.debug(), uid, method, "calling remote method");
        self.trigger(RPC_CALL, serde_json::to_value(&call)?)?;

        Ok(PendingCall::new(uid, guard, rx, self.rpc_timeout))
    }

    /// Deliver queued events per the navigation-coalescing rule.
    /// Returns how many events were sent.
    ///
    /// Every event selected for delivery is attempted even when an earlier
    /// post fails; the first failure is returned once the batch is done.
    pub fn flush_queue(&self) -> Result<usize> {
        let deliver = {
            let mut queue = lock(&self.queue);
            let (deliver, remaining) = coalesce(std::mem::take(&mut *queue));
            *queue = remaining;
            deliver
        };

        let window = self.frame.content_window();
        let mut sent = 0usize;
        let mut first_error = None;
        for event in &deliver {
            match self
                .endpoint
                .send_raw(window.as_ref(), &event.event_name, &event.data)
            {
                Ok(()) => sent += 1,
                Err(err) => {
                    tracing::warn!(
                        event = %event.event_name,
                        error = %err,
                        "queued event not delivered"
                    );
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(sent),
        }
    }

    fn handle_child_ready(&self) {
        self.endpoint.set_ready(true);
        match self.flush_queue() {
            Ok(sent) => traffic!(self.endpoint.debug(), sent, "child ready; queue flushed"),
            Err(err) => tracing::warn!(error = %err, "failed flushing queue to child"),
        }
    }

    fn handle_child_navigating(&self) {
        self.endpoint.set_ready(false);
        traffic!(self.endpoint.debug(), "child navigating; queueing until ready");
    }

    /// Interrupt whatever the frame is loading and send it to `url`.
    ///
    /// Both replacements go through history-replacing navigation so the
    /// host page's back button is unaffected.
    fn force_navigate(&self, url: &str) -> Result<()> {
        let target = location::resolve(&self.host.href(), url);
        self.frame.stop();
        self.frame.replace_location(BLANK_URL)?;

        let frame = Arc::clone(&self.frame);
        self.host.defer(Box::new(move || {
            if let Err(err) = frame.replace_location(&target) {
                tracing::warn!(url = %target, error = %err, "deferred frame navigation failed");
            }
        }));
        Ok(())
    }

    fn accepts(&self, event: &MessageEvent) -> bool {
        event.origin == self.endpoint.origin()
            && event.source == Some(self.frame.content_window().id())
    }
}

impl Endpoint for FrameBridge {
    fn endpoint(&self) -> &FrameEndpoint {
        &self.endpoint
    }

    fn trigger(&self, event_name: &str, data: Value) -> Result<()> {
        if is_navigation(event_name) {
            let url = data
                .get("url")
                .and_then(Value::as_str)
                .ok_or_else(|| PeerError::InvalidPayload {
                    event: event_name.to_string(),
                    reason: "missing string field `url`".to_string(),
                })?
                .to_string();

            self.force_navigate(&url)?;

            let mut queue = lock(&self.queue);
            if !self.endpoint.is_ready() {
                *queue = Vec::new();
            }
            queue.push(QueuedEvent::new(event_name, data));
            traffic!(self.endpoint.debug(), url = %url, "navigation forced and queued");
            return Ok(());
        }

        let mut queue = lock(&self.queue);
        // Events still held after a coalescing drain go out first.
        if self.endpoint.is_ready() && queue.is_empty() {
            drop(queue);
            let window = self.frame.content_window();
            return self.endpoint.send_raw(window.as_ref(), event_name, &data);
        }

        queue.push(QueuedEvent::new(event_name, data));
        traffic!(self.endpoint.debug(), event = event_name, "event queued behind pending events");
        Ok(())
    }

    fn handle_message(&self, event: &MessageEvent) -> Dispatch {
        self.endpoint
            .dispatch_incoming(|event| self.accepts(event), event)
    }
}

impl std::fmt::Debug for FrameBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBridge")
            .field("src", &self.src)
            .field("endpoint", &self.endpoint)
            .field("queued", &self.queue_len())
            .field("rpc_timeout", &self.rpc_timeout)
            .finish()
    }
}
