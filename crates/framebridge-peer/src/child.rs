use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};

use framebridge_envelope::{rpc_response_event, CHILD_NAVIGATING, CHILD_READY, NAVIGATE, RPC_CALL};
use framebridge_transport::{ChildHost, DocumentState, MessageEvent, MessageTarget};
use serde_json::Value;
use tokio::runtime::Handle;

use crate::config::{ChildConfig, ReadyCheck};
use crate::endpoint::{listener, lock, traffic, Dispatch, Endpoint, EndpointOptions, FrameEndpoint};
use crate::error::Result;
use crate::location;
use crate::rpc::{MethodFuture, MethodResult, RemoteMethod, RpcCall};

/// Controller for the document inside the embedded frame.
pub struct ChildFrame {
    endpoint: Arc<FrameEndpoint>,
    host: Arc<dyn ChildHost>,
    methods: Mutex<HashMap<String, RemoteMethod>>,
}

impl ChildFrame {
    /// Attach to the hosting document and arrange the ready signal.
    ///
    /// Readiness comes from `config.ready_check` when given, otherwise from
    /// the document lifecycle. Use [`crate::FrameRegistry::child_or_create`]
    /// to keep a single child per document.
    pub fn new(host: Arc<dyn ChildHost>, config: ChildConfig) -> Arc<Self> {
        let ChildConfig {
            origin,
            debug,
            ready_check,
            #[cfg(feature = "schema")]
            schema_registry,
        } = config;

        let endpoint = FrameEndpoint::new(EndpointOptions {
            origin: origin.unwrap_or_else(|| host.origin()),
            debug,
        });
        #[cfg(feature = "schema")]
        let endpoint = endpoint.with_schema_registry(schema_registry);

        let child = Arc::new_cyclic(|weak: &Weak<ChildFrame>| {
            let navigate = weak.clone();
            endpoint.on(
                NAVIGATE,
                listener(move |data, _, _| {
                    if let Some(child) = navigate.upgrade() {
                        child.handle_navigate(data);
                    }
                }),
            );
            let rpc = weak.clone();
            endpoint.on(
                RPC_CALL,
                listener(move |data, _, _| {
                    if let Some(child) = rpc.upgrade() {
                        child.handle_rpc_call(data);
                    }
                }),
            );

            ChildFrame {
                endpoint: Arc::new(endpoint),
                host,
                methods: Mutex::new(HashMap::new()),
            }
        });

        child.arrange_ready_signal(ready_check);
        child
    }

    /// Tell the parent this document is ready to receive events.
    pub fn signal_ready(&self) -> Result<()> {
        self.endpoint.set_ready(true);
        self.trigger(CHILD_READY, Value::Null)
    }

    /// Expose a method returning its value directly. Replaces any method
    /// already registered under `name`.
    pub fn register_method<F>(&self, name: &str, method: F) -> &Self
    where
        F: Fn(Vec<Value>) -> MethodResult + Send + Sync + 'static,
    {
        self.insert_method(name, RemoteMethod::Sync(Arc::new(method)))
    }

    /// Expose a method returning a future. Replaces any method already
    /// registered under `name`.
    pub fn register_async_method<F, Fut>(&self, name: &str, method: F) -> &Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MethodResult> + Send + 'static,
    {
        self.insert_method(
            name,
            RemoteMethod::Async(Arc::new(move |args| -> MethodFuture { Box::pin(method(args)) })),
        )
    }

    pub fn has_method(&self, name: &str) -> bool {
        lock(&self.methods).contains_key(name)
    }

    fn insert_method(&self, name: &str, method: RemoteMethod) -> &Self {
        lock(&self.methods).insert(name.to_string(), method);
        traffic!(self.endpoint.debug(), method = name, "registered remote method");
        self
    }

    fn arrange_ready_signal(self: &Arc<Self>, ready_check: Option<ReadyCheck>) {
        if let Some(check) = ready_check {
            match Handle::try_current() {
                Ok(handle) => {
                    let weak = Arc::downgrade(self);
                    handle.spawn(async move {
                        check.await;
                        if let Some(child) = weak.upgrade() {
                            child.signal_ready_logged();
                        }
                    });
                    return;
                }
                Err(_) => tracing::warn!(
                    "ready check supplied outside an async runtime; using document lifecycle"
                ),
            }
        }

        if self.host.document_state() == DocumentState::Loading {
            let weak = Arc::downgrade(self);
            self.host.on_content_loaded(Box::new(move || {
                if let Some(child) = weak.upgrade() {
                    child.signal_ready_logged();
                }
            }));
        } else {
            self.signal_ready_logged();
        }
    }

    fn signal_ready_logged(&self) {
        if let Err(err) = self.signal_ready() {
            tracing::warn!(error = %err, "failed to signal readiness to parent");
        }
    }

    fn handle_navigate(&self, data: &Value) {
        let Some(url) = data.get("url").and_then(Value::as_str) else {
            tracing::warn!(event = NAVIGATE, "navigation command without url");
            return;
        };

        let current = self.host.href();
        let target = location::resolve(&current, url);
        if location::same(&target, &current) {
            traffic!(self.endpoint.debug(), url = %target, "already at navigation target");
            self.signal_ready_logged();
            return;
        }

        self.endpoint.set_ready(false);
        if let Err(err) = self.host.replace_location(&target) {
            tracing::warn!(url = %target, error = %err, "navigation failed");
            return;
        }
        if let Err(err) = self.trigger(CHILD_NAVIGATING, Value::Null) {
            tracing::warn!(error = %err, "failed to announce navigation");
        }
    }

    fn handle_rpc_call(&self, data: &Value) {
        let mut call: RpcCall = match serde_json::from_value(data.clone()) {
            Ok(call) => call,
            Err(err) => {
                tracing::warn!(error = %err, "malformed rpc call");
                return;
            }
        };

        let method = lock(&self.methods).get(&call.fn_name).cloned();
        let Some(method) = method else {
            if self.endpoint.debug() {
                tracing::warn!(
                    uid = call.uid,
                    method = %call.fn_name,
                    "rpc call for unregistered method"
                );
            }
            return;
        };

        let parent = self.host.parent();
        match method {
            RemoteMethod::Sync(method) => {
                let result = method(std::mem::take(&mut call.args));
                respond(&self.endpoint, parent.as_ref(), &call, result);
            }
            RemoteMethod::Async(method) => {
                let Ok(handle) = Handle::try_current() else {
                    tracing::warn!(
                        uid = call.uid,
                        method = %call.fn_name,
                        "async method called outside an async runtime"
                    );
                    return;
                };
                let endpoint = Arc::clone(&self.endpoint);
                let pending = method(std::mem::take(&mut call.args));
                handle.spawn(async move {
                    let result = pending.await;
                    respond(&endpoint, parent.as_ref(), &call, result);
                });
            }
        }
    }

    fn accepts(&self, event: &MessageEvent) -> bool {
        event.origin == self.endpoint.origin() && event.source == Some(self.host.parent().id())
    }
}

fn respond(
    endpoint: &FrameEndpoint,
    parent: &dyn MessageTarget,
    call: &RpcCall,
    result: MethodResult,
) {
    match result {
        Ok(value) => {
            let event_name = rpc_response_event(call.uid);
            if let Err(err) = endpoint.send_raw(parent, &event_name, &value) {
                tracing::warn!(uid = call.uid, error = %err, "failed to send rpc response");
            }
        }
        Err(err) => tracing::warn!(
            uid = call.uid,
            method = %call.fn_name,
            error = %err,
            "remote method failed; no response sent"
        ),
    }
}

impl Endpoint for ChildFrame {
    fn endpoint(&self) -> &FrameEndpoint {
        &self.endpoint
    }

    fn trigger(&self, event_name: &str, data: Value) -> Result<()> {
        let parent = self.host.parent();
        self.endpoint.send_raw(parent.as_ref(), event_name, &data)
    }

    fn handle_message(&self, event: &MessageEvent) -> Dispatch {
        self.endpoint
            .dispatch_incoming(|event| self.accepts(event), event)
    }
}

impl std::fmt::Debug for ChildFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut methods: Vec<String> = lock(&self.methods).keys().cloned().collect();
        methods.sort_unstable();
        f.debug_struct("ChildFrame")
            .field("href", &self.host.href())
            .field("endpoint", &self.endpoint)
            .field("methods", &methods)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use framebridge_envelope::{decode_str, encode};
    use framebridge_transport::memory::{MemoryChildHost, MemoryWindow, PARENT_WINDOW};
    use framebridge_transport::WindowId;
    use serde_json::json;

    use super::*;
    use crate::endpoint::Rejection;
    use crate::rpc::{arg, MethodError};

    const ORIGIN: &str = "https://shop.example.com";
    const HREF: &str = "https://shop.example.com/men/shirts";

    fn child_with_state(
        state: DocumentState,
    ) -> (Arc<MemoryChildHost>, Arc<MemoryWindow>, Arc<ChildFrame>) {
        let parent = Arc::new(MemoryWindow::new(PARENT_WINDOW, ORIGIN));
        let host = Arc::new(MemoryChildHost::with_state(HREF, Arc::clone(&parent), state));
        let child = ChildFrame::new(host.clone(), ChildConfig::default());
        (host, parent, child)
    }

    fn ready_child() -> (Arc<MemoryChildHost>, Arc<MemoryWindow>, Arc<ChildFrame>) {
        let (host, parent, child) = child_with_state(DocumentState::Complete);
        parent.take_posted();
        (host, parent, child)
    }

    fn from_parent(event: &str, data: Value) -> MessageEvent {
        MessageEvent::new(ORIGIN, Some(PARENT_WINDOW), encode(event, &data))
    }

    fn rpc(uid: u64, method: &str, args: Value) -> MessageEvent {
        from_parent(RPC_CALL, json!({ "uid": uid, "fnName": method, "args": args }))
    }

    fn received(parent: &MemoryWindow) -> Vec<(String, Value)> {
        parent
            .take_posted()
            .into_iter()
            .map(|posted| {
                let envelope = decode_str(&posted.message).unwrap();
                (envelope.event_name, envelope.data)
            })
            .collect()
    }

    async fn wait_for_post(parent: &MemoryWindow) {
        for _ in 0..50 {
            if parent.posted_count() > 0 {
                return;
            }
            tokio::task::yield_now().await;
        }
    }

    fn add(args: Vec<Value>) -> MethodResult {
        let a: i64 = arg(&args, 0)?;
        let b: i64 = arg(&args, 1)?;
        Ok(json!(a + b))
    }

    #[test]
    fn signals_ready_immediately_when_document_parsed() {
        for state in [DocumentState::Interactive, DocumentState::Complete] {
            let (_host, parent, child) = child_with_state(state);
            assert_eq!(received(&parent), vec![(CHILD_READY.to_string(), Value::Null)]);
            assert!(child.is_ready());
        }
    }

    #[test]
    fn waits_for_content_loaded_while_loading() {
        let (host, parent, child) = child_with_state(DocumentState::Loading);
        assert_eq!(parent.posted_count(), 0);
        assert!(!child.is_ready());

        host.finish_loading();
        assert_eq!(received(&parent), vec![(CHILD_READY.to_string(), Value::Null)]);
    }

    #[tokio::test]
    async fn ready_check_takes_priority_over_lifecycle() {
        let parent = Arc::new(MemoryWindow::new(PARENT_WINDOW, ORIGIN));
        let host = Arc::new(MemoryChildHost::with_state(
            HREF,
            Arc::clone(&parent),
            DocumentState::Complete,
        ));
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let _child = ChildFrame::new(
            host,
            ChildConfig::default().with_ready_check(async move {
                let _ = rx.await;
            }),
        );

        tokio::task::yield_now().await;
        assert_eq!(parent.posted_count(), 0);

        tx.send(()).unwrap();
        wait_for_post(&parent).await;
        assert_eq!(received(&parent), vec![(CHILD_READY.to_string(), Value::Null)]);
    }

    #[test]
    fn ready_check_without_runtime_falls_back_to_lifecycle() {
        let parent = Arc::new(MemoryWindow::new(PARENT_WINDOW, ORIGIN));
        let host = Arc::new(MemoryChildHost::with_state(
            HREF,
            Arc::clone(&parent),
            DocumentState::Complete,
        ));
        let _child = ChildFrame::new(host, ChildConfig::default().with_ready_check(async {}));
        assert_eq!(received(&parent), vec![(CHILD_READY.to_string(), Value::Null)]);
    }

    #[test]
    fn sync_method_responds_on_correlated_event() {
        let (_host, parent, child) = ready_child();
        child.register_method("add", add);

        let outcome = child.handle_message(&rpc(7, "add", json!([2, 3])));
        assert!(outcome.is_delivered());
        assert_eq!(received(&parent), vec![("bridge:rpc-call:7".to_string(), json!(5))]);
    }

    #[tokio::test]
    async fn async_method_responds_after_await() {
        let (_host, parent, child) = ready_child();
        child.register_async_method("slowEcho", |args: Vec<Value>| async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok::<_, MethodError>(args.into_iter().next().unwrap_or(Value::Null))
        });

        child.handle_message(&rpc(1, "slowEcho", json!(["hi"])));
        assert_eq!(parent.posted_count(), 0);

        tokio::time::timeout(Duration::from_secs(1), async {
            while parent.posted_count() == 0 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(received(&parent), vec![("bridge:rpc-call:1".to_string(), json!("hi"))]);
    }

    #[test]
    fn unknown_method_is_silent() {
        let (_host, parent, child) = ready_child();
        let outcome = child.handle_message(&rpc(3, "missing", json!([])));
        assert!(outcome.is_delivered());
        assert_eq!(parent.posted_count(), 0);
    }

    #[test]
    fn failing_method_sends_no_response() {
        let (_host, parent, child) = ready_child();
        child.register_method("explode", |_| Err(MethodError::new("boom")));
        child.register_method("add", add);

        child.handle_message(&rpc(1, "explode", json!([])));
        child.handle_message(&rpc(2, "add", json!(["x", 1])));
        assert_eq!(parent.posted_count(), 0);
    }

    #[test]
    fn registration_overwrites() {
        let (_host, parent, child) = ready_child();
        child
            .register_method("version", |_| Ok(json!(1)))
            .register_method("version", |_| Ok(json!(2)));
        assert!(child.has_method("version"));

        child.handle_message(&rpc(9, "version", json!([])));
        assert_eq!(received(&parent), vec![("bridge:rpc-call:9".to_string(), json!(2))]);
    }

    #[test]
    fn navigate_to_current_location_only_resignals_ready() {
        let (host, parent, child) = ready_child();
        child.handle_message(&from_parent(NAVIGATE, json!({ "url": "/men/shirts" })));

        assert!(host.replacements().is_empty());
        assert_eq!(received(&parent), vec![(CHILD_READY.to_string(), Value::Null)]);
    }

    #[test]
    fn navigate_elsewhere_replaces_location_and_announces() {
        let (host, parent, child) = ready_child();
        child.handle_message(&from_parent(NAVIGATE, json!({ "url": "../women?page=2" })));

        assert_eq!(host.replacements(), vec!["https://shop.example.com/women?page=2".to_string()]);
        assert_eq!(received(&parent), vec![(CHILD_NAVIGATING.to_string(), Value::Null)]);
        assert!(!child.is_ready());
    }

    #[test]
    fn rejects_messages_not_from_parent() {
        let (_host, parent, child) = ready_child();
        child.register_method("add", add);

        let foreign = MessageEvent::new(
            "https://evil.example",
            Some(PARENT_WINDOW),
            encode(RPC_CALL, &json!({ "uid": 1, "fnName": "add", "args": [1, 1] })),
        );
        let sibling = MessageEvent::new(
            ORIGIN,
            Some(WindowId(42)),
            encode(RPC_CALL, &json!({ "uid": 1, "fnName": "add", "args": [1, 1] })),
        );

        assert_eq!(child.handle_message(&foreign), Dispatch::Rejected(Rejection::Sender));
        assert_eq!(child.handle_message(&sibling), Dispatch::Rejected(Rejection::Sender));
        assert_eq!(parent.posted_count(), 0);
    }

    #[test]
    fn custom_events_reach_listeners() {
        let (_host, _parent, child) = ready_child();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        child.on(
            "cart:updated",
            listener(move |data, _, _| sink.lock().unwrap().push(data.clone())),
        );

        child.handle_message(&from_parent("cart:updated", json!({ "count": 2 })));
        assert_eq!(*seen.lock().unwrap(), vec![json!({ "count": 2 })]);
    }
}
