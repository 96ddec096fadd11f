use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use framebridge_envelope::{decode, encode, Envelope};
use framebridge_transport::{MessageEvent, MessageTarget};
use serde_json::Value;

#[cfg(feature = "schema")]
use crate::config::SchemaRegistryHandle;
use crate::error::Result;

/// Log protocol traffic at debug level when the endpoint runs in debug mode,
/// trace level otherwise.
macro_rules! traffic {
    ($debug:expr, $($arg:tt)+) => {
        if $debug {
            tracing::debug!($($arg)+)
        } else {
            tracing::trace!($($arg)+)
        }
    };
}
pub(crate) use traffic;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Event callback: `(data, event_name, envelope)`.
///
/// Listeners are compared by `Arc` identity, so keep a clone of the handle to
/// pass to `off`.
pub type Listener = Arc<dyn Fn(&Value, &str, &Envelope) + Send + Sync>;

/// Wrap a closure as a [`Listener`].
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&Value, &str, &Envelope) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Resolved endpoint options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointOptions {
    /// Origin accepted from, and declared to, the remote party.
    pub origin: String,
    /// Log traffic at debug level.
    pub debug: bool,
}

/// Why an incoming message was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Wrong origin or wrong source window.
    Sender,
    /// Not a tagged envelope.
    NotProtocol,
    /// Payload violates its registered schema.
    Schema,
    /// Nobody listens for this event.
    NoListeners,
}

/// Outcome of [`FrameEndpoint::dispatch_incoming`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Rejected(Rejection),
    Delivered {
        event: String,
        /// Listeners invoked.
        listeners: usize,
        /// Listeners that panicked.
        panicked: usize,
    },
}

impl Dispatch {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Dispatch::Delivered { .. })
    }
}

/// Dispatch, listener registration and send shared by both ends of the bridge.
pub struct FrameEndpoint {
    options: EndpointOptions,
    listeners: Mutex<HashMap<String, Vec<Listener>>>,
    ready: AtomicBool,
    #[cfg(feature = "schema")]
    schema_registry: Option<SchemaRegistryHandle>,
}

impl FrameEndpoint {
    pub fn new(options: EndpointOptions) -> Self {
        Self {
            options,
            listeners: Mutex::new(HashMap::new()),
            ready: AtomicBool::new(false),
            #[cfg(feature = "schema")]
            schema_registry: None,
        }
    }

    /// Validate incoming payloads against `registry`.
    #[cfg(feature = "schema")]
    pub fn with_schema_registry(mut self, registry: Option<SchemaRegistryHandle>) -> Self {
        self.schema_registry = registry;
        self
    }

    pub fn options(&self) -> &EndpointOptions {
        &self.options
    }

    pub fn origin(&self) -> &str {
        &self.options.origin
    }

    pub fn debug(&self) -> bool {
        self.options.debug
    }

    /// Whether the remote party has completed its handshake.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Set readiness, returning the previous value.
    pub fn set_ready(&self, ready: bool) -> bool {
        self.ready.swap(ready, Ordering::SeqCst)
    }

    /// Append `listener` for `event_name`. The same handle may be added twice.
    pub fn on(&self, event_name: &str, listener: Listener) -> &Self {
        lock(&self.listeners)
            .entry(event_name.to_string())
            .or_default()
            .push(listener);
        traffic!(self.debug(), event = event_name, "registered listener");
        self
    }

    /// Remove the first registration of `listener` for `event_name`.
    pub fn off(&self, event_name: &str, listener: &Listener) -> &Self {
        let mut listeners = lock(&self.listeners);
        if let Some(registered) = listeners.get_mut(event_name) {
            if let Some(index) = registered.iter().position(|l| Arc::ptr_eq(l, listener)) {
                registered.remove(index);
            }
            if registered.is_empty() {
                listeners.remove(event_name);
            }
        }
        self
    }

    /// Number of listeners for `event_name`; `None` when none were ever
    /// registered or all have been removed.
    pub fn listener_count(&self, event_name: &str) -> Option<usize> {
        lock(&self.listeners).get(event_name).map(Vec::len)
    }

    /// Receive path. Each step is a gate; failing one drops the message.
    ///
    /// Listeners run in registration order. A panicking listener is logged
    /// and counted; the remaining listeners still run.
    pub fn dispatch_incoming<F>(&self, accept: F, event: &MessageEvent) -> Dispatch
    where
        F: FnOnce(&MessageEvent) -> bool,
    {
        if !accept(event) {
            traffic!(
                self.debug(),
                origin = %event.origin,
                source = ?event.source,
                "dropping message from unexpected sender"
            );
            return Dispatch::Rejected(Rejection::Sender);
        }

        let Some(envelope) = decode(&event.data) else {
            return Dispatch::Rejected(Rejection::NotProtocol);
        };

        #[cfg(feature = "schema")]
        if let Some(registry) = &self.schema_registry {
            if let Err(err) = registry.validate(&envelope.event_name, &envelope.data) {
                tracing::warn!(
                    event = %envelope.event_name,
                    error = %err,
                    "dropping invalid payload"
                );
                return Dispatch::Rejected(Rejection::Schema);
            }
        }

        let registered = lock(&self.listeners).get(&envelope.event_name).cloned();
        let Some(registered) = registered else {
            traffic!(self.debug(), event = %envelope.event_name, "no listeners for event");
            return Dispatch::Rejected(Rejection::NoListeners);
        };

        traffic!(
            self.debug(),
            event = %envelope.event_name,
            listeners = registered.len(),
            "received event"
        );

        let mut panicked = 0usize;
        for (index, listener) in registered.iter().enumerate() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                listener(&envelope.data, &envelope.event_name, &envelope)
            }));
            if outcome.is_err() {
                panicked += 1;
                tracing::error!(
                    event = %envelope.event_name,
                    listener = index,
                    "listener panicked"
                );
            }
        }

        Dispatch::Delivered {
            event: envelope.event_name,
            listeners: registered.len(),
            panicked,
        }
    }

    /// Encode and post an event to `target`, restricted to the configured origin.
    pub fn send_raw(
        &self,
        target: &dyn MessageTarget,
        event_name: &str,
        data: &Value,
    ) -> Result<()> {
        let message = encode(event_name, data);
        traffic!(
            self.debug(),
            event = event_name,
            target = %target.id(),
            origin = %self.options.origin,
            "sending event"
        );
        target.post_message(&message, &self.options.origin)?;
        Ok(())
    }
}

impl std::fmt::Debug for FrameEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut events: Vec<String> = lock(&self.listeners).keys().cloned().collect();
        events.sort_unstable();
        f.debug_struct("FrameEndpoint")
            .field("options", &self.options)
            .field("ready", &self.is_ready())
            .field("events", &events)
            .finish()
    }
}

/// Behavior common to both controllers.
pub trait Endpoint {
    /// Shared dispatch state.
    fn endpoint(&self) -> &FrameEndpoint;

    /// Send an event to the remote party, subject to the controller's policy.
    fn trigger(&self, event_name: &str, data: Value) -> Result<()>;

    /// Feed a message event received from the hosting environment.
    fn handle_message(&self, event: &MessageEvent) -> Dispatch;

    fn on(&self, event_name: &str, listener: Listener) -> &Self
    where
        Self: Sized,
    {
        self.endpoint().on(event_name, listener);
        self
    }

    fn off(&self, event_name: &str, listener: &Listener) -> &Self
    where
        Self: Sized,
    {
        self.endpoint().off(event_name, listener);
        self
    }

    fn is_ready(&self) -> bool {
        self.endpoint().is_ready()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use framebridge_transport::memory::MemoryWindow;
    use framebridge_transport::WindowId;
    use serde_json::json;

    use super::*;

    const ORIGIN: &str = "https://shop.example.com";

    fn endpoint() -> FrameEndpoint {
        FrameEndpoint::new(EndpointOptions {
            origin: ORIGIN.to_string(),
            debug: false,
        })
    }

    fn tagged(event: &str, data: Value) -> MessageEvent {
        MessageEvent::new(ORIGIN, Some(WindowId(2)), encode(event, &data))
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &str) -> Listener {
        let log = Arc::clone(log);
        let tag = tag.to_string();
        listener(move |data, event, _| {
            log.lock().unwrap().push(format!("{tag}:{event}:{data}"));
        })
    }

    #[test]
    fn fans_out_in_registration_order() {
        let endpoint = endpoint();
        let log = Arc::new(Mutex::new(Vec::new()));
        endpoint
            .on("foo", recorder(&log, "first"))
            .on("foo", recorder(&log, "second"))
            .on("bar", recorder(&log, "bar"));

        let outcome = endpoint.dispatch_incoming(|_| true, &tagged("foo", json!(1)));

        assert_eq!(
            outcome,
            Dispatch::Delivered {
                event: "foo".to_string(),
                listeners: 2,
                panicked: 0
            }
        );
        assert_eq!(
            *log.lock().unwrap(),
            vec!["first:foo:1".to_string(), "second:foo:1".to_string()]
        );
    }

    #[test]
    fn same_listener_twice_runs_twice() {
        let endpoint = endpoint();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let handle = listener(move |_, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        endpoint.on("foo", Arc::clone(&handle)).on("foo", handle);

        endpoint.dispatch_incoming(|_| true, &tagged("foo", Value::Null));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn off_removes_entry_when_last_listener_goes() {
        let endpoint = endpoint();
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = recorder(&log, "first");
        let second = recorder(&log, "second");
        endpoint.on("foo", Arc::clone(&first)).on("foo", Arc::clone(&second));
        assert_eq!(endpoint.listener_count("foo"), Some(2));

        endpoint.off("foo", &first);
        assert_eq!(endpoint.listener_count("foo"), Some(1));
        endpoint.off("foo", &second);
        assert_eq!(endpoint.listener_count("foo"), None);

        endpoint.off("foo", &second).off("never", &first);
        assert_eq!(endpoint.listener_count("never"), None);
    }

    #[test]
    fn off_removes_only_first_match() {
        let endpoint = endpoint();
        let log = Arc::new(Mutex::new(Vec::new()));
        let handle = recorder(&log, "dup");
        endpoint.on("foo", Arc::clone(&handle)).on("foo", Arc::clone(&handle));
        endpoint.off("foo", &handle);
        assert_eq!(endpoint.listener_count("foo"), Some(1));
    }

    #[test]
    fn gates_reject_in_order() {
        let endpoint = endpoint();
        let log = Arc::new(Mutex::new(Vec::new()));
        endpoint.on("foo", recorder(&log, "l"));

        assert_eq!(
            endpoint.dispatch_incoming(|_| false, &tagged("foo", Value::Null)),
            Dispatch::Rejected(Rejection::Sender)
        );
        assert_eq!(
            endpoint.dispatch_incoming(
                |_| true,
                &MessageEvent::new(ORIGIN, None, r#"{"eventName":"foo"}"#)
            ),
            Dispatch::Rejected(Rejection::NotProtocol)
        );
        assert_eq!(
            endpoint.dispatch_incoming(|_| true, &tagged("other", Value::Null)),
            Dispatch::Rejected(Rejection::NoListeners)
        );
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn panicking_listener_does_not_stop_the_rest() {
        let endpoint = endpoint();
        let log = Arc::new(Mutex::new(Vec::new()));
        endpoint
            .on("foo", listener(|_, _, _| panic!("listener failure")))
            .on("foo", recorder(&log, "after"));

        let outcome = endpoint.dispatch_incoming(|_| true, &tagged("foo", json!("x")));
        assert_eq!(
            outcome,
            Dispatch::Delivered {
                event: "foo".to_string(),
                listeners: 2,
                panicked: 1
            }
        );
        assert_eq!(*log.lock().unwrap(), vec!["after:foo:\"x\"".to_string()]);
    }

    #[test]
    fn listener_may_unregister_itself_during_dispatch() {
        let endpoint = Arc::new(endpoint());
        let slot: Arc<Mutex<Option<Listener>>> = Arc::new(Mutex::new(None));
        let hits = Arc::new(AtomicUsize::new(0));

        let weak = Arc::downgrade(&endpoint);
        let own = Arc::clone(&slot);
        let counter = Arc::clone(&hits);
        let once = listener(move |_, event, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let (Some(endpoint), Some(me)) = (weak.upgrade(), own.lock().unwrap().clone()) {
                endpoint.off(event, &me);
            }
        });
        *slot.lock().unwrap() = Some(Arc::clone(&once));
        endpoint.on("once", once);

        endpoint.dispatch_incoming(|_| true, &tagged("once", Value::Null));
        endpoint.dispatch_incoming(|_| true, &tagged("once", Value::Null));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(endpoint.listener_count("once"), None);
    }

    #[test]
    fn send_raw_posts_tagged_payload_to_configured_origin() {
        let endpoint = endpoint();
        let window = MemoryWindow::new(WindowId(2), ORIGIN);
        endpoint
            .send_raw(&window, "cart:updated", &json!({ "count": 3 }))
            .unwrap();

        let posted = window.take_posted();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].target_origin, ORIGIN);
        let envelope = framebridge_envelope::decode_str(&posted[0].message).unwrap();
        assert_eq!(envelope.event_name, "cart:updated");
        assert_eq!(envelope.data, json!({ "count": 3 }));
    }

    #[cfg(feature = "schema")]
    #[test]
    fn schema_violations_never_reach_listeners() {
        let mut registry = framebridge_schema::SchemaRegistry::new();
        let schema = r#"{
            "type": "object",
            "required": ["count"],
            "properties": { "count": { "type": "integer" } }
        }"#;
        registry.register("cart:updated", schema).unwrap();
        let endpoint = endpoint().with_schema_registry(Some(Arc::new(registry)));
        let log = Arc::new(Mutex::new(Vec::new()));
        endpoint.on("cart:updated", recorder(&log, "l"));

        assert_eq!(
            endpoint.dispatch_incoming(|_| true, &tagged("cart:updated", json!({ "count": "x" }))),
            Dispatch::Rejected(Rejection::Schema)
        );
        assert!(endpoint
            .dispatch_incoming(|_| true, &tagged("cart:updated", json!({ "count": 2 })))
            .is_delivered());
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn ready_flag_swaps() {
        let endpoint = endpoint();
        assert!(!endpoint.is_ready());
        assert!(!endpoint.set_ready(true));
        assert!(endpoint.is_ready());
        assert!(endpoint.set_ready(false));
    }
}
