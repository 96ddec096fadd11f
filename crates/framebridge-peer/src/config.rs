use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Default bound on how long [`crate::FrameBridge::call_method`] waits.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared payload schema registry.
#[cfg(feature = "schema")]
pub type SchemaRegistryHandle = std::sync::Arc<framebridge_schema::SchemaRegistry>;

/// Caller-supplied readiness check for the child document.
pub type ReadyCheck = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Configuration for the parent-side [`crate::FrameBridge`].
#[derive(Clone)]
pub struct BridgeConfig {
    /// Origin accepted from and declared to the child. Default: the hosting
    /// document's origin.
    pub origin: Option<String>,
    /// Log protocol traffic at debug level and make the frame visible.
    pub debug: bool,
    /// Initial frame address. Default: the hosting document's address.
    pub src: Option<String>,
    /// Bound on RPC calls. `None` waits forever.
    pub rpc_timeout: Option<Duration>,
    /// Payload schemas enforced on incoming events.
    #[cfg(feature = "schema")]
    pub schema_registry: Option<SchemaRegistryHandle>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            origin: None,
            debug: false,
            src: None,
            rpc_timeout: Some(DEFAULT_RPC_TIMEOUT),
            #[cfg(feature = "schema")]
            schema_registry: None,
        }
    }
}

impl BridgeConfig {
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_src(mut self, src: impl Into<String>) -> Self {
        self.src = Some(src.into());
        self
    }

    pub fn with_rpc_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    #[cfg(feature = "schema")]
    pub fn with_schema_registry(mut self, registry: SchemaRegistryHandle) -> Self {
        self.schema_registry = Some(registry);
        self
    }
}

impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("BridgeConfig");
        dbg.field("origin", &self.origin)
            .field("debug", &self.debug)
            .field("src", &self.src)
            .field("rpc_timeout", &self.rpc_timeout);
        #[cfg(feature = "schema")]
        dbg.field("schema_registry", &self.schema_registry.is_some());
        dbg.finish()
    }
}

/// Configuration for the child-side [`crate::ChildFrame`].
#[derive(Default)]
pub struct ChildConfig {
    /// Origin accepted from and declared to the parent. Default: the
    /// embedded document's origin.
    pub origin: Option<String>,
    /// Log protocol traffic at debug level.
    pub debug: bool,
    /// Replaces document-lifecycle readiness detection when set.
    pub ready_check: Option<ReadyCheck>,
    /// Payload schemas enforced on incoming events.
    #[cfg(feature = "schema")]
    pub schema_registry: Option<SchemaRegistryHandle>,
}

impl ChildConfig {
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Signal readiness once `check` completes.
    pub fn with_ready_check<F>(mut self, check: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.ready_check = Some(Box::pin(check));
        self
    }

    #[cfg(feature = "schema")]
    pub fn with_schema_registry(mut self, registry: SchemaRegistryHandle) -> Self {
        self.schema_registry = Some(registry);
        self
    }
}

impl fmt::Debug for ChildConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("ChildConfig");
        dbg.field("origin", &self.origin).field("debug", &self.debug);
        if self.ready_check.is_some() {
            dbg.field("ready_check", &format_args!("<future>"));
        } else {
            dbg.field("ready_check", &Option::<()>::None);
        }
        #[cfg(feature = "schema")]
        dbg.field("schema_registry", &self.schema_registry.is_some());
        dbg.finish()
    }
}
