use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;

/// Placeholder document loaded into a frame to interrupt an in-flight load.
pub const BLANK_URL: &str = "about:blank";

/// Opaque identity of a window, used to check the `source` of message events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(pub u64);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window-{}", self.0)
    }
}

/// A message event as delivered by the hosting environment.
///
/// `data` is whatever the sender posted. The bridge only ever posts strings,
/// but the channel is shared with unrelated senders that may post anything.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    /// Serialized origin of the sending document.
    pub origin: String,
    /// Window that posted the message, if known.
    pub source: Option<WindowId>,
    /// Raw posted data.
    pub data: Value,
}

impl MessageEvent {
    /// Build an event carrying a string payload.
    pub fn new(
        origin: impl Into<String>,
        source: Option<WindowId>,
        data: impl Into<Value>,
    ) -> Self {
        Self {
            origin: origin.into(),
            source,
            data: data.into(),
        }
    }
}

/// A window that accepts posted messages.
pub trait MessageTarget: Send + Sync {
    /// Identity of this window.
    fn id(&self) -> WindowId;

    /// Post `message`, restricting delivery to documents whose origin is
    /// `target_origin`. No acknowledgement is returned.
    fn post_message(&self, message: &str, target_origin: &str) -> Result<()>;
}

/// Sandbox permissions granted to the embedded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SandboxFlag {
    AllowScripts,
    AllowSameOrigin,
    AllowForms,
}

impl SandboxFlag {
    /// Attribute token for this permission.
    pub fn as_str(self) -> &'static str {
        match self {
            SandboxFlag::AllowScripts => "allow-scripts",
            SandboxFlag::AllowSameOrigin => "allow-same-origin",
            SandboxFlag::AllowForms => "allow-forms",
        }
    }
}

/// Attributes the parent applies when it creates the embedded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameAttributes {
    /// Initial address loaded into the frame.
    pub src: String,
    /// Granted sandbox permissions. Everything else is disabled.
    pub sandbox: Vec<SandboxFlag>,
    /// Whether the frame is rendered visibly.
    pub visible: bool,
}

impl FrameAttributes {
    /// Space-separated `sandbox` attribute value.
    pub fn sandbox_attribute(&self) -> String {
        self.sandbox
            .iter()
            .map(|flag| flag.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Work scheduled for the next turn of the host's event loop.
pub type Deferred = Box<dyn FnOnce() + Send>;

/// The frame element owned by the parent page.
pub trait EmbeddedFrame: Send + Sync {
    /// Window handle of the document currently inside the frame.
    fn content_window(&self) -> Arc<dyn MessageTarget>;

    /// Stop any in-flight document load.
    fn stop(&self);

    /// Navigate the frame to `url`, replacing the current history entry.
    fn replace_location(&self, url: &str) -> Result<()>;
}

/// The page that hosts the parent controller.
pub trait ParentHost: Send + Sync {
    /// Serialized origin of the hosting document.
    fn origin(&self) -> String;

    /// Current address of the hosting document.
    fn href(&self) -> String;

    /// Create and attach the embedded frame.
    fn create_frame(&self, attributes: &FrameAttributes) -> Result<Arc<dyn EmbeddedFrame>>;

    /// Run `task` on the next scheduling turn.
    fn defer(&self, task: Deferred);
}

/// Loading progress of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    /// Still parsing; content-loaded has not fired.
    Loading,
    /// Parsed; sub-resources may still be loading.
    Interactive,
    /// Fully loaded.
    Complete,
}

/// The document running inside the embedded frame.
pub trait ChildHost: Send + Sync {
    /// Serialized origin of the embedded document.
    fn origin(&self) -> String;

    /// Current address of the embedded document.
    fn href(&self) -> String;

    /// Window handle of the parent page.
    fn parent(&self) -> Arc<dyn MessageTarget>;

    /// Navigate this document to `url`, replacing the current history entry.
    fn replace_location(&self, url: &str) -> Result<()>;

    /// Current loading progress.
    fn document_state(&self) -> DocumentState;

    /// Run `task` once the document's content-loaded signal fires.
    fn on_content_loaded(&self, task: Deferred);
}
