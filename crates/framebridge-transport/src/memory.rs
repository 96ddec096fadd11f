//! In-process hosting environment.
//!
//! Windows record what is posted to them instead of delivering it. A driver
//! (see `framebridge_peer::Loopback`) drains the outboxes and hands the
//! messages to the receiving controller as [`MessageEvent`]s.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{Result, TransportError};
use crate::origin_of;
use crate::traits::{
    ChildHost, Deferred, DocumentState, EmbeddedFrame, FrameAttributes, MessageEvent,
    MessageTarget, ParentHost, WindowId, BLANK_URL,
};

/// Window id of the parent page in a [`MemoryParentHost`].
pub const PARENT_WINDOW: WindowId = WindowId(1);

const OPAQUE_ORIGIN: &str = "null";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A message recorded by [`MemoryWindow::post_message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedMessage {
    pub message: String,
    pub target_origin: String,
    /// False when the target origin did not match the window's document.
    pub accepted: bool,
}

impl PostedMessage {
    /// Turn the posted message into the event the receiving window observes.
    pub fn into_event(self, sender_origin: &str, sender: WindowId) -> MessageEvent {
        MessageEvent::new(sender_origin, Some(sender), self.message)
    }
}

/// A window that keeps everything posted to it in an outbox.
#[derive(Debug)]
pub struct MemoryWindow {
    id: WindowId,
    origin: Mutex<String>,
    outbox: Mutex<Vec<PostedMessage>>,
    closed: AtomicBool,
}

impl MemoryWindow {
    /// Create a window whose document has `origin`.
    pub fn new(id: WindowId, origin: impl Into<String>) -> Self {
        Self {
            id,
            origin: Mutex::new(origin.into()),
            outbox: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Origin of the document currently in this window.
    pub fn origin(&self) -> String {
        lock(&self.origin).clone()
    }

    /// Replace the document origin (the window was navigated).
    pub fn set_origin(&self, origin: impl Into<String>) {
        *lock(&self.origin) = origin.into();
    }

    /// Snapshot of every message posted so far.
    pub fn posted(&self) -> Vec<PostedMessage> {
        lock(&self.outbox).clone()
    }

    /// Drain the outbox.
    pub fn take_posted(&self) -> Vec<PostedMessage> {
        std::mem::take(&mut *lock(&self.outbox))
    }

    /// Number of messages waiting in the outbox.
    pub fn posted_count(&self) -> usize {
        lock(&self.outbox).len()
    }

    /// Make subsequent posts fail with [`TransportError::Closed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl MessageTarget for MemoryWindow {
    fn id(&self) -> WindowId {
        self.id
    }

    fn post_message(&self, message: &str, target_origin: &str) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed(self.id.0));
        }

        let accepted = target_origin == "*" || target_origin == self.origin().as_str();
        if !accepted {
            tracing::trace!(
                window = %self.id,
                target_origin,
                "posted message does not match window origin"
            );
        }

        lock(&self.outbox).push(PostedMessage {
            message: message.to_string(),
            target_origin: target_origin.to_string(),
            accepted,
        });
        Ok(())
    }
}

/// Operation applied to a [`MemoryFrame`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOp {
    Stop,
    Replace(String),
}

/// An embedded frame that records stops and location replacements.
#[derive(Debug)]
pub struct MemoryFrame {
    window: Arc<MemoryWindow>,
    attributes: FrameAttributes,
    location: Mutex<String>,
    ops: Mutex<Vec<FrameOp>>,
    pending_load: Mutex<Option<String>>,
}

impl MemoryFrame {
    fn new(window: Arc<MemoryWindow>, attributes: FrameAttributes) -> Self {
        let src = attributes.src.clone();
        Self {
            window,
            attributes,
            location: Mutex::new(src.clone()),
            ops: Mutex::new(Vec::new()),
            pending_load: Mutex::new(Some(src)),
        }
    }

    /// Concrete content window.
    pub fn window(&self) -> Arc<MemoryWindow> {
        Arc::clone(&self.window)
    }

    /// Attributes the frame was created with.
    pub fn attributes(&self) -> &FrameAttributes {
        &self.attributes
    }

    /// Current frame address.
    pub fn location(&self) -> String {
        lock(&self.location).clone()
    }

    /// Every stop/replace applied by the parent, in order.
    pub fn operations(&self) -> Vec<FrameOp> {
        lock(&self.ops).clone()
    }

    /// Address of a document load that has not been picked up yet.
    pub fn take_pending_load(&self) -> Option<String> {
        lock(&self.pending_load).take()
    }

    /// Record a navigation started by the embedded document itself.
    pub fn record_child_navigation(&self, url: &str) {
        self.load(url);
    }

    fn load(&self, url: &str) {
        *lock(&self.location) = url.to_string();
        self.window
            .set_origin(origin_of(url).unwrap_or_else(|| OPAQUE_ORIGIN.to_string()));
        *lock(&self.pending_load) = Some(url.to_string());
    }
}

impl EmbeddedFrame for MemoryFrame {
    fn content_window(&self) -> Arc<dyn MessageTarget> {
        self.window.clone()
    }

    fn stop(&self) {
        lock(&self.ops).push(FrameOp::Stop);
        lock(&self.pending_load).take();
    }

    fn replace_location(&self, url: &str) -> Result<()> {
        lock(&self.ops).push(FrameOp::Replace(url.to_string()));
        self.load(url);
        Ok(())
    }
}

/// Parent page with a manual deferred-task queue.
pub struct MemoryParentHost {
    origin: String,
    href: String,
    window: Arc<MemoryWindow>,
    next_window: AtomicU64,
    frames: Mutex<Vec<Arc<MemoryFrame>>>,
    deferred: Mutex<VecDeque<Deferred>>,
}

impl MemoryParentHost {
    /// Create a parent page at `href`.
    pub fn new(href: impl Into<String>) -> Self {
        let href = href.into();
        let origin = origin_of(&href).unwrap_or_else(|| OPAQUE_ORIGIN.to_string());
        Self {
            window: Arc::new(MemoryWindow::new(PARENT_WINDOW, origin.clone())),
            origin,
            href,
            next_window: AtomicU64::new(PARENT_WINDOW.0 + 1),
            frames: Mutex::new(Vec::new()),
            deferred: Mutex::new(VecDeque::new()),
        }
    }

    /// The parent's own window; the embedded document posts here.
    pub fn window(&self) -> Arc<MemoryWindow> {
        Arc::clone(&self.window)
    }

    /// Frames created so far.
    pub fn frames(&self) -> Vec<Arc<MemoryFrame>> {
        lock(&self.frames).clone()
    }

    /// Number of frames created so far.
    pub fn frame_count(&self) -> usize {
        lock(&self.frames).len()
    }

    /// Number of tasks waiting for the next turn.
    pub fn deferred_count(&self) -> usize {
        lock(&self.deferred).len()
    }

    /// Run the tasks queued before this call. Returns how many ran.
    pub fn run_deferred(&self) -> usize {
        let tasks: Vec<Deferred> = lock(&self.deferred).drain(..).collect();
        let count = tasks.len();
        for task in tasks {
            task();
        }
        count
    }
}

impl ParentHost for MemoryParentHost {
    fn origin(&self) -> String {
        self.origin.clone()
    }

    fn href(&self) -> String {
        self.href.clone()
    }

    fn create_frame(&self, attributes: &FrameAttributes) -> Result<Arc<dyn EmbeddedFrame>> {
        if url::Url::parse(&attributes.src).is_err() && attributes.src != BLANK_URL {
            return Err(TransportError::FrameCreation {
                src: attributes.src.clone(),
                reason: "src is not an absolute URL".to_string(),
            });
        }

        let id = WindowId(self.next_window.fetch_add(1, Ordering::Relaxed));
        let origin = origin_of(&attributes.src).unwrap_or_else(|| OPAQUE_ORIGIN.to_string());
        let window = Arc::new(MemoryWindow::new(id, origin));
        let frame = Arc::new(MemoryFrame::new(window, attributes.clone()));

        tracing::trace!(window = %id, src = %attributes.src, "created embedded frame");
        lock(&self.frames).push(Arc::clone(&frame));
        Ok(frame)
    }

    fn defer(&self, task: Deferred) {
        lock(&self.deferred).push_back(task);
    }
}

/// Embedded document with a controllable loading lifecycle.
pub struct MemoryChildHost {
    href: Mutex<String>,
    parent: Arc<MemoryWindow>,
    state: Mutex<DocumentState>,
    content_loaded: Mutex<Vec<Deferred>>,
    replaced: Mutex<Vec<String>>,
}

impl MemoryChildHost {
    /// Create a document at `href` that is still loading.
    pub fn new(href: impl Into<String>, parent: Arc<MemoryWindow>) -> Self {
        Self::with_state(href, parent, DocumentState::Loading)
    }

    /// Create a document at `href` in an explicit loading state.
    pub fn with_state(
        href: impl Into<String>,
        parent: Arc<MemoryWindow>,
        state: DocumentState,
    ) -> Self {
        Self {
            href: Mutex::new(href.into()),
            parent,
            state: Mutex::new(state),
            content_loaded: Mutex::new(Vec::new()),
            replaced: Mutex::new(Vec::new()),
        }
    }

    /// Concrete parent window.
    pub fn parent_window(&self) -> Arc<MemoryWindow> {
        Arc::clone(&self.parent)
    }

    /// Fire content-loaded and mark the document complete.
    pub fn finish_loading(&self) {
        *lock(&self.state) = DocumentState::Complete;
        let callbacks = std::mem::take(&mut *lock(&self.content_loaded));
        for callback in callbacks {
            callback();
        }
    }

    /// Every location replacement requested by the document, in order.
    pub fn replacements(&self) -> Vec<String> {
        lock(&self.replaced).clone()
    }

    /// Drain recorded location replacements.
    pub fn take_replacements(&self) -> Vec<String> {
        std::mem::take(&mut *lock(&self.replaced))
    }
}

impl ChildHost for MemoryChildHost {
    fn origin(&self) -> String {
        origin_of(&self.href()).unwrap_or_else(|| OPAQUE_ORIGIN.to_string())
    }

    fn href(&self) -> String {
        lock(&self.href).clone()
    }

    fn parent(&self) -> Arc<dyn MessageTarget> {
        self.parent.clone()
    }

    fn replace_location(&self, url: &str) -> Result<()> {
        lock(&self.replaced).push(url.to_string());
        *lock(&self.href) = url.to_string();
        Ok(())
    }

    fn document_state(&self) -> DocumentState {
        *lock(&self.state)
    }

    fn on_content_loaded(&self, task: Deferred) {
        if self.document_state() == DocumentState::Loading {
            lock(&self.content_loaded).push(task);
        } else {
            task();
        }
    }
}
