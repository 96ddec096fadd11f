//! In-memory parent/child session.
//!
//! [`Loopback`] wires a [`FrameBridge`] to a [`ChildFrame`] through the
//! memory transport. [`Loopback::settle`] plays the role of the browser event
//! loop: it runs deferred tasks, loads a fresh child document whenever the
//! frame is navigated, and delivers posted messages until nothing is left
//! to do.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use framebridge_envelope::decode_str;
use framebridge_transport::memory::{
    MemoryChildHost, MemoryFrame, MemoryParentHost, PostedMessage, PARENT_WINDOW,
};
use framebridge_transport::{ChildHost, MessageTarget, ParentHost, BLANK_URL};
use serde::Serialize;
use serde_json::Value;

use crate::child::ChildFrame;
use crate::config::{BridgeConfig, ChildConfig};
use crate::endpoint::{lock, Dispatch, Endpoint};
use crate::error::{PeerError, Result};
use crate::parent::FrameBridge;

const IDLE_ROUNDS: usize = 3;
const MAX_ROUNDS: usize = 1_000;

/// Runs against each freshly loaded child document, before it signals ready.
pub type ChildSetup = Arc<dyn Fn(&Arc<ChildFrame>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    ParentToChild,
    ChildToParent,
}

/// What happened to a posted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the receiving controller.
    Dispatched(Dispatch),
    /// The target origin did not match the receiving document.
    OriginMismatch,
    /// The receiving document was replaced before delivery.
    Lost,
}

impl Delivery {
    /// Short label for reports.
    pub fn label(&self) -> String {
        match self {
            Delivery::Dispatched(Dispatch::Delivered { listeners, panicked, .. }) => {
                if *panicked > 0 {
                    format!("delivered({listeners}, {panicked} panicked)")
                } else {
                    format!("delivered({listeners})")
                }
            }
            Delivery::Dispatched(Dispatch::Rejected(rejection)) => {
                format!("rejected({rejection:?})").to_lowercase()
            }
            Delivery::OriginMismatch => "origin-mismatch".to_string(),
            Delivery::Lost => "lost".to_string(),
        }
    }
}

/// One posted message and its fate.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEntry {
    pub direction: Direction,
    /// `None` when the payload was not a tagged envelope.
    pub event_name: Option<String>,
    pub data: Value,
    pub outcome: Delivery,
}

impl TranscriptEntry {
    fn new(direction: Direction, posted: &PostedMessage, outcome: Delivery) -> Self {
        let envelope = decode_str(&posted.message);
        Self {
            direction,
            event_name: envelope.as_ref().map(|e| e.event_name.clone()),
            data: envelope.map(|e| e.data).unwrap_or(Value::Null),
            outcome,
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(&self.outcome, Delivery::Dispatched(dispatch) if dispatch.is_delivered())
    }
}

struct LoadedChild {
    host: Arc<MemoryChildHost>,
    frame: Arc<ChildFrame>,
}

/// A bridge and its embedded child, connected in memory.
pub struct Loopback {
    parent: Arc<MemoryParentHost>,
    bridge: Arc<FrameBridge>,
    frame: Arc<MemoryFrame>,
    child_debug: bool,
    setup: Option<ChildSetup>,
    child: Mutex<Option<LoadedChild>>,
    transcript: Mutex<Vec<TranscriptEntry>>,
    loads: AtomicUsize,
}

impl Loopback {
    /// Create a parent page at `href` and its bridge.
    ///
    /// The child document is not loaded until the first [`Loopback::settle`].
    pub fn new(href: &str, config: BridgeConfig) -> Result<Self> {
        let child_debug = config.debug;
        let parent = Arc::new(MemoryParentHost::new(href));
        let bridge = FrameBridge::new(parent.clone(), config)?;
        let frame = parent.frames().pop().ok_or_else(|| {
            PeerError::Disconnected("parent host created no frame".to_string())
        })?;

        Ok(Self {
            parent,
            bridge,
            frame,
            child_debug,
            setup: None,
            child: Mutex::new(None),
            transcript: Mutex::new(Vec::new()),
            loads: AtomicUsize::new(0),
        })
    }

    /// Run `setup` on every child document as it loads.
    pub fn with_child_setup<F>(mut self, setup: F) -> Self
    where
        F: Fn(&Arc<ChildFrame>) + Send + Sync + 'static,
    {
        self.setup = Some(Arc::new(setup));
        self
    }

    pub fn bridge(&self) -> &Arc<FrameBridge> {
        &self.bridge
    }

    pub fn parent_host(&self) -> &Arc<MemoryParentHost> {
        &self.parent
    }

    pub fn frame(&self) -> &Arc<MemoryFrame> {
        &self.frame
    }

    /// Child controller of the current document, if one is loaded.
    pub fn child(&self) -> Option<Arc<ChildFrame>> {
        lock(&self.child).as_ref().map(|loaded| Arc::clone(&loaded.frame))
    }

    /// Address of the current child document, if one is loaded.
    pub fn child_href(&self) -> Option<String> {
        lock(&self.child).as_ref().map(|loaded| loaded.host.href())
    }

    /// Number of child documents loaded so far.
    pub fn document_loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn transcript(&self) -> Vec<TranscriptEntry> {
        lock(&self.transcript).clone()
    }

    pub fn take_transcript(&self) -> Vec<TranscriptEntry> {
        std::mem::take(&mut *lock(&self.transcript))
    }

    /// Names of events that reached a child listener, in delivery order.
    pub fn delivered_to_child(&self) -> Vec<String> {
        lock(&self.transcript)
            .iter()
            .filter(|entry| entry.direction == Direction::ParentToChild && entry.is_delivered())
            .filter_map(|entry| entry.event_name.clone())
            .collect()
    }

    /// Pump the session until it goes quiet. Returns the number of messages
    /// moved between the windows.
    ///
    /// Yields to the runtime between rounds so spawned tasks (ready checks,
    /// async remote methods) get to run.
    pub async fn settle(&self) -> usize {
        let mut moved = 0usize;
        let mut idle = 0usize;

        for _ in 0..MAX_ROUNDS {
            let (progressed, delivered) = self.round();
            moved += delivered;
            if progressed {
                idle = 0;
            } else {
                idle += 1;
                if idle >= IDLE_ROUNDS {
                    return moved;
                }
            }
            tokio::task::yield_now().await;
        }

        tracing::warn!(rounds = MAX_ROUNDS, "loopback session did not settle");
        moved
    }

    fn round(&self) -> (bool, usize) {
        let mut progressed = self.parent.run_deferred() > 0;

        if let Some(url) = self.frame.take_pending_load() {
            self.load_child(&url);
            progressed = true;
        }

        let mut delivered = 0usize;
        for posted in self.frame.window().take_posted() {
            self.deliver_to_child(posted);
            delivered += 1;
        }
        for posted in self.parent.window().take_posted() {
            self.deliver_to_parent(posted);
            delivered += 1;
        }

        let replacements = lock(&self.child)
            .as_ref()
            .map(|loaded| loaded.host.take_replacements())
            .unwrap_or_default();
        for url in replacements {
            self.frame.record_child_navigation(&url);
            progressed = true;
        }

        (progressed || delivered > 0, delivered)
    }

    fn load_child(&self, url: &str) {
        lock(&self.child).take();
        for posted in self.frame.window().take_posted() {
            self.record(TranscriptEntry::new(Direction::ParentToChild, &posted, Delivery::Lost));
        }

        if url == BLANK_URL {
            tracing::trace!("frame holds a blank document");
            return;
        }

        let host = Arc::new(MemoryChildHost::new(url, self.parent.window()));
        let frame = ChildFrame::new(
            host.clone(),
            ChildConfig::default().with_debug(self.child_debug),
        );
        if let Some(setup) = &self.setup {
            setup(&frame);
        }
        *lock(&self.child) = Some(LoadedChild {
            host: Arc::clone(&host),
            frame,
        });
        self.loads.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(url, "child document loaded");

        host.finish_loading();
    }

    fn deliver_to_child(&self, posted: PostedMessage) {
        let child = self.child();
        let outcome = match child {
            _ if !posted.accepted => Delivery::OriginMismatch,
            None => Delivery::Lost,
            Some(child) => {
                let event = posted.clone().into_event(&self.parent.origin(), PARENT_WINDOW);
                Delivery::Dispatched(child.handle_message(&event))
            }
        };
        self.record(TranscriptEntry::new(Direction::ParentToChild, &posted, outcome));
    }

    fn deliver_to_parent(&self, posted: PostedMessage) {
        let outcome = if posted.accepted {
            let window = self.frame.window();
            let event = posted.clone().into_event(&window.origin(), window.id());
            Delivery::Dispatched(self.bridge.handle_message(&event))
        } else {
            Delivery::OriginMismatch
        };
        self.record(TranscriptEntry::new(Direction::ChildToParent, &posted, outcome));
    }

    fn record(&self, entry: TranscriptEntry) {
        lock(&self.transcript).push(entry);
    }
}

impl std::fmt::Debug for Loopback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loopback")
            .field("bridge", &self.bridge)
            .field("child_href", &self.child_href())
            .field("document_loads", &self.document_loads())
            .field("transcript", &lock(&self.transcript).len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const HREF: &str = "https://shop.example.com/home";

    #[tokio::test]
    async fn first_settle_loads_child_and_completes_handshake() {
        let session = Loopback::new(HREF, BridgeConfig::default()).unwrap();
        assert!(session.child().is_none());

        session.settle().await;

        assert_eq!(session.document_loads(), 1);
        assert_eq!(session.child_href().as_deref(), Some(HREF));
        assert!(session.bridge().is_ready());
        let transcript = session.transcript();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].direction, Direction::ChildToParent);
        assert_eq!(transcript[0].event_name.as_deref(), Some("bridge:child-ready"));
        assert!(transcript[0].is_delivered());
    }

    #[tokio::test]
    async fn queued_events_arrive_after_handshake() {
        let session = Loopback::new(HREF, BridgeConfig::default())
            .unwrap()
            .with_child_setup(|child| {
                child.on("greet", crate::endpoint::listener(|_, _, _| {}));
            });
        session.bridge().trigger("greet", json!("hello")).unwrap();
        session.settle().await;

        assert_eq!(session.delivered_to_child(), vec!["greet"]);
        assert_eq!(session.bridge().queue_len(), 0);
    }

    #[tokio::test]
    async fn child_initiated_navigation_reloads_document() {
        let session = Loopback::new(HREF, BridgeConfig::default()).unwrap();
        session.settle().await;

        session.bridge().navigate("/cart").unwrap();
        session.settle().await;

        assert_eq!(session.child_href().as_deref(), Some("https://shop.example.com/cart"));
        assert!(session.bridge().is_ready());
        assert_eq!(session.document_loads(), 2);
    }

    #[test]
    fn delivery_labels() {
        assert_eq!(Delivery::Lost.label(), "lost");
        assert_eq!(
            Delivery::Dispatched(Dispatch::Rejected(
                crate::endpoint::Rejection::NoListeners
            ))
            .label(),
            "rejected(nolisteners)"
        );
        assert_eq!(
            Delivery::Dispatched(Dispatch::Delivered {
                event: "x".to_string(),
                listeners: 2,
                panicked: 0
            })
            .label(),
            "delivered(2)"
        );
    }
}
