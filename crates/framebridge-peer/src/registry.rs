use std::sync::{Arc, Mutex};

use framebridge_transport::{ChildHost, ParentHost};

use crate::child::ChildFrame;
use crate::config::{BridgeConfig, ChildConfig};
use crate::endpoint::lock;
use crate::error::Result;
use crate::parent::FrameBridge;

/// One bridge and one child per hosting context.
///
/// Keep a registry next to whatever represents the page. The first
/// `*_or_create` call constructs the controller; later calls return the same
/// instance and ignore their arguments.
#[derive(Debug, Default)]
pub struct FrameRegistry {
    bridge: Mutex<Option<Arc<FrameBridge>>>,
    child: Mutex<Option<Arc<ChildFrame>>>,
}

impl FrameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bridge_or_create(
        &self,
        host: Arc<dyn ParentHost>,
        config: BridgeConfig,
    ) -> Result<Arc<FrameBridge>> {
        let mut slot = lock(&self.bridge);
        if let Some(bridge) = slot.as_ref() {
            tracing::debug!(src = %bridge.src(), "reusing existing bridge");
            return Ok(Arc::clone(bridge));
        }

        let bridge = FrameBridge::new(host, config)?;
        *slot = Some(Arc::clone(&bridge));
        Ok(bridge)
    }

    pub fn child_or_create(
        &self,
        host: Arc<dyn ChildHost>,
        config: ChildConfig,
    ) -> Arc<ChildFrame> {
        let mut slot = lock(&self.child);
        if let Some(child) = slot.as_ref() {
            tracing::debug!("reusing existing child frame");
            return Arc::clone(child);
        }

        let child = ChildFrame::new(host, config);
        *slot = Some(Arc::clone(&child));
        child
    }

    pub fn bridge(&self) -> Option<Arc<FrameBridge>> {
        lock(&self.bridge).clone()
    }

    pub fn child(&self) -> Option<Arc<ChildFrame>> {
        lock(&self.child).clone()
    }
}
