//! UI ports.
//!
//! The game page is an opaque external collaborator. Inbound, the host
//! bridge feeds the observer a stream of [`UiEvent`]s (mutation batches,
//! visibility changes, scrolls). Outbound, features render through an
//! [`OverlaySink`]: overlay nodes are identified by stable class names so
//! the owning feature can find and remove its own nodes on disable.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// One element observed in (or injected into) the page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UiNode {
    pub node_id: u64,
    pub class_names: Vec<String>,
    pub text: String,
    pub attributes: HashMap<String, String>,
}

impl UiNode {
    pub fn has_class(&self, class_name: &str) -> bool {
        self.class_names.iter().any(|c| c == class_name)
    }
}

/// One batch of DOM mutations, coalesced by the host bridge.
#[derive(Debug, Clone, Default)]
pub struct MutationBatch {
    pub added: Vec<UiNode>,
    pub removed: Vec<UiNode>,
}

impl MutationBatch {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Fold another batch into this one, preserving order.
    pub fn merge(&mut self, other: MutationBatch) {
        self.added.extend(other.added);
        self.removed.extend(other.removed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityState {
    Visible,
    Hidden,
}

/// Inbound UI events delivered to the observer pump.
#[derive(Debug, Clone)]
pub enum UiEvent {
    Mutations(MutationBatch),
    VisibilityChanged(VisibilityState),
    Scrolled,
}

/// An overlay node owned by a feature.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayNode {
    pub node_id: u64,
    pub class_name: String,
    pub content: String,
}

/// Outbound UI surface.
///
/// `inject`/`remove_by_class` are the overlay contract; `query_nodes` and
/// `sprite_url` are read probes against the already-rendered page (the
/// sprite sheet URL is webpack-hashed and must be probed, never
/// hardcoded).
pub trait OverlaySink: Send + Sync {
    /// Inject an overlay node; returns its id.
    fn inject(&self, class_name: &str, content: &str) -> u64;
    /// Replace the content of an existing overlay node. Returns false if
    /// the node is gone.
    fn update(&self, node_id: u64, content: &str) -> bool;
    fn remove(&self, node_id: u64) -> bool;
    /// Remove every node carrying the class. Returns how many went away.
    fn remove_by_class(&self, class_name: &str) -> usize;
    fn count_by_class(&self, class_name: &str) -> usize;
    /// Read currently-rendered nodes carrying the class.
    fn query_nodes(&self, class_name: &str) -> Vec<UiNode>;
    /// Current sprite sheet URL, probed from a rendered icon.
    fn sprite_url(&self) -> Option<String>;
}

/// In-memory overlay surface.
///
/// This is both the production default (the host bridge renders from it)
/// and the test double: it keeps the injected nodes and mirrors rendered
/// page nodes for the query probes.
#[derive(Default)]
pub struct MemoryOverlay {
    next_id: AtomicU64,
    overlays: Mutex<Vec<OverlayNode>>,
    page_nodes: Mutex<Vec<UiNode>>,
}

impl MemoryOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror a rendered page node so query probes can see it.
    pub fn add_page_node(&self, node: UiNode) {
        if let Ok(mut nodes) = self.page_nodes.lock() {
            nodes.push(node);
        }
    }

    pub fn overlay_nodes(&self) -> Vec<OverlayNode> {
        self.overlays.lock().map(|o| o.clone()).unwrap_or_default()
    }
}

impl OverlaySink for MemoryOverlay {
    fn inject(&self, class_name: &str, content: &str) -> u64 {
        let node_id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        if let Ok(mut overlays) = self.overlays.lock() {
            overlays.push(OverlayNode {
                node_id,
                class_name: class_name.to_string(),
                content: content.to_string(),
            });
        }
        node_id
    }

    fn update(&self, node_id: u64, content: &str) -> bool {
        let Ok(mut overlays) = self.overlays.lock() else {
            return false;
        };
        match overlays.iter_mut().find(|n| n.node_id == node_id) {
            Some(node) => {
                node.content = content.to_string();
                true
            }
            None => false,
        }
    }

    fn remove(&self, node_id: u64) -> bool {
        let Ok(mut overlays) = self.overlays.lock() else {
            return false;
        };
        let before = overlays.len();
        overlays.retain(|n| n.node_id != node_id);
        overlays.len() != before
    }

    fn remove_by_class(&self, class_name: &str) -> usize {
        let Ok(mut overlays) = self.overlays.lock() else {
            return 0;
        };
        let before = overlays.len();
        overlays.retain(|n| n.class_name != class_name);
        before - overlays.len()
    }

    fn count_by_class(&self, class_name: &str) -> usize {
        self.overlays
            .lock()
            .map(|o| o.iter().filter(|n| n.class_name == class_name).count())
            .unwrap_or(0)
    }

    fn query_nodes(&self, class_name: &str) -> Vec<UiNode> {
        self.page_nodes
            .lock()
            .map(|nodes| {
                nodes
                    .iter()
                    .filter(|n| n.has_class(class_name))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn sprite_url(&self) -> Option<String> {
        // Probe any rendered icon's href and strip the fragment.
        self.page_nodes
            .lock()
            .ok()?
            .iter()
            .find_map(|n| n.attributes.get("href"))
            .map(|href| href.split('#').next().unwrap_or(href).to_string())
    }
}
