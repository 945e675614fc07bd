//! The host document as seen by the tracker.
//!
//! Implementations expose a handful of structural primitives; selector
//! matching and tree queries are built on top of them here so every host
//! behaves the same way.

pub mod memory;
pub mod selector;

use serde::Serialize;
use tokio::sync::broadcast;

pub use memory::{ComposeFixture, MemoryDocument};
pub use selector::Selector;

/// Opaque handle to an element in the host document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub u64);

/// A batch of subtree insertions and removals, in the order they happened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mutation {
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    KeyDown,
    Input,
    Paste,
    Focus,
    Click,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomEvent {
    pub kind: EventKind,
    pub target: NodeId,
}

pub trait Document: Send + Sync {
    fn body(&self) -> NodeId;

    /// Lower-case tag name, or `None` for a handle the document never issued.
    fn tag_name(&self, node: NodeId) -> Option<String>;

    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    fn set_attribute(&self, node: NodeId, name: &str, value: &str);

    fn remove_attribute(&self, node: NodeId, name: &str);

    /// Parent element; `None` for the body and for detached subtree roots.
    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// Child elements in document order.
    fn children(&self, node: NodeId) -> Vec<NodeId>;

    /// Concatenated text of the node and its descendants.
    fn text_content(&self, node: NodeId) -> String;

    /// Form control value, if the node has one.
    fn value(&self, node: NodeId) -> Option<String>;

    /// Whether the node itself is rendered (not `display: none` or hidden).
    fn is_visible(&self, node: NodeId) -> bool;

    fn subscribe_mutations(&self) -> broadcast::Receiver<Mutation>;

    fn subscribe_events(&self) -> broadcast::Receiver<DomEvent>;

    /// Whether the node is currently attached under the body.
    fn contains(&self, node: NodeId) -> bool {
        let body = self.body();
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == body {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    /// Whether `node` is `ancestor` or sits somewhere below it.
    fn is_inside(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    fn matches(&self, node: NodeId, selector: &Selector) -> bool {
        selector.matches(self, node)
    }

    /// First descendant of `root` (excluding `root`) in document order.
    fn query(&self, root: NodeId, selector: &Selector) -> Option<NodeId> {
        let mut stack: Vec<NodeId> = self.children(root).into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            if selector.matches(self, node) {
                return Some(node);
            }
            stack.extend(self.children(node).into_iter().rev());
        }
        None
    }

    /// All descendants of `root` (excluding `root`) in document order.
    fn query_all(&self, root: NodeId, selector: &Selector) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack: Vec<NodeId> = self.children(root).into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            if selector.matches(self, node) {
                found.push(node);
            }
            stack.extend(self.children(node).into_iter().rev());
        }
        found
    }

    /// Walks a prioritized signature list and returns the first hit.
    fn query_first(&self, root: NodeId, selectors: &[Selector]) -> Option<NodeId> {
        selectors
            .iter()
            .find_map(|selector| self.query(root, selector))
    }

    /// The node itself or its nearest ancestor matching `selector`.
    fn closest(&self, node: NodeId, selector: &Selector) -> Option<NodeId> {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if selector.matches(self, current) {
                return Some(current);
            }
            cursor = self.parent(current);
        }
        None
    }
}
