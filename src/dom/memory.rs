use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard},
};

use tokio::sync::broadcast;

use super::{Document, DomEvent, EventKind, Mutation, NodeId};

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
struct NodeData {
    tag: String,
    attrs: BTreeMap<String, String>,
    text: String,
    value: Option<String>,
    hidden: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl NodeData {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs: BTreeMap::new(),
            text: String::new(),
            value: None,
            hidden: false,
            parent: None,
            children: Vec::new(),
        }
    }
}

/// An arena-backed document for driving trackers without a browser.
///
/// Detached subtrees are kept around, so a removal can still be inspected
/// after the fact, as a real mutation record allows.
pub struct MemoryDocument {
    nodes: Mutex<Vec<NodeData>>,
    body: NodeId,
    mutations: broadcast::Sender<Mutation>,
    events: broadcast::Sender<DomEvent>,
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocument {
    pub fn new() -> Self {
        let (mutations, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            nodes: Mutex::new(vec![NodeData::new("body")]),
            body: NodeId(0),
            mutations,
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<NodeData>> {
        self.nodes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Creates a detached element.
    pub fn create_element(&self, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        let mut data = NodeData::new(tag);
        for (name, value) in attrs {
            data.attrs.insert((*name).to_string(), (*value).to_string());
        }
        let mut nodes = self.lock();
        nodes.push(data);
        NodeId((nodes.len() - 1) as u64)
    }

    /// Moves `child` under `parent`, reporting the insertion when it lands
    /// in the live tree.
    pub fn append_child(&self, parent: NodeId, child: NodeId) {
        let attached = {
            let mut nodes = self.lock();
            if get(&nodes, parent).is_none() || get(&nodes, child).is_none() {
                return;
            }
            if let Some(old_parent) = nodes[idx(child)].parent {
                nodes[idx(old_parent)].children.retain(|c| *c != child);
            }
            nodes[idx(child)].parent = Some(parent);
            nodes[idx(parent)].children.push(child);
            attached_in(&nodes, self.body, parent)
        };

        if attached {
            let _ = self.mutations.send(Mutation {
                added: vec![child],
                removed: Vec::new(),
            });
        }
    }

    pub fn append_element(&self, parent: NodeId, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        let node = self.create_element(tag, attrs);
        self.append_child(parent, node);
        node
    }

    /// Detaches `node` (and its subtree) from the document.
    pub fn remove(&self, node: NodeId) {
        let was_attached = {
            let mut nodes = self.lock();
            let Some(parent) = get(&nodes, node).and_then(|data| data.parent) else {
                return;
            };
            let was_attached = attached_in(&nodes, self.body, node);
            nodes[idx(parent)].children.retain(|c| *c != node);
            nodes[idx(node)].parent = None;
            was_attached
        };

        if was_attached {
            let _ = self.mutations.send(Mutation {
                added: Vec::new(),
                removed: vec![node],
            });
        }
    }

    pub fn set_text(&self, node: NodeId, text: &str) {
        if let Some(data) = self.lock().get_mut(idx(node)) {
            data.text = text.to_string();
        }
    }

    pub fn set_value(&self, node: NodeId, value: &str) {
        if let Some(data) = self.lock().get_mut(idx(node)) {
            data.value = Some(value.to_string());
        }
    }

    pub fn set_hidden(&self, node: NodeId, hidden: bool) {
        if let Some(data) = self.lock().get_mut(idx(node)) {
            data.hidden = hidden;
        }
    }

    /// Fires an input event at `target`. Events with no listeners are dropped.
    pub fn dispatch(&self, kind: EventKind, target: NodeId) {
        let _ = self.events.send(DomEvent { kind, target });
    }

    /// Builds a webmail-style compose dialog under `parent`.
    pub fn build_compose_window(&self, parent: NodeId, recipient: &str, subject: &str) -> ComposeFixture {
        let surface = self.create_element("div", &[("role", "dialog")]);

        let to_row = self.append_element(surface, "div", &[("class", "aoD")]);
        let chip = self.append_element(to_row, "div", &[("class", "vR")]);
        let recipient_node = self.append_element(chip, "span", &[("email", recipient)]);
        self.set_text(recipient_node, recipient);

        let subject_node = self.append_element(
            surface,
            "input",
            &[("name", "subjectbox"), ("aria-label", "Subject")],
        );
        self.set_value(subject_node, subject);

        let body_area = self.append_element(
            surface,
            "div",
            &[
                ("contenteditable", "true"),
                ("aria-label", "Message Body"),
                ("role", "textbox"),
            ],
        );

        let send_button = self.append_element(
            surface,
            "div",
            &[("role", "button"), ("data-tooltip", "Send (Ctrl-Enter)")],
        );

        self.append_child(parent, surface);

        ComposeFixture {
            surface,
            recipient: recipient_node,
            subject: subject_node,
            body_area,
            send_button,
        }
    }
}

/// Handles into a compose dialog built by [`MemoryDocument::build_compose_window`].
#[derive(Debug, Clone, Copy)]
pub struct ComposeFixture {
    pub surface: NodeId,
    pub recipient: NodeId,
    pub subject: NodeId,
    pub body_area: NodeId,
    pub send_button: NodeId,
}

fn idx(node: NodeId) -> usize {
    node.0 as usize
}

fn get(nodes: &[NodeData], node: NodeId) -> Option<&NodeData> {
    nodes.get(idx(node))
}

fn attached_in(nodes: &[NodeData], body: NodeId, node: NodeId) -> bool {
    let mut cursor = Some(node);
    while let Some(current) = cursor {
        if current == body {
            return true;
        }
        cursor = get(nodes, current).and_then(|data| data.parent);
    }
    false
}

fn collect_text(nodes: &[NodeData], node: NodeId, out: &mut String) {
    if let Some(data) = get(nodes, node) {
        out.push_str(&data.text);
        for child in &data.children {
            collect_text(nodes, *child, out);
        }
    }
}

impl Document for MemoryDocument {
    fn body(&self) -> NodeId {
        self.body
    }

    fn tag_name(&self, node: NodeId) -> Option<String> {
        get(&self.lock(), node).map(|data| data.tag.clone())
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        get(&self.lock(), node).and_then(|data| data.attrs.get(name).cloned())
    }

    fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        if let Some(data) = self.lock().get_mut(idx(node)) {
            data.attrs.insert(name.to_string(), value.to_string());
        }
    }

    fn remove_attribute(&self, node: NodeId, name: &str) {
        if let Some(data) = self.lock().get_mut(idx(node)) {
            data.attrs.remove(name);
        }
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        get(&self.lock(), node).and_then(|data| data.parent)
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        get(&self.lock(), node)
            .map(|data| data.children.clone())
            .unwrap_or_default()
    }

    fn text_content(&self, node: NodeId) -> String {
        let nodes = self.lock();
        let mut out = String::new();
        collect_text(&nodes, node, &mut out);
        out
    }

    fn value(&self, node: NodeId) -> Option<String> {
        get(&self.lock(), node).and_then(|data| data.value.clone())
    }

    fn is_visible(&self, node: NodeId) -> bool {
        get(&self.lock(), node).map(|data| !data.hidden).unwrap_or(false)
    }

    fn subscribe_mutations(&self) -> broadcast::Receiver<Mutation> {
        self.mutations.subscribe()
    }

    fn subscribe_events(&self) -> broadcast::Receiver<DomEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Selector;

    #[test]
    fn reports_insertions_and_removals_of_live_nodes_only() {
        let doc = MemoryDocument::new();
        let mut rx = doc.subscribe_mutations();

        let detached = doc.create_element("div", &[]);
        let inner = doc.append_element(detached, "span", &[]);
        assert!(rx.try_recv().is_err(), "detached insert must not be reported");

        doc.append_child(doc.body(), detached);
        assert_eq!(rx.try_recv().unwrap().added, vec![detached]);
        assert!(doc.contains(inner));

        doc.remove(detached);
        assert_eq!(rx.try_recv().unwrap().removed, vec![detached]);
        assert!(!doc.contains(inner));
        assert!(doc.is_inside(inner, detached), "removed subtree stays intact");
    }

    #[test]
    fn queries_walk_in_document_order() {
        let doc = MemoryDocument::new();
        let body = doc.body();
        let first = doc.append_element(body, "div", &[("class", "a")]);
        let nested = doc.append_element(first, "div", &[("class", "a")]);
        let second = doc.append_element(body, "div", &[("class", "a")]);

        let sel = Selector::parse(".a").unwrap();
        assert_eq!(doc.query(body, &sel), Some(first));
        assert_eq!(doc.query_all(body, &sel), vec![first, nested, second]);
        assert_eq!(doc.closest(nested, &sel), Some(nested));
        assert_eq!(doc.query(nested, &sel), None);
    }

    #[test]
    fn text_content_concatenates_descendants() {
        let doc = MemoryDocument::new();
        let outer = doc.append_element(doc.body(), "div", &[]);
        doc.set_text(outer, "Hello ");
        let inner = doc.append_element(outer, "b", &[]);
        doc.set_text(inner, "world");
        assert_eq!(doc.text_content(outer), "Hello world");
    }

    #[test]
    fn compose_fixture_has_expected_shape() {
        let doc = MemoryDocument::new();
        let fixture = doc.build_compose_window(doc.body(), "jane.doe@firm.com", "Hearing");
        assert!(doc.contains(fixture.send_button));
        assert_eq!(doc.value(fixture.subject).as_deref(), Some("Hearing"));
        assert_eq!(
            doc.attribute(fixture.recipient, "email").as_deref(),
            Some("jane.doe@firm.com")
        );
    }
}
