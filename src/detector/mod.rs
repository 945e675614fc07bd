//! Decides which containers in the host document are compose surfaces.

use anyhow::{Context, Result};

use crate::dom::{Document, NodeId, Selector};

/// Attribute stamped on a claimed surface; the value is the tracker id.
pub const CLAIM_ATTR: &str = "data-billable-tracked";

const CANDIDATE: &str = r#"div[role="dialog"]"#;

const READY: &str = r#"[role="main"]"#;

const EDITABLE: &[&str] = &[
    r#"div[contenteditable="true"]"#,
    r#"[role="textbox"]"#,
    r#"[aria-label*="Message Body"]"#,
    r#"textarea[name="to"]"#,
];

const SEND: &[&str] = &[
    r#"[role="button"][data-tooltip*="Send"]"#,
    r#"[aria-label*="Send"]"#,
    r#"[role="button"][aria-label*="Send"]"#,
    r#"div[data-tooltip*="Send"]"#,
    r#"button[aria-label*="Send"]"#,
];

/// Where activity listeners attach, most specific first.
const CONTENT_AREA: &[&str] = &[
    r#"div[contenteditable="true"][aria-label*="Message Body"]"#,
    r#"div[contenteditable="true"][g_editable="true"]"#,
    r#"div[contenteditable="true"][role="textbox"]"#,
    r#"div[contenteditable="true"]"#,
    r#"[role="textbox"]"#,
    r#"textarea[name="to"]"#,
    r#"div[aria-label="Message Body"]"#,
];

#[derive(Debug, Clone)]
pub struct SurfaceDetector {
    candidate: Selector,
    ready: Selector,
    claimed: Selector,
    editable: Vec<Selector>,
    send: Vec<Selector>,
    content_area: Vec<Selector>,
}

impl SurfaceDetector {
    /// Detector with the built-in webmail signatures.
    pub fn new() -> Result<Self> {
        Self::with_signatures(CANDIDATE, EDITABLE, SEND, CONTENT_AREA)
    }

    pub fn with_signatures(
        candidate: &str,
        editable: &[&str],
        send: &[&str],
        content_area: &[&str],
    ) -> Result<Self> {
        Ok(Self {
            candidate: Selector::parse(candidate).context("invalid candidate signature")?,
            ready: Selector::parse(READY)?,
            claimed: Selector::parse(&format!("[{CLAIM_ATTR}]"))?,
            editable: Selector::parse_all(editable).context("invalid editable signature")?,
            send: Selector::parse_all(send).context("invalid send signature")?,
            content_area: Selector::parse_all(content_area)
                .context("invalid content-area signature")?,
        })
    }

    /// Whether the webmail shell has rendered far enough to scan.
    pub fn is_ready(&self, doc: &dyn Document) -> bool {
        doc.query(doc.body(), &self.ready).is_some()
    }

    /// A compose surface holds an editable region and a send control.
    pub fn is_compose_surface(&self, doc: &dyn Document, node: NodeId) -> bool {
        doc.query_first(node, &self.editable).is_some() && doc.query_first(node, &self.send).is_some()
    }

    /// Present, rendered, and still shaped like a compose surface.
    pub fn is_valid_surface(&self, doc: &dyn Document, node: NodeId) -> bool {
        doc.contains(node) && doc.is_visible(node) && self.is_compose_surface(doc, node)
    }

    pub fn is_claimed(&self, doc: &dyn Document, node: NodeId) -> bool {
        doc.closest(node, &self.claimed).is_some()
    }

    /// Unclaimed compose surfaces at or below `root`, in document order.
    ///
    /// Candidates inside an already claimed surface are skipped. Two
    /// qualifying candidates nested in each other are both returned; the
    /// registry claims the outer one first, which then shadows the inner.
    pub fn find_unclaimed(&self, doc: &dyn Document, root: NodeId) -> Vec<NodeId> {
        let mut candidates = Vec::new();
        if doc.matches(root, &self.candidate) {
            candidates.push(root);
        }
        candidates.extend(doc.query_all(root, &self.candidate));

        candidates
            .into_iter()
            .filter(|node| !self.is_claimed(doc, *node) && self.is_compose_surface(doc, *node))
            .collect()
    }

    /// The unclaimed candidate around an inserted node, if the insertion
    /// completed it into a compose surface.
    pub fn enclosing_unclaimed(&self, doc: &dyn Document, node: NodeId) -> Option<NodeId> {
        let parent = doc.parent(node)?;
        let candidate = doc.closest(parent, &self.candidate)?;
        (!self.is_claimed(doc, candidate) && self.is_compose_surface(doc, candidate))
            .then_some(candidate)
    }

    /// Claimed surfaces at or below a removed node.
    pub fn claimed_within(&self, doc: &dyn Document, root: NodeId) -> Vec<NodeId> {
        let mut claimed = Vec::new();
        if doc.attribute(root, CLAIM_ATTR).is_some() {
            claimed.push(root);
        }
        claimed.extend(doc.query_all(root, &self.claimed));
        claimed
    }

    pub fn content_area(&self, doc: &dyn Document, surface: NodeId) -> Option<NodeId> {
        doc.query_first(surface, &self.content_area)
    }

    pub fn send_control(&self, doc: &dyn Document, surface: NodeId) -> Option<NodeId> {
        doc.query_first(surface, &self.send)
    }

    /// Whether `target` is, or sits inside, a send control of `surface`.
    /// Resolved per event so a re-rendered toolbar is still recognised.
    pub fn is_send_target(&self, doc: &dyn Document, surface: NodeId, target: NodeId) -> bool {
        if !doc.is_inside(target, surface) {
            return false;
        }
        let mut cursor = Some(target);
        while let Some(node) = cursor {
            if self.send.iter().any(|selector| doc.matches(node, selector)) {
                return true;
            }
            if node == surface {
                break;
            }
            cursor = doc.parent(node);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::MemoryDocument;

    #[test]
    fn recognises_a_compose_dialog() {
        let doc = MemoryDocument::new();
        let fixture = doc.build_compose_window(doc.body(), "a@b.com", "Hi");
        let detector = SurfaceDetector::new().unwrap();

        assert!(detector.is_compose_surface(&doc, fixture.surface));
        assert!(detector.is_valid_surface(&doc, fixture.surface));
        assert_eq!(detector.find_unclaimed(&doc, doc.body()), vec![fixture.surface]);
        assert_eq!(detector.content_area(&doc, fixture.surface), Some(fixture.body_area));
        assert_eq!(detector.send_control(&doc, fixture.surface), Some(fixture.send_button));
    }

    #[test]
    fn dialog_without_send_control_is_not_a_surface() {
        let doc = MemoryDocument::new();
        let dialog = doc.append_element(doc.body(), "div", &[("role", "dialog")]);
        doc.append_element(dialog, "div", &[("contenteditable", "true")]);
        let detector = SurfaceDetector::new().unwrap();

        assert!(!detector.is_compose_surface(&doc, dialog));
        assert!(detector.find_unclaimed(&doc, doc.body()).is_empty());
    }

    #[test]
    fn skips_candidates_inside_claimed_surfaces() {
        let doc = MemoryDocument::new();
        let outer = doc.build_compose_window(doc.body(), "a@b.com", "Hi");
        let inner = doc.build_compose_window(outer.surface, "c@d.com", "Nested");
        let detector = SurfaceDetector::new().unwrap();

        doc.set_attribute(outer.surface, CLAIM_ATTR, "t1");
        assert!(detector.is_claimed(&doc, inner.surface));
        assert!(detector.find_unclaimed(&doc, doc.body()).is_empty());
    }

    #[test]
    fn hidden_or_detached_surfaces_are_invalid() {
        let doc = MemoryDocument::new();
        let fixture = doc.build_compose_window(doc.body(), "a@b.com", "Hi");
        let detector = SurfaceDetector::new().unwrap();

        doc.set_hidden(fixture.surface, true);
        assert!(!detector.is_valid_surface(&doc, fixture.surface));
        doc.set_hidden(fixture.surface, false);
        doc.remove(fixture.surface);
        assert!(!detector.is_valid_surface(&doc, fixture.surface));
    }

    #[test]
    fn finds_claimed_surfaces_inside_removed_subtree() {
        let doc = MemoryDocument::new();
        let wrapper = doc.append_element(doc.body(), "div", &[]);
        let fixture = doc.build_compose_window(wrapper, "a@b.com", "Hi");
        let detector = SurfaceDetector::new().unwrap();
        doc.set_attribute(fixture.surface, CLAIM_ATTR, "t1");

        doc.remove(wrapper);
        assert_eq!(detector.claimed_within(&doc, wrapper), vec![fixture.surface]);
        assert_eq!(detector.claimed_within(&doc, fixture.surface), vec![fixture.surface]);
    }

    #[test]
    fn late_send_control_completes_the_enclosing_dialog() {
        let doc = MemoryDocument::new();
        let dialog = doc.append_element(doc.body(), "div", &[("role", "dialog")]);
        doc.append_element(dialog, "div", &[("contenteditable", "true")]);
        let detector = SurfaceDetector::new().unwrap();
        assert!(detector.find_unclaimed(&doc, doc.body()).is_empty());

        let toolbar = doc.append_element(dialog, "div", &[]);
        let send = doc.append_element(toolbar, "div", &[("role", "button"), ("aria-label", "Send")]);
        assert_eq!(detector.enclosing_unclaimed(&doc, send), Some(dialog));

        doc.set_attribute(dialog, CLAIM_ATTR, "t1");
        assert_eq!(detector.enclosing_unclaimed(&doc, send), None);
    }

    #[test]
    fn send_target_follows_a_replaced_toolbar() {
        let doc = MemoryDocument::new();
        let fixture = doc.build_compose_window(doc.body(), "a@b.com", "Hi");
        let other = doc.build_compose_window(doc.body(), "c@d.com", "Other");
        let detector = SurfaceDetector::new().unwrap();

        assert!(detector.is_send_target(&doc, fixture.surface, fixture.send_button));
        assert!(!detector.is_send_target(&doc, fixture.surface, fixture.body_area));
        assert!(!detector.is_send_target(&doc, fixture.surface, other.send_button));

        doc.remove(fixture.send_button);
        let replacement = doc.append_element(
            fixture.surface,
            "div",
            &[("role", "button"), ("data-tooltip", "Send (Ctrl-Enter)")],
        );
        let label = doc.append_element(replacement, "span", &[]);
        assert!(detector.is_send_target(&doc, fixture.surface, label));
    }

    #[test]
    fn waits_for_main_region() {
        let doc = MemoryDocument::new();
        let detector = SurfaceDetector::new().unwrap();
        assert!(!detector.is_ready(&doc));
        doc.append_element(doc.body(), "div", &[("role", "main")]);
        assert!(detector.is_ready(&doc));
    }
}
