use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::dom::{Document, NodeId, Selector};

pub const UNKNOWN_RECIPIENT: &str = "Unknown Recipient";
pub const NO_SUBJECT: &str = "No Subject";

const RECIPIENT: &[&str] = &[
    "span[email]",
    ".vR span[email]",
    ".aoD .vR span[email]",
    ".vR .vN",
    ".aoD .vR",
    ".aoD span[email]",
    r#"div[aria-label*="To"] span[email]"#,
    r#"div[aria-label*="To"] .vR"#,
    r#".vR span[title*="@"]"#,
    r#".vR .go span[title*="@"]"#,
    r#"[jslog*="compose"] span[email]"#,
    r#"div[data-tooltip*="@"]"#,
    r#"[data-hovercard-id*="@"]"#,
];

const RECIPIENT_ROW: &str = r#".aoD, div[aria-label*="To"]"#;

const SUBJECT: &[&str] = &[
    r#"input[name="subjectbox"]"#,
    r#"input[aria-label*="Subject"]"#,
    r#"input[placeholder*="Subject"]"#,
    ".aoT input",
    r#"div[aria-label*="Subject"] input"#,
];

const BODY: &[&str] = &[
    r#"div[contenteditable="true"][aria-label*="Message Body"]"#,
    r#"div[contenteditable="true"][role="textbox"]"#,
    r#"div[contenteditable="true"].Am"#,
    r#"div[contenteditable="true"]"#,
    r#"[role="textbox"]"#,
];

/// The parts of a draft that end up on a time entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailFields {
    pub recipient: String,
    pub subject: String,
    pub content: String,
}

/// Pulls recipient, subject and body out of a compose surface. Missing
/// fields become placeholders; extraction never fails.
#[derive(Debug, Clone)]
pub struct FieldExtractor {
    recipient: Vec<Selector>,
    recipient_row: Selector,
    span: Selector,
    subject: Vec<Selector>,
    body: Vec<Selector>,
}

impl FieldExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            recipient: Selector::parse_all(RECIPIENT)?,
            recipient_row: Selector::parse(RECIPIENT_ROW)?,
            span: Selector::parse("span")?,
            subject: Selector::parse_all(SUBJECT)?,
            body: Selector::parse_all(BODY)?,
        })
    }

    pub fn extract(&self, doc: &dyn Document, surface: NodeId) -> EmailFields {
        let recipient = self
            .recipient(doc, surface)
            .unwrap_or_else(|| UNKNOWN_RECIPIENT.to_string());
        let subject = first_non_blank(doc, surface, &self.subject, |doc, node| {
            doc.value(node).unwrap_or_else(|| doc.text_content(node))
        })
        .unwrap_or_else(|| NO_SUBJECT.to_string());
        let content = first_non_blank(doc, surface, &self.body, |doc, node| doc.text_content(node))
            .unwrap_or_default();

        EmailFields {
            recipient,
            subject,
            content,
        }
    }

    fn recipient(&self, doc: &dyn Document, surface: NodeId) -> Option<String> {
        for selector in &self.recipient {
            for node in doc.query_all(surface, selector) {
                let candidate = doc
                    .attribute(node, "email")
                    .or_else(|| doc.attribute(node, "title"))
                    .or_else(|| doc.attribute(node, "data-tooltip"))
                    .or_else(|| non_empty(doc.text_content(node)))
                    .or_else(|| doc.value(node))
                    .unwrap_or_default();
                if let Some(address) = accept_address(&candidate) {
                    return Some(address);
                }
            }
        }

        let row = doc.query(surface, &self.recipient_row)?;
        doc.query_all(row, &self.span).into_iter().find_map(|span| {
            let text = non_empty(doc.text_content(span))
                .or_else(|| doc.attribute(span, "title"))
                .unwrap_or_default();
            accept_address(&text)
        })
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Chips carry the address in several places; labels like "To" are noise.
fn accept_address(candidate: &str) -> Option<String> {
    if candidate.contains('@') && !candidate.contains("To") {
        Some(candidate.trim().to_string())
    } else {
        None
    }
}

fn first_non_blank(
    doc: &dyn Document,
    surface: NodeId,
    selectors: &[Selector],
    read: impl Fn(&dyn Document, NodeId) -> String,
) -> Option<String> {
    selectors.iter().find_map(|selector| {
        let node = doc.query(surface, selector)?;
        let text = read(doc, node);
        let trimmed = text.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}
