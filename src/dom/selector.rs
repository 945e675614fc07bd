//! Structural signatures written in a small CSS subset.
//!
//! Supported syntax:
//! - type selectors (`div`) and the universal selector (`*`)
//! - classes (`.vR`)
//! - attribute tests: `[attr]`, `[attr="v"]`, `[attr*="v"]`, `[attr^="v"]`,
//!   `[attr$="v"]`
//! - the descendant combinator (whitespace)
//! - selector lists (`a, b`)
//!
//! Anything else (child combinators, pseudo classes) is a parse error rather
//! than a silent mismatch.

use std::fmt;

use anyhow::{bail, Result};

use super::{Document, NodeId};

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals(String),
    Contains(String),
    Prefix(String),
    Suffix(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrTest {
    name: String,
    op: AttrOp,
}

impl AttrTest {
    fn check(&self, actual: Option<&str>) -> bool {
        let Some(actual) = actual else {
            return false;
        };
        match &self.op {
            AttrOp::Exists => true,
            AttrOp::Equals(expected) => actual == expected,
            AttrOp::Contains(needle) => !needle.is_empty() && actual.contains(needle.as_str()),
            AttrOp::Prefix(needle) => !needle.is_empty() && actual.starts_with(needle.as_str()),
            AttrOp::Suffix(needle) => !needle.is_empty() && actual.ends_with(needle.as_str()),
        }
    }
}

/// One element test: `tag.class[attr]...`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrTest>,
}

impl Compound {
    fn matches<D: Document + ?Sized>(&self, doc: &D, node: NodeId) -> bool {
        let Some(tag) = doc.tag_name(node) else {
            return false;
        };
        if let Some(expected) = &self.tag {
            if !expected.eq_ignore_ascii_case(&tag) {
                return false;
            }
        }
        if !self.classes.is_empty() {
            let class_attr = doc.attribute(node, "class").unwrap_or_default();
            let present: Vec<&str> = class_attr.split_whitespace().collect();
            if !self.classes.iter().all(|class| present.contains(&class.as_str())) {
                return false;
            }
        }
        self.attrs
            .iter()
            .all(|test| test.check(doc.attribute(node, &test.name).as_deref()))
    }
}

/// Compounds joined by descendant combinators, outermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Complex {
    parts: Vec<Compound>,
}

impl Complex {
    fn matches<D: Document + ?Sized>(&self, doc: &D, node: NodeId) -> bool {
        match self.parts.split_last() {
            Some((last, rest)) => last.matches(doc, node) && ancestors_match(doc, node, rest),
            None => false,
        }
    }
}

fn ancestors_match<D: Document + ?Sized>(doc: &D, node: NodeId, parts: &[Compound]) -> bool {
    let Some((last, rest)) = parts.split_last() else {
        return true;
    };
    let mut cursor = doc.parent(node);
    while let Some(ancestor) = cursor {
        if last.matches(doc, ancestor) && ancestors_match(doc, ancestor, rest) {
            return true;
        }
        cursor = doc.parent(ancestor);
    }
    false
}

#[derive(Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    alternatives: Vec<Complex>,
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Selector({:?})", self.source)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Selector {
    pub fn parse(input: &str) -> Result<Self> {
        let alternatives = Parser::new(input).parse_list()?;
        Ok(Self {
            source: input.trim().to_string(),
            alternatives,
        })
    }

    /// Parses a prioritized signature table, keeping its order.
    pub fn parse_all(inputs: &[&str]) -> Result<Vec<Self>> {
        inputs.iter().map(|input| Self::parse(input)).collect()
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches<D: Document + ?Sized>(&self, doc: &D, node: NodeId) -> bool {
        self.alternatives.iter().any(|complex| complex.matches(doc, node))
    }
}

struct Parser<'a> {
    chars: Vec<char>,
    pos: usize,
    input: &'a str,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            input,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn parse_list(&mut self) -> Result<Vec<Complex>> {
        let mut list = Vec::new();
        loop {
            self.skip_ws();
            list.push(self.parse_complex()?);
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                None => break,
                Some(other) => bail!(
                    "unexpected '{other}' at {} in selector {:?}",
                    self.pos - 1,
                    self.input
                ),
            }
        }
        Ok(list)
    }

    fn parse_complex(&mut self) -> Result<Complex> {
        let mut parts = vec![self.parse_compound()?];
        loop {
            let had_ws = self.skip_ws();
            match self.peek() {
                None | Some(',') => break,
                Some(_) if had_ws => parts.push(self.parse_compound()?),
                Some(other) => bail!(
                    "unsupported combinator '{other}' at {} in selector {:?}",
                    self.pos,
                    self.input
                ),
            }
        }
        Ok(Complex { parts })
    }

    fn parse_compound(&mut self) -> Result<Compound> {
        let start = self.pos;
        let mut compound = Compound::default();

        match self.peek() {
            Some('*') => {
                self.pos += 1;
            }
            Some(c) if is_ident_char(c) => {
                compound.tag = Some(self.ident()?.to_ascii_lowercase());
            }
            _ => {}
        }

        loop {
            match self.peek() {
                Some('.') => {
                    self.pos += 1;
                    compound.classes.push(self.ident()?);
                }
                Some('[') => {
                    self.pos += 1;
                    compound.attrs.push(self.attr_test()?);
                }
                _ => break,
            }
        }

        if self.pos == start {
            bail!("expected selector at {} in {:?}", self.pos, self.input);
        }
        Ok(compound)
    }

    fn attr_test(&mut self) -> Result<AttrTest> {
        self.skip_ws();
        let name = self.ident()?;
        self.skip_ws();
        let op = match self.bump() {
            Some(']') => return Ok(AttrTest { name, op: AttrOp::Exists }),
            Some('=') => AttrOp::Equals(self.attr_value()?),
            Some(modifier @ ('*' | '^' | '$')) => {
                if self.bump() != Some('=') {
                    bail!("expected '=' after '{modifier}' in selector {:?}", self.input);
                }
                let value = self.attr_value()?;
                match modifier {
                    '*' => AttrOp::Contains(value),
                    '^' => AttrOp::Prefix(value),
                    _ => AttrOp::Suffix(value),
                }
            }
            _ => bail!("malformed attribute test at {} in {:?}", self.pos, self.input),
        };
        self.skip_ws();
        if self.bump() != Some(']') {
            bail!("unterminated attribute test in selector {:?}", self.input);
        }
        Ok(AttrTest { name, op })
    }

    fn attr_value(&mut self) -> Result<String> {
        self.skip_ws();
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let mut value = String::new();
                loop {
                    match self.bump() {
                        Some(c) if c == quote => return Ok(value),
                        Some(c) => value.push(c),
                        None => bail!("unterminated string in selector {:?}", self.input),
                    }
                }
            }
            _ => self.ident(),
        }
    }

    fn ident(&mut self) -> Result<String> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if is_ident_char(c)) {
            self.pos += 1;
        }
        if self.pos == start {
            bail!("expected identifier at {} in selector {:?}", self.pos, self.input);
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::memory::MemoryDocument;

    #[test]
    fn rejects_unsupported_syntax() {
        assert!(Selector::parse("div > span").is_err());
        assert!(Selector::parse("a:hover").is_err());
        assert!(Selector::parse("[title*=\"@\"").is_err());
        assert!(Selector::parse("").is_err());
    }

    #[test]
    fn matches_attribute_operators() {
        let doc = MemoryDocument::new();
        let body = doc.body();
        let button = doc.append_element(
            body,
            "div",
            &[("role", "button"), ("data-tooltip", "Send (Ctrl-Enter)")],
        );

        let exact = Selector::parse(r#"div[role="button"]"#).unwrap();
        let contains = Selector::parse(r#"[role="button"][data-tooltip*="Send"]"#).unwrap();
        let prefix = Selector::parse("[data-tooltip^=Send]").unwrap();
        let wrong_tag = Selector::parse(r#"button[data-tooltip*="Send"]"#).unwrap();

        assert!(exact.matches(&doc, button));
        assert!(contains.matches(&doc, button));
        assert!(prefix.matches(&doc, button));
        assert!(!wrong_tag.matches(&doc, button));
    }

    #[test]
    fn descendant_combinator_backtracks_through_ancestors() {
        let doc = MemoryDocument::new();
        let body = doc.body();
        let outer = doc.append_element(body, "div", &[("class", "aoD")]);
        let middle = doc.append_element(outer, "div", &[("class", "vR other")]);
        let inner = doc.append_element(middle, "span", &[("email", "a@b.com")]);

        let sel = Selector::parse(".aoD .vR span[email]").unwrap();
        assert!(sel.matches(&doc, inner));

        let wrong_order = Selector::parse(".vR .aoD span[email]").unwrap();
        assert!(!wrong_order.matches(&doc, inner));
    }

    #[test]
    fn selector_lists_match_any_alternative() {
        let doc = MemoryDocument::new();
        let body = doc.body();
        let node = doc.append_element(body, "div", &[("aria-label", "To recipients")]);

        let sel = Selector::parse(r#".aoD, div[aria-label*="To"]"#).unwrap();
        assert!(sel.matches(&doc, node));
        assert_eq!(sel.as_str(), r#".aoD, div[aria-label*="To"]"#);
    }
}
