//! Arena-backed DOM snapshot
//!
//! The page is serialized by `SNAPSHOT_SCRIPT` into a flat list of nodes in
//! document pre-order, each pointing at its parent by index. That list is
//! rebuilt here into an arena tree so discovery and field extraction can run
//! as plain Rust over a frozen view of an unstable DOM.

use std::collections::HashMap;

use scraper::{ElementRef, Html, Node};
use serde::{Deserialize, Serialize};

use super::errors::{ExtractionError, ExtractionResult};
use crate::utils::normalize_whitespace;

/// Tag used for text nodes in the arena
pub const TEXT_TAG: &str = "#text";

/// Index of a node inside a [`DomSnapshot`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Rendered size of an element in CSS pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub width: f64,
    pub height: f64,
}

impl Rect {
    #[must_use]
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Strictly larger than the given minimum in both dimensions
    #[must_use]
    pub fn exceeds(&self, min_width: f64, min_height: f64) -> bool {
        self.width > min_width && self.height > min_height
    }
}

/// One node as emitted by the snapshot script
#[derive(Debug, Clone, Deserialize)]
pub struct RawNode {
    /// Parent index, -1 for the root
    pub p: i64,
    /// Lowercase tag name or `#text`
    pub t: String,
    #[serde(default)]
    pub a: HashMap<String, String>,
    #[serde(default)]
    pub x: String,
    #[serde(default)]
    pub w: f64,
    #[serde(default)]
    pub h: f64,
    #[serde(default)]
    pub b: bool,
    #[serde(default)]
    pub r: bool,
}

/// A DOM node (element or text) inside the arena
#[derive(Debug, Clone)]
pub struct DomNode {
    pub tag: String,
    pub attrs: HashMap<String, String>,
    /// Text data, only set on text nodes
    pub text: String,
    pub rect: Rect,
    /// Computed font weight is bold (>= 600) or a `b`/`strong` tag
    pub bold: bool,
    /// Computed `white-space` keeps line breaks
    pub preformatted: bool,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl DomNode {
    #[must_use]
    pub fn is_text(&self) -> bool {
        self.tag == TEXT_TAG
    }

    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    /// Whitespace-separated class list
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or_default().split_whitespace()
    }
}

/// Frozen view of the page used for one poll
#[derive(Debug, Clone, Default)]
pub struct DomSnapshot {
    nodes: Vec<DomNode>,
}

impl DomSnapshot {
    /// Rebuild the arena from the flat script output
    ///
    /// Parents must precede their children, which is what a pre-order walk
    /// produces. Anything else means the script output was corrupted.
    pub fn from_raw(raw: Vec<RawNode>) -> ExtractionResult<Self> {
        let mut nodes: Vec<DomNode> = Vec::with_capacity(raw.len());

        for (index, node) in raw.into_iter().enumerate() {
            let parent = match usize::try_from(node.p) {
                Ok(p) if p < index => Some(NodeId(p)),
                Ok(p) => {
                    return Err(ExtractionError::Script(format!(
                        "node {index} references parent {p} that does not precede it"
                    )));
                }
                Err(_) if index == 0 => None,
                Err(_) => {
                    return Err(ExtractionError::Script(format!(
                        "node {index} has no parent but is not the root"
                    )));
                }
            };

            if let Some(NodeId(p)) = parent {
                nodes[p].children.push(NodeId(index));
            }

            nodes.push(DomNode {
                tag: node.t,
                attrs: node.a,
                text: node.x,
                rect: Rect::new(node.w, node.h),
                bold: node.b,
                preformatted: node.r,
                parent,
                children: Vec::new(),
            });
        }

        Ok(Self { nodes })
    }

    /// Build a snapshot from static HTML
    ///
    /// Static markup has no layout, so geometry is read from inline
    /// `width`/`height` pixel styles and everything else is 0x0. The root is
    /// `<body>` when present, mirroring what the in-page script captures.
    #[must_use]
    pub fn from_html(html: &str) -> Self {
        let document = Html::parse_document(html);
        let body_selector = scraper::Selector::parse("body").ok();
        let root = body_selector
            .as_ref()
            .and_then(|sel| document.select(sel).next())
            .unwrap_or_else(|| document.root_element());

        let mut builder = SnapshotBuilder::default();
        builder.element(None, root, false, false);

        // Explicit stack keeps ids in document pre-order without recursion.
        let mut stack: Vec<_> = root
            .children()
            .rev()
            .map(|child| (child, NodeId(0)))
            .collect();

        while let Some((child, parent)) = stack.pop() {
            let (bold, pre) = {
                let p = builder.node(parent);
                (p.bold, p.preformatted)
            };
            match child.value() {
                Node::Text(text) => {
                    let data: &str = text;
                    if !data.trim().is_empty() {
                        builder.text(parent, data, bold, pre);
                    }
                }
                Node::Element(el) => {
                    if matches!(el.name(), "script" | "style" | "noscript" | "template" | "head") {
                        continue;
                    }
                    if let Some(child_ref) = ElementRef::wrap(child) {
                        let id = builder.element(Some(parent), child_ref, bold, pre);
                        stack.extend(child.children().rev().map(|grandchild| (grandchild, id)));
                    }
                }
                _ => {}
            }
        }

        builder.snapshot
    }

    /// The root node (`<body>`)
    #[must_use]
    pub fn root(&self) -> Option<NodeId> {
        (!self.nodes.is_empty()).then_some(NodeId(0))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> &DomNode {
        &self.nodes[id.0]
    }

    /// Element children only (text nodes skipped)
    pub fn element_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id.0]
            .children
            .iter()
            .copied()
            .filter(|c| !self.nodes[c.0].is_text())
    }

    /// Ancestors from the parent upwards
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.nodes[id.0].parent, |p| self.nodes[p.0].parent)
    }

    /// Pre-order descendants, excluding `id` itself
    #[must_use]
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[id.0].children.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.nodes[next.0].children.iter().rev().copied());
        }
        out
    }

    /// Text nodes under `id` in document order
    #[must_use]
    pub fn text_nodes(&self, id: NodeId) -> Vec<NodeId> {
        let mut all = vec![id];
        all.extend(self.descendants(id));
        all.into_iter().filter(|n| self.nodes[n.0].is_text()).collect()
    }

    /// Raw text content; `<br>` becomes a newline
    #[must_use]
    pub fn text_content(&self, id: NodeId) -> String {
        let node = &self.nodes[id.0];
        if node.is_text() {
            return node.text.clone();
        }

        let mut out = String::new();
        for next in self.descendants(id) {
            let n = &self.nodes[next.0];
            if n.is_text() {
                if !out.is_empty() && !out.ends_with(char::is_whitespace) {
                    out.push(' ');
                }
                out.push_str(&n.text);
            } else if n.tag == "br" {
                out.push('\n');
            }
        }
        out
    }

    /// Text content collapsed to single spaces
    #[must_use]
    pub fn visible_text(&self, id: NodeId) -> String {
        normalize_whitespace(&self.text_content(id))
    }

    /// Is `ancestor` a strict ancestor of `id`?
    #[must_use]
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        self.ancestors(id).any(|a| a == ancestor)
    }

    /// All element ids in document order
    pub fn elements(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| !n.is_text())
            .map(|(i, _)| NodeId(i))
    }
}

#[derive(Default)]
struct SnapshotBuilder {
    snapshot: DomSnapshot,
}

impl SnapshotBuilder {
    fn element(
        &mut self,
        parent: Option<NodeId>,
        element: ElementRef<'_>,
        inherited_bold: bool,
        inherited_pre: bool,
    ) -> NodeId {
        let value = element.value();
        let tag = value.name().to_ascii_lowercase();
        let attrs: HashMap<String, String> = value
            .attrs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let style = attrs.get("style").map(String::as_str).unwrap_or_default();

        let bold = inherited_bold
            || matches!(tag.as_str(), "b" | "strong")
            || style_value(style, "font-weight")
                .is_some_and(|w| w == "bold" || w.parse::<u32>().is_ok_and(|n| n >= 600));
        let preformatted = inherited_pre
            || tag == "pre"
            || style_value(style, "white-space").is_some_and(|w| w.starts_with("pre"));
        let rect = Rect::new(
            style_px(style, "width").unwrap_or_default(),
            style_px(style, "height").unwrap_or_default(),
        );

        self.push(DomNode {
            tag,
            attrs,
            text: String::new(),
            rect,
            bold,
            preformatted,
            parent,
            children: Vec::new(),
        })
    }

    fn text(&mut self, parent: NodeId, data: &str, bold: bool, preformatted: bool) {
        self.push(DomNode {
            tag: TEXT_TAG.to_string(),
            attrs: HashMap::new(),
            text: data.to_string(),
            rect: Rect::default(),
            bold,
            preformatted,
            parent: Some(parent),
            children: Vec::new(),
        });
    }

    fn node(&self, id: NodeId) -> &DomNode {
        &self.snapshot.nodes[id.0]
    }

    fn push(&mut self, node: DomNode) -> NodeId {
        let id = NodeId(self.snapshot.nodes.len());
        if let Some(parent) = node.parent {
            self.snapshot.nodes[parent.0].children.push(id);
        }
        self.snapshot.nodes.push(node);
        id
    }
}

fn style_value<'a>(style: &'a str, property: &str) -> Option<&'a str> {
    style.split(';').find_map(|decl| {
        let (name, value) = decl.split_once(':')?;
        (name.trim().eq_ignore_ascii_case(property)).then(|| value.trim())
    })
}

fn style_px(style: &str, property: &str) -> Option<f64> {
    style_value(style, property)?
        .trim_end_matches("px")
        .trim()
        .parse()
        .ok()
}
