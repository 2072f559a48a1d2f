//! Mutable HTML parse tree: element iteration and attribute get/set.
//!
//! The locate and rewrite stages only need four capabilities from a parser:
//! find elements by tag name, read an attribute, replace an attribute value,
//! and serialise the tree back to HTML. [`Markup`] and [`ElementNode`] expose
//! exactly that surface over `html5ever` + `markup5ever_rcdom`, so the parser
//! can be swapped without touching the pipeline stages.
//!
//! Parsing never fails: html5ever recovers from any input the way a browser
//! does, so malformed markup simply yields a best-effort tree.

use html5ever::serialize::{serialize, SerializeOpts};
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::tree_builder::TreeBuilderOpts;
use html5ever::{parse_document, ParseOpts};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom, SerializableHandle};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::warn;

/// The (tag, attribute) pairs that reference downloadable assets.
///
/// Shared by the locator and the rewriter so both stages always agree on
/// which references exist.
pub const RESOURCE_TAG_ATTRS: &[(&str, &str)] = &[
    ("img", "src"),
    ("script", "src"),
    ("link", "href"),
    ("source", "src"),
];

/// A parsed HTML document.
pub struct Markup {
    dom: RcDom,
}

impl Markup {
    /// Parse an HTML document.
    ///
    /// Scripting is disabled in the tree builder so `<noscript>` fallbacks
    /// (often the only non-lazy `<img>` on a page) are parsed as elements.
    pub fn parse(html: &str) -> Self {
        let opts = ParseOpts {
            tree_builder: TreeBuilderOpts {
                scripting_enabled: false,
                ..Default::default()
            },
            ..Default::default()
        };
        let dom = parse_document(RcDom::default(), opts).one(html);
        Self { dom }
    }

    /// All elements with the given (lower-case) tag name, in document order.
    pub fn find_all(&self, tag: &str) -> Vec<ElementNode> {
        let mut found = Vec::new();
        self.walk(|handle| {
            if let NodeData::Element { ref name, .. } = handle.data {
                if &*name.local == tag {
                    found.push(ElementNode(handle.clone()));
                }
            }
        });
        found
    }

    /// Cap the element nesting depth at `max_depth`.
    ///
    /// An element sitting at `max_depth` keeps its tag but its subtree is
    /// replaced by a single text node holding the subtree's text. Returns
    /// how many subtrees were collapsed.
    pub fn flatten_deeper_than(&self, max_depth: usize) -> usize {
        let mut flattened = 0;
        let mut stack = vec![(self.dom.document.clone(), 0usize)];
        while let Some((node, depth)) = stack.pop() {
            if depth >= max_depth && matches!(node.data, NodeData::Element { .. }) {
                let text = text_content(&node);
                let replacement = Node::new(NodeData::Text {
                    contents: RefCell::new(StrTendril::from(text)),
                });
                replacement.parent.set(Some(Rc::downgrade(&node)));
                *node.children.borrow_mut() = vec![replacement];
                flattened += 1;
                continue;
            }
            let children = node.children.borrow();
            stack.extend(children.iter().rev().map(|c| (c.clone(), depth + 1)));
        }
        flattened
    }

    /// Serialise the (possibly modified) tree back to HTML.
    pub fn to_html(&self) -> String {
        let mut out = Vec::new();
        let root: SerializableHandle = self.dom.document.clone().into();
        if let Err(e) = serialize(&mut out, &root, SerializeOpts::default()) {
            warn!("HTML serialisation stopped early: {}", e);
        }
        String::from_utf8_lossy(&out).into_owned()
    }

    /// Depth-first pre-order traversal without recursion.
    fn walk(&self, mut visit: impl FnMut(&Handle)) {
        let mut stack = vec![self.dom.document.clone()];
        while let Some(node) = stack.pop() {
            visit(&node);
            let children = node.children.borrow();
            stack.extend(children.iter().rev().cloned());
        }
    }
}

/// Text of a subtree, pieces joined by single spaces.
fn text_content(root: &Handle) -> String {
    let mut pieces: Vec<String> = Vec::new();
    let mut stack = vec![root.clone()];
    while let Some(node) = stack.pop() {
        if let NodeData::Text { ref contents } = node.data {
            let text = contents.borrow();
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                pieces.push(trimmed.to_string());
            }
        }
        let children = node.children.borrow();
        stack.extend(children.iter().rev().cloned());
    }
    pieces.join(" ")
}

/// A single element in a [`Markup`] tree.
#[derive(Clone)]
pub struct ElementNode(Handle);

impl ElementNode {
    /// Lower-case tag name.
    pub fn tag(&self) -> String {
        match self.0.data {
            NodeData::Element { ref name, .. } => name.local.to_string(),
            _ => String::new(),
        }
    }

    /// The attribute value, if present.
    pub fn attr(&self, name: &str) -> Option<String> {
        match self.0.data {
            NodeData::Element { ref attrs, .. } => attrs
                .borrow()
                .iter()
                .find(|a| &*a.name.local == name)
                .map(|a| a.value.to_string()),
            _ => None,
        }
    }

    /// Replace the value of an existing attribute.
    ///
    /// Returns `false` (and changes nothing) when the attribute is absent.
    pub fn set_attr(&self, name: &str, value: &str) -> bool {
        match self.0.data {
            NodeData::Element { ref attrs, .. } => {
                let mut attrs = attrs.borrow_mut();
                match attrs.iter_mut().find(|a| &*a.name.local == name) {
                    Some(attr) => {
                        attr.value = StrTendril::from(value);
                        true
                    }
                    None => false,
                }
            }
            _ => false,
        }
    }
}
