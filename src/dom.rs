//! Host document model.
//!
//! The locator only needs a small read-only query surface over a document:
//! scoped `querySelectorAll`, child enumeration, attached shadow roots and
//! text content. [`DocumentTree`] captures that surface so the engine can run
//! against a live browser bridge or the in-memory [`Document`] defined here.
//!
//! [`Document`] is an arena of nodes. Its selector support is deliberately
//! limited to compound selectors (`tag`, `*`, `.class`, `#id`, chained with no
//! combinators), which is all a resolved tracking expression can produce.

use serde::{Deserialize, Serialize};
use tracing::trace;

/// Failure to run a selector query
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{selector}' is not a valid selector: {reason}")]
pub struct QueryError {
    pub selector: String,
    pub reason: String,
}

impl QueryError {
    pub fn new(selector: &str, reason: impl Into<String>) -> Self {
        Self {
            selector: selector.to_string(),
            reason: reason.into(),
        }
    }
}

/// Read-only query surface of a host document
pub trait DocumentTree {
    /// Handle to a node in the tree
    type Node: Copy + Eq + std::fmt::Debug;

    /// The document root
    fn root(&self) -> Self::Node;

    /// All descendant elements of `scope` matching `selector`, in document
    /// order. Does not descend into shadow trees attached below `scope`.
    fn query_selector_all(
        &self,
        scope: Self::Node,
        selector: &str,
    ) -> Result<Vec<Self::Node>, QueryError>;

    /// Light-DOM children of a node
    fn children(&self, node: Self::Node) -> Vec<Self::Node>;

    /// Shadow root attached to a node, if any
    fn shadow_root(&self, node: Self::Node) -> Option<Self::Node>;

    /// Concatenated text of the node and its light-DOM descendants
    fn text_content(&self, node: Self::Node) -> String;
}

/// Node handle into a [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
struct ElementData {
    tag: String,
    id: Option<String>,
    classes: Vec<String>,
}

#[derive(Debug, Clone)]
enum NodeKind {
    Document,
    ShadowRoot,
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    shadow_root: Option<NodeId>,
    kind: NodeKind,
}

impl Node {
    fn new(kind: NodeKind, parent: Option<NodeId>) -> Self {
        Self {
            parent,
            children: Vec::new(),
            shadow_root: None,
            kind,
        }
    }
}

/// In-memory document tree
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Document {
    /// Create an empty document containing only the root node
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(NodeKind::Document, None)],
        }
    }

    /// Build a document from snapshot node specs placed under the root
    pub fn from_nodes(nodes: &[NodeSpec]) -> Self {
        let mut doc = Self::new();
        let root = doc.root();
        doc.append_specs(root, nodes);
        doc
    }

    fn append_specs(&mut self, parent: NodeId, specs: &[NodeSpec]) {
        for spec in specs {
            match spec {
                NodeSpec::Text(text) => {
                    self.append_text(parent, text);
                }
                NodeSpec::Element(element) => {
                    let classes: Vec<&str> = element.class.split_whitespace().collect();
                    let node = self.append_element(parent, &element.tag, &classes);
                    if let Some(id) = &element.id {
                        self.set_id(node, id);
                    }
                    if let Some(text) = &element.text {
                        self.append_text(node, text);
                    }
                    self.append_specs(node, &element.children);
                    if let Some(shadow) = &element.shadow {
                        let shadow_root = self.attach_shadow(node);
                        self.append_specs(shadow_root, shadow);
                    }
                }
            }
        }
    }

    fn push(&mut self, kind: NodeKind, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(kind, parent));
        if let Some(parent) = parent {
            self.nodes[parent.0].children.push(id);
        }
        id
    }

    /// Append an element with the given tag and classes
    pub fn append_element(&mut self, parent: NodeId, tag: &str, classes: &[&str]) -> NodeId {
        let data = ElementData {
            tag: tag.to_ascii_lowercase(),
            id: None,
            classes: classes.iter().map(|c| c.to_string()).collect(),
        };
        self.push(NodeKind::Element(data), Some(parent))
    }

    /// Append a text node
    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        self.push(NodeKind::Text(text.to_string()), Some(parent))
    }

    /// Set the `id` attribute of an element
    pub fn set_id(&mut self, node: NodeId, id: &str) {
        if let NodeKind::Element(data) = &mut self.nodes[node.0].kind {
            data.id = Some(id.to_string());
        }
    }

    /// Attach a shadow root to an element, returning the existing one if
    /// already attached
    pub fn attach_shadow(&mut self, host: NodeId) -> NodeId {
        if let Some(existing) = self.nodes[host.0].shadow_root {
            return existing;
        }
        let shadow_root = self.push(NodeKind::ShadowRoot, None);
        self.nodes[host.0].shadow_root = Some(shadow_root);
        shadow_root
    }

    /// Replace all children of a node with a single text node
    pub fn set_text(&mut self, node: NodeId, text: &str) {
        let old = std::mem::take(&mut self.nodes[node.0].children);
        for child in old {
            self.nodes[child.0].parent = None;
        }
        self.append_text(node, text);
    }

    /// Detach a node from its parent
    pub fn remove(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|&child| child != node);
        }
    }

    /// Whether a node is an element
    pub fn is_element(&self, node: NodeId) -> bool {
        matches!(self.nodes[node.0].kind, NodeKind::Element(_))
    }

    /// Number of nodes ever allocated (detached nodes included)
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        match &self.nodes[node.0].kind {
            NodeKind::Text(text) => out.push_str(text),
            _ => {
                for &child in &self.nodes[node.0].children {
                    self.collect_text(child, out);
                }
            }
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentTree for Document {
    type Node = NodeId;

    fn root(&self) -> NodeId {
        NodeId(0)
    }

    fn query_selector_all(&self, scope: NodeId, selector: &str) -> Result<Vec<NodeId>, QueryError> {
        let compound = CompoundSelector::parse(selector)?;

        let mut matches = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[scope.0].children.iter().rev().copied().collect();

        while let Some(node) = stack.pop() {
            let entry = &self.nodes[node.0];
            if let NodeKind::Element(data) = &entry.kind {
                if compound.matches(data) {
                    matches.push(node);
                }
            }
            stack.extend(entry.children.iter().rev().copied());
        }

        trace!("Query {} in {:?}: {} match(es)", selector, scope, matches.len());
        Ok(matches)
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes[node.0].children.clone()
    }

    fn shadow_root(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].shadow_root
    }

    fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }
}

/// A single compound selector: optional type, then any number of classes
/// and ids
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompoundSelector {
    tag: Option<String>,
    ids: Vec<String>,
    classes: Vec<String>,
}

impl CompoundSelector {
    /// Parse a compound selector, rejecting combinators, attribute and
    /// pseudo-class syntax, and malformed identifiers
    pub fn parse(selector: &str) -> Result<Self, QueryError> {
        let chars: Vec<char> = selector.trim().chars().collect();
        if chars.is_empty() {
            return Err(QueryError::new(selector, "selector is empty"));
        }

        let mut parsed = CompoundSelector::default();
        let mut pos = 0;

        if chars[0] == '*' {
            pos = 1;
        } else if chars[0].is_alphabetic() {
            let tag = read_ident(selector, &chars, &mut pos)?;
            parsed.tag = Some(tag.to_ascii_lowercase());
        }

        while pos < chars.len() {
            match chars[pos] {
                '.' => {
                    pos += 1;
                    parsed.classes.push(read_ident(selector, &chars, &mut pos)?);
                }
                '#' => {
                    pos += 1;
                    parsed.ids.push(read_ident(selector, &chars, &mut pos)?);
                }
                other => {
                    return Err(QueryError::new(
                        selector,
                        format!("unexpected '{}' at position {}", other, pos),
                    ));
                }
            }
        }

        Ok(parsed)
    }

    fn matches(&self, element: &ElementData) -> bool {
        if let Some(tag) = &self.tag {
            if *tag != element.tag {
                return false;
            }
        }
        if !self.ids.iter().all(|id| element.id.as_deref() == Some(id.as_str())) {
            return false;
        }
        self.classes
            .iter()
            .all(|class| element.classes.iter().any(|c| c == class))
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()
}

fn read_ident(selector: &str, chars: &[char], pos: &mut usize) -> Result<String, QueryError> {
    let start = *pos;
    while *pos < chars.len() && is_ident_char(chars[*pos]) {
        *pos += 1;
    }

    let ident: String = chars[start..*pos].iter().collect();
    let mut it = ident.chars();
    match (it.next(), it.next()) {
        (None, _) => Err(QueryError::new(
            selector,
            format!("expected identifier at position {}", start),
        )),
        (Some(first), _) if first.is_ascii_digit() => Err(QueryError::new(
            selector,
            format!("identifier '{}' starts with a digit", ident),
        )),
        (Some('-'), Some(second)) if second.is_ascii_digit() => Err(QueryError::new(
            selector,
            format!("identifier '{}' starts with a digit", ident),
        )),
        _ => Ok(ident),
    }
}

/// Serialized form of a node in a page snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeSpec {
    Text(String),
    Element(ElementSpec),
}

/// Serialized form of an element in a page snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementSpec {
    #[serde(default = "default_tag")]
    pub tag: String,

    #[serde(default)]
    pub id: Option<String>,

    /// Space-separated class list, as in the HTML attribute
    #[serde(default)]
    pub class: String,

    /// Shorthand for a single leading text child
    #[serde(default)]
    pub text: Option<String>,

    #[serde(default)]
    pub children: Vec<NodeSpec>,

    /// Children of an attached shadow root
    #[serde(default)]
    pub shadow: Option<Vec<NodeSpec>>,
}

fn default_tag() -> String {
    "div".to_string()
}
