//! Document trees queries run against
//!
//! Queries are generic over [`TreeNode`], so any parsed document
//! representation can be searched without copying. [`Node`] is a small
//! owned implementation, buildable from `serde_json` values.

use serde_json::Value;

/// Shape of a document node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Top of a document, with exactly one content node
    Document,
    /// Alternating key and value nodes
    Mapping,
    Sequence,
    Scalar,
}

/// A node in a parsed document tree
pub trait TreeNode: Sized {
    fn kind(&self) -> NodeKind;

    /// Child nodes.
    ///
    /// A document has one child. A mapping lists its entries as
    /// `key, value, key, value, ...`.
    fn content(&self) -> &[Self];

    /// Text of a scalar; empty for other kinds
    fn value(&self) -> &str;
}

/// Owned document node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    kind: NodeKind,
    value: String,
    content: Vec<Node>,
}

impl Node {
    pub fn document(root: Node) -> Self {
        Self {
            kind: NodeKind::Document,
            value: String::new(),
            content: vec![root],
        }
    }

    pub fn mapping(entries: impl IntoIterator<Item = (Node, Node)>) -> Self {
        let content = entries
            .into_iter()
            .flat_map(|(key, value)| [key, value])
            .collect();
        Self {
            kind: NodeKind::Mapping,
            value: String::new(),
            content,
        }
    }

    pub fn sequence(elements: impl IntoIterator<Item = Node>) -> Self {
        Self {
            kind: NodeKind::Sequence,
            value: String::new(),
            content: elements.into_iter().collect(),
        }
    }

    pub fn scalar(value: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Scalar,
            value: value.into(),
            content: Vec::new(),
        }
    }

    /// Convert a JSON value.
    ///
    /// Objects keep their key order. Scalars keep their JSON text form,
    /// except strings which are stored unquoted.
    pub fn from_json(json: &Value) -> Self {
        match json {
            Value::Null => Node::scalar("null"),
            Value::Bool(b) => Node::scalar(b.to_string()),
            Value::Number(n) => Node::scalar(n.to_string()),
            Value::String(s) => Node::scalar(s.as_str()),
            Value::Array(arr) => Node::sequence(arr.iter().map(Node::from_json)),
            Value::Object(obj) => Node::mapping(
                obj.iter()
                    .map(|(k, v)| (Node::scalar(k.as_str()), Node::from_json(v))),
            ),
        }
    }

    /// Convert a JSON value into a document holding it
    pub fn document_from_json(json: &Value) -> Self {
        Node::document(Node::from_json(json))
    }
}

impl TreeNode for Node {
    fn kind(&self) -> NodeKind {
        self.kind
    }

    fn content(&self) -> &[Self] {
        &self.content
    }

    fn value(&self) -> &str {
        &self.value
    }
}
