// callplan-core/src/orderedmap.rs

//! Insertion-ordered key/value container with a deterministic JSON renderer.
//!
//! Model behavior is sensitive to the exact textual form of a prompt, so
//! anything destined for one is assembled here rather than in a map type
//! with unspecified iteration order.

use serde_json::Value;

/// A key/value mapping that preserves insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderedMap {
    items: Vec<(String, Node)>,
}

/// A value held by an [`OrderedMap`]: a nested map, an array, or a leaf JSON
/// value rendered through the standard encoder.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Map(OrderedMap),
    Array(Vec<Node>),
    Value(Value),
}

impl OrderedMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a pair, keeping insertion order.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<Node>) {
        self.items.push((key.into(), value.into()));
    }

    /// Builder-style [`push`](Self::push).
    pub fn entry(mut self, key: impl Into<String>, value: impl Into<Node>) -> Self {
        self.push(key, value);
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Serializes to pretty-printed JSON with keys in insertion order.
    pub fn to_json(&self) -> String {
        self.to_json_indented(0)
    }

    /// Serializes with the opening brace at the given indentation level.
    /// One level is four spaces.
    pub fn to_json_indented(&self, level: usize) -> String {
        if self.items.is_empty() {
            return "{}".to_string();
        }
        let indent = "    ".repeat(level);
        let next_indent = "    ".repeat(level + 1);

        let mut out = String::from("{\n");
        for (i, (key, value)) in self.items.iter().enumerate() {
            if i > 0 {
                out.push_str(",\n");
            }
            out.push_str(&next_indent);
            out.push_str(&encode_leaf(&Value::String(key.clone())));
            out.push_str(": ");
            out.push_str(&render_node(value, level + 1));
        }
        out.push('\n');
        out.push_str(&indent);
        out.push('}');
        out
    }
}

fn render_node(node: &Node, level: usize) -> String {
    match node {
        Node::Map(map) => map.to_json_indented(level),
        Node::Array(items) => render_array(items, level),
        Node::Value(value) => encode_leaf(value),
    }
}

fn render_array(items: &[Node], level: usize) -> String {
    if items.is_empty() {
        return "[]".to_string();
    }
    let indent = "    ".repeat(level);
    let next_indent = "    ".repeat(level + 1);

    let mut out = String::from("[\n");
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(",\n");
        }
        out.push_str(&next_indent);
        out.push_str(&render_node(item, level + 1));
    }
    out.push('\n');
    out.push_str(&indent);
    out.push(']');
    out
}

fn encode_leaf(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

impl From<OrderedMap> for Node {
    fn from(map: OrderedMap) -> Self {
        Node::Map(map)
    }
}

impl From<Vec<Node>> for Node {
    fn from(items: Vec<Node>) -> Self {
        Node::Array(items)
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        Node::Value(value)
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Node::Value(Value::String(value.to_string()))
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        Node::Value(Value::String(value))
    }
}
