//! Driver-neutral row model returned by a [`QueryExecutor`](super::QueryExecutor)

use serde_json::{Map, Value};
use std::collections::HashMap;

/// Query parameters, bound by name (`$companyId`, `$searchValue`, ...)
pub type Params = HashMap<String, Value>;

/// A graph node with its labels and properties
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GraphNode {
    pub labels: Vec<String>,
    pub properties: Map<String, Value>,
}

impl GraphNode {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
            properties: Map::new(),
        }
    }

    /// Builder-style property setter
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    /// The node's `id` property, rendered as a string whatever its stored type
    pub fn id(&self) -> Option<String> {
        match self.properties.get("id")? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l.eq_ignore_ascii_case(label))
    }
}

/// One column of a returned row
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    Node(GraphNode),
    Nodes(Vec<GraphNode>),
    Scalar(Value),
}

impl RecordValue {
    pub fn is_null(&self) -> bool {
        matches!(self, RecordValue::Scalar(Value::Null))
    }
}

/// One returned row, accessed by column alias
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: HashMap<String, RecordValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: RecordValue) -> Self {
        self.insert(column, value);
        self
    }

    pub fn with_node(self, column: &str, node: GraphNode) -> Self {
        self.with(column, RecordValue::Node(node))
    }

    pub fn with_scalar(self, column: &str, value: impl Into<Value>) -> Self {
        self.with(column, RecordValue::Scalar(value.into()))
    }

    pub fn insert(&mut self, column: &str, value: RecordValue) {
        self.fields.insert(column.to_string(), value);
    }

    pub fn get(&self, column: &str) -> Option<&RecordValue> {
        self.fields.get(column)
    }

    pub fn node(&self, column: &str) -> Option<&GraphNode> {
        match self.fields.get(column) {
            Some(RecordValue::Node(node)) => Some(node),
            _ => None,
        }
    }

    /// Nodes held by a column: empty for null, one for a node, all for a list
    pub fn nodes(&self, column: &str) -> Vec<&GraphNode> {
        match self.fields.get(column) {
            Some(RecordValue::Node(node)) => vec![node],
            Some(RecordValue::Nodes(nodes)) => nodes.iter().collect(),
            _ => Vec::new(),
        }
    }

    pub fn scalar(&self, column: &str) -> Option<&Value> {
        match self.fields.get(column) {
            Some(RecordValue::Scalar(value)) => Some(value),
            _ => None,
        }
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.scalar(column).and_then(Value::as_str)
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.scalar(column).and_then(Value::as_i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_id_renders_numbers() {
        let node = GraphNode::new(["Employee"]).with("id", 42);
        assert_eq!(node.id(), Some("42".to_string()));
        assert_eq!(GraphNode::new(["Employee"]).id(), None);
    }

    #[test]
    fn test_label_match_is_case_insensitive() {
        let node = GraphNode::new(["Equipment"]);
        assert!(node.has_label("equipment"));
        assert!(!node.has_label("employee"));
    }

    #[test]
    fn test_record_nodes_normalises_shapes() {
        let a = GraphNode::new(["Role"]).with("id", "r1");
        let b = GraphNode::new(["Role"]).with("id", "r2");
        let record = Record::new()
            .with_node("single", a.clone())
            .with("many", RecordValue::Nodes(vec![a.clone(), b]))
            .with_scalar("missing", json!(null));

        assert_eq!(record.nodes("single").len(), 1);
        assert_eq!(record.nodes("many").len(), 2);
        assert!(record.nodes("missing").is_empty());
        assert!(record.nodes("absent").is_empty());
        assert!(record.get("missing").unwrap().is_null());
    }
}
