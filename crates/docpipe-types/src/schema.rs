//! The recursive rule schema tree (spec §3, DESIGN NOTES §9: "Dynamic
//! schemas"). Modeled as a tagged variant with a shared envelope
//! (label, type, required, confidence threshold); recursion via
//! children maps/lists.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaNodeKind {
    Field,
    Object,
    Array,
    Table,
}

/// A node in a rule's field schema tree.
///
/// `Field` nodes are leaves. `Object` nodes carry a keyed map of child
/// nodes. `Array`/`Table` nodes carry a single child template describing
/// each element/row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaNode {
    pub label: String,
    #[serde(rename = "type")]
    pub kind: SchemaNodeKind,
    #[serde(default)]
    pub required: bool,
    /// Per-field confidence threshold; falls back to the rule default,
    /// then 80, per spec §4.4's audit gate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_threshold: Option<f32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<String, SchemaNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element: Option<Box<SchemaNode>>,
}

impl SchemaNode {
    #[must_use]
    pub fn field(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            kind: SchemaNodeKind::Field,
            required: false,
            confidence_threshold: None,
            children: BTreeMap::new(),
            element: None,
        }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = Some(threshold);
        self
    }

    #[must_use]
    pub fn object(label: impl Into<String>, children: BTreeMap<String, SchemaNode>) -> Self {
        Self {
            label: label.into(),
            kind: SchemaNodeKind::Object,
            required: false,
            confidence_threshold: None,
            children,
            element: None,
        }
    }

    #[must_use]
    pub fn array(label: impl Into<String>, element: SchemaNode) -> Self {
        Self {
            label: label.into(),
            kind: SchemaNodeKind::Array,
            required: false,
            confidence_threshold: None,
            children: BTreeMap::new(),
            element: Some(Box::new(element)),
        }
    }

    #[must_use]
    pub fn table(label: impl Into<String>, columns: BTreeMap<String, SchemaNode>) -> Self {
        Self {
            label: label.into(),
            kind: SchemaNodeKind::Table,
            required: false,
            confidence_threshold: None,
            children: columns,
            element: None,
        }
    }

    /// Resolve the sub-definition at `path` (dotted, array-broadcasting:
    /// a path segment matching an array/table node's element is applied
    /// to every element, per spec's "Nested field set/get" design note).
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<&SchemaNode> {
        let mut node = self;
        for segment in path.split('.') {
            node = match node.kind {
                SchemaNodeKind::Object => node.children.get(segment)?,
                SchemaNodeKind::Array | SchemaNodeKind::Table => {
                    // Broadcasting: the segment names a column/child of
                    // the element template, or (for tables) a column.
                    if let Some(elem) = &node.element {
                        if elem.kind == SchemaNodeKind::Object {
                            elem.children.get(segment)?
                        } else {
                            return None;
                        }
                    } else {
                        node.children.get(segment)?
                    }
                }
                SchemaNodeKind::Field => return None,
            };
        }
        Some(node)
    }

    /// Effective confidence threshold for this field: its own, else the
    /// rule default, else 80 (spec §4.4 audit gate).
    #[must_use]
    pub fn effective_threshold(&self, rule_default: Option<f32>) -> f32 {
        self.confidence_threshold
            .or(rule_default)
            .unwrap_or(80.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_nested_object_path() {
        let mut line_children = BTreeMap::new();
        line_children.insert("qty".to_string(), SchemaNode::field("qty"));
        let line = SchemaNode::object("line", line_children);
        let mut order_root = BTreeMap::new();
        order_root.insert("line".to_string(), SchemaNode::array("line", line));
        let order = SchemaNode::object("order", order_root);

        // Resolution starts from `order`'s own children, so the path
        // omits the root's own label (array broadcast into `line`).
        let resolved = order.resolve("line.qty");
        assert!(resolved.is_some());
        assert_eq!(resolved.unwrap().label, "qty");
    }

    #[test]
    fn effective_threshold_fallback_chain() {
        let f = SchemaNode::field("amount");
        assert_eq!(f.effective_threshold(None), 80.0);
        assert_eq!(f.effective_threshold(Some(70.0)), 70.0);
        let f2 = f.with_threshold(90.0);
        assert_eq!(f2.effective_threshold(Some(70.0)), 90.0);
    }
}
