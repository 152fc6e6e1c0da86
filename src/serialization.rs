use indexmap::IndexMap;
use serde::Serialize;

use crate::grammar::INDENT_UNIT;
use crate::node::{AttrState, NodeId, Tree};
use crate::value::Value;

/// Serde-friendly form of a runtime [`Value`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Data {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Data>),
    Object(IndexMap<String, Data>),
}

/// One node of a tree snapshot: its real name, the attributes declared on
/// it and its declared children.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSnapshot {
    pub name: String,
    pub attributes: IndexMap<String, Data>,
    pub children: Vec<NodeSnapshot>,
}

pub(crate) fn to_data(value: &Value, tree: &Tree) -> Data {
    match value {
        Value::None => Data::Null,
        Value::Bool(b) => Data::Bool(*b),
        Value::Int(i) => Data::Int(*i),
        Value::Float(f) => Data::Float(*f),
        Value::Str(s) => Data::String(s.clone()),
        Value::List(items) | Value::Tuple(items) => {
            Data::Array(items.iter().map(|v| to_data(v, tree)).collect())
        }
        Value::Dict(pairs) => Data::Object(
            pairs
                .iter()
                .map(|(k, v)| {
                    let key = match k {
                        Value::Str(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (key, to_data(v, tree))
                })
                .collect(),
        ),
        // Node references serialize as the node's real name.
        Value::Node(id) => Data::String(tree.node(*id).name().to_string()),
        Value::Nodes(ids) => Data::Array(
            ids.iter()
                .map(|id| Data::String(tree.node(*id).name().to_string()))
                .collect(),
        ),
    }
}

impl Tree {
    /// Snapshot of every root class. Inherited attributes are left out;
    /// unresolved attributes serialize as null.
    #[must_use]
    pub fn snapshot(&self) -> Vec<NodeSnapshot> {
        self.node(self.root())
            .children()
            .iter()
            .map(|id| self.snapshot_node(*id))
            .collect()
    }

    fn snapshot_node(&self, id: NodeId) -> NodeSnapshot {
        let node = self.node(id);
        let attributes = node
            .attrs()
            .iter()
            .filter(|(_, attr)| !attr.inherited)
            .map(|(name, attr)| {
                let data = attr
                    .value
                    .as_ref()
                    .map_or(Data::Null, |value| to_data(value, self));
                (name.clone(), data)
            })
            .collect();
        NodeSnapshot {
            name: node.name().to_string(),
            attributes,
            children: node
                .children()
                .iter()
                .map(|c| self.snapshot_node(*c))
                .collect(),
        }
    }

    /// Serializes the tree snapshot into a pretty-printed JSON string.
    ///
    /// # Errors
    /// Returns a `serde_json::Error` if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.snapshot())
    }

    /// Serializes the tree snapshot into a YAML string.
    ///
    /// # Errors
    /// Returns a `serde_yaml::Error` if serialization fails.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self.snapshot())
    }

    /// Re-emits the tree as configuration text.
    ///
    /// Headers are written as declared. Static attributes are written as
    /// literals of their current value and everything else as the original
    /// expression, so loading the output again rebuilds the same tree.
    #[must_use]
    pub fn to_source(&self) -> String {
        let mut out = String::new();
        for (id, depth) in self.walk(false) {
            let node = self.node(id);
            let pad = " ".repeat((depth - 1) * INDENT_UNIT);
            if depth == 1 {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(&format!("<{}>\n", node.header()));
            } else {
                out.push_str(&format!("{pad}{}\n", node.header()));
            }

            for (name, attr) in node.attrs().iter().filter(|(_, a)| !a.inherited) {
                let key = match attr.notes.to_source() {
                    Some(notes) => format!("{name}({notes})"),
                    None => name.clone(),
                };
                let literal = match (attr.state, &attr.value) {
                    (AttrState::Static, Some(value)) => value.to_literal(),
                    _ => None,
                };
                let text = literal.unwrap_or_else(|| attr.raw.clone());
                out.push_str(&format!("{pad}{:width$}{key}: {text}\n", "", width = INDENT_UNIT));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_data() {
        let tree = Tree::new();
        let value = Value::Dict(vec![
            (Value::Str("a".into()), Value::List(vec![Value::Int(1), Value::None])),
            (Value::Int(2), Value::Tuple(vec![Value::Bool(true)])),
        ]);
        let data = to_data(&value, &tree);
        let json = serde_json::to_string(&data).unwrap();
        assert_eq!(json, r#"{"a":[1,null],"2":[true]}"#);
        assert_eq!(
            to_data(&Value::Node(tree.root()), &tree),
            Data::String("root".to_string())
        );
    }
}
