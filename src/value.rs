use std::fmt;

use crate::node::NodeId;

/// A runtime value produced by evaluating an attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    /// Insertion-ordered key/value pairs.
    Dict(Vec<(Value, Value)>),
    /// A reference to a node of the tree (`self`, `p`, an alias...).
    Node(NodeId),
    /// The merged child list of a node (`c`).
    Nodes(Vec<NodeId>),
}

/// Builtin type names accepted by a `type` annotation.
pub const BUILTIN_TYPES: &[&str] = &["bool", "int", "float", "str", "list", "tuple", "dict"];

impl Value {
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Node(_) => "node",
            Value::Nodes(_) => "nodes",
        }
    }

    /// Python truthiness.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) | Value::Tuple(items) => !items.is_empty(),
            Value::Dict(pairs) => !pairs.is_empty(),
            Value::Node(_) => true,
            Value::Nodes(nodes) => !nodes.is_empty(),
        }
    }

    #[must_use]
    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Value::Node(id) => Some(*id),
            _ => None,
        }
    }

    /// Renders the value as a literal the configuration language reads back
    /// to an equal value. Node references have no literal form.
    #[must_use]
    pub fn to_literal(&self) -> Option<String> {
        Some(match self {
            Value::None => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_float(*f)?,
            Value::Str(s) => quote(s),
            Value::List(items) => format!("[{}]", literal_list(items)?),
            Value::Tuple(items) if items.len() == 1 => format!("({},)", literal_list(items)?),
            Value::Tuple(items) => format!("({})", literal_list(items)?),
            Value::Dict(pairs) => {
                let mut parts = Vec::with_capacity(pairs.len());
                for (k, v) in pairs {
                    parts.push(format!("{}: {}", k.to_literal()?, v.to_literal()?));
                }
                format!("{{{}}}", parts.join(", "))
            }
            Value::Node(_) | Value::Nodes(_) => return None,
        })
    }
}

fn literal_list(items: &[Value]) -> Option<String> {
    let parts: Option<Vec<String>> = items.iter().map(Value::to_literal).collect();
    Some(parts?.join(", "))
}

fn format_float(f: f64) -> Option<String> {
    if !f.is_finite() {
        return None;
    }
    let text = format!("{f:?}");
    if text.contains(['.', 'e', 'E']) {
        Some(text)
    } else {
        Some(format!("{text}.0"))
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s}"),
            Value::Node(id) => write!(f, "<node {}>", id.index()),
            Value::Nodes(ids) => {
                let ids: Vec<String> = ids.iter().map(|id| id.index().to_string()).collect();
                write!(f, "<nodes {}>", ids.join(","))
            }
            Value::Float(v) if !v.is_finite() => write!(f, "{v}"),
            other => match other.to_literal() {
                Some(text) => write!(f, "{text}"),
                None => write!(f, "{other:?}"),
            },
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_rendering() {
        assert_eq!(Value::Int(-3).to_literal().unwrap(), "-3");
        assert_eq!(Value::Float(2.0).to_literal().unwrap(), "2.0");
        assert_eq!(Value::Str("it's\n".into()).to_literal().unwrap(), r"'it\'s\n'");
        assert_eq!(
            Value::Tuple(vec![Value::Int(1)]).to_literal().unwrap(),
            "(1,)"
        );
        assert_eq!(
            Value::Dict(vec![(Value::from("a"), Value::List(vec![Value::None]))])
                .to_literal()
                .unwrap(),
            "{'a': [None]}"
        );
        assert!(Value::Node(NodeId::new(0)).to_literal().is_none());
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(Value::List(vec![Value::None]).is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
        assert!(!Value::None.is_truthy());
    }
}
