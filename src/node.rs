//! The assembled configuration tree.
//!
//! Nodes live in an arena owned by [`Tree`] and refer to each other by
//! [`NodeId`]. Parent links, child lists, bases and alias tables are all ids,
//! so inheritance can share a base node between many derived nodes.

use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;

use crate::analyzer::Analysis;
use crate::ast::Expr;
use crate::syntax::{class_part, Annotations, Precedence};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    #[must_use]
    pub fn new(index: usize) -> Self {
        NodeId(index)
    }

    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Execution state of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttrState {
    /// Not executed yet, or execution failed.
    #[default]
    Uncheck,
    /// Resolved with no symbolic dependencies.
    Static,
    /// Resolved with at least one dependency.
    Dynamic,
}

impl fmt::Display for AttrState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AttrState::Uncheck => "uncheck",
            AttrState::Static => "static",
            AttrState::Dynamic => "dynamic",
        })
    }
}

/// Cached expression and bindings used to recompute a dynamic attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Reflex {
    pub(crate) expr: Expr,
    pub(crate) locals: HashMap<String, Value>,
}

/// One `key: value` line of a class.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    /// 1-based source line, 0 for defaults of external classes.
    pub line: usize,
    /// The value text as written.
    pub raw: String,
    pub notes: Annotations,
    pub state: AttrState,
    pub analysis: Analysis,
    pub value: Option<Value>,
    /// Copied from a base class when first read on this node.
    pub inherited: bool,
    pub(crate) reflex: Option<Reflex>,
}

impl Attribute {
    pub(crate) fn new(line: usize, raw: &str, notes: Annotations, analysis: Analysis) -> Self {
        Self {
            line,
            raw: raw.to_string(),
            notes,
            state: AttrState::Uncheck,
            analysis,
            value: None,
            inherited: false,
            reflex: None,
        }
    }

    /// A pre-resolved constant, as supplied by an external class.
    pub(crate) fn constant(value: Value) -> Self {
        let raw = value.to_literal().unwrap_or_default();
        Self {
            line: 0,
            raw: raw.clone(),
            notes: Annotations::default(),
            state: AttrState::Static,
            analysis: Analysis {
                expr: raw,
                symbols: IndexMap::new(),
                literals: IndexMap::new(),
                constant: Some(value.clone()),
            },
            value: Some(value),
            inherited: false,
            reflex: None,
        }
    }

    /// An unexecuted copy, used when a node inherits this attribute.
    pub(crate) fn fresh(&self) -> Self {
        let mut copy = Self::new(self.line, &self.raw, self.notes.clone(), self.analysis.clone());
        copy.inherited = true;
        copy
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.state != AttrState::Uncheck
    }
}

/// "When this field changes, recompute `attr` on `dependent`."
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub dependent: NodeId,
    pub attr: String,
    /// Placeholder the changed value is bound to in the dependent's expression.
    pub symbol: String,
    /// Path from the changed node back to the dependent, e.g. `self.c0`.
    pub reverse_path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub(crate) name: String,
    pub(crate) line: usize,
    pub(crate) header: String,
    pub(crate) ids: IndexMap<String, NodeId>,
    pub(crate) attrs: IndexMap<String, Attribute>,
    pub(crate) bases: Vec<NodeId>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) fields: IndexMap<String, Value>,
    pub(crate) triggers: IndexMap<String, Vec<Trigger>>,
}

impl Node {
    pub(crate) fn new(name: impl Into<String>, line: usize, header: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            line,
            header: header.into(),
            ids: IndexMap::new(),
            attrs: IndexMap::new(),
            bases: Vec::new(),
            parent: None,
            children: Vec::new(),
            fields: IndexMap::new(),
            triggers: IndexMap::new(),
        }
    }

    /// Real name: `Class` or `Class-alias`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declaration line, 0 for the synthetic root and external placeholders.
    #[must_use]
    pub fn line(&self) -> usize {
        self.line
    }

    /// The header as written, without `<...>`.
    #[must_use]
    pub fn header(&self) -> &str {
        &self.header
    }

    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Declared children only; see [`Tree::merged_children`] for inherited ones.
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    #[must_use]
    pub fn bases(&self) -> &[NodeId] {
        &self.bases
    }

    #[must_use]
    pub fn ids(&self) -> &IndexMap<String, NodeId> {
        &self.ids
    }

    #[must_use]
    pub fn attrs(&self) -> &IndexMap<String, Attribute> {
        &self.attrs
    }

    /// Fields written at runtime that are not declared attributes.
    #[must_use]
    pub fn fields(&self) -> &IndexMap<String, Value> {
        &self.fields
    }

    #[must_use]
    pub fn triggers(&self, field: &str) -> &[Trigger] {
        self.triggers.get(field).map_or(&[], Vec::as_slice)
    }
}

/// Callback run after a field changes, with `(old, new)`.
pub type Callback = Box<dyn FnMut(&Value, &Value) -> Result<(), Box<dyn std::error::Error>>>;

#[derive(Default)]
pub(crate) struct Observers(pub(crate) HashMap<(NodeId, String), Callback>);

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

/// An assembled configuration: the synthetic root, every declared node, and
/// placeholder nodes for external classes.
#[derive(Debug)]
pub struct Tree {
    pub(crate) nodes: Vec<Node>,
    pub(crate) root: NodeId,
    pub(crate) classes: IndexMap<String, NodeId>,
    pub(crate) observers: Observers,
    pub(crate) executing: Vec<(NodeId, String)>,
    pub(crate) writing: Vec<(NodeId, String)>,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new("root", 0, "")],
            root: NodeId(0),
            classes: IndexMap::new(),
            observers: Observers::default(),
            executing: Vec::new(),
            writing: Vec::new(),
        }
    }

    pub(crate) fn add_node(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Appends `child` to `parent`. A child that already has a parent is
    /// moved, with a warning.
    pub(crate) fn attach(&mut self, parent: NodeId, child: NodeId) {
        if let Some(old) = self.nodes[child.0].parent {
            log::warn!(
                "{} already has parent {}",
                self.nodes[child.0].name,
                self.nodes[old.0].name
            );
            self.nodes[old.0].children.retain(|c| *c != child);
        }
        self.nodes[parent.0].children.push(child);
        self.nodes[child.0].parent = Some(parent);
    }

    /// The synthetic root holding every root class as a child.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes[self.root.0].children.is_empty()
    }

    /// A class declared by the loaded file, or the placeholder created for
    /// an external class it used, by real name.
    #[must_use]
    pub fn class(&self, real_name: &str) -> Option<NodeId> {
        self.classes.get(real_name).copied()
    }

    pub fn classes(&self) -> impl Iterator<Item = (&str, NodeId)> {
        self.classes.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// The first declared child of `id` named `name`.
    #[must_use]
    pub fn child(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.nodes[id.0]
            .children
            .iter()
            .copied()
            .find(|c| self.nodes[c.0].name == name)
    }

    /// Current value of a field: a resolved attribute or a runtime field.
    #[must_use]
    pub fn get(&self, id: NodeId, field: &str) -> Option<&Value> {
        let node = &self.nodes[id.0];
        if let Some(attr) = node.attrs.get(field) {
            if let Some(value) = &attr.value {
                return Some(value);
            }
        }
        node.fields.get(field)
    }

    /// Own attribute first, then each base in declaration order.
    #[must_use]
    pub fn lookup_attr(&self, id: NodeId, name: &str) -> Option<(NodeId, &Attribute)> {
        let node = &self.nodes[id.0];
        if let Some(attr) = node.attrs.get(name) {
            return Some((id, attr));
        }
        node.bases.iter().find_map(|base| self.lookup_attr(*base, name))
    }

    /// Names of every attribute visible on `id`, own first.
    #[must_use]
    pub fn attr_names(&self, id: NodeId) -> Vec<String> {
        let mut names: Vec<String> = self.nodes[id.0].attrs.keys().cloned().collect();
        for base in &self.nodes[id.0].bases {
            for name in self.attr_names(*base) {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Resolves an alias through own and inherited `ids`. `self` and `root`
    /// always come from the node itself.
    #[must_use]
    pub fn lookup_id(&self, id: NodeId, alias: &str, precedence: Precedence) -> Option<NodeId> {
        let node = &self.nodes[id.0];
        let own = node.ids.get(alias).copied();
        if matches!(alias, "self" | "root") {
            return own;
        }
        let inherited = || {
            node.bases
                .iter()
                .find_map(|base| self.lookup_id(*base, alias, precedence))
        };
        match precedence {
            Precedence::Own => own.or_else(inherited),
            Precedence::Base => inherited().or(own),
        }
    }

    /// Every alias visible on `id`.
    #[must_use]
    pub fn id_names(&self, id: NodeId) -> Vec<String> {
        let mut names: Vec<String> = self.nodes[id.0].ids.keys().cloned().collect();
        for base in &self.nodes[id.0].bases {
            for name in self.id_names(*base) {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Declared children merged with the children of every base.
    #[must_use]
    pub fn merged_children(&self, id: NodeId, precedence: Precedence) -> Vec<NodeId> {
        let node = &self.nodes[id.0];
        let inherited: Vec<NodeId> = node
            .bases
            .iter()
            .flat_map(|base| self.merged_children(*base, precedence))
            .collect();
        match precedence {
            Precedence::Own => node.children.iter().copied().chain(inherited).collect(),
            Precedence::Base => inherited
                .into_iter()
                .chain(node.children.iter().copied())
                .collect(),
        }
    }

    /// True when `class` names the node's class or any class it inherits.
    #[must_use]
    pub fn is_instance(&self, id: NodeId, class: &str) -> bool {
        let node = &self.nodes[id.0];
        class_part(&node.name) == class
            || node.name == class
            || node.bases.iter().any(|base| self.is_instance(*base, class))
    }

    /// Registers `callback` to run whenever `field` of `id` changes.
    /// Replaces any previous callback for the same field.
    pub fn on_change<F>(&mut self, id: NodeId, field: &str, callback: F)
    where
        F: FnMut(&Value, &Value) -> Result<(), Box<dyn std::error::Error>> + 'static,
    {
        self.observers
            .0
            .insert((id, field.to_string()), Box::new(callback));
    }

    /// Pre-order traversal from the synthetic root, yielding `(node, depth)`.
    /// The root has depth 0. Each call starts a fresh traversal.
    #[must_use]
    pub fn walk(&self, include_root: bool) -> Walk<'_> {
        let stack = if include_root {
            vec![(self.root, 0)]
        } else {
            self.nodes[self.root.0]
                .children
                .iter()
                .rev()
                .map(|c| (*c, 1))
                .collect()
        };
        Walk { tree: self, stack }
    }
}

pub struct Walk<'a> {
    tree: &'a Tree,
    stack: Vec<(NodeId, usize)>,
}

impl Iterator for Walk<'_> {
    type Item = (NodeId, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let (id, depth) = self.stack.pop()?;
        let children = &self.tree.nodes[id.0].children;
        self.stack
            .extend(children.iter().rev().map(|c| (*c, depth + 1)));
        Some((id, depth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Tree, [NodeId; 4]) {
        let mut tree = Tree::new();
        let a = tree.add_node(Node::new("A", 1, "A"));
        let b = tree.add_node(Node::new("B", 2, "B"));
        let c = tree.add_node(Node::new("C", 3, "C"));
        let d = tree.add_node(Node::new("D", 4, "D"));
        let root = tree.root();
        tree.attach(root, a);
        tree.attach(a, b);
        tree.attach(b, c);
        tree.attach(root, d);
        (tree, [a, b, c, d])
    }

    #[test]
    fn test_walk_is_preorder_and_restartable() {
        let (tree, [a, b, c, d]) = sample();
        let with_root: Vec<_> = tree.walk(true).collect();
        assert_eq!(
            with_root,
            vec![(tree.root(), 0), (a, 1), (b, 2), (c, 3), (d, 1)]
        );
        let without_root: Vec<_> = tree.walk(false).collect();
        assert_eq!(without_root, vec![(a, 1), (b, 2), (c, 3), (d, 1)]);
        assert_eq!(tree.walk(false).count(), 4);
    }

    #[test]
    fn test_reattach_moves_child() {
        let (mut tree, [a, b, _, d]) = sample();
        tree.attach(d, b);
        assert!(tree.node(a).children().is_empty());
        assert_eq!(tree.node(d).children(), &[b]);
        assert_eq!(tree.node(b).parent(), Some(d));
    }

    #[test]
    fn test_layered_lookup() {
        let mut tree = Tree::new();
        let base = tree.add_node(Node::new("Base", 1, "Base"));
        let derived = tree.add_node(Node::new("Derived", 2, "Derived(Base)"));
        let x = tree.add_node(Node::new("X", 3, "X"));
        let y = tree.add_node(Node::new("Y", 4, "Y"));
        tree.nodes[derived.0].bases.push(base);
        tree.nodes[base.0].ids.insert("t".to_string(), x);
        tree.nodes[derived.0].ids.insert("t".to_string(), y);
        tree.nodes[derived.0].ids.insert("self".to_string(), derived);
        tree.nodes[base.0].ids.insert("self".to_string(), base);
        tree.attach(base, x);
        tree.attach(derived, y);

        assert_eq!(tree.lookup_id(derived, "t", Precedence::Base), Some(x));
        assert_eq!(tree.lookup_id(derived, "t", Precedence::Own), Some(y));
        assert_eq!(tree.lookup_id(derived, "self", Precedence::Base), Some(derived));
        assert_eq!(tree.merged_children(derived, Precedence::Base), vec![x, y]);
        assert_eq!(tree.merged_children(derived, Precedence::Own), vec![y, x]);
        assert_eq!(tree.id_names(derived), vec!["t", "self"]);
        assert!(tree.is_instance(derived, "Base"));
        assert!(!tree.is_instance(base, "Derived"));
    }
}
