//! Lazy attribute execution and reactive propagation.
//!
//! Executing an attribute resolves each symbol path to an owning node and a
//! field, executes those first, evaluates the cached expression and, for
//! dynamic attributes, leaves a [`Trigger`] on every dependency. A later
//! [`Tree::set_field`] on a dependency replays the expression with the new
//! value bound and writes the result, which cascades further.

use indexmap::IndexMap;
use std::collections::HashMap;

use crate::analyzer::is_forbidden_name;
use crate::error::EvalError;
use crate::interp::{evaluate, Scope};
use crate::node::{AttrState, NodeId, Reflex, Tree, Trigger};
use crate::parser;
use crate::syntax::{Annotations, Precedence, Safety, TypeNote};
use crate::value::Value;

/// Where a symbol path landed.
struct Dependency {
    owner: NodeId,
    /// `None` when the path is a bare alias naming the node itself.
    field: Option<String>,
    reverse_path: String,
}

/// Expression scope that can read members of nodes in the tree.
struct TreeScope<'t> {
    tree: &'t mut Tree,
    locals: HashMap<String, Value>,
    notes: Annotations,
}

impl Scope for TreeScope<'_> {
    fn lookup(&mut self, name: &str) -> Result<Value, EvalError> {
        self.locals
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::UnknownReference(name.to_string()))
    }

    fn member(&mut self, target: &Value, field: &str) -> Result<Value, EvalError> {
        match target {
            Value::Node(id) => self.tree.execute_as(*id, field, &self.notes),
            other => Err(EvalError::runtime(format!(
                "'{}' object has no attribute '{field}'",
                other.type_name()
            ))),
        }
    }
}

impl Tree {
    /// Value of `name` on `id`, executing the attribute on first access.
    ///
    /// Names that are not attributes resolve structurally: a runtime field,
    /// an alias from the node's `ids`, `root`, `p` (parent), `c` (children)
    /// or `c<N>` (one child).
    pub fn execute(&mut self, id: NodeId, name: &str) -> Result<Value, EvalError> {
        self.execute_as(id, name, &Annotations::default())
    }

    pub(crate) fn execute_as(
        &mut self,
        id: NodeId,
        name: &str,
        notes: &Annotations,
    ) -> Result<Value, EvalError> {
        if let Some(attr) = self.nodes[id.index()].attrs.get(name) {
            if attr.is_resolved() {
                return Ok(attr.value.clone().unwrap_or(Value::None));
            }
            return self.run_attr(id, name);
        }
        if let Some(value) = self.nodes[id.index()].fields.get(name) {
            return Ok(value.clone());
        }
        if let Some(copy) = self.lookup_attr(id, name).map(|(_, attr)| attr.fresh()) {
            self.nodes[id.index()].attrs.insert(name.to_string(), copy);
            return self.run_attr(id, name);
        }
        self.resolve_structural(id, name, notes)
    }

    fn resolve_structural(
        &self,
        id: NodeId,
        name: &str,
        notes: &Annotations,
    ) -> Result<Value, EvalError> {
        if let Some(target) = self.lookup_id(id, name, notes.index_precedence()) {
            return Ok(Value::Node(target));
        }
        let node = &self.nodes[id.index()];
        match name {
            "root" => Ok(Value::None),
            "p" => Ok(node.parent.map_or(Value::None, Value::Node)),
            "c" => Ok(Value::Nodes(
                self.merged_children(id, notes.child_precedence()),
            )),
            _ => match name.strip_prefix('c').and_then(|n| n.parse::<usize>().ok()) {
                Some(index) => {
                    let children = self.merged_children(id, notes.child_precedence());
                    children
                        .get(index)
                        .map(|c| Value::Node(*c))
                        .ok_or_else(|| EvalError::ChildIndexOutOfRange {
                            node: node.name.clone(),
                            index,
                            len: children.len(),
                        })
                }
                None => Err(EvalError::UnknownReference(format!("{}.{name}", node.name))),
            },
        }
    }

    fn run_attr(&mut self, id: NodeId, name: &str) -> Result<Value, EvalError> {
        let key = (id, name.to_string());
        if self.executing.contains(&key) {
            return Err(EvalError::ReactiveCycle(format!(
                "{}.{name}",
                self.nodes[id.index()].name
            )));
        }
        self.executing.push(key);
        let result = self.compute(id, name);
        self.executing.pop();
        result
    }

    fn compute(&mut self, id: NodeId, name: &str) -> Result<Value, EvalError> {
        let Some(attr) = self.nodes[id.index()].attrs.get(name) else {
            return Err(EvalError::UnknownReference(name.to_string()));
        };
        let analysis = attr.analysis.clone();
        let notes = attr.notes.clone();

        if let Some(value) = analysis.constant {
            self.store_result(id, name, value.clone(), AttrState::Static, None);
            return Ok(value);
        }

        for path in analysis.symbols.values() {
            if let Some(segment) = path.split('.').find(|s| is_forbidden_name(s)) {
                return Err(EvalError::ForbiddenConstruct(segment.to_string()));
            }
        }
        let expr = parser::parse(&analysis.expr)?;

        let mut locals: HashMap<String, Value> = analysis
            .literals
            .iter()
            .map(|(k, v)| (k.clone(), Value::Str(v.clone())))
            .collect();
        let mut deps = Vec::new();
        for (symbol, path) in &analysis.symbols {
            let dep = self.resolve_symbol(id, path, &notes)?;
            let value = match &dep.field {
                Some(field) => self.execute_as(dep.owner, field, &notes)?,
                None => Value::Node(dep.owner),
            };
            locals.insert(symbol.clone(), value);
            if dep.field.is_some() {
                deps.push((symbol.clone(), dep));
            }
        }

        let mut scope = TreeScope {
            tree: self,
            locals,
            notes,
        };
        let value = evaluate(&expr, &mut scope)?;
        let locals = scope.locals;

        if analysis.symbols.is_empty() {
            log::trace!("{name} is static");
            self.store_result(id, name, value.clone(), AttrState::Static, None);
            return Ok(value);
        }

        self.store_result(
            id,
            name,
            value.clone(),
            AttrState::Dynamic,
            Some(Reflex { expr, locals }),
        );
        for (symbol, dep) in deps {
            let Some(field) = dep.field else { continue };
            let trigger = Trigger {
                dependent: id,
                attr: name.to_string(),
                symbol,
                reverse_path: dep.reverse_path,
            };
            log::debug!(
                "trigger {}.{field} -> {}.{name} via {}",
                self.nodes[dep.owner.index()].name,
                self.nodes[id.index()].name,
                trigger.reverse_path
            );
            let list = self.nodes[dep.owner.index()]
                .triggers
                .entry(field)
                .or_default();
            if !list.contains(&trigger) {
                list.push(trigger);
            }
        }
        Ok(value)
    }

    fn store_result(
        &mut self,
        id: NodeId,
        name: &str,
        value: Value,
        state: AttrState,
        reflex: Option<Reflex>,
    ) {
        if let Some(attr) = self.nodes[id.index()].attrs.get_mut(name) {
            attr.value = Some(value);
            attr.state = state;
            attr.reflex = reflex;
        }
    }

    /// Walks `alias(.hop)*.field` from `id` to the node owning `field`,
    /// tracking the path back from that node.
    fn resolve_symbol(
        &self,
        id: NodeId,
        path: &str,
        notes: &Annotations,
    ) -> Result<Dependency, EvalError> {
        let segments: Vec<&str> = path.split('.').collect();
        let head = segments[0];
        let mut owner = self
            .lookup_id(id, head, notes.index_precedence())
            .ok_or_else(|| EvalError::UnknownReference(head.to_string()))?;
        if segments.len() == 1 {
            return Ok(Dependency {
                owner,
                field: None,
                reverse_path: "self".to_string(),
            });
        }

        let mut reverse = String::new();
        for hop in &segments[1..segments.len() - 1] {
            if *hop == "p" {
                let parent = self.nodes[owner.index()]
                    .parent
                    .ok_or_else(|| EvalError::UnknownReference(path.to_string()))?;
                let index = self
                    .merged_children(parent, Precedence::Base)
                    .iter()
                    .position(|c| *c == owner)
                    .unwrap_or_default();
                reverse = format!(".c{index}{reverse}");
                owner = parent;
            } else {
                let index: usize = hop[1..]
                    .parse()
                    .map_err(|_| EvalError::UnknownReference(path.to_string()))?;
                let children = self.merged_children(owner, notes.child_precedence());
                let Some(child) = children.get(index) else {
                    return Err(EvalError::ChildIndexOutOfRange {
                        node: self.nodes[owner.index()].name.clone(),
                        index,
                        len: children.len(),
                    });
                };
                reverse = format!(".p{reverse}");
                owner = *child;
            }
        }

        Ok(Dependency {
            owner,
            field: segments.last().map(|s| (*s).to_string()),
            reverse_path: format!("self{reverse}"),
        })
    }

    /// Writes `field` on `id`, runs its `on_change` callback and recomputes
    /// every dependent attribute, transitively.
    ///
    /// Callback and recompute failures are logged and do not undo the write.
    /// Re-entering a write that is still cascading is a [`EvalError::ReactiveCycle`].
    pub fn set_field(&mut self, id: NodeId, field: &str, value: Value) -> Result<(), EvalError> {
        let key = (id, field.to_string());
        if self.writing.contains(&key) {
            return Err(EvalError::ReactiveCycle(format!(
                "{}.{field}",
                self.nodes[id.index()].name
            )));
        }

        let old = self.store_field(id, field, value.clone());
        self.writing.push(key);
        let result = self.dispatch(id, field, &old, &value);
        self.writing.pop();
        result
    }

    fn store_field(&mut self, id: NodeId, field: &str, value: Value) -> Value {
        let node = &mut self.nodes[id.index()];
        match node.attrs.get_mut(field) {
            Some(attr) => {
                if attr.state == AttrState::Uncheck {
                    attr.state = AttrState::Static;
                }
                attr.value.replace(value).unwrap_or(Value::None)
            }
            None => node
                .fields
                .insert(field.to_string(), value)
                .unwrap_or(Value::None),
        }
    }

    fn dispatch(
        &mut self,
        id: NodeId,
        field: &str,
        old: &Value,
        new: &Value,
    ) -> Result<(), EvalError> {
        if let Some(callback) = self.observers.0.get_mut(&(id, field.to_string())) {
            if let Err(err) = callback(old, new) {
                log::error!(
                    "on_{field} callback of {} failed: {err}",
                    self.nodes[id.index()].name
                );
            }
        }

        let mut dependents: IndexMap<(NodeId, String), Vec<String>> = IndexMap::new();
        for trigger in self.nodes[id.index()].triggers(field) {
            dependents
                .entry((trigger.dependent, trigger.attr.clone()))
                .or_default()
                .push(trigger.symbol.clone());
        }

        for ((dependent, attr), symbols) in dependents {
            match self.recompute(dependent, &attr, &symbols, new) {
                Ok(value) => self.set_field(dependent, &attr, value)?,
                Err(err) => log::error!(
                    "recomputing {}.{attr} failed: {err}",
                    self.nodes[dependent.index()].name
                ),
            }
        }
        Ok(())
    }

    fn recompute(
        &mut self,
        id: NodeId,
        name: &str,
        symbols: &[String],
        value: &Value,
    ) -> Result<Value, EvalError> {
        let Some(attr) = self.nodes[id.index()].attrs.get_mut(name) else {
            return Err(EvalError::UnknownReference(name.to_string()));
        };
        let notes = attr.notes.clone();
        let Some(reflex) = attr.reflex.as_mut() else {
            return Err(EvalError::runtime(format!("{name} has no cached expression")));
        };
        for symbol in symbols {
            reflex.locals.insert(symbol.clone(), value.clone());
        }
        let expr = reflex.expr.clone();
        let locals = reflex.locals.clone();

        let mut scope = TreeScope {
            tree: self,
            locals,
            notes,
        };
        evaluate(&expr, &mut scope)
    }

    /// Executes every declared attribute in walk order and checks its
    /// annotations, then resolves inherited attributes on each node.
    ///
    /// Returns the failing attribute's line and error. Failures of `unsafe`
    /// attributes are tolerated unless the expression used a forbidden construct.
    pub(crate) fn execute_all(&mut self, unsafe_mode: bool) -> Result<(), (usize, EvalError)> {
        let order: Vec<NodeId> = self.walk(false).map(|(id, _)| id).collect();

        for &id in &order {
            let names: Vec<String> = self.nodes[id.index()]
                .attrs
                .iter()
                .filter(|(_, attr)| !attr.inherited)
                .map(|(name, _)| name.clone())
                .collect();
            for name in names {
                let Some(attr) = self.nodes[id.index()].attrs.get(&name) else {
                    continue;
                };
                let line = attr.line;
                let safe = match attr.notes.safety {
                    Some(Safety::Safe) => true,
                    Some(Safety::Unsafe) => false,
                    None => !unsafe_mode,
                };

                if let Err(err) = self.execute(id, &name) {
                    if safe || matches!(err, EvalError::ForbiddenConstruct(_)) {
                        return Err((line, err));
                    }
                    log::warn!(
                        "line {line}: {}.{name} left unresolved: {err}",
                        self.nodes[id.index()].name
                    );
                    continue;
                }
                self.check_annotations(id, &name).map_err(|err| (line, err))?;
            }
        }

        for &id in &order {
            for name in self.attr_names(id) {
                if self.nodes[id.index()].attrs.contains_key(&name) {
                    continue;
                }
                if let Err(err) = self.execute(id, &name) {
                    log::debug!(
                        "inherited {}.{name} left unresolved: {err}",
                        self.nodes[id.index()].name
                    );
                }
            }
        }
        Ok(())
    }

    fn check_annotations(&self, id: NodeId, name: &str) -> Result<(), EvalError> {
        let Some(attr) = self.nodes[id.index()].attrs.get(name) else {
            return Ok(());
        };
        if !attr.is_resolved() {
            return Ok(());
        }

        if let Some(expected) = attr.notes.state {
            if expected != attr.state {
                return Err(EvalError::AttrStateMismatch {
                    expected: expected.to_string(),
                    found: attr.state.to_string(),
                });
            }
        }

        let value = attr.value.as_ref().unwrap_or(&Value::None);
        match &attr.notes.ty {
            Some(TypeNote::Builtin(expected)) if value.type_name() != expected.as_str() => {
                Err(EvalError::AttrTypeMismatch {
                    expected: expected.clone(),
                    found: value.type_name().to_string(),
                })
            }
            Some(TypeNote::Class(expected)) => match value {
                Value::Node(node) if !self.is_instance(*node, expected) => {
                    Err(EvalError::AttrTypeMismatch {
                        expected: expected.clone(),
                        found: self.nodes[node.index()].name.clone(),
                    })
                }
                _ => Ok(()),
            },
            _ => Ok(()),
        }
    }
}
