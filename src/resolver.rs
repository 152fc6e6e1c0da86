//! Class graph resolution and tree assembly.
//!
//! The first pass walks the line records, validating every class header
//! against the declarations seen so far and collecting attribute lines under
//! the header they follow. The second pass creates the nodes, binds bases to
//! local classes or placeholders for plugin and global classes, attaches each
//! node by indentation and finally turns the line numbers in every alias
//! table into node ids.

use indexmap::{IndexMap, IndexSet};
use std::collections::HashMap;

use crate::analyzer::analyse;
use crate::error::{ConfigError, ErrorKind, ResolveError, SourceFile, SyntaxError};
use crate::grammar::{LineKind, LineRecord};
use crate::node::{Attribute, Node, NodeId, Tree};
use crate::registry::ResolutionContext;
use crate::syntax::{
    is_alias, is_inherit_cyclic, legal_alias, split_alias, split_note, Annotations, ClassKey,
    TypeNote,
};

/// Separates a class expression from the alias it is declared under.
const ARROW: &str = "->";

#[derive(Debug, Clone)]
enum DeclKind {
    /// `<T>`, `<T -> t>` or `<T(S1, S2(s)) -> t>`.
    Root { bases: Vec<ClassKey> },
    /// `T`, `T(t1)` or `T(t1) -> t2` inside a root class.
    Find { target: ClassKey },
}

#[derive(Debug, Clone)]
struct Decl {
    line: usize,
    indent: usize,
    root_key: ClassKey,
    real_name: String,
    header: String,
    kind: DeclKind,
}

#[derive(Debug, Clone)]
struct PendingAttr {
    line: usize,
    notes: Annotations,
    value: String,
}

pub struct Resolver<'c> {
    context: &'c ResolutionContext,
    // Root class being declared.
    nest_key: Option<ClassKey>,
    // Root class -> every class referenced inside it.
    nest_class: IndexMap<ClassKey, IndexSet<ClassKey>>,
    // Root class -> its declared bases.
    nest_inherit: IndexMap<ClassKey, Vec<ClassKey>>,
    // Root class -> alias -> declaring line.
    cite_class: IndexMap<ClassKey, IndexMap<String, usize>>,
    // Header line -> attributes declared under it.
    attrs: HashMap<usize, IndexMap<String, PendingAttr>>,
    decls: Vec<Decl>,
}

impl<'c> Resolver<'c> {
    pub fn new(context: &'c ResolutionContext) -> Self {
        Resolver {
            context,
            nest_key: None,
            nest_class: IndexMap::new(),
            nest_inherit: IndexMap::new(),
            cite_class: IndexMap::new(),
            attrs: HashMap::new(),
            decls: Vec::new(),
        }
    }

    /// Builds the tree declared by `records`. The attributes are analysed
    /// but not executed.
    pub(crate) fn resolve(
        &mut self,
        records: &[LineRecord],
        source: &SourceFile,
    ) -> Result<Tree, ConfigError> {
        let mut cursor_line = 0;
        for record in records {
            match &record.kind {
                LineKind::Attribute { key, value } => {
                    let (name, notes) = split_note(key)
                        .map_err(|e| ConfigError::new(e, record.number, source))?;
                    let pending = self.attrs.entry(cursor_line).or_default();
                    let attr = PendingAttr {
                        line: record.number,
                        notes,
                        value: value.clone(),
                    };
                    if let Some(old) = pending.insert(name.clone(), attr) {
                        log::warn!(
                            "line {}: attribute `{name}` redeclared, replacing line {}",
                            record.number,
                            old.line
                        );
                    }
                }
                LineKind::Class { key, root } => {
                    self.declare(record, key, *root)
                        .map_err(|e| ConfigError::new(e, record.number, source))?;
                    cursor_line = record.number;
                }
            }
        }
        self.assemble(source)
    }

    fn declare(
        &mut self,
        record: &LineRecord,
        key: &str,
        root: bool,
    ) -> Result<(), ErrorKind> {
        let (class_expr, alias) = match key.split_once(ARROW) {
            Some((expr, alias)) => {
                let alias = alias.trim();
                if alias.is_empty() {
                    return Err(SyntaxError::EmptyAlias.into());
                }
                if !legal_alias(alias) {
                    return Err(SyntaxError::IllegalAlias(alias.to_string()).into());
                }
                (expr.trim(), Some(alias.to_string()))
            }
            None => (key, None),
        };
        let split = split_alias(class_expr)?;
        let class_key = ClassKey::new(split.name.clone(), alias);

        let decl = if root {
            self.declare_root(class_expr, &split, &class_key)?
        } else {
            self.declare_nested(split, class_key, record.number)?
        };
        self.decls.push(Decl {
            line: record.number,
            indent: record.indent,
            header: key.to_string(),
            ..decl
        });
        Ok(())
    }

    fn declare_root(
        &mut self,
        class_expr: &str,
        split: &ClassKey,
        class_key: &ClassKey,
    ) -> Result<Decl, ErrorKind> {
        self.nest_key = Some(class_key.clone());
        if self.nest_class.contains_key(class_key) {
            return Err(ResolveError::ClassRedefined(class_key.real_name()).into());
        }

        let bases = match &split.alias {
            Some(_) => {
                if self.context.external(&split.name).is_some() {
                    return Err(ResolveError::ExternalClassRedefined(split.name.clone()).into());
                }
                let bases = self.parse_bases(class_expr, &split.name)?;
                self.nest_inherit.insert(class_key.clone(), bases.clone());
                if is_inherit_cyclic(&self.nest_inherit, class_key, &bases) {
                    return Err(ResolveError::InheritanceCycle(class_key.real_name()).into());
                }
                bases
            }
            None => vec![ClassKey::new(split.name.clone(), None)],
        };

        let inherited = self
            .nest_inherit
            .iter()
            .any(|(owner, bases)| owner != class_key && bases.contains(class_key));
        if inherited {
            return Err(ResolveError::DefineBeforeInherit(class_key.real_name()).into());
        }
        if self.nest_class.values().any(|used| used.contains(class_key)) {
            return Err(ResolveError::DefineBeforeUse(class_key.real_name()).into());
        }
        if split.alias.is_none()
            && class_key.alias.is_none()
            && self.context.external(&split.name).is_none()
        {
            return Err(ResolveError::ClassNotFound(split.name.clone()).into());
        }

        self.nest_class.entry(class_key.clone()).or_default();
        Ok(Decl {
            line: 0,
            indent: 0,
            root_key: class_key.clone(),
            real_name: class_key.real_name(),
            header: String::new(),
            kind: DeclKind::Root { bases },
        })
    }

    /// Splits `T(S1, S2(s), t)` into its base keys. A bare alias `t` is
    /// shorthand for `T(t)`.
    fn parse_bases(
        &self,
        class_expr: &str,
        class_name: &str,
    ) -> Result<Vec<ClassKey>, ErrorKind> {
        let inner = class_expr
            .split_once('(')
            .and_then(|(_, rest)| rest.strip_suffix(')'))
            .ok_or(SyntaxError::MissingOpenParen)?;

        let mut bases = Vec::new();
        for token in inner.split(',').map(str::trim) {
            let base = if is_alias(token) {
                ClassKey::new(class_name, Some(token.to_string()))
            } else {
                split_alias(token)?
            };
            if base.alias.is_some() && !self.nest_class.contains_key(&base) {
                return Err(ResolveError::AliasMustExist(base.real_name()).into());
            }
            bases.push(base);
        }
        Ok(bases)
    }

    fn declare_nested(
        &mut self,
        target: ClassKey,
        class_key: ClassKey,
        line: usize,
    ) -> Result<Decl, ErrorKind> {
        let Some(nest_key) = self.nest_key.clone() else {
            return Err(SyntaxError::KeyFormatError.into());
        };
        if target == nest_key {
            return Err(ResolveError::SelfReferenceWhileDefining(target.real_name()).into());
        }
        self.nest_class
            .entry(nest_key.clone())
            .or_default()
            .insert(target.clone());

        if let Some(alias) = &class_key.alias {
            let aliases = self.cite_class.entry(nest_key.clone()).or_default();
            if aliases.contains_key(alias) {
                return Err(ResolveError::DuplicateAlias(alias.clone()).into());
            }
            aliases.insert(alias.clone(), line);
        }

        if let Some(alias) = &target.alias {
            if !legal_alias(alias) {
                return Err(SyntaxError::IllegalAlias(alias.clone()).into());
            }
            if !self.nest_class.contains_key(&target) {
                return Err(ResolveError::AliasMustExist(target.real_name()).into());
            }
        }

        Ok(Decl {
            line: 0,
            indent: 0,
            root_key: nest_key,
            real_name: target.real_name(),
            header: String::new(),
            kind: DeclKind::Find { target },
        })
    }

    fn assemble(&mut self, source: &SourceFile) -> Result<Tree, ConfigError> {
        let mut tree = Tree::new();
        let mut line_ids: IndexMap<NodeId, IndexMap<String, usize>> = IndexMap::new();
        let mut nest_line: HashMap<usize, NodeId> = HashMap::new();
        let mut cursor = tree.root();
        let mut cursor_indent: isize = -1;
        let mut root_line = 0;

        for decl in self.decls.clone() {
            let fail = |err: ResolveError| ConfigError::new(err, decl.line, source);

            let base_names: Vec<String> = match &decl.kind {
                DeclKind::Root { bases } => bases.iter().map(ClassKey::real_name).collect(),
                DeclKind::Find { target } => vec![target.real_name()],
            };
            let mut bases = Vec::with_capacity(base_names.len());
            for name in &base_names {
                bases.push(self.base_node(&mut tree, name).map_err(fail)?);
            }

            let aliases = self.cite_class.get(&decl.root_key).cloned().unwrap_or_default();
            let mut node = Node::new(decl.real_name.clone(), decl.line, decl.header.clone());
            node.bases = bases.clone();
            for (name, pending) in self.attrs.remove(&decl.line).unwrap_or_default() {
                if let Some(TypeNote::Class(class)) = &pending.notes.ty {
                    if tree.class(class).is_none() && self.context.external(class).is_none() {
                        return Err(ConfigError::new(
                            ResolveError::AnnotationClassNotFound(class.clone()),
                            pending.line,
                            source,
                        ));
                    }
                }
                let analysis = analyse(&pending.value, aliases.keys().map(String::as_str));
                log::trace!(
                    "{}.{name}: {}",
                    decl.real_name,
                    if analysis.is_constant() { "constant" } else { "expression" }
                );
                node.attrs.insert(
                    name,
                    Attribute::new(pending.line, &pending.value, pending.notes, analysis),
                );
            }

            if let DeclKind::Root { .. } = decl.kind {
                root_line = decl.line;
            } else {
                let inherited = inherited_aliases(&tree, &line_ids, &bases);
                let collides = aliases
                    .keys()
                    .find(|alias| inherited.contains(alias.as_str()) && !is_implicit(alias))
                    .cloned();
                if let Some(alias) = collides {
                    return Err(fail(ResolveError::AliasDefinedInBase(alias)));
                }
            }

            let mut ids = aliases;
            ids.insert("self".to_string(), decl.line);
            ids.insert("root".to_string(), root_line);

            let id = tree.add_node(node);
            if let DeclKind::Root { .. } = decl.kind {
                tree.classes.insert(decl.real_name.clone(), id);
            }

            let indent = decl.indent as isize;
            let mut parent = cursor;
            if indent != cursor_indent + 1 {
                for _ in 0..(cursor_indent - indent + 1) {
                    parent = tree.node(parent).parent().unwrap_or(tree.root());
                }
            }
            tree.attach(parent, id);

            line_ids.insert(id, ids);
            nest_line.insert(decl.line, id);
            cursor = id;
            cursor_indent = indent;
        }

        for (id, ids) in line_ids {
            for (alias, line) in ids {
                let Some(target) = nest_line.get(&line) else {
                    return Err(ConfigError::new(
                        ResolveError::IdsUnresolved(alias),
                        tree.node(id).line(),
                        source,
                    ));
                };
                tree.nodes[id.index()].ids.insert(alias, *target);
            }
        }
        Ok(tree)
    }

    /// The node standing for base class `name`: a class declared earlier in
    /// the file, or a placeholder created on first use of a plugin or global
    /// class.
    fn base_node(&self, tree: &mut Tree, name: &str) -> Result<NodeId, ResolveError> {
        let origin = self
            .context
            .origin(name, |n| tree.class(n).is_some())
            .ok_or_else(|| ResolveError::ClassNotFound(name.to_string()))?;
        log::debug!("base `{name}` resolved as {origin:?}");

        if let Some(id) = tree.class(name) {
            return Ok(id);
        }
        let mut placeholder = Node::new(name, 0, name);
        if let Some((_, class)) = self.context.external(name) {
            for (attr, value) in &class.defaults {
                placeholder
                    .attrs
                    .insert(attr.clone(), Attribute::constant(value.clone()));
            }
        }
        let id = tree.add_node(placeholder);
        tree.classes.insert(name.to_string(), id);
        Ok(id)
    }
}

/// Aliases declared by `bases` and, transitively, by their own bases.
fn inherited_aliases<'t>(
    tree: &Tree,
    line_ids: &'t IndexMap<NodeId, IndexMap<String, usize>>,
    bases: &[NodeId],
) -> IndexSet<&'t str> {
    let mut seen = IndexSet::new();
    let mut stack: Vec<NodeId> = bases.to_vec();
    let mut aliases = IndexSet::new();
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        if let Some(ids) = line_ids.get(&id) {
            aliases.extend(ids.keys().map(String::as_str));
        }
        stack.extend(tree.node(id).bases().iter().copied());
    }
    aliases
}

fn is_implicit(alias: &str) -> bool {
    matches!(alias, "self" | "root")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::parse_lines;
    use crate::registry::ExternalClass;

    fn resolve(text: &str, context: &ResolutionContext) -> Result<Tree, ConfigError> {
        let source = SourceFile::new("test.vox", text);
        let records = parse_lines(&source)?;
        Resolver::new(context).resolve(&records, &source)
    }

    fn resolve_err(text: &str) -> (usize, &'static str) {
        match resolve(text, &ResolutionContext::new()) {
            Ok(_) => panic!("expected an error"),
            Err(err) => (err.line, err.message_code()),
        }
    }

    #[test]
    fn test_bases_in_declared_order() {
        let context = ResolutionContext::new().with_global(ExternalClass::new("Box"));
        let text = "<Box -> b>\n    w: 1\n<Box -> c>\n    w: 2\n    h: 3\n<Panel(Box(b), c)>\n";
        let tree = match resolve(text, &context) {
            Ok(tree) => tree,
            Err(err) => panic!("{:?}", miette::Report::new(err)),
        };
        let b = tree.class("Box-b").unwrap();
        let c = tree.class("Box-c").unwrap();
        let panel = tree.class("Panel").unwrap();
        assert_eq!(tree.node(panel).bases().len(), 2);
        assert_eq!(tree.node(panel).bases()[0], b);
        assert_eq!(tree.lookup_attr(panel, "w").map(|(owner, _)| owner), Some(b));
        assert_eq!(tree.lookup_attr(panel, "h").map(|(owner, _)| owner), Some(c));
        assert_eq!(tree.attr_names(panel), vec!["w", "h"]);
    }

    #[test]
    fn test_alias_sugar_must_name_own_alias() {
        assert_eq!(resolve_err("<Panel(p)>\n"), (1, "AliasMustExist"));
    }

    #[test]
    fn test_alias_ids_and_parents() {
        let context = ResolutionContext::new()
            .with_global(ExternalClass::new("Box"))
            .with_global(ExternalClass::new("Label"));
        let text = "<Box -> panel>\n    Label -> title\n        text: 'hi'\n    Box -> body\n        Label -> note\n";
        let tree = match resolve(text, &context) {
            Ok(tree) => tree,
            Err(err) => panic!("{:?}", miette::Report::new(err)),
        };

        let panel = tree.class("Box-panel").unwrap();
        let title = tree.child(panel, "Label").unwrap();
        let body = tree.child(panel, "Box").unwrap();
        let note = tree.child(body, "Label").unwrap();
        assert_eq!(tree.node(tree.root()).children(), &[panel]);
        assert_eq!(tree.node(note).parent(), Some(body));

        for id in [panel, title, body, note] {
            assert_eq!(tree.node(id).ids().get("root"), Some(&panel));
            assert_eq!(tree.node(id).ids().get("self"), Some(&id));
            assert_eq!(tree.node(id).ids().get("title"), Some(&title));
            assert_eq!(tree.node(id).ids().get("note"), Some(&note));
        }
        assert!(tree.node(title).attrs().contains_key("text"));
    }

    #[test]
    fn test_external_defaults_become_static() {
        let context = ResolutionContext::new()
            .with_plugin(ExternalClass::new("Button").with_default("width", 80_i64));
        let tree = match resolve("<Button>\n", &context) {
            Ok(tree) => tree,
            Err(err) => panic!("{:?}", miette::Report::new(err)),
        };
        let button = tree.class("Button").unwrap();
        let (owner, attr) = tree.lookup_attr(button, "width").unwrap();
        assert_ne!(owner, button);
        assert!(attr.is_resolved());
    }

    #[test]
    fn test_declaration_errors() {
        assert_eq!(resolve_err("<A>\n"), (1, "ClassNotFound"));
        assert_eq!(resolve_err("<A(B)>\n<B(A)>\n"), (2, "InheritanceCycle"));
        assert_eq!(resolve_err("<A(A)>\n"), (1, "InheritanceCycle"));
        assert_eq!(
            resolve_err("<Base -> b>\n<Base -> b>\n"),
            (2, "ClassRedefined")
        );
        assert_eq!(resolve_err("<A(Base(x))>\n"), (1, "AliasMustExist"));
        assert_eq!(
            resolve_err("<Base -> b>\n<A(Base(b))>\n    A\n"),
            (3, "SelfReferenceWhileDefining")
        );
    }

    #[test]
    fn test_define_before_use() {
        assert_eq!(
            resolve_err("<Base -> b>\n<A(Base(b))>\n    B -> x\n<B(Base(b))>\n"),
            (4, "DefineBeforeUse")
        );
        assert_eq!(
            resolve_err("<Base -> b>\n<A(Base(b), Base(c))>\n"),
            (2, "AliasMustExist")
        );
    }

    #[test]
    fn test_duplicate_alias() {
        let context = ResolutionContext::new().with_global(ExternalClass::new("Label"));
        let text = "<Label -> a>\n    Label -> x\n    Label -> x\n";
        match resolve(text, &context) {
            Ok(_) => panic!("expected an error"),
            Err(err) => assert_eq!(err.record(), (3, "    Label -> x", "DuplicateAlias")),
        }
    }

    #[test]
    fn test_annotation_class_must_exist() {
        let context = ResolutionContext::new().with_global(ExternalClass::new("Label"));
        let text = "<Label -> a>\n    w(Missing): 1\n";
        match resolve(text, &context) {
            Ok(_) => panic!("expected an error"),
            Err(err) => assert_eq!((err.line, err.message_code()), (2, "AnnotationClassNotFound")),
        }
    }
}
