//! Identifier validators and splitters for class headers and attribute keys.

use indexmap::{IndexMap, IndexSet};
use std::collections::HashSet;
use std::fmt;

use crate::error::SyntaxError;
use crate::node::AttrState;
use crate::value::BUILTIN_TYPES;

/// Separator between a class name and its alias in a real name. It is not a
/// legal alias character, so `T-t` never collides with a declared class.
pub const CLASS_SPLIT: char = '-';

/// Identity of one class declaration: a class name plus an optional alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassKey {
    pub name: String,
    pub alias: Option<String>,
}

impl ClassKey {
    pub fn new(name: impl Into<String>, alias: Option<String>) -> Self {
        Self {
            name: name.into(),
            alias,
        }
    }

    #[must_use]
    pub fn real_name(&self) -> String {
        real_name(&self.name, self.alias.as_deref())
    }
}

impl fmt::Display for ClassKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{}({alias})", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Whether a failing attribute aborts the load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Safety {
    Safe,
    Unsafe,
}

/// Which side wins when own and inherited entries collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precedence {
    #[default]
    Base,
    Own,
}

/// Expected runtime type of an attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeNote {
    Builtin(String),
    /// A class name; a node value must belong to that class.
    Class(String),
}

impl fmt::Display for TypeNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeNote::Builtin(name) | TypeNote::Class(name) => write!(f, "{name}"),
        }
    }
}

/// Parsed `var(note1|note2)` annotations. Every category is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotations {
    pub safety: Option<Safety>,
    pub state: Option<AttrState>,
    pub index: Option<Precedence>,
    pub child: Option<Precedence>,
    pub ty: Option<TypeNote>,
}

impl Annotations {
    #[must_use]
    pub fn index_precedence(&self) -> Precedence {
        self.index.unwrap_or_default()
    }

    #[must_use]
    pub fn child_precedence(&self) -> Precedence {
        self.child.unwrap_or_default()
    }

    /// Renders the annotations back to `a|b|c` form, `None` when empty.
    #[must_use]
    pub fn to_source(&self) -> Option<String> {
        let mut atoms = Vec::new();
        match self.safety {
            Some(Safety::Safe) => atoms.push("safe".to_string()),
            Some(Safety::Unsafe) => atoms.push("unsafe".to_string()),
            None => {}
        }
        match self.state {
            Some(AttrState::Static) => atoms.push("static".to_string()),
            Some(AttrState::Dynamic) => atoms.push("dynamic".to_string()),
            _ => {}
        }
        match self.index {
            Some(Precedence::Own) => atoms.push("selfindex".to_string()),
            Some(Precedence::Base) => atoms.push("baseindex".to_string()),
            None => {}
        }
        match self.child {
            Some(Precedence::Own) => atoms.push("selfchild".to_string()),
            Some(Precedence::Base) => atoms.push("basechild".to_string()),
            None => {}
        }
        if let Some(ty) = &self.ty {
            atoms.push(ty.to_string());
        }
        (!atoms.is_empty()).then(|| atoms.join("|"))
    }
}

fn is_alias_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'
}

fn is_var_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// A class name starts with an uppercase ASCII letter.
#[must_use]
pub fn legal_class(name: &str) -> bool {
    name.starts_with(|c: char| c.is_ascii_uppercase()) && name.chars().all(is_var_char)
}

#[must_use]
pub fn legal_alias(name: &str) -> bool {
    !name.is_empty() && name.chars().all(is_alias_char)
}

#[must_use]
pub fn legal_var(name: &str) -> bool {
    !name.is_empty() && name.chars().all(is_var_char)
}

/// A base-list token naming an alias rather than a class.
#[must_use]
pub fn is_alias(token: &str) -> bool {
    token.starts_with(is_alias_char)
}

fn split_parens(token: &str) -> Option<Result<(&str, &str), SyntaxError>> {
    let inner = token.strip_suffix(')')?;
    Some(match inner.split_once('(') {
        Some((head, rest)) => Ok((head.trim(), rest.trim())),
        None => Err(SyntaxError::MissingOpenParen),
    })
}

/// Splits `Name(alias)` or bare `Name`.
pub fn split_alias(token: &str) -> Result<ClassKey, SyntaxError> {
    match split_parens(token) {
        Some(parts) => {
            let (class_name, alias) = parts?;
            if !legal_class(class_name) {
                return Err(SyntaxError::IllegalClassName(class_name.to_string()));
            }
            if alias.is_empty() {
                return Err(SyntaxError::EmptyAlias);
            }
            Ok(ClassKey::new(class_name, Some(alias.to_string())))
        }
        None if legal_class(token) => Ok(ClassKey::new(token, None)),
        None => Err(SyntaxError::IllegalClassName(token.to_string())),
    }
}

/// Splits `var(note1|note2)` or bare `var` into the name and its annotations.
pub fn split_note(token: &str) -> Result<(String, Annotations), SyntaxError> {
    let Some(parts) = split_parens(token) else {
        if !legal_var(token) {
            return Err(SyntaxError::IllegalVariable(token.to_string()));
        }
        return Ok((token.to_string(), Annotations::default()));
    };

    let (var_name, notes) = parts?;
    if !legal_var(var_name) {
        return Err(SyntaxError::IllegalVariable(var_name.to_string()));
    }
    if notes.is_empty() {
        return Err(SyntaxError::EmptyAnnotation);
    }

    let mut out = Annotations::default();
    for atom in notes.split('|').map(str::trim) {
        let redefined = match atom {
            "safe" | "unsafe" => out
                .safety
                .replace(if atom == "safe" { Safety::Safe } else { Safety::Unsafe })
                .map(|_| "safe"),
            "static" | "dynamic" => out
                .state
                .replace(if atom == "static" {
                    AttrState::Static
                } else {
                    AttrState::Dynamic
                })
                .map(|_| "state"),
            "selfindex" | "baseindex" => out
                .index
                .replace(if atom == "selfindex" {
                    Precedence::Own
                } else {
                    Precedence::Base
                })
                .map(|_| "index"),
            "selfchild" | "basechild" => out
                .child
                .replace(if atom == "selfchild" {
                    Precedence::Own
                } else {
                    Precedence::Base
                })
                .map(|_| "child"),
            _ if BUILTIN_TYPES.contains(&atom) => out
                .ty
                .replace(TypeNote::Builtin(atom.to_string()))
                .map(|_| "type"),
            _ => {
                if out.ty.is_some() {
                    return Err(SyntaxError::AnnotationRedefined("type".to_string()));
                }
                if !legal_class(atom) {
                    return Err(SyntaxError::IllegalAnnotation(atom.to_string()));
                }
                out.ty = Some(TypeNote::Class(atom.to_string()));
                None
            }
        };
        if let Some(category) = redefined {
            return Err(SyntaxError::AnnotationRedefined(category.to_string()));
        }
    }
    Ok((var_name.to_string(), out))
}

/// Breadth-first closure over `inherit` starting at `frontier`; true when
/// `key` is reachable, which means declaring it closes a cycle.
#[must_use]
pub fn is_inherit_cyclic(
    inherit: &IndexMap<ClassKey, Vec<ClassKey>>,
    key: &ClassKey,
    frontier: &[ClassKey],
) -> bool {
    let mut seen: HashSet<&ClassKey> = HashSet::new();
    let mut current: IndexSet<&ClassKey> = frontier.iter().collect();
    while !current.is_empty() {
        if current.contains(key) {
            return true;
        }
        let mut next = IndexSet::new();
        for cls in current {
            if !seen.insert(cls) {
                continue;
            }
            if let Some(bases) = inherit.get(cls) {
                next.extend(bases.iter());
            }
        }
        current = next;
    }
    false
}

/// `Name` without an alias, `Name-alias` otherwise.
#[must_use]
pub fn real_name(class_name: &str, alias: Option<&str>) -> String {
    match alias {
        Some(alias) => format!("{class_name}{CLASS_SPLIT}{alias}"),
        None => class_name.to_string(),
    }
}

/// The class part of a real name.
#[must_use]
pub fn class_part(real: &str) -> &str {
    real.split_once(CLASS_SPLIT).map_or(real, |(name, _)| name)
}
