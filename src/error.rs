use miette::{Diagnostic, LabeledSpan, NamedSource, SourceCode, SourceSpan};
use std::fmt::Display;
use thiserror::Error;

use crate::utils::line_span;

/// A fatal failure while loading a configuration, pinned to one source line.
///
/// This is the structured record handed to the host: `line` is 1-based, `raw`
/// is the offending line exactly as written, and [`ConfigError::message_code`]
/// is a stable enum-like code (`"InvalidIndentation"`, `"InheritanceCycle"`,
/// ...). Rendering it through `miette::Report` gives a labelled snippet.
#[derive(Error, Debug, Clone)]
#[error("line {line}: {kind}")]
pub struct ConfigError {
    pub line: usize,
    pub raw: String,
    pub kind: ErrorKind,
    src: NamedSource<String>,
    span: SourceSpan,
}

impl ConfigError {
    pub(crate) fn new(kind: impl Into<ErrorKind>, line: usize, source: &SourceFile) -> Self {
        let raw = source.line(line).to_string();
        let (offset, len) = line_span(&source.text, line);
        Self {
            line,
            raw,
            kind: kind.into(),
            src: source.named.clone(),
            span: (offset, len).into(),
        }
    }

    /// Stable code naming the failure, independent of the rendered message.
    #[must_use]
    pub fn message_code(&self) -> &'static str {
        self.kind.message_code()
    }

    /// The `(line_number, raw_line, message_code)` triple.
    #[must_use]
    pub fn record(&self) -> (usize, &str, &'static str) {
        (self.line, &self.raw, self.message_code())
    }
}

impl Diagnostic for ConfigError {
    fn code<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
        self.kind.code()
    }

    fn help<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
        self.kind.help()
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        Some(&self.src)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        Some(Box::new(std::iter::once(LabeledSpan::new_with_span(
            Some(self.kind.to_string()),
            self.span,
        ))))
    }
}

/// Failure of [`crate::Config::load_file`].
#[derive(Error, Debug, Diagnostic)]
pub enum LoadError {
    #[error("failed to read `{path}`")]
    #[diagnostic(code(load::io))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

/// Source text plus the name used when rendering diagnostics.
#[derive(Debug, Clone)]
pub(crate) struct SourceFile {
    pub(crate) named: NamedSource<String>,
    pub(crate) text: String,
}

impl SourceFile {
    pub(crate) fn new(name: &str, text: &str) -> Self {
        Self {
            named: NamedSource::new(name, text.to_string()),
            text: text.to_string(),
        }
    }

    /// The raw text of a 1-based line, without its line terminator.
    pub(crate) fn line(&self, line: usize) -> &str {
        self.text
            .split('\n')
            .nth(line.saturating_sub(1))
            .map(|l| l.trim_end_matches('\r'))
            .unwrap_or("")
    }
}

#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Eval(#[from] EvalError),
}

impl ErrorKind {
    #[must_use]
    pub fn message_code(&self) -> &'static str {
        match self {
            ErrorKind::Syntax(e) => e.message_code(),
            ErrorKind::Resolve(e) => e.message_code(),
            ErrorKind::Eval(e) => e.message_code(),
        }
    }
}

/// Malformed source text. Always fatal.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum SyntaxError {
    #[error("invalid indentation, must be a multiple of 4 spaces")]
    #[diagnostic(
        code(syntax::invalid_indentation),
        help("Indent with 4 spaces per level; a tab counts as 4 spaces.")
    )]
    InvalidIndentation,

    #[error("indentation increases by more than one level")]
    #[diagnostic(code(syntax::bad_unindent))]
    BadUnindent,

    #[error("missing ':' separator")]
    #[diagnostic(
        code(syntax::missing_separator),
        help("Attributes are written `name: value`.")
    )]
    MissingSeparator,

    #[error("key is empty")]
    #[diagnostic(code(syntax::empty_key))]
    EmptyKey,

    #[error("attribute must directly follow a class header")]
    #[diagnostic(
        code(syntax::attribute_must_follow_class),
        help("Attributes sit exactly one level deeper than the class they belong to, before any nested class.")
    )]
    AttributeMustFollowClass,

    #[error("a root class must be written as <ClassExpr>")]
    #[diagnostic(code(syntax::key_format))]
    KeyFormatError,

    #[error("class declaration is empty")]
    #[diagnostic(code(syntax::empty_class))]
    EmptyClass,

    #[error("missing '(' before ')'")]
    #[diagnostic(code(syntax::missing_open_paren))]
    MissingOpenParen,

    #[error("alias is empty")]
    #[diagnostic(code(syntax::empty_alias))]
    EmptyAlias,

    #[error("illegal class name `{0}`")]
    #[diagnostic(
        code(syntax::illegal_class_name),
        help("Class names start with an uppercase letter and contain only letters, digits and `_`.")
    )]
    IllegalClassName(String),

    #[error("illegal alias `{0}`")]
    #[diagnostic(
        code(syntax::illegal_alias),
        help("Aliases contain only lowercase letters, digits and `_`.")
    )]
    IllegalAlias(String),

    #[error("illegal attribute name `{0}`")]
    #[diagnostic(code(syntax::illegal_variable))]
    IllegalVariable(String),

    #[error("annotation list is empty")]
    #[diagnostic(code(syntax::empty_annotation))]
    EmptyAnnotation,

    #[error("illegal annotation `{0}`")]
    #[diagnostic(code(syntax::illegal_annotation))]
    IllegalAnnotation(String),

    #[error("annotation category `{0}` is specified more than once")]
    #[diagnostic(code(syntax::annotation_redefined))]
    AnnotationRedefined(String),
}

impl SyntaxError {
    #[must_use]
    pub fn message_code(&self) -> &'static str {
        match self {
            SyntaxError::InvalidIndentation => "InvalidIndentation",
            SyntaxError::BadUnindent => "BadUnindent",
            SyntaxError::MissingSeparator => "MissingSeparator",
            SyntaxError::EmptyKey => "EmptyKey",
            SyntaxError::AttributeMustFollowClass => "AttributeMustFollowClass",
            SyntaxError::KeyFormatError => "KeyFormatError",
            SyntaxError::EmptyClass => "EmptyClass",
            SyntaxError::MissingOpenParen => "MissingOpenParen",
            SyntaxError::EmptyAlias => "EmptyAlias",
            SyntaxError::IllegalClassName(_) => "IllegalClassName",
            SyntaxError::IllegalAlias(_) => "IllegalAlias",
            SyntaxError::IllegalVariable(_) => "IllegalVariable",
            SyntaxError::EmptyAnnotation => "EmptyAnnotation",
            SyntaxError::IllegalAnnotation(_) => "IllegalAnnotation",
            SyntaxError::AnnotationRedefined(_) => "AnnotationRedefined",
        }
    }
}

/// Class graph failures: naming, ordering and inheritance. Always fatal.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("class `{0}` is already declared")]
    #[diagnostic(code(resolve::class_redefined))]
    ClassRedefined(String),

    #[error("class `{0}` already exists as a plugin or global class")]
    #[diagnostic(code(resolve::external_class_redefined))]
    ExternalClassRedefined(String),

    #[error("class `{0}` is inherited before it is declared")]
    #[diagnostic(
        code(resolve::define_before_inherit),
        help("Move this declaration above every class that inherits from it.")
    )]
    DefineBeforeInherit(String),

    #[error("class `{0}` is used before it is declared")]
    #[diagnostic(
        code(resolve::define_before_use),
        help("Move this declaration above every class that nests it.")
    )]
    DefineBeforeUse(String),

    #[error("inheritance of `{0}` is cyclic")]
    #[diagnostic(code(resolve::inheritance_cycle))]
    InheritanceCycle(String),

    #[error("class `{0}` cannot be referenced while it is being defined")]
    #[diagnostic(code(resolve::self_reference_while_defining))]
    SelfReferenceWhileDefining(String),

    #[error("alias `{0}` is already used in this root class")]
    #[diagnostic(code(resolve::duplicate_alias))]
    DuplicateAlias(String),

    #[error("aliased class `{0}` has not been declared")]
    #[diagnostic(code(resolve::alias_must_exist))]
    AliasMustExist(String),

    #[error("alias `{0}` is already defined by the referenced class")]
    #[diagnostic(code(resolve::alias_defined_in_base))]
    AliasDefinedInBase(String),

    #[error("class `{0}` not found")]
    #[diagnostic(
        code(resolve::class_not_found),
        help("Classes are looked up in this file first, then in the plugin table, then in the global table.")
    )]
    ClassNotFound(String),

    #[error("annotation type `{0}` is not a known class")]
    #[diagnostic(code(resolve::annotation_class_not_found))]
    AnnotationClassNotFound(String),

    #[error("alias `{0}` does not point at a declared node")]
    #[diagnostic(code(resolve::ids_unresolved))]
    IdsUnresolved(String),
}

impl ResolveError {
    #[must_use]
    pub fn message_code(&self) -> &'static str {
        match self {
            ResolveError::ClassRedefined(_) => "ClassRedefined",
            ResolveError::ExternalClassRedefined(_) => "ExternalClassRedefined",
            ResolveError::DefineBeforeInherit(_) => "DefineBeforeInherit",
            ResolveError::DefineBeforeUse(_) => "DefineBeforeUse",
            ResolveError::InheritanceCycle(_) => "InheritanceCycle",
            ResolveError::SelfReferenceWhileDefining(_) => "SelfReferenceWhileDefining",
            ResolveError::DuplicateAlias(_) => "DuplicateAlias",
            ResolveError::AliasMustExist(_) => "AliasMustExist",
            ResolveError::AliasDefinedInBase(_) => "AliasDefinedInBase",
            ResolveError::ClassNotFound(_) => "ClassNotFound",
            ResolveError::AnnotationClassNotFound(_) => "AnnotationClassNotFound",
            ResolveError::IdsUnresolved(_) => "IdsUnresolved",
        }
    }
}

/// Attribute execution failures. Fatal unless the attribute is `unsafe`,
/// except `ForbiddenConstruct`, which is always fatal.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error("unknown reference `{0}`")]
    #[diagnostic(code(eval::unknown_reference))]
    UnknownReference(String),

    #[error("child index {index} out of range for `{node}` with {len} children")]
    #[diagnostic(code(eval::child_index_out_of_range))]
    ChildIndexOutOfRange {
        node: String,
        index: usize,
        len: usize,
    },

    #[error("forbidden construct `{0}` in expression")]
    #[diagnostic(
        code(eval::forbidden_construct),
        help("Names starting with `__` are reserved; expressions cannot load code.")
    )]
    ForbiddenConstruct(String),

    #[error("expression syntax error: {0}")]
    #[diagnostic(code(eval::expression_syntax))]
    ExpressionSyntax(String),

    #[error("expression failed: {0}")]
    #[diagnostic(code(eval::expression_runtime))]
    ExpressionRuntimeError(String),

    #[error("attribute `{0}` depends on itself")]
    #[diagnostic(
        code(eval::reactive_cycle),
        help("Two or more attributes reference each other; break the loop with a literal.")
    )]
    ReactiveCycle(String),

    #[error("attribute is {found} but annotated {expected}")]
    #[diagnostic(code(eval::attr_state_mismatch))]
    AttrStateMismatch { expected: String, found: String },

    #[error("attribute has type {found} but annotated {expected}")]
    #[diagnostic(code(eval::attr_type_mismatch))]
    AttrTypeMismatch { expected: String, found: String },
}

impl EvalError {
    #[must_use]
    pub fn message_code(&self) -> &'static str {
        match self {
            EvalError::UnknownReference(_) => "UnknownReference",
            EvalError::ChildIndexOutOfRange { .. } => "ChildIndexOutOfRange",
            EvalError::ForbiddenConstruct(_) => "ForbiddenConstruct",
            EvalError::ExpressionSyntax(_) => "ExpressionSyntax",
            EvalError::ExpressionRuntimeError(_) => "ExpressionRuntimeError",
            EvalError::ReactiveCycle(_) => "ReactiveCycle",
            EvalError::AttrStateMismatch { .. } => "AttrStateMismatch",
            EvalError::AttrTypeMismatch { .. } => "AttrTypeMismatch",
        }
    }

    pub(crate) fn runtime(message: impl Into<String>) -> Self {
        EvalError::ExpressionRuntimeError(message.into())
    }
}
