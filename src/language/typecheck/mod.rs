//! Static type checking of template trees.
//!
//! [`check`] walks a parsed [`Tree`] the way the template runtime would
//! execute it, but over types instead of values. It returns the type of the
//! last node of the tree or the first error found.

use crate::language::{
    ast::{Node, TemplateSet, Tree},
    span::Span,
    types::TypeSystem,
};
use std::{cell::RefCell, collections::BTreeMap, sync::Arc};
use thiserror::Error;
use tracing::debug;

mod call;
mod numeral;
mod scope;

pub use call::{CallChecker, Functions};
pub use numeral::{classify_number, downgrade};

#[cfg(test)]
mod tests;

#[derive(Clone, Debug)]
pub struct CheckOptions {
    /// Package the template is checked from; unexported identifiers of
    /// other packages stay hidden.
    pub package: Option<String>,
    /// Maximum number of nested `{{template}}` invocations.
    pub max_template_depth: usize,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            package: None,
            max_template_depth: 64,
        }
    }
}

impl CheckOptions {
    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    pub fn with_max_template_depth(mut self, depth: usize) -> Self {
        self.max_template_depth = depth;
        self
    }
}

/// Resolves `{{template "name"}}` references.
pub trait TreeLookup {
    fn lookup(&self, name: &str) -> Option<&Tree>;
}

impl TreeLookup for TemplateSet {
    fn lookup(&self, name: &str) -> Option<&Tree> {
        self.get(name)
    }
}

impl TreeLookup for BTreeMap<String, Tree> {
    fn lookup(&self, name: &str) -> Option<&Tree> {
        self.get(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Lookup,
    Visibility,
    Arity,
    Signature,
    TypeMismatch,
    Chain,
    Constant,
    Recursion,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CheckErrorKind {
    #[error("can't evaluate field {ident} in type {ty}")]
    FieldNotFound { ident: String, ty: String },
    #[error("undefined variable: {name}")]
    UndefinedVariable { name: String },
    #[error("no such template {name:?}")]
    TemplateNotFound { name: String },
    #[error("unknown function: {name}")]
    UnknownFunction { name: String },
    #[error("can't index map of type {ty} with non-integer key {key}")]
    MapKeyNotInteger { key: String, ty: String },

    #[error("{ident} is an unexported field or method of type {ty}")]
    Unexported { ident: String, ty: String },

    #[error("wrong number of args for {name}: want {want} got {got}")]
    WrongArgCount { name: String, want: usize, got: usize },
    #[error("wrong number of args for {name}: want at least {want} got {got}")]
    TooFewArgs { name: String, want: usize, got: usize },
    #[error("wrong number of args for {name}: want at most {want} got {got}")]
    TooManyArgs { name: String, want: usize, got: usize },
    #[error("function {name} has {count} return values; should be 1 or 2")]
    ResultCount { name: String, count: usize },

    #[error("invalid function signature for {name}: second return value should be error; is {ty}")]
    SecondResultNotError { name: String, ty: String },

    #[error("wrong type for argument {index} of {name}: got {got}, expected {want}")]
    ArgumentMismatch {
        name: String,
        index: usize,
        got: String,
        want: String,
    },
    #[error("range can't iterate over {ty}")]
    CannotRange { ty: String },
    #[error("can't use {ty} to iterate over more than one variable")]
    RangeVariables { ty: String },
    #[error("can not index over {ty}")]
    CannotIndex { ty: String },
    #[error("can not slice {ty}")]
    CannotSlice { ty: String },
    #[error("can not 3-index slice a string")]
    ThreeIndexString,
    #[error("index out of range: {index}")]
    NegativeIndex { index: i64 },
    #[error("len of type {ty}")]
    InvalidLen { ty: String },

    #[error("identifier chain not supported for type {ty}")]
    ChainUnsupported { ty: String },
    #[error("can't give argument to non-function {node}")]
    NotAFunction { node: String },
    #[error("{ident} has arguments but cannot be invoked as function")]
    NotAMethod { ident: String },
    #[error("non-function {node} of type {ty}")]
    CallNonFunction { node: String, ty: String },
    #[error("nil is not a command")]
    NilCommand,

    #[error("{text} overflows int")]
    Overflow { text: String },

    #[error("template {name:?} exceeds the maximum invocation depth of {depth}")]
    TemplateDepth { name: String, depth: usize },
}

impl CheckErrorKind {
    pub fn category(&self) -> ErrorCategory {
        use CheckErrorKind::*;
        match self {
            FieldNotFound { .. }
            | UndefinedVariable { .. }
            | TemplateNotFound { .. }
            | UnknownFunction { .. }
            | MapKeyNotInteger { .. } => ErrorCategory::Lookup,
            Unexported { .. } => ErrorCategory::Visibility,
            WrongArgCount { .. } | TooFewArgs { .. } | TooManyArgs { .. } | ResultCount { .. } => {
                ErrorCategory::Arity
            }
            SecondResultNotError { .. } => ErrorCategory::Signature,
            ArgumentMismatch { .. }
            | CannotRange { .. }
            | RangeVariables { .. }
            | CannotIndex { .. }
            | CannotSlice { .. }
            | ThreeIndexString
            | NegativeIndex { .. }
            | InvalidLen { .. } => ErrorCategory::TypeMismatch,
            ChainUnsupported { .. }
            | NotAFunction { .. }
            | NotAMethod { .. }
            | CallNonFunction { .. }
            | NilCommand => ErrorCategory::Chain,
            Overflow { .. } => ErrorCategory::Constant,
            TemplateDepth { .. } => ErrorCategory::Recursion,
        }
    }

    /// Stable identifier for tooling, e.g. `T0101`.
    pub fn code(&self) -> &'static str {
        use CheckErrorKind::*;
        match self {
            FieldNotFound { .. } => "T0101",
            UndefinedVariable { .. } => "T0102",
            TemplateNotFound { .. } => "T0103",
            UnknownFunction { .. } => "T0104",
            MapKeyNotInteger { .. } => "T0105",
            Unexported { .. } => "T0201",
            WrongArgCount { .. } => "T0301",
            TooFewArgs { .. } => "T0302",
            TooManyArgs { .. } => "T0303",
            ResultCount { .. } => "T0304",
            SecondResultNotError { .. } => "T0401",
            ArgumentMismatch { .. } => "T0501",
            CannotRange { .. } => "T0502",
            RangeVariables { .. } => "T0503",
            CannotIndex { .. } => "T0504",
            CannotSlice { .. } => "T0505",
            ThreeIndexString => "T0506",
            NegativeIndex { .. } => "T0507",
            InvalidLen { .. } => "T0508",
            ChainUnsupported { .. } => "T0601",
            NotAFunction { .. } => "T0602",
            NotAMethod { .. } => "T0603",
            CallNonFunction { .. } => "T0604",
            NilCommand => "T0605",
            Overflow { .. } => "T0701",
            TemplateDepth { .. } => "T0801",
        }
    }
}

/// A located check failure.
#[derive(Clone, Debug, Error)]
#[error("type check failed: {location}: executing {name:?} at <{context}>: {kind}")]
pub struct TypeError {
    pub name: String,
    /// `parse_name:line:column`
    pub location: String,
    pub context: String,
    pub span: Span,
    pub line: usize,
    pub column: usize,
    pub kind: CheckErrorKind,
    pub source_text: Arc<str>,
}

impl TypeError {
    pub fn new(tree: &Tree, node: &Node, kind: CheckErrorKind) -> Self {
        let (location, context) = tree.error_context(node);
        let position = tree.location(node.span());
        Self {
            name: tree.name.clone(),
            location,
            context,
            span: node.span(),
            line: position.line,
            column: position.column,
            kind,
            source_text: tree.shared_source(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

pub fn check<S: TypeSystem>(
    tree: &Tree,
    data: &S::Type,
    types: &S,
    trees: &dyn TreeLookup,
    functions: &Functions<S::Type>,
) -> Result<Option<S::Type>, TypeError> {
    check_with_options(tree, data, types, trees, functions, &CheckOptions::default())
}

pub fn check_with_options<S: TypeSystem>(
    tree: &Tree,
    data: &S::Type,
    types: &S,
    trees: &dyn TreeLookup,
    functions: &Functions<S::Type>,
    options: &CheckOptions,
) -> Result<Option<S::Type>, TypeError> {
    debug!(template = %tree.name, data = %types.describe(data), "type checking template");
    let global = scope::Global {
        types,
        trees,
        calls: CallChecker::new(types, functions),
        options,
        active: RefCell::new(vec![(tree.name.clone(), types.describe(data))]),
    };
    let result = scope::Scope::root(&global, data).walk_list(tree, data, &tree.root);
    match &result {
        Ok(ty) => debug!(
            template = %tree.name,
            result = %ty.as_ref().map(|ty| types.describe(ty)).unwrap_or_default(),
            "template type checked"
        ),
        Err(err) => debug!(template = %tree.name, code = err.code(), "template rejected"),
    }
    result
}
