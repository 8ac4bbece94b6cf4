//! Concrete host type model.
//!
//! Types are cheap to clone: composite types share their parts through
//! `Arc`, and named types are compared by identity. A named type is
//! declared first and defined afterwards, so methods and fields may refer
//! back to the type being defined.

use crate::language::{
    typecheck::Functions,
    types::{is_exported, BasicKind, Member, Shape, Signature, TypeSystem},
};
use std::{
    fmt,
    sync::{Arc, OnceLock},
};
use thiserror::Error;

#[derive(Clone)]
pub enum Type {
    Basic(BasicKind),
    Named(Arc<NamedType>),
    Pointer(Arc<Type>),
    Slice(Arc<Type>),
    Array(u64, Arc<Type>),
    Map(Arc<Type>, Arc<Type>),
    Chan(Arc<Type>),
    Func(Arc<Signature<Type>>),
    Struct(Arc<StructType>),
    Interface(Arc<InterfaceType>),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReflectError {
    #[error("type {0} is already defined")]
    AlreadyDefined(String),
}

pub struct NamedType {
    name: String,
    package: Option<String>,
    underlying: OnceLock<Type>,
    methods: OnceLock<Vec<Method>>,
}

impl NamedType {
    /// Declares a named type whose underlying type is supplied later by
    /// [`NamedType::define`].
    pub fn declare(package: Option<&str>, name: impl Into<String>) -> Arc<NamedType> {
        Arc::new(NamedType {
            name: name.into(),
            package: package.map(str::to_string),
            underlying: OnceLock::new(),
            methods: OnceLock::new(),
        })
    }

    /// Naming another named type adopts that type's underlying type.
    pub fn define(&self, underlying: Type, methods: Vec<Method>) -> Result<(), ReflectError> {
        let underlying = underlying.underlying();
        self.underlying
            .set(underlying)
            .map_err(|_| ReflectError::AlreadyDefined(self.qualified_name()))?;
        self.methods
            .set(methods)
            .map_err(|_| ReflectError::AlreadyDefined(self.qualified_name()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn package(&self) -> Option<&str> {
        self.package.as_deref()
    }

    pub fn qualified_name(&self) -> String {
        match &self.package {
            Some(package) => format!("{package}.{}", self.name),
            None => self.name.clone(),
        }
    }

    /// The underlying type. A declared but undefined type behaves as an
    /// empty struct.
    pub fn underlying(&self) -> Type {
        self.underlying
            .get()
            .cloned()
            .unwrap_or_else(|| Type::structure(Vec::new()))
    }

    pub fn methods(&self) -> &[Method] {
        self.methods.get().map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Clone)]
pub struct Method {
    pub name: String,
    pub pointer_receiver: bool,
    pub signature: Signature<Type>,
}

impl Method {
    pub fn value(name: impl Into<String>, signature: Signature<Type>) -> Self {
        Self {
            name: name.into(),
            pointer_receiver: false,
            signature,
        }
    }

    pub fn pointer(name: impl Into<String>, signature: Signature<Type>) -> Self {
        Self {
            name: name.into(),
            pointer_receiver: true,
            signature,
        }
    }
}

#[derive(Clone)]
pub struct Field {
    pub name: String,
    pub ty: Type,
    pub embedded: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            embedded: false,
        }
    }

    /// An embedded field takes the name of its (pointed-to) named type.
    pub fn embedded(ty: Type) -> Self {
        let name = match ty.deref() {
            Type::Named(named) => named.name().to_string(),
            other => other.to_string(),
        };
        Self {
            name,
            ty,
            embedded: true,
        }
    }
}

#[derive(Clone, Default)]
pub struct StructType {
    pub package: Option<String>,
    pub fields: Vec<Field>,
}

#[derive(Clone)]
pub struct InterfaceMethod {
    pub name: String,
    pub signature: Signature<Type>,
}

#[derive(Clone, Default)]
pub struct InterfaceType {
    pub package: Option<String>,
    methods: Vec<InterfaceMethod>,
}

impl InterfaceType {
    pub fn new(package: Option<&str>, mut methods: Vec<InterfaceMethod>) -> Self {
        methods.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            package: package.map(str::to_string),
            methods,
        }
    }

    pub fn methods(&self) -> &[InterfaceMethod] {
        &self.methods
    }

    fn method(&self, name: &str) -> Option<&InterfaceMethod> {
        self.methods.iter().find(|method| method.name == name)
    }
}

impl Type {
    pub fn basic(kind: BasicKind) -> Type {
        Type::Basic(kind)
    }

    pub fn bool() -> Type {
        Type::Basic(BasicKind::Bool)
    }

    pub fn int() -> Type {
        Type::Basic(BasicKind::Int)
    }

    pub fn float64() -> Type {
        Type::Basic(BasicKind::Float64)
    }

    pub fn string() -> Type {
        Type::Basic(BasicKind::String)
    }

    pub fn pointer(elem: Type) -> Type {
        Type::Pointer(Arc::new(elem))
    }

    pub fn slice(elem: Type) -> Type {
        Type::Slice(Arc::new(elem))
    }

    pub fn array(len: u64, elem: Type) -> Type {
        Type::Array(len, Arc::new(elem))
    }

    pub fn map(key: Type, elem: Type) -> Type {
        Type::Map(Arc::new(key), Arc::new(elem))
    }

    pub fn chan(elem: Type) -> Type {
        Type::Chan(Arc::new(elem))
    }

    pub fn func(params: Vec<Type>, results: Vec<Type>) -> Type {
        Type::Func(Arc::new(Signature::new(params, results)))
    }

    /// `func(params..., ...elem) results`
    pub fn variadic_func(mut params: Vec<Type>, elem: Type, results: Vec<Type>) -> Type {
        params.push(Type::slice(elem));
        Type::Func(Arc::new(Signature::variadic(params, results)))
    }

    pub fn structure(fields: Vec<Field>) -> Type {
        Type::Struct(Arc::new(StructType {
            package: None,
            fields,
        }))
    }

    pub fn interface(methods: Vec<InterfaceMethod>) -> Type {
        Type::Interface(Arc::new(InterfaceType::new(None, methods)))
    }

    pub fn named(named: &Arc<NamedType>) -> Type {
        Type::Named(Arc::clone(named))
    }

    /// Declares and defines a named type in one step.
    pub fn new_named(
        package: Option<&str>,
        name: &str,
        underlying: Type,
        methods: Vec<Method>,
    ) -> Type {
        let named = NamedType::declare(package, name);
        // A freshly declared type cannot already be defined.
        let _ = named.define(underlying, methods);
        Type::Named(named)
    }

    /// `func(yield func(elem) bool)`
    pub fn seq(elem: Type) -> Type {
        Type::func(vec![Type::func(vec![elem], vec![Type::bool()])], Vec::new())
    }

    /// `func(yield func(key, elem) bool)`
    pub fn seq2(key: Type, elem: Type) -> Type {
        Type::func(
            vec![Type::func(vec![key, elem], vec![Type::bool()])],
            Vec::new(),
        )
    }

    /// Strips every level of pointer indirection.
    pub fn deref(&self) -> &Type {
        let mut current = self;
        while let Type::Pointer(elem) = current {
            current = elem;
        }
        current
    }

    pub fn underlying(&self) -> Type {
        match self {
            Type::Named(named) => named.underlying(),
            other => other.clone(),
        }
    }

    /// Named and predeclared basic types have names; composite literals do not.
    fn has_name(&self) -> bool {
        matches!(self, Type::Named(_) | Type::Basic(_))
    }
}

/// The predeclared `error` interface.
pub fn error_type() -> Type {
    static ERROR: OnceLock<Type> = OnceLock::new();
    ERROR
        .get_or_init(|| {
            Type::new_named(
                None,
                "error",
                Type::interface(vec![InterfaceMethod {
                    name: "Error".to_string(),
                    signature: Signature::new(Vec::new(), vec![Type::string()]),
                }]),
                Vec::new(),
            )
        })
        .clone()
}

pub fn any_type() -> Type {
    Type::interface(Vec::new())
}

pub fn identical(a: &Type, b: &Type) -> bool {
    match (a, b) {
        (Type::Basic(x), Type::Basic(y)) => x == y,
        (Type::Named(x), Type::Named(y)) => Arc::ptr_eq(x, y),
        (Type::Pointer(x), Type::Pointer(y))
        | (Type::Slice(x), Type::Slice(y))
        | (Type::Chan(x), Type::Chan(y)) => identical(x, y),
        (Type::Array(n, x), Type::Array(m, y)) => n == m && identical(x, y),
        (Type::Map(k1, v1), Type::Map(k2, v2)) => identical(k1, k2) && identical(v1, v2),
        (Type::Func(x), Type::Func(y)) => identical_signatures(x, y),
        (Type::Struct(x), Type::Struct(y)) => {
            x.fields.len() == y.fields.len()
                && x.fields.iter().zip(&y.fields).all(|(f, g)| {
                    f.name == g.name && f.embedded == g.embedded && identical(&f.ty, &g.ty)
                })
        }
        (Type::Interface(x), Type::Interface(y)) => {
            x.methods.len() == y.methods.len()
                && x.methods.iter().zip(&y.methods).all(|(m, n)| {
                    m.name == n.name && identical_signatures(&m.signature, &n.signature)
                })
        }
        _ => false,
    }
}

fn identical_signatures(a: &Signature<Type>, b: &Signature<Type>) -> bool {
    a.variadic == b.variadic
        && a.params.len() == b.params.len()
        && a.results.len() == b.results.len()
        && a.params.iter().zip(&b.params).all(|(x, y)| identical(x, y))
        && a.results.iter().zip(&b.results).all(|(x, y)| identical(x, y))
}

pub fn assignable(from: &Type, to: &Type) -> bool {
    if identical(from, to) {
        return true;
    }
    if let Type::Basic(kind) = from {
        if kind.is_untyped() {
            return untyped_assignable(*kind, to);
        }
    }
    let from_underlying = from.underlying();
    let to_underlying = to.underlying();
    if identical(&from_underlying, &to_underlying) && (!from.has_name() || !to.has_name()) {
        return true;
    }
    match &to_underlying {
        Type::Interface(iface) => implements(from, iface),
        _ => false,
    }
}

fn untyped_assignable(kind: BasicKind, to: &Type) -> bool {
    match to.underlying() {
        Type::Interface(iface) => {
            kind == BasicKind::UntypedNil || implements(&Type::Basic(kind.default_kind()), &iface)
        }
        Type::Basic(target) if !target.is_untyped() => match kind {
            BasicKind::UntypedBool => target == BasicKind::Bool,
            BasicKind::UntypedInt | BasicKind::UntypedRune => target.is_numeric(),
            BasicKind::UntypedFloat => target.is_float() || target.is_complex(),
            BasicKind::UntypedComplex => target.is_complex(),
            BasicKind::UntypedString => target == BasicKind::String,
            BasicKind::UntypedNil => target == BasicKind::UnsafePointer,
            _ => false,
        },
        Type::Pointer(_) | Type::Slice(_) | Type::Map(..) | Type::Chan(_) | Type::Func(_) => {
            kind == BasicKind::UntypedNil
        }
        _ => false,
    }
}

/// Whether every method of `iface` is in the method set of `ty`.
pub fn implements(ty: &Type, iface: &InterfaceType) -> bool {
    if let Type::Interface(own) = ty.underlying() {
        return iface.methods.iter().all(|wanted| {
            own.method(&wanted.name)
                .is_some_and(|found| identical_signatures(&found.signature, &wanted.signature))
        });
    }
    let pointer_methods = matches!(ty, Type::Pointer(_));
    iface.methods.iter().all(|wanted| {
        match find_member(ty, &wanted.name, iface.package.as_deref(), pointer_methods) {
            Some(Member::Method(signature)) => identical_signatures(&signature, &wanted.signature),
            _ => false,
        }
    })
}

fn visible(name: &str, declared_in: Option<&str>, package: Option<&str>) -> bool {
    is_exported(name) || declared_in == package
}

/// Breadth-first search through embedded fields. Two matches at the same
/// depth are ambiguous and hide each other.
fn find_member(
    ty: &Type,
    name: &str,
    package: Option<&str>,
    pointer_methods: bool,
) -> Option<Member<Type>> {
    let mut current = vec![(ty.deref().clone(), pointer_methods || matches!(ty, Type::Pointer(_)))];
    let mut seen: Vec<Arc<NamedType>> = Vec::new();
    while !current.is_empty() {
        let mut found = None;
        let mut matches = 0usize;
        let mut next = Vec::new();
        for (candidate, with_pointer_methods) in current {
            let underlying = match &candidate {
                Type::Named(named) => {
                    if seen.iter().any(|other| Arc::ptr_eq(other, named)) {
                        continue;
                    }
                    seen.push(Arc::clone(named));
                    let method = named.methods().iter().find(|method| {
                        method.name == name
                            && (with_pointer_methods || !method.pointer_receiver)
                            && visible(name, named.package(), package)
                    });
                    if let Some(method) = method {
                        found = Some(Member::Method(method.signature.clone()));
                        matches += 1;
                        continue;
                    }
                    named.underlying()
                }
                other => other.clone(),
            };
            match &underlying {
                Type::Struct(structure) => {
                    for field in &structure.fields {
                        if field.name == name
                            && visible(name, structure.package.as_deref(), package)
                        {
                            found = Some(Member::Field(field.ty.clone()));
                            matches += 1;
                        }
                        if field.embedded {
                            let through_pointer = matches!(field.ty, Type::Pointer(_));
                            next.push((
                                field.ty.deref().clone(),
                                with_pointer_methods || through_pointer,
                            ));
                        }
                    }
                }
                Type::Interface(iface) => {
                    if let Some(method) = iface.method(name) {
                        if visible(name, iface.package.as_deref(), package) {
                            found = Some(Member::Method(method.signature.clone()));
                            matches += 1;
                        }
                    }
                }
                _ => {}
            }
        }
        match matches {
            0 => current = next,
            1 => return found,
            _ => return None,
        }
    }
    None
}

fn describe(ty: &Type) -> String {
    match ty {
        Type::Basic(kind) => kind.name().to_string(),
        Type::Named(named) => named.qualified_name(),
        Type::Pointer(elem) => format!("*{}", describe(elem)),
        Type::Slice(elem) => format!("[]{}", describe(elem)),
        Type::Array(len, elem) => format!("[{len}]{}", describe(elem)),
        Type::Map(key, elem) => format!("map[{}]{}", describe(key), describe(elem)),
        Type::Chan(elem) => format!("chan {}", describe(elem)),
        Type::Func(signature) => format!("func{}", describe_signature(signature)),
        Type::Struct(structure) => {
            let fields: Vec<String> = structure
                .fields
                .iter()
                .map(|field| {
                    if field.embedded {
                        describe(&field.ty)
                    } else {
                        format!("{} {}", field.name, describe(&field.ty))
                    }
                })
                .collect();
            format!("struct{{{}}}", fields.join("; "))
        }
        Type::Interface(iface) => {
            let methods: Vec<String> = iface
                .methods
                .iter()
                .map(|method| format!("{}{}", method.name, describe_signature(&method.signature)))
                .collect();
            format!("interface{{{}}}", methods.join("; "))
        }
    }
}

fn describe_signature(signature: &Signature<Type>) -> String {
    let last = signature.params.len().saturating_sub(1);
    let params: Vec<String> = signature
        .params
        .iter()
        .enumerate()
        .map(|(idx, param)| match param {
            Type::Slice(elem) if signature.variadic && idx == last => {
                format!("...{}", describe(elem))
            }
            other => describe(other),
        })
        .collect();
    let results: Vec<String> = signature.results.iter().map(describe).collect();
    match results.len() {
        0 => format!("({})", params.join(", ")),
        1 => format!("({}) {}", params.join(", "), results[0]),
        _ => format!("({}) ({})", params.join(", "), results.join(", ")),
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&describe(self))
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type({})", describe(self))
    }
}

impl fmt::Debug for NamedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NamedType({})", self.qualified_name())
    }
}

/// [`TypeSystem`] over [`Type`].
#[derive(Clone, Copy, Debug, Default)]
pub struct HostTypes;

impl TypeSystem for HostTypes {
    type Type = Type;

    fn shape(&self, ty: &Type) -> Shape<Type> {
        match ty.underlying() {
            Type::Basic(kind) => Shape::Basic(kind),
            Type::Named(_) | Type::Struct(_) => Shape::Struct,
            Type::Pointer(elem) => Shape::Pointer(elem.as_ref().clone()),
            Type::Slice(elem) => Shape::Slice(elem.as_ref().clone()),
            Type::Array(len, elem) => Shape::Array {
                len,
                elem: elem.as_ref().clone(),
            },
            Type::Map(key, elem) => Shape::Map {
                key: key.as_ref().clone(),
                elem: elem.as_ref().clone(),
            },
            Type::Chan(elem) => Shape::Chan(elem.as_ref().clone()),
            Type::Func(signature) => Shape::Signature(signature.as_ref().clone()),
            Type::Interface(_) => Shape::Interface,
        }
    }

    fn lookup_field_or_method(
        &self,
        ty: &Type,
        name: &str,
        package: Option<&str>,
    ) -> Option<Member<Type>> {
        find_member(ty, name, package, true)
    }

    fn assignable(&self, from: &Type, to: &Type) -> bool {
        assignable(from, to)
    }

    fn is_error_like(&self, ty: &Type) -> bool {
        match error_type().underlying() {
            Type::Interface(iface) => implements(ty, &iface),
            _ => false,
        }
    }

    fn basic(&self, kind: BasicKind) -> Type {
        Type::Basic(kind)
    }

    fn slice_of(&self, elem: &Type) -> Type {
        Type::slice(elem.clone())
    }

    fn describe(&self, ty: &Type) -> String {
        describe(ty)
    }
}

/// The escaping and printing functions every template can call.
pub fn default_functions() -> Functions<Type> {
    let text = |mut params: Vec<Type>| {
        params.push(Type::slice(any_type()));
        Signature::variadic(params, vec![Type::string()])
    };
    let mut functions = Functions::new();
    for name in ["html", "js", "urlquery", "print", "println"] {
        functions.insert(name, text(Vec::new()));
    }
    functions.insert("printf", text(vec![Type::string()]));
    functions
}
