use crate::language::{
    ast::Node,
    typecheck::CheckErrorKind,
    types::{BasicKind, Shape, Signature, TypeSystem},
};
use std::collections::BTreeMap;
use tracing::trace;

/// Name to signature registry of callable template functions.
#[derive(Clone, Debug)]
pub struct Functions<T> {
    entries: BTreeMap<String, Signature<T>>,
}

impl<T> Default for Functions<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<T> Functions<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, signature: Signature<T>) -> Option<Signature<T>> {
        self.entries.insert(name.into(), signature)
    }

    pub fn with(mut self, name: impl Into<String>, signature: Signature<T>) -> Self {
        self.insert(name, signature);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Signature<T>> {
        self.entries.get(name)
    }

    /// Adds every entry of `other`; its entries win on name collisions.
    pub fn union(mut self, other: Functions<T>) -> Self {
        self.entries.extend(other.entries);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T, K: Into<String>> FromIterator<(K, Signature<T>)> for Functions<T> {
    fn from_iter<I: IntoIterator<Item = (K, Signature<T>)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(name, sig)| (name.into(), sig)).collect(),
        }
    }
}

/// Checks calls of registry functions, methods and builtins.
pub struct CallChecker<'a, S: TypeSystem> {
    types: &'a S,
    functions: &'a Functions<S::Type>,
}

impl<'a, S: TypeSystem> CallChecker<'a, S> {
    pub fn new(types: &'a S, functions: &'a Functions<S::Type>) -> Self {
        Self { types, functions }
    }

    /// `arg_types` may hold one more entry than `args`: the result of the
    /// previous pipeline command.
    pub fn check_call(
        &self,
        name: &str,
        args: &[Node],
        arg_types: &[S::Type],
    ) -> Result<S::Type, CheckErrorKind> {
        trace!(function = name, args = arg_types.len(), "checking call");
        if let Some(signature) = self.functions.get(name) {
            return self.check_call_arguments(name, signature, arg_types);
        }
        match name {
            "len" => self.builtin_len(arg_types),
            "slice" => self.builtin_slice(args, arg_types),
            "and" | "or" => {
                expect_at_least(name, 1, arg_types)?;
                Ok(arg_types[0].clone())
            }
            "not" => {
                expect_at_least(name, 1, arg_types)?;
                Ok(self.types.basic(BasicKind::Bool))
            }
            "eq" | "ne" | "lt" | "le" | "gt" | "ge" => {
                expect_at_least(name, 2, arg_types)?;
                Ok(self.types.basic(BasicKind::Bool))
            }
            "call" => self.builtin_call(args, arg_types),
            "index" => self.builtin_index(arg_types),
            "attrescaper" => {
                expect_exactly(name, 0, arg_types)?;
                Ok(self.types.basic(BasicKind::String))
            }
            _ => Err(CheckErrorKind::UnknownFunction {
                name: name.to_string(),
            }),
        }
    }

    /// A function or method is usable with one result, or two when the
    /// second is error-like.
    pub fn check_results(
        &self,
        name: &str,
        signature: &Signature<S::Type>,
    ) -> Result<S::Type, CheckErrorKind> {
        match signature.results.as_slice() {
            [first] => Ok(first.clone()),
            [first, second] if self.types.is_error_like(second) => Ok(first.clone()),
            [_, second] => Err(CheckErrorKind::SecondResultNotError {
                name: name.to_string(),
                ty: self.types.describe(second),
            }),
            results => Err(CheckErrorKind::ResultCount {
                name: name.to_string(),
                count: results.len(),
            }),
        }
    }

    pub fn check_call_arguments(
        &self,
        name: &str,
        signature: &Signature<S::Type>,
        arg_types: &[S::Type],
    ) -> Result<S::Type, CheckErrorKind> {
        let result = self.check_results(name, signature)?;
        let params = &signature.params;
        let variadic = match (signature.variadic, params.split_last()) {
            (true, Some((last, fixed))) => {
                expect_at_least(name, fixed.len(), arg_types)?;
                let elem = match self.types.shape(last) {
                    Shape::Slice(elem) => elem,
                    _ => last.clone(),
                };
                Some((fixed, elem))
            }
            _ => {
                expect_exactly(name, params.len(), arg_types)?;
                None
            }
        };
        for (index, arg) in arg_types.iter().enumerate() {
            let param = match &variadic {
                Some((fixed, elem)) => fixed.get(index).unwrap_or(elem),
                None => &params[index],
            };
            if !self.argument_assignable(arg, param) {
                return Err(CheckErrorKind::ArgumentMismatch {
                    name: name.to_string(),
                    index,
                    got: self.types.describe(arg),
                    want: self.types.describe(param),
                });
            }
        }
        Ok(result)
    }

    /// Assignable as is, or after taking the address or dereferencing one
    /// side.
    pub fn argument_assignable(&self, arg: &S::Type, param: &S::Type) -> bool {
        if self.types.assignable(arg, param) {
            return true;
        }
        if let Shape::Pointer(elem) = self.types.shape(arg) {
            if self.types.assignable(&elem, param) {
                return true;
            }
        }
        if let Shape::Pointer(elem) = self.types.shape(param) {
            if self.types.assignable(arg, &elem) {
                return true;
            }
        }
        false
    }

    /// Follows pointers down to the first non-pointer type.
    pub fn deref(&self, ty: &S::Type) -> S::Type {
        let mut current = ty.clone();
        while let Shape::Pointer(elem) = self.types.shape(&current) {
            current = elem;
        }
        current
    }

    fn builtin_len(&self, arg_types: &[S::Type]) -> Result<S::Type, CheckErrorKind> {
        expect_exactly("len", 1, arg_types)?;
        let item = self.deref(&arg_types[0]);
        match self.types.shape(&item) {
            Shape::Array { .. } | Shape::Slice(_) | Shape::Map { .. } | Shape::Chan(_) => {}
            Shape::Basic(kind) if kind.is_string() => {}
            _ => {
                return Err(CheckErrorKind::InvalidLen {
                    ty: self.types.describe(&arg_types[0]),
                })
            }
        }
        Ok(self.types.basic(BasicKind::Int))
    }

    fn builtin_slice(&self, args: &[Node], arg_types: &[S::Type]) -> Result<S::Type, CheckErrorKind> {
        expect_at_least("slice", 1, arg_types)?;
        if arg_types.len() > 4 {
            return Err(CheckErrorKind::TooManyArgs {
                name: "slice".to_string(),
                want: 4,
                got: arg_types.len(),
            });
        }
        let receiver = self.deref(&arg_types[0]);
        let result = match self.types.shape(&receiver) {
            Shape::Slice(_) => receiver.clone(),
            Shape::Array { elem, .. } => self.types.slice_of(&elem),
            Shape::Basic(kind) if kind.is_string() => {
                if arg_types.len() == 4 {
                    return Err(CheckErrorKind::ThreeIndexString);
                }
                if kind.is_untyped() {
                    self.types.basic(kind.default_kind())
                } else {
                    receiver.clone()
                }
            }
            _ => {
                return Err(CheckErrorKind::CannotSlice {
                    ty: self.types.describe(&arg_types[0]),
                })
            }
        };
        for (position, index) in arg_types.iter().enumerate().skip(1) {
            if !self.is_integer(index) {
                return Err(CheckErrorKind::ArgumentMismatch {
                    name: "slice".to_string(),
                    index: position,
                    got: self.types.describe(index),
                    want: BasicKind::Int.name().to_string(),
                });
            }
            if let Some(Node::Number(number)) = args.get(position) {
                if number.is_int && number.int64 < 0 {
                    return Err(CheckErrorKind::NegativeIndex {
                        index: number.int64,
                    });
                }
            }
        }
        Ok(result)
    }

    fn builtin_call(&self, args: &[Node], arg_types: &[S::Type]) -> Result<S::Type, CheckErrorKind> {
        expect_at_least("call", 1, arg_types)?;
        let callee = &arg_types[0];
        let Shape::Signature(signature) = self.types.shape(callee) else {
            return Err(CheckErrorKind::CallNonFunction {
                node: args.first().map(Node::to_string).unwrap_or_default(),
                ty: self.types.describe(callee),
            });
        };
        let name = args
            .first()
            .map(Node::to_string)
            .unwrap_or_else(|| "call".to_string());
        self.check_call_arguments(&name, &signature, &arg_types[1..])
    }

    fn builtin_index(&self, arg_types: &[S::Type]) -> Result<S::Type, CheckErrorKind> {
        expect_at_least("index", 1, arg_types)?;
        let mut item = arg_types[0].clone();
        for (position, index) in arg_types.iter().enumerate().skip(1) {
            item = self.deref(&item);
            item = match self.types.shape(&item) {
                Shape::Slice(elem) | Shape::Array { elem, .. } => {
                    self.expect_index(position, index, BasicKind::Int.name())?;
                    elem
                }
                Shape::Basic(kind) if kind.is_string() => {
                    self.expect_index(position, index, BasicKind::Int.name())?;
                    self.types.basic(BasicKind::Uint8)
                }
                Shape::Map { key, elem } => {
                    if !self.types.assignable(index, &key) {
                        return Err(CheckErrorKind::ArgumentMismatch {
                            name: "index".to_string(),
                            index: position,
                            got: self.types.describe(index),
                            want: self.types.describe(&key),
                        });
                    }
                    elem
                }
                _ => {
                    return Err(CheckErrorKind::CannotIndex {
                        ty: self.types.describe(&item),
                    })
                }
            };
        }
        Ok(item)
    }

    fn expect_index(&self, position: usize, index: &S::Type, want: &str) -> Result<(), CheckErrorKind> {
        if self.is_integer(index) {
            return Ok(());
        }
        Err(CheckErrorKind::ArgumentMismatch {
            name: "index".to_string(),
            index: position,
            got: self.types.describe(index),
            want: want.to_string(),
        })
    }

    fn is_integer(&self, ty: &S::Type) -> bool {
        matches!(self.types.shape(ty), Shape::Basic(kind) if kind.is_integer())
    }
}

fn expect_exactly<T>(name: &str, want: usize, args: &[T]) -> Result<(), CheckErrorKind> {
    if args.len() == want {
        return Ok(());
    }
    Err(CheckErrorKind::WrongArgCount {
        name: name.to_string(),
        want,
        got: args.len(),
    })
}

fn expect_at_least<T>(name: &str, want: usize, args: &[T]) -> Result<(), CheckErrorKind> {
    if args.len() >= want {
        return Ok(());
    }
    Err(CheckErrorKind::TooFewArgs {
        name: name.to_string(),
        want,
        got: args.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::{
        ast::{NumberNode, StringNode},
        reflect::{default_functions, error_type, HostTypes, Type},
        span::Span,
    };

    fn checker_with<'a>(functions: &'a Functions<Type>) -> CallChecker<'a, HostTypes> {
        CallChecker::new(&HostTypes, functions)
    }

    fn untyped(kind: BasicKind) -> Type {
        Type::basic(kind)
    }

    #[test]
    fn registry_functions_take_precedence_over_builtins() {
        let functions = Functions::new().with(
            "len",
            Signature::new(vec![Type::string()], vec![Type::string()]),
        );
        let checker = checker_with(&functions);
        let result = checker
            .check_call("len", &[], &[Type::string()])
            .expect("registry len");
        assert!(matches!(result, Type::Basic(BasicKind::String)));
    }

    #[test]
    fn union_prefers_later_entries() {
        let first = Functions::new().with("f", Signature::new(Vec::new(), vec![Type::int()]));
        let second = Functions::new().with("f", Signature::new(Vec::new(), vec![Type::string()]));
        let merged = first.union(second);
        assert_eq!(merged.len(), 1);
        let f = merged.get("f").expect("f");
        assert!(matches!(f.results[0], Type::Basic(BasicKind::String)));
    }

    #[test]
    fn variadic_arguments_use_the_element_type() {
        let functions = default_functions();
        let checker = checker_with(&functions);
        checker
            .check_call(
                "printf",
                &[],
                &[untyped(BasicKind::UntypedString), Type::int(), Type::float64()],
            )
            .expect("printf accepts anything after the format");
        let err = checker
            .check_call("printf", &[], &[Type::int()])
            .expect_err("format must be a string");
        assert!(matches!(err, CheckErrorKind::ArgumentMismatch { index: 0, .. }));
        let err = checker
            .check_call("printf", &[], &[])
            .expect_err("missing format");
        assert!(matches!(err, CheckErrorKind::TooFewArgs { want: 1, got: 0, .. }));
    }

    #[test]
    fn exact_arity_for_plain_signatures() {
        let functions = Functions::new().with(
            "add",
            Signature::new(vec![Type::int(), Type::int()], vec![Type::int()]),
        );
        let checker = checker_with(&functions);
        let err = checker
            .check_call("add", &[], &[Type::int()])
            .expect_err("one argument short");
        assert_eq!(
            err,
            CheckErrorKind::WrongArgCount {
                name: "add".to_string(),
                want: 2,
                got: 1
            }
        );
    }

    #[test]
    fn pointer_indirection_is_allowed_both_ways() {
        let functions = Functions::new()
            .with("byValue", Signature::new(vec![Type::int()], vec![Type::int()]))
            .with(
                "byPointer",
                Signature::new(vec![Type::pointer(Type::int())], vec![Type::int()]),
            );
        let checker = checker_with(&functions);
        checker
            .check_call("byValue", &[], &[Type::pointer(Type::int())])
            .expect("deref");
        checker
            .check_call("byPointer", &[], &[Type::int()])
            .expect("address");
        assert!(checker.check_call("byValue", &[], &[Type::string()]).is_err());
    }

    #[test]
    fn result_arity_is_validated() {
        let functions = Functions::new()
            .with("none", Signature::new(Vec::new(), Vec::new()))
            .with(
                "pair",
                Signature::new(Vec::new(), vec![Type::int(), Type::string()]),
            )
            .with(
                "fallible",
                Signature::new(Vec::new(), vec![Type::int(), error_type()]),
            );
        let checker = checker_with(&functions);
        assert!(matches!(
            checker.check_call("none", &[], &[]),
            Err(CheckErrorKind::ResultCount { count: 0, .. })
        ));
        assert!(matches!(
            checker.check_call("pair", &[], &[]),
            Err(CheckErrorKind::SecondResultNotError { ref ty, .. }) if ty == "string"
        ));
        assert!(matches!(
            checker.check_call("fallible", &[], &[]),
            Ok(Type::Basic(BasicKind::Int))
        ));
    }

    #[test]
    fn builtin_len_and_comparisons() {
        let functions = Functions::new();
        let checker = checker_with(&functions);
        assert!(matches!(
            checker.check_call("len", &[], &[Type::map(Type::string(), Type::int())]),
            Ok(Type::Basic(BasicKind::Int))
        ));
        assert!(matches!(
            checker.check_call("len", &[], &[Type::int()]),
            Err(CheckErrorKind::InvalidLen { .. })
        ));
        assert!(matches!(
            checker.check_call("eq", &[], &[Type::int(), untyped(BasicKind::UntypedInt)]),
            Ok(Type::Basic(BasicKind::Bool))
        ));
        assert!(matches!(
            checker.check_call("lt", &[], &[Type::int()]),
            Err(CheckErrorKind::TooFewArgs { want: 2, .. })
        ));
        assert!(matches!(
            checker.check_call("or", &[], &[Type::string(), Type::int()]),
            Ok(Type::Basic(BasicKind::String))
        ));
        assert!(matches!(
            checker.check_call("attrescaper", &[], &[]),
            Ok(Type::Basic(BasicKind::String))
        ));
        assert_eq!(
            checker.check_call("missing", &[], &[]).expect_err("unknown"),
            CheckErrorKind::UnknownFunction {
                name: "missing".to_string()
            }
        );
    }

    #[test]
    fn builtin_slice_rules() {
        let functions = Functions::new();
        let checker = checker_with(&functions);
        let int = untyped(BasicKind::UntypedInt);
        let string_node = Node::String(StringNode {
            span: Span::default(),
            quoted: "\"abc\"".to_string(),
            text: "abc".to_string(),
        });
        let err = checker
            .check_call(
                "slice",
                &[string_node.clone()],
                &[Type::string(), int.clone(), int.clone(), int.clone()],
            )
            .expect_err("3-index string");
        assert_eq!(err, CheckErrorKind::ThreeIndexString);

        let negative = Node::Number(NumberNode {
            is_int: true,
            is_float: true,
            int64: -1,
            float64: -1.0,
            text: "-1".to_string(),
            ..NumberNode::default()
        });
        let err = checker
            .check_call(
                "slice",
                &[string_node, negative],
                &[Type::string(), int.clone()],
            )
            .expect_err("negative index");
        assert_eq!(err, CheckErrorKind::NegativeIndex { index: -1 });

        assert!(matches!(
            checker.check_call("slice", &[], &[Type::array(3, Type::int()), int.clone()]),
            Ok(Type::Slice(_))
        ));
        assert!(matches!(
            checker.check_call("slice", &[], &[Type::int()]),
            Err(CheckErrorKind::CannotSlice { .. })
        ));
    }

    #[test]
    fn builtin_slice_yields_a_slice_not_an_element() {
        let functions = Functions::new();
        let checker = checker_with(&functions);
        let int = untyped(BasicKind::UntypedInt);
        let from_array = checker
            .check_call("slice", &[], &[Type::array(2, Type::int()), int.clone(), int.clone()])
            .expect("array slices");
        assert_eq!(HostTypes.describe(&from_array), "[]int");
        let from_pointer = checker
            .check_call("slice", &[], &[Type::pointer(Type::array(2, Type::string())), int.clone()])
            .expect("pointer to array slices");
        assert_eq!(HostTypes.describe(&from_pointer), "[]string");
        let tags = Type::new_named(Some("app"), "Tags", Type::slice(Type::string()), Vec::new());
        let from_named = checker
            .check_call("slice", &[], &[tags, int])
            .expect("named slice");
        assert_eq!(HostTypes.describe(&from_named), "app.Tags");
    }

    #[test]
    fn builtin_index_walks_nested_containers() {
        let functions = Functions::new();
        let checker = checker_with(&functions);
        let nested = Type::map(Type::string(), Type::slice(Type::float64()));
        let result = checker
            .check_call(
                "index",
                &[],
                &[
                    Type::pointer(nested.clone()),
                    untyped(BasicKind::UntypedString),
                    untyped(BasicKind::UntypedInt),
                ],
            )
            .expect("index through map and slice");
        assert!(matches!(result, Type::Basic(BasicKind::Float64)));
        assert!(matches!(
            checker.check_call("index", &[], &[nested, Type::int()]),
            Err(CheckErrorKind::ArgumentMismatch { index: 1, .. })
        ));
        assert!(matches!(
            checker.check_call("index", &[], &[Type::int(), Type::int()]),
            Err(CheckErrorKind::CannotIndex { .. })
        ));
    }

    #[test]
    fn builtin_call_requires_a_function() {
        let functions = Functions::new();
        let checker = checker_with(&functions);
        let callee = Type::func(vec![Type::int()], vec![Type::string()]);
        assert!(matches!(
            checker.check_call("call", &[], &[callee, untyped(BasicKind::UntypedInt)]),
            Ok(Type::Basic(BasicKind::String))
        ));
        assert!(matches!(
            checker.check_call("call", &[], &[Type::int()]),
            Err(CheckErrorKind::CallNonFunction { .. })
        ));
    }
}
