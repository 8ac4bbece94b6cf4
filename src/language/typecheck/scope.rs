use crate::language::{
    ast::{BranchNode, ListNode, Node, PipeNode, TemplateNode, Tree},
    typecheck::{
        classify_number, downgrade, CallChecker, CheckErrorKind, CheckOptions, TreeLookup,
        TypeError,
    },
    types::{is_exported, BasicKind, Member, Shape, Signature, TypeSystem},
};
use std::{cell::RefCell, collections::BTreeMap};
use tracing::{debug, trace};

/// State shared by every scope of one check.
pub(super) struct Global<'a, S: TypeSystem> {
    pub types: &'a S,
    pub trees: &'a dyn TreeLookup,
    pub calls: CallChecker<'a, S>,
    pub options: &'a CheckOptions,
    /// Template invocations being checked, as (name, argument type).
    pub active: RefCell<Vec<(String, String)>>,
}

/// Variable bindings of one lexical block. Children start from a copy, so
/// nothing bound inside a block is visible after it.
pub(super) struct Scope<'a, S: TypeSystem> {
    global: &'a Global<'a, S>,
    variables: BTreeMap<String, S::Type>,
}

fn fail(tree: &Tree, node: &Node, kind: CheckErrorKind) -> TypeError {
    TypeError::new(tree, node, kind)
}

impl<'a, S: TypeSystem> Scope<'a, S> {
    pub(super) fn root(global: &'a Global<'a, S>, data: &S::Type) -> Self {
        let mut variables = BTreeMap::new();
        variables.insert("$".to_string(), data.clone());
        Self { global, variables }
    }

    fn child(&self) -> Self {
        Self {
            global: self.global,
            variables: self.variables.clone(),
        }
    }

    fn types(&self) -> &'a S {
        self.global.types
    }

    fn nil(&self) -> S::Type {
        self.types().basic(BasicKind::UntypedNil)
    }

    fn bind(&mut self, name: &str, ty: S::Type) {
        trace!(variable = name, ty = %self.types().describe(&ty), "binding variable");
        self.variables.insert(name.to_string(), ty);
    }

    fn variable(&self, tree: &Tree, node: &Node, name: &str) -> Result<S::Type, TypeError> {
        self.variables.get(name).cloned().ok_or_else(|| {
            fail(
                tree,
                node,
                CheckErrorKind::UndefinedVariable {
                    name: name.to_string(),
                },
            )
        })
    }

    pub(super) fn walk_list(
        &mut self,
        tree: &Tree,
        dot: &S::Type,
        list: &ListNode,
    ) -> Result<Option<S::Type>, TypeError> {
        let mut last = None;
        for node in &list.nodes {
            last = self.walk(tree, dot, None, node)?;
        }
        Ok(last)
    }

    pub(super) fn walk(
        &mut self,
        tree: &Tree,
        dot: &S::Type,
        prev: Option<&S::Type>,
        node: &Node,
    ) -> Result<Option<S::Type>, TypeError> {
        match node {
            Node::Dot(_) => Ok(Some(dot.clone())),
            Node::Text(_) | Node::Comment(_) | Node::Break(_) | Node::Continue(_) => Ok(None),
            Node::List(list) => self.walk_list(tree, dot, list),
            Node::Action(action) => self.check_pipe(tree, dot, &action.pipe).map(Some),
            Node::Pipe(pipe) => self.check_pipe(tree, dot, pipe).map(Some),
            Node::Command(cmd) => self.check_command(tree, dot, &cmd.args, prev).map(Some),
            Node::Field(_)
            | Node::Chain(_)
            | Node::Variable(_)
            | Node::Identifier(_)
            | Node::Bool(_)
            | Node::String(_)
            | Node::Number(_)
            | Node::Nil(_) => self.check_term(tree, dot, node, &[], prev).map(Some),
            Node::If(branch) => self.check_if(tree, dot, branch),
            Node::With(branch) => self.check_with(tree, dot, branch),
            Node::Range(branch) => self.check_range(tree, dot, node, branch),
            Node::Template(template) => self.check_template(tree, dot, node, template),
        }
    }

    fn check_pipe(&mut self, tree: &Tree, dot: &S::Type, pipe: &PipeNode) -> Result<S::Type, TypeError> {
        let ty = self.eval_commands(tree, dot, pipe)?;
        if let Some(var) = pipe.decl.first() {
            let node = Node::Variable(var.clone());
            self.declare(tree, &node, var.name(), pipe.is_assign, ty.clone())?;
        }
        Ok(ty)
    }

    /// Feeds each command's result into the next one.
    fn eval_commands(&mut self, tree: &Tree, dot: &S::Type, pipe: &PipeNode) -> Result<S::Type, TypeError> {
        let mut result: Option<S::Type> = None;
        for cmd in &pipe.cmds {
            result = Some(self.check_command(tree, dot, &cmd.args, result.as_ref())?);
        }
        Ok(result.unwrap_or_else(|| self.nil()))
    }

    fn declare(
        &mut self,
        tree: &Tree,
        node: &Node,
        name: &str,
        is_assign: bool,
        ty: S::Type,
    ) -> Result<(), TypeError> {
        if is_assign {
            self.variable(tree, node, name)?;
        }
        self.bind(name, ty);
        Ok(())
    }

    fn check_command(
        &mut self,
        tree: &Tree,
        dot: &S::Type,
        args: &[Node],
        prev: Option<&S::Type>,
    ) -> Result<S::Type, TypeError> {
        let Some((head, rest)) = args.split_first() else {
            return Ok(self.nil());
        };
        if let Node::Nil(_) = head {
            return Err(fail(tree, head, CheckErrorKind::NilCommand));
        }
        self.check_term(tree, dot, head, rest, prev)
    }

    /// Type of `node` used as a command head with `args` after it, or as a
    /// plain operand when `args` is empty and there is no `prev`.
    fn check_term(
        &mut self,
        tree: &Tree,
        dot: &S::Type,
        node: &Node,
        args: &[Node],
        prev: Option<&S::Type>,
    ) -> Result<S::Type, TypeError> {
        let types = self.types();
        match node {
            Node::Field(field) => {
                self.check_identifiers(tree, dot, node, dot.clone(), &field.ident, args, prev)
            }
            Node::Chain(chain) => {
                let receiver = self.check_term(tree, dot, &chain.node, &[], None)?;
                self.check_identifiers(tree, dot, node, receiver, &chain.field, args, prev)
            }
            Node::Identifier(ident) => self.check_function(tree, dot, node, &ident.ident, args, prev),
            Node::Variable(var) => {
                let ty = self.variable(tree, node, var.name())?;
                if var.ident.len() == 1 {
                    not_a_function(tree, node, args, prev)?;
                    return Ok(ty);
                }
                self.check_identifiers(tree, dot, node, ty, &var.ident[1..], args, prev)
            }
            Node::Pipe(pipe) => {
                not_a_function(tree, node, args, prev)?;
                self.check_pipe(tree, dot, pipe)
            }
            Node::Dot(_) => {
                not_a_function(tree, node, args, prev)?;
                Ok(dot.clone())
            }
            Node::Nil(_) => {
                not_a_function(tree, node, args, prev)?;
                Ok(self.nil())
            }
            Node::Bool(_) => {
                not_a_function(tree, node, args, prev)?;
                Ok(types.basic(BasicKind::UntypedBool))
            }
            Node::String(_) => {
                not_a_function(tree, node, args, prev)?;
                Ok(types.basic(BasicKind::UntypedString))
            }
            Node::Number(number) => {
                not_a_function(tree, node, args, prev)?;
                classify_number(number)
                    .map(|kind| types.basic(kind))
                    .map_err(|kind| fail(tree, node, kind))
            }
            other => Ok(self.walk(tree, dot, prev, other)?.unwrap_or_else(|| self.nil())),
        }
    }

    fn check_operands(
        &mut self,
        tree: &Tree,
        dot: &S::Type,
        args: &[Node],
        prev: Option<&S::Type>,
    ) -> Result<Vec<S::Type>, TypeError> {
        let mut arg_types = Vec::with_capacity(args.len() + 1);
        for arg in args {
            arg_types.push(self.check_term(tree, dot, arg, &[], None)?);
        }
        if let Some(prev) = prev {
            arg_types.push(prev.clone());
        }
        Ok(arg_types)
    }

    fn check_function(
        &mut self,
        tree: &Tree,
        dot: &S::Type,
        node: &Node,
        name: &str,
        args: &[Node],
        prev: Option<&S::Type>,
    ) -> Result<S::Type, TypeError> {
        let arg_types = self.check_operands(tree, dot, args, prev)?;
        self.global
            .calls
            .check_call(name, args, &arg_types)
            .map_err(|kind| fail(tree, node, kind))
    }

    /// Resolves `.A.B.C` starting at `receiver`. Only the last identifier
    /// receives `args` and `prev`.
    #[allow(clippy::too_many_arguments)]
    fn check_identifiers(
        &mut self,
        tree: &Tree,
        dot: &S::Type,
        node: &Node,
        receiver: S::Type,
        idents: &[String],
        args: &[Node],
        prev: Option<&S::Type>,
    ) -> Result<S::Type, TypeError> {
        let types = self.types();
        let has_args = !args.is_empty() || prev.is_some();
        let mut current = receiver;
        for (position, ident) in idents.iter().enumerate() {
            let last = position + 1 == idents.len();
            current = self.global.calls.deref(&current);
            match types.shape(&current) {
                Shape::Signature(_) => {
                    return Err(fail(
                        tree,
                        node,
                        CheckErrorKind::ChainUnsupported {
                            ty: types.describe(&current),
                        },
                    ));
                }
                Shape::Map { key, elem } => {
                    let key_kind = match types.shape(&key) {
                        Shape::Basic(kind) => Some(kind),
                        _ => None,
                    };
                    if key_kind.is_some_and(BasicKind::is_integer) {
                        if ident.parse::<i64>().is_err() {
                            return Err(fail(
                                tree,
                                node,
                                CheckErrorKind::MapKeyNotInteger {
                                    key: ident.clone(),
                                    ty: types.describe(&current),
                                },
                            ));
                        }
                    } else if !types.assignable(&types.basic(BasicKind::String), &key) {
                        return Err(fail(
                            tree,
                            node,
                            CheckErrorKind::FieldNotFound {
                                ident: ident.clone(),
                                ty: types.describe(&current),
                            },
                        ));
                    }
                    if last && has_args {
                        return Err(fail(
                            tree,
                            node,
                            CheckErrorKind::NotAMethod {
                                ident: ident.clone(),
                            },
                        ));
                    }
                    current = elem;
                }
                _ => {
                    if !is_exported(ident) {
                        return Err(fail(
                            tree,
                            node,
                            CheckErrorKind::Unexported {
                                ident: ident.clone(),
                                ty: types.describe(&current),
                            },
                        ));
                    }
                    let package = self.global.options.package.as_deref();
                    match types.lookup_field_or_method(&current, ident, package) {
                        None => {
                            return Err(fail(
                                tree,
                                node,
                                CheckErrorKind::FieldNotFound {
                                    ident: ident.clone(),
                                    ty: types.describe(&current),
                                },
                            ));
                        }
                        Some(Member::Field(field)) => {
                            if last && has_args {
                                return Err(fail(
                                    tree,
                                    node,
                                    CheckErrorKind::NotAMethod {
                                        ident: ident.clone(),
                                    },
                                ));
                            }
                            current = field;
                        }
                        Some(Member::Method(signature)) => {
                            let arg_types = if last {
                                self.check_operands(tree, dot, args, prev)?
                            } else {
                                Vec::new()
                            };
                            current = self
                                .global
                                .calls
                                .check_call_arguments(ident, &signature, &arg_types)
                                .map_err(|kind| fail(tree, node, kind))?;
                        }
                    }
                }
            }
        }
        Ok(current)
    }

    fn check_if(&mut self, tree: &Tree, dot: &S::Type, branch: &BranchNode) -> Result<Option<S::Type>, TypeError> {
        let mut condition = self.child();
        condition.check_pipe(tree, dot, &branch.pipe)?;
        condition.child().walk_list(tree, dot, &branch.list)?;
        if let Some(else_list) = &branch.else_list {
            condition.child().walk_list(tree, dot, else_list)?;
        }
        Ok(None)
    }

    fn check_with(&mut self, tree: &Tree, dot: &S::Type, branch: &BranchNode) -> Result<Option<S::Type>, TypeError> {
        let mut condition = self.child();
        let value = condition.check_pipe(tree, dot, &branch.pipe)?;
        condition.child().walk_list(tree, &value, &branch.list)?;
        if let Some(else_list) = &branch.else_list {
            condition.child().walk_list(tree, dot, else_list)?;
        }
        Ok(None)
    }

    fn check_range(
        &mut self,
        tree: &Tree,
        dot: &S::Type,
        node: &Node,
        branch: &BranchNode,
    ) -> Result<Option<S::Type>, TypeError> {
        let types = self.types();
        let mut body = self.child();
        let source = body.eval_commands(tree, dot, &branch.pipe)?;
        let item = self.global.calls.deref(&source);
        let vars = branch.pipe.decl.len();
        let too_many_variables = || {
            fail(
                tree,
                node,
                CheckErrorKind::RangeVariables {
                    ty: types.describe(&source),
                },
            )
        };
        let cannot_range = || {
            fail(
                tree,
                node,
                CheckErrorKind::CannotRange {
                    ty: types.describe(&source),
                },
            )
        };

        let (key, elem) = match types.shape(&item) {
            Shape::Slice(elem) | Shape::Array { elem, .. } => {
                (Some(types.basic(BasicKind::Int)), elem)
            }
            Shape::Map { key, elem } => (Some(key), elem),
            Shape::Chan(elem) => {
                if vars > 1 {
                    return Err(too_many_variables());
                }
                (None, elem)
            }
            Shape::Basic(kind) if kind.is_integer() => {
                if vars > 1 {
                    return Err(too_many_variables());
                }
                let counter = if kind.is_untyped() {
                    types.basic(kind.default_kind())
                } else {
                    item.clone()
                };
                (None, counter)
            }
            Shape::Signature(signature) => match self.yielded(&signature).as_deref() {
                Some([value]) => {
                    if vars > 1 {
                        return Err(too_many_variables());
                    }
                    (None, value.clone())
                }
                // With fewer than two variables the key is the element.
                Some([key, value]) if vars > 1 => (Some(key.clone()), value.clone()),
                Some([key, _]) => (None, key.clone()),
                _ => return Err(cannot_range()),
            },
            _ => return Err(cannot_range()),
        };

        let pipe = &branch.pipe;
        match (pipe.decl.as_slice(), key) {
            ([], _) => {}
            ([value], _) => {
                let var = Node::Variable(pipe.decl[0].clone());
                body.declare(tree, &var, value.name(), pipe.is_assign, elem.clone())?;
            }
            ([index, value, ..], Some(key)) => {
                let index_node = Node::Variable(index.clone());
                body.declare(tree, &index_node, index.name(), pipe.is_assign, key)?;
                let value_node = Node::Variable(value.clone());
                body.declare(tree, &value_node, value.name(), pipe.is_assign, elem.clone())?;
            }
            (_, None) => return Err(too_many_variables()),
        }
        body.walk_list(tree, &elem, &branch.list)?;
        if let Some(else_list) = &branch.else_list {
            self.child().walk_list(tree, dot, else_list)?;
        }
        Ok(None)
    }

    /// Parameter types of the yield callback when `signature` is an
    /// iterator: `func(yield func(V) bool)` or `func(yield func(K, V) bool)`.
    fn yielded(&self, signature: &Signature<S::Type>) -> Option<Vec<S::Type>> {
        let types = self.types();
        let [callback] = signature.params.as_slice() else {
            return None;
        };
        if signature.variadic || !signature.results.is_empty() {
            return None;
        }
        let Shape::Signature(yield_fn) = types.shape(callback) else {
            return None;
        };
        let returns_bool = matches!(
            yield_fn.results.as_slice(),
            [result] if matches!(types.shape(result), Shape::Basic(BasicKind::Bool))
        );
        if !returns_bool || yield_fn.variadic || !(1..=2).contains(&yield_fn.params.len()) {
            return None;
        }
        Some(yield_fn.params)
    }

    fn check_template(
        &mut self,
        tree: &Tree,
        dot: &S::Type,
        node: &Node,
        template: &TemplateNode,
    ) -> Result<Option<S::Type>, TypeError> {
        let types = self.types();
        let arg = match &template.pipe {
            Some(pipe) => {
                let ty = self.check_pipe(tree, dot, pipe)?;
                downgrade(types, &ty)
            }
            None => self.nil(),
        };
        let Some(target) = self.global.trees.lookup(&template.name) else {
            return Err(fail(
                tree,
                node,
                CheckErrorKind::TemplateNotFound {
                    name: template.name.clone(),
                },
            ));
        };

        let key = (template.name.clone(), types.describe(&arg));
        {
            let active = self.global.active.borrow();
            if active.contains(&key) {
                trace!(template = %key.0, data = %key.1, "template already being checked");
                return Ok(None);
            }
            let depth = self.global.options.max_template_depth;
            if active.len() > depth {
                return Err(fail(
                    tree,
                    node,
                    CheckErrorKind::TemplateDepth {
                        name: template.name.clone(),
                        depth,
                    },
                ));
            }
        }

        debug!(template = %key.0, data = %key.1, "checking invoked template");
        self.global.active.borrow_mut().push(key);
        let result = Scope::root(self.global, &arg).walk_list(target, &arg, &target.root);
        self.global.active.borrow_mut().pop();
        result.map(|_| None)
    }
}

fn not_a_function<T>(tree: &Tree, node: &Node, args: &[Node], prev: Option<&T>) -> Result<(), TypeError> {
    if args.is_empty() && prev.is_none() {
        return Ok(());
    }
    Err(fail(
        tree,
        node,
        CheckErrorKind::NotAFunction {
            node: node.to_string(),
        },
    ))
}
