use crate::language::span::{Location, Span};
use std::{collections::BTreeMap, fmt, sync::Arc};

/// A parsed template body. Trees produced from one source text share it.
#[derive(Clone, Debug)]
pub struct Tree {
    pub name: String,
    pub parse_name: String,
    pub root: ListNode,
    source: Arc<str>,
}

impl Tree {
    pub fn new(
        name: impl Into<String>,
        parse_name: impl Into<String>,
        root: ListNode,
        source: Arc<str>,
    ) -> Self {
        Self {
            name: name.into(),
            parse_name: parse_name.into(),
            root,
            source,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn shared_source(&self) -> Arc<str> {
        Arc::clone(&self.source)
    }

    pub fn location(&self, span: Span) -> Location {
        Location::locate(&self.source, span.start)
    }

    /// `parse_name:line:column` and a short rendering of the node.
    pub fn error_context(&self, node: &Node) -> (String, String) {
        let location = self.location(node.span());
        let mut context = node.to_string();
        if context.chars().count() > 20 {
            context = format!("{}...", context.chars().take(20).collect::<String>());
        }
        (
            format!("{}:{}:{}", self.parse_name, location.line, location.column),
            context,
        )
    }

    /// True when the tree holds nothing but whitespace text and comments.
    pub fn is_empty(&self) -> bool {
        self.root.nodes.iter().all(|node| match node {
            Node::Text(text) => text.text.trim().is_empty(),
            Node::Comment(_) => true,
            _ => false,
        })
    }
}

#[derive(Clone, Debug, Default)]
pub struct TemplateSet {
    trees: BTreeMap<String, Tree>,
}

impl TemplateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Tree> {
        self.trees.get(name)
    }

    pub fn insert(&mut self, tree: Tree) -> Option<Tree> {
        self.trees.insert(tree.name.clone(), tree)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.trees.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.trees.keys().map(String::as_str)
    }

    pub fn trees(&self) -> impl Iterator<Item = &Tree> {
        self.trees.values()
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// Adds every tree of `other`; non-empty trees replace existing ones.
    pub fn extend(&mut self, other: TemplateSet) {
        for (name, tree) in other.trees {
            match self.trees.get(&name) {
                Some(_) if tree.is_empty() => {}
                _ => {
                    self.trees.insert(name, tree);
                }
            }
        }
    }
}

#[derive(Clone, Debug)]
pub enum Node {
    Text(TextNode),
    Comment(CommentNode),
    Action(ActionNode),
    List(ListNode),
    Pipe(PipeNode),
    Command(CommandNode),
    Field(FieldNode),
    Chain(ChainNode),
    Variable(VariableNode),
    Identifier(IdentifierNode),
    Dot(Span),
    Bool(BoolNode),
    String(StringNode),
    Number(NumberNode),
    Nil(Span),
    If(BranchNode),
    Range(BranchNode),
    With(BranchNode),
    Template(TemplateNode),
    Break(Span),
    Continue(Span),
}

impl Node {
    pub fn span(&self) -> Span {
        match self {
            Node::Text(node) => node.span,
            Node::Comment(node) => node.span,
            Node::Action(node) => node.span,
            Node::List(node) => node.span,
            Node::Pipe(node) => node.span,
            Node::Command(node) => node.span,
            Node::Field(node) => node.span,
            Node::Chain(node) => node.span,
            Node::Variable(node) => node.span,
            Node::Identifier(node) => node.span,
            Node::Bool(node) => node.span,
            Node::String(node) => node.span,
            Node::Number(node) => node.span,
            Node::If(node) | Node::Range(node) | Node::With(node) => node.span,
            Node::Template(node) => node.span,
            Node::Dot(span) | Node::Nil(span) | Node::Break(span) | Node::Continue(span) => *span,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TextNode {
    pub span: Span,
    pub text: String,
}

#[derive(Clone, Debug)]
pub struct CommentNode {
    pub span: Span,
    pub text: String,
}

#[derive(Clone, Debug)]
pub struct ActionNode {
    pub span: Span,
    pub pipe: PipeNode,
}

#[derive(Clone, Debug, Default)]
pub struct ListNode {
    pub span: Span,
    pub nodes: Vec<Node>,
}

#[derive(Clone, Debug)]
pub struct PipeNode {
    pub span: Span,
    pub is_assign: bool,
    pub decl: Vec<VariableNode>,
    pub cmds: Vec<CommandNode>,
}

#[derive(Clone, Debug)]
pub struct CommandNode {
    pub span: Span,
    pub args: Vec<Node>,
}

#[derive(Clone, Debug)]
pub struct FieldNode {
    pub span: Span,
    pub ident: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct ChainNode {
    pub span: Span,
    pub node: Box<Node>,
    pub field: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct VariableNode {
    pub span: Span,
    pub ident: Vec<String>,
}

impl VariableNode {
    pub fn name(&self) -> &str {
        self.ident.first().map(String::as_str).unwrap_or("$")
    }
}

#[derive(Clone, Debug)]
pub struct IdentifierNode {
    pub span: Span,
    pub ident: String,
}

#[derive(Clone, Debug)]
pub struct BoolNode {
    pub span: Span,
    pub value: bool,
}

#[derive(Clone, Debug)]
pub struct StringNode {
    pub span: Span,
    pub quoted: String,
    pub text: String,
}

#[derive(Clone, Debug, Default)]
pub struct NumberNode {
    pub span: Span,
    pub is_int: bool,
    pub is_uint: bool,
    pub is_float: bool,
    pub is_complex: bool,
    pub int64: i64,
    pub uint64: u64,
    pub float64: f64,
    pub complex128: (f64, f64),
    pub text: String,
}

/// Shared shape of `if`, `range` and `with`.
#[derive(Clone, Debug)]
pub struct BranchNode {
    pub span: Span,
    pub pipe: PipeNode,
    pub list: ListNode,
    pub else_list: Option<ListNode>,
}

#[derive(Clone, Debug)]
pub struct TemplateNode {
    pub span: Span,
    pub name: String,
    pub pipe: Option<PipeNode>,
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Text(node) => f.write_str(&node.text),
            Node::Comment(node) => write!(f, "{{{{{}}}}}", node.text),
            Node::Action(node) => write!(f, "{{{{{}}}}}", node.pipe),
            Node::List(node) => write!(f, "{node}"),
            Node::Pipe(node) => write!(f, "{node}"),
            Node::Command(node) => write!(f, "{node}"),
            Node::Field(node) => write!(f, "{node}"),
            Node::Chain(node) => {
                match node.node.as_ref() {
                    Node::Pipe(pipe) => write!(f, "({pipe})")?,
                    other => write!(f, "{other}")?,
                }
                for field in &node.field {
                    write!(f, ".{field}")?;
                }
                Ok(())
            }
            Node::Variable(node) => write!(f, "{node}"),
            Node::Identifier(node) => f.write_str(&node.ident),
            Node::Dot(_) => f.write_str("."),
            Node::Bool(node) => write!(f, "{}", node.value),
            Node::String(node) => f.write_str(&node.quoted),
            Node::Number(node) => f.write_str(&node.text),
            Node::Nil(_) => f.write_str("nil"),
            Node::If(node) => write_branch(f, "if", node),
            Node::Range(node) => write_branch(f, "range", node),
            Node::With(node) => write_branch(f, "with", node),
            Node::Template(node) => match &node.pipe {
                Some(pipe) => write!(f, "{{{{template {:?} {}}}}}", node.name, pipe),
                None => write!(f, "{{{{template {:?}}}}}", node.name),
            },
            Node::Break(_) => f.write_str("{{break}}"),
            Node::Continue(_) => f.write_str("{{continue}}"),
        }
    }
}

fn write_branch(f: &mut fmt::Formatter<'_>, keyword: &str, node: &BranchNode) -> fmt::Result {
    write!(f, "{{{{{keyword} {}}}}}{}", node.pipe, node.list)?;
    if let Some(else_list) = &node.else_list {
        write!(f, "{{{{else}}}}{else_list}")?;
    }
    f.write_str("{{end}}")
}

impl fmt::Display for ListNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in &self.nodes {
            write!(f, "{node}")?;
        }
        Ok(())
    }
}

impl fmt::Display for PipeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.decl.is_empty() {
            for (idx, var) in self.decl.iter().enumerate() {
                if idx > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{var}")?;
            }
            f.write_str(if self.is_assign { " = " } else { " := " })?;
        }
        for (idx, cmd) in self.cmds.iter().enumerate() {
            if idx > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{cmd}")?;
        }
        Ok(())
    }
}

impl fmt::Display for CommandNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, arg) in self.args.iter().enumerate() {
            if idx > 0 {
                f.write_str(" ")?;
            }
            match arg {
                Node::Pipe(pipe) => write!(f, "({pipe})")?,
                other => write!(f, "{other}")?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for FieldNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for ident in &self.ident {
            write!(f, ".{ident}")?;
        }
        Ok(())
    }
}

impl fmt::Display for VariableNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.ident.join("."))
    }
}
