use crate::language::{
    ast::*,
    errors::SyntaxError,
    lexer::lex,
    literal::{parse_number, unquote},
    span::Span,
    token::{Token, TokenKind},
};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone, Debug)]
pub struct ParseOptions {
    pub left_delim: String,
    pub right_delim: String,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            left_delim: "{{".into(),
            right_delim: "}}".into(),
        }
    }
}

impl ParseOptions {
    pub fn with_delims(mut self, left: impl Into<String>, right: impl Into<String>) -> Self {
        let (left, right) = (left.into(), right.into());
        if !left.is_empty() {
            self.left_delim = left;
        }
        if !right.is_empty() {
            self.right_delim = right;
        }
        self
    }
}

pub fn parse(name: &str, source: &str) -> Result<TemplateSet, SyntaxError> {
    parse_with_options(name, source, &ParseOptions::default())
}

/// Parses `source` into a set holding the top-level tree `name` plus every
/// `define`d and `block` tree.
pub fn parse_with_options(
    name: &str,
    source: &str,
    options: &ParseOptions,
) -> Result<TemplateSet, SyntaxError> {
    let tokens = lex(name, source, options)?;
    let parser = Parser {
        name,
        source: Arc::from(source),
        tokens,
        pos: 0,
        last_end: 0,
        range_depth: 0,
        set: TemplateSet::new(),
    };
    let set = parser.run()?;
    debug!(template = name, trees = set.len(), "parsed template source");
    Ok(set)
}

enum Item {
    Node(Node),
    Else(Span),
    End(Span),
}

struct Parser<'a> {
    name: &'a str,
    source: Arc<str>,
    tokens: Vec<Token>,
    pos: usize,
    last_end: usize,
    range_depth: usize,
    set: TemplateSet,
}

impl<'a> Parser<'a> {
    fn run(mut self) -> Result<TemplateSet, SyntaxError> {
        let mut nodes = Vec::new();
        while self.peek().kind != TokenKind::Eof {
            if self.peek().kind == TokenKind::LeftDelim {
                let mark = self.pos;
                let delim = self.next();
                if self.next_non_space().kind == TokenKind::Define {
                    self.parse_definition(delim.span.start)?;
                    continue;
                }
                self.pos = mark;
            }
            match self.text_or_action()? {
                Item::Node(node) => nodes.push(node),
                Item::Else(span) => return Err(self.error(span, "unexpected {{else}}")),
                Item::End(span) => return Err(self.error(span, "unexpected {{end}}")),
            }
        }
        let root = ListNode {
            span: Span::new(0, self.source.len()),
            nodes,
        };
        let tree = Tree::new(self.name, self.name, root, Arc::clone(&self.source));
        self.add_tree(tree, Span::new(0, 0))?;
        Ok(self.set)
    }

    fn error(&self, span: Span, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(self.name, message, span)
    }

    fn unexpected(&self, token: &Token, context: &str) -> SyntaxError {
        let what = match &token.kind {
            TokenKind::Eof => "EOF".to_string(),
            TokenKind::Text(_) | TokenKind::Comment(_) => token.kind.describe().to_string(),
            _ => format!("{:?}", token.text(&self.source)),
        };
        self.error(token.span, format!("unexpected {what} in {context}"))
    }

    fn peek(&self) -> &Token {
        let idx = self.pos.min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn next(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        self.last_end = token.span.end;
        token
    }

    fn backup(&mut self) {
        self.pos = self.pos.saturating_sub(1);
    }

    fn skip_spaces(&mut self) {
        while self.peek().kind == TokenKind::Space {
            self.next();
        }
    }

    fn next_non_space(&mut self) -> Token {
        self.skip_spaces();
        self.next()
    }

    fn peek_non_space(&mut self) -> &Token {
        self.skip_spaces();
        self.peek()
    }

    fn expect_right_delim(&mut self, context: &str) -> Result<Token, SyntaxError> {
        let token = self.next_non_space();
        if token.kind != TokenKind::RightDelim {
            return Err(self.unexpected(&token, context));
        }
        Ok(token)
    }

    fn add_tree(&mut self, tree: Tree, span: Span) -> Result<(), SyntaxError> {
        if let Some(existing) = self.set.get(&tree.name) {
            if tree.is_empty() {
                return Ok(());
            }
            if !existing.is_empty() {
                return Err(self.error(
                    span,
                    format!("template: multiple definition of template {:?}", tree.name),
                ));
            }
        }
        self.set.insert(tree);
        Ok(())
    }

    fn parse_definition(&mut self, start: usize) -> Result<(), SyntaxError> {
        let token = self.next_non_space();
        let name = self.parse_template_name(&token, "define clause")?;
        self.expect_right_delim("define clause")?;
        let (list, next) = self.item_list()?;
        if let Item::Else(span) = next {
            return Err(self.error(span, "unexpected {{else}} in define clause"));
        }
        let span = Span::new(start, self.last_end);
        let tree = Tree::new(name, self.name, list, Arc::clone(&self.source));
        self.add_tree(tree, span)
    }

    fn parse_template_name(&self, token: &Token, context: &str) -> Result<String, SyntaxError> {
        match token.kind {
            TokenKind::String | TokenKind::RawString => unquote(token.text(&self.source))
                .map_err(|message| self.error(token.span, message)),
            _ => Err(self.unexpected(token, context)),
        }
    }

    fn item_list(&mut self) -> Result<(ListNode, Item), SyntaxError> {
        let start = self.peek().span.start;
        let mut nodes = Vec::new();
        while self.peek_non_space().kind != TokenKind::Eof {
            match self.text_or_action()? {
                Item::Node(node) => nodes.push(node),
                other => {
                    let end = nodes.last().map(|node| node.span().end).unwrap_or(start);
                    return Ok((
                        ListNode {
                            span: Span::new(start, end),
                            nodes,
                        },
                        other,
                    ));
                }
            }
        }
        let eof = self.peek().clone();
        Err(self.error(eof.span, "unexpected EOF"))
    }

    fn text_or_action(&mut self) -> Result<Item, SyntaxError> {
        let token = self.next_non_space();
        match token.kind {
            TokenKind::Text(text) => Ok(Item::Node(Node::Text(TextNode {
                span: token.span,
                text,
            }))),
            TokenKind::Comment(text) => Ok(Item::Node(Node::Comment(CommentNode {
                span: token.span,
                text,
            }))),
            TokenKind::LeftDelim => self.action(token.span.start),
            _ => Err(self.unexpected(&token, "input")),
        }
    }

    fn action(&mut self, start: usize) -> Result<Item, SyntaxError> {
        let token = self.next_non_space();
        let node = match token.kind {
            TokenKind::Block => self.block_control(start)?,
            TokenKind::Break => self.loop_control(start, token.span, true)?,
            TokenKind::Continue => self.loop_control(start, token.span, false)?,
            TokenKind::Else => return self.else_control(start),
            TokenKind::End => {
                self.expect_right_delim("end")?;
                return Ok(Item::End(Span::new(start, self.last_end)));
            }
            TokenKind::If => {
                let branch = self.parse_control("if", start)?;
                Node::If(branch)
            }
            TokenKind::Range => {
                let branch = self.parse_control("range", start)?;
                Node::Range(branch)
            }
            TokenKind::With => {
                let branch = self.parse_control("with", start)?;
                Node::With(branch)
            }
            TokenKind::Template => self.template_control(start)?,
            _ => {
                self.backup();
                let pipe = self.pipeline("command", false)?;
                Node::Action(ActionNode {
                    span: Span::new(start, self.last_end),
                    pipe,
                })
            }
        };
        Ok(Item::Node(node))
    }

    fn loop_control(&mut self, start: usize, keyword_span: Span, is_break: bool) -> Result<Node, SyntaxError> {
        let keyword = if is_break { "break" } else { "continue" };
        self.expect_right_delim(keyword)?;
        if self.range_depth == 0 {
            return Err(self.error(
                keyword_span,
                format!("{{{{{keyword}}}}} outside {{{{range}}}}"),
            ));
        }
        let span = Span::new(start, self.last_end);
        Ok(if is_break {
            Node::Break(span)
        } else {
            Node::Continue(span)
        })
    }

    fn else_control(&mut self, start: usize) -> Result<Item, SyntaxError> {
        // `{{else if ...}}` and `{{else with ...}}` leave the keyword for the
        // enclosing control to pick up.
        if matches!(self.peek_non_space().kind, TokenKind::If | TokenKind::With) {
            return Ok(Item::Else(Span::new(start, self.last_end)));
        }
        self.expect_right_delim("else")?;
        Ok(Item::Else(Span::new(start, self.last_end)))
    }

    fn parse_control(&mut self, context: &str, start: usize) -> Result<BranchNode, SyntaxError> {
        let pipe = self.pipeline(context, false)?;
        if context == "range" {
            self.range_depth += 1;
        }
        let body = self.item_list();
        if context == "range" {
            self.range_depth -= 1;
        }
        let (list, next) = body?;
        let mut else_list = None;
        if let Item::Else(_) = next {
            let chained = match (context, &self.peek().kind) {
                ("if", TokenKind::If) => Some("if"),
                ("with", TokenKind::With) => Some("with"),
                _ => None,
            };
            if let Some(keyword) = chained {
                let token = self.next();
                let nested = self.parse_control(keyword, token.span.start)?;
                let nested = if keyword == "if" {
                    Node::If(nested)
                } else {
                    Node::With(nested)
                };
                else_list = Some(ListNode {
                    span: nested.span(),
                    nodes: vec![nested],
                });
            } else {
                let (list, next) = self.item_list()?;
                if let Item::Else(span) = next {
                    return Err(self.error(span, "expected end; found {{else}}"));
                }
                else_list = Some(list);
            }
        }
        Ok(BranchNode {
            span: Span::new(start, self.last_end),
            pipe,
            list,
            else_list,
        })
    }

    fn template_control(&mut self, start: usize) -> Result<Node, SyntaxError> {
        let token = self.next_non_space();
        let name = self.parse_template_name(&token, "template clause")?;
        let pipe = if self.next_non_space().kind == TokenKind::RightDelim {
            None
        } else {
            self.backup();
            Some(self.pipeline("template clause", false)?)
        };
        Ok(Node::Template(TemplateNode {
            span: Span::new(start, self.last_end),
            name,
            pipe,
        }))
    }

    /// `{{block "name" pipe}}body{{end}}` defines `name` and invokes it in place.
    fn block_control(&mut self, start: usize) -> Result<Node, SyntaxError> {
        let token = self.next_non_space();
        let name = self.parse_template_name(&token, "block clause")?;
        let pipe = self.pipeline("block clause", false)?;
        let invocation_end = self.last_end;
        let (list, next) = self.item_list()?;
        if let Item::Else(span) = next {
            return Err(self.error(span, "unexpected {{else}} in block clause"));
        }
        let tree = Tree::new(name.clone(), self.name, list, Arc::clone(&self.source));
        self.add_tree(tree, Span::new(start, self.last_end))?;
        Ok(Node::Template(TemplateNode {
            span: Span::new(start, invocation_end),
            name,
            pipe: Some(pipe),
        }))
    }

    fn pipeline(&mut self, context: &str, in_parens: bool) -> Result<PipeNode, SyntaxError> {
        let start = self.peek_non_space().span.start;
        let mut decl = Vec::new();
        let mut is_assign = false;
        loop {
            let mark = self.pos;
            let TokenKind::Variable(name) = self.peek_non_space().kind.clone() else {
                break;
            };
            let var = self.next();
            let following = self.peek_non_space().kind.clone();
            match following {
                TokenKind::Assign | TokenKind::Declare => {
                    is_assign = self.next().kind == TokenKind::Assign;
                    decl.push(VariableNode {
                        span: var.span,
                        ident: vec![name],
                    });
                    break;
                }
                TokenKind::Comma => {
                    let comma = self.next();
                    decl.push(VariableNode {
                        span: var.span,
                        ident: vec![name],
                    });
                    if context == "range" && decl.len() < 2 {
                        match self.peek_non_space().kind {
                            TokenKind::Variable(_) | TokenKind::RightDelim | TokenKind::RightParen => {
                                continue
                            }
                            _ => {
                                return Err(
                                    self.error(comma.span, "range can only initialize variables")
                                )
                            }
                        }
                    }
                    return Err(self.error(
                        comma.span,
                        format!("too many declarations in {context}"),
                    ));
                }
                _ if decl.is_empty() => {
                    self.pos = mark;
                    break;
                }
                _ => {
                    let token = self.peek().clone();
                    return Err(self.unexpected(&token, context));
                }
            }
        }

        let mut cmds: Vec<CommandNode> = Vec::new();
        loop {
            let token = self.next_non_space();
            match token.kind {
                TokenKind::RightDelim if !in_parens => break,
                TokenKind::RightParen if in_parens => break,
                TokenKind::Bool(_)
                | TokenKind::CharConstant
                | TokenKind::Dot
                | TokenKind::Field(_)
                | TokenKind::Identifier(_)
                | TokenKind::Number
                | TokenKind::Nil
                | TokenKind::RawString
                | TokenKind::String
                | TokenKind::Variable(_)
                | TokenKind::LeftParen => {
                    self.backup();
                    cmds.push(self.command()?);
                }
                _ => return Err(self.unexpected(&token, context)),
            }
        }
        let end = cmds.last().map(|cmd| cmd.span.end).unwrap_or(start);
        let pipe = PipeNode {
            span: Span::new(start, end.max(start)),
            is_assign,
            decl,
            cmds,
        };
        self.check_pipeline(&pipe, context)?;
        Ok(pipe)
    }

    fn check_pipeline(&self, pipe: &PipeNode, context: &str) -> Result<(), SyntaxError> {
        if pipe.cmds.is_empty() {
            return Err(self.error(pipe.span, format!("missing value for {context}")));
        }
        for (idx, cmd) in pipe.cmds.iter().enumerate().skip(1) {
            if let Some(
                first @ (Node::Bool(_)
                | Node::Dot(_)
                | Node::Nil(_)
                | Node::Number(_)
                | Node::String(_)),
            ) = cmd.args.first()
            {
                return Err(self.error(
                    cmd.span,
                    format!(
                        "non executable command in pipeline stage {}: {first}",
                        idx + 1
                    ),
                ));
            }
        }
        Ok(())
    }

    fn command(&mut self) -> Result<CommandNode, SyntaxError> {
        let mut args = Vec::new();
        loop {
            self.skip_spaces();
            if let Some(operand) = self.operand()? {
                args.push(operand);
            }
            let token = self.next();
            match token.kind {
                TokenKind::Space => continue,
                TokenKind::RightDelim | TokenKind::RightParen => self.backup(),
                TokenKind::Pipe => {}
                _ => return Err(self.unexpected(&token, "operand")),
            }
            break;
        }
        let (Some(first), Some(last)) = (args.first(), args.last()) else {
            let token = self.peek().clone();
            return Err(self.error(token.span, "empty command"));
        };
        let span = first.span().join(last.span());
        Ok(CommandNode { span, args })
    }

    fn operand(&mut self) -> Result<Option<Node>, SyntaxError> {
        let Some(node) = self.term()? else {
            return Ok(None);
        };
        if !matches!(self.peek().kind, TokenKind::Field(_)) {
            return Ok(Some(node));
        }
        let mut fields = Vec::new();
        let mut span = node.span();
        while let TokenKind::Field(name) = self.peek().kind.clone() {
            let token = self.next();
            span = span.join(token.span);
            fields.push(name);
        }
        let node = match node {
            Node::Field(mut field) => {
                field.ident.extend(fields);
                field.span = span;
                Node::Field(field)
            }
            Node::Variable(mut var) => {
                var.ident.extend(fields);
                var.span = span;
                Node::Variable(var)
            }
            Node::Bool(_) | Node::String(_) | Node::Number(_) | Node::Nil(_) | Node::Dot(_) => {
                return Err(self.error(span, format!("unexpected . after term {node}")));
            }
            other => Node::Chain(ChainNode {
                span,
                node: Box::new(other),
                field: fields,
            }),
        };
        Ok(Some(node))
    }

    fn term(&mut self) -> Result<Option<Node>, SyntaxError> {
        let token = self.next_non_space();
        let span = token.span;
        let node = match token.kind {
            TokenKind::Identifier(ident) => Node::Identifier(IdentifierNode { span, ident }),
            TokenKind::Dot => Node::Dot(span),
            TokenKind::Nil => Node::Nil(span),
            TokenKind::Variable(name) => Node::Variable(VariableNode {
                span,
                ident: vec![name],
            }),
            TokenKind::Field(name) => Node::Field(FieldNode {
                span,
                ident: vec![name],
            }),
            TokenKind::Bool(value) => Node::Bool(BoolNode { span, value }),
            TokenKind::CharConstant | TokenKind::Number => {
                let text = token.text(&self.source);
                let is_char = token.kind == TokenKind::CharConstant;
                let mut number =
                    parse_number(text, is_char).map_err(|message| self.error(span, message))?;
                number.span = span;
                Node::Number(number)
            }
            TokenKind::LeftParen => {
                let mut pipe = self.pipeline("parenthesized pipeline", true)?;
                pipe.span = Span::new(span.start, self.last_end);
                Node::Pipe(pipe)
            }
            TokenKind::String | TokenKind::RawString => {
                let quoted = token.text(&self.source).to_string();
                let text = unquote(&quoted).map_err(|message| self.error(span, message))?;
                Node::String(StringNode { span, quoted, text })
            }
            _ => {
                self.backup();
                return Ok(None);
            }
        };
        Ok(Some(node))
    }
}
