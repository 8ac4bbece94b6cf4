use crate::language::span::Span;

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    /// Source text the token was lexed from.
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.span.start..self.span.end]
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Text(String),
    Comment(String),
    LeftDelim,
    RightDelim,
    Space,

    Bool(bool),
    CharConstant,
    Number,
    String,
    RawString,
    Field(String),
    Variable(String),
    Identifier(String),

    Assign,
    Declare,
    Pipe,
    LeftParen,
    RightParen,
    Comma,
    Dot,

    Block,
    Break,
    Continue,
    Define,
    Else,
    End,
    If,
    Nil,
    Range,
    Template,
    With,

    Eof,
}

impl TokenKind {
    pub fn keyword(word: &str) -> Option<TokenKind> {
        let kind = match word {
            "block" => TokenKind::Block,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "define" => TokenKind::Define,
            "else" => TokenKind::Else,
            "end" => TokenKind::End,
            "if" => TokenKind::If,
            "nil" => TokenKind::Nil,
            "range" => TokenKind::Range,
            "template" => TokenKind::Template,
            "with" => TokenKind::With,
            "true" => TokenKind::Bool(true),
            "false" => TokenKind::Bool(false),
            _ => return None,
        };
        Some(kind)
    }

    pub fn describe(&self) -> &'static str {
        match self {
            TokenKind::Text(_) => "text",
            TokenKind::Comment(_) => "comment",
            TokenKind::LeftDelim => "left delimiter",
            TokenKind::RightDelim => "right delimiter",
            TokenKind::Space => "space",
            TokenKind::Bool(_) => "boolean",
            TokenKind::CharConstant => "character constant",
            TokenKind::Number => "number",
            TokenKind::String => "string",
            TokenKind::RawString => "raw string",
            TokenKind::Field(_) => "field",
            TokenKind::Variable(_) => "variable",
            TokenKind::Identifier(_) => "identifier",
            TokenKind::Assign => "\"=\"",
            TokenKind::Declare => "\":=\"",
            TokenKind::Pipe => "\"|\"",
            TokenKind::LeftParen => "\"(\"",
            TokenKind::RightParen => "\")\"",
            TokenKind::Comma => "\",\"",
            TokenKind::Dot => "\".\"",
            TokenKind::Block => "<block>",
            TokenKind::Break => "<break>",
            TokenKind::Continue => "<continue>",
            TokenKind::Define => "<define>",
            TokenKind::Else => "<else>",
            TokenKind::End => "<end>",
            TokenKind::If => "<if>",
            TokenKind::Nil => "<nil>",
            TokenKind::Range => "<range>",
            TokenKind::Template => "<template>",
            TokenKind::With => "<with>",
            TokenKind::Eof => "EOF",
        }
    }
}
