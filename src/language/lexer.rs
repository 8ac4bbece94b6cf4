use crate::language::{
    errors::SyntaxError,
    parser::ParseOptions,
    span::Span,
    token::{Token, TokenKind},
};
use nom::{
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, one_of},
    combinator::{opt, recognize},
    sequence::{pair, tuple},
    IResult, Parser as NomParser,
};

const LEFT_COMMENT: &str = "/*";
const RIGHT_COMMENT: &str = "*/";

pub fn lex(name: &str, source: &str, options: &ParseOptions) -> Result<Vec<Token>, SyntaxError> {
    let lexer = Lexer::new(name, source, options);
    lexer.run()
}

struct Lexer<'a> {
    name: &'a str,
    src: &'a str,
    left: &'a str,
    right: &'a str,
    offset: usize,
    paren_depth: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(name: &'a str, src: &'a str, options: &'a ParseOptions) -> Self {
        Self {
            name,
            src,
            left: &options.left_delim,
            right: &options.right_delim,
            offset: 0,
            paren_depth: 0,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, SyntaxError> {
        while self.offset < self.src.len() {
            let rest = &self.src[self.offset..];
            let Some(found) = rest.find(self.left) else {
                self.push_text(self.offset, self.src.len());
                self.offset = self.src.len();
                break;
            };
            let delim_start = self.offset + found;
            let after_delim = delim_start + self.left.len();
            let trim = has_left_trim_marker(&self.src[after_delim..]);
            let text_end = if trim {
                self.offset + self.src[self.offset..delim_start].trim_end_matches(is_space).len()
            } else {
                delim_start
            };
            self.push_text(self.offset, text_end);

            let after_marker = if trim { after_delim + 2 } else { after_delim };
            if self.src[after_marker..].starts_with(LEFT_COMMENT) {
                self.lex_comment(delim_start, after_marker)?;
            } else {
                self.push_token(TokenKind::LeftDelim, delim_start, after_marker);
                self.offset = after_marker;
                self.lex_inside_action(delim_start)?;
            }
        }
        self.push_token(TokenKind::Eof, self.offset, self.offset);
        Ok(self.tokens)
    }

    fn error(&self, start: usize, end: usize, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(self.name, message, Span::new(start, end))
    }

    fn push_token(&mut self, kind: TokenKind, start: usize, end: usize) {
        self.tokens.push(Token {
            kind,
            span: Span::new(start, end),
        });
    }

    fn push_text(&mut self, start: usize, end: usize) {
        if end > start {
            let text = self.src[start..end].to_string();
            self.push_token(TokenKind::Text(text), start, end);
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.offset..].chars().next()
    }

    fn peek_at(&self, skip: usize) -> Option<char> {
        self.src[self.offset..].chars().nth(skip)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.offset += ch.len_utf8();
        Some(ch)
    }

    /// Returns `(is_delim, trims_following_text)` for the current offset.
    fn at_right_delim(&self) -> (bool, bool) {
        let rest = &self.src[self.offset..];
        if has_right_trim_marker(rest) && rest[2..].starts_with(self.right) {
            return (true, true);
        }
        (rest.starts_with(self.right), false)
    }

    /// Consumes the right delimiter (and trim marker) at the current offset,
    /// returning the offset just past it.
    fn consume_right_delim(&mut self, trim: bool) -> usize {
        let end = self.offset + self.right.len() + if trim { 2 } else { 0 };
        self.offset = end;
        if trim {
            let rest = &self.src[self.offset..];
            self.offset += rest.len() - rest.trim_start_matches(is_space).len();
        }
        end
    }

    fn lex_comment(&mut self, delim_start: usize, comment_start: usize) -> Result<(), SyntaxError> {
        let body = &self.src[comment_start + LEFT_COMMENT.len()..];
        let Some(close) = body.find(RIGHT_COMMENT) else {
            return Err(self.error(delim_start, self.src.len(), "unclosed comment"));
        };
        let comment_end = comment_start + LEFT_COMMENT.len() + close + RIGHT_COMMENT.len();
        self.offset = comment_end;
        let (is_delim, trim) = self.at_right_delim();
        if !is_delim {
            return Err(self.error(
                delim_start,
                comment_end,
                "comment ends before closing delimiter",
            ));
        }
        let text = self.src[comment_start..comment_end].to_string();
        let end = self.consume_right_delim(trim);
        self.push_token(TokenKind::Comment(text), delim_start, end);
        Ok(())
    }

    fn lex_inside_action(&mut self, action_start: usize) -> Result<(), SyntaxError> {
        loop {
            let (is_delim, trim) = self.at_right_delim();
            if is_delim {
                if self.paren_depth > 0 {
                    return Err(self.error(action_start, self.offset, "unclosed left paren"));
                }
                let start = self.offset;
                let end = self.consume_right_delim(trim);
                self.push_token(TokenKind::RightDelim, start, end);
                return Ok(());
            }
            let start = self.offset;
            let Some(ch) = self.peek() else {
                return Err(self.error(action_start, self.offset, "unclosed action"));
            };
            match ch {
                ch if is_space(ch) => self.lex_space(),
                '=' => {
                    self.bump();
                    self.push_token(TokenKind::Assign, start, self.offset);
                }
                ':' => {
                    self.bump();
                    if self.peek() != Some('=') {
                        return Err(self.error(start, self.offset, "expected :="));
                    }
                    self.bump();
                    self.push_token(TokenKind::Declare, start, self.offset);
                }
                '|' => {
                    self.bump();
                    self.push_token(TokenKind::Pipe, start, self.offset);
                }
                ',' => {
                    self.bump();
                    self.push_token(TokenKind::Comma, start, self.offset);
                }
                '(' => {
                    self.bump();
                    self.paren_depth += 1;
                    self.push_token(TokenKind::LeftParen, start, self.offset);
                }
                ')' => {
                    self.bump();
                    if self.paren_depth == 0 {
                        return Err(self.error(start, self.offset, "unexpected right paren"));
                    }
                    self.paren_depth -= 1;
                    self.push_token(TokenKind::RightParen, start, self.offset);
                }
                '"' => self.lex_quote()?,
                '`' => self.lex_raw_quote()?,
                '\'' => self.lex_char()?,
                '$' => {
                    self.bump();
                    self.lex_field_or_variable(start, true)?;
                }
                '.' if self.peek_at(1).is_some_and(|next| next.is_ascii_digit()) => {
                    self.lex_number()?
                }
                '.' => {
                    self.bump();
                    self.lex_field_or_variable(start, false)?;
                }
                '+' | '-' | '0'..='9' => self.lex_number()?,
                ch if is_alphanumeric(ch) => self.lex_identifier()?,
                other => {
                    return Err(self.error(
                        start,
                        start + other.len_utf8(),
                        format!("unrecognized character in action: {other:?}"),
                    ))
                }
            }
        }
    }

    fn lex_space(&mut self) {
        let start = self.offset;
        while let Some(ch) = self.peek() {
            if !is_space(ch) {
                break;
            }
            let rest = &self.src[self.offset..];
            if has_right_trim_marker(rest) && rest[2..].starts_with(self.right) {
                break;
            }
            self.bump();
        }
        if self.offset > start {
            self.push_token(TokenKind::Space, start, self.offset);
        }
    }

    fn at_terminator(&self) -> bool {
        match self.peek() {
            None => true,
            Some(ch) if is_space(ch) => true,
            Some('.' | ',' | '|' | ':' | ')' | '(' | '=') => true,
            Some(_) => self.src[self.offset..].starts_with(self.right),
        }
    }

    fn scan_word(&mut self) {
        while let Some(ch) = self.peek() {
            if !is_alphanumeric(ch) {
                break;
            }
            self.bump();
        }
    }

    fn lex_field_or_variable(&mut self, start: usize, variable: bool) -> Result<(), SyntaxError> {
        if self.at_terminator() {
            let kind = if variable {
                TokenKind::Variable("$".into())
            } else {
                TokenKind::Dot
            };
            self.push_token(kind, start, self.offset);
            return Ok(());
        }
        let word_start = self.offset;
        self.scan_word();
        if !self.at_terminator() {
            return Err(self.bad_character());
        }
        let kind = if variable {
            TokenKind::Variable(self.src[start..self.offset].to_string())
        } else {
            TokenKind::Field(self.src[word_start..self.offset].to_string())
        };
        self.push_token(kind, start, self.offset);
        Ok(())
    }

    fn lex_identifier(&mut self) -> Result<(), SyntaxError> {
        let start = self.offset;
        self.scan_word();
        if !self.at_terminator() {
            return Err(self.bad_character());
        }
        let word = &self.src[start..self.offset];
        let kind = TokenKind::keyword(word).unwrap_or_else(|| TokenKind::Identifier(word.to_string()));
        self.push_token(kind, start, self.offset);
        Ok(())
    }

    fn bad_character(&self) -> SyntaxError {
        let ch = self.peek().unwrap_or(' ');
        self.error(
            self.offset,
            self.offset + ch.len_utf8(),
            format!("bad character {ch:?}"),
        )
    }

    fn lex_number(&mut self) -> Result<(), SyntaxError> {
        let start = self.offset;
        let rest = &self.src[start..];
        let Ok((remaining, _)) = number_literal(rest) else {
            return Err(self.error(start, start + 1, "bad number syntax"));
        };
        self.offset = start + (rest.len() - remaining.len());

        // Complex constants such as 1+2i carry no spaces and end in 'i'.
        if matches!(self.peek(), Some('+' | '-')) {
            let tail = &self.src[self.offset..];
            match number_literal(tail) {
                Ok((remaining, imaginary)) if imaginary.ends_with('i') => {
                    self.offset += tail.len() - remaining.len();
                }
                _ => {
                    return Err(self.error(
                        start,
                        self.offset + 1,
                        format!("bad number syntax: {:?}", &self.src[start..self.offset + 1]),
                    ))
                }
            }
        }
        if self.peek().is_some_and(is_alphanumeric) {
            let end = self.offset + self.peek().map(char::len_utf8).unwrap_or(0);
            return Err(self.error(
                start,
                end,
                format!("bad number syntax: {:?}", &self.src[start..end]),
            ));
        }
        self.push_token(TokenKind::Number, start, self.offset);
        Ok(())
    }

    fn lex_quote(&mut self) -> Result<(), SyntaxError> {
        self.lex_escaped('"', TokenKind::String, "unterminated quoted string")
    }

    fn lex_char(&mut self) -> Result<(), SyntaxError> {
        self.lex_escaped('\'', TokenKind::CharConstant, "unterminated character constant")
    }

    fn lex_escaped(
        &mut self,
        quote: char,
        kind: TokenKind,
        unterminated: &str,
    ) -> Result<(), SyntaxError> {
        let start = self.offset;
        self.bump();
        loop {
            match self.bump() {
                Some('\\') => {
                    if matches!(self.bump(), None | Some('\n')) {
                        return Err(self.error(start, self.offset, unterminated));
                    }
                }
                None | Some('\n') => return Err(self.error(start, self.offset, unterminated)),
                Some(ch) if ch == quote => break,
                Some(_) => {}
            }
        }
        self.push_token(kind, start, self.offset);
        Ok(())
    }

    fn lex_raw_quote(&mut self) -> Result<(), SyntaxError> {
        let start = self.offset;
        self.bump();
        let Some(close) = self.src[self.offset..].find('`') else {
            return Err(self.error(start, self.src.len(), "unterminated raw quoted string"));
        };
        self.offset += close + 1;
        self.push_token(TokenKind::RawString, start, self.offset);
        Ok(())
    }
}

fn is_space(ch: char) -> bool {
    matches!(ch, ' ' | '\t' | '\r' | '\n')
}

fn is_alphanumeric(ch: char) -> bool {
    ch == '_' || ch.is_alphanumeric()
}

fn has_left_trim_marker(rest: &str) -> bool {
    let mut chars = rest.chars();
    chars.next() == Some('-') && chars.next().is_some_and(is_space)
}

fn has_right_trim_marker(rest: &str) -> bool {
    let mut chars = rest.chars();
    chars.next().is_some_and(is_space) && chars.next() == Some('-')
}

fn digits(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_digit() || c == '_')(input)
}

fn decimal_exponent(input: &str) -> IResult<&str, &str> {
    recognize(tuple((one_of("eE"), opt(one_of("+-")), digits))).parse(input)
}

fn binary_exponent(input: &str) -> IResult<&str, &str> {
    recognize(tuple((one_of("pP"), opt(one_of("+-")), digits))).parse(input)
}

fn prefixed_number(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        char('0'),
        one_of("xXoObB"),
        take_while(|c: char| c.is_ascii_hexdigit() || c == '_' || c == '.'),
        opt(binary_exponent),
    )))
    .parse(input)
}

fn decimal_number(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((
            recognize(pair(digits, opt(pair(char('.'), opt(digits))))),
            recognize(pair(char('.'), digits)),
        )),
        opt(decimal_exponent),
    ))
    .parse(input)
}

/// Recognises the longest numeric literal prefix: sign, radix prefix,
/// fraction, exponent and imaginary suffix.
pub(crate) fn number_literal(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        opt(one_of("+-")),
        alt((prefixed_number, decimal_number)),
        opt(char('i')),
    )))
    .parse(input)
}
