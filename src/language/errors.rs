use crate::language::span::Span;
use miette::SourceSpan;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq)]
#[error("{name}: {message}")]
pub struct SyntaxError {
    pub name: String,
    pub message: String,
    pub span: Span,
    pub help: Option<String>,
}

impl SyntaxError {
    pub fn new(name: impl Into<String>, message: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            span,
            help: None,
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn to_source_span(&self) -> SourceSpan {
        self.span.into()
    }
}
