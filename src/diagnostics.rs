use crate::language::{errors::SyntaxError, typecheck::TypeError};
use miette::{Diagnostic, GraphicalReportHandler, GraphicalTheme, NamedSource, Report, SourceSpan};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
pub struct SyntaxDiagnostic {
    #[source_code]
    src: NamedSource,
    #[label("{label}")]
    span: SourceSpan,
    #[help]
    help: Option<String>,
    message: String,
    label: String,
}

impl SyntaxDiagnostic {
    pub fn from_error(source: &str, err: &SyntaxError) -> Self {
        Self {
            src: NamedSource::new(err.name.clone(), source.to_string()),
            span: err.to_source_span(),
            help: err.help.clone(),
            message: err.to_string(),
            label: err.message.clone(),
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
#[error("[{error_code}] {message}")]
pub struct TypeDiagnostic {
    #[source_code]
    src: NamedSource,
    #[label("{label}")]
    span: SourceSpan,
    #[help]
    help: Option<String>,
    error_code: &'static str,
    message: String,
    label: String,
}

impl TypeDiagnostic {
    pub fn from_error(err: &TypeError) -> Self {
        Self {
            src: NamedSource::new(err.name.clone(), err.source_text.to_string()),
            span: err.span.into(),
            help: Some(format!("while executing {:?} at <{}>", err.name, err.context)),
            error_code: err.code(),
            message: err.to_string(),
            label: err.kind.to_string(),
        }
    }
}

fn render(diagnostic: &dyn Diagnostic) -> String {
    let handler = GraphicalReportHandler::new_themed(GraphicalTheme::unicode_nocolor()).with_width(400);
    let mut out = String::new();
    match handler.render_report(&mut out, diagnostic) {
        Ok(()) => out,
        Err(_) => diagnostic.to_string(),
    }
}

/// Plain-text rendering with the offending source highlighted.
pub fn render_syntax_error(source: &str, err: &SyntaxError) -> String {
    render(&SyntaxDiagnostic::from_error(source, err))
}

pub fn render_type_error(err: &TypeError) -> String {
    render(&TypeDiagnostic::from_error(err))
}

pub fn emit_syntax_error(source: &str, err: &SyntaxError) {
    eprintln!("{:?}", Report::new(SyntaxDiagnostic::from_error(source, err)));
}

pub fn emit_type_error(err: &TypeError) {
    eprintln!("{:?}", Report::new(TypeDiagnostic::from_error(err)));
}
