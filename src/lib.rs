#![allow(clippy::collapsible_if)]

pub mod diagnostics;
pub mod language;

pub use language::{
    parser::{parse, parse_with_options, ParseOptions},
    reflect::{default_functions, HostTypes},
    typecheck::{check, check_with_options, CheckOptions, Functions, TypeError},
};

#[cfg(test)]
mod tests;
