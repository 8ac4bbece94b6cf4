pub mod ast;
pub mod errors;
pub mod lexer;
pub mod literal;
pub mod parser;
pub mod reflect;
pub mod span;
pub mod token;
pub mod typecheck;
pub mod types;
