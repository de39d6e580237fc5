//! Parser for the Quill contract language.
//!
//! A Python-like surface: indentation-based blocks, optional type
//! annotations, decorators, classes with single inheritance. The lexer
//! surfaces layout as `Indent`/`Dedent` tokens and the parser builds an
//! owned AST with a span on every node.
//!
//! ## Modules
//!
//! - [`lexer`]: tokens and the indentation-aware lexer
//! - [`ast`]: the owned syntax tree
//! - [`parser`]: recursive-descent parsing, entry point [`parse_module`]

pub mod ast;
pub mod lexer;
pub mod parser;

pub use parser::parse_module;

// Re-export the error types callers match on.
pub use quill_core::{LexError, ParseError, ParseErrorKind};
