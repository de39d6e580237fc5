//! Lexical analysis: tokens and the indentation-aware lexer.

mod lexer;
mod token;

pub use lexer::Lexer;
pub use token::{Token, TokenKind};
