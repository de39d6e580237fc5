//! Token types for the contract-language lexer.

use quill_core::Span;
use std::fmt;

/// A token from the source code.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The type of token, with its payload for literals and identifiers.
    pub kind: TokenKind,
    /// Location in source.
    pub span: Span,
}

impl Token {
    /// Create a new token.
    #[inline]
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// All token types of the contract language.
///
/// The lexer is indentation-aware: block structure arrives as `Newline`,
/// `Indent`, and `Dedent` tokens, suppressed inside brackets.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // =========================================
    // Literals and identifiers
    // =========================================
    /// Identifier: `balance`, `Transfer`
    Ident(String),
    /// Integer literal: `42`, `0xFF`
    Int(i128),
    /// String literal: `'hello'`, `"hello"`
    Str(String),
    /// Bytes literal: `b'\x01\x02'`
    Bytes(Vec<u8>),

    // =========================================
    // Keywords
    // =========================================
    Def,
    Class,
    Return,
    If,
    Elif,
    Else,
    While,
    For,
    In,
    Import,
    From,
    Pass,
    Break,
    Continue,
    Raise,
    And,
    Or,
    Not,
    True,
    False,
    None,

    // =========================================
    // Operators
    // =========================================
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Shl,
    Shr,
    Assign,
    EqEq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,

    // =========================================
    // Delimiters
    // =========================================
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Arrow,
    At,

    // =========================================
    // Layout
    // =========================================
    Newline,
    Indent,
    Dedent,
    Eof,
}

impl TokenKind {
    /// Look up a keyword, or `None` for a plain identifier.
    pub fn keyword(ident: &str) -> Option<TokenKind> {
        Some(match ident {
            "def" => TokenKind::Def,
            "class" => TokenKind::Class,
            "return" => TokenKind::Return,
            "if" => TokenKind::If,
            "elif" => TokenKind::Elif,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "for" => TokenKind::For,
            "in" => TokenKind::In,
            "import" => TokenKind::Import,
            "from" => TokenKind::From,
            "pass" => TokenKind::Pass,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "raise" => TokenKind::Raise,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "True" => TokenKind::True,
            "False" => TokenKind::False,
            "None" => TokenKind::None,
            _ => return Option::None,
        })
    }

    /// Short description for diagnostics.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(name) => format!("identifier '{name}'"),
            TokenKind::Int(v) => format!("integer {v}"),
            TokenKind::Str(_) => "string literal".to_string(),
            TokenKind::Bytes(_) => "bytes literal".to_string(),
            TokenKind::Newline => "end of line".to_string(),
            TokenKind::Indent => "indent".to_string(),
            TokenKind::Dedent => "dedent".to_string(),
            TokenKind::Eof => "end of file".to_string(),
            other => format!("{other:?}"),
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}
