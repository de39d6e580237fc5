//! Operator enumeration shared by the parser, type analyser, and code
//! generator.
//!
//! Operators are resolved against the left operand's type during type
//! analysis; membership tests (`in`) are the one exception, resolving
//! against the container operand.

use std::fmt;

/// Binary operators of the contract language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    /// Membership test: `x in container`.
    In,
    /// Negated membership test: `x not in container`.
    NotIn,
    /// Short-circuit boolean and.
    And,
    /// Short-circuit boolean or.
    Or,
}

impl BinaryOp {
    /// Whether this operator produces a boolean regardless of operand types.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtE
                | BinaryOp::Gt
                | BinaryOp::GtE
                | BinaryOp::In
                | BinaryOp::NotIn
        )
    }

    /// The source-level spelling, used in diagnostics.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "//",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtE => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtE => ">=",
            BinaryOp::In => "in",
            BinaryOp::NotIn => "not in",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Unary operators of the contract language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Arithmetic negation: `-x`.
    Neg,
    /// Arithmetic identity: `+x`.
    Pos,
    /// Bitwise complement: `~x`.
    BitNot,
    /// Boolean negation: `not x`.
    Not,
}

impl UnaryOp {
    /// The source-level spelling, used in diagnostics.
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Pos => "+",
            UnaryOp::BitNot => "~",
            UnaryOp::Not => "not",
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}
