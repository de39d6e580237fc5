//! Unified error types for the Quill compiler.
//!
//! This module provides a consistent error hierarchy for all phases of
//! compilation: lexing, parsing, semantic analysis, and code generation.
//!
//! ## Error Hierarchy
//!
//! ```text
//! LexError        - Lexer/tokenization errors
//! ParseError      - Parser errors (with ParseErrorKind)
//! CompilerError   - Semantic analysis and code generation errors
//! CompilerWarning - Non-fatal findings, recorded but never aborting
//! NotLoadedError  - The single signal the façade raises on failure
//! ```
//!
//! `CompilerError` and `CompilerWarning` are the two parallel taxonomies
//! of §semantic diagnostics; both carry a [`Span`] and are aggregated per
//! compilation by [`crate::Diagnostics`].

use thiserror::Error;

use crate::Span;

// ============================================================================
// Lexer Errors
// ============================================================================

/// Errors that occur during lexical analysis (tokenization).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexError {
    /// An unexpected character was encountered.
    #[error("unexpected character '{ch}' at {span}")]
    UnexpectedChar { ch: char, span: Span },

    /// A string or bytes literal was not properly terminated.
    #[error("unterminated string at {span}")]
    UnterminatedString { span: Span },

    /// A numeric literal could not be parsed.
    #[error("invalid number at {span}: {detail}")]
    InvalidNumber { span: Span, detail: String },

    /// Indentation did not match any enclosing block.
    #[error("inconsistent indentation at {span}")]
    BadIndentation { span: Span },
}

impl LexError {
    /// Get the span where this error occurred.
    pub fn span(&self) -> Span {
        match self {
            LexError::UnexpectedChar { span, .. } => *span,
            LexError::UnterminatedString { span } => *span,
            LexError::InvalidNumber { span, .. } => *span,
            LexError::BadIndentation { span } => *span,
        }
    }
}

// ============================================================================
// Parse Errors
// ============================================================================

/// Categories of parse errors, for structured error recovery and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseErrorKind {
    /// A specific token was expected but not found.
    ExpectedToken,
    /// An unexpected token was encountered.
    UnexpectedToken,
    /// Unexpected end of file.
    UnexpectedEof,
    /// An expression was expected.
    ExpectedExpression,
    /// A type annotation was expected.
    ExpectedType,
    /// An indented block was expected.
    ExpectedBlock,
    /// The statement is invalid at this position.
    InvalidStatement,
    /// An identifier was expected.
    ExpectedIdentifier,
    /// A decorator is not recognized.
    UnknownDecorator,
}

/// A parse error with its category, message, and source location.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} at {span}")]
pub struct ParseError {
    /// The category of error.
    pub kind: ParseErrorKind,
    /// Human-readable description.
    pub message: String,
    /// Where the error occurred.
    pub span: Span,
}

impl ParseError {
    /// Create a new parse error.
    pub fn new(kind: ParseErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            message: message.into(),
            span,
        }
    }
}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        ParseError::new(ParseErrorKind::UnexpectedToken, err.to_string(), err.span())
    }
}

// ============================================================================
// Compiler Errors
// ============================================================================

/// The kind of member a standard requires, used by
/// [`CompilerError::MissingStandardDefinition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardMemberKind {
    Method,
    Event,
}

impl std::fmt::Display for StandardMemberKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StandardMemberKind::Method => f.write_str("method"),
            StandardMemberKind::Event => f.write_str("event"),
        }
    }
}

/// Errors produced by semantic analysis or code generation.
///
/// Any recorded error aborts successful compilation: bytecode emission is
/// refused and the façade raises [`NotLoadedError`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompilerError {
    /// A lexical or syntactic error, carried into the shared diagnostics.
    #[error("syntax error: {message} at {span}")]
    Syntax { message: String, span: Span },

    /// Two files import each other, directly or transitively.
    #[error("circular import of '{file}' at {span}")]
    CircularImport { file: String, span: Span },

    /// The same identifier declared twice in one scope, unmergeably.
    #[error("duplicated identifier '{name}' at {span}")]
    DuplicatedIdentifier { name: String, span: Span },

    /// Two ABI entries would share a manifest identifier.
    #[error("duplicated manifest identifier '{name}' at {span}")]
    DuplicatedManifestIdentifier { name: String, span: Span },

    /// An operator applied to the wrong number of operands.
    #[error("operator '{operator}' expects {expected} operands, found {found} at {span}")]
    WrongOperandCount {
        operator: String,
        expected: usize,
        found: usize,
        span: Span,
    },

    /// A builtin symbol used in a way it does not support.
    #[error("invalid usage of builtin '{name}' at {span}")]
    InvalidBuiltinUsage { name: String, span: Span },

    /// A construct the target VM cannot express.
    #[error("'{symbol}' is not a supported operation at {span}")]
    NotSupportedOperation { symbol: String, span: Span },

    /// An unexpected internal failure, wrapping its cause.
    #[error("internal compiler error: {cause}")]
    InternalError { cause: String },

    /// A builtin was registered with a signature the analyser cannot honor.
    #[error("internal signature mismatch for '{method}' at {span}")]
    InternalIncorrectSignature { method: String, span: Span },

    /// The metadata function is declared but missing required content.
    #[error("metadata implementation for '{symbol}' is missing at {span}")]
    MetadataImplementationMissing { symbol: String, span: Span },

    /// The metadata function exists but has the wrong shape.
    #[error("incorrect metadata implementation for '{symbol}' at {span}")]
    MetadataImplementationIncorrect { symbol: String, span: Span },

    /// A metadata declaration lacks required information.
    #[error("metadata information '{info}' is missing at {span}")]
    MetadataInformationMissing { info: String, span: Span },

    /// A value of one type where another was required.
    #[error("expected type '{expected}', got '{found}' at {span}")]
    MismatchedTypes {
        expected: String,
        found: String,
        span: Span,
    },

    /// A derived class `__init__` without an explicit base-initializer call.
    #[error("missing call to super().__init__() in class '{class}' at {span}")]
    MissingInitCall { class: String, span: Span },

    /// A non-void function with a path that does not return.
    #[error("function '{function}' is missing a return statement at {span}")]
    MissingReturnStatement { function: String, span: Span },

    /// A declared standard lacks a required member.
    #[error("standard '{standard}' requires {kind} '{member}' at {span}")]
    MissingStandardDefinition {
        standard: String,
        member: String,
        kind: StandardMemberKind,
        span: Span,
    },

    /// More arguments than the callable's parameters.
    #[error("unexpected argument to '{callable}' at {span}")]
    UnexpectedArgument { callable: String, span: Span },

    /// Fewer arguments than the callable's required parameters.
    #[error("parameter '{parameter}' of '{callable}' unfilled at {span}")]
    UnfilledArgument {
        callable: String,
        parameter: String,
        span: Span,
    },

    /// A name that resolves to nothing in scope.
    #[error("unresolved reference '{name}' at {span}")]
    UnresolvedReference { name: String, span: Span },

    /// An operator the operand's type does not define.
    #[error("type '{type_name}' does not support operator '{operator}' at {span}")]
    UnresolvedOperation {
        type_name: String,
        operator: String,
        span: Span,
    },

    /// A return statement carrying more than one value.
    #[error("too many returned values at {span}")]
    TooManyReturns { span: Span },

    /// A function or module exceeding the VM's 255-slot frame limit.
    #[error("'{symbol}' needs {count} slots, the limit is 255, at {span}")]
    TooManySlots {
        symbol: String,
        count: usize,
        span: Span,
    },

    /// A parameter or variable that requires an explicit type annotation.
    #[error("missing type hint for '{name}' at {span}")]
    MissingTypeHint { name: String, span: Span },

    /// A method whose `self` parameter is absent or misplaced.
    #[error("invalid self argument in '{method}' at {span}")]
    SelfArgument { method: String, span: Span },
}

impl CompilerError {
    /// Get the span where this error occurred.
    ///
    /// [`CompilerError::InternalError`] has no source position and
    /// reports the zero span.
    pub fn span(&self) -> Span {
        match self {
            CompilerError::Syntax { span, .. }
            | CompilerError::CircularImport { span, .. }
            | CompilerError::DuplicatedIdentifier { span, .. }
            | CompilerError::DuplicatedManifestIdentifier { span, .. }
            | CompilerError::WrongOperandCount { span, .. }
            | CompilerError::InvalidBuiltinUsage { span, .. }
            | CompilerError::NotSupportedOperation { span, .. }
            | CompilerError::InternalIncorrectSignature { span, .. }
            | CompilerError::MetadataImplementationMissing { span, .. }
            | CompilerError::MetadataImplementationIncorrect { span, .. }
            | CompilerError::MetadataInformationMissing { span, .. }
            | CompilerError::MismatchedTypes { span, .. }
            | CompilerError::MissingInitCall { span, .. }
            | CompilerError::MissingReturnStatement { span, .. }
            | CompilerError::MissingStandardDefinition { span, .. }
            | CompilerError::UnexpectedArgument { span, .. }
            | CompilerError::UnfilledArgument { span, .. }
            | CompilerError::UnresolvedReference { span, .. }
            | CompilerError::UnresolvedOperation { span, .. }
            | CompilerError::TooManyReturns { span }
            | CompilerError::TooManySlots { span, .. }
            | CompilerError::MissingTypeHint { span, .. }
            | CompilerError::SelfArgument { span, .. } => *span,
            CompilerError::InternalError { .. } => Span::default(),
        }
    }
}

impl From<ParseError> for CompilerError {
    fn from(err: ParseError) -> Self {
        CompilerError::Syntax {
            message: err.message,
            span: err.span,
        }
    }
}

// ============================================================================
// Compiler Warnings
// ============================================================================

/// Non-fatal findings recorded during analysis.
///
/// Warnings never abort compilation; they are aggregated alongside errors
/// for the caller to surface.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompilerWarning {
    /// Use of a symbol marked deprecated.
    #[error("'{name}' is deprecated at {span}")]
    DeprecatedSymbol { name: String, span: Span },

    /// A constant-folding attempt saw an argument it cannot fold.
    #[error("invalid argument for compile-time evaluation at {span}: {reason}")]
    InvalidArgument { reason: String, span: Span },

    /// An inner scope declares a name already visible from an outer scope.
    #[error("'{name}' shadows an outer declaration at {span}")]
    NameShadowing { name: String, span: Span },

    /// A mergeable redeclaration within the same scope.
    #[error("'{name}' redeclared at {span}")]
    RedeclaredSymbol { name: String, span: Span },

    /// An implicit cast that may lose type information at runtime.
    #[error("implicit cast from '{from}' to '{to}' at {span}")]
    TypeCasting {
        from: String,
        to: String,
        span: Span,
    },

    /// Statements that can never execute.
    #[error("unreachable code at {span}")]
    UnreachableCode { span: Span },

    /// A narrow exception type that the VM widens to a generic exception.
    #[error("exception type '{name}' is widened at runtime at {span}")]
    ExceptionWidened { name: String, span: Span },
}

impl CompilerWarning {
    /// Get the span where this warning occurred.
    pub fn span(&self) -> Span {
        match self {
            CompilerWarning::DeprecatedSymbol { span, .. }
            | CompilerWarning::InvalidArgument { span, .. }
            | CompilerWarning::NameShadowing { span, .. }
            | CompilerWarning::RedeclaredSymbol { span, .. }
            | CompilerWarning::TypeCasting { span, .. }
            | CompilerWarning::UnreachableCode { span }
            | CompilerWarning::ExceptionWidened { span, .. } => *span,
        }
    }
}

// ============================================================================
// Façade Failure Signal
// ============================================================================

/// The single failure signal raised by the compiler façade.
///
/// Detailed diagnostics are available on the compilation result; this
/// signal only distinguishes the three terminal conditions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NotLoadedError {
    /// Semantic analysis recorded at least one error.
    #[error("contract not loaded: analysis failed")]
    AnalysisFailure,

    /// Code generation hit an internal failure.
    #[error("contract not loaded: code generation failed")]
    CodegenFailure,

    /// Dead-code elimination left no bytecode to emit.
    #[error("contract not loaded: generated script is empty")]
    EmptyScript,

    /// An artifact could not be written to disk.
    #[error("contract not loaded: {0}")]
    Io(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_carry_position() {
        let err = CompilerError::UnresolvedReference {
            name: "foo".to_string(),
            span: Span::new(10, 5, 3),
        };
        assert_eq!(err.to_string(), "unresolved reference 'foo' at 10:5");
        assert_eq!(err.span(), Span::new(10, 5, 3));
    }

    #[test]
    fn standard_member_kind_display() {
        let err = CompilerError::MissingStandardDefinition {
            standard: "NEP-17".to_string(),
            member: "transfer".to_string(),
            kind: StandardMemberKind::Method,
            span: Span::point(1, 1),
        };
        assert!(err.to_string().contains("method 'transfer'"));
    }

    #[test]
    fn internal_error_has_zero_span() {
        let err = CompilerError::InternalError {
            cause: "boom".to_string(),
        };
        assert_eq!(err.span(), Span::default());
    }
}
