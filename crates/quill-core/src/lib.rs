//! Core data model for the Quill compiler.
//!
//! This crate holds everything the pipeline crates share and nothing that
//! depends on them: source spans, the error/warning taxonomies, the type
//! system and symbol hierarchy, contract metadata, the manifest model, the
//! NEF binary container, and interface-standard definitions.
//!
//! ## Modules
//!
//! - [`span`]: source positions for diagnostics and debug info
//! - [`error`]: per-phase error types and the façade's not-loaded signal
//! - [`diagnostics`]: error/warning aggregation with fail-fast support
//! - [`ops`]: the operator enumeration
//! - [`types`]: the closed [`Type`] enum with compatibility and operator rules
//! - [`symbol`]: symbol variants and the insertion-ordered [`SymbolTable`]
//! - [`metadata`]: contract metadata with permission-merge semantics
//! - [`manifest`]: the manifest JSON model
//! - [`nef`]: the NEF executable container
//! - [`standards`]: NEP interface-standard tables

pub mod diagnostics;
pub mod error;
pub mod manifest;
pub mod metadata;
pub mod nef;
pub mod ops;
pub mod span;
pub mod standards;
pub mod symbol;
pub mod types;

pub use diagnostics::{Diagnostics, Located};
pub use error::{
    CompilerError, CompilerWarning, LexError, NotLoadedError, ParseError, ParseErrorKind,
    StandardMemberKind,
};
pub use manifest::{
    Abi, AbiEvent, AbiMethod, AbiParameter, Manifest, ManifestGroup, ManifestPermission,
    WildcardList,
};
pub use metadata::{
    ContractMetadata, Group, Permission, PermissionContract, PermissionMethods, Trusts,
};
pub use nef::{MethodToken, NefError, NefFile};
pub use ops::{BinaryOp, UnaryOp};
pub use span::Span;
pub use symbol::{
    BuiltinKind, BuiltinLowering, BuiltinSymbol, ClassSymbol, EventSymbol, ImportSymbol,
    MethodSymbol, Origin, Parameter, Symbol, SymbolTable, Value, VariableSymbol,
};
pub use types::{ClassType, Compatibility, Type};
