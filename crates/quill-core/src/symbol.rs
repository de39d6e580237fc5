//! The symbol hierarchy and symbol table.
//!
//! Symbols are a closed set of variants (variable, method, event, class,
//! import, builtin) keyed by identifier in a [`SymbolTable`]. The table
//! keeps insertion order so code generation is deterministic regardless of
//! hash-map internals.
//!
//! Lifecycle: the module analyser creates symbols, the type analyser fills
//! in resolved types and method locals, and the code generator consumes
//! them through a shared reference, never mutating.

use std::path::PathBuf;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::{Span, Type};

/// Where a symbol was declared.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Origin {
    /// Source position of the declaration.
    pub span: Span,
    /// Declaring file, when known (builtins have none).
    pub file: Option<PathBuf>,
}

impl Origin {
    /// An origin for a declaration in the current unit.
    pub fn at(span: Span) -> Self {
        Self { span, file: None }
    }
}

/// A compile-time constant value.
///
/// Used for parameter defaults, folded literals, and provably-constant
/// global initializers.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i128),
    Bool(bool),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    None,
}

impl Value {
    /// The static type of this constant.
    pub fn ty(&self) -> Type {
        match self {
            Value::Int(_) => Type::Int,
            Value::Bool(_) => Type::Bool,
            Value::Str(_) => Type::Str,
            Value::Bytes(_) => Type::Bytes,
            Value::List(items) => {
                Type::List(Box::new(Type::union_of(items.iter().map(Value::ty).collect())))
            }
            Value::None => Type::None,
        }
    }
}

/// A typed parameter of a method or builtin.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub ty: Type,
    /// Constant default, filling the parameter when the call omits it.
    pub default: Option<Value>,
}

impl Parameter {
    /// A parameter with no default.
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
        }
    }
}

/// A module-level or local variable.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableSymbol {
    pub name: String,
    /// Resolved type; `Any` until the type analyser assigns it.
    pub ty: Type,
    /// Whether the variable is declared at module level.
    pub is_global: bool,
    /// Whether any assignment beyond the first was seen.
    pub reassigned: bool,
    /// Constant initializer, when the single assignment is a literal.
    /// Set by the type analyser; consumed by the const-global inliner.
    pub constant: Option<Value>,
    pub origin: Origin,
}

/// A user-defined function or method.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodSymbol {
    pub name: String,
    /// Ordered, typed parameters (excluding `self` for class methods).
    pub params: Vec<Parameter>,
    pub return_type: Type,
    /// Exported in the ABI and callable from outside the contract.
    pub is_public: bool,
    /// Declared read-only with `@public(safe=True)`.
    pub is_safe: bool,
    /// Name of the declaring class, for methods.
    pub defined_in: Option<String>,
    /// Local variables in declaration order, filled during type analysis.
    pub locals: Vec<(String, Type)>,
    pub origin: Origin,
}

impl MethodSymbol {
    /// Number of parameters that must be supplied at a call site.
    pub fn required_params(&self) -> usize {
        self.params
            .iter()
            .take_while(|p| p.default.is_none())
            .count()
    }

    /// Whether this method is an implicit entry point (`_deploy` or the
    /// synthesized `_initialize`).
    pub fn is_entry_point(&self) -> bool {
        self.is_public || self.name == "_deploy" || self.name == "_initialize"
    }
}

/// A declared notification event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventSymbol {
    /// The on-chain event name, as declared in the event factory call.
    pub event_name: String,
    /// Typed event fields.
    pub params: Vec<Parameter>,
    pub origin: Origin,
}

/// A user-defined class.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassSymbol {
    pub name: String,
    /// Direct base class, when declared.
    pub base: Option<String>,
    /// Transitive base names, nearest first; flattened by the analyser.
    pub bases: Vec<String>,
    /// Instance fields in declaration order, filled during type analysis.
    pub fields: Vec<(String, Type)>,
    /// Methods declared on this class, including `__init__`.
    pub methods: Vec<MethodSymbol>,
    pub origin: Origin,
}

impl ClassSymbol {
    /// The nominal type of instances of this class.
    pub fn instance_type(&self) -> Type {
        Type::class(self.name.clone(), self.bases.clone())
    }

    /// Index of an instance field, for PICKITEM/SETITEM lowering.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|(f, _)| f == name)
    }

    /// Look up a method by name.
    pub fn method(&self, name: &str) -> Option<&MethodSymbol> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// A whole-module import (`import m`), resolving attribute access.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportSymbol {
    /// Canonical path of the imported file.
    pub path: PathBuf,
    /// Names the imported module exports into the flattened table.
    pub exported: Vec<String>,
    pub origin: Origin,
}

/// How a builtin lowers to bytecode.
///
/// A closed set the generator matches on; new builtins add a variant or
/// reuse [`BuiltinLowering::Syscall`].
#[derive(Debug, Clone, PartialEq)]
pub enum BuiltinLowering {
    /// SYSCALL with the 4-byte interop id of the named service.
    Syscall(String),
    /// Sequence/string length (SIZE).
    Len,
    /// Absolute value (ABS).
    Abs,
    /// Two-operand minimum (MIN).
    Min,
    /// Two-operand maximum (MAX).
    Max,
    /// Compile-time conversion helper; folded by the construct analyser,
    /// lowered to a runtime CONVERT when the argument is not constant.
    ToScriptHash,
    /// Compile-time environment query, folded to a string literal.
    Env,
    /// Event factory; handled entirely during analysis.
    CreateEvent,
    /// Cross-contract call through a CALLT method token.
    CallContract,
    /// Unconditional ABORT.
    Abort,
}

/// A builtin or interop member.
#[derive(Debug, Clone, PartialEq)]
pub enum BuiltinKind {
    /// A callable builtin.
    Method {
        params: Vec<Parameter>,
        return_type: Type,
        lowering: BuiltinLowering,
    },
    /// A read-only builtin value.
    Property {
        ty: Type,
        lowering: BuiltinLowering,
    },
    /// A builtin module grouping members (`runtime`, `storage`, ...).
    Module { members: Vec<BuiltinSymbol> },
}

/// A builtin symbol exposed to contracts without user declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltinSymbol {
    pub name: String,
    pub kind: BuiltinKind,
    /// Deprecated builtins keep working but warn at each use.
    pub deprecated: bool,
}

impl BuiltinSymbol {
    /// Look up a member of a builtin module.
    pub fn member(&self, name: &str) -> Option<&BuiltinSymbol> {
        match &self.kind {
            BuiltinKind::Module { members } => members.iter().find(|m| m.name == name),
            _ => None,
        }
    }
}

/// A symbol in the global or a method-local table.
#[derive(Debug, Clone, PartialEq)]
pub enum Symbol {
    Variable(VariableSymbol),
    Method(MethodSymbol),
    Event(EventSymbol),
    Class(Rc<ClassSymbol>),
    Import(ImportSymbol),
    Builtin(BuiltinSymbol),
}

impl Symbol {
    /// A short noun for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Symbol::Variable(_) => "variable",
            Symbol::Method(_) => "function",
            Symbol::Event(_) => "event",
            Symbol::Class(_) => "class",
            Symbol::Import(_) => "module",
            Symbol::Builtin(_) => "builtin",
        }
    }

    /// The type an identifier expression naming this symbol has.
    pub fn value_type(&self) -> Type {
        match self {
            Symbol::Variable(v) => v.ty.clone(),
            Symbol::Class(c) => c.instance_type(),
            Symbol::Builtin(BuiltinSymbol {
                kind: BuiltinKind::Property { ty, .. },
                ..
            }) => ty.clone(),
            _ => Type::Any,
        }
    }
}

/// Identifier-keyed symbol storage with deterministic iteration order.
#[derive(Debug, Default)]
pub struct SymbolTable {
    by_name: FxHashMap<String, usize>,
    symbols: Vec<(String, Symbol)>,
}

impl SymbolTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a symbol. Returns `Err` with the existing symbol's index when
    /// the name is already taken; merging is the caller's policy.
    pub fn insert(&mut self, name: impl Into<String>, symbol: Symbol) -> Result<usize, usize> {
        let name = name.into();
        if let Some(&existing) = self.by_name.get(&name) {
            return Err(existing);
        }
        let index = self.symbols.len();
        self.by_name.insert(name.clone(), index);
        self.symbols.push((name, symbol));
        Ok(index)
    }

    /// Replace the symbol stored under an existing name.
    pub fn replace(&mut self, name: &str, symbol: Symbol) -> bool {
        match self.by_name.get(name) {
            Some(&index) => {
                self.symbols[index].1 = symbol;
                true
            }
            None => false,
        }
    }

    /// Look up a symbol by name.
    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.by_name.get(name).map(|&i| &self.symbols[i].1)
    }

    /// Look up a symbol mutably by name.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        match self.by_name.get(name) {
            Some(&i) => Some(&mut self.symbols[i].1),
            None => None,
        }
    }

    /// Get a symbol by insertion index.
    pub fn get_index(&self, index: usize) -> Option<(&str, &Symbol)> {
        self.symbols.get(index).map(|(n, s)| (n.as_str(), s))
    }

    /// Whether a name is present.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Iterate symbols in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Symbol)> {
        self.symbols.iter().map(|(n, s)| (n.as_str(), s))
    }

    /// Number of symbols.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str, ty: Type) -> Symbol {
        Symbol::Variable(VariableSymbol {
            name: name.to_string(),
            ty,
            is_global: true,
            reassigned: false,
            constant: None,
            origin: Origin::default(),
        })
    }

    #[test]
    fn insertion_order_is_preserved() {
        let mut table = SymbolTable::new();
        for name in ["zeta", "alpha", "mid"] {
            table.insert(name, var(name, Type::Int)).unwrap();
        }
        let names: Vec<_> = table.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut table = SymbolTable::new();
        table.insert("a", var("a", Type::Int)).unwrap();
        assert_eq!(table.insert("a", var("a", Type::Str)), Err(0));
        // The original survives.
        assert_eq!(
            table.get("a").map(Symbol::value_type),
            Some(Type::Int)
        );
    }

    #[test]
    fn required_params_stop_at_first_default() {
        let method = MethodSymbol {
            name: "f".to_string(),
            params: vec![
                Parameter::new("a", Type::Int),
                Parameter {
                    name: "b".to_string(),
                    ty: Type::Int,
                    default: Some(Value::Int(1)),
                },
            ],
            return_type: Type::None,
            is_public: false,
            is_safe: false,
            defined_in: None,
            locals: Vec::new(),
            origin: Origin::default(),
        };
        assert_eq!(method.required_params(), 1);
    }

    #[test]
    fn class_field_index() {
        let class = ClassSymbol {
            name: "Pair".to_string(),
            base: None,
            bases: Vec::new(),
            fields: vec![
                ("first".to_string(), Type::Int),
                ("second".to_string(), Type::Int),
            ],
            methods: Vec::new(),
            origin: Origin::default(),
        };
        assert_eq!(class.field_index("second"), Some(1));
        assert_eq!(class.field_index("third"), None);
    }
}
