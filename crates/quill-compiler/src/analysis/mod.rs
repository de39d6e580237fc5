//! The analysis passes.
//!
//! Order matters: the module analyser flattens the import graph into one
//! symbol table, the construct analyser rewrites constant-foldable calls,
//! the type analyser checks and annotates, and the standard analyser
//! validates declared interface standards against the final table.

pub mod construct_analyser;
pub mod module_analyser;
pub mod standard_analyser;
pub mod type_analyser;

use std::path::PathBuf;

use quill_core::{CompilerError, Symbol, SymbolTable, Type, Value};
use quill_parser::ast::{Expr, ExprKind, Module, TypeAnnotation, TypeAnnotationKind};

/// One parsed file, carried from the module analyser to the later passes.
#[derive(Debug)]
pub struct AnalysedModule {
    /// Canonical path of the source file.
    pub path: PathBuf,
    pub ast: Module,
    /// Names of `@metadata` functions declared in this file.
    pub metadata_functions: Vec<String>,
}

/// Resolve a written type annotation against the symbol table.
pub fn resolve_annotation(
    annotation: &TypeAnnotation,
    symbols: &SymbolTable,
) -> Result<Type, CompilerError> {
    match &annotation.kind {
        TypeAnnotationKind::Name(name) => match name.as_str() {
            "int" => Ok(Type::Int),
            "bool" => Ok(Type::Bool),
            "str" => Ok(Type::Str),
            "bytes" => Ok(Type::Bytes),
            "UInt160" => Ok(Type::UInt160),
            "None" => Ok(Type::None),
            "Any" => Ok(Type::Any),
            "list" => Ok(Type::any_list()),
            "dict" => Ok(Type::any_dict()),
            other => match symbols.get(other) {
                Some(Symbol::Class(class)) => Ok(class.instance_type()),
                _ => Err(CompilerError::UnresolvedReference {
                    name: other.to_string(),
                    span: annotation.span,
                }),
            },
        },
        TypeAnnotationKind::Generic { name, args } => {
            let resolved: Result<Vec<Type>, CompilerError> = args
                .iter()
                .map(|arg| resolve_annotation(arg, symbols))
                .collect();
            let resolved = resolved?;
            match (name.as_str(), resolved.len()) {
                ("list", 1) => Ok(Type::List(Box::new(resolved.into_iter().next().unwrap()))),
                ("dict", 2) => {
                    let mut it = resolved.into_iter();
                    Ok(Type::Dict(
                        Box::new(it.next().unwrap()),
                        Box::new(it.next().unwrap()),
                    ))
                }
                ("tuple", _) if !resolved.is_empty() => Ok(Type::Tuple(resolved)),
                _ => Err(CompilerError::NotSupportedOperation {
                    symbol: name.clone(),
                    span: annotation.span,
                }),
            }
        }
    }
}

/// Evaluate an expression to a compile-time constant, when it is one.
///
/// Only literals and displays of literals fold; anything else is `None`.
pub fn const_value(expr: &Expr) -> Option<Value> {
    match &expr.kind {
        ExprKind::Int(v) => Some(Value::Int(*v)),
        ExprKind::Bool(v) => Some(Value::Bool(*v)),
        ExprKind::Str(v) => Some(Value::Str(v.clone())),
        ExprKind::Bytes(v) => Some(Value::Bytes(v.clone())),
        ExprKind::NoneLit => Some(Value::None),
        ExprKind::List(items) => items
            .iter()
            .map(const_value)
            .collect::<Option<Vec<_>>>()
            .map(Value::List),
        ExprKind::Unary {
            op: quill_core::UnaryOp::Neg,
            operand,
        } => match const_value(operand) {
            Some(Value::Int(v)) => Some(Value::Int(-v)),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::Span;

    fn name(n: &str) -> TypeAnnotation {
        TypeAnnotation {
            kind: TypeAnnotationKind::Name(n.to_string()),
            span: Span::default(),
        }
    }

    #[test]
    fn primitive_annotations_resolve() {
        let table = SymbolTable::new();
        assert_eq!(resolve_annotation(&name("int"), &table), Ok(Type::Int));
        assert_eq!(
            resolve_annotation(&name("UInt160"), &table),
            Ok(Type::UInt160)
        );
        assert!(resolve_annotation(&name("Frob"), &table).is_err());
    }

    #[test]
    fn generic_annotations_resolve() {
        let table = SymbolTable::new();
        let ann = TypeAnnotation {
            kind: TypeAnnotationKind::Generic {
                name: "dict".to_string(),
                args: vec![name("str"), name("int")],
            },
            span: Span::default(),
        };
        assert_eq!(
            resolve_annotation(&ann, &table),
            Ok(Type::Dict(Box::new(Type::Str), Box::new(Type::Int)))
        );
    }
}
