//! The closed type system of the contract language.
//!
//! [`Type`] is a closed enum: primitive scalars, the byte-sequence types,
//! structural generics (list/dict/tuple), nominal user classes, unions, and
//! the dynamic `Any`. Each type knows its compatibility rules
//! ([`Type::accepts`]) and the operators it supports
//! ([`Type::binary_result`], [`Type::unary_result`]).
//!
//! Compatibility is structural for generics and nominal for classes.
//! `Any` is compatible with everything, but assigning `Any` into a
//! concrete type is a downcast the analyser surfaces as a `TypeCasting`
//! warning.

use std::fmt;
use std::rc::Rc;

use crate::ops::{BinaryOp, UnaryOp};

/// A user-defined class type.
///
/// `bases` holds the transitive base-class names, flattened by the module
/// analyser, so nominal compatibility checks need no symbol-table access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassType {
    /// Class name.
    pub name: String,
    /// Transitive base-class names, nearest first.
    pub bases: Vec<String>,
}

/// The result of a compatibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compatibility {
    /// The value fits without comment.
    Compatible,
    /// The value fits but loses static information (`Any` into concrete).
    Downcast,
    /// The value does not fit.
    Incompatible,
}

impl Compatibility {
    /// Whether the assignment is allowed at all.
    pub fn is_ok(self) -> bool {
        !matches!(self, Compatibility::Incompatible)
    }

    fn worst(self, other: Compatibility) -> Compatibility {
        use Compatibility::*;
        match (self, other) {
            (Incompatible, _) | (_, Incompatible) => Incompatible,
            (Downcast, _) | (_, Downcast) => Downcast,
            _ => Compatible,
        }
    }
}

/// A resolved type of the contract language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    /// Arbitrary-precision integer.
    Int,
    /// Boolean.
    Bool,
    /// UTF-8 string.
    Str,
    /// Byte string.
    Bytes,
    /// 160-bit script hash / account identifier.
    UInt160,
    /// The unit value `None`.
    None,
    /// Homogeneous sequence.
    List(Box<Type>),
    /// Key/value mapping.
    Dict(Box<Type>, Box<Type>),
    /// Fixed-shape heterogeneous sequence.
    Tuple(Vec<Type>),
    /// A user-defined class, nominal.
    Class(Rc<ClassType>),
    /// A union of alternatives.
    Union(Vec<Type>),
    /// The dynamic type, compatible with everything.
    Any,
}

impl Type {
    /// A `list[Any]`.
    pub fn any_list() -> Type {
        Type::List(Box::new(Type::Any))
    }

    /// A `dict[Any, Any]`.
    pub fn any_dict() -> Type {
        Type::Dict(Box::new(Type::Any), Box::new(Type::Any))
    }

    /// Build a class type.
    pub fn class(name: impl Into<String>, bases: Vec<String>) -> Type {
        Type::Class(Rc::new(ClassType {
            name: name.into(),
            bases,
        }))
    }

    /// Whether this is the dynamic type.
    pub fn is_any(&self) -> bool {
        matches!(self, Type::Any)
    }

    /// Whether values of this type occupy the VM's integer domain.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Bool)
    }

    /// Whether this type is an indexable byte or character sequence.
    pub fn is_chars(&self) -> bool {
        matches!(self, Type::Str | Type::Bytes | Type::UInt160)
    }

    /// Whether this type is indexable with an integer subscript.
    pub fn is_sequence(&self) -> bool {
        self.is_chars() || matches!(self, Type::List(_) | Type::Tuple(_))
    }

    /// The element type produced by an integer subscript, if indexable.
    pub fn element_type(&self) -> Option<Type> {
        match self {
            Type::Str => Some(Type::Str),
            Type::Bytes | Type::UInt160 => Some(Type::Int),
            Type::List(t) => Some((**t).clone()),
            Type::Tuple(items) => Some(Type::union_of(items.clone())),
            Type::Dict(_, v) => Some((**v).clone()),
            Type::Any => Some(Type::Any),
            _ => None,
        }
    }

    /// Collapse a set of alternatives into one type.
    ///
    /// Duplicates collapse; a single survivor is returned bare; an empty
    /// set is `Any`. Mixed survivors widen to `Any` rather than keeping a
    /// structural union, matching the dynamic-slot model of the VM.
    pub fn union_of(types: Vec<Type>) -> Type {
        let mut unique: Vec<Type> = Vec::new();
        for ty in types {
            if !unique.contains(&ty) {
                unique.push(ty);
            }
        }
        match unique.len() {
            0 => Type::Any,
            1 => unique.pop().unwrap_or(Type::Any),
            _ => Type::Any,
        }
    }

    /// Check whether a value of `other` can be assigned into `self`.
    pub fn accepts(&self, other: &Type) -> Compatibility {
        use Compatibility::*;
        if self == other {
            return Compatible;
        }
        match (self, other) {
            (Type::Any, _) => Compatible,
            (_, Type::Any) => Downcast,

            // A bool is a valid integer downstream of the VM's item model.
            (Type::Int, Type::Bool) => Compatible,
            // A script hash is a fixed-width byte string; the VM keeps
            // both in the same item kind, so they interchange freely.
            (Type::Bytes, Type::UInt160) | (Type::UInt160, Type::Bytes) => Compatible,

            (Type::List(a), Type::List(b)) => a.accepts(b),
            (Type::List(a), Type::Tuple(items)) => items
                .iter()
                .map(|item| a.accepts(item))
                .fold(Compatible, Compatibility::worst),
            (Type::Dict(ka, va), Type::Dict(kb, vb)) => ka.accepts(kb).worst(va.accepts(vb)),
            (Type::Tuple(a), Type::Tuple(b)) => {
                if a.len() != b.len() {
                    return Incompatible;
                }
                a.iter()
                    .zip(b)
                    .map(|(x, y)| x.accepts(y))
                    .fold(Compatible, Compatibility::worst)
            }

            (Type::Class(a), Type::Class(b)) => {
                if a.name == b.name || b.bases.iter().any(|base| *base == a.name) {
                    Compatible
                } else {
                    Incompatible
                }
            }

            (Type::Union(members), other) => members
                .iter()
                .map(|m| m.accepts(other))
                .fold(Incompatible, |best, c| match (best, c) {
                    (Incompatible, c) => c,
                    (best, Incompatible) => best,
                    (a, b) => {
                        if a == Compatible || b == Compatible {
                            Compatible
                        } else {
                            Downcast
                        }
                    }
                }),
            (target, Type::Union(members)) => members
                .iter()
                .map(|m| target.accepts(m))
                .fold(Compatible, Compatibility::worst),

            _ => Incompatible,
        }
    }

    /// Resolve a binary operator against this (left) operand type.
    ///
    /// Returns the result type, or `None` when this type does not define
    /// the operator for the given right operand.
    pub fn binary_result(&self, op: BinaryOp, rhs: &Type) -> Option<Type> {
        use BinaryOp::*;

        // Comparisons are defined wherever the operands are mutually
        // comparable; the VM compares any two stack items for equality.
        if matches!(op, Eq | NotEq) {
            return Some(Type::Bool);
        }
        if matches!(op, And | Or) {
            // Truthiness applies to every type; the result keeps the
            // operand types when they agree.
            return Some(if self == rhs {
                self.clone()
            } else {
                Type::Any
            });
        }
        if self.is_any() || rhs.is_any() {
            return Some(if op.is_comparison() { Type::Bool } else { Type::Any });
        }

        match self {
            Type::Int | Type::Bool => match op {
                Add | Sub | Mul | Div | Mod | Pow | BitAnd | BitOr | BitXor | Shl | Shr
                    if rhs.is_numeric() =>
                {
                    Some(Type::Int)
                }
                Lt | LtE | Gt | GtE if rhs.is_numeric() => Some(Type::Bool),
                _ => None,
            },
            Type::Str => match (op, rhs) {
                (Add, Type::Str) => Some(Type::Str),
                (Lt | LtE | Gt | GtE, Type::Str) => Some(Type::Bool),
                _ => None,
            },
            Type::Bytes | Type::UInt160 => match (op, rhs) {
                (Add, Type::Bytes | Type::UInt160) => Some(Type::Bytes),
                (Lt | LtE | Gt | GtE, Type::Bytes | Type::UInt160) => Some(Type::Bool),
                _ => None,
            },
            Type::List(elem) => match (op, rhs) {
                (Add, Type::List(other)) => Some(Type::List(Box::new(Type::union_of(vec![
                    (**elem).clone(),
                    (**other).clone(),
                ])))),
                _ => None,
            },
            // Membership resolves against the container; the VM only
            // supports key lookup on mappings.
            Type::Dict(_, _) => match op {
                In | NotIn => Some(Type::Bool),
                _ => None,
            },
            _ => None,
        }
    }

    /// Resolve a unary operator against this operand type.
    pub fn unary_result(&self, op: UnaryOp) -> Option<Type> {
        use UnaryOp::*;
        match (op, self) {
            // `not` applies to anything with truthiness, i.e. everything.
            (Not, _) => Some(Type::Bool),
            (Neg | Pos | BitNot, Type::Int | Type::Bool) => Some(Type::Int),
            (Neg | Pos | BitNot, Type::Any) => Some(Type::Any),
            _ => None,
        }
    }

    /// The ABI type tag this type maps to in the manifest.
    pub fn abi_name(&self) -> &'static str {
        match self {
            Type::Int => "Integer",
            Type::Bool => "Boolean",
            Type::Str => "String",
            Type::Bytes => "ByteArray",
            Type::UInt160 => "Hash160",
            Type::None => "Void",
            Type::List(_) | Type::Tuple(_) | Type::Class(_) => "Array",
            Type::Dict(_, _) => "Map",
            Type::Union(_) | Type::Any => "Any",
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => f.write_str("int"),
            Type::Bool => f.write_str("bool"),
            Type::Str => f.write_str("str"),
            Type::Bytes => f.write_str("bytes"),
            Type::UInt160 => f.write_str("UInt160"),
            Type::None => f.write_str("None"),
            Type::List(t) => write!(f, "list[{t}]"),
            Type::Dict(k, v) => write!(f, "dict[{k}, {v}]"),
            Type::Tuple(items) => {
                f.write_str("tuple[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Type::Class(c) => f.write_str(&c.name),
            Type::Union(members) => {
                for (i, m) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{m}")?;
                }
                Ok(())
            }
            Type::Any => f.write_str("Any"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_accepts_everything() {
        assert_eq!(Type::Any.accepts(&Type::Int), Compatibility::Compatible);
        assert_eq!(
            Type::Any.accepts(&Type::any_list()),
            Compatibility::Compatible
        );
    }

    #[test]
    fn downcast_from_any_is_flagged() {
        assert_eq!(Type::Int.accepts(&Type::Any), Compatibility::Downcast);
    }

    #[test]
    fn structural_list_compatibility() {
        let ints = Type::List(Box::new(Type::Int));
        let bools = Type::List(Box::new(Type::Bool));
        let strs = Type::List(Box::new(Type::Str));
        assert!(ints.accepts(&bools).is_ok());
        assert_eq!(ints.accepts(&strs), Compatibility::Incompatible);
    }

    #[test]
    fn nominal_class_compatibility() {
        let base = Type::class("Token", vec![]);
        let derived = Type::class("Gold", vec!["Token".to_string()]);
        let other = Type::class("Vault", vec![]);
        assert_eq!(base.accepts(&derived), Compatibility::Compatible);
        assert_eq!(derived.accepts(&base), Compatibility::Incompatible);
        assert_eq!(base.accepts(&other), Compatibility::Incompatible);
    }

    #[test]
    fn operator_resolution() {
        assert_eq!(
            Type::Int.binary_result(BinaryOp::Add, &Type::Int),
            Some(Type::Int)
        );
        assert_eq!(
            Type::Str.binary_result(BinaryOp::Add, &Type::Str),
            Some(Type::Str)
        );
        assert_eq!(Type::Str.binary_result(BinaryOp::Sub, &Type::Str), None);
        assert_eq!(
            Type::Int.binary_result(BinaryOp::Lt, &Type::Int),
            Some(Type::Bool)
        );
    }

    #[test]
    fn equality_defined_for_all_types() {
        assert_eq!(
            Type::Str.binary_result(BinaryOp::Eq, &Type::Int),
            Some(Type::Bool)
        );
    }

    #[test]
    fn union_collapses() {
        assert_eq!(Type::union_of(vec![Type::Int, Type::Int]), Type::Int);
        assert_eq!(Type::union_of(vec![Type::Int, Type::Str]), Type::Any);
        assert_eq!(Type::union_of(vec![]), Type::Any);
    }

    #[test]
    fn abi_names() {
        assert_eq!(Type::Int.abi_name(), "Integer");
        assert_eq!(Type::UInt160.abi_name(), "Hash160");
        assert_eq!(Type::any_dict().abi_name(), "Map");
    }
}
