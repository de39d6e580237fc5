//! The builtin surface exposed to every contract.
//!
//! Builtins are plain [`BuiltinSymbol`] values seeded into the global
//! table before the user's module is analysed. Interop members carry the
//! service name of the syscall they lower to; the generator derives the
//! 4-byte id from the name, so nothing here hard-codes ids.

use quill_core::{BuiltinKind, BuiltinLowering, BuiltinSymbol, Parameter, Symbol, SymbolTable, Type};
use sha2::{Digest, Sha256};

/// Interop service names, shared with the code generator.
pub mod interop {
    pub const NOTIFY: &str = "System.Runtime.Notify";
    pub const LOG: &str = "System.Runtime.Log";
    pub const CHECK_WITNESS: &str = "System.Runtime.CheckWitness";
    pub const CALLING_SCRIPT_HASH: &str = "System.Runtime.GetCallingScriptHash";
    pub const EXECUTING_SCRIPT_HASH: &str = "System.Runtime.GetExecutingScriptHash";
    pub const TIME: &str = "System.Runtime.GetTime";
    pub const STORAGE_CONTEXT: &str = "System.Storage.GetContext";
    pub const STORAGE_GET: &str = "System.Storage.Get";
    pub const STORAGE_PUT: &str = "System.Storage.Put";
    pub const STORAGE_DELETE: &str = "System.Storage.Delete";
}

/// The 4-byte interop id of a service name.
pub fn syscall_id(name: &str) -> [u8; 4] {
    let digest = Sha256::digest(name.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

fn method(
    name: &str,
    params: Vec<Parameter>,
    return_type: Type,
    lowering: BuiltinLowering,
) -> BuiltinSymbol {
    BuiltinSymbol {
        name: name.to_string(),
        kind: BuiltinKind::Method {
            params,
            return_type,
            lowering,
        },
        deprecated: false,
    }
}

fn property(name: &str, ty: Type, lowering: BuiltinLowering) -> BuiltinSymbol {
    BuiltinSymbol {
        name: name.to_string(),
        kind: BuiltinKind::Property { ty, lowering },
        deprecated: false,
    }
}

fn module(name: &str, members: Vec<BuiltinSymbol>) -> BuiltinSymbol {
    BuiltinSymbol {
        name: name.to_string(),
        kind: BuiltinKind::Module { members },
        deprecated: false,
    }
}

fn runtime_module() -> BuiltinSymbol {
    module(
        "runtime",
        vec![
            method(
                "notify",
                vec![Parameter::new("state", Type::Any)],
                Type::None,
                BuiltinLowering::Syscall(interop::NOTIFY.to_string()),
            ),
            method(
                "log",
                vec![Parameter::new("message", Type::Str)],
                Type::None,
                BuiltinLowering::Syscall(interop::LOG.to_string()),
            ),
            method(
                "check_witness",
                vec![Parameter::new("account", Type::UInt160)],
                Type::Bool,
                BuiltinLowering::Syscall(interop::CHECK_WITNESS.to_string()),
            ),
            property(
                "calling_script_hash",
                Type::UInt160,
                BuiltinLowering::Syscall(interop::CALLING_SCRIPT_HASH.to_string()),
            ),
            property(
                "executing_script_hash",
                Type::UInt160,
                BuiltinLowering::Syscall(interop::EXECUTING_SCRIPT_HASH.to_string()),
            ),
            property(
                "time",
                Type::Int,
                BuiltinLowering::Syscall(interop::TIME.to_string()),
            ),
        ],
    )
}

fn storage_module() -> BuiltinSymbol {
    module(
        "storage",
        vec![
            method(
                "get",
                vec![Parameter::new("key", Type::Bytes)],
                Type::Bytes,
                BuiltinLowering::Syscall(interop::STORAGE_GET.to_string()),
            ),
            method(
                "put",
                vec![
                    Parameter::new("key", Type::Bytes),
                    Parameter::new("value", Type::Any),
                ],
                Type::None,
                BuiltinLowering::Syscall(interop::STORAGE_PUT.to_string()),
            ),
            method(
                "delete",
                vec![Parameter::new("key", Type::Bytes)],
                Type::None,
                BuiltinLowering::Syscall(interop::STORAGE_DELETE.to_string()),
            ),
        ],
    )
}

fn contract_module() -> BuiltinSymbol {
    module(
        "contract",
        vec![
            method(
                "call_contract",
                vec![
                    Parameter::new("script_hash", Type::UInt160),
                    Parameter::new("method", Type::Str),
                    Parameter::new("args", Type::any_list()),
                ],
                Type::Any,
                BuiltinLowering::CallContract,
            ),
            method("abort", vec![], Type::None, BuiltinLowering::Abort),
        ],
    )
}

/// Seed the builtin surface into a fresh global symbol table.
///
/// Called once per compilation before the entry module is analysed, so
/// user declarations that collide with a builtin surface as shadowing
/// rather than unresolved references.
pub fn register(table: &mut SymbolTable) {
    let free: Vec<BuiltinSymbol> = vec![
        method(
            "len",
            vec![Parameter::new("value", Type::Any)],
            Type::Int,
            BuiltinLowering::Len,
        ),
        method(
            "abs",
            vec![Parameter::new("value", Type::Int)],
            Type::Int,
            BuiltinLowering::Abs,
        ),
        method(
            "min",
            vec![
                Parameter::new("a", Type::Int),
                Parameter::new("b", Type::Int),
            ],
            Type::Int,
            BuiltinLowering::Min,
        ),
        method(
            "max",
            vec![
                Parameter::new("a", Type::Int),
                Parameter::new("b", Type::Int),
            ],
            Type::Int,
            BuiltinLowering::Max,
        ),
        method(
            "to_script_hash",
            vec![Parameter::new("value", Type::Any)],
            Type::UInt160,
            BuiltinLowering::ToScriptHash,
        ),
        method(
            "env",
            vec![Parameter::new("key", Type::Str)],
            Type::Str,
            BuiltinLowering::Env,
        ),
        // Declared with no fixed parameters; the analyser validates the
        // name-plus-kwargs shape itself.
        method("create_event", vec![], Type::Any, BuiltinLowering::CreateEvent),
        runtime_module(),
        storage_module(),
        contract_module(),
    ];
    for builtin in free {
        let name = builtin.name.clone();
        // The table is empty at registration time.
        let _ = table.insert(name, Symbol::Builtin(builtin));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_exposes_modules_and_free_functions() {
        let mut table = SymbolTable::new();
        register(&mut table);
        assert!(table.contains("len"));
        assert!(table.contains("create_event"));
        let runtime = match table.get("runtime") {
            Some(Symbol::Builtin(b)) => b,
            other => panic!("runtime should be a builtin, got {other:?}"),
        };
        assert!(runtime.member("check_witness").is_some());
        assert!(runtime.member("no_such_member").is_none());
    }

    #[test]
    fn syscall_id_is_sha256_prefix() {
        // First four bytes of SHA-256("System.Runtime.Log").
        let id = syscall_id(interop::LOG);
        let digest = Sha256::digest(interop::LOG.as_bytes());
        assert_eq!(id, [digest[0], digest[1], digest[2], digest[3]]);
        assert_ne!(syscall_id(interop::LOG), syscall_id(interop::NOTIFY));
    }

    #[test]
    fn storage_get_returns_bytes() {
        let mut table = SymbolTable::new();
        register(&mut table);
        let storage = match table.get("storage") {
            Some(Symbol::Builtin(b)) => b,
            _ => unreachable!(),
        };
        match &storage.member("get").unwrap().kind {
            BuiltinKind::Method { return_type, .. } => {
                assert_eq!(*return_type, Type::Bytes)
            }
            _ => panic!("storage.get should be a method"),
        }
    }
}
