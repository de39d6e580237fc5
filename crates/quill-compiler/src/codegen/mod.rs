//! Bytecode generation.
//!
//! [`generator::CodeGenerator`] walks the analysed modules and produces
//! the final script: reachable methods only, dense slot allocation,
//! symbolic jumps resolved by the [`builder::ScriptBuilder`] link step.

pub mod builder;
pub mod generator;
pub mod instruction;
pub mod opcode;

use quill_core::{MethodToken, Parameter, Type};

use builder::SpanMap;

/// One method exported through the ABI.
#[derive(Debug, Clone)]
pub struct EmittedMethod {
    pub name: String,
    pub params: Vec<Parameter>,
    pub return_type: Type,
    pub safe: bool,
    /// Byte offset of the method's first instruction.
    pub offset: usize,
}

/// Per-method layout facts for the debug archive.
#[derive(Debug, Clone)]
pub struct DebugMethod {
    pub name: String,
    /// Byte range of the method body, start inclusive, end exclusive.
    pub start: usize,
    pub end: usize,
    pub params: Vec<(String, String)>,
    pub locals: Vec<(String, String)>,
    pub return_type: String,
}

/// Everything code generation produces.
#[derive(Debug)]
pub struct GeneratedScript {
    pub script: Vec<u8>,
    /// ABI entry points, in emission order.
    pub methods: Vec<EmittedMethod>,
    /// NEF method tokens for external contract calls.
    pub tokens: Vec<MethodToken>,
    /// Instruction byte offsets mapped to source spans.
    pub spans: SpanMap,
    pub debug_methods: Vec<DebugMethod>,
}
