//! Artifact assembly: NEF container, manifest JSON, debug archive.
//!
//! Everything emitted here is derived from the compilation context and
//! the generated script; nothing reaches back into the analysis passes.
//! The manifest's ABI order equals the generator's assignment order, so
//! output is deterministic end to end.

pub mod debug_info;

use quill_core::{
    Abi, AbiEvent, AbiMethod, AbiParameter, CompilerError, Manifest, ManifestGroup,
    ManifestPermission, NefFile, Symbol, WildcardList,
};
use serde_json::{Map, Value as JsonValue};

use crate::codegen::GeneratedScript;
use crate::context::CompilationContext;
use crate::filegen::debug_info::DebugInfo;

/// Compiler identification written into the NEF header.
pub const COMPILER_NAME: &str = concat!("quill v", env!("CARGO_PKG_VERSION"));

/// The deployable output of one compilation.
#[derive(Debug)]
pub struct Artifacts {
    pub nef: NefFile,
    pub manifest: Manifest,
    pub debug: DebugInfo,
}

pub struct FileGenerator<'a> {
    ctx: &'a CompilationContext,
    generated: &'a GeneratedScript,
}

impl<'a> FileGenerator<'a> {
    pub fn new(ctx: &'a CompilationContext, generated: &'a GeneratedScript) -> Self {
        Self { ctx, generated }
    }

    pub fn generate(self) -> Result<Artifacts, CompilerError> {
        let nef = NefFile::new(
            COMPILER_NAME,
            self.generated.script.clone(),
            self.generated.tokens.clone(),
        );
        let manifest = self.build_manifest();
        let debug = DebugInfo::build(self.ctx, self.generated);
        Ok(Artifacts {
            nef,
            manifest,
            debug,
        })
    }

    fn build_manifest(&self) -> Manifest {
        let metadata = &self.ctx.metadata;
        let methods = self
            .generated
            .methods
            .iter()
            .map(|m| AbiMethod {
                name: m.name.clone(),
                parameters: m
                    .params
                    .iter()
                    .map(|p| AbiParameter {
                        name: p.name.clone(),
                        param_type: p.ty.abi_name().to_string(),
                    })
                    .collect(),
                returntype: m.return_type.abi_name().to_string(),
                offset: m.offset as u32,
                safe: m.safe,
            })
            .collect();
        let events = self
            .ctx
            .symbols
            .iter()
            .filter_map(|(_, symbol)| match symbol {
                Symbol::Event(event) => Some(AbiEvent {
                    name: event.event_name.clone(),
                    parameters: event
                        .params
                        .iter()
                        .map(|p| AbiParameter {
                            name: p.name.clone(),
                            param_type: p.ty.abi_name().to_string(),
                        })
                        .collect(),
                }),
                _ => None,
            })
            .collect();

        Manifest {
            name: self.ctx.contract_name(),
            groups: metadata
                .groups
                .iter()
                .map(|g| ManifestGroup {
                    pubkey: g.pubkey.clone(),
                    signature: g.signature.clone(),
                })
                .collect(),
            features: Map::new(),
            supportedstandards: metadata.supported_standards.clone(),
            abi: Abi { methods, events },
            permissions: metadata
                .permissions
                .iter()
                .map(|p| ManifestPermission {
                    contract: String::from(&p.contract),
                    methods: WildcardList::from(&p.methods),
                })
                .collect(),
            trusts: WildcardList::from(&metadata.trusts),
            extra: self.build_extra(),
        }
    }

    /// The `extra` object: well-known authorship keys plus free-form
    /// entries, or JSON null when nothing was declared.
    fn build_extra(&self) -> JsonValue {
        let metadata = &self.ctx.metadata;
        let mut extra = Map::new();
        if let Some(author) = &metadata.author {
            extra.insert("Author".to_string(), JsonValue::String(author.clone()));
        }
        if let Some(email) = &metadata.email {
            extra.insert("Email".to_string(), JsonValue::String(email.clone()));
        }
        if let Some(description) = &metadata.description {
            extra.insert(
                "Description".to_string(),
                JsonValue::String(description.clone()),
            );
        }
        for (key, value) in &metadata.extras {
            extra.insert(key.clone(), value.clone());
        }
        if extra.is_empty() {
            JsonValue::Null
        } else {
            JsonValue::Object(extra)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::{Parameter, Type};
    use rustc_hash::FxHashMap;
    use std::path::PathBuf;

    use crate::codegen::EmittedMethod;

    fn ctx() -> CompilationContext {
        CompilationContext::new(
            PathBuf::from("/virtual/token.ql"),
            PathBuf::from("/virtual"),
            FxHashMap::default(),
            false,
        )
    }

    fn script_with_one_method() -> GeneratedScript {
        GeneratedScript {
            script: vec![0x10, 0x40],
            methods: vec![EmittedMethod {
                name: "total_supply".to_string(),
                params: vec![],
                return_type: Type::Int,
                safe: true,
                offset: 0,
            }],
            tokens: Vec::new(),
            spans: Vec::new(),
            debug_methods: Vec::new(),
        }
    }

    #[test]
    fn manifest_name_defaults_to_file_stem() {
        let ctx = ctx();
        let generated = script_with_one_method();
        let artifacts = FileGenerator::new(&ctx, &generated).generate().unwrap();
        assert_eq!(artifacts.manifest.name, "token");
        assert_eq!(artifacts.manifest.abi.methods.len(), 1);
        assert_eq!(artifacts.manifest.abi.methods[0].returntype, "Integer");
        assert!(artifacts.manifest.abi.methods[0].safe);
        assert_eq!(artifacts.manifest.extra, JsonValue::Null);
    }

    #[test]
    fn declared_metadata_lands_in_extra() {
        let mut ctx = ctx();
        ctx.metadata.name = Some("MyToken".to_string());
        ctx.metadata.author = Some("dev".to_string());
        ctx.metadata
            .set_extra("Website".to_string(), JsonValue::String("x".to_string()));
        let generated = script_with_one_method();
        let artifacts = FileGenerator::new(&ctx, &generated).generate().unwrap();
        assert_eq!(artifacts.manifest.name, "MyToken");
        let extra = artifacts.manifest.extra.as_object().unwrap();
        assert_eq!(extra["Author"], JsonValue::String("dev".to_string()));
        assert_eq!(extra["Website"], JsonValue::String("x".to_string()));
    }

    #[test]
    fn abi_parameters_use_abi_type_names() {
        let mut generated = script_with_one_method();
        generated.methods[0].params = vec![
            Parameter::new("owner", Type::UInt160),
            Parameter::new("amount", Type::Int),
        ];
        let ctx = ctx();
        let artifacts = FileGenerator::new(&ctx, &generated).generate().unwrap();
        let params = &artifacts.manifest.abi.methods[0].parameters;
        assert_eq!(params[0].param_type, "Hash160");
        assert_eq!(params[1].param_type, "Integer");
    }

    #[test]
    fn nef_carries_the_compiler_name() {
        let ctx = ctx();
        let generated = script_with_one_method();
        let artifacts = FileGenerator::new(&ctx, &generated).generate().unwrap();
        assert_eq!(artifacts.nef.compiler, COMPILER_NAME);
        let bytes = artifacts.nef.serialize().unwrap();
        let back = NefFile::deserialize(&bytes).unwrap();
        assert_eq!(back.script, vec![0x10, 0x40]);
    }
}
