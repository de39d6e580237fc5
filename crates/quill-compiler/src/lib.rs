//! The compilation pipeline: analysis passes, code generation, and
//! artifact assembly.
//!
//! The pipeline runs over an explicit [`context::CompilationContext`];
//! there is no global state and no lock, so independent compilations can
//! run side by side. Passes run in a fixed order:
//!
//! 1. module analyser: parse, imports, declarations
//! 2. construct analyser: compile-time folds (`to_script_hash`, `env`)
//! 3. type analyser: types, slots, metadata interpretation
//! 4. standard analyser: declared NEP conformance
//! 5. code generator: bytecode, method tokens, ABI offsets
//! 6. file generator: NEF, manifest, debug archive
//!
//! Any recorded error stops the run after the analysis phase and is
//! surfaced as [`NotLoadedError`]; the detailed diagnostics stay on the
//! context.

pub mod analysis;
pub mod builtins;
pub mod codegen;
pub mod context;
pub mod filegen;

use quill_core::NotLoadedError;

use crate::analysis::construct_analyser::ConstructAnalyser;
use crate::analysis::module_analyser::ModuleAnalyser;
use crate::analysis::standard_analyser::StandardAnalyser;
use crate::analysis::type_analyser::TypeAnalyser;
use crate::codegen::generator::CodeGenerator;
use crate::context::CompilationContext;
use crate::filegen::{Artifacts, FileGenerator};

/// Run every pass over the entry file's source.
///
/// The context must be fresh; builtins are registered here. On failure
/// the context's diagnostics hold the details.
pub fn compile_source(
    ctx: &mut CompilationContext,
    source: &str,
) -> Result<Artifacts, NotLoadedError> {
    builtins::register(&mut ctx.symbols);

    let mut modules = ModuleAnalyser::new(ctx).analyse(source);
    for module in &mut modules {
        let rewritten = ConstructAnalyser::new(ctx).rewrite(std::mem::take(&mut module.ast));
        module.ast = rewritten;
    }
    TypeAnalyser::new(ctx).analyse(&modules);
    StandardAnalyser::new(ctx).analyse();
    if ctx.diagnostics.has_errors() {
        return Err(NotLoadedError::AnalysisFailure);
    }

    let generated = match CodeGenerator::new(ctx, &modules).generate() {
        Ok(generated) => generated,
        Err(error) => {
            ctx.diagnostics.error(error);
            return Err(NotLoadedError::CodegenFailure);
        }
    };
    if generated.script.is_empty() {
        return Err(NotLoadedError::EmptyScript);
    }

    match FileGenerator::new(ctx, &generated).generate() {
        Ok(artifacts) => Ok(artifacts),
        Err(error) => {
            ctx.diagnostics.error(error);
            Err(NotLoadedError::CodegenFailure)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap;
    use std::path::PathBuf;

    fn ctx() -> CompilationContext {
        CompilationContext::new(
            PathBuf::from("/virtual/test.ql"),
            PathBuf::from("/virtual"),
            FxHashMap::default(),
            false,
        )
    }

    #[test]
    fn whole_pipeline_produces_artifacts() {
        let mut ctx = ctx();
        let artifacts = compile_source(
            &mut ctx,
            "@public\n\
             def answer() -> int:\n\
             \x20   return 42\n",
        )
        .unwrap();
        assert_eq!(artifacts.nef.script, vec![0x00, 42, 0x40]);
        assert_eq!(artifacts.manifest.abi.methods.len(), 1);
        assert_eq!(artifacts.manifest.name, "test");
    }

    #[test]
    fn analysis_errors_refuse_emission() {
        let mut ctx = ctx();
        let result = compile_source(
            &mut ctx,
            "@public\n\
             def broken() -> int:\n\
             \x20   return missing_name\n",
        );
        assert_eq!(result.unwrap_err(), NotLoadedError::AnalysisFailure);
        assert!(ctx.diagnostics.has_errors());
    }

    #[test]
    fn no_entry_points_is_an_empty_script() {
        let mut ctx = ctx();
        let result = compile_source(&mut ctx, "def helper() -> int:\n    return 1\n");
        assert_eq!(result.unwrap_err(), NotLoadedError::EmptyScript);
    }
}
