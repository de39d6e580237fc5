//! Quill: a compiler for a Python-like smart-contract language targeting
//! a Neo-style stack VM.
//!
//! The façade turns a source file into deployable artifacts: the NEF
//! bytecode container, the manifest JSON, and an optional debug archive.
//! All pipeline state lives in an explicit per-compilation context, so
//! compilations are independent and safe to run concurrently.
//!
//! ```no_run
//! use std::path::Path;
//! use quill::Compiler;
//!
//! let compilation = Compiler::compile(Path::new("token.ql"), None, &[], false)
//!     .expect("contract should compile");
//! assert!(!compilation.artifacts.nef.script.is_empty());
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use quill_compiler::analysis::module_analyser::canonical;
use quill_compiler::context::CompilationContext;
use rustc_hash::FxHashMap;

pub use quill_compiler::filegen::debug_info::DebugInfo;
pub use quill_compiler::filegen::Artifacts;
pub use quill_core::{
    CompilerError, CompilerWarning, Diagnostics, Manifest, MethodToken, NefError, NefFile,
    NotLoadedError,
};

/// A successful compilation: artifacts plus any recorded warnings.
#[derive(Debug)]
pub struct Compilation {
    pub artifacts: Artifacts,
    /// Warnings (and, in non-fail-fast mode, suppressed positions).
    pub diagnostics: Diagnostics,
}

/// A failed compilation: the terminal signal plus the full diagnostics.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct CompileFailure {
    pub error: NotLoadedError,
    pub diagnostics: Diagnostics,
}

/// The files written by [`Compiler::compile_and_save`].
#[derive(Debug)]
pub struct SavedArtifacts {
    pub nef: PathBuf,
    pub manifest: PathBuf,
    pub debug: Option<PathBuf>,
    pub compilation: Compilation,
}

/// The compiler entry points.
pub struct Compiler;

impl Compiler {
    /// Compile `entry` and return the artifacts in memory.
    ///
    /// `root` is the directory imports resolve against; it defaults to
    /// the entry file's directory. `env` holds the key/value pairs the
    /// compile-time `env()` builtin answers. With `fail_fast` the first
    /// error stops analysis; otherwise analysis continues best effort
    /// and reports everything it finds.
    pub fn compile(
        entry: &Path,
        root: Option<&Path>,
        env: &[(String, String)],
        fail_fast: bool,
    ) -> Result<Compilation, CompileFailure> {
        let entry = canonical(entry);
        let root = match root {
            Some(root) => root.to_path_buf(),
            None => entry
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        };
        let source = fs::read_to_string(&entry).map_err(|e| CompileFailure {
            error: NotLoadedError::Io(format!("{}: {e}", entry.display())),
            diagnostics: Diagnostics::new(fail_fast),
        })?;

        let env: FxHashMap<String, String> = env.iter().cloned().collect();
        let mut ctx = CompilationContext::new(entry, root, env, fail_fast);
        match quill_compiler::compile_source(&mut ctx, &source) {
            Ok(artifacts) => Ok(Compilation {
                artifacts,
                diagnostics: take_diagnostics(&mut ctx),
            }),
            Err(error) => Err(CompileFailure {
                error,
                diagnostics: take_diagnostics(&mut ctx),
            }),
        }
    }

    /// Compile `entry` and write the artifacts next to each other in
    /// `out`, named after the contract: `{name}.nef`,
    /// `{name}.manifest.json`, and `{name}.nefdbgnfo` when `debug` is
    /// set. Each file is written in one whole-buffer call; a write
    /// failure aborts the compilation.
    pub fn compile_and_save(
        entry: &Path,
        out: &Path,
        debug: bool,
        env: &[(String, String)],
        fail_fast: bool,
    ) -> Result<SavedArtifacts, CompileFailure> {
        let compilation = Self::compile(entry, None, env, fail_fast)?;
        let name = &compilation.artifacts.manifest.name;

        let nef_path = out.join(format!("{name}.nef"));
        let nef_bytes = compilation
            .artifacts
            .nef
            .serialize()
            .map_err(|e| io_failure(&compilation, format!("serializing NEF: {e}")))?;
        fs::write(&nef_path, nef_bytes)
            .map_err(|e| io_failure(&compilation, format!("{}: {e}", nef_path.display())))?;

        let manifest_path = out.join(format!("{name}.manifest.json"));
        let manifest_json = compilation
            .artifacts
            .manifest
            .to_json()
            .map_err(|e| io_failure(&compilation, format!("serializing manifest: {e}")))?;
        fs::write(&manifest_path, manifest_json)
            .map_err(|e| io_failure(&compilation, format!("{}: {e}", manifest_path.display())))?;

        let debug_path = if debug {
            let path = out.join(format!("{name}.nefdbgnfo"));
            let archive = compilation
                .artifacts
                .debug
                .to_archive()
                .map_err(|e| io_failure(&compilation, format!("building debug archive: {e}")))?;
            fs::write(&path, archive)
                .map_err(|e| io_failure(&compilation, format!("{}: {e}", path.display())))?;
            Some(path)
        } else {
            None
        };

        Ok(SavedArtifacts {
            nef: nef_path,
            manifest: manifest_path,
            debug: debug_path,
            compilation,
        })
    }
}

fn take_diagnostics(ctx: &mut CompilationContext) -> Diagnostics {
    std::mem::replace(&mut ctx.diagnostics, Diagnostics::new(false))
}

fn io_failure(compilation: &Compilation, message: impl std::fmt::Display) -> CompileFailure {
    CompileFailure {
        error: NotLoadedError::Io(message.to_string()),
        diagnostics: compilation.diagnostics.clone(),
    }
}
