//! Shared state of one compilation.
//!
//! Every pass receives a `&mut CompilationContext` instead of reaching for
//! globals. The context owns the flattened symbol table, the accumulated
//! metadata, the diagnostics collector, and the import bookkeeping that
//! detects cycles.

use std::path::{Path, PathBuf};

use quill_core::{ContractMetadata, Diagnostics, SymbolTable};
use rustc_hash::FxHashMap;

/// State threaded through all passes of a single compilation.
pub struct CompilationContext {
    /// The flattened global symbol table of the whole program.
    pub symbols: SymbolTable,
    /// Contract metadata, filled while the metadata function is analysed.
    pub metadata: ContractMetadata,
    /// Errors and warnings from every pass.
    pub diagnostics: Diagnostics,
    /// Key/value pairs answered by the compile-time `env()` builtin.
    pub env: FxHashMap<String, String>,
    /// Canonical path of the entry file.
    pub entry_file: PathBuf,
    /// Directory imports resolve relative to.
    pub root: PathBuf,
    /// Canonical paths of files whose analysis has completed.
    analysed: Vec<PathBuf>,
    /// Canonical paths of files currently being analysed, outermost first.
    /// A resolve hitting a member of this stack is a circular import.
    in_progress: Vec<PathBuf>,
}

impl CompilationContext {
    /// Create the context for compiling `entry_file`.
    pub fn new(
        entry_file: PathBuf,
        root: PathBuf,
        env: FxHashMap<String, String>,
        fail_fast: bool,
    ) -> Self {
        Self {
            symbols: SymbolTable::new(),
            metadata: ContractMetadata::new(),
            diagnostics: Diagnostics::new(fail_fast),
            env,
            entry_file,
            root,
            analysed: Vec::new(),
            in_progress: Vec::new(),
        }
    }

    /// Whether a file's analysis already finished.
    pub fn is_analysed(&self, path: &Path) -> bool {
        self.analysed.iter().any(|p| p == path)
    }

    /// Whether a file is on the active import stack.
    pub fn is_in_progress(&self, path: &Path) -> bool {
        self.in_progress.iter().any(|p| p == path)
    }

    /// Mark a file as being analysed.
    pub fn begin_file(&mut self, path: PathBuf) {
        self.in_progress.push(path);
    }

    /// Pop the active file and record it as analysed.
    pub fn finish_file(&mut self) {
        if let Some(path) = self.in_progress.pop() {
            if !self.analysed.contains(&path) {
                self.analysed.push(path);
            }
        }
    }

    /// The contract name: declared metadata name, or the entry file stem.
    pub fn contract_name(&self) -> String {
        if let Some(name) = &self.metadata.name {
            return name.clone();
        }
        self.entry_file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "contract".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> CompilationContext {
        CompilationContext::new(
            PathBuf::from("/src/token.ql"),
            PathBuf::from("/src"),
            FxHashMap::default(),
            false,
        )
    }

    #[test]
    fn import_stack_tracks_cycles() {
        let mut ctx = ctx();
        ctx.begin_file(PathBuf::from("/src/a.ql"));
        ctx.begin_file(PathBuf::from("/src/b.ql"));
        assert!(ctx.is_in_progress(Path::new("/src/a.ql")));
        ctx.finish_file();
        assert!(!ctx.is_in_progress(Path::new("/src/b.ql")));
        assert!(ctx.is_analysed(Path::new("/src/b.ql")));
    }

    #[test]
    fn name_defaults_to_file_stem() {
        let mut ctx = ctx();
        assert_eq!(ctx.contract_name(), "token");
        ctx.metadata.name = Some("MyToken".to_string());
        assert_eq!(ctx.contract_name(), "MyToken");
    }
}
