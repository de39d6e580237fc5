//! Aggregation of errors and warnings across compilation passes.
//!
//! Each analyser records into a shared [`Diagnostics`] value owned by the
//! compilation context. In fail-fast mode the first error makes
//! [`Diagnostics::should_stop`] true and the current pass unwinds; later
//! passes are skipped by the façade.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::{CompilerError, CompilerWarning};

/// A recorded diagnostic, pairing the finding with the file it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Located<T> {
    /// The error or warning.
    pub item: T,
    /// The source file, when known.
    pub file: Option<PathBuf>,
}

impl<T: fmt::Display> fmt::Display for Located<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(path) => write!(f, "{}: {}", path.display(), self.item),
            None => write!(f, "{}", self.item),
        }
    }
}

/// Collector for all diagnostics of one compilation.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    errors: Vec<Located<CompilerError>>,
    warnings: Vec<Located<CompilerWarning>>,
    fail_fast: bool,
    /// File attributed to newly recorded diagnostics.
    current_file: Option<PathBuf>,
}

impl Diagnostics {
    /// Create an empty collector.
    pub fn new(fail_fast: bool) -> Self {
        Self {
            fail_fast,
            ..Self::default()
        }
    }

    /// Whether fail-fast mode is active.
    pub fn fail_fast(&self) -> bool {
        self.fail_fast
    }

    /// Set the file newly recorded diagnostics are attributed to.
    ///
    /// Returns the previous value so callers can restore it when an
    /// imported file's analysis finishes.
    pub fn set_current_file(&mut self, file: Option<PathBuf>) -> Option<PathBuf> {
        std::mem::replace(&mut self.current_file, file)
    }

    /// Record an error.
    pub fn error(&mut self, error: CompilerError) {
        self.errors.push(Located {
            item: error,
            file: self.current_file.clone(),
        });
    }

    /// Record a warning.
    pub fn warning(&mut self, warning: CompilerWarning) {
        self.warnings.push(Located {
            item: warning,
            file: self.current_file.clone(),
        });
    }

    /// Whether any error has been recorded.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Whether any warning has been recorded.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Whether the current pass should stop early.
    ///
    /// True only in fail-fast mode once an error exists.
    pub fn should_stop(&self) -> bool {
        self.fail_fast && self.has_errors()
    }

    /// All recorded errors, in recording order.
    pub fn errors(&self) -> &[Located<CompilerError>] {
        &self.errors
    }

    /// All recorded warnings, in recording order.
    pub fn warnings(&self) -> &[Located<CompilerWarning>] {
        &self.warnings
    }

    /// Number of recorded errors.
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Number of recorded warnings.
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// Whether an error was recorded for the given file.
    pub fn file_has_errors(&self, file: &Path) -> bool {
        self.errors
            .iter()
            .any(|d| d.file.as_deref() == Some(file))
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for err in &self.errors {
            writeln!(f, "error: {err}")?;
        }
        for warn in &self.warnings {
            writeln!(f, "warning: {warn}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Span;

    fn unresolved(name: &str) -> CompilerError {
        CompilerError::UnresolvedReference {
            name: name.to_string(),
            span: Span::point(1, 1),
        }
    }

    #[test]
    fn collects_in_order() {
        let mut diags = Diagnostics::new(false);
        diags.error(unresolved("a"));
        diags.error(unresolved("b"));
        assert_eq!(diags.error_count(), 2);
        assert!(!diags.should_stop());
    }

    #[test]
    fn fail_fast_stops_after_first_error() {
        let mut diags = Diagnostics::new(true);
        assert!(!diags.should_stop());
        diags.error(unresolved("a"));
        assert!(diags.should_stop());
    }

    #[test]
    fn warnings_never_stop() {
        let mut diags = Diagnostics::new(true);
        diags.warning(CompilerWarning::UnreachableCode {
            span: Span::point(2, 1),
        });
        assert!(!diags.should_stop());
        assert!(diags.has_warnings());
    }

    #[test]
    fn current_file_attribution() {
        let mut diags = Diagnostics::new(false);
        let prev = diags.set_current_file(Some(PathBuf::from("a.ql")));
        assert!(prev.is_none());
        diags.error(unresolved("x"));
        assert!(diags.file_has_errors(Path::new("a.ql")));
        diags.set_current_file(prev);
        diags.error(unresolved("y"));
        assert_eq!(diags.errors()[1].file, None);
    }
}
