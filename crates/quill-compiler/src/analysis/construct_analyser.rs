//! The construct analyser.
//!
//! A pre-typing rewrite that consumes the parsed tree and produces a new
//! one, folding calls that are decidable at compile time:
//!
//! - `to_script_hash("0x…")` and `to_script_hash(b"…")` with a constant
//!   argument become the 20-byte little-endian bytes literal. Malformed
//!   constants are left untouched with an `InvalidArgument` warning so the
//!   runtime conversion still runs.
//! - `env("KEY")` becomes the string literal from the compile-time
//!   environment; a missing key folds to the empty string with a warning.
//!
//! Non-constant arguments pass through silently in both cases.

use quill_core::CompilerWarning;
use quill_parser::ast::{Expr, ExprKind, FunctionDef, Module, Stmt, StmtKind};

use crate::context::CompilationContext;

/// Rewrites one module. Holds only the context for warnings and `env`.
pub struct ConstructAnalyser<'a> {
    ctx: &'a mut CompilationContext,
}

impl<'a> ConstructAnalyser<'a> {
    pub fn new(ctx: &'a mut CompilationContext) -> Self {
        Self { ctx }
    }

    /// Produce the rewritten module.
    pub fn rewrite(&mut self, module: Module) -> Module {
        Module {
            stmts: module.stmts.into_iter().map(|s| self.stmt(s)).collect(),
        }
    }

    fn stmt(&mut self, stmt: Stmt) -> Stmt {
        let kind = match stmt.kind {
            StmtKind::FunctionDef(func) => StmtKind::FunctionDef(self.function(func)),
            StmtKind::ClassDef(mut class) => {
                class.body = class.body.into_iter().map(|s| self.stmt(s)).collect();
                StmtKind::ClassDef(class)
            }
            StmtKind::Assign { target, value } => StmtKind::Assign {
                target: self.expr(target),
                value: self.expr(value),
            },
            StmtKind::AnnAssign {
                target,
                annotation,
                value,
            } => StmtKind::AnnAssign {
                target: self.expr(target),
                annotation,
                value: self.expr(value),
            },
            StmtKind::AugAssign { target, op, value } => StmtKind::AugAssign {
                target: self.expr(target),
                op,
                value: self.expr(value),
            },
            StmtKind::If { branches, orelse } => StmtKind::If {
                branches: branches
                    .into_iter()
                    .map(|(cond, body)| {
                        (
                            self.expr(cond),
                            body.into_iter().map(|s| self.stmt(s)).collect(),
                        )
                    })
                    .collect(),
                orelse: orelse.into_iter().map(|s| self.stmt(s)).collect(),
            },
            StmtKind::While { cond, body } => StmtKind::While {
                cond: self.expr(cond),
                body: body.into_iter().map(|s| self.stmt(s)).collect(),
            },
            StmtKind::For { target, iter, body } => StmtKind::For {
                target,
                iter: self.expr(iter),
                body: body.into_iter().map(|s| self.stmt(s)).collect(),
            },
            StmtKind::Return { value } => StmtKind::Return {
                value: value.map(|v| self.expr(v)),
            },
            StmtKind::Expr(expr) => StmtKind::Expr(self.expr(expr)),
            StmtKind::Raise { exc } => StmtKind::Raise {
                exc: self.expr(exc),
            },
            other @ (StmtKind::Import { .. }
            | StmtKind::FromImport { .. }
            | StmtKind::Pass
            | StmtKind::Break
            | StmtKind::Continue) => other,
        };
        Stmt { kind, span: stmt.span }
    }

    fn function(&mut self, mut func: FunctionDef) -> FunctionDef {
        func.body = func.body.into_iter().map(|s| self.stmt(s)).collect();
        func
    }

    fn expr(&mut self, expr: Expr) -> Expr {
        let span = expr.span;
        let kind = match expr.kind {
            ExprKind::Call { func, args, kwargs } => {
                let func = Box::new(self.expr(*func));
                let args: Vec<Expr> = args.into_iter().map(|a| self.expr(a)).collect();
                let kwargs: Vec<(String, Expr)> = kwargs
                    .into_iter()
                    .map(|(k, v)| (k, self.expr(v)))
                    .collect();
                if let ExprKind::Name(name) = &func.kind {
                    if name == "to_script_hash" && kwargs.is_empty() && args.len() == 1 {
                        if let Some(folded) = self.fold_script_hash(&args[0]) {
                            return Expr { kind: folded, span };
                        }
                    }
                    if name == "env" && kwargs.is_empty() && args.len() == 1 {
                        if let Some(folded) = self.fold_env(&args[0]) {
                            return Expr { kind: folded, span };
                        }
                    }
                }
                ExprKind::Call { func, args, kwargs }
            }
            ExprKind::List(items) => {
                ExprKind::List(items.into_iter().map(|i| self.expr(i)).collect())
            }
            ExprKind::Tuple(items) => {
                ExprKind::Tuple(items.into_iter().map(|i| self.expr(i)).collect())
            }
            ExprKind::Dict(pairs) => ExprKind::Dict(
                pairs
                    .into_iter()
                    .map(|(k, v)| (self.expr(k), self.expr(v)))
                    .collect(),
            ),
            ExprKind::Binary { op, left, right } => ExprKind::Binary {
                op,
                left: Box::new(self.expr(*left)),
                right: Box::new(self.expr(*right)),
            },
            ExprKind::Unary { op, operand } => ExprKind::Unary {
                op,
                operand: Box::new(self.expr(*operand)),
            },
            ExprKind::Attribute { value, attr } => ExprKind::Attribute {
                value: Box::new(self.expr(*value)),
                attr,
            },
            ExprKind::Subscript { value, index } => ExprKind::Subscript {
                value: Box::new(self.expr(*value)),
                index: Box::new(self.expr(*index)),
            },
            ExprKind::Slice { value, lower, upper } => ExprKind::Slice {
                value: Box::new(self.expr(*value)),
                lower: lower.map(|e| Box::new(self.expr(*e))),
                upper: upper.map(|e| Box::new(self.expr(*e))),
            },
            leaf => leaf,
        };
        Expr { kind, span }
    }

    /// Fold a constant `to_script_hash` argument to its 20-byte form.
    fn fold_script_hash(&mut self, arg: &Expr) -> Option<ExprKind> {
        match &arg.kind {
            ExprKind::Str(text) => match parse_script_hash(text) {
                Some(bytes) => Some(ExprKind::Bytes(bytes)),
                None => {
                    self.ctx.diagnostics.warning(CompilerWarning::InvalidArgument {
                        reason: format!("'{text}' is not a 20-byte script hash"),
                        span: arg.span,
                    });
                    None
                }
            },
            ExprKind::Bytes(bytes) => {
                if bytes.len() == 20 {
                    Some(ExprKind::Bytes(bytes.clone()))
                } else {
                    self.ctx.diagnostics.warning(CompilerWarning::InvalidArgument {
                        reason: format!("expected 20 bytes, got {}", bytes.len()),
                        span: arg.span,
                    });
                    None
                }
            }
            _ => None,
        }
    }

    fn fold_env(&mut self, arg: &Expr) -> Option<ExprKind> {
        match &arg.kind {
            ExprKind::Str(key) => match self.ctx.env.get(key) {
                Some(value) => Some(ExprKind::Str(value.clone())),
                None => {
                    self.ctx.diagnostics.warning(CompilerWarning::InvalidArgument {
                        reason: format!("environment key '{key}' is not set"),
                        span: arg.span,
                    });
                    Some(ExprKind::Str(String::new()))
                }
            },
            _ => None,
        }
    }
}

/// Parse a `0x`-prefixed 40-hex-digit string into the little-endian
/// 20-byte script hash.
fn parse_script_hash(text: &str) -> Option<Vec<u8>> {
    let hex = text.strip_prefix("0x")?;
    if hex.len() != 40 {
        return None;
    }
    let mut bytes = Vec::with_capacity(20);
    for i in (0..40).step_by(2) {
        bytes.push(u8::from_str_radix(&hex[i..i + 2], 16).ok()?);
    }
    // Hashes are written big-endian but stored little-endian.
    bytes.reverse();
    Some(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_parser::parse_module;
    use rustc_hash::FxHashMap;
    use std::path::PathBuf;

    fn rewrite(source: &str, env: &[(&str, &str)]) -> (CompilationContext, Module) {
        let mut map = FxHashMap::default();
        for (k, v) in env {
            map.insert(k.to_string(), v.to_string());
        }
        let mut ctx = CompilationContext::new(
            PathBuf::from("/virtual/test.ql"),
            PathBuf::from("/virtual"),
            map,
            false,
        );
        let ast = parse_module(source).unwrap();
        let rewritten = ConstructAnalyser::new(&mut ctx).rewrite(ast);
        (ctx, rewritten)
    }

    fn first_value(module: &Module) -> &Expr {
        match &module.stmts[0].kind {
            StmtKind::Assign { value, .. } => value,
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn constant_hash_string_folds_to_le_bytes() {
        let (ctx, module) = rewrite(
            "OWNER = to_script_hash('0x0102030405060708090a0b0c0d0e0f1011121314')\n",
            &[],
        );
        assert!(!ctx.diagnostics.has_warnings());
        match &first_value(&module).kind {
            ExprKind::Bytes(bytes) => {
                assert_eq!(bytes.len(), 20);
                assert_eq!(bytes[0], 0x14);
                assert_eq!(bytes[19], 0x01);
            }
            other => panic!("expected folded bytes, got {other:?}"),
        }
    }

    #[test]
    fn malformed_constant_warns_and_stays() {
        let (ctx, module) = rewrite("OWNER = to_script_hash('0x1234')\n", &[]);
        assert!(ctx
            .diagnostics
            .warnings()
            .iter()
            .any(|w| matches!(w.item, CompilerWarning::InvalidArgument { .. })));
        assert!(matches!(
            &first_value(&module).kind,
            ExprKind::Call { .. }
        ));
    }

    #[test]
    fn non_constant_argument_passes_through() {
        let (ctx, module) = rewrite(
            "def f(x: str) -> bytes:\n    return to_script_hash(x)\n",
            &[],
        );
        assert!(!ctx.diagnostics.has_warnings());
        match &module.stmts[0].kind {
            StmtKind::FunctionDef(f) => match &f.body[0].kind {
                StmtKind::Return { value: Some(v) } => {
                    assert!(matches!(v.kind, ExprKind::Call { .. }))
                }
                other => panic!("unexpected body {other:?}"),
            },
            other => panic!("unexpected stmt {other:?}"),
        }
    }

    #[test]
    fn env_folds_to_configured_value() {
        let (ctx, module) = rewrite("NET = env('network')\n", &[("network", "testnet")]);
        assert!(!ctx.diagnostics.has_warnings());
        assert_eq!(
            first_value(&module).kind,
            ExprKind::Str("testnet".to_string())
        );
    }

    #[test]
    fn missing_env_key_folds_to_empty_and_warns() {
        let (ctx, module) = rewrite("NET = env('missing')\n", &[]);
        assert!(ctx.diagnostics.has_warnings());
        assert_eq!(first_value(&module).kind, ExprKind::Str(String::new()));
    }
}
