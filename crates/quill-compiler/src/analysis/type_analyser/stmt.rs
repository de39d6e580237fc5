//! Statement checking: assignment targets, control-flow legality,
//! reachability, and the per-block termination analysis that backs
//! `MissingReturnStatement`.

use quill_core::{CompilerError, CompilerWarning, Symbol, Type};
use quill_parser::ast::{Expr, ExprKind, Stmt, StmtKind};

use super::{FunctionScope, TypeAnalyser};

impl TypeAnalyser<'_> {
    /// Analyse a block. Returns whether the block always terminates
    /// (returns or raises on every path).
    pub(crate) fn block(&mut self, stmts: &[Stmt], scope: &mut FunctionScope) -> bool {
        let mut terminated = false;
        let mut warned = false;
        for stmt in stmts {
            if terminated && !warned {
                self.ctx
                    .diagnostics
                    .warning(CompilerWarning::UnreachableCode { span: stmt.span });
                warned = true;
            }
            if self.stmt(stmt, scope) {
                terminated = true;
            }
            if self.ctx.diagnostics.should_stop() {
                break;
            }
        }
        terminated
    }

    /// Analyse one statement; true when it always terminates.
    fn stmt(&mut self, stmt: &Stmt, scope: &mut FunctionScope) -> bool {
        match &stmt.kind {
            StmtKind::Assign { target, value } => {
                let value_ty = self.infer(value, scope);
                self.assign(target, value_ty, value, scope);
                false
            }
            StmtKind::AnnAssign {
                target,
                annotation,
                value,
            } => {
                let declared = match crate::analysis::resolve_annotation(annotation, &self.ctx.symbols)
                {
                    Ok(ty) => ty,
                    Err(err) => {
                        self.ctx.diagnostics.error(err);
                        Type::Any
                    }
                };
                let value_ty = self.infer(value, scope);
                self.check_assignable(&declared, &value_ty, value.span);
                if let ExprKind::Name(name) = &target.kind {
                    if scope.local(name).is_some() {
                        self.ctx.diagnostics.warning(CompilerWarning::RedeclaredSymbol {
                            name: name.clone(),
                            span: target.span,
                        });
                    }
                }
                self.assign(target, declared, value, scope);
                false
            }
            StmtKind::AugAssign { target, op, value } => {
                let target_ty = self.infer(target, scope);
                let value_ty = self.infer(value, scope);
                match target_ty.binary_result(*op, &value_ty) {
                    Some(result) => self.assign(target, result, value, scope),
                    None => self.ctx.diagnostics.error(CompilerError::UnresolvedOperation {
                        type_name: target_ty.to_string(),
                        operator: op.symbol().to_string(),
                        span: stmt.span,
                    }),
                }
                false
            }
            StmtKind::If { branches, orelse } => {
                let mut all_terminate = true;
                for (cond, body) in branches {
                    self.infer(cond, scope);
                    if !self.block(body, scope) {
                        all_terminate = false;
                    }
                }
                if orelse.is_empty() {
                    false
                } else {
                    self.block(orelse, scope) && all_terminate
                }
            }
            StmtKind::While { cond, body } => {
                self.infer(cond, scope);
                scope.loop_depth += 1;
                self.block(body, scope);
                scope.loop_depth -= 1;
                false
            }
            StmtKind::For { target, iter, body } => {
                let iter_ty = self.infer(iter, scope);
                let element = match &iter_ty {
                    ty if ty.is_sequence() || ty.is_any() => {
                        ty.element_type().unwrap_or(Type::Any)
                    }
                    other => {
                        self.ctx.diagnostics.error(CompilerError::NotSupportedOperation {
                            symbol: format!("iteration over '{other}'"),
                            span: iter.span,
                        });
                        Type::Any
                    }
                };
                self.declare_loop_target(target, element, stmt, scope);
                scope.hidden_loop_slots(iter_ty);
                scope.loop_depth += 1;
                self.block(body, scope);
                scope.loop_depth -= 1;
                false
            }
            StmtKind::Return { value } => {
                self.check_return(value.as_ref(), stmt, scope);
                true
            }
            StmtKind::Raise { exc } => {
                self.infer(exc, scope);
                true
            }
            StmtKind::Expr(expr) => {
                self.infer(expr, scope);
                false
            }
            StmtKind::Break | StmtKind::Continue => {
                if scope.loop_depth == 0 {
                    self.ctx.diagnostics.error(CompilerError::NotSupportedOperation {
                        symbol: match stmt.kind {
                            StmtKind::Break => "break outside loop".to_string(),
                            _ => "continue outside loop".to_string(),
                        },
                        span: stmt.span,
                    });
                }
                false
            }
            StmtKind::Pass => false,
            // Imports and nested definitions are module-level constructs.
            StmtKind::Import { .. }
            | StmtKind::FromImport { .. }
            | StmtKind::FunctionDef(_)
            | StmtKind::ClassDef(_) => {
                self.ctx.diagnostics.error(CompilerError::NotSupportedOperation {
                    symbol: "nested declaration".to_string(),
                    span: stmt.span,
                });
                false
            }
        }
    }

    fn declare_loop_target(
        &mut self,
        target: &str,
        element: Type,
        stmt: &Stmt,
        scope: &mut FunctionScope,
    ) {
        if scope.param(target).is_some() {
            self.ctx.diagnostics.error(CompilerError::DuplicatedIdentifier {
                name: target.to_string(),
                span: stmt.span,
            });
            return;
        }
        if self.is_global_name(target) {
            self.ctx.diagnostics.warning(CompilerWarning::NameShadowing {
                name: target.to_string(),
                span: stmt.span,
            });
        }
        scope.assign_local(target, element);
    }

    fn check_return(&mut self, value: Option<&Expr>, stmt: &Stmt, scope: &mut FunctionScope) {
        match value {
            None => {
                if scope.method.return_type != Type::None {
                    self.ctx.diagnostics.error(CompilerError::MismatchedTypes {
                        expected: scope.method.return_type.to_string(),
                        found: Type::None.to_string(),
                        span: stmt.span,
                    });
                }
            }
            Some(expr) => {
                if let ExprKind::Tuple(items) = &expr.kind {
                    if items.len() > 1 {
                        self.ctx
                            .diagnostics
                            .error(CompilerError::TooManyReturns { span: expr.span });
                        return;
                    }
                }
                let found = self.infer(expr, scope);
                if scope.method.return_type == Type::None && found != Type::None {
                    self.ctx.diagnostics.error(CompilerError::MismatchedTypes {
                        expected: Type::None.to_string(),
                        found: found.to_string(),
                        span: expr.span,
                    });
                    return;
                }
                let expected = scope.method.return_type.clone();
                self.check_assignable(&expected, &found, expr.span);
            }
        }
    }

    /// Check value-into-slot compatibility, warning on downcasts.
    pub(crate) fn check_assignable(&mut self, expected: &Type, found: &Type, span: quill_core::Span) {
        use quill_core::Compatibility;
        match expected.accepts(found) {
            Compatibility::Compatible => {}
            Compatibility::Downcast => {
                self.ctx.diagnostics.warning(CompilerWarning::TypeCasting {
                    from: found.to_string(),
                    to: expected.to_string(),
                    span,
                });
            }
            Compatibility::Incompatible => {
                self.ctx.diagnostics.error(CompilerError::MismatchedTypes {
                    expected: expected.to_string(),
                    found: found.to_string(),
                    span,
                });
            }
        }
    }

    /// Route an assignment to its target form.
    fn assign(&mut self, target: &Expr, value_ty: Type, value: &Expr, scope: &mut FunctionScope) {
        match &target.kind {
            ExprKind::Name(name) => {
                if name == "self" {
                    self.ctx.diagnostics.error(CompilerError::SelfArgument {
                        method: scope.method.name.clone(),
                        span: target.span,
                    });
                    return;
                }
                if let Some(param) = scope.param(name) {
                    let expected = param.ty.clone();
                    self.check_assignable(&expected, &value_ty, value.span);
                    return;
                }
                if scope.local(name).is_none() && self.is_global_name(name) {
                    self.ctx.diagnostics.warning(CompilerWarning::NameShadowing {
                        name: name.clone(),
                        span: target.span,
                    });
                }
                scope.assign_local(name, value_ty);
            }
            ExprKind::Attribute { value: obj, attr } => {
                let obj_ty = self.infer(obj, scope);
                match &obj_ty {
                    Type::Class(class) => {
                        let field_ty = self
                            .ctx
                            .symbols
                            .get(&class.name)
                            .and_then(|s| match s {
                                Symbol::Class(c) => c
                                    .fields
                                    .iter()
                                    .find(|(n, _)| n == attr)
                                    .map(|(_, t)| t.clone()),
                                _ => None,
                            });
                        match field_ty {
                            Some(expected) => self.check_assignable(&expected, &value_ty, value.span),
                            None => self.ctx.diagnostics.error(CompilerError::UnresolvedReference {
                                name: format!("{}.{attr}", class.name),
                                span: target.span,
                            }),
                        }
                    }
                    Type::Any => {}
                    other => self.ctx.diagnostics.error(CompilerError::NotSupportedOperation {
                        symbol: format!("attribute assignment on '{other}'"),
                        span: target.span,
                    }),
                }
            }
            ExprKind::Subscript { value: obj, index } => {
                let obj_ty = self.infer(obj, scope);
                let index_ty = self.infer(index, scope);
                match &obj_ty {
                    Type::List(elem) => {
                        self.check_assignable(&Type::Int, &index_ty, index.span);
                        let expected = (**elem).clone();
                        self.check_assignable(&expected, &value_ty, value.span);
                    }
                    Type::Dict(key, val) => {
                        let key_ty = (**key).clone();
                        let val_ty = (**val).clone();
                        self.check_assignable(&key_ty, &index_ty, index.span);
                        self.check_assignable(&val_ty, &value_ty, value.span);
                    }
                    Type::Any => {}
                    other => self.ctx.diagnostics.error(CompilerError::NotSupportedOperation {
                        symbol: format!("subscript assignment on '{other}'"),
                        span: target.span,
                    }),
                }
            }
            _ => self.ctx.diagnostics.error(CompilerError::NotSupportedOperation {
                symbol: "assignment target".to_string(),
                span: target.span,
            }),
        }
    }

    pub(crate) fn is_global_name(&self, name: &str) -> bool {
        matches!(
            self.ctx.symbols.get(name),
            Some(Symbol::Variable(v)) if v.is_global
        )
    }
}
