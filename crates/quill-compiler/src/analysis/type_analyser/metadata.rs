//! Interpretation of the `@metadata` function.
//!
//! The function is never compiled. Its body is a restricted declarative
//! dialect over a single parameter, the metadata object: attribute
//! assignments declare manifest fields, and a small set of method calls
//! declare permissions, trusted sources, and groups. Every value must be
//! a literal; anything else has no compile-time meaning and is rejected.

use quill_core::{
    CompilerError, PermissionContract, PermissionMethods, Value,
};
use quill_parser::ast::{Expr, ExprKind, FunctionDef, Stmt, StmtKind};

use super::{value_to_json, TypeAnalyser};
use crate::analysis::const_value;

impl TypeAnalyser<'_> {
    /// Interpret one `@metadata` function into the context's metadata.
    pub(crate) fn interpret_metadata(&mut self, func: &FunctionDef) {
        if func.params.len() != 1 {
            self.ctx.diagnostics.error(CompilerError::MetadataImplementationIncorrect {
                symbol: func.name.clone(),
                span: func.span,
            });
            return;
        }
        let receiver = func.params[0].name.clone();

        let mut declared_anything = false;
        for stmt in &func.body {
            if self.metadata_stmt(stmt, &receiver, &func.name) {
                declared_anything = true;
            }
            if self.ctx.diagnostics.should_stop() {
                return;
            }
        }
        if !declared_anything {
            self.ctx.diagnostics.error(CompilerError::MetadataImplementationMissing {
                symbol: func.name.clone(),
                span: func.span,
            });
        }
    }

    /// Interpret one statement; true when it declared something.
    fn metadata_stmt(&mut self, stmt: &Stmt, receiver: &str, func_name: &str) -> bool {
        match &stmt.kind {
            StmtKind::Pass => false,
            StmtKind::Return { value: None } => false,
            StmtKind::Assign { target, value } => {
                let ExprKind::Attribute { value: obj, attr } = &target.kind else {
                    return self.reject(func_name, stmt);
                };
                if !matches!(&obj.kind, ExprKind::Name(n) if n == receiver) {
                    return self.reject(func_name, stmt);
                }
                let Some(constant) = const_value(value) else {
                    return self.reject(func_name, stmt);
                };
                self.metadata_attribute(attr, constant, func_name, stmt)
            }
            StmtKind::Expr(expr) => {
                let ExprKind::Call { func, args, kwargs } = &expr.kind else {
                    return self.reject(func_name, stmt);
                };
                let ExprKind::Attribute { value: obj, attr } = &func.kind else {
                    return self.reject(func_name, stmt);
                };
                if !matches!(&obj.kind, ExprKind::Name(n) if n == receiver) {
                    return self.reject(func_name, stmt);
                }
                self.metadata_call(attr, args, kwargs, func_name, stmt)
            }
            _ => self.reject(func_name, stmt),
        }
    }

    fn metadata_attribute(
        &mut self,
        attr: &str,
        constant: Value,
        func_name: &str,
        stmt: &Stmt,
    ) -> bool {
        match (attr, &constant) {
            ("name", Value::Str(v)) => self.ctx.metadata.name = Some(v.clone()),
            ("author", Value::Str(v)) => self.ctx.metadata.author = Some(v.clone()),
            ("email", Value::Str(v)) => self.ctx.metadata.email = Some(v.clone()),
            ("description", Value::Str(v)) => self.ctx.metadata.description = Some(v.clone()),
            ("supported_standards", Value::List(items)) => {
                for item in items {
                    match item {
                        Value::Str(tag) => self.ctx.metadata.add_standard(tag.clone()),
                        _ => {
                            return self.reject(func_name, stmt);
                        }
                    }
                }
            }
            ("name" | "author" | "email" | "description" | "supported_standards", _) => {
                return self.reject(func_name, stmt);
            }
            // Unknown attributes surface in the manifest's `extra` map.
            (other, value) => {
                self.ctx
                    .metadata
                    .set_extra(other.to_string(), value_to_json(value));
            }
        }
        true
    }

    fn metadata_call(
        &mut self,
        method: &str,
        args: &[Expr],
        kwargs: &[(String, Expr)],
        func_name: &str,
        stmt: &Stmt,
    ) -> bool {
        match method {
            "add_permission" => {
                let contract = kwarg_const(kwargs, "contract");
                let methods = kwarg_const(kwargs, "methods");
                if contract.is_none() && methods.is_none() {
                    self.ctx.diagnostics.error(CompilerError::MetadataInformationMissing {
                        info: "add_permission contract or methods".to_string(),
                        span: stmt.span,
                    });
                    return false;
                }
                let contract = match contract {
                    None => PermissionContract::Wildcard,
                    Some(Value::Str(s)) if s == "*" => PermissionContract::Wildcard,
                    Some(Value::Str(s)) if s.starts_with("0x") => PermissionContract::Hash(s),
                    Some(Value::Str(s)) => PermissionContract::Group(s),
                    Some(_) => return self.reject(func_name, stmt),
                };
                let methods = match methods {
                    None => PermissionMethods::Wildcard,
                    Some(Value::Str(s)) if s == "*" => PermissionMethods::Wildcard,
                    Some(Value::List(items)) => {
                        let mut names = Vec::new();
                        for item in items {
                            match item {
                                Value::Str(name) => names.push(name),
                                _ => return self.reject(func_name, stmt),
                            }
                        }
                        PermissionMethods::List(names)
                    }
                    Some(_) => return self.reject(func_name, stmt),
                };
                self.ctx.metadata.add_permission(contract, methods);
                true
            }
            "add_trusted_source" => match args {
                [] => {
                    self.ctx.metadata.add_trust(None);
                    true
                }
                [arg] => match const_value(arg) {
                    Some(Value::Str(s)) if s == "*" => {
                        self.ctx.metadata.add_trust(None);
                        true
                    }
                    Some(Value::Str(hash)) => {
                        self.ctx.metadata.add_trust(Some(hash));
                        true
                    }
                    _ => self.reject(func_name, stmt),
                },
                _ => self.reject(func_name, stmt),
            },
            "add_group" => {
                let pubkey = positional_or_kwarg(args, kwargs, 0, "pubkey");
                let signature = positional_or_kwarg(args, kwargs, 1, "signature");
                match (pubkey, signature) {
                    (Some(Value::Str(pubkey)), Some(Value::Str(signature))) => {
                        self.ctx.metadata.add_group(pubkey, signature);
                        true
                    }
                    _ => {
                        self.ctx.diagnostics.error(CompilerError::MetadataInformationMissing {
                            info: "add_group pubkey and signature".to_string(),
                            span: stmt.span,
                        });
                        false
                    }
                }
            }
            _ => self.reject(func_name, stmt),
        }
    }

    fn reject(&mut self, func_name: &str, stmt: &Stmt) -> bool {
        self.ctx.diagnostics.error(CompilerError::MetadataImplementationIncorrect {
            symbol: func_name.to_string(),
            span: stmt.span,
        });
        false
    }
}

fn kwarg_const(kwargs: &[(String, Expr)], key: &str) -> Option<Value> {
    kwargs
        .iter()
        .find(|(k, _)| k == key)
        .and_then(|(_, v)| const_value(v))
}

fn positional_or_kwarg(
    args: &[Expr],
    kwargs: &[(String, Expr)],
    index: usize,
    key: &str,
) -> Option<Value> {
    args.get(index)
        .and_then(const_value)
        .or_else(|| kwarg_const(kwargs, key))
}
