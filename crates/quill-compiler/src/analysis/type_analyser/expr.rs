//! Expression inference and call checking.

use quill_core::{
    BinaryOp, BuiltinKind, BuiltinLowering, BuiltinSymbol, CompilerError, CompilerWarning,
    Parameter, Span, Symbol, Type,
};
use quill_parser::ast::{Expr, ExprKind};

use super::{FunctionScope, TypeAnalyser};

impl TypeAnalyser<'_> {
    /// Infer an expression's type, recording diagnostics along the way.
    /// Failing nodes come back as `Any` so the walk can continue.
    pub(crate) fn infer(&mut self, expr: &Expr, scope: &mut FunctionScope) -> Type {
        match &expr.kind {
            ExprKind::Name(name) => self.name_type(name, scope, expr.span),
            ExprKind::Int(_) => Type::Int,
            ExprKind::Str(_) => Type::Str,
            ExprKind::Bytes(_) => Type::Bytes,
            ExprKind::Bool(_) => Type::Bool,
            ExprKind::NoneLit => Type::None,
            ExprKind::List(items) => {
                let element =
                    Type::union_of(items.iter().map(|i| self.infer(i, scope)).collect());
                Type::List(Box::new(element))
            }
            ExprKind::Tuple(items) => {
                Type::Tuple(items.iter().map(|i| self.infer(i, scope)).collect())
            }
            ExprKind::Dict(pairs) => {
                let keys = Type::union_of(pairs.iter().map(|(k, _)| self.infer(k, scope)).collect());
                let values =
                    Type::union_of(pairs.iter().map(|(_, v)| self.infer(v, scope)).collect());
                Type::Dict(Box::new(keys), Box::new(values))
            }
            ExprKind::Binary { op, left, right } => {
                let left_ty = self.infer(left, scope);
                let right_ty = self.infer(right, scope);
                // Membership resolves against the container operand.
                let (operand, result) = if matches!(op, BinaryOp::In | BinaryOp::NotIn) {
                    (right_ty.clone(), right_ty.binary_result(*op, &left_ty))
                } else {
                    (left_ty.clone(), left_ty.binary_result(*op, &right_ty))
                };
                match result {
                    Some(ty) => ty,
                    None => {
                        self.ctx.diagnostics.error(CompilerError::UnresolvedOperation {
                            type_name: operand.to_string(),
                            operator: op.symbol().to_string(),
                            span: expr.span,
                        });
                        Type::Any
                    }
                }
            }
            ExprKind::Unary { op, operand } => {
                let operand_ty = self.infer(operand, scope);
                match operand_ty.unary_result(*op) {
                    Some(ty) => ty,
                    None => {
                        self.ctx.diagnostics.error(CompilerError::UnresolvedOperation {
                            type_name: operand_ty.to_string(),
                            operator: op.symbol().to_string(),
                            span: expr.span,
                        });
                        Type::Any
                    }
                }
            }
            ExprKind::Call { func, args, kwargs } => self.infer_call(expr, func, args, kwargs, scope),
            ExprKind::Attribute { value, attr } => self.infer_attribute(expr, value, attr, scope),
            ExprKind::Subscript { value, index } => {
                let value_ty = self.infer(value, scope);
                let index_ty = self.infer(index, scope);
                match &value_ty {
                    Type::Dict(key, val) => {
                        let expected = (**key).clone();
                        self.check_assignable(&expected, &index_ty, index.span);
                        (**val).clone()
                    }
                    ty if ty.is_sequence() || ty.is_any() => {
                        self.check_assignable(&Type::Int, &index_ty, index.span);
                        ty.element_type().unwrap_or(Type::Any)
                    }
                    other => {
                        self.ctx.diagnostics.error(CompilerError::NotSupportedOperation {
                            symbol: format!("subscript on '{other}'"),
                            span: expr.span,
                        });
                        Type::Any
                    }
                }
            }
            ExprKind::Slice { value, lower, upper } => {
                let value_ty = self.infer(value, scope);
                for bound in [lower, upper].into_iter().flatten() {
                    let bound_ty = self.infer(bound, scope);
                    self.check_assignable(&Type::Int, &bound_ty, bound.span);
                }
                // Slicing is defined on byte and character sequences only;
                // the VM has no array-copy primitive.
                match &value_ty {
                    ty if ty.is_chars() => ty.clone(),
                    Type::Any => Type::Any,
                    other => {
                        self.ctx.diagnostics.error(CompilerError::NotSupportedOperation {
                            symbol: format!("slice of '{other}'"),
                            span: expr.span,
                        });
                        Type::Any
                    }
                }
            }
        }
    }

    fn infer_call(
        &mut self,
        expr: &Expr,
        func: &Expr,
        args: &[Expr],
        kwargs: &[(String, Expr)],
        scope: &mut FunctionScope,
    ) -> Type {
        match &func.kind {
            ExprKind::Name(name) => {
                let name = name.clone();
                match self.ctx.symbols.get(&name).cloned() {
                    Some(Symbol::Method(method)) => {
                        self.check_call(&name, &method.params, args, kwargs, expr.span, scope);
                        method.return_type
                    }
                    Some(Symbol::Class(class)) => {
                        match class.method("__init__") {
                            Some(init) => {
                                let params = init.params.clone();
                                self.check_call(&name, &params, args, kwargs, expr.span, scope);
                            }
                            None => {
                                if !args.is_empty() || !kwargs.is_empty() {
                                    self.ctx.diagnostics.error(CompilerError::UnexpectedArgument {
                                        callable: name.clone(),
                                        span: expr.span,
                                    });
                                }
                            }
                        }
                        class.instance_type()
                    }
                    Some(Symbol::Event(event)) => {
                        let params = event.params.clone();
                        self.check_call(&name, &params, args, kwargs, expr.span, scope);
                        Type::None
                    }
                    Some(Symbol::Builtin(builtin)) => {
                        self.check_builtin_call(&builtin, args, kwargs, expr.span, scope)
                    }
                    Some(other) => {
                        self.ctx.diagnostics.error(CompilerError::NotSupportedOperation {
                            symbol: format!("call of {} '{name}'", other.kind_name()),
                            span: expr.span,
                        });
                        Type::Any
                    }
                    None => {
                        self.ctx.diagnostics.error(CompilerError::UnresolvedReference {
                            name,
                            span: func.span,
                        });
                        Type::Any
                    }
                }
            }
            ExprKind::Attribute { value, attr } => {
                // super().__init__(...) inside a derived-class method.
                if is_super_call(value) {
                    return self.check_super_init(attr, args, kwargs, expr.span, scope);
                }
                // Builtin module member, e.g. storage.put(...).
                if let ExprKind::Name(module) = &value.kind {
                    if let Some(Symbol::Builtin(builtin)) = self.ctx.symbols.get(module) {
                        if matches!(builtin.kind, BuiltinKind::Module { .. }) {
                            let builtin = builtin.clone();
                            return match builtin.member(attr).cloned() {
                                Some(member) => {
                                    self.check_builtin_call(&member, args, kwargs, expr.span, scope)
                                }
                                None => {
                                    self.ctx.diagnostics.error(CompilerError::UnresolvedReference {
                                        name: format!("{module}.{attr}"),
                                        span: expr.span,
                                    });
                                    Type::Any
                                }
                            };
                        }
                    }
                }
                // Instance method call.
                let value_ty = self.infer(value, scope);
                match &value_ty {
                    Type::Class(class) => {
                        let method = self.ctx.symbols.get(&class.name).and_then(|s| match s {
                            Symbol::Class(c) => c.method(attr).cloned(),
                            _ => None,
                        });
                        match method {
                            Some(method) => {
                                let callable = format!("{}.{attr}", class.name);
                                self.check_call(
                                    &callable,
                                    &method.params,
                                    args,
                                    kwargs,
                                    expr.span,
                                    scope,
                                );
                                method.return_type
                            }
                            None => {
                                self.ctx.diagnostics.error(CompilerError::UnresolvedReference {
                                    name: format!("{}.{attr}", class.name),
                                    span: expr.span,
                                });
                                Type::Any
                            }
                        }
                    }
                    Type::Any => {
                        for arg in args {
                            self.infer(arg, scope);
                        }
                        Type::Any
                    }
                    other => {
                        self.ctx.diagnostics.error(CompilerError::NotSupportedOperation {
                            symbol: format!("method call on '{other}'"),
                            span: expr.span,
                        });
                        Type::Any
                    }
                }
            }
            _ => {
                self.ctx.diagnostics.error(CompilerError::NotSupportedOperation {
                    symbol: "call target".to_string(),
                    span: expr.span,
                });
                Type::Any
            }
        }
    }

    fn check_super_init(
        &mut self,
        attr: &str,
        args: &[Expr],
        kwargs: &[(String, Expr)],
        span: Span,
        scope: &mut FunctionScope,
    ) -> Type {
        let base = scope.class.as_deref().and_then(|class_name| {
            match self.ctx.symbols.get(class_name) {
                Some(Symbol::Class(c)) => c.base.clone(),
                _ => None,
            }
        });
        let Some(base_name) = base else {
            self.ctx.diagnostics.error(CompilerError::NotSupportedOperation {
                symbol: "super() outside a derived class".to_string(),
                span,
            });
            return Type::Any;
        };
        if attr != "__init__" {
            self.ctx.diagnostics.error(CompilerError::NotSupportedOperation {
                symbol: format!("super().{attr}"),
                span,
            });
            return Type::Any;
        }
        scope.super_called = true;
        let init = match self.ctx.symbols.get(&base_name) {
            Some(Symbol::Class(c)) => c.method("__init__").cloned(),
            _ => None,
        };
        if let Some(init) = init {
            let callable = format!("{base_name}.__init__");
            self.check_call(&callable, &init.params, args, kwargs, span, scope);
        } else if !args.is_empty() || !kwargs.is_empty() {
            self.ctx.diagnostics.error(CompilerError::UnexpectedArgument {
                callable: format!("{base_name}.__init__"),
                span,
            });
        }
        Type::None
    }

    /// Validate a call against a parameter list: positional then keyword,
    /// defaults filling the rest. Each bound argument is type checked.
    pub(crate) fn check_call(
        &mut self,
        callable: &str,
        params: &[Parameter],
        args: &[Expr],
        kwargs: &[(String, Expr)],
        span: Span,
        scope: &mut FunctionScope,
    ) {
        if args.len() > params.len() {
            for arg in args {
                self.infer(arg, scope);
            }
            self.ctx.diagnostics.error(CompilerError::UnexpectedArgument {
                callable: callable.to_string(),
                span,
            });
            return;
        }
        let mut filled = vec![false; params.len()];
        for (param, arg) in params.iter().zip(args) {
            let found = self.infer(arg, scope);
            let expected = param.ty.clone();
            self.check_assignable(&expected, &found, arg.span);
        }
        for f in filled.iter_mut().take(args.len()) {
            *f = true;
        }
        for (key, value) in kwargs {
            match params.iter().position(|p| p.name == *key) {
                Some(index) => {
                    if filled[index] {
                        self.ctx.diagnostics.error(CompilerError::UnexpectedArgument {
                            callable: callable.to_string(),
                            span: value.span,
                        });
                        continue;
                    }
                    filled[index] = true;
                    let found = self.infer(value, scope);
                    let expected = params[index].ty.clone();
                    self.check_assignable(&expected, &found, value.span);
                }
                None => {
                    self.infer(value, scope);
                    self.ctx.diagnostics.error(CompilerError::UnexpectedArgument {
                        callable: callable.to_string(),
                        span: value.span,
                    });
                }
            }
        }
        for (param, filled) in params.iter().zip(&filled) {
            if !filled && param.default.is_none() {
                self.ctx.diagnostics.error(CompilerError::UnfilledArgument {
                    callable: callable.to_string(),
                    parameter: param.name.clone(),
                    span,
                });
                return;
            }
        }
    }

    /// Enforce a one-positional-argument shape and infer that argument.
    fn single_arg(
        &mut self,
        callable: &str,
        args: &[Expr],
        kwargs: &[(String, Expr)],
        span: Span,
        scope: &mut FunctionScope,
    ) -> Option<Type> {
        if args.is_empty() && kwargs.is_empty() {
            self.ctx.diagnostics.error(CompilerError::UnfilledArgument {
                callable: callable.to_string(),
                parameter: "value".to_string(),
                span,
            });
            return None;
        }
        if args.len() != 1 || !kwargs.is_empty() {
            self.ctx.diagnostics.error(CompilerError::UnexpectedArgument {
                callable: callable.to_string(),
                span,
            });
            return None;
        }
        Some(self.infer(&args[0], scope))
    }

    fn check_builtin_call(
        &mut self,
        builtin: &BuiltinSymbol,
        args: &[Expr],
        kwargs: &[(String, Expr)],
        span: Span,
        scope: &mut FunctionScope,
    ) -> Type {
        if builtin.deprecated {
            self.ctx.diagnostics.warning(CompilerWarning::DeprecatedSymbol {
                name: builtin.name.clone(),
                span,
            });
        }
        let BuiltinKind::Method {
            params,
            return_type,
            lowering,
        } = &builtin.kind
        else {
            self.ctx.diagnostics.error(CompilerError::InvalidBuiltinUsage {
                name: builtin.name.clone(),
                span,
            });
            return Type::Any;
        };
        match lowering {
            // Valid only as a module-level assignment; the module
            // analyser consumed those, so reaching here is misuse.
            BuiltinLowering::CreateEvent => {
                self.ctx.diagnostics.error(CompilerError::InvalidBuiltinUsage {
                    name: builtin.name.clone(),
                    span,
                });
                Type::Any
            }
            // Constant arguments were folded away by the construct
            // analyser; a surviving call has a runtime argument.
            BuiltinLowering::Env => {
                self.ctx.diagnostics.error(CompilerError::InvalidBuiltinUsage {
                    name: builtin.name.clone(),
                    span,
                });
                Type::Str
            }
            BuiltinLowering::Len => {
                match self.single_arg(&builtin.name, args, kwargs, span, scope) {
                    Some(ty)
                        if ty.is_sequence() || matches!(ty, Type::Dict(_, _) | Type::Any) => {}
                    Some(_) => {
                        self.ctx.diagnostics.error(CompilerError::InvalidBuiltinUsage {
                            name: builtin.name.clone(),
                            span,
                        });
                    }
                    None => {}
                }
                Type::Int
            }
            BuiltinLowering::ToScriptHash => {
                match self.single_arg(&builtin.name, args, kwargs, span, scope) {
                    Some(Type::Str | Type::Bytes | Type::UInt160 | Type::Any) | None => {}
                    Some(_) => {
                        self.ctx.diagnostics.error(CompilerError::InvalidBuiltinUsage {
                            name: builtin.name.clone(),
                            span,
                        });
                    }
                }
                Type::UInt160
            }
            BuiltinLowering::CallContract => {
                self.check_call(&builtin.name, params, args, kwargs, span, scope);
                // The CALLT token needs the target and method at compile
                // time, and a literal argument list for its arity.
                let hash_ok = matches!(args.first().map(|a| &a.kind), Some(ExprKind::Bytes(b)) if b.len() == 20);
                let method_ok = matches!(args.get(1).map(|a| &a.kind), Some(ExprKind::Str(_)));
                let args_ok = matches!(args.get(2).map(|a| &a.kind), Some(ExprKind::List(_)));
                if !(hash_ok && method_ok && args_ok) {
                    self.ctx.diagnostics.error(CompilerError::NotSupportedOperation {
                        symbol: "call_contract with non-constant target".to_string(),
                        span,
                    });
                }
                Type::Any
            }
            _ => {
                self.check_call(&builtin.name, params, args, kwargs, span, scope);
                return_type.clone()
            }
        }
    }

    fn infer_attribute(
        &mut self,
        expr: &Expr,
        value: &Expr,
        attr: &str,
        scope: &mut FunctionScope,
    ) -> Type {
        // Builtin module property, e.g. runtime.time.
        if let ExprKind::Name(module) = &value.kind {
            if let Some(Symbol::Builtin(builtin)) = self.ctx.symbols.get(module) {
                if matches!(builtin.kind, BuiltinKind::Module { .. }) {
                    return match builtin.member(attr) {
                        Some(member) => match &member.kind {
                            BuiltinKind::Property { ty, .. } => ty.clone(),
                            // A bare method reference has no value form.
                            _ => {
                                let name = format!("{module}.{attr}");
                                self.ctx.diagnostics.error(CompilerError::InvalidBuiltinUsage {
                                    name,
                                    span: expr.span,
                                });
                                Type::Any
                            }
                        },
                        None => {
                            self.ctx.diagnostics.error(CompilerError::UnresolvedReference {
                                name: format!("{module}.{attr}"),
                                span: expr.span,
                            });
                            Type::Any
                        }
                    };
                }
            }
        }
        let value_ty = self.infer(value, scope);
        match &value_ty {
            Type::Class(class) => {
                let field = self.ctx.symbols.get(&class.name).and_then(|s| match s {
                    Symbol::Class(c) => c
                        .fields
                        .iter()
                        .find(|(n, _)| n == attr)
                        .map(|(_, t)| t.clone()),
                    _ => None,
                });
                match field {
                    Some(ty) => ty,
                    None => {
                        self.ctx.diagnostics.error(CompilerError::UnresolvedReference {
                            name: format!("{}.{attr}", class.name),
                            span: expr.span,
                        });
                        Type::Any
                    }
                }
            }
            Type::Any => Type::Any,
            other => {
                self.ctx.diagnostics.error(CompilerError::NotSupportedOperation {
                    symbol: format!("attribute access on '{other}'"),
                    span: expr.span,
                });
                Type::Any
            }
        }
    }
}

/// Whether an expression is the `super()` call form.
fn is_super_call(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Call { func, args, kwargs } => {
            args.is_empty()
                && kwargs.is_empty()
                && matches!(&func.kind, ExprKind::Name(n) if n == "super")
        }
        _ => false,
    }
}
