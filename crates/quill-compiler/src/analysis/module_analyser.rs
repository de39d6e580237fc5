//! The module analyser.
//!
//! Resolves imports transitively, parses every reachable file once, and
//! flattens the declared symbols of the whole program into the context's
//! single global table. Cycles are caught against the active import stack
//! and reported as `CircularImport` at the offending import statement.
//!
//! Only declarations are processed here; function bodies are left for the
//! type analyser. Files come back in post-order (imports before their
//! importers) so later passes see dependencies first.

use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use quill_core::{
    ClassSymbol, CompilerError, CompilerWarning, EventSymbol, ImportSymbol, MethodSymbol, Origin,
    Parameter, Span, Symbol, Type, Value, VariableSymbol,
};
use quill_parser::ast::{ClassDef, Expr, ExprKind, FunctionDef, Module, Stmt, StmtKind};
use quill_parser::parse_module;

use crate::analysis::{const_value, resolve_annotation, AnalysedModule};
use crate::context::CompilationContext;

/// Flattens the import graph rooted at the entry source.
pub struct ModuleAnalyser<'a> {
    ctx: &'a mut CompilationContext,
    modules: Vec<AnalysedModule>,
}

impl<'a> ModuleAnalyser<'a> {
    pub fn new(ctx: &'a mut CompilationContext) -> Self {
        Self {
            ctx,
            modules: Vec::new(),
        }
    }

    /// Analyse the entry file's source and everything it imports.
    pub fn analyse(mut self, source: &str) -> Vec<AnalysedModule> {
        let entry = canonical(&self.ctx.entry_file);
        self.analyse_source(entry, source);
        self.modules
    }

    fn analyse_source(&mut self, path: PathBuf, source: &str) {
        self.ctx.begin_file(path.clone());
        let previous = self.ctx.diagnostics.set_current_file(Some(path.clone()));

        let ast = match parse_module(source) {
            Ok(ast) => ast,
            Err(err) => {
                self.ctx.diagnostics.error(err.into());
                self.ctx.diagnostics.set_current_file(previous);
                self.ctx.finish_file();
                return;
            }
        };

        // Imports first, so this file's declarations can reference them.
        for stmt in &ast.stmts {
            match &stmt.kind {
                StmtKind::Import { module } => {
                    if let Some(target) = self.resolve_import(module, stmt.span) {
                        // Restore attribution after the imported file.
                        self.ctx.diagnostics.set_current_file(Some(path.clone()));
                        let exported = self.public_names();
                        self.declare(
                            module.clone(),
                            Symbol::Import(ImportSymbol {
                                path: target,
                                exported,
                                origin: Origin::at(stmt.span),
                            }),
                            stmt.span,
                        );
                    }
                }
                StmtKind::FromImport { module, names } => {
                    if self.resolve_import(module, stmt.span).is_some() {
                        self.ctx.diagnostics.set_current_file(Some(path.clone()));
                        for name in names {
                            if !self.ctx.symbols.contains(name) {
                                self.ctx.diagnostics.error(CompilerError::UnresolvedReference {
                                    name: name.clone(),
                                    span: stmt.span,
                                });
                            }
                        }
                    }
                }
                _ => {}
            }
            if self.ctx.diagnostics.should_stop() {
                self.ctx.diagnostics.set_current_file(previous);
                self.ctx.finish_file();
                return;
            }
        }

        // Classes before functions, so signatures can name them.
        for stmt in &ast.stmts {
            if let StmtKind::ClassDef(class) = &stmt.kind {
                self.declare_class(class);
            }
        }

        let mut metadata_functions = Vec::new();
        for stmt in &ast.stmts {
            match &stmt.kind {
                StmtKind::FunctionDef(func) => {
                    if func.decorator("metadata").is_some() {
                        if !metadata_functions.is_empty() {
                            self.ctx.diagnostics.warning(CompilerWarning::RedeclaredSymbol {
                                name: func.name.clone(),
                                span: func.span,
                            });
                        }
                        metadata_functions.push(func.name.clone());
                    } else if let Some(symbol) = self.build_method(func, None) {
                        self.declare(func.name.clone(), Symbol::Method(symbol), func.span);
                    }
                }
                StmtKind::Assign { target, value } => self.declare_global(target, Some(value), None),
                StmtKind::AnnAssign {
                    target,
                    annotation,
                    value,
                } => {
                    let ty = match resolve_annotation(annotation, &self.ctx.symbols) {
                        Ok(ty) => Some(ty),
                        Err(err) => {
                            self.ctx.diagnostics.error(err);
                            None
                        }
                    };
                    self.declare_global(target, Some(value), ty);
                }
                _ => {}
            }
        }

        self.ctx.diagnostics.set_current_file(previous);
        self.ctx.finish_file();
        self.modules.push(AnalysedModule {
            path,
            ast,
            metadata_functions,
        });
    }

    /// Resolve an import target, recursing when it is new. Returns the
    /// canonical path when the module's symbols are available.
    fn resolve_import(&mut self, module: &str, span: Span) -> Option<PathBuf> {
        let target = canonical(&self.ctx.root.join(format!("{module}.ql")));
        if self.ctx.is_in_progress(&target) {
            self.ctx.diagnostics.error(CompilerError::CircularImport {
                file: format!("{module}.ql"),
                span,
            });
            return None;
        }
        if self.ctx.is_analysed(&target) {
            return Some(target);
        }
        let source = match fs::read_to_string(&target) {
            Ok(source) => source,
            Err(_) => {
                self.ctx.diagnostics.error(CompilerError::UnresolvedReference {
                    name: module.to_string(),
                    span,
                });
                return None;
            }
        };
        self.analyse_source(target.clone(), &source);
        Some(target)
    }

    fn declare_class(&mut self, class: &ClassDef) {
        if !class.decorators.is_empty() {
            self.ctx.diagnostics.error(CompilerError::NotSupportedOperation {
                symbol: format!("decorated class '{}'", class.name),
                span: class.span,
            });
            return;
        }
        if class.bases.len() > 1 {
            self.ctx.diagnostics.error(CompilerError::NotSupportedOperation {
                symbol: format!("multiple inheritance in '{}'", class.name),
                span: class.span,
            });
            return;
        }
        let base = class.bases.first().cloned();
        let mut bases = Vec::new();
        if let Some(base_name) = &base {
            match self.ctx.symbols.get(base_name) {
                Some(Symbol::Class(parent)) => {
                    bases.push(parent.name.clone());
                    bases.extend(parent.bases.iter().cloned());
                }
                Some(_) | None => {
                    self.ctx.diagnostics.error(CompilerError::NotSupportedOperation {
                        symbol: format!("base class '{base_name}'"),
                        span: class.span,
                    });
                    return;
                }
            }
        }

        // Inherited methods first, overridden in place by redeclarations.
        let mut methods: Vec<MethodSymbol> = match base
            .as_deref()
            .and_then(|b| self.ctx.symbols.get(b))
        {
            Some(Symbol::Class(parent)) => parent.methods.clone(),
            _ => Vec::new(),
        };
        for def in class.methods() {
            if let Some(mut symbol) = self.build_method(def, Some(&class.name)) {
                symbol.defined_in = Some(class.name.clone());
                match methods.iter_mut().find(|m| m.name == symbol.name) {
                    Some(slot) => *slot = symbol,
                    None => methods.push(symbol),
                }
            }
        }

        let symbol = ClassSymbol {
            name: class.name.clone(),
            base,
            bases,
            // Field layout is discovered from `__init__` by the type
            // analyser, base fields first.
            fields: Vec::new(),
            methods,
            origin: Origin::at(class.span),
        };
        self.declare(
            class.name.clone(),
            Symbol::Class(Rc::new(symbol)),
            class.span,
        );
    }

    /// Build a method symbol from a definition, recording signature
    /// diagnostics. Returns `None` when the signature is unusable.
    fn build_method(&mut self, def: &FunctionDef, class: Option<&str>) -> Option<MethodSymbol> {
        let mut is_public = false;
        let mut is_safe = false;
        for decorator in &def.decorators {
            match decorator.name.as_str() {
                "public" => {
                    is_public = true;
                    for (key, value) in &decorator.kwargs {
                        if key == "safe" {
                            is_safe = matches!(value.kind, ExprKind::Bool(true));
                        }
                    }
                }
                other => {
                    self.ctx.diagnostics.error(CompilerError::NotSupportedOperation {
                        symbol: format!("decorator '@{other}'"),
                        span: decorator.span,
                    });
                }
            }
        }

        let mut params = Vec::new();
        for (index, param) in def.params.iter().enumerate() {
            if class.is_some() && index == 0 {
                if param.name != "self" || param.annotation.is_some() {
                    self.ctx.diagnostics.error(CompilerError::SelfArgument {
                        method: def.name.clone(),
                        span: param.span,
                    });
                    return None;
                }
                continue;
            }
            if param.name == "self" {
                self.ctx.diagnostics.error(CompilerError::SelfArgument {
                    method: def.name.clone(),
                    span: param.span,
                });
                return None;
            }
            let ty = match &param.annotation {
                Some(annotation) => match resolve_annotation(annotation, &self.ctx.symbols) {
                    Ok(ty) => ty,
                    Err(err) => {
                        self.ctx.diagnostics.error(err);
                        Type::Any
                    }
                },
                None => {
                    self.ctx.diagnostics.error(CompilerError::MissingTypeHint {
                        name: param.name.clone(),
                        span: param.span,
                    });
                    Type::Any
                }
            };
            let default = match &param.default {
                Some(expr) => match const_value(expr) {
                    Some(value) => Some(value),
                    None => {
                        self.ctx.diagnostics.error(CompilerError::NotSupportedOperation {
                            symbol: format!("non-constant default for '{}'", param.name),
                            span: expr.span,
                        });
                        None
                    }
                },
                None => None,
            };
            params.push(Parameter {
                name: param.name.clone(),
                ty,
                default,
            });
        }

        let return_type = match &def.returns {
            Some(annotation) => match resolve_annotation(annotation, &self.ctx.symbols) {
                Ok(ty) => ty,
                Err(err) => {
                    self.ctx.diagnostics.error(err);
                    Type::Any
                }
            },
            None => Type::None,
        };

        Some(MethodSymbol {
            name: def.name.clone(),
            params,
            return_type,
            is_public,
            is_safe,
            defined_in: class.map(str::to_string),
            locals: Vec::new(),
            origin: Origin::at(def.span),
        })
    }

    fn declare_global(&mut self, target: &Expr, value: Option<&Expr>, annotated: Option<Type>) {
        let name = match &target.kind {
            ExprKind::Name(name) => name.clone(),
            // Attribute/subscript targets at module level are rejected.
            _ => {
                self.ctx.diagnostics.error(CompilerError::NotSupportedOperation {
                    symbol: "assignment target".to_string(),
                    span: target.span,
                });
                return;
            }
        };

        // An event factory assignment declares an event, not a variable.
        if let Some(expr) = value {
            if let ExprKind::Call { func, args, kwargs } = &expr.kind {
                if matches!(&func.kind, ExprKind::Name(n) if n == "create_event") {
                    self.declare_event(&name, args, kwargs, expr.span);
                    return;
                }
            }
        }

        // A repeated module-level assignment marks the slot reassigned.
        if let Some(Symbol::Variable(existing)) = self.ctx.symbols.get_mut(&name) {
            if existing.is_global {
                existing.reassigned = true;
                existing.constant = None;
                return;
            }
        }

        let constant = value.and_then(const_value);
        let ty = annotated
            .or_else(|| constant.as_ref().map(Value::ty))
            .unwrap_or(Type::Any);
        self.declare(
            name.clone(),
            Symbol::Variable(VariableSymbol {
                name,
                ty,
                is_global: true,
                reassigned: false,
                constant,
                origin: Origin::at(target.span),
            }),
            target.span,
        );
    }

    fn declare_event(&mut self, name: &str, args: &[Expr], kwargs: &[(String, Expr)], span: Span) {
        let event_name = match args.first().map(|a| &a.kind) {
            Some(ExprKind::Str(s)) if args.len() == 1 => s.clone(),
            _ => {
                self.ctx.diagnostics.error(CompilerError::InvalidBuiltinUsage {
                    name: "create_event".to_string(),
                    span,
                });
                return;
            }
        };
        let mut params = Vec::new();
        for (param, type_expr) in kwargs {
            let ty = match &type_expr.kind {
                ExprKind::Str(type_name) => match event_field_type(type_name) {
                    Some(ty) => ty,
                    None => {
                        self.ctx.diagnostics.error(CompilerError::InvalidBuiltinUsage {
                            name: "create_event".to_string(),
                            span: type_expr.span,
                        });
                        return;
                    }
                },
                _ => {
                    self.ctx.diagnostics.error(CompilerError::InvalidBuiltinUsage {
                        name: "create_event".to_string(),
                        span: type_expr.span,
                    });
                    return;
                }
            };
            params.push(Parameter::new(param.clone(), ty));
        }
        self.declare(
            name.to_string(),
            Symbol::Event(EventSymbol {
                event_name,
                params,
                origin: Origin::at(span),
            }),
            span,
        );
    }

    /// Insert into the global table with the collision policy: builtins
    /// are shadowed with a warning, anything else is a duplicate.
    fn declare(&mut self, name: String, symbol: Symbol, span: Span) {
        match self.ctx.symbols.get(&name) {
            None => {
                let _ = self.ctx.symbols.insert(name, symbol);
            }
            Some(Symbol::Builtin(_)) => {
                self.ctx.diagnostics.warning(CompilerWarning::NameShadowing {
                    name: name.clone(),
                    span,
                });
                self.ctx.symbols.replace(&name, symbol);
            }
            Some(_) => {
                self.ctx.diagnostics.error(CompilerError::DuplicatedIdentifier {
                    name,
                    span,
                });
            }
        }
    }

    /// Names currently declared by user code, for import export lists.
    fn public_names(&self) -> Vec<String> {
        self.ctx
            .symbols
            .iter()
            .filter(|(_, s)| !matches!(s, Symbol::Builtin(_)))
            .map(|(n, _)| n.to_string())
            .collect()
    }
}

fn event_field_type(name: &str) -> Option<Type> {
    match name {
        "int" => Some(Type::Int),
        "bool" => Some(Type::Bool),
        "str" => Some(Type::Str),
        "bytes" => Some(Type::Bytes),
        "UInt160" => Some(Type::UInt160),
        "Any" => Some(Type::Any),
        _ => None,
    }
}

/// Canonicalize when the file exists; otherwise keep the given path so
/// in-memory compilations still work.
pub fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap;

    fn analyse(source: &str) -> (CompilationContext, Vec<AnalysedModule>) {
        let mut ctx = CompilationContext::new(
            PathBuf::from("/virtual/test.ql"),
            PathBuf::from("/virtual"),
            FxHashMap::default(),
            false,
        );
        crate::builtins::register(&mut ctx.symbols);
        let modules = ModuleAnalyser::new(&mut ctx).analyse(source);
        (ctx, modules)
    }

    #[test]
    fn declares_functions_and_globals() {
        let (ctx, modules) = analyse(
            "SUPPLY = 1000\n\
             @public\n\
             def total() -> int:\n\
             \x20   return SUPPLY\n",
        );
        assert!(!ctx.diagnostics.has_errors());
        assert_eq!(modules.len(), 1);
        match ctx.symbols.get("total") {
            Some(Symbol::Method(m)) => {
                assert!(m.is_public);
                assert_eq!(m.return_type, Type::Int);
            }
            other => panic!("expected method, got {other:?}"),
        }
        match ctx.symbols.get("SUPPLY") {
            Some(Symbol::Variable(v)) => {
                assert_eq!(v.ty, Type::Int);
                assert_eq!(v.constant, Some(Value::Int(1000)));
            }
            other => panic!("expected variable, got {other:?}"),
        }
    }

    #[test]
    fn missing_param_hint_is_an_error() {
        let (ctx, _) = analyse("def f(x) -> int:\n    return 1\n");
        assert!(ctx
            .diagnostics
            .errors()
            .iter()
            .any(|e| matches!(e.item, CompilerError::MissingTypeHint { .. })));
    }

    #[test]
    fn event_declaration() {
        let (ctx, _) = analyse(
            "on_transfer = create_event('Transfer', frm='UInt160', to='UInt160', amount='int')\n",
        );
        assert!(!ctx.diagnostics.has_errors());
        match ctx.symbols.get("on_transfer") {
            Some(Symbol::Event(e)) => {
                assert_eq!(e.event_name, "Transfer");
                assert_eq!(e.params.len(), 3);
                assert_eq!(e.params[0].ty, Type::UInt160);
            }
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_function_is_an_error() {
        let (ctx, _) = analyse(
            "def f() -> int:\n    return 1\n\
             def f() -> int:\n    return 2\n",
        );
        assert!(ctx
            .diagnostics
            .errors()
            .iter()
            .any(|e| matches!(&e.item, CompilerError::DuplicatedIdentifier { name, .. } if name == "f")));
    }

    #[test]
    fn shadowing_a_builtin_warns() {
        let (ctx, _) = analyse("def len(x: Any) -> int:\n    return 0\n");
        assert!(!ctx.diagnostics.has_errors());
        assert!(ctx
            .diagnostics
            .warnings()
            .iter()
            .any(|w| matches!(&w.item, CompilerWarning::NameShadowing { name, .. } if name == "len")));
        assert!(matches!(ctx.symbols.get("len"), Some(Symbol::Method(_))));
    }

    #[test]
    fn reassigned_global_loses_its_constant() {
        let (ctx, _) = analyse("X = 1\nX = 2\n");
        match ctx.symbols.get("X") {
            Some(Symbol::Variable(v)) => {
                assert!(v.reassigned);
                assert_eq!(v.constant, None);
            }
            other => panic!("expected variable, got {other:?}"),
        }
    }

    #[test]
    fn missing_import_is_unresolved() {
        let (ctx, _) = analyse("import nothing_here\n");
        assert!(ctx
            .diagnostics
            .errors()
            .iter()
            .any(|e| matches!(&e.item, CompilerError::UnresolvedReference { name, .. } if name == "nothing_here")));
    }

    #[test]
    fn class_with_multiple_bases_is_rejected() {
        let (ctx, _) = analyse(
            "class A:\n    pass\n\
             class B:\n    pass\n\
             class C(A, B):\n    pass\n",
        );
        assert!(ctx
            .diagnostics
            .errors()
            .iter()
            .any(|e| matches!(e.item, CompilerError::NotSupportedOperation { .. })));
    }

    #[test]
    fn derived_class_flattens_bases() {
        let (ctx, _) = analyse(
            "class A:\n    pass\n\
             class B(A):\n    pass\n\
             class C(B):\n    pass\n",
        );
        match ctx.symbols.get("C") {
            Some(Symbol::Class(c)) => {
                assert_eq!(c.bases, vec!["B".to_string(), "A".to_string()]);
            }
            other => panic!("expected class, got {other:?}"),
        }
    }

    #[test]
    fn second_metadata_function_warns() {
        let (ctx, modules) = analyse(
            "@metadata\n\
             def meta_a(meta):\n    pass\n\
             @metadata\n\
             def meta_b(meta):\n    pass\n",
        );
        assert!(!ctx.diagnostics.has_errors());
        assert!(ctx
            .diagnostics
            .warnings()
            .iter()
            .any(|w| matches!(w.item, CompilerWarning::RedeclaredSymbol { .. })));
        assert_eq!(modules[0].metadata_functions.len(), 2);
    }
}
