//! The type analyser.
//!
//! Recursive checking of every function body against the flattened symbol
//! table: operator resolution, argument counts and compatibility,
//! control-flow legality, shadowing and redeclaration, and class rules.
//! Method local-variable lists are filled here in encounter order so the
//! code generator can allocate dense slots without re-walking bodies.
//!
//! The `@metadata` function is not compiled; it is interpreted by this
//! pass and its declarations land in [`quill_core::ContractMetadata`].
//!
//! In non-fail-fast mode failing expressions are assigned `Any` and the
//! walk continues, so one error does not hide the rest of the report.

mod expr;
mod metadata;
mod stmt;

use std::rc::Rc;

use quill_core::{
    CompilerError, MethodSymbol, Parameter, Symbol, Type, Value,
};
use quill_parser::ast::{ClassDef, Expr, ExprKind, FunctionDef, StmtKind};

use crate::analysis::{const_value, resolve_annotation, AnalysedModule};
use crate::context::CompilationContext;

/// Per-function analysis state.
pub(crate) struct FunctionScope {
    /// Clone of the signature being analysed.
    pub method: MethodSymbol,
    /// Declaring class, for `self` and `super()` resolution.
    pub class: Option<String>,
    /// Locals in encounter order, including loop hidden slots.
    pub locals: Vec<(String, Type)>,
    pub loop_depth: usize,
    /// Counter for synthesized loop slots.
    pub hidden: usize,
    /// Whether `super().__init__` was called.
    pub super_called: bool,
}

impl FunctionScope {
    fn new(method: MethodSymbol, class: Option<String>) -> Self {
        Self {
            method,
            class,
            locals: Vec::new(),
            loop_depth: 0,
            hidden: 0,
            super_called: false,
        }
    }

    /// Look up a parameter by name.
    pub fn param(&self, name: &str) -> Option<&Parameter> {
        self.method.params.iter().find(|p| p.name == name)
    }

    /// Look up a local by name.
    pub fn local(&self, name: &str) -> Option<&Type> {
        self.locals
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, ty)| ty)
    }

    /// Declare or widen a local slot; a type conflict widens to `Any`
    /// so the variable keeps a single slot.
    pub fn assign_local(&mut self, name: &str, ty: Type) {
        match self.locals.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => {
                if *existing != ty {
                    *existing = Type::Any;
                }
            }
            None => self.locals.push((name.to_string(), ty)),
        }
    }

    /// Reserve a pair of hidden slots for one `for` loop.
    pub fn hidden_loop_slots(&mut self, seq_ty: Type) -> (String, String) {
        let n = self.hidden;
        self.hidden += 1;
        let seq = format!("<iter_seq_{n}>");
        let idx = format!("<iter_idx_{n}>");
        self.locals.push((seq.clone(), seq_ty));
        self.locals.push((idx.clone(), Type::Int));
        (seq, idx)
    }
}

/// Runs type analysis over every analysed module.
pub struct TypeAnalyser<'a> {
    pub(crate) ctx: &'a mut CompilationContext,
}

impl<'a> TypeAnalyser<'a> {
    pub fn new(ctx: &'a mut CompilationContext) -> Self {
        Self { ctx }
    }

    /// Analyse all modules, imported files first.
    pub fn analyse(&mut self, modules: &[AnalysedModule]) {
        if self.ctx.diagnostics.should_stop() {
            return;
        }
        // Field layouts first, so any body can use any class.
        for module in modules {
            let previous = self
                .ctx
                .diagnostics
                .set_current_file(Some(module.path.clone()));
            for stmt in &module.ast.stmts {
                if let StmtKind::ClassDef(class) = &stmt.kind {
                    self.discover_fields(class);
                }
            }
            self.ctx.diagnostics.set_current_file(previous);
        }

        for module in modules {
            let previous = self
                .ctx
                .diagnostics
                .set_current_file(Some(module.path.clone()));
            for stmt in &module.ast.stmts {
                match &stmt.kind {
                    StmtKind::FunctionDef(func) => {
                        if module.metadata_functions.iter().any(|n| *n == func.name) {
                            self.interpret_metadata(func);
                        } else {
                            self.analyse_function(func, None);
                        }
                    }
                    StmtKind::ClassDef(class) => self.analyse_class(class),
                    StmtKind::Assign { target, value } => {
                        self.analyse_global_assign(target, value, None)
                    }
                    StmtKind::AnnAssign {
                        target,
                        annotation,
                        value,
                    } => {
                        let ty = resolve_annotation(annotation, &self.ctx.symbols).ok();
                        self.analyse_global_assign(target, value, ty);
                    }
                    _ => {}
                }
                if self.ctx.diagnostics.should_stop() {
                    break;
                }
            }
            self.ctx.diagnostics.set_current_file(previous);
            if self.ctx.diagnostics.should_stop() {
                return;
            }
        }
    }

    /// Fill a class's field layout from its `__init__` body: inherited
    /// fields first, then `self.x` assignments in order.
    fn discover_fields(&mut self, class: &ClassDef) {
        let Some(Symbol::Class(symbol)) = self.ctx.symbols.get(&class.name) else {
            return;
        };
        let mut fields: Vec<(String, Type)> = match symbol
            .base
            .as_deref()
            .and_then(|b| self.ctx.symbols.get(b))
        {
            Some(Symbol::Class(parent)) => parent.fields.clone(),
            _ => Vec::new(),
        };
        let init_params: Vec<Parameter> = symbol
            .method("__init__")
            .map(|m| m.params.clone())
            .unwrap_or_default();

        if let Some(init) = class.methods().find(|m| m.name == "__init__") {
            for stmt in &init.body {
                let (target, annotated, value) = match &stmt.kind {
                    StmtKind::Assign { target, value } => (target, None, Some(value)),
                    StmtKind::AnnAssign {
                        target,
                        annotation,
                        value,
                    } => (
                        target,
                        resolve_annotation(annotation, &self.ctx.symbols).ok(),
                        Some(value),
                    ),
                    _ => continue,
                };
                let ExprKind::Attribute { value: obj, attr } = &target.kind else {
                    continue;
                };
                if !matches!(&obj.kind, ExprKind::Name(n) if n == "self") {
                    continue;
                }
                if fields.iter().any(|(n, _)| n == attr) {
                    continue;
                }
                let ty = annotated
                    .or_else(|| {
                        value.and_then(|v| const_value(v)).map(|c| c.ty()).or_else(|| {
                            // A parameter copied straight into a field
                            // keeps the parameter's declared type.
                            value.and_then(|v| match &v.kind {
                                ExprKind::Name(n) => {
                                    init_params.iter().find(|p| p.name == *n).map(|p| p.ty.clone())
                                }
                                _ => None,
                            })
                        })
                    })
                    .unwrap_or(Type::Any);
                fields.push((attr.clone(), ty));
            }
        }

        let mut updated = (**symbol).clone();
        updated.fields = fields;
        self.ctx
            .symbols
            .replace(&class.name, Symbol::Class(Rc::new(updated)));
    }

    fn analyse_class(&mut self, class: &ClassDef) {
        let has_base = match self.ctx.symbols.get(&class.name) {
            Some(Symbol::Class(c)) => c.base.is_some(),
            _ => return,
        };
        for def in class.methods() {
            let scope = self.analyse_function(def, Some(&class.name));
            if def.name == "__init__" && has_base {
                if let Some(scope) = &scope {
                    if !scope.super_called {
                        self.ctx.diagnostics.error(CompilerError::MissingInitCall {
                            class: class.name.clone(),
                            span: def.span,
                        });
                    }
                }
            }
        }
    }

    /// Check a module-level initializer and refine the global's symbol
    /// with the (possibly construct-folded) constant and type.
    fn analyse_global_assign(&mut self, target: &Expr, value: &Expr, annotated: Option<Type>) {
        let ExprKind::Name(name) = &target.kind else {
            return;
        };
        // Event declarations were consumed by the module analyser.
        if matches!(self.ctx.symbols.get(name), Some(Symbol::Event(_))) {
            return;
        }
        let mut scope = FunctionScope::new(
            MethodSymbol {
                name: "<module>".to_string(),
                params: Vec::new(),
                return_type: Type::None,
                is_public: false,
                is_safe: false,
                defined_in: None,
                locals: Vec::new(),
                origin: Default::default(),
            },
            None,
        );
        let value_ty = self.infer(value, &mut scope);
        let constant = const_value(value);
        if let Some(Symbol::Variable(var)) = self.ctx.symbols.get_mut(name) {
            if let Some(declared) = annotated {
                if !declared.accepts(&value_ty).is_ok() {
                    let err = CompilerError::MismatchedTypes {
                        expected: declared.to_string(),
                        found: value_ty.to_string(),
                        span: value.span,
                    };
                    self.ctx.diagnostics.error(err);
                }
                var.ty = declared;
            } else if var.reassigned {
                if var.ty != value_ty {
                    var.ty = Type::Any;
                }
            } else {
                var.ty = value_ty;
                var.constant = constant;
            }
        }
    }

    /// Analyse one function body. Returns the finished scope, or `None`
    /// when the symbol is missing (an earlier declaration error).
    fn analyse_function(&mut self, func: &FunctionDef, class: Option<&str>) -> Option<FunctionScope> {
        let method = match class {
            None => match self.ctx.symbols.get(&func.name) {
                Some(Symbol::Method(m)) => m.clone(),
                _ => return None,
            },
            Some(class_name) => match self.ctx.symbols.get(class_name) {
                Some(Symbol::Class(c)) => c.method(&func.name)?.clone(),
                _ => return None,
            },
        };
        let mut scope = FunctionScope::new(method, class.map(str::to_string));
        let terminates = self.block(&func.body, &mut scope);
        if !terminates && scope.method.return_type != Type::None {
            self.ctx.diagnostics.error(CompilerError::MissingReturnStatement {
                function: func.name.clone(),
                span: func.span,
            });
        }
        self.store_locals(&scope);
        Some(scope)
    }

    /// Write the discovered locals back onto the method symbol.
    fn store_locals(&mut self, scope: &FunctionScope) {
        match &scope.class {
            None => {
                if let Some(Symbol::Method(m)) = self.ctx.symbols.get_mut(&scope.method.name) {
                    m.locals = scope.locals.clone();
                }
            }
            Some(class_name) => {
                let updated = match self.ctx.symbols.get(class_name) {
                    Some(Symbol::Class(c)) => {
                        let mut cloned = (**c).clone();
                        if let Some(m) =
                            cloned.methods.iter_mut().find(|m| m.name == scope.method.name)
                        {
                            m.locals = scope.locals.clone();
                        }
                        Some(Rc::new(cloned))
                    }
                    _ => None,
                };
                if let Some(symbol) = updated {
                    self.ctx.symbols.replace(class_name, Symbol::Class(symbol));
                }
            }
        }
    }

    /// Resolve the type a bare name has in the given scope.
    pub(crate) fn name_type(&mut self, name: &str, scope: &FunctionScope, span: quill_core::Span) -> Type {
        if name == "self" {
            if let Some(class_name) = &scope.class {
                if let Some(Symbol::Class(c)) = self.ctx.symbols.get(class_name) {
                    return c.instance_type();
                }
            }
        }
        if let Some(param) = scope.param(name) {
            return param.ty.clone();
        }
        if let Some(ty) = scope.local(name) {
            return ty.clone();
        }
        match self.ctx.symbols.get(name) {
            Some(symbol) => {
                if let Symbol::Builtin(b) = symbol {
                    if b.deprecated {
                        self.ctx.diagnostics.warning(
                            quill_core::CompilerWarning::DeprecatedSymbol {
                                name: name.to_string(),
                                span,
                            },
                        );
                    }
                }
                symbol.value_type()
            }
            None => {
                self.ctx.diagnostics.error(CompilerError::UnresolvedReference {
                    name: name.to_string(),
                    span,
                });
                Type::Any
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::construct_analyser::ConstructAnalyser;
    use crate::analysis::module_analyser::ModuleAnalyser;
    use quill_core::CompilerWarning;
    use rustc_hash::FxHashMap;
    use std::path::PathBuf;

    fn analyse(source: &str) -> CompilationContext {
        let mut ctx = CompilationContext::new(
            PathBuf::from("/virtual/test.ql"),
            PathBuf::from("/virtual"),
            FxHashMap::default(),
            false,
        );
        crate::builtins::register(&mut ctx.symbols);
        let mut modules = ModuleAnalyser::new(&mut ctx).analyse(source);
        for module in &mut modules {
            let rewritten =
                ConstructAnalyser::new(&mut ctx).rewrite(std::mem::take(&mut module.ast));
            module.ast = rewritten;
        }
        TypeAnalyser::new(&mut ctx).analyse(&modules);
        ctx
    }

    fn has_error(ctx: &CompilationContext, pred: impl Fn(&CompilerError) -> bool) -> bool {
        ctx.diagnostics.errors().iter().any(|e| pred(&e.item))
    }

    #[test]
    fn clean_function_has_no_diagnostics() {
        let ctx = analyse(
            "@public\n\
             def add(a: int, b: int) -> int:\n\
             \x20   total = a + b\n\
             \x20   return total\n",
        );
        assert!(!ctx.diagnostics.has_errors(), "{}", ctx.diagnostics);
        match ctx.symbols.get("add") {
            Some(Symbol::Method(m)) => {
                assert_eq!(m.locals, vec![("total".to_string(), Type::Int)])
            }
            other => panic!("expected method, got {other:?}"),
        }
    }

    #[test]
    fn reassignment_with_new_type_widens_to_single_any_slot() {
        let ctx = analyse(
            "def f(flag: bool) -> None:\n\
             \x20   x = 1\n\
             \x20   if flag:\n\
             \x20       x = 'one'\n\
             \x20   runtime.log('done')\n",
        );
        assert!(!ctx.diagnostics.has_errors(), "{}", ctx.diagnostics);
        match ctx.symbols.get("f") {
            Some(Symbol::Method(m)) => {
                assert_eq!(m.locals, vec![("x".to_string(), Type::Any)])
            }
            other => panic!("expected method, got {other:?}"),
        }
    }

    #[test]
    fn unsupported_operator_is_reported() {
        let ctx = analyse(
            "def f(a: str, b: str) -> str:\n\
             \x20   return a - b\n",
        );
        assert!(has_error(&ctx, |e| matches!(
            e,
            CompilerError::UnresolvedOperation { type_name, .. } if type_name == "str"
        )));
    }

    #[test]
    fn missing_return_on_value_path() {
        let ctx = analyse(
            "def f(flag: bool) -> int:\n\
             \x20   if flag:\n\
             \x20       return 1\n",
        );
        assert!(has_error(&ctx, |e| matches!(
            e,
            CompilerError::MissingReturnStatement { function, .. } if function == "f"
        )));
    }

    #[test]
    fn code_after_return_is_unreachable() {
        let ctx = analyse(
            "def f() -> int:\n\
             \x20   return 1\n\
             \x20   return 2\n",
        );
        assert!(ctx
            .diagnostics
            .warnings()
            .iter()
            .any(|w| matches!(w.item, CompilerWarning::UnreachableCode { .. })));
    }

    #[test]
    fn tuple_return_is_too_many_values() {
        let ctx = analyse(
            "def f() -> int:\n\
             \x20   return 1, 2\n",
        );
        assert!(has_error(&ctx, |e| matches!(
            e,
            CompilerError::TooManyReturns { .. }
        )));
    }

    #[test]
    fn call_argument_checking() {
        let ctx = analyse(
            "def helper(a: int, b: int = 2) -> int:\n\
             \x20   return a + b\n\
             def caller() -> int:\n\
             \x20   return helper()\n",
        );
        assert!(has_error(&ctx, |e| matches!(
            e,
            CompilerError::UnfilledArgument { parameter, .. } if parameter == "a"
        )));
    }

    #[test]
    fn extra_argument_is_unexpected() {
        let ctx = analyse(
            "def helper(a: int) -> int:\n\
             \x20   return a\n\
             def caller() -> int:\n\
             \x20   return helper(1, 2)\n",
        );
        assert!(has_error(&ctx, |e| matches!(
            e,
            CompilerError::UnexpectedArgument { callable, .. } if callable == "helper"
        )));
    }

    #[test]
    fn derived_init_must_call_super() {
        let ctx = analyse(
            "class Base:\n\
             \x20   def __init__(self):\n\
             \x20       self.a = 0\n\
             class Child(Base):\n\
             \x20   def __init__(self):\n\
             \x20       self.b = 1\n",
        );
        assert!(has_error(&ctx, |e| matches!(
            e,
            CompilerError::MissingInitCall { class, .. } if class == "Child"
        )));
    }

    #[test]
    fn super_call_satisfies_the_check_and_orders_fields() {
        let ctx = analyse(
            "class Base:\n\
             \x20   def __init__(self, a: int):\n\
             \x20       self.a = a\n\
             class Child(Base):\n\
             \x20   def __init__(self, a: int, b: str):\n\
             \x20       super().__init__(a)\n\
             \x20       self.b = b\n",
        );
        assert!(!ctx.diagnostics.has_errors(), "{}", ctx.diagnostics);
        match ctx.symbols.get("Child") {
            Some(Symbol::Class(c)) => {
                assert_eq!(
                    c.fields,
                    vec![("a".to_string(), Type::Int), ("b".to_string(), Type::Str)]
                );
            }
            other => panic!("expected class, got {other:?}"),
        }
    }

    #[test]
    fn metadata_function_populates_contract_metadata() {
        let ctx = analyse(
            "@metadata\n\
             def manifest(meta):\n\
             \x20   meta.author = 'alice'\n\
             \x20   meta.supported_standards = ['NEP-17']\n\
             \x20   meta.add_permission(contract='*', methods=['onNEP17Payment'])\n\
             \x20   meta.website = 'https://example.org'\n",
        );
        assert!(!ctx.diagnostics.has_errors(), "{}", ctx.diagnostics);
        assert_eq!(ctx.metadata.author.as_deref(), Some("alice"));
        assert_eq!(ctx.metadata.supported_standards, vec!["NEP-17"]);
        assert_eq!(ctx.metadata.permissions.len(), 1);
        assert_eq!(
            ctx.metadata.extras,
            vec![(
                "website".to_string(),
                serde_json::Value::from("https://example.org")
            )]
        );
    }

    #[test]
    fn empty_metadata_function_is_missing_an_implementation() {
        let ctx = analyse(
            "@metadata\n\
             def manifest(meta):\n\
             \x20   pass\n",
        );
        assert!(has_error(&ctx, |e| matches!(
            e,
            CompilerError::MetadataImplementationMissing { .. }
        )));
    }

    #[test]
    fn for_loop_reserves_hidden_slots() {
        let ctx = analyse(
            "def total(items: list[int]) -> int:\n\
             \x20   acc = 0\n\
             \x20   for item in items:\n\
             \x20       acc += item\n\
             \x20   return acc\n",
        );
        assert!(!ctx.diagnostics.has_errors(), "{}", ctx.diagnostics);
        match ctx.symbols.get("total") {
            Some(Symbol::Method(m)) => {
                let names: Vec<&str> = m.locals.iter().map(|(n, _)| n.as_str()).collect();
                assert_eq!(names, vec!["acc", "item", "<iter_seq_0>", "<iter_idx_0>"]);
            }
            other => panic!("expected method, got {other:?}"),
        }
    }

    #[test]
    fn downcast_from_any_warns() {
        let ctx = analyse(
            "def f(x: Any) -> int:\n\
             \x20   return x\n",
        );
        assert!(!ctx.diagnostics.has_errors());
        assert!(ctx
            .diagnostics
            .warnings()
            .iter()
            .any(|w| matches!(w.item, CompilerWarning::TypeCasting { .. })));
    }

    #[test]
    fn storage_and_runtime_calls_type_check() {
        let ctx = analyse(
            "@public\n\
             def save(key: bytes, value: int) -> None:\n\
             \x20   storage.put(key, value)\n\
             \x20   runtime.log('saved')\n",
        );
        assert!(!ctx.diagnostics.has_errors(), "{}", ctx.diagnostics);
    }

    #[test]
    fn json_conversion_clamps_outside_the_i64_range() {
        assert_eq!(value_to_json(&Value::Int(42)), serde_json::json!(42));
        assert_eq!(
            value_to_json(&Value::Int(i128::MAX)),
            serde_json::json!(i64::MAX)
        );
        assert_eq!(
            value_to_json(&Value::Int(i128::MIN)),
            serde_json::json!(i64::MIN)
        );
    }
}

/// Convert a folded constant to a JSON value, for metadata extras.
pub(crate) fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        // JSON numbers top out at i64; clamp instead of losing high bits.
        Value::Int(v) => serde_json::Value::from(
            i64::try_from(*v).unwrap_or(if *v < 0 { i64::MIN } else { i64::MAX }),
        ),
        Value::Bool(v) => serde_json::Value::from(*v),
        Value::Str(v) => serde_json::Value::from(v.clone()),
        Value::Bytes(v) => serde_json::Value::from(
            v.iter().map(|b| format!("{b:02x}")).collect::<String>(),
        ),
        Value::List(items) => {
            serde_json::Value::Array(items.iter().map(value_to_json).collect())
        }
        Value::None => serde_json::Value::Null,
    }
}
