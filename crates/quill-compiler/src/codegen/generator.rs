//! The code generator.
//!
//! Consumes the symbol table through a shared reference; analysis is over
//! and nothing here mutates symbols. Generation is method granular: only
//! methods reachable from an entry point (`@public`, `_deploy`, or the
//! synthesized `_initialize`) are emitted, in symbol-table order so the
//! output is deterministic. Jumps and inter-method calls stay symbolic
//! until the link step.
//!
//! Slot model: method arguments and locals live in dense per-method
//! slots; module globals live in static slots initialized by a
//! synthesized `_initialize`. Globals with a single literal assignment
//! are inlined at use sites instead and never get a slot.

use std::rc::Rc;

use quill_core::{
    BinaryOp, BuiltinKind, BuiltinLowering, BuiltinSymbol, ClassSymbol, CompilerError,
    MethodSymbol, MethodToken, Parameter, Symbol, Type, UnaryOp, Value,
};
use quill_parser::ast::{Expr, ExprKind, FunctionDef, Stmt, StmtKind};
use rustc_hash::FxHashMap;

use crate::analysis::AnalysedModule;
use crate::builtins::{interop, syscall_id};
use crate::codegen::builder::{MethodBuilder, ScriptBuilder};
use crate::codegen::instruction::{Label, MethodId};
use crate::codegen::opcode::{OpCode, StackItemType};
use crate::codegen::{DebugMethod, EmittedMethod, GeneratedScript};
use crate::context::CompilationContext;

/// Key of a generated method: declaring class (if any) plus name.
type MethodKey = (Option<String>, String);

/// External call flags: feather-full permissions, narrowed by the
/// manifest at deploy time.
const CALL_FLAGS_ALL: u8 = 0x0F;

pub struct CodeGenerator<'a> {
    ctx: &'a CompilationContext,
    modules: &'a [AnalysedModule],
    /// AST of every function, by key.
    funcs: FxHashMap<MethodKey, &'a FunctionDef>,
    /// Static slot of each non-inlined global.
    global_slots: FxHashMap<String, u8>,
    /// Order mirrors the id assignment.
    method_ids: FxHashMap<MethodKey, MethodId>,
    emission_order: Vec<MethodKey>,
    tokens: Vec<MethodToken>,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(ctx: &'a CompilationContext, modules: &'a [AnalysedModule]) -> Self {
        Self {
            ctx,
            modules,
            funcs: FxHashMap::default(),
            global_slots: FxHashMap::default(),
            method_ids: FxHashMap::default(),
            emission_order: Vec::new(),
            tokens: Vec::new(),
        }
    }

    pub fn generate(mut self) -> Result<GeneratedScript, CompilerError> {
        self.collect_functions();
        let reachable = self.reachable_methods();
        self.assign_global_slots()?;
        self.assign_method_ids(&reachable);

        let mut script = ScriptBuilder::new();
        let mut methods = Vec::new();
        let mut debug_methods = Vec::new();
        let mut ends = Vec::new();

        for key in self.emission_order.clone() {
            let id = self.method_ids[&key];
            let (builder, symbol) = if key.0.is_none() && key.1 == "_initialize"
                && !self.funcs.contains_key(&key)
            {
                (self.emit_initialize()?, synthesized_initialize())
            } else {
                let func = self.funcs[&key];
                let symbol = self.method_symbol(&key)?;
                let class = match &key.0 {
                    Some(name) => Some(self.class_symbol(name)?),
                    None => None,
                };
                (self.emit_method(func, &symbol, class)?, symbol)
            };
            let offset = script
                .add_method(id, builder)
                .map_err(|e| internal(format!("layout of '{}': {e}", key.1)))?;
            if key.0.is_none() && symbol.is_entry_point() {
                methods.push(EmittedMethod {
                    name: symbol.name.clone(),
                    params: symbol.params.clone(),
                    return_type: symbol.return_type.clone(),
                    safe: symbol.is_safe,
                    offset,
                });
            }
            debug_methods.push(DebugMethod {
                name: match &key.0 {
                    Some(class) => format!("{class}.{}", symbol.name),
                    None => symbol.name.clone(),
                },
                start: offset,
                end: 0,
                params: symbol
                    .params
                    .iter()
                    .map(|p| (p.name.clone(), p.ty.to_string()))
                    .collect(),
                locals: symbol
                    .locals
                    .iter()
                    .map(|(n, t)| (n.clone(), t.to_string()))
                    .collect(),
                return_type: symbol.return_type.to_string(),
            });
            ends.push(offset);
        }

        let (bytes, spans) = script.link()?;
        // Method ranges close at the next method's start.
        for (index, debug) in debug_methods.iter_mut().enumerate() {
            debug.end = ends.get(index + 1).copied().unwrap_or(bytes.len());
        }

        Ok(GeneratedScript {
            script: bytes,
            methods,
            tokens: self.tokens,
            spans,
            debug_methods,
        })
    }

    // =========================================================================
    // Layout
    // =========================================================================

    fn collect_functions(&mut self) {
        for module in self.modules {
            for stmt in &module.ast.stmts {
                match &stmt.kind {
                    StmtKind::FunctionDef(func) => {
                        if !module.metadata_functions.contains(&func.name) {
                            self.funcs.insert((None, func.name.clone()), func);
                        }
                    }
                    StmtKind::ClassDef(class) => {
                        for method in class.methods() {
                            self.funcs
                                .insert((Some(class.name.clone()), method.name.clone()), method);
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    /// Fixpoint reachability from the entry points. Classes are kept
    /// whole: referencing a class keeps every method of it and its bases.
    fn reachable_methods(&self) -> Vec<MethodKey> {
        let mut reachable: Vec<MethodKey> = Vec::new();
        let mut queue: Vec<MethodKey> = Vec::new();

        for (name, symbol) in self.ctx.symbols.iter() {
            if let Symbol::Method(method) = symbol {
                if method.defined_in.is_none() && method.is_entry_point() {
                    queue.push((None, name.to_string()));
                }
            }
        }
        // Global initializers run from `_initialize` and may call code.
        for module in self.modules {
            for stmt in &module.ast.stmts {
                if let StmtKind::Assign { target, value }
                | StmtKind::AnnAssign { target, value, .. } = &stmt.kind
                {
                    if let ExprKind::Name(name) = &target.kind {
                        if self.global_needs_slot(name) {
                            let mut names = Vec::new();
                            collect_names(value, &mut names);
                            self.enqueue_names(&names, &mut queue);
                        }
                    }
                }
            }
        }

        while let Some(key) = queue.pop() {
            if reachable.contains(&key) {
                continue;
            }
            let Some(func) = self.funcs.get(&key) else {
                continue;
            };
            reachable.push(key.clone());
            let mut names = Vec::new();
            for stmt in &func.body {
                collect_stmt_names(stmt, &mut names);
            }
            self.enqueue_names(&names, &mut queue);
            // A derived method may reach its base through super().
            if let Some(class_name) = &key.0 {
                if let Some(Symbol::Class(class)) = self.ctx.symbols.get(class_name) {
                    for base in &class.bases {
                        queue.push((Some(base.clone()), "__init__".to_string()));
                    }
                }
            }
        }
        reachable
    }

    fn enqueue_names(&self, names: &[String], queue: &mut Vec<MethodKey>) {
        for name in names {
            match self.ctx.symbols.get(name) {
                Some(Symbol::Method(m)) if m.defined_in.is_none() => {
                    queue.push((None, name.clone()));
                }
                Some(Symbol::Class(class)) => {
                    // Inherited entries carry their defining class, which
                    // is also where the method body is emitted.
                    for method in &class.methods {
                        let owner = method
                            .defined_in
                            .clone()
                            .unwrap_or_else(|| class.name.clone());
                        queue.push((Some(owner), method.name.clone()));
                    }
                }
                _ => {}
            }
        }
    }

    fn global_needs_slot(&self, name: &str) -> bool {
        matches!(
            self.ctx.symbols.get(name),
            Some(Symbol::Variable(v)) if v.is_global && !(v.constant.is_some() && !v.reassigned)
        )
    }

    fn assign_global_slots(&mut self) -> Result<(), CompilerError> {
        let mut next: usize = 0;
        for (name, symbol) in self.ctx.symbols.iter() {
            if let Symbol::Variable(v) = symbol {
                if v.is_global && !(v.constant.is_some() && !v.reassigned) {
                    // INITSSLOT reserves at most 255 static slots.
                    if next >= u8::MAX as usize {
                        return Err(CompilerError::TooManySlots {
                            symbol: name.to_string(),
                            count: next + 1,
                            span: v.origin.span,
                        });
                    }
                    self.global_slots.insert(name.to_string(), next as u8);
                    next += 1;
                }
            }
        }
        Ok(())
    }

    fn assign_method_ids(&mut self, reachable: &[MethodKey]) {
        let mut order: Vec<MethodKey> = Vec::new();
        for (name, symbol) in self.ctx.symbols.iter() {
            match symbol {
                Symbol::Method(m) if m.defined_in.is_none() => {
                    let key = (None, name.to_string());
                    if reachable.contains(&key) {
                        order.push(key);
                    }
                }
                Symbol::Class(class) => {
                    for method in &class.methods {
                        if method.defined_in.as_deref() != Some(class.name.as_str()) {
                            // Inherited entries are emitted by the base.
                            continue;
                        }
                        let key = (Some(class.name.clone()), method.name.clone());
                        if reachable.contains(&key) {
                            order.push(key);
                        }
                    }
                }
                _ => {}
            }
        }
        // The synthesized initializer runs global assignments; only
        // needed when at least one global kept a static slot.
        if !self.global_slots.is_empty() && !self.funcs.contains_key(&(None, "_initialize".into()))
        {
            order.push((None, "_initialize".to_string()));
        }
        for (index, key) in order.iter().enumerate() {
            self.method_ids.insert(key.clone(), MethodId(index));
        }
        self.emission_order = order;
    }

    fn method_symbol(&self, key: &MethodKey) -> Result<MethodSymbol, CompilerError> {
        match &key.0 {
            None => match self.ctx.symbols.get(&key.1) {
                Some(Symbol::Method(m)) => Ok(m.clone()),
                _ => Err(internal(format!("missing method symbol '{}'", key.1))),
            },
            Some(class) => self
                .class_symbol(class)?
                .method(&key.1)
                .cloned()
                .ok_or_else(|| internal(format!("missing method '{}.{}'", class, key.1))),
        }
    }

    fn class_symbol(&self, name: &str) -> Result<Rc<ClassSymbol>, CompilerError> {
        match self.ctx.symbols.get(name) {
            Some(Symbol::Class(c)) => Ok(c.clone()),
            _ => Err(internal(format!("missing class symbol '{name}'"))),
        }
    }

    // =========================================================================
    // Method emission
    // =========================================================================

    fn emit_method(
        &mut self,
        func: &FunctionDef,
        symbol: &MethodSymbol,
        class: Option<Rc<ClassSymbol>>,
    ) -> Result<MethodBuilder, CompilerError> {
        let mut emitter = FnEmitter::new(self, symbol.clone(), class);
        emitter.prologue(func.span)?;
        for stmt in &func.body {
            emitter.stmt(stmt)?;
        }
        let mut builder = emitter.finish();
        if builder.last_op() != Some(OpCode::Ret) {
            builder.emit(OpCode::Ret);
        }
        Ok(builder)
    }

    /// Emit the synthesized `_initialize`: reserve static slots and run
    /// each slotted global's initializer in module order.
    fn emit_initialize(&mut self) -> Result<MethodBuilder, CompilerError> {
        let symbol = synthesized_initialize();
        let modules = self.modules;
        let statics = self.global_slots.len() as u8;
        let mut emitter = FnEmitter::new(self, symbol, None);
        emitter.b.emit_byte(OpCode::InitSSlot, statics);
        for module in modules {
            for stmt in &module.ast.stmts {
                let (target, value) = match &stmt.kind {
                    StmtKind::Assign { target, value }
                    | StmtKind::AnnAssign { target, value, .. } => (target, value),
                    _ => continue,
                };
                let ExprKind::Name(name) = &target.kind else {
                    continue;
                };
                let Some(&slot) = emitter.generator.global_slots.get(name.as_str()) else {
                    continue;
                };
                emitter.b.at(stmt.span);
                emitter.expr(value)?;
                emitter.b.emit_slot(OpCode::StSFld, u32::from(slot));
            }
        }
        let mut builder = emitter.finish();
        builder.emit(OpCode::Ret);
        Ok(builder)
    }
}

/// The symbol of the synthesized static initializer.
fn synthesized_initialize() -> MethodSymbol {
    MethodSymbol {
        name: "_initialize".to_string(),
        params: Vec::new(),
        return_type: Type::None,
        is_public: false,
        is_safe: false,
        defined_in: None,
        locals: Vec::new(),
        origin: Default::default(),
    }
}

fn internal(cause: String) -> CompilerError {
    CompilerError::InternalError { cause }
}

// =============================================================================
// Per-function emitter
// =============================================================================

struct LoopLabels {
    continue_to: Label,
    break_to: Label,
}

struct FnEmitter<'g, 'a> {
    generator: &'g mut CodeGenerator<'a>,
    b: MethodBuilder,
    method: MethodSymbol,
    class: Option<Rc<ClassSymbol>>,
    loops: Vec<LoopLabels>,
    /// Counter matching the analyser's hidden loop slot naming.
    hidden: usize,
}

impl<'g, 'a> FnEmitter<'g, 'a> {
    fn new(
        generator: &'g mut CodeGenerator<'a>,
        method: MethodSymbol,
        class: Option<Rc<ClassSymbol>>,
    ) -> Self {
        Self {
            generator,
            b: MethodBuilder::new(),
            method,
            class,
            loops: Vec::new(),
            hidden: 0,
        }
    }

    fn finish(self) -> MethodBuilder {
        self.b
    }

    fn arg_count(&self) -> usize {
        self.method.params.len() + usize::from(self.class.is_some())
    }

    fn prologue(&mut self, span: quill_core::Span) -> Result<(), CompilerError> {
        self.b.at(span);
        let locals = self.method.locals.len();
        let args = self.arg_count();
        // INITSLOT carries one byte per count; the frame cannot hold more.
        for count in [locals, args] {
            if count > u8::MAX as usize {
                return Err(CompilerError::TooManySlots {
                    symbol: self.method.name.clone(),
                    count,
                    span,
                });
            }
        }
        if locals > 0 || args > 0 {
            self.b.emit_pair(OpCode::InitSlot, locals as u8, args as u8);
        }
        Ok(())
    }

    /// Argument slot of a parameter name, accounting for `self`.
    fn arg_slot(&self, name: &str) -> Option<u32> {
        if self.class.is_some() && name == "self" {
            return Some(0);
        }
        let base = u32::from(self.class.is_some());
        self.method
            .params
            .iter()
            .position(|p| p.name == name)
            .map(|i| i as u32 + base)
    }

    fn local_slot(&self, name: &str) -> Option<u32> {
        self.method
            .locals
            .iter()
            .position(|(n, _)| n == name)
            .map(|i| i as u32)
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn stmt(&mut self, stmt: &Stmt) -> Result<(), CompilerError> {
        self.b.at(stmt.span);
        match &stmt.kind {
            StmtKind::Assign { target, value }
            | StmtKind::AnnAssign { target, value, .. } => self.assign(target, value),
            StmtKind::AugAssign { target, op, value } => {
                match &target.kind {
                    ExprKind::Name(_) => {
                        self.expr(target)?;
                        self.expr(value)?;
                        self.binary_op(*op, &self.expr_type(target))?;
                        self.store_name(target)
                    }
                    _ => {
                        // Re-evaluating the target's base is safe: the
                        // language has no effectful l-value expressions.
                        self.expr(target)?;
                        self.expr(value)?;
                        self.binary_op(*op, &self.expr_type(target))?;
                        self.store_composite(target)
                    }
                }
            }
            StmtKind::If { branches, orelse } => {
                let end = self.b.new_label();
                let mut next = self.b.new_label();
                for (index, (cond, body)) in branches.iter().enumerate() {
                    if index > 0 {
                        self.b.bind(next);
                        next = self.b.new_label();
                    }
                    self.expr(cond)?;
                    self.b.emit_jump(OpCode::JmpIfNotL, next);
                    for s in body {
                        self.stmt(s)?;
                    }
                    self.b.emit_jump(OpCode::JmpL, end);
                }
                self.b.bind(next);
                for s in orelse {
                    self.stmt(s)?;
                }
                self.b.bind(end);
                Ok(())
            }
            StmtKind::While { cond, body } => {
                let top = self.b.new_label();
                let end = self.b.new_label();
                self.b.bind(top);
                self.expr(cond)?;
                self.b.emit_jump(OpCode::JmpIfNotL, end);
                self.loops.push(LoopLabels {
                    continue_to: top,
                    break_to: end,
                });
                for s in body {
                    self.stmt(s)?;
                }
                self.loops.pop();
                self.b.emit_jump(OpCode::JmpL, top);
                self.b.bind(end);
                Ok(())
            }
            StmtKind::For { target, iter, body } => self.for_loop(target, iter, body),
            StmtKind::Return { value } => {
                if let Some(value) = value {
                    self.expr(value)?;
                }
                self.b.emit(OpCode::Ret);
                Ok(())
            }
            StmtKind::Raise { exc } => {
                self.expr(exc)?;
                self.b.emit(OpCode::Throw);
                Ok(())
            }
            StmtKind::Expr(expr) => {
                self.expr(expr)?;
                if self.expr_type(expr) != Type::None {
                    self.b.emit(OpCode::Drop);
                }
                Ok(())
            }
            StmtKind::Break => {
                let target = self
                    .loops
                    .last()
                    .map(|l| l.break_to)
                    .ok_or_else(|| internal("break outside loop".to_string()))?;
                self.b.emit_jump(OpCode::JmpL, target);
                Ok(())
            }
            StmtKind::Continue => {
                let target = self
                    .loops
                    .last()
                    .map(|l| l.continue_to)
                    .ok_or_else(|| internal("continue outside loop".to_string()))?;
                self.b.emit_jump(OpCode::JmpL, target);
                Ok(())
            }
            StmtKind::Pass => Ok(()),
            StmtKind::Import { .. } | StmtKind::FromImport { .. } => Ok(()),
            StmtKind::FunctionDef(_) | StmtKind::ClassDef(_) => {
                Err(internal("nested declaration survived analysis".to_string()))
            }
        }
    }

    /// Desugared counting loop over a snapshot of the iterable.
    fn for_loop(&mut self, target: &str, iter: &Expr, body: &[Stmt]) -> Result<(), CompilerError> {
        let n = self.hidden;
        self.hidden += 1;
        let seq_slot = self
            .local_slot(&format!("<iter_seq_{n}>"))
            .ok_or_else(|| internal("missing loop sequence slot".to_string()))?;
        let idx_slot = self
            .local_slot(&format!("<iter_idx_{n}>"))
            .ok_or_else(|| internal("missing loop index slot".to_string()))?;
        let target_store = self.resolve_store(target)?;

        self.expr(iter)?;
        self.b.emit_slot(OpCode::StLoc, seq_slot);
        self.b.emit_push_int(0);
        self.b.emit_slot(OpCode::StLoc, idx_slot);

        let top = self.b.new_label();
        let step = self.b.new_label();
        let end = self.b.new_label();
        self.b.bind(top);
        self.b.emit_slot(OpCode::LdLoc, idx_slot);
        self.b.emit_slot(OpCode::LdLoc, seq_slot);
        self.b.emit(OpCode::Size);
        self.b.emit_jump(OpCode::JmpGeL, end);

        self.b.emit_slot(OpCode::LdLoc, seq_slot);
        self.b.emit_slot(OpCode::LdLoc, idx_slot);
        let elem_kind = self.expr_type(iter);
        self.emit_index_load(&elem_kind)?;
        self.emit_store(target_store);

        self.loops.push(LoopLabels {
            continue_to: step,
            break_to: end,
        });
        for s in body {
            self.stmt(s)?;
        }
        self.loops.pop();

        self.b.bind(step);
        self.b.emit_slot(OpCode::LdLoc, idx_slot);
        self.b.emit(OpCode::Inc);
        self.b.emit_slot(OpCode::StLoc, idx_slot);
        self.b.emit_jump(OpCode::JmpL, top);
        self.b.bind(end);
        Ok(())
    }

    fn assign(&mut self, target: &Expr, value: &Expr) -> Result<(), CompilerError> {
        match &target.kind {
            ExprKind::Name(_) => {
                self.expr(value)?;
                self.store_name(target)
            }
            ExprKind::Attribute { value: obj, attr } => {
                self.expr(obj)?;
                let index = self.field_index(obj, attr)?;
                self.b.emit_push_int(index as i128);
                self.expr(value)?;
                self.b.emit(OpCode::SetItem);
                Ok(())
            }
            ExprKind::Subscript { value: obj, index } => {
                self.expr(obj)?;
                self.expr(index)?;
                if self.expr_type(obj).is_sequence() {
                    self.normalize_index();
                }
                self.expr(value)?;
                self.b.emit(OpCode::SetItem);
                Ok(())
            }
            _ => Err(internal("unsupported assignment target".to_string())),
        }
    }

    /// Store the value on top of the stack into a named slot.
    fn store_name(&mut self, target: &Expr) -> Result<(), CompilerError> {
        let ExprKind::Name(name) = &target.kind else {
            return Err(internal("store target is not a name".to_string()));
        };
        let store = self.resolve_store(name)?;
        self.emit_store(store);
        Ok(())
    }

    /// Re-emit a composite target's base and index, then store.
    fn store_composite(&mut self, target: &Expr) -> Result<(), CompilerError> {
        match &target.kind {
            ExprKind::Attribute { value: obj, attr } => {
                self.expr(obj)?;
                let index = self.field_index(obj, attr)?;
                self.b.emit_push_int(index as i128);
                // Bring the computed value over the (obj, index) pair.
                self.b.emit(OpCode::Rot);
                self.b.emit(OpCode::SetItem);
                Ok(())
            }
            ExprKind::Subscript { value: obj, index } => {
                self.expr(obj)?;
                self.expr(index)?;
                if self.expr_type(obj).is_sequence() {
                    self.normalize_index();
                }
                self.b.emit(OpCode::Rot);
                self.b.emit(OpCode::SetItem);
                Ok(())
            }
            _ => Err(internal("unsupported augmented target".to_string())),
        }
    }

    fn resolve_store(&self, name: &str) -> Result<StoreSite, CompilerError> {
        if let Some(slot) = self.arg_slot(name) {
            return Ok(StoreSite::Arg(slot));
        }
        if let Some(slot) = self.local_slot(name) {
            return Ok(StoreSite::Local(slot));
        }
        if let Some(&slot) = self.generator.global_slots.get(name) {
            return Ok(StoreSite::Static(slot as u32));
        }
        Err(internal(format!("no slot for '{name}'")))
    }

    fn emit_store(&mut self, site: StoreSite) {
        match site {
            StoreSite::Arg(slot) => self.b.emit_slot(OpCode::StArg, slot),
            StoreSite::Local(slot) => self.b.emit_slot(OpCode::StLoc, slot),
            StoreSite::Static(slot) => self.b.emit_slot(OpCode::StSFld, slot),
        }
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn expr(&mut self, expr: &Expr) -> Result<(), CompilerError> {
        match &expr.kind {
            ExprKind::Int(v) => {
                self.b.emit_push_int(*v);
                Ok(())
            }
            ExprKind::Bool(v) => {
                self.b.emit_push_bool(*v);
                Ok(())
            }
            ExprKind::Str(v) => {
                self.b.emit_push_data(v.as_bytes().to_vec());
                Ok(())
            }
            ExprKind::Bytes(v) => {
                self.b.emit_push_data(v.clone());
                Ok(())
            }
            ExprKind::NoneLit => {
                self.b.emit(OpCode::PushNull);
                Ok(())
            }
            ExprKind::Name(name) => self.load_name(name, expr),
            ExprKind::List(items) | ExprKind::Tuple(items) => {
                for item in items.iter().rev() {
                    self.expr(item)?;
                }
                self.b.emit_push_int(items.len() as i128);
                self.b.emit(OpCode::Pack);
                Ok(())
            }
            ExprKind::Dict(pairs) => {
                for (key, value) in pairs.iter().rev() {
                    self.expr(value)?;
                    self.expr(key)?;
                }
                self.b.emit_push_int(pairs.len() as i128);
                self.b.emit(OpCode::PackMap);
                Ok(())
            }
            ExprKind::Binary { op, left, right } => self.binary(*op, left, right),
            ExprKind::Unary { op, operand } => {
                self.expr(operand)?;
                match op {
                    UnaryOp::Neg => self.b.emit(OpCode::Negate),
                    UnaryOp::Pos => {}
                    UnaryOp::BitNot => self.b.emit(OpCode::Invert),
                    UnaryOp::Not => self.b.emit(OpCode::Not),
                }
                Ok(())
            }
            ExprKind::Call { func, args, kwargs } => self.call(expr, func, args, kwargs),
            ExprKind::Attribute { value, attr } => self.attribute(value, attr),
            ExprKind::Subscript { value, index } => {
                self.expr(value)?;
                self.expr(index)?;
                let container = self.expr_type(value);
                if container.is_sequence() {
                    self.normalize_index();
                }
                self.emit_index_load(&container)
            }
            ExprKind::Slice { value, lower, upper } => self.slice(value, lower, upper),
        }
    }

    fn load_name(&mut self, name: &str, expr: &Expr) -> Result<(), CompilerError> {
        if let Some(slot) = self.arg_slot(name) {
            self.b.emit_slot(OpCode::LdArg, slot);
            return Ok(());
        }
        if let Some(slot) = self.local_slot(name) {
            self.b.emit_slot(OpCode::LdLoc, slot);
            return Ok(());
        }
        match self.generator.ctx.symbols.get(name) {
            Some(Symbol::Variable(v)) if v.is_global => {
                // Provably-constant globals are inlined at use sites.
                if let (Some(constant), false) = (&v.constant, v.reassigned) {
                    let constant = constant.clone();
                    self.push_value(&constant);
                    return Ok(());
                }
                let slot = self
                    .generator
                    .global_slots
                    .get(name)
                    .copied()
                    .ok_or_else(|| internal(format!("global '{name}' has no slot")))?;
                self.b.emit_slot(OpCode::LdSFld, slot as u32);
                Ok(())
            }
            Some(other) => Err(CompilerError::NotSupportedOperation {
                symbol: format!("{} '{name}' as a value", other.kind_name()),
                span: expr.span,
            }),
            None => Err(internal(format!("unresolved name '{name}' in codegen"))),
        }
    }

    fn push_value(&mut self, value: &Value) {
        match value {
            Value::Int(v) => self.b.emit_push_int(*v),
            Value::Bool(v) => self.b.emit_push_bool(*v),
            Value::Str(v) => self.b.emit_push_data(v.as_bytes().to_vec()),
            Value::Bytes(v) => self.b.emit_push_data(v.clone()),
            Value::List(items) => {
                for item in items.iter().rev() {
                    self.push_value(item);
                }
                self.b.emit_push_int(items.len() as i128);
                self.b.emit(OpCode::Pack);
            }
            Value::None => self.b.emit(OpCode::PushNull),
        }
    }

    fn binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<(), CompilerError> {
        match op {
            // Short-circuit forms keep the deciding operand's value.
            BinaryOp::And => {
                self.expr(left)?;
                let end = self.b.new_label();
                self.b.emit(OpCode::Dup);
                self.b.emit_jump(OpCode::JmpIfNotL, end);
                self.b.emit(OpCode::Drop);
                self.expr(right)?;
                self.b.bind(end);
                Ok(())
            }
            BinaryOp::Or => {
                self.expr(left)?;
                let end = self.b.new_label();
                self.b.emit(OpCode::Dup);
                self.b.emit_jump(OpCode::JmpIfL, end);
                self.b.emit(OpCode::Drop);
                self.expr(right)?;
                self.b.bind(end);
                Ok(())
            }
            // Membership pushes the container, then the key.
            BinaryOp::In | BinaryOp::NotIn => {
                self.expr(right)?;
                self.expr(left)?;
                self.b.emit(OpCode::HasKey);
                if op == BinaryOp::NotIn {
                    self.b.emit(OpCode::Not);
                }
                Ok(())
            }
            _ => {
                self.expr(left)?;
                self.expr(right)?;
                self.binary_op(op, &self.expr_type(left))
            }
        }
    }

    /// Emit the operator for operands already on the stack.
    fn binary_op(&mut self, op: BinaryOp, left_ty: &Type) -> Result<(), CompilerError> {
        let numeric = left_ty.is_numeric();
        match op {
            BinaryOp::Add if left_ty.is_chars() => {
                self.b.emit(OpCode::Cat);
                self.b
                    .emit_byte(OpCode::Convert, StackItemType::ByteString.into());
            }
            BinaryOp::Add => self.b.emit(OpCode::Add),
            BinaryOp::Sub => self.b.emit(OpCode::Sub),
            BinaryOp::Mul => self.b.emit(OpCode::Mul),
            BinaryOp::Div => self.b.emit(OpCode::Div),
            BinaryOp::Mod => self.b.emit(OpCode::Mod),
            BinaryOp::Pow => self.b.emit(OpCode::Pow),
            BinaryOp::BitAnd => self.b.emit(OpCode::And),
            BinaryOp::BitOr => self.b.emit(OpCode::Or),
            BinaryOp::BitXor => self.b.emit(OpCode::Xor),
            BinaryOp::Shl => self.b.emit(OpCode::Shl),
            BinaryOp::Shr => self.b.emit(OpCode::Shr),
            BinaryOp::Eq if numeric => self.b.emit(OpCode::NumEqual),
            BinaryOp::Eq => self.b.emit(OpCode::Equal),
            BinaryOp::NotEq if numeric => self.b.emit(OpCode::NumNotEqual),
            BinaryOp::NotEq => self.b.emit(OpCode::NotEqual),
            BinaryOp::Lt => self.b.emit(OpCode::Lt),
            BinaryOp::LtE => self.b.emit(OpCode::Le),
            BinaryOp::Gt => self.b.emit(OpCode::Gt),
            BinaryOp::GtE => self.b.emit(OpCode::Ge),
            BinaryOp::In | BinaryOp::NotIn | BinaryOp::And | BinaryOp::Or => {
                return Err(internal(format!(
                    "operator '{}' reached the simple-binary path",
                    op.symbol()
                )));
            }
        }
        Ok(())
    }

    /// Turn a possibly-negative index on top of (collection, index) into
    /// an absolute one by adding the collection's length when negative.
    fn normalize_index(&mut self) {
        let done = self.b.new_label();
        self.b.emit(OpCode::Dup);
        self.b.emit_push_int(0);
        self.b.emit_jump(OpCode::JmpGeL, done);
        self.b.emit(OpCode::Over);
        self.b.emit(OpCode::Size);
        self.b.emit(OpCode::Add);
        self.b.bind(done);
    }

    /// Load an element for (collection, index) already on the stack.
    fn emit_index_load(&mut self, container: &Type) -> Result<(), CompilerError> {
        match container {
            Type::Str => {
                // One-character substring, kept as a string.
                self.b.emit_push_int(1);
                self.b.emit(OpCode::SubStr);
                self.b
                    .emit_byte(OpCode::Convert, StackItemType::ByteString.into());
            }
            _ => self.b.emit(OpCode::PickItem),
        }
        Ok(())
    }

    fn slice(
        &mut self,
        value: &Expr,
        lower: &Option<Box<Expr>>,
        upper: &Option<Box<Expr>>,
    ) -> Result<(), CompilerError> {
        self.expr(value)?;
        self.b.emit(OpCode::Dup);
        self.b.emit(OpCode::Size);
        // Stack: seq, size.

        match lower {
            Some(bound) => {
                self.expr(bound)?;
                self.normalize_bound(1);
                self.clamp_bound(1);
            }
            None => self.b.emit_push_int(0),
        }
        // Stack: seq, size, start.

        match upper {
            Some(bound) => {
                self.expr(bound)?;
                self.normalize_bound(2);
                self.clamp_bound(2);
            }
            None => self.b.emit(OpCode::Over),
        }
        // Stack: seq, size, start, end.

        // count = max(end - start, 0)
        self.b.emit(OpCode::Over);
        self.b.emit(OpCode::Sub);
        self.b.emit_push_int(0);
        self.b.emit(OpCode::Max);
        // Stack: seq, size, start, count. Drop size, order for SUBSTR.
        self.b.emit(OpCode::Reverse3);
        self.b.emit(OpCode::Drop);
        self.b.emit(OpCode::Swap);
        self.b.emit(OpCode::SubStr);
        self.b
            .emit_byte(OpCode::Convert, StackItemType::ByteString.into());
        Ok(())
    }

    /// Add the sequence length (at `depth` under the bound) when the
    /// bound on top is negative.
    fn normalize_bound(&mut self, depth: u32) {
        let done = self.b.new_label();
        self.b.emit(OpCode::Dup);
        self.b.emit_push_int(0);
        self.b.emit_jump(OpCode::JmpGeL, done);
        if depth == 1 {
            self.b.emit(OpCode::Over);
        } else {
            self.b.emit_push_int(depth as i128);
            self.b.emit(OpCode::Pick);
        }
        self.b.emit(OpCode::Add);
        self.b.bind(done);
    }

    /// Clamp the bound on top into `[0, size]`, size at `depth` below.
    fn clamp_bound(&mut self, depth: u32) {
        self.b.emit_push_int(0);
        self.b.emit(OpCode::Max);
        if depth == 1 {
            self.b.emit(OpCode::Over);
        } else {
            self.b.emit_push_int(depth as i128);
            self.b.emit(OpCode::Pick);
        }
        self.b.emit(OpCode::Min);
    }

    // =========================================================================
    // Calls
    // =========================================================================

    fn call(
        &mut self,
        expr: &Expr,
        func: &Expr,
        args: &[Expr],
        kwargs: &[(String, Expr)],
    ) -> Result<(), CompilerError> {
        match &func.kind {
            ExprKind::Name(name) => match self.generator.ctx.symbols.get(name).cloned() {
                Some(Symbol::Method(method)) => {
                    self.push_args_reversed(&method.params, args, kwargs)?;
                    let id = self.generator.method_ids.get(&(None, name.clone())).copied();
                    let id =
                        id.ok_or_else(|| internal(format!("no method id for '{name}'")))?;
                    self.b.emit_call(id);
                    Ok(())
                }
                Some(Symbol::Class(class)) => self.instantiate(&class, args, kwargs),
                Some(Symbol::Event(event)) => {
                    let params = event.params.clone();
                    self.push_args_reversed(&params, args, kwargs)?;
                    self.b.emit_push_int(params.len() as i128);
                    self.b.emit(OpCode::Pack);
                    self.b.emit_push_data(event.event_name.as_bytes().to_vec());
                    self.emit_syscall(interop::NOTIFY);
                    Ok(())
                }
                Some(Symbol::Builtin(builtin)) => self.builtin_call(&builtin, args, kwargs),
                _ => Err(internal(format!("uncallable '{name}' in codegen"))),
            },
            ExprKind::Attribute { value, attr } => {
                if is_super_call(value) {
                    return self.super_init(args, kwargs, expr);
                }
                if let ExprKind::Name(module) = &value.kind {
                    if let Some(Symbol::Builtin(builtin)) = self.generator.ctx.symbols.get(module) {
                        if let Some(member) = builtin.member(attr).cloned() {
                            return self.builtin_call(&member, args, kwargs);
                        }
                    }
                }
                // Instance method call: arguments, then the receiver as
                // the callee's slot 0.
                let receiver_ty = self.expr_type(value);
                let Type::Class(class_ty) = receiver_ty else {
                    return Err(internal(format!("method call on non-class '{attr}'")));
                };
                let class = self.generator.class_symbol(&class_ty.name)?;
                let method = class
                    .method(attr)
                    .cloned()
                    .ok_or_else(|| internal(format!("missing method '{attr}'")))?;
                self.push_args_reversed(&method.params, args, kwargs)?;
                self.expr(value)?;
                let owner = method
                    .defined_in
                    .clone()
                    .unwrap_or_else(|| class_ty.name.clone());
                let id = self
                    .generator
                    .method_ids
                    .get(&(Some(owner), attr.to_string()))
                    .copied()
                    .ok_or_else(|| internal(format!("no method id for '{attr}'")))?;
                self.b.emit_call(id);
                Ok(())
            }
            _ => Err(internal("unsupported call target in codegen".to_string())),
        }
    }

    /// `ClassName(args)`: allocate the field array, then run `__init__`
    /// with the new instance as its receiver, keeping one reference as
    /// the expression result.
    fn instantiate(
        &mut self,
        class: &Rc<ClassSymbol>,
        args: &[Expr],
        kwargs: &[(String, Expr)],
    ) -> Result<(), CompilerError> {
        self.b.emit_push_int(class.fields.len() as i128);
        self.b.emit(OpCode::NewArray);
        let Some(init) = class.method("__init__").cloned() else {
            return Ok(());
        };
        self.b.emit(OpCode::Dup);
        self.push_args_reversed(&init.params, args, kwargs)?;
        let total = init.params.len() as i128;
        if total > 0 {
            // Bring the duplicated instance above its arguments.
            self.b.emit_push_int(total);
            self.b.emit(OpCode::Roll);
        }
        let owner = init.defined_in.clone().unwrap_or_else(|| class.name.clone());
        let id = self
            .generator
            .method_ids
            .get(&(Some(owner), "__init__".to_string()))
            .copied()
            .ok_or_else(|| internal(format!("no id for '{}.__init__'", class.name)))?;
        self.b.emit_call(id);
        Ok(())
    }

    fn super_init(
        &mut self,
        args: &[Expr],
        kwargs: &[(String, Expr)],
        expr: &Expr,
    ) -> Result<(), CompilerError> {
        let base_name = self
            .class
            .as_ref()
            .and_then(|c| c.base.clone())
            .ok_or_else(|| internal("super() without a base class".to_string()))?;
        let base = self.generator.class_symbol(&base_name)?;
        let Some(init) = base.method("__init__").cloned() else {
            let _ = expr;
            return Ok(());
        };
        self.push_args_reversed(&init.params, args, kwargs)?;
        self.b.emit_slot(OpCode::LdArg, 0);
        let owner = init.defined_in.clone().unwrap_or(base_name);
        let id = self
            .generator
            .method_ids
            .get(&(Some(owner), "__init__".to_string()))
            .copied()
            .ok_or_else(|| internal("no id for base __init__".to_string()))?;
        self.b.emit_call(id);
        Ok(())
    }

    /// Push call arguments so the first parameter ends on top: last
    /// parameter first, defaults filling unbound trailing parameters.
    fn push_args_reversed(
        &mut self,
        params: &[Parameter],
        args: &[Expr],
        kwargs: &[(String, Expr)],
    ) -> Result<(), CompilerError> {
        for (index, param) in params.iter().enumerate().rev() {
            if let Some(arg) = args.get(index) {
                self.expr(arg)?;
            } else if let Some((_, value)) = kwargs.iter().find(|(k, _)| *k == param.name) {
                self.expr(value)?;
            } else if let Some(default) = &param.default {
                let default = default.clone();
                self.push_value(&default);
            } else {
                return Err(internal(format!(
                    "unfilled parameter '{}' survived analysis",
                    param.name
                )));
            }
        }
        Ok(())
    }

    fn emit_syscall(&mut self, service: &str) {
        self.b
            .emit_data(OpCode::Syscall, syscall_id(service).to_vec());
    }

    fn builtin_call(
        &mut self,
        builtin: &BuiltinSymbol,
        args: &[Expr],
        kwargs: &[(String, Expr)],
    ) -> Result<(), CompilerError> {
        let BuiltinKind::Method {
            params, lowering, ..
        } = &builtin.kind
        else {
            return Err(internal(format!("'{}' is not callable", builtin.name)));
        };
        let params = params.clone();
        match lowering.clone() {
            BuiltinLowering::Len => {
                self.expr(positional(args, kwargs, 0, "value")?)?;
                self.b.emit(OpCode::Size);
            }
            BuiltinLowering::Abs => {
                self.expr(positional(args, kwargs, 0, "value")?)?;
                self.b.emit(OpCode::Abs);
            }
            BuiltinLowering::Min => {
                self.push_args_reversed(&params, args, kwargs)?;
                self.b.emit(OpCode::Min);
            }
            BuiltinLowering::Max => {
                self.push_args_reversed(&params, args, kwargs)?;
                self.b.emit(OpCode::Max);
            }
            BuiltinLowering::ToScriptHash => {
                self.expr(positional(args, kwargs, 0, "value")?)?;
                self.b
                    .emit_byte(OpCode::Convert, StackItemType::ByteString.into());
            }
            BuiltinLowering::Abort => {
                self.b.emit(OpCode::Abort);
            }
            BuiltinLowering::Syscall(service) => {
                self.push_args_reversed(&params, args, kwargs)?;
                // Storage interops take the default context as their
                // first argument.
                if matches!(
                    service.as_str(),
                    interop::STORAGE_GET | interop::STORAGE_PUT | interop::STORAGE_DELETE
                ) {
                    self.emit_syscall(interop::STORAGE_CONTEXT);
                }
                // Bare runtime notifications wrap the state in a
                // one-element array under a fixed event name.
                if service == interop::NOTIFY {
                    self.b.emit_push_int(1);
                    self.b.emit(OpCode::Pack);
                    self.b.emit_push_data(b"notify".to_vec());
                }
                self.emit_syscall(&service);
            }
            BuiltinLowering::CallContract => self.call_contract(args, kwargs)?,
            BuiltinLowering::CreateEvent | BuiltinLowering::Env => {
                return Err(internal(format!(
                    "'{}' survived to code generation",
                    builtin.name
                )));
            }
        }
        Ok(())
    }

    /// External call through a method token; analysis pinned the target
    /// hash, method name, and argument list to literals.
    fn call_contract(
        &mut self,
        args: &[Expr],
        kwargs: &[(String, Expr)],
    ) -> Result<(), CompilerError> {
        let hash_arg = positional(args, kwargs, 0, "script_hash")?;
        let method_arg = positional(args, kwargs, 1, "method")?;
        let list_arg = positional(args, kwargs, 2, "args")?;
        let (hash, method, call_args) = match (&hash_arg.kind, &method_arg.kind, &list_arg.kind) {
            (ExprKind::Bytes(hash), ExprKind::Str(method), ExprKind::List(items))
                if hash.len() == 20 =>
            {
                (hash.clone(), method.clone(), items.clone())
            }
            _ => return Err(internal("non-constant call_contract target".to_string())),
        };
        for arg in call_args.iter().rev() {
            self.expr(arg)?;
        }
        let mut token_hash = [0u8; 20];
        token_hash.copy_from_slice(&hash);
        let token = MethodToken {
            hash: token_hash,
            method,
            params_count: call_args.len() as u16,
            has_return: true,
            call_flags: CALL_FLAGS_ALL,
        };
        let index = match self.generator.tokens.iter().position(|t| *t == token) {
            Some(index) => index,
            None => {
                self.generator.tokens.push(token);
                self.generator.tokens.len() - 1
            }
        };
        self.b.emit_u16(OpCode::CallT, index as u16);
        Ok(())
    }

    fn attribute(&mut self, value: &Expr, attr: &str) -> Result<(), CompilerError> {
        // Builtin module property.
        if let ExprKind::Name(module) = &value.kind {
            if let Some(Symbol::Builtin(builtin)) = self.generator.ctx.symbols.get(module) {
                if let Some(member) = builtin.member(attr) {
                    let BuiltinKind::Property { lowering, .. } = &member.kind else {
                        return Err(internal(format!("'{module}.{attr}' is not a property")));
                    };
                    let BuiltinLowering::Syscall(service) = lowering.clone() else {
                        return Err(internal(format!("'{module}.{attr}' has no lowering")));
                    };
                    self.emit_syscall(&service);
                    return Ok(());
                }
            }
        }
        // Instance field.
        self.expr(value)?;
        let index = self.field_index(value, attr)?;
        self.b.emit_push_int(index as i128);
        self.b.emit(OpCode::PickItem);
        Ok(())
    }

    fn field_index(&self, obj: &Expr, attr: &str) -> Result<usize, CompilerError> {
        let Type::Class(class_ty) = self.expr_type(obj) else {
            return Err(internal(format!("field access on non-class '{attr}'")));
        };
        let class = self.generator.class_symbol(&class_ty.name)?;
        class
            .field_index(attr)
            .ok_or_else(|| internal(format!("missing field '{}.{attr}'", class_ty.name)))
    }

    // =========================================================================
    // Lightweight type recovery
    // =========================================================================

    /// Recover the static type of an expression from the symbol table.
    /// Analysis already validated everything; this only steers lowering
    /// choices (sequence kind, string concatenation, field layout).
    fn expr_type(&self, expr: &Expr) -> Type {
        match &expr.kind {
            ExprKind::Int(_) => Type::Int,
            ExprKind::Bool(_) => Type::Bool,
            ExprKind::Str(_) => Type::Str,
            ExprKind::Bytes(_) => Type::Bytes,
            ExprKind::NoneLit => Type::None,
            ExprKind::Name(name) => self.name_type(name),
            ExprKind::List(items) => Type::List(Box::new(Type::union_of(
                items.iter().map(|i| self.expr_type(i)).collect(),
            ))),
            ExprKind::Tuple(items) => {
                Type::Tuple(items.iter().map(|i| self.expr_type(i)).collect())
            }
            ExprKind::Dict(pairs) => Type::Dict(
                Box::new(Type::union_of(
                    pairs.iter().map(|(k, _)| self.expr_type(k)).collect(),
                )),
                Box::new(Type::union_of(
                    pairs.iter().map(|(_, v)| self.expr_type(v)).collect(),
                )),
            ),
            ExprKind::Binary { op, left, right } => {
                let lhs = self.expr_type(left);
                let rhs = self.expr_type(right);
                if matches!(op, BinaryOp::In | BinaryOp::NotIn) {
                    return Type::Bool;
                }
                lhs.binary_result(*op, &rhs).unwrap_or(Type::Any)
            }
            ExprKind::Unary { op, operand } => self
                .expr_type(operand)
                .unary_result(*op)
                .unwrap_or(Type::Any),
            ExprKind::Call { func, .. } => self.call_type(func),
            ExprKind::Attribute { value, attr } => {
                if let ExprKind::Name(module) = &value.kind {
                    if let Some(Symbol::Builtin(builtin)) = self.generator.ctx.symbols.get(module) {
                        if let Some(member) = builtin.member(attr) {
                            if let BuiltinKind::Property { ty, .. } = &member.kind {
                                return ty.clone();
                            }
                        }
                    }
                }
                match self.expr_type(value) {
                    Type::Class(class_ty) => self
                        .generator
                        .class_symbol(&class_ty.name)
                        .ok()
                        .and_then(|c| {
                            c.fields
                                .iter()
                                .find(|(n, _)| n == attr)
                                .map(|(_, t)| t.clone())
                        })
                        .unwrap_or(Type::Any),
                    _ => Type::Any,
                }
            }
            ExprKind::Subscript { value, .. } => self
                .expr_type(value)
                .element_type()
                .unwrap_or(Type::Any),
            ExprKind::Slice { value, .. } => self.expr_type(value),
        }
    }

    fn name_type(&self, name: &str) -> Type {
        if self.class.is_some() && name == "self" {
            if let Some(class) = &self.class {
                return class.instance_type();
            }
        }
        if let Some(param) = self.method.params.iter().find(|p| p.name == name) {
            return param.ty.clone();
        }
        if let Some((_, ty)) = self.method.locals.iter().find(|(n, _)| n == name) {
            return ty.clone();
        }
        self.generator
            .ctx
            .symbols
            .get(name)
            .map(Symbol::value_type)
            .unwrap_or(Type::Any)
    }

    fn call_type(&self, func: &Expr) -> Type {
        match &func.kind {
            ExprKind::Name(name) => match self.generator.ctx.symbols.get(name) {
                Some(Symbol::Method(m)) => m.return_type.clone(),
                Some(Symbol::Class(c)) => c.instance_type(),
                Some(Symbol::Event(_)) => Type::None,
                Some(Symbol::Builtin(b)) => match &b.kind {
                    BuiltinKind::Method { return_type, .. } => return_type.clone(),
                    _ => Type::Any,
                },
                _ => Type::Any,
            },
            ExprKind::Attribute { value, attr } => {
                if is_super_call(value) {
                    return Type::None;
                }
                if let ExprKind::Name(module) = &value.kind {
                    if let Some(Symbol::Builtin(builtin)) = self.generator.ctx.symbols.get(module) {
                        if let Some(member) = builtin.member(attr) {
                            if let BuiltinKind::Method { return_type, .. } = &member.kind {
                                return return_type.clone();
                            }
                        }
                    }
                }
                match self.expr_type(value) {
                    Type::Class(class_ty) => self
                        .generator
                        .class_symbol(&class_ty.name)
                        .ok()
                        .and_then(|c| c.method(attr).map(|m| m.return_type.clone()))
                        .unwrap_or(Type::Any),
                    _ => Type::Any,
                }
            }
            _ => Type::Any,
        }
    }
}

enum StoreSite {
    Arg(u32),
    Local(u32),
    Static(u32),
}

/// Resolve one call argument that analysis guaranteed is present, either
/// positionally or by keyword.
fn positional<'e>(
    args: &'e [Expr],
    kwargs: &'e [(String, Expr)],
    index: usize,
    name: &str,
) -> Result<&'e Expr, CompilerError> {
    args.get(index)
        .or_else(|| kwargs.iter().find(|(k, _)| k == name).map(|(_, v)| v))
        .ok_or_else(|| internal(format!("argument '{name}' survived analysis unfilled")))
}

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

fn collect_stmt_names(stmt: &Stmt, out: &mut Vec<String>) {
    match &stmt.kind {
        StmtKind::Assign { target, value } | StmtKind::AnnAssign { target, value, .. } => {
            collect_names(target, out);
            collect_names(value, out);
        }
        StmtKind::AugAssign { target, value, .. } => {
            collect_names(target, out);
            collect_names(value, out);
        }
        StmtKind::If { branches, orelse } => {
            for (cond, body) in branches {
                collect_names(cond, out);
                for s in body {
                    collect_stmt_names(s, out);
                }
            }
            for s in orelse {
                collect_stmt_names(s, out);
            }
        }
        StmtKind::While { cond, body } => {
            collect_names(cond, out);
            for s in body {
                collect_stmt_names(s, out);
            }
        }
        StmtKind::For { iter, body, .. } => {
            collect_names(iter, out);
            for s in body {
                collect_stmt_names(s, out);
            }
        }
        StmtKind::Return { value: Some(value) } => collect_names(value, out),
        StmtKind::Expr(expr) | StmtKind::Raise { exc: expr } => collect_names(expr, out),
        _ => {}
    }
}

fn collect_names(expr: &Expr, out: &mut Vec<String>) {
    match &expr.kind {
        ExprKind::Name(name) => out.push(name.clone()),
        ExprKind::List(items) | ExprKind::Tuple(items) => {
            for item in items {
                collect_names(item, out);
            }
        }
        ExprKind::Dict(pairs) => {
            for (k, v) in pairs {
                collect_names(k, out);
                collect_names(v, out);
            }
        }
        ExprKind::Binary { left, right, .. } => {
            collect_names(left, out);
            collect_names(right, out);
        }
        ExprKind::Unary { operand, .. } => collect_names(operand, out),
        ExprKind::Call { func, args, kwargs } => {
            collect_names(func, out);
            for arg in args {
                collect_names(arg, out);
            }
            for (_, value) in kwargs {
                collect_names(value, out);
            }
        }
        ExprKind::Attribute { value, .. } => collect_names(value, out),
        ExprKind::Subscript { value, index } => {
            collect_names(value, out);
            collect_names(index, out);
        }
        ExprKind::Slice { value, lower, upper } => {
            collect_names(value, out);
            if let Some(bound) = lower {
                collect_names(bound, out);
            }
            if let Some(bound) = upper {
                collect_names(bound, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::construct_analyser::ConstructAnalyser;
    use crate::analysis::module_analyser::ModuleAnalyser;
    use crate::analysis::standard_analyser::StandardAnalyser;
    use crate::analysis::type_analyser::TypeAnalyser;
    use std::path::PathBuf;

    fn generate(source: &str) -> (CompilationContext, GeneratedScript) {
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
        StandardAnalyser::new(&mut ctx).analyse();
        assert!(!ctx.diagnostics.has_errors(), "{}", ctx.diagnostics);
        let generated = CodeGenerator::new(&ctx, &modules).generate().unwrap();
        (ctx, generated)
    }

    #[test]
    fn simple_function_body() {
        let (_, generated) = generate(
            "@public\n\
             def answer() -> int:\n\
             \x20   return 42\n",
        );
        // PUSHINT8 42, RET: no slots needed.
        assert_eq!(generated.script, vec![0x00, 42, 0x40]);
        assert_eq!(generated.methods.len(), 1);
        assert_eq!(generated.methods[0].name, "answer");
        assert_eq!(generated.methods[0].offset, 0);
    }

    #[test]
    fn arguments_get_an_initslot_prologue() {
        let (_, generated) = generate(
            "@public\n\
             def add(a: int, b: int) -> int:\n\
             \x20   return a + b\n",
        );
        // INITSLOT 0 locals, 2 args; LDARG0; LDARG1; ADD; RET.
        assert_eq!(generated.script, vec![0x57, 0, 2, 0x78, 0x79, 0x9E, 0x40]);
    }

    #[test]
    fn unreachable_methods_are_dropped() {
        let (_, generated) = generate(
            "def helper() -> int:\n\
             \x20   return 1\n\
             def unused() -> int:\n\
             \x20   return 2\n\
             @public\n\
             def main() -> int:\n\
             \x20   return helper()\n",
        );
        assert_eq!(generated.methods.len(), 1);
        // helper: PUSH1 + RET (2 bytes); main: CALL_L + RET (6 bytes).
        assert_eq!(generated.script.len(), 2 + 6);
    }

    #[test]
    fn generation_is_deterministic() {
        let source = "@public\n\
                      def f(a: int) -> int:\n\
                      \x20   b = a * 2\n\
                      \x20   return b\n";
        let (_, first) = generate(source);
        let (_, second) = generate(source);
        assert_eq!(first.script, second.script);
    }

    #[test]
    fn const_global_is_inlined_without_initialize() {
        let (_, generated) = generate(
            "FEE = 5\n\
             @public\n\
             def fee() -> int:\n\
             \x20   return FEE\n",
        );
        // PUSH5, RET: no static slots, no _initialize.
        assert_eq!(generated.script, vec![0x15, 0x40]);
        assert_eq!(generated.methods.len(), 1);
    }

    #[test]
    fn reassigned_global_gets_a_static_slot() {
        let (_, generated) = generate(
            "counter = 0\n\
             counter = 1\n\
             @public\n\
             def read() -> int:\n\
             \x20   return counter\n",
        );
        // The module-level reassignment disqualifies the constant
        // inliner, so the global keeps a slot and _initialize appears.
        let init = generated
            .methods
            .iter()
            .find(|m| m.name == "_initialize")
            .expect("_initialize should be synthesized");
        // read: LDSFLD0, RET.
        assert_eq!(&generated.script[..2], &[0x58, 0x40]);
        // _initialize: INITSSLOT 1, PUSH0, STSFLD0, PUSH1, STSFLD0, RET.
        let tail = &generated.script[init.offset..];
        assert_eq!(tail, &[0x56, 1, 0x10, 0x60, 0x11, 0x60, 0x40]);
    }

    #[test]
    fn event_call_packs_and_notifies() {
        let (_, generated) = generate(
            "on_ping = create_event('Ping', value='int')\n\
             @public\n\
             def ping() -> None:\n\
             \x20   on_ping(7)\n",
        );
        let script = &generated.script;
        // PUSH7; PUSH1; PACK; PUSHDATA1 4 "Ping"; SYSCALL id.
        assert_eq!(&script[..3], &[0x17, 0x11, 0xC0]);
        assert_eq!(script[3], 0x0C);
        assert_eq!(script[4], 4);
        assert_eq!(&script[5..9], b"Ping");
        assert_eq!(script[9], 0x41);
        assert_eq!(&script[10..14], &syscall_id(interop::NOTIFY));
    }

    #[test]
    fn storage_get_injects_the_context() {
        let (_, generated) = generate(
            "@public\n\
             def read(key: bytes) -> bytes:\n\
             \x20   return storage.get(key)\n",
        );
        let script = &generated.script;
        // INITSLOT; LDARG0; SYSCALL GetContext; SYSCALL Get; RET.
        assert_eq!(&script[..4], &[0x57, 0, 1, 0x78]);
        assert_eq!(script[4], 0x41);
        assert_eq!(&script[5..9], &syscall_id(interop::STORAGE_CONTEXT));
        assert_eq!(script[9], 0x41);
        assert_eq!(&script[10..14], &syscall_id(interop::STORAGE_GET));
        assert_eq!(script[14], 0x40);
    }

    #[test]
    fn call_contract_builds_one_token_per_target() {
        let (_, generated) = generate(
            "@public\n\
             def hop() -> Any:\n\
             \x20   contract.call_contract(\
             to_script_hash('0x0102030405060708090a0b0c0d0e0f1011121314'), 'ping', [])\n\
             \x20   return contract.call_contract(\
             to_script_hash('0x0102030405060708090a0b0c0d0e0f1011121314'), 'ping', [])\n",
        );
        assert_eq!(generated.tokens.len(), 1);
        assert_eq!(generated.tokens[0].method, "ping");
        assert_eq!(generated.tokens[0].params_count, 0);
        assert_eq!(generated.tokens[0].call_flags, CALL_FLAGS_ALL);
    }

    #[test]
    fn empty_contract_produces_an_empty_script() {
        let (_, generated) = generate("def helper() -> int:\n    return 1\n");
        assert!(generated.script.is_empty());
        assert!(generated.methods.is_empty());
    }
}
