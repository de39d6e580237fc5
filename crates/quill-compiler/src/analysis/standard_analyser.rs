//! The standard analyser.
//!
//! Read-only validation of the declared `supported_standards` against the
//! final symbol table: every method the standard requires must exist as a
//! public method with the required parameter count and safety flag, and
//! every required event must be declared with the required arity. It also
//! rejects manifest identifier collisions between declared events, since
//! the ABI keys events by their on-chain name.

use quill_core::{
    standards, CompilerError, MethodSymbol, Span, StandardMemberKind, Symbol,
};

use crate::context::CompilationContext;

/// Runs the validation; holds nothing but the context.
pub struct StandardAnalyser<'a> {
    ctx: &'a mut CompilationContext,
}

impl<'a> StandardAnalyser<'a> {
    pub fn new(ctx: &'a mut CompilationContext) -> Self {
        Self { ctx }
    }

    pub fn analyse(&mut self) {
        if self.ctx.diagnostics.should_stop() {
            return;
        }
        self.check_event_names();
        let tags = self.ctx.metadata.supported_standards.clone();
        for tag in tags {
            // Unknown tags pass through to the manifest unvalidated.
            if let Some(standard) = standards::by_tag(&tag) {
                self.check_standard(standard);
            }
            if self.ctx.diagnostics.should_stop() {
                return;
            }
        }
    }

    /// Two events sharing an on-chain name would collide in the ABI.
    fn check_event_names(&mut self) {
        let mut seen: Vec<(String, Span)> = Vec::new();
        let mut duplicates = Vec::new();
        for (_, symbol) in self.ctx.symbols.iter() {
            if let Symbol::Event(event) = symbol {
                if seen.iter().any(|(name, _)| *name == event.event_name) {
                    duplicates.push((event.event_name.clone(), event.origin.span));
                } else {
                    seen.push((event.event_name.clone(), event.origin.span));
                }
            }
        }
        for (name, span) in duplicates {
            self.ctx
                .diagnostics
                .error(CompilerError::DuplicatedManifestIdentifier { name, span });
        }
    }

    fn check_standard(&mut self, standard: &standards::Standard) {
        for required in standard.methods {
            let found = match self.ctx.symbols.get(required.name) {
                Some(Symbol::Method(method)) => Some(method),
                _ => None,
            };
            if !matches!(found, Some(m) if satisfies(m, required)) {
                self.ctx.diagnostics.error(CompilerError::MissingStandardDefinition {
                    standard: standard.tag.to_string(),
                    member: required.name.to_string(),
                    kind: StandardMemberKind::Method,
                    span: found.map(|m| m.origin.span).unwrap_or_default(),
                });
            }
        }
        for required in standard.events {
            let found = self.ctx.symbols.iter().find_map(|(_, s)| match s {
                Symbol::Event(event) if event.event_name == required.name => Some(event),
                _ => None,
            });
            if !matches!(found, Some(e) if e.params.len() == required.params) {
                self.ctx.diagnostics.error(CompilerError::MissingStandardDefinition {
                    standard: standard.tag.to_string(),
                    member: required.name.to_string(),
                    kind: StandardMemberKind::Event,
                    span: found.map(|e| e.origin.span).unwrap_or_default(),
                });
            }
        }
    }
}

/// Whether a declared method satisfies a standard's requirement.
fn satisfies(method: &MethodSymbol, required: &standards::StandardMethod) -> bool {
    method.is_public
        && method.params.len() == required.params
        && (!required.safe || method.is_safe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::{Origin, Parameter, Type};
    use rustc_hash::FxHashMap;
    use std::path::PathBuf;

    fn ctx() -> CompilationContext {
        CompilationContext::new(
            PathBuf::from("/virtual/test.ql"),
            PathBuf::from("/virtual"),
            FxHashMap::default(),
            false,
        )
    }

    fn public_method(name: &str, params: usize, safe: bool) -> Symbol {
        Symbol::Method(MethodSymbol {
            name: name.to_string(),
            params: (0..params)
                .map(|i| Parameter::new(format!("p{i}"), Type::Any))
                .collect(),
            return_type: Type::Any,
            is_public: true,
            is_safe: safe,
            defined_in: None,
            locals: Vec::new(),
            origin: Origin::default(),
        })
    }

    fn event(symbol: &str, on_chain: &str, params: usize) -> (String, Symbol) {
        (
            symbol.to_string(),
            Symbol::Event(quill_core::EventSymbol {
                event_name: on_chain.to_string(),
                params: (0..params)
                    .map(|i| Parameter::new(format!("p{i}"), Type::Any))
                    .collect(),
                origin: Origin::default(),
            }),
        )
    }

    fn declare_nep17(ctx: &mut CompilationContext, with_transfer: bool) {
        for (name, params, safe) in [
            ("symbol", 0, true),
            ("decimals", 0, true),
            ("totalSupply", 0, true),
            ("balanceOf", 1, true),
        ] {
            ctx.symbols
                .insert(name, public_method(name, params, safe))
                .unwrap();
        }
        if with_transfer {
            ctx.symbols
                .insert("transfer", public_method("transfer", 4, false))
                .unwrap();
        }
        let (name, sym) = event("on_transfer", "Transfer", 3);
        ctx.symbols.insert(name, sym).unwrap();
        ctx.metadata.add_standard("NEP-17");
    }

    #[test]
    fn complete_nep17_passes() {
        let mut ctx = ctx();
        declare_nep17(&mut ctx, true);
        StandardAnalyser::new(&mut ctx).analyse();
        assert!(!ctx.diagnostics.has_errors(), "{}", ctx.diagnostics);
    }

    #[test]
    fn missing_transfer_is_reported() {
        let mut ctx = ctx();
        declare_nep17(&mut ctx, false);
        StandardAnalyser::new(&mut ctx).analyse();
        assert!(ctx.diagnostics.errors().iter().any(|e| matches!(
            &e.item,
            CompilerError::MissingStandardDefinition {
                standard,
                member,
                kind: StandardMemberKind::Method,
                ..
            } if standard == "NEP-17" && member == "transfer"
        )));
    }

    #[test]
    fn unsafe_required_safe_method_is_missing() {
        let mut ctx = ctx();
        declare_nep17(&mut ctx, true);
        // Redeclare symbol() as unsafe.
        ctx.symbols
            .replace("symbol", public_method("symbol", 0, false));
        StandardAnalyser::new(&mut ctx).analyse();
        assert!(ctx.diagnostics.errors().iter().any(|e| matches!(
            &e.item,
            CompilerError::MissingStandardDefinition { member, .. } if member == "symbol"
        )));
    }

    #[test]
    fn unknown_standard_tag_is_ignored() {
        let mut ctx = ctx();
        ctx.metadata.add_standard("NEP-99");
        StandardAnalyser::new(&mut ctx).analyse();
        assert!(!ctx.diagnostics.has_errors());
    }

    #[test]
    fn duplicate_on_chain_event_names_collide() {
        let mut ctx = ctx();
        for (symbol, on_chain) in [("a", "Ping"), ("b", "Ping")] {
            let (name, sym) = event(symbol, on_chain, 1);
            ctx.symbols.insert(name, sym).unwrap();
        }
        StandardAnalyser::new(&mut ctx).analyse();
        assert!(ctx.diagnostics.errors().iter().any(|e| matches!(
            &e.item,
            CompilerError::DuplicatedManifestIdentifier { name, .. } if name == "Ping"
        )));
    }
}
