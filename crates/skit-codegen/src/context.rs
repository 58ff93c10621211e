//! Per-function compilation state.
//!
//! A [`CompileContext`] carries everything resolution needs: the symbol
//! table, the diagnostic sink, the surrounding class, lexical scopes and
//! the strictness dialect. Errors report through the sink and propagate as
//! the zero-sized [`Aborted`] token, so `?` unwinds resolution without
//! carrying a payload twice.

use hashbrown::HashMap;

use skit_common::diagnostics::DiagnosticSink;
use skit_common::span::Span;
use skit_common::symbol::{Symbol, SymbolInterner};

use crate::symtab::{ClassId, NativeRegistry, SymbolTable};
use crate::types::Type;
use crate::value::ConstVal;

/// How forgiving the compiler is with old scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Current rules: lossy conversions and unknown references are errors.
    Strict,
    /// Compatibility rules for scripts written against the old engine:
    /// several strict errors downgrade to warnings with a defined fallback.
    Legacy,
}

/// Marker that an error diagnostic has been emitted and resolution of the
/// enclosing expression stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aborted;

/// Identifies a local variable within one function body.
///
/// Assigned during resolution; the emitter binds it to registers when the
/// declaration statement executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalId(pub u32);

/// A name visible in some lexical scope.
#[derive(Debug, Clone, Copy)]
pub struct LocalInfo {
    pub id: LocalId,
    pub ty: Type,
    pub read_only: bool,
}

struct Scope {
    names: Vec<(Symbol, LocalInfo)>,
}

/// Compile-time contents of a static const array local.
#[derive(Debug, Clone)]
pub struct StaticArrayInfo {
    pub elem: Type,
    pub values: Vec<ConstVal>,
}

/// Everything the resolver can see while compiling one function body.
pub struct CompileContext<'a> {
    pub symtab: &'a SymbolTable,
    pub natives: &'a mut NativeRegistry,
    pub interner: &'a SymbolInterner,
    pub sink: &'a mut DiagnosticSink,
    pub dialect: Dialect,
    /// The class whose method is being compiled, if any.
    pub class: Option<ClassId>,
    pub is_static: bool,
    /// Cue functions get the three-pointer acting context.
    pub is_cue: bool,
    /// Legacy cue bodies shared between classes: `self` may not actually
    /// be of the declaring class at runtime.
    pub self_ambiguous: bool,
    /// The timeline position of the cue being compiled; numeric cue
    /// offsets are only meaningful when this is set.
    pub cue_offset: Option<u32>,
    /// Declared return types; `None` until the first `return` fixes them.
    pub return_types: Option<Vec<Type>>,
    /// Contents of static const array locals, keyed by their ids, so
    /// constant-index reads fold at resolve time.
    pub static_arrays: HashMap<LocalId, StaticArrayInfo>,
    scopes: Vec<Scope>,
    next_local: u32,
    pub loop_depth: u32,
    pub switch_depth: u32,
}

impl<'a> CompileContext<'a> {
    pub fn new(
        symtab: &'a SymbolTable,
        natives: &'a mut NativeRegistry,
        interner: &'a SymbolInterner,
        sink: &'a mut DiagnosticSink,
        dialect: Dialect,
    ) -> Self {
        Self {
            symtab,
            natives,
            interner,
            sink,
            dialect,
            class: None,
            is_static: false,
            is_cue: false,
            self_ambiguous: false,
            cue_offset: None,
            return_types: None,
            static_arrays: HashMap::new(),
            scopes: vec![Scope { names: Vec::new() }],
            next_local: 0,
            loop_depth: 0,
            switch_depth: 0,
        }
    }

    // === diagnostics ===

    /// Reports an error and returns the abort token for `?`.
    pub fn error(&mut self, span: Span, message: impl Into<String>) -> Aborted {
        self.sink.error(span, message);
        Aborted
    }

    pub fn warn(&mut self, span: Span, message: impl Into<String>) {
        self.sink.warning(span, message);
    }

    pub fn note(&mut self, span: Span, message: impl Into<String>) {
        self.sink.note(span, message);
    }

    /// An error under strict rules that legacy scripts get away with.
    /// Returns `Err` exactly when compilation of the expression must stop.
    pub fn lenient_error(&mut self, span: Span, message: impl Into<String>) -> Result<(), Aborted> {
        match self.dialect {
            Dialect::Strict => Err(self.error(span, message)),
            Dialect::Legacy => {
                self.warn(span, message);
                Ok(())
            }
        }
    }

    /// Diagnostic-friendly name of a type.
    pub fn type_name(&self, ty: Type) -> String {
        self.symtab.type_name(ty, self.interner)
    }

    pub fn symbol_name(&self, sym: Symbol) -> &str {
        self.interner.display(sym)
    }

    // === lexical scopes ===

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope { names: Vec::new() });
    }

    /// Pops a scope, returning the locals it declared in declaration
    /// order so the emitter can release their registers.
    pub fn pop_scope(&mut self) -> Vec<LocalId> {
        let scope = self.scopes.pop().expect("unbalanced scope");
        scope.names.into_iter().map(|(_, info)| info.id).collect()
    }

    /// Declares a local in the innermost scope. Shadowing an outer scope
    /// is allowed; a duplicate in the same scope is an error.
    pub fn declare_local(
        &mut self,
        name: Symbol,
        span: Span,
        ty: Type,
        read_only: bool,
    ) -> Result<LocalId, Aborted> {
        let scope = self.scopes.last().expect("no scope");
        if scope.names.iter().any(|(n, _)| *n == name) {
            let text = self.interner.display(name).to_string();
            return Err(self.error(
                span,
                format!("variable '{}' is already declared in this scope", text),
            ));
        }
        let id = LocalId(self.next_local);
        self.next_local += 1;
        let info = LocalInfo { id, ty, read_only };
        self.scopes
            .last_mut()
            .expect("no scope")
            .names
            .push((name, info));
        Ok(id)
    }

    /// Finds a local by name, innermost scope first.
    pub fn lookup_local(&self, name: Symbol) -> Option<LocalInfo> {
        for scope in self.scopes.iter().rev() {
            if let Some((_, info)) = scope.names.iter().rev().find(|(n, _)| *n == name) {
                return Some(*info);
            }
        }
        None
    }

    // === returns ===

    /// Checks a `return` statement's types against the function's, fixing
    /// them on the first return when the signature left them open.
    pub fn unify_return(&mut self, types: &[Type], span: Span) -> Result<(), Aborted> {
        match &self.return_types {
            None => {
                self.return_types = Some(types.to_vec());
                Ok(())
            }
            Some(declared) => {
                if declared.len() != types.len() {
                    let want = declared.len();
                    return Err(self.error(
                        span,
                        format!(
                            "return value count mismatch: expected {}, found {}",
                            want,
                            types.len()
                        ),
                    ));
                }
                for (have, want) in types.iter().zip(declared.clone()) {
                    if *have != want {
                        let have_name = self.type_name(*have);
                        let want_name = self.type_name(want);
                        return Err(self.error(
                            span,
                            format!("cannot return {} where {} is expected", have_name, want_name),
                        ));
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_ctx<R>(f: impl FnOnce(&mut CompileContext<'_>) -> R) -> (R, usize, usize) {
        let symtab = SymbolTable::new();
        let mut natives = NativeRegistry::new();
        let interner = {
            let mut i = SymbolInterner::new();
            i.intern("x");
            i.intern("y");
            i
        };
        let mut sink = DiagnosticSink::new();
        let mut ctx =
            CompileContext::new(&symtab, &mut natives, &interner, &mut sink, Dialect::Strict);
        let r = f(&mut ctx);
        (r, sink.error_count(), sink.warning_count())
    }

    #[test]
    fn test_scoped_shadowing() {
        let ((), errors, _) = with_ctx(|ctx| {
            let x = ctx.interner.get("x").unwrap();
            let outer = ctx
                .declare_local(x, Span::dummy(), Type::Int, false)
                .unwrap();
            ctx.push_scope();
            let inner = ctx
                .declare_local(x, Span::dummy(), Type::Float, false)
                .unwrap();
            assert_eq!(ctx.lookup_local(x).unwrap().id, inner);
            let freed = ctx.pop_scope();
            assert_eq!(freed, vec![inner]);
            assert_eq!(ctx.lookup_local(x).unwrap().id, outer);
        });
        assert_eq!(errors, 0);
    }

    #[test]
    fn test_duplicate_in_same_scope() {
        let ((), errors, _) = with_ctx(|ctx| {
            let x = ctx.interner.get("x").unwrap();
            ctx.declare_local(x, Span::dummy(), Type::Int, false)
                .unwrap();
            assert!(ctx
                .declare_local(x, Span::dummy(), Type::Int, false)
                .is_err());
        });
        assert_eq!(errors, 1);
    }

    #[test]
    fn test_unify_return_fixes_open_signature() {
        let ((), errors, _) = with_ctx(|ctx| {
            assert!(ctx.unify_return(&[Type::Int], Span::dummy()).is_ok());
            assert!(ctx.unify_return(&[Type::Int], Span::dummy()).is_ok());
            assert!(ctx.unify_return(&[Type::Float], Span::dummy()).is_err());
            assert!(ctx.unify_return(&[], Span::dummy()).is_err());
        });
        assert_eq!(errors, 2);
    }

    #[test]
    fn test_lenient_error_is_strict_by_default() {
        let (res, errors, warnings) =
            with_ctx(|ctx| ctx.lenient_error(Span::dummy(), "old-style conversion"));
        assert!(res.is_err());
        assert_eq!(errors, 1);
        assert_eq!(warnings, 0);
    }
}
