//! Semantic resolution and bytecode emission for Skit scripts.
//!
//! The front end hands this crate a parsed function body together with
//! the populated symbol tables; [`compile_function`] resolves the tree
//! (type checking, constant folding, desugaring) and lowers it to
//! [`CompiledFunction`] bytecode for the four-bank register VM.
//!
//! Compilation is diagnostic-driven: errors accumulate in the caller's
//! [`DiagnosticSink`] and abort only the expression that produced them,
//! so one pass reports as much as it can.

use std::fmt;

use skit_common::diagnostics::DiagnosticSink;
use skit_common::span::Span;
use skit_common::symbol::{Symbol, SymbolInterner};
use skit_vm::{CompiledFunction, Opcode, RegBank};

pub mod builder;
pub mod coerce;
pub mod context;
pub mod expr;
pub mod regpool;
pub mod slot;
pub mod stmt;
pub mod symtab;
pub mod types;
pub mod value;

pub use builder::FunctionBuilder;
pub use context::{Aborted, CompileContext, Dialect, LocalId};
pub use expr::{Arg, BinOp, CallTarget, CmpOp, Expr, ExprKind};
pub use symtab::{
    ClassDef, ClassId, FieldDef, GlobalVar, MethodDef, NativeDef, NativeRegistry, ParamDef,
    StructDef, StructId, SymbolTable,
};
pub use types::Type;
pub use value::ConstVal;

/// The declared shape of the function being compiled.
pub struct FunctionSig {
    pub name: Symbol,
    /// Enclosing class for methods and cues.
    pub owner: Option<ClassId>,
    pub is_static: bool,
    pub is_cue: bool,
    /// Timeline position of the cue body, enabling numeric cue offsets.
    pub cue_offset: Option<u32>,
    /// Set for legacy cue bodies shared between classes.
    pub self_ambiguous: bool,
    pub params: Vec<ParamDef>,
    /// `None` leaves the signature open; the first `return` fixes it.
    pub returns: Option<Vec<Type>>,
}

/// Compilation did not produce a function.
#[derive(Debug)]
pub enum CompileFail {
    /// Resolution reported errors to the sink.
    Invalid { errors: usize },
}

impl fmt::Display for CompileFail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileFail::Invalid { errors } => {
                write!(f, "compilation failed with {} error(s)", errors)
            }
        }
    }
}

impl std::error::Error for CompileFail {}

/// Compiles one function body to bytecode.
///
/// The body is the function's outermost block. Diagnostics go to `sink`;
/// the returned error only says that some were fatal.
#[allow(clippy::too_many_arguments)]
pub fn compile_function(
    symtab: &SymbolTable,
    natives: &mut NativeRegistry,
    interner: &SymbolInterner,
    sink: &mut DiagnosticSink,
    dialect: Dialect,
    sig: FunctionSig,
    body: Expr,
) -> Result<CompiledFunction, CompileFail> {
    let mut ctx = CompileContext::new(symtab, natives, interner, sink, dialect);
    ctx.class = sig.owner;
    ctx.is_static = sig.is_static;
    ctx.is_cue = sig.is_cue;
    ctx.cue_offset = sig.cue_offset;
    ctx.self_ambiguous = sig.self_ambiguous;
    ctx.return_types = sig.returns;

    // Parameters are ordinary locals pinned to the low registers.
    let mut param_ids = Vec::with_capacity(sig.params.len());
    for param in &sig.params {
        match ctx.declare_local(param.name, Span::dummy(), param.ty, false) {
            Ok(id) => param_ids.push(id),
            Err(Aborted) => {}
        }
    }

    let resolved = body.resolve(&mut ctx);
    let returns = ctx.return_types.clone().unwrap_or_default();

    if sink.error_count() > 0 {
        return Err(CompileFail::Invalid {
            errors: sink.error_count(),
        });
    }
    let resolved = resolved.map_err(|Aborted| CompileFail::Invalid {
        errors: sink.error_count().max(1),
    })?;

    let implicit_count: u16 = if sig.is_static {
        0
    } else if sig.is_cue {
        3
    } else {
        1
    };

    // Count the registers each bank contributes to the parameter area.
    let mut bank_params = [0u16; 4];
    bank_params[RegBank::Ptr as usize] = implicit_count;
    let mut param_regs = Vec::with_capacity(sig.params.len());
    for param in &sig.params {
        let bank = param.ty.bank().expect("register-typed parameter");
        let count = param.ty.reg_count();
        param_regs.push((bank, bank_params[bank as usize], count));
        bank_params[bank as usize] += count;
    }

    let mut b = FunctionBuilder::new(interner.display(sig.name).to_string(), interner);
    b.set_signature(
        implicit_count + sig.params.len() as u16,
        implicit_count,
        returns.len() as u16,
        bank_params,
    );
    for (&id, &(bank, reg, count)) in param_ids.iter().zip(&param_regs) {
        b.bind_param(id, bank, reg, count);
    }

    resolved.emit_discard(&mut b);

    // Execution must not run off the end of the stream.
    let ends_returned = b.here() > 0
        && matches!(
            b.instruction(b.here() - 1).opcode(),
            Opcode::RetNone | Opcode::TailCall | Opcode::TailCallK
        );
    if !ends_returned {
        b.emit(Opcode::RetNone, 0, 0, 0);
    }

    Ok(b.finish())
}
