//! Braced statement blocks and their lexical scope.

use skit_common::span::Span;

use crate::builder::FunctionBuilder;
use crate::context::{Aborted, CompileContext, LocalId};
use crate::expr::{Expr, ExprKind};
use crate::slot::ValueSlot;
use crate::types::Type;

/// Resolves every child even after the first failure, so one bad statement
/// does not hide diagnostics in its siblings.
pub(crate) fn resolve_block(
    stmts: Vec<Expr>,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    ctx.push_scope();
    let mut out = Vec::with_capacity(stmts.len());
    let mut failed = false;
    for stmt in stmts {
        match stmt.resolve(ctx) {
            Ok(s) => out.push(s),
            Err(Aborted) => failed = true,
        }
    }
    let locals = ctx.pop_scope();
    if failed {
        return Err(Aborted);
    }
    Ok(Expr::done(
        ExprKind::Block { stmts: out, locals },
        Type::Void,
        span,
    ))
}

pub(crate) fn emit_block(
    stmts: &[Expr],
    locals: &[LocalId],
    b: &mut FunctionBuilder<'_>,
) -> ValueSlot {
    for stmt in stmts {
        stmt.emit_discard(b);
    }
    for &id in locals {
        b.free_local(id);
    }
    ValueSlot::void()
}
