//! `if`/`else`.

use skit_common::span::Span;

use crate::builder::FunctionBuilder;
use crate::context::{Aborted, CompileContext};
use crate::expr::{conversion, Expr, ExprKind};
use crate::slot::ValueSlot;
use crate::types::Type;

/// Rejects a declaration used as the direct body of a branch or loop,
/// where its scope would end immediately.
pub(crate) fn check_body(stmt: &Expr, ctx: &mut CompileContext<'_>) -> Result<(), Aborted> {
    if matches!(
        stmt.kind,
        ExprKind::LocalDecl { .. } | ExprKind::StaticArrayDecl { .. }
    ) {
        return Err(ctx.error(stmt.span, "a declaration must be inside a block"));
    }
    Ok(())
}

pub(crate) fn resolve_if(
    cond: Expr,
    then: Option<Box<Expr>>,
    otherwise: Option<Box<Expr>>,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    let cond = cond.resolve(ctx);
    let cond = conversion::make_bool(cond?, false, ctx)?;

    let then = match then {
        Some(stmt) => {
            check_body(&stmt, ctx)?;
            Some(stmt.resolve(ctx)?)
        }
        None => None,
    };
    let otherwise = match otherwise {
        Some(stmt) => {
            check_body(&stmt, ctx)?;
            Some(stmt.resolve(ctx)?)
        }
        None => None,
    };

    // Both arms missing: nothing to branch to.
    if then.is_none() && otherwise.is_none() {
        ctx.warn(span, "'if' statement has no effect");
        return Ok(if cond.has_side_effects() {
            cond
        } else {
            Expr::nop(span)
        });
    }

    // A constant condition keeps only the taken branch.
    if let Some(truth) = cond.const_truth() {
        let taken = if truth { then } else { otherwise };
        return Ok(taken.unwrap_or_else(|| Expr::nop(span)));
    }

    Ok(Expr::done(
        ExprKind::If {
            cond: Box::new(cond),
            then: then.map(Box::new),
            otherwise: otherwise.map(Box::new),
        },
        Type::Void,
        span,
    ))
}

pub(crate) fn emit_if(
    cond: &Expr,
    then: Option<&Expr>,
    otherwise: Option<&Expr>,
    b: &mut FunctionBuilder<'_>,
) -> ValueSlot {
    let cs = cond.emit(b);
    let cs = b.materialize(cs);
    b.emit_test(cs.reg, 0);
    b.free_slot(&cs);
    let to_else = b.emit_jump();

    if let Some(stmt) = then {
        stmt.emit_discard(b);
    }
    match otherwise {
        Some(stmt) => {
            let to_end = b.emit_jump();
            b.patch_jump_here(to_else);
            stmt.emit_discard(b);
            b.patch_jump_here(to_end);
        }
        None => b.patch_jump_here(to_else),
    }
    ValueSlot::void()
}
