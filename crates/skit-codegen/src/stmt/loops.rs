//! `while`, `do ... while` and `for`.

use skit_common::span::Span;

use crate::builder::FunctionBuilder;
use crate::context::{Aborted, CompileContext};
use crate::expr::{conversion, Expr, ExprKind};
use crate::slot::ValueSlot;
use crate::types::Type;

use super::branch::check_body;

pub(crate) fn resolve_while(
    cond: Expr,
    body: Expr,
    do_while: bool,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    check_body(&body, ctx)?;
    let cond = cond.resolve(ctx);
    let cond = conversion::make_bool(cond?, false, ctx)?;

    ctx.loop_depth += 1;
    let body = body.resolve(ctx);
    ctx.loop_depth -= 1;
    let body = body?;

    match cond.const_truth() {
        // A loop that can never run disappears.
        Some(false) if !do_while => return Ok(Expr::nop(span)),
        Some(true) if is_empty(&body) => {
            ctx.warn(span, "loop body is empty and the condition never changes");
        }
        _ => {}
    }

    Ok(Expr::done(
        ExprKind::While {
            cond: Box::new(cond),
            body: Box::new(body),
            do_while,
        },
        Type::Void,
        span,
    ))
}

fn is_empty(stmt: &Expr) -> bool {
    match &stmt.kind {
        ExprKind::Nop => true,
        ExprKind::Block { stmts, .. } => stmts.iter().all(is_empty),
        _ => false,
    }
}

pub(crate) fn resolve_for(
    init: Option<Box<Expr>>,
    cond: Option<Box<Expr>>,
    step: Option<Box<Expr>>,
    body: Expr,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    check_body(&body, ctx)?;

    // The header gets its own scope so an init declaration covers the
    // condition, step and body.
    ctx.push_scope();
    let result = resolve_for_parts(init, cond, step, body, span, ctx);
    let locals = ctx.pop_scope();
    let stmt = result?;

    if locals.is_empty() {
        return Ok(stmt);
    }
    Ok(Expr::done(
        ExprKind::Block {
            stmts: vec![stmt],
            locals,
        },
        Type::Void,
        span,
    ))
}

fn resolve_for_parts(
    init: Option<Box<Expr>>,
    cond: Option<Box<Expr>>,
    step: Option<Box<Expr>>,
    body: Expr,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    let init = match init {
        Some(stmt) => Some(stmt.resolve(ctx)?),
        None => None,
    };
    let cond = match cond {
        Some(c) => {
            let c = c.resolve(ctx)?;
            Some(conversion::make_bool(c, false, ctx)?)
        }
        None => None,
    };
    let step = match step {
        Some(s) => Some(s.resolve(ctx)?),
        None => None,
    };

    ctx.loop_depth += 1;
    let body = body.resolve(ctx);
    ctx.loop_depth -= 1;
    let body = body?;

    // A never-true condition leaves only the init's side effects.
    if cond.as_ref().and_then(Expr::const_truth) == Some(false) {
        return Ok(init.unwrap_or_else(|| Expr::nop(span)));
    }

    Ok(Expr::done(
        ExprKind::For {
            init: init.map(Box::new),
            cond: cond.map(Box::new),
            step: step.map(Box::new),
            body: Box::new(body),
        },
        Type::Void,
        span,
    ))
}

// === emission ===

/// Emits the condition test at the top of an iteration; falls through into
/// the body when the condition holds. Constant-true conditions emit
/// nothing.
fn emit_guard(cond: &Expr, b: &mut FunctionBuilder<'_>) {
    if cond.const_truth() == Some(true) {
        return;
    }
    let cs = cond.emit(b);
    let cs = b.materialize(cs);
    b.emit_test(cs.reg, 0);
    b.free_slot(&cs);
    b.emit_break();
}

pub(crate) fn emit_while(
    cond: &Expr,
    body: &Expr,
    do_while: bool,
    b: &mut FunctionBuilder<'_>,
) -> ValueSlot {
    b.push_loop();
    let top = b.here();

    if do_while {
        body.emit_discard(b);
        // continue lands on the bottom test.
        let cont = b.here();
        match cond.const_truth() {
            Some(true) => b.emit_jump_to(top),
            Some(false) => {}
            None => {
                let cs = cond.emit(b);
                let cs = b.materialize(cs);
                b.emit_test(cs.reg, 0);
                b.free_slot(&cs);
                let done = b.emit_jump();
                b.emit_jump_to(top);
                b.patch_jump_here(done);
            }
        }
        b.pop_loop(cont);
    } else {
        emit_guard(cond, b);
        body.emit_discard(b);
        b.emit_jump_to(top);
        b.pop_loop(top);
    }
    ValueSlot::void()
}

pub(crate) fn emit_for(
    init: Option<&Expr>,
    cond: Option<&Expr>,
    step: Option<&Expr>,
    body: &Expr,
    b: &mut FunctionBuilder<'_>,
) -> ValueSlot {
    if let Some(stmt) = init {
        stmt.emit_discard(b);
    }
    b.push_loop();
    let top = b.here();
    if let Some(cond) = cond {
        emit_guard(cond, b);
    }
    body.emit_discard(b);
    // continue lands on the step.
    let cont = b.here();
    if let Some(step) = step {
        step.emit_discard(b);
    }
    b.emit_jump_to(top);
    b.pop_loop(cont);
    ValueSlot::void()
}
