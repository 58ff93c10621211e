//! `break` and `continue` validity checks; the jumps themselves are
//! recorded against the builder's innermost frame at emission.

use skit_common::span::Span;

use crate::context::{Aborted, CompileContext};
use crate::expr::{Expr, ExprKind};
use crate::types::Type;

pub(crate) fn resolve_break(span: Span, ctx: &mut CompileContext<'_>) -> Result<Expr, Aborted> {
    if ctx.loop_depth == 0 && ctx.switch_depth == 0 {
        return Err(ctx.error(span, "'break' is not inside a loop or switch"));
    }
    Ok(Expr::done(ExprKind::Break, Type::Void, span))
}

pub(crate) fn resolve_continue(span: Span, ctx: &mut CompileContext<'_>) -> Result<Expr, Aborted> {
    if ctx.loop_depth == 0 {
        return Err(ctx.error(span, "'continue' is not inside a loop"));
    }
    Ok(Expr::done(ExprKind::Continue, Type::Void, span))
}
