//! Short-circuit `&&`/`||` and the ternary conditional.

use skit_common::span::Span;

use crate::builder::FunctionBuilder;
use crate::coerce::{common_numeric, pointer_assignable};
use crate::context::{Aborted, CompileContext};
use crate::slot::ValueSlot;
use crate::types::Type;

use super::{conversion, Expr, ExprKind};

pub(super) fn resolve_logical(
    and: bool,
    lhs: Expr,
    rhs: Expr,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    let lhs = lhs.resolve(ctx);
    let rhs = rhs.resolve(ctx);
    let lhs = conversion::make_bool(lhs?, true, ctx)?;
    let rhs = conversion::make_bool(rhs?, true, ctx)?;

    if let Some(l) = lhs.const_truth() {
        // The constant side decides, or drops out entirely.
        return Ok(if l == and { rhs } else { Expr::const_bool(l, span) });
    }
    if let Some(r) = rhs.const_truth() {
        return Ok(if r == and { lhs } else { Expr::const_bool(r, span) });
    }

    Ok(Expr::done(
        ExprKind::Logical {
            and,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        Type::Bool,
        span,
    ))
}

pub(super) fn resolve_cond(
    cond: Expr,
    then: Expr,
    otherwise: Expr,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    let cond = cond.resolve(ctx);
    let then = then.resolve(ctx);
    let otherwise = otherwise.resolve(ctx);
    let cond = conversion::make_bool(cond?, false, ctx)?;
    let (then, otherwise) = (then?, otherwise?);

    // Unify the branch types.
    let (ty, then, otherwise) = if then.ty == otherwise.ty {
        (then.ty, then, otherwise)
    } else if then.ty.is_numeric() && otherwise.ty.is_numeric() {
        let ty = common_numeric(then.ty, otherwise.ty);
        let then = conversion::coerce_to(then, ty, false, ctx)?;
        let otherwise = conversion::coerce_to(otherwise, ty, false, ctx)?;
        (ty, then, otherwise)
    } else if then.ty.is_string_family() && otherwise.ty.is_string_family() {
        let then = conversion::make_string(then, ctx)?;
        let otherwise = conversion::make_string(otherwise, ctx)?;
        (Type::String, then, otherwise)
    } else if pointer_assignable(ctx.symtab, then.ty, otherwise.ty) {
        let ty = otherwise.ty;
        (ty, then, otherwise)
    } else if pointer_assignable(ctx.symtab, otherwise.ty, then.ty) {
        let ty = then.ty;
        (ty, then, otherwise)
    } else {
        let a = ctx.type_name(then.ty);
        let b = ctx.type_name(otherwise.ty);
        return Err(ctx.error(
            span,
            format!("incompatible conditional branches: {} and {}", a, b),
        ));
    };

    if let Some(truth) = cond.const_truth() {
        return Ok(if truth { then } else { otherwise });
    }

    Ok(Expr::done(
        ExprKind::Cond {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        },
        ty,
        span,
    ))
}

// === emission ===

pub(super) fn emit_logical(
    and: bool,
    lhs: &Expr,
    rhs: &Expr,
    b: &mut FunctionBuilder<'_>,
) -> ValueSlot {
    let out = b.acquire_temp(skit_vm::RegBank::Int, 1);
    let ls = lhs.emit(b);
    let ls = b.materialize(ls);
    b.move_into(&ls, out.reg);
    b.free_slot(&ls);

    let end = if and {
        // A zero left side is the answer.
        b.emit_test(out.reg, 0);
        b.emit_jump()
    } else {
        // A non-zero left side is the answer.
        b.emit_test(out.reg, 0);
        let eval_rhs = b.emit_jump();
        let end = b.emit_jump();
        b.patch_jump_here(eval_rhs);
        end
    };

    let rs = rhs.emit(b);
    let rs = b.materialize(rs);
    b.move_into(&rs, out.reg);
    b.free_slot(&rs);
    b.patch_jump_here(end);
    out
}

pub(super) fn emit_cond(
    cond: &Expr,
    then: &Expr,
    otherwise: &Expr,
    ty: Type,
    b: &mut FunctionBuilder<'_>,
) -> ValueSlot {
    let bank = ty.bank().expect("value-typed conditional");
    let out = b.acquire_temp(bank, ty.reg_count());

    let cs = cond.emit(b);
    let cs = b.materialize(cs);
    b.emit_test(cs.reg, 0);
    b.free_slot(&cs);
    let to_else = b.emit_jump();

    let ts = then.emit(b);
    let ts = b.materialize(ts);
    b.move_into(&ts, out.reg);
    b.free_slot(&ts);
    let to_end = b.emit_jump();

    b.patch_jump_here(to_else);
    let os = otherwise.emit(b);
    let os = b.materialize(os);
    b.move_into(&os, out.reg);
    b.free_slot(&os);
    b.patch_jump_here(to_end);
    out
}
