//! Unary operators: negation, complement, boolean not, inc/dec, abs.

use skit_common::span::Span;
use skit_vm::{FlopFunc, Opcode, FORM_RK};

use crate::builder::FunctionBuilder;
use crate::coerce::widen_numeric;
use crate::context::{Aborted, CompileContext};
use crate::slot::ValueSlot;
use crate::types::Type;
use crate::value::ConstVal;

use super::{assign::Place, conversion, Expr, ExprKind};

pub(super) fn resolve_neg(
    operand: Expr,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    let mut operand = operand.resolve(ctx)?;
    match operand.const_val() {
        Some(ConstVal::Int(v)) => {
            let v = *v;
            return Ok(Expr::constant(
                ConstVal::Int(v.wrapping_neg()),
                widen_numeric(operand.ty),
                span,
            ));
        }
        Some(ConstVal::Float(v)) => return Ok(Expr::const_float(-*v, span)),
        Some(ConstVal::Vec2(v)) => {
            return Ok(Expr::constant(ConstVal::Vec2([-v[0], -v[1]]), Type::Vec2, span))
        }
        Some(ConstVal::Vec3(v)) => {
            return Ok(Expr::constant(
                ConstVal::Vec3([-v[0], -v[1], -v[2]]),
                Type::Vec3,
                span,
            ))
        }
        _ => {}
    }
    if !operand.ty.is_numeric() && !operand.ty.is_vector() {
        let name = ctx.type_name(operand.ty);
        return Err(ctx.error(span, format!("cannot negate a value of type {}", name)));
    }
    if operand.ty.is_integer() {
        operand.ty = widen_numeric(operand.ty);
    }
    let ty = operand.ty;
    Ok(Expr::done(ExprKind::Neg(Box::new(operand)), ty, span))
}

/// Unary plus is an identity on numeric operands.
pub(super) fn resolve_plus(
    operand: Expr,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    let operand = operand.resolve(ctx)?;
    if !operand.ty.is_numeric() && !operand.ty.is_vector() {
        let name = ctx.type_name(operand.ty);
        return Err(ctx.error(span, format!("'+' cannot be applied to type {}", name)));
    }
    Ok(operand)
}

pub(super) fn resolve_bitnot(
    operand: Expr,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    let mut operand = operand.resolve(ctx)?;
    if !operand.ty.is_integer() {
        let name = ctx.type_name(operand.ty);
        return Err(ctx.error(span, format!("'~' requires an integer, found {}", name)));
    }
    if let Some(v) = operand.const_int_val() {
        return Ok(Expr::constant(ConstVal::Int(!v), widen_numeric(operand.ty), span));
    }
    operand.ty = widen_numeric(operand.ty);
    let ty = operand.ty;
    Ok(Expr::done(ExprKind::BitNot(Box::new(operand)), ty, span))
}

pub(super) fn resolve_boolnot(
    operand: Expr,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    let operand = operand.resolve(ctx)?;
    let operand = conversion::make_bool(operand, true, ctx)?;
    if let Some(truth) = operand.const_truth() {
        return Ok(Expr::const_bool(!truth, span));
    }
    Ok(Expr::done(
        ExprKind::BoolNot(Box::new(operand)),
        Type::Bool,
        span,
    ))
}

pub(super) fn resolve_incdec(
    target: Expr,
    dec: bool,
    post: bool,
    need_value: bool,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    let target = target.resolve(ctx)?;
    let what = if dec { "--" } else { "++" };
    match target.request_address() {
        None => {
            return Err(ctx.error(span, format!("'{}' needs a variable to modify", what)));
        }
        Some(false) => {
            return Err(ctx.error(span, format!("'{}' cannot modify a read-only value", what)));
        }
        Some(true) => {}
    }
    if !target.ty.is_numeric() || target.ty == Type::Bool {
        let name = ctx.type_name(target.ty);
        return Err(ctx.error(
            span,
            format!("'{}' requires a numeric variable, found {}", what, name),
        ));
    }
    let ty = widen_numeric(target.ty);
    Ok(Expr::done(
        ExprKind::IncDec {
            target: Box::new(target),
            dec,
            post,
            need_value,
        },
        ty,
        span,
    ))
}

// === emission ===

pub(super) fn emit_neg(operand: &Expr, ty: Type, b: &mut FunctionBuilder<'_>) -> ValueSlot {
    let src = operand.emit(b);
    let out = b.to_temp(src);
    let op = match ty {
        Type::Vec2 => Opcode::NegV2,
        Type::Vec3 => Opcode::NegV3,
        Type::Float => Opcode::NegF,
        _ => Opcode::NegI,
    };
    b.emit(op, out.reg, out.reg, 0);
    out
}

pub(super) fn emit_bitnot(operand: &Expr, b: &mut FunctionBuilder<'_>) -> ValueSlot {
    let src = operand.emit(b);
    let out = b.to_temp(src);
    b.emit(Opcode::NotI, out.reg, out.reg, 0);
    out
}

pub(super) fn emit_boolnot(operand: &Expr, b: &mut FunctionBuilder<'_>) -> ValueSlot {
    let src = operand.emit(b);
    let src = b.materialize(src);
    let out = b.to_temp(src);
    let k0 = b.const_int(0);
    b.emit_f(Opcode::EqI, FORM_RK, out.reg, out.reg, k0);
    out
}

pub(super) fn emit_abs(operand: &Expr, ty: Type, b: &mut FunctionBuilder<'_>) -> ValueSlot {
    let src = operand.emit(b);
    let out = b.to_temp(src);
    if ty == Type::Float {
        b.emit_f(Opcode::Flop, FlopFunc::Abs as u8, out.reg, out.reg, 0);
    } else {
        b.emit(Opcode::AbsI, out.reg, out.reg, 0);
    }
    out
}

/// Increment/decrement with the three emission paths: bump in place, copy
/// then bump (post with value), and load/bump/store for memory targets.
pub(super) fn emit_incdec(
    target: &Expr,
    dec: bool,
    post: bool,
    need_value: bool,
    b: &mut FunctionBuilder<'_>,
) -> ValueSlot {
    let float = target.ty == Type::Float;
    let place = Place::prepare(target, b);
    let cur = place.load(b);

    let one = if float {
        b.const_float(1.0)
    } else {
        b.const_int(1)
    };
    let op = match (float, dec) {
        (false, false) => Opcode::AddI,
        (false, true) => Opcode::SubI,
        (true, false) => Opcode::AddF,
        (true, true) => Opcode::SubF,
    };

    let result = if post && need_value {
        // Keep the old value around before bumping.
        let old = b.acquire_temp(cur.bank, 1);
        b.move_into(&cur, old.reg);
        b.emit_f(op, FORM_RK, cur.reg, cur.reg, one);
        place.store(&cur, b);
        if cur.is_temp() {
            b.free_slot(&cur);
        }
        old
    } else {
        b.emit_f(op, FORM_RK, cur.reg, cur.reg, one);
        place.store(&cur, b);
        cur
    };
    place.release(b);
    result
}
