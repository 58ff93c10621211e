//! Arithmetic, bitwise and shift operators, plus string concatenation.

use skit_common::span::Span;
use skit_vm::{Opcode, RegBank, FORM_KR, FORM_RK};

use crate::builder::FunctionBuilder;
use crate::coerce::{common_numeric, fold_float, fold_int, widen_numeric};
use crate::context::{Aborted, CompileContext};
use crate::slot::ValueSlot;
use crate::types::Type;
use crate::value::ConstVal;

use super::{conversion, BinOp, Expr, ExprKind};

/// The opcode implementing `op` at the given operation type (`Int`, `UInt`
/// or `Float`).
pub(super) fn arith_opcode(op: BinOp, ty: Type) -> Opcode {
    if ty == Type::Float {
        match op {
            BinOp::Add => Opcode::AddF,
            BinOp::Sub => Opcode::SubF,
            BinOp::Mul => Opcode::MulF,
            BinOp::Div => Opcode::DivF,
            BinOp::Mod => Opcode::ModF,
            BinOp::Pow => Opcode::PowF,
            _ => unreachable!("bitwise operator on float"),
        }
    } else {
        let unsigned = ty.is_unsigned();
        match op {
            BinOp::Add => Opcode::AddI,
            BinOp::Sub => Opcode::SubI,
            BinOp::Mul => Opcode::MulI,
            BinOp::Div if unsigned => Opcode::DivU,
            BinOp::Div => Opcode::DivI,
            BinOp::Mod if unsigned => Opcode::ModU,
            BinOp::Mod => Opcode::ModI,
            BinOp::BitAnd => Opcode::AndI,
            BinOp::BitOr => Opcode::OrI,
            BinOp::BitXor => Opcode::XorI,
            BinOp::Shl => Opcode::ShlI,
            BinOp::Shr if unsigned => Opcode::ShrU,
            BinOp::Shr => Opcode::ShrI,
            BinOp::Pow => unreachable!("'**' always operates on floats"),
        }
    }
}

pub(super) fn resolve_binary(
    op: BinOp,
    lhs: Expr,
    rhs: Expr,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    let lhs = lhs.resolve(ctx);
    let rhs = rhs.resolve(ctx);
    let (lhs, rhs) = (lhs?, rhs?);

    if lhs.ty.is_vector() || rhs.ty.is_vector() {
        return resolve_vector_binary(op, lhs, rhs, span, ctx);
    }

    let ok = |t: Type| t.is_numeric() || t == Type::Bool;
    if !ok(lhs.ty) || !ok(rhs.ty) {
        let a = ctx.type_name(lhs.ty);
        let b = ctx.type_name(rhs.ty);
        return Err(ctx.error(
            span,
            format!("'{}' is not defined for {} and {}", op.name(), a, b),
        ));
    }

    if op.int_only() && (lhs.ty == Type::Float || rhs.ty == Type::Float) {
        return Err(ctx.error(
            span,
            format!("'{}' requires integer operands", op.name()),
        ));
    }

    // Shifts keep the left operand's kind; the shift amount is an int.
    let (ty, lhs, rhs) = if matches!(op, BinOp::Shl | BinOp::Shr) {
        let ty = widen_numeric(lhs.ty);
        let lhs = conversion::coerce_to(lhs, ty, false, ctx)?;
        let rhs = conversion::coerce_to(rhs, Type::Int, false, ctx)?;
        (ty, lhs, rhs)
    } else {
        let ty = if op == BinOp::Pow {
            Type::Float
        } else {
            common_numeric(lhs.ty, rhs.ty)
        };
        let lhs = conversion::coerce_to(lhs, ty, false, ctx)?;
        let rhs = conversion::coerce_to(rhs, ty, false, ctx)?;
        (ty, lhs, rhs)
    };

    if let (Some(a), Some(b)) = (lhs.const_val(), rhs.const_val()) {
        let folded = if ty == Type::Float {
            fold_float(op, a.as_float().unwrap_or(0.0), b.as_float().unwrap_or(0.0))
                .map(ConstVal::Float)
        } else {
            fold_int(
                op,
                a.as_int().unwrap_or(0),
                b.as_int().unwrap_or(0),
                ty.is_unsigned(),
            )
            .map(ConstVal::Int)
        };
        return match folded {
            Ok(v) => Ok(Expr::constant(v, ty, span)),
            Err(msg) => Err(ctx.error(span, msg)),
        };
    }

    Ok(Expr::done(
        ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        ty,
        span,
    ))
}

/// Vector forms: add/sub of same-size vectors (plus a 2-vector right
/// operand against a 3-vector left), and scale/divide by a scalar.
/// Scalar-times-vector normalizes to vector-times-scalar.
fn resolve_vector_binary(
    op: BinOp,
    lhs: Expr,
    rhs: Expr,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    let fail = |ctx: &mut CompileContext<'_>, lhs: &Expr, rhs: &Expr| {
        let a = ctx.type_name(lhs.ty);
        let b = ctx.type_name(rhs.ty);
        Err(ctx.error(
            span,
            format!("'{}' is not defined for {} and {}", op.name(), a, b),
        ))
    };

    match op {
        BinOp::Add | BinOp::Sub => {
            // A 2-vector on the right combines with a 3-vector's x/y,
            // leaving z untouched.
            let mixed = lhs.ty == Type::Vec3 && rhs.ty == Type::Vec2;
            if lhs.ty != rhs.ty && !mixed {
                return fail(ctx, &lhs, &rhs);
            }
            let ty = lhs.ty;
            if let (Some(a), Some(b)) = (lhs.const_val(), rhs.const_val()) {
                let v = if let (ConstVal::Vec3(a), ConstVal::Vec2(b)) = (a, b) {
                    let f = |x: f64, y: f64| if op == BinOp::Add { x + y } else { x - y };
                    ConstVal::Vec3([f(a[0], b[0]), f(a[1], b[1]), a[2]])
                } else {
                    fold_vector_addsub(op, a, b)
                };
                return Ok(Expr::constant(v, ty, span));
            }
            Ok(Expr::done(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                ty,
                span,
            ))
        }
        BinOp::Mul | BinOp::Div => {
            // Division only allows the scalar on the right.
            let (vec, scalar) = if lhs.ty.is_vector() && rhs.ty.is_numeric() {
                (lhs, rhs)
            } else if op == BinOp::Mul && rhs.ty.is_vector() && lhs.ty.is_numeric() {
                (rhs, lhs)
            } else {
                return fail(ctx, &lhs, &rhs);
            };
            let scalar = conversion::coerce_to(scalar, Type::Float, false, ctx)?;
            let ty = vec.ty;
            if let (Some(v), Some(ConstVal::Float(s))) = (vec.const_val(), scalar.const_val()) {
                let s = *s;
                if op == BinOp::Div && s == 0.0 {
                    return Err(ctx.error(span, "division by zero"));
                }
                let f = |c: f64| if op == BinOp::Mul { c * s } else { c / s };
                let v = match v {
                    ConstVal::Vec2(c) => ConstVal::Vec2([f(c[0]), f(c[1])]),
                    ConstVal::Vec3(c) => ConstVal::Vec3([f(c[0]), f(c[1]), f(c[2])]),
                    _ => unreachable!("vector-typed constant"),
                };
                return Ok(Expr::constant(v, ty, span));
            }
            Ok(Expr::done(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(vec),
                    rhs: Box::new(scalar),
                },
                ty,
                span,
            ))
        }
        _ => fail(ctx, &lhs, &rhs),
    }
}

fn fold_vector_addsub(op: BinOp, a: &ConstVal, b: &ConstVal) -> ConstVal {
    let f = |x: f64, y: f64| if op == BinOp::Add { x + y } else { x - y };
    match (a, b) {
        (ConstVal::Vec2(a), ConstVal::Vec2(b)) => ConstVal::Vec2([f(a[0], b[0]), f(a[1], b[1])]),
        (ConstVal::Vec3(a), ConstVal::Vec3(b)) => {
            ConstVal::Vec3([f(a[0], b[0]), f(a[1], b[1]), f(a[2], b[2])])
        }
        _ => unreachable!("operands checked to be same-size vectors"),
    }
}

pub(super) fn resolve_concat(
    lhs: Expr,
    rhs: Expr,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    let lhs = lhs.resolve(ctx);
    let rhs = rhs.resolve(ctx);
    let lhs = conversion::make_string(lhs?, ctx)?;
    let rhs = conversion::make_string(rhs?, ctx)?;

    if let (Some(ConstVal::Str(a)), Some(ConstVal::Str(b))) = (lhs.const_val(), rhs.const_val()) {
        let mut joined = a.clone();
        joined.push_str(b);
        return Ok(Expr::constant(ConstVal::Str(joined), Type::String, span));
    }

    Ok(Expr::done(
        ExprKind::Concat {
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        Type::String,
        span,
    ))
}

// === emission ===

pub(super) fn emit_binary(
    op: BinOp,
    lhs: &Expr,
    rhs: &Expr,
    ty: Type,
    b: &mut FunctionBuilder<'_>,
) -> ValueSlot {
    if ty.is_vector() {
        return emit_vector_binary(op, lhs, rhs, ty, b);
    }

    let opcode = arith_opcode(op, ty);
    let ls = lhs.emit(b);
    let rs = rhs.emit(b);
    debug_assert!(!(ls.constant && rs.constant), "constants fold at resolution");

    if rs.constant {
        let l = b.materialize(ls);
        let out = b.to_temp(l);
        b.emit_f(opcode, FORM_RK, out.reg, out.reg, rs.reg);
        return out;
    }
    if ls.constant {
        if op.is_commutative() {
            let out = b.to_temp(rs);
            b.emit_f(opcode, FORM_RK, out.reg, out.reg, ls.reg);
            return out;
        }
        let out = if rs.is_temp() {
            rs
        } else {
            b.acquire_temp(rs.bank, 1)
        };
        b.emit_f(opcode, FORM_KR, out.reg, ls.reg, rs.reg);
        return out;
    }

    // Both in registers; reuse a temporary operand as the destination.
    let out = if ls.is_temp() {
        ls
    } else if rs.is_temp() {
        rs
    } else {
        b.acquire_temp(ls.bank, 1)
    };
    b.emit(opcode, out.reg, ls.reg, rs.reg);
    if ls.is_temp() && out.reg != ls.reg {
        b.free_slot(&ls);
    }
    if rs.is_temp() && out.reg != rs.reg {
        b.free_slot(&rs);
    }
    out
}

fn emit_vector_binary(
    op: BinOp,
    lhs: &Expr,
    rhs: &Expr,
    ty: Type,
    b: &mut FunctionBuilder<'_>,
) -> ValueSlot {
    let ls = lhs.emit(b);
    let ls = b.materialize(ls);
    let rs = rhs.emit(b);
    let rs = b.materialize(rs);

    // A 2-vector right operand under a 3-vector result touches only the
    // x/y pair; the left operand's z rides through in place.
    if ty == Type::Vec3 && rhs.ty == Type::Vec2 {
        let opcode = match op {
            BinOp::Add => Opcode::AddV2,
            BinOp::Sub => Opcode::SubV2,
            _ => unreachable!("resolution restricts mixed-size vector operators"),
        };
        let out = if ls.is_temp() {
            ls
        } else {
            let out = b.acquire_temp(RegBank::Float, 3);
            b.emit(Opcode::MoveV3, out.reg, ls.reg, 0);
            out
        };
        b.emit(opcode, out.reg, out.reg, rs.reg);
        b.free_slot(&rs);
        return out;
    }

    let wide = ty == Type::Vec3;
    let opcode = match op {
        BinOp::Add if wide => Opcode::AddV3,
        BinOp::Add => Opcode::AddV2,
        BinOp::Sub if wide => Opcode::SubV3,
        BinOp::Sub => Opcode::SubV2,
        BinOp::Mul if wide => Opcode::ScaleV3,
        BinOp::Mul => Opcode::ScaleV2,
        BinOp::Div if wide => Opcode::DivV3,
        BinOp::Div => Opcode::DivV2,
        _ => unreachable!("resolution restricts vector operators"),
    };
    let out = b.acquire_temp(RegBank::Float, ty.reg_count());
    b.emit(opcode, out.reg, ls.reg, rs.reg);
    b.free_slot(&ls);
    b.free_slot(&rs);
    out
}

pub(super) fn emit_concat(lhs: &Expr, rhs: &Expr, b: &mut FunctionBuilder<'_>) -> ValueSlot {
    let ls = lhs.emit(b);
    let ls = b.materialize(ls);
    let rs = rhs.emit(b);
    let rs = b.materialize(rs);
    let out = b.acquire_temp(RegBank::String, 1);
    b.emit(Opcode::ConcatS, out.reg, ls.reg, rs.reg);
    b.free_slot(&ls);
    b.free_slot(&rs);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_selection_tracks_signedness() {
        assert_eq!(arith_opcode(BinOp::Div, Type::Int), Opcode::DivI);
        assert_eq!(arith_opcode(BinOp::Div, Type::UInt), Opcode::DivU);
        assert_eq!(arith_opcode(BinOp::Shr, Type::UInt), Opcode::ShrU);
        assert_eq!(arith_opcode(BinOp::Mod, Type::Float), Opcode::ModF);
    }
}
