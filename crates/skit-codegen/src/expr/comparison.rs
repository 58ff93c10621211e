//! Relational operators, pointer/string/vector equality, and `<>=`.

use skit_common::span::Span;
use skit_vm::{
    Opcode, RegBank, CMPS_EQ, CMPS_GE, CMPS_GT, CMPS_LE, CMPS_LT, CMPS_NE, CMP_APPROX, FORM_RK,
};

use crate::builder::FunctionBuilder;
use crate::coerce::{common_numeric, pointer_assignable};
use crate::context::{Aborted, CompileContext};
use crate::slot::ValueSlot;
use crate::types::Type;
use crate::value::ConstVal;

use super::{conversion, CmpOp, Expr, ExprKind};

/// Approximate float equality uses the same tolerance as the interpreter.
const APPROX_EPSILON: f64 = 1.0 / 65536.0;

fn cmp_opcode(op: CmpOp, ty: Type) -> Opcode {
    if ty == Type::Float {
        match op {
            CmpOp::Eq => Opcode::EqF,
            CmpOp::Ne => Opcode::NeF,
            CmpOp::Lt => Opcode::LtF,
            CmpOp::Le => Opcode::LeF,
            CmpOp::Gt => Opcode::GtF,
            CmpOp::Ge => Opcode::GeF,
        }
    } else if ty.is_unsigned() {
        match op {
            CmpOp::Eq => Opcode::EqI,
            CmpOp::Ne => Opcode::NeI,
            CmpOp::Lt => Opcode::LtU,
            CmpOp::Le => Opcode::LeU,
            CmpOp::Gt => Opcode::GtU,
            CmpOp::Ge => Opcode::GeU,
        }
    } else {
        match op {
            CmpOp::Eq => Opcode::EqI,
            CmpOp::Ne => Opcode::NeI,
            CmpOp::Lt => Opcode::LtI,
            CmpOp::Le => Opcode::LeI,
            CmpOp::Gt => Opcode::GtI,
            CmpOp::Ge => Opcode::GeI,
        }
    }
}

fn cmps_flag(op: CmpOp) -> u8 {
    match op {
        CmpOp::Eq => CMPS_EQ,
        CmpOp::Ne => CMPS_NE,
        CmpOp::Lt => CMPS_LT,
        CmpOp::Le => CMPS_LE,
        CmpOp::Gt => CMPS_GT,
        CmpOp::Ge => CMPS_GE,
    }
}

pub(super) fn resolve_compare(
    op: CmpOp,
    lhs: Expr,
    rhs: Expr,
    approx: bool,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    let lhs = lhs.resolve(ctx);
    let rhs = rhs.resolve(ctx);
    let (lhs, rhs) = (lhs?, rhs?);

    // Pointers and class references only have equality.
    if lhs.ty.is_pointer() || rhs.ty.is_pointer() {
        if !op.is_equality() {
            return Err(ctx.error(
                span,
                format!("'{}' is not defined for pointers", op.name()),
            ));
        }
        if !lhs.ty.is_pointer()
            || !rhs.ty.is_pointer()
            || !(pointer_assignable(ctx.symtab, lhs.ty, rhs.ty)
                || pointer_assignable(ctx.symtab, rhs.ty, lhs.ty))
        {
            let a = ctx.type_name(lhs.ty);
            let b = ctx.type_name(rhs.ty);
            return Err(ctx.error(span, format!("cannot compare {} with {}", a, b)));
        }
        if let (Some(ConstVal::Null), Some(ConstVal::Null)) = (lhs.const_val(), rhs.const_val()) {
            return Ok(Expr::const_bool(op == CmpOp::Eq, span));
        }
        return Ok(finish(op, lhs, rhs, false, span));
    }

    if lhs.ty.is_vector() || rhs.ty.is_vector() {
        if !op.is_equality() {
            return Err(ctx.error(
                span,
                format!("'{}' is not defined for vectors", op.name()),
            ));
        }
        if lhs.ty != rhs.ty {
            let a = ctx.type_name(lhs.ty);
            let b = ctx.type_name(rhs.ty);
            return Err(ctx.error(span, format!("cannot compare {} with {}", a, b)));
        }
        if let (Some(a), Some(b)) = (lhs.const_val(), rhs.const_val()) {
            let eq = fold_vector_eq(a, b, approx);
            return Ok(Expr::const_bool(eq == (op == CmpOp::Eq), span));
        }
        return Ok(finish(op, lhs, rhs, approx, span));
    }

    if lhs.ty.is_string_family() || rhs.ty.is_string_family() {
        if approx {
            return Err(ctx.error(span, "'~==' is not defined for strings"));
        }
        let lhs = conversion::make_string(lhs, ctx)?;
        let rhs = conversion::make_string(rhs, ctx)?;
        if let (Some(ConstVal::Str(a)), Some(ConstVal::Str(b))) =
            (lhs.const_val(), rhs.const_val())
        {
            let r = match op {
                CmpOp::Eq => a == b,
                CmpOp::Ne => a != b,
                CmpOp::Lt => a < b,
                CmpOp::Le => a <= b,
                CmpOp::Gt => a > b,
                CmpOp::Ge => a >= b,
            };
            return Ok(Expr::const_bool(r, span));
        }
        return Ok(finish(op, lhs, rhs, false, span));
    }

    let ok = |t: Type| t.is_numeric() || t == Type::Bool;
    if !ok(lhs.ty) || !ok(rhs.ty) {
        let a = ctx.type_name(lhs.ty);
        let b = ctx.type_name(rhs.ty);
        return Err(ctx.error(span, format!("cannot compare {} with {}", a, b)));
    }
    if approx && lhs.ty != Type::Float && rhs.ty != Type::Float {
        return Err(ctx.error(span, "'~==' requires float operands"));
    }

    let ty = common_numeric(lhs.ty, rhs.ty);
    let lhs = conversion::coerce_to(lhs, ty, false, ctx)?;
    let rhs = conversion::coerce_to(rhs, ty, false, ctx)?;

    if let (Some(a), Some(b)) = (lhs.const_val(), rhs.const_val()) {
        let r = if ty == Type::Float {
            let (a, b) = (a.as_float().unwrap_or(0.0), b.as_float().unwrap_or(0.0));
            if approx {
                ((a - b).abs() < APPROX_EPSILON) == (op == CmpOp::Eq)
            } else {
                match op {
                    CmpOp::Eq => a == b,
                    CmpOp::Ne => a != b,
                    CmpOp::Lt => a < b,
                    CmpOp::Le => a <= b,
                    CmpOp::Gt => a > b,
                    CmpOp::Ge => a >= b,
                }
            }
        } else if ty.is_unsigned() {
            let (a, b) = (
                a.as_int().unwrap_or(0) as u32,
                b.as_int().unwrap_or(0) as u32,
            );
            fold_ord(op, a.cmp(&b))
        } else {
            let (a, b) = (a.as_int().unwrap_or(0), b.as_int().unwrap_or(0));
            fold_ord(op, a.cmp(&b))
        };
        return Ok(Expr::const_bool(r, span));
    }

    Ok(finish(op, lhs, rhs, approx, span))
}

fn finish(op: CmpOp, lhs: Expr, rhs: Expr, approx: bool, span: Span) -> Expr {
    Expr::done(
        ExprKind::Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            approx,
        },
        Type::Bool,
        span,
    )
}

fn fold_ord(op: CmpOp, ord: std::cmp::Ordering) -> bool {
    match op {
        CmpOp::Eq => ord.is_eq(),
        CmpOp::Ne => ord.is_ne(),
        CmpOp::Lt => ord.is_lt(),
        CmpOp::Le => ord.is_le(),
        CmpOp::Gt => ord.is_gt(),
        CmpOp::Ge => ord.is_ge(),
    }
}

fn fold_vector_eq(a: &ConstVal, b: &ConstVal, approx: bool) -> bool {
    let eq = |x: f64, y: f64| {
        if approx {
            (x - y).abs() < APPROX_EPSILON
        } else {
            x == y
        }
    };
    match (a, b) {
        (ConstVal::Vec2(a), ConstVal::Vec2(b)) => eq(a[0], b[0]) && eq(a[1], b[1]),
        (ConstVal::Vec3(a), ConstVal::Vec3(b)) => {
            eq(a[0], b[0]) && eq(a[1], b[1]) && eq(a[2], b[2])
        }
        _ => unreachable!("operands checked to be same-size vectors"),
    }
}

pub(super) fn resolve_three_way(
    lhs: Expr,
    rhs: Expr,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    let lhs = lhs.resolve(ctx);
    let rhs = rhs.resolve(ctx);
    let (lhs, rhs) = (lhs?, rhs?);
    if !lhs.ty.is_numeric() || !rhs.ty.is_numeric() {
        let a = ctx.type_name(lhs.ty);
        let b = ctx.type_name(rhs.ty);
        return Err(ctx.error(span, format!("'<>=' is not defined for {} and {}", a, b)));
    }
    let ty = common_numeric(lhs.ty, rhs.ty);
    let lhs = conversion::coerce_to(lhs, ty, false, ctx)?;
    let rhs = conversion::coerce_to(rhs, ty, false, ctx)?;

    if let (Some(a), Some(b)) = (lhs.const_val(), rhs.const_val()) {
        let r = if ty == Type::Float {
            let (a, b) = (a.as_float().unwrap_or(0.0), b.as_float().unwrap_or(0.0));
            if a < b {
                -1
            } else if a > b {
                1
            } else {
                0
            }
        } else if ty.is_unsigned() {
            (a.as_int().unwrap_or(0) as u32).cmp(&(b.as_int().unwrap_or(0) as u32)) as i32
        } else {
            a.as_int().unwrap_or(0).cmp(&b.as_int().unwrap_or(0)) as i32
        };
        return Ok(Expr::const_int(r, span));
    }

    Ok(Expr::done(
        ExprKind::ThreeWay {
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        Type::Int,
        span,
    ))
}

// === emission ===

pub(super) fn emit_compare(
    op: CmpOp,
    lhs: &Expr,
    rhs: &Expr,
    approx: bool,
    b: &mut FunctionBuilder<'_>,
) -> ValueSlot {
    let ty = lhs.ty;

    if ty.is_vector() {
        let ls = lhs.emit(b);
        let ls = b.materialize(ls);
        let rs = rhs.emit(b);
        let rs = b.materialize(rs);
        let out = b.acquire_temp(RegBank::Int, 1);
        let opcode = if ty == Type::Vec2 {
            Opcode::EqV2
        } else {
            Opcode::EqV3
        };
        let flags = if approx { CMP_APPROX } else { 0 };
        b.emit_f(opcode, flags, out.reg, ls.reg, rs.reg);
        b.free_slot(&ls);
        b.free_slot(&rs);
        if op == CmpOp::Ne {
            let k1 = b.const_int(1);
            b.emit_f(Opcode::XorI, FORM_RK, out.reg, out.reg, k1);
        }
        return out;
    }

    if ty.is_string_family() {
        return emit_form(Opcode::CmpS, cmps_flag(op), lhs, rhs, b);
    }

    if ty.is_pointer() {
        let opcode = if op == CmpOp::Eq {
            Opcode::EqP
        } else {
            Opcode::NeP
        };
        return emit_form(opcode, 0, lhs, rhs, b);
    }

    let mut flags = 0;
    if approx && op.is_equality() {
        flags |= CMP_APPROX;
    }
    // A constant left operand swaps to the right, mirroring the operator.
    if lhs.is_constant() {
        return emit_form(cmp_opcode(op.swapped(), ty), flags, rhs, lhs, b);
    }
    emit_form(cmp_opcode(op, ty), flags, lhs, rhs, b)
}

/// Emits a two-operand compare, picking the RK form when the right operand
/// is a pool constant.
fn emit_form(
    opcode: Opcode,
    flags: u8,
    lhs: &Expr,
    rhs: &Expr,
    b: &mut FunctionBuilder<'_>,
) -> ValueSlot {
    let ls = lhs.emit(b);
    let ls = b.materialize(ls);
    let rs = rhs.emit(b);
    let out = b.acquire_temp(RegBank::Int, 1);
    if rs.constant {
        b.emit_f(opcode, flags | FORM_RK, out.reg, ls.reg, rs.reg);
    } else {
        b.emit_f(opcode, flags, out.reg, ls.reg, rs.reg);
        b.free_slot(&rs);
    }
    b.free_slot(&ls);
    out
}

/// Lowers `<>=` with a two-test ladder producing -1, 0 or 1.
pub(super) fn emit_three_way(lhs: &Expr, rhs: &Expr, b: &mut FunctionBuilder<'_>) -> ValueSlot {
    let ty = lhs.ty;
    let ls = lhs.emit(b);
    let ls = b.materialize(ls);
    let rs = rhs.emit(b);
    let rs = b.materialize(rs);
    let out = b.acquire_temp(RegBank::Int, 1);

    b.emit(cmp_opcode(CmpOp::Lt, ty), out.reg, ls.reg, rs.reg);
    b.emit_test(out.reg, 0);
    let not_less = b.emit_jump();
    b.emit_load_imm(out.reg, -1);
    let done = b.emit_jump();
    b.patch_jump_here(not_less);
    b.emit(cmp_opcode(CmpOp::Gt, ty), out.reg, ls.reg, rs.reg);
    b.patch_jump_here(done);

    b.free_slot(&ls);
    b.free_slot(&rs);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsigned_operands_select_unsigned_compares() {
        assert_eq!(cmp_opcode(CmpOp::Lt, Type::UInt), Opcode::LtU);
        assert_eq!(cmp_opcode(CmpOp::Eq, Type::UInt), Opcode::EqI);
        assert_eq!(cmp_opcode(CmpOp::Ge, Type::Float), Opcode::GeF);
    }
}
