//! Constants, vector literals and the `rgb()` color literal.

use skit_common::span::Span;
use skit_vm::{AddrConst, AddrKind, Opcode, RegBank, FORM_RK};

use crate::builder::FunctionBuilder;
use crate::context::{Aborted, CompileContext};
use crate::slot::ValueSlot;
use crate::types::Type;
use crate::value::ConstVal;

use super::{conversion, Expr, ExprKind};

/// Lowers a constant into a pool reference, or a register run for vectors.
pub(super) fn emit_const(value: &ConstVal, ty: Type, b: &mut FunctionBuilder<'_>) -> ValueSlot {
    match value {
        ConstVal::Int(v) => ValueSlot::konst(RegBank::Int, b.const_int(*v)),
        ConstVal::Float(v) => ValueSlot::konst(RegBank::Float, b.const_float(*v)),
        ConstVal::Str(s) => ValueSlot::konst(RegBank::String, b.const_string(s)),
        ConstVal::Name(sym) => ValueSlot::konst(RegBank::String, b.const_name(*sym)),
        ConstVal::Class(id) => ValueSlot::konst(
            RegBank::Ptr,
            b.const_addr(AddrConst {
                kind: AddrKind::Class,
                id: id.0,
            }),
        ),
        ConstVal::Null => ValueSlot::konst(RegBank::Ptr, b.const_addr(AddrConst::NULL)),
        ConstVal::Vec2(v) => emit_vector_const(&v[..], b),
        ConstVal::Vec3(v) => {
            debug_assert_eq!(ty.reg_count(), 3);
            emit_vector_const(&v[..], b)
        }
    }
}

fn emit_vector_const(components: &[f64], b: &mut FunctionBuilder<'_>) -> ValueSlot {
    let out = b.acquire_temp(RegBank::Float, components.len() as u16);
    for (i, c) in components.iter().enumerate() {
        let k = b.const_float(*c);
        b.emit(Opcode::LoadKF, out.reg + i as u16, k, 0);
    }
    out
}

/// Resolves a vector literal. Scalar components coerce to float; the first
/// component may itself be a 2-vector when building a 3-vector.
pub(super) fn resolve_vector(
    parts: Vec<Expr>,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    let mut resolved = Vec::with_capacity(parts.len());
    let mut failed = false;
    for part in parts {
        match part.resolve(ctx) {
            Ok(p) => resolved.push(p),
            Err(Aborted) => failed = true,
        }
    }
    if failed {
        return Err(Aborted);
    }

    let mut total = 0u16;
    for (i, part) in resolved.iter().enumerate() {
        match part.ty {
            Type::Vec2 if i == 0 => total += 2,
            Type::Vec2 => {
                return Err(ctx.error(
                    part.span,
                    "a vector component may only lead a vector literal",
                ))
            }
            _ if part.ty.is_numeric() => total += 1,
            other => {
                let name = ctx.type_name(other);
                return Err(ctx.error(
                    part.span,
                    format!("vector components must be numeric, found {}", name),
                ));
            }
        }
    }
    if total != 2 && total != 3 {
        return Err(ctx.error(span, format!("a vector has 2 or 3 components, not {}", total)));
    }

    let mut parts = Vec::with_capacity(resolved.len());
    for part in resolved {
        if part.ty == Type::Vec2 {
            parts.push(part);
        } else {
            parts.push(conversion::coerce_to(part, Type::Float, false, ctx)?);
        }
    }
    let ty = if total == 2 { Type::Vec2 } else { Type::Vec3 };

    // All-constant literals fold.
    if parts.iter().all(|p| p.is_constant()) {
        let mut flat = Vec::with_capacity(3);
        for p in &parts {
            match p.const_val() {
                Some(ConstVal::Float(v)) => flat.push(*v),
                Some(ConstVal::Vec2(v)) => flat.extend_from_slice(v),
                _ => unreachable!("components coerced to float"),
            }
        }
        let value = if total == 2 {
            ConstVal::Vec2([flat[0], flat[1]])
        } else {
            ConstVal::Vec3([flat[0], flat[1], flat[2]])
        };
        return Ok(Expr::constant(value, ty, span));
    }

    Ok(Expr::done(ExprKind::VectorLit(parts), ty, span))
}

/// Assembles a vector literal into a contiguous float run.
pub(super) fn emit_vector(parts: &[Expr], ty: Type, b: &mut FunctionBuilder<'_>) -> ValueSlot {
    let out = b.acquire_temp(RegBank::Float, ty.reg_count());
    let mut cursor = 0u16;
    for part in parts {
        let slot = part.emit(b);
        b.move_into(&slot, out.reg + cursor);
        cursor += part.ty.reg_count();
        b.free_slot(&slot);
    }
    out
}

/// ORs runtime color components, clamped to 0..255 and shifted into place,
/// onto the constant base.
pub(super) fn emit_color(base: i32, parts: &[(u8, Expr)], b: &mut FunctionBuilder<'_>) -> ValueSlot {
    let out = b.acquire_temp(RegBank::Int, 1);
    b.emit_load_imm(out.reg, base);
    let k0 = b.const_int(0);
    let k255 = b.const_int(255);
    for (shift, part) in parts {
        let raw = part.emit(b);
        let comp = b.to_temp(raw);
        b.emit_f(Opcode::MaxI, FORM_RK, comp.reg, comp.reg, k0);
        b.emit_f(Opcode::MinI, FORM_RK, comp.reg, comp.reg, k255);
        if *shift > 0 {
            let kshift = b.const_int(*shift as i32);
            b.emit_f(Opcode::ShlI, FORM_RK, comp.reg, comp.reg, kshift);
        }
        b.emit(Opcode::OrI, out.reg, out.reg, comp.reg);
        b.free_slot(&comp);
    }
    out
}
