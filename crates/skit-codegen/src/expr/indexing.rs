//! Array subscripts: fixed-length object arrays and static const arrays.
//!
//! Constant indices fold to a direct field access (or the array element
//! itself for static const arrays); dynamic indices bound-check and scale
//! at runtime.

use skit_common::span::Span;
use skit_vm::{Opcode, RegBank, FORM_RK, MEM_OFS_REG};

use crate::builder::{BoundLocal, FunctionBuilder};
use crate::context::{Aborted, CompileContext, LocalId};
use crate::slot::ValueSlot;
use crate::types::Type;

use super::{conversion, Expr, ExprKind};

pub(super) fn resolve_index(
    base: Expr,
    index: Expr,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    let base = base.resolve(ctx);
    let index = index.resolve(ctx);
    let (base, index) = (base?, index?);
    let index = conversion::coerce_to(index, Type::Int, false, ctx)?;

    // Static const arrays live in the constant pools, not in objects.
    if let ExprKind::Local { id, .. } = base.kind {
        if let Some(info) = ctx.static_arrays.get(&id) {
            let elem = info.elem;
            let len = info.values.len() as u32;
            if let Some(i) = index.const_int_val() {
                if i < 0 || i as u32 >= len {
                    return Err(ctx.error(
                        span,
                        format!("index {} is out of bounds (length {})", i, len),
                    ));
                }
                let value = info.values[i as usize].clone();
                return Ok(Expr::constant(value, elem, span));
            }
            return Ok(Expr::done(
                ExprKind::StaticIndex {
                    id,
                    index: Box::new(index),
                },
                elem,
                span,
            ));
        }
    }

    let Type::Array(at_id) = base.ty else {
        let name = ctx.type_name(base.ty);
        return Err(ctx.error(span, format!("type {} cannot be indexed", name)));
    };
    let at = ctx.symtab.array_type(at_id);

    // Array-typed storage is always a field of some object.
    let ExprKind::Member {
        base: obj,
        offset,
        read_only,
        field,
        ..
    } = base.kind
    else {
        return Err(ctx.error(span, "array value is not part of an object"));
    };

    if let Some(i) = index.const_int_val() {
        if i < 0 || i as u32 >= at.len {
            return Err(ctx.error(
                span,
                format!("index {} is out of bounds (length {})", i, at.len),
            ));
        }
        return Ok(Expr::done(
            ExprKind::Member {
                base: obj,
                field,
                offset: offset + i as u32 * at.elem.byte_size(),
                read_only,
                field_ty: at.elem,
            },
            at.elem,
            span,
        ));
    }

    // The member collapses into its object pointer; the element offset is
    // computed at runtime.
    Ok(Expr::done(
        ExprKind::Index {
            base: obj,
            index: Box::new(index),
            elem: at.elem,
            len: at.len,
            offset,
        },
        at.elem,
        span,
    ))
}

// === emission ===

/// Bound-checks and scales a dynamic index into a byte offset, including
/// the array's offset within its object. Returns an owned int temporary.
pub(super) fn emit_scaled_index(
    index: &Expr,
    elem: Type,
    len: u32,
    offset: u32,
    b: &mut FunctionBuilder<'_>,
) -> ValueSlot {
    let is = index.emit(b);
    let is = b.materialize(is);
    let idx = b.to_temp(is);
    b.emit_bound_check(idx.reg, len);

    let scale = elem.byte_size();
    if scale > 1 {
        if scale.is_power_of_two() {
            let k = b.const_int(scale.trailing_zeros() as i32);
            b.emit_f(Opcode::ShlI, FORM_RK, idx.reg, idx.reg, k);
        } else {
            let k = b.const_int(scale as i32);
            b.emit_f(Opcode::MulI, FORM_RK, idx.reg, idx.reg, k);
        }
    }
    if offset > 0 {
        let k = b.const_int(offset as i32);
        b.emit_f(Opcode::AddI, FORM_RK, idx.reg, idx.reg, k);
    }
    idx
}

pub(super) fn emit_index(
    base: &Expr,
    index: &Expr,
    elem: Type,
    len: u32,
    offset: u32,
    b: &mut FunctionBuilder<'_>,
) -> ValueSlot {
    let bs = base.emit(b);
    let bs = b.materialize(bs);
    let ofs = emit_scaled_index(index, elem, len, offset, b);
    let (op, flags) = elem.load_op();
    let out = b.acquire_temp(elem.bank().expect("loadable element type"), elem.reg_count());
    b.emit_f(op, flags | MEM_OFS_REG, out.reg, bs.reg, ofs.reg);
    b.free_slot(&bs);
    b.free_slot(&ofs);
    out
}

pub(super) fn emit_static_index(
    id: LocalId,
    index: &Expr,
    ty: Type,
    b: &mut FunctionBuilder<'_>,
) -> ValueSlot {
    let BoundLocal::PoolRun { bank, base, len } = b.local(id) else {
        unreachable!("static const array bound to registers");
    };
    let is = index.emit(b);
    let is = b.materialize(is);
    let idx = b.to_temp(is);
    b.emit_bound_check(idx.reg, len);
    let op = match bank {
        RegBank::Int => Opcode::PoolI,
        RegBank::Float => Opcode::PoolF,
        RegBank::String => Opcode::PoolS,
        RegBank::Ptr => unreachable!("no pointer const arrays"),
    };
    let out = b.acquire_temp(ty.bank().expect("register element type"), 1);
    b.emit(op, out.reg, base, idx.reg);
    b.free_slot(&idx);
    out
}
