//! Assignment forms: plain, compound, and multi-target.
//!
//! [`Place`] is the one spot that knows how to read and write every
//! addressable target kind, so plain assignment, compound assignment and
//! increment/decrement share the evaluate-the-target-once discipline.

use skit_common::span::Span;
use skit_vm::{CastKind, Opcode, RegBank, FORM_RK, MEM_OFS_REG};

use crate::builder::FunctionBuilder;
use crate::coerce::widen_numeric;
use crate::context::{Aborted, CompileContext};
use crate::slot::ValueSlot;
use crate::types::Type;

use super::{binary, call, conversion, indexing, BinOp, Expr, ExprKind};

/// An addressable storage location with its access sequence already
/// emitted (base pointers and index math evaluate exactly once).
pub(super) enum Place {
    /// Register-resident: a local or a vector component of one.
    Reg(ValueSlot),
    Global { index: u16, ty: Type },
    Mem { base: ValueSlot, offset: u16, ty: Type },
    MemIdx { base: ValueSlot, ofs: ValueSlot, ty: Type },
}

impl Place {
    pub(super) fn prepare(target: &Expr, b: &mut FunctionBuilder<'_>) -> Place {
        match &target.kind {
            ExprKind::Local { .. } | ExprKind::VecElem { .. } => Place::Reg(target.emit(b)),
            ExprKind::Global { index, .. } => Place::Global {
                index: *index as u16,
                ty: target.ty,
            },
            ExprKind::Member {
                base,
                offset,
                field_ty,
                ..
            } => {
                let base_slot = base.emit(b);
                let base_slot = b.materialize(base_slot);
                Place::Mem {
                    base: base_slot,
                    offset: *offset as u16,
                    ty: *field_ty,
                }
            }
            ExprKind::Index {
                base,
                index,
                elem,
                len,
                offset,
            } => {
                let base_slot = base.emit(b);
                let base_slot = b.materialize(base_slot);
                let ofs = indexing::emit_scaled_index(index, *elem, *len, *offset, b);
                Place::MemIdx {
                    base: base_slot,
                    ofs,
                    ty: *elem,
                }
            }
            _ => unreachable!("resolution only accepts addressable assignment targets"),
        }
    }

    /// Reads the current value. Register places return the register
    /// itself; memory places load into a fresh temporary.
    pub(super) fn load(&self, b: &mut FunctionBuilder<'_>) -> ValueSlot {
        match self {
            Place::Reg(slot) => *slot,
            Place::Global { index, ty } => {
                let bank = ty.bank().expect("global of register type");
                let out = b.acquire_temp(bank, 1);
                b.emit_f(Opcode::LdG, bank as u8, out.reg, *index, 0);
                out
            }
            Place::Mem { base, offset, ty } => {
                let (op, flags) = ty.load_op();
                let out = b.acquire_temp(ty.bank().expect("loadable type"), ty.reg_count());
                b.emit_f(op, flags, out.reg, base.reg, *offset);
                out
            }
            Place::MemIdx { base, ofs, ty } => {
                let (op, flags) = ty.load_op();
                let out = b.acquire_temp(ty.bank().expect("loadable type"), ty.reg_count());
                b.emit_f(op, flags | MEM_OFS_REG, out.reg, base.reg, ofs.reg);
                out
            }
        }
    }

    /// Writes a register-resident value into the place.
    pub(super) fn store(&self, value: &ValueSlot, b: &mut FunctionBuilder<'_>) {
        debug_assert!(!value.constant, "store operand must be materialized");
        match self {
            Place::Reg(slot) => b.move_into(value, slot.reg),
            Place::Global { index, ty } => {
                let bank = ty.bank().expect("global of register type");
                b.emit_f(Opcode::StG, bank as u8, value.reg, *index, 0);
            }
            Place::Mem { base, offset, ty } => {
                let (op, flags) = ty.store_op();
                b.emit_f(op, flags, value.reg, base.reg, *offset);
            }
            Place::MemIdx { base, ofs, ty } => {
                let (op, flags) = ty.store_op();
                b.emit_f(op, flags | MEM_OFS_REG, value.reg, base.reg, ofs.reg);
            }
        }
    }

    /// Frees the access-sequence registers.
    pub(super) fn release(self, b: &mut FunctionBuilder<'_>) {
        match self {
            Place::Reg(_) | Place::Global { .. } => {}
            Place::Mem { base, .. } => b.free_slot(&base),
            Place::MemIdx { base, ofs, .. } => {
                b.free_slot(&base);
                b.free_slot(&ofs);
            }
        }
    }
}

// === resolution ===

/// Checks that a resolved node is an assignable target.
fn check_target(target: &Expr, span: Span, ctx: &mut CompileContext<'_>) -> Result<(), Aborted> {
    match target.request_address() {
        Some(true) => Ok(()),
        Some(false) => Err(ctx.error(span, "cannot assign to a read-only value")),
        None => Err(ctx.error(span, "left side of assignment is not assignable")),
    }
}

pub(super) fn resolve_assign(
    target: Expr,
    value: Expr,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    let target = target.resolve(ctx);
    let value = value.resolve(ctx);
    let (target, value) = (target?, value?);
    check_target(&target, span, ctx)?;
    let value = conversion::coerce_to(value, target.ty, false, ctx)?;
    let ty = target.ty;
    Ok(Expr::done(
        ExprKind::Assign {
            target: Box::new(target),
            value: Box::new(value),
        },
        ty,
        span,
    ))
}

pub(super) fn resolve_compound(
    op: BinOp,
    target: Expr,
    value: Expr,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    let target = target.resolve(ctx);
    let value = value.resolve(ctx);
    let (target, value) = (target?, value?);
    check_target(&target, span, ctx)?;

    let value = if target.ty.is_vector() {
        if !matches!(op, BinOp::Add | BinOp::Sub) {
            return Err(ctx.error(
                span,
                format!("'{}=' is not defined for vectors", op.name()),
            ));
        }
        let value = value;
        let mixed = target.ty == Type::Vec3 && value.ty == Type::Vec2;
        if value.ty != target.ty && !mixed {
            let from = ctx.type_name(value.ty);
            let to = ctx.type_name(target.ty);
            return Err(ctx.error(span, format!("cannot combine {} with {}", from, to)));
        }
        value
    } else if target.ty == Type::Float {
        if op.int_only() {
            return Err(ctx.error(
                span,
                format!("'{}=' requires an integer target", op.name()),
            ));
        }
        conversion::coerce_to(value, Type::Float, false, ctx)?
    } else if target.ty.is_integer() {
        if op == BinOp::Pow {
            return Err(ctx.error(span, "'**=' requires a float target"));
        }
        conversion::coerce_to(value, widen_numeric(target.ty), false, ctx)?
    } else {
        let name = ctx.type_name(target.ty);
        return Err(ctx.error(
            span,
            format!("'{}=' cannot be applied to type {}", op.name(), name),
        ));
    };

    let ty = target.ty;
    Ok(Expr::done(
        ExprKind::CompoundAssign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        },
        ty,
        span,
    ))
}

pub(super) fn resolve_multi(
    targets: Vec<Expr>,
    call: Expr,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    let call = call.resolve(ctx)?;
    if !matches!(
        call.kind,
        ExprKind::VMCall { .. } | ExprKind::NativeCall { .. }
    ) {
        return Err(ctx.error(
            span,
            "the right side of a multi-assignment must be a function call",
        ));
    }
    let returns = call.return_proto();
    if returns.len() < targets.len() {
        return Err(ctx.error(
            span,
            format!(
                "call returns {} values but {} targets were given",
                returns.len(),
                targets.len()
            ),
        ));
    }

    let mut resolved = Vec::with_capacity(targets.len());
    let mut casts = Vec::with_capacity(targets.len());
    let mut failed = false;
    for (i, target) in targets.into_iter().enumerate() {
        let target = match target.resolve(ctx) {
            Ok(t) => t,
            Err(Aborted) => {
                failed = true;
                continue;
            }
        };
        if check_target(&target, target.span, ctx).is_err() {
            failed = true;
            continue;
        }
        match result_cast(returns[i], target.ty, ctx) {
            Ok(cast) => casts.push(cast),
            Err(()) => {
                let from = ctx.type_name(returns[i]);
                let to = ctx.type_name(target.ty);
                ctx.error(
                    target.span,
                    format!("cannot assign result {} of type {} to {}", i + 1, from, to),
                );
                failed = true;
            }
        }
        resolved.push(target);
    }
    if failed {
        return Err(Aborted);
    }

    Ok(Expr::done(
        ExprKind::MultiAssign {
            targets: resolved,
            call: Box::new(call),
            casts,
        },
        Type::Void,
        span,
    ))
}

/// The conversion a multi-assignment applies to one result, or `Err` when
/// the pair is incompatible.
fn result_cast(
    from: Type,
    to: Type,
    ctx: &CompileContext<'_>,
) -> Result<Option<CastKind>, ()> {
    if from == to {
        return Ok(None);
    }
    if from.is_integer() && to.is_integer() {
        return Ok(None);
    }
    if from.is_integer() && to == Type::Float {
        return Ok(Some(if from.is_unsigned() {
            CastKind::U2F
        } else {
            CastKind::I2F
        }));
    }
    if from == Type::Float && to.is_integer() {
        return Ok(Some(if to.is_unsigned() {
            CastKind::F2U
        } else {
            CastKind::F2I
        }));
    }
    if crate::coerce::pointer_assignable(ctx.symtab, from, to) {
        return Ok(None);
    }
    Err(())
}

// === emission ===

pub(super) fn emit_assign(
    target: &Expr,
    value: &Expr,
    b: &mut FunctionBuilder<'_>,
) -> ValueSlot {
    let place = Place::prepare(target, b);
    let vs = value.emit(b);
    match &place {
        Place::Reg(slot) => {
            let slot = *slot;
            b.move_into(&vs, slot.reg);
            b.free_slot(&vs);
            place.release(b);
            slot
        }
        _ => {
            let v = b.materialize(vs);
            place.store(&v, b);
            place.release(b);
            v
        }
    }
}

pub(super) fn emit_compound(
    op: BinOp,
    target: &Expr,
    value: &Expr,
    b: &mut FunctionBuilder<'_>,
) -> ValueSlot {
    let place = Place::prepare(target, b);
    let cur = place.load(b);

    if target.ty.is_vector() {
        // A 2-vector operand against a 3-vector target only touches x/y.
        let wide = target.ty == Type::Vec3 && value.ty != Type::Vec2;
        let opcode = match (op, wide) {
            (BinOp::Add, false) => Opcode::AddV2,
            (BinOp::Add, true) => Opcode::AddV3,
            (BinOp::Sub, false) => Opcode::SubV2,
            (BinOp::Sub, true) => Opcode::SubV3,
            _ => unreachable!("resolution restricts vector compound ops"),
        };
        let rhs = value.emit(b);
        let rhs = b.materialize(rhs);
        b.emit(opcode, cur.reg, cur.reg, rhs.reg);
        b.free_slot(&rhs);
        place.store(&cur, b);
        place.release(b);
        return cur;
    }

    let op_ty = if target.ty == Type::Float {
        Type::Float
    } else {
        widen_numeric(target.ty)
    };
    let opcode = binary::arith_opcode(op, op_ty);
    let rhs = value.emit(b);
    if rhs.constant {
        b.emit_f(opcode, FORM_RK, cur.reg, cur.reg, rhs.reg);
    } else {
        b.emit(opcode, cur.reg, cur.reg, rhs.reg);
        b.free_slot(&rhs);
    }
    place.store(&cur, b);
    place.release(b);
    cur
}

pub(super) fn emit_multi(
    targets: &[Expr],
    call: &Expr,
    casts: &[Option<CastKind>],
    b: &mut FunctionBuilder<'_>,
) -> ValueSlot {
    call::emit_call_instr(call, b);
    let returns = call.return_proto();

    // Fetch every consumed result before any target machinery runs.
    let mut results = Vec::with_capacity(targets.len());
    for (i, ty) in returns.iter().take(targets.len()).enumerate() {
        let bank = ty.bank().expect("register-typed result");
        let tmp = b.acquire_temp(bank, ty.reg_count());
        b.emit_f(Opcode::Result, bank as u8, i as u16, tmp.reg, ty.reg_count());
        results.push(tmp);
    }

    for ((target, cast), result) in targets.iter().zip(casts).zip(results) {
        let value = match cast {
            None => result,
            Some(kind) => {
                let dst_bank = match kind {
                    CastKind::I2F | CastKind::U2F => RegBank::Float,
                    _ => RegBank::Int,
                };
                let out = b.acquire_temp(dst_bank, 1);
                b.emit_f(Opcode::Cast, *kind as u8, out.reg, result.reg, 0);
                b.free_slot(&result);
                out
            }
        };
        let place = Place::prepare(target, b);
        place.store(&value, b);
        place.release(b);
        b.free_slot(&value);
    }
    ValueSlot::void()
}
