//! Vector-product emitters.

use skit_vm::{Opcode, RegBank};

use crate::builder::FunctionBuilder;
use crate::slot::ValueSlot;
use crate::types::Type;

use super::Expr;

pub(super) fn emit_length(operand: &Expr, b: &mut FunctionBuilder<'_>) -> ValueSlot {
    let s = operand.emit(b);
    let s = b.materialize(s);
    let op = if operand.ty == Type::Vec2 {
        Opcode::LenV2
    } else {
        Opcode::LenV3
    };
    let out = b.acquire_temp(RegBank::Float, 1);
    b.emit(op, out.reg, s.reg, 0);
    b.free_slot(&s);
    out
}

pub(super) fn emit_unit(operand: &Expr, b: &mut FunctionBuilder<'_>) -> ValueSlot {
    let s = operand.emit(b);
    let s = b.materialize(s);
    let op = if operand.ty == Type::Vec2 {
        Opcode::UnitV2
    } else {
        Opcode::UnitV3
    };
    let out = b.acquire_temp(RegBank::Float, operand.ty.reg_count());
    b.emit(op, out.reg, s.reg, 0);
    b.free_slot(&s);
    out
}

pub(super) fn emit_dot(lhs: &Expr, rhs: &Expr, b: &mut FunctionBuilder<'_>) -> ValueSlot {
    let ls = lhs.emit(b);
    let ls = b.materialize(ls);
    let rs = rhs.emit(b);
    let rs = b.materialize(rs);
    let op = if lhs.ty == Type::Vec2 {
        Opcode::DotV2
    } else {
        Opcode::DotV3
    };
    let out = b.acquire_temp(RegBank::Float, 1);
    b.emit(op, out.reg, ls.reg, rs.reg);
    b.free_slot(&ls);
    b.free_slot(&rs);
    out
}

pub(super) fn emit_cross(lhs: &Expr, rhs: &Expr, b: &mut FunctionBuilder<'_>) -> ValueSlot {
    let ls = lhs.emit(b);
    let ls = b.materialize(ls);
    let rs = rhs.emit(b);
    let rs = b.materialize(rs);
    let out = b.acquire_temp(RegBank::Float, 3);
    b.emit(Opcode::CrossV, out.reg, ls.reg, rs.reg);
    b.free_slot(&ls);
    b.free_slot(&rs);
    out
}
