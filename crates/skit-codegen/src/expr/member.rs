//! Member access: object fields, embedded structs, vector components, and
//! the storage-node emitters shared with assignment.

use skit_common::span::Span;
use skit_common::symbol::Symbol;
use skit_vm::Opcode;

use crate::builder::{BoundLocal, FunctionBuilder};
use crate::context::{Aborted, CompileContext, LocalId};
use crate::slot::ValueSlot;
use crate::symtab::{ClassId, FieldDef};
use crate::types::Type;

use super::{Expr, ExprKind};

pub(super) fn resolve_member(
    base: Expr,
    field: Symbol,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    let base = base.resolve(ctx)?;

    match base.ty {
        Type::Vec2 | Type::Vec3 => resolve_component(base, field, span, ctx),
        Type::Ptr { class, .. } => {
            let Some((owner, def)) = find_field(ctx, class, field) else {
                return Err(unknown_member(ctx, &base, field, span));
            };
            check_access(ctx, owner, &def, span)?;
            Ok(Expr::done(
                ExprKind::Member {
                    base: Box::new(base),
                    field,
                    offset: def.offset,
                    read_only: def.read_only,
                    field_ty: def.ty,
                },
                def.ty,
                span,
            ))
        }
        Type::Struct(id) => {
            // Embedded structs have no identity of their own: collapse the
            // chain into one access relative to the object pointer.
            let def = {
                let sd = ctx.symtab.struct_def(id);
                sd.field_index.get(&field).map(|&i| sd.fields[i].clone())
            };
            let Some(def) = def else {
                return Err(unknown_member(ctx, &base, field, span));
            };
            let ExprKind::Member {
                base: inner,
                offset,
                read_only,
                ..
            } = base.kind
            else {
                return Err(ctx.error(span, "struct value is not part of an object"));
            };
            Ok(Expr::done(
                ExprKind::Member {
                    base: inner,
                    field,
                    offset: offset + def.offset,
                    read_only: read_only || def.read_only,
                    field_ty: def.ty,
                },
                def.ty,
                span,
            ))
        }
        Type::ClassRef(id) => {
            if let Some((ty, value)) = ctx.symtab.lookup_class_constant(id, field) {
                return Ok(Expr::constant(value.clone(), *ty, span));
            }
            Err(unknown_member(ctx, &base, field, span))
        }
        _ => {
            let name = ctx.type_name(base.ty);
            Err(ctx.error(span, format!("type {} has no members", name)))
        }
    }
}

fn resolve_component(
    base: Expr,
    field: Symbol,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    let index = match ctx.symbol_name(field) {
        "x" => 0,
        "y" => 1,
        "z" if base.ty == Type::Vec3 => 2,
        other => {
            let name = ctx.type_name(base.ty);
            let other = other.to_string();
            return Err(ctx.error(
                span,
                format!("{} has no component '{}'", name, other),
            ));
        }
    };
    Ok(Expr::done(
        ExprKind::VecElem {
            base: Box::new(base),
            index,
        },
        Type::Float,
        span,
    ))
}

/// Walks the inheritance chain for a field, reporting its declaring class.
fn find_field(
    ctx: &CompileContext<'_>,
    class: ClassId,
    name: Symbol,
) -> Option<(ClassId, FieldDef)> {
    let mut cur = Some(class);
    while let Some(id) = cur {
        let def = ctx.symtab.class(id);
        if let Some(&idx) = def.field_index.get(&name) {
            return Some((id, def.fields[idx].clone()));
        }
        cur = def.parent;
    }
    None
}

fn check_access(
    ctx: &mut CompileContext<'_>,
    owner: ClassId,
    def: &FieldDef,
    span: Span,
) -> Result<(), Aborted> {
    if def.private && ctx.class != Some(owner) {
        let field = ctx.symbol_name(def.name).to_string();
        let class = ctx.symbol_name(ctx.symtab.class(owner).name).to_string();
        return Err(ctx.error(
            span,
            format!("field '{}' of class {} is private", field, class),
        ));
    }
    if def.deprecated {
        let field = ctx.symbol_name(def.name).to_string();
        ctx.warn(span, format!("field '{}' is deprecated", field));
    }
    Ok(())
}

fn unknown_member(
    ctx: &mut CompileContext<'_>,
    base: &Expr,
    field: Symbol,
    span: Span,
) -> Aborted {
    let ty = ctx.type_name(base.ty);
    let field = ctx.symbol_name(field).to_string();
    ctx.error(span, format!("{} has no member named '{}'", ty, field))
}

// === emission ===

pub(super) fn emit_local(id: LocalId, b: &mut FunctionBuilder<'_>) -> ValueSlot {
    match b.local(id) {
        BoundLocal::Reg { bank, reg, count } => ValueSlot::fixed(bank, reg, count),
        BoundLocal::PoolRun { .. } => {
            unreachable!("static const arrays are only read through an index")
        }
    }
}

pub(super) fn emit_global(index: u32, ty: Type, b: &mut FunctionBuilder<'_>) -> ValueSlot {
    let bank = ty.bank().expect("register-typed global");
    let out = b.acquire_temp(bank, 1);
    b.emit_f(Opcode::LdG, bank as u8, out.reg, index as u16, 0);
    out
}

pub(super) fn emit_member(
    base: &Expr,
    offset: u32,
    ty: Type,
    b: &mut FunctionBuilder<'_>,
) -> ValueSlot {
    let bs = base.emit(b);
    let bs = b.materialize(bs);
    let (op, flags) = ty.load_op();
    let out = b.acquire_temp(ty.bank().expect("loadable field type"), ty.reg_count());
    b.emit_f(op, flags, out.reg, bs.reg, offset as u16);
    b.free_slot(&bs);
    out
}

/// A component of a register-resident vector aliases the base's register
/// run; only a temporary run needs the component copied out.
pub(super) fn emit_vec_elem(base: &Expr, index: u8, b: &mut FunctionBuilder<'_>) -> ValueSlot {
    let bs = base.emit(b);
    let component = bs.reg + index as u16;
    if bs.is_temp() {
        let out = b.acquire_temp(bs.bank, 1);
        b.emit(Opcode::MoveF, out.reg, component, 0);
        b.free_slot(&bs);
        return out;
    }
    ValueSlot::fixed(bs.bank, component, 1)
}
