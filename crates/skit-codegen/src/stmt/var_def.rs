//! Local variable and static const array declarations.

use skit_common::span::Span;
use skit_common::symbol::Symbol;
use skit_vm::{Opcode, RegBank};

use crate::builder::FunctionBuilder;
use crate::context::{Aborted, CompileContext, LocalId, StaticArrayInfo};
use crate::expr::{conversion, Expr, ExprKind};
use crate::slot::ValueSlot;
use crate::types::Type;
use crate::value::ConstVal;

pub(crate) fn resolve_local_decl(
    name: Symbol,
    ty: Type,
    init: Option<Box<Expr>>,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    if ty.bank().is_none() {
        let tn = ctx.type_name(ty);
        return Err(ctx.error(span, format!("cannot declare a local of type {}", tn)));
    }

    // The initializer resolves before the name exists, so it cannot refer
    // to the variable it initializes.
    let init = match init {
        Some(e) => {
            let e = e.resolve(ctx)?;
            Some(conversion::coerce_to(e, ty, false, ctx)?)
        }
        None => None,
    };

    let id = ctx.declare_local(name, span, ty, false)?;
    Ok(Expr::done(
        ExprKind::LocalDecl {
            name,
            ty,
            init: init.map(Box::new),
            id: Some(id),
        },
        Type::Void,
        span,
    ))
}

pub(crate) fn resolve_static_array(
    name: Symbol,
    elem: Type,
    values: Vec<Expr>,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    if !matches!(elem.bank(), Some(RegBank::Int | RegBank::Float | RegBank::String)) {
        let tn = ctx.type_name(elem);
        return Err(ctx.error(
            span,
            format!("a static const array cannot hold elements of type {}", tn),
        ));
    }
    if values.is_empty() {
        return Err(ctx.error(span, "a static const array cannot be empty"));
    }

    let mut resolved = Vec::with_capacity(values.len());
    let mut consts = Vec::with_capacity(values.len());
    for value in values {
        let value = value.resolve(ctx)?;
        let value = conversion::coerce_to(value, elem, false, ctx)?;
        let Some(v) = value.const_val() else {
            return Err(ctx.error(value.span, "static const array elements must be constant"));
        };
        consts.push(v.clone());
        resolved.push(value);
    }

    let id = ctx.declare_local(name, span, elem, true)?;
    ctx.static_arrays.insert(
        id,
        StaticArrayInfo {
            elem,
            values: consts,
        },
    );
    Ok(Expr::done(
        ExprKind::StaticArrayDecl {
            name,
            elem,
            values: resolved,
            id: Some(id),
        },
        Type::Void,
        span,
    ))
}

// === emission ===

pub(crate) fn emit_local_decl(
    id: LocalId,
    ty: Type,
    init: Option<&Expr>,
    b: &mut FunctionBuilder<'_>,
) -> ValueSlot {
    let bank = ty.bank().expect("register-typed local");
    let count = ty.reg_count();

    match init {
        Some(value) => {
            let s = value.emit(b);
            // A freshly computed temporary becomes the variable without a
            // copy.
            if s.is_temp() && s.bank == bank && s.count == count {
                b.adopt_local(id, &s);
            } else {
                let reg = b.bind_local(id, bank, count);
                b.move_into(&s, reg);
                b.free_slot(&s);
            }
        }
        None => {
            let reg = b.bind_local(id, bank, count);
            match bank {
                RegBank::Int => b.emit_load_imm(reg, 0),
                RegBank::Float => {
                    let k = b.const_float(0.0);
                    for i in 0..count {
                        b.emit(Opcode::LoadKF, reg + i, k, 0);
                    }
                }
                RegBank::String => {
                    let k = b.const_string("");
                    b.emit(Opcode::LoadKS, reg, k, 0);
                }
                RegBank::Ptr => {
                    let k = b.const_addr(skit_vm::AddrConst::NULL);
                    b.emit(Opcode::LoadKP, reg, k, 0);
                }
            }
        }
    }
    ValueSlot::void()
}

pub(crate) fn emit_static_array(
    id: LocalId,
    elem: Type,
    values: &[Expr],
    b: &mut FunctionBuilder<'_>,
) -> ValueSlot {
    let bank = elem.bank().expect("poolable element type");
    let len = values.len() as u32;
    let consts = values.iter().map(|v| v.const_val().expect("constant element"));
    let base = match bank {
        RegBank::Int => b.pool_run_int(
            consts
                .map(|v| v.as_int().unwrap_or(0))
                .collect::<Vec<_>>(),
        ),
        RegBank::Float => b.pool_run_float(
            consts
                .map(|v| v.as_float().unwrap_or(0.0))
                .collect::<Vec<_>>(),
        ),
        RegBank::String => {
            let strings: Vec<String> = values
                .iter()
                .map(|v| match v.const_val() {
                    Some(ConstVal::Str(s)) => s.clone(),
                    Some(ConstVal::Name(sym)) => {
                        b.interner.resolve(*sym).unwrap_or("").to_string()
                    }
                    _ => String::new(),
                })
                .collect();
            b.pool_run_string(strings)
        }
        RegBank::Ptr => unreachable!("element kinds checked at resolution"),
    };
    b.bind_static_array(id, bank, base, len);
    ValueSlot::void()
}
