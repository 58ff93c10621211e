//! `return`, including tail-call promotion.

use skit_common::span::Span;
use skit_vm::{Opcode, RET_KONST};

use crate::builder::FunctionBuilder;
use crate::context::{Aborted, CompileContext};
use crate::expr::{conversion, CallTarget, Expr, ExprKind};
use crate::slot::ValueSlot;
use crate::types::Type;

pub(crate) fn resolve_return(
    values: Vec<Expr>,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    let mut resolved = Vec::with_capacity(values.len());
    let mut failed = false;
    for value in values {
        match value.resolve(ctx) {
            Ok(v) => resolved.push(v),
            Err(Aborted) => failed = true,
        }
    }
    if failed {
        return Err(Aborted);
    }

    // A single returned call may return several values at once.
    let value_types: Vec<Type> = if resolved.len() == 1 {
        resolved[0].return_proto()
    } else {
        resolved.iter().map(|v| v.ty).collect()
    };

    match ctx.return_types.clone() {
        Some(declared) => {
            if resolved.len() == 1
                && matches!(resolved[0].kind, ExprKind::VMCall { .. })
                && value_types == declared
            {
                // Checked below against the tail conditions.
            } else {
                if resolved.len() != declared.len() {
                    return Err(ctx.error(
                        span,
                        format!(
                            "return value count mismatch: expected {}, found {}",
                            declared.len(),
                            resolved.len()
                        ),
                    ));
                }
                let mut coerced = Vec::with_capacity(resolved.len());
                for (value, want) in resolved.into_iter().zip(&declared) {
                    coerced.push(conversion::coerce_to(value, *want, false, ctx)?);
                }
                resolved = coerced;
            }
        }
        None => ctx.unify_return(&value_types, span)?,
    }

    promote_tail(&mut resolved);
    Ok(Expr::done(ExprKind::Return(resolved), Type::Void, span))
}

/// A lone returned call whose results are the function's results becomes a
/// tail call: the callee returns directly to our caller. Out parameters
/// block the promotion since they write after the callee returns.
fn promote_tail(values: &mut [Expr]) {
    let [value] = values else { return };
    if let ExprKind::VMCall {
        target,
        by_ref,
        tail,
        ..
    } = &mut value.kind
    {
        let direct = matches!(target, CallTarget::Static(_) | CallTarget::Virtual { .. });
        if direct && !by_ref.iter().any(|&r| r) {
            *tail = true;
        }
    }
}

pub(crate) fn emit_return(values: &[Expr], b: &mut FunctionBuilder<'_>) -> ValueSlot {
    // A promoted tail call replaces the whole return sequence.
    if let [value] = values {
        if matches!(value.kind, ExprKind::VMCall { tail: true, .. }) {
            value.emit_discard(b);
            return ValueSlot::void();
        }
    }

    for (i, value) in values.iter().enumerate() {
        let s = value.emit(b);
        let mut flags = s.bank as u8;
        if s.constant {
            flags |= RET_KONST;
            b.emit_f(Opcode::Ret, flags, i as u16, s.reg, 1);
        } else {
            b.emit_f(Opcode::Ret, flags, i as u16, s.reg, s.count);
            b.free_slot(&s);
        }
    }
    b.emit(Opcode::RetNone, 0, 0, 0);
    ValueSlot::void()
}
