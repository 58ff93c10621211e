//! `switch` over integers and names.
//!
//! Lowers to a dispatch chain of test-and-skip instructions followed by
//! the case bodies in source order, so fallthrough costs nothing. A
//! constant selector collapses to the taken region at resolve time.

use skit_common::span::Span;
use skit_vm::Opcode;

use crate::builder::FunctionBuilder;
use crate::context::{Aborted, CompileContext};
use crate::expr::{Expr, ExprKind};
use crate::slot::ValueSlot;
use crate::types::Type;
use crate::value::ConstVal;

pub(crate) fn resolve_switch(
    value: Expr,
    content: Vec<Expr>,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    let value = value.resolve(ctx)?;
    let by_name = match value.ty {
        Type::Name => true,
        t if t.is_integer() || t == Type::Bool => false,
        t => {
            let name = ctx.type_name(t);
            return Err(ctx.error(
                span,
                format!("switch selector must be an integer or name, found {}", name),
            ));
        }
    };

    ctx.switch_depth += 1;
    let mut resolved = Vec::with_capacity(content.len());
    let mut failed = false;
    for stmt in content {
        match stmt.resolve(ctx) {
            Ok(s) => resolved.push(s),
            Err(Aborted) => failed = true,
        }
    }
    ctx.switch_depth -= 1;
    if failed {
        return Err(Aborted);
    }

    check_labels(&resolved, by_name, ctx)?;

    if value.is_constant() {
        match collapse(&value, resolved, span) {
            Ok(collapsed) => return Ok(collapsed),
            // A nested break still needs the switch frame; keep the
            // runtime form.
            Err(content) => resolved = content,
        }
    }

    Ok(Expr::done(
        ExprKind::Switch {
            value: Box::new(value),
            content: resolved,
        },
        Type::Void,
        span,
    ))
}

/// Validates label kinds against the selector and rejects duplicates.
fn check_labels(
    content: &[Expr],
    by_name: bool,
    ctx: &mut CompileContext<'_>,
) -> Result<(), Aborted> {
    let mut seen_ints = Vec::new();
    let mut seen_names = Vec::new();
    let mut seen_default = false;
    for stmt in content {
        let ExprKind::CaseLabel(label) = &stmt.kind else {
            continue;
        };
        let Some(label) = label else {
            if seen_default {
                return Err(ctx.error(stmt.span, "duplicate default label"));
            }
            seen_default = true;
            continue;
        };
        match label.const_val() {
            Some(ConstVal::Int(v)) if !by_name => {
                if seen_ints.contains(v) {
                    return Err(ctx.error(label.span, format!("duplicate case {}", v)));
                }
                seen_ints.push(*v);
            }
            Some(ConstVal::Name(sym)) if by_name => {
                if seen_names.contains(sym) {
                    let text = ctx.symbol_name(*sym).to_string();
                    return Err(ctx.error(label.span, format!("duplicate case '{}'", text)));
                }
                seen_names.push(*sym);
            }
            _ => {
                let name = ctx.type_name(label.ty);
                return Err(ctx.error(
                    label.span,
                    format!("case label type {} does not match the selector", name),
                ));
            }
        }
    }
    Ok(())
}

fn labels_match(label: &Expr, sel: &ConstVal) -> bool {
    match (label.const_val(), sel) {
        (Some(ConstVal::Int(a)), ConstVal::Int(b)) => a == b,
        (Some(ConstVal::Name(a)), ConstVal::Name(b)) => a == b,
        _ => false,
    }
}

/// Collapses a constant-selector switch to the statements of the taken
/// case, up to its closing break. Hands the content back when a nested
/// break inside the region still needs the switch frame.
fn collapse(value: &Expr, content: Vec<Expr>, span: Span) -> Result<Expr, Vec<Expr>> {
    let sel = value.const_val().expect("constant selector");
    let start = content
        .iter()
        .position(|s| match &s.kind {
            ExprKind::CaseLabel(Some(l)) => labels_match(l, sel),
            _ => false,
        })
        .or_else(|| {
            content
                .iter()
                .position(|s| matches!(s.kind, ExprKind::CaseLabel(None)))
        });
    let Some(start) = start else {
        return Ok(Expr::nop(span));
    };

    let hazard = content
        .iter()
        .skip(start + 1)
        .take_while(|s| !matches!(s.kind, ExprKind::Break))
        .any(contains_nested_break);
    if hazard {
        return Err(content);
    }

    let mut stmts = Vec::new();
    for stmt in content.into_iter().skip(start + 1) {
        match stmt.kind {
            ExprKind::Break => break,
            ExprKind::CaseLabel(_) => continue,
            _ => stmts.push(stmt),
        }
    }
    Ok(Expr::done(
        ExprKind::Block {
            stmts,
            locals: Vec::new(),
        },
        Type::Void,
        span,
    ))
}

/// True when a break inside this statement would have targeted the
/// enclosing switch. Loops and nested switches capture their own breaks.
fn contains_nested_break(stmt: &Expr) -> bool {
    match &stmt.kind {
        ExprKind::Break => true,
        ExprKind::Block { stmts, .. } => stmts.iter().any(contains_nested_break),
        ExprKind::If {
            then, otherwise, ..
        } => {
            then.as_deref().is_some_and(contains_nested_break)
                || otherwise.as_deref().is_some_and(contains_nested_break)
        }
        _ => false,
    }
}

pub(crate) fn resolve_case_label(
    value: Option<Box<Expr>>,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    if ctx.switch_depth == 0 {
        return Err(ctx.error(span, "'case' is only allowed inside a switch"));
    }
    let value = match value {
        None => None,
        Some(v) => {
            let v = v.resolve(ctx)?;
            if !v.is_constant() {
                return Err(ctx.error(v.span, "a case label must be a constant"));
            }
            Some(Box::new(v))
        }
    };
    Ok(Expr::done(ExprKind::CaseLabel(value), Type::Void, span))
}

// === emission ===

pub(crate) fn emit_switch(
    value: &Expr,
    content: &[Expr],
    b: &mut FunctionBuilder<'_>,
) -> ValueSlot {
    let vs = value.emit(b);
    let sel = b.materialize(vs);
    b.push_switch();

    // Dispatch chain: one test-and-skip per label, in source order.
    let mut pending: Vec<(usize, usize)> = Vec::new();
    let mut default_idx = None;
    for (i, stmt) in content.iter().enumerate() {
        let ExprKind::CaseLabel(label) = &stmt.kind else {
            continue;
        };
        let Some(label) = label else {
            default_idx = Some(i);
            continue;
        };
        match label.const_val() {
            Some(ConstVal::Int(v)) => b.emit_test(sel.reg, *v),
            Some(ConstVal::Name(sym)) => {
                let k = b.const_name(*sym);
                b.emit(Opcode::TestS, sel.reg, k, 0);
            }
            _ => unreachable!("label kinds checked at resolution"),
        }
        pending.push((i, b.emit_jump()));
    }
    let fallthrough = b.emit_jump();
    b.free_slot(&sel);

    for (i, stmt) in content.iter().enumerate() {
        if matches!(stmt.kind, ExprKind::CaseLabel(_)) {
            for &(_, at) in pending.iter().filter(|(idx, _)| *idx == i) {
                b.patch_jump_here(at);
            }
            if default_idx == Some(i) {
                b.patch_jump_here(fallthrough);
            }
            continue;
        }
        stmt.emit_discard(b);
    }
    if default_idx.is_none() {
        b.patch_jump_here(fallthrough);
    }
    b.pop_switch();
    ValueSlot::void()
}
