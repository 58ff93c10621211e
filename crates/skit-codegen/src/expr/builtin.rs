//! Built-in math functions: abs, min/max/clamp, the float-op table, rgb
//! and the vector products.
//!
//! Trigonometric functions work in degrees, matching the interpreter's
//! `Flop` table, so constant folding converts at the fold site.

use skit_common::span::Span;
use skit_vm::{FlopFunc, Opcode, RegBank, FORM_RK};

use crate::builder::FunctionBuilder;
use crate::coerce::common_numeric;
use crate::context::{Aborted, CompileContext};
use crate::slot::ValueSlot;
use crate::types::Type;
use crate::value::ConstVal;

use super::{conversion, Arg, Expr, ExprKind};

pub(super) fn resolve_builtin(
    name: &str,
    args: Vec<Arg>,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    match name {
        "abs" => {
            let [operand] = positional::<1>(args, name, span, ctx)?;
            resolve_abs(operand, span, ctx)
        }
        "min" | "max" => {
            let operands = variadic(args, 2, name, span, ctx)?;
            resolve_min_max(name == "max", operands, span, ctx)
        }
        "clamp" => {
            let [value, lo, hi] = positional::<3>(args, name, span, ctx)?;
            let raised = resolve_min_max(true, vec![value, lo], span, ctx)?;
            resolve_min_max(false, vec![raised, hi], span, ctx)
        }
        "atan2" => {
            let [y, x] = positional::<2>(args, name, span, ctx)?;
            resolve_atan2(y, x, span, ctx)
        }
        "rgb" => resolve_rgb(args, span, ctx),
        "dot" => {
            let [lhs, rhs] = positional::<2>(args, name, span, ctx)?;
            resolve_dot(lhs, rhs, span, ctx)
        }
        "cross" => {
            let [lhs, rhs] = positional::<2>(args, name, span, ctx)?;
            resolve_cross(lhs, rhs, span, ctx)
        }
        _ => {
            let func = match name {
                "sqrt" => FlopFunc::Sqrt,
                "exp" => FlopFunc::Exp,
                "log" => FlopFunc::Log,
                "log10" => FlopFunc::Log10,
                "ceil" => FlopFunc::Ceil,
                "floor" => FlopFunc::Floor,
                "round" => FlopFunc::Round,
                "sin" => FlopFunc::Sin,
                "cos" => FlopFunc::Cos,
                "tan" => FlopFunc::Tan,
                "asin" => FlopFunc::ASin,
                "acos" => FlopFunc::ACos,
                "atan" => FlopFunc::ATan,
                _ => unreachable!("unhandled builtin '{}'", name),
            };
            let [operand] = positional::<1>(args, name, span, ctx)?;
            resolve_flop(func, operand, span, ctx)
        }
    }
}

fn positional<const N: usize>(
    args: Vec<Arg>,
    name: &str,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<[Expr; N], Aborted> {
    let values = variadic(args, N, name, span, ctx)?;
    if values.len() != N {
        return Err(ctx.error(
            span,
            format!("'{}' expects {} arguments, found {}", name, N, values.len()),
        ));
    }
    Ok(values.try_into().unwrap_or_else(|_| unreachable!()))
}

/// Resolves a builtin's arguments: unnamed, at least `min` of them.
fn variadic(
    args: Vec<Arg>,
    min: usize,
    name: &str,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Vec<Expr>, Aborted> {
    if args.len() < min {
        return Err(ctx.error(
            span,
            format!("'{}' expects at least {} arguments", name, min),
        ));
    }
    let mut out = Vec::with_capacity(args.len());
    let mut failed = false;
    for arg in args {
        if arg.name.is_some() {
            return Err(ctx.error(
                arg.value.span,
                format!("'{}' does not take named arguments", name),
            ));
        }
        match arg.value.resolve(ctx) {
            Ok(v) => out.push(v),
            Err(Aborted) => failed = true,
        }
    }
    if failed {
        return Err(Aborted);
    }
    Ok(out)
}

fn resolve_abs(operand: Expr, span: Span, ctx: &mut CompileContext<'_>) -> Result<Expr, Aborted> {
    if !operand.ty.is_numeric() {
        let name = ctx.type_name(operand.ty);
        return Err(ctx.error(span, format!("'abs' requires a number, found {}", name)));
    }
    match operand.const_val() {
        Some(ConstVal::Int(v)) => return Ok(Expr::const_int(v.wrapping_abs(), span)),
        Some(ConstVal::Float(v)) => return Ok(Expr::const_float(v.abs(), span)),
        _ => {}
    }
    let ty = crate::coerce::widen_numeric(operand.ty);
    Ok(Expr::done(ExprKind::Abs(Box::new(operand)), ty, span))
}

fn resolve_min_max(
    max: bool,
    operands: Vec<Expr>,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    let name = if max { "max" } else { "min" };
    let mut ty = Type::Int;
    let mut saw_unsigned = false;
    for op in &operands {
        if !op.ty.is_numeric() {
            let tn = ctx.type_name(op.ty);
            return Err(ctx.error(span, format!("'{}' requires numbers, found {}", name, tn)));
        }
        ty = common_numeric(ty, op.ty);
        saw_unsigned |= op.ty.is_unsigned();
    }
    if saw_unsigned && ty != Type::Float {
        ty = Type::UInt;
    }

    // Constants collapse into one bound; the rest compare at runtime.
    let mut seed: Option<ConstVal> = None;
    let mut rest = Vec::new();
    for op in operands {
        let op = conversion::coerce_to(op, ty, false, ctx)?;
        match op.const_val() {
            Some(v) => {
                seed = Some(match seed {
                    None => v.clone(),
                    Some(prev) => fold_bound(max, ty, &prev, v),
                });
            }
            None => rest.push(op),
        }
    }

    if rest.is_empty() {
        let v = seed.expect("at least two operands");
        return Ok(Expr::constant(v, ty, span));
    }
    if rest.len() == 1 && seed.is_none() {
        return Ok(rest.into_iter().next().expect("one operand"));
    }

    Ok(Expr::done(
        ExprKind::MinMax {
            max,
            seed,
            operands: rest,
        },
        ty,
        span,
    ))
}

fn fold_bound(max: bool, ty: Type, a: &ConstVal, b: &ConstVal) -> ConstVal {
    match ty {
        Type::Float => {
            let (x, y) = (a.as_float().unwrap_or(0.0), b.as_float().unwrap_or(0.0));
            ConstVal::Float(if max { x.max(y) } else { x.min(y) })
        }
        Type::UInt => {
            let (x, y) = (a.as_int().unwrap_or(0) as u32, b.as_int().unwrap_or(0) as u32);
            ConstVal::Int((if max { x.max(y) } else { x.min(y) }) as i32)
        }
        _ => {
            let (x, y) = (a.as_int().unwrap_or(0), b.as_int().unwrap_or(0));
            ConstVal::Int(if max { x.max(y) } else { x.min(y) })
        }
    }
}

fn resolve_atan2(y: Expr, x: Expr, span: Span, ctx: &mut CompileContext<'_>) -> Result<Expr, Aborted> {
    let y = conversion::coerce_to(y, Type::Float, false, ctx)?;
    let x = conversion::coerce_to(x, Type::Float, false, ctx)?;
    if let (Some(ConstVal::Float(yv)), Some(ConstVal::Float(xv))) = (y.const_val(), x.const_val())
    {
        return Ok(Expr::const_float(yv.atan2(*xv).to_degrees(), span));
    }
    Ok(Expr::done(
        ExprKind::Atan2 {
            y: Box::new(y),
            x: Box::new(x),
        },
        Type::Float,
        span,
    ))
}

fn resolve_flop(
    func: FlopFunc,
    operand: Expr,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    let operand = conversion::coerce_to(operand, Type::Float, false, ctx)?;
    if let Some(ConstVal::Float(v)) = operand.const_val() {
        let v = *v;
        let folded = match func {
            FlopFunc::Abs => v.abs(),
            FlopFunc::Sqrt => v.sqrt(),
            FlopFunc::Exp => v.exp(),
            FlopFunc::Log => v.ln(),
            FlopFunc::Log10 => v.log10(),
            FlopFunc::Ceil => v.ceil(),
            FlopFunc::Floor => v.floor(),
            FlopFunc::Round => v.round(),
            FlopFunc::Sin => v.to_radians().sin(),
            FlopFunc::Cos => v.to_radians().cos(),
            FlopFunc::Tan => v.to_radians().tan(),
            FlopFunc::ASin => v.asin().to_degrees(),
            FlopFunc::ACos => v.acos().to_degrees(),
            FlopFunc::ATan => v.atan().to_degrees(),
        };
        return Ok(Expr::const_float(folded, span));
    }
    Ok(Expr::done(
        ExprKind::Flop {
            func,
            operand: Box::new(operand),
        },
        Type::Float,
        span,
    ))
}

fn resolve_rgb(args: Vec<Arg>, span: Span, ctx: &mut CompileContext<'_>) -> Result<Expr, Aborted> {
    let parts = variadic(args, 3, "rgb", span, ctx)?;
    if parts.len() > 4 {
        return Err(ctx.error(span, "'rgb' expects 3 or 4 arguments"));
    }
    let has_alpha = parts.len() == 4;

    // Channel shifts, alpha first when present.
    let shifts: &[u8] = if has_alpha {
        &[24, 16, 8, 0]
    } else {
        &[16, 8, 0]
    };

    let mut base: i32 = if has_alpha { 0 } else { 255 << 24 };
    let mut runtime = Vec::new();
    for (part, &shift) in parts.into_iter().zip(shifts) {
        let part = conversion::coerce_to(part, Type::Int, false, ctx)?;
        match part.const_int_val() {
            Some(v) => base |= v.clamp(0, 255) << shift,
            None => runtime.push((shift, part)),
        }
    }

    if runtime.is_empty() {
        return Ok(Expr::constant(ConstVal::Int(base), Type::Color, span));
    }
    Ok(Expr::done(
        ExprKind::ColorLit {
            base,
            parts: runtime,
        },
        Type::Color,
        span,
    ))
}

fn resolve_dot(lhs: Expr, rhs: Expr, span: Span, ctx: &mut CompileContext<'_>) -> Result<Expr, Aborted> {
    if !lhs.ty.is_vector() || lhs.ty != rhs.ty {
        let a = ctx.type_name(lhs.ty);
        let b = ctx.type_name(rhs.ty);
        return Err(ctx.error(
            span,
            format!("'dot' requires two vectors of the same size, found {} and {}", a, b),
        ));
    }
    match (lhs.const_val(), rhs.const_val()) {
        (Some(ConstVal::Vec2(a)), Some(ConstVal::Vec2(b))) => {
            return Ok(Expr::const_float(a[0] * b[0] + a[1] * b[1], span));
        }
        (Some(ConstVal::Vec3(a)), Some(ConstVal::Vec3(b))) => {
            return Ok(Expr::const_float(
                a[0] * b[0] + a[1] * b[1] + a[2] * b[2],
                span,
            ));
        }
        _ => {}
    }
    Ok(Expr::done(
        ExprKind::Dot {
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        Type::Float,
        span,
    ))
}

fn resolve_cross(lhs: Expr, rhs: Expr, span: Span, ctx: &mut CompileContext<'_>) -> Result<Expr, Aborted> {
    if lhs.ty != Type::Vec3 || rhs.ty != Type::Vec3 {
        let a = ctx.type_name(lhs.ty);
        let b = ctx.type_name(rhs.ty);
        return Err(ctx.error(
            span,
            format!("'cross' requires two 3-vectors, found {} and {}", a, b),
        ));
    }
    if let (Some(ConstVal::Vec3(a)), Some(ConstVal::Vec3(b))) = (lhs.const_val(), rhs.const_val())
    {
        return Ok(Expr::constant(
            ConstVal::Vec3([
                a[1] * b[2] - a[2] * b[1],
                a[2] * b[0] - a[0] * b[2],
                a[0] * b[1] - a[1] * b[0],
            ]),
            Type::Vec3,
            span,
        ));
    }
    Ok(Expr::done(
        ExprKind::Cross {
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        Type::Vec3,
        span,
    ))
}

// === emission ===

pub(super) fn emit_flop(func: FlopFunc, operand: &Expr, b: &mut FunctionBuilder<'_>) -> ValueSlot {
    let src = operand.emit(b);
    let src = b.materialize(src);
    let out = b.to_temp(src);
    b.emit_f(Opcode::Flop, func as u8, out.reg, out.reg, 0);
    out
}

pub(super) fn emit_atan2(y: &Expr, x: &Expr, b: &mut FunctionBuilder<'_>) -> ValueSlot {
    let ys = y.emit(b);
    let ys = b.materialize(ys);
    let xs = x.emit(b);
    let xs = b.materialize(xs);
    let out = b.acquire_temp(RegBank::Float, 1);
    b.emit(Opcode::Atan2F, out.reg, ys.reg, xs.reg);
    b.free_slot(&ys);
    b.free_slot(&xs);
    out
}

pub(super) fn emit_min_max(
    max: bool,
    seed: Option<&ConstVal>,
    operands: &[Expr],
    ty: Type,
    b: &mut FunctionBuilder<'_>,
) -> ValueSlot {
    let opcode = match (ty, max) {
        (Type::Float, false) => Opcode::MinF,
        (Type::Float, true) => Opcode::MaxF,
        (Type::UInt, false) => Opcode::MinU,
        (Type::UInt, true) => Opcode::MaxU,
        (_, false) => Opcode::MinI,
        (_, true) => Opcode::MaxI,
    };
    let bank = ty.bank().expect("numeric operand");
    let out = b.acquire_temp(bank, 1);

    let first = operands[0].emit(b);
    let first = b.materialize(first);
    b.move_into(&first, out.reg);
    b.free_slot(&first);

    for op in &operands[1..] {
        let s = op.emit(b);
        if s.constant {
            b.emit_f(opcode, FORM_RK, out.reg, out.reg, s.reg);
        } else {
            b.emit(opcode, out.reg, out.reg, s.reg);
            b.free_slot(&s);
        }
    }
    if let Some(v) = seed {
        let k = match v {
            ConstVal::Float(f) => b.const_float(*f),
            other => b.const_int(other.as_int().unwrap_or(0)),
        };
        b.emit_f(opcode, FORM_RK, out.reg, out.reg, k);
    }
    out
}
