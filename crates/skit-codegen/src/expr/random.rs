//! The random-number family.
//!
//! Every form routes through the host's random natives. A call may lead
//! with a `generator:` tag naming one of the deterministic per-purpose
//! generators; the tag lowers to a generator address constant passed as an
//! extra leading parameter. `randompick` draws an index and selects one of
//! its operands through a jump table.

use skit_common::span::Span;
use skit_vm::{NativeId, Opcode};

use crate::builder::FunctionBuilder;
use crate::context::{Aborted, CompileContext};
use crate::slot::ValueSlot;
use crate::types::Type;
use crate::value::ConstVal;

use super::{conversion, Arg, Expr, ExprKind};

pub(super) fn resolve_random(
    name: &str,
    args: Vec<Arg>,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    let (generator, args) = split_generator(args, ctx)?;

    match name {
        "random" => {
            let bounds = range_args(args, Type::Int, name, span, ctx)?
                .unwrap_or_else(|| default_byte_range(span));
            finish_native(ctx, "random", generator, bounds, Type::Int, span)
        }
        "frandom" => {
            let Some(bounds) = range_args(args, Type::Float, name, span, ctx)? else {
                return Err(ctx.error(span, "'frandom' expects 2 arguments"));
            };
            finish_native(ctx, "frandom", generator, bounds, Type::Float, span)
        }
        "random2" => {
            let mask = match args.len() {
                0 => vec![Expr::const_int(255, span)],
                1 => {
                    let arg = only_positional(args, name, ctx)?;
                    let arg = arg.resolve(ctx)?;
                    vec![conversion::coerce_to(arg, Type::Int, false, ctx)?]
                }
                n => {
                    return Err(ctx.error(
                        span,
                        format!("'random2' expects at most 1 argument, found {}", n),
                    ))
                }
            };
            finish_native(ctx, "random2", generator, mask, Type::Int, span)
        }
        "randompick" | "frandompick" => {
            let elem = if name == "frandompick" {
                Type::Float
            } else {
                Type::Int
            };
            if args.is_empty() {
                return Err(ctx.error(span, format!("'{}' needs at least one choice", name)));
            }
            let mut choices = Vec::with_capacity(args.len());
            let mut failed = false;
            for arg in args {
                if arg.name.is_some() {
                    return Err(ctx.error(
                        arg.value.span,
                        format!("'{}' does not take named arguments", name),
                    ));
                }
                match arg
                    .value
                    .resolve(ctx)
                    .and_then(|v| conversion::coerce_to(v, elem, false, ctx))
                {
                    Ok(v) => choices.push(v),
                    Err(Aborted) => failed = true,
                }
            }
            if failed {
                return Err(Aborted);
            }
            if choices.len() == 1 {
                return Ok(choices.into_iter().next().expect("one choice"));
            }
            let native = conversion::lookup_native(ctx, "random", span)?;
            Ok(Expr::done(
                ExprKind::RandomPick {
                    native,
                    generator,
                    choices,
                },
                elem,
                span,
            ))
        }
        _ => unreachable!("unhandled random form '{}'", name),
    }
}

/// Peels off a leading `generator:` tag, allocating the generator id.
fn split_generator(
    mut args: Vec<Arg>,
    ctx: &mut CompileContext<'_>,
) -> Result<(Option<u32>, Vec<Arg>), Aborted> {
    let tagged = args
        .first()
        .and_then(|a| a.name)
        .is_some_and(|n| ctx.symbol_name(n) == "generator");
    if !tagged {
        return Ok((None, args));
    }
    let arg = args.remove(0);
    let value = arg.value.resolve(ctx)?;
    let Some(ConstVal::Name(sym)) = value.const_val() else {
        return Err(ctx.error(value.span, "a generator tag must be a constant name"));
    };
    let id = ctx.natives.generator_id(*sym);
    Ok((Some(id), args))
}

fn only_positional(args: Vec<Arg>, name: &str, ctx: &mut CompileContext<'_>) -> Result<Expr, Aborted> {
    let arg = args.into_iter().next().expect("length checked");
    if arg.name.is_some() {
        return Err(ctx.error(
            arg.value.span,
            format!("'{}' does not take named arguments", name),
        ));
    }
    Ok(arg.value)
}

/// 0 arguments (`None`) or exactly 2 coerced bounds.
fn range_args(
    args: Vec<Arg>,
    ty: Type,
    name: &str,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Option<Vec<Expr>>, Aborted> {
    match args.len() {
        0 => Ok(None),
        2 => {
            let mut out = Vec::with_capacity(2);
            for arg in args {
                if arg.name.is_some() {
                    return Err(ctx.error(
                        arg.value.span,
                        format!("'{}' does not take named arguments", name),
                    ));
                }
                let v = arg.value.resolve(ctx)?;
                out.push(conversion::coerce_to(v, ty, false, ctx)?);
            }
            Ok(Some(out))
        }
        n => Err(ctx.error(
            span,
            format!("'{}' expects 0 or 2 arguments, found {}", name, n),
        )),
    }
}

fn default_byte_range(span: Span) -> Vec<Expr> {
    vec![Expr::const_int(0, span), Expr::const_int(255, span)]
}

fn finish_native(
    ctx: &mut CompileContext<'_>,
    native: &str,
    generator: Option<u32>,
    args: Vec<Expr>,
    ty: Type,
    span: Span,
) -> Result<Expr, Aborted> {
    let native = conversion::lookup_native(ctx, native, span)?;
    Ok(Expr::done(
        ExprKind::NativeCall {
            native,
            generator,
            args,
            returns: vec![ty],
        },
        ty,
        span,
    ))
}

// === emission ===

/// Draws an index in `0..n` and selects the matching choice through an
/// `IJump` table. Every choice lands its value in one shared register.
pub(super) fn emit_random_pick(
    native: NativeId,
    generator: Option<u32>,
    choices: &[Expr],
    ty: Type,
    b: &mut FunctionBuilder<'_>,
) -> ValueSlot {
    let n = choices.len();
    let lo = Expr::const_int(0, skit_common::span::Span::dummy());
    let hi = Expr::const_int(n as i32 - 1, skit_common::span::Span::dummy());
    let bounds = [lo, hi];
    let idx = super::call::emit_native_call(native, generator, &bounds, &[Type::Int], true, b);

    b.emit(Opcode::IJump, idx.reg, n as u16, 0);
    let table: Vec<usize> = (0..n).map(|_| b.emit_jump()).collect();

    let bank = ty.bank().expect("register-typed choice");
    let out = b.acquire_temp(bank, 1);
    let mut ends = Vec::with_capacity(n);
    for (slot, choice) in table.into_iter().zip(choices) {
        b.patch_jump_here(slot);
        let s = choice.emit(b);
        let s = b.materialize(s);
        b.move_into(&s, out.reg);
        b.free_slot(&s);
        ends.push(b.emit_jump());
    }
    for at in ends {
        b.patch_jump_here(at);
    }
    b.free_slot(&idx);
    out
}
