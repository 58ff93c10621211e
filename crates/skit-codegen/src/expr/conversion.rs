//! The cast catalog.
//!
//! `coerce_to` is the implicit-conversion entry used by assignments,
//! initializers, argument binding and operand promotion; `resolve_cast`
//! handles written casts, which unlock a few conversions implicit coercion
//! refuses (float truncation in the strict dialect, class downcasts).
//!
//! Retags that stay within one register bank (bool→int, int↔uint,
//! int→color) produce no node at all: the operand is retyped in place.

use skit_common::span::Span;
use skit_vm::{
    AddrConst, AddrKind, CastKind, NativeId, Opcode, RegBank, FORM_RK, PARAM_KONST,
};

use crate::builder::FunctionBuilder;
use crate::context::{Aborted, CompileContext, Dialect};
use crate::slot::ValueSlot;
use crate::symtab::ClassId;
use crate::types::Type;
use crate::value::ConstVal;

use super::{Expr, ExprKind};

/// Implicitly converts a resolved expression to `target`, inserting cast
/// nodes or folding constants. `explicit` relaxes the lossy-conversion
/// rules for written casts.
pub(crate) fn coerce_to(
    operand: Expr,
    target: Type,
    explicit: bool,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    debug_assert!(operand.resolved);
    if operand.ty == target {
        return Ok(operand);
    }
    let span = operand.span;
    match target {
        Type::Bool => make_bool(operand, true, ctx),
        t if t.is_integer() => make_int(operand, t, explicit, false, ctx),
        Type::Float => make_float(operand, ctx),
        Type::String => make_string(operand, ctx),
        Type::Name => make_name(operand, ctx),
        Type::Sound => make_sound(operand, ctx),
        Type::Color => make_color(operand, ctx),
        Type::Cue => make_cue(operand, ctx),
        Type::ClassRef(id) => make_class_ref(operand, id, ctx),
        Type::Ptr { .. } => make_ptr(operand, target, ctx),
        _ => {
            let from = ctx.type_name(operand.ty);
            let to = ctx.type_name(target);
            Err(ctx.error(span, format!("cannot convert {} to {}", from, to)))
        }
    }
}

/// Resolves a written `(type)` cast.
pub(super) fn resolve_cast(
    operand: Expr,
    target: Type,
    explicit: bool,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    let operand = operand.resolve(ctx)?;
    let mut out = coerce_to(operand, target, explicit, ctx)?;
    out.span = span;
    Ok(out)
}

/// Converts a resolved expression to bool. With `need_value` false the
/// consumer is a branch and an int-bank source may stay unnormalized.
pub(crate) fn make_bool(
    operand: Expr,
    need_value: bool,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    let span = operand.span;
    if operand.ty == Type::Bool {
        return Ok(operand);
    }
    if let Some(v) = operand.const_val() {
        return Ok(Expr::const_bool(!v.is_zero(), span));
    }
    match operand.ty {
        t if t.is_numeric() || t.is_pointer() || matches!(t, Type::Sound | Type::Color | Type::Cue) => {
            Ok(Expr::done(
                ExprKind::BoolCast {
                    operand: Box::new(operand),
                    need_value,
                },
                Type::Bool,
                span,
            ))
        }
        other => {
            let name = ctx.type_name(other);
            Err(ctx.error(span, format!("cannot test {} as a condition", name)))
        }
    }
}

fn make_int(
    mut operand: Expr,
    target: Type,
    explicit: bool,
    no_warn: bool,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    let span = operand.span;
    match operand.ty {
        t if t.is_integer() || t == Type::Bool => {
            operand.ty = target;
            Ok(operand)
        }
        Type::Float => {
            if !explicit {
                ctx.lenient_error(span, "implicit conversion of float to int loses precision")?;
            }
            if let Some(v) = operand.const_val().and_then(|v| v.as_float()) {
                if v.fract() != 0.0 && !no_warn {
                    ctx.warn(span, "constant float value truncated to int");
                }
                let folded = if target.is_unsigned() {
                    v as u32 as i32
                } else {
                    v as i32
                };
                return Ok(Expr::constant(ConstVal::Int(folded), target, span));
            }
            if !no_warn {
                ctx.note(span, "float value truncated to int at runtime");
            }
            Ok(Expr::done(
                ExprKind::IntCast {
                    operand: Box::new(operand),
                    unsigned: target.is_unsigned(),
                    no_warn,
                },
                target,
                span,
            ))
        }
        Type::Name => {
            // Old scripts pass names where numbers are expected.
            if ctx.dialect == Dialect::Legacy {
                ctx.warn(span, "name used where an int is expected, substituting 0");
                Ok(Expr::constant(ConstVal::Int(0), target, span))
            } else {
                Err(ctx.error(span, "cannot convert a name to an int"))
            }
        }
        Type::Sound | Type::Color | Type::Cue if explicit => {
            operand.ty = target;
            Ok(operand)
        }
        other => {
            let name = ctx.type_name(other);
            Err(ctx.error(span, format!("cannot convert {} to an int", name)))
        }
    }
}

fn make_float(operand: Expr, ctx: &mut CompileContext<'_>) -> Result<Expr, Aborted> {
    let span = operand.span;
    match operand.ty {
        Type::Float => Ok(operand),
        t if t.is_integer() || t == Type::Bool => {
            if let Some(v) = operand.const_int_val() {
                let f = if t.is_unsigned() {
                    v as u32 as f64
                } else {
                    v as f64
                };
                return Ok(Expr::const_float(f, span));
            }
            Ok(Expr::done(
                ExprKind::FloatCast(Box::new(operand)),
                Type::Float,
                span,
            ))
        }
        other => {
            let name = ctx.type_name(other);
            Err(ctx.error(span, format!("cannot convert {} to a float", name)))
        }
    }
}

pub(crate) fn make_string(operand: Expr, ctx: &mut CompileContext<'_>) -> Result<Expr, Aborted> {
    let span = operand.span;
    match operand.ty {
        Type::String => Ok(operand),
        Type::Name => {
            if let Some(ConstVal::Name(sym)) = operand.const_val() {
                if let Some(text) = ctx.interner.resolve(*sym) {
                    let text = text.to_string();
                    return Ok(Expr::constant(ConstVal::Str(text), Type::String, span));
                }
            }
            Ok(string_cast_node(operand, span))
        }
        t if t.is_integer() => {
            if let Some(v) = operand.const_int_val() {
                let text = if t.is_unsigned() {
                    (v as u32).to_string()
                } else {
                    v.to_string()
                };
                return Ok(Expr::constant(ConstVal::Str(text), Type::String, span));
            }
            Ok(string_cast_node(operand, span))
        }
        Type::Float => {
            if let Some(v) = operand.const_val().and_then(|v| v.as_float()) {
                return Ok(Expr::constant(ConstVal::Str(format!("{}", v)), Type::String, span));
            }
            Ok(string_cast_node(operand, span))
        }
        Type::Sound | Type::Color => Ok(string_cast_node(operand, span)),
        other => {
            let name = ctx.type_name(other);
            Err(ctx.error(span, format!("cannot convert {} to a string", name)))
        }
    }
}

fn string_cast_node(operand: Expr, span: Span) -> Expr {
    Expr::done(ExprKind::StringCast(Box::new(operand)), Type::String, span)
}

fn make_name(operand: Expr, ctx: &mut CompileContext<'_>) -> Result<Expr, Aborted> {
    let span = operand.span;
    match operand.ty {
        Type::Name => Ok(operand),
        Type::String => {
            // Constant strings fold only when the text is already interned;
            // otherwise the runtime cast produces the same name.
            if let Some(ConstVal::Str(s)) = operand.const_val() {
                if let Some(sym) = ctx.interner.get(s) {
                    return Ok(Expr::constant(ConstVal::Name(sym), Type::Name, span));
                }
            }
            Ok(Expr::done(
                ExprKind::NameCast(Box::new(operand)),
                Type::Name,
                span,
            ))
        }
        other => {
            let name = ctx.type_name(other);
            Err(ctx.error(span, format!("cannot convert {} to a name", name)))
        }
    }
}

fn make_sound(mut operand: Expr, ctx: &mut CompileContext<'_>) -> Result<Expr, Aborted> {
    let span = operand.span;
    match operand.ty {
        Type::Sound => Ok(operand),
        t if t.is_integer() => {
            operand.ty = Type::Sound;
            Ok(operand)
        }
        Type::Name => {
            let as_string = make_string(operand, ctx)?;
            make_sound(as_string, ctx)
        }
        Type::String => Ok(Expr::done(
            ExprKind::SoundCast(Box::new(operand)),
            Type::Sound,
            span,
        )),
        other => {
            let name = ctx.type_name(other);
            Err(ctx.error(span, format!("cannot convert {} to a sound", name)))
        }
    }
}

fn make_color(mut operand: Expr, ctx: &mut CompileContext<'_>) -> Result<Expr, Aborted> {
    let span = operand.span;
    match operand.ty {
        Type::Color => Ok(operand),
        t if t.is_integer() => {
            operand.ty = Type::Color;
            Ok(operand)
        }
        Type::Name => {
            let as_string = make_string(operand, ctx)?;
            make_color(as_string, ctx)
        }
        Type::String => {
            if let Some(ConstVal::Str(s)) = operand.const_val() {
                return match parse_color(s) {
                    Some(packed) => Ok(Expr::constant(ConstVal::Int(packed), Type::Color, span)),
                    None => {
                        let text = s.clone();
                        Err(ctx.error(span, format!("'{}' is not a valid color", text)))
                    }
                };
            }
            Ok(Expr::done(
                ExprKind::ColorCast(Box::new(operand)),
                Type::Color,
                span,
            ))
        }
        other => {
            let name = ctx.type_name(other);
            Err(ctx.error(span, format!("cannot convert {} to a color", name)))
        }
    }
}

/// Parses a constant color string: empty is the "no color" value -1,
/// otherwise six or eight hex digits with an optional leading `#`.
fn parse_color(s: &str) -> Option<i32> {
    if s.is_empty() {
        return Some(-1);
    }
    let hex = s.strip_prefix('#').unwrap_or(s);
    if hex.len() != 6 && hex.len() != 8 {
        return None;
    }
    u32::from_str_radix(hex, 16).ok().map(|v| v as i32)
}

fn make_cue(operand: Expr, ctx: &mut CompileContext<'_>) -> Result<Expr, Aborted> {
    let span = operand.span;
    match operand.ty {
        Type::Cue => Ok(operand),
        Type::NullPtr => Ok(Expr::constant(ConstVal::Int(-1), Type::Cue, span)),
        Type::Name | Type::String => {
            let Some(class) = ctx.class else {
                return Err(ctx.error(span, "cue labels can only be used inside a class"));
            };
            let sym = match operand.const_val() {
                Some(ConstVal::Name(sym)) => Some(*sym),
                Some(ConstVal::Str(s)) => ctx.interner.get(s),
                _ => {
                    return Err(ctx.error(span, "a cue label must be a constant name"));
                }
            };
            let found = sym.and_then(|sym| ctx.symtab.lookup_cue(class, sym));
            match found {
                Some(index) => Ok(Expr::constant(ConstVal::Int(index as i32), Type::Cue, span)),
                None => {
                    let text = match operand.const_val() {
                        Some(ConstVal::Str(s)) => s.clone(),
                        Some(ConstVal::Name(sym)) => ctx.interner.display(*sym).to_string(),
                        _ => String::new(),
                    };
                    ctx.lenient_error(span, format!("unknown cue label '{}'", text))?;
                    Ok(Expr::constant(ConstVal::Int(-1), Type::Cue, span))
                }
            }
        }
        t if t.is_numeric() => {
            let Some(base) = ctx.cue_offset else {
                return Err(ctx.error(
                    span,
                    "a numeric cue offset is only meaningful inside a cue function",
                ));
            };
            let operand = make_int(operand, Type::Int, true, true, ctx)?;
            if let Some(v) = operand.const_int_val() {
                if v < 0 {
                    return Err(ctx.error(span, "cue offsets cannot be negative"));
                }
                return Ok(Expr::constant(
                    ConstVal::Int(base as i32 + v),
                    Type::Cue,
                    span,
                ));
            }
            Ok(Expr::done(
                ExprKind::CueOffset {
                    operand: Box::new(operand),
                    base,
                },
                Type::Cue,
                span,
            ))
        }
        other => {
            let name = ctx.type_name(other);
            Err(ctx.error(span, format!("cannot convert {} to a cue label", name)))
        }
    }
}

fn make_class_ref(
    mut operand: Expr,
    target: ClassId,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    let span = operand.span;
    let target_ty = Type::ClassRef(target);
    match operand.ty {
        Type::ClassRef(src) => {
            if let Some(ConstVal::Class(id)) = operand.const_val() {
                let id = *id;
                if ctx.symtab.descends_from(id, target) {
                    return Ok(Expr::constant(ConstVal::Class(id), target_ty, span));
                }
                let from = ctx.symbol_name(ctx.symtab.class(id).name).to_string();
                let to = ctx.symbol_name(ctx.symtab.class(target).name).to_string();
                ctx.lenient_error(
                    span,
                    format!("class {} does not inherit from {}", from, to),
                )?;
                return Ok(Expr::constant(ConstVal::Null, target_ty, span));
            }
            if ctx.symtab.descends_from(src, target) {
                // Cast toward an ancestor always holds.
                operand.ty = target_ty;
                return Ok(operand);
            }
            if ctx.symtab.descends_from(target, src) {
                // Narrowing needs the runtime check; null on failure.
                let native = lookup_native(ctx, "class_cast", span)?;
                return Ok(Expr::done(
                    ExprKind::ClassCheckCast {
                        operand: Box::new(operand),
                        native,
                        target,
                    },
                    target_ty,
                    span,
                ));
            }
            let from = ctx.type_name(operand.ty);
            let to = ctx.type_name(target_ty);
            Err(ctx.error(span, format!("cannot convert {} to {}", from, to)))
        }
        Type::NullPtr => Ok(Expr::constant(ConstVal::Null, target_ty, span)),
        Type::Name | Type::String => {
            let sym = match operand.const_val() {
                Some(ConstVal::Name(sym)) => Some(Some(*sym)),
                Some(ConstVal::Str(s)) => Some(ctx.interner.get(s)),
                _ => None,
            };
            if let Some(sym) = sym {
                let found = sym.and_then(|sym| ctx.symtab.lookup_class(sym));
                return match found {
                    Some(id) if ctx.symtab.descends_from(id, target) => {
                        Ok(Expr::constant(ConstVal::Class(id), target_ty, span))
                    }
                    _ => {
                        let text = match operand.const_val() {
                            Some(ConstVal::Str(s)) => s.clone(),
                            Some(ConstVal::Name(sym)) => ctx.interner.display(*sym).to_string(),
                            _ => String::new(),
                        };
                        ctx.lenient_error(span, format!("unknown class '{}'", text))?;
                        Ok(Expr::constant(ConstVal::Null, target_ty, span))
                    }
                };
            }
            // Runtime name: the lookup native resolves it, null if absent.
            let native = lookup_native(ctx, "class_by_name", span)?;
            let operand = make_string(operand, ctx)?;
            Ok(Expr::done(
                ExprKind::NativeCall {
                    native,
                    generator: None,
                    args: vec![
                        operand,
                        Expr::constant(ConstVal::Class(target), target_ty, span),
                    ],
                    returns: vec![target_ty],
                },
                target_ty,
                span,
            ))
        }
        other => {
            let name = ctx.type_name(other);
            let to = ctx.type_name(target_ty);
            Err(ctx.error(span, format!("cannot convert {} to {}", name, to)))
        }
    }
}

fn make_ptr(
    mut operand: Expr,
    target: Type,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    let span = operand.span;
    if operand.ty == Type::NullPtr {
        operand.ty = target;
        return Ok(operand);
    }
    if crate::coerce::pointer_assignable(ctx.symtab, operand.ty, target) {
        operand.ty = target;
        return Ok(operand);
    }
    let from = ctx.type_name(operand.ty);
    let to = ctx.type_name(target);
    Err(ctx.error(span, format!("cannot convert {} to {}", from, to)))
}

/// Looks up a required native routine by name.
pub(crate) fn lookup_native(
    ctx: &mut CompileContext<'_>,
    name: &str,
    span: Span,
) -> Result<NativeId, Aborted> {
    let id = ctx
        .interner
        .get(name)
        .and_then(|sym| ctx.natives.lookup(sym))
        .map(|def| def.id);
    match id {
        Some(id) => Ok(id),
        None => Err(ctx.error(
            span,
            format!("native routine '{}' is not registered", name),
        )),
    }
}

// === emission ===

pub(super) fn emit_bool_cast(
    operand: &Expr,
    need_value: bool,
    b: &mut FunctionBuilder<'_>,
) -> ValueSlot {
    let src = operand.emit(b);
    if src.bank == RegBank::Int && !need_value {
        // Branches test the raw value against zero themselves.
        return src;
    }
    let src = b.materialize(src);
    let out = b.acquire_temp(RegBank::Int, 1);
    b.emit_f(Opcode::CastB, src.bank as u8, out.reg, src.reg, 0);
    b.free_slot(&src);
    out
}

pub(super) fn emit_numeric_cast(
    operand: &Expr,
    target: Type,
    unsigned: bool,
    b: &mut FunctionBuilder<'_>,
) -> ValueSlot {
    let kind = if target == Type::Float {
        if operand.ty.is_unsigned() {
            CastKind::U2F
        } else {
            CastKind::I2F
        }
    } else if unsigned {
        CastKind::F2U
    } else {
        CastKind::F2I
    };
    let dst_bank = if target == Type::Float {
        RegBank::Float
    } else {
        RegBank::Int
    };
    emit_cast(operand, kind, dst_bank, b)
}

pub(super) fn emit_string_cast(operand: &Expr, b: &mut FunctionBuilder<'_>) -> ValueSlot {
    let kind = match operand.ty {
        Type::Name => CastKind::N2S,
        Type::Sound => CastKind::So2S,
        Type::Color => CastKind::Co2S,
        Type::Float => CastKind::F2S,
        t if t.is_unsigned() => CastKind::U2S,
        _ => CastKind::I2S,
    };
    emit_cast(operand, kind, RegBank::String, b)
}

pub(super) fn emit_name_cast(operand: &Expr, b: &mut FunctionBuilder<'_>) -> ValueSlot {
    emit_cast(operand, CastKind::S2N, RegBank::String, b)
}

pub(super) fn emit_retag_cast(
    operand: &Expr,
    kind: CastKind,
    b: &mut FunctionBuilder<'_>,
) -> ValueSlot {
    emit_cast(operand, kind, RegBank::Int, b)
}

fn emit_cast(
    operand: &Expr,
    kind: CastKind,
    dst_bank: RegBank,
    b: &mut FunctionBuilder<'_>,
) -> ValueSlot {
    let src = operand.emit(b);
    let src = b.materialize(src);
    let out = b.acquire_temp(dst_bank, 1);
    b.emit_f(Opcode::Cast, kind as u8, out.reg, src.reg, 0);
    b.free_slot(&src);
    out
}

pub(super) fn emit_cue_offset(
    operand: &Expr,
    base: u32,
    b: &mut FunctionBuilder<'_>,
) -> ValueSlot {
    let src = operand.emit(b);
    let out = b.to_temp(src);
    let k = b.const_int(base as i32);
    b.emit_f(Opcode::AddI, FORM_RK, out.reg, out.reg, k);
    out
}

pub(super) fn emit_class_check(
    operand: &Expr,
    native: NativeId,
    target: ClassId,
    b: &mut FunctionBuilder<'_>,
) -> ValueSlot {
    let src = operand.emit(b);
    let src = b.materialize(src);
    b.emit_f(Opcode::Param, RegBank::Ptr as u8, src.reg, 0, 1);
    let kcls = b.const_addr(AddrConst {
        kind: AddrKind::Class,
        id: target.0,
    });
    b.emit_f(Opcode::Param, RegBank::Ptr as u8 | PARAM_KONST, kcls, 0, 1);
    let kfn = b.const_addr(AddrConst {
        kind: AddrKind::Native,
        id: native.0,
    });
    b.emit(Opcode::CallK, kfn, 2, 1);
    b.free_slot(&src);
    let out = b.acquire_temp(RegBank::Ptr, 1);
    b.emit_f(Opcode::Result, RegBank::Ptr as u8, 0, out.reg, 1);
    out
}
