//! Call resolution and the VM calling convention.
//!
//! Every call lowers to a run of `Param` instructions followed by one call
//! instruction; results are fetched afterwards with `Result`. Methods take
//! implicit leading pointer parameters: one for plain methods, three for
//! cue functions (receiver, invoker, cue info). When a cue calls another
//! cue method on itself, the caller's own acting context forwards without
//! copies.

use skit_common::span::Span;
use skit_common::symbol::Symbol;
use skit_vm::{
    AddrConst, AddrKind, NativeId, Opcode, RegBank, PARAM_ADDR, PARAM_KONST,
};

use crate::builder::FunctionBuilder;
use crate::context::{Aborted, CompileContext};
use crate::slot::ValueSlot;
use crate::symtab::{MethodDef, ParamDef};
use crate::types::Type;

use super::{builtin, conversion, random, Arg, CallTarget, Expr, ExprKind};

pub(super) fn resolve_fun_call(
    name: Symbol,
    args: Vec<Arg>,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    let text = ctx.symbol_name(name).to_string();
    match text.as_str() {
        "abs" | "min" | "max" | "clamp" | "atan2" | "sqrt" | "exp" | "log" | "log10"
        | "ceil" | "floor" | "round" | "sin" | "cos" | "tan" | "asin" | "acos" | "atan"
        | "rgb" | "dot" | "cross" => {
            return builtin::resolve_builtin(&text, args, span, ctx);
        }
        "random" | "frandom" | "random2" | "randompick" | "frandompick" => {
            return random::resolve_random(&text, args, span, ctx);
        }
        _ => {}
    }

    // A method of the enclosing class, called without a receiver.
    if let Some(class) = ctx.class {
        if let Some(method) = ctx.symtab.lookup_method(class, name) {
            let method = method.clone();
            let receiver = if method.is_static {
                None
            } else {
                Some(super::identifier::resolve_self(span, ctx)?)
            };
            return build_method_call(method, receiver, true, args, span, ctx);
        }
    }

    if let Some(def) = ctx.natives.lookup(name) {
        let def = def.clone();
        let (args, _) = bind_args(&def.params, args, &text, span, ctx)?;
        let ty = def.returns.first().copied().unwrap_or(Type::Void);
        return Ok(Expr::done(
            ExprKind::NativeCall {
                native: def.id,
                generator: None,
                args,
                returns: def.returns,
            },
            ty,
            span,
        ));
    }

    Err(ctx.error(span, format!("call to unknown function '{}'", text)))
}

pub(super) fn resolve_method_call(
    receiver: Expr,
    name: Symbol,
    args: Vec<Arg>,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    let receiver = receiver.resolve(ctx)?;

    match receiver.ty {
        // Vectors carry two intrinsic niladic methods.
        Type::Vec2 | Type::Vec3 => {
            if !args.is_empty() {
                let text = ctx.symbol_name(name).to_string();
                return Err(ctx.error(span, format!("'{}' takes no arguments", text)));
            }
            let ty = receiver.ty;
            match ctx.symbol_name(name) {
                "length" => Ok(Expr::done(
                    ExprKind::VecLength(Box::new(receiver)),
                    Type::Float,
                    span,
                )),
                "unit" => Ok(Expr::done(ExprKind::VecUnit(Box::new(receiver)), ty, span)),
                _ => Err(unknown_method(ctx, ty, name, span)),
            }
        }
        Type::Ptr { class, .. } => {
            let Some(method) = ctx.symtab.lookup_method(class, name) else {
                return Err(unknown_method(ctx, receiver.ty, name, span));
            };
            let method = method.clone();
            if method.is_static {
                let text = ctx.symbol_name(name).to_string();
                return Err(ctx.error(
                    span,
                    format!("'{}' is static; call it through the class name", text),
                ));
            }
            let is_self = matches!(receiver.kind, ExprKind::SelfPtr);
            build_method_call(method, Some(receiver), is_self, args, span, ctx)
        }
        Type::ClassRef(class) => {
            let Some(method) = ctx.symtab.lookup_method(class, name) else {
                return Err(unknown_method(ctx, receiver.ty, name, span));
            };
            let method = method.clone();
            if !method.is_static {
                let text = ctx.symbol_name(name).to_string();
                return Err(ctx.error(
                    span,
                    format!("'{}' needs an object to be called on", text),
                ));
            }
            build_method_call(method, None, false, args, span, ctx)
        }
        _ => {
            let ty = ctx.type_name(receiver.ty);
            Err(ctx.error(span, format!("type {} has no methods", ty)))
        }
    }
}

fn unknown_method(
    ctx: &mut CompileContext<'_>,
    ty: Type,
    name: Symbol,
    span: Span,
) -> Aborted {
    let ty = ctx.type_name(ty);
    let name = ctx.symbol_name(name).to_string();
    ctx.error(span, format!("{} has no method named '{}'", ty, name))
}

fn build_method_call(
    method: MethodDef,
    receiver: Option<Expr>,
    receiver_is_self: bool,
    args: Vec<Arg>,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    let name = ctx.symbol_name(method.name).to_string();
    if method.private && ctx.class != Some(method.owner) {
        return Err(ctx.error(span, format!("method '{}' is private", name)));
    }
    if method.deprecated {
        ctx.warn(span, format!("method '{}' is deprecated", name));
    }

    let (args, by_ref) = bind_args(&method.params, args, &name, span, ctx)?;

    let target = match method.vtable_index {
        Some(index) if !method.is_final => CallTarget::Virtual { index },
        _ => CallTarget::Static(method.id),
    };
    let ty = method.returns.first().copied().unwrap_or(Type::Void);

    Ok(Expr::done(
        ExprKind::VMCall {
            target,
            receiver: receiver.map(Box::new),
            implicits: method.implicit_count(),
            receiver_is_self,
            args,
            by_ref,
            returns: method.returns,
            tail: false,
        },
        ty,
        span,
    ))
}

/// Matches call arguments against a parameter list: positional first, then
/// named, then declared defaults. Out parameters must be plain variables.
pub(super) fn bind_args(
    params: &[ParamDef],
    args: Vec<Arg>,
    callee: &str,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<(Vec<Expr>, Vec<bool>), Aborted> {
    let mut slots: Vec<Option<Expr>> = Vec::with_capacity(params.len());
    slots.resize_with(params.len(), || None);

    let mut seen_named = false;
    for (pos, arg) in args.into_iter().enumerate() {
        let idx = match arg.name {
            None => {
                if seen_named {
                    return Err(ctx.error(
                        arg.value.span,
                        "positional arguments cannot follow named arguments",
                    ));
                }
                pos
            }
            Some(name) => {
                seen_named = true;
                match params.iter().position(|p| p.name == name) {
                    Some(i) => i,
                    None => {
                        let text = ctx.symbol_name(name).to_string();
                        return Err(ctx.error(
                            arg.value.span,
                            format!("'{}' has no parameter named '{}'", callee, text),
                        ));
                    }
                }
            }
        };
        if idx >= params.len() {
            return Err(ctx.error(
                arg.value.span,
                format!("too many arguments to '{}'", callee),
            ));
        }
        if slots[idx].is_some() {
            let text = ctx.symbol_name(params[idx].name).to_string();
            return Err(ctx.error(
                arg.value.span,
                format!("argument '{}' was given twice", text),
            ));
        }
        slots[idx] = Some(arg.value);
    }

    let mut bound = Vec::with_capacity(params.len());
    let mut by_ref = Vec::with_capacity(params.len());
    for (param, slot) in params.iter().zip(slots) {
        let value = match slot {
            Some(value) => {
                let value = value.resolve(ctx)?;
                if param.by_ref {
                    check_out_arg(&value, param, ctx)?;
                    value
                } else {
                    conversion::coerce_to(value, param.ty, false, ctx)?
                }
            }
            None => match &param.default {
                Some(v) => Expr::constant(v.clone(), param.ty, span),
                None => {
                    let text = ctx.symbol_name(param.name).to_string();
                    return Err(ctx.error(
                        span,
                        format!("missing argument '{}' in call to '{}'", text, callee),
                    ));
                }
            },
        };
        bound.push(value);
        by_ref.push(param.by_ref);
    }
    Ok((bound, by_ref))
}

/// An out parameter receives the address of a register, so the argument
/// must be a writable local of exactly the declared type.
fn check_out_arg(
    value: &Expr,
    param: &ParamDef,
    ctx: &mut CompileContext<'_>,
) -> Result<(), Aborted> {
    let is_reg = matches!(value.kind, ExprKind::Local { .. } | ExprKind::VecElem { .. });
    if !is_reg || value.request_address() != Some(true) {
        return Err(ctx.error(
            value.span,
            "an out argument must be a writable local variable",
        ));
    }
    if value.ty != param.ty {
        let have = ctx.type_name(value.ty);
        let want = ctx.type_name(param.ty);
        return Err(ctx.error(
            value.span,
            format!("out argument type {} does not match {}", have, want),
        ));
    }
    Ok(())
}

// === emission ===

fn emit_param(slot: &ValueSlot, by_ref: bool, b: &mut FunctionBuilder<'_>) {
    let mut flags = slot.bank as u8;
    if by_ref {
        flags |= PARAM_ADDR;
    } else if slot.constant {
        flags |= PARAM_KONST;
    }
    let count = if slot.constant { 0 } else { slot.count };
    b.emit_f(Opcode::Param, flags, slot.reg, 0, count);
}

#[allow(clippy::too_many_arguments)]
pub(super) fn emit_vm_call(
    target: CallTarget,
    receiver: Option<&Expr>,
    implicits: u16,
    receiver_is_self: bool,
    args: &[Expr],
    by_ref: &[bool],
    returns: &[Type],
    tail: bool,
    want_result: bool,
    b: &mut FunctionBuilder<'_>,
) -> ValueSlot {
    let recv = receiver.map(|r| {
        let s = r.emit(b);
        b.materialize(s)
    });

    let mut param_count = 0u16;
    if implicits > 0 {
        let rs = recv.expect("instance call without a receiver");
        if implicits == 3 {
            if receiver_is_self && b.in_acting_context {
                // Forward the caller's own acting context untouched.
                for reg in 0..3 {
                    b.emit_f(Opcode::Param, RegBank::Ptr as u8, reg, 0, 1);
                }
            } else {
                // Calling into a cue method from outside a cue: the caller
                // becomes both receiver and invoker, with no cue info.
                emit_param(&rs, false, b);
                emit_param(&rs, false, b);
                let null = b.const_addr(AddrConst::NULL);
                b.emit_f(
                    Opcode::Param,
                    RegBank::Ptr as u8 | PARAM_KONST,
                    null,
                    0,
                    0,
                );
            }
            param_count += 3;
        } else {
            emit_param(&rs, false, b);
            param_count += 1;
        }
    }

    let mut slots = Vec::with_capacity(args.len());
    for (arg, &is_ref) in args.iter().zip(by_ref) {
        let s = arg.emit(b);
        emit_param(&s, is_ref, b);
        param_count += 1;
        slots.push(s);
    }

    let ret_count = returns.len() as u16;
    match target {
        CallTarget::Static(fid) => {
            let k = b.const_addr(AddrConst {
                kind: AddrKind::Function,
                id: fid.0,
            });
            if tail {
                b.emit(Opcode::TailCallK, k, param_count, 0);
            } else {
                b.emit(Opcode::CallK, k, param_count, ret_count);
            }
        }
        CallTarget::Virtual { index } => {
            let rs = recv.expect("virtual call without a receiver");
            let vt = b.acquire_temp(RegBank::Ptr, 1);
            b.emit(Opcode::Vtbl, vt.reg, rs.reg, index);
            if tail {
                b.emit(Opcode::TailCall, vt.reg, param_count, 0);
            } else {
                b.emit(Opcode::Call, vt.reg, param_count, ret_count);
            }
            b.free_slot(&vt);
        }
    }

    for s in &slots {
        b.free_slot(s);
    }
    if let Some(rs) = &recv {
        b.free_slot(rs);
    }

    if tail || !want_result || returns.is_empty() {
        return ValueSlot::void();
    }
    fetch_result(returns[0], b)
}

pub(super) fn emit_native_call(
    native: NativeId,
    generator: Option<u32>,
    args: &[Expr],
    returns: &[Type],
    want_result: bool,
    b: &mut FunctionBuilder<'_>,
) -> ValueSlot {
    let mut param_count = 0u16;
    if let Some(gen) = generator {
        let k = b.const_addr(AddrConst {
            kind: AddrKind::Generator,
            id: gen,
        });
        b.emit_f(Opcode::Param, RegBank::Ptr as u8 | PARAM_KONST, k, 0, 0);
        param_count += 1;
    }

    let mut slots = Vec::with_capacity(args.len());
    for arg in args {
        let s = arg.emit(b);
        emit_param(&s, false, b);
        param_count += 1;
        slots.push(s);
    }

    let k = b.const_addr(AddrConst {
        kind: AddrKind::Native,
        id: native.0,
    });
    b.emit(Opcode::CallK, k, param_count, returns.len() as u16);

    for s in &slots {
        b.free_slot(s);
    }

    if !want_result || returns.is_empty() {
        return ValueSlot::void();
    }
    fetch_result(returns[0], b)
}

fn fetch_result(ty: Type, b: &mut FunctionBuilder<'_>) -> ValueSlot {
    let bank = ty.bank().expect("register-typed result");
    let out = b.acquire_temp(bank, ty.reg_count());
    b.emit_f(Opcode::Result, bank as u8, 0, out.reg, ty.reg_count());
    out
}

/// Emits a resolved call's parameters and call instruction, leaving every
/// result unfetched for the caller to pull with `Result`.
pub(super) fn emit_call_instr(call: &Expr, b: &mut FunctionBuilder<'_>) {
    match &call.kind {
        ExprKind::VMCall {
            target,
            receiver,
            implicits,
            receiver_is_self,
            args,
            by_ref,
            returns,
            tail,
        } => {
            emit_vm_call(
                *target,
                receiver.as_deref(),
                *implicits,
                *receiver_is_self,
                args,
                by_ref,
                returns,
                *tail,
                false,
                b,
            );
        }
        ExprKind::NativeCall {
            native,
            generator,
            args,
            returns,
        } => {
            emit_native_call(*native, *generator, args, returns, false, b);
        }
        _ => unreachable!("multi-assignment right side is always a call"),
    }
}
