//! Bare identifier and `self` resolution.
//!
//! Lookup order: locals, then fields of the enclosing class through the
//! implicit `self`, then class constants, module constants, globals, class
//! names and host directives. The first hit wins.

use skit_common::span::Span;
use skit_common::symbol::Symbol;

use crate::context::{Aborted, CompileContext};
use crate::types::Type;
use crate::value::ConstVal;

use super::{member, Expr, ExprKind};

pub(super) fn resolve_self(span: Span, ctx: &mut CompileContext<'_>) -> Result<Expr, Aborted> {
    let class = match ctx.class {
        Some(id) => id,
        None => return Err(ctx.error(span, "'self' is only available inside a class")),
    };
    if ctx.is_static {
        return Err(ctx.error(span, "'self' is not available in a static function"));
    }
    if ctx.self_ambiguous {
        ctx.lenient_error(
            span,
            "'self' is used by a cue shared between classes and may not be of the declaring class",
        )?;
    }
    Ok(Expr::done(
        ExprKind::SelfPtr,
        Type::Ptr {
            class,
            readonly: false,
        },
        span,
    ))
}

pub(super) fn resolve_ident(
    name: Symbol,
    span: Span,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, Aborted> {
    if let Some(info) = ctx.lookup_local(name) {
        return Ok(Expr::done(
            ExprKind::Local {
                id: info.id,
                read_only: info.read_only,
            },
            info.ty,
            span,
        ));
    }

    let symtab = ctx.symtab;

    if let Some(class) = ctx.class {
        // Fields go through the implicit self pointer; member resolution
        // owns the privacy and deprecation rules.
        if symtab.lookup_field(class, name).is_some() {
            if ctx.is_static {
                let text = ctx.symbol_name(name).to_string();
                return Err(ctx.error(
                    span,
                    format!("cannot access field '{}' from a static function", text),
                ));
            }
            let base = resolve_self(span, ctx)?;
            return member::resolve_member(base, name, span, ctx);
        }
        if let Some((ty, value)) = symtab.lookup_class_constant(class, name) {
            return Ok(Expr::constant(value.clone(), *ty, span));
        }
    }

    if let Some((ty, value)) = symtab.constants.get(&name) {
        return Ok(Expr::constant(value.clone(), *ty, span));
    }

    if let Some(var) = symtab.globals.get(&name) {
        return Ok(Expr::done(
            ExprKind::Global {
                index: var.index,
                read_only: var.read_only,
            },
            var.ty,
            span,
        ));
    }

    if let Some(id) = symtab.lookup_class(name) {
        return Ok(Expr::constant(
            ConstVal::Class(id),
            Type::ClassRef(id),
            span,
        ));
    }

    if let Some(&value) = symtab.directives.get(&name) {
        return Ok(Expr::const_int(value, span));
    }

    let text = ctx.symbol_name(name).to_string();
    Err(ctx.error(span, format!("unknown identifier '{}'", text)))
}
