//! Expression and statement nodes.
//!
//! One tagged enum covers both: statements are void-typed expressions.
//! A node is built unresolved by the parser, consumed by [`Expr::resolve`]
//! which returns it (or a replacement, after folding and desugaring) with
//! the `resolved` flag set, and only then may [`Expr::emit`] lower it.
//!
//! Several kinds exist only after resolution (`VMCall`, `Flop`, `MinMax`,
//! ...): resolution builds them directly in resolved form, so hitting them
//! in the resolve dispatch is a defect.

pub mod assign;
pub mod binary;
pub mod builtin;
pub mod call;
pub mod comparison;
pub mod conversion;
pub mod identifier;
pub mod indexing;
pub mod literal;
pub mod logical;
pub mod member;
pub mod random;
pub mod unary;
pub mod vector;

use skit_common::span::Span;
use skit_common::symbol::Symbol;
use skit_vm::{CastKind, FlopFunc, NativeId, RegBank};

use crate::builder::FunctionBuilder;
use crate::context::{Aborted, CompileContext, LocalId};
use crate::slot::ValueSlot;
use crate::stmt;
use crate::symtab::ClassId;
use crate::types::Type;
use crate::value::ConstVal;

/// Arithmetic, bitwise and shift operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    /// Float exponentiation, `**`.
    Pow,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinOp {
    /// Commutative operators may swap a constant left operand to the right.
    #[inline]
    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            BinOp::Add | BinOp::Mul | BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor
        )
    }

    /// Operators defined only on integer kinds.
    #[inline]
    pub fn int_only(self) -> bool {
        matches!(
            self,
            BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::Shl | BinOp::Shr
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
        }
    }
}

/// Relational and equality operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    #[inline]
    pub fn is_equality(self) -> bool {
        matches!(self, CmpOp::Eq | CmpOp::Ne)
    }

    /// The operator with its operands exchanged.
    pub fn swapped(self) -> CmpOp {
        match self {
            CmpOp::Eq => CmpOp::Eq,
            CmpOp::Ne => CmpOp::Ne,
            CmpOp::Lt => CmpOp::Gt,
            CmpOp::Le => CmpOp::Ge,
            CmpOp::Gt => CmpOp::Lt,
            CmpOp::Ge => CmpOp::Le,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

/// One call argument, optionally named.
#[derive(Debug)]
pub struct Arg {
    pub name: Option<Symbol>,
    pub value: Expr,
}

impl Arg {
    pub fn positional(value: Expr) -> Self {
        Self { name: None, value }
    }

    pub fn named(name: Symbol, value: Expr) -> Self {
        Self {
            name: Some(name),
            value,
        }
    }
}

/// How a resolved call reaches its target.
#[derive(Debug, Clone, Copy)]
pub enum CallTarget {
    /// Direct call through a constant-pool function address.
    Static(skit_vm::FunctionId),
    /// Virtual dispatch: vtable lookup on the receiver, then indirect call.
    Virtual { index: u16 },
}

/// The node kinds. Variants past the `--- resolved-only ---` markers are
/// produced by resolution and never come from the parser.
#[derive(Debug)]
pub enum ExprKind {
    // === leaves ===
    Const(ConstVal),
    Null,
    SelfPtr,
    Ident(Symbol),
    Nop,

    // === parser-built composites ===
    /// 2 or 3 components; a 3-vector may be built from a 2-vector plus a
    /// scalar.
    VectorLit(Vec<Expr>),
    Member {
        base: Box<Expr>,
        field: Symbol,
        // filled by resolution
        offset: u32,
        read_only: bool,
        /// Declared storage type; keeps the load width when promotion
        /// retypes the node.
        field_ty: Type,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
        // filled by resolution
        elem: Type,
        len: u32,
        /// Byte offset of the array within the object `base` points at.
        offset: u32,
    },
    TypeCast {
        operand: Box<Expr>,
        target: Type,
        explicit: bool,
    },
    Neg(Box<Expr>),
    UnaryPlus(Box<Expr>),
    BitNot(Box<Expr>),
    BoolNot(Box<Expr>),
    IncDec {
        target: Box<Expr>,
        dec: bool,
        post: bool,
        need_value: bool,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Compare {
        op: CmpOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        /// `~==`: approximate float/vector equality.
        approx: bool,
    },
    /// `<>=`, three-way comparison yielding -1/0/1.
    ThreeWay {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Concat {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Logical {
        and: bool,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Cond {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    CompoundAssign {
        op: BinOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    /// `a, b = call(...)`.
    MultiAssign {
        targets: Vec<Expr>,
        call: Box<Expr>,
        /// Per-target conversion from the call's result type, resolved.
        casts: Vec<Option<CastKind>>,
    },
    /// Unresolved free-function / builtin call.
    FunCall {
        name: Symbol,
        args: Vec<Arg>,
    },
    /// Unresolved method call with explicit receiver.
    MethodCall {
        receiver: Box<Expr>,
        name: Symbol,
        args: Vec<Arg>,
    },

    // === statements ===
    Block {
        stmts: Vec<Expr>,
        /// Locals to release at scope exit; filled by resolution.
        locals: Vec<LocalId>,
    },
    If {
        cond: Box<Expr>,
        then: Option<Box<Expr>>,
        otherwise: Option<Box<Expr>>,
    },
    While {
        cond: Box<Expr>,
        body: Box<Expr>,
        do_while: bool,
    },
    For {
        init: Option<Box<Expr>>,
        cond: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
        body: Box<Expr>,
    },
    Switch {
        value: Box<Expr>,
        content: Vec<Expr>,
    },
    /// `None` is the default label.
    CaseLabel(Option<Box<Expr>>),
    Break,
    Continue,
    Return(Vec<Expr>),
    LocalDecl {
        name: Symbol,
        ty: Type,
        init: Option<Box<Expr>>,
        /// Assigned by resolution.
        id: Option<LocalId>,
    },
    StaticArrayDecl {
        name: Symbol,
        elem: Type,
        values: Vec<Expr>,
        id: Option<LocalId>,
    },

    // === resolved-only: casts ===
    BoolCast {
        operand: Box<Expr>,
        /// False when only a branch consumes the result; an int source
        /// then skips normalization.
        need_value: bool,
    },
    IntCast {
        operand: Box<Expr>,
        unsigned: bool,
        no_warn: bool,
    },
    FloatCast(Box<Expr>),
    StringCast(Box<Expr>),
    NameCast(Box<Expr>),
    ColorCast(Box<Expr>),
    SoundCast(Box<Expr>),
    /// Numeric cue offset against the enclosing cue's timeline position.
    CueOffset {
        operand: Box<Expr>,
        base: u32,
    },
    /// Runtime class-reference cast through the class-cast native.
    ClassCheckCast {
        operand: Box<Expr>,
        native: NativeId,
        target: ClassId,
    },

    // === resolved-only: storage ===
    Local {
        id: LocalId,
        read_only: bool,
    },
    Global {
        index: u32,
        read_only: bool,
    },
    /// One float component of a vector-valued operand.
    VecElem {
        base: Box<Expr>,
        index: u8,
    },
    /// Dynamic read of a static const array.
    StaticIndex {
        id: LocalId,
        index: Box<Expr>,
    },

    // === resolved-only: calls and builtins ===
    VMCall {
        target: CallTarget,
        /// `None` for static functions.
        receiver: Option<Box<Expr>>,
        /// Implicit pointer parameters the callee expects (0, 1 or 3).
        implicits: u16,
        /// True when the receiver is the current `self` and the acting
        /// context may be forwarded wholesale.
        receiver_is_self: bool,
        args: Vec<Expr>,
        by_ref: Vec<bool>,
        returns: Vec<Type>,
        tail: bool,
    },
    NativeCall {
        native: NativeId,
        /// Named RNG tag, passed as a leading generator address constant.
        generator: Option<u32>,
        args: Vec<Expr>,
        returns: Vec<Type>,
    },
    /// Jump-table select over N choices driven by the random native.
    RandomPick {
        native: NativeId,
        generator: Option<u32>,
        choices: Vec<Expr>,
    },
    Flop {
        func: FlopFunc,
        operand: Box<Expr>,
    },
    Atan2 {
        y: Box<Expr>,
        x: Box<Expr>,
    },
    MinMax {
        max: bool,
        /// Constant operands collapsed into one bound.
        seed: Option<ConstVal>,
        operands: Vec<Expr>,
    },
    Abs(Box<Expr>),
    VecLength(Box<Expr>),
    VecUnit(Box<Expr>),
    Dot {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Cross {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Packed color with runtime components: OR the shifted, clamped parts
    /// onto the constant base.
    ColorLit {
        base: i32,
        parts: Vec<(u8, Expr)>,
    },
}

/// A node of the expression/statement tree.
#[derive(Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
    pub span: Span,
    pub resolved: bool,
}

impl Expr {
    /// A fresh unresolved node, as the parser builds them.
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self {
            kind,
            ty: Type::Void,
            span,
            resolved: false,
        }
    }

    /// A node already in resolved form.
    pub(crate) fn done(kind: ExprKind, ty: Type, span: Span) -> Self {
        Self {
            kind,
            ty,
            span,
            resolved: true,
        }
    }

    /// A resolved constant.
    pub fn constant(value: ConstVal, ty: Type, span: Span) -> Self {
        Self::done(ExprKind::Const(value), ty, span)
    }

    pub fn const_int(value: i32, span: Span) -> Self {
        Self::constant(ConstVal::Int(value), Type::Int, span)
    }

    pub fn const_bool(value: bool, span: Span) -> Self {
        Self::constant(ConstVal::Int(value as i32), Type::Bool, span)
    }

    pub fn const_float(value: f64, span: Span) -> Self {
        Self::constant(ConstVal::Float(value), Type::Float, span)
    }

    pub fn nop(span: Span) -> Self {
        Self::done(ExprKind::Nop, Type::Void, span)
    }

    // Parser-style constructors for the composite kinds.

    pub fn ident(name: Symbol, span: Span) -> Self {
        Self::new(ExprKind::Ident(name), span)
    }

    pub fn member(base: Expr, field: Symbol, span: Span) -> Self {
        Self::new(
            ExprKind::Member {
                base: Box::new(base),
                field,
                offset: 0,
                read_only: false,
                field_ty: Type::Void,
            },
            span,
        )
    }

    pub fn index(base: Expr, index: Expr, span: Span) -> Self {
        Self::new(
            ExprKind::Index {
                base: Box::new(base),
                index: Box::new(index),
                elem: Type::Void,
                len: 0,
                offset: 0,
            },
            span,
        )
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr, span: Span) -> Self {
        Self::new(
            ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            span,
        )
    }

    pub fn compare(op: CmpOp, lhs: Expr, rhs: Expr, span: Span) -> Self {
        Self::new(
            ExprKind::Compare {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                approx: false,
            },
            span,
        )
    }

    pub fn assign(target: Expr, value: Expr, span: Span) -> Self {
        Self::new(
            ExprKind::Assign {
                target: Box::new(target),
                value: Box::new(value),
            },
            span,
        )
    }

    pub fn call(name: Symbol, args: Vec<Arg>, span: Span) -> Self {
        Self::new(ExprKind::FunCall { name, args }, span)
    }

    pub fn method(receiver: Expr, name: Symbol, args: Vec<Arg>, span: Span) -> Self {
        Self::new(
            ExprKind::MethodCall {
                receiver: Box::new(receiver),
                name,
                args,
            },
            span,
        )
    }

    pub fn cast(operand: Expr, target: Type, span: Span) -> Self {
        Self::new(
            ExprKind::TypeCast {
                operand: Box::new(operand),
                target,
                explicit: true,
            },
            span,
        )
    }

    pub fn block(stmts: Vec<Expr>, span: Span) -> Self {
        Self::new(
            ExprKind::Block {
                stmts,
                locals: Vec::new(),
            },
            span,
        )
    }

    pub fn local_decl(name: Symbol, ty: Type, init: Option<Expr>, span: Span) -> Self {
        Self::new(
            ExprKind::LocalDecl {
                name,
                ty,
                init: init.map(Box::new),
                id: None,
            },
            span,
        )
    }

    pub fn ret(values: Vec<Expr>, span: Span) -> Self {
        Self::new(ExprKind::Return(values), span)
    }

    #[inline]
    pub fn is_constant(&self) -> bool {
        matches!(self.kind, ExprKind::Const(_))
    }

    /// The folded constant, if this node is one.
    pub fn const_val(&self) -> Option<&ConstVal> {
        match &self.kind {
            ExprKind::Const(v) => Some(v),
            _ => None,
        }
    }

    /// The integer payload of a constant node.
    pub fn const_int_val(&self) -> Option<i32> {
        self.const_val().and_then(|v| v.as_int())
    }

    /// Constant truth value, when the node is a foldable condition.
    pub fn const_truth(&self) -> Option<bool> {
        self.const_val().map(|v| !v.is_zero())
    }

    /// True when evaluating this resolved expression can change program
    /// state. Reads and arithmetic do not count; calls, writes and random
    /// draws do. Unknown kinds count as effectful.
    pub(crate) fn has_side_effects(&self) -> bool {
        match &self.kind {
            ExprKind::Const(_)
            | ExprKind::Null
            | ExprKind::SelfPtr
            | ExprKind::Nop
            | ExprKind::Local { .. }
            | ExprKind::Global { .. } => false,
            ExprKind::Neg(e)
            | ExprKind::UnaryPlus(e)
            | ExprKind::BitNot(e)
            | ExprKind::BoolNot(e)
            | ExprKind::FloatCast(e)
            | ExprKind::StringCast(e)
            | ExprKind::NameCast(e)
            | ExprKind::ColorCast(e)
            | ExprKind::SoundCast(e)
            | ExprKind::Abs(e)
            | ExprKind::VecLength(e)
            | ExprKind::VecUnit(e)
            | ExprKind::BoolCast { operand: e, .. }
            | ExprKind::IntCast { operand: e, .. }
            | ExprKind::CueOffset { operand: e, .. }
            | ExprKind::Flop { operand: e, .. }
            | ExprKind::VecElem { base: e, .. }
            | ExprKind::Member { base: e, .. } => e.has_side_effects(),
            ExprKind::Binary { lhs, rhs, .. }
            | ExprKind::Compare { lhs, rhs, .. }
            | ExprKind::ThreeWay { lhs, rhs }
            | ExprKind::Concat { lhs, rhs }
            | ExprKind::Logical { lhs, rhs, .. }
            | ExprKind::Dot { lhs, rhs }
            | ExprKind::Cross { lhs, rhs }
            | ExprKind::Atan2 { y: lhs, x: rhs } => {
                lhs.has_side_effects() || rhs.has_side_effects()
            }
            ExprKind::Cond {
                cond,
                then,
                otherwise,
            } => {
                cond.has_side_effects()
                    || then.has_side_effects()
                    || otherwise.has_side_effects()
            }
            ExprKind::Index { base, index, .. } => {
                base.has_side_effects() || index.has_side_effects()
            }
            ExprKind::StaticIndex { index, .. } => index.has_side_effects(),
            ExprKind::VectorLit(parts) => parts.iter().any(Expr::has_side_effects),
            ExprKind::MinMax { operands, .. } => operands.iter().any(Expr::has_side_effects),
            ExprKind::ColorLit { parts, .. } => parts.iter().any(|(_, e)| e.has_side_effects()),
            _ => true,
        }
    }

    /// Semantic analysis. Consumes the node; returns it (or a replacement)
    /// in resolved form, or [`Aborted`] after reporting to the sink.
    pub fn resolve(self, ctx: &mut CompileContext<'_>) -> Result<Expr, Aborted> {
        if self.resolved {
            return Ok(self);
        }
        let span = self.span;
        match self.kind {
            ExprKind::Const(_) => {
                // Parser-built constants carry their type already.
                let mut e = self;
                e.resolved = true;
                Ok(e)
            }
            ExprKind::Null => Ok(Expr::constant(ConstVal::Null, Type::NullPtr, span)),
            ExprKind::SelfPtr => identifier::resolve_self(span, ctx),
            ExprKind::Ident(name) => identifier::resolve_ident(name, span, ctx),
            ExprKind::Nop => Ok(Expr::nop(span)),

            ExprKind::VectorLit(parts) => literal::resolve_vector(parts, span, ctx),
            ExprKind::Member { base, field, .. } => member::resolve_member(*base, field, span, ctx),
            ExprKind::Index { base, index, .. } => {
                indexing::resolve_index(*base, *index, span, ctx)
            }
            ExprKind::TypeCast {
                operand,
                target,
                explicit,
            } => conversion::resolve_cast(*operand, target, explicit, span, ctx),
            ExprKind::Neg(operand) => unary::resolve_neg(*operand, span, ctx),
            ExprKind::UnaryPlus(operand) => unary::resolve_plus(*operand, span, ctx),
            ExprKind::BitNot(operand) => unary::resolve_bitnot(*operand, span, ctx),
            ExprKind::BoolNot(operand) => unary::resolve_boolnot(*operand, span, ctx),
            ExprKind::IncDec {
                target,
                dec,
                post,
                need_value,
            } => unary::resolve_incdec(*target, dec, post, need_value, span, ctx),
            ExprKind::Binary { op, lhs, rhs } => binary::resolve_binary(op, *lhs, *rhs, span, ctx),
            ExprKind::Compare {
                op,
                lhs,
                rhs,
                approx,
            } => comparison::resolve_compare(op, *lhs, *rhs, approx, span, ctx),
            ExprKind::ThreeWay { lhs, rhs } => comparison::resolve_three_way(*lhs, *rhs, span, ctx),
            ExprKind::Concat { lhs, rhs } => binary::resolve_concat(*lhs, *rhs, span, ctx),
            ExprKind::Logical { and, lhs, rhs } => {
                logical::resolve_logical(and, *lhs, *rhs, span, ctx)
            }
            ExprKind::Cond {
                cond,
                then,
                otherwise,
            } => logical::resolve_cond(*cond, *then, *otherwise, span, ctx),
            ExprKind::Assign { target, value } => assign::resolve_assign(*target, *value, span, ctx),
            ExprKind::CompoundAssign { op, target, value } => {
                assign::resolve_compound(op, *target, *value, span, ctx)
            }
            ExprKind::MultiAssign { targets, call, .. } => {
                assign::resolve_multi(targets, *call, span, ctx)
            }
            ExprKind::FunCall { name, args } => call::resolve_fun_call(name, args, span, ctx),
            ExprKind::MethodCall {
                receiver,
                name,
                args,
            } => call::resolve_method_call(*receiver, name, args, span, ctx),

            ExprKind::Block { stmts, .. } => stmt::block::resolve_block(stmts, span, ctx),
            ExprKind::If {
                cond,
                then,
                otherwise,
            } => stmt::branch::resolve_if(*cond, then, otherwise, span, ctx),
            ExprKind::While {
                cond,
                body,
                do_while,
            } => stmt::loops::resolve_while(*cond, *body, do_while, span, ctx),
            ExprKind::For {
                init,
                cond,
                step,
                body,
            } => stmt::loops::resolve_for(init, cond, step, *body, span, ctx),
            ExprKind::Switch { value, content } => {
                stmt::switch::resolve_switch(*value, content, span, ctx)
            }
            ExprKind::CaseLabel(value) => stmt::switch::resolve_case_label(value, span, ctx),
            ExprKind::Break => stmt::jump::resolve_break(span, ctx),
            ExprKind::Continue => stmt::jump::resolve_continue(span, ctx),
            ExprKind::Return(values) => stmt::return_stmt::resolve_return(values, span, ctx),
            ExprKind::LocalDecl {
                name, ty, init, ..
            } => stmt::var_def::resolve_local_decl(name, ty, init, span, ctx),
            ExprKind::StaticArrayDecl {
                name, elem, values, ..
            } => stmt::var_def::resolve_static_array(name, elem, values, span, ctx),

            _ => unreachable!("node kind is only created in resolved form"),
        }
    }

    /// Lowers the node, returning where its value lives. Valid only after
    /// resolution.
    pub fn emit(&self, b: &mut FunctionBuilder<'_>) -> ValueSlot {
        debug_assert!(self.resolved, "emitting unresolved node");
        match &self.kind {
            ExprKind::Const(v) => literal::emit_const(v, self.ty, b),
            ExprKind::Nop => ValueSlot::void(),
            ExprKind::SelfPtr => ValueSlot::fixed(RegBank::Ptr, 0, 1),
            ExprKind::Local { id, .. } => member::emit_local(*id, b),
            ExprKind::Global { index, .. } => member::emit_global(*index, self.ty, b),
            ExprKind::Member {
                base,
                offset,
                field_ty,
                ..
            } => member::emit_member(base, *offset, *field_ty, b),
            ExprKind::VecElem { base, index } => member::emit_vec_elem(base, *index, b),
            ExprKind::Index {
                base,
                index,
                elem,
                len,
                offset,
            } => indexing::emit_index(base, index, *elem, *len, *offset, b),
            ExprKind::StaticIndex { id, index } => {
                indexing::emit_static_index(*id, index, self.ty, b)
            }
            ExprKind::VectorLit(parts) => literal::emit_vector(parts, self.ty, b),
            ExprKind::ColorLit { base, parts } => literal::emit_color(*base, parts, b),

            ExprKind::BoolCast {
                operand,
                need_value,
            } => conversion::emit_bool_cast(operand, *need_value, b),
            ExprKind::IntCast {
                operand, unsigned, ..
            } => conversion::emit_numeric_cast(operand, self.ty, *unsigned, b),
            ExprKind::FloatCast(operand) => {
                conversion::emit_numeric_cast(operand, Type::Float, false, b)
            }
            ExprKind::StringCast(operand) => conversion::emit_string_cast(operand, b),
            ExprKind::NameCast(operand) => conversion::emit_name_cast(operand, b),
            ExprKind::ColorCast(operand) => {
                conversion::emit_retag_cast(operand, CastKind::S2Co, b)
            }
            ExprKind::SoundCast(operand) => {
                conversion::emit_retag_cast(operand, CastKind::S2So, b)
            }
            ExprKind::CueOffset { operand, base } => {
                conversion::emit_cue_offset(operand, *base, b)
            }
            ExprKind::ClassCheckCast {
                operand,
                native,
                target,
            } => conversion::emit_class_check(operand, *native, *target, b),

            ExprKind::Neg(operand) => unary::emit_neg(operand, self.ty, b),
            ExprKind::BitNot(operand) => unary::emit_bitnot(operand, b),
            ExprKind::BoolNot(operand) => unary::emit_boolnot(operand, b),
            ExprKind::Abs(operand) => unary::emit_abs(operand, self.ty, b),
            ExprKind::IncDec {
                target,
                dec,
                post,
                need_value,
            } => unary::emit_incdec(target, *dec, *post, *need_value, b),
            ExprKind::Binary { op, lhs, rhs } => binary::emit_binary(*op, lhs, rhs, self.ty, b),
            ExprKind::Compare {
                op,
                lhs,
                rhs,
                approx,
            } => comparison::emit_compare(*op, lhs, rhs, *approx, b),
            ExprKind::ThreeWay { lhs, rhs } => comparison::emit_three_way(lhs, rhs, b),
            ExprKind::Concat { lhs, rhs } => binary::emit_concat(lhs, rhs, b),
            ExprKind::Logical { and, lhs, rhs } => logical::emit_logical(*and, lhs, rhs, b),
            ExprKind::Cond {
                cond,
                then,
                otherwise,
            } => logical::emit_cond(cond, then, otherwise, self.ty, b),

            ExprKind::Assign { target, value } => assign::emit_assign(target, value, b),
            ExprKind::CompoundAssign { op, target, value } => {
                assign::emit_compound(*op, target, value, b)
            }
            ExprKind::MultiAssign {
                targets,
                call,
                casts,
            } => assign::emit_multi(targets, call, casts, b),

            ExprKind::VMCall {
                target,
                receiver,
                implicits,
                receiver_is_self,
                args,
                by_ref,
                returns,
                tail,
            } => call::emit_vm_call(
                *target,
                receiver.as_deref(),
                *implicits,
                *receiver_is_self,
                args,
                by_ref,
                returns,
                *tail,
                true,
                b,
            ),
            ExprKind::NativeCall {
                native,
                generator,
                args,
                returns,
            } => call::emit_native_call(*native, *generator, args, returns, true, b),
            ExprKind::RandomPick {
                native,
                generator,
                choices,
            } => random::emit_random_pick(*native, *generator, choices, self.ty, b),

            ExprKind::Flop { func, operand } => builtin::emit_flop(*func, operand, b),
            ExprKind::Atan2 { y, x } => builtin::emit_atan2(y, x, b),
            ExprKind::MinMax {
                max,
                seed,
                operands,
            } => builtin::emit_min_max(*max, seed.as_ref(), operands, self.ty, b),
            ExprKind::VecLength(operand) => vector::emit_length(operand, b),
            ExprKind::VecUnit(operand) => vector::emit_unit(operand, b),
            ExprKind::Dot { lhs, rhs } => vector::emit_dot(lhs, rhs, b),
            ExprKind::Cross { lhs, rhs } => vector::emit_cross(lhs, rhs, b),

            ExprKind::Block { stmts, locals } => stmt::block::emit_block(stmts, locals, b),
            ExprKind::If {
                cond,
                then,
                otherwise,
            } => stmt::branch::emit_if(cond, then.as_deref(), otherwise.as_deref(), b),
            ExprKind::While {
                cond,
                body,
                do_while,
            } => stmt::loops::emit_while(cond, body, *do_while, b),
            ExprKind::For {
                init,
                cond,
                step,
                body,
            } => stmt::loops::emit_for(
                init.as_deref(),
                cond.as_deref(),
                step.as_deref(),
                body,
                b,
            ),
            ExprKind::Switch { value, content } => stmt::switch::emit_switch(value, content, b),
            ExprKind::CaseLabel(_) => {
                unreachable!("case labels are emitted by their switch")
            }
            ExprKind::Break => {
                b.emit_break();
                ValueSlot::void()
            }
            ExprKind::Continue => {
                b.emit_continue();
                ValueSlot::void()
            }
            ExprKind::Return(values) => stmt::return_stmt::emit_return(values, b),
            ExprKind::LocalDecl { init, id, ty, .. } => {
                stmt::var_def::emit_local_decl(id.expect("unresolved decl"), *ty, init.as_deref(), b)
            }
            ExprKind::StaticArrayDecl {
                elem, values, id, ..
            } => stmt::var_def::emit_static_array(id.expect("unresolved decl"), *elem, values, b),

            _ => unreachable!("emitting a node resolution should have rewritten"),
        }
    }

    /// Lowers the node in statement position, discarding any value.
    pub fn emit_discard(&self, b: &mut FunctionBuilder<'_>) {
        debug_assert!(self.resolved, "emitting unresolved node");
        match &self.kind {
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
                call::emit_vm_call(
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
                call::emit_native_call(*native, *generator, args, returns, false, b);
            }
            ExprKind::IncDec {
                target, dec, post, ..
            } => {
                let slot = unary::emit_incdec(target, *dec, *post, false, b);
                b.free_slot(&slot);
            }
            _ => {
                let slot = self.emit(b);
                b.free_slot(&slot);
            }
        }
    }

    /// Whether the node denotes addressable storage, and whether that
    /// storage is writable.
    pub fn request_address(&self) -> Option<bool> {
        match &self.kind {
            ExprKind::Local { read_only, .. } => Some(!read_only),
            ExprKind::Global { read_only, .. } => Some(!read_only),
            ExprKind::Member { base, read_only, .. } => {
                // A member of a readonly pointer is never writable.
                let base_writable = match base.ty {
                    Type::Ptr { readonly, .. } => !readonly,
                    _ => base.request_address().unwrap_or(true),
                };
                Some(!read_only && base_writable)
            }
            ExprKind::Index { base, .. } => base.request_address(),
            ExprKind::VecElem { base, .. } => base.request_address(),
            ExprKind::StaticIndex { .. } => Some(false),
            _ => None,
        }
    }

    /// The node's value as a return signature; empty for void.
    pub fn return_proto(&self) -> Vec<Type> {
        match &self.kind {
            ExprKind::VMCall { returns, .. } | ExprKind::NativeCall { returns, .. } => {
                returns.clone()
            }
            _ if self.ty == Type::Void => Vec::new(),
            _ => vec![self.ty],
        }
    }
}
