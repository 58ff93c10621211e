//! Integration tests: build expression trees, compile, inspect bytecode.

use skit_codegen::{
    compile_function, Arg, BinOp, ClassDef, CmpOp, CompileFail, ConstVal, Dialect, Expr,
    ExprKind, FunctionSig, MethodDef, NativeDef, NativeRegistry, ParamDef, SymbolTable, Type,
};
use skit_common::diagnostics::DiagnosticSink;
use skit_common::span::Span;
use skit_common::symbol::{Symbol, SymbolInterner};
use skit_vm::{CompiledFunction, FunctionId, NativeId, Opcode, MEM_W1, MEM_WIDTH_MASK, RET_KONST};

fn sp() -> Span {
    Span::dummy()
}

struct Harness {
    interner: SymbolInterner,
    symtab: SymbolTable,
    natives: NativeRegistry,
}

/// One actor class with a field, a method, and a native routine.
fn harness() -> Harness {
    let mut interner = SymbolInterner::new();
    let mut symtab = SymbolTable::new();

    let mut actor = ClassDef::new(interner.intern("Actor"), None);
    actor.add_field(interner.intern("health"), Type::Int, false);
    actor.add_field(interner.intern("stamina"), Type::UInt8, false);
    actor.add_method(MethodDef {
        name: interner.intern("refresh"),
        id: FunctionId(7),
        params: Vec::new(),
        returns: Vec::new(),
        vtable_index: None,
        is_static: false,
        is_final: true,
        is_cue: false,
        private: false,
        deprecated: false,
        owner: skit_codegen::ClassId(0),
    });
    actor.add_method(MethodDef {
        name: interner.intern("boost"),
        id: FunctionId(8),
        params: vec![
            ParamDef {
                name: interner.intern("power"),
                ty: Type::Int,
                by_ref: false,
                default: Some(ConstVal::Int(5)),
            },
            ParamDef {
                name: interner.intern("loud"),
                ty: Type::Int,
                by_ref: false,
                default: Some(ConstVal::Int(1)),
            },
        ],
        returns: Vec::new(),
        vtable_index: None,
        is_static: false,
        is_final: true,
        is_cue: false,
        private: false,
        deprecated: false,
        owner: skit_codegen::ClassId(0),
    });
    symtab.add_class(actor);

    let mut natives = NativeRegistry::new();
    natives.register(NativeDef {
        name: interner.intern("poll"),
        id: NativeId(0),
        params: Vec::new(),
        returns: vec![Type::Int],
    });

    Harness {
        interner,
        symtab,
        natives,
    }
}

fn free_sig(h: &mut Harness, returns: Vec<Type>) -> FunctionSig {
    FunctionSig {
        name: h.interner.intern("test_fn"),
        owner: None,
        is_static: true,
        is_cue: false,
        cue_offset: None,
        self_ambiguous: false,
        params: Vec::new(),
        returns: Some(returns),
    }
}

fn method_sig(h: &mut Harness, returns: Vec<Type>) -> FunctionSig {
    FunctionSig {
        name: h.interner.intern("test_method"),
        owner: Some(skit_codegen::ClassId(0)),
        is_static: false,
        is_cue: false,
        cue_offset: None,
        self_ambiguous: false,
        params: Vec::new(),
        returns: Some(returns),
    }
}

fn compile(
    h: &mut Harness,
    dialect: Dialect,
    sig: FunctionSig,
    body: Expr,
) -> (Result<CompiledFunction, CompileFail>, DiagnosticSink) {
    let mut sink = DiagnosticSink::new();
    let result = compile_function(
        &h.symtab,
        &mut h.natives,
        &h.interner,
        &mut sink,
        dialect,
        sig,
        body,
    );
    (result, sink)
}

fn compile_ok(h: &mut Harness, sig: FunctionSig, body: Expr) -> CompiledFunction {
    let (result, sink) = compile(h, Dialect::Strict, sig, body);
    match result {
        Ok(f) => f,
        Err(e) => panic!("compilation failed: {} ({:?})", e, sink.diagnostics()),
    }
}

fn opcodes(f: &CompiledFunction) -> Vec<Opcode> {
    f.code.iter().map(|i| i.opcode()).collect()
}

fn break_stmt() -> Expr {
    Expr::new(ExprKind::Break, sp())
}

fn case(value: i32) -> Expr {
    Expr::new(
        ExprKind::CaseLabel(Some(Box::new(Expr::const_int(value, sp())))),
        sp(),
    )
}

fn default_case() -> Expr {
    Expr::new(ExprKind::CaseLabel(None), sp())
}

#[test]
fn test_constant_arithmetic_folds_to_pool_entry() {
    let mut h = harness();
    let sig = free_sig(&mut h, vec![Type::Int]);
    // return 1 + 2 * 3;
    let body = Expr::block(
        vec![Expr::ret(
            vec![Expr::binary(
                BinOp::Add,
                Expr::const_int(1, sp()),
                Expr::binary(
                    BinOp::Mul,
                    Expr::const_int(2, sp()),
                    Expr::const_int(3, sp()),
                    sp(),
                ),
                sp(),
            )],
            sp(),
        )],
        sp(),
    );

    let f = compile_ok(&mut h, sig, body);
    assert_eq!(opcodes(&f), vec![Opcode::Ret, Opcode::RetNone]);
    assert_ne!(f.code[0].flags & RET_KONST, 0, "folded value returns from the pool");
    assert_eq!(f.pools.ints, vec![7]);
}

#[test]
fn test_constant_if_keeps_only_the_taken_branch() {
    let mut h = harness();
    let sig = free_sig(&mut h, vec![Type::Int]);
    let body = Expr::block(
        vec![Expr::new(
            ExprKind::If {
                cond: Box::new(Expr::const_bool(false, sp())),
                then: Some(Box::new(Expr::ret(vec![Expr::const_int(10, sp())], sp()))),
                otherwise: Some(Box::new(Expr::ret(
                    vec![Expr::const_int(20, sp())],
                    sp(),
                ))),
            },
            sp(),
        )],
        sp(),
    );

    let f = compile_ok(&mut h, sig, body);
    assert_eq!(opcodes(&f), vec![Opcode::Ret, Opcode::RetNone]);
    // The untaken branch leaves nothing behind, not even its constant.
    assert_eq!(f.pools.ints, vec![20]);
}

#[test]
fn test_constant_false_loop_emits_nothing() {
    let mut h = harness();
    let sig = free_sig(&mut h, Vec::new());
    let body = Expr::block(
        vec![Expr::new(
            ExprKind::While {
                cond: Box::new(Expr::const_bool(false, sp())),
                body: Box::new(Expr::block(vec![Expr::ret(Vec::new(), sp())], sp())),
                do_while: false,
            },
            sp(),
        )],
        sp(),
    );

    let f = compile_ok(&mut h, sig, body);
    assert_eq!(opcodes(&f), vec![Opcode::RetNone]);
}

#[test]
fn test_runtime_while_loop_shape() {
    let mut h = harness();
    let sig = free_sig(&mut h, Vec::new());
    let i = h.interner.intern("i");
    // local int i = 0; while (i < 3) { i = i + 1; }
    let body = Expr::block(
        vec![
            Expr::local_decl(i, Type::Int, Some(Expr::const_int(0, sp())), sp()),
            Expr::new(
                ExprKind::While {
                    cond: Box::new(Expr::compare(
                        CmpOp::Lt,
                        Expr::ident(i, sp()),
                        Expr::const_int(3, sp()),
                        sp(),
                    )),
                    body: Box::new(Expr::block(
                        vec![Expr::assign(
                            Expr::ident(i, sp()),
                            Expr::binary(
                                BinOp::Add,
                                Expr::ident(i, sp()),
                                Expr::const_int(1, sp()),
                                sp(),
                            ),
                            sp(),
                        )],
                        sp(),
                    )),
                    do_while: false,
                },
                sp(),
            ),
        ],
        sp(),
    );

    let f = compile_ok(&mut h, sig, body);
    let ops = opcodes(&f);
    assert!(ops.contains(&Opcode::LtI));
    assert!(ops.contains(&Opcode::TestI), "guard tests the condition register");
    let back_jump = f
        .code
        .iter()
        .any(|inst| inst.opcode() == Opcode::Jump && inst.imm32() < 0);
    assert!(back_jump, "loop closes with a backward jump");
    assert_eq!(*ops.last().unwrap(), Opcode::RetNone);
}

#[test]
fn test_constant_switch_collapses_to_taken_case() {
    let mut h = harness();
    let sig = free_sig(&mut h, vec![Type::Int]);
    let body = Expr::block(
        vec![Expr::new(
            ExprKind::Switch {
                value: Box::new(Expr::const_int(2, sp())),
                content: vec![
                    case(1),
                    Expr::ret(vec![Expr::const_int(10, sp())], sp()),
                    break_stmt(),
                    case(2),
                    Expr::ret(vec![Expr::const_int(20, sp())], sp()),
                    break_stmt(),
                    default_case(),
                    Expr::ret(vec![Expr::const_int(30, sp())], sp()),
                ],
            },
            sp(),
        )],
        sp(),
    );

    let f = compile_ok(&mut h, sig, body);
    assert_eq!(opcodes(&f), vec![Opcode::Ret, Opcode::RetNone]);
    assert_eq!(f.pools.ints, vec![20]);
}

#[test]
fn test_equal_constants_share_one_pool_slot() {
    let mut h = harness();
    let sig = free_sig(&mut h, Vec::new());
    let a = h.interner.intern("a");
    let b = h.interner.intern("b");
    let body = Expr::block(
        vec![
            Expr::local_decl(a, Type::Float, Some(Expr::const_float(2.5, sp())), sp()),
            Expr::local_decl(b, Type::Float, Some(Expr::const_float(2.5, sp())), sp()),
        ],
        sp(),
    );

    let f = compile_ok(&mut h, sig, body);
    assert_eq!(f.pools.floats, vec![2.5]);
    assert_eq!(f.code[0].opcode(), Opcode::LoadKF);
    assert_eq!(f.code[1].opcode(), Opcode::LoadKF);
    assert_eq!(f.code[0].b, f.code[1].b);
}

#[test]
fn test_lone_returned_call_becomes_tail_call() {
    let mut h = harness();
    let sig = method_sig(&mut h, Vec::new());
    let refresh = h.interner.intern("refresh");
    let body = Expr::block(
        vec![Expr::ret(vec![Expr::call(refresh, Vec::new(), sp())], sp())],
        sp(),
    );

    let f = compile_ok(&mut h, sig, body);
    // Receiver parameter, then the call itself; no return sequence after.
    assert_eq!(opcodes(&f), vec![Opcode::Param, Opcode::TailCallK]);
    assert_eq!(f.implicit_count, 1);
}

#[test]
fn test_returned_native_call_fetches_result() {
    let mut h = harness();
    let sig = free_sig(&mut h, vec![Type::Int]);
    let poll = h.interner.intern("poll");
    let body = Expr::block(
        vec![Expr::ret(vec![Expr::call(poll, Vec::new(), sp())], sp())],
        sp(),
    );

    let f = compile_ok(&mut h, sig, body);
    assert_eq!(
        opcodes(&f),
        vec![Opcode::CallK, Opcode::Result, Opcode::Ret, Opcode::RetNone]
    );
}

#[test]
fn test_break_outside_loop_is_an_error() {
    let mut h = harness();
    let sig = free_sig(&mut h, Vec::new());
    let body = Expr::block(vec![break_stmt()], sp());

    let (result, sink) = compile(&mut h, Dialect::Strict, sig, body);
    assert!(result.is_err());
    assert_eq!(sink.error_count(), 1);
    assert!(sink.diagnostics()[0]
        .message
        .contains("not inside a loop"));
}

#[test]
fn test_float_to_int_narrowing_follows_dialect() {
    let decl = |x: Symbol| {
        Expr::block(
            vec![Expr::local_decl(
                x,
                Type::Int,
                Some(Expr::const_float(1.5, sp())),
                sp(),
            )],
            sp(),
        )
    };

    let mut h = harness();
    let x = h.interner.intern("x");
    let sig = free_sig(&mut h, Vec::new());
    let (result, sink) = compile(&mut h, Dialect::Strict, sig, decl(x));
    assert!(result.is_err(), "strict rules reject the lossy conversion");
    assert!(sink.error_count() > 0);

    let mut h = harness();
    let x = h.interner.intern("x");
    let sig = free_sig(&mut h, Vec::new());
    let (result, sink) = compile(&mut h, Dialect::Legacy, sig, decl(x));
    let f = result.expect("legacy rules downgrade to a warning");
    assert!(sink.warning_count() > 0);
    // The constant truncates at compile time.
    assert_eq!(f.pools.ints, vec![1]);
}

#[test]
fn test_min_of_constants_folds() {
    let mut h = harness();
    let sig = free_sig(&mut h, vec![Type::Int]);
    let min = h.interner.intern("min");
    let args: Vec<Arg> = [3, 7, 5]
        .iter()
        .map(|&v| Arg::positional(Expr::const_int(v, sp())))
        .collect();
    let body = Expr::block(vec![Expr::ret(vec![Expr::call(min, args, sp())], sp())], sp());

    let f = compile_ok(&mut h, sig, body);
    assert_eq!(opcodes(&f), vec![Opcode::Ret, Opcode::RetNone]);
    assert_eq!(f.pools.ints, vec![3]);
}

#[test]
fn test_logical_and_with_constant_lhs_folds() {
    let mut h = harness();
    let sig = free_sig(&mut h, vec![Type::Bool]);
    // return true && (2 < 3);
    let body = Expr::block(
        vec![Expr::ret(
            vec![Expr::new(
                ExprKind::Logical {
                    and: true,
                    lhs: Box::new(Expr::const_bool(true, sp())),
                    rhs: Box::new(Expr::compare(
                        CmpOp::Lt,
                        Expr::const_int(2, sp()),
                        Expr::const_int(3, sp()),
                        sp(),
                    )),
                },
                sp(),
            )],
            sp(),
        )],
        sp(),
    );

    let f = compile_ok(&mut h, sig, body);
    assert_eq!(opcodes(&f), vec![Opcode::Ret, Opcode::RetNone]);
    assert_eq!(f.pools.ints, vec![1]);
}

#[test]
fn test_named_argument_fills_defaults_in_order() {
    let mut h = harness();
    let sig = method_sig(&mut h, Vec::new());
    let boost = h.interner.intern("boost");
    let loud = h.interner.intern("loud");
    // boost(loud: 0);  "power" falls back to its declared default.
    let body = Expr::block(
        vec![Expr::call(
            boost,
            vec![Arg::named(loud, Expr::const_int(0, sp()))],
            sp(),
        )],
        sp(),
    );

    let f = compile_ok(&mut h, sig, body);
    assert_eq!(
        opcodes(&f),
        vec![
            Opcode::Param,
            Opcode::Param,
            Opcode::Param,
            Opcode::CallK,
            Opcode::RetNone
        ]
    );
    // Defaults and explicit values pass in declaration order.
    assert_eq!(f.pools.ints, vec![5, 0]);
    assert_eq!(f.code[3].b, 3, "receiver plus two declared parameters");
}

#[test]
fn test_constant_float_modulo_keeps_dividend_sign() {
    let mut h = harness();
    let sig = free_sig(&mut h, vec![Type::Float]);
    // return -7.5 % 2.0;
    let body = Expr::block(
        vec![Expr::ret(
            vec![Expr::binary(
                BinOp::Mod,
                Expr::const_float(-7.5, sp()),
                Expr::const_float(2.0, sp()),
                sp(),
            )],
            sp(),
        )],
        sp(),
    );

    let f = compile_ok(&mut h, sig, body);
    assert_eq!(opcodes(&f), vec![Opcode::Ret, Opcode::RetNone]);
    assert_eq!(f.pools.floats, vec![-1.5]);
}

#[test]
fn test_narrow_unsigned_division_promotes_signed() {
    let mut h = harness();
    let sig = method_sig(&mut h, vec![Type::Int]);
    let stamina = h.interner.intern("stamina");
    // return stamina / stamina;  uint8 operands operate as signed int.
    let body = Expr::block(
        vec![Expr::ret(
            vec![Expr::binary(
                BinOp::Div,
                Expr::ident(stamina, sp()),
                Expr::ident(stamina, sp()),
                sp(),
            )],
            sp(),
        )],
        sp(),
    );

    let f = compile_ok(&mut h, sig, body);
    let ops = opcodes(&f);
    assert!(ops.contains(&Opcode::DivI));
    assert!(!ops.contains(&Opcode::DivU));
    // The field still loads at its declared one-byte width.
    let load = f
        .code
        .iter()
        .find(|i| i.opcode() == Opcode::LdI)
        .expect("field load");
    assert_eq!(load.flags & MEM_WIDTH_MASK, MEM_W1);
}

#[test]
fn test_empty_branch_warns_and_folds_away() {
    let mut h = harness();
    let i = h.interner.intern("i");
    let sig = free_sig(&mut h, Vec::new());
    // local int i = 0; if (i < 3) ;
    let body = Expr::block(
        vec![
            Expr::local_decl(i, Type::Int, Some(Expr::const_int(0, sp())), sp()),
            Expr::new(
                ExprKind::If {
                    cond: Box::new(Expr::compare(
                        CmpOp::Lt,
                        Expr::ident(i, sp()),
                        Expr::const_int(3, sp()),
                        sp(),
                    )),
                    then: None,
                    otherwise: None,
                },
                sp(),
            ),
        ],
        sp(),
    );

    let (result, sink) = compile(&mut h, Dialect::Strict, sig, body);
    let f = result.expect("empty branch is only a warning");
    assert!(sink.warning_count() > 0);
    let ops = opcodes(&f);
    assert!(!ops.contains(&Opcode::TestI));
    assert!(!ops.contains(&Opcode::Jump));
    assert!(!ops.contains(&Opcode::LtI), "a pure condition vanishes");
}

#[test]
fn test_empty_branch_keeps_effectful_condition() {
    let mut h = harness();
    let poll = h.interner.intern("poll");
    let sig = free_sig(&mut h, Vec::new());
    // if (poll()) ;
    let body = Expr::block(
        vec![Expr::new(
            ExprKind::If {
                cond: Box::new(Expr::call(poll, Vec::new(), sp())),
                then: None,
                otherwise: None,
            },
            sp(),
        )],
        sp(),
    );

    let (result, sink) = compile(&mut h, Dialect::Strict, sig, body);
    let f = result.expect("empty branch is only a warning");
    assert!(sink.warning_count() > 0);
    let ops = opcodes(&f);
    assert!(ops.contains(&Opcode::CallK), "the call still runs");
    assert!(!ops.contains(&Opcode::TestI));
    assert!(!ops.contains(&Opcode::Jump));
}

#[test]
fn test_two_vector_adds_into_three_vector_xy() {
    let mut h = harness();
    let sig = free_sig(&mut h, vec![Type::Vec3]);
    // return (1, 2, 3) + (10, 20);  only x and y change.
    let vec3 = Expr::new(
        ExprKind::VectorLit(vec![
            Expr::const_float(1.0, sp()),
            Expr::const_float(2.0, sp()),
            Expr::const_float(3.0, sp()),
        ]),
        sp(),
    );
    let vec2 = Expr::new(
        ExprKind::VectorLit(vec![
            Expr::const_float(10.0, sp()),
            Expr::const_float(20.0, sp()),
        ]),
        sp(),
    );
    let body = Expr::block(
        vec![Expr::ret(
            vec![Expr::binary(BinOp::Add, vec3, vec2, sp())],
            sp(),
        )],
        sp(),
    );

    let f = compile_ok(&mut h, sig, body);
    assert_eq!(f.pools.floats, vec![11.0, 22.0, 3.0]);
}

#[test]
fn test_member_read_emits_field_load() {
    let mut h = harness();
    let sig = method_sig(&mut h, vec![Type::Int]);
    let health = h.interner.intern("health");
    // return health;  (implicit self)
    let body = Expr::block(
        vec![Expr::ret(vec![Expr::ident(health, sp())], sp())],
        sp(),
    );

    let f = compile_ok(&mut h, sig, body);
    let ops = opcodes(&f);
    assert!(ops.contains(&Opcode::LdI), "int field reads through the int load");
    assert_eq!(*ops.last().unwrap(), Opcode::RetNone);
}
