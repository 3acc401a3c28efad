//! Integration tests for the lowering engine.
//!
//! These drive lowering over hand-built typed trees and assert on the chain
//! shapes: label layouts of the structured statements, call argument order,
//! and the register-stack discipline.

use bumpalo::Bump;
use relic::ast::{
    BinOp, Block, BlockItem, Expr, ExprKind, FuncDecl, Init, LocalVar, LogicOp, Param, Stmt,
    SwitchItem, Ty,
};
use relic::core::{CompilationSession, CompileError, TargetSpec};
use relic::ir::print_function;
use relic::lower::LowerCx;
use relic::{Op, VReg};

fn check_output_contains(output: &str, patterns: &[&str]) {
    for pattern in patterns {
        assert!(
            output.contains(pattern),
            "Output missing expected pattern: '{pattern}'\nFull output:\n{output}"
        );
    }
}

/// Index of the first output line containing `pattern`.
fn line_of(output: &str, pattern: &str) -> usize {
    output
        .lines()
        .position(|l| l.contains(pattern))
        .unwrap_or_else(|| panic!("no line contains '{pattern}'\nFull output:\n{output}"))
}

fn param(i: u32, ty: Ty) -> Expr {
    Expr::new(ty, ExprKind::Param(i))
}

fn local(i: u32, ty: Ty) -> Expr {
    Expr::new(ty, ExprKind::Local(i))
}

fn int_bin(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::new(Ty::int(), ExprKind::Bin { op, lhs: Box::new(lhs), rhs: Box::new(rhs) })
}

fn assign(target: Expr, value: Expr) -> Stmt {
    let ty = target.ty.clone();
    Stmt::Expr(Expr::new(
        ty,
        ExprKind::Assign { target: Box::new(target), value: Box::new(value) },
    ))
}

/// A declaration-only function for driving expression and statement lowering
/// in isolation: int params named p0.., locals as given, no body.
fn scaffold(session: &CompilationSession, int_params: u32, locals: Vec<LocalVar>) -> FuncDecl {
    let params = (0..int_params)
        .map(|i| Param { name: session.intern(&format!("p{i}")), ty: Ty::int() })
        .collect();
    FuncDecl {
        name: session.intern("probe"),
        ret: Ty::int(),
        params,
        variadic: false,
        locals,
        body: None,
    }
}

fn count_ops(cx: &LowerCx, pred: fn(&Op) -> bool) -> usize {
    let func = cx.ir();
    func.list.iter().filter(|&id| pred(func.list.op(id))).count()
}

#[test]
fn short_circuit_and_has_one_shared_label() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let target = TargetSpec::generic64();
    let decl = scaffold(&session, 2, vec![]);
    let mut cx = LowerCx::new(&session, &target, &decl).unwrap();

    let e = Expr::new(
        Ty::int(),
        ExprKind::Logic {
            op: LogicOp::And,
            lhs: Box::new(param(0, Ty::int())),
            rhs: Box::new(param(1, Ty::int())),
        },
    );
    cx.lower_expr(&e).unwrap();

    assert_eq!(count_ops(&cx, Op::is_label), 1);

    // The chain ends with the shared label, and an immediate load of 1 sits
    // right before it: the fall-through path of both branches.
    let func = cx.ir();
    let ids: Vec<_> = func.list.iter().collect();
    let last = *ids.last().unwrap();
    assert!(func.list.op(last).is_label());
    let before = func.list.prev(last).unwrap();
    assert!(matches!(func.list.op(before), Op::LoadImm { value: 1, .. }));
}

#[test]
fn short_circuit_or_has_two_labels() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let target = TargetSpec::generic64();
    let decl = scaffold(&session, 2, vec![]);
    let mut cx = LowerCx::new(&session, &target, &decl).unwrap();

    let e = Expr::new(
        Ty::int(),
        ExprKind::Logic {
            op: LogicOp::Or,
            lhs: Box::new(param(0, Ty::int())),
            rhs: Box::new(param(1, Ty::int())),
        },
    );
    cx.lower_expr(&e).unwrap();

    assert_eq!(count_ops(&cx, Op::is_label), 2);
    assert_eq!(count_ops(&cx, |op| matches!(op, Op::Jump(_))), 1);
}

#[test]
fn register_stack_discipline_for_nested_expression() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let target = TargetSpec::generic64();
    let decl = scaffold(&session, 4, vec![]);
    let mut cx = LowerCx::new(&session, &target, &decl).unwrap();

    // (p0 + p1) * (p2 - p3)
    let e = int_bin(
        BinOp::Mul,
        int_bin(BinOp::Add, param(0, Ty::int()), param(1, Ty::int())),
        int_bin(BinOp::Sub, param(2, Ty::int()), param(3, Ty::int())),
    );
    cx.lower_expr(&e).unwrap();

    let func = cx.ir();
    // The final node combines the two highest live registers into the lower
    // one; nothing anywhere references a register past the watermark.
    let last = func.list.iter().last().unwrap();
    let op = func.list.op(last);
    assert_eq!(op.defined_reg(), Some(VReg(0)));
    assert!(op.reads_reg(VReg(0)));
    assert!(op.reads_reg(VReg(1)));
    for id in func.list.iter() {
        let op = func.list.op(id);
        assert!(!op.reads_reg(VReg(3)), "register past the stack watermark read");
        assert!(op.defined_reg() != Some(VReg(3)));
    }
}

#[test]
fn call_arguments_lower_in_source_order() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let target = TargetSpec::generic64();
    let decl = scaffold(&session, 0, vec![]);
    let mut cx = LowerCx::new(&session, &target, &decl).unwrap();

    let fn_ty = Ty::Func {
        ret: Box::new(Ty::int()),
        params: vec![Ty::int(), Ty::int(), Ty::int()],
        variadic: false,
    };
    let e = Expr::new(
        Ty::int(),
        ExprKind::Call {
            callee: Box::new(Expr::new(fn_ty, ExprKind::FuncName(session.intern("f")))),
            args: vec![Expr::num(1), Expr::num(2), Expr::num(3)],
        },
    );
    cx.lower_expr(&e).unwrap();

    // Three value-producing loads in source order, then the call; nothing in
    // between reorders them.
    let func = cx.ir();
    let ops: Vec<_> = func.list.iter().map(|id| func.list.op(id).clone()).collect();
    assert_eq!(ops.len(), 4);
    assert!(matches!(ops[0], Op::LoadImm { value: 1, dst: VReg(0), .. }));
    assert!(matches!(ops[1], Op::LoadImm { value: 2, dst: VReg(1), .. }));
    assert!(matches!(ops[2], Op::LoadImm { value: 3, dst: VReg(2), .. }));
    match &ops[3] {
        Op::Call { args, ret, .. } => {
            let regs: Vec<u32> = args.iter().map(|(r, _)| r.0).collect();
            assert_eq!(regs, vec![0, 1, 2]);
            assert!(matches!(ret, relic::ir::CallRet::Value { dst: VReg(0), .. }));
        }
        other => panic!("expected a call node, found {other:?}"),
    }
}

#[test]
fn if_without_else_omits_the_intermediate_jump() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let target = TargetSpec::generic64();
    let locals = vec![LocalVar { name: session.intern("b"), ty: Ty::int(), vla_len: None }];
    let decl = scaffold(&session, 1, locals);
    let mut cx = LowerCx::new(&session, &target, &decl).unwrap();

    let s = Stmt::If {
        cond: param(0, Ty::int()),
        then_stmt: Box::new(assign(local(0, Ty::int()), Expr::num(1))),
        else_stmt: None,
    };
    cx.lower_stmt(&s).unwrap();
    assert_eq!(count_ops(&cx, Op::is_label), 1);
    assert_eq!(count_ops(&cx, |op| matches!(op, Op::Jump(_))), 0);
    assert_eq!(count_ops(&cx, |op| matches!(op, Op::Branch { .. })), 1);
}

#[test]
fn if_with_else_uses_two_labels_and_one_jump() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let target = TargetSpec::generic64();
    let locals = vec![LocalVar { name: session.intern("b"), ty: Ty::int(), vla_len: None }];
    let decl = scaffold(&session, 1, locals);
    let mut cx = LowerCx::new(&session, &target, &decl).unwrap();

    let s = Stmt::If {
        cond: param(0, Ty::int()),
        then_stmt: Box::new(assign(local(0, Ty::int()), Expr::num(1))),
        else_stmt: Some(Box::new(assign(local(0, Ty::int()), Expr::num(2)))),
    };
    cx.lower_stmt(&s).unwrap();
    assert_eq!(count_ops(&cx, Op::is_label), 2);
    assert_eq!(count_ops(&cx, |op| matches!(op, Op::Jump(_))), 1);
}

#[test]
fn loop_label_budgets() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let target = TargetSpec::generic64();

    // while: head test and exit.
    let decl = scaffold(&session, 1, vec![]);
    let mut cx = LowerCx::new(&session, &target, &decl).unwrap();
    let s = Stmt::While { cond: param(0, Ty::int()), body: Box::new(Stmt::Empty) };
    cx.lower_stmt(&s).unwrap();
    assert_eq!(count_ops(&cx, Op::is_label), 2);

    // do-while: body head, test (the continue target), exit.
    let mut cx = LowerCx::new(&session, &target, &decl).unwrap();
    let s = Stmt::DoWhile { body: Box::new(Stmt::Empty), cond: param(0, Ty::int()) };
    cx.lower_stmt(&s).unwrap();
    assert_eq!(count_ops(&cx, Op::is_label), 3);
}

#[test]
fn switch_compares_in_source_order_and_defaults_to_end() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let target = TargetSpec::generic64();
    let locals = vec![LocalVar { name: session.intern("b"), ty: Ty::int(), vla_len: None }];
    let decl = scaffold(&session, 1, locals);

    let body = |items: Vec<SwitchItem>| Stmt::Switch { cond: param(0, Ty::int()), body: items };

    // Case constants 5 then 2: the compare chain keeps source order.
    let mut cx = LowerCx::new(&session, &target, &decl).unwrap();
    cx.lower_stmt(&body(vec![
        SwitchItem::Case(5),
        SwitchItem::Stmt(assign(local(0, Ty::int()), Expr::num(1))),
        SwitchItem::Case(2),
        SwitchItem::Stmt(assign(local(0, Ty::int()), Expr::num(2))),
    ]))
    .unwrap();
    let out = print_function(cx.ir(), &session);
    check_output_contains(&out, &["seteq.int %r1, 5", "seteq.int %r1, 2"]);
    assert!(line_of(&out, "seteq.int %r1, 5") < line_of(&out, "seteq.int %r1, 2"));

    // No default: the fall-through jump goes straight to the end label, which
    // is the last node of the chain.
    let func = cx.ir();
    let last = func.list.iter().last().unwrap();
    let end = match func.list.op(last) {
        Op::Label(l) => *l,
        other => panic!("switch chain should end with its end label, found {other:?}"),
    };
    assert_eq!(count_ops(&cx, |op| matches!(op, Op::Jump(_))), 1);
    let jump_target = func
        .list
        .iter()
        .find_map(|id| match func.list.op(id) {
            Op::Jump(l) => Some(*l),
            _ => None,
        })
        .unwrap();
    assert_eq!(jump_target, end);
}

#[test]
fn ternary_arms_share_the_result_slot() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let target = TargetSpec::generic64();
    let decl = scaffold(&session, 1, vec![]);
    let mut cx = LowerCx::new(&session, &target, &decl).unwrap();

    let e = Expr::new(
        Ty::int(),
        ExprKind::Ternary {
            cond: Box::new(param(0, Ty::int())),
            then_val: Box::new(Expr::num(1)),
            else_val: Box::new(Expr::num(2)),
        },
    );
    cx.lower_expr(&e).unwrap();

    let func = cx.ir();
    let loads: Vec<VReg> = func
        .list
        .iter()
        .filter_map(|id| match func.list.op(id) {
            Op::LoadImm { dst, .. } => Some(*dst),
            _ => None,
        })
        .collect();
    assert_eq!(loads, vec![VReg(0), VReg(0)]);
}

#[test]
fn bool_assignment_normalizes_with_compare() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let target = TargetSpec::generic64();
    let locals = vec![LocalVar { name: session.intern("flag"), ty: Ty::Bool, vla_len: None }];
    let decl = scaffold(&session, 1, locals);
    let mut cx = LowerCx::new(&session, &target, &decl).unwrap();

    cx.lower_stmt(&assign(local(0, Ty::Bool), param(0, Ty::int()))).unwrap();
    let out = print_function(cx.ir(), &session);
    check_output_contains(&out, &["setne.int %r0, 0", "st.byte"]);
}

#[test]
fn aggregate_assignment_is_a_block_copy() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let target = TargetSpec::generic64();
    let rec = Ty::Record { bytes: 24 };
    let locals = vec![
        LocalVar { name: session.intern("dst"), ty: rec.clone(), vla_len: None },
        LocalVar { name: session.intern("src"), ty: rec.clone(), vla_len: None },
    ];
    let decl = scaffold(&session, 0, locals);
    let mut cx = LowerCx::new(&session, &target, &decl).unwrap();

    cx.lower_stmt(&assign(local(0, rec.clone()), local(1, rec))).unwrap();
    let out = print_function(cx.ir(), &session);
    check_output_contains(&out, &["blkcpy [%r0] <- [%r1], 24b"]);
}

#[test]
fn pointer_arithmetic_scales_by_element_size() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let target = TargetSpec::generic64();
    let ptr = Ty::ptr_to(Ty::long());
    let decl = FuncDecl {
        name: session.intern("probe"),
        ret: ptr.clone(),
        params: vec![
            Param { name: session.intern("p"), ty: ptr.clone() },
            Param { name: session.intern("i"), ty: Ty::int() },
        ],
        variadic: false,
        locals: vec![],
        body: None,
    };
    let mut cx = LowerCx::new(&session, &target, &decl).unwrap();

    let e = Expr::new(
        ptr.clone(),
        ExprKind::Bin {
            op: BinOp::Add,
            lhs: Box::new(param(0, ptr.clone())),
            rhs: Box::new(param(1, Ty::int())),
        },
    );
    cx.lower_expr(&e).unwrap();
    let out = print_function(cx.ir(), &session);
    check_output_contains(&out, &["mul.ptr %r1, 8", "add.ptr %r0, %r1"]);

    // Pointer difference divides the raw byte distance afterwards.
    let mut cx = LowerCx::new(&session, &target, &decl).unwrap();
    let e = Expr::new(
        Ty::long(),
        ExprKind::Bin {
            op: BinOp::Sub,
            lhs: Box::new(param(0, ptr.clone())),
            rhs: Box::new(param(0, ptr)),
        },
    );
    cx.lower_expr(&e).unwrap();
    let out = print_function(cx.ir(), &session);
    check_output_contains(&out, &["sub.ptr %r0, %r1", "div.long %r0, 8"]);
}

#[test]
fn vla_declaration_allocates_dynamically() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let target = TargetSpec::generic64();
    let vla_ty = Ty::Array {
        elem: Box::new(Ty::Int { size: relic::SizeClass::Long, signed: true }),
        len: relic::ast::ArrayLen::Dynamic,
    };
    let decl = FuncDecl {
        name: session.intern("probe"),
        ret: Ty::int(),
        params: vec![Param { name: session.intern("n"), ty: Ty::int() }],
        variadic: false,
        locals: vec![LocalVar {
            name: session.intern("buf"),
            ty: vla_ty,
            vla_len: Some(param(0, Ty::int())),
        }],
        body: Some(Block {
            items: vec![
                BlockItem::Decl { local: 0, init: None },
                BlockItem::Stmt(Stmt::Return(Some(Expr::num(0)))),
            ],
        }),
    };
    let func = relic::lower_function(&session, &target, &decl).unwrap();
    let out = print_function(&func, &session);
    // Length cast to pointer width, scaled by the element size, allocated
    // once, pointer parked in the backing slot.
    check_output_contains(&out, &["cast.int.ptr", "mul.ptr %r0, 8", "salloc", "st.ptr"]);
}

#[test]
fn char_array_string_initializer_copies_padded_pool_data() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let target = TargetSpec::generic64();
    let arr = Ty::array_of(Ty::chr(), 8);
    let decl = FuncDecl {
        name: session.intern("probe"),
        ret: Ty::int(),
        params: vec![],
        variadic: false,
        locals: vec![LocalVar { name: session.intern("buf"), ty: arr, vla_len: None }],
        body: Some(Block {
            items: vec![
                BlockItem::Decl { local: 0, init: Some(Init::Str(b"hi\0".to_vec())) },
                BlockItem::Stmt(Stmt::Return(Some(Expr::num(0)))),
            ],
        }),
    };
    let func = relic::lower_function(&session, &target, &decl).unwrap();
    let out = print_function(&func, &session);
    check_output_contains(&out, &["blkcpy [%r0] <- [%r1], 8b"]);
    // The padded literal landed in the session pool.
    let pool = session.string_literals();
    assert_eq!(pool.len(), 1);
    assert_eq!(pool[0].1, b"hi\0\0\0\0\0\0");
}

#[test]
fn list_initializer_unrolls_and_zero_fills() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let target = TargetSpec::generic64();
    let arr = Ty::array_of(Ty::int(), 4);
    let decl = FuncDecl {
        name: session.intern("probe"),
        ret: Ty::Void,
        params: vec![],
        variadic: false,
        locals: vec![LocalVar { name: session.intern("v"), ty: arr, vla_len: None }],
        body: Some(Block {
            items: vec![
                BlockItem::Decl {
                    local: 0,
                    init: Some(Init::List(vec![Expr::num(7), Expr::num(9)])),
                },
                BlockItem::Stmt(Stmt::Return(None)),
            ],
        }),
    };
    let func = relic::lower_function(&session, &target, &decl).unwrap();
    let out = print_function(&func, &session);
    // Two explicit elements, two zero fills, four stores.
    check_output_contains(&out, &["imm.int 7", "imm.int 9"]);
    assert_eq!(out.matches("imm.int 0").count(), 2);
    assert_eq!(out.matches("st.int").count(), 4);
}

#[test]
fn whole_function_gets_prologue_epilogue_and_max_vreg() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let target = TargetSpec::generic64();
    let decl = FuncDecl {
        name: session.intern("answer"),
        ret: Ty::int(),
        params: vec![],
        variadic: false,
        locals: vec![],
        body: Some(Block {
            items: vec![BlockItem::Stmt(Stmt::Return(Some(Expr::num(42))))],
        }),
    };
    let func = relic::lower_function(&session, &target, &decl).unwrap();
    assert!(func.max_vreg.is_some());
    let out = print_function(&func, &session);
    check_output_contains(
        &out,
        &["prologue answer", "imm.int 42", "ret.int %r0", "epilogue answer", "maxreg=0"],
    );
    let first = out.lines().nth(1).unwrap();
    assert!(first.contains("prologue"), "prologue must lead the chain: {first}");
}

#[test]
fn assigning_to_a_function_designator_is_an_internal_error() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let target = TargetSpec::generic64();
    let decl = scaffold(&session, 0, vec![]);
    let mut cx = LowerCx::new(&session, &target, &decl).unwrap();

    let fn_ty = Ty::Func { ret: Box::new(Ty::Void), params: vec![], variadic: false };
    let target_expr = Expr::new(fn_ty, ExprKind::FuncName(session.intern("f")));
    let err = cx
        .lower_stmt(&assign(target_expr, Expr::num(0)))
        .unwrap_err();
    assert!(matches!(err, CompileError::NotAddressable { .. }));
}

#[test]
fn break_outside_a_loop_is_an_internal_error() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let target = TargetSpec::generic64();
    let decl = scaffold(&session, 0, vec![]);
    let mut cx = LowerCx::new(&session, &target, &decl).unwrap();
    assert!(matches!(cx.lower_stmt(&Stmt::Break), Err(CompileError::StrayBreak)));
    assert!(matches!(cx.lower_stmt(&Stmt::Continue), Err(CompileError::StrayContinue)));
}
