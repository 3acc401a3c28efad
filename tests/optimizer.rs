//! Integration tests for the fixed-point local optimizer.
//!
//! Each scenario lowers a small function through the public pipeline and
//! asserts on the optimized IR text and the run summary.

use bumpalo::Bump;
use relic::ast::{
    BinOp, Block, BlockItem, Expr, ExprKind, FuncDecl, Param, Stmt, Ty,
};
use relic::core::{CompilationSession, NullRewriter, Symbol, TargetRewriter, TargetSpec};
use relic::ir::{print_function, CallRet, CallTarget, IrFunction, Op, Operand};
use relic::{OptSummary, VReg};

fn check_output_contains(output: &str, patterns: &[&str]) {
    for pattern in patterns {
        assert!(
            output.contains(pattern),
            "Output missing expected pattern: '{pattern}'\nFull output:\n{output}"
        );
    }
}

fn param(i: u32, ty: Ty) -> Expr {
    Expr::new(ty, ExprKind::Param(i))
}

fn bin(ty: Ty, op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::new(ty, ExprKind::Bin { op, lhs: Box::new(lhs), rhs: Box::new(rhs) })
}

/// `<ret> probe(<params>) { return <e>; }`
fn returning(session: &CompilationSession, ret: Ty, params: Vec<(&str, Ty)>, e: Expr) -> FuncDecl {
    FuncDecl {
        name: session.intern("probe"),
        ret,
        params: params
            .into_iter()
            .map(|(name, ty)| Param { name: session.intern(name), ty })
            .collect(),
        variadic: false,
        locals: vec![],
        body: Some(Block {
            items: vec![BlockItem::Stmt(Stmt::Return(Some(e)))],
        }),
    }
}

fn compile(
    session: &CompilationSession,
    target: &TargetSpec,
    decl: &FuncDecl,
    level: u8,
) -> (IrFunction, OptSummary) {
    relic::compile_function(session, target, &mut NullRewriter, level, decl).unwrap()
}

#[test]
fn constant_multiply_folds_into_the_add() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let target = TargetSpec::generic64();
    // a + 2 * 3
    let decl = returning(
        &session,
        Ty::int(),
        vec![("a", Ty::int())],
        bin(
            Ty::int(),
            BinOp::Add,
            param(0, Ty::int()),
            bin(Ty::int(), BinOp::Mul, Expr::num(2), Expr::num(3)),
        ),
    );
    let (func, _) = compile(&session, &target, &decl, 3);
    let out = print_function(&func, &session);
    assert!(!out.contains("mul"), "multiply must fold away:\n{out}");
    check_output_contains(&out, &["add.int %r0, 6"]);
}

#[test]
fn unsigned_modulo_by_sixteen_becomes_and_fifteen() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let target = TargetSpec::generic64();
    let decl = returning(
        &session,
        Ty::uint(),
        vec![("x", Ty::uint())],
        bin(
            Ty::uint(),
            BinOp::Rem,
            param(0, Ty::uint()),
            Expr::new(Ty::uint(), ExprKind::Num(16)),
        ),
    );
    let (func, _) = compile(&session, &target, &decl, 3);
    let out = print_function(&func, &session);
    assert!(!out.contains("urem"), "modulo must reduce:\n{out}");
    check_output_contains(&out, &["and.int %r0, 15"]);
}

#[test]
fn literal_zero_divisor_survives_with_one_warning() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let target = TargetSpec::generic64();
    let decl = returning(
        &session,
        Ty::int(),
        vec![("x", Ty::int())],
        bin(Ty::int(), BinOp::Div, param(0, Ty::int()), Expr::num(0)),
    );
    let (func, summary) = compile(&session, &target, &decl, 3);
    assert_eq!(summary.div_zero_warnings, 1);
    let out = print_function(&func, &session);
    check_output_contains(&out, &["div.int %r0, 0"]);
}

#[test]
fn optimizer_reaches_a_fixed_point() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let target = TargetSpec::generic64();
    let decl = returning(
        &session,
        Ty::int(),
        vec![("a", Ty::int())],
        bin(
            Ty::int(),
            BinOp::Add,
            param(0, Ty::int()),
            bin(Ty::int(), BinOp::Mul, Expr::num(2), Expr::num(3)),
        ),
    );
    let (mut func, first) = compile(&session, &target, &decl, 3);
    assert!(first.changes > 0);
    // A second run over already-optimized IR must change nothing.
    let second = relic::optimize(&mut func, &session, &target, &mut NullRewriter, 3);
    assert_eq!(second.changes, 0);
    assert_eq!(second.passes, 1);
}

#[test]
fn memory_fusion_needs_level_three_and_target_support() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let decl = returning(
        &session,
        Ty::int(),
        vec![("a", Ty::int())],
        param(0, Ty::int()),
    );

    let target = TargetSpec::generic64();
    let (func, _) = compile(&session, &target, &decl, 3);
    let out = print_function(&func, &session);
    check_output_contains(&out, &["ld.int param#0"]);
    assert!(!out.contains("addr param#0"), "address node must fuse away:\n{out}");

    // Level 2: the rule stays off.
    let (func, _) = compile(&session, &target, &decl, 2);
    let out = print_function(&func, &session);
    check_output_contains(&out, &["addr param#0", "ld.int [%r0]"]);

    // Level 3 on a target without the fused forms: still off.
    let target32 = TargetSpec::generic32();
    let (func, _) = compile(&session, &target32, &decl, 3);
    let out = print_function(&func, &session);
    check_output_contains(&out, &["addr param#0", "ld.int [%r0]"]);
}

#[test]
fn level_zero_disables_the_rule_catalog() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let target = TargetSpec::generic64();
    let decl = returning(
        &session,
        Ty::int(),
        vec![("a", Ty::int())],
        bin(
            Ty::int(),
            BinOp::Add,
            param(0, Ty::int()),
            bin(Ty::int(), BinOp::Mul, Expr::num(2), Expr::num(3)),
        ),
    );
    let (func, summary) = compile(&session, &target, &decl, 0);
    assert_eq!(summary.changes, 0);
    assert_eq!(summary.passes, 1);
    let out = print_function(&func, &session);
    check_output_contains(&out, &["mul.int", "imm.int 2", "imm.int 3"]);
}

/// Legalization rewriter: a target without a hardware signed divide routes
/// it through a runtime helper call.
struct DivHelper {
    helper: Symbol,
}

impl TargetRewriter for DivHelper {
    fn rewrite(&mut self, func: &mut IrFunction, _spec: &TargetSpec) -> usize {
        let mut changed = 0;
        let mut cur = func.list.head();
        while let Some(id) = cur {
            cur = func.list.next(id);
            if let Op::Bin {
                op: BinOp::Div,
                dst,
                lhs: Operand::Reg(l),
                rhs: Operand::Reg(r),
                size,
                signed: true,
            } = *func.list.op(id)
            {
                *func.list.op_mut(id) = Op::Call {
                    target: CallTarget::Name(self.helper),
                    args: vec![(l, size), (r, size)],
                    ret: CallRet::Value { dst, size },
                };
                changed += 1;
            }
        }
        changed
    }
}

#[test]
fn target_rewrite_hook_legalizes_divides() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let target = TargetSpec::generic64();
    let decl = returning(
        &session,
        Ty::int(),
        vec![("a", Ty::int()), ("b", Ty::int())],
        bin(Ty::int(), BinOp::Div, param(0, Ty::int()), param(1, Ty::int())),
    );
    let mut rewriter = DivHelper { helper: session.intern("__divsi3") };
    let (func, summary) =
        relic::compile_function(&session, &target, &mut rewriter, 3, &decl).unwrap();
    assert!(summary.changes > 0);
    let out = print_function(&func, &session);
    assert!(!out.contains("div.int"), "divide must be legalized away:\n{out}");
    check_output_contains(&out, &["call __divsi3(%r0, %r1) -> %r0.int"]);
}

/// Hook-order probe: fires one in-loop legalization, then stamps the list in
/// the post hook.
#[derive(Default)]
struct MarkerRewriter {
    loop_runs: usize,
    legalized: bool,
    post_runs: usize,
}

impl TargetRewriter for MarkerRewriter {
    fn rewrite(&mut self, func: &mut IrFunction, _spec: &TargetSpec) -> usize {
        self.loop_runs += 1;
        if self.legalized {
            return 0;
        }
        self.legalized = true;
        func.list.append(Op::RawText(".legalized".to_string()));
        1
    }

    fn post_rewrite(&mut self, func: &mut IrFunction, _spec: &TargetSpec) {
        self.post_runs += 1;
        func.list.append(Op::RawText(".post".to_string()));
    }
}

#[test]
fn rewrite_runs_in_the_loop_and_post_rewrite_runs_once() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let target = TargetSpec::generic64();
    let decl = returning(&session, Ty::int(), vec![], Expr::num(1));
    let mut rewriter = MarkerRewriter::default();
    let (func, summary) =
        relic::compile_function(&session, &target, &mut rewriter, 3, &decl).unwrap();
    // The in-loop hook participates in the fixed point: it ran again after
    // its own change, and the loop only stopped once it stayed quiet.
    assert!(rewriter.loop_runs >= 2);
    assert_eq!(rewriter.post_runs, 1);
    assert_eq!(summary.passes as usize, rewriter.loop_runs);
    let out = print_function(&func, &session);
    check_output_contains(&out, &[".legalized", ".post"]);
}

#[test]
fn large_constants_spill_to_the_literal_pool() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let target = TargetSpec::generic64();
    let wide = 0x1_0000_0000i64;
    let decl = returning(
        &session,
        Ty::long(),
        vec![],
        Expr::new(Ty::long(), ExprKind::Num(wide)),
    );
    let (func, _) = compile(&session, &target, &decl, 3);
    assert_eq!(func.literal_pool.len(), 1);
    assert_eq!(func.literal_pool[0].1, wide);
    let out = print_function(&func, &session);
    check_output_contains(&out, &["pool.long", ".const 4294967296"]);
}

#[test]
fn register_stack_watermark_is_reported() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let target = TargetSpec::generic64();
    let decl = returning(
        &session,
        Ty::int(),
        vec![("a", Ty::int()), ("b", Ty::int())],
        bin(
            Ty::int(),
            BinOp::Add,
            param(0, Ty::int()),
            bin(Ty::int(), BinOp::Sub, param(1, Ty::int()), Expr::num(1)),
        ),
    );
    let (func, _) = compile(&session, &target, &decl, 0);
    // Unoptimized: a (r0), b (r1), 1 (r2).
    assert_eq!(func.max_vreg, Some(VReg(2)));
}
