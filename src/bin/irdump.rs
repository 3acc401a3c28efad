// Debugging tool: lowers a set of built-in sample functions through the full middle
// tier and prints the resulting IR. The samples are hand-built typed syntax trees,
// standing in for the front end this crate does not contain. This binary owns all
// process-environment concerns (logger, CLI, exit codes); the library never touches
// them.

//! IR dump tool.
//!
//! Lowers built-in sample functions, optimizes them at the chosen level, and
//! prints the IR text. `RUST_LOG=debug` shows rule firings; `RUST_LOG=warn`
//! still surfaces the divide-by-zero diagnostic.

use bumpalo::Bump;
use clap::{Parser, ValueEnum};
use log::info;

use relic::ast::{
    BinOp, Block, BlockItem, CmpOp, Expr, ExprKind, FuncDecl, IncOp, Init, LocalVar, LogicOp,
    Param, Stmt, SwitchItem, Ty,
};
use relic::core::{CompilationSession, NullRewriter, TargetSpec};
use relic::ir::print_function;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TargetName {
    /// 64-bit, 12-bit operand immediates, fused memory forms.
    Generic64,
    /// 32-bit, 16-bit operand immediates, no fused memory forms.
    Generic32,
}

#[derive(Parser)]
#[command(name = "irdump", about = "Lower built-in sample functions and print their IR")]
struct Args {
    /// Optimization level; 0 disables the rule catalog, 3 enables memory fusion.
    #[arg(short = 'O', long = "opt-level", default_value_t = 3)]
    opt_level: u8,

    /// Target description to compile against.
    #[arg(long, value_enum, default_value = "generic64")]
    target: TargetName,

    /// Also print the raw IR before optimization.
    #[arg(long)]
    raw: bool,

    /// List the available samples and exit.
    #[arg(long)]
    list: bool,

    /// Sample functions to dump (all of them when empty).
    samples: Vec<String>,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let target = match args.target {
        TargetName::Generic64 => TargetSpec::generic64(),
        TargetName::Generic32 => TargetSpec::generic32(),
    };

    let samples = build_samples(&session);
    if args.list {
        for decl in &samples {
            println!("{}", session.symbol_name(decl.name));
        }
        return;
    }
    for wanted in &args.samples {
        if !samples.iter().any(|d| session.symbol_name(d.name) == wanted) {
            eprintln!("unknown sample '{wanted}'; use --list to see what exists");
            std::process::exit(2);
        }
    }

    for decl in &samples {
        let name = session.symbol_name(decl.name);
        if !args.samples.is_empty() && !args.samples.iter().any(|s| s == name) {
            continue;
        }
        let mut func = match relic::lower_function(&session, &target, decl) {
            Ok(func) => func,
            Err(e) => {
                eprintln!("internal compiler error: {e}");
                std::process::exit(1);
            }
        };
        if args.raw {
            println!("; raw");
            print!("{}", print_function(&func, &session));
        }
        let summary = relic::optimize(&mut func, &session, &target, &mut NullRewriter, args.opt_level);
        info!(
            "{name}: {} passes, {} changes, {} warnings",
            summary.passes, summary.changes, summary.div_zero_warnings
        );
        print!("{}", print_function(&func, &session));
        println!();
    }

    let stats = session.stats();
    info!(
        "session: {} functions, {} nodes, {} labels",
        stats.functions_lowered, stats.nodes_emitted, stats.labels_allocated
    );
}

// ---- sample construction helpers ---------------------------------------

fn param(i: u32, ty: Ty) -> Expr {
    Expr::new(ty, ExprKind::Param(i))
}

fn local(i: u32, ty: Ty) -> Expr {
    Expr::new(ty, ExprKind::Local(i))
}

fn bin(ty: Ty, op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::new(ty, ExprKind::Bin { op, lhs: Box::new(lhs), rhs: Box::new(rhs) })
}

fn cmp(op: CmpOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::new(Ty::int(), ExprKind::Cmp { op, lhs: Box::new(lhs), rhs: Box::new(rhs) })
}

fn ret(e: Expr) -> Stmt {
    Stmt::Return(Some(e))
}

fn body(items: Vec<BlockItem>) -> Option<Block> {
    Some(Block { items })
}

fn stmt(s: Stmt) -> BlockItem {
    BlockItem::Stmt(s)
}

/// The built-in sample set, one function per middle-tier feature cluster.
fn build_samples(session: &CompilationSession) -> Vec<FuncDecl> {
    let int = Ty::int();
    let uint = Ty::uint();
    let long = Ty::long();

    // int madd(int a, int b) { return a + b * 4; }
    let madd = FuncDecl {
        name: session.intern("madd"),
        ret: int.clone(),
        params: vec![
            Param { name: session.intern("a"), ty: int.clone() },
            Param { name: session.intern("b"), ty: int.clone() },
        ],
        variadic: false,
        locals: vec![],
        body: body(vec![stmt(ret(bin(
            int.clone(),
            BinOp::Add,
            param(0, int.clone()),
            bin(int.clone(), BinOp::Mul, param(1, int.clone()), Expr::num(4)),
        )))]),
    };

    // unsigned mask(unsigned x) { return x % 16; }
    let mask = FuncDecl {
        name: session.intern("mask"),
        ret: uint.clone(),
        params: vec![Param { name: session.intern("x"), ty: uint.clone() }],
        variadic: false,
        locals: vec![],
        body: body(vec![stmt(ret(bin(
            uint.clone(),
            BinOp::Rem,
            param(0, uint.clone()),
            Expr::new(uint.clone(), ExprKind::Num(16)),
        )))]),
    };

    // int both(int a, int b) { return a && b; }
    let both = FuncDecl {
        name: session.intern("both"),
        ret: int.clone(),
        params: vec![
            Param { name: session.intern("a"), ty: int.clone() },
            Param { name: session.intern("b"), ty: int.clone() },
        ],
        variadic: false,
        locals: vec![],
        body: body(vec![stmt(ret(Expr::new(
            int.clone(),
            ExprKind::Logic {
                op: LogicOp::And,
                lhs: Box::new(param(0, int.clone())),
                rhs: Box::new(param(1, int.clone())),
            },
        )))]),
    };

    // long pick(long *v, int i) { return v[i]; }
    let ptr_long = Ty::ptr_to(long.clone());
    let pick = FuncDecl {
        name: session.intern("pick"),
        ret: long.clone(),
        params: vec![
            Param { name: session.intern("v"), ty: ptr_long.clone() },
            Param { name: session.intern("i"), ty: int.clone() },
        ],
        variadic: false,
        locals: vec![],
        body: body(vec![stmt(ret(Expr::new(
            long.clone(),
            ExprKind::Index {
                base: Box::new(param(0, ptr_long)),
                index: Box::new(param(1, int.clone())),
            },
        )))]),
    };

    // int sumto(int n) { int t = 0; for (i = 1; i <= n; i++) t += i; return t; }
    let sumto = FuncDecl {
        name: session.intern("sumto"),
        ret: int.clone(),
        params: vec![Param { name: session.intern("n"), ty: int.clone() }],
        variadic: false,
        locals: vec![
            LocalVar { name: session.intern("t"), ty: int.clone(), vla_len: None },
            LocalVar { name: session.intern("i"), ty: int.clone(), vla_len: None },
        ],
        body: body(vec![
            BlockItem::Decl { local: 0, init: Some(Init::Scalar(Expr::num(0))) },
            BlockItem::Decl { local: 1, init: None },
            stmt(Stmt::For {
                init: Some(Box::new(Stmt::Expr(Expr::new(
                    int.clone(),
                    ExprKind::Assign {
                        target: Box::new(local(1, int.clone())),
                        value: Box::new(Expr::num(1)),
                    },
                )))),
                cond: Some(cmp(CmpOp::Le, local(1, int.clone()), param(0, int.clone()))),
                step: Some(Expr::new(
                    int.clone(),
                    ExprKind::IncDec {
                        op: IncOp::Inc,
                        prefix: false,
                        target: Box::new(local(1, int.clone())),
                    },
                )),
                body: Box::new(Stmt::Expr(Expr::new(
                    int.clone(),
                    ExprKind::OpAssign {
                        op: BinOp::Add,
                        target: Box::new(local(0, int.clone())),
                        value: Box::new(local(1, int.clone())),
                    },
                ))),
            }),
            stmt(ret(local(0, int.clone()))),
        ]),
    };

    // int dispatch(int cmd) { switch (cmd) { case 0: ...; case 1: ...; default: ... } }
    let dispatch = FuncDecl {
        name: session.intern("dispatch"),
        ret: int.clone(),
        params: vec![Param { name: session.intern("cmd"), ty: int.clone() }],
        variadic: false,
        locals: vec![],
        body: body(vec![stmt(Stmt::Switch {
            cond: param(0, int.clone()),
            body: vec![
                SwitchItem::Case(0),
                SwitchItem::Stmt(ret(Expr::num(1))),
                SwitchItem::Case(1),
                SwitchItem::Stmt(ret(Expr::num(2))),
                SwitchItem::Default,
                SwitchItem::Stmt(ret(Expr::num(0))),
            ],
        })]),
    };

    vec![madd, mask, both, pick, sumto, dispatch]
}
