// This module defines the contract between the optimized IR and the architecture
// emitters: the IrEmitter trait (one callback per traversal event, with the node
// callback performing a total case analysis over the Op sum type) plus emit_function,
// the strictly-in-list-order driver. It also ships TextEmitter, the reference
// implementation that renders the IR in a stable one-line-per-node text form; the
// irdump binary prints it and the test suite asserts against it.

//! Emitter contract and the reference text renderer.

use crate::core::error::CompileResult;
use crate::core::session::CompilationSession;

use super::func::IrFunction;
use super::node::{BinOp, BranchCond, CallRet, CallTarget, CmpOp, Op, Operand, Place, UnOp};

/// The per-node visitor an architecture backend implements.
///
/// `emit_function` drives it over the list strictly in order. The node
/// callback must handle every [`Op`] variant; Rust's exhaustive matching
/// makes forgetting one a compile error in the backend, not a runtime one.
pub trait IrEmitter {
    fn begin_function(
        &mut self,
        _func: &IrFunction,
        _session: &CompilationSession,
    ) -> CompileResult<()> {
        Ok(())
    }

    fn node(&mut self, op: &Op, session: &CompilationSession) -> CompileResult<()>;

    fn end_function(
        &mut self,
        _func: &IrFunction,
        _session: &CompilationSession,
    ) -> CompileResult<()> {
        Ok(())
    }
}

/// Drive an emitter over one function in list order.
pub fn emit_function(
    func: &IrFunction,
    session: &CompilationSession,
    emitter: &mut dyn IrEmitter,
) -> CompileResult<()> {
    emitter.begin_function(func, session)?;
    for id in func.list.iter() {
        emitter.node(func.list.op(id), session)?;
    }
    emitter.end_function(func, session)
}

fn bin_name(op: BinOp, signed: bool) -> &'static str {
    match (op, signed) {
        (BinOp::Add, _) => "add",
        (BinOp::Sub, _) => "sub",
        (BinOp::Mul, _) => "mul",
        (BinOp::Div, true) => "div",
        (BinOp::Div, false) => "udiv",
        (BinOp::Rem, true) => "rem",
        (BinOp::Rem, false) => "urem",
        (BinOp::And, _) => "and",
        (BinOp::Or, _) => "or",
        (BinOp::Xor, _) => "xor",
        (BinOp::Shl, _) => "shl",
        (BinOp::Shr, true) => "sar",
        (BinOp::Shr, false) => "shr",
    }
}

fn cmp_name(op: CmpOp, signed: bool) -> &'static str {
    match (op, signed) {
        (CmpOp::Eq, _) => "seteq",
        (CmpOp::Ne, _) => "setne",
        (CmpOp::Lt, true) => "setlt",
        (CmpOp::Lt, false) => "setltu",
        (CmpOp::Le, true) => "setle",
        (CmpOp::Le, false) => "setleu",
        (CmpOp::Gt, true) => "setgt",
        (CmpOp::Gt, false) => "setgtu",
        (CmpOp::Ge, true) => "setge",
        (CmpOp::Ge, false) => "setgeu",
    }
}

fn operand(o: &Operand) -> String {
    match o {
        Operand::Reg(r) => r.to_string(),
        Operand::Imm(v) => v.to_string(),
    }
}

fn place(p: &Place, session: &CompilationSession) -> String {
    match p {
        Place::Local(i) => format!("local#{i}"),
        Place::Param(i) => format!("param#{i}"),
        Place::Global(sym) => format!("g:{}", session.symbol_name(*sym)),
    }
}

/// Render one node in the stable text form.
pub fn format_op(op: &Op, session: &CompilationSession) -> String {
    match op {
        Op::Nop => "nop".to_string(),
        Op::Label(l) => format!("{l}:"),
        Op::Jump(l) => format!("jmp {l}"),
        Op::Branch { cond, reg, target } => {
            let mnemonic = match cond {
                BranchCond::Zero => "bz",
                BranchCond::NonZero => "bnz",
            };
            format!("{mnemonic} {reg}, {target}")
        }
        Op::LoadImm { dst, value, size } => format!("{dst} = imm.{} {value}", size.tag()),
        Op::LoadPool { dst, label, size } => format!("{dst} = pool.{} {label}", size.tag()),
        Op::Move { dst, src, size } => format!("{dst} = mov.{} {src}", size.tag()),
        Op::Un { op, reg, size } => {
            let name = match op {
                UnOp::Neg => "neg",
                UnOp::Not => "not",
                UnOp::LogNot => "lognot",
            };
            format!("{reg} = {name}.{} {reg}", size.tag())
        }
        Op::Bin { op, dst, lhs, rhs, size, signed } => format!(
            "{dst} = {}.{} {}, {}",
            bin_name(*op, *signed),
            size.tag(),
            operand(lhs),
            operand(rhs)
        ),
        Op::Cmp { op, dst, lhs, rhs, size, signed } => format!(
            "{dst} = {}.{} {}, {}",
            cmp_name(*op, *signed),
            size.tag(),
            operand(lhs),
            operand(rhs)
        ),
        Op::Cast { reg, from, to, signed } => {
            let mode = if *signed { "s" } else { "u" };
            format!("{reg} = cast.{}.{}.{mode} {reg}", from.tag(), to.tag())
        }
        Op::Load { dst, addr, size, signed } => {
            let mnemonic = if *signed { "ld" } else { "ldu" };
            format!("{dst} = {mnemonic}.{} [{addr}]", size.tag())
        }
        Op::Store { src, addr, size } => format!("st.{} {src} -> [{addr}]", size.tag()),
        Op::Addr { dst, place: p } => format!("{dst} = addr {}", place(p, session)),
        Op::AddrFunc { dst, name } => format!("{dst} = addr fn:{}", session.symbol_name(*name)),
        Op::LoadPlace { dst, place: p, size, signed } => {
            let mnemonic = if *signed { "ld" } else { "ldu" };
            format!("{dst} = {mnemonic}.{} {}", size.tag(), place(p, session))
        }
        Op::StorePlace { src, place: p, size } => {
            format!("st.{} {src} -> {}", size.tag(), place(p, session))
        }
        Op::Call { target, args, ret } => {
            let callee = match target {
                CallTarget::Name(sym) => session.symbol_name(*sym).to_string(),
                CallTarget::Reg(r) => format!("[{r}]"),
            };
            let args: Vec<String> = args.iter().map(|(r, _)| r.to_string()).collect();
            let ret = match ret {
                CallRet::None => String::new(),
                CallRet::Value { dst, size } => format!(" -> {dst}.{}", size.tag()),
                CallRet::Aggregate { addr, bytes } => format!(" -> agg [{addr}], {bytes}b"),
            };
            format!("call {callee}({}){ret}", args.join(", "))
        }
        Op::StackAlloc { dst, bytes } => format!("{dst} = salloc {bytes}"),
        Op::BlockCopy { dst, src, bytes } => format!("blkcpy [{dst}] <- [{src}], {bytes}b"),
        Op::RetValue { src, size } => format!("ret.{} {src}", size.tag()),
        Op::RetAggregate { addr, bytes } => format!("ret.agg [{addr}], {bytes}b"),
        Op::Prologue { func } => format!("prologue {}", session.symbol_name(*func)),
        Op::Epilogue { func } => format!("epilogue {}", session.symbol_name(*func)),
        Op::ScopeEnter { bytes } => format!("scope+ {bytes}b"),
        Op::ScopeLeave { bytes } => format!("scope- {bytes}b"),
        Op::RawText(text) => text.clone(),
    }
}

/// Render a whole function: header, nodes, literal pool.
pub fn print_function(func: &IrFunction, session: &CompilationSession) -> String {
    let mut out = String::new();
    let params: Vec<String> = func
        .params
        .iter()
        .map(|p| format!("{}.{}", session.symbol_name(p.name), p.size.tag()))
        .collect();
    out.push_str(&format!(
        "func {}({})",
        session.symbol_name(func.name),
        params.join(", ")
    ));
    if let Some(max) = func.max_vreg {
        out.push_str(&format!(" maxreg={}", max.0));
    }
    out.push('\n');
    for id in func.list.iter() {
        let op = func.list.op(id);
        if op.is_label() {
            out.push_str(&format!("{}\n", format_op(op, session)));
        } else {
            out.push_str(&format!("    {}\n", format_op(op, session)));
        }
    }
    for (label, value) in &func.literal_pool {
        out.push_str(&format!("{label}: .const {value}\n"));
    }
    out
}

/// Reference emitter collecting the text rendering of a function.
#[derive(Default)]
pub struct TextEmitter {
    out: String,
}

impl TextEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(self) -> String {
        self.out
    }
}

impl IrEmitter for TextEmitter {
    fn begin_function(
        &mut self,
        func: &IrFunction,
        session: &CompilationSession,
    ) -> CompileResult<()> {
        self.out
            .push_str(&format!("func {}\n", session.symbol_name(func.name)));
        Ok(())
    }

    fn node(&mut self, op: &Op, session: &CompilationSession) -> CompileResult<()> {
        self.out.push_str(&format_op(op, session));
        self.out.push('\n');
        Ok(())
    }
}
