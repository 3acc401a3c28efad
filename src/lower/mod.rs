// This module is the hub of the lowering engine. LowerCx carries everything one
// function's lowering needs — the session, the target description, the function
// descriptor, the IR list under construction (with a private tail cursor so emission
// is O(1) even though the store itself caches no tail), the per-statement virtual
// register counter, the loop/switch break-continue context, and the epilogue label.
// lower_function is the whole-function entry point producing the prologue + body +
// epilogue chain and deriving the maximum-register scalar. Expression, lvalue, and
// statement lowering live in the sibling modules and hang off LowerCx.

//! Lowering of the typed syntax tree into linear IR.
//!
//! Register discipline: the counter resets at each statement; every
//! value-producing node claims the next register, every two-operand node
//! consumes the two highest live registers and leaves its result in the lower
//! one. The most recently produced value is always in `creg - 1`.

mod expr;
mod lvalue;
mod stmt;

pub use lvalue::Lvalue;

use log::{debug, trace};

use crate::ast::{FuncDecl, Ty};
use crate::core::error::{CompileError, CompileResult};
use crate::core::session::{CompilationSession, LabelId};
use crate::core::target::TargetSpec;
use crate::ir::func::{IrFunction, ParamInfo};
use crate::ir::list::NodeId;
use crate::ir::node::{BinOp, CmpOp, Op, Operand, SizeClass, VReg};

/// Break/continue targets of the innermost enclosing loop or switch.
/// A switch contributes a break target only; `continue` skips past it.
struct LoopCx {
    brk: LabelId,
    cont: Option<LabelId>,
}

/// Mutable state threaded through the lowering of one function.
pub struct LowerCx<'a, 'arena> {
    pub(crate) session: &'a CompilationSession<'arena>,
    pub(crate) target: &'a TargetSpec,
    pub(crate) decl: &'a FuncDecl,
    func: IrFunction,
    tail: Option<NodeId>,
    creg: u32,
    loops: Vec<LoopCx>,
    ret_label: LabelId,
    emitted: u64,
}

/// Lower one function to its prologue + body + epilogue chain.
pub fn lower_function<'arena>(
    session: &CompilationSession<'arena>,
    target: &TargetSpec,
    decl: &FuncDecl,
) -> CompileResult<IrFunction> {
    let body = decl.body.as_ref().ok_or_else(|| CompileError::MissingBody {
        name: session.symbol_name(decl.name).to_string(),
    })?;
    trace!("lowering function {}", session.symbol_name(decl.name));

    let mut cx = LowerCx::new(session, target, decl)?;
    let name = decl.name;
    let ret_label = cx.ret_label;
    cx.emit(Op::Prologue { func: name });
    cx.lower_block(body)?;
    cx.emit(Op::Label(ret_label));
    cx.emit(Op::Epilogue { func: name });

    let func = cx.finish();
    debug!(
        "lowered {}: {} nodes, max vreg {:?}",
        session.symbol_name(decl.name),
        func.list.len(),
        func.max_vreg.map(|r| r.0)
    );
    Ok(func)
}

impl<'a, 'arena> LowerCx<'a, 'arena> {
    /// Set up lowering for one function. Fails if a parameter is not scalar
    /// (struct-by-value never reaches this tier).
    pub fn new(
        session: &'a CompilationSession<'arena>,
        target: &'a TargetSpec,
        decl: &'a FuncDecl,
    ) -> CompileResult<Self> {
        let mut params = Vec::with_capacity(decl.params.len());
        for p in &decl.params {
            let size = p.ty.size_class().ok_or(CompileError::Unsupported {
                what: "aggregate parameter passed by value",
            })?;
            params.push(ParamInfo { name: p.name, size, signed: p.ty.is_signed() });
        }
        let locals = decl.locals.iter().map(|v| v.ty.size(target)).collect();
        let ret_label = session.new_label();
        Ok(Self {
            session,
            target,
            decl,
            func: IrFunction::new(decl.name, params, locals),
            tail: None,
            creg: 0,
            loops: Vec::new(),
            ret_label,
            emitted: 0,
        })
    }

    /// Hand the finished function over, deriving the max-register scalar.
    pub fn finish(mut self) -> IrFunction {
        self.func.compute_max_vreg();
        self.session.note_function();
        self.session.note_nodes(self.emitted);
        self.func
    }

    /// Borrow the function under construction (tests inspect the chain).
    pub fn ir(&self) -> &IrFunction {
        &self.func
    }

    // ---- emission primitives -------------------------------------------

    pub(crate) fn emit(&mut self, op: Op) -> NodeId {
        self.emitted += 1;
        let id = match self.tail {
            Some(tail) => self.func.list.insert_after(tail, op),
            None => self.func.list.append(op),
        };
        self.tail = Some(id);
        id
    }

    /// Claim the next virtual register.
    pub(crate) fn alloc_reg(&mut self) -> VReg {
        let r = VReg(self.creg);
        self.creg += 1;
        r
    }

    /// The register holding the most recently produced value.
    pub(crate) fn top(&self) -> VReg {
        debug_assert!(self.creg > 0, "no live virtual registers");
        VReg(self.creg - 1)
    }

    /// Release the `n` highest live registers.
    pub(crate) fn pop(&mut self, n: u32) {
        debug_assert!(self.creg >= n);
        self.creg -= n;
    }

    pub(crate) fn reg_count(&self) -> u32 {
        self.creg
    }

    pub(crate) fn reset_regs(&mut self) {
        self.creg = 0;
    }

    /// Restore the counter to a known point (branchy lowerings rejoin paths
    /// that must produce their result in the same slot).
    pub(crate) fn set_regs(&mut self, n: u32) {
        self.creg = n;
    }

    pub(crate) fn new_label(&self) -> LabelId {
        self.session.new_label()
    }

    // ---- loop context --------------------------------------------------

    pub(crate) fn push_loop(&mut self, brk: LabelId, cont: Option<LabelId>) {
        self.loops.push(LoopCx { brk, cont });
    }

    pub(crate) fn pop_loop(&mut self) {
        self.loops.pop();
    }

    pub(crate) fn break_target(&self) -> CompileResult<LabelId> {
        self.loops.last().map(|l| l.brk).ok_or(CompileError::StrayBreak)
    }

    pub(crate) fn continue_target(&self) -> CompileResult<LabelId> {
        self.loops
            .iter()
            .rev()
            .find_map(|l| l.cont)
            .ok_or(CompileError::StrayContinue)
    }

    // ---- constant helpers ----------------------------------------------

    /// Load a constant into a fresh register, spilling to the literal pool
    /// when it lies outside the target's inline-load range.
    pub(crate) fn load_imm(&mut self, value: i64, size: SizeClass) -> VReg {
        let dst = self.alloc_reg();
        if self.target.inline_loadable(value) {
            self.emit(Op::LoadImm { dst, value, size });
        } else {
            let label = self.new_label();
            self.func.add_pool_constant(label, value);
            self.emit(Op::LoadPool { dst, label, size });
        }
        dst
    }

    /// Apply `top = top <op> constant`, going through a scratch register when
    /// the constant does not fit the target's operand-immediate range.
    pub(crate) fn bin_imm_top(&mut self, op: BinOp, value: i64, size: SizeClass, signed: bool) {
        let dst = self.top();
        if self.target.encodable_imm(value) {
            self.emit(Op::Bin {
                op,
                dst,
                lhs: Operand::Reg(dst),
                rhs: Operand::Imm(value),
                size,
                signed,
            });
        } else {
            let rhs = self.load_imm(value, size);
            self.emit(Op::Bin {
                op,
                dst,
                lhs: Operand::Reg(dst),
                rhs: Operand::Reg(rhs),
                size,
                signed,
            });
            self.pop(1);
        }
    }

    /// Consume the two highest live registers with a binary operation,
    /// leaving the result in the lower one.
    pub(crate) fn combine_top2(&mut self, op: BinOp, size: SizeClass, signed: bool) -> VReg {
        let rhs = self.top();
        self.pop(1);
        let dst = self.top();
        self.emit(Op::Bin {
            op,
            dst,
            lhs: Operand::Reg(dst),
            rhs: Operand::Reg(rhs),
            size,
            signed,
        });
        dst
    }

    /// Comparison twin of [`LowerCx::combine_top2`].
    pub(crate) fn combine_cmp_top2(&mut self, op: CmpOp, size: SizeClass, signed: bool) -> VReg {
        let rhs = self.top();
        self.pop(1);
        let dst = self.top();
        self.emit(Op::Cmp {
            op,
            dst,
            lhs: Operand::Reg(dst),
            rhs: Operand::Reg(rhs),
            size,
            signed,
        });
        dst
    }

    /// Scalar size class and signedness of a value of this type, arrays
    /// decaying to pointers.
    pub(crate) fn value_class(&self, ty: &Ty) -> CompileResult<(SizeClass, bool)> {
        match ty {
            Ty::Array { .. } => Ok((SizeClass::Ptr, false)),
            _ => self.scalar_of(ty),
        }
    }

    /// Scalar size class and signedness of a type, or the aggregate error.
    pub(crate) fn scalar_of(&self, ty: &Ty) -> CompileResult<(SizeClass, bool)> {
        match ty.size_class() {
            Some(size) => Ok((size, ty.is_signed())),
            None => Err(CompileError::AggregateScalarMismatch { bytes: ty.size(self.target) }),
        }
    }

    /// Element size used for pointer arithmetic scaling. `void *` steps in
    /// single bytes.
    pub(crate) fn scale_unit(&self, ty: &Ty) -> CompileResult<u64> {
        let elem = ty.pointee().ok_or(CompileError::Unsupported {
            what: "pointer arithmetic on a non-pointer type",
        })?;
        Ok(elem.size(self.target).max(1))
    }

    /// Reserve a synthetic scratch slot (discarded aggregate call results).
    pub(crate) fn scratch_local(&mut self, bytes: u64) -> u32 {
        self.func.add_local(bytes)
    }
}
