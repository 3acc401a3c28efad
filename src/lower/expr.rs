// Expression lowering. Evaluation is left-to-right under the register-stack
// discipline: binary forms lower the left side, then the right side, then combine the
// two top registers into the lower one. Short-circuit operators branch to shared
// labels and materialize a 0/1 result; the ternary lowers both arms at the same
// starting register so the result lands in one slot; pointer arithmetic inserts the
// element-size scaling multiply; calls lower arguments left-to-right with
// per-parameter size-class casts and pick one of the call shapes from the callee
// signature. Mutating forms (assignment, compound assignment, increment) go through
// lvalue lowering and reject non-addressable targets as internal errors.

//! Expression lowering.

use crate::ast::{Expr, ExprKind, IncOp, LogicOp, Ty, UnaryOp};
use crate::core::error::{CompileError, CompileResult};
use crate::ir::node::{
    BinOp, BranchCond, CallRet, CallTarget, CmpOp, Op, Operand, SizeClass, UnOp, VReg,
};

use super::lvalue::expr_kind_name;
use super::LowerCx;

/// Callee signature: return type, declared parameter types, variadic flag.
/// A call through a function pointer peels one level of indirection.
fn fn_sig(callee: &Expr) -> CompileResult<(&Ty, &[Ty], bool)> {
    let mut ty = &callee.ty;
    if let Ty::Ptr(inner) = ty {
        ty = inner;
    }
    match ty {
        Ty::Func { ret, params, variadic } => Ok((ret, params, *variadic)),
        _ => Err(CompileError::Unsupported { what: "call of a non-function value" }),
    }
}

fn unary_op(op: UnaryOp) -> UnOp {
    match op {
        UnaryOp::Neg => UnOp::Neg,
        UnaryOp::BitNot => UnOp::Not,
        UnaryOp::LogNot => UnOp::LogNot,
    }
}

impl<'a, 'arena> LowerCx<'a, 'arena> {
    /// Lower `e`, leaving its value in the top register.
    ///
    /// Aggregate-typed expressions (and function designators) produce their
    /// address instead; that is what their value decays to everywhere this
    /// tier cares about.
    pub fn lower_expr(&mut self, e: &Expr) -> CompileResult<()> {
        match &e.kind {
            ExprKind::Num(value) => {
                let (size, _) = self.scalar_of(&e.ty)?;
                self.load_imm(*value, size);
            }
            ExprKind::Str(_) => {
                self.lower_addr(e)?;
            }
            ExprKind::Local(_) | ExprKind::Param(_) | ExprKind::Global(_) => {
                self.lower_addr(e)?;
                if !e.ty.is_aggregate() {
                    self.load_scalar_value(e)?;
                }
            }
            ExprKind::FuncName(sym) => {
                let dst = self.alloc_reg();
                self.emit(Op::AddrFunc { dst, name: *sym });
            }
            ExprKind::Un { op, expr } => {
                self.lower_expr(expr)?;
                let (size, _) = self.value_class(&expr.ty)?;
                let reg = self.top();
                self.emit(Op::Un { op: unary_op(*op), reg, size });
            }
            ExprKind::Bin { op, lhs, rhs } => self.lower_bin(e, *op, lhs, rhs)?,
            ExprKind::Cmp { op, lhs, rhs } => {
                self.lower_expr(lhs)?;
                self.lower_expr(rhs)?;
                let (size, signed) = self.value_class(&lhs.ty)?;
                self.combine_cmp_top2(*op, size, signed);
            }
            ExprKind::Logic { op, lhs, rhs } => self.lower_logic(*op, lhs, rhs)?,
            ExprKind::Assign { target, value } => self.lower_assign(target, value)?,
            ExprKind::OpAssign { op, target, value } => {
                self.lower_op_assign(*op, target, value)?
            }
            ExprKind::IncDec { op, prefix, target } => {
                self.lower_incdec(*op, *prefix, target)?
            }
            ExprKind::Call { callee, args } => {
                self.lower_call_inner(callee, args, None)?;
            }
            ExprKind::Index { .. } | ExprKind::Deref(_) | ExprKind::Member { .. } => {
                self.lower_addr(e)?;
                if !e.ty.is_aggregate() && !matches!(e.ty, Ty::Func { .. }) {
                    self.load_scalar_value(e)?;
                }
            }
            ExprKind::AddrOf(inner) => {
                self.lower_addr(inner)?;
            }
            ExprKind::Ternary { cond, then_val, else_val } => {
                self.lower_ternary(cond, then_val, else_val)?
            }
            ExprKind::Cast(inner) => {
                self.lower_expr(inner)?;
                self.convert_to(&inner.ty, &e.ty)?;
            }
        }
        Ok(())
    }

    /// Replace the address in the top register with the scalar it points at.
    fn load_scalar_value(&mut self, e: &Expr) -> CompileResult<()> {
        let (size, signed) = self.scalar_of(&e.ty)?;
        let dst = self.top();
        self.emit(Op::Load { dst, addr: dst, size, signed });
        Ok(())
    }

    /// Compare the top register against zero, leaving 0/1 in place.
    pub(crate) fn normalize_bool(&mut self, size: SizeClass) {
        let dst = self.top();
        self.emit(Op::Cmp {
            op: CmpOp::Ne,
            dst,
            lhs: Operand::Reg(dst),
            rhs: Operand::Imm(0),
            size,
            signed: false,
        });
    }

    /// Convert the value in the top register from one type to another:
    /// nothing for void, a zero-comparison for bool targets, a size cast when
    /// the classes differ.
    pub(crate) fn convert_to(&mut self, from_ty: &Ty, to_ty: &Ty) -> CompileResult<()> {
        if matches!(to_ty, Ty::Void) {
            return Ok(());
        }
        if matches!(to_ty, Ty::Bool) {
            if !matches!(from_ty, Ty::Bool) {
                let (size, _) = self.value_class(from_ty)?;
                self.normalize_bool(size);
            }
            return Ok(());
        }
        let (from, signed) = self.value_class(from_ty)?;
        let (to, _) = self.scalar_of(to_ty)?;
        if from != to {
            let reg = self.top();
            self.emit(Op::Cast { reg, from, to, signed });
        }
        Ok(())
    }

    fn lower_bin(&mut self, e: &Expr, op: BinOp, lhs: &Expr, rhs: &Expr) -> CompileResult<()> {
        let lptr = lhs.ty.pointee().is_some();
        let rptr = rhs.ty.pointee().is_some();
        match (op, lptr, rptr) {
            // Pointer difference: subtract raw addresses, then divide by the
            // element size.
            (BinOp::Sub, true, true) => {
                self.lower_expr(lhs)?;
                self.lower_expr(rhs)?;
                self.combine_top2(BinOp::Sub, SizeClass::Ptr, false);
                let unit = self.scale_unit(&lhs.ty)?;
                if unit != 1 {
                    let (size, _) = self.scalar_of(&e.ty)?;
                    self.bin_imm_top(BinOp::Div, unit as i64, size, true);
                }
            }
            // pointer +/- integer: scale the integer side first.
            (BinOp::Add | BinOp::Sub, true, false) => {
                self.lower_expr(lhs)?;
                self.lower_expr(rhs)?;
                let unit = self.scale_unit(&lhs.ty)?;
                if unit != 1 {
                    self.bin_imm_top(BinOp::Mul, unit as i64, SizeClass::Ptr, false);
                }
                self.combine_top2(op, SizeClass::Ptr, false);
            }
            (BinOp::Add, false, true) => {
                self.lower_expr(lhs)?;
                let unit = self.scale_unit(&rhs.ty)?;
                if unit != 1 {
                    self.bin_imm_top(BinOp::Mul, unit as i64, SizeClass::Ptr, false);
                }
                self.lower_expr(rhs)?;
                self.combine_top2(op, SizeClass::Ptr, false);
            }
            _ => {
                self.lower_expr(lhs)?;
                self.lower_expr(rhs)?;
                let (size, signed) = self.value_class(&e.ty)?;
                self.combine_top2(op, size, signed);
            }
        }
        Ok(())
    }

    /// Short-circuit lowering. `&&` needs one shared label: a zero left or
    /// right operand jumps there with the zero still in the result register,
    /// and the fall-through path overwrites it with 1. `||` needs two labels
    /// because a non-zero operand is not yet the canonical 1.
    fn lower_logic(&mut self, op: LogicOp, lhs: &Expr, rhs: &Expr) -> CompileResult<()> {
        match op {
            LogicOp::And => {
                let done = self.new_label();
                self.lower_expr(lhs)?;
                let reg = self.top();
                self.emit(Op::Branch { cond: BranchCond::Zero, reg, target: done });
                self.pop(1);
                self.lower_expr(rhs)?;
                let reg = self.top();
                self.emit(Op::Branch { cond: BranchCond::Zero, reg, target: done });
                self.pop(1);
                let dst = self.alloc_reg();
                self.emit(Op::LoadImm { dst, value: 1, size: SizeClass::Int });
                self.emit(Op::Label(done));
            }
            LogicOp::Or => {
                let is_true = self.new_label();
                let done = self.new_label();
                self.lower_expr(lhs)?;
                let reg = self.top();
                self.emit(Op::Branch { cond: BranchCond::NonZero, reg, target: is_true });
                self.pop(1);
                self.lower_expr(rhs)?;
                let reg = self.top();
                self.emit(Op::Branch { cond: BranchCond::NonZero, reg, target: is_true });
                self.pop(1);
                let dst = self.alloc_reg();
                self.emit(Op::LoadImm { dst, value: 0, size: SizeClass::Int });
                self.emit(Op::Jump(done));
                self.emit(Op::Label(is_true));
                self.emit(Op::LoadImm { dst, value: 1, size: SizeClass::Int });
                self.emit(Op::Label(done));
            }
        }
        Ok(())
    }

    /// Both arms start at the same register so the result lands in one slot
    /// no matter which path ran.
    fn lower_ternary(&mut self, cond: &Expr, then_val: &Expr, else_val: &Expr) -> CompileResult<()> {
        let l_else = self.new_label();
        let l_end = self.new_label();
        self.lower_expr(cond)?;
        let reg = self.top();
        self.emit(Op::Branch { cond: BranchCond::Zero, reg, target: l_else });
        self.pop(1);
        let base = self.reg_count();
        self.lower_expr(then_val)?;
        self.emit(Op::Jump(l_end));
        self.set_regs(base);
        self.emit(Op::Label(l_else));
        self.lower_expr(else_val)?;
        self.emit(Op::Label(l_end));
        Ok(())
    }

    fn lower_assign(&mut self, target: &Expr, value: &Expr) -> CompileResult<()> {
        if target.ty.is_aggregate() {
            let bytes = target.ty.size(self.target);
            if let ExprKind::Call { callee, args } = &value.kind {
                // Aggregate-returning call: the caller computes the
                // destination address and the call writes through it.
                let lv = self.lower_addr(target)?;
                if !lv.assignable {
                    return Err(CompileError::NotAddressable { what: expr_kind_name(target) });
                }
                let addr = self.top();
                self.lower_call_inner(callee, args, Some((addr, bytes)))?;
                return Ok(());
            }
            let lv = self.lower_addr(target)?;
            if !lv.assignable {
                return Err(CompileError::NotAddressable { what: expr_kind_name(target) });
            }
            self.lower_addr(value)?;
            let src = self.top();
            let dst = VReg(src.0 - 1);
            self.emit(Op::BlockCopy { dst, src, bytes });
            self.pop(1);
            return Ok(());
        }

        self.lower_expr(value)?;
        self.convert_to(&value.ty, &target.ty)?;
        let lv = self.lower_addr(target)?;
        if !lv.assignable {
            return Err(CompileError::NotAddressable { what: expr_kind_name(target) });
        }
        let (size, _) = self.scalar_of(&target.ty)?;
        let addr = self.top();
        let src = VReg(addr.0 - 1);
        self.emit(Op::Store { src, addr, size });
        self.pop(1);
        Ok(())
    }

    fn lower_op_assign(&mut self, op: BinOp, target: &Expr, value: &Expr) -> CompileResult<()> {
        let lv = self.lower_addr(target)?;
        if !lv.assignable {
            return Err(CompileError::NotAddressable { what: expr_kind_name(target) });
        }
        let addr = self.top();
        let (size, signed) = self.scalar_of(&target.ty)?;
        let cur = self.alloc_reg();
        self.emit(Op::Load { dst: cur, addr, size, signed });
        self.lower_expr(value)?;
        if target.ty.is_pointer() && matches!(op, BinOp::Add | BinOp::Sub) {
            let unit = self.scale_unit(&target.ty)?;
            if unit != 1 {
                self.bin_imm_top(BinOp::Mul, unit as i64, SizeClass::Ptr, false);
            }
        }
        let rhs = self.top();
        self.emit(Op::Bin {
            op,
            dst: cur,
            lhs: Operand::Reg(cur),
            rhs: Operand::Reg(rhs),
            size,
            signed,
        });
        self.pop(1);
        self.emit(Op::Store { src: cur, addr, size });
        self.emit(Op::Move { dst: addr, src: cur, size });
        self.pop(1);
        Ok(())
    }

    fn lower_incdec(&mut self, op: IncOp, prefix: bool, target: &Expr) -> CompileResult<()> {
        let lv = self.lower_addr(target)?;
        if !lv.assignable {
            return Err(CompileError::NotAddressable { what: expr_kind_name(target) });
        }
        let addr = self.top();
        let (size, signed) = self.scalar_of(&target.ty)?;
        let delta = if target.ty.is_pointer() {
            self.scale_unit(&target.ty)? as i64
        } else {
            1
        };
        let bop = match op {
            IncOp::Inc => BinOp::Add,
            IncOp::Dec => BinOp::Sub,
        };
        let cur = self.alloc_reg();
        self.emit(Op::Load { dst: cur, addr, size, signed });
        if prefix {
            self.bin_imm_top(bop, delta, size, signed);
            self.emit(Op::Store { src: cur, addr, size });
            self.emit(Op::Move { dst: addr, src: cur, size });
            self.pop(1);
        } else {
            let upd = self.alloc_reg();
            self.emit(Op::Move { dst: upd, src: cur, size });
            self.bin_imm_top(bop, delta, size, signed);
            self.emit(Op::Store { src: upd, addr, size });
            self.emit(Op::Move { dst: addr, src: cur, size });
            self.pop(2);
        }
        Ok(())
    }

    /// Lower a call. Arguments go left-to-right into consecutive registers,
    /// each cast to its declared parameter size class; variadic and excess
    /// arguments get the default int promotion. The scalar result, if any,
    /// lands in the first register the call chain claimed.
    pub(crate) fn lower_call_inner(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        agg_dest: Option<(VReg, u64)>,
    ) -> CompileResult<()> {
        let (ret_ty, params, _variadic) = fn_sig(callee)?;
        let entry = self.reg_count();

        let target = match &callee.kind {
            ExprKind::FuncName(sym) => CallTarget::Name(*sym),
            _ => {
                self.lower_expr(callee)?;
                CallTarget::Reg(self.top())
            }
        };

        let mut lowered = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            self.lower_expr(arg)?;
            let (have, signed) = self.value_class(&arg.ty)?;
            let want = match params.get(i) {
                Some(p) => p.size_class().ok_or(CompileError::Unsupported {
                    what: "aggregate parameter passed by value",
                })?,
                // Default promotion for variadic/excess arguments.
                None => match have {
                    SizeClass::Byte | SizeClass::Char | SizeClass::Short => SizeClass::Int,
                    other => other,
                },
            };
            if want != have {
                let reg = self.top();
                self.emit(Op::Cast { reg, from: have, to: want, signed });
            }
            lowered.push((self.top(), want));
        }

        let ret = match agg_dest {
            Some((addr, bytes)) => CallRet::Aggregate { addr, bytes },
            None => {
                if matches!(ret_ty, Ty::Void) {
                    CallRet::None
                } else if ret_ty.is_aggregate() {
                    return Err(CompileError::Unsupported {
                        what: "aggregate call result outside an assignment",
                    });
                } else {
                    let (size, _) = self.scalar_of(ret_ty)?;
                    CallRet::Value { dst: VReg(entry), size }
                }
            }
        };
        let produces_value = matches!(ret, CallRet::Value { .. });
        self.emit(Op::Call { target, args: lowered, ret });
        self.set_regs(if produces_value { entry + 1 } else { entry });
        Ok(())
    }
}
