// Statement lowering: control-flow linearization (branches and labels from the
// structured statements), declarations with initializers, and returns. The virtual
// register counter resets at every statement boundary. Loops record their break and
// continue labels in the scoped loop context; a switch records only a break target,
// so continue inside a switch body reaches the enclosing loop.

//! Statement lowering.

use crate::ast::{ArrayLen, Block, BlockItem, Expr, ExprKind, Init, Stmt, SwitchItem, Ty};
use crate::core::error::{CompileError, CompileResult};
use crate::core::session::LabelId;
use crate::ir::node::{BinOp, BranchCond, CmpOp, Op, Operand, Place, SizeClass, VReg};

use super::LowerCx;

impl<'a, 'arena> LowerCx<'a, 'arena> {
    /// Lower one statement: a chain with an effect but no result register.
    pub fn lower_stmt(&mut self, s: &Stmt) -> CompileResult<()> {
        self.reset_regs();
        match s {
            Stmt::Empty => {}
            Stmt::Expr(e) => {
                if let ExprKind::Call { callee, args } = &e.kind {
                    if e.ty.is_aggregate() {
                        // Discarded aggregate result still needs a landing
                        // address under the caller-allocates convention.
                        let bytes = e.ty.size(self.target);
                        let slot = self.scratch_local(bytes);
                        let dst = self.alloc_reg();
                        self.emit(Op::Addr { dst, place: Place::Local(slot) });
                        self.lower_call_inner(callee, args, Some((dst, bytes)))?;
                        self.reset_regs();
                        return Ok(());
                    }
                }
                self.lower_expr(e)?;
                self.reset_regs();
            }
            Stmt::Block(block) => self.lower_block(block)?,
            Stmt::If { cond, then_stmt, else_stmt } => {
                self.lower_if(cond, then_stmt, else_stmt.as_deref())?
            }
            Stmt::While { cond, body } => self.lower_while(cond, body)?,
            Stmt::DoWhile { body, cond } => self.lower_do_while(body, cond)?,
            Stmt::For { init, cond, step, body } => {
                self.lower_for(init.as_deref(), cond.as_ref(), step.as_ref(), body)?
            }
            Stmt::Switch { cond, body } => self.lower_switch(cond, body)?,
            Stmt::Break => {
                let target = self.break_target()?;
                self.emit(Op::Jump(target));
            }
            Stmt::Continue => {
                let target = self.continue_target()?;
                self.emit(Op::Jump(target));
            }
            Stmt::Return(value) => self.lower_return(value.as_ref())?,
        }
        Ok(())
    }

    /// Lower a block: scope markers around the declarations and statements.
    pub(crate) fn lower_block(&mut self, block: &Block) -> CompileResult<()> {
        let mut bytes = 0u64;
        for item in &block.items {
            if let BlockItem::Decl { local, .. } = item {
                let var = self.local_var(*local)?;
                bytes += var.ty.size(self.target);
            }
        }
        if bytes > 0 {
            self.emit(Op::ScopeEnter { bytes });
        }
        for item in &block.items {
            match item {
                BlockItem::Decl { local, init } => self.lower_decl(*local, init.as_ref())?,
                BlockItem::Stmt(s) => self.lower_stmt(s)?,
            }
        }
        if bytes > 0 {
            self.emit(Op::ScopeLeave { bytes });
        }
        Ok(())
    }

    /// Evaluate a controlling expression and branch on it.
    fn lower_cond(&mut self, cond: &Expr, when: BranchCond, target: LabelId) -> CompileResult<()> {
        self.lower_expr(cond)?;
        let reg = self.top();
        self.emit(Op::Branch { cond: when, reg, target });
        self.pop(1);
        Ok(())
    }

    fn lower_if(
        &mut self,
        cond: &Expr,
        then_stmt: &Stmt,
        else_stmt: Option<&Stmt>,
    ) -> CompileResult<()> {
        match else_stmt {
            // No else branch: no intermediate jump or label.
            None => {
                let end = self.new_label();
                self.lower_cond(cond, BranchCond::Zero, end)?;
                self.lower_stmt(then_stmt)?;
                self.emit(Op::Label(end));
            }
            Some(else_stmt) => {
                let l_else = self.new_label();
                let end = self.new_label();
                self.lower_cond(cond, BranchCond::Zero, l_else)?;
                self.lower_stmt(then_stmt)?;
                self.emit(Op::Jump(end));
                self.emit(Op::Label(l_else));
                self.lower_stmt(else_stmt)?;
                self.emit(Op::Label(end));
            }
        }
        Ok(())
    }

    fn lower_while(&mut self, cond: &Expr, body: &Stmt) -> CompileResult<()> {
        let head = self.new_label();
        let exit = self.new_label();
        self.emit(Op::Label(head));
        self.lower_cond(cond, BranchCond::Zero, exit)?;
        self.push_loop(exit, Some(head));
        self.lower_stmt(body)?;
        self.pop_loop();
        self.emit(Op::Jump(head));
        self.emit(Op::Label(exit));
        Ok(())
    }

    /// The continue target is the test label, not the body head, so
    /// `continue` re-evaluates the condition as the language requires.
    fn lower_do_while(&mut self, body: &Stmt, cond: &Expr) -> CompileResult<()> {
        let head = self.new_label();
        let test = self.new_label();
        let exit = self.new_label();
        self.emit(Op::Label(head));
        self.push_loop(exit, Some(test));
        self.lower_stmt(body)?;
        self.pop_loop();
        self.emit(Op::Label(test));
        self.reset_regs();
        self.lower_cond(cond, BranchCond::NonZero, head)?;
        self.emit(Op::Label(exit));
        Ok(())
    }

    fn lower_for(
        &mut self,
        init: Option<&Stmt>,
        cond: Option<&Expr>,
        step: Option<&Expr>,
        body: &Stmt,
    ) -> CompileResult<()> {
        if let Some(init) = init {
            self.lower_stmt(init)?;
        }
        let head = self.new_label();
        let step_label = self.new_label();
        let exit = self.new_label();
        self.emit(Op::Label(head));
        if let Some(cond) = cond {
            self.reset_regs();
            self.lower_cond(cond, BranchCond::Zero, exit)?;
        }
        self.push_loop(exit, Some(step_label));
        self.lower_stmt(body)?;
        self.pop_loop();
        self.emit(Op::Label(step_label));
        if let Some(step) = step {
            self.reset_regs();
            self.lower_expr(step)?;
            self.reset_regs();
        }
        self.emit(Op::Jump(head));
        self.emit(Op::Label(exit));
        Ok(())
    }

    /// Linear equality-compare chain in source order; the matched body runs
    /// from its case label, fall-through included. No jump table.
    fn lower_switch(&mut self, cond: &Expr, body: &[SwitchItem]) -> CompileResult<()> {
        self.lower_expr(cond)?;
        let (size, signed) = self.value_class(&cond.ty)?;
        let scrut = self.top();
        let end = self.new_label();

        // One label per case marker, in source order.
        let labels: Vec<Option<LabelId>> = body
            .iter()
            .map(|item| match item {
                SwitchItem::Case(_) | SwitchItem::Default => Some(self.new_label()),
                SwitchItem::Stmt(_) => None,
            })
            .collect();

        let mut default_target = None;
        for (item, label) in body.iter().zip(&labels) {
            match (item, label) {
                (SwitchItem::Case(value), Some(label)) => {
                    let scratch = self.alloc_reg();
                    self.emit(Op::Move { dst: scratch, src: scrut, size });
                    if self.target.encodable_imm(*value) {
                        self.emit(Op::Cmp {
                            op: CmpOp::Eq,
                            dst: scratch,
                            lhs: Operand::Reg(scratch),
                            rhs: Operand::Imm(*value),
                            size,
                            signed,
                        });
                    } else {
                        let wide = self.load_imm(*value, size);
                        self.emit(Op::Cmp {
                            op: CmpOp::Eq,
                            dst: scratch,
                            lhs: Operand::Reg(scratch),
                            rhs: Operand::Reg(wide),
                            size,
                            signed,
                        });
                        self.pop(1);
                    }
                    self.emit(Op::Branch { cond: BranchCond::NonZero, reg: scratch, target: *label });
                    self.pop(1);
                }
                (SwitchItem::Default, Some(label)) => default_target = Some(*label),
                _ => {}
            }
        }
        self.emit(Op::Jump(default_target.unwrap_or(end)));
        self.pop(1);

        self.push_loop(end, None);
        for (item, label) in body.iter().zip(&labels) {
            match (item, label) {
                (SwitchItem::Case(_), Some(label)) | (SwitchItem::Default, Some(label)) => {
                    self.emit(Op::Label(*label));
                }
                (SwitchItem::Stmt(s), _) => self.lower_stmt(s)?,
                _ => {}
            }
        }
        self.pop_loop();
        self.emit(Op::Label(end));
        Ok(())
    }

    fn lower_return(&mut self, value: Option<&Expr>) -> CompileResult<()> {
        let ret_label = self.ret_label;
        match value {
            None => {
                self.emit(Op::Jump(ret_label));
            }
            Some(e) if e.ty.is_aggregate() => {
                let bytes = e.ty.size(self.target);
                if let ExprKind::Call { callee, args } = &e.kind {
                    let slot = self.scratch_local(bytes);
                    let dst = self.alloc_reg();
                    self.emit(Op::Addr { dst, place: Place::Local(slot) });
                    self.lower_call_inner(callee, args, Some((dst, bytes)))?;
                } else {
                    self.lower_addr(e)?;
                }
                let addr = self.top();
                self.emit(Op::RetAggregate { addr, bytes });
                self.pop(1);
                self.emit(Op::Jump(ret_label));
            }
            Some(e) => {
                let decl = self.decl;
                self.lower_expr(e)?;
                self.convert_to(&e.ty, &decl.ret)?;
                let (size, _) = self.scalar_of(&decl.ret)?;
                let src = self.top();
                self.emit(Op::RetValue { src, size });
                self.pop(1);
                self.emit(Op::Jump(ret_label));
            }
        }
        Ok(())
    }

    /// Lower one local declaration with its optional initializer.
    fn lower_decl(&mut self, local: u32, init: Option<&Init>) -> CompileResult<()> {
        self.reset_regs();
        let var = self.local_var(local)?;

        // Variable-length array: evaluate the length once, scale by the
        // element size, allocate, park the pointer in the backing slot.
        if let Some(len) = &var.vla_len {
            let elem_bytes = match &var.ty {
                Ty::Array { elem, len: ArrayLen::Dynamic } => elem.size(self.target).max(1),
                _ => {
                    return Err(CompileError::Unsupported {
                        what: "length expression on a non-dynamic local",
                    })
                }
            };
            self.lower_expr(len)?;
            let (have, signed) = self.value_class(&len.ty)?;
            if have != SizeClass::Ptr {
                let reg = self.top();
                self.emit(Op::Cast { reg, from: have, to: SizeClass::Ptr, signed });
            }
            if elem_bytes != 1 {
                self.bin_imm_top(BinOp::Mul, elem_bytes as i64, SizeClass::Ptr, false);
            }
            let ptr = self.top();
            self.emit(Op::StackAlloc { dst: ptr, bytes: ptr });
            let slot = self.alloc_reg();
            self.emit(Op::Addr { dst: slot, place: Place::Local(local) });
            self.emit(Op::Store { src: ptr, addr: slot, size: SizeClass::Ptr });
            self.pop(2);
            return Ok(());
        }

        match init {
            None => {}
            Some(Init::Scalar(value)) => {
                self.lower_expr(value)?;
                self.convert_to(&value.ty, &var.ty)?;
                let (size, _) = self.scalar_of(&var.ty)?;
                let addr = self.alloc_reg();
                self.emit(Op::Addr { dst: addr, place: Place::Local(local) });
                let src = VReg(addr.0 - 1);
                self.emit(Op::Store { src, addr, size });
                self.pop(2);
            }
            Some(Init::Str(bytes)) => {
                // One block copy from the pool; the pool entry is padded to
                // the array size so the trailing elements come out zero.
                let total = var.ty.size(self.target);
                let mut data = bytes.clone();
                data.resize(total as usize, 0);
                let sym = self.session.intern_string_literal(&data);
                let dst = self.alloc_reg();
                self.emit(Op::Addr { dst, place: Place::Local(local) });
                let src = self.alloc_reg();
                self.emit(Op::Addr { dst: src, place: Place::Global(sym) });
                self.emit(Op::BlockCopy { dst, src, bytes: total });
                self.pop(2);
            }
            Some(Init::List(elems)) => {
                let (elem_ty, len) = match &var.ty {
                    Ty::Array { elem, len: ArrayLen::Fixed(n) } => (elem.as_ref(), *n),
                    _ => {
                        return Err(CompileError::Unsupported {
                            what: "list initializer on a non-array local",
                        })
                    }
                };
                let elem_bytes = elem_ty.size(self.target);
                let (size, _) = self.scalar_of(elem_ty)?;
                // Element-by-element stores, unrolled to the declared
                // length, zero-filling past the initializer.
                for i in 0..len {
                    self.reset_regs();
                    match elems.get(i as usize) {
                        Some(value) => {
                            self.lower_expr(value)?;
                            self.convert_to(&value.ty, elem_ty)?;
                        }
                        None => {
                            self.load_imm(0, size);
                        }
                    }
                    let addr = self.alloc_reg();
                    self.emit(Op::Addr { dst: addr, place: Place::Local(local) });
                    let offset = i * elem_bytes;
                    if offset != 0 {
                        self.bin_imm_top(BinOp::Add, offset as i64, SizeClass::Ptr, false);
                    }
                    let src = VReg(addr.0 - 1);
                    self.emit(Op::Store { src, addr, size });
                    self.pop(2);
                }
            }
        }
        Ok(())
    }
}
