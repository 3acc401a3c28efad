// Lvalue lowering: produce a chain that leaves the *address* of an expression in the
// top register, plus the addressability verdict the mutating forms check. Identifier
// places, dereferences, indexing, and member accesses are addressable; a function
// designator yields its code address but is not an assignment target. Anything else
// reaching here is a front-end contract violation.

//! Address lowering for assignable expressions.

use crate::ast::{ArrayLen, Expr, ExprKind, Ty};
use crate::core::error::{CompileError, CompileResult};
use crate::ir::node::{BinOp, Op, Place, SizeClass};

use super::LowerCx;

/// Verdict of lvalue lowering. The address is in the top register either
/// way; `assignable` is false for function designators, which may be taken
/// the address of but never stored through.
#[derive(Debug, Clone, Copy)]
pub struct Lvalue {
    pub assignable: bool,
}

const ASSIGNABLE: Lvalue = Lvalue { assignable: true };

impl<'a, 'arena> LowerCx<'a, 'arena> {
    /// Leave the address of `e` in the top register.
    ///
    /// Mutating callers (assignment, compound assignment, increment) must
    /// check the returned flag; a false verdict there is an internal error
    /// because the front end rejects such programs with a real diagnostic.
    pub fn lower_addr(&mut self, e: &Expr) -> CompileResult<Lvalue> {
        match &e.kind {
            ExprKind::Local(index) => {
                let var = self.local_var(*index)?;
                let is_vla = matches!(var.ty, Ty::Array { len: ArrayLen::Dynamic, .. });
                let dst = self.alloc_reg();
                self.emit(Op::Addr { dst, place: Place::Local(*index) });
                if is_vla {
                    // The slot holds the pointer produced by the stack
                    // allocation; the object lives behind it.
                    self.emit(Op::Load { dst, addr: dst, size: SizeClass::Ptr, signed: false });
                }
                Ok(ASSIGNABLE)
            }
            ExprKind::Param(index) => {
                let dst = self.alloc_reg();
                self.emit(Op::Addr { dst, place: Place::Param(*index) });
                Ok(ASSIGNABLE)
            }
            ExprKind::Global(sym) => {
                let dst = self.alloc_reg();
                self.emit(Op::Addr { dst, place: Place::Global(*sym) });
                Ok(ASSIGNABLE)
            }
            ExprKind::Str(bytes) => {
                let sym = self.session.intern_string_literal(bytes);
                let dst = self.alloc_reg();
                self.emit(Op::Addr { dst, place: Place::Global(sym) });
                Ok(ASSIGNABLE)
            }
            ExprKind::FuncName(sym) => {
                let dst = self.alloc_reg();
                self.emit(Op::AddrFunc { dst, name: *sym });
                Ok(Lvalue { assignable: false })
            }
            ExprKind::Deref(inner) => {
                // The pointer value is the address. Dereferencing a function
                // pointer yields the designator again, unassignable.
                self.lower_expr(inner)?;
                Ok(Lvalue { assignable: !matches!(e.ty, Ty::Func { .. }) })
            }
            ExprKind::Index { base, index } => {
                let unit = self.scale_unit(&base.ty)?;
                if matches!(base.ty, Ty::Array { .. }) {
                    self.lower_addr(base)?;
                } else {
                    self.lower_expr(base)?;
                }
                self.lower_expr(index)?;
                if unit != 1 {
                    self.bin_imm_top(BinOp::Mul, unit as i64, SizeClass::Ptr, false);
                }
                self.combine_top2(BinOp::Add, SizeClass::Ptr, false);
                Ok(ASSIGNABLE)
            }
            ExprKind::Member { base, offset } => {
                let lv = self.lower_addr(base)?;
                if *offset != 0 {
                    self.bin_imm_top(BinOp::Add, *offset as i64, SizeClass::Ptr, false);
                }
                Ok(lv)
            }
            _ => Err(CompileError::NotAddressable { what: expr_kind_name(e) }),
        }
    }

    pub(crate) fn local_var(&self, index: u32) -> CompileResult<&'a crate::ast::LocalVar> {
        self.decl
            .locals
            .get(index as usize)
            .ok_or_else(|| CompileError::BadLocalSlot {
                index,
                name: self.session.symbol_name(self.decl.name).to_string(),
            })
    }
}

/// Human-readable tag for the internal-error message.
pub(crate) fn expr_kind_name(e: &Expr) -> &'static str {
    match &e.kind {
        ExprKind::Num(_) => "integer constant",
        ExprKind::Str(_) => "string literal",
        ExprKind::Local(_) => "local variable",
        ExprKind::Param(_) => "parameter",
        ExprKind::Global(_) => "global variable",
        ExprKind::FuncName(_) => "function designator",
        ExprKind::Un { .. } => "unary expression",
        ExprKind::Bin { .. } => "arithmetic expression",
        ExprKind::Cmp { .. } => "comparison",
        ExprKind::Logic { .. } => "logical expression",
        ExprKind::Assign { .. } => "assignment",
        ExprKind::OpAssign { .. } => "compound assignment",
        ExprKind::IncDec { .. } => "increment expression",
        ExprKind::Call { .. } => "function call",
        ExprKind::Index { .. } => "index expression",
        ExprKind::Deref(_) => "dereference",
        ExprKind::AddrOf(_) => "address-of expression",
        ExprKind::Member { .. } => "member access",
        ExprKind::Ternary { .. } => "conditional expression",
        ExprKind::Cast(_) => "cast expression",
    }
}
