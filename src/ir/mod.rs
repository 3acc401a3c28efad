// This module is the hub for the IR data model: the node sum type and its predicates,
// the slab-backed doubly linked instruction list, the per-function container, and the
// emitter contract with the reference text renderer. The lowering engine produces
// these structures, the optimizer mutates them in place, and the external emitters
// consume them in list order.

//! The linear intermediate representation.

pub mod emit;
pub mod func;
pub mod list;
pub mod node;

pub use emit::{emit_function, format_op, print_function, IrEmitter, TextEmitter};
pub use func::{IrFunction, ParamInfo};
pub use list::{IrList, NodeId};
pub use node::{
    BinOp, BranchCond, CallRet, CallTarget, CmpOp, Op, Operand, Place, SizeClass, UnOp, VReg,
};
