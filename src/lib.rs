// Crate root of relic, the middle tier of a small retargetable C-like compiler:
// lowering of a fully type-checked syntax tree into a linear virtual-register IR and
// a fixed-point local peephole optimizer. The front end and the per-architecture
// emitters are external collaborators; they meet this crate at the ast module on one
// side and the IrEmitter trait on the other. compile_function is the convenience
// entry running one function through both stages.

//! relic - Retargetable Linear IR Core.
//!
//! relic lowers a typed C-like syntax tree into a linear,
//! architecture-neutral IR over virtual registers, then rewrites that IR with
//! a fixed-point peephole optimizer before an architecture-specific emitter
//! consumes it.
//!
//! # Primary Usage
//!
//! ```
//! use bumpalo::Bump;
//! use relic::ast::{Block, BlockItem, Expr, FuncDecl, Stmt, Ty};
//! use relic::core::{CompilationSession, NullRewriter, TargetSpec};
//!
//! // One session per translation unit, arena-backed.
//! let arena = Bump::new();
//! let session = CompilationSession::new(&arena);
//! let target = TargetSpec::generic64();
//!
//! let decl = FuncDecl {
//!     name: session.intern("answer"),
//!     ret: Ty::int(),
//!     params: vec![],
//!     variadic: false,
//!     locals: vec![],
//!     body: Some(Block {
//!         items: vec![BlockItem::Stmt(Stmt::Return(Some(Expr::num(42))))],
//!     }),
//! };
//!
//! let (func, summary) =
//!     relic::compile_function(&session, &target, &mut NullRewriter, 3, &decl)?;
//! assert!(func.max_vreg.is_some());
//! assert_eq!(summary.div_zero_warnings, 0);
//! # Ok::<(), relic::core::CompileError>(())
//! ```
//!
//! # Architecture
//!
//! - [`ast`] - Typed syntax tree handed over by the front end
//! - [`core`] - Shared infrastructure (session, errors, target description)
//! - [`ir`] - The node store, per-function container, emitter contract
//! - [`lower`] - Lowering engine with the register-stack discipline
//! - [`opt`] - Fixed-point local optimizer and its rule catalog

pub mod ast;
pub mod core;
pub mod ir;
pub mod lower;
pub mod opt;

// Re-export the types one needs to drive the pipeline.
pub use crate::core::{
    CompilationSession, CompileError, CompileResult, LabelId, NullRewriter, SessionStats, Symbol,
    TargetRewriter, TargetSpec,
};
pub use ir::{
    emit_function, print_function, IrEmitter, IrFunction, IrList, NodeId, Op, SizeClass, TextEmitter,
    VReg,
};
pub use lower::lower_function;
pub use opt::{optimize, OptSummary};

/// Lower one function and optimize it in place: the whole middle tier for a
/// single function. The result is ready for an [`IrEmitter`].
pub fn compile_function<'arena>(
    session: &CompilationSession<'arena>,
    target: &TargetSpec,
    rewriter: &mut dyn TargetRewriter,
    opt_level: u8,
    decl: &ast::FuncDecl,
) -> CompileResult<(IrFunction, OptSummary)> {
    let mut func = lower::lower_function(session, target, decl)?;
    let summary = opt::optimize(&mut func, session, target, rewriter, opt_level);
    Ok((func, summary))
}
