// This module defines the target description consumed by lowering and the optimizer:
// TargetSpec, a plain capability record (byte widths of the abstract size classes,
// the encodable-immediate range, the inline-load range, and whether fused memory
// operations exist), and TargetRewriter, the trait through which an architecture
// backend injects ISA-specific legalization into the optimizer without the core rule
// set knowing about target capabilities. rewrite runs inside the fixed-point loop and
// participates in its convergence; post_rewrite runs exactly once afterwards. Both
// hooks default to doing nothing, which is what NullRewriter ships.

//! Target capability description and legalization hooks.
//!
//! Emitters query these flags *before* optimization runs, because they gate
//! which rewrite rules are legal for the architecture.

use crate::ir::func::IrFunction;
use crate::ir::node::SizeClass;

/// Externally supplied capability flags and encoding bounds for one target.
#[derive(Debug, Clone)]
pub struct TargetSpec {
    pub name: &'static str,
    /// Width of a pointer (and of `SizeClass::Ptr`) in bytes.
    pub ptr_bytes: u8,
    /// Width of `SizeClass::Long` in bytes.
    pub long_bytes: u8,
    /// Inclusive range of immediates encodable as a binary-op operand.
    pub imm_min: i64,
    pub imm_max: i64,
    /// Inclusive range of constants loadable without a literal-pool entry.
    pub load_min: i64,
    pub load_max: i64,
    /// Whether the ISA has combined slot-addressing load/store forms.
    pub fused_mem_ops: bool,
}

impl TargetSpec {
    /// A 64-bit description with RISC-style 12-bit operand immediates.
    pub fn generic64() -> Self {
        Self {
            name: "generic64",
            ptr_bytes: 8,
            long_bytes: 8,
            imm_min: -2048,
            imm_max: 2047,
            load_min: i32::MIN as i64,
            load_max: i32::MAX as i64,
            fused_mem_ops: true,
        }
    }

    /// A 32-bit description with 16-bit operand immediates and no fused
    /// memory forms.
    pub fn generic32() -> Self {
        Self {
            name: "generic32",
            ptr_bytes: 4,
            long_bytes: 4,
            imm_min: -32768,
            imm_max: 32767,
            load_min: i32::MIN as i64,
            load_max: i32::MAX as i64,
            fused_mem_ops: false,
        }
    }

    /// Resolve an abstract size class to its byte width on this target.
    pub fn size_of(&self, size: SizeClass) -> u64 {
        match size {
            SizeClass::Byte | SizeClass::Char => 1,
            SizeClass::Short => 2,
            SizeClass::Int => 4,
            SizeClass::Long => self.long_bytes as u64,
            SizeClass::Ptr => self.ptr_bytes as u64,
        }
    }

    /// Bit width of a size class on this target.
    pub fn bits_of(&self, size: SizeClass) -> u32 {
        self.size_of(size) as u32 * 8
    }

    /// Can `value` ride along as an inline operand immediate?
    pub fn encodable_imm(&self, value: i64) -> bool {
        value >= self.imm_min && value <= self.imm_max
    }

    /// Can `value` be loaded without a literal-pool entry?
    pub fn inline_loadable(&self, value: i64) -> bool {
        value >= self.load_min && value <= self.load_max
    }
}

/// Architecture-specific rewrite hooks invoked by the optimizer driver.
///
/// `rewrite` runs inside the fixed-point loop and must report how many nodes
/// it changed so the driver knows whether to keep iterating; like the core
/// rules it has to be semantics-preserving in isolation and must settle (fire
/// zero times on a list it has already legalized). `post_rewrite` runs once
/// after the loop for cleanups that need not converge.
pub trait TargetRewriter {
    fn rewrite(&mut self, _func: &mut IrFunction, _spec: &TargetSpec) -> usize {
        0
    }

    fn post_rewrite(&mut self, _func: &mut IrFunction, _spec: &TargetSpec) {}
}

/// A rewriter for targets that need no legalization.
pub struct NullRewriter;

impl TargetRewriter for NullRewriter {}
