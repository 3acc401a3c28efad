// This module defines IrFunction, the per-function IR container handed from lowering
// to the optimizer and then to the external emitter: linkage name, parameter size
// classes, the local slot table (byte sizes, including synthetic scratch slots the
// lowering engine may add for discarded aggregate call results), the instruction list,
// the derived maximum virtual register, and the literal-pool side table for constants
// the target cannot load inline.

//! Per-function IR container.

use crate::core::session::{LabelId, Symbol};

use super::list::IrList;
use super::node::{SizeClass, VReg};

/// One lowered parameter: name, scalar size class, signedness.
#[derive(Debug, Clone, Copy)]
pub struct ParamInfo {
    pub name: Symbol,
    pub size: SizeClass,
    pub signed: bool,
}

/// The IR for one function, exclusively owned by its compilation until the
/// emitter takes over.
pub struct IrFunction {
    pub name: Symbol,
    pub params: Vec<ParamInfo>,
    /// Byte size of each local slot, in declaration order. `Place::Local`
    /// indexes this table; emitters lay the frame out from it.
    pub locals: Vec<u64>,
    pub list: IrList,
    /// Highest virtual register referenced anywhere in the list, derived by
    /// [`IrFunction::compute_max_vreg`] once lowering is done. Emitters size
    /// their register stacks from it.
    pub max_vreg: Option<VReg>,
    /// Constants too wide for the target's inline-load range, attached as
    /// named data labels. The emitter materializes them in a data section.
    pub literal_pool: Vec<(LabelId, i64)>,
}

impl IrFunction {
    pub fn new(name: Symbol, params: Vec<ParamInfo>, locals: Vec<u64>) -> Self {
        Self {
            name,
            params,
            locals,
            list: IrList::new(),
            max_vreg: None,
            literal_pool: Vec::new(),
        }
    }

    /// Reserve an extra local slot (scratch storage invented by lowering).
    pub fn add_local(&mut self, bytes: u64) -> u32 {
        self.locals.push(bytes);
        (self.locals.len() - 1) as u32
    }

    /// Record a pool constant and hand back its data label.
    pub fn add_pool_constant(&mut self, label: LabelId, value: i64) {
        self.literal_pool.push((label, value));
    }

    /// Scan the list and record the highest register referenced.
    pub fn compute_max_vreg(&mut self) {
        let mut max: Option<VReg> = None;
        for id in self.list.iter() {
            let op = self.list.op(id);
            if let Some(r) = op.defined_reg() {
                max = Some(max.map_or(r, |m| m.max(r)));
            }
        }
        self.max_vreg = max;
    }
}
