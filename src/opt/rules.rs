// The peephole rule catalog. Every rule scans the list once, matches a small window
// of adjacent nodes (no-ops are transparent inside a window), mutates the matched
// nodes in place through op_mut, and reports how many windows it changed. Rules must
// be semantics-preserving in isolation: the driver may stop after any of them.
// Constant arithmetic uses two's-complement wraparound at the width the target
// assigns to the node's size class, with signedness taken from the node's own tag.

//! The rewrite rules of the local optimizer.

use log::warn;

use crate::core::target::TargetSpec;
use crate::ir::func::IrFunction;
use crate::ir::list::{IrList, NodeId};
use crate::ir::node::{BinOp, CallTarget, CmpOp, Op, Operand};

use super::OptState;

/// Sign-extend `value` from the low `bits` to the full i64.
fn sign_extend(value: i64, bits: u32) -> i64 {
    if bits >= 64 {
        value
    } else {
        let shift = 64 - bits;
        (value << shift) >> shift
    }
}

/// Zero-extend `value` from the low `bits` to the full i64.
fn zero_extend(value: i64, bits: u32) -> i64 {
    if bits >= 64 {
        value
    } else {
        (value as u64 & ((1u64 << bits) - 1)) as i64
    }
}

/// The immediate value a size cast would produce at compile time, in the
/// canonical sign-extended i64 representation.
fn cast_imm(value: i64, from_bits: u32, to_bits: u32, signed: bool) -> i64 {
    let widened = if signed {
        sign_extend(value, from_bits)
    } else {
        zero_extend(value, from_bits)
    };
    sign_extend(widened, to_bits)
}

/// Next node that is not a no-op. Windows treat no-ops left behind by earlier
/// rules as transparent; remove-nops deletes them at the end of the pass.
fn next_effective(list: &IrList, id: NodeId) -> Option<NodeId> {
    let mut cur = list.next(id);
    while let Some(n) = cur {
        if !list.op(n).is_nop() {
            return Some(n);
        }
        cur = list.next(n);
    }
    None
}

fn warn_zero_divisor(state: &mut OptState, id: NodeId, op: BinOp) {
    if state.warned_zero_div.insert(id) {
        let what = if matches!(op, BinOp::Rem) { "modulo" } else { "division" };
        warn!(
            "{}: {} by a literal zero; the operation is kept and will fault at run time",
            state.func_name, what
        );
        state.div_zero_warnings += 1;
    }
}

/// Evaluate a binary operation on two immediates at the given width.
/// Divisors are non-zero here; the callers weed that case out first.
fn eval_bin(op: BinOp, a: i64, b: i64, bits: u32, signed: bool) -> i64 {
    let ua = zero_extend(a, bits) as u64;
    let ub = zero_extend(b, bits) as u64;
    let sa = sign_extend(a, bits);
    let sb = sign_extend(b, bits);
    let shift = (ub as u32) & (bits - 1);
    let raw = match op {
        BinOp::Add => ua.wrapping_add(ub),
        BinOp::Sub => ua.wrapping_sub(ub),
        BinOp::Mul => ua.wrapping_mul(ub),
        BinOp::Div if signed => sa.wrapping_div(sb) as u64,
        BinOp::Div => ua / ub,
        BinOp::Rem if signed => sa.wrapping_rem(sb) as u64,
        BinOp::Rem => ua % ub,
        BinOp::And => ua & ub,
        BinOp::Or => ua | ub,
        BinOp::Xor => ua ^ ub,
        BinOp::Shl => ua.wrapping_shl(shift),
        BinOp::Shr if signed => (sa >> shift) as u64,
        BinOp::Shr => ua >> shift,
    };
    sign_extend(raw as i64, bits)
}

/// Evaluate a comparison on two immediates, 0 or 1.
fn eval_cmp(op: CmpOp, a: i64, b: i64, bits: u32, signed: bool) -> i64 {
    let hit = if signed {
        let (a, b) = (sign_extend(a, bits), sign_extend(b, bits));
        match op {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
        }
    } else {
        let (a, b) = (zero_extend(a, bits) as u64, zero_extend(b, bits) as u64);
        match op {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
        }
    };
    hit as i64
}

/// Remove every node marked as having no effect.
pub(crate) fn remove_nops(func: &mut IrFunction, _spec: &TargetSpec, _state: &mut OptState) -> usize {
    let mut removed = 0;
    let mut cur = func.list.head();
    while let Some(id) = cur {
        cur = func.list.next(id);
        if func.list.op(id).is_nop() {
            func.list.remove(id);
            removed += 1;
        }
    }
    removed
}

/// Collapse an immediate load into the operand slot of the binary or compare
/// node that consumes it next, when the value fits the target's operand
/// range. The load becomes a no-op.
pub(crate) fn propagate_immediates(
    func: &mut IrFunction,
    spec: &TargetSpec,
    _state: &mut OptState,
) -> usize {
    let mut changed = 0;
    let mut cur = func.list.head();
    while let Some(id) = cur {
        cur = func.list.next(id);
        let (dst, value) = match *func.list.op(id) {
            Op::LoadImm { dst, value, .. } if spec.encodable_imm(value) => (dst, value),
            _ => continue,
        };
        let Some(user) = next_effective(&func.list, id) else { continue };
        let (consumes, overwrites) = match func.list.op(user) {
            Op::Bin { dst: d, lhs, rhs, .. } | Op::Cmp { dst: d, lhs, rhs, .. } => {
                let reads = matches!(lhs, Operand::Reg(r) if *r == dst)
                    || matches!(rhs, Operand::Reg(r) if *r == dst);
                (reads, *d == dst)
            }
            _ => continue,
        };
        if !consumes {
            continue;
        }
        // Unless the consumer overwrites the register, the load stays needed
        // while anything downstream still reads it.
        if !overwrites && func.list.reg_live_after(user, dst) {
            continue;
        }
        match func.list.op_mut(user) {
            Op::Bin { lhs, rhs, .. } | Op::Cmp { lhs, rhs, .. } => {
                for operand in [lhs, rhs] {
                    if matches!(operand, Operand::Reg(r) if *r == dst) {
                        *operand = Operand::Imm(value);
                    }
                }
            }
            _ => unreachable!(),
        }
        *func.list.op_mut(id) = Op::Nop;
        changed += 1;
    }
    changed
}

/// Replace a binary or compare node whose operands are both immediates with a
/// single immediate load of the computed result. Literal-zero divisors are
/// reported and left alone.
pub(crate) fn fold_constants(func: &mut IrFunction, spec: &TargetSpec, state: &mut OptState) -> usize {
    let mut changed = 0;
    let mut cur = func.list.head();
    while let Some(id) = cur {
        cur = func.list.next(id);
        let new_op = match *func.list.op(id) {
            Op::Bin { op, dst, lhs: Operand::Imm(a), rhs: Operand::Imm(b), size, signed } => {
                let bits = spec.bits_of(size);
                if matches!(op, BinOp::Div | BinOp::Rem) && zero_extend(b, bits) == 0 {
                    warn_zero_divisor(state, id, op);
                    continue;
                }
                let value = eval_bin(op, a, b, bits, signed);
                if !spec.inline_loadable(value) {
                    continue;
                }
                Op::LoadImm { dst, value, size }
            }
            Op::Cmp { op, dst, lhs: Operand::Imm(a), rhs: Operand::Imm(b), size, signed } => {
                let value = eval_cmp(op, a, b, spec.bits_of(size), signed);
                Op::LoadImm { dst, value, size }
            }
            _ => continue,
        };
        *func.list.op_mut(id) = new_op;
        changed += 1;
    }
    changed
}

/// Collapse an immediate load followed by a size cast of the same register
/// into one load at the final size class, applying the cast's extension
/// semantics at compile time.
pub(crate) fn fuse_load_cast(func: &mut IrFunction, spec: &TargetSpec, _state: &mut OptState) -> usize {
    let mut changed = 0;
    let mut cur = func.list.head();
    while let Some(id) = cur {
        cur = func.list.next(id);
        let (dst, value, size) = match *func.list.op(id) {
            Op::LoadImm { dst, value, size } => (dst, value, size),
            _ => continue,
        };
        let Some(user) = next_effective(&func.list, id) else { continue };
        let (to, signed) = match *func.list.op(user) {
            Op::Cast { reg, from, to, signed } if reg == dst && from == size => (to, signed),
            _ => continue,
        };
        let new_value = cast_imm(value, spec.bits_of(size), spec.bits_of(to), signed);
        if !spec.inline_loadable(new_value) {
            continue;
        }
        *func.list.op_mut(id) = Op::LoadImm { dst, value: new_value, size: to };
        *func.list.op_mut(user) = Op::Nop;
        changed += 1;
    }
    changed
}

/// Multiply by a power-of-two immediate becomes a shift, by one a move or
/// no-op, by zero a zero load. Unsigned division by a power of two becomes a
/// logical shift; a literal-zero divisor is reported and kept.
pub(crate) fn strength_reduce(func: &mut IrFunction, spec: &TargetSpec, state: &mut OptState) -> usize {
    let mut changed = 0;
    let mut cur = func.list.head();
    while let Some(id) = cur {
        cur = func.list.next(id);
        let new_op = match *func.list.op(id) {
            Op::Bin { op: BinOp::Mul, dst, lhs, rhs, size, signed } => {
                let (reg, value) = match (lhs, rhs) {
                    (Operand::Reg(r), Operand::Imm(v)) | (Operand::Imm(v), Operand::Reg(r)) => {
                        (r, v)
                    }
                    _ => continue,
                };
                match value {
                    0 => Op::LoadImm { dst, value: 0, size },
                    1 if reg == dst => Op::Nop,
                    1 => Op::Move { dst, src: reg, size },
                    // Exact for signed values too under wraparound.
                    v if v > 0 && (v as u64).is_power_of_two() => Op::Bin {
                        op: BinOp::Shl,
                        dst,
                        lhs: Operand::Reg(reg),
                        rhs: Operand::Imm((v as u64).trailing_zeros() as i64),
                        size,
                        signed,
                    },
                    _ => continue,
                }
            }
            Op::Bin { op: BinOp::Div, dst, lhs, rhs: Operand::Imm(v), size, signed } => {
                if zero_extend(v, spec.bits_of(size)) == 0 {
                    warn_zero_divisor(state, id, BinOp::Div);
                    continue;
                }
                match (lhs, v) {
                    (Operand::Reg(r), 1) if r == dst => Op::Nop,
                    (Operand::Reg(r), 1) => Op::Move { dst, src: r, size },
                    // The shift rounds toward negative infinity, so only the
                    // unsigned form is exact.
                    (Operand::Reg(_), v) if !signed && v > 0 && (v as u64).is_power_of_two() => {
                        Op::Bin {
                            op: BinOp::Shr,
                            dst,
                            lhs,
                            rhs: Operand::Imm((v as u64).trailing_zeros() as i64),
                            size,
                            signed: false,
                        }
                    }
                    _ => continue,
                }
            }
            _ => continue,
        };
        *func.list.op_mut(id) = new_op;
        changed += 1;
    }
    changed
}

/// Unsigned modulo by a power of two becomes a bitwise AND with divisor - 1;
/// modulo by one becomes a zero load. A literal-zero divisor is reported and
/// kept.
pub(crate) fn reduce_modulo(func: &mut IrFunction, spec: &TargetSpec, state: &mut OptState) -> usize {
    let mut changed = 0;
    let mut cur = func.list.head();
    while let Some(id) = cur {
        cur = func.list.next(id);
        let new_op = match *func.list.op(id) {
            Op::Bin { op: BinOp::Rem, dst, lhs, rhs: Operand::Imm(v), size, signed } => {
                if zero_extend(v, spec.bits_of(size)) == 0 {
                    warn_zero_divisor(state, id, BinOp::Rem);
                    continue;
                }
                match (lhs, v) {
                    (Operand::Reg(_), 1) => Op::LoadImm { dst, value: 0, size },
                    (Operand::Reg(_), v)
                        if !signed
                            && v > 0
                            && (v as u64).is_power_of_two()
                            && spec.encodable_imm(v - 1) =>
                    {
                        Op::Bin {
                            op: BinOp::And,
                            dst,
                            lhs,
                            rhs: Operand::Imm(v - 1),
                            size,
                            signed: false,
                        }
                    }
                    _ => continue,
                }
            }
            _ => continue,
        };
        *func.list.op_mut(id) = new_op;
        changed += 1;
    }
    changed
}

/// Reorder the operands of commutative operations so a register always
/// precedes an immediate.
pub(crate) fn canonicalize_commutative(
    func: &mut IrFunction,
    _spec: &TargetSpec,
    _state: &mut OptState,
) -> usize {
    let mut changed = 0;
    let mut cur = func.list.head();
    while let Some(id) = cur {
        cur = func.list.next(id);
        let swap = match func.list.op(id) {
            Op::Bin { op, lhs: Operand::Imm(_), rhs: Operand::Reg(_), .. } => op.is_commutative(),
            Op::Cmp { op, lhs: Operand::Imm(_), rhs: Operand::Reg(_), .. } => op.is_commutative(),
            _ => false,
        };
        if !swap {
            continue;
        }
        match func.list.op_mut(id) {
            Op::Bin { lhs, rhs, .. } | Op::Cmp { lhs, rhs, .. } => std::mem::swap(lhs, rhs),
            _ => unreachable!(),
        }
        changed += 1;
    }
    changed
}

/// A call through a register whose reaching definition is a single
/// address-of-function node becomes a direct call by name. The address node
/// is dropped once nothing else reads its register.
pub(crate) fn simplify_indirect_call(
    func: &mut IrFunction,
    _spec: &TargetSpec,
    _state: &mut OptState,
) -> usize {
    let mut changed = 0;
    let mut cur = func.list.head();
    while let Some(id) = cur {
        cur = func.list.next(id);
        let target_reg = match func.list.op(id) {
            Op::Call { target: CallTarget::Reg(r), .. } => *r,
            _ => continue,
        };
        // Walk back to the reaching definition. Control flow in between means
        // another path could supply the register, so the scan gives up there.
        let mut def = None;
        let mut back = func.list.prev(id);
        while let Some(n) = back {
            let op = func.list.op(n);
            if op.defined_reg() == Some(target_reg) {
                def = Some(n);
                break;
            }
            if matches!(op, Op::Label(_) | Op::Jump(_) | Op::Branch { .. } | Op::Call { .. }) {
                break;
            }
            back = func.list.prev(n);
        }
        let Some(def_id) = def else { continue };
        let name = match func.list.op(def_id) {
            Op::AddrFunc { name, .. } => *name,
            _ => continue,
        };
        match func.list.op_mut(id) {
            Op::Call { target, .. } => *target = CallTarget::Name(name),
            _ => unreachable!(),
        }
        if !func.list.reg_live_after(def_id, target_reg) {
            *func.list.op_mut(def_id) = Op::Nop;
        }
        changed += 1;
    }
    changed
}

/// Remove register-to-itself moves.
pub(crate) fn remove_dead_moves(func: &mut IrFunction, _spec: &TargetSpec, _state: &mut OptState) -> usize {
    let mut changed = 0;
    let mut cur = func.list.head();
    while let Some(id) = cur {
        cur = func.list.next(id);
        if let Op::Move { dst, src, .. } = func.list.op(id) {
            if dst == src {
                func.list.remove(id);
                changed += 1;
            }
        }
    }
    changed
}

/// Collapse an address computation followed by a load or store of that
/// address into one fused slot operation, when the target has the fused
/// forms and the address register is not used again. Applies uniformly to
/// parameter slots, globals, and local slots.
pub(crate) fn fuse_memory_ops(func: &mut IrFunction, spec: &TargetSpec, _state: &mut OptState) -> usize {
    if !spec.fused_mem_ops {
        return 0;
    }
    let mut changed = 0;
    let mut cur = func.list.head();
    while let Some(id) = cur {
        cur = func.list.next(id);
        let (addr_reg, place) = match *func.list.op(id) {
            Op::Addr { dst, place } => (dst, place),
            _ => continue,
        };
        let Some(user) = next_effective(&func.list, id) else { continue };
        let new_op = match *func.list.op(user) {
            Op::Load { dst, addr, size, signed } if addr == addr_reg => {
                if dst != addr_reg && func.list.reg_live_after(user, addr_reg) {
                    continue;
                }
                Op::LoadPlace { dst, place, size, signed }
            }
            // A store whose source is the address register would lose the
            // value with the address node gone.
            Op::Store { src, addr, size } if addr == addr_reg && src != addr_reg => {
                if func.list.reg_live_after(user, addr_reg) {
                    continue;
                }
                Op::StorePlace { src, place, size }
            }
            _ => continue,
        };
        *func.list.op_mut(user) = new_op;
        *func.list.op_mut(id) = Op::Nop;
        changed += 1;
    }
    changed
}
