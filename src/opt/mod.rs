// This module is the local optimizer driver: an ordered table of rewrite rules, each
// scanning the whole node list once and reporting how many windows it changed, run in
// a loop until a full pass changes nothing — the fixed point. Rule order only affects
// how fast the loop settles, never the result, because every rule is
// semantics-preserving in isolation. The target's rewrite hook runs inside the loop
// (its legalizations can enable or disable further core rules), and its post_rewrite
// hook runs exactly once after the loop. The driver also owns the once-per-node
// bookkeeping for the divide-by-zero warning so the diagnostic cannot repeat across
// iterations.

//! Fixed-point peephole optimization.

pub(crate) mod rules;

use hashbrown::HashSet;
use log::debug;

use crate::core::session::CompilationSession;
use crate::core::target::{TargetRewriter, TargetSpec};
use crate::ir::func::IrFunction;
use crate::ir::list::NodeId;

/// What one optimization run did.
#[derive(Debug, Default, Clone, Copy)]
pub struct OptSummary {
    /// Full passes over the rule table, including the final quiet one.
    pub passes: u32,
    /// Total windows changed across all passes.
    pub changes: usize,
    /// Literal-zero divisors reported (each node at most once).
    pub div_zero_warnings: u32,
}

/// Cross-pass rule state.
pub(crate) struct OptState {
    /// Divide/modulo nodes already reported for a literal zero divisor.
    pub(crate) warned_zero_div: HashSet<NodeId>,
    pub(crate) div_zero_warnings: u32,
    /// Function name for diagnostics (IR nodes carry no source positions).
    pub(crate) func_name: String,
}

type Rule = fn(&mut IrFunction, &TargetSpec, &mut OptState) -> usize;

struct RuleDef {
    name: &'static str,
    min_level: u8,
    run: Rule,
}

/// The rule catalog, in scan order.
const RULES: &[RuleDef] = &[
    RuleDef { name: "propagate-imm", min_level: 1, run: rules::propagate_immediates },
    RuleDef { name: "fold-const", min_level: 1, run: rules::fold_constants },
    RuleDef { name: "fuse-load-cast", min_level: 1, run: rules::fuse_load_cast },
    RuleDef { name: "strength-reduce", min_level: 1, run: rules::strength_reduce },
    RuleDef { name: "modulo-pow2", min_level: 1, run: rules::reduce_modulo },
    RuleDef { name: "canonicalize", min_level: 1, run: rules::canonicalize_commutative },
    RuleDef { name: "direct-call", min_level: 1, run: rules::simplify_indirect_call },
    RuleDef { name: "dead-move", min_level: 1, run: rules::remove_dead_moves },
    RuleDef { name: "fuse-mem", min_level: 3, run: rules::fuse_memory_ops },
    RuleDef { name: "remove-nops", min_level: 1, run: rules::remove_nops },
];

/// Optimize one function in place.
///
/// Rules gated above `level` stay off; the target rewriter always runs, so
/// legalization happens even at level 0. Terminates because every rule
/// strictly shrinks the list or replaces a node with a strictly cheaper
/// shape it never reintroduces.
pub fn optimize(
    func: &mut IrFunction,
    session: &CompilationSession,
    spec: &TargetSpec,
    rewriter: &mut dyn TargetRewriter,
    level: u8,
) -> OptSummary {
    let mut state = OptState {
        warned_zero_div: HashSet::new(),
        div_zero_warnings: 0,
        func_name: session.symbol_name(func.name).to_string(),
    };
    let mut summary = OptSummary::default();
    loop {
        let mut fired = 0usize;
        for rule in RULES {
            if level >= rule.min_level {
                let n = (rule.run)(func, spec, &mut state);
                if n > 0 {
                    debug!("{}: rule {} fired {} times", state.func_name, rule.name, n);
                }
                fired += n;
            }
        }
        fired += rewriter.rewrite(func, spec);
        summary.passes += 1;
        summary.changes += fired;
        if fired == 0 {
            break;
        }
    }
    rewriter.post_rewrite(func, spec);
    summary.div_zero_warnings = state.div_zero_warnings;
    summary
}
