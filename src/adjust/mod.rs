//! Instruction Adjustment pipeline (specification §4.6, C6): ten ordered
//! transforms that rewrite an action's field-level instructions so Action
//! Analysis (the alignment solver + verifier) can accept them. Each pass
//! has the shape `fn run(body: &mut Vec<FieldAction>, ctx: &mut Context) ->
//! usize`, mirroring the teacher compiler's `passes::cfg_simplify::run`:
//! a free function returning a change count, composed by a fixed-point
//! driver.

pub mod const_to_ad;
pub mod hash_dist;
pub mod hash_size;
pub mod merge;
pub mod noop;
pub mod reduction_or;
pub mod shift;
pub mod simplify_misc;
pub mod split;
pub mod stateful;

use crate::context::Context;
use crate::model::field_action::FieldAction;

/// One action's field-level instruction list, the adjustment pipeline's
/// working set.
pub type ActionBody = Vec<FieldAction>;

/// Run every pre-merge adjustment pass in specification order, to a fixed
/// point (specification R3: "the adjustment pipeline reaches a fixed point
/// in <= 1 iteration given a valid PHV allocation"). `MergeInstructions`
/// (pass 7) is run separately by the caller once container groupings are
/// known, since it needs the PHV allocation's field-to-container map that
/// the earlier passes do not.
pub fn run_pre_merge(body: &mut ActionBody, ctx: &mut Context) -> usize {
    let _span = tracing::debug_span!("instruction_adjustment").entered();
    let mut total = 0;
    loop {
        let mut changed = 0;
        changed += noop::run(body, ctx);
        changed += shift::run(body, ctx);
        changed += reduction_or::run(body, ctx);
        changed += split::run(body, ctx);
        changed += const_to_ad::run(body, ctx);
        changed += hash_dist::run(body, ctx);
        if changed == 0 {
            break;
        }
        total += changed;
    }
    tracing::debug!(changes = total, "instruction adjustment pre-merge fixed point reached");
    total
}

/// Run the post-merge normalization passes (8-10): stateful reference
/// rewriting, hash-dist size guarantees, and the three minor
/// normalizations bundled in `simplify_misc`.
pub fn run_post_merge(body: &mut ActionBody, ctx: &mut Context) -> usize {
    let mut total = 0;
    total += stateful::run(body, ctx);
    total += hash_size::run(body, ctx);
    total += simplify_misc::run(body, ctx);
    total
}
