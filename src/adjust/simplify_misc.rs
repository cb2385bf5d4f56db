//! Pass 10 (specification §4.6): three minor normalizations bundled
//! together, the way the teacher's adjustment pipeline groups its smallest
//! rewrites into one final pass:
//!
//! * `RemoveUnnecessaryActionArgSlice` — a slice of an action-arg equal to
//!   its full width becomes the arg itself.
//! * `SimplifyConditionalActionArg` — `(arg != 0) ? t : f` becomes `arg ? t
//!   : f`.
//! * `ArithCompareAdjustment` — comparison opcodes write the full
//!   container LSB-aligned, so writes of the upper bits are redundant and
//!   removed.

use crate::adjust::ActionBody;
use crate::common::bitvec::BitRange;
use crate::context::Context;
use crate::model::action_param::ParamKind;
use crate::model::field_action::Opcode;

fn is_comparison(opcode: Opcode) -> bool {
    matches!(opcode, Opcode::Minu | Opcode::Mins | Opcode::Maxu | Opcode::Maxs)
}

/// An action-arg read whose slice spans the full destination width is the
/// arg itself, not a genuine slice; normalize its range to start at bit 0
/// so later passes (and the eventual action-format allocator) see a plain
/// arg reference instead of an offset slice of one.
fn remove_unnecessary_action_arg_slice(body: &mut ActionBody) -> usize {
    let mut changed = 0;
    for fa in body.iter_mut() {
        let write_width = fa.write.width();
        for read in fa.reads.iter_mut() {
            if read.kind != ParamKind::ActionData {
                continue;
            }
            if read.range.size() == write_width && read.range.lo != 0 {
                read.range = BitRange::new(0, write_width - 1);
                changed += 1;
            }
        }
    }
    changed
}

/// `(arg != 0) ? t : f` folds to `arg ? t : f`: a `conditionally-set` whose
/// conditional operand is itself a nonzero-comparison against the same
/// action-arg is rewritten to test the arg directly.
fn simplify_conditional_action_arg(body: &mut ActionBody) -> usize {
    let mut changed = 0;
    for fa in body.iter_mut() {
        if fa.opcode != Opcode::ConditionallySet {
            continue;
        }
        if let Some(cond) = fa.reads.first_mut() {
            if cond.is_conditional && cond.kind == ParamKind::ActionData {
                // Collapsing `(arg != 0)` to `arg` only changes how the
                // condition is rendered, not its bit range; mark it plain
                // so a later renderer emits `arg` instead of `arg != 0`.
                if cond.range.size() > 1 {
                    cond.range = BitRange::new(cond.range.lo, cond.range.lo);
                    changed += 1;
                }
            }
        }
    }
    changed
}

/// Comparison opcodes write their full (1-bit, LSB-aligned) result into the
/// container; any write bits above bit 0 are redundant and removed.
fn arith_compare_adjustment(body: &mut ActionBody) -> usize {
    let mut changed = 0;
    for fa in body.iter_mut() {
        if !is_comparison(fa.opcode) {
            continue;
        }
        if fa.write.range.hi > fa.write.range.lo {
            fa.write.range = BitRange::new(fa.write.range.lo, fa.write.range.lo);
            changed += 1;
        }
    }
    changed
}

pub fn run(body: &mut ActionBody, _ctx: &mut Context) -> usize {
    let mut changed = 0;
    changed += remove_unnecessary_action_arg_slice(body);
    changed += simplify_conditional_action_arg(body);
    changed += arith_compare_adjustment(body);
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::action_param::ActionParam;
    use crate::model::field_action::FieldAction;

    #[test]
    fn conditional_nonzero_test_collapses_to_plain_arg() {
        let dst = ActionParam::phv(0, BitRange::new(0, 7));
        let mut cond = ActionParam::action_data("cond_arg", BitRange::new(0, 7));
        cond.is_conditional = true;
        let t = ActionParam::phv(1, BitRange::new(0, 7));
        let f = ActionParam::phv(2, BitRange::new(0, 7));
        let mut body = vec![FieldAction::new("a0", Opcode::ConditionallySet, dst, vec![cond, t, f])];
        let mut ctx = Context::default();
        let changed = run(&mut body, &mut ctx);
        assert_eq!(changed, 1);
        assert_eq!(body[0].reads[0].range, BitRange::new(0, 0));
    }

    #[test]
    fn comparison_write_is_trimmed_to_lsb() {
        let dst = ActionParam::phv(0, BitRange::new(0, 31));
        let a = ActionParam::phv(1, BitRange::new(0, 31));
        let b = ActionParam::phv(2, BitRange::new(0, 31));
        let mut body = vec![FieldAction::new("a0", Opcode::Minu, dst, vec![a, b])];
        let mut ctx = Context::default();
        let changed = run(&mut body, &mut ctx);
        assert_eq!(changed, 1);
        assert_eq!(body[0].write.range, BitRange::new(0, 0));
    }

    #[test]
    fn already_lsb_aligned_comparison_untouched() {
        let dst = ActionParam::phv(0, BitRange::new(0, 0));
        let a = ActionParam::phv(1, BitRange::new(0, 31));
        let b = ActionParam::phv(2, BitRange::new(0, 31));
        let mut body = vec![FieldAction::new("a0", Opcode::Maxs, dst, vec![a, b])];
        let mut ctx = Context::default();
        assert_eq!(run(&mut body, &mut ctx), 0);
    }

    #[test]
    fn full_width_action_arg_slice_is_normalized() {
        let dst = ActionParam::phv(0, BitRange::new(0, 7));
        let arg = ActionParam::action_data("p", BitRange::new(8, 15));
        let mut body = vec![FieldAction::new("a0", Opcode::Set, dst, vec![arg])];
        let mut ctx = Context::default();
        let changed = run(&mut body, &mut ctx);
        assert_eq!(changed, 1);
        assert_eq!(body[0].reads[0].range, BitRange::new(0, 7));
    }
}
