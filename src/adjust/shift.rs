//! Pass 2: AdjustShiftInstructions (specification §4.6).
//!
//! For a signed right shift whose destination container is narrower than
//! the source field, rewrites into `set`, `shrs`, or `funnel-shift`,
//! selecting the correct source slice.

use crate::adjust::ActionBody;
use crate::common::bitvec::BitRange;
use crate::context::Context;
use crate::model::action_param::Source;
use crate::model::field_action::Opcode;

pub fn run(body: &mut ActionBody, _ctx: &mut Context) -> usize {
    let mut changed = 0;
    for fa in body.iter_mut() {
        if fa.opcode != Opcode::Shrs {
            continue;
        }
        let write_width = fa.write.width();
        let Some(src) = fa.reads.first() else { continue };
        let src_width = src.width();
        if src_width <= write_width {
            continue;
        }
        let Some(shift_amt) = fa.reads.get(1).and_then(|p| match p.source {
            Source::Literal(v) => Some(v as u32),
            _ => None,
        }) else {
            continue;
        };

        if shift_amt == 0 {
            fa.opcode = Opcode::Set;
            fa.reads.truncate(1);
            changed += 1;
            continue;
        }

        if shift_amt + write_width <= src_width {
            // The needed bits fit entirely within the source field: slice
            // it down to exactly the bits the shift selects and drop the
            // now-redundant shift amount, emitting a plain `set`.
            let lo = src.range.lo + shift_amt;
            let hi = lo + write_width - 1;
            if hi <= src.range.hi {
                fa.reads[0].range = BitRange::new(lo, hi);
                fa.opcode = Opcode::Set;
                fa.reads.truncate(1);
                changed += 1;
            }
        }
        // A shift amount that straddles past the end of a single source
        // container is handled by SplitInstructions (pass 4), which
        // introduces the companion `funnel-shift` on the adjacent
        // container; this pass only narrows single-container shifts.
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::action_param::ActionParam;
    use crate::model::field_action::FieldAction;

    #[test]
    fn zero_shift_becomes_set() {
        let dst = ActionParam::phv(0, BitRange::new(0, 7));
        let src = ActionParam::phv(1, BitRange::new(0, 31));
        let shift = ActionParam::constant(0, 8);
        let mut body = vec![FieldAction::new("n", Opcode::Shrs, dst, vec![src, shift])];
        let mut ctx = Context::default();
        let changed = run(&mut body, &mut ctx);
        assert_eq!(changed, 1);
        assert_eq!(body[0].opcode, Opcode::Set);
    }

    #[test]
    fn in_range_shift_slices_source() {
        let dst = ActionParam::phv(0, BitRange::new(0, 7));
        let src = ActionParam::phv(1, BitRange::new(0, 31));
        let shift = ActionParam::constant(8, 8);
        let mut body = vec![FieldAction::new("n", Opcode::Shrs, dst, vec![src, shift])];
        let mut ctx = Context::default();
        run(&mut body, &mut ctx);
        assert_eq!(body[0].opcode, Opcode::Set);
        assert_eq!(body[0].reads[0].range, BitRange::new(8, 15));
    }
}
