//! Pass 9: GuaranteeHashDistSize (specification §4.6).
//!
//! When a hash-distribution operand and its destination container differ
//! in width, either slices the hash-dist operand down to the destination
//! width, or — if the hash-dist operand is narrower — pads the missing
//! high bits of the destination with a zero-constant `set`, so every
//! operand in a hash-sourced instruction ends up equal width.

use crate::adjust::ActionBody;
use crate::common::bitvec::BitRange;
use crate::context::Context;
use crate::model::action_param::{ActionParam, ParamKind, Source};
use crate::model::field_action::{FieldAction, Opcode};

pub fn run(body: &mut ActionBody, _ctx: &mut Context) -> usize {
    let mut changed = 0;
    let mut padding = Vec::new();

    for fa in body.iter_mut() {
        let write_width = fa.write.width();
        for read in fa.reads.iter_mut() {
            if read.kind != ParamKind::Phv || !matches!(read.source, Source::HashDist(_)) {
                continue;
            }
            let hash_width = read.width();
            if hash_width == write_width {
                continue;
            }
            if hash_width > write_width {
                let lo = read.range.lo;
                read.range = BitRange::new(lo, lo + write_width - 1);
                changed += 1;
            } else {
                let pad_lo = fa.write.range.lo + hash_width;
                let pad_hi = fa.write.range.hi;
                let mut pad_write = fa.write.clone();
                pad_write.range = BitRange::new(pad_lo, pad_hi);
                let zero = ActionParam::constant(0, pad_hi - pad_lo + 1);
                padding.push(FieldAction::new(format!("{}.hash_pad", fa.name), Opcode::Set, pad_write, vec![zero]));
                changed += 1;
            }
        }
    }

    body.extend(padding);
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::action_param::{ActionParam, Speciality};

    #[test]
    fn wide_hash_dist_operand_is_sliced() {
        let dst = ActionParam::phv(0, BitRange::new(0, 7));
        let mut hash = ActionParam::phv(1, BitRange::new(0, 15)).with_speciality(Speciality::HashDist);
        hash.source = Source::HashDist("h0".into());
        let mut body = vec![FieldAction::new("a0", Opcode::Set, dst, vec![hash])];
        let mut ctx = Context::default();
        let changed = run(&mut body, &mut ctx);
        assert_eq!(changed, 1);
        assert_eq!(body[0].reads[0].width(), 8);
    }

    #[test]
    fn narrow_hash_dist_operand_gets_zero_pad() {
        let dst = ActionParam::phv(0, BitRange::new(0, 15));
        let mut hash = ActionParam::phv(1, BitRange::new(0, 7));
        hash.source = Source::HashDist("h0".into());
        let mut body = vec![FieldAction::new("a0", Opcode::Set, dst, vec![hash])];
        let mut ctx = Context::default();
        let changed = run(&mut body, &mut ctx);
        assert_eq!(changed, 1);
        assert_eq!(body.len(), 2);
        assert_eq!(body[1].write.range, BitRange::new(8, 15));
    }

    #[test]
    fn equal_width_untouched() {
        let dst = ActionParam::phv(0, BitRange::new(0, 7));
        let mut hash = ActionParam::phv(1, BitRange::new(0, 7));
        hash.source = Source::HashDist("h0".into());
        let mut body = vec![FieldAction::new("a0", Opcode::Set, dst, vec![hash])];
        let mut ctx = Context::default();
        assert_eq!(run(&mut body, &mut ctx), 0);
        assert_eq!(body.len(), 1);
    }
}
