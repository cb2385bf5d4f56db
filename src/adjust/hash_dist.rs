//! Pass 6: ExpressionsToHash (specification §4.6).
//!
//! A constant operand an earlier check has flagged as better served by the
//! hash-distribution bus (the `CONSTANT_TO_HASH` disposition, specification
//! §4.4 "Error propagation") is replaced by a `HashDist` operand carrying a
//! canonical name derived from the action and slot, so later per-table
//! consistency checks (specification §4.7) can compare hash expressions by
//! equality.

use crate::adjust::ActionBody;
use crate::context::Context;
use crate::model::action_param::{ParamKind, Source, Speciality};

/// Constants on bitwise opcodes whose value is a power of two (a single-bit
/// mask) are cheaper to source from the hash-distribution bus than from
/// action data, mirroring the container-action verifier's
/// `CONSTANT_TO_HASH` recoverable disposition.
fn prefers_hash(value: i64) -> bool {
    value > 0 && (value & (value - 1)) == 0
}

pub fn run(body: &mut ActionBody, _ctx: &mut Context) -> usize {
    let mut changed = 0;
    for fa in body.iter_mut() {
        if !fa.opcode.is_bitwise_overwritable() {
            continue;
        }
        for (slot, read) in fa.reads.iter_mut().enumerate() {
            if read.kind != ParamKind::Constant {
                continue;
            }
            let Source::Literal(value) = read.source else { continue };
            if !prefers_hash(value) {
                continue;
            }
            let key = format!("{}.hash.{}", fa.name, slot);
            read.kind = ParamKind::Phv;
            read.source = Source::HashDist(key);
            read.speciality = Speciality::HashDist;
            changed += 1;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::bitvec::BitRange;
    use crate::model::action_param::ActionParam;
    use crate::model::field_action::{FieldAction, Opcode};

    #[test]
    fn power_of_two_mask_on_or_becomes_hash_dist() {
        let dst = ActionParam::phv(0, BitRange::new(0, 31));
        let a = ActionParam::phv(1, BitRange::new(0, 31));
        let mask = ActionParam::constant(16, 8);
        let mut body = vec![FieldAction::new("a0", Opcode::Or, dst, vec![a, mask])];
        let mut ctx = Context::default();
        let changed = run(&mut body, &mut ctx);
        assert_eq!(changed, 1);
        assert!(matches!(body[0].reads[1].source, Source::HashDist(_)));
        assert_eq!(body[0].reads[1].speciality, Speciality::HashDist);
    }

    #[test]
    fn non_power_of_two_mask_untouched() {
        let dst = ActionParam::phv(0, BitRange::new(0, 31));
        let a = ActionParam::phv(1, BitRange::new(0, 31));
        let mask = ActionParam::constant(6, 8);
        let mut body = vec![FieldAction::new("a0", Opcode::Or, dst, vec![a, mask])];
        let mut ctx = Context::default();
        assert_eq!(run(&mut body, &mut ctx), 0);
    }

    #[test]
    fn non_bitwise_opcode_untouched() {
        let dst = ActionParam::phv(0, BitRange::new(0, 31));
        let a = ActionParam::phv(1, BitRange::new(0, 31));
        let mask = ActionParam::constant(16, 8);
        let mut body = vec![FieldAction::new("a0", Opcode::Add, dst, vec![a, mask])];
        let mut ctx = Context::default();
        assert_eq!(run(&mut body, &mut ctx), 0);
    }
}
