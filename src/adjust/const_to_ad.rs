//! Pass 5: ConstantsToActionData (specification §4.6).
//!
//! A constant operand that cannot be represented in an ALU's constant
//! source slot (the opcode's `constant_range_bits`, specification §4.3
//! step 6) is replaced by an action-data parameter keyed by
//! `(action_name, container, container_bits)`; the action-format allocator
//! assigns the real byte offset later, so here the key alone stands in for
//! the eventual offset.

use crate::adjust::ActionBody;
use crate::context::Context;
use crate::model::action_param::{ParamKind, Source};

/// Does `value` fit in the opcode's signed constant range? `set` gets the
/// wide `LOADCONST_MAX` range; every other opcode gets the 3-bit signed
/// range (specification §4.3 step 6).
fn fits_constant_range(value: i64, range_bits: u32) -> bool {
    let half = 1i64 << (range_bits - 1);
    value >= -half && value < half
}

pub fn run(body: &mut ActionBody, _ctx: &mut Context) -> usize {
    let mut changed = 0;
    for fa in body.iter_mut() {
        let range_bits = fa.opcode.constant_range_bits();
        for (slot, read) in fa.reads.iter_mut().enumerate() {
            if read.kind != ParamKind::Constant {
                continue;
            }
            let Source::Literal(value) = read.source else { continue };
            if fits_constant_range(value, range_bits) {
                continue;
            }
            let key = format!("{}.ad_const.{}.{}", fa.name, slot, read.range);
            read.kind = ParamKind::ActionData;
            read.source = Source::ActionArg(key);
            changed += 1;
        }
    }
    changed
}
