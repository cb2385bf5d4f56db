//! Pass 8: AdjustStatefulInstructions (specification §4.6).
//!
//! Inside a stateful-ALU (SALU) action, every PHV field reference is
//! converted to a slice of `phv_lo` or `phv_hi`, depending on which half of
//! the ALU's input crossbar allocation placed it: a field could be split
//! in the PHV, but a SALU instruction only ever sees one of its two fixed
//! 32-bit input halves. Validates that the field's bits are byte-aligned
//! and byte-contiguous — a field straddling the lo/hi boundary or landing
//! on a non-byte boundary cannot be resolved.

use crate::adjust::ActionBody;
use crate::common::diagnostic::{Diagnostic, Locator};
use crate::context::Context;
use crate::model::action_param::{ParamKind, Source, Speciality};

fn is_stateful_read(speciality: Speciality) -> bool {
    matches!(speciality, Speciality::MeterAlu | Speciality::StfulCounter)
}

/// Half of the SALU's source word a field lands in, by absolute bit
/// offset within the ALU's 64-bit input window (two 32-bit halves).
fn resolve_half(lo: u32, half_width: u32) -> (&'static str, u32) {
    if lo >= half_width {
        ("phv_hi", lo - half_width)
    } else {
        ("phv_lo", lo)
    }
}

pub fn run(body: &mut ActionBody, ctx: &mut Context) -> usize {
    let half_width = 32;
    let mut changed = 0;
    for fa in body.iter_mut() {
        for read in fa.reads.iter_mut() {
            if read.kind != ParamKind::Phv || !is_stateful_read(read.speciality) {
                continue;
            }
            let field_id = match read.source {
                Source::Field(id) => id,
                _ => continue,
            };
            let width = read.width();
            let (half, offset) = resolve_half(read.range.lo, half_width);
            if offset + width > half_width {
                ctx.diagnostics.emit(Diagnostic::error(
                    format!("field{field_id} straddles the stateful ALU's phv_lo/phv_hi boundary"),
                    Locator::default().action(fa.name.clone()),
                ));
                continue;
            }
            if read.range.lo % 8 != 0 {
                ctx.diagnostics.emit(Diagnostic::error(
                    format!("field{field_id} is not byte-aligned on the stateful ALU input crossbar"),
                    Locator::default().action(fa.name.clone()),
                ));
                continue;
            }
            read.source = Source::ActionArg(half.to_string());
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

    fn stateful_read(field_id: u32, lo: u32, hi: u32) -> ActionParam {
        ActionParam::phv(field_id, BitRange::new(lo, hi)).with_speciality(Speciality::StfulCounter)
    }

    #[test]
    fn low_half_field_becomes_phv_lo() {
        let dst = ActionParam::phv(0, BitRange::new(0, 7));
        let src = stateful_read(1, 0, 7);
        let mut body = vec![FieldAction::new("a0", Opcode::Set, dst, vec![src])];
        let mut ctx = Context::default();
        let changed = run(&mut body, &mut ctx);
        assert_eq!(changed, 1);
        assert_eq!(body[0].reads[0].source, Source::ActionArg("phv_lo".into()));
    }

    #[test]
    fn high_half_field_becomes_phv_hi() {
        let dst = ActionParam::phv(0, BitRange::new(0, 7));
        let src = stateful_read(1, 32, 39);
        let mut body = vec![FieldAction::new("a0", Opcode::Set, dst, vec![src])];
        let mut ctx = Context::default();
        let changed = run(&mut body, &mut ctx);
        assert_eq!(changed, 1);
        assert_eq!(body[0].reads[0].source, Source::ActionArg("phv_hi".into()));
    }

    #[test]
    fn field_straddling_halves_is_rejected() {
        let dst = ActionParam::phv(0, BitRange::new(0, 15));
        let src = stateful_read(1, 24, 39);
        let mut body = vec![FieldAction::new("a0", Opcode::Set, dst, vec![src])];
        let mut ctx = Context::default();
        let changed = run(&mut body, &mut ctx);
        assert_eq!(changed, 0);
        assert!(ctx.diagnostics.has_errors());
    }

    #[test]
    fn non_stateful_read_untouched() {
        let dst = ActionParam::phv(0, BitRange::new(0, 7));
        let src = ActionParam::phv(1, BitRange::new(0, 7));
        let mut body = vec![FieldAction::new("a0", Opcode::Set, dst, vec![src])];
        let mut ctx = Context::default();
        assert_eq!(run(&mut body, &mut ctx), 0);
    }
}
