//! Pass 3: RewriteReductionOr (specification §4.6).
//!
//! When a container-action is flagged as a reduction-or pattern (multiple
//! SALUs OR'ing into a common destination), rewrites the OR into a plain
//! `set` from the attached-output so the first SALU's output drives the
//! container directly.

use crate::adjust::ActionBody;
use crate::context::Context;
use crate::model::action_param::{ParamKind, Speciality};
use crate::model::field_action::Opcode;

pub fn run(body: &mut ActionBody, _ctx: &mut Context) -> usize {
    let mut changed = 0;
    for fa in body.iter_mut() {
        if fa.opcode != Opcode::Or {
            continue;
        }
        let all_attached_outputs = !fa.reads.is_empty()
            && fa.reads.iter().all(|r| {
                r.kind == ParamKind::Phv && matches!(r.speciality, Speciality::MeterAlu | Speciality::StfulCounter)
            });
        if all_attached_outputs {
            fa.reads.truncate(1);
            fa.opcode = Opcode::Set;
            changed += 1;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::bitvec::BitRange;
    use crate::model::action_param::{ActionParam, Source};
    use crate::model::field_action::FieldAction;

    fn attached_output(name: &str) -> ActionParam {
        ActionParam {
            kind: ParamKind::Phv,
            source: Source::AttachedOutput(name.into()),
            speciality: Speciality::StfulCounter,
            range: BitRange::new(0, 31),
            is_conditional: false,
        }
    }

    #[test]
    fn reduction_or_of_attached_outputs_becomes_set() {
        let dst = ActionParam::phv(0, BitRange::new(0, 31));
        let mut body =
            vec![FieldAction::new("n", Opcode::Or, dst, vec![attached_output("salu0"), attached_output("salu1")])];
        let mut ctx = Context::default();
        let changed = run(&mut body, &mut ctx);
        assert_eq!(changed, 1);
        assert_eq!(body[0].opcode, Opcode::Set);
        assert_eq!(body[0].reads.len(), 1);
    }

    #[test]
    fn plain_or_of_fields_untouched() {
        let dst = ActionParam::phv(0, BitRange::new(0, 7));
        let a = ActionParam::phv(1, BitRange::new(0, 7));
        let b = ActionParam::phv(2, BitRange::new(0, 7));
        let mut body = vec![FieldAction::new("n", Opcode::Or, dst, vec![a, b])];
        let mut ctx = Context::default();
        assert_eq!(run(&mut body, &mut ctx), 0);
    }
}
