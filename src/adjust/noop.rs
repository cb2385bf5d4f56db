//! Pass 1: EliminateNoopInstructions (specification §4.6).
//!
//! Deletes `or A,A,A`, `and A,A,A`, `set A,A` where destination and sources
//! resolve to identical operands.

use crate::adjust::ActionBody;
use crate::context::Context;
use crate::model::field_action::Opcode;

pub fn run(body: &mut ActionBody, _ctx: &mut Context) -> usize {
    let before = body.len();
    body.retain(|fa| !is_noop(fa));
    before - body.len()
}

fn is_noop(fa: &crate::model::field_action::FieldAction) -> bool {
    match fa.opcode {
        Opcode::Set => fa.reads.len() == 1 && fa.reads[0] == fa.write,
        Opcode::Or | Opcode::And => fa.reads.len() == 2 && fa.reads[0] == fa.write && fa.reads[1] == fa.write,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::bitvec::BitRange;
    use crate::model::action_param::ActionParam;
    use crate::model::field_action::FieldAction;

    #[test]
    fn idempotent_on_empty_body() {
        // R2: EliminateNoopInstructions is idempotent.
        let mut body: ActionBody = Vec::new();
        let mut ctx = Context::default();
        assert_eq!(run(&mut body, &mut ctx), 0);
    }

    #[test]
    fn removes_self_or() {
        let a = ActionParam::phv(1, BitRange::new(0, 7));
        let fa = FieldAction::new("n", Opcode::Or, a.clone(), vec![a.clone(), a]);
        let mut body = vec![fa];
        let mut ctx = Context::default();
        let removed = run(&mut body, &mut ctx);
        assert_eq!(removed, 1);
        assert!(body.is_empty());
    }

    #[test]
    fn pass_is_idempotent() {
        let a = ActionParam::phv(1, BitRange::new(0, 7));
        let b = ActionParam::phv(2, BitRange::new(0, 7));
        let mut body = vec![FieldAction::new("n", Opcode::Add, a.clone(), vec![a, b])];
        let mut ctx = Context::default();
        run(&mut body, &mut ctx);
        let snapshot = body.clone();
        run(&mut body, &mut ctx);
        assert_eq!(body, snapshot);
    }

    /// R2: EliminateNoopInstructions is idempotent, on arbitrary bodies of
    /// noop and non-noop `set` instructions.
    #[quickcheck_macros::quickcheck]
    fn eliminate_noop_is_idempotent_on_any_body(is_noop_pattern: Vec<bool>) -> bool {
        let mut body: ActionBody = is_noop_pattern
            .into_iter()
            .take(16)
            .enumerate()
            .map(|(i, is_noop)| {
                let dst = ActionParam::phv(i as u32, BitRange::new(0, 7));
                let src = if is_noop { dst.clone() } else { ActionParam::phv(i as u32 + 1000, BitRange::new(0, 7)) };
                FieldAction::new(format!("n{i}"), Opcode::Set, dst, vec![src])
            })
            .collect();
        let mut ctx = Context::default();
        run(&mut body, &mut ctx);
        let once = body.clone();
        run(&mut body, &mut ctx);
        body == once
    }
}
