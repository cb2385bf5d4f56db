//! Container-Action Verifier (specification §4.4, C5).
//!
//! Runs the alignment solver on every container touched by an action and
//! layers the container-wide rules the solver alone doesn't check: read-size
//! equality, commutativity-driven source-slot pinning, and the three-way
//! error disposition (recoverable by re-layout, recoverable by constant
//! promotion, or fatal) described in specification §4.4 "Error propagation".

use crate::adjust::merge::{aggregate_per_source, container_for_group, group_indices_by_destination};
use crate::adjust::ActionBody;
use crate::alignment::{self, SourceRef};
use crate::model::container::Container;
use crate::model::container_action::{ContainerAction, ContainerActionError};
use crate::model::field_action::{Alignment, FieldAction, Opcode};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ok,
    RecoverableRelayout,
    RecoverableConstantPromotion,
    Fatal,
}

pub fn classify_disposition(action: &ContainerAction) -> Disposition {
    if action.error.is_empty() {
        Disposition::Ok
    } else if action.error.recoverable_by_relayout() {
        Disposition::RecoverableRelayout
    } else if action.error.recoverable_by_constant_promotion() {
        Disposition::RecoverableConstantPromotion
    } else {
        Disposition::Fatal
    }
}

#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub action: ContainerAction,
    pub disposition: Disposition,
}

/// Check that all reads from the same source on this container have equal
/// width (matching the container), unless they are bit-slices that combine
/// into one contiguous range (specification §4.4 "Read-size equality").
fn check_read_size_equality(action: &mut ContainerAction) {
    let mut offending = false;
    for total in action.phv_alignment.values() {
        let combined_contiguous = total.direct_read_bits.is_contiguous();
        let individually_equal_width =
            total.indiv_alignments.windows(2).all(|w| w[0].read_bits.size() == w[1].read_bits.size());
        if !combined_contiguous && !individually_equal_width {
            offending = true;
        }
    }
    if offending {
        action.add_error(ContainerActionError::DIFFERENT_READ_SIZE);
    }
}

/// Enforce that a non-commutative opcode pins its first read to the src1
/// slot (specification §4.4 "Commutativity").
fn check_commutativity(action: &mut ContainerAction, opcode: Opcode) {
    if opcode.is_commutative() {
        return;
    }
    use crate::model::field_action::SrcSlot;
    let mut offending = false;
    for total in action.phv_alignment.values() {
        let has_src2_only = total
            .indiv_alignments
            .iter()
            .any(|a| a.src_slot == SrcSlot::Src2)
            && !total.indiv_alignments.iter().any(|a| a.src_slot == SrcSlot::Src1);
        if has_src2_only && action.phv_source_count > 1 {
            offending = true;
        }
    }
    if offending {
        action.add_error(ContainerActionError::OPERAND_MISMATCH);
    }
}

/// Verify one container's aggregated field-level alignments, as produced
/// after operand classification and alignment solving for every field-level
/// instruction that targets it in one action.
pub fn verify_container(
    container: Container,
    opcode: Opcode,
    per_source: HashMap<SourceRef, Vec<Alignment>>,
) -> VerifyReport {
    match alignment::solve(container, opcode, per_source) {
        Ok(mut action) => {
            check_read_size_equality(&mut action);
            check_commutativity(&mut action, opcode);
            let disposition = classify_disposition(&action);
            VerifyReport { action, disposition }
        }
        Err(_) => {
            let mut action = ContainerAction::new(container, opcode);
            action.add_error(ContainerActionError::IMPOSSIBLE_ALIGNMENT);
            VerifyReport { action, disposition: Disposition::RecoverableRelayout }
        }
    }
}

/// Verify every container touched by one action.
pub fn verify_action(
    containers: HashMap<Container, (Opcode, HashMap<SourceRef, Vec<Alignment>>)>,
) -> HashMap<Container, VerifyReport> {
    containers
        .into_iter()
        .map(|(container, (opcode, per_source))| (container, verify_container(container, opcode, per_source)))
        .collect()
}

/// One named field-level instruction group's verification result, keyed by
/// the representative name(s) so a caller can report which instruction(s)
/// a fatal disposition traces back to.
#[derive(Debug, Clone)]
pub struct BodyVerifyReport {
    pub names: Vec<String>,
    pub report: VerifyReport,
}

/// Run the Container-Action Verifier (specification §4.4) over every
/// container an action body touches, real pipeline output included — not
/// just hand-built test fixtures. Groups the body the same way
/// [`crate::adjust::merge::run`] does (same destination `(kind, source)`
/// pair, specification §4.6 pass 7), so a body already fully merged into
/// one instruction per container and a body that still has several
/// field-level instructions per container are both checked uniformly
/// (specification §4.4 applies to every container write, not only merge
/// candidates).
pub fn verify_body(body: &ActionBody) -> Vec<BodyVerifyReport> {
    group_indices_by_destination(body)
        .into_iter()
        .map(|idxs| {
            let group: Vec<&FieldAction> = idxs.iter().map(|&i| &body[i]).collect();
            let container = container_for_group(&group);
            let (per_source, _) = aggregate_per_source(container, &group);
            let opcode = group[0].opcode;
            let names = group.iter().map(|fa| fa.name.clone()).collect();
            BodyVerifyReport { names, report: verify_container(container, opcode, per_source) }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::bitvec::BitRange;
    use crate::model::container::ContainerKind;
    use crate::model::field_action::SrcSlot;

    #[test]
    fn clean_container_action_is_ok() {
        let dst = Container::new(ContainerKind::NormalB, 0);
        let src = Container::new(ContainerKind::NormalB, 1);
        let mut per_source = HashMap::new();
        per_source.insert(
            SourceRef::Phv(src),
            vec![Alignment::new(BitRange::new(0, 7), BitRange::new(0, 7), SrcSlot::Src1)],
        );
        let report = verify_container(dst, Opcode::Set, per_source);
        assert_eq!(report.disposition, Disposition::Ok);
    }

    #[test]
    fn impossible_alignment_is_recoverable_by_relayout() {
        let dst = Container::new(ContainerKind::NormalB, 0);
        let src = Container::new(ContainerKind::NormalB, 1);
        let mut per_source = HashMap::new();
        per_source.insert(
            SourceRef::Phv(src),
            vec![
                Alignment::new(BitRange::new(0, 1), BitRange::new(0, 1), SrcSlot::Src1),
                Alignment::new(BitRange::new(2, 3), BitRange::new(5, 6), SrcSlot::Src1),
            ],
        );
        let report = verify_container(dst, Opcode::DepositField, per_source);
        assert_eq!(report.disposition, Disposition::RecoverableRelayout);
    }

    /// A body with exactly one write per container still runs through
    /// `alignment::solve` via `verify_body` — merging only kicks in for
    /// containers with more than one field-level instruction, but
    /// verification is unconditional (specification §4.4).
    #[test]
    fn single_write_container_is_still_solved_and_verified() {
        use crate::model::action_param::ActionParam;
        let dst = ActionParam::phv(0, BitRange::new(0, 7));
        let src = ActionParam::phv(1, BitRange::new(0, 7));
        let body = vec![FieldAction::new("a0", Opcode::Set, dst, vec![src])];
        let reports = verify_body(&body);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].report.disposition, Disposition::Ok);
        assert_eq!(reports[0].report.action.phv_source_count, 1);
    }
}
