//! Pass 7: MergeInstructions (specification §4.6), the inverse of
//! SplitInstructions (pass 4).
//!
//! For each container that still has multiple field-level instructions
//! writing to it, builds one merged ALU instruction whose sources are the
//! de-duplicated source containers / action-data / constant, choosing among
//! `set`, `deposit-field`, `bitmasked-set`, `byte-rotate-merge` via the
//! alignment solver (specification §4.3 step 3).
//!
//! A container's identity is not carried on [`ActionParam`] (the PHV
//! allocation that assigns fields to containers is an external input, out
//! of scope per specification §1); instructions are grouped here by their
//! destination's `(kind, source)` pair instead, which stands in for "same
//! container" at this level of the model. The bit `range` of each
//! individual write is deliberately excluded from the key: two field-level
//! instructions writing disjoint bytes of the same container still need to
//! merge, even though their individual write ranges differ.

use crate::adjust::ActionBody;
use crate::alignment::{self, SourceRef};
use crate::common::bitvec::BitRange;
use crate::context::Context;
use crate::model::action_param::{ActionParam, ParamKind, Source};
use crate::model::container::{Container, ContainerKind};
use crate::model::container_action::Variant;
use crate::model::field_action::{Alignment, FieldAction, Opcode, SrcSlot};
use itertools::Itertools;
use std::collections::HashMap;

/// The synthetic container a group of same-destination field-level
/// instructions targets: its width is the widest individual write bit seen
/// in the group, since a container must be at least as wide as anything
/// written into it (no separate container-width field exists at this level
/// of the model, per the module's doc comment above).
///
/// `pub(crate)` so [`crate::verify::verify_body`] can build the identical
/// per-container view for a group of exactly one field-level instruction,
/// the case this function is also otherwise used for (every write that
/// isn't itself the product of a multi-instruction merge still needs to be
/// verified, per specification §4.4, which applies unconditionally).
pub(crate) fn container_for_group(group: &[&FieldAction]) -> Container {
    let width = group.iter().map(|fa| fa.write.range.hi + 1).max().unwrap_or(8);
    let kind = if width <= 8 {
        ContainerKind::NormalB
    } else if width <= 16 {
        ContainerKind::NormalH
    } else {
        ContainerKind::NormalW
    };
    Container::new(kind, 0)
}

fn variant_opcode(variant: Variant) -> Opcode {
    match variant {
        Variant::Set => Opcode::Set,
        Variant::DepositField => Opcode::DepositField,
        Variant::BitmaskedSet => Opcode::BitmaskedSet,
        Variant::ByteRotateMerge => Opcode::ByteRotateMerge,
    }
}

/// Build the per-container alignment view the solver and verifier both
/// consume from one destination group: the destination container, the
/// per-source-container/action-data/constant alignment lists, and the
/// de-duplicated read list a merged instruction would carry.
///
/// `pub(crate)` for the same reason as [`container_for_group`]: both the
/// merge pass and the verifier need this exact aggregation, the former to
/// decide what to merge into, the latter to check every container an action
/// touches, merged or not.
pub(crate) fn aggregate_per_source(
    container: Container,
    group: &[&FieldAction],
) -> (HashMap<SourceRef, Vec<Alignment>>, Vec<ActionParam>) {
    let mut per_source: HashMap<SourceRef, Vec<Alignment>> = HashMap::new();
    let mut phv_slot: HashMap<Source, SrcSlot> = HashMap::new();
    let mut phv_container: HashMap<Source, Container> = HashMap::new();
    let mut next_slot = [SrcSlot::Src1, SrcSlot::Src2, SrcSlot::Src3].into_iter();
    let mut next_index = 1u32;

    for fa in group {
        for read in &fa.reads {
            let source_ref = match read.kind {
                ParamKind::Phv => {
                    // Distinct source containers need distinct identities;
                    // the index itself is arbitrary since only the
                    // destination container's kind/width feeds the solver.
                    let c = *phv_container.entry(read.source.clone()).or_insert_with(|| {
                        let c = Container::new(container.kind, next_index);
                        next_index += 1;
                        c
                    });
                    SourceRef::Phv(c)
                }
                ParamKind::ActionData => SourceRef::ActionData,
                ParamKind::Constant => SourceRef::Constant,
            };
            let slot = if read.kind == ParamKind::Phv {
                *phv_slot.entry(read.source.clone()).or_insert_with(|| next_slot.next().unwrap_or(SrcSlot::Src3))
            } else {
                SrcSlot::Src1
            };
            let alignment = Alignment::new(fa.write.range, read.range, slot);
            per_source.entry(source_ref).or_default().push(alignment);
        }
    }
    // A merged instruction carries each distinct source only once, even if
    // several field-level instructions in the group read it.
    let dedup_reads: Vec<ActionParam> =
        group.iter().flat_map(|fa| fa.reads.iter().cloned()).unique_by(|r| r.source.clone()).collect();
    (per_source, dedup_reads)
}

/// Merge one container's field-level instructions (`group`, all sharing
/// `write`) into a single ALU instruction, or `None` if the alignment
/// solver cannot find a realizable variant (left for a later re-layout).
fn merge_group(write: &ActionParam, group: &[&FieldAction]) -> Option<FieldAction> {
    let container = container_for_group(group);
    let (per_source, dedup_reads) = aggregate_per_source(container, group);

    let Some(first) = group.first() else {
        crate::common::error::bug!("merge_group called with an empty group");
    };
    let opcode = first.opcode;
    let action = alignment::solve(container, opcode, per_source).ok()?;
    let merged_opcode = action.variant.map(variant_opcode).unwrap_or(opcode);
    let name = group.iter().map(|fa| fa.name.as_str()).collect::<Vec<_>>().join("+");
    Some(FieldAction::new(name, merged_opcode, write.clone(), dedup_reads))
}

/// Group a body's field-level instructions by destination: two instructions
/// whose write shares a `(kind, source)` pair target the same container even
/// if their individual bit ranges differ (specification §4.6 pass 7).
/// `pub(crate)` so the verifier can walk the same groups this pass merges.
pub(crate) fn group_indices_by_destination(body: &[FieldAction]) -> Vec<Vec<usize>> {
    let mut groups: Vec<((ParamKind, Source), Vec<usize>)> = Vec::new();
    for (i, fa) in body.iter().enumerate() {
        let key = (fa.write.kind, fa.write.source.clone());
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some(g) => g.1.push(i),
            None => groups.push((key, vec![i])),
        }
    }
    groups.into_iter().map(|(_, idxs)| idxs).collect()
}

/// Only groups with more than one field-level instruction need merging —
/// a lone write is already one ALU instruction and has nothing to combine
/// with. This does *not* skip the alignment solver for single-write
/// containers in general: [`crate::verify::verify_body`] calls
/// [`aggregate_per_source`]/`alignment::solve` over every group this
/// function produces via [`group_indices_by_destination`], single-write
/// groups included, since specification §4.4 verification applies to every
/// container an action touches regardless of how many instructions wrote it.
pub fn run(body: &mut ActionBody, _ctx: &mut Context) -> usize {
    let mergeable: Vec<Vec<usize>> =
        group_indices_by_destination(body).into_iter().filter(|idxs| idxs.len() > 1).collect();
    if mergeable.is_empty() {
        return 0;
    }

    let mut changed = 0;
    let mut consumed = vec![false; body.len()];
    let mut merged = Vec::new();
    for idxs in &mergeable {
        let group: Vec<&FieldAction> = idxs.iter().map(|&i| &body[i]).collect();
        let container_width = group.iter().map(|fa| fa.write.range.hi + 1).max().unwrap_or(8);
        let mut write = group[0].write.clone();
        write.range = BitRange::new(0, container_width - 1);
        if let Some(fa) = merge_group(&write, &group) {
            for &i in idxs {
                consumed[i] = true;
            }
            merged.push(fa);
            changed += 1;
        }
    }

    if changed > 0 {
        let mut new_body: ActionBody =
            body.iter().enumerate().filter(|(i, _)| !consumed[*i]).map(|(_, fa)| fa.clone()).collect();
        new_body.extend(merged);
        *body = new_body;
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::bitvec::BitRange;

    #[test]
    fn two_disjoint_byte_writes_merge_into_one_instruction() {
        let dst = ActionParam::phv(0, BitRange::new(0, 31));
        let src_a = ActionParam::phv(1, BitRange::new(0, 7));
        let src_b = ActionParam::phv(2, BitRange::new(0, 7));
        let mut write_a = dst.clone();
        write_a.range = BitRange::new(0, 7);
        let mut write_b = dst.clone();
        write_b.range = BitRange::new(8, 15);
        // Same destination field (kind + source), disjoint byte ranges: the
        // grouping key ignores `range`, so these belong to the same group.
        let mut body =
            vec![FieldAction::new("a0", Opcode::Set, write_a, vec![src_a]), FieldAction::new("a1", Opcode::Set, write_b, vec![src_b])];
        let mut ctx = Context::default();
        let changed = run(&mut body, &mut ctx);
        assert_eq!(changed, 1);
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn single_instruction_per_container_untouched() {
        let dst = ActionParam::phv(0, BitRange::new(0, 7));
        let src = ActionParam::phv(1, BitRange::new(0, 7));
        let mut body = vec![FieldAction::new("a0", Opcode::Set, dst, vec![src])];
        let mut ctx = Context::default();
        assert_eq!(run(&mut body, &mut ctx), 0);
        assert_eq!(body.len(), 1);
    }
}
