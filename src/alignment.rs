//! Alignment Solver (specification §4.3, C4).
//!
//! Input: for one `(container, opcode)`, the list of `(source, write_bits,
//! read_bits)` triples contributed by every field-level instruction that
//! touches the container. Output: a [`TotalAlignment`] per source plus the
//! flags that select one of the four ALU instruction variants.

use crate::common::bitvec::{BitRange, Bitvec};
use crate::common::error::AlignmentError;
use crate::model::container::Container;
use crate::model::container_action::{ContainerAction, ContainerActionError, Variant};
use crate::model::field_action::{Alignment, Opcode, TotalAlignment};
use std::collections::HashMap;

/// Which kind of source contributes one `Alignment` to a container
/// (distinct PHV source containers are tracked separately; action-data and
/// constant sources are each a single pooled source per container-action).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceRef {
    Phv(Container),
    ActionData,
    Constant,
}

/// Solve the alignment problem for one `(container, opcode)` and return the
/// populated [`ContainerAction`], or an [`AlignmentError`] if no ALU
/// variant can realize it.
pub fn solve(
    container: Container,
    opcode: Opcode,
    per_source: HashMap<SourceRef, Vec<Alignment>>,
) -> Result<ContainerAction, AlignmentError> {
    let width = container.width();
    let mut action = ContainerAction::new(container, opcode);

    // Step 1: congruence. Every (write_bits, read_bits) pair for one source
    // must imply the same right_shift; otherwise the source cannot be
    // realized by a single rotation.
    let mut totals: HashMap<SourceRef, TotalAlignment> = HashMap::new();
    for (source, alignments) in per_source.iter() {
        let mut total = TotalAlignment::new();
        let mut shift: Option<i32> = None;
        for a in alignments {
            let this_shift = a.right_shift(width);
            match shift {
                None => shift = Some(this_shift),
                Some(s) if s != this_shift => {
                    return Err(AlignmentError::ImpossibleAlignment {
                        container: container.to_string(),
                        a: s,
                        b: this_shift,
                    });
                }
                _ => {}
            }
            total.add(*a);
        }
        total.right_shift = shift.unwrap_or(0);
        if !total.popcount_matches() {
            action.add_error(ContainerActionError::IMPOSSIBLE_ALIGNMENT);
        }
        totals.insert(*source, total);
    }

    // Collision check: no two distinct sources may claim the same
    // container bit as a direct write (specification §4.4 "at most one
    // write per container... welcomed only if their bit ranges are
    // disjoint").
    let mut union_bits = Bitvec::empty();
    for (source, total) in totals.iter() {
        if union_bits.intersects(&total.direct_write_bits) {
            action.add_error(ContainerActionError::BIT_COLLISION);
        }
        union_bits = union_bits | total.direct_write_bits;
        action.phv_alignment.insert(
            match source {
                SourceRef::Phv(c) => *c,
                _ => container, // pooled sources keyed by the destination itself
            },
            total.clone(),
        );
    }
    action.write_bits = union_bits;

    // Step 6: source-count rules.
    let phv_sources: Vec<Container> = per_source
        .keys()
        .filter_map(|s| match s {
            SourceRef::Phv(c) => Some(*c),
            _ => None,
        })
        .collect();
    action.phv_source_count = phv_sources.len() as u32;
    if phv_sources.len() > 2 {
        action.add_error(ContainerActionError::TOO_MANY_PHV_SOURCES);
        return Err(AlignmentError::TooManyPhvSources { container: container.to_string() });
    }

    let has_action_data = per_source.contains_key(&SourceRef::ActionData);
    let has_constant = per_source.contains_key(&SourceRef::Constant);
    action.action_data_count = has_action_data as u32;
    action.constant_count = has_constant as u32;

    // Mocha/dark enforcement (step 5).
    if container.is_mocha() {
        let whole_container = union_bits == Bitvec::range(0, width - 1);
        if (has_action_data || has_constant) && !whole_container {
            action.add_error(ContainerActionError::ILLEGAL_OVERWRITE);
            return Err(AlignmentError::IllegalOverwrite { container: container.to_string() });
        }
    }
    if container.is_dark() {
        if has_action_data || has_constant {
            return Err(crate::common::error::AlignmentError::ImpossibleAlignment {
                container: container.to_string(),
                a: 0,
                b: 0,
            });
        }
        let whole_container = union_bits == Bitvec::range(0, width - 1);
        if !whole_container {
            action.add_error(ContainerActionError::ILLEGAL_OVERWRITE);
            return Err(AlignmentError::IllegalOverwrite { container: container.to_string() });
        }
        if phv_sources.len() > 1 {
            action.add_error(ContainerActionError::TOO_MANY_PHV_SOURCES);
            return Err(AlignmentError::TooManyPhvSources { container: container.to_string() });
        }
    }

    // Step 7/8: shift rules.
    if opcode.is_single_shift() {
        if phv_sources.len() != 1 {
            return Err(AlignmentError::ImpossibleAlignment { container: container.to_string(), a: 0, b: 0 });
        }
        if phv_sources[0] != container {
            return Err(AlignmentError::ImpossibleAlignment { container: container.to_string(), a: 0, b: 0 });
        }
    }
    if opcode.is_funnel_shift() && phv_sources.len() != 2 {
        return Err(AlignmentError::ImpossibleAlignment { container: container.to_string(), a: 0, b: 0 });
    }

    // Step 2/3: contiguity and variant selection.
    let whole_container = union_bits == Bitvec::range(0, width - 1);
    let no_read_outside_write = totals.values().all(|t| union_bits.contains(&t.direct_read_bits) || t.direct_read_bits.is_empty());

    let variant = if matches!(opcode, Opcode::Set) || (whole_container && no_read_outside_write && per_source.len() <= 1 && totals.values().all(|t| t.right_shift == 0)) {
        action.total_overwrite_possible = whole_container;
        Variant::Set
    } else if union_bits.is_contiguous() {
        let range = union_bits.contiguous_range().unwrap_or(BitRange::new(0, width - 1));
        action.convert_to_deposit_field = true;
        if range.lo != 0 || range.hi != width - 1 {
            action.implicit_src2 = !per_source.contains_key(&SourceRef::Phv(container));
        }
        Variant::DepositField
    } else if union_bits.is_byte_aligned(width) && phv_sources.len() <= 2 && !has_constant {
        action.convert_to_byte_rotate_merge = true;
        Variant::ByteRotateMerge
    } else {
        action.convert_to_bitmasked_set = true;
        Variant::BitmaskedSet
    };
    action.variant = Some(variant);

    // Step 4: implicit write bits for deposit-field / byte-rotate-merge:
    // bits of the destination outside the direct write union that a
    // preserving source (s2, or the container itself) contributes.
    if matches!(variant, Variant::DepositField | Variant::ByteRotateMerge) {
        let implicit = !union_bits & Bitvec::range(0, width - 1);
        if let Some(t) = totals.get_mut(&SourceRef::Phv(container)) {
            t.implicit_write_bits = implicit;
        }
        for t in action.phv_alignment.values_mut() {
            if t.implicit_write_bits.is_empty() {
                t.implicit_write_bits = implicit;
            }
        }
    }

    if action.impossible {
        return Err(AlignmentError::ImpossibleAlignment { container: container.to_string(), a: 0, b: 0 });
    }

    Ok(action)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::container::ContainerKind;
    use crate::model::field_action::SrcSlot;

    fn c(kind: ContainerKind, idx: u32) -> Container {
        Container::new(kind, idx)
    }

    /// B1. A field exactly one container wide with a whole-container
    /// assignment maps to `set`.
    #[test]
    fn boundary_b1_whole_container_is_set() {
        let dst = c(ContainerKind::NormalB, 0);
        let src = c(ContainerKind::NormalB, 2);
        let mut per_source = HashMap::new();
        per_source.insert(
            SourceRef::Phv(src),
            vec![Alignment::new(BitRange::new(0, 7), BitRange::new(0, 7), SrcSlot::Src1)],
        );
        let action = solve(dst, Opcode::Set, per_source).unwrap();
        assert_eq!(action.variant, Some(Variant::Set));
    }

    /// B2. A write covering all bits except one byte of a 32-bit container
    /// maps to `deposit-field` with a contiguous 24-bit range.
    #[test]
    fn boundary_b2_partial_is_deposit_field() {
        let dst = c(ContainerKind::NormalW, 0);
        let src = c(ContainerKind::NormalW, 1);
        let mut per_source = HashMap::new();
        per_source.insert(
            SourceRef::Phv(src),
            vec![Alignment::new(BitRange::new(8, 31), BitRange::new(8, 31), SrcSlot::Src1)],
        );
        let action = solve(dst, Opcode::DepositField, per_source).unwrap();
        assert_eq!(action.variant, Some(Variant::DepositField));
        assert_eq!(action.write_bits.contiguous_range(), Some(BitRange::new(8, 31)));
    }

    /// B3. Two disjoint byte-writes to the same 32-bit container, each
    /// sourced from a different rotated PHV, map to `byte-rotate-merge`.
    #[test]
    fn boundary_b3_disjoint_byte_writes_are_byte_rotate_merge() {
        let dst = c(ContainerKind::NormalW, 0);
        let src_a = c(ContainerKind::NormalW, 1);
        let src_b = c(ContainerKind::NormalW, 2);
        let mut per_source = HashMap::new();
        per_source.insert(
            SourceRef::Phv(src_a),
            vec![Alignment::new(BitRange::new(0, 7), BitRange::new(8, 15), SrcSlot::Src1)],
        );
        per_source.insert(
            SourceRef::Phv(src_b),
            vec![Alignment::new(BitRange::new(16, 23), BitRange::new(0, 7), SrcSlot::Src2)],
        );
        let action = solve(dst, Opcode::ByteRotateMerge, per_source).unwrap();
        assert_eq!(action.variant, Some(Variant::ByteRotateMerge));
    }

    /// S1. `f1 = f2`, both exactly one container wide, no shift.
    #[test]
    fn scenario_s1_plain_set_no_shift() {
        let dst = c(ContainerKind::NormalB, 0);
        let src = c(ContainerKind::NormalB, 2);
        let mut per_source = HashMap::new();
        per_source.insert(
            SourceRef::Phv(src),
            vec![Alignment::new(BitRange::new(0, 5), BitRange::new(0, 5), SrcSlot::Src1)],
        );
        let action = solve(dst, Opcode::Set, per_source).unwrap();
        let total = &action.phv_alignment[&src];
        assert_eq!(total.right_shift, 0);
    }

    #[test]
    fn inconsistent_rotation_is_impossible() {
        let dst = c(ContainerKind::NormalB, 0);
        let src = c(ContainerKind::NormalB, 2);
        let mut per_source = HashMap::new();
        per_source.insert(
            SourceRef::Phv(src),
            vec![
                Alignment::new(BitRange::new(0, 1), BitRange::new(0, 1), SrcSlot::Src1),
                Alignment::new(BitRange::new(2, 3), BitRange::new(4, 5), SrcSlot::Src1),
            ],
        );
        let result = solve(dst, Opcode::DepositField, per_source);
        assert!(result.is_err());
    }

    #[test]
    fn too_many_phv_sources_rejected() {
        let dst = c(ContainerKind::NormalW, 0);
        let mut per_source = HashMap::new();
        per_source.insert(
            SourceRef::Phv(c(ContainerKind::NormalW, 1)),
            vec![Alignment::new(BitRange::new(0, 7), BitRange::new(0, 7), SrcSlot::Src1)],
        );
        per_source.insert(
            SourceRef::Phv(c(ContainerKind::NormalW, 2)),
            vec![Alignment::new(BitRange::new(8, 15), BitRange::new(0, 7), SrcSlot::Src2)],
        );
        per_source.insert(
            SourceRef::Phv(c(ContainerKind::NormalW, 3)),
            vec![Alignment::new(BitRange::new(16, 23), BitRange::new(0, 7), SrcSlot::Src3)],
        );
        let result = solve(dst, Opcode::BitmaskedSet, per_source);
        assert!(result.is_err());
    }

    #[test]
    fn dark_container_rejects_action_data() {
        let dst = c(ContainerKind::Dark, 0);
        let mut per_source = HashMap::new();
        per_source.insert(
            SourceRef::ActionData,
            vec![Alignment::new(BitRange::new(0, 31), BitRange::new(0, 31), SrcSlot::Src1)],
        );
        let result = solve(dst, Opcode::Set, per_source);
        assert!(result.is_err());
    }
}
