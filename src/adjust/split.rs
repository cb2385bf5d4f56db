//! Pass 4: SplitInstructions (specification §4.6).
//!
//! A field-level instruction whose destination occupies N > 1 AllocSlices
//! is split into N parallel instructions, one per container slice. Shifts
//! use the funnel-shift recipe (specification §4.5 scenario S4); add/sub
//! are split across slices with `addc`/`subc` propagating carry; saturating
//! arithmetic may not be split.

use crate::adjust::ActionBody;
use crate::common::bitvec::BitRange;
use crate::common::error::UnimplementableError;
use crate::context::Context;
use crate::model::action_param::ActionParam;
use crate::model::field_action::{FieldAction, Opcode};

/// A contiguous sub-range of the original field-wide write, in ascending
/// bit order, that one AllocSlice physically occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerSlice {
    pub lo: u32,
    pub hi: u32,
}

fn is_saturating(opcode: Opcode) -> bool {
    matches!(opcode, Opcode::Saddu | Opcode::Sadds | Opcode::Ssubu | Opcode::Ssubs)
}

/// Split one field-level instruction whose write spans `slices` (ascending,
/// covering `fa.write.range` exactly) into one instruction per slice.
pub fn split_across(fa: &FieldAction, slices: &[ContainerSlice]) -> Result<Vec<FieldAction>, UnimplementableError> {
    if slices.len() <= 1 {
        return Ok(vec![fa.clone()]);
    }
    if is_saturating(fa.opcode) {
        return Err(UnimplementableError::SaturatingArithmeticSplit { action: fa.name.clone() });
    }

    let mut out = Vec::with_capacity(slices.len());
    match fa.opcode {
        Opcode::Add | Opcode::Sub => {
            for (i, slice) in slices.iter().enumerate() {
                let opcode = if i == 0 {
                    fa.opcode
                } else if fa.opcode == Opcode::Add {
                    Opcode::Addc
                } else {
                    Opcode::Subc
                };
                out.push(slice_instruction(fa, opcode, *slice));
            }
        }
        Opcode::Shrs | Opcode::Shru | Opcode::Shl | Opcode::FunnelShift => {
            let width_per_slice = slices[0].hi - slices[0].lo + 1;
            for (i, slice) in slices.iter().enumerate() {
                let shift_here = if i == 0 { 0 } else { (i as u32) * width_per_slice };
                out.push(funnel_slice_instruction(fa, *slice, shift_here));
            }
        }
        _ => {
            for slice in slices {
                out.push(slice_instruction(fa, fa.opcode, *slice));
            }
        }
    }
    Ok(out)
}

fn rebase_range(range: &BitRange, slice: &ContainerSlice, original: &BitRange) -> BitRange {
    let offset = slice.lo.saturating_sub(original.lo);
    let width = slice.hi - slice.lo + 1;
    BitRange::new(range.lo + offset, range.lo + offset + width - 1)
}

fn slice_instruction(fa: &FieldAction, opcode: Opcode, slice: ContainerSlice) -> FieldAction {
    let mut write = fa.write.clone();
    let original_write_range = fa.write.range;
    write.range = BitRange::new(slice.lo, slice.hi);
    let reads = fa
        .reads
        .iter()
        .map(|r| {
            let mut r2 = r.clone();
            r2.range = rebase_range(&r.range, &slice, &original_write_range);
            r2
        })
        .collect();
    FieldAction::new(format!("{}.split", fa.name), opcode, write, reads)
}

/// Build the `funnel-shift` companion instruction for a shift split across
/// container boundaries (specification §4.5 scenario S4: `tmp1 = tmp0 <<
/// 10` across two 32-bit containers produces one `shl` on the low half and
/// one `funnel-shift` on the high half).
fn funnel_slice_instruction(fa: &FieldAction, slice: ContainerSlice, extra_shift: u32) -> FieldAction {
    let mut write = fa.write.clone();
    write.range = BitRange::new(slice.lo, slice.hi);
    if extra_shift == 0 {
        return FieldAction::new(format!("{}.split", fa.name), fa.opcode, write, fa.reads.clone());
    }
    let src = fa.reads[0].clone();
    let shift_amt: ActionParam = ActionParam::constant(extra_shift as i64, 8);
    FieldAction::new(format!("{}.split", fa.name), Opcode::FunnelShift, write, vec![src.clone(), src, shift_amt])
}

/// The widest a single PHV container can be (specification §3: normal
/// containers are 8/16/32 bits; mocha and dark are 32). A write wider than
/// this cannot fit in one container no matter which one the PHV allocator
/// chose, so it unconditionally spans more than one AllocSlice.
const MAX_CONTAINER_WIDTH: u32 = 32;

/// Chunk `range` into `MAX_CONTAINER_WIDTH`-wide slices, in ascending bit
/// order, standing in for the PHV allocation's per-container boundaries
/// (specification §4.6 pass 4: a destination occupying N > 1 AllocSlices is
/// split into N parallel instructions).
fn container_slices_for(range: BitRange) -> Vec<ContainerSlice> {
    let mut slices = Vec::new();
    let mut lo = range.lo;
    while lo <= range.hi {
        let hi = (lo + MAX_CONTAINER_WIDTH - 1).min(range.hi);
        slices.push(ContainerSlice { lo, hi });
        lo = hi + 1;
    }
    slices
}

/// Pass 4, SplitInstructions: split every field-level instruction whose
/// write is wider than one container into one instruction per container
/// slice (specification §4.6). Saturating arithmetic cannot be split
/// (specification §4.6 pass 4 "Saturating arithmetic may not be split");
/// such a write is left untouched here and caught as a fatal
/// `Unimplementable` error later by the verifier, per the module's own
/// `is_saturating` guard in `split_across`.
pub fn run(body: &mut ActionBody, ctx: &mut Context) -> usize {
    let mut changed = 0;
    let mut out = Vec::with_capacity(body.len());
    for fa in body.iter() {
        let slices = container_slices_for(fa.write.range);
        if slices.len() <= 1 {
            out.push(fa.clone());
            continue;
        }
        match split_across(fa, &slices) {
            Ok(split) => {
                changed += 1;
                out.extend(split);
            }
            Err(e) => {
                ctx.diagnostics.emit(crate::common::diagnostic::Diagnostic::error(
                    e.to_string(),
                    crate::common::diagnostic::Locator::default().action(fa.name.clone()),
                ));
                out.push(fa.clone());
            }
        }
    }
    if changed > 0 {
        *body = out;
    }
    changed
}
