//! Transform & Merge (specification §4.9, C10): materializes placement
//! decisions into the final table layout — stage-split chains, gateway
//! merges, and always-run action merges. Grounded on the teacher's
//! `passes` post-processing style (a free function per transform, run
//! once after the main analysis is done).

use crate::adjust::ActionBody;
use crate::model::container::AllocSlice;
use crate::model::table::{Placed, Table, TableId};
use std::collections::HashMap;

/// One stage of a table that [`crate::place::Placer`] split across
/// multiple stages (specification §4.9: "stage-K's `next["$try_next_stage"]`
/// points to stage-K+1; only the last stage's hit/miss next-table map is
/// populated normally").
#[derive(Debug, Clone)]
pub struct StageChainLink {
    pub table: TableId,
    pub stage: u32,
    pub next_stage_key: Option<&'static str>,
}

/// Walk the placement arena for one table id that was split across stages
/// (`stage_split` on more than one [`Placed`] entry) and build its stage
/// chain, in ascending stage order.
pub fn split_stage_chain(placements: &[Placed], table: TableId) -> Vec<StageChainLink> {
    let mut stages: Vec<u32> = placements.iter().filter(|p| p.table == table).map(|p| p.stage).collect();
    stages.sort_unstable();
    stages.dedup();
    let last = stages.last().copied();
    stages
        .into_iter()
        .map(|stage| StageChainLink {
            table,
            stage,
            next_stage_key: if Some(stage) == last { None } else { Some("$try_next_stage") },
        })
        .collect()
}

/// One action-data-table gateway's branch distribution result: the
/// gateway's original true-branch next-table sequence, copied onto every
/// branch of the table it was merged with (specification §4.9: "the
/// gateway's own true-branch next-sequence is distributed into every
/// branch of the merged table so that tables following the gateway...
/// still execute on every action path").
pub fn merge_gateway(match_table_next: &HashMap<String, Vec<TableId>>, gateway_true_branch: &[TableId]) -> HashMap<String, Vec<TableId>> {
    let mut merged = match_table_next.clone();
    for sequence in merged.values_mut() {
        let mut with_gateway = gateway_true_branch.to_vec();
        with_gateway.extend(sequence.iter().copied());
        *sequence = with_gateway;
    }
    merged
}

/// Always-run actions sharing a `(stage, gress)` slot must be merged into
/// one action body, since the hardware has exactly one always-run slot
/// per stage per gress (specification §4.9 "Always-run actions"). The
/// merge happens after placement, so live ranges must be recomputed:
/// `original_stages` lists every stage the merged bodies were originally
/// placed in (before being unified onto one slot); any `slice` whose live
/// range ended at one of those stages is extended to the maximum of them,
/// since the field must now stay live until the unified action actually
/// runs (specification §4.9 "Always-run actions").
pub fn merge_always_run(bodies: &[ActionBody], slices: &mut [AllocSlice], original_stages: &[u32]) -> ActionBody {
    let mut merged = Vec::new();
    for body in bodies {
        merged.extend(body.iter().cloned());
    }
    extend_live_ranges_to_merge(slices, original_stages);
    merged
}

/// Extend the end of every live range in `slices` that stops at one of
/// `original_stages` out to the maximum stage in that set, leaving slices
/// whose range ends elsewhere untouched.
fn extend_live_ranges_to_merge(slices: &mut [AllocSlice], original_stages: &[u32]) {
    let Some(&max_stage) = original_stages.iter().max() else { return };
    for slice in slices.iter_mut() {
        if original_stages.contains(&slice.live_range.end.stage) {
            slice.live_range.end.stage = max_stage;
        }
    }
}

/// One of the `logical_tables_in_stage` parallel stage-tables an ATCAM
/// table is broken into, all sharing one partition (specification §4.9
/// "ATCAM tables are broken into `logical_tables_in_stage` parallel
/// stage-tables sharing a partition").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtcamLogicalTable {
    pub table: TableId,
    pub partition: u32,
    pub logical_table_index: u32,
}

/// Break an ATCAM table's placement into its parallel logical stage-tables,
/// one per partition, all named after the same table id and placed in the
/// table's placed stage. A non-ATCAM table (or one with a single partition)
/// yields a single logical table.
pub fn split_atcam_partitions(table: &Table) -> Vec<AtcamLogicalTable> {
    if !table.is_atcam {
        return vec![AtcamLogicalTable { table: table.id, partition: 0, logical_table_index: 0 }];
    }
    (0..table.atcam_partitions.max(1))
        .map(|partition| AtcamLogicalTable { table: table.id, partition, logical_table_index: partition })
        .collect()
}

/// A synthetic gateway synthesised when a register-action's attached memory
/// is placed in a stage separate from its match table (specification §4.9
/// "detached attached" pattern): "gets a synthetic gateway whose key is the
/// action's per-flow-enable bit and whose sole action invokes the attached
/// call".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedAttachedGateway {
    pub owning_table: TableId,
    pub per_flow_enable_bit_field: String,
    pub attached_call: String,
}

/// Synthesise the detached-attached gateway for `table`'s attached call
/// `attached_call`, keyed on the per-flow-enable bit field, when the
/// attached memory's stage differs from the match table's own stage.
/// Returns `None` when they coincide — no gateway is needed in that case.
pub fn synthesize_detached_attached_gateway(
    table: &Table,
    attached_call: &str,
    match_stage: u32,
    attached_stage: u32,
    per_flow_enable_bit_field: &str,
) -> Option<DetachedAttachedGateway> {
    if match_stage == attached_stage {
        return None;
    }
    Some(DetachedAttachedGateway {
        owning_table: table.id,
        per_flow_enable_bit_field: per_flow_enable_bit_field.to_string(),
        attached_call: attached_call.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::bitvec::BitRange;
    use crate::model::action_param::ActionParam;
    use crate::model::container::{Container, ContainerKind, FieldSlice, LiveAccess, LivePoint, LiveRange};
    use crate::model::field_action::{FieldAction, Opcode};
    use crate::model::table::{Placed, Resources};

    fn slice_ending_at(field_id: u32, end_stage: u32) -> AllocSlice {
        AllocSlice::new(
            FieldSlice::new(field_id, 0, 7),
            Container::new(ContainerKind::NormalB, 0),
            0,
            7,
            LiveRange::new(
                LivePoint { stage: 0, access: LiveAccess::Write },
                LivePoint { stage: end_stage, access: LiveAccess::Read },
            ),
        )
    }

    fn placed(table: TableId, stage: u32) -> Placed {
        Placed {
            table,
            stage,
            logical_id: 0,
            entries: 1,
            attached_entries: HashMap::new(),
            stage_split: true,
            resources: Resources::default(),
            prev: None,
            group: 0,
        }
    }

    #[test]
    fn split_table_chains_through_intermediate_stages() {
        let placements = vec![placed(TableId(0), 2), placed(TableId(0), 3), placed(TableId(0), 5)];
        let chain = split_stage_chain(&placements, TableId(0));
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[0].next_stage_key, Some("$try_next_stage"));
        assert_eq!(chain[1].next_stage_key, Some("$try_next_stage"));
        assert_eq!(chain[2].next_stage_key, None);
    }

    #[test]
    fn gateway_true_branch_prefixes_every_match_next_sequence() {
        let mut match_next = HashMap::new();
        match_next.insert("hit".to_string(), vec![TableId(2)]);
        match_next.insert("miss".to_string(), vec![TableId(3)]);
        let merged = merge_gateway(&match_next, &[TableId(1)]);
        assert_eq!(merged["hit"], vec![TableId(1), TableId(2)]);
        assert_eq!(merged["miss"], vec![TableId(1), TableId(3)]);
    }

    #[test]
    fn always_run_bodies_concatenate() {
        let dst = ActionParam::phv(0, BitRange::new(0, 7));
        let a = vec![FieldAction::new("a0", Opcode::Set, dst.clone(), vec![ActionParam::constant(1, 8)])];
        let b = vec![FieldAction::new("a1", Opcode::Set, dst, vec![ActionParam::constant(2, 8)])];
        let merged = merge_always_run(&[a, b], &mut [], &[]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn always_run_merge_extends_live_ranges_ending_at_a_merged_stage() {
        let dst = ActionParam::phv(0, BitRange::new(0, 7));
        let a = vec![FieldAction::new("a0", Opcode::Set, dst.clone(), vec![ActionParam::constant(1, 8)])];
        let b = vec![FieldAction::new("a1", Opcode::Set, dst, vec![ActionParam::constant(2, 8)])];
        let mut slices = [slice_ending_at(0, 2), slice_ending_at(1, 5), slice_ending_at(2, 9)];
        merge_always_run(&[a, b], &mut slices, &[2, 5]);
        // Ended at one of the merged stages (2 or 5): extended to the max, 5.
        assert_eq!(slices[0].live_range.end.stage, 5);
        assert_eq!(slices[1].live_range.end.stage, 5);
        // Ended elsewhere: untouched.
        assert_eq!(slices[2].live_range.end.stage, 9);
    }

    #[test]
    fn atcam_table_splits_into_one_logical_table_per_partition() {
        let mut t = Table::new(TableId(0), "atcam0", 4096);
        t.is_atcam = true;
        t.atcam_partitions = 4;
        let logical = split_atcam_partitions(&t);
        assert_eq!(logical.len(), 4);
        assert_eq!(logical[0].partition, 0);
        assert_eq!(logical[3].partition, 3);
        assert!(logical.iter().all(|l| l.table == TableId(0)));
    }

    #[test]
    fn non_atcam_table_yields_a_single_logical_table() {
        let t = Table::new(TableId(0), "exact0", 1024);
        assert_eq!(split_atcam_partitions(&t).len(), 1);
    }

    #[test]
    fn detached_attached_gateway_synthesized_only_when_stages_differ() {
        let t = Table::new(TableId(0), "t0", 100);
        assert!(synthesize_detached_attached_gateway(&t, "reg0.execute", 2, 2, "pfe").is_none());
        let gw = synthesize_detached_attached_gateway(&t, "reg0.execute", 2, 4, "pfe").unwrap();
        assert_eq!(gw.attached_call, "reg0.execute");
        assert_eq!(gw.per_flow_enable_bit_field, "pfe");
    }
}
