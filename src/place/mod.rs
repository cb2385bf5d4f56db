//! Table Placement (specification §4.8, C9): a greedy allocator with
//! backtracking that assigns each logical table to a `(stage, logical_id)`
//! pair, respecting memory/crossbar/action-data-bus/instruction-memory
//! budgets and dependency order. Grounded on the *shape* of the teacher's
//! `backend::riscv`/`alloca_coalescing` allocation code (explicit analysis
//! state struct, worklist loop, escape/conflict classification) and, for
//! the resource-budget scoring and backtracking, on `table_placement.cpp`
//! (original_source): backtrack-point search, two strategies tried in
//! order, long-branch tag budget.

use crate::common::error::PlacementInfeasibleError;
use crate::context::Context;
use crate::model::table::{AttachedEntry, DepEdge, DepKind, Placed, PlacedArena, PlacedId, Resources, Table, TableId};
use std::collections::{HashMap, HashSet};

/// Which candidate-scoring strategy the placer is currently using
/// (specification §4.8 "Two strategies are tried in order").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    DependencyOnly,
    ResourceWeighted,
}

/// One feasible placement of a table found by [`Placer::try_place_table`].
#[derive(Debug, Clone)]
struct Candidate {
    table: TableId,
    stage: u32,
    entries: u32,
    resources: Resources,
    stage_split: bool,
}

/// Per-candidate tie-break key, compared in declaration order
/// (specification §4.8 step 4 `is_better`): earliest stage, `@stage`
/// pragma match, user priority, then a resource-pressure score used only
/// by the [`Strategy::ResourceWeighted`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct TieBreak {
    stage: u32,
    pragma_mismatch: bool,
    neg_priority: i64,
    resource_score: i64,
}

pub struct Placer<'a> {
    tables: &'a HashMap<TableId, Table>,
    deps: &'a [DepEdge],
    arena: PlacedArena,
    placed: HashSet<TableId>,
    logical_id_cursor: HashMap<u32, u32>,
    backtrack_budget: u32,
    stage_count: u32,
    /// A prior run's placements, keyed by table, consulted by
    /// [`Placer::entry_candidates`] on a replay placement (specification
    /// §4.8 scenario S6: "replay placement computes `entries =
    /// min(prev_placement.entries, requested)`, not re-derived from
    /// scratch"). Empty on a first-time placement.
    prev_placements: HashMap<TableId, Placed>,
}

impl<'a> Placer<'a> {
    pub fn new(tables: &'a HashMap<TableId, Table>, deps: &'a [DepEdge], ctx: &Context) -> Self {
        Self {
            tables,
            deps,
            arena: PlacedArena::new(),
            placed: HashSet::new(),
            logical_id_cursor: HashMap::new(),
            backtrack_budget: 256,
            stage_count: ctx.device.stage_count,
            prev_placements: HashMap::new(),
        }
    }

    /// Seed this placer with a previous run's placements, so a re-placement
    /// of the same tables (e.g. after an incremental fixture edit) clamps
    /// requested entry counts down instead of re-deriving them from scratch
    /// (specification §4.8 scenario S6).
    pub fn with_previous_placements(mut self, previous: &PlacedArena) -> Self {
        self.prev_placements = previous.iter().map(|p| (p.table, p.clone())).collect();
        self
    }

    fn predecessors(&self, id: TableId, kind: DepKind) -> impl Iterator<Item = TableId> + '_ {
        self.deps.iter().filter(move |e| e.to == id && e.kind == kind).map(|e| e.from)
    }

    /// A table's data/metadata predecessors must already be placed before
    /// it becomes a placement candidate (specification §4.8 step 2).
    fn is_candidate(&self, id: TableId) -> bool {
        if self.placed.contains(&id) {
            return false;
        }
        self.predecessors(id, DepKind::Data).all(|p| self.placed.contains(&p))
            && self.predecessors(id, DepKind::MetadataInit).all(|p| self.placed.contains(&p))
    }

    /// The earliest stage this table may be placed in: one past the
    /// highest stage any of its data predecessors landed in, or 0.
    fn earliest_stage(&self, id: TableId) -> u32 {
        self.predecessors(id, DepKind::Data)
            .chain(self.predecessors(id, DepKind::Control))
            .filter_map(|p| self.arena.iter().filter(|pl| pl.table == p).map(|pl| pl.stage).max())
            .max()
            .map(|s| s + 1)
            .unwrap_or(0)
    }

    /// Sum of every already-committed placement's resources in `stage`
    /// (specification §4.8 step 1).
    fn stage_usage(&self, stage: u32) -> Resources {
        self.arena.iter().filter(|p| p.stage == stage).fold(Resources::default(), |acc, p| acc.add(&p.resources))
    }

    /// Entries requested shrunk toward `min_entries` in fixed steps, the
    /// idiomatic stand-in for the original's iterative layout-option
    /// search (specification §4.8 step 3c). On a replay placement (a
    /// previous placement of this table exists), the starting point is
    /// clamped to `min(prev_placement.entries, requested)` instead of the
    /// raw request (specification §4.8 scenario S6).
    fn entry_candidates(table: &Table, prev_entries: Option<u32>) -> Vec<u32> {
        let start = prev_entries.map_or(table.requested_entries, |prev| prev.min(table.requested_entries));
        let mut sizes = Vec::new();
        let mut e = start;
        while e > table.min_entries {
            sizes.push(e);
            e /= 2;
        }
        sizes.push(table.min_entries);
        sizes
    }

    fn estimate_resources(table: &Table, entries: u32, device: &crate::context::DeviceConstants) -> Resources {
        let rows_needed = entries.div_ceil(1024).max(1);
        let mut r = Resources::default();
        if table.is_atcam || table.use_hash_action {
            r.tcam_used = rows_needed;
        } else {
            r.sram_used = rows_needed;
        }
        r.logical_ids_used = 1;
        r.ixbar_bytes_used = 4;
        r.action_data_bus_bytes_used = if table.attached.is_empty() { 0 } else { 4 };
        r.instr_mem_words_used = 1;
        r.map_ram_used = if table.attached.is_empty() { 0 } else { 1 };
        let _ = device;
        r
    }

    fn budget(device: &crate::context::DeviceConstants) -> Resources {
        Resources {
            sram_used: device.sram_rows_per_stage,
            tcam_used: device.tcam_rows_per_stage,
            map_ram_used: device.map_ram_rows_per_stage,
            logical_ids_used: device.logical_id_count,
            ixbar_bytes_used: device.ixbar_bytes_per_stage,
            action_data_bus_bytes_used: device.action_data_bus_bytes_per_stage,
            instr_mem_words_used: device.instr_mem_words_per_stage,
            long_branch_tags_used: device.long_branch_tag_count,
        }
    }

    /// Find a feasible placement of `table` starting at `stage`, shrinking
    /// entries if the full request doesn't fit, and marking `stage_split`
    /// if even the minimum doesn't fit (specification §4.8 step 3).
    fn try_place_table(&self, table: &Table, stage: u32, ctx: &Context) -> Option<Candidate> {
        if stage >= self.stage_count {
            return None;
        }
        let used = self.stage_usage(stage);
        let budget = Self::budget(&ctx.device);
        let prev_entries = self.prev_placements.get(&table.id).map(|p| p.entries);
        for &entries in &Self::entry_candidates(table, prev_entries) {
            let resources = Self::estimate_resources(table, entries, &ctx.device);
            if used.add(&resources).fits_within(&budget) {
                let stage_split = entries < table.requested_entries && entries == table.min_entries;
                return Some(Candidate { table: table.id, stage, entries, resources, stage_split });
            }
        }
        None
    }

    fn tie_break(&self, table: &Table, cand: &Candidate, strategy: Strategy) -> TieBreak {
        let pragma_mismatch = matches!(table.stage_pragma, Some(s) if s != cand.stage);
        let resource_score = match strategy {
            Strategy::DependencyOnly => 0,
            Strategy::ResourceWeighted => {
                cand.resources.sram_used as i64
                    + cand.resources.tcam_used as i64
                    + cand.resources.map_ram_used as i64
                    + cand.resources.logical_ids_used as i64
            }
        };
        TieBreak { stage: cand.stage, pragma_mismatch, neg_priority: -(table.priority.unwrap_or(0) as i64), resource_score }
    }

    /// Walk the dependency graph upward from `from` to find an earlier
    /// committed placement to rewind to when the remaining dependency
    /// tail of a just-placed table can no longer fit (specification §4.8
    /// "Backtracking").
    fn find_backtrack_point(&self, from: TableId) -> Option<usize> {
        let mut frontier: Vec<TableId> = self.predecessors(from, DepKind::Data).collect();
        let mut best: Option<usize> = None;
        let mut seen = HashSet::new();
        while let Some(t) = frontier.pop() {
            if !seen.insert(t) {
                continue;
            }
            if let Some(idx) = self.arena.iter().position(|p| p.table == t) {
                best = Some(best.map_or(idx, |b: usize| b.min(idx)));
            }
            frontier.extend(self.predecessors(t, DepKind::Data));
        }
        best
    }

    /// Run placement to completion for one [`Strategy`], returning the
    /// number of backtracks performed, or an error if the budget runs out
    /// or some table has no feasible placement at all.
    fn run_strategy(&mut self, strategy: Strategy, ctx: &Context) -> Result<u32, PlacementInfeasibleError> {
        let mut order: Vec<TableId> = self.tables.keys().copied().collect();
        order.sort();
        let mut backtracks = 0;
        let mut group_counter = 0u32;

        'outer: loop {
            let candidates: Vec<TableId> = order.iter().copied().filter(|id| self.is_candidate(*id)).collect();
            if candidates.is_empty() {
                break;
            }

            let mut best: Option<(Candidate, TieBreak)> = None;
            for id in &candidates {
                let table = &self.tables[id];
                let start_stage = match table.stage_pragma {
                    Some(pragma) if ctx.config.forced_placement => pragma,
                    _ => self.earliest_stage(*id),
                };
                for stage in start_stage..self.stage_count {
                    if let Some(cand) = self.try_place_table(table, stage, ctx) {
                        let tb = self.tie_break(table, &cand, strategy);
                        if best.as_ref().is_none_or(|(_, b)| tb < *b) {
                            best = Some((cand, tb));
                        }
                        break;
                    }
                }
            }

            let Some((cand, _)) = best else {
                return Err(PlacementInfeasibleError::DependencyTailExceedsStages {
                    table: candidates.first().map(|t| self.tables[t].name.clone()).unwrap_or_default(),
                });
            };

            let checkpoint = self.arena.checkpoint();
            let logical_id = *self.logical_id_cursor.entry(cand.stage).or_insert(0);
            self.logical_id_cursor.insert(cand.stage, logical_id + 1);
            let table = &self.tables[&cand.table];
            let placed = Placed {
                table: cand.table,
                stage: cand.stage,
                logical_id,
                entries: cand.entries,
                attached_entries: table
                    .attached
                    .iter()
                    .map(|a| (a.clone(), AttachedEntry { entries: cand.entries, stage: cand.stage }))
                    .collect(),
                stage_split: cand.stage_split,
                resources: cand.resources,
                prev: if checkpoint > 0 { Some(PlacedId((checkpoint - 1) as u32)) } else { None },
                group: group_counter,
            };
            self.arena.push(placed);
            self.placed.insert(cand.table);
            group_counter += 1;

            // Long-branch budget: if committing here would need more tags
            // than the device offers, rewind and try again from an
            // earlier point (specification §4.8 "Long-branch budget").
            if !ctx.config.disable_long_branch {
                let tags_needed = self.stage_usage(cand.stage).long_branch_tags_used;
                if tags_needed > ctx.device.long_branch_tag_count {
                    if let Some(point) = self.find_backtrack_point(cand.table) {
                        self.arena.rewind(point);
                        self.placed.retain(|t| self.arena.iter().any(|p| p.table == *t));
                        backtracks += 1;
                        if backtracks > self.backtrack_budget {
                            return Err(PlacementInfeasibleError::BacktrackBudgetExhausted {
                                table: table.name.clone(),
                            });
                        }
                        continue 'outer;
                    }
                }
            }
        }
        Ok(backtracks)
    }

    /// Run placement to completion, falling back from dependency-only to
    /// resource-weighted selection if the first strategy cannot finish
    /// within its backtrack budget (specification §4.8 "Two strategies are
    /// tried in order").
    pub fn place_all(&mut self, ctx: &Context) -> Result<&PlacedArena, PlacementInfeasibleError> {
        match self.run_strategy(Strategy::DependencyOnly, ctx) {
            Ok(_) => Ok(&self.arena),
            Err(_) if !self.placed.is_empty() => {
                self.arena = PlacedArena::new();
                self.placed.clear();
                self.logical_id_cursor.clear();
                self.run_strategy(Strategy::ResourceWeighted, ctx)?;
                Ok(&self.arena)
            }
            Err(e) => Err(e),
        }
    }

    pub fn arena(&self) -> &PlacedArena {
        &self.arena
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn ctx() -> Context {
        Context::new(Config::default())
    }

    #[test]
    fn independent_tables_place_in_stage_zero() {
        let mut tables = HashMap::new();
        tables.insert(TableId(0), Table::new(TableId(0), "t0", 100));
        tables.insert(TableId(1), Table::new(TableId(1), "t1", 100));
        let deps = [];
        let ctx = ctx();
        let mut placer = Placer::new(&tables, &deps, &ctx);
        let arena = placer.place_all(&ctx).unwrap();
        assert_eq!(arena.len(), 2);
        assert!(arena.iter().all(|p| p.stage == 0));
    }

    #[test]
    fn data_dependent_table_placed_in_later_stage() {
        let mut tables = HashMap::new();
        tables.insert(TableId(0), Table::new(TableId(0), "t0", 100));
        tables.insert(TableId(1), Table::new(TableId(1), "t1", 100));
        let deps = [DepEdge { from: TableId(0), to: TableId(1), kind: DepKind::Data }];
        let ctx = ctx();
        let mut placer = Placer::new(&tables, &deps, &ctx);
        let arena = placer.place_all(&ctx).unwrap();
        let stage_of = |id: TableId| arena.iter().find(|p| p.table == id).unwrap().stage;
        assert!(stage_of(TableId(1)) > stage_of(TableId(0)));
    }

    #[test]
    fn stage_pragma_is_respected_when_forced() {
        let mut tables = HashMap::new();
        let mut t0 = Table::new(TableId(0), "t0", 100);
        t0.stage_pragma = Some(3);
        tables.insert(TableId(0), t0);
        let deps = [];
        let cfg = Config { forced_placement: true, ..Config::default() };
        let ctx = Context::new(cfg);
        let mut placer = Placer::new(&tables, &deps, &ctx);
        let arena = placer.place_all(&ctx).unwrap();
        assert_eq!(arena.iter().next().unwrap().stage, 3);
    }

    #[test]
    fn scenario_s6_replay_placement_clamps_entries_to_previous() {
        let mut tables = HashMap::new();
        let mut t0 = Table::new(TableId(0), "t0", 4096);
        t0.min_entries = 1024;
        tables.insert(TableId(0), t0);
        let deps = [];
        let ctx = ctx();

        let mut first = Placer::new(&tables, &deps, &ctx);
        let arena = first.place_all(&ctx).unwrap().clone();
        let first_entries = arena.iter().next().unwrap().entries;
        assert_eq!(first_entries, 4096);

        // A second round requests more entries for the same table; replay
        // placement must still clamp to the previous placement's entries,
        // not re-derive the full request from scratch.
        let mut t0_grown = Table::new(TableId(0), "t0", 8192);
        t0_grown.min_entries = 1024;
        tables.insert(TableId(0), t0_grown);
        let mut replay = Placer::new(&tables, &deps, &ctx).with_previous_placements(&arena);
        let replayed = replay.place_all(&ctx).unwrap();
        assert_eq!(replayed.iter().next().unwrap().entries, first_entries);
    }

    #[test]
    fn too_many_independent_tables_exceed_stage_capacity() {
        let mut tables = HashMap::new();
        // one huge table per stage fills every logical id slot immediately;
        // force failure by exceeding the device's stage count with a long
        // dependency chain that can never fit.
        let n = 32;
        for i in 0..n {
            tables.insert(TableId(i), Table::new(TableId(i), format!("t{i}"), 100));
        }
        let mut deps = Vec::new();
        for i in 1..n {
            deps.push(DepEdge { from: TableId(i - 1), to: TableId(i), kind: DepKind::Data });
        }
        let ctx = ctx();
        let mut placer = Placer::new(&tables, &deps, &ctx);
        let result = placer.place_all(&ctx);
        assert!(result.is_err());
    }
}
