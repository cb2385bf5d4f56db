//! Driver: CLI entry point plumbing (specification §6), wiring every
//! component into one pipeline run. Generalizes the teacher's
//! `driver::Driver` (a flat field struct plus a `run` method that chains
//! the compiler's phases, logging with `if self.verbose { eprintln!(...) }`)
//! from "compile one C file" to "place and adjust one fixture's tables and
//! actions".

pub mod fixture;

use crate::adjust;
use crate::common::diagnostic::{Diagnostic, Locator};
use crate::config::Config;
use crate::context::Context;
use crate::model::table::{DepKind, Placed, TableId};
use crate::place::Placer;
use crate::transform::{self, AtcamLogicalTable, DetachedAttachedGateway};
use crate::verify::{self, Disposition};
use fixture::Fixture;
use std::collections::HashMap;
use std::fmt::Write as _;

#[derive(Debug, Clone, thiserror::Error)]
pub enum DriverError {
    #[error("cannot read input fixture {path}: {reason}")]
    ReadFixture { path: String, reason: String },
    #[error(transparent)]
    Fixture(#[from] fixture::FixtureError),
    #[error(transparent)]
    Placement(#[from] crate::common::error::PlacementInfeasibleError),
    #[error("{error_count} diagnostic error(s) reported during adjustment, aborting before placement")]
    AdjustmentErrors { error_count: u32 },
}

/// Outcome of one end-to-end pipeline run, everything the report writer
/// needs.
pub struct PipelineResult {
    pub adjusted_actions: HashMap<String, adjust::ActionBody>,
    pub placements: Vec<Placed>,
    pub stage_chains: HashMap<TableId, Vec<transform::StageChainLink>>,
    /// Every ATCAM table's placement broken into its parallel logical
    /// stage-tables (specification §4.9, `transform::split_atcam_partitions`).
    pub atcam_logical_tables: HashMap<TableId, Vec<AtcamLogicalTable>>,
    /// Synthetic gateways for register-actions whose attached memory landed
    /// in a different stage than their match table (specification §4.9,
    /// `transform::synthesize_detached_attached_gateway`).
    pub detached_gateways: Vec<DetachedAttachedGateway>,
    /// Each merged-in gateway's true-branch sequence distributed across the
    /// match table it merged with (specification §4.9, `transform::merge_gateway`).
    pub merged_gateway_next: HashMap<TableId, HashMap<String, Vec<TableId>>>,
    /// The single merged always-run action body, if more than one table is
    /// marked `always_run` (specification §4.9, `transform::merge_always_run`).
    pub merged_always_run: Option<adjust::ActionBody>,
}

/// Run the instruction-adjustment pipeline (C6, both halves) on every
/// action in the fixture, merging (pass 7) in between, then run the
/// Container-Action Verifier (C5, specification §4.4) over the result so
/// the at-most-one-write/at-most-two-reads/commutativity/full-overwrite
/// checks run on real pipeline output and not only on hand-built test
/// fixtures. A `Fatal` disposition on any container is reported as a
/// diagnostic error, which aborts the pipe before placement (mirroring
/// specification §7 "the outer driver aborts after the current pass if the
/// counter is non-zero").
fn adjust_all(fixture: &Fixture, ctx: &mut Context) -> HashMap<String, adjust::ActionBody> {
    let mut out = HashMap::new();
    for (name, body) in &fixture.actions {
        let _span = tracing::debug_span!("adjust_action", action = %name).entered();
        let mut body = body.clone();
        adjust::run_pre_merge(&mut body, ctx);
        adjust::merge::run(&mut body, ctx);
        adjust::run_post_merge(&mut body, ctx);

        for verified in verify::verify_body(&body) {
            if verified.report.disposition == Disposition::Fatal {
                ctx.diagnostics.emit(Diagnostic::error(
                    format!(
                        "container {} cannot be realized by any ALU instruction variant (error bits: {:?}, instructions: {})",
                        verified.report.action.container,
                        verified.report.action.error,
                        verified.names.join("+")
                    ),
                    Locator::default().action(name.clone()).container(verified.report.action.container.to_string()),
                ));
            }
        }

        out.insert(name.clone(), body);
    }
    out
}

/// Run the whole pipeline against an already-parsed fixture: instruction
/// adjustment, table placement, and the post-placement transform/merge
/// step (specification §4.6, §4.8, §4.9).
pub fn run_pipeline(fixture: &Fixture, ctx: &mut Context) -> Result<PipelineResult, DriverError> {
    let adjusted_actions = adjust_all(fixture, ctx);
    if ctx.diagnostics.has_errors() {
        return Err(DriverError::AdjustmentErrors { error_count: ctx.diagnostics.error_count() });
    }

    ctx.device = fixture.device;
    let mut placer = Placer::new(&fixture.tables, &fixture.deps, ctx);
    let arena = placer.place_all(ctx)?;
    let placements: Vec<Placed> = arena.iter().cloned().collect();

    let mut stage_chains = HashMap::new();
    for table in fixture.tables.keys() {
        let chain = transform::split_stage_chain(&placements, *table);
        if chain.len() > 1 {
            stage_chains.insert(*table, chain);
        }
    }

    let mut atcam_logical_tables = HashMap::new();
    for table in fixture.tables.values() {
        if table.is_atcam {
            atcam_logical_tables.insert(table.id, transform::split_atcam_partitions(table));
        }
    }

    let mut detached_gateways = Vec::new();
    for placed in &placements {
        let table = &fixture.tables[&placed.table];
        for (call, attached) in &placed.attached_entries {
            if let Some(gw) = transform::synthesize_detached_attached_gateway(
                table,
                call,
                placed.stage,
                attached.stage,
                &format!("{}.pfe", table.name),
            ) {
                detached_gateways.push(gw);
            }
        }
    }

    // A gateway merged into its match table (a `Control` dependency edge
    // from a non-separate gateway to the table it guards) distributes its
    // true-branch next-sequence across every branch of that table
    // (specification §4.9, "gateway/match merge").
    let mut merged_gateway_next: HashMap<TableId, HashMap<String, Vec<TableId>>> = HashMap::new();
    for edge in &fixture.deps {
        if edge.kind != DepKind::Control {
            continue;
        }
        let Some(gateway) = fixture.tables.get(&edge.from) else { continue };
        if !gateway.is_gateway || gateway.separate_gateway {
            continue;
        }
        let Some(target) = fixture.tables.get(&edge.to) else { continue };
        let true_branch = gateway.next.get("true").cloned().unwrap_or_default();
        let base = merged_gateway_next.get(&edge.to).cloned().unwrap_or_else(|| target.next.clone());
        merged_gateway_next.insert(edge.to, transform::merge_gateway(&base, &true_branch));
    }

    // Every `always_run` table's action shares the stage's single
    // always-run slot (specification §4.9, "always-run actions"). The PHV
    // allocation needed to extend field live ranges across the merge is an
    // external input this driver doesn't model (specification §1); an empty
    // slice list means no extension happens here, though
    // `transform::merge_always_run` performs it whenever a caller supplies
    // one.
    let always_run_tables: Vec<&crate::model::table::Table> =
        fixture.tables.values().filter(|t| t.is_always_run).collect();
    let merged_always_run = if always_run_tables.len() > 1 {
        let bodies: Vec<adjust::ActionBody> =
            always_run_tables.iter().filter_map(|t| adjusted_actions.get(&t.name).cloned()).collect();
        let stages: Vec<u32> = always_run_tables
            .iter()
            .filter_map(|t| placements.iter().find(|p| p.table == t.id).map(|p| p.stage))
            .collect();
        (bodies.len() > 1).then(|| transform::merge_always_run(&bodies, &mut [], &stages))
    } else {
        None
    };

    Ok(PipelineResult {
        adjusted_actions,
        placements,
        stage_chains,
        atcam_logical_tables,
        detached_gateways,
        merged_gateway_next,
        merged_always_run,
    })
}

/// Render a [`PipelineResult`] as the plain-text placement report named by
/// `Config::output` (specification §6 "Output").
pub fn render_report(fixture: &Fixture, result: &PipelineResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# MAU placement report");
    let _ = writeln!(out, "tables placed: {}", result.placements.len());
    out.push('\n');

    let mut placements = result.placements.clone();
    placements.sort_by_key(|p| (p.stage, p.logical_id));
    for placed in &placements {
        let table = &fixture.tables[&placed.table];
        let _ = writeln!(
            out,
            "stage {:>2}  logical_id {:>2}  {:<16} entries={:<6} split={}",
            placed.stage, placed.logical_id, table.name, placed.entries, placed.stage_split
        );
    }
    out.push('\n');

    for (table, chain) in &result.stage_chains {
        let name = &fixture.tables[table].name;
        let stages: Vec<String> = chain.iter().map(|l| l.stage.to_string()).collect();
        let _ = writeln!(out, "table {name} split across stages: {}", stages.join(" -> "));
    }

    for (table, logical) in &result.atcam_logical_tables {
        let name = &fixture.tables[table].name;
        let _ = writeln!(out, "table {name} ATCAM partitions: {}", logical.len());
    }

    for gw in &result.detached_gateways {
        let name = &fixture.tables[&gw.owning_table].name;
        let _ = writeln!(
            out,
            "table {name} detached-attached gateway on `{}` keyed on `{}`",
            gw.attached_call, gw.per_flow_enable_bit_field
        );
    }

    for (table, next) in &result.merged_gateway_next {
        let name = &fixture.tables[table].name;
        let mut tags: Vec<&String> = next.keys().collect();
        tags.sort();
        for tag in tags {
            let seq: Vec<String> = next[tag].iter().map(|t| fixture.tables[t].name.clone()).collect();
            let _ = writeln!(out, "table {name} merged next[{tag}]: {}", seq.join(" -> "));
        }
    }

    if let Some(body) = &result.merged_always_run {
        let _ = writeln!(out, "merged always-run action ({} instruction(s)):", body.len());
        for fa in body {
            let reads: Vec<String> = fa.reads.iter().map(|r| r.to_string()).collect();
            let _ = writeln!(out, "  {} = {}({})", fa.write, fa.opcode, reads.join(", "));
        }
    }

    let mut action_names: Vec<&String> = result.adjusted_actions.keys().collect();
    action_names.sort();
    for name in action_names {
        let body = &result.adjusted_actions[name];
        let _ = writeln!(out, "\naction {name} ({} instruction(s) after adjustment):", body.len());
        for fa in body {
            let reads: Vec<String> = fa.reads.iter().map(|r| r.to_string()).collect();
            let _ = writeln!(out, "  {} = {}({})", fa.write, fa.opcode, reads.join(", "));
        }
    }

    out
}

/// Load a fixture from disk, run the pipeline, and write the report to
/// `config.output`. Mirrors `ccc::driver::Driver::run`'s shape: read input,
/// run every phase in order, write one output file.
pub fn run(config: Config) -> Result<(), DriverError> {
    let path = config.input.clone().unwrap_or_else(|| "fixture.mau".to_string());
    let src = std::fs::read_to_string(&path).map_err(|e| DriverError::ReadFixture { path: path.clone(), reason: e.to_string() })?;
    let fixture = fixture::parse(&src)?;

    let verbose = config.verbose;
    let mut ctx = Context::new(config);
    if verbose {
        eprintln!("loaded fixture: {} table(s), {} action(s)", fixture.tables.len(), fixture.actions.len());
    }

    let result = run_pipeline(&fixture, &mut ctx)?;
    if verbose {
        eprintln!("placed {} table(s) across the pipeline", result.placements.len());
    }

    let report = render_report(&fixture, &result);
    std::fs::write(&ctx.config.output, report)
        .map_err(|e| DriverError::ReadFixture { path: ctx.config.output.clone(), reason: e.to_string() })?;
    ctx.diagnostics.print_all();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn sample_fixture() -> Fixture {
        let src = "\
table t0 entries=1024 min=256
table t1 entries=512
dep t0 -> t1 data
action t0.hit
  set phv:0[0:7] <- const:5:8
end
action t1.hit
  add phv:1[0:31] <- phv:2[0:31], phv:3[0:31]
end
";
        fixture::parse(src).unwrap()
    }

    #[test]
    fn full_pipeline_places_every_table_and_adjusts_every_action() {
        let fixture = sample_fixture();
        let mut ctx = Context::new(Config::default());
        let result = run_pipeline(&fixture, &mut ctx).unwrap();
        assert_eq!(result.placements.len(), 2);
        assert_eq!(result.adjusted_actions.len(), 2);
    }

    #[test]
    fn pipeline_wires_atcam_gateway_merge_and_always_run() {
        let src = "\
table g0 entries=4 is_gateway
table m0 entries=1024
table x0 entries=4
table x1 entries=4
dep g0 -> m0 control
next g0.true -> x0
next m0.hit -> x1
table atcam0 entries=4096 is_atcam atcam_partitions=4
table ar0 entries=4 always_run
table ar1 entries=4 always_run
action ar0
  set phv:0[0:7] <- const:1:8
end
action ar1
  set phv:1[0:7] <- const:2:8
end
";
        let fixture = fixture::parse(src).unwrap();
        let mut ctx = Context::new(Config::default());
        let result = run_pipeline(&fixture, &mut ctx).unwrap();

        let atcam_id = fixture.tables.values().find(|t| t.name == "atcam0").unwrap().id;
        assert_eq!(result.atcam_logical_tables[&atcam_id].len(), 4);

        let m0_id = fixture.tables.values().find(|t| t.name == "m0").unwrap().id;
        let x0_id = fixture.tables.values().find(|t| t.name == "x0").unwrap().id;
        let x1_id = fixture.tables.values().find(|t| t.name == "x1").unwrap().id;
        assert_eq!(result.merged_gateway_next[&m0_id]["hit"], vec![x0_id, x1_id]);

        assert_eq!(result.merged_always_run.as_ref().unwrap().len(), 2);

        let report = render_report(&fixture, &result);
        assert!(report.contains("ATCAM partitions: 4"));
        assert!(report.contains("merged next[hit]"));
        assert!(report.contains("merged always-run action"));
    }

    #[test]
    fn report_mentions_every_placed_table() {
        let fixture = sample_fixture();
        let mut ctx = Context::new(Config::default());
        let result = run_pipeline(&fixture, &mut ctx).unwrap();
        let report = render_report(&fixture, &result);
        assert!(report.contains("t0"));
        assert!(report.contains("t1"));
    }
}
