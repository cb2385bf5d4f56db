//! Test-IR fixture format (specification §6): a line-oriented textual
//! encoding of the `model::*` structs this crate already defines, standing
//! in for the real P4 frontend/mid-end (out of scope per specification §1).
//! Not meant to express arbitrary P4 — only enough of `Table`, `DepEdge` and
//! a field-level `ActionBody` to drive the pipeline end to end for demos and
//! integration tests.
//!
//! Grammar, one statement per line, blank lines and `#` comments ignored:
//!
//! ```text
//! device stage_count=12 logical_ids=16 long_branch_tags=8
//! table t0 entries=1024 min=256 stage=3 priority=5 use_hash_action attached=m0
//! dep t0 -> t1 data
//! next t1.hit -> t2, t3
//! action t0.hit
//!   set phv:0[0:7] <- const:5:8
//!   add phv:1[0:31] <- phv:2[0:31], phv:3[0:31]
//! end
//! ```
//!
//! `next <table>.<tag> -> <t1>, <t2>, ...` records one of a table's own
//! hit/miss next-table sequences (specification §4.9's input table graph,
//! `next[tag] -> TableSeq`); `table ... is_gateway` marks a table whose
//! `next["true"]` sequence is distributed into every other table's
//! sequence it merges with (`transform::merge_gateway`), and `always_run`
//! marks a table whose sole action always fires, merged with every other
//! always-run table's action into one body per stage
//! (`transform::merge_always_run`); an `always_run` table's action must be
//! named exactly after the table (no `.` suffix) so the driver can find it.
//!
//! Operand tokens: `phv:<field_id>[lo:hi]`, `arg:<name>[lo:hi]`,
//! `hash:<name>[lo:hi]`, `const:<value>:<width>`; prefix any read with `?`
//! to mark it conditional (the `conditionally-set` condition operand).

use crate::context::DeviceConstants;
use crate::model::action_param::{ActionParam, Speciality};
use crate::model::field_action::{FieldAction, Opcode};
use crate::model::table::{DepEdge, DepKind, Table, TableId};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct Fixture {
    pub device: DeviceConstants,
    pub tables: HashMap<TableId, Table>,
    pub deps: Vec<DepEdge>,
    pub actions: HashMap<String, Vec<FieldAction>>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FixtureError {
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
}

fn err(line: usize, message: impl Into<String>) -> FixtureError {
    FixtureError::Parse { line, message: message.into() }
}

fn parse_opcode(s: &str) -> Option<Opcode> {
    Some(match s {
        "and" => Opcode::And,
        "andca" => Opcode::Andca,
        "andcb" => Opcode::Andcb,
        "nand" => Opcode::Nand,
        "or" => Opcode::Or,
        "orca" => Opcode::Orca,
        "orcb" => Opcode::Orcb,
        "nor" => Opcode::Nor,
        "xor" => Opcode::Xor,
        "xnor" => Opcode::Xnor,
        "not" => Opcode::Not,
        "add" => Opcode::Add,
        "addc" => Opcode::Addc,
        "sub" => Opcode::Sub,
        "subc" => Opcode::Subc,
        "saddu" => Opcode::Saddu,
        "sadds" => Opcode::Sadds,
        "ssubu" => Opcode::Ssubu,
        "ssubs" => Opcode::Ssubs,
        "minu" => Opcode::Minu,
        "mins" => Opcode::Mins,
        "maxu" => Opcode::Maxu,
        "maxs" => Opcode::Maxs,
        "shl" => Opcode::Shl,
        "shru" => Opcode::Shru,
        "shrs" => Opcode::Shrs,
        "funnel-shift" => Opcode::FunnelShift,
        "setz" => Opcode::Setz,
        "sethi" => Opcode::Sethi,
        "conditionally-set" => Opcode::ConditionallySet,
        "invalidate" => Opcode::Invalidate,
        "set" => Opcode::Set,
        "deposit-field" => Opcode::DepositField,
        "bitmasked-set" => Opcode::BitmaskedSet,
        "byte-rotate-merge" => Opcode::ByteRotateMerge,
        _ => return None,
    })
}

/// Parse `[lo:hi]` into `(lo, hi)`.
fn parse_bracket_range(line: usize, s: &str) -> Result<(u32, u32), FixtureError> {
    let inner = s
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| err(line, format!("expected [lo:hi], got `{s}`")))?;
    let (lo, hi) = inner.split_once(':').ok_or_else(|| err(line, format!("expected lo:hi, got `{inner}`")))?;
    let lo: u32 = lo.trim().parse().map_err(|_| err(line, format!("bad bit index `{lo}`")))?;
    let hi: u32 = hi.trim().parse().map_err(|_| err(line, format!("bad bit index `{hi}`")))?;
    Ok((lo, hi))
}

/// Parse one operand token into an [`ActionParam`].
fn parse_operand(line: usize, tok: &str) -> Result<ActionParam, FixtureError> {
    let (tok, conditional) = match tok.strip_prefix('?') {
        Some(rest) => (rest, true),
        None => (tok, false),
    };
    let mut param = if let Some(rest) = tok.strip_prefix("phv:") {
        let (id_str, range_str) = rest
            .split_once('[')
            .map(|(a, b)| (a, format!("[{b}")))
            .ok_or_else(|| err(line, format!("malformed phv operand `{tok}`")))?;
        let field_id: u32 = id_str.parse().map_err(|_| err(line, format!("bad field id `{id_str}`")))?;
        let (lo, hi) = parse_bracket_range(line, &range_str)?;
        ActionParam::phv(field_id, crate::common::bitvec::BitRange::new(lo, hi))
    } else if let Some(rest) = tok.strip_prefix("arg:") {
        let (name, range_str) = rest
            .split_once('[')
            .map(|(a, b)| (a, format!("[{b}")))
            .ok_or_else(|| err(line, format!("malformed arg operand `{tok}`")))?;
        let (lo, hi) = parse_bracket_range(line, &range_str)?;
        ActionParam::action_data(name, crate::common::bitvec::BitRange::new(lo, hi))
    } else if let Some(rest) = tok.strip_prefix("hash:") {
        let (name, range_str) = rest
            .split_once('[')
            .map(|(a, b)| (a, format!("[{b}")))
            .ok_or_else(|| err(line, format!("malformed hash operand `{tok}`")))?;
        let (lo, hi) = parse_bracket_range(line, &range_str)?;
        let mut p =
            ActionParam::phv(0, crate::common::bitvec::BitRange::new(lo, hi)).with_speciality(Speciality::HashDist);
        p.source = crate::model::action_param::Source::HashDist(name.to_string());
        p
    } else if let Some(rest) = tok.strip_prefix("const:") {
        let (value_str, width_str) =
            rest.split_once(':').ok_or_else(|| err(line, format!("malformed const operand `{tok}`")))?;
        let value: i64 = value_str.parse().map_err(|_| err(line, format!("bad constant `{value_str}`")))?;
        let width: u32 = width_str.parse().map_err(|_| err(line, format!("bad width `{width_str}`")))?;
        ActionParam::constant(value, width)
    } else {
        return Err(err(line, format!("unrecognized operand `{tok}`")));
    };
    param.is_conditional = conditional;
    Ok(param)
}

fn split_operands(line: usize, rest: &str) -> Result<(&str, Vec<&str>), FixtureError> {
    let (dst, rhs) = rest.split_once("<-").ok_or_else(|| err(line, "expected `<-`"))?;
    let reads: Vec<&str> = rhs.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
    if reads.is_empty() {
        return Err(err(line, "instruction has no read operands"));
    }
    Ok((dst.trim(), reads))
}

fn parse_device_kv(dev: &mut DeviceConstants, line: usize, kv: &str) -> Result<(), FixtureError> {
    let (key, value) = kv.split_once('=').ok_or_else(|| err(line, format!("malformed device field `{kv}`")))?;
    let value: u32 = value.parse().map_err(|_| err(line, format!("bad number `{value}`")))?;
    match key {
        "stage_count" => dev.stage_count = value,
        "logical_ids" => dev.logical_id_count = value,
        "long_branch_tags" => dev.long_branch_tag_count = value,
        "sram_rows" => dev.sram_rows_per_stage = value,
        "tcam_rows" => dev.tcam_rows_per_stage = value,
        "map_ram_rows" => dev.map_ram_rows_per_stage = value,
        "ixbar_bytes" => dev.ixbar_bytes_per_stage = value,
        "action_data_bus_bytes" => dev.action_data_bus_bytes_per_stage = value,
        "instr_mem_words" => dev.instr_mem_words_per_stage = value,
        _ => return Err(err(line, format!("unknown device field `{key}`"))),
    }
    Ok(())
}

fn table_id_for(names: &mut HashMap<String, TableId>, name: &str) -> TableId {
    let next = names.len() as u32;
    *names.entry(name.to_string()).or_insert(TableId(next))
}

fn parse_table_line(
    line: usize,
    tokens: &[&str],
    names: &mut HashMap<String, TableId>,
) -> Result<Table, FixtureError> {
    let name = tokens[0];
    let id = table_id_for(names, name);
    let mut table = Table::new(id, name, 1);
    for tok in &tokens[1..] {
        if let Some(rest) = tok.strip_prefix("entries=") {
            let v: u32 = rest.parse().map_err(|_| err(line, format!("bad entries `{rest}`")))?;
            table.requested_entries = v;
            table.min_entries = v;
        } else if let Some(rest) = tok.strip_prefix("min=") {
            table.min_entries = rest.parse().map_err(|_| err(line, format!("bad min `{rest}`")))?;
        } else if let Some(rest) = tok.strip_prefix("stage=") {
            table.stage_pragma = Some(rest.parse().map_err(|_| err(line, format!("bad stage `{rest}`")))?);
        } else if let Some(rest) = tok.strip_prefix("priority=") {
            table.priority = Some(rest.parse().map_err(|_| err(line, format!("bad priority `{rest}`")))?);
        } else if let Some(rest) = tok.strip_prefix("attached=") {
            table.attached.push(rest.to_string());
        } else if *tok == "use_hash_action" {
            table.use_hash_action = true;
        } else if *tok == "separate_gateway" {
            table.separate_gateway = true;
        } else if *tok == "is_gateway" {
            table.is_gateway = true;
        } else if *tok == "is_atcam" {
            table.is_atcam = true;
        } else if let Some(rest) = tok.strip_prefix("atcam_partitions=") {
            table.atcam_partitions = rest.parse().map_err(|_| err(line, format!("bad atcam_partitions `{rest}`")))?;
        } else if *tok == "disable_atomic_modify" {
            table.disable_atomic_modify = true;
        } else if *tok == "always_run" {
            table.is_always_run = true;
        } else {
            return Err(err(line, format!("unknown table attribute `{tok}`")));
        }
    }
    Ok(table)
}

fn parse_dep_kind(line: usize, s: &str) -> Result<DepKind, FixtureError> {
    Ok(match s {
        "data" => DepKind::Data,
        "control" => DepKind::Control,
        "anti" => DepKind::Anti,
        "metadata" => DepKind::MetadataInit,
        _ => return Err(err(line, format!("unknown dependency kind `{s}`"))),
    })
}

/// Parse a complete fixture file.
pub fn parse(src: &str) -> Result<Fixture, FixtureError> {
    let mut fixture = Fixture::default();
    let mut names: HashMap<String, TableId> = HashMap::new();
    let mut lines = src.lines().enumerate().peekable();

    while let Some((idx, raw)) = lines.next() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let keyword = tokens.next().unwrap();
        let rest: Vec<&str> = tokens.collect();

        match keyword {
            "device" => {
                for kv in &rest {
                    parse_device_kv(&mut fixture.device, line_no, kv)?;
                }
            }
            "table" => {
                let table = parse_table_line(line_no, &rest, &mut names)?;
                fixture.tables.insert(table.id, table);
            }
            "dep" => {
                // `dep <from> -> <to> <kind>`
                if rest.len() != 4 || rest[1] != "->" {
                    return Err(err(line_no, format!("malformed dep line `{line}`")));
                }
                let from = table_id_for(&mut names, rest[0]);
                let to = table_id_for(&mut names, rest[2]);
                let kind = parse_dep_kind(line_no, rest[3])?;
                fixture.deps.push(DepEdge { from, to, kind });
            }
            "next" => {
                // `next <table>.<tag> -> <t1>, <t2>, ...`
                if rest.len() < 3 || rest[1] != "->" {
                    return Err(err(line_no, format!("malformed next line `{line}`")));
                }
                let (table_name, tag) = rest[0]
                    .split_once('.')
                    .ok_or_else(|| err(line_no, format!("expected table.tag, got `{}`", rest[0])))?;
                let table_id = table_id_for(&mut names, table_name);
                let joined = rest[2..].join(" ");
                let targets: Vec<TableId> = joined
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| table_id_for(&mut names, s))
                    .collect();
                let table = fixture
                    .tables
                    .get_mut(&table_id)
                    .ok_or_else(|| err(line_no, format!("unknown table `{table_name}`")))?;
                table.next.insert(tag.to_string(), targets);
            }
            "action" => {
                let name = rest.first().ok_or_else(|| err(line_no, "action needs a name"))?.to_string();
                let mut body = Vec::new();
                loop {
                    let Some((body_idx, body_raw)) = lines.next() else {
                        return Err(err(line_no, format!("action `{name}` missing `end`")));
                    };
                    let body_line_no = body_idx + 1;
                    let body_line = body_raw.trim();
                    if body_line.is_empty() || body_line.starts_with('#') {
                        continue;
                    }
                    if body_line == "end" {
                        break;
                    }
                    let mut insn_tokens = body_line.splitn(2, char::is_whitespace);
                    let opcode_str = insn_tokens.next().unwrap();
                    let opcode = parse_opcode(opcode_str)
                        .ok_or_else(|| err(body_line_no, format!("unknown opcode `{opcode_str}`")))?;
                    let rest_of_line = insn_tokens.next().unwrap_or("").trim();
                    let (dst_tok, read_toks) = split_operands(body_line_no, rest_of_line)?;
                    let write = parse_operand(body_line_no, dst_tok)?;
                    let reads =
                        read_toks.into_iter().map(|t| parse_operand(body_line_no, t)).collect::<Result<Vec<_>, _>>()?;
                    let insn_name = format!("{name}.{}", body.len());
                    body.push(FieldAction::new(insn_name, opcode, write, reads));
                }
                fixture.actions.insert(name, body);
            }
            _ => return Err(err(line_no, format!("unknown statement `{keyword}`"))),
        }
    }

    Ok(fixture)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tables_deps_and_a_simple_action() {
        let src = "\
table t0 entries=1024 min=256
table t1 entries=512 stage=3 priority=5 use_hash_action
dep t0 -> t1 data
action t0.hit
  set phv:0[0:7] <- const:5:8
  add phv:1[0:31] <- phv:2[0:31], phv:3[0:31]
end
";
        let fixture = parse(src).unwrap();
        assert_eq!(fixture.tables.len(), 2);
        assert_eq!(fixture.deps.len(), 1);
        let body = &fixture.actions["t0.hit"];
        assert_eq!(body.len(), 2);
        assert_eq!(body[0].opcode, Opcode::Set);
        assert_eq!(body[1].opcode, Opcode::Add);
        assert_eq!(body[1].reads.len(), 2);
    }

    #[test]
    fn conditional_operand_marker_is_recognized() {
        let src = "\
table t0 entries=4
action t0.a0
  conditionally-set phv:0[0:7] <- phv:1[0:7], phv:2[0:7], ?arg:cond[0:0]
end
";
        let fixture = parse(src).unwrap();
        let body = &fixture.actions["t0.a0"];
        assert!(body[0].reads.last().unwrap().is_conditional);
    }

    #[test]
    fn unterminated_action_is_an_error() {
        let src = "table t0 entries=4\naction t0.a0\n  set phv:0[0:7] <- const:1:8\n";
        assert!(parse(src).is_err());
    }

    #[test]
    fn unknown_opcode_is_an_error() {
        let src = "action t0.a0\n  frobnicate phv:0[0:7] <- const:1:8\nend\n";
        assert!(parse(src).is_err());
    }

    #[test]
    fn next_line_records_a_tables_hit_sequence() {
        let src = "\
table t0 entries=4
table t1 entries=4
table t2 entries=4
next t0.hit -> t1, t2
";
        let fixture = parse(src).unwrap();
        let t0 = fixture.tables.values().find(|t| t.name == "t0").unwrap();
        assert_eq!(t0.next["hit"], vec![TableId(1), TableId(2)]);
    }

    #[test]
    fn always_run_attribute_is_recorded() {
        let src = "table t0 entries=4 always_run\n";
        let fixture = parse(src).unwrap();
        assert!(fixture.tables.values().next().unwrap().is_always_run);
    }
}
