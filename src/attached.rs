//! Stateful / Attached Setup (specification §4.7, C8).
//!
//! Links register-action, meter, counter, and selector calls to their
//! attached memories, resolves index sources, and computes per-action
//! meter-type / per-flow-enable bits.

use crate::classify::operand::classify_operand;
use crate::common::error::UserInputError;
use crate::model::action_param::ParamKind;
use crate::model::expr::Expr;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachedKind {
    Register,
    Meter,
    Counter,
    Selector,
    Lpf,
    Wred,
}

/// How an attached extern's index is sourced.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexExpr {
    Constant(i64),
    ActionArg(String),
    HashDist(String),
}

impl IndexExpr {
    /// Canonical form used for cross-table consistency checks
    /// (specification §4.7 "enforces that every table... uses an identical
    /// expression").
    pub fn canonical(&self) -> String {
        match self {
            IndexExpr::Constant(v) => format!("const:{v}"),
            IndexExpr::ActionArg(name) => format!("arg:{name}"),
            IndexExpr::HashDist(name) => format!("hash:{name}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeterType {
    Stful0,
    Stful1,
    Stful2,
    Stful3,
    ColorAware,
}

/// Resolve a SALU body's inst_code to a meter type (specification §4.7:
/// "Resolves the callee's SALU action body to an inst_code in {0..3}").
/// `inst_code` is assumed already resolved by the SALU compiler (out of
/// scope here); this just maps it onto the meter-type enum.
pub fn meter_type_for_inst_code(inst_code: u8, color_aware: bool) -> Result<MeterType, UserInputError> {
    if color_aware {
        return Ok(MeterType::ColorAware);
    }
    match inst_code {
        0 => Ok(MeterType::Stful0),
        1 => Ok(MeterType::Stful1),
        2 => Ok(MeterType::Stful2),
        3 => Ok(MeterType::Stful3),
        _ => Err(UserInputError::PreColorNotFromPhv { action: format!("inst_code {inst_code} out of range") }),
    }
}

#[derive(Debug, Clone)]
pub struct AttachedCall {
    pub extern_name: String,
    pub kind: AttachedKind,
    pub table: String,
    pub action: String,
    pub index: IndexExpr,
    /// `Meter.execute(index, pre_color)`'s second argument, if present.
    pub pre_color: Option<Expr>,
    /// The PHV input field captured from `Lpf.execute(input)` /
    /// `Wred.execute(input)`.
    pub lpf_wred_input: Option<Expr>,
    pub per_flow_enable_bit: Option<Expr>,
}

impl AttachedCall {
    /// For `Meter.execute(index, pre_color)`, validate the pre-color comes
    /// from a PHV field and mark the meter type color-aware
    /// (specification §4.7).
    pub fn resolve_color_awareness(&self) -> Result<bool, UserInputError> {
        match &self.pre_color {
            None => Ok(false),
            Some(expr) => {
                let param = classify_operand(expr);
                if param.kind != ParamKind::Phv {
                    return Err(UserInputError::PreColorNotFromPhv { action: self.action.clone() });
                }
                Ok(true)
            }
        }
    }
}

/// `TempVar = HashFunc(...)` immediately followed by `execute(TempVar)` is
/// collapsed into a direct `execute(HashDist(...))` (specification §4.7).
/// `defs` maps a temporary's name to the hash-dist expression it was
/// assigned; `index` is the call's raw index expression before collapsing.
pub fn collapse_hash_temp(defs: &HashMap<String, String>, index: &IndexExpr) -> IndexExpr {
    if let IndexExpr::ActionArg(name) = index {
        if let Some(hash_name) = defs.get(name) {
            return IndexExpr::HashDist(hash_name.clone());
        }
    }
    index.clone()
}

/// Enforces that every table sharing one indirect extern uses an
/// equivalent index expression (specification §4.7 and testable property
/// P6), and that no table mixes direct-hash and by-index addressing for
/// the same extern (the "cannot mix" rule).
pub fn check_shared_extern_consistency(calls: &[AttachedCall]) -> Result<(), UserInputError> {
    let mut by_extern: HashMap<&str, Vec<&AttachedCall>> = HashMap::new();
    for call in calls {
        by_extern.entry(call.extern_name.as_str()).or_default().push(call);
    }
    for (extern_name, group) in by_extern {
        if group.len() < 2 {
            continue;
        }
        let first = group[0];
        let first_is_hash = matches!(first.index, IndexExpr::HashDist(_));
        for other in &group[1..] {
            let other_is_hash = matches!(other.index, IndexExpr::HashDist(_));
            if first_is_hash != other_is_hash {
                return Err(UserInputError::MixedHashAndIndexAddressing { table: other.table.clone() });
            }
            if first.index.canonical() != other.index.canonical() {
                return Err(UserInputError::InconsistentSharedExternIndex {
                    table_a: first.table.clone(),
                    table_b: other.table.clone(),
                    extern_name: extern_name.to_string(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::bitvec::BitRange;

    fn call(table: &str, extern_name: &str, index: IndexExpr) -> AttachedCall {
        AttachedCall {
            extern_name: extern_name.into(),
            kind: AttachedKind::Meter,
            table: table.into(),
            action: format!("{table}.a0"),
            index,
            pre_color: None,
            lpf_wred_input: None,
            per_flow_enable_bit: None,
        }
    }

    #[test]
    fn consistent_indices_pass() {
        let calls = vec![
            call("t0", "m0", IndexExpr::ActionArg("idx".into())),
            call("t1", "m0", IndexExpr::ActionArg("idx".into())),
        ];
        assert!(check_shared_extern_consistency(&calls).is_ok());
    }

    #[test]
    fn inconsistent_indices_rejected() {
        let calls = vec![
            call("t0", "m0", IndexExpr::ActionArg("idx".into())),
            call("t1", "m0", IndexExpr::Constant(3)),
        ];
        assert!(check_shared_extern_consistency(&calls).is_err());
    }

    #[test]
    fn mixed_hash_and_index_rejected() {
        let calls = vec![
            call("t0", "m0", IndexExpr::HashDist("h0".into())),
            call("t1", "m0", IndexExpr::ActionArg("idx".into())),
        ];
        assert!(check_shared_extern_consistency(&calls).is_err());
    }

    #[test]
    fn pre_color_must_be_phv() {
        let mut c = call("t0", "m0", IndexExpr::ActionArg("idx".into()));
        c.pre_color = Some(Expr::ActionArg("p0".into(), BitRange::new(0, 1)));
        assert!(c.resolve_color_awareness().is_err());

        c.pre_color = Some(Expr::Field(7, BitRange::new(0, 1)));
        assert!(c.resolve_color_awareness().unwrap());
    }
}
