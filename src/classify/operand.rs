//! Operand Classifier (specification §4.2, C3).
//!
//! Walks one operand expression and produces an [`ActionParam`] tagging it
//! PHV / action-data / constant, with a specialty tag where applicable.
//! Wrapping expressions (bit slices) propagate through, recording the slice
//! bounds in the resulting `ActionParam.range`.

use crate::common::bitvec::BitRange;
use crate::model::action_param::{ActionParam, ParamKind, Source, Speciality};
use crate::model::expr::Expr;

/// Classify a single operand expression per specification §4.2.
pub fn classify_operand(expr: &Expr) -> ActionParam {
    classify_with_range(expr, None)
}

fn classify_with_range(expr: &Expr, outer_range: Option<BitRange>) -> ActionParam {
    match expr {
        Expr::Field(id, range) => {
            let range = outer_range.unwrap_or(*range);
            ActionParam { kind: ParamKind::Phv, source: Source::Field(*id), speciality: Speciality::None, range, is_conditional: false }
        }
        Expr::ActionArg(name, range) => {
            let range = outer_range.unwrap_or(*range);
            ActionParam {
                kind: ParamKind::ActionData,
                source: Source::ActionArg(name.clone()),
                speciality: Speciality::None,
                range,
                is_conditional: false,
            }
        }
        Expr::Const(value, width) => {
            let range = outer_range.unwrap_or(BitRange::new(0, width.saturating_sub(1)));
            ActionParam { kind: ParamKind::Constant, source: Source::Literal(*value), speciality: Speciality::None, range, is_conditional: false }
        }
        // A bit slice or reinterpret cast propagates through to the
        // wrapped expression, recording the slice bounds (§4.2:
        // "Wrapping expressions... propagate through; the slice bounds
        // are recorded in the ActionParam.range").
        Expr::Slice(inner, range) => classify_with_range(inner, Some(*range)),
        Expr::Not(inner) | Expr::Neg(inner) => classify_with_range(inner, outer_range),
        Expr::HashDist(name, width) => {
            let range = outer_range.unwrap_or(BitRange::new(0, width.saturating_sub(1)));
            ActionParam {
                kind: ParamKind::ActionData,
                source: Source::HashDist(name.clone()),
                speciality: Speciality::HashDist,
                range,
                is_conditional: false,
            }
        }
        Expr::RandomNumber(width) => {
            let range = outer_range.unwrap_or(BitRange::new(0, width.saturating_sub(1)));
            ActionParam { kind: ParamKind::ActionData, source: Source::RandomNumber, speciality: Speciality::Random, range, is_conditional: false }
        }
        Expr::AttachedOutput(name, width) => {
            let range = outer_range.unwrap_or(BitRange::new(0, width.saturating_sub(1)));
            // The operand kind still depends on where the value physically
            // arrives; meter-ALU output and stateful-counter output both
            // land in the PHV once the stateful setup stage resolves them.
            let speciality = if name.contains("meter") { Speciality::MeterAlu } else { Speciality::StfulCounter };
            ActionParam { kind: ParamKind::Phv, source: Source::AttachedOutput(name.clone()), speciality, range, is_conditional: false }
        }
        Expr::BinOp(..) | Expr::Mux(..) | Expr::Concat(..) => {
            panic!("classify_operand called on a non-leaf expression; instruction selection must lower it to a FieldAction first")
        }
    }
}

/// Classify every read operand of a flattened `(write, reads)` pair,
/// tagging the write first (§4.2: "The write operand is the first; every
/// subsequent operand is a read").
pub fn classify_operands(write: &Expr, reads: &[Expr]) -> (ActionParam, Vec<ActionParam>) {
    let write_param = classify_operand(write);
    let read_params = reads.iter().map(classify_operand).collect();
    (write_param, read_params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_is_phv() {
        let e = Expr::Field(3, BitRange::new(0, 7));
        let p = classify_operand(&e);
        assert_eq!(p.kind, ParamKind::Phv);
    }

    #[test]
    fn slice_propagates_range() {
        let e = Expr::Slice(Box::new(Expr::Field(3, BitRange::new(0, 31))), BitRange::new(4, 11));
        let p = classify_operand(&e);
        assert_eq!(p.range, BitRange::new(4, 11));
        assert_eq!(p.kind, ParamKind::Phv);
    }

    #[test]
    fn action_arg_is_action_data() {
        let e = Expr::ActionArg("p0".into(), BitRange::new(0, 15));
        let p = classify_operand(&e);
        assert_eq!(p.kind, ParamKind::ActionData);
    }

    #[test]
    fn hash_dist_tagged_specialty() {
        let e = Expr::HashDist("h0".into(), 8);
        let p = classify_operand(&e);
        assert_eq!(p.speciality, Speciality::HashDist);
    }
}
