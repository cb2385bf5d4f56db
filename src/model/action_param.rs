//! Operand classification output (specification §3 `ActionParam`, §4.2 C3).

use crate::common::bitvec::BitRange;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    Phv,
    ActionData,
    Constant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Speciality {
    None,
    HashDist,
    MeterColor,
    Random,
    MeterAlu,
    StfulCounter,
}

/// What physically produces the value an [`ActionParam`] reads from or
/// writes to. A minimal stand-in for the typed P4 expression tree the real
/// frontend would supply (out of scope per specification §1).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Source {
    /// Reference to a PHV-allocated field, by field id.
    Field(u32),
    /// Reference to an action-data parameter or action-data constant, named.
    ActionArg(String),
    /// A literal constant.
    Literal(i64),
    /// Output of an attached memory (meter/counter/register), named by the
    /// extern instance.
    AttachedOutput(String),
    /// A hash-distribution expression, canonicalized to a name so that
    /// per-table consistency (specification §4.7) can be checked by
    /// equality.
    HashDist(String),
    /// The hardware random-number generator.
    RandomNumber,
}

/// One operand of a field-level instruction, tagged with its kind and,
/// where applicable, a specialty source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionParam {
    pub kind: ParamKind,
    pub source: Source,
    pub speciality: Speciality,
    pub range: BitRange,
    pub is_conditional: bool,
}

impl ActionParam {
    pub fn phv(field_id: u32, range: BitRange) -> Self {
        Self { kind: ParamKind::Phv, source: Source::Field(field_id), speciality: Speciality::None, range, is_conditional: false }
    }

    pub fn action_data(name: impl Into<String>, range: BitRange) -> Self {
        Self {
            kind: ParamKind::ActionData,
            source: Source::ActionArg(name.into()),
            speciality: Speciality::None,
            range,
            is_conditional: false,
        }
    }

    pub fn constant(value: i64, width: u32) -> Self {
        Self {
            kind: ParamKind::Constant,
            source: Source::Literal(value),
            speciality: Speciality::None,
            range: BitRange::new(0, width.saturating_sub(1)),
            is_conditional: false,
        }
    }

    pub fn with_speciality(mut self, speciality: Speciality) -> Self {
        self.speciality = speciality;
        self
    }

    pub fn width(&self) -> u32 {
        self.range.size()
    }
}

impl fmt::Display for ActionParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Source::Field(id) => write!(f, "field{id}{}", self.range),
            Source::ActionArg(name) => write!(f, "{name}{}", self.range),
            Source::Literal(v) => write!(f, "{v}"),
            Source::AttachedOutput(name) => write!(f, "{name}.out{}", self.range),
            Source::HashDist(name) => write!(f, "hash({name}){}", self.range),
            Source::RandomNumber => write!(f, "random{}", self.range),
        }
    }
}
