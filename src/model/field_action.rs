//! Field-level instructions and the per-source alignment bookkeeping the
//! alignment solver (§4.3) and verifier (§4.4) operate on.

use crate::common::bitvec::{BitRange, Bitvec};
use crate::model::action_param::ActionParam;
use bitflags::bitflags;
use std::fmt;

/// The ALU opcodes this backend can select among (specification §4.5),
/// plus the four ALU instruction variants chosen by the alignment solver
/// (§4.3) and the `invalidate` opcode, which has no destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    And,
    Andca,
    Andcb,
    Nand,
    Or,
    Orca,
    Orcb,
    Nor,
    Xor,
    Xnor,
    Not,
    Add,
    Addc,
    Sub,
    Subc,
    Saddu,
    Sadds,
    Ssubu,
    Ssubs,
    Minu,
    Mins,
    Maxu,
    Maxs,
    Shl,
    Shru,
    Shrs,
    FunnelShift,
    Setz,
    Sethi,
    ConditionallySet,
    Invalidate,
    // The four ALU instruction variants the alignment solver chooses among.
    Set,
    DepositField,
    BitmaskedSet,
    ByteRotateMerge,
}

impl Opcode {
    /// Opcodes for which the alignment solver may freely swap src1/src2 to
    /// satisfy source-slot rules (specification §4.4 "Commutativity").
    pub fn is_commutative(&self) -> bool {
        matches!(
            self,
            Opcode::Add
                | Opcode::Addc
                | Opcode::Saddu
                | Opcode::Sadds
                | Opcode::Minu
                | Opcode::Mins
                | Opcode::Maxu
                | Opcode::Maxs
                | Opcode::Nor
                | Opcode::Xor
                | Opcode::Or
                | Opcode::Nand
                | Opcode::And
                | Opcode::Xnor
                | Opcode::Setz
                | Opcode::Sethi
        )
    }

    pub fn is_single_shift(&self) -> bool {
        matches!(self, Opcode::Shru | Opcode::Shrs | Opcode::Shl)
    }

    pub fn is_funnel_shift(&self) -> bool {
        matches!(self, Opcode::FunnelShift)
    }

    pub fn is_shift(&self) -> bool {
        self.is_single_shift() || self.is_funnel_shift()
    }

    /// Instructions of the form `X = X op const` where inserting all-0s or
    /// all-1s for the overwritten part preserves the untouched bits, so they
    /// tolerate a partially-overwritten container (specification §4.6 pass
    /// 4 comment, "bitwise-overwritable").
    pub fn is_bitwise_overwritable(&self) -> bool {
        matches!(self, Opcode::And | Opcode::Or | Opcode::Xor | Opcode::Xnor)
    }

    pub fn has_no_destination(&self) -> bool {
        matches!(self, Opcode::Invalidate)
    }

    /// Constant operands on non-`set` opcodes fit only a signed 3-bit range
    /// on this target (specification §4.3 step 6).
    pub fn constant_range_bits(&self) -> u32 {
        if matches!(self, Opcode::Set) {
            21 // LOADCONST_MAX
        } else {
            3
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Opcode::And => "and",
            Opcode::Andca => "andca",
            Opcode::Andcb => "andcb",
            Opcode::Nand => "nand",
            Opcode::Or => "or",
            Opcode::Orca => "orca",
            Opcode::Orcb => "orcb",
            Opcode::Nor => "nor",
            Opcode::Xor => "xor",
            Opcode::Xnor => "xnor",
            Opcode::Not => "not",
            Opcode::Add => "add",
            Opcode::Addc => "addc",
            Opcode::Sub => "sub",
            Opcode::Subc => "subc",
            Opcode::Saddu => "saddu",
            Opcode::Sadds => "sadds",
            Opcode::Ssubu => "ssubu",
            Opcode::Ssubs => "ssubs",
            Opcode::Minu => "minu",
            Opcode::Mins => "mins",
            Opcode::Maxu => "maxu",
            Opcode::Maxs => "maxs",
            Opcode::Shl => "shl",
            Opcode::Shru => "shru",
            Opcode::Shrs => "shrs",
            Opcode::FunnelShift => "funnel-shift",
            Opcode::Setz => "setz",
            Opcode::Sethi => "sethi",
            Opcode::ConditionallySet => "conditionally-set",
            Opcode::Invalidate => "invalidate",
            Opcode::Set => "set",
            Opcode::DepositField => "deposit-field",
            Opcode::BitmaskedSet => "bitmasked-set",
            Opcode::ByteRotateMerge => "byte-rotate-merge",
        };
        write!(f, "{s}")
    }
}

bitflags! {
    /// Per-instruction error bitmask (specification §3 `FieldAction`).
    pub struct FieldActionError: u32 {
        const READ_AFTER_WRITES      = 1 << 0;
        const REPEATED_WRITES        = 1 << 1;
        const MULTIPLE_ACTION_DATA   = 1 << 2;
        const DIFFERENT_OP_SIZE      = 1 << 3;
        const BAD_CONDITIONAL_SET    = 1 << 4;
    }
}

/// One high-level field-level instruction: `write = opcode(reads...)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldAction {
    pub name: String,
    pub opcode: Opcode,
    pub write: ActionParam,
    pub reads: Vec<ActionParam>,
    pub error: FieldActionError,
}

impl FieldAction {
    pub fn new(name: impl Into<String>, opcode: Opcode, write: ActionParam, reads: Vec<ActionParam>) -> Self {
        Self { name: name.into(), opcode, write, reads, error: FieldActionError::empty() }
    }
}

/// Which operand slot on the destination ALU a read maps to
/// (`op_type_t` in the specification's §3 `Alignment`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SrcSlot {
    None,
    Dst,
    Src1,
    Src2,
    Src3,
}

/// One field-level source's contribution to a container
/// (specification §3 `Alignment`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alignment {
    pub write_bits: BitRange,
    pub read_bits: BitRange,
    pub src_slot: SrcSlot,
}

impl Alignment {
    pub fn new(write_bits: BitRange, read_bits: BitRange, src_slot: SrcSlot) -> Self {
        Self { write_bits, read_bits, src_slot }
    }

    /// The rotation this one alignment implies, as `write_bits.lo -
    /// read_bits.lo` modulo `width`. Individual alignments for the same
    /// source on the same container must all agree on this value (the
    /// alignment solver's congruence check, §4.3 step 1).
    pub fn right_shift(&self, width: u32) -> i32 {
        let raw = self.read_bits.lo as i64 - self.write_bits.lo as i64;
        raw.rem_euclid(width as i64) as i32
    }
}

/// Aggregates all [`Alignment`]s for one source on one container
/// (specification §3 `TotalAlignment`).
#[derive(Debug, Clone, Default)]
pub struct TotalAlignment {
    pub indiv_alignments: Vec<Alignment>,
    pub direct_write_bits: Bitvec,
    pub direct_read_bits: Bitvec,
    pub implicit_write_bits: Bitvec,
    pub right_shift: i32,
    pub is_src1: bool,
}

impl TotalAlignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, alignment: Alignment) {
        self.direct_write_bits.set_range(alignment.write_bits.lo, alignment.write_bits.hi);
        self.direct_read_bits.set_range(alignment.read_bits.lo, alignment.read_bits.hi);
        self.indiv_alignments.push(alignment);
    }

    /// Invariant: popcount(direct_write_bits) == popcount(direct_read_bits).
    pub fn popcount_matches(&self) -> bool {
        self.direct_write_bits.popcount() == self.direct_read_bits.popcount()
    }
}
