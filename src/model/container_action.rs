//! The per-container aggregate view the verifier (§4.4) builds from the
//! field-level instructions touching one container in one action.

use crate::common::bitvec::Bitvec;
use crate::model::container::Container;
use crate::model::field_action::{Opcode, TotalAlignment};
use bitflags::bitflags;
use std::collections::HashMap;

bitflags! {
    /// Per-container-action error bitmask (specification §3 `ContainerAction`,
    /// and the three-way disposition in §4.4 "Error propagation").
    pub struct ContainerActionError: u32 {
        const MULTIPLE_CONTAINER_ACTIONS   = 1 << 0;
        const READ_PHV_MISMATCH            = 1 << 1;
        const ACTION_DATA_MISMATCH         = 1 << 2;
        const CONSTANT_MISMATCH            = 1 << 3;
        const TOO_MANY_PHV_SOURCES         = 1 << 4;
        const IMPOSSIBLE_ALIGNMENT         = 1 << 5;
        const CONSTANT_TO_ACTION_DATA      = 1 << 6;
        const MULTIPLE_ACTION_DATA         = 1 << 7;
        const ILLEGAL_OVERWRITE            = 1 << 8;
        const BIT_COLLISION                = 1 << 9;
        const OPERAND_MISMATCH             = 1 << 10;
        const UNHANDLED_ACTION_DATA        = 1 << 11;
        const DIFFERENT_READ_SIZE          = 1 << 12;
        const MAU_GROUP_MISMATCH           = 1 << 13;
        const PHV_AND_ACTION_DATA          = 1 << 14;
        const PARTIAL_OVERWRITE            = 1 << 15;
        const REFORMAT_CONSTANT            = 1 << 16;
        const UNRESOLVED_REPEATED_ACTION_DATA = 1 << 17;
        const CONSTANT_TO_HASH             = 1 << 18;
    }
}

impl ContainerActionError {
    /// Recoverable by a later re-layout pass in the adjustment pipeline.
    pub fn recoverable_by_relayout(&self) -> bool {
        self.intersects(
            ContainerActionError::PARTIAL_OVERWRITE
                | ContainerActionError::REFORMAT_CONSTANT
                | ContainerActionError::UNRESOLVED_REPEATED_ACTION_DATA
                | ContainerActionError::IMPOSSIBLE_ALIGNMENT
                | ContainerActionError::ILLEGAL_OVERWRITE,
        )
    }

    /// Recoverable by promoting a constant to action-data or hash-dist.
    pub fn recoverable_by_constant_promotion(&self) -> bool {
        self.intersects(ContainerActionError::CONSTANT_TO_ACTION_DATA | ContainerActionError::CONSTANT_TO_HASH)
    }

    /// Neither of the above: a fatal, user-visible error.
    pub fn is_fatal(&self) -> bool {
        !self.is_empty() && !self.recoverable_by_relayout() && !self.recoverable_by_constant_promotion()
    }
}

/// The ALU instruction variant the alignment solver selected
/// (specification §4.3 step 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    Set,
    DepositField,
    BitmaskedSet,
    ByteRotateMerge,
}

/// Descriptor for the merged constant source of a container action
/// (specification §3 `ContainerAction`: "the constant descriptor").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstantDescriptor {
    /// `(value, bit range within the container)` positions, before merging.
    pub positions: Vec<(i64, crate::common::bitvec::BitRange)>,
    pub merged_value: i64,
    pub sign_extend: bool,
}

/// Descriptor for the action-data source of a container action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionDataDescriptor {
    pub start_byte: u32,
    pub width: u32,
    pub specialty_mask: u32,
}

/// The per-container aggregate (specification §3 `ContainerAction`).
#[derive(Debug, Clone)]
pub struct ContainerAction {
    pub container: Container,
    pub opcode: Opcode,
    pub error: ContainerActionError,
    pub phv_source_count: u32,
    pub action_data_count: u32,
    pub constant_count: u32,
    pub action_data: ActionDataDescriptor,
    pub constant: ConstantDescriptor,
    pub phv_alignment: HashMap<Container, TotalAlignment>,

    pub convert_to_deposit_field: bool,
    pub convert_to_bitmasked_set: bool,
    pub convert_to_byte_rotate_merge: bool,
    pub total_overwrite_possible: bool,
    pub implicit_src1: bool,
    pub implicit_src2: bool,
    pub impossible: bool,

    pub write_bits: Bitvec,
    pub variant: Option<Variant>,
}

impl ContainerAction {
    pub fn new(container: Container, opcode: Opcode) -> Self {
        Self {
            container,
            opcode,
            error: ContainerActionError::empty(),
            phv_source_count: 0,
            action_data_count: 0,
            constant_count: 0,
            action_data: ActionDataDescriptor::default(),
            constant: ConstantDescriptor::default(),
            phv_alignment: HashMap::new(),
            convert_to_deposit_field: false,
            convert_to_bitmasked_set: false,
            convert_to_byte_rotate_merge: false,
            total_overwrite_possible: false,
            implicit_src1: false,
            implicit_src2: false,
            impossible: false,
            write_bits: Bitvec::empty(),
            variant: None,
        }
    }

    pub fn add_error(&mut self, e: ContainerActionError) {
        self.error |= e;
        if e.intersects(
            ContainerActionError::IMPOSSIBLE_ALIGNMENT
                | ContainerActionError::TOO_MANY_PHV_SOURCES
                | ContainerActionError::BIT_COLLISION,
        ) {
            self.impossible = true;
        }
    }
}
