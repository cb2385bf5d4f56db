//! Typed error enums, one per error-handling-design "Kind" (§7 of the
//! specification): unimplementable-on-target, placement-infeasible,
//! alignment/format failure, and user-input violation. Internal invariant
//! breaks are not recoverable and go through the [`bug!`] macro instead of a
//! `Result`, mirroring the teacher's bare `unreachable!()` calls.

use thiserror::Error;

/// A request this backend has no way to realize on the target hardware.
/// No recovery is attempted; the pipe aborts with this error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UnimplementableError {
    #[error("unsigned saturating subtract with a constant second source has no direct encoding on this target: {action}")]
    UnsignedSaturatingSubtractConstantSrc2 { action: String },

    #[error("stateful register read/write as a plain method call is not realizable: {action}")]
    StatefulRegisterReadWriteCall { action: String },

    #[error("dark container {container} cannot be sourced from action data or constants")]
    DarkContainerActionDataSource { container: String },

    #[error("selector cannot be attached to a multi-action stateful ALU: {table}")]
    SelectorOnMultiActionSalu { table: String },

    #[error("clear on a register split across multiple containers is not supported: {register}")]
    ClearOnSplitStateful { register: String },

    #[error("saturating arithmetic cannot be split across containers: {action}")]
    SaturatingArithmeticSplit { action: String },
}

/// Table placement could not find a feasible (stage, logical-id) assignment.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlacementInfeasibleError {
    #[error("table {table} plus its dependency tail exceeds the available stage count")]
    DependencyTailExceedsStages { table: String },

    #[error("attached table {attached} is shared by tables that cannot co-reside in one stage")]
    SharedAttachedCannotCoreside { attached: String },

    #[error("backtrack budget exhausted while placing {table}")]
    BacktrackBudgetExhausted { table: String },
}

/// A container-action could not be realized by any of the four ALU variants.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AlignmentError {
    #[error("container {container}: sources require different rotations ({a} vs {b})")]
    ImpossibleAlignment { container: String, a: i32, b: i32 },

    #[error("container {container}: more than two PHV source containers")]
    TooManyPhvSources { container: String },

    #[error("container {container}: partial overwrite is not realizable without a deposit-field/bitmasked-set")]
    IllegalOverwrite { container: String },

    #[error("container {container}: no input bits found while resolving the stateful ALU starting bit")]
    NoInputBits { container: String },
}

/// The user's P4 program violates a constraint this backend enforces.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UserInputError {
    #[error("tables {table_a} and {table_b} address shared extern {extern_name} with inconsistent index expressions")]
    InconsistentSharedExternIndex { table_a: String, table_b: String, extern_name: String },

    #[error("meter pre-color in {action} must come from a PHV field")]
    PreColorNotFromPhv { action: String },

    #[error("clear on {register} requires constant arguments")]
    ClearWithNonConstantArgs { register: String },

    #[error("table {table} mixes direct hash addressing and index addressing for the same indirect extern")]
    MixedHashAndIndexAddressing { table: String },
}

/// Any of the typed error kinds above, for call sites that need a single
/// return type across more than one kind (e.g. a pass driver).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MauError {
    #[error(transparent)]
    Unimplementable(#[from] UnimplementableError),
    #[error(transparent)]
    Placement(#[from] PlacementInfeasibleError),
    #[error(transparent)]
    Alignment(#[from] AlignmentError),
    #[error(transparent)]
    UserInput(#[from] UserInputError),
}

/// Raise an internal invariant violation. Internal invariant breaks are not
/// recoverable conditions (per the error-handling design's taxonomy); they
/// abort immediately rather than returning a `Result`.
macro_rules! bug {
    ($($arg:tt)*) => {
        panic!("internal invariant violated: {}", format!($($arg)*))
    };
}
pub(crate) use bug;
