//! Configuration (specification §6 "Configuration (command-line flags
//! consumed)"), loaded via `clap` derive. Generalizes the teacher driver's
//! flat `Driver` field struct (`ccc::driver::Driver`) into a dedicated
//! module since this backend's flag set is larger.

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "mau-backend", about = "MAU action-instruction backend: action analysis, instruction adjustment, and table placement")]
pub struct Config {
    /// Treat as if the device offers no long-branch tags.
    #[arg(long)]
    pub disable_long_branch: bool,

    /// Never split indirect attached tables across stages.
    #[arg(long)]
    pub disable_split_attached: bool,

    /// At each placement step, consider only the first unplaced table of
    /// each table sequence.
    #[arg(long)]
    pub table_placement_in_order: bool,

    /// Respect `@stage` pragmas absolutely; warn, never relocate.
    #[arg(long)]
    pub forced_placement: bool,

    /// Disable the opportunistic backfill mechanism.
    #[arg(long)]
    pub disable_table_placement_backfill: bool,

    /// Emit GraphViz of the dependency graph per placement invocation.
    #[arg(long)]
    pub create_graphs: bool,

    /// Enable the alternate PHV-first / table-placement-first flow.
    #[arg(long)]
    pub alt_phv_alloc: bool,

    /// Print progress at debug level (maps to a `tracing` level filter).
    #[arg(short, long)]
    pub verbose: bool,

    /// Path to a test-IR fixture file (see `driver::fixture`); the real P4
    /// frontend/mid-end is out of scope (specification §1).
    #[arg(long)]
    pub input: Option<String>,

    #[arg(short, long, default_value = "placement_report.txt")]
    pub output: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            disable_long_branch: false,
            disable_split_attached: false,
            table_placement_in_order: false,
            forced_placement: false,
            disable_table_placement_backfill: false,
            create_graphs: false,
            alt_phv_alloc: false,
            verbose: false,
            input: None,
            output: "placement_report.txt".to_string(),
        }
    }
}

/// A table or stateful extern's `@pragma placement_priority(int|name)` /
/// `@use_hash_action` / etc. pragmas (specification §6 "Pragmas
/// honoured").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pragma {
    Stage(u32),
    StageWithEntries(u32, u32),
    PlacementPriority(i32),
    UseHashAction,
    SeparateGateway,
    DisableAtomicModify,
    PaContainerSize,
    DynamicTableKeyMasks,
}
