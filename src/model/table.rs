//! The table-placement data model (specification §3 "Table Placement",
//! §4.8 C9): an append-only arena of immutable `Placed` decisions threaded
//! by `prev` links, so backtracking is a pointer rewind rather than a
//! destructive edit (specification §9 "Cloning on write").

use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub u32);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Index into the append-only `Placed` arena (specification §9: "a node
/// arena indexed by stable unique ids").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlacedId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepKind {
    Data,
    Control,
    Anti,
    MetadataInit,
}

#[derive(Debug, Clone, Copy)]
pub struct DepEdge {
    pub from: TableId,
    pub to: TableId,
    pub kind: DepKind,
}

/// One table as seen by the placement allocator. Match/memory/crossbar
/// details beyond `entries` are out of scope (owned by the memory and
/// input-crossbar allocators, per specification §1).
#[derive(Debug, Clone)]
pub struct Table {
    pub id: TableId,
    pub name: String,
    pub requested_entries: u32,
    pub min_entries: u32,
    pub attached: Vec<String>,
    /// Lower bound on the stage chosen, from an `@stage(n)` pragma.
    pub stage_pragma: Option<u32>,
    /// Tie-breaking priority from `@pragma placement_priority(...)`.
    pub priority: Option<i32>,
    pub use_hash_action: bool,
    pub separate_gateway: bool,
    pub is_gateway: bool,
    pub is_atcam: bool,
    pub atcam_partitions: u32,
    pub disable_atomic_modify: bool,
    /// Every action path fires into an always-run slot shared by every
    /// table in the same stage (specification §4.9 "Always-run actions").
    pub is_always_run: bool,
    /// This table's own hit/miss next-table sequences, keyed by tag
    /// (`"hit"`, `"miss"`, or an action name). A gateway merged into this
    /// table distributes its true-branch sequence across every entry here
    /// (specification §4.9, `transform::merge_gateway`).
    pub next: HashMap<String, Vec<TableId>>,
}

impl Table {
    pub fn new(id: TableId, name: impl Into<String>, requested_entries: u32) -> Self {
        Self {
            id,
            name: name.into(),
            requested_entries,
            min_entries: requested_entries,
            attached: Vec::new(),
            stage_pragma: None,
            priority: None,
            use_hash_action: false,
            separate_gateway: false,
            is_gateway: false,
            is_atcam: false,
            atcam_partitions: 1,
            disable_atomic_modify: false,
            is_always_run: false,
            next: HashMap::new(),
        }
    }
}

/// Per-stage resource usage and budgets (specification §4.8 "memory,
/// crossbar, action-data-bus, instruction-memory" constraints).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Resources {
    pub sram_used: u32,
    pub tcam_used: u32,
    pub map_ram_used: u32,
    pub logical_ids_used: u32,
    pub ixbar_bytes_used: u32,
    pub action_data_bus_bytes_used: u32,
    pub instr_mem_words_used: u32,
    pub long_branch_tags_used: u32,
}

impl Resources {
    pub fn add(&self, other: &Resources) -> Resources {
        Resources {
            sram_used: self.sram_used + other.sram_used,
            tcam_used: self.tcam_used + other.tcam_used,
            map_ram_used: self.map_ram_used + other.map_ram_used,
            logical_ids_used: self.logical_ids_used + other.logical_ids_used,
            ixbar_bytes_used: self.ixbar_bytes_used + other.ixbar_bytes_used,
            action_data_bus_bytes_used: self.action_data_bus_bytes_used + other.action_data_bus_bytes_used,
            instr_mem_words_used: self.instr_mem_words_used + other.instr_mem_words_used,
            long_branch_tags_used: self.long_branch_tags_used + other.long_branch_tags_used,
        }
    }

    pub fn fits_within(&self, budget: &Resources) -> bool {
        self.sram_used <= budget.sram_used
            && self.tcam_used <= budget.tcam_used
            && self.map_ram_used <= budget.map_ram_used
            && self.logical_ids_used <= budget.logical_ids_used
            && self.ixbar_bytes_used <= budget.ixbar_bytes_used
            && self.action_data_bus_bytes_used <= budget.action_data_bus_bytes_used
            && self.instr_mem_words_used <= budget.instr_mem_words_used
            && self.long_branch_tags_used <= budget.long_branch_tags_used
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachedEntry {
    pub entries: u32,
    pub stage: u32,
}

/// One immutable placement decision. The chain of `prev` links forms the
/// history that can be snapshotted (by `PlacedId`) for backtracking.
#[derive(Debug, Clone)]
pub struct Placed {
    pub table: TableId,
    pub stage: u32,
    pub logical_id: u32,
    pub entries: u32,
    pub attached_entries: HashMap<String, AttachedEntry>,
    pub stage_split: bool,
    pub resources: Resources,
    pub prev: Option<PlacedId>,
    pub group: u32,
}

/// An append-only history arena of [`Placed`] decisions (specification §9:
/// "the `prev` pointer is a shared reference into an append-only history
/// arena"). Backtracking rewinds by truncating to a saved length rather
/// than mutating existing entries.
#[derive(Debug, Clone, Default)]
pub struct PlacedArena {
    nodes: Vec<Placed>,
}

impl PlacedArena {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn push(&mut self, placed: Placed) -> PlacedId {
        let id = PlacedId(self.nodes.len() as u32);
        self.nodes.push(placed);
        id
    }

    pub fn get(&self, id: PlacedId) -> &Placed {
        &self.nodes[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Snapshot point for backtracking: the current length.
    pub fn checkpoint(&self) -> usize {
        self.nodes.len()
    }

    /// Rewind to a previously taken checkpoint, discarding everything
    /// placed after it.
    pub fn rewind(&mut self, checkpoint: usize) {
        self.nodes.truncate(checkpoint);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Placed> {
        self.nodes.iter()
    }

    pub fn iter_from(&self, start: PlacedId) -> impl Iterator<Item = &Placed> {
        self.nodes[start.0 as usize..].iter()
    }
}
