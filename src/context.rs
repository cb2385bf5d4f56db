//! The explicit context object every pass takes (specification §9: "Global
//! state... Package them into a context object passed explicitly to every
//! pass to remain testable"). Bundles per-device constants (specification
//! §6 "Input"), the parsed [`Config`], the [`DiagnosticEngine`], and the
//! process-wide unique-id generator.

use crate::common::diagnostic::DiagnosticEngine;
use crate::config::Config;

/// Per-device constants named in specification §6's "Input" paragraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConstants {
    pub stage_count: u32,
    pub logical_id_count: u32,
    pub long_branch_tag_count: u32,
    pub always_run_imem_address: u32,
    /// Meter-ALU output byte offsets in 64-bit mode (specification §4.3
    /// step 7: "fixed byte offsets (0, 4, 8, 12 in 64-bit mode)").
    pub meter_alu_output_byte_offsets: [u32; 4],
    pub sram_rows_per_stage: u32,
    pub tcam_rows_per_stage: u32,
    pub map_ram_rows_per_stage: u32,
    pub ixbar_bytes_per_stage: u32,
    pub action_data_bus_bytes_per_stage: u32,
    pub instr_mem_words_per_stage: u32,
}

impl Default for DeviceConstants {
    /// Values in the shape of a Tofino-class device; not load-bearing
    /// beyond giving the placer and the solver realistic budgets to work
    /// against in tests and the demo fixture.
    fn default() -> Self {
        Self {
            stage_count: 12,
            logical_id_count: 16,
            long_branch_tag_count: 8,
            always_run_imem_address: 0,
            meter_alu_output_byte_offsets: [0, 4, 8, 12],
            sram_rows_per_stage: 128,
            tcam_rows_per_stage: 24,
            map_ram_rows_per_stage: 48,
            ixbar_bytes_per_stage: 128,
            action_data_bus_bytes_per_stage: 128,
            instr_mem_words_per_stage: 64,
        }
    }
}

/// Monotonic id generator for synthesized IR nodes (e.g. the compiler-
/// generated tables created by constant-to-action-data promotion,
/// specification §4.5 / scenario S5).
#[derive(Debug, Default)]
pub struct IdGen(u32);

impl IdGen {
    pub fn next_id(&mut self) -> u32 {
        let id = self.0;
        self.0 += 1;
        id
    }
}

/// The context threaded through every pass.
pub struct Context {
    pub config: Config,
    pub device: DeviceConstants,
    pub diagnostics: DiagnosticEngine,
    pub ids: IdGen,
}

impl Context {
    pub fn new(config: Config) -> Self {
        Self { config, device: DeviceConstants::default(), diagnostics: DiagnosticEngine::new(), ids: IdGen::default() }
    }

    pub fn with_device(mut self, device: DeviceConstants) -> Self {
        self.device = device;
        self
    }
}

#[cfg(test)]
impl Default for Context {
    fn default() -> Self {
        Context::new(Config::default())
    }
}
