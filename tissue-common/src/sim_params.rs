use serde::{Deserialize, Serialize};

/// Simulation parameters derived from the configuration, used frequently during simulation steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimParams {
    // Domain
    pub min_bound: f64,
    pub max_bound: f64,
    pub extent: f64,
    pub bound_space: bool,

    // Boundary migration
    pub escape_margin: f64, // Inner margin from each face, absolute units
    pub inflow_slab: f64,   // Thickness of the slab incoming cells are placed in
    pub migration_active: bool,

    // Field grid
    pub grid_resolution: u32,
    pub voxel_size: f64,
    pub inv_voxel_size: f64,

    // Time
    pub dt: f64,
    pub micro_steps_per_macro: u32,
    pub time_step: u64, // Current micro-step number within the macro-iteration

    // Cardinalities
    pub n_cell_types: usize,
    pub n_biochemicals: usize,
    pub n_microstructures: usize,
}
