//! Shared fixtures for unit tests.

use tissue_common::SimParams;

/// A 100-unit cube on a 16^3 grid, one percent escape margin.
pub fn params() -> SimParams {
    SimParams {
        min_bound: 0.0,
        max_bound: 100.0,
        extent: 100.0,
        bound_space: true,
        escape_margin: 1.0,
        inflow_slab: 5.0,
        migration_active: true,
        grid_resolution: 16,
        voxel_size: 100.0 / 16.0,
        inv_voxel_size: 16.0 / 100.0,
        dt: 0.01,
        micro_steps_per_macro: 1,
        time_step: 0,
        n_cell_types: 2,
        n_biochemicals: 0,
        n_microstructures: 0,
    }
}
