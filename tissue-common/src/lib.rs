pub mod config;
pub mod sim_params;
pub mod snapshot;
pub mod vecmath;

// Re-export key types for easier use by dependent crates
pub use config::{
    BiochemicalConfig, CellTypeConfig, DomainConfig, GridConfig, InitialConditions,
    MicrostructureConfig, MigrationConfig, OutputConfig, Phenotype, PhenotypeRulesConfig,
    PhysicsConfig, RegimeConfig, RulesConfig, SimulationConfig, SubdomainLayout,
    SubstanceConfig, TimingConfig,
};
pub use sim_params::SimParams;
pub use snapshot::AggregateSnapshot;
pub use vecmath::{clamp, Axis, Vec3};
