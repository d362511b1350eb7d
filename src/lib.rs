//! Agent-based tumour growth on a lattice of cubic subdomains.
//!
//! Each subdomain runs an Initialise → Simulate → Reset lifecycle per
//! macro-iteration; [`tissue::Tissue`] drives the batch and moves migrants
//! between neighbouring subdomains.

pub mod agent;
pub mod checkpoint;
pub mod division;
pub mod error;
pub mod field;
pub mod grid;
pub mod migration;
pub mod phenotype;
pub mod physics;
pub mod secretion;
pub mod simulation;
pub mod subdomain;
pub mod tissue;

#[cfg(test)]
mod test_support;

pub use agent::{constructor_for, create_cells, Agent, CellConstructor};
pub use error::{TissueError, TissueResult};
pub use phenotype::{evaluate, PhenotypeOutcome, Regime, RuleSet};
pub use simulation::{run_subdomain, SubdomainSimulation};
pub use subdomain::{Face, FaceCounts, Subdomain};
pub use tissue::Tissue;
