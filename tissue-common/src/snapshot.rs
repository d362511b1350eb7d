use serde::{Deserialize, Serialize};

/// Aggregates of one subdomain at the end of a macro-iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    pub macro_iteration: u32,
    pub subdomain_id: usize,
    /// Live agents per cell type, indexed by type.
    pub population: Vec<u32>,
    /// Total mass per cell type, indexed by type.
    pub mass: Vec<f64>,
    /// Agents that left through each face, in face order (-x, +x, -y, +y, -z, +z).
    pub escaped: [u32; 6],
    /// Agents seeded at the start of the macro-iteration, in face order.
    pub incoming: [u32; 6],
    /// Agents in [normoxia, hypoxia, necrosis] during the last micro-step.
    pub regime_counts: [u32; 3],
    /// Divisions over the whole macro-iteration.
    pub divisions: u32,
    /// Mean level of each biochemical after the macro-iteration.
    pub biochemical_level: Vec<f64>,
    /// True when the population was read back from a checkpoint.
    pub resumed: bool,
}

impl AggregateSnapshot {
    pub fn total_population(&self) -> u32 {
        self.population.iter().sum()
    }
}
