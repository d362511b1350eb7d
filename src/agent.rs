//! Agent record and construction closures.

use anyhow::Result;
use rand::distr::Uniform;
use rand::{Rng, RngCore};
use tissue_common::{CellTypeConfig, Phenotype, Vec3};

/// One simulated cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Agent {
    pub position: Vec3,
    pub diameter: f64,
    pub phenotype: Phenotype,
    pub can_divide: bool,
    /// Set in normoxia, cleared in hypoxia; inherited by daughters.
    pub hypoxia_division: bool,
    /// Local oxygen reading, conceptually in [0, 1] but never clamped.
    pub oxygen_level: f64,
    /// True only for division products of a cancerous agent.
    pub cancerous_origin: bool,
}

impl Agent {
    pub fn new(position: Vec3, phenotype: Phenotype, diameter: f64) -> Self {
        Agent {
            position,
            diameter,
            phenotype,
            can_divide: false,
            hypoxia_division: false,
            oxygen_level: 1.0,
            cancerous_origin: false,
        }
    }

    /// Index of this agent's type in per-type aggregate arrays.
    pub fn type_index(&self) -> usize {
        self.phenotype.index()
    }

    pub fn volume(&self) -> f64 {
        std::f64::consts::PI / 6.0 * self.diameter.powi(3)
    }
}

/// Builds a fully attributed agent at the given position.
pub type CellConstructor = Box<dyn Fn(Vec3) -> Agent + Send + Sync>;

/// Returns the construction closure for one configured cell type.
pub fn constructor_for(cell_type: &CellTypeConfig) -> CellConstructor {
    let phenotype = cell_type.phenotype;
    let diameter = cell_type.diameter;
    let can_divide = cell_type.can_divide;
    let oxygen_level = cell_type.oxygen_level;
    Box::new(move |position| {
        let mut agent = Agent::new(position, phenotype, diameter);
        agent.can_divide = can_divide;
        agent.oxygen_level = oxygen_level;
        agent
    })
}

/// Places `count` agents uniformly at random inside the axis-aligned box
/// `[min, max]` and builds each one with `constructor`.
pub fn create_cells(
    min: Vec3,
    max: Vec3,
    count: u32,
    constructor: &dyn Fn(Vec3) -> Agent,
    rng: &mut dyn RngCore,
) -> Result<Vec<Agent>> {
    let dist_x = Uniform::new(min.x, max.x)?;
    let dist_y = Uniform::new(min.y, max.y)?;
    let dist_z = Uniform::new(min.z, max.z)?;
    let mut agents = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let x = rng.sample(&dist_x);
        let y = rng.sample(&dist_y);
        let z = rng.sample(&dist_z);
        agents.push(constructor(Vec3::new(x, y, z)));
    }
    Ok(agents)
}
