//! Subdomain container: per-type aggregates, continuum coupling values and
//! per-face migration counters of one cubic tissue region.
//!
//! The subdomain never holds agents. It only sees them during [`Subdomain::aggregate`],
//! which recomputes every aggregate from scratch.

use serde::{Deserialize, Serialize};
use tissue_common::{Axis, Vec3};

use crate::agent::Agent;
use crate::error::{TissueError, TissueResult};
use crate::physics::Physics;

/// One face of the cube.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Face {
    XMin,
    XMax,
    YMin,
    YMax,
    ZMin,
    ZMax,
}

impl Face {
    pub const ALL: [Face; 6] = [Face::XMin, Face::XMax, Face::YMin, Face::YMax, Face::ZMin, Face::ZMax];

    pub fn new(axis: Axis, positive: bool) -> Face {
        match (axis, positive) {
            (Axis::X, false) => Face::XMin,
            (Axis::X, true) => Face::XMax,
            (Axis::Y, false) => Face::YMin,
            (Axis::Y, true) => Face::YMax,
            (Axis::Z, false) => Face::ZMin,
            (Axis::Z, true) => Face::ZMax,
        }
    }

    /// Axis normal to this face.
    pub fn axis(self) -> Axis {
        match self {
            Face::XMin | Face::XMax => Axis::X,
            Face::YMin | Face::YMax => Axis::Y,
            Face::ZMin | Face::ZMax => Axis::Z,
        }
    }

    /// True for the face on the positive side of its axis.
    pub fn is_positive(self) -> bool {
        matches!(self, Face::XMax | Face::YMax | Face::ZMax)
    }

    /// The face a neighbour shares with this one.
    pub fn opposite(self) -> Face {
        Face::new(self.axis(), !self.is_positive())
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// One counter per face.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceCounts([u32; 6]);

impl FaceCounts {
    pub fn get(&self, face: Face) -> u32 {
        self.0[face.index()]
    }

    pub fn set(&mut self, face: Face, value: u32) {
        self.0[face.index()] = value;
    }

    pub fn add(&mut self, face: Face, amount: u32) {
        self.0[face.index()] += amount;
    }

    pub fn total(&self) -> u32 {
        self.0.iter().sum()
    }

    pub fn reset(&mut self) {
        self.0 = [0; 6];
    }

    pub fn as_array(&self) -> [u32; 6] {
        self.0
    }
}

/// One cubic tissue region.
#[derive(Debug, Clone)]
pub struct Subdomain {
    id: usize,
    pub cells_population: Vec<u32>,
    pub cells_mass: Vec<f64>,
    pub biochemical_level: Vec<f64>,
    pub biochemical_level_gradient: Vec<Vec3>,
    pub microstructural_level: Vec<f64>,
    pub microstructural_level_gradient: Vec<Vec3>,
    pub interstitial_fluid_velocity: Vec3,
    pub escaped: FaceCounts,
    pub incoming: FaceCounts,
}

impl Subdomain {
    /// Allocates zero-filled arrays for the given cardinalities. A type
    /// cardinality of zero is allowed and yields empty arrays.
    pub fn new(id: usize, n_cell_types: usize, n_biochemicals: usize, n_microstructures: usize) -> Self {
        Subdomain {
            id,
            cells_population: vec![0; n_cell_types],
            cells_mass: vec![0.0; n_cell_types],
            biochemical_level: vec![0.0; n_biochemicals],
            biochemical_level_gradient: vec![Vec3::zero(); n_biochemicals],
            microstructural_level: vec![0.0; n_microstructures],
            microstructural_level_gradient: vec![Vec3::zero(); n_microstructures],
            interstitial_fluid_velocity: Vec3::zero(),
            escaped: FaceCounts::default(),
            incoming: FaceCounts::default(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn n_cell_types(&self) -> usize {
        self.cells_population.len()
    }

    /// Resets every value and seeds the population targets and continuum
    /// levels. Each slice must match the cardinality fixed at construction.
    pub fn initialize(
        &mut self,
        population_counts: &[u32],
        biochemical_levels: &[f64],
        microstructural_levels: &[f64],
    ) -> TissueResult<()> {
        check_len("population counts", self.cells_population.len(), population_counts.len())?;
        check_len("biochemical levels", self.biochemical_level.len(), biochemical_levels.len())?;
        check_len(
            "microstructural levels",
            self.microstructural_level.len(),
            microstructural_levels.len(),
        )?;

        self.cells_population.copy_from_slice(population_counts);
        self.cells_mass.iter_mut().for_each(|m| *m = 0.0);
        self.biochemical_level.copy_from_slice(biochemical_levels);
        self.biochemical_level_gradient.iter_mut().for_each(|g| *g = Vec3::zero());
        self.microstructural_level.copy_from_slice(microstructural_levels);
        self.microstructural_level_gradient.iter_mut().for_each(|g| *g = Vec3::zero());
        self.interstitial_fluid_velocity = Vec3::zero();
        self.escaped.reset();
        self.incoming.reset();
        Ok(())
    }

    /// Recomputes per-type population and mass from the live agents.
    ///
    /// Must run after all per-agent mutations and after boundary migration
    /// for the same micro-step.
    pub fn aggregate(&mut self, agents: &[Agent], physics: &dyn Physics) -> TissueResult<()> {
        let n_types = self.cells_population.len();
        let mut population = vec![0u32; n_types];
        let mut mass = vec![0.0f64; n_types];
        for agent in agents {
            let index = agent.type_index();
            if index >= n_types {
                return Err(TissueError::TypeIndexOutOfRange { index, n_types });
            }
            population[index] += 1;
            mass[index] += physics.mass(agent);
        }
        self.cells_population = population;
        self.cells_mass = mass;
        Ok(())
    }

    pub fn total_population(&self) -> u32 {
        self.cells_population.iter().sum()
    }
}

fn check_len(what: &'static str, expected: usize, actual: usize) -> TissueResult<()> {
    if expected != actual {
        return Err(TissueError::CardinalityMismatch { what, expected, actual });
    }
    Ok(())
}
