//! Boundary migration protocol.
//!
//! Agents that move past the inner margin of a face are removed and counted
//! on that face. At the next macro-iteration, the counts a neighbour received
//! are turned back into agents inside a thin slab along the matching face.

use anyhow::Result;
use log::debug;
use rand::RngCore;
use tissue_common::{Axis, SimParams, Vec3};

use crate::agent::{create_cells, Agent};
use crate::subdomain::{Face, FaceCounts};

/// Inner region of a subdomain: agents strictly outside `[lower, upper]` on any axis escape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MigrationBounds {
    pub lower: f64,
    pub upper: f64,
    /// Thickness of the inflow slab along the face normal.
    pub slab: f64,
}

impl MigrationBounds {
    pub fn from_params(params: &SimParams) -> Self {
        MigrationBounds {
            lower: params.min_bound + params.escape_margin,
            upper: params.max_bound - params.escape_margin,
            slab: params.inflow_slab,
        }
    }

    /// First face (in [`Face::ALL`] order) the position lies beyond, if any.
    /// A coordinate exactly on the margin is still inside.
    pub fn escape_face(&self, position: Vec3) -> Option<Face> {
        Axis::ALL.into_iter().find_map(|axis| {
            let c = position.get(axis);
            if c < self.lower {
                Some(Face::new(axis, false))
            } else if c > self.upper {
                Some(Face::new(axis, true))
            } else {
                None
            }
        })
    }

    /// Box `(min, max)` that incoming agents for `face` are placed in.
    pub fn inflow_box(&self, face: Face) -> (Vec3, Vec3) {
        let mut min = Vec3::splat(self.lower);
        let mut max = Vec3::splat(self.upper);
        let axis = face.axis();
        if face.is_positive() {
            min.set(axis, self.upper - self.slab);
        } else {
            max.set(axis, self.lower + self.slab);
        }
        (min, max)
    }
}

/// Removes every escaped agent and adds it to its face's counter.
/// Returns how many agents left.
pub fn remove_escaped(agents: &mut Vec<Agent>, bounds: &MigrationBounds, escaped: &mut FaceCounts) -> u32 {
    let before = agents.len();
    agents.retain(|agent| match bounds.escape_face(agent.position) {
        Some(face) => {
            escaped.add(face, 1);
            false
        }
        None => true,
    });
    (before - agents.len()) as u32
}

/// Builds the incoming agents for every face with a non-zero count.
pub fn seed_inflow(
    incoming: &FaceCounts,
    bounds: &MigrationBounds,
    constructor: &dyn Fn(Vec3) -> Agent,
    rng: &mut dyn RngCore,
) -> Result<Vec<Agent>> {
    let mut seeded = Vec::with_capacity(incoming.total() as usize);
    for face in Face::ALL {
        let count = incoming.get(face);
        if count == 0 {
            continue;
        }
        let (min, max) = bounds.inflow_box(face);
        seeded.extend(create_cells(min, max, count, constructor, rng)?);
        debug!("Seeded {} incoming agents on face {:?}.", count, face);
    }
    Ok(seeded)
}
