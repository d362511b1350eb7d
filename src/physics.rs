//! Physics collaborator: geometry, mass, and the split-in-two operation.

use rand::RngCore;
use rand_distr::{Distribution, UnitSphere};
use tissue_common::{SimParams, Vec3};

use crate::agent::Agent;

/// Per-agent geometry operations supplied by the mechanical engine.
pub trait Physics: Send + Sync {
    /// Mass of the agent, derived from its diameter.
    fn mass(&self, agent: &Agent) -> f64;
    /// Grows (or shrinks) the agent's volume at `speed` for one time step.
    fn change_volume(&self, agent: &mut Agent, speed: f64);
    fn move_by(&self, agent: &mut Agent, displacement: Vec3);
    /// Splits the mother in two and returns the daughter's geometry. Only
    /// position and diameter of the returned agent are meaningful.
    fn split(&self, mother: &mut Agent, rng: &mut dyn RngCore) -> Agent;
}

/// Rigid spheres of constant density inside an optionally bounded cube.
/// Overlap resolution is left to the mechanical engine.
#[derive(Debug, Clone)]
pub struct SoftSpherePhysics {
    pub density: f64,
    pub dt: f64,
    /// Positions are clamped into this interval on every axis when set.
    pub bounds: Option<(f64, f64)>,
}

impl SoftSpherePhysics {
    pub fn new(density: f64, params: &SimParams) -> Self {
        let bounds = params.bound_space.then_some((params.min_bound, params.max_bound));
        SoftSpherePhysics { density, dt: params.dt, bounds }
    }

    fn diameter_for_volume(volume: f64) -> f64 {
        (6.0 * volume.max(0.0) / std::f64::consts::PI).cbrt()
    }

    fn confine(&self, position: Vec3) -> Vec3 {
        match self.bounds {
            Some((min, max)) => position.clamp_components(min, max),
            None => position,
        }
    }
}

impl Physics for SoftSpherePhysics {
    fn mass(&self, agent: &Agent) -> f64 {
        self.density * agent.volume()
    }

    fn change_volume(&self, agent: &mut Agent, speed: f64) {
        if speed == 0.0 {
            return;
        }
        let volume = agent.volume() + speed * self.dt;
        agent.diameter = Self::diameter_for_volume(volume);
    }

    fn move_by(&self, agent: &mut Agent, displacement: Vec3) {
        agent.position = self.confine(agent.position + displacement);
    }

    fn split(&self, mother: &mut Agent, rng: &mut dyn RngCore) -> Agent {
        let half_volume = 0.5 * mother.volume();
        let diameter = Self::diameter_for_volume(half_volume);
        let direction = Vec3::from_array(UnitSphere.sample(rng));
        let offset = direction * (0.5 * diameter);

        let parent_position = mother.position;
        mother.diameter = diameter;
        mother.position = self.confine(parent_position - offset);

        let mut daughter = mother.clone();
        daughter.position = self.confine(parent_position + offset);
        daughter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tissue_common::Phenotype;

    fn physics() -> SoftSpherePhysics {
        SoftSpherePhysics { density: 1.0, dt: 0.01, bounds: Some((0.0, 600.0)) }
    }

    #[test]
    fn mass_follows_volume() {
        let agent = Agent::new(Vec3::zero(), Phenotype::Host, 2.0);
        assert_relative_eq!(physics().mass(&agent), 4.0 / 3.0 * std::f64::consts::PI, epsilon = 1e-12);
    }

    #[test]
    fn change_volume_adds_speed_times_dt() {
        let mut agent = Agent::new(Vec3::splat(300.0), Phenotype::Cancerous, 7.5);
        let before = agent.volume();
        physics().change_volume(&mut agent, 100.0);
        assert_relative_eq!(agent.volume(), before + 1.0, epsilon = 1e-9);
        assert!(agent.diameter > 7.5);
    }

    #[test]
    fn moves_are_confined_to_bounds() {
        let mut agent = Agent::new(Vec3::new(1.0, 300.0, 599.0), Phenotype::Host, 9.0);
        physics().move_by(&mut agent, Vec3::new(-4.0, 1.0, 4.0));
        assert_eq!(agent.position, Vec3::new(0.0, 301.0, 600.0));
    }

    #[test]
    fn split_conserves_volume() {
        let mut rng = StdRng::seed_from_u64(17);
        let mut mother = Agent::new(Vec3::splat(300.0), Phenotype::Cancerous, 8.0);
        let total = mother.volume();
        let daughter = physics().split(&mut mother, &mut rng);
        assert_relative_eq!(mother.volume() + daughter.volume(), total, epsilon = 1e-9);
        assert_relative_eq!(mother.diameter, daughter.diameter, epsilon = 1e-12);
        assert!(mother.position != daughter.position);
        let separation = (mother.position - daughter.position).length();
        assert_relative_eq!(separation, mother.diameter, epsilon = 1e-9);
    }
}
