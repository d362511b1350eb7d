//! Division protocol.
//!
//! A division returns the daughter as an owned value. Inserting it into the
//! live population is left to the caller, and aggregates are only brought up
//! to date by the next aggregation pass.

use rand::RngCore;
use tissue_common::Phenotype;

use crate::agent::Agent;
use crate::physics::Physics;

/// Divides `mother` and returns a daughter of the same phenotype.
pub fn divide(mother: &mut Agent, physics: &dyn Physics, rng: &mut dyn RngCore) -> Agent {
    let phenotype = mother.phenotype;
    divide_as(mother, phenotype, physics, rng)
}

/// Divides `mother` and tags the daughter with `phenotype`.
pub fn divide_as(
    mother: &mut Agent,
    phenotype: Phenotype,
    physics: &dyn Physics,
    rng: &mut dyn RngCore,
) -> Agent {
    let geometry = physics.split(mother, rng);
    Agent {
        position: geometry.position,
        diameter: geometry.diameter,
        phenotype,
        can_divide: true,
        hypoxia_division: mother.hypoxia_division,
        oxygen_level: mother.oxygen_level,
        cancerous_origin: mother.cancerous_origin || mother.phenotype == Phenotype::Cancerous,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::SoftSpherePhysics;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tissue_common::Vec3;

    fn physics() -> SoftSpherePhysics {
        SoftSpherePhysics { density: 1.0, dt: 0.01, bounds: None }
    }

    #[test]
    fn daughter_inherits_traits_and_can_divide() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut mother = Agent::new(Vec3::splat(300.0), Phenotype::Cancerous, 8.0);
        mother.can_divide = true;
        mother.hypoxia_division = true;
        mother.oxygen_level = 0.82;

        let daughter = divide(&mut mother, &physics(), &mut rng);

        assert_eq!(daughter.phenotype, Phenotype::Cancerous);
        assert!(daughter.can_divide);
        assert!(daughter.hypoxia_division);
        assert_eq!(daughter.oxygen_level, 0.82);
        assert!(daughter.cancerous_origin);
        // Mother keeps her own origin flag.
        assert!(!mother.cancerous_origin);
    }

    #[test]
    fn can_divide_is_forced_even_if_mother_lost_it() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut mother = Agent::new(Vec3::splat(50.0), Phenotype::Host, 9.0);
        mother.can_divide = false;
        let daughter = divide(&mut mother, &physics(), &mut rng);
        assert!(daughter.can_divide);
        assert!(!daughter.cancerous_origin);
        assert_eq!(daughter.phenotype, Phenotype::Host);
    }

    #[test]
    fn override_changes_only_the_daughter_tag() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut mother = Agent::new(Vec3::splat(50.0), Phenotype::Cancerous, 9.0);
        let daughter = divide_as(&mut mother, Phenotype::Host, &physics(), &mut rng);
        assert_eq!(daughter.phenotype, Phenotype::Host);
        assert_eq!(mother.phenotype, Phenotype::Cancerous);
        assert!(daughter.cancerous_origin);
    }
}
