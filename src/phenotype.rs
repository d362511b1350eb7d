//! Phenotype rule engine.
//!
//! Maps an agent's oxygen reading, diameter and division flags onto one of
//! three regimes and the effects that regime has on the agent this micro-step.
//! Evaluation is pure: the caller applies the returned [`PhenotypeOutcome`].

use rand::{Rng, RngCore};
use tissue_common::{Phenotype, PhenotypeRulesConfig, RegimeConfig, RulesConfig, Vec3};

use crate::agent::Agent;

/// Oxygen regime of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Regime {
    Normoxia,
    Hypoxia,
    Necrosis,
}

impl Regime {
    /// Thresholds are tested in descending order; a reading equal to a
    /// threshold falls into the lower regime.
    pub fn classify(oxygen_level: f64, thresholds: &OxygenThresholds) -> Regime {
        if oxygen_level > thresholds.normoxia {
            Regime::Normoxia
        } else if oxygen_level > thresholds.hypoxia {
            Regime::Hypoxia
        } else {
            Regime::Necrosis
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OxygenThresholds {
    pub normoxia: f64,
    pub hypoxia: f64,
}

impl Default for OxygenThresholds {
    fn default() -> Self {
        OxygenThresholds { normoxia: 0.7, hypoxia: 0.3 }
    }
}

/// Rule variant applied to every agent of one phenotype.
#[derive(Debug, Clone, PartialEq)]
pub struct PhenotypeRules {
    pub thresholds: OxygenThresholds,
    /// Growth stops once the diameter reaches this value.
    pub growth_ceiling: f64,
    /// A division attempt needs a diameter strictly above this value.
    pub division_threshold: f64,
    pub normoxia: RegimeConfig,
    pub hypoxia: RegimeConfig,
}

impl PhenotypeRules {
    pub fn from_config(thresholds: OxygenThresholds, config: &PhenotypeRulesConfig) -> Self {
        PhenotypeRules {
            thresholds,
            growth_ceiling: config.growth_ceiling,
            division_threshold: config.division_threshold,
            normoxia: config.normoxia.clone(),
            hypoxia: config.hypoxia.clone(),
        }
    }
}

/// One rule variant per phenotype.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSet {
    pub host: PhenotypeRules,
    pub cancerous: PhenotypeRules,
}

impl RuleSet {
    pub fn from_config(config: &RulesConfig) -> Self {
        let thresholds = OxygenThresholds {
            normoxia: config.normoxia_threshold,
            hypoxia: config.hypoxia_threshold,
        };
        RuleSet {
            host: PhenotypeRules::from_config(thresholds, &config.host),
            cancerous: PhenotypeRules::from_config(thresholds, &config.cancerous),
        }
    }

    pub fn for_phenotype(&self, phenotype: Phenotype) -> &PhenotypeRules {
        match phenotype {
            Phenotype::Host => &self.host,
            Phenotype::Cancerous => &self.cancerous,
        }
    }
}

/// Effects of a normoxic or hypoxic evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct RegimeEffects {
    pub regime: Regime,
    /// Volume growth speed to hand to the physics collaborator; zero at or above the ceiling.
    pub growth: f64,
    pub movement: Vec3,
    pub hypoxia_division: bool,
    pub division_probability: f64,
    /// A uniform draw happened this step.
    pub division_attempted: bool,
    /// The draw fell at or below the division probability.
    pub divide: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PhenotypeOutcome {
    /// No growth, no migration, no division, and the agent's flags stay untouched.
    Necrotic,
    Active(RegimeEffects),
}

impl PhenotypeOutcome {
    pub fn regime(&self) -> Regime {
        match self {
            PhenotypeOutcome::Necrotic => Regime::Necrosis,
            PhenotypeOutcome::Active(effects) => effects.regime,
        }
    }
}

/// Evaluates the rule variant for one agent.
///
/// Draws three migration components and, when a division attempt is due, one
/// more uniform number, all from `rng`.
pub fn evaluate(agent: &Agent, rules: &PhenotypeRules, rng: &mut dyn RngCore) -> PhenotypeOutcome {
    let regime = Regime::classify(agent.oxygen_level, &rules.thresholds);
    let (params, hypoxia_division) = match regime {
        Regime::Normoxia => (&rules.normoxia, true),
        Regime::Hypoxia => (&rules.hypoxia, false),
        Regime::Necrosis => return PhenotypeOutcome::Necrotic,
    };

    let m = params.motility;
    let movement = Vec3::new(
        rng.random_range(-m..=m),
        rng.random_range(-m..=m),
        rng.random_range(-m..=m),
    );

    let growth = if agent.diameter < rules.growth_ceiling {
        params.growth_speed
    } else {
        0.0
    };

    let mut division_attempted = false;
    let mut divide = false;
    if agent.can_divide && agent.diameter > rules.division_threshold {
        division_attempted = true;
        let draw: f64 = rng.random();
        divide = draw <= params.division_probability;
    }

    PhenotypeOutcome::Active(RegimeEffects {
        regime,
        growth,
        movement,
        hypoxia_division,
        division_probability: params.division_probability,
        division_attempted,
        divide,
    })
}
