//! One subdomain's Initialise → Simulate → Reset lifecycle.
//!
//! Every micro-step runs in three phases: rule evaluation reads a frozen view
//! of the population in parallel, the outcomes are applied serially, and the
//! subdomain aggregates are recomputed once migration has run.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use log::{debug, info, trace};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use tissue_common::{AggregateSnapshot, SimParams, SimulationConfig, Vec3};

use crate::agent::{constructor_for, create_cells, Agent};
use crate::checkpoint;
use crate::division::divide;
use crate::error::{TissueError, TissueResult};
use crate::field::{require_field, Environment, FieldHandle, FieldRegistry};
use crate::migration::{remove_escaped, seed_inflow, MigrationBounds};
use crate::phenotype::{evaluate, PhenotypeOutcome, RuleSet};
use crate::physics::{Physics, SoftSpherePhysics};
use crate::secretion::{ChemotaxisResponse, SubstanceModule};
use crate::subdomain::{FaceCounts, Subdomain};

/// What the read-only phase decided for one agent.
struct Decision {
    outcome: PhenotypeOutcome,
    response: Option<ChemotaxisResponse>,
    // Continues the agent's stream so a division draws after the rule engine.
    rng: StdRng,
}

pub struct SubdomainSimulation<'a> {
    config: &'a SimulationConfig,
    params: SimParams,
    subdomain: &'a mut Subdomain,
    agents: Vec<Agent>,
    environment: Environment,
    physics: Box<dyn Physics>,
    rules: RuleSet,
    substance: Option<SubstanceModule>,
    oxygen: Option<FieldHandle>,
    bounds: MigrationBounds,
    checkpoint_dir: PathBuf,
    macro_iteration: u32,
    seed: u64,
    seeded_incoming: FaceCounts,
    regime_counts: [u32; 3],
    divisions: u32,
    resumed: bool,
}

impl<'a> SubdomainSimulation<'a> {
    /// Resumes the subdomain's checkpoint if there is one, otherwise builds
    /// the population from the configured cell types. Incoming migrants are
    /// seeded afterwards in both cases.
    pub fn initialise(
        config: &'a SimulationConfig,
        subdomain: &'a mut Subdomain,
        macro_iteration: u32,
    ) -> Result<Self> {
        let params = config.get_sim_params();
        let id = subdomain.id();
        if subdomain.n_cell_types() != config.cell_types.len() {
            return Err(TissueError::CardinalityMismatch {
                what: "configured cell types",
                expected: subdomain.n_cell_types(),
                actual: config.cell_types.len(),
            }
            .into());
        }

        let seed = derive_seed(config.initial_conditions.seed, &[id as u64, macro_iteration as u64]);
        let mut rng = StdRng::seed_from_u64(seed);
        let physics: Box<dyn Physics> = Box::new(SoftSpherePhysics::new(config.physics.density, &params));
        let checkpoint_dir = PathBuf::from(&config.output.checkpoint_dir);

        let (mut agents, resumed) = match checkpoint::try_resume(&checkpoint_dir, id)? {
            Some(agents) => {
                info!("Subdomain {} resumed {} agents from checkpoint.", id, agents.len());
                (agents, true)
            }
            None => {
                let mut agents = Vec::new();
                for cell_type in &config.cell_types {
                    let index = cell_type.phenotype.index();
                    let count = *subdomain.cells_population.get(index).ok_or(
                        TissueError::TypeIndexOutOfRange { index, n_types: subdomain.n_cell_types() },
                    )?;
                    let constructor = constructor_for(cell_type);
                    agents.extend(create_cells(
                        Vec3::splat(cell_type.placement_min),
                        Vec3::splat(cell_type.placement_max),
                        count,
                        &*constructor,
                        &mut rng,
                    )?);
                }
                info!("Subdomain {} constructed {} fresh agents.", id, agents.len());
                (agents, false)
            }
        };

        let bounds = MigrationBounds::from_params(&params);
        let seeded_incoming = subdomain.incoming;
        if seeded_incoming.total() > 0 {
            let phenotype = config.migration.incoming_phenotype;
            let cell_type = config.cell_type(phenotype).ok_or_else(|| {
                TissueError::InvalidConfig(format!(
                    "migration.incoming_phenotype '{}' has no configured cell type",
                    phenotype.name()
                ))
            })?;
            let constructor = constructor_for(cell_type);
            let incoming = seed_inflow(&seeded_incoming, &bounds, &*constructor, &mut rng)?;
            debug!("Subdomain {} received {} incoming agents.", id, incoming.len());
            agents.extend(incoming);
        }
        subdomain.incoming.reset();
        subdomain.escaped.reset();

        let environment = Environment::new(
            &config.biochemicals,
            &subdomain.biochemical_level,
            &subdomain.biochemical_level_gradient,
            &params,
        )?;
        let oxygen = match &config.rules.oxygen_field {
            Some(name) => Some(require_field(&environment, name)?),
            None => None,
        };

        subdomain.aggregate(&agents, physics.as_ref())?;

        Ok(SubdomainSimulation {
            config,
            params,
            subdomain,
            agents,
            environment,
            physics,
            rules: RuleSet::from_config(&config.rules),
            substance: config.substance.as_ref().map(SubstanceModule::new),
            oxygen,
            bounds,
            checkpoint_dir,
            macro_iteration,
            seed,
            seeded_incoming,
            regime_counts: [0; 3],
            divisions: 0,
            resumed,
        })
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn subdomain(&self) -> &Subdomain {
        self.subdomain
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    pub fn regime_counts(&self) -> [u32; 3] {
        self.regime_counts
    }

    pub fn divisions(&self) -> u32 {
        self.divisions
    }

    /// Advances the subdomain by one micro-step.
    pub fn step(&mut self) -> TissueResult<()> {
        let step_start_time = Instant::now();
        let time_step = self.params.time_step;

        // --- 1. Oxygen readings from the field ---
        if let Some(handle) = self.oxygen {
            let field = self.environment.field(handle);
            self.agents
                .par_iter_mut()
                .for_each(|agent| agent.oxygen_level = field.concentration(agent.position));
        }

        // Responders read through a handle resolved before the parallel phase.
        let response_handle = match self.substance.as_mut() {
            Some(substance) if self.agents.iter().any(|a| substance.is_responder(a)) => {
                Some(substance.resolve(&self.environment)?)
            }
            _ => None,
        };

        // --- 2. Evaluate every agent against the frozen population ---
        let step_seed = derive_seed(self.seed, &[time_step]);
        let rules = &self.rules;
        let environment = &self.environment;
        let substance = self.substance.as_ref();
        let decisions: Vec<Decision> = self
            .agents
            .par_iter()
            .enumerate()
            .map(|(idx, agent)| {
                let mut rng = StdRng::seed_from_u64(derive_seed(step_seed, &[idx as u64]));
                let outcome = evaluate(agent, rules.for_phenotype(agent.phenotype), &mut rng);
                let response = match (substance, response_handle) {
                    (Some(substance), Some(handle)) => substance.respond(agent, handle, environment),
                    _ => None,
                };
                Decision { outcome, response, rng }
            })
            .collect();

        // --- 3. Apply outcomes ---
        let mut regime_counts = [0u32; 3];
        let mut daughters = Vec::new();
        for (agent, decision) in self.agents.iter_mut().zip(decisions) {
            let Decision { outcome, response, mut rng } = decision;
            regime_counts[outcome.regime().index()] += 1;
            if let PhenotypeOutcome::Active(effects) = outcome {
                self.physics.change_volume(agent, effects.growth);
                self.physics.move_by(agent, effects.movement);
                agent.hypoxia_division = effects.hypoxia_division;
                if effects.divide {
                    daughters.push(divide(agent, self.physics.as_ref(), &mut rng));
                }
            }
            if let Some(response) = response {
                self.physics.move_by(agent, response.displacement);
            }
            if let Some(substance) = self.substance.as_mut() {
                substance.secrete(agent, &mut self.environment)?;
            }
        }
        self.environment.consume_at(self.agents.iter().map(|agent| &agent.position));
        self.divisions += daughters.len() as u32;
        self.agents.extend(daughters);

        // --- 4. Fields, migration, aggregates ---
        self.environment.relax(self.params.dt);
        let escaped = if self.params.migration_active {
            remove_escaped(&mut self.agents, &self.bounds, &mut self.subdomain.escaped)
        } else {
            0
        };
        self.subdomain.aggregate(&self.agents, self.physics.as_ref())?;

        self.regime_counts = regime_counts;
        self.params.time_step += 1;
        trace!(
            "Subdomain {} step [{}/{}] completed in {:.2} ms | agents: {} | escaped: {}",
            self.subdomain.id(),
            time_step + 1,
            self.params.micro_steps_per_macro,
            step_start_time.elapsed().as_secs_f64() * 1000.0,
            self.agents.len(),
            escaped
        );
        Ok(())
    }

    /// Runs the configured number of micro-steps.
    pub fn run(&mut self) -> TissueResult<()> {
        for _ in 0..self.params.micro_steps_per_macro {
            self.step()?;
        }
        Ok(())
    }

    /// Writes the checkpoint, couples field levels back into the subdomain and
    /// drops the agents. Returns the aggregates of this macro-iteration.
    pub fn finish(mut self) -> Result<AggregateSnapshot> {
        let id = self.subdomain.id();
        checkpoint::save(&checkpoint::checkpoint_path(&self.checkpoint_dir, id), &self.agents)?;

        let (levels, gradients) = self.environment.coupling_values();
        self.subdomain.biochemical_level = levels;
        self.subdomain.biochemical_level_gradient = gradients;

        if self.config.output.save_positions {
            let filename = format!("{}_subdomain_{}_positions.csv", self.config.output.base_filename, id);
            write_positions(Path::new(&filename), &self.agents)
                .with_context(|| format!("Failed to write positions to '{}'", filename))?;
        }

        let snapshot = AggregateSnapshot {
            macro_iteration: self.macro_iteration,
            subdomain_id: id,
            population: self.subdomain.cells_population.clone(),
            mass: self.subdomain.cells_mass.clone(),
            escaped: self.subdomain.escaped.as_array(),
            incoming: self.seeded_incoming.as_array(),
            regime_counts: self.regime_counts,
            divisions: self.divisions,
            biochemical_level: self.subdomain.biochemical_level.clone(),
            resumed: self.resumed,
        };
        debug!(
            "Subdomain {} macro-iteration {} | population: {:?} | divisions: {} | escaped: {}",
            id,
            self.macro_iteration,
            snapshot.population,
            snapshot.divisions,
            self.subdomain.escaped.total()
        );
        Ok(snapshot)
    }
}

// SplitMix64 finaliser.
fn mix(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Folds `parts` into `base`, one SplitMix round per part.
pub fn derive_seed(base: u64, parts: &[u64]) -> u64 {
    parts.iter().fold(mix(base), |acc, &part| {
        mix(acc ^ mix(part.wrapping_add(0x9E37_79B9_7F4A_7C15)))
    })
}

fn write_positions(path: &Path, agents: &[Agent]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["x", "y", "z", "diameter", "phenotype", "oxygen_level"])?;
    for agent in agents {
        writer.write_record(&[
            format!("{:.4}", agent.position.x),
            format!("{:.4}", agent.position.y),
            format!("{:.4}", agent.position.z),
            format!("{:.4}", agent.diameter),
            agent.phenotype.name().to_string(),
            format!("{:.4}", agent.oxygen_level),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Full lifecycle of one subdomain for one macro-iteration.
pub fn run_subdomain(
    config: &SimulationConfig,
    subdomain: &mut Subdomain,
    macro_iteration: u32,
) -> Result<AggregateSnapshot> {
    let mut simulation = SubdomainSimulation::initialise(config, subdomain, macro_iteration)?;
    simulation.run()?;
    simulation.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tissue_common::{BiochemicalConfig, Phenotype, SubstanceConfig};

    const CONFIG: &str = r#"
        [domain]
        min_bound = 0.0
        max_bound = 600.0

        [timing]
        micro_steps_per_macro = 5
        macro_iterations = 1

        [initial_conditions]
        seed = 5807

        [[cell_types]]
        name = "regular"
        phenotype = "host"
        count = 100
        diameter = 9.0
        can_divide = false
        placement_min = 0.0
        placement_max = 600.0

        [[cell_types]]
        name = "tumour"
        phenotype = "cancerous"
        count = 10
        diameter = 7.0
        can_divide = true
        placement_min = 250.0
        placement_max = 350.0

        [output]
        base_filename = "run"
        save_stats = false
    "#;

    fn config(dir: &Path) -> SimulationConfig {
        let mut config = SimulationConfig::from_toml_str(CONFIG).expect("config");
        config.output.checkpoint_dir = dir.display().to_string();
        config
    }

    fn subdomain_for(config: &SimulationConfig, id: usize) -> Subdomain {
        let mut subdomain = Subdomain::new(id, config.cell_types.len(), config.biochemicals.len(), 0);
        let counts: Vec<u32> = config.cell_types.iter().map(|c| c.count).collect();
        let levels: Vec<f64> = config.biochemicals.iter().map(|b| b.initial_level).collect();
        subdomain.initialize(&counts, &levels, &[]).expect("initialize");
        subdomain
    }

    fn agent_seed(id: u64, macro_iteration: u64, step: u64, idx: u64) -> u64 {
        let subdomain = derive_seed(5807, &[id, macro_iteration]);
        derive_seed(derive_seed(subdomain, &[step]), &[idx])
    }

    #[test]
    fn shifted_coordinates_get_distinct_seeds() {
        // Offsets that cancel out under a weighted sum of the coordinates.
        assert_ne!(agent_seed(1, 5, 40, 2), agent_seed(4, 9, 5, 70));

        let mut seen = std::collections::HashSet::new();
        for id in 0..4 {
            for macro_iteration in 0..4 {
                for step in 0..8 {
                    for idx in 0..32 {
                        assert!(seen.insert(agent_seed(id, macro_iteration, step, idx)));
                    }
                }
            }
        }
        assert_ne!(derive_seed(1, &[2, 3]), derive_seed(1, &[3, 2]));
    }

    #[test]
    fn fresh_population_matches_targets() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config(dir.path());
        let mut subdomain = subdomain_for(&config, 0);
        let simulation = SubdomainSimulation::initialise(&config, &mut subdomain, 0).expect("init");
        assert!(!simulation.is_resumed());
        assert_eq!(simulation.subdomain().cells_population, vec![100, 10]);
        for agent in simulation.agents().iter().filter(|a| a.phenotype == Phenotype::Cancerous) {
            assert!(agent.can_divide);
            assert!(agent.position.x >= 250.0 && agent.position.x <= 350.0);
        }
    }

    #[test]
    fn tumour_grows_and_aggregates_track_agents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config(dir.path());
        let mut subdomain = subdomain_for(&config, 0);
        let mut simulation = SubdomainSimulation::initialise(&config, &mut subdomain, 0).expect("init");
        for _ in 0..40 {
            simulation.step().expect("step");
            let live = simulation.agents().len() as u32;
            assert_eq!(simulation.subdomain().total_population(), live);
        }
        // Host cells never divide, so all growth is cancerous.
        assert_eq!(simulation.subdomain().cells_population[0], 100);
        assert!(simulation.subdomain().cells_population[1] > 10);
        assert!(simulation.divisions() > 0);
        // Without an oxygen field every reading stays at the constructor's 1.0.
        assert_eq!(simulation.regime_counts()[1], 0);
        assert_eq!(simulation.regime_counts()[2], 0);
    }

    #[test]
    fn same_seed_gives_same_population() {
        let run = || {
            let dir = tempfile::tempdir().expect("tempdir");
            let config = config(dir.path());
            let mut subdomain = subdomain_for(&config, 2);
            let snapshot = run_subdomain(&config, &mut subdomain, 0).expect("run");
            (snapshot.population, snapshot.mass)
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn finish_writes_a_checkpoint_that_the_next_iteration_resumes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config(dir.path());
        let mut subdomain = subdomain_for(&config, 1);
        let first = run_subdomain(&config, &mut subdomain, 0).expect("first");
        assert!(!first.resumed);
        assert!(checkpoint::checkpoint_path(dir.path(), 1).exists());

        let simulation = SubdomainSimulation::initialise(&config, &mut subdomain, 1).expect("resume");
        assert!(simulation.is_resumed());
        assert_eq!(simulation.agents().len() as u32, first.total_population());
        // Every agent comes back with the type it was written with.
        assert_eq!(simulation.subdomain().cells_population, first.population);
        let cancerous = simulation.agents().iter().filter(|a| a.phenotype == Phenotype::Cancerous).count();
        assert_eq!(cancerous as u32, first.population[Phenotype::Cancerous.index()]);
    }

    #[test]
    fn low_oxygen_field_makes_cells_necrotic() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = config(dir.path());
        config.biochemicals.push(BiochemicalConfig {
            name: "oxygen".into(),
            initial_level: 0.1,
            initial_gradient: [0.0; 3],
            diffusion_coefficient: 0.0,
            decay_constant: 0.0,
            uptake_per_cell: 0.0,
        });
        config.rules.oxygen_field = Some("oxygen".into());
        let mut subdomain = subdomain_for(&config, 0);
        let mut simulation = SubdomainSimulation::initialise(&config, &mut subdomain, 0).expect("init");
        let before: Vec<Agent> = simulation.agents().to_vec();
        simulation.step().expect("step");

        assert_eq!(simulation.regime_counts(), [0, 0, 110]);
        assert_eq!(simulation.divisions(), 0);
        for (after, before) in simulation.agents().iter().zip(&before) {
            assert_eq!(after.position, before.position);
            assert_eq!(after.diameter, before.diameter);
            assert!((after.oxygen_level - 0.1).abs() < 1e-12);
        }
    }

    #[test]
    fn secretion_raises_the_substance_field() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = config(dir.path());
        config.biochemicals.push(BiochemicalConfig {
            name: "chemokine".into(),
            initial_level: 0.0,
            initial_gradient: [0.0; 3],
            diffusion_coefficient: 0.0,
            decay_constant: 0.0,
            uptake_per_cell: 0.0,
        });
        config.substance = Some(SubstanceConfig {
            field: "chemokine".into(),
            secretion_amount: 0.5,
            secretor: Phenotype::Cancerous,
            responder: Some(Phenotype::Host),
        });
        let mut subdomain = subdomain_for(&config, 0);
        let mut simulation = SubdomainSimulation::initialise(&config, &mut subdomain, 0).expect("init");
        simulation.step().expect("step");
        let total: f64 = simulation.environment().biochemicals()[0].grid.values().iter().sum();
        // Ten secretors, one increment each.
        assert!((total - 5.0).abs() < 1e-9, "{total}");
    }

    #[test]
    fn incoming_counts_are_seeded_and_cleared() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config(dir.path());
        let mut subdomain = subdomain_for(&config, 0);
        subdomain.incoming.set(crate::subdomain::Face::XMin, 3);
        let simulation = SubdomainSimulation::initialise(&config, &mut subdomain, 0).expect("init");
        assert_eq!(simulation.agents().len(), 113);
        assert_eq!(simulation.subdomain().incoming.total(), 0);
        assert_eq!(simulation.subdomain().cells_population, vec![100, 13]);
    }
}
