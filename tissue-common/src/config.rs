use serde::{Deserialize, Serialize};
use anyhow::Result;
use crate::sim_params::SimParams;
use std::path::Path;

/// Phenotype tag of a cell. The discriminant doubles as the cell-type index
/// used by the per-type population and mass arrays.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Phenotype {
    Host = 0,
    Cancerous = 1,
}

impl Phenotype {
    pub const ALL: [Phenotype; 2] = [Phenotype::Host, Phenotype::Cancerous];

    /// Index of this phenotype in per-type arrays.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Phenotype::Host => "host",
            Phenotype::Cancerous => "cancerous",
        }
    }
}

// Bounds of one cubic subdomain
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct DomainConfig {
    pub min_bound: f64,
    pub max_bound: f64,
    /// Clamp agent positions into the domain after every move.
    #[serde(default = "default_true")]
    pub bound_space: bool,
}

// Configuration for timing
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TimingConfig {
    pub micro_steps_per_macro: u32,
    pub macro_iterations: u32,
    #[serde(default = "default_physics_dt")]
    pub physics_dt: f64,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct InitialConditions {
    pub seed: u64,
    /// Keep checkpoints left over from an earlier run and resume from them.
    #[serde(default)]
    pub resume_from_checkpoint: bool,
}

/// One cell type: its construction closure is built from these values.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CellTypeConfig {
    pub name: String,
    pub phenotype: Phenotype,
    /// Initial population per subdomain.
    pub count: u32,
    pub diameter: f64,
    pub can_divide: bool,
    /// Cells are placed uniformly in the cube [placement_min, placement_max]^3.
    pub placement_min: f64,
    pub placement_max: f64,
    #[serde(default = "default_oxygen_level")]
    pub oxygen_level: f64,
}

/// Effects of one oxygen regime.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct RegimeConfig {
    pub growth_speed: f64,
    pub division_probability: f64,
    /// Per-axis bound of the random migration vector.
    pub motility: f64,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct PhenotypeRulesConfig {
    #[serde(default = "default_growth_ceiling")]
    pub growth_ceiling: f64,
    #[serde(default = "default_division_threshold")]
    pub division_threshold: f64,
    pub normoxia: RegimeConfig,
    pub hypoxia: RegimeConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RulesConfig {
    #[serde(default = "default_normoxia_threshold")]
    pub normoxia_threshold: f64,
    #[serde(default = "default_hypoxia_threshold")]
    pub hypoxia_threshold: f64,
    /// Name of the biochemical that provides the agents' oxygen readings.
    #[serde(default)]
    pub oxygen_field: Option<String>,
    #[serde(default = "default_cancerous_rules")]
    pub cancerous: PhenotypeRulesConfig,
    #[serde(default = "default_host_rules")]
    pub host: PhenotypeRulesConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PhysicsConfig {
    #[serde(default = "default_density")]
    pub density: f64,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct BiochemicalConfig {
    pub name: String,
    pub initial_level: f64,
    #[serde(default)]
    pub initial_gradient: [f64; 3],
    #[serde(default)]
    pub diffusion_coefficient: f64,
    #[serde(default)]
    pub decay_constant: f64,
    /// Amount removed at each live agent's position per micro-step.
    #[serde(default)]
    pub uptake_per_cell: f64,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct MicrostructureConfig {
    pub name: String,
    pub initial_level: f64,
    #[serde(default)]
    pub initial_gradient: [f64; 3],
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SubstanceConfig {
    /// Biochemical written by secretors and read by responders.
    pub field: String,
    #[serde(default = "default_secretion_amount")]
    pub secretion_amount: f64,
    #[serde(default = "default_secretor")]
    pub secretor: Phenotype,
    #[serde(default)]
    pub responder: Option<Phenotype>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct GridConfig {
    /// Voxels per axis of each field grid.
    pub resolution: u32,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct MigrationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_escape_margin_fraction")]
    pub escape_margin_fraction: f64,
    #[serde(default = "default_inflow_slab_fraction")]
    pub inflow_slab_fraction: f64,
    /// Cell type instantiated for incoming traffic.
    #[serde(default = "default_incoming_phenotype")]
    pub incoming_phenotype: Phenotype,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SubdomainLayout {
    pub layout: [usize; 3],
}

// Configuration for output settings
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    pub base_filename: String,
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: String,
    pub save_stats: bool,
    #[serde(default)]
    pub save_positions: bool,
    pub format: Option<String>, // Output format: "json", "bincode", "messagepack"
}

// Main simulation configuration structure, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SimulationConfig {
    pub domain: DomainConfig,
    pub timing: TimingConfig,
    pub initial_conditions: InitialConditions,
    pub cell_types: Vec<CellTypeConfig>,
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub physics: PhysicsConfig,
    #[serde(default)]
    pub biochemicals: Vec<BiochemicalConfig>,
    #[serde(default)]
    pub microstructures: Vec<MicrostructureConfig>,
    #[serde(default)]
    pub substance: Option<SubstanceConfig>,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub migration: MigrationConfig,
    #[serde(default)]
    pub subdomains: SubdomainLayout,
    pub output: OutputConfig,
}

impl Default for RulesConfig {
    fn default() -> Self {
        RulesConfig {
            normoxia_threshold: default_normoxia_threshold(),
            hypoxia_threshold: default_hypoxia_threshold(),
            oxygen_field: None,
            cancerous: default_cancerous_rules(),
            host: default_host_rules(),
        }
    }
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        PhysicsConfig { density: default_density() }
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig { resolution: 16 }
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        MigrationConfig {
            enabled: true,
            escape_margin_fraction: default_escape_margin_fraction(),
            inflow_slab_fraction: default_inflow_slab_fraction(),
            incoming_phenotype: default_incoming_phenotype(),
        }
    }
}

impl Default for SubdomainLayout {
    fn default() -> Self {
        SubdomainLayout { layout: [1, 1, 1] }
    }
}

impl SubdomainLayout {
    pub fn count(&self) -> usize {
        self.layout.iter().product()
    }
}

impl SimulationConfig {
    /// Loads the simulation configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Invalid config '{}': {}", path_ref.display(), e))
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: SimulationConfig = toml::from_str(config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations that would fail part-way through a run.
    pub fn validate(&self) -> Result<()> {
        if !(self.domain.max_bound > self.domain.min_bound) {
            anyhow::bail!("domain.max_bound must be greater than domain.min_bound.");
        }
        if self.timing.physics_dt <= 0.0 {
            anyhow::bail!("timing.physics_dt must be positive.");
        }
        if self.cell_types.is_empty() {
            anyhow::bail!("at least one [[cell_types]] entry is required.");
        }
        if self.cell_types.len() > Phenotype::ALL.len() {
            anyhow::bail!(
                "{} cell types configured but only {} phenotypes exist.",
                self.cell_types.len(),
                Phenotype::ALL.len()
            );
        }
        for (i, cell_type) in self.cell_types.iter().enumerate() {
            if cell_type.phenotype.index() != i {
                anyhow::bail!(
                    "cell_types[{}] ('{}') must have the phenotype with index {}, found '{}'.",
                    i,
                    cell_type.name,
                    i,
                    cell_type.phenotype.name()
                );
            }
            if cell_type.diameter < 0.0 {
                anyhow::bail!("cell type '{}' has a negative diameter.", cell_type.name);
            }
            if !(cell_type.placement_max > cell_type.placement_min) {
                anyhow::bail!("cell type '{}' has an empty placement box.", cell_type.name);
            }
            // Checkpoints restore the phenotype from the division flag.
            let expected_can_divide = cell_type.phenotype == Phenotype::Cancerous;
            if cell_type.can_divide != expected_can_divide {
                anyhow::bail!(
                    "cell type '{}' ({}) must have can_divide = {}.",
                    cell_type.name,
                    cell_type.phenotype.name(),
                    expected_can_divide
                );
            }
        }

        let rules = &self.rules;
        if !(0.0 <= rules.hypoxia_threshold && rules.hypoxia_threshold < rules.normoxia_threshold) {
            anyhow::bail!("rules thresholds must satisfy 0 <= hypoxia_threshold < normoxia_threshold.");
        }
        for (label, phenotype_rules) in [("cancerous", &rules.cancerous), ("host", &rules.host)] {
            for regime in [&phenotype_rules.normoxia, &phenotype_rules.hypoxia] {
                if !(0.0..=1.0).contains(&regime.division_probability) {
                    anyhow::bail!("rules.{}: division_probability must be within [0, 1].", label);
                }
                if !(regime.motility >= 0.0 && regime.motility.is_finite()) {
                    anyhow::bail!("rules.{}: motility must be a finite non-negative number.", label);
                }
            }
        }
        if let Some(oxygen) = &rules.oxygen_field {
            if !self.biochemicals.iter().any(|b| &b.name == oxygen) {
                anyhow::bail!("rules.oxygen_field '{}' is not a configured biochemical.", oxygen);
            }
        }
        if let Some(substance) = &self.substance {
            if !self.biochemicals.iter().any(|b| b.name == substance.field) {
                anyhow::bail!("substance.field '{}' is not a configured biochemical.", substance.field);
            }
        }

        if self.grid.resolution == 0 {
            anyhow::bail!("grid.resolution must be greater than 0.");
        }
        if self.subdomains.layout.iter().any(|&n| n == 0) {
            anyhow::bail!("subdomains.layout entries must be greater than 0.");
        }
        let migration = &self.migration;
        if !(0.0..0.5).contains(&migration.escape_margin_fraction) {
            anyhow::bail!("migration.escape_margin_fraction must be within [0, 0.5).");
        }
        if !(migration.inflow_slab_fraction > 0.0
            && migration.escape_margin_fraction * 2.0 + migration.inflow_slab_fraction <= 1.0)
        {
            anyhow::bail!("migration.inflow_slab_fraction must be positive and fit inside the domain.");
        }

        Ok(())
    }

    /// Returns the construction parameters of the cell type for `phenotype`, if configured.
    pub fn cell_type(&self, phenotype: Phenotype) -> Option<&CellTypeConfig> {
        self.cell_types.get(phenotype.index())
    }

    /// Converts the configuration into simulation parameters used at runtime.
    pub fn get_sim_params(&self) -> SimParams {
        let min_bound = self.domain.min_bound;
        let max_bound = self.domain.max_bound;
        let extent = max_bound - min_bound;
        let grid_resolution = self.grid.resolution;
        let voxel_size = extent / grid_resolution as f64;
        let inv_voxel_size = if voxel_size > 1e-12 { 1.0 / voxel_size } else { 0.0 };

        SimParams {
            min_bound,
            max_bound,
            extent,
            bound_space: self.domain.bound_space,
            escape_margin: extent * self.migration.escape_margin_fraction,
            inflow_slab: extent * self.migration.inflow_slab_fraction,
            grid_resolution,
            voxel_size,
            inv_voxel_size,
            dt: self.timing.physics_dt,
            micro_steps_per_macro: self.timing.micro_steps_per_macro,
            n_cell_types: self.cell_types.len(),
            n_biochemicals: self.biochemicals.len(),
            n_microstructures: self.microstructures.len(),
            migration_active: self.migration.enabled && self.subdomains.count() > 1,
            time_step: 0,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_physics_dt() -> f64 {
    0.01
}

fn default_oxygen_level() -> f64 {
    1.0
}

fn default_normoxia_threshold() -> f64 {
    0.7
}

fn default_hypoxia_threshold() -> f64 {
    0.3
}

fn default_growth_ceiling() -> f64 {
    8.0
}

fn default_division_threshold() -> f64 {
    7.0
}

fn default_cancerous_rules() -> PhenotypeRulesConfig {
    PhenotypeRulesConfig {
        growth_ceiling: default_growth_ceiling(),
        division_threshold: default_division_threshold(),
        normoxia: RegimeConfig { growth_speed: 100.0, division_probability: 0.9, motility: 1.0 },
        hypoxia: RegimeConfig { growth_speed: 40.0, division_probability: 0.4, motility: 4.0 },
    }
}

// Quiescent normal tissue: no growth in either regime.
fn default_host_rules() -> PhenotypeRulesConfig {
    PhenotypeRulesConfig {
        growth_ceiling: default_growth_ceiling(),
        division_threshold: default_division_threshold(),
        normoxia: RegimeConfig { growth_speed: 0.0, division_probability: 0.8, motility: 1.0 },
        hypoxia: RegimeConfig { growth_speed: 0.0, division_probability: 0.1, motility: 4.0 },
    }
}

fn default_density() -> f64 {
    1.0
}

fn default_secretion_amount() -> f64 {
    0.5
}

fn default_secretor() -> Phenotype {
    Phenotype::Cancerous
}

fn default_escape_margin_fraction() -> f64 {
    0.01
}

fn default_inflow_slab_fraction() -> f64 {
    0.05
}

fn default_incoming_phenotype() -> Phenotype {
    Phenotype::Cancerous
}

fn default_checkpoint_dir() -> String {
    "checkpoints".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [domain]
        min_bound = 0.0
        max_bound = 600.0

        [timing]
        micro_steps_per_macro = 10
        macro_iterations = 2

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

    #[test]
    fn minimal_config_fills_defaults() {
        let config = SimulationConfig::from_toml_str(MINIMAL).expect("config");
        assert_eq!(config.rules.normoxia_threshold, 0.7);
        assert_eq!(config.rules.hypoxia_threshold, 0.3);
        assert_eq!(config.rules.cancerous.normoxia.division_probability, 0.9);
        assert_eq!(config.rules.host.normoxia.growth_speed, 0.0);
        assert_eq!(config.subdomains.count(), 1);
        assert!(config.migration.enabled);
        assert_eq!(config.output.checkpoint_dir, "checkpoints");
    }

    #[test]
    fn sim_params_derive_margins() {
        let config = SimulationConfig::from_toml_str(MINIMAL).expect("config");
        let params = config.get_sim_params();
        assert_eq!(params.extent, 600.0);
        assert!((params.escape_margin - 6.0).abs() < 1e-9);
        assert!((params.inflow_slab - 30.0).abs() < 1e-9);
        assert_eq!(params.n_cell_types, 2);
        // A single subdomain never migrates.
        assert!(!params.migration_active);
    }

    #[test]
    fn cell_types_must_follow_phenotype_order() {
        let swapped = MINIMAL
            .replacen("phenotype = \"host\"", "phenotype = \"tmp\"", 1)
            .replacen("phenotype = \"cancerous\"", "phenotype = \"host\"", 1)
            .replacen("phenotype = \"tmp\"", "phenotype = \"cancerous\"", 1);
        let err = SimulationConfig::from_toml_str(&swapped).unwrap_err();
        assert!(err.to_string().contains("cell_types[0]"), "{err}");
    }

    #[test]
    fn division_flag_must_match_phenotype() {
        let dividing_host = MINIMAL.replacen("can_divide = false", "can_divide = true", 1);
        let err = SimulationConfig::from_toml_str(&dividing_host).unwrap_err();
        assert!(err.to_string().contains("'regular'"), "{err}");

        let quiescent_tumour = MINIMAL.replacen("can_divide = true", "can_divide = false", 1);
        let err = SimulationConfig::from_toml_str(&quiescent_tumour).unwrap_err();
        assert!(err.to_string().contains("'tumour'"), "{err}");
    }

    #[test]
    fn oxygen_field_must_exist() {
        let text = MINIMAL.replace("[output]", "[rules]\noxygen_field = \"oxygen\"\n\n[output]");
        let err = SimulationConfig::from_toml_str(&text).unwrap_err();
        assert!(err.to_string().contains("oxygen"), "{err}");
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let text = MINIMAL.replace(
            "[output]",
            "[rules]\nnormoxia_threshold = 0.2\nhypoxia_threshold = 0.5\n\n[output]",
        );
        assert!(SimulationConfig::from_toml_str(&text).is_err());
    }
}
