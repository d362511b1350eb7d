//! Scalar-field collaborator interface and the per-subdomain field registry.

use tissue_common::{BiochemicalConfig, SimParams, Vec3};

use crate::error::{TissueError, TissueResult};
use crate::grid::ConcentrationGrid;

/// Concentration field of one substance.
pub trait ScalarField: Send + Sync {
    fn increase_concentration(&mut self, position: Vec3, amount: f64);
    fn concentration(&self, position: Vec3) -> f64;
    fn gradient(&self, position: Vec3) -> Vec3;
}

/// Opaque handle to a registered field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldHandle(usize);

/// Name-based access to the scalar fields of one subdomain.
pub trait FieldRegistry {
    fn lookup(&self, name: &str) -> Option<FieldHandle>;
    fn field(&self, handle: FieldHandle) -> &dyn ScalarField;
    fn field_mut(&mut self, handle: FieldHandle) -> &mut dyn ScalarField;
}

/// One configured biochemical and its grid.
#[derive(Debug, Clone)]
pub struct Biochemical {
    pub name: String,
    pub grid: ConcentrationGrid,
    pub diffusion_coefficient: f64,
    pub decay_constant: f64,
    pub uptake_per_cell: f64,
}

/// All biochemical fields of one subdomain, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    biochemicals: Vec<Biochemical>,
}

impl Environment {
    /// Builds one grid per biochemical, initialised from the continuum
    /// coupling values `levels` and `gradients` (same order as `configs`).
    pub fn new(
        configs: &[BiochemicalConfig],
        levels: &[f64],
        gradients: &[Vec3],
        params: &SimParams,
    ) -> TissueResult<Self> {
        if levels.len() != configs.len() {
            return Err(TissueError::CardinalityMismatch {
                what: "biochemical levels",
                expected: configs.len(),
                actual: levels.len(),
            });
        }
        if gradients.len() != configs.len() {
            return Err(TissueError::CardinalityMismatch {
                what: "biochemical gradients",
                expected: configs.len(),
                actual: gradients.len(),
            });
        }
        let biochemicals = configs
            .iter()
            .zip(levels.iter().zip(gradients))
            .map(|(config, (&level, &gradient))| Biochemical {
                name: config.name.clone(),
                grid: ConcentrationGrid::linear(params, level, gradient),
                diffusion_coefficient: config.diffusion_coefficient,
                decay_constant: config.decay_constant,
                uptake_per_cell: config.uptake_per_cell,
            })
            .collect();
        Ok(Environment { biochemicals })
    }

    pub fn len(&self) -> usize {
        self.biochemicals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.biochemicals.is_empty()
    }

    pub fn biochemicals(&self) -> &[Biochemical] {
        &self.biochemicals
    }

    /// Removes each biochemical's uptake at every given position.
    pub fn consume_at<'a>(&mut self, positions: impl Iterator<Item = &'a Vec3> + Clone) {
        for biochemical in &mut self.biochemicals {
            if biochemical.uptake_per_cell == 0.0 {
                continue;
            }
            for &position in positions.clone() {
                biochemical.grid.increase_concentration(position, -biochemical.uptake_per_cell);
            }
        }
    }

    /// Advances diffusion and decay of every field by `dt`.
    pub fn relax(&mut self, dt: f64) {
        for biochemical in &mut self.biochemicals {
            biochemical.grid.relax(biochemical.diffusion_coefficient, biochemical.decay_constant, dt);
        }
    }

    /// Mean level and centre gradient of every field, for the continuum solver.
    pub fn coupling_values(&self) -> (Vec<f64>, Vec<Vec3>) {
        self.biochemicals
            .iter()
            .map(|b| (b.grid.mean(), b.grid.gradient(b.grid.centre())))
            .unzip()
    }
}

impl FieldRegistry for Environment {
    fn lookup(&self, name: &str) -> Option<FieldHandle> {
        self.biochemicals.iter().position(|b| b.name == name).map(FieldHandle)
    }

    fn field(&self, handle: FieldHandle) -> &dyn ScalarField {
        &self.biochemicals[handle.0].grid
    }

    fn field_mut(&mut self, handle: FieldHandle) -> &mut dyn ScalarField {
        &mut self.biochemicals[handle.0].grid
    }
}

/// Resolves `name` or reports it as unknown.
pub fn require_field(registry: &dyn FieldRegistry, name: &str) -> TissueResult<FieldHandle> {
    registry.lookup(name).ok_or_else(|| TissueError::UnknownField(name.to_string()))
}
