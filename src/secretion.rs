//! Secretion and chemotaxis.
//!
//! Secretors raise the substance field at their own position every
//! micro-step; responders move along the raw local gradient of the same field.
//! The field handle is resolved on first use and cached by the module.

use tissue_common::{Phenotype, SubstanceConfig, Vec3};

use crate::agent::Agent;
use crate::error::TissueResult;
use crate::field::{require_field, FieldHandle, FieldRegistry};

/// What a responder read from the field and the move it should make.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChemotaxisResponse {
    pub concentration: f64,
    pub displacement: Vec3,
}

#[derive(Debug, Clone)]
pub struct SubstanceModule {
    field_name: String,
    secretion_amount: f64,
    secretor: Phenotype,
    responder: Option<Phenotype>,
    handle: Option<FieldHandle>,
}

impl SubstanceModule {
    pub fn new(config: &SubstanceConfig) -> Self {
        SubstanceModule {
            field_name: config.field.clone(),
            secretion_amount: config.secretion_amount,
            secretor: config.secretor,
            responder: config.responder,
            handle: None,
        }
    }

    /// True once the field handle has been looked up.
    pub fn is_resolved(&self) -> bool {
        self.handle.is_some()
    }

    /// Returns the cached handle, looking it up on first use.
    pub fn resolve(&mut self, registry: &dyn FieldRegistry) -> TissueResult<FieldHandle> {
        if let Some(handle) = self.handle {
            return Ok(handle);
        }
        let handle = require_field(registry, &self.field_name)?;
        self.handle = Some(handle);
        Ok(handle)
    }

    pub fn is_secretor(&self, agent: &Agent) -> bool {
        agent.phenotype == self.secretor
    }

    pub fn is_responder(&self, agent: &Agent) -> bool {
        self.responder == Some(agent.phenotype)
    }

    /// Raises the field at the agent's position if it is a secretor.
    /// Returns whether anything was secreted.
    pub fn secrete(&mut self, agent: &Agent, registry: &mut dyn FieldRegistry) -> TissueResult<bool> {
        if !self.is_secretor(agent) {
            return Ok(false);
        }
        let handle = self.resolve(registry)?;
        registry
            .field_mut(handle)
            .increase_concentration(agent.position, self.secretion_amount);
        Ok(true)
    }

    /// Reads the field around a responder. Needs a resolved handle so it can
    /// run against a shared registry during the read-only phase.
    pub fn respond(
        &self,
        agent: &Agent,
        handle: FieldHandle,
        registry: &dyn FieldRegistry,
    ) -> Option<ChemotaxisResponse> {
        if !self.is_responder(agent) {
            return None;
        }
        let field = registry.field(handle);
        Some(ChemotaxisResponse {
            concentration: field.concentration(agent.position),
            displacement: field.gradient(agent.position),
        })
    }
}
