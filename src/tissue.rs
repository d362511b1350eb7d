//! Batch of subdomains on a regular lattice.

use std::path::Path;

use anyhow::Result;
use log::{debug, error, info, warn};
use rayon::prelude::*;
use tissue_common::{AggregateSnapshot, SimulationConfig, Vec3};

use crate::checkpoint;
use crate::simulation::run_subdomain;
use crate::subdomain::{Face, FaceCounts, Subdomain};

/// Id of the subdomain across `face` from `id`, if it lies inside the lattice.
/// Ids are laid out as `x + nx * (y + ny * z)`.
pub fn neighbour(layout: [usize; 3], id: usize, face: Face) -> Option<usize> {
    let [nx, ny, nz] = layout;
    let mut coords = [id % nx, (id / nx) % ny, id / (nx * ny)];
    let axis = face.axis() as usize;
    let extent = [nx, ny, nz][axis];
    if face.is_positive() {
        if coords[axis] + 1 >= extent {
            return None;
        }
        coords[axis] += 1;
    } else {
        coords[axis] = coords[axis].checked_sub(1)?;
    }
    Some(coords[0] + nx * (coords[1] + ny * coords[2]))
}

pub struct Tissue {
    config: SimulationConfig,
    subdomains: Vec<Subdomain>,
    failed: Vec<bool>,
    macro_iteration: u32,
    lost_migrants: u32,
    snapshots: Vec<AggregateSnapshot>,
}

impl Tissue {
    /// Builds and initialises every subdomain of the layout. Leftover
    /// checkpoints are removed unless the run resumes from them.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let counts: Vec<u32> = config.cell_types.iter().map(|c| c.count).collect();
        let levels: Vec<f64> = config.biochemicals.iter().map(|b| b.initial_level).collect();
        let micro_levels: Vec<f64> = config.microstructures.iter().map(|m| m.initial_level).collect();

        let n_subdomains = config.subdomains.count();
        let mut subdomains = Vec::with_capacity(n_subdomains);
        for id in 0..n_subdomains {
            let mut subdomain =
                Subdomain::new(id, counts.len(), levels.len(), micro_levels.len());
            subdomain.initialize(&counts, &levels, &micro_levels)?;
            subdomain.biochemical_level_gradient = config
                .biochemicals
                .iter()
                .map(|b| Vec3::from_array(b.initial_gradient))
                .collect();
            subdomain.microstructural_level_gradient = config
                .microstructures
                .iter()
                .map(|m| Vec3::from_array(m.initial_gradient))
                .collect();
            subdomains.push(subdomain);
        }

        let checkpoint_dir = Path::new(&config.output.checkpoint_dir);
        if config.initial_conditions.resume_from_checkpoint {
            info!("Resuming from checkpoints in {}.", checkpoint_dir.display());
        } else {
            let mut removed = 0;
            for id in 0..n_subdomains {
                if checkpoint::remove(checkpoint_dir, id)? {
                    removed += 1;
                }
            }
            if removed > 0 {
                info!("Removed {} stale checkpoints from {}.", removed, checkpoint_dir.display());
            }
        }

        info!(
            "Tissue of {} subdomains ({:?}), {} cell types, {} biochemicals.",
            n_subdomains,
            config.subdomains.layout,
            counts.len(),
            levels.len()
        );
        Ok(Tissue {
            config,
            failed: vec![false; n_subdomains],
            subdomains,
            macro_iteration: 0,
            lost_migrants: 0,
            snapshots: Vec::new(),
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn subdomains(&self) -> &[Subdomain] {
        &self.subdomains
    }

    pub fn is_failed(&self, id: usize) -> bool {
        self.failed.get(id).copied().unwrap_or(false)
    }

    pub fn macro_iteration(&self) -> u32 {
        self.macro_iteration
    }

    /// Migrants that left through the outer boundary of the tissue.
    pub fn lost_migrants(&self) -> u32 {
        self.lost_migrants
    }

    pub fn snapshots(&self) -> &[AggregateSnapshot] {
        &self.snapshots
    }

    /// Runs every live subdomain for one macro-iteration, then exchanges
    /// migrants. A failing subdomain is reported and skipped from then on.
    pub fn run_macro_iteration(&mut self) -> Result<()> {
        let macro_iteration = self.macro_iteration;
        let config = &self.config;
        let results: Vec<Option<Result<AggregateSnapshot>>> = self
            .subdomains
            .par_iter_mut()
            .zip(self.failed.par_iter())
            .map(|(subdomain, &failed)| {
                if failed {
                    None
                } else {
                    Some(run_subdomain(config, subdomain, macro_iteration))
                }
            })
            .collect();

        for (id, result) in results.into_iter().enumerate() {
            match result {
                Some(Ok(snapshot)) => self.snapshots.push(snapshot),
                Some(Err(e)) => {
                    error!("Subdomain {} failed in macro-iteration {}: {:#}", id, macro_iteration, e);
                    self.failed[id] = true;
                }
                None => debug!("Subdomain {} skipped (failed earlier).", id),
            }
        }

        let lost = self.exchange_migrants();
        self.lost_migrants += lost;
        self.macro_iteration += 1;

        if self.failed.iter().all(|&f| f) {
            anyhow::bail!("every subdomain has failed");
        }
        Ok(())
    }

    /// Runs the configured number of macro-iterations.
    pub fn run(&mut self) -> Result<&[AggregateSnapshot]> {
        let total = self.config.timing.macro_iterations;
        for _ in 0..total {
            self.run_macro_iteration()?;
            let population: u32 = self.subdomains.iter().map(Subdomain::total_population).sum();
            info!(
                "Macro-iteration [{}/{}] | population: {} | failed subdomains: {}",
                self.macro_iteration,
                total,
                population,
                self.failed.iter().filter(|&&f| f).count()
            );
        }
        Ok(self.snapshots.as_slice())
    }

    /// Moves each escaped counter into the neighbour's incoming counter on the
    /// shared face. Returns the migrants that had nowhere to go.
    pub fn exchange_migrants(&mut self) -> u32 {
        let layout = self.config.subdomains.layout;
        let escaped: Vec<FaceCounts> = self.subdomains.iter().map(|s| s.escaped).collect();
        let mut lost = 0;
        for (id, counts) in escaped.iter().enumerate() {
            if self.failed[id] {
                continue;
            }
            for face in Face::ALL {
                let count = counts.get(face);
                if count == 0 {
                    continue;
                }
                match neighbour(layout, id, face) {
                    Some(target) if !self.failed[target] => {
                        self.subdomains[target].incoming.add(face.opposite(), count);
                    }
                    _ => lost += count,
                }
            }
        }
        for subdomain in &mut self.subdomains {
            subdomain.escaped.reset();
        }
        if lost > 0 {
            warn!("{} migrants left the tissue and were dropped.", lost);
        }
        lost
    }
}
