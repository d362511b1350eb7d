use rayon::prelude::*;
use tissue_common::{SimParams, Vec3};

use crate::field::ScalarField;

/// Uniform voxel grid holding one concentration over the subdomain cube.
#[derive(Debug, Clone)]
pub struct ConcentrationGrid {
    min_bound: f64,
    max_bound: f64,
    resolution: usize,
    voxel_size: f64,
    inv_voxel_size: f64,
    values: Vec<f64>,
    // Output buffer for relax(), swapped with `values` afterwards
    scratch: Vec<f64>,
}

impl ConcentrationGrid {
    /// Grid filled with `level + gradient . (x - centre)`, clamped at zero.
    pub fn linear(params: &SimParams, level: f64, gradient: Vec3) -> Self {
        let resolution = params.grid_resolution.max(1) as usize;
        let num_voxels = resolution * resolution * resolution;
        let mut grid = ConcentrationGrid {
            min_bound: params.min_bound,
            max_bound: params.max_bound,
            resolution,
            voxel_size: params.voxel_size,
            inv_voxel_size: params.inv_voxel_size,
            values: vec![0.0; num_voxels],
            scratch: vec![0.0; num_voxels],
        };
        let centre = grid.centre();
        for idx in 0..num_voxels {
            let offset = grid.voxel_centre(idx) - centre;
            grid.values[idx] = (level + gradient.dot(offset)).max(0.0);
        }
        grid
    }

    pub fn centre(&self) -> Vec3 {
        Vec3::splat(0.5 * (self.min_bound + self.max_bound))
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    // Calculates the per-axis voxel coordinate, clamped to the grid
    #[inline(always)]
    fn voxel_coord(&self, c: f64) -> usize {
        let cell = ((c - self.min_bound) * self.inv_voxel_size).floor();
        if cell <= 0.0 {
            0
        } else {
            (cell as usize).min(self.resolution - 1)
        }
    }

    #[inline(always)]
    fn flat_index(&self, ix: usize, iy: usize, iz: usize) -> usize {
        (iz * self.resolution + iy) * self.resolution + ix
    }

    #[inline(always)]
    fn voxel_index(&self, position: Vec3) -> usize {
        self.flat_index(
            self.voxel_coord(position.x),
            self.voxel_coord(position.y),
            self.voxel_coord(position.z),
        )
    }

    fn coords(&self, idx: usize) -> (usize, usize, usize) {
        let n = self.resolution;
        (idx % n, (idx / n) % n, idx / (n * n))
    }

    fn voxel_centre(&self, idx: usize) -> Vec3 {
        let (ix, iy, iz) = self.coords(idx);
        let c = |i: usize| self.min_bound + (i as f64 + 0.5) * self.voxel_size;
        Vec3::new(c(ix), c(iy), c(iz))
    }

    /// Explicit diffusion with zero-flux faces followed by first-order decay.
    /// The per-step diffusion rate is capped at the explicit stability limit.
    pub fn relax(&mut self, diffusion_coefficient: f64, decay_constant: f64, dt: f64) {
        if diffusion_coefficient <= 0.0 && decay_constant <= 0.0 {
            return;
        }
        let rate = (diffusion_coefficient * dt * self.inv_voxel_size * self.inv_voxel_size)
            .clamp(0.0, 1.0 / 6.0);
        let keep = (1.0 - decay_constant * dt).max(0.0);
        let n = self.resolution;
        let values = &self.values;

        self.scratch
            .par_iter_mut()
            .enumerate()
            .for_each(|(idx, out)| {
                let (ix, iy, iz) = (idx % n, (idx / n) % n, idx / (n * n));
                let here = values[idx];
                // Missing neighbours mirror the voxel itself (no flux through faces).
                let get = |x: usize, y: usize, z: usize| values[(z * n + y) * n + x];
                let left = if ix > 0 { get(ix - 1, iy, iz) } else { here };
                let right = if ix + 1 < n { get(ix + 1, iy, iz) } else { here };
                let down = if iy > 0 { get(ix, iy - 1, iz) } else { here };
                let up = if iy + 1 < n { get(ix, iy + 1, iz) } else { here };
                let back = if iz > 0 { get(ix, iy, iz - 1) } else { here };
                let front = if iz + 1 < n { get(ix, iy, iz + 1) } else { here };
                let laplacian = left + right + down + up + back + front - 6.0 * here;
                *out = ((here + rate * laplacian) * keep).max(0.0);
            });

        std::mem::swap(&mut self.values, &mut self.scratch);
    }
}

impl ScalarField for ConcentrationGrid {
    fn increase_concentration(&mut self, position: Vec3, amount: f64) {
        let idx = self.voxel_index(position);
        self.values[idx] = (self.values[idx] + amount).max(0.0);
    }

    fn concentration(&self, position: Vec3) -> f64 {
        self.values[self.voxel_index(position)]
    }

    /// Central differences between neighbouring voxels, one-sided at the faces.
    fn gradient(&self, position: Vec3) -> Vec3 {
        let n = self.resolution;
        let ix = self.voxel_coord(position.x);
        let iy = self.voxel_coord(position.y);
        let iz = self.voxel_coord(position.z);

        let derivative = |lo: (usize, usize, usize), hi: (usize, usize, usize), span: usize| {
            if span == 0 {
                return 0.0;
            }
            let a = self.values[self.flat_index(lo.0, lo.1, lo.2)];
            let b = self.values[self.flat_index(hi.0, hi.1, hi.2)];
            (b - a) / (span as f64 * self.voxel_size)
        };
        let lo = |i: usize| i.saturating_sub(1);
        let hi = |i: usize| (i + 1).min(n - 1);

        Vec3::new(
            derivative((lo(ix), iy, iz), (hi(ix), iy, iz), hi(ix) - lo(ix)),
            derivative((ix, lo(iy), iz), (ix, hi(iy), iz), hi(iy) - lo(iy)),
            derivative((ix, iy, lo(iz)), (ix, iy, hi(iz)), hi(iz) - lo(iz)),
        )
    }
}
