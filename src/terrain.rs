use rayon::prelude::*;

use crate::config::{MAX_GRID_SIZE, TerrainGrid, TerrainParams};
use crate::error::ConfigMismatch;
use crate::grid::Grid;
use crate::rng::{hash_unit, seed_u32};

const SALT_NOISE: u64 = 0x7E22_A1AE_F100_D5EA;

/// Synthetic heightmap: radial dome falling off toward the corners, uniform
/// per-cell noise, and a horizontal river trough through the middle rows.
///
/// Cell noise is a hash of (x, y, seed), so the same seed always gives the
/// same terrain regardless of how rows are scheduled.
pub fn generate_terrain(
    grid_size: usize,
    seed: u64,
    params: &TerrainParams,
) -> Result<TerrainGrid, ConfigMismatch> {
    let mut terrain = checked_square(grid_size, 0.0)?;
    if grid_size == 0 {
        return Ok(terrain);
    }

    let noise_seed = seed_u32(seed, SALT_NOISE);
    let center = grid_size as f64 / 2.0;
    let max_dist = (center * center + center * center).sqrt();

    terrain
        .data
        .par_chunks_mut(grid_size)
        .enumerate()
        .for_each(|(y, row)| {
            let dy = y as f64 - center;
            let river = if dy.abs() < params.river_half_width {
                params.river_depth
            } else {
                0.0
            };
            for x in 0..grid_size {
                let dx = x as f64 - center;
                let dist = (dx * dx + dy * dy).sqrt() / max_dist;
                let base = params.peak_elevation - dist * params.relief;
                let noise = (hash_unit(x as i32, y as i32, noise_seed) - 0.5) * 2.0 * params.noise_amp;
                row[x] = (base + noise - river).max(params.floor);
            }
        });

    Ok(terrain)
}

/// Same as `generate_terrain`, with a seed drawn from the thread RNG.
/// Returns the seed so the terrain can be reproduced later.
pub fn generate_terrain_random(
    grid_size: usize,
    params: &TerrainParams,
) -> Result<(TerrainGrid, u64), ConfigMismatch> {
    let seed = rand::random::<u64>();
    Ok((generate_terrain(grid_size, seed, params)?, seed))
}

/// Level terrain at a single elevation.
pub fn flat(grid_size: usize, elevation: f64) -> Result<TerrainGrid, ConfigMismatch> {
    checked_square(grid_size, elevation)
}

fn checked_square(grid_size: usize, v: f64) -> Result<TerrainGrid, ConfigMismatch> {
    let too_large = ConfigMismatch::GridTooLarge {
        grid_size,
        max: MAX_GRID_SIZE,
    };
    if grid_size > MAX_GRID_SIZE {
        return Err(too_large);
    }
    Grid::try_filled(grid_size, grid_size, v).ok_or(too_large)
}
