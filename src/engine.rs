use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::config::{FlowParams, SimulationConfig, TerrainGrid};
use crate::error::SimError;
use crate::grid::{Grid, neighbors8};
use crate::risk::{RiskLevel, classify};

/// One wet cell at the end of one step.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationPoint {
    pub x: usize,
    pub y: usize,
    pub water_level: f64,
    /// Minutes since run start, taken before the step's clock advance.
    pub timestamp: f64,
    pub risk_level: RiskLevel,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationStatus {
    pub is_running: bool,
    pub current_time: f64,
    pub total_points: usize,
    pub critical_points: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub steps_completed: u64,
    pub steps_planned: u64,
    pub cancelled: bool,
}

/// Water moved from `from` to `to` in one step, read from pre-step values.
/// Zero unless `from` is both higher and wetter than `to`.
#[inline]
pub fn pair_flow(
    from_elev: f64,
    from_level: f64,
    to_elev: f64,
    to_level: f64,
    params: &FlowParams,
) -> f64 {
    let elevation_diff = from_elev - to_elev;
    let level_diff = from_level - to_level;
    if elevation_diff > 0.0 && level_diff > 0.0 {
        ((elevation_diff + level_diff) * params.flow_coefficient)
            .min(from_level * params.outflow_cap)
    } else {
        0.0
    }
}

/// Grid flood model. Owns the water and risk grids, a copy of the terrain
/// (inside the config), and the trace.
///
/// Water is double-buffered: `step` reads only `water` and writes only
/// `next`, then swaps them.
#[derive(Clone, Debug)]
pub struct FloodSimulation {
    params: FlowParams,
    config: SimulationConfig,
    water: Grid<f64>,
    next: Grid<f64>,
    risk: Grid<RiskLevel>,
    steps_taken: u64,
    current_time: f64,
    is_running: bool,
    trace: Vec<SimulationPoint>,
}

impl FloodSimulation {
    pub fn new(config: SimulationConfig) -> Result<Self, SimError> {
        Self::with_params(config, FlowParams::default())
    }

    pub fn with_params(config: SimulationConfig, params: FlowParams) -> Result<Self, SimError> {
        config.validate()?;
        let n = config.grid_size;
        info!(
            grid_size = n,
            time_step = config.time_step,
            total_time = config.total_time,
            "Creating flood simulation"
        );
        Ok(Self {
            params,
            config,
            water: Grid::square(n),
            next: Grid::square(n),
            risk: Grid::square(n),
            steps_taken: 0,
            current_time: 0.0,
            is_running: false,
            trace: Vec::new(),
        })
    }

    /// Replace the run configuration and clear all simulation state.
    /// On error nothing is changed.
    pub fn initialize(&mut self, config: SimulationConfig) -> Result<(), SimError> {
        config.validate()?;
        let n = config.grid_size;
        if self.config.grid_size == n {
            self.water.fill(0.0);
            self.next.fill(0.0);
            self.risk.fill(RiskLevel::Low);
        } else {
            self.water = Grid::square(n);
            self.next = Grid::square(n);
            self.risk = Grid::square(n);
        }
        self.config = config;
        self.steps_taken = 0;
        self.current_time = 0.0;
        self.is_running = false;
        self.trace.clear();
        info!(
            grid_size = n,
            steps = self.config.step_count(),
            "Initialized flood simulation"
        );
        Ok(())
    }

    /// Advance one time step.
    pub fn step(&mut self) {
        let cfg = &self.config;
        let n = cfg.grid_size;
        let terrain = &cfg.terrain_data;
        let water = &self.water;
        let params = self.params;
        let src = cfg.water_source;
        let injection = cfg.injection_per_step();

        // Gather form of the pairwise rule: each cell sums its own outflows
        // and its neighbors' inflows from the snapshot, so rows are independent.
        let clamped: usize = self
            .next
            .data
            .par_chunks_mut(n)
            .enumerate()
            .map(|(y, row)| {
                let mut clamped = 0;
                for x in 0..n {
                    let level = water.get(x, y);
                    let elev = terrain.get(x, y);
                    let mut v = level;
                    if x == src.x && y == src.y {
                        v += injection;
                    }
                    for (nx, ny) in neighbors8(x, y, n, n) {
                        let n_level = water.get(nx, ny);
                        let n_elev = terrain.get(nx, ny);
                        v -= pair_flow(elev, level, n_elev, n_level, &params);
                        v += pair_flow(n_elev, n_level, elev, level, &params);
                    }
                    // Negated compare so NaN also lands on 0.
                    if !(v >= 0.0) {
                        v = 0.0;
                        clamped += 1;
                    }
                    row[x] = v.min(f64::MAX);
                }
                clamped
            })
            .sum();

        std::mem::swap(&mut self.water, &mut self.next);

        let water = &self.water;
        self.risk
            .data
            .par_chunks_mut(n)
            .enumerate()
            .for_each(|(y, row)| {
                for x in 0..n {
                    row[x] = classify(terrain.get(x, y), water.get(x, y));
                }
            });

        let timestamp = self.current_time;
        let before = self.trace.len();
        for y in 0..n {
            for x in 0..n {
                let water_level = self.water.get(x, y);
                if water_level > 0.0 {
                    self.trace.push(SimulationPoint {
                        x,
                        y,
                        water_level,
                        timestamp,
                        risk_level: self.risk.get(x, y),
                    });
                }
            }
        }

        self.steps_taken += 1;
        self.current_time = self.steps_taken as f64 * self.config.time_step;

        trace!(
            step = self.steps_taken,
            timestamp,
            wet = self.trace.len() - before,
            clamped,
            "flood step"
        );
    }

    /// Start over from dry grids and run every whole step of `total_time`
    /// with the stored config.
    pub fn run(&mut self) -> &[SimulationPoint] {
        let never = AtomicBool::new(false);
        self.run_cancellable(usize::MAX, &never, |_| {});
        &self.trace
    }

    /// Initialize with `config`, then `run`.
    pub fn run_with(&mut self, config: SimulationConfig) -> Result<&[SimulationPoint], SimError> {
        self.initialize(config)?;
        Ok(self.run())
    }

    /// Like `run`, but steps in chunks of `chunk_steps`. `cancel` is checked
    /// before each chunk and `on_chunk` sees the status after each one.
    /// A cancelled run keeps its partial trace.
    pub fn run_cancellable<F>(
        &mut self,
        chunk_steps: usize,
        cancel: &AtomicBool,
        mut on_chunk: F,
    ) -> RunReport
    where
        F: FnMut(&SimulationStatus),
    {
        self.reset();
        let planned = self.config.step_count();
        let chunk = chunk_steps.max(1) as u64;

        info!(steps = planned, chunk, "Running flood simulation");
        self.is_running = true;

        let mut done = 0u64;
        let mut cancelled = false;
        while done < planned {
            if cancel.load(Ordering::Relaxed) {
                cancelled = true;
                break;
            }
            let n = chunk.min(planned - done);
            for _ in 0..n {
                self.step();
            }
            done += n;

            let status = self.status();
            debug!(
                steps = done,
                current_time = status.current_time,
                points = status.total_points,
                "Chunk finished"
            );
            on_chunk(&status);
        }

        self.is_running = false;
        let status = self.status();
        info!(
            steps = done,
            cancelled,
            points = status.total_points,
            critical = status.critical_points,
            "Flood simulation finished"
        );

        RunReport {
            steps_completed: done,
            steps_planned: planned,
            cancelled,
        }
    }

    pub fn status(&self) -> SimulationStatus {
        SimulationStatus {
            is_running: self.is_running,
            current_time: self.current_time,
            total_points: self.trace.len(),
            critical_points: self
                .trace
                .iter()
                .filter(|p| p.risk_level == RiskLevel::Critical)
                .count(),
        }
    }

    /// Zero water, all-low risk, empty trace, clock at 0. Terrain is kept.
    pub fn reset(&mut self) {
        self.water.fill(0.0);
        self.next.fill(0.0);
        self.risk.fill(RiskLevel::Low);
        self.trace.clear();
        self.steps_taken = 0;
        self.current_time = 0.0;
        self.is_running = false;
        debug!("Flood simulation reset");
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn params(&self) -> &FlowParams {
        &self.params
    }

    pub fn terrain(&self) -> &TerrainGrid {
        &self.config.terrain_data
    }

    pub fn water_levels(&self) -> &Grid<f64> {
        &self.water
    }

    pub fn risk_map(&self) -> &Grid<RiskLevel> {
        &self.risk
    }

    pub fn trace(&self) -> &[SimulationPoint] {
        &self.trace
    }

    pub fn into_trace(self) -> Vec<SimulationPoint> {
        self.trace
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn steps_taken(&self) -> u64 {
        self.steps_taken
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    /// Trace entries recorded at `timestamp`.
    pub fn points_at(&self, timestamp: f64) -> impl Iterator<Item = &SimulationPoint> {
        self.trace.iter().filter(move |p| p.timestamp == timestamp)
    }

    /// Distinct timestamps in recording order.
    pub fn timestamps(&self) -> Vec<f64> {
        let mut out: Vec<f64> = Vec::new();
        for p in &self.trace {
            if out.last() != Some(&p.timestamp) {
                out.push(p.timestamp);
            }
        }
        out
    }

    /// Deepest water level seen anywhere in the trace.
    pub fn peak_water_level(&self) -> f64 {
        self.trace.iter().map(|p| p.water_level).fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WaterSource;
    use crate::terrain::flat;
    use approx::assert_relative_eq;

    fn dry_config(terrain: TerrainGrid) -> SimulationConfig {
        SimulationConfig {
            time_step: 5.0,
            total_time: 5.0,
            grid_size: terrain.w,
            terrain_data: terrain,
            water_source: WaterSource { x: 0, y: 0, intensity: 0.0 },
        }
    }

    #[test]
    fn two_cell_downhill_flow() {
        // Row 0 holds the pair; row 1 is a dry wall so it takes nothing.
        let terrain = Grid::from_rows(&[vec![10.0, 0.0], vec![100.0, 100.0]]).unwrap();
        let mut sim = FloodSimulation::new(dry_config(terrain)).unwrap();
        sim.water.set(0, 0, 5.0);
        sim.step();
        assert_relative_eq!(sim.water_levels().get(0, 0), 3.5);
        assert_relative_eq!(sim.water_levels().get(1, 0), 1.5);
        assert_eq!(sim.water_levels().get(0, 1), 0.0);
        assert_eq!(sim.water_levels().get(1, 1), 0.0);
    }

    #[test]
    fn pair_flow_respects_cap_and_gradient() {
        let p = FlowParams::default();
        // Coefficient term wins.
        assert_relative_eq!(pair_flow(1.0, 10.0, 0.0, 9.5, &p), 0.15);
        // Cap wins.
        assert_relative_eq!(pair_flow(100.0, 2.0, 0.0, 0.0, &p), 0.6);
        // Uphill or equal elevation: nothing.
        assert_eq!(pair_flow(0.0, 5.0, 1.0, 0.0, &p), 0.0);
        assert_eq!(pair_flow(3.0, 5.0, 3.0, 0.0, &p), 0.0);
        // Higher but drier: nothing.
        assert_eq!(pair_flow(5.0, 1.0, 0.0, 1.0, &p), 0.0);
        assert_eq!(pair_flow(5.0, 1.0, 0.0, 2.0, &p), 0.0);
    }

    #[test]
    fn over_drained_cell_clamps_to_zero() {
        // A spike draining into eight pits loses more than it holds.
        let mut terrain = flat(3, 0.0).unwrap();
        terrain.set(1, 1, 100.0);
        let mut sim = FloodSimulation::new(dry_config(terrain)).unwrap();
        sim.water.set(1, 1, 10.0);
        sim.step();
        assert_eq!(sim.water_levels().get(1, 1), 0.0);
        for (x, y) in neighbors8(1, 1, 3, 3) {
            assert_relative_eq!(sim.water_levels().get(x, y), 3.0);
        }
    }

    #[test]
    fn risk_is_recomputed_from_current_water_only() {
        let terrain = Grid::from_rows(&[vec![10.0, 0.0], vec![100.0, 100.0]]).unwrap();
        let mut sim = FloodSimulation::new(dry_config(terrain)).unwrap();
        sim.water.set(1, 0, 3.0);
        sim.risk.set(0, 0, RiskLevel::Critical);
        sim.step();
        assert_eq!(sim.risk_map().get(0, 0), RiskLevel::Low);
        assert_eq!(sim.risk_map().get(1, 0), RiskLevel::Critical);
    }

    #[test]
    fn failed_initialize_keeps_previous_state() {
        let mut sim = FloodSimulation::new(dry_config(flat(4, 0.0).unwrap())).unwrap();
        sim.water.set(2, 2, 1.0);
        sim.step();
        let before = sim.trace().to_vec();

        let mut bad = dry_config(flat(4, 0.0).unwrap());
        bad.grid_size = 5;
        assert!(sim.initialize(bad).is_err());
        assert_eq!(sim.trace(), &before[..]);
        assert_eq!(sim.steps_taken(), 1);
        assert_eq!(sim.config().grid_size, 4);
    }

    #[test]
    fn initialize_resizes_grids() {
        let mut sim = FloodSimulation::new(dry_config(flat(4, 0.0).unwrap())).unwrap();
        sim.initialize(dry_config(flat(7, 0.0).unwrap())).unwrap();
        assert_eq!(sim.water_levels().w, 7);
        assert_eq!(sim.risk_map().data.len(), 49);
        sim.step();
        assert_eq!(sim.steps_taken(), 1);
    }

    #[test]
    fn timestamps_and_frames() {
        let mut config = dry_config(flat(3, 0.0).unwrap());
        config.water_source = WaterSource { x: 1, y: 1, intensity: 6.0 };
        config.total_time = 15.0;
        let mut sim = FloodSimulation::new(config).unwrap();
        sim.run();
        assert_eq!(sim.timestamps(), vec![0.0, 5.0, 10.0]);
        assert_eq!(sim.points_at(5.0).count(), 1);
        assert_relative_eq!(sim.peak_water_level(), 1.5, epsilon = 1e-12);
    }

    #[test]
    fn rerun_uses_stored_config() {
        let mut config = dry_config(flat(3, 0.0).unwrap());
        config.water_source = WaterSource { x: 1, y: 1, intensity: 6.0 };
        config.total_time = 15.0;
        let mut sim = FloodSimulation::new(config.clone()).unwrap();
        let first = sim.run().to_vec();
        assert_eq!(sim.steps_taken(), 3);
        assert_eq!(sim.run(), &first[..]);

        config.total_time = 5.0;
        assert_eq!(sim.run_with(config).unwrap().len(), 1);
        assert_eq!(sim.config().total_time, 5.0);
    }

    #[test]
    fn non_finite_water_is_clamped() {
        let mut terrain = flat(3, 0.0).unwrap();
        terrain.set(1, 1, 100.0);
        let mut sim = FloodSimulation::new(dry_config(terrain)).unwrap();
        sim.water.set(1, 1, f64::INFINITY);
        sim.water.set(0, 0, f64::NAN);
        sim.step();
        for &v in &sim.water_levels().data {
            assert!(v.is_finite() && v >= 0.0, "bad level {v}");
        }
        assert_eq!(sim.water_levels().get(1, 1), 0.0);
        assert_eq!(sim.water_levels().get(2, 2), f64::MAX);
        sim.step();
        assert!(sim.water_levels().data.iter().all(|v| v.is_finite() && *v >= 0.0));
    }
}
