pub mod config;
pub mod engine;
pub mod error;
pub mod grid;
pub mod risk;
pub mod rng;
pub mod terrain;
pub mod zones;

use std::sync::atomic::AtomicBool;
use std::time::Instant;

use serde::{Deserialize, Serialize};

pub use config::{FlowParams, SimulationConfig, TerrainGrid, TerrainParams, WaterSource};
pub use engine::{FloodSimulation, RunReport, SimulationPoint, SimulationStatus};
pub use error::{ConfigMismatch, SimError};
pub use grid::Grid;
pub use risk::RiskLevel;
pub use terrain::generate_terrain;
pub use zones::{FloodZone, GeoPoint, find_flood_zone, list_flood_zones};

/// Build a simulation from `config`, run it to completion, return the trace.
pub fn run_simulation(config: SimulationConfig) -> Result<Vec<SimulationPoint>, SimError> {
    let mut sim = FloodSimulation::new(config)?;
    sim.run();
    Ok(sim.into_trace())
}

/// Scenario for the end-to-end pipeline: synthetic terrain plus one source.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub grid_size: usize,
    pub time_step: f64,
    pub total_time: f64,
    /// Defaults to the grid center.
    pub water_source: Option<WaterSource>,
    pub intensity: f64,
    pub terrain: TerrainParams,
    pub flow: FlowParams,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            grid_size: 64,
            time_step: 5.0,
            total_time: 120.0,
            water_source: None,
            intensity: 50.0,
            terrain: TerrainParams::default(),
            flow: FlowParams::default(),
        }
    }
}

impl Scenario {
    pub fn source(&self) -> WaterSource {
        self.water_source.unwrap_or(WaterSource {
            x: self.grid_size / 2,
            y: self.grid_size / 2,
            intensity: self.intensity,
        })
    }
}

pub struct Timing {
    pub name: &'static str,
    pub ms: f64,
}

pub struct SimulationOutput {
    pub terrain_seed: u64,
    pub trace: Vec<SimulationPoint>,
    pub status: SimulationStatus,
    pub report: RunReport,
    pub timings: Vec<Timing>,
}

pub fn simulate(seed: u64, scenario: &Scenario) -> Result<SimulationOutput, SimError> {
    let never = AtomicBool::new(false);
    simulate_cancellable(seed, scenario, usize::MAX, &never, |_| {})
}

/// Terrain, initialize, run; each phase timed.
pub fn simulate_cancellable<F>(
    seed: u64,
    scenario: &Scenario,
    chunk_steps: usize,
    cancel: &AtomicBool,
    on_chunk: F,
) -> Result<SimulationOutput, SimError>
where
    F: FnMut(&SimulationStatus),
{
    let mut timings = Vec::new();
    let total_start = Instant::now();

    // 1. Terrain
    let t = Instant::now();
    let terrain = generate_terrain(scenario.grid_size, seed, &scenario.terrain)?;
    timings.push(Timing {
        name: "terrain",
        ms: t.elapsed().as_secs_f64() * 1000.0,
    });

    // 2. Initialize (validates before allocating state)
    let t = Instant::now();
    let config = SimulationConfig {
        time_step: scenario.time_step,
        total_time: scenario.total_time,
        grid_size: scenario.grid_size,
        terrain_data: terrain,
        water_source: scenario.source(),
    };
    let mut sim = FloodSimulation::with_params(config, scenario.flow)?;
    timings.push(Timing {
        name: "initialize",
        ms: t.elapsed().as_secs_f64() * 1000.0,
    });

    // 3. Run
    let t = Instant::now();
    let report = sim.run_cancellable(chunk_steps, cancel, on_chunk);
    timings.push(Timing {
        name: "run",
        ms: t.elapsed().as_secs_f64() * 1000.0,
    });

    timings.push(Timing {
        name: "TOTAL",
        ms: total_start.elapsed().as_secs_f64() * 1000.0,
    });

    let status = sim.status();
    Ok(SimulationOutput {
        terrain_seed: seed,
        trace: sim.into_trace(),
        status,
        report,
        timings,
    })
}
